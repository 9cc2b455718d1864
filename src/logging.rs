//! Tracing subscriber setup shared by the three binaries.
//!
//! Events go to stdout and, severity-prefixed, to an append-mode log file
//! under `./logs`. The filter respects `RUST_LOG` (e.g. `RUST_LOG=debug`).

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::Result;

/// Directory holding the shared log file; created on demand.
pub const LOG_DIR: &str = "./logs";

/// Log file name inside [`LOG_DIR`].
pub const LOG_FILE: &str = "out.log";

/// Initialize logging for one process.
pub fn init() -> Result<()> {
    fs::create_dir_all(LOG_DIR)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(Path::new(LOG_DIR).join(LOG_FILE))?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false))
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Arc::new(file)),
        )
        .init();

    Ok(())
}
