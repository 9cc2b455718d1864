//! RDFT Receiver Binary
//!
//! Usage: receiver [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>  Path to an endpoints JSON file
//!   -h, --help           Print help information
//!
//! Delivered lines are appended to ./data/message.txt; the directory is
//! created on demand.

use std::env;

use rdft::config::{self, Endpoints};
use rdft::receiver::{Receiver, ReceiverConfig};
use rdft::text::FileLineSink;

/// Where delivered payloads are persisted.
const OUTPUT_PATH: &str = "./data/message.txt";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rdft::logging::init()?;

    let args: Vec<String> = env::args().collect();
    let mut config_path: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_usage();
                return Ok(());
            }
            "-c" | "--config" => {
                i += 1;
                config_path = Some(
                    args.get(i)
                        .cloned()
                        .ok_or_else(|| anyhow::anyhow!("--config requires a file path"))?,
                );
            }
            other => {
                eprintln!("Unknown option: {}", other);
                print_usage();
                anyhow::bail!("unexpected argument");
            }
        }
        i += 1;
    }

    let endpoints = match &config_path {
        Some(path) => config::load_endpoints(path)?,
        None => Endpoints::default(),
    };
    endpoints.validate()?;

    let sink = FileLineSink::open(OUTPUT_PATH)?;
    let receiver = Receiver::bind(
        ReceiverConfig {
            bind: endpoints.receiver,
            emulator: endpoints.emulator,
        },
        sink,
    )
    .await?;

    let report = receiver.run().await?;
    tracing::info!(
        lines = report.lines_delivered,
        duplicates = report.duplicate_frames,
        lost = report.lost.len(),
        output = OUTPUT_PATH,
        "reception finished"
    );
    Ok(())
}

fn print_usage() {
    println!(
        r#"RDFT Receiver - reliable datagram file transfer

USAGE:
    receiver [OPTIONS]

OPTIONS:
    -c, --config <FILE>  Path to an endpoints JSON file
    -h, --help           Print help information

Delivered lines are appended to {OUTPUT_PATH}.
"#
    );
}
