//! RDFT Transmitter Binary
//!
//! Usage: transmitter [OPTIONS] [host] [input-file]
//!
//! Arguments:
//!   host        Network emulator hostname or IP (default from config)
//!   input-file  Text file to transfer (default ./resource/message.txt)
//!
//! Options:
//!   -c, --config <FILE>  Path to an endpoints JSON file
//!   -h, --help           Print help information

use std::env;

use rdft::config::{self, Endpoints};
use rdft::text::{FileLineSource, LineSource};
use rdft::transmitter::{Transmitter, TransmitterConfig};

/// Input transferred when the CLI does not name a file.
const DEFAULT_INPUT: &str = "./resource/message.txt";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rdft::logging::init()?;

    let args: Vec<String> = env::args().collect();
    let mut config_path: Option<String> = None;
    let mut positional: Vec<String> = Vec::new();

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
            other => positional.push(other.to_string()),
        }
        i += 1;
    }

    if positional.len() > 2 {
        print_usage();
        anyhow::bail!("expected at most [host] [input-file]");
    }

    let mut endpoints = match &config_path {
        Some(path) => config::load_endpoints(path)?,
        None => Endpoints::default(),
    };
    if let Some(host) = positional.first() {
        endpoints = endpoints.with_emulator_host(host)?;
    }
    endpoints.validate()?;

    let input = positional.get(1).map(String::as_str).unwrap_or(DEFAULT_INPUT);
    let records = FileLineSource::open(input)?.read_records()?;
    tracing::info!(input, lines = records.len(), "input loaded");

    let transmitter = Transmitter::bind(
        TransmitterConfig::new(endpoints.transmitter, endpoints.emulator),
        records,
    )
    .await?;
    let report = transmitter.run().await?;

    tracing::info!(
        lines = report.lines_sent,
        retransmit_batches = report.retransmit_batches,
        retransmitted_frames = report.retransmitted_frames,
        final_window = report.final_window,
        final_timeout_ms = report.final_timeout.as_millis() as u64,
        "transfer finished"
    );
    Ok(())
}

fn print_usage() {
    println!(
        r#"RDFT Transmitter - reliable datagram file transfer

USAGE:
    transmitter [OPTIONS] [host] [input-file]

ARGUMENTS:
    host         Network emulator hostname or IP address
    input-file   Text file to transfer, one record per line
                 (default {DEFAULT_INPUT})

OPTIONS:
    -c, --config <FILE>  Path to an endpoints JSON file
    -h, --help           Print help information

EXAMPLES:
    Transfer the default file through a local emulator:
        transmitter

    Name the emulator host and the input explicitly:
        transmitter 192.168.1.78 ./resource/message.txt
"#
    );
}
