//! RDFT Network Emulator Binary
//!
//! Usage: netem [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>  Path to an endpoints JSON file
//!   -h, --help           Print help information
//!
//! Runs the relay and an operator command loop on stdin:
//!
//!   delay <ms>    set the per-hop delay
//!   loss <pct>    set the drop probability (0-100)
//!   start         resume relaying
//!   stop          pause (datagrams silently discarded)
//!   reset         zero knobs, counters, and the packet trace
//!   save <path>   export the packet trace as CSV
//!   stats         print the counter report
//!   quit          exit

use std::env;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};

use rdft::config::{self, Endpoints};
use rdft::emulator::{Emulator, EmulatorConfig, EmulatorCounters, EmulatorKnobs, PacketTrace};

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

    let emulator = Emulator::bind(EmulatorConfig {
        bind: endpoints.emulator,
        transmitter: endpoints.transmitter,
        receiver: endpoints.receiver,
        delay_ms: 0,
        loss_percent: 0,
    })
    .await?;

    let knobs = emulator.knobs();
    let counters = emulator.counters();
    let trace = emulator.trace();

    let mut relay = tokio::spawn(emulator.run());

    tokio::select! {
        // The relay only returns on a fatal socket error
        res = &mut relay => res??,
        res = command_loop(knobs, counters, trace) => {
            relay.abort();
            res?;
        }
    }
    Ok(())
}

async fn command_loop(
    knobs: Arc<EmulatorKnobs>,
    counters: Arc<EmulatorCounters>,
    trace: Arc<Mutex<PacketTrace>>,
) -> anyhow::Result<()> {
    println!("Network emulator running. Commands: delay <ms> | loss <pct> | start | stop | reset | save <path> | stats | quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let mut parts = line.split_whitespace();
        match parts.next() {
            None => continue,
            Some("delay") => match parts.next().map(str::parse::<u64>) {
                Some(Ok(ms)) => {
                    knobs.set_delay_ms(ms);
                    println!("packet delay: {} ms", knobs.delay_ms());
                }
                _ => println!("usage: delay <ms>"),
            },
            Some("loss") => match parts.next().map(str::parse::<u32>) {
                Some(Ok(pct)) => {
                    knobs.set_loss_percent(pct);
                    println!("drop probability: {}%", knobs.loss_percent());
                }
                _ => println!("usage: loss <pct>"),
            },
            Some("start") => {
                knobs.resume();
                println!("relay active");
            }
            Some("stop") => {
                knobs.pause();
                println!("relay stopped");
            }
            Some("reset") => {
                knobs.reset();
                counters.reset();
                trace.lock().reset();
                println!("knobs, counters, and trace reset");
            }
            Some("save") => match parts.next() {
                Some(path) => {
                    let csv = trace.lock().to_csv();
                    match std::fs::write(path, csv) {
                        Ok(()) => println!("trace saved to {}", path),
                        Err(e) => println!("cannot save trace: {}", e),
                    }
                }
                None => println!("usage: save <path>"),
            },
            Some("stats") => print!("{}", counters.format_report()),
            Some("quit") | Some("exit") => break,
            Some(other) => println!("unknown command: {}", other),
        }
    }
    Ok(())
}

fn print_usage() {
    println!(
        r#"RDFT Network Emulator - lossy, delayed store-and-forward relay

USAGE:
    netem [OPTIONS]

OPTIONS:
    -c, --config <FILE>  Path to an endpoints JSON file
    -h, --help           Print help information

Runtime knobs are driven from stdin; type 'stats' for counters,
'save trace.csv' to export the packet trace.
"#
    );
}
