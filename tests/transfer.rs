//! End-to-end transfer scenarios: real transmitter, emulator, and receiver
//! wired together over loopback sockets on ephemeral ports.

use std::net::SocketAddr;
use std::time::Duration;

use rdft::emulator::{Emulator, EmulatorConfig};
use rdft::protocol::frame::pad_payload;
use rdft::protocol::PAYLOAD_LEN;
use rdft::receiver::{DeliveryReport, Receiver, ReceiverConfig};
use rdft::text::MemoryLineSink;
use rdft::transmitter::{TransferReport, Transmitter, TransmitterConfig};

/// Reserve three distinct loopback addresses by briefly binding them.
fn reserve_addrs() -> (SocketAddr, SocketAddr, SocketAddr) {
    let reserve = || {
        let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.local_addr().unwrap()
    };
    (reserve(), reserve(), reserve())
}

fn records(lines: &[&str]) -> Vec<[u8; PAYLOAD_LEN]> {
    lines
        .iter()
        .map(|l| pad_payload(l.as_bytes()).unwrap())
        .collect()
}

struct Session {
    emulator: Emulator,
    transmitter: Transmitter,
    receiver: Receiver<MemoryLineSink>,
    sink: MemoryLineSink,
}

async fn wire_session(lines: &[&str], delay_ms: u64, loss_percent: u32) -> Session {
    let (tx_addr, em_addr, rx_addr) = reserve_addrs();

    let emulator = Emulator::bind(EmulatorConfig {
        bind: em_addr,
        transmitter: tx_addr,
        receiver: rx_addr,
        delay_ms,
        loss_percent,
    })
    .await
    .unwrap();

    let sink = MemoryLineSink::new();
    let receiver = Receiver::bind(
        ReceiverConfig {
            bind: rx_addr,
            emulator: em_addr,
        },
        sink.clone(),
    )
    .await
    .unwrap();

    let transmitter = Transmitter::bind(TransmitterConfig::new(tx_addr, em_addr), records(lines))
        .await
        .unwrap();

    Session {
        emulator,
        transmitter,
        receiver,
        sink,
    }
}

async fn run_session(session: Session) -> (TransferReport, DeliveryReport, MemoryLineSink) {
    let Session {
        emulator,
        transmitter,
        receiver,
        sink,
    } = session;

    let relay = tokio::spawn(emulator.run());
    let rx_task = tokio::spawn(async move { receiver.run().await.unwrap() });
    let tx_report = transmitter.run().await.unwrap();
    let rx_report = rx_task.await.unwrap();
    relay.abort();

    (tx_report, rx_report, sink)
}

#[tokio::test]
async fn test_lossless_transfer_is_exact() {
    let session = wire_session(&["a\n", "b\n", "c\n"], 0, 0).await;
    let counters = session.emulator.counters();
    let trace = session.emulator.trace();

    let (tx_report, rx_report, sink) = run_session(session).await;

    assert_eq!(sink.contents(), b"a\nb\nc\n");
    assert_eq!(tx_report.lines_sent, 3);
    assert_eq!(tx_report.retransmit_batches, 0);
    assert_eq!(rx_report.lines_delivered, 3);
    assert!(rx_report.lost.is_empty());

    // 3 DATA + 3 ACK plus at least the EOT that terminated the receiver
    assert!(counters.packets_seen() >= 7);
    assert_eq!(counters.packets_dropped(), 0);
    assert_eq!(counters.retransmits(), 0);

    let trace = trace.lock();
    assert_eq!(trace.len(), 3);
    assert!(trace.points().iter().all(|p| !p.dropped));
}

#[tokio::test]
async fn test_delayed_path_still_lossless() {
    let lines = ["one\n", "two\n", "three\n", "four\n", "five\n"];
    let session = wire_session(&lines, 20, 0).await;

    let (tx_report, rx_report, sink) = run_session(session).await;

    assert_eq!(sink.contents(), b"one\ntwo\nthree\nfour\nfive\n");
    assert_eq!(rx_report.lines_delivered, 5);
    // 40 ms round trips stay far below the initial 2 s timeout
    assert_eq!(tx_report.retransmit_batches, 0);
    assert!(tx_report.final_window > 1);
}

#[tokio::test]
async fn test_loss_burst_recovers_with_retransmission() {
    // Total loss while the first window is in flight, then a clean path:
    // the timeout must fire, the window halve, and the data still arrive.
    let session = wire_session(&["x\n", "y\n"], 0, 100).await;
    let counters = session.emulator.counters();
    let knobs = session.emulator.knobs();

    let relay = tokio::spawn(session.emulator.run());
    let receiver = session.receiver;
    let rx_task = tokio::spawn(async move { receiver.run().await.unwrap() });

    let heal = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        knobs.set_loss_percent(0);
    });

    let tx_report = session.transmitter.run().await.unwrap();
    let rx_report = rx_task.await.unwrap();
    heal.await.unwrap();
    relay.abort();

    assert_eq!(session.sink.contents(), b"x\ny\n");
    assert!(tx_report.retransmit_batches >= 1);
    assert!(tx_report.retransmitted_frames >= 1);
    assert!(rx_report.lost.is_empty());
    assert!(counters.packets_dropped() >= 1);
    assert!(counters.retransmits() >= 1);
}

#[tokio::test]
async fn test_seeded_lossy_path_delivers_in_order() {
    let lines = ["alpha\n", "beta\n", "gamma\n"];
    let session = wire_session(&lines, 0, 25).await;
    let emulator = session.emulator.with_rng_seed(0xDEC0DE);

    let relay = tokio::spawn(emulator.run());
    let receiver = session.receiver;
    let rx_task = tokio::spawn(async move { receiver.run().await.unwrap() });
    let tx_report = session.transmitter.run().await.unwrap();
    let rx_report = rx_task.await.unwrap();
    relay.abort();

    // Whatever the loss pattern, delivery is exact, in order, exactly once
    assert_eq!(session.sink.contents(), b"alpha\nbeta\ngamma\n");
    assert_eq!(rx_report.lines_delivered, 3);
    assert!(rx_report.lost.is_empty());
    assert_eq!(tx_report.lines_sent, 3);
}
