//! Sliding-window send engine.
//!
//! Loads the whole input into a send buffer, then drives a four-state loop:
//!
//! ```text
//! ┌────────────────┐  burst sent   ┌─────────────┐  set empty  ┌─────────────────┐
//! │ SendingPackets │ ────────────▶ │ WaitForAcks │ ──────────▶ │ AllAcksReceived │
//! └────────────────┘               └─────────────┘             └─────────────────┘
//!         ▲                      timeout │ ▲ ACK                 │          │
//!         │                             ▼ │                     more data   │ done
//!         │                    (retransmit window,               │          ▼
//!         └──────────────────── halve window, back off) ◀────────┘  ┌───────────────┐
//!                                                                   │ AllPacketsSent│
//!                                                                   └───────────────┘
//! ```
//!
//! Loss is inferred from timer expiry only; every frame still unacknowledged
//! at that point is re-sent in its original send order, marked with the
//! retransmit flag. Termination is a best-effort burst of EOT copies.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::protocol::frame::{Frame, FrameKind, FRAME_WIRE_SIZE};
use crate::protocol::{
    CongestionWindow, RtoEstimator, UnackedSet, EOT_COPIES, INITIAL_SEQ_NUM, PAYLOAD_LEN,
};

/// Receive-poll quantum; the loop never blocks longer than this, so timer
/// expiry is detected within one quantum of its true deadline.
pub const READ_TIMEOUT: Duration = Duration::from_micros(300);

/// Transmitter runtime configuration.
#[derive(Debug, Clone)]
pub struct TransmitterConfig {
    /// Local bind address.
    pub bind: SocketAddr,
    /// The emulator's address; destination of every outbound frame.
    pub emulator: SocketAddr,
    /// Receive-poll quantum, [`READ_TIMEOUT`] unless overridden.
    pub read_timeout: Duration,
}

impl TransmitterConfig {
    /// Configuration with the default poll quantum.
    pub fn new(bind: SocketAddr, emulator: SocketAddr) -> Self {
        Self {
            bind,
            emulator,
            read_timeout: READ_TIMEOUT,
        }
    }
}

/// Summary of one completed transfer.
#[derive(Debug, Clone)]
pub struct TransferReport {
    /// Input lines delivered (and therefore acknowledged).
    pub lines_sent: usize,
    /// Timeout events that triggered a window retransmission.
    pub retransmit_batches: u64,
    /// Individual DATA frames re-sent across all timeouts.
    pub retransmitted_frames: u64,
    /// Window size when the transfer finished.
    pub final_window: i32,
    /// Timeout interval when the transfer finished.
    pub final_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    SendingPackets,
    WaitForAcks,
    AllAcksReceived,
    AllPacketsSent,
}

/// The sliding-window send engine.
pub struct Transmitter {
    socket: UdpSocket,
    peer: SocketAddr,
    read_timeout: Duration,
    records: Vec<[u8; PAYLOAD_LEN]>,
    unacked: UnackedSet,
    window: CongestionWindow,
    rto: RtoEstimator,
}

impl Transmitter {
    /// Bind the transmitter socket and take ownership of the send buffer.
    pub async fn bind(
        config: TransmitterConfig,
        records: Vec<[u8; PAYLOAD_LEN]>,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(config.bind).await?;
        info!(bind = %config.bind, emulator = %config.emulator, lines = records.len(),
              "transmitter ready");
        Ok(Self {
            socket,
            peer: config.emulator,
            read_timeout: config.read_timeout,
            records,
            unacked: UnackedSet::new(),
            window: CongestionWindow::new(),
            rto: RtoEstimator::new(),
        })
    }

    /// Address the socket actually bound (useful with an ephemeral port).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Deliver every record reliably and in order, then send the EOT burst.
    pub async fn run(mut self) -> Result<TransferReport> {
        let total = self.records.len();
        let mut next_seq = INITIAL_SEQ_NUM;
        let mut state = State::SendingPackets;
        let mut burst_start = Instant::now();
        let mut recv_buf = [0u8; FRAME_WIRE_SIZE + 1];

        let mut retransmit_batches = 0u64;
        let mut retransmitted_frames = 0u64;

        while state != State::AllPacketsSent {
            match state {
                State::SendingPackets => {
                    info!(window = self.window.size(), "sending window of packets");
                    for _ in 0..self.window.size() {
                        let sent_so_far = (next_seq - INITIAL_SEQ_NUM) as usize;
                        if sent_so_far == total {
                            break;
                        }
                        let seq = next_seq;
                        next_seq += 1;
                        self.unacked.push(seq);

                        let frame = Frame::data(seq, self.record(seq), self.window.size());
                        self.send(&frame).await?;
                        info!(seq, window = frame.window, "sent DATA");
                    }
                    burst_start = Instant::now();
                    debug!(unacked = self.unacked.len(), "window sent, waiting for ACKs");
                    state = State::WaitForAcks;
                }

                State::WaitForAcks => {
                    if self.unacked.is_empty() {
                        info!("all ACKs received");
                        state = State::AllAcksReceived;
                        continue;
                    }

                    let elapsed = burst_start.elapsed();
                    if elapsed >= self.rto.timeout_interval() {
                        info!(
                            elapsed_ms = elapsed.as_millis() as u64,
                            timeout_ms = self.rto.timeout_interval().as_millis() as u64,
                            unacked = self.unacked.len(),
                            "packet loss event detected"
                        );
                        retransmitted_frames += self.retransmit_unacked().await?;
                        retransmit_batches += 1;
                        self.rto.sample(elapsed);
                        self.window.on_timeout();
                        burst_start = Instant::now();
                        debug!(
                            window = self.window.size(),
                            timeout_ms = self.rto.timeout_interval().as_millis() as u64,
                            "window halved, timer reset"
                        );
                    }

                    match timeout(self.read_timeout, self.socket.recv_from(&mut recv_buf)).await {
                        // Poll quantum elapsed without data; not an error
                        Err(_) => {}
                        Ok(Err(e)) => return Err(e.into()),
                        Ok(Ok((len, _))) => self.on_datagram(&recv_buf[..len], burst_start),
                    }
                }

                State::AllAcksReceived => {
                    self.unacked.clear();
                    let sent_so_far = (next_seq - INITIAL_SEQ_NUM) as usize;
                    state = if sent_so_far == total {
                        State::AllPacketsSent
                    } else {
                        State::SendingPackets
                    };
                }

                State::AllPacketsSent => unreachable!("loop exits on AllPacketsSent"),
            }
        }

        info!(copies = EOT_COPIES, "data transfer complete, sending EOT burst");
        let eot = Frame::eot();
        for _ in 0..EOT_COPIES {
            self.send(&eot).await?;
        }

        let report = TransferReport {
            lines_sent: total,
            retransmit_batches,
            retransmitted_frames,
            final_window: self.window.size(),
            final_timeout: self.rto.timeout_interval(),
        };
        info!(
            lines = report.lines_sent,
            retransmit_batches = report.retransmit_batches,
            final_window = report.final_window,
            "terminating transmitter"
        );
        Ok(report)
    }

    fn record(&self, seq: u32) -> [u8; PAYLOAD_LEN] {
        self.records[(seq - INITIAL_SEQ_NUM) as usize]
    }

    fn on_datagram(&mut self, data: &[u8], burst_start: Instant) {
        let frame = match Frame::decode(data) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "discarding malformed inbound datagram");
                return;
            }
        };
        if frame.kind != FrameKind::Ack {
            warn!(kind = frame.kind.as_str(), "discarding unexpected frame kind");
            return;
        }

        if self.unacked.remove(frame.ack) {
            self.rto.sample(burst_start.elapsed());
            self.window.on_ack();
            info!(
                ack = frame.ack,
                window = self.window.size(),
                unacked = self.unacked.len(),
                "received ACK"
            );
        } else {
            debug!(ack = frame.ack, "duplicate or unknown ACK ignored");
        }
    }

    /// Re-send every in-flight frame in original send order.
    async fn retransmit_unacked(&mut self) -> Result<u64> {
        let seqs: Vec<u32> = self.unacked.iter().collect();
        let mut count = 0u64;
        for seq in seqs {
            let frame = Frame::data(seq, self.record(seq), self.window.size()).with_retransmit();
            self.send(&frame).await?;
            count += 1;
            info!(seq, "retransmitted DATA");
        }
        Ok(count)
    }

    async fn send(&self, frame: &Frame) -> Result<()> {
        let wire = frame.encode();
        let sent = self.socket.send_to(&wire, self.peer).await?;
        if sent != wire.len() {
            return Err(Error::ShortWrite { sent });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::pad_payload;
    use crate::protocol::MAX_WINDOW_SIZE;

    fn records(lines: &[&str]) -> Vec<[u8; PAYLOAD_LEN]> {
        lines
            .iter()
            .map(|l| pad_payload(l.as_bytes()).unwrap())
            .collect()
    }

    async fn loopback_pair() -> (Transmitter, UdpSocket, Vec<[u8; PAYLOAD_LEN]>) {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer_addr = peer.local_addr().unwrap();
        let recs = records(&["a\n", "b\n", "c\n"]);
        let config = TransmitterConfig::new("127.0.0.1:0".parse().unwrap(), peer_addr);
        let tx = Transmitter::bind(config, recs.clone()).await.unwrap();
        (tx, peer, recs)
    }

    #[tokio::test]
    async fn test_acked_transfer_sends_each_frame_once() {
        let (tx, peer, _) = loopback_pair().await;
        let tx_addr = tx.local_addr().unwrap();

        let driver = tokio::spawn(async move { tx.run().await.unwrap() });

        // Play the receiver: ACK every DATA frame, stop after the first EOT.
        let mut buf = [0u8; FRAME_WIRE_SIZE];
        let mut data_seqs = Vec::new();
        loop {
            let (len, from) = peer.recv_from(&mut buf).await.unwrap();
            assert_eq!(from, tx_addr);
            let frame = Frame::decode(&buf[..len]).unwrap();
            match frame.kind {
                FrameKind::Data => {
                    assert!(!frame.retransmit);
                    data_seqs.push(frame.seq);
                    let ack = Frame::ack(frame.seq, frame.window);
                    peer.send_to(&ack.encode(), from).await.unwrap();
                }
                FrameKind::Eot => break,
                FrameKind::Ack => panic!("transmitter sent an ACK"),
            }
        }

        let report = driver.await.unwrap();
        assert_eq!(data_seqs, vec![1, 2, 3]);
        assert_eq!(report.lines_sent, 3);
        assert_eq!(report.retransmit_batches, 0);
        assert!(report.final_window <= MAX_WINDOW_SIZE);
    }

    #[tokio::test]
    async fn test_window_opens_as_acks_arrive() {
        let (tx, peer, _) = loopback_pair().await;
        let driver = tokio::spawn(async move { tx.run().await.unwrap() });

        // First burst is exactly one frame wide (initial window), later
        // bursts widen by one per ACK.
        let mut buf = [0u8; FRAME_WIRE_SIZE];
        let mut windows = Vec::new();
        loop {
            let (len, from) = peer.recv_from(&mut buf).await.unwrap();
            let frame = Frame::decode(&buf[..len]).unwrap();
            match frame.kind {
                FrameKind::Data => {
                    windows.push(frame.window);
                    let ack = Frame::ack(frame.seq, frame.window);
                    peer.send_to(&ack.encode(), from).await.unwrap();
                }
                _ => break,
            }
        }
        driver.await.unwrap();

        assert_eq!(windows[0], 1);
        assert!(windows.windows(2).all(|w| w[1] >= w[0]));
    }

    #[tokio::test]
    async fn test_unacked_frames_are_retransmitted() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer_addr = peer.local_addr().unwrap();
        let config = TransmitterConfig::new("127.0.0.1:0".parse().unwrap(), peer_addr);
        let tx = Transmitter::bind(config, records(&["x\n"])).await.unwrap();

        let driver = tokio::spawn(async move { tx.run().await.unwrap() });

        // Withhold the first ACK; the initial 2 s timeout must fire and the
        // frame come back flagged as a retransmission.
        let mut buf = [0u8; FRAME_WIRE_SIZE];
        let (len, _) = peer.recv_from(&mut buf).await.unwrap();
        let first = Frame::decode(&buf[..len]).unwrap();
        assert!(!first.retransmit);

        let (len, from) = peer.recv_from(&mut buf).await.unwrap();
        let second = Frame::decode(&buf[..len]).unwrap();
        assert_eq!(second.seq, first.seq);
        assert!(second.retransmit);

        let ack = Frame::ack(second.seq, second.window);
        peer.send_to(&ack.encode(), from).await.unwrap();

        // Drain until EOT so the task can finish.
        loop {
            let (len, _) = peer.recv_from(&mut buf).await.unwrap();
            if Frame::decode(&buf[..len]).unwrap().kind == FrameKind::Eot {
                break;
            }
        }

        let report = driver.await.unwrap();
        assert!(report.retransmit_batches >= 1);
        assert_eq!(report.final_window, 1);
    }

    #[tokio::test]
    async fn test_empty_input_sends_only_eot() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer_addr = peer.local_addr().unwrap();
        let config = TransmitterConfig::new("127.0.0.1:0".parse().unwrap(), peer_addr);
        let tx = Transmitter::bind(config, Vec::new()).await.unwrap();

        let report = tx.run().await.unwrap();
        assert_eq!(report.lines_sent, 0);

        let mut buf = [0u8; FRAME_WIRE_SIZE];
        for _ in 0..EOT_COPIES {
            let (len, _) = peer.recv_from(&mut buf).await.unwrap();
            assert_eq!(Frame::decode(&buf[..len]).unwrap().kind, FrameKind::Eot);
        }
    }
}
