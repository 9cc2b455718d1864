//! Bidirectional store-and-forward network emulator.
//!
//! Sits between the transmitter and the receiver as the next hop for both,
//! re-addressing each datagram to the opposite peer based on its source
//! address alone. Two runtime knobs shape the path: a per-hop delay and an
//! independent per-packet drop probability. Both can be changed mid-flight
//! from the operator surface and take effect on the next datagram.
//!
//! The engine owns all of its state — socket, peers, knobs, counters,
//! trace, RNG — and exposes it only through accessors; the operator surface
//! (a stdin command loop in the `netem` binary) is a thin adapter on top.
//!
//! Delay is applied inline, so a datagram inside its delay window blocks
//! the one behind it (head-of-line). At sub-20-packet windows this is
//! acceptable and keeps per-direction FIFO trivially intact.

pub mod trace;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::net::UdpSocket;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::protocol::frame::{Frame, FrameKind, FRAME_WIRE_SIZE};

pub use trace::{PacketTrace, TracePoint};

/// Upper bound on the configurable per-hop delay.
pub const MAX_DELAY_MS: u64 = 2000;

/// Runtime knobs, mutated by the operator surface and read once per
/// datagram by the relay loop.
#[derive(Debug)]
pub struct EmulatorKnobs {
    delay_ms: AtomicU64,
    loss_percent: AtomicU32,
    paused: AtomicBool,
}

impl EmulatorKnobs {
    fn new(delay_ms: u64, loss_percent: u32) -> Self {
        Self {
            delay_ms: AtomicU64::new(delay_ms.min(MAX_DELAY_MS)),
            loss_percent: AtomicU32::new(loss_percent.min(100)),
            paused: AtomicBool::new(false),
        }
    }

    /// Current per-hop delay in milliseconds.
    pub fn delay_ms(&self) -> u64 {
        self.delay_ms.load(Ordering::Relaxed)
    }

    /// Set the per-hop delay, clamped to `[0, MAX_DELAY_MS]`.
    pub fn set_delay_ms(&self, ms: u64) {
        self.delay_ms.store(ms.min(MAX_DELAY_MS), Ordering::Relaxed);
    }

    /// Current drop probability in percent.
    pub fn loss_percent(&self) -> u32 {
        self.loss_percent.load(Ordering::Relaxed)
    }

    /// Set the drop probability, clamped to `[0, 100]`.
    pub fn set_loss_percent(&self, percent: u32) {
        self.loss_percent.store(percent.min(100), Ordering::Relaxed);
    }

    /// Whether the relay is paused (datagrams silently discarded).
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    /// Pause the relay.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
    }

    /// Resume the relay.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
    }

    /// Restore both knobs to zero and resume.
    pub fn reset(&self) {
        self.set_delay_ms(0);
        self.set_loss_percent(0);
        self.resume();
    }
}

/// Relay counters; all atomic, snapshot-able at any time.
#[derive(Debug, Default)]
pub struct EmulatorCounters {
    packets_seen: AtomicU64,
    packets_dropped: AtomicU64,
    retransmits: AtomicU64,
    malformed: AtomicU64,
    unknown_source: AtomicU64,
}

impl EmulatorCounters {
    /// Total packets accepted from either peer (dropped ones included).
    pub fn packets_seen(&self) -> u64 {
        self.packets_seen.load(Ordering::Relaxed)
    }

    /// Packets discarded by the loss draw.
    pub fn packets_dropped(&self) -> u64 {
        self.packets_dropped.load(Ordering::Relaxed)
    }

    /// DATA frames from the transmitter carrying the retransmit flag.
    pub fn retransmits(&self) -> u64 {
        self.retransmits.load(Ordering::Relaxed)
    }

    /// Datagrams rejected for size or shape.
    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    /// Datagrams from neither configured peer.
    pub fn unknown_source(&self) -> u64 {
        self.unknown_source.load(Ordering::Relaxed)
    }

    /// Format all counters as a text report for the `stats` command.
    pub fn format_report(&self) -> String {
        format!(
            r#"Network Emulator Statistics
===========================
Packets seen:       {}
Packets dropped:    {}
Retransmits (DATA): {}
Malformed:          {}
Unknown source:     {}
"#,
            self.packets_seen(),
            self.packets_dropped(),
            self.retransmits(),
            self.malformed(),
            self.unknown_source(),
        )
    }

    /// Zero every counter.
    pub fn reset(&self) {
        self.packets_seen.store(0, Ordering::Relaxed);
        self.packets_dropped.store(0, Ordering::Relaxed);
        self.retransmits.store(0, Ordering::Relaxed);
        self.malformed.store(0, Ordering::Relaxed);
        self.unknown_source.store(0, Ordering::Relaxed);
    }
}

/// Emulator runtime configuration.
#[derive(Debug, Clone)]
pub struct EmulatorConfig {
    /// Local bind address; both peers address their datagrams here.
    pub bind: SocketAddr,
    /// The transmitter's `(addr, port)`; source filter and ACK destination.
    pub transmitter: SocketAddr,
    /// The receiver's `(addr, port)`; source filter and DATA destination.
    pub receiver: SocketAddr,
    /// Initial per-hop delay.
    pub delay_ms: u64,
    /// Initial drop probability in percent.
    pub loss_percent: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    ToReceiver,
    ToTransmitter,
}

/// The store-and-forward relay engine.
pub struct Emulator {
    socket: UdpSocket,
    transmitter: SocketAddr,
    receiver: SocketAddr,
    knobs: Arc<EmulatorKnobs>,
    counters: Arc<EmulatorCounters>,
    trace: Arc<Mutex<PacketTrace>>,
    rng: StdRng,
}

impl Emulator {
    /// Bind the relay socket.
    pub async fn bind(config: EmulatorConfig) -> Result<Self> {
        let socket = UdpSocket::bind(config.bind).await?;
        info!(
            bind = %config.bind,
            transmitter = %config.transmitter,
            receiver = %config.receiver,
            delay_ms = config.delay_ms,
            loss_percent = config.loss_percent,
            "network emulator ready"
        );
        Ok(Self {
            socket,
            transmitter: config.transmitter,
            receiver: config.receiver,
            knobs: Arc::new(EmulatorKnobs::new(config.delay_ms, config.loss_percent)),
            counters: Arc::new(EmulatorCounters::default()),
            trace: Arc::new(Mutex::new(PacketTrace::new())),
            rng: StdRng::from_entropy(),
        })
    }

    /// Replace the loss RNG with a seeded one for deterministic runs.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Handle to the runtime knobs, for the operator surface.
    pub fn knobs(&self) -> Arc<EmulatorKnobs> {
        self.knobs.clone()
    }

    /// Handle to the counters, for the operator surface.
    pub fn counters(&self) -> Arc<EmulatorCounters> {
        self.counters.clone()
    }

    /// Handle to the packet trace, for the operator surface.
    pub fn trace(&self) -> Arc<Mutex<PacketTrace>> {
        self.trace.clone()
    }

    /// Address the socket actually bound (useful with an ephemeral port).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Relay datagrams until the task is dropped.
    pub async fn run(mut self) -> Result<()> {
        let mut buf = [0u8; FRAME_WIRE_SIZE + 1];
        loop {
            self.process_one(&mut buf).await?;
        }
    }

    /// Read one datagram and push it through the pipeline:
    /// pause gate → source filter → validation → delay → loss draw → forward.
    async fn process_one(&mut self, buf: &mut [u8]) -> Result<()> {
        let (len, from) = self.socket.recv_from(buf).await?;

        if self.knobs.is_paused() {
            return Ok(());
        }

        let direction = if from == self.transmitter {
            Direction::ToReceiver
        } else if from == self.receiver {
            Direction::ToTransmitter
        } else {
            self.counters.unknown_source.fetch_add(1, Ordering::Relaxed);
            warn!(%from, "discarding datagram from unknown source");
            return Ok(());
        };

        let frame = match Frame::decode(&buf[..len]) {
            Ok(frame) => frame,
            Err(e) => {
                self.counters.malformed.fetch_add(1, Ordering::Relaxed);
                warn!(%from, len, error = %e, "discarding malformed datagram");
                return Ok(());
            }
        };

        self.counters.packets_seen.fetch_add(1, Ordering::Relaxed);
        if direction == Direction::ToReceiver
            && frame.kind == FrameKind::Data
            && frame.retransmit
        {
            self.counters.retransmits.fetch_add(1, Ordering::Relaxed);
        }

        let delay_ms = self.knobs.delay_ms();
        if delay_ms > 0 {
            sleep(Duration::from_millis(delay_ms)).await;
        }

        let dropped = self.draw_drop();
        if direction == Direction::ToReceiver && frame.kind == FrameKind::Data {
            self.trace.lock().record(frame.seq, dropped);
        }

        if dropped {
            self.counters.packets_dropped.fetch_add(1, Ordering::Relaxed);
            info!(
                kind = frame.kind.as_str(),
                seq = frame.seq,
                ack = frame.ack,
                "DROPPED"
            );
            return Ok(());
        }

        let dest = match direction {
            Direction::ToReceiver => self.receiver,
            Direction::ToTransmitter => self.transmitter,
        };
        let sent = self.socket.send_to(&buf[..len], dest).await?;
        if sent != len {
            return Err(Error::ShortWrite { sent });
        }
        debug!(
            kind = frame.kind.as_str(),
            seq = frame.seq,
            ack = frame.ack,
            %dest,
            "relayed"
        );
        Ok(())
    }

    /// One loss decision: uniform draw in `[1, 100]`, drop iff the
    /// configured probability is at least the draw. 0 never drops, 100
    /// always drops, 1 drops exactly on a draw of 1.
    fn draw_drop(&mut self) -> bool {
        let probability = self.knobs.loss_percent();
        probability >= self.rng.gen_range(1..=100)
    }
}
