//! In-order delivery engine.
//!
//! Every DATA frame is acknowledged the moment it arrives, before the next
//! receive, so ACKs cannot reorder relative to receipt. Delivery to the
//! line sink is strictly sequential: an in-order frame is flushed together
//! with any buffered successors it unblocks; everything else waits in the
//! reorder buffer. EOT terminates the session, and any holes still in the
//! buffer at that point are unrecoverable and reported as lost.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::protocol::frame::{trim_record, Frame, FrameKind, FRAME_WIRE_SIZE};
use crate::protocol::{INITIAL_SEQ_NUM, INITIAL_WINDOW_SIZE, PAYLOAD_LEN};
use crate::text::LineSink;

/// What became of one inbound DATA frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// In-order frame; it and `0..n-1` buffered successors were flushed.
    Delivered(usize),
    /// Out-of-order frame, held until the gap before it closes.
    Buffered,
    /// Below the delivery point; already flushed earlier.
    DuplicateDelivered,
    /// Copy of a frame already waiting in the buffer.
    DuplicateBuffered,
}

/// Reordering state between the socket and the line sink.
///
/// Pure data structure; the socket loop is a thin shell around it.
#[derive(Debug)]
pub struct ReorderBuffer {
    next_seq: u32,
    window_mirror: i32,
    buffer: BTreeMap<u32, [u8; PAYLOAD_LEN]>,
}

impl ReorderBuffer {
    /// Create a buffer expecting the first sequence number.
    pub fn new() -> Self {
        Self {
            next_seq: INITIAL_SEQ_NUM,
            window_mirror: INITIAL_WINDOW_SIZE,
            buffer: BTreeMap::new(),
        }
    }

    /// Process one DATA frame.
    ///
    /// Returns the disposition plus the payload records now deliverable in
    /// sequence order (empty unless the frame closed the gap at the front).
    pub fn accept(
        &mut self,
        seq: u32,
        payload: [u8; PAYLOAD_LEN],
        declared_window: i32,
    ) -> (Disposition, Vec<[u8; PAYLOAD_LEN]>) {
        self.window_mirror = declared_window;

        if seq < self.next_seq {
            return (Disposition::DuplicateDelivered, Vec::new());
        }

        if seq > self.next_seq {
            if self.buffer.contains_key(&seq) {
                return (Disposition::DuplicateBuffered, Vec::new());
            }
            self.buffer.insert(seq, payload);
            return (Disposition::Buffered, Vec::new());
        }

        // In-order: deliver it and drain the contiguous run behind it
        let mut delivered = vec![payload];
        self.next_seq += 1;
        while let Some(next) = self.buffer.remove(&self.next_seq) {
            delivered.push(next);
            self.next_seq += 1;
        }
        (Disposition::Delivered(delivered.len()), delivered)
    }

    /// Smallest sequence number not yet delivered.
    pub fn next_seq(&self) -> u32 {
        self.next_seq
    }

    /// Transmitter window as declared by the most recent DATA frame.
    pub fn window_mirror(&self) -> i32 {
        self.window_mirror
    }

    /// Number of out-of-order frames currently held.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Sequence numbers stranded behind holes; non-empty only after loss
    /// that was never repaired.
    pub fn stranded(&self) -> Vec<u32> {
        self.buffer.keys().copied().collect()
    }
}

impl Default for ReorderBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver runtime configuration.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Local bind address.
    pub bind: SocketAddr,
    /// The emulator's address; destination of every ACK.
    pub emulator: SocketAddr,
}

/// Summary of one completed reception.
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    /// Lines handed to the sink, in order, without gaps or duplicates.
    pub lines_delivered: usize,
    /// Duplicate DATA frames observed (both kinds).
    pub duplicate_frames: u64,
    /// Sequence numbers stranded in the buffer at EOT.
    pub lost: Vec<u32>,
}

/// The reassembling, acknowledging endpoint.
pub struct Receiver<S: LineSink> {
    socket: UdpSocket,
    emulator: SocketAddr,
    sink: S,
    reorder: ReorderBuffer,
}

impl<S: LineSink> Receiver<S> {
    /// Bind the receiver socket.
    pub async fn bind(config: ReceiverConfig, sink: S) -> Result<Self> {
        let socket = UdpSocket::bind(config.bind).await?;
        info!(bind = %config.bind, emulator = %config.emulator, "receiver ready");
        Ok(Self {
            socket,
            emulator: config.emulator,
            sink,
            reorder: ReorderBuffer::new(),
        })
    }

    /// Address the socket actually bound (useful with an ephemeral port).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Receive until EOT, acknowledging and persisting as frames arrive.
    pub async fn run(mut self) -> Result<DeliveryReport> {
        let mut buf = [0u8; FRAME_WIRE_SIZE + 1];
        let mut lines_delivered = 0usize;
        let mut duplicate_frames = 0u64;

        loop {
            let (len, from) = self.socket.recv_from(&mut buf).await?;
            let frame = match Frame::decode(&buf[..len]) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(error = %e, %from, "discarding malformed datagram");
                    continue;
                }
            };

            match frame.kind {
                FrameKind::Eot => {
                    info!("received EOT");
                    break;
                }
                FrameKind::Data => {
                    // ACK before anything else; duplicates are cheap and benign
                    let ack = Frame::ack(frame.seq, frame.window);
                    self.socket.send_to(&ack.encode(), self.emulator).await?;
                    debug!(ack = frame.seq, "sent ACK");

                    let (disposition, delivered) =
                        self.reorder.accept(frame.seq, frame.payload, frame.window);
                    match disposition {
                        Disposition::Delivered(n) => {
                            debug!(seq = frame.seq, flushed = n, "delivered in order");
                        }
                        Disposition::Buffered => {
                            debug!(
                                seq = frame.seq,
                                expected = self.reorder.next_seq(),
                                buffered = self.reorder.buffered(),
                                "buffered out-of-order frame"
                            );
                        }
                        Disposition::DuplicateDelivered | Disposition::DuplicateBuffered => {
                            duplicate_frames += 1;
                            debug!(seq = frame.seq, "duplicate DATA ignored");
                        }
                    }

                    for record in delivered {
                        self.sink.append(trim_record(&record))?;
                        lines_delivered += 1;
                    }
                }
                FrameKind::Ack => {
                    warn!(ack = frame.ack, "discarding unexpected ACK frame");
                }
            }
        }

        let lost = self.reorder.stranded();
        if lost.is_empty() {
            info!(lines = lines_delivered, "transfer complete");
        } else {
            warn!(
                lines = lines_delivered,
                holes = lost.len(),
                "EOT with stranded frames, data unrecoverably lost"
            );
        }

        Ok(DeliveryReport {
            lines_delivered,
            duplicate_frames,
            lost,
        })
    }
}
