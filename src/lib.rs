//! # Reliable Datagram File Transfer (RDFT)
//!
//! A small but complete reliable transport built on top of unreliable UDP
//! datagrams, exercised through an in-path network emulator.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────┐   DATA/EOT   ┌─────────────┐   DATA/EOT   ┌─────────────┐
//! │ Transmitter │ ───────────▶ │  Emulator   │ ───────────▶ │  Receiver   │
//! │  (sliding   │              │ (delay +    │              │  (reorder + │
//! │   window)   │ ◀─────────── │  loss)      │ ◀─────────── │   persist)  │
//! └─────────────┘     ACK      └─────────────┘     ACK      └─────────────┘
//! ```
//!
//! The transmitter drives a sliding window of fixed-size DATA frames with an
//! adaptive retransmission timeout derived from EWMA round-trip estimation.
//! The receiver acknowledges every DATA frame, buffers out-of-order arrivals,
//! and flushes contiguous runs to its output in strict sequence order. The
//! emulator sits between them as the next-hop for both peers, applying a
//! configurable per-hop delay and an independent per-packet drop probability.
//!
//! ## Design Goals
//!
//! 1. **Exactly-once, in-order delivery** to the receiver's output for any
//!    drop probability below 100%
//! 2. **Loss recovery purely from timer expiry** — selective retransmission
//!    of the unacknowledged window, no fast retransmit
//! 3. **Observability**: every send, ACK, retransmit, and drop is logged;
//!    the emulator keeps counters and a time-sequence trace

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod config;
pub mod emulator;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod receiver;
pub mod text;
pub mod transmitter;

pub use error::{Error, Result};
