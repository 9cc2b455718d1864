//! Protocol core: wire format, timeout estimation, window accounting.
//!
//! Everything in this module is pure state manipulation — no sockets, no
//! clocks other than caller-supplied durations — so the reliability
//! machinery is testable without any network in the loop.

pub mod frame;
pub mod rto;
pub mod window;

pub use frame::{Frame, FrameKind, FRAME_WIRE_SIZE};
pub use rto::RtoEstimator;
pub use window::{CongestionWindow, UnackedSet};

/// Payload record size in bytes; one text line, NUL-padded.
pub const PAYLOAD_LEN: usize = 256;

/// Window size at session start.
pub const INITIAL_WINDOW_SIZE: i32 = 1;

/// Hard ceiling on the send window.
pub const MAX_WINDOW_SIZE: i32 = 20;

/// First sequence number of a session; 0 is reserved to mean "absent".
pub const INITIAL_SEQ_NUM: u32 = 1;

/// Default UDP port the transmitter binds.
pub const TRANSMITTER_PORT: u16 = 50000;

/// Default UDP port the network emulator binds.
pub const NETWORK_EMULATOR_PORT: u16 = 50001;

/// Default UDP port the receiver binds.
pub const RECEIVER_PORT: u16 = 50002;

/// Copies of the EOT frame sent to push it through a lossy path.
pub const EOT_COPIES: usize = 10;
