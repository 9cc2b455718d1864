//! Error types for the RDFT protocol.

use std::net::SocketAddr;

use thiserror::Error;

use crate::protocol::frame::FRAME_WIRE_SIZE;

/// Result type alias for RDFT operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while transferring, receiving, or relaying frames.
#[derive(Error, Debug)]
pub enum Error {
    /// Startup configuration problem (bad host, unreadable input, ...)
    #[error("configuration error: {0}")]
    Config(String),

    /// Network I/O error (socket creation, bind, send, receive)
    #[error("network error: {0}")]
    Network(#[from] std::io::Error),

    /// A datagram write forwarded fewer bytes than the frame size
    #[error("short write: sent {sent} of {FRAME_WIRE_SIZE} bytes")]
    ShortWrite {
        /// Bytes actually handed to the socket
        sent: usize,
    },

    /// Datagram of a size other than the fixed frame size
    #[error("malformed datagram: expected {FRAME_WIRE_SIZE} bytes, got {0}")]
    FrameSize(usize),

    /// Frame decoded but violates the invariants of its kind
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// Datagram from an address that is neither configured peer
    #[error("unknown source address: {0}")]
    UnknownSource(SocketAddr),

    /// Input line too long to fit a payload record
    #[error("line {line} exceeds payload capacity ({len} > {max} bytes)")]
    LineTooLong {
        /// 1-based line number in the input
        line: usize,
        /// Observed byte length including the newline
        len: usize,
        /// Maximum record size
        max: usize,
    },
}

impl Error {
    /// Create a new configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Whether this error should terminate the process.
    ///
    /// Malformed frames and unknown sources are logged and the offending
    /// datagram discarded; everything else surfaces to the top level.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::FrameSize(_) | Error::InvalidFrame(_) | Error::UnknownSource(_)
        )
    }
}
