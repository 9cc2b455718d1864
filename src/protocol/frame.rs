//! Frame framing and serialization.
//!
//! Defines the single wire entity shared by all three peers.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::protocol::PAYLOAD_LEN;

/// Frame kinds on the wire.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Payload-carrying frame
    Data = 0,
    /// Acknowledgment of a single sequence number
    Ack = 1,
    /// End of transmission
    Eot = 2,
}

impl FrameKind {
    /// Human-readable name, as it appears in logs and trace exports.
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameKind::Data => "DATA",
            FrameKind::Ack => "ACK",
            FrameKind::Eot => "EOT",
        }
    }
}

impl TryFrom<u32> for FrameKind {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(FrameKind::Data),
            1 => Ok(FrameKind::Ack),
            2 => Ok(FrameKind::Eot),
            _ => Err(Error::InvalidFrame(format!("unknown frame kind: {}", value))),
        }
    }
}

/// Total wire size of a frame; any datagram of a different length is
/// malformed and discarded.
pub const FRAME_WIRE_SIZE: usize = 4 + 4 + PAYLOAD_LEN + 4 + 4 + 1;

/// A protocol frame.
///
/// Wire format, little-endian, densely packed:
///
/// ```text
/// ┌──────────────────────────────────────────────────────────────┐
/// │ Kind (4) │ Seq (4) │ Payload (256) │ Window (4) │ Ack (4)    │
/// ├──────────────────────────────────────────────────────────────┤
/// │ Retransmit (1)                                               │
/// └──────────────────────────────────────────────────────────────┘
/// ```
///
/// `seq` and `ack` start at 1; the value 0 means "absent".
#[derive(Clone)]
pub struct Frame {
    /// Frame kind
    pub kind: FrameKind,
    /// Sequence number of a DATA frame; 0 on ACK/EOT
    pub seq: u32,
    /// Payload record, NUL-padded; all zeroes on ACK/EOT
    pub payload: [u8; PAYLOAD_LEN],
    /// Transmitter-declared window at send time (informational)
    pub window: i32,
    /// Acknowledged sequence number on ACK frames; 0 otherwise
    pub ack: u32,
    /// Set on re-sent DATA frames; observability only
    pub retransmit: bool,
}

impl Frame {
    /// Create a DATA frame carrying one payload record.
    pub fn data(seq: u32, payload: [u8; PAYLOAD_LEN], window: i32) -> Self {
        Self {
            kind: FrameKind::Data,
            seq,
            payload,
            window,
            ack: 0,
            retransmit: false,
        }
    }

    /// Create an ACK frame for a received sequence number.
    pub fn ack(ack: u32, window: i32) -> Self {
        Self {
            kind: FrameKind::Ack,
            seq: 0,
            payload: [0u8; PAYLOAD_LEN],
            window,
            ack,
            retransmit: false,
        }
    }

    /// Create the end-of-transmission frame.
    pub fn eot() -> Self {
        Self {
            kind: FrameKind::Eot,
            seq: 0,
            payload: [0u8; PAYLOAD_LEN],
            window: 0,
            ack: 0,
            retransmit: false,
        }
    }

    /// Mark the frame as a retransmission.
    pub fn with_retransmit(mut self) -> Self {
        self.retransmit = true;
        self
    }

    /// Serialize the frame to its fixed wire representation.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(FRAME_WIRE_SIZE);

        buf.put_u32_le(self.kind as u32);
        buf.put_u32_le(self.seq);
        buf.put_slice(&self.payload);
        buf.put_i32_le(self.window);
        buf.put_u32_le(self.ack);
        buf.put_u8(self.retransmit as u8);

        buf.freeze()
    }

    /// Deserialize a frame from a received datagram.
    ///
    /// Rejects datagrams of the wrong size, unknown kinds, non-boolean
    /// retransmit octets, and kind-invariant violations.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() != FRAME_WIRE_SIZE {
            return Err(Error::FrameSize(data.len()));
        }

        let mut data = data;
        let kind = FrameKind::try_from(data.get_u32_le())?;
        let seq = data.get_u32_le();
        let mut payload = [0u8; PAYLOAD_LEN];
        data.copy_to_slice(&mut payload);
        let window = data.get_i32_le();
        let ack = data.get_u32_le();
        let retransmit = match data.get_u8() {
            0 => false,
            1 => true,
            other => {
                return Err(Error::InvalidFrame(format!(
                    "retransmit octet must be 0 or 1, got {}",
                    other
                )))
            }
        };

        let frame = Self {
            kind,
            seq,
            payload,
            window,
            ack,
            retransmit,
        };
        frame.check_invariants()?;
        Ok(frame)
    }

    /// The payload up to (and including) the newline terminator, with the
    /// NUL padding stripped.
    pub fn payload_line(&self) -> &[u8] {
        trim_record(&self.payload)
    }

    fn check_invariants(&self) -> Result<()> {
        match self.kind {
            FrameKind::Data => {
                if self.seq == 0 {
                    return Err(Error::InvalidFrame("DATA frame with seq 0".into()));
                }
                if self.ack != 0 {
                    return Err(Error::InvalidFrame(format!(
                        "DATA frame carries ack {}",
                        self.ack
                    )));
                }
            }
            FrameKind::Ack => {
                if self.ack == 0 {
                    return Err(Error::InvalidFrame("ACK frame with ack 0".into()));
                }
                if self.seq != 0 {
                    return Err(Error::InvalidFrame(format!(
                        "ACK frame carries seq {}",
                        self.seq
                    )));
                }
            }
            FrameKind::Eot => {
                if self.seq != 0 || self.ack != 0 || self.retransmit {
                    return Err(Error::InvalidFrame("EOT frame with non-zero fields".into()));
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("kind", &self.kind.as_str())
            .field("seq", &self.seq)
            .field("ack", &self.ack)
            .field("window", &self.window)
            .field("retransmit", &self.retransmit)
            .field(
                "payload",
                &String::from_utf8_lossy(self.payload_line()).trim_end(),
            )
            .finish()
    }
}

/// Strip the NUL padding from a payload record.
pub fn trim_record(payload: &[u8; PAYLOAD_LEN]) -> &[u8] {
    let end = payload.iter().position(|&b| b == 0).unwrap_or(PAYLOAD_LEN);
    &payload[..end]
}

/// Build a NUL-padded payload record from a line of text.
///
/// Returns `None` if the line does not fit the record.
pub fn pad_payload(line: &[u8]) -> Option<[u8; PAYLOAD_LEN]> {
    if line.len() > PAYLOAD_LEN {
        return None;
    }
    let mut payload = [0u8; PAYLOAD_LEN];
    payload[..line.len()].copy_from_slice(line);
    Some(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_encode_decode() {
        let payload = pad_payload(b"hello world\n").unwrap();
        let original = Frame::data(42, payload, 7).with_retransmit();

        let encoded = original.encode();
        assert_eq!(encoded.len(), FRAME_WIRE_SIZE);

        let decoded = Frame::decode(&encoded).unwrap();
        assert_eq!(decoded.kind, FrameKind::Data);
        assert_eq!(decoded.seq, 42);
        assert_eq!(decoded.window, 7);
        assert_eq!(decoded.ack, 0);
        assert!(decoded.retransmit);
        assert_eq!(decoded.payload_line(), b"hello world\n");
    }

    #[test]
    fn test_ack_frame() {
        let ack = Frame::ack(1000, 12);
        let decoded = Frame::decode(&ack.encode()).unwrap();

        assert_eq!(decoded.kind, FrameKind::Ack);
        assert_eq!(decoded.ack, 1000);
        assert_eq!(decoded.seq, 0);
        assert!(decoded.payload.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_eot_frame() {
        let decoded = Frame::decode(&Frame::eot().encode()).unwrap();
        assert_eq!(decoded.kind, FrameKind::Eot);
        assert_eq!(decoded.seq, 0);
        assert_eq!(decoded.ack, 0);
        assert!(!decoded.retransmit);
    }

    #[test]
    fn test_decode_wrong_size() {
        assert!(matches!(
            Frame::decode(&[0u8; 12]),
            Err(Error::FrameSize(12))
        ));
        assert!(matches!(
            Frame::decode(&[0u8; FRAME_WIRE_SIZE + 1]),
            Err(Error::FrameSize(_))
        ));
    }

    #[test]
    fn test_decode_unknown_kind() {
        let mut wire = Frame::eot().encode().to_vec();
        wire[0] = 9;
        assert!(matches!(
            Frame::decode(&wire),
            Err(Error::InvalidFrame(_))
        ));
    }

    #[test]
    fn test_decode_invariant_violations() {
        // DATA with seq 0
        let mut frame = Frame::data(1, [0u8; PAYLOAD_LEN], 1);
        frame.seq = 0;
        assert!(Frame::decode(&frame.encode()).is_err());

        // ACK with ack 0
        let mut frame = Frame::ack(1, 1);
        frame.ack = 0;
        assert!(Frame::decode(&frame.encode()).is_err());

        // EOT with a sequence number
        let mut frame = Frame::eot();
        frame.seq = 3;
        assert!(Frame::decode(&frame.encode()).is_err());
    }

    #[test]
    fn test_pad_payload_limits() {
        assert!(pad_payload(&[b'x'; PAYLOAD_LEN]).is_some());
        assert!(pad_payload(&[b'x'; PAYLOAD_LEN + 1]).is_none());

        let payload = pad_payload(b"a\n").unwrap();
        assert_eq!(&payload[..2], b"a\n");
        assert!(payload[2..].iter().all(|&b| b == 0));
    }
}
