//! Window accounting: in-flight sequence tracking and the AIMD policy.

use std::collections::VecDeque;

use crate::protocol::{INITIAL_WINDOW_SIZE, MAX_WINDOW_SIZE};

/// Insertion-ordered set of sequence numbers sent but not yet acknowledged.
///
/// Order equals send order, which is also retransmission order. Size is
/// bounded by the window, so linear scans stay cheap.
#[derive(Debug, Default)]
pub struct UnackedSet {
    seqs: VecDeque<u32>,
}

impl UnackedSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly sent sequence number.
    pub fn push(&mut self, seq: u32) {
        debug_assert!(!self.contains(seq), "seq {} tracked twice", seq);
        self.seqs.push_back(seq);
    }

    /// Remove an acknowledged sequence number.
    ///
    /// Returns `true` if the number was in flight; duplicate and unknown
    /// ACKs return `false` and leave the set untouched.
    pub fn remove(&mut self, seq: u32) -> bool {
        match self.seqs.iter().position(|&s| s == seq) {
            Some(idx) => {
                self.seqs.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Whether a sequence number is currently in flight.
    pub fn contains(&self, seq: u32) -> bool {
        self.seqs.contains(&seq)
    }

    /// Number of frames in flight.
    pub fn len(&self) -> usize {
        self.seqs.len()
    }

    /// Whether everything sent so far has been acknowledged.
    pub fn is_empty(&self) -> bool {
        self.seqs.is_empty()
    }

    /// In-flight sequence numbers in send order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.seqs.iter().copied()
    }

    /// Drop all tracked sequence numbers.
    pub fn clear(&mut self) {
        self.seqs.clear();
    }
}

/// Additive-increase / multiplicative-decrease send window.
///
/// Grows by one per acknowledged frame up to [`MAX_WINDOW_SIZE`], halves on
/// each timeout with a floor of 1. There is no slow-start phase and the
/// window is never reset to its initial value.
#[derive(Debug, Clone, Copy)]
pub struct CongestionWindow {
    size: i32,
}

impl CongestionWindow {
    /// Create a window at the initial size.
    pub fn new() -> Self {
        Self {
            size: INITIAL_WINDOW_SIZE,
        }
    }

    /// Current window size; always in `1..=MAX_WINDOW_SIZE`.
    pub fn size(&self) -> i32 {
        self.size
    }

    /// Grow by one on a matched ACK.
    pub fn on_ack(&mut self) {
        if self.size != MAX_WINDOW_SIZE {
            self.size += 1;
        }
    }

    /// Halve on a timeout, floor 1.
    pub fn on_timeout(&mut self) {
        self.size = (self.size / 2).max(1);
    }
}

impl Default for CongestionWindow {
    fn default() -> Self {
        Self::new()
    }
}
