//! Adaptive retransmission timeout estimation.
//!
//! Jacobson/Karels EWMA smoothing over round-trip samples:
//!
//! ```text
//! estimated_rtt = (1 - ALPHA) * estimated_rtt + ALPHA * sample
//! dev_rtt       = (1 - BETA)  * dev_rtt      + BETA  * |sample - estimated_rtt|
//! timeout       = min(MAX_TIMEOUT_INTERVAL, estimated_rtt + 4 * dev_rtt)
//! ```
//!
//! The estimator is fed on every matched ACK *and* on every timeout event,
//! using the time elapsed since the last burst start in both cases. Feeding
//! the timeout sample inflates the estimate (the true round trip is unknown
//! at that point), which backs the timer off under sustained loss.

use std::time::Duration;

/// EWMA weight of a new sample in the smoothed RTT.
pub const ALPHA: f64 = 0.125;

/// EWMA weight of a new deviation sample.
pub const BETA: f64 = 0.25;

/// Ceiling on the timeout interval, in milliseconds.
pub const MAX_TIMEOUT_INTERVAL_MS: u64 = 5000;

/// Smoothed RTT at session start, in milliseconds.
pub const DEFAULT_ESTIMATED_RTT_MS: f64 = 1000.0;

/// RTT deviation at session start, in milliseconds.
pub const DEFAULT_DEV_RTT_MS: f64 = 250.0;

/// Round-trip estimator driving the retransmission timer.
#[derive(Debug, Clone)]
pub struct RtoEstimator {
    estimated_rtt_ms: f64,
    dev_rtt_ms: f64,
    timeout_interval_ms: u64,
}

impl RtoEstimator {
    /// Create an estimator with the protocol's initial values.
    pub fn new() -> Self {
        let mut est = Self {
            estimated_rtt_ms: DEFAULT_ESTIMATED_RTT_MS,
            dev_rtt_ms: DEFAULT_DEV_RTT_MS,
            timeout_interval_ms: 0,
        };
        est.recompute();
        est
    }

    /// Feed one round-trip sample and recompute the timeout interval.
    pub fn sample(&mut self, rtt: Duration) {
        let sample_ms = rtt.as_secs_f64() * 1000.0;
        self.estimated_rtt_ms = (1.0 - ALPHA) * self.estimated_rtt_ms + ALPHA * sample_ms;
        self.dev_rtt_ms = (1.0 - BETA) * self.dev_rtt_ms
            + BETA * (sample_ms - self.estimated_rtt_ms).abs();
        self.recompute();
    }

    /// Current retransmission deadline.
    pub fn timeout_interval(&self) -> Duration {
        Duration::from_millis(self.timeout_interval_ms)
    }

    /// Smoothed round-trip estimate in milliseconds.
    pub fn estimated_rtt_ms(&self) -> f64 {
        self.estimated_rtt_ms
    }

    /// Current deviation estimate in milliseconds.
    pub fn dev_rtt_ms(&self) -> f64 {
        self.dev_rtt_ms
    }

    fn recompute(&mut self) {
        let raw = self.estimated_rtt_ms + 4.0 * self.dev_rtt_ms;
        self.timeout_interval_ms = (raw as u64).min(MAX_TIMEOUT_INTERVAL_MS);
    }
}

impl Default for RtoEstimator {
    fn default() -> Self {
        Self::new()
    }
}
