//! Latency model
//!
//! A plain value object describing how long submissions and
//! cancellations stay inflight before the engine acts on them. Zero
//! delay means the command takes effect within the same call.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyModel {
    pub submit_delay_ms: i64,
    pub cancel_delay_ms: i64,
}

impl LatencyModel {
    pub fn new(submit_delay_ms: i64, cancel_delay_ms: i64) -> Self {
        Self {
            submit_delay_ms: submit_delay_ms.max(0),
            cancel_delay_ms: cancel_delay_ms.max(0),
        }
    }

    /// No simulated latency.
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_zero_submit(&self) -> bool {
        self.submit_delay_ms == 0
    }

    /// Absolute due time for a submission arriving at `now`.
    pub fn submit_due(&self, now: i64) -> i64 {
        now + self.submit_delay_ms
    }

    /// Absolute due time for a cancel arriving at `now`.
    pub fn cancel_due(&self, now: i64) -> i64 {
        now + self.cancel_delay_ms
    }
}
