//! Reconnection backoff policy

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff: `base_delay * 2^attempt`, capped at `max_delay`,
/// giving up once `max_attempts` reconnects have been scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect (ms)
    pub base_delay_ms: u64,
    /// Upper bound for any single delay (ms)
    pub max_delay_ms: u64,
    /// Number of automatic reconnects before entering terminal `Closed`
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Delay to wait before reconnect attempt `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let ms = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(ms)
    }

    /// Whether another automatic reconnect may be scheduled
    pub fn allows(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
