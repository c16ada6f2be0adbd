use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing and threshold knobs for a call session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// How many times a failed transport start is retried.
    /// Default: 3
    pub max_start_retries: u32,

    /// Backoff for retry `n` is `min(retry_base_delay * 2^n, retry_max_delay)`.
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,

    /// Cadence of the idle check while a call is active.
    pub idle_poll_interval: Duration,

    /// Idle time after which the user is warned once.
    pub idle_warn_after: Duration,

    /// Idle time after which the call is ended.
    pub idle_disconnect_after: Duration,

    /// Calls that end sooner than this after `call-start` are treated as failures.
    pub min_call_duration: Duration,

    /// Delay before the single automatic retry after a transient network error.
    pub reconnect_delay: Duration,

    /// Heartbeat for transcript checkpoints while an interview is active.
    pub checkpoint_interval: Duration,

    /// Fewest turns a transcript needs before feedback is generated.
    pub min_feedback_turns: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_start_retries: 3,
            retry_base_delay: Duration::from_millis(1000),
            retry_max_delay: Duration::from_millis(5000),
            idle_poll_interval: Duration::from_secs(5),
            idle_warn_after: Duration::from_secs(45),
            idle_disconnect_after: Duration::from_secs(60),
            min_call_duration: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(3),
            checkpoint_interval: Duration::from_secs(30),
            min_feedback_turns: 3,
        }
    }
}

impl SessionConfig {
    /// Backoff before retry number `attempt` (1-based).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let multiplier = 1u32 << attempt.min(16);
        self.retry_base_delay
            .saturating_mul(multiplier)
            .min(self.retry_max_delay)
    }
}
