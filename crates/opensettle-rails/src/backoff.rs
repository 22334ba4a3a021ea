//! Exponential backoff with jitter.
//!
//! Shared by the rail bridge and the webhook dispatcher: delay doubles
//! per attempt, a random jitter of up to 25% is added to avoid
//! synchronized retries, and the whole thing is capped.

use std::time::Duration;

use rand::Rng;

/// A capped exponential backoff schedule.
#[derive(Debug, Clone, Copy)]
pub struct BackoffSchedule {
    base: Duration,
    cap: Duration,
}

impl BackoffSchedule {
    #[must_use]
    pub fn new(base_ms: u64, cap_ms: u64) -> Self {
        Self {
            base: Duration::from_millis(base_ms.max(1)),
            cap: Duration::from_millis(cap_ms.max(1)),
        }
    }

    /// Delay before the retry following attempt `attempt` (1-based).
    ///
    /// `base * 2^(attempt-1)`, plus up to 25% jitter, capped.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let raw = self
            .base
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.cap);

        let jitter_ms = rand::thread_rng().gen_range(0..=raw.as_millis() as u64 / 4);
        (raw + Duration::from_millis(jitter_ms)).min(self.cap)
    }
}
