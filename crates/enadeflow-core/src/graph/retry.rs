//! Retry policy: decides backoff delays.

use rand::Rng;
use std::time::Duration;

/// Retry policy for failed task attempts.
///
/// `max_attempts` counts *additional* attempts after the first; a task with
/// `max_attempts = 2` may execute three times in total before failing.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Additional attempts allowed after the first.
    pub max_attempts: u32,

    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Backoff multiplier applied per attempt.
    pub multiplier: f64,

    /// Random spread as a fraction of the computed delay (0.0 = none).
    pub jitter: f64,
}

impl RetryPolicy {
    /// No retries: the first failure is final.
    pub fn none() -> Self {
        Self {
            max_attempts: 0,
            base_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter: 0.0,
        }
    }

    /// Fixed backoff: the same delay before every retry.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            multiplier: 1.0,
            jitter: 0.0,
        }
    }

    /// Exponential backoff with a small jitter to spread concurrent retries.
    pub fn exponential(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            multiplier: 2.0,
            jitter: 0.1,
        }
    }

    /// Delay before the next retry, given the number of attempts already made
    /// (1-indexed: pass 1 after the first failure).
    ///
    /// delay = base_delay * multiplier^(attempts - 1), then +/- jitter.
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let base_secs = self.base_delay.as_secs_f64();
        let mut delay_secs = base_secs * self.multiplier.powi(attempts.saturating_sub(1) as i32);
        if self.jitter > 0.0 {
            let spread = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
            delay_secs *= 1.0 + spread;
        }
        Duration::from_secs_f64(delay_secs.max(0.0))
    }
}
