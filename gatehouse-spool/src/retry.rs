//! Retry/backoff controller
//!
//! Decides whether a failed attempt is rescheduled and when. Only errors
//! flagged recoverable are eligible; the delay doubles per attempt up to a
//! ceiling, with a little jitter so a bank of gates does not hammer one
//! printer in lockstep.

use crate::types::JobError;
use rand::Rng;
use std::time::Duration;

/// Jitter applied to each delay, as a fraction of the computed value
const JITTER_FRACTION: f64 = 0.125;

/// Outcome of consulting the controller after a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Finalize the job as failed
    GiveUp,
    /// Re-admit after the given delay
    RetryAfter(Duration),
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
        }
    }

    /// Deterministic backoff for attempt `n` (1-based), before jitter:
    /// `base * 2^(n-1)` capped at `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(exp));
        delay.min(self.max_delay)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        let millis = delay.as_millis() as f64;
        let spread = millis * JITTER_FRACTION;
        let offset = rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_millis((millis + offset).max(0.0) as u64)
    }

    /// Consult the controller after attempt number `attempts` (already
    /// incremented) failed with `error`.
    pub fn decide(&self, error: &JobError, attempts: u32, max_attempts: u32) -> RetryDecision {
        if !error.recoverable {
            return RetryDecision::GiveUp;
        }
        if attempts >= max_attempts {
            return RetryDecision::GiveUp;
        }
        RetryDecision::RetryAfter(self.jittered(self.backoff(attempts)))
    }
}
