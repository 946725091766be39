//! Exponential-backoff reconnection scheduler.
//!
//! Counts consecutive reconnection attempts and computes the delay before
//! each one:
//!
//! ```text
//! delay(k) = min(base * 2^(k - 1), cap)      k = 1, 2, ...
//! ```
//!
//! The counter resets whenever a connection opens, so only consecutive
//! failures count towards the limit.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

// ============================================================================
// ReconnectDecision
// ============================================================================

/// Outcome of asking for the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Attempt `attempt` should run after `delay`.
    Scheduled {
        /// 1-based attempt number.
        attempt: u32,
        /// Backoff before the attempt.
        delay: Duration,
    },
    /// The attempt limit was reached.
    Exhausted {
        /// Number of attempts made.
        attempts: u32,
    },
}

// ============================================================================
// Delay Calculation
// ============================================================================

/// Returns the backoff before attempt `attempt` (1-based).
///
/// Saturates instead of overflowing for large attempt numbers.
#[must_use]
pub fn delay_for_attempt(base: Duration, cap: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1);
    let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(cap)
}

// ============================================================================
// ReconnectionScheduler
// ============================================================================

/// Attempt counter and backoff timer for one adapter.
#[derive(Debug)]
pub struct ReconnectionScheduler {
    /// Delay before the first attempt.
    base: Duration,
    /// Upper bound for any delay.
    cap: Duration,
    /// Attempts allowed before giving up.
    max_attempts: u32,
    /// Attempts scheduled since the last successful open.
    attempts: u32,
    /// Set once the limit was reported.
    exhausted: bool,
    /// Pending backoff task.
    timer: Option<JoinHandle<()>>,
}

impl ReconnectionScheduler {
    /// Creates a scheduler with no attempts made.
    #[must_use]
    pub fn new(base: Duration, cap: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            cap,
            max_attempts,
            attempts: 0,
            exhausted: false,
            timer: None,
        }
    }

    /// Advances the counter and returns what should happen next.
    ///
    /// Once exhausted, further calls keep returning
    /// [`ReconnectDecision::Exhausted`] without changing the counter.
    pub fn next_attempt(&mut self) -> ReconnectDecision {
        if self.attempts >= self.max_attempts {
            self.exhausted = true;
            return ReconnectDecision::Exhausted {
                attempts: self.attempts,
            };
        }

        self.attempts += 1;
        let delay = delay_for_attempt(self.base, self.cap, self.attempts);
        debug!(
            attempt = self.attempts,
            max_attempts = self.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "Reconnection scheduled"
        );
        ReconnectDecision::Scheduled {
            attempt: self.attempts,
            delay,
        }
    }

    /// Registers the backoff task, aborting any previous one.
    pub fn set_timer(&mut self, timer: JoinHandle<()>) {
        if let Some(previous) = self.timer.replace(timer) {
            previous.abort();
        }
    }

    /// Marks the backoff timer as fired.
    ///
    /// Called from the timer task itself, so the handle is only dropped.
    pub fn fired(&mut self) {
        self.timer = None;
    }

    /// Aborts a pending backoff timer.
    ///
    /// Returns `true` if one was pending.
    pub fn cancel(&mut self) -> bool {
        match self.timer.take() {
            Some(timer) => {
                timer.abort();
                true
            }
            None => false,
        }
    }

    /// Cancels the timer and resets the counter.
    pub fn reset(&mut self) {
        self.cancel();
        self.attempts = 0;
        self.exhausted = false;
    }

    /// Returns attempts scheduled since the last successful open.
    #[inline]
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Returns `true` once the limit has been reached and reported.
    #[inline]
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Returns `true` while a backoff timer is pending.
    #[inline]
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.timer.is_some()
    }
}

impl Drop for ReconnectionScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

// ============================================================================
// Tests
// ============================================================================
