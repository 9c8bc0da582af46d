//! Circuit breaker guarding the token-refresh endpoint.
//!
//! # States
//! - Closed: refresh flights are allowed
//! - Open: every credential request fails fast with `ServiceUnavailable`
//!
//! # State Transitions
//! ```text
//! Closed → Open:   consecutive_failures reaches max_failures
//! Open → Closed:   first check observing now >= open_until (counter reset)
//! any → Closed:    a successful refresh (counter reset)
//! ```
//!
//! There is no half-open probe: once the cool-down has elapsed traffic
//! resumes in full.

use serde::Serialize;

/// Observable breaker state.
///
/// `open_until.is_some()` implies `consecutive_failures >= max_failures`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CircuitBreakerState {
    pub consecutive_failures: u32,
    pub open_until: Option<u64>,
}

/// Failure counter with an elapsed-time cool-down.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: CircuitBreakerState,
    max_failures: u32,
    cool_down_secs: u64,
}

impl CircuitBreaker {
    pub fn new(max_failures: u32, cool_down_secs: u64) -> Self {
        Self {
            state: CircuitBreakerState::default(),
            max_failures: max_failures.max(1),
            cool_down_secs,
        }
    }

    /// Check whether a call may proceed at `now`.
    ///
    /// Returns `Err(retry_after_secs)` while open. Closes the breaker the first
    /// time the cool-down is observed to have elapsed.
    pub fn check(&mut self, now: u64) -> Result<(), u64> {
        match self.state.open_until {
            Some(until) if now < until => Err(until - now),
            Some(_) => {
                tracing::info!(
                    failures = self.state.consecutive_failures,
                    "Circuit breaker cool-down elapsed, closing"
                );
                self.state = CircuitBreakerState::default();
                Ok(())
            }
            None => Ok(()),
        }
    }

    pub fn record_success(&mut self) {
        self.state = CircuitBreakerState::default();
    }

    /// Record a terminal failure. Returns true if this failure tripped the
    /// breaker open.
    pub fn record_failure(&mut self, now: u64) -> bool {
        self.state.consecutive_failures = self.state.consecutive_failures.saturating_add(1);

        if self.state.open_until.is_none() && self.state.consecutive_failures >= self.max_failures {
            let until = now.saturating_add(self.cool_down_secs);
            self.state.open_until = Some(until);
            tracing::warn!(
                failures = self.state.consecutive_failures,
                open_until = until,
                "Circuit breaker opened"
            );
            return true;
        }
        false
    }

    pub fn reset(&mut self) {
        self.state = CircuitBreakerState::default();
    }

    pub fn state(&self) -> CircuitBreakerState {
        self.state
    }

    pub fn is_open(&self, now: u64) -> bool {
        matches!(self.state.open_until, Some(until) if now < until)
    }
}
