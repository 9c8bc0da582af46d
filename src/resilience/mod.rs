//! Resilience primitives for the refresh path.
//!
//! # Data Flow
//! ```text
//! SessionGuard refresh flight:
//!     → circuit_breaker.rs (fail fast while open)
//!     → attempt with per-attempt timeout
//!     → On retryable failure: backoff.rs (exponential delay + jitter)
//!     → On exhausted attempts: circuit_breaker.rs records the failure
//! ```
//!
//! # Design Decisions
//! - Every external call has a deadline
//! - Authentication failures are never retried
//! - Breaker state is owned by the SessionGuard, not shared globally

pub mod backoff;
pub mod circuit_breaker;

pub use backoff::Backoff;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerState};
