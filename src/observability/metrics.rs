//! Metrics recording.
//!
//! # Metrics
//! - `session_refresh_attempts_total` (counter): refresh attempts by outcome
//! - `session_refresh_flights_total` (counter): completed flights by result
//! - `session_breaker_trips_total` (counter): breaker transitions to open
//! - `router_requests_total` (counter): settled requests by final state
//! - `router_pending_requests` (gauge): requests currently awaiting settlement
//! - `router_dropped_events_total` (counter): events arriving after settlement
//!
//! Recording goes through the `metrics` facade; without an installed recorder
//! these calls are no-ops.

use metrics::{counter, gauge};

pub fn record_refresh_attempt(outcome: &'static str) {
    counter!("session_refresh_attempts_total", "outcome" => outcome).increment(1);
}

pub fn record_refresh_flight(result: &'static str) {
    counter!("session_refresh_flights_total", "result" => result).increment(1);
}

pub fn record_breaker_trip() {
    counter!("session_breaker_trips_total").increment(1);
}

pub fn record_settlement(state: &'static str) {
    counter!("router_requests_total", "state" => state).increment(1);
}

pub fn record_pending(count: usize) {
    gauge!("router_pending_requests").set(count as f64);
}

pub fn record_dropped_event(event: &'static str) {
    counter!("router_dropped_events_total", "event" => event).increment(1);
}
