//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! SessionGuard / RequestRouter produce:
//!     → logging.rs (structured tracing events, correlation_id fields)
//!     → metrics.rs (counters, gauges)
//! ```
//!
//! # Design Decisions
//! - Correlation id is attached to every routing event
//! - The library never installs a metrics exporter; embedders choose one

pub mod logging;
pub mod metrics;
