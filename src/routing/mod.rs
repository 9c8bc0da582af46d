//! Request routing subsystem.
//!
//! # Data Flow
//! ```text
//! submit(request, options)
//!     → SessionGuard::ensure_valid (credentialed requests only)
//!     → correlation.rs (issue id)
//!     → pending.rs (register Pending entry)
//!     → Transport::open + send RequestEnvelope
//!     → driver task: first of response / disconnect / deadline / cancel
//!     → router.rs settle (remove entry, close channel, resolve handle)
//! ```

pub mod correlation;
pub mod pending;
pub mod router;

pub use correlation::CorrelationId;
pub use pending::{PendingRequest, RequestState};
pub use router::{Request, RequestRouter, ResponseHandle, SubmitOptions};
