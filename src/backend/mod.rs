//! Serving side of the transport.
//!
//! # Data Flow
//! ```text
//! PortAcceptor::accept → RemotePort
//!     → host.rs (one task per port)
//!     → BackendClient::call(request)
//!     → ResponseEnvelope (result | error) back on the same port
//! ```
//!
//! # Design Decisions
//! - The backend sees envelopes only; it never touches SessionGuard or the router
//! - A port whose requester stopped listening abandons the in-progress call

pub mod host;

pub use host::{BackendClient, BackendHost, HostHandle};
