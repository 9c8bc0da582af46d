//! Transport subsystem.
//!
//! # Data Flow
//! ```text
//! RequestRouter
//!     → channel.rs (Transport::open → ChannelHandle + event stream)
//!     → envelope.rs (RequestEnvelope out, ResponseEnvelope in)
//!     → local.rs (in-process port pair to the serving context)
//! ```
//!
//! # Design Decisions
//! - One logical channel per correlation id
//! - Inbound `type` is an exhaustively matched enum; unknown types fail decoding

pub mod channel;
pub mod envelope;
pub mod local;

pub use channel::{ChannelEvent, ChannelHandle, OpenedChannel, Transport, TransportError};
pub use envelope::{RemoteError, RequestEnvelope, ResponseEnvelope};
pub use local::{local_transport, LocalTransport, PortAcceptor, RemotePort};
