//! Session & request orchestration core for a browser-embedded assistant.
//!
//! ```text
//!   caller
//!     │ submit(request, options)
//!     ▼
//! ┌──────────────┐  ensure_valid   ┌──────────────┐  refresh  ┌──────────────────┐
//! │RequestRouter │ ──────────────▶ │ SessionGuard │ ────────▶ │ refresh endpoint │
//! └──────┬───────┘                 └──────┬───────┘           └──────────────────┘
//!        │ open / send / events           │ get / set / remove
//!        ▼                                ▼
//! ┌──────────────┐                 ┌─────────────────┐
//! │  Transport   │                 │ CredentialStore │
//! └──────┬───────┘                 └─────────────────┘
//!        ▼
//! ┌──────────────┐
//! │ BackendHost  │ → BackendClient
//! └──────────────┘
//! ```

// Core subsystems
pub mod routing;
pub mod session;
pub mod transport;

// Serving side
pub mod backend;

// Cross-cutting concerns
pub mod clock;
pub mod config;
pub mod error;
pub mod observability;
pub mod resilience;

pub use config::RelayConfig;
pub use error::{AuthError, ErrorKind, RequestError};
pub use routing::{CorrelationId, Request, RequestRouter, ResponseHandle, SubmitOptions};
pub use session::{CredentialBundle, SessionGuard};
