//! Credential lifecycle subsystem.
//!
//! # Data Flow
//! ```text
//! login    → SessionGuard::store_credentials → store.rs
//! request  → SessionGuard::ensure_valid
//!              → bundle.rs (decode + validate stored value)
//!              → refresh.rs (token endpoint, failure classification)
//!              → store.rs (atomic replace)
//! logout   → SessionGuard::clear
//! ```

pub mod bundle;
pub mod guard;
pub mod refresh;
pub mod store;

pub use bundle::{BundleError, CredentialBundle};
pub use guard::SessionGuard;
pub use refresh::{HttpRefreshClient, RefreshClient, RefreshFailure, TokenGrant};
pub use store::{CredentialStore, FileStore, MemoryStore, StoreError};
