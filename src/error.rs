//! Classified outcomes surfaced at the SessionGuard / RequestRouter boundary.
//!
//! Everything raw (store I/O, HTTP, JSON, channel failures) is mapped into one
//! of these before it reaches a caller.

use std::time::Duration;
use thiserror::Error;

use crate::transport::envelope::RemoteError;

/// Errors produced while obtaining a valid credential.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No stored credential, or the stored one is unusable. The caller must
    /// re-authenticate.
    #[error("authentication required")]
    AuthRequired,

    /// Circuit breaker is open; back off until the cool-down elapses.
    #[error("session service unavailable, retry after {retry_after_secs}s")]
    ServiceUnavailable { retry_after_secs: u64 },

    /// Retryable failures exhausted the attempt budget.
    #[error("session service error: {0}")]
    ServiceError(String),
}

/// Result type for credential operations.
pub type AuthResult<T> = Result<T, AuthError>;

/// Terminal outcome of a routed request other than fulfilment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// Credential check failed before any channel was opened.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Channel dropped before a response arrived.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// No response within the deadline.
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The peer answered with an error envelope.
    #[error("remote error: {0}")]
    Remote(RemoteError),

    /// Caller-initiated cancellation. Not a failure.
    #[error("request cancelled")]
    Cancelled,
}

/// Coarse classification used for retry decisions, logging and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    AuthRequired,
    ServiceUnavailable,
    ServiceError,
    ConnectionLost,
    Timeout,
    Remote,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::AuthRequired => "auth_required",
            ErrorKind::ServiceUnavailable => "service_unavailable",
            ErrorKind::ServiceError => "service_error",
            ErrorKind::ConnectionLost => "connection_lost",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Remote => "remote",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::AuthRequired => ErrorKind::AuthRequired,
            AuthError::ServiceUnavailable { .. } => ErrorKind::ServiceUnavailable,
            AuthError::ServiceError(_) => ErrorKind::ServiceError,
        }
    }
}

impl RequestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RequestError::Auth(e) => e.kind(),
            RequestError::ConnectionLost(_) => ErrorKind::ConnectionLost,
            RequestError::Timeout(_) => ErrorKind::Timeout,
            RequestError::Remote(_) => ErrorKind::Remote,
            RequestError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether submitting the same request again later may succeed without
    /// user intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ServiceError | ErrorKind::ConnectionLost | ErrorKind::Timeout
        )
    }
}
