//! Wire envelopes exchanged between execution contexts.
//!
//! ```json
//! {"type": "summarize", "correlationId": "…", "payload": {…}}
//! {"type": "result", "correlationId": "…", "payload": {…}}
//! {"type": "error", "correlationId": "…", "error": {"code": "…", "message": "…"}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::routing::correlation::CorrelationId;

/// Outbound request. `type` names the remote operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub correlation_id: CorrelationId,
    #[serde(default)]
    pub payload: Value,
    /// `Authorization` value for credentialed requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization: Option<String>,
}

/// Error reported by the peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code}: {message}")]
pub struct RemoteError {
    pub code: String,
    pub message: String,
}

impl RemoteError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Inbound response, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseEnvelope {
    Result {
        #[serde(rename = "correlationId")]
        correlation_id: CorrelationId,
        #[serde(default)]
        payload: Value,
    },
    Error {
        #[serde(rename = "correlationId")]
        correlation_id: CorrelationId,
        error: RemoteError,
    },
}

impl ResponseEnvelope {
    pub fn result(correlation_id: CorrelationId, payload: Value) -> Self {
        ResponseEnvelope::Result {
            correlation_id,
            payload,
        }
    }

    pub fn error(correlation_id: CorrelationId, error: RemoteError) -> Self {
        ResponseEnvelope::Error {
            correlation_id,
            error,
        }
    }

    pub fn correlation_id(&self) -> CorrelationId {
        match self {
            ResponseEnvelope::Result { correlation_id, .. } => *correlation_id,
            ResponseEnvelope::Error { correlation_id, .. } => *correlation_id,
        }
    }
}
