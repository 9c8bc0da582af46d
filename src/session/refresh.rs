//! Token-refresh endpoint client and failure classification.
//!
//! # Responsibilities
//! - POST the refresh token to the configured endpoint
//! - Decode a grant into a replacement [`CredentialBundle`]
//! - Classify failures as terminal (bad refresh token) or retryable
//!
//! # Design Decisions
//! - Network errors and timeouts are always retryable
//! - Only a machine-readable reason marks a failure terminal; a bare 4xx is
//!   retried within the attempt budget

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

use crate::config::RefreshConfig;
use crate::session::bundle::CredentialBundle;

/// Error reasons meaning the refresh token itself is no longer usable.
pub const TERMINAL_REASONS: [&str; 6] = [
    "invalid_grant",
    "invalid_token",
    "invalid_refresh_token",
    "refresh_token_not_found",
    "refresh_token_already_used",
    "token_expired",
];

/// A failed refresh attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshFailure {
    /// Network failure or timeout.
    #[error("transport error: {0}")]
    Transport(String),

    /// The endpoint rejected the refresh token.
    #[error("refresh token rejected: {reason}")]
    InvalidGrant { reason: String },

    /// Non-2xx without a terminal reason.
    #[error("refresh endpoint returned {status}{}", reason_suffix(.reason))]
    Rejected { status: u16, reason: Option<String> },

    /// 2xx whose body is not a usable grant.
    #[error("malformed grant: {0}")]
    Malformed(String),
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason.as_ref().map(|r| format!(" ({})", r)).unwrap_or_default()
}

impl RefreshFailure {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RefreshFailure::InvalidGrant { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            RefreshFailure::Transport(_) => "transport",
            RefreshFailure::InvalidGrant { .. } => "invalid_grant",
            RefreshFailure::Rejected { .. } => "rejected",
            RefreshFailure::Malformed(_) => "malformed",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GrantUser {
    #[serde(default)]
    pub id: Option<String>,
}

/// Body of a successful refresh response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenGrant {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<u64>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub user: Option<GrantUser>,
}

impl TokenGrant {
    /// Build the replacement bundle. `expires_at` wins over `expires_in`;
    /// with neither, `default_ttl_secs` applies. The subject carries over from
    /// `previous` when the grant does not name one.
    pub fn into_bundle(
        self,
        now: u64,
        default_ttl_secs: u64,
        previous: &CredentialBundle,
    ) -> Result<CredentialBundle, RefreshFailure> {
        let access_token = self
            .access_token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| RefreshFailure::Malformed("missing access_token".to_string()))?;
        let refresh_token = self
            .refresh_token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| RefreshFailure::Malformed("missing refresh_token".to_string()))?;

        let expires_at = match (self.expires_at, self.expires_in) {
            (Some(at), _) => at,
            (None, Some(secs)) => now.saturating_add(secs),
            (None, None) => now.saturating_add(default_ttl_secs),
        };

        Ok(CredentialBundle {
            access_token,
            refresh_token,
            expires_at,
            token_type: self.token_type.unwrap_or_else(|| previous.token_type.clone()),
            subject_id: self
                .user
                .and_then(|u| u.id)
                .or_else(|| previous.subject_id.clone()),
        })
    }
}

/// Classify a non-2xx refresh response from its status and body.
pub fn classify_failure(status: u16, body: &str) -> RefreshFailure {
    let reason = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        ["error", "error_code", "code", "reason"]
            .iter()
            .find_map(|field| v.get(*field).and_then(Value::as_str).map(str::to_string))
    });

    match reason {
        Some(r) if TERMINAL_REASONS.contains(&r.as_str()) => RefreshFailure::InvalidGrant { reason: r },
        reason => RefreshFailure::Rejected { status, reason },
    }
}

/// The remote token-refresh operation.
#[async_trait]
pub trait RefreshClient: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, RefreshFailure>;
}

/// Refresh client backed by `reqwest`.
#[derive(Clone)]
pub struct HttpRefreshClient {
    client: reqwest::Client,
    url: url::Url,
}

impl HttpRefreshClient {
    pub fn new(config: &RefreshConfig) -> Result<Self, RefreshFailure> {
        let url = config
            .url
            .parse()
            .map_err(|e| RefreshFailure::Transport(format!("invalid refresh URL '{}': {}", config.url, e)))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| RefreshFailure::Transport(e.to_string()))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl RefreshClient for HttpRefreshClient {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, RefreshFailure> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(|e| RefreshFailure::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RefreshFailure::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(classify_failure(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| RefreshFailure::Malformed(e.to_string()))
    }
}

impl std::fmt::Debug for HttpRefreshClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRefreshClient").field("url", &self.url.as_str()).finish()
    }
}
