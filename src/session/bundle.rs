//! Credential bundle and its structural validation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Access/refresh token pair plus expiry and subject metadata.
///
/// Both tokens are non-empty and `expires_at` is always present once a bundle
/// has been constructed through [`CredentialBundle::from_stored`] or
/// [`CredentialBundle::validate`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialBundle {
    pub access_token: String,
    pub refresh_token: String,
    /// Expiry in epoch seconds.
    pub expires_at: u64,
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
}

/// Why a stored value could not be used as a credential bundle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BundleError {
    #[error("missing or empty {0}")]
    MissingField(&'static str),
    #[error("unreadable bundle: {0}")]
    Malformed(String),
}

/// Lenient mirror of the stored shape, so that missing fields are reported by
/// name instead of as a generic decode failure.
#[derive(Deserialize)]
struct StoredBundle {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<u64>,
    token_type: Option<String>,
    subject_id: Option<String>,
}

impl CredentialBundle {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: u64,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at,
            token_type: "bearer".to_string(),
            subject_id: None,
        }
    }

    pub fn with_subject(mut self, subject_id: impl Into<String>) -> Self {
        self.subject_id = Some(subject_id.into());
        self
    }

    /// Decode a value read from a credential store.
    pub fn from_stored(value: Value) -> Result<Self, BundleError> {
        let stored: StoredBundle =
            serde_json::from_value(value).map_err(|e| BundleError::Malformed(e.to_string()))?;

        let bundle = Self {
            access_token: stored.access_token.unwrap_or_default(),
            refresh_token: stored.refresh_token.unwrap_or_default(),
            expires_at: stored.expires_at.ok_or(BundleError::MissingField("expires_at"))?,
            token_type: stored.token_type.unwrap_or_else(|| "bearer".to_string()),
            subject_id: stored.subject_id,
        };
        bundle.validate()?;
        Ok(bundle)
    }

    pub fn validate(&self) -> Result<(), BundleError> {
        if self.access_token.trim().is_empty() {
            return Err(BundleError::MissingField("access_token"));
        }
        if self.refresh_token.trim().is_empty() {
            return Err(BundleError::MissingField("refresh_token"));
        }
        Ok(())
    }

    pub fn to_stored(&self) -> Value {
        // Serializing plain strings and integers cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Seconds of validity left at `now`; negative once expired.
    pub fn remaining_secs(&self, now: u64) -> i64 {
        if self.expires_at >= now {
            i64::try_from(self.expires_at - now).unwrap_or(i64::MAX)
        } else {
            i64::try_from(now - self.expires_at).map_or(i64::MIN, |secs| -secs)
        }
    }

    /// True unless more than `buffer_secs` of validity remain.
    pub fn needs_refresh(&self, now: u64, buffer_secs: u64) -> bool {
        self.expires_at.saturating_sub(now) <= buffer_secs
    }

    /// Value for an `Authorization` header.
    pub fn authorization(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

impl std::fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("token_type", &self.token_type)
            .field("subject_id", &self.subject_id)
            .finish()
    }
}
