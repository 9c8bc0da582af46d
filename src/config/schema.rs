//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files. Every
//! section is optional; omitted fields take their defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Credential lifecycle and breaker tuning.
    pub session: SessionConfig,

    /// Token-refresh endpoint.
    pub refresh: RefreshConfig,

    /// Request routing defaults.
    pub router: RouterConfig,

    /// Durable credential storage.
    pub store: StoreConfig,

    /// Logging settings.
    pub observability: ObservabilityConfig,
}

/// SessionGuard tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Key under which the credential bundle is stored.
    pub storage_key: String,

    /// Refresh when fewer than this many seconds of validity remain.
    pub buffer_secs: u64,

    /// Refresh attempts per flight.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Upper bound on a single refresh attempt in seconds.
    pub attempt_timeout_secs: u64,

    /// Consecutive failed flights before the breaker opens.
    pub max_failures: u32,

    /// How long the breaker stays open, in seconds.
    pub cool_down_secs: u64,

    /// Lifetime assumed when a grant carries neither `expires_at` nor `expires_in`.
    pub default_expires_in_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            storage_key: "session".to_string(),
            buffer_secs: 300,
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
            attempt_timeout_secs: 10,
            max_failures: 3,
            cool_down_secs: 300,
            default_expires_in_secs: 3_600,
        }
    }
}

impl SessionConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }
}

/// Token-refresh endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Endpoint receiving `POST {"refresh_token": ...}`.
    pub url: String,

    /// HTTP request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080/auth/refresh".to_string(),
            request_timeout_secs: 10,
        }
    }
}

/// RequestRouter defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Deadline applied when a submission does not specify one.
    pub default_timeout_ms: u64,

    /// Name passed to `Transport::open` for each request channel.
    pub channel_name: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 30_000,
            channel_name: "assistant".to_string(),
        }
    }
}

impl RouterConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

/// File-backed credential store.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the JSON file holding stored values.
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "credentials.json".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Output format: "pretty" or "compact".
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: RelayConfig = toml::from_str(
            r#"
            [session]
            buffer_secs = 120

            [router]
            default_timeout_ms = 5000
            "#,
        )
        .unwrap();

        assert_eq!(config.session.buffer_secs, 120);
        assert_eq!(config.session.max_attempts, 3);
        assert_eq!(config.session.cool_down_secs, 300);
        assert_eq!(config.router.default_timeout(), Duration::from_secs(5));
        assert_eq!(config.router.channel_name, "assistant");
        assert_eq!(config.observability.log_level, "info");
    }
}
