//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and the refresh URL.
//! All errors are collected rather than stopping at the first.

use std::fmt;
use url::Url;

use crate::config::schema::RelayConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: [&str; 2] = ["pretty", "compact"];

/// Validate a parsed configuration.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let session = &config.session;

    if session.storage_key.trim().is_empty() {
        errors.push(ValidationError::new("session.storage_key", "must not be empty"));
    }
    if session.max_attempts == 0 {
        errors.push(ValidationError::new("session.max_attempts", "must be at least 1"));
    }
    if session.max_failures == 0 {
        errors.push(ValidationError::new("session.max_failures", "must be at least 1"));
    }
    if session.base_delay_ms > session.max_delay_ms {
        errors.push(ValidationError::new(
            "session.base_delay_ms",
            format!(
                "must not exceed max_delay_ms ({} > {})",
                session.base_delay_ms, session.max_delay_ms
            ),
        ));
    }
    if session.attempt_timeout_secs == 0 {
        errors.push(ValidationError::new("session.attempt_timeout_secs", "must be greater than 0"));
    }
    if session.default_expires_in_secs == 0 {
        errors.push(ValidationError::new("session.default_expires_in_secs", "must be greater than 0"));
    }

    match Url::parse(&config.refresh.url) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(url) => errors.push(ValidationError::new(
            "refresh.url",
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new("refresh.url", format!("invalid URL: {}", e))),
    }
    if config.refresh.request_timeout_secs == 0 {
        errors.push(ValidationError::new("refresh.request_timeout_secs", "must be greater than 0"));
    }

    if config.router.default_timeout_ms == 0 {
        errors.push(ValidationError::new("router.default_timeout_ms", "must be greater than 0"));
    }
    if config.router.channel_name.is_empty() {
        errors.push(ValidationError::new("router.channel_name", "must not be empty"));
    }

    if config.store.path.is_empty() {
        errors.push(ValidationError::new("store.path", "must not be empty"));
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", config.observability.log_level),
        ));
    }
    if !LOG_FORMATS.contains(&config.observability.log_format.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_format",
            format!("unknown format '{}'", config.observability.log_format),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
