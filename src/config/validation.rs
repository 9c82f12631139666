//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (buffer size > 0, addresses parse)
//! - Validate the upstream and public origins
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::ProxyConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field (e.g. `upstream.host`).
    pub field: &'static str,
    /// Human readable description.
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

impl std::error::Error for ValidationError {}

/// Validate a configuration, collecting every error found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    let upstream = &config.upstream;
    match upstream.scheme.as_str() {
        "http" | "https" => {}
        "" => errors.push(ValidationError::new("upstream.scheme", "must not be empty")),
        other => errors.push(ValidationError::new(
            "upstream.scheme",
            format!("unsupported scheme '{}'", other),
        )),
    }

    if upstream.host.trim().is_empty() {
        errors.push(ValidationError::new("upstream.host", "must not be empty"));
    } else if upstream
        .host
        .parse::<axum::http::uri::Authority>()
        .is_err()
    {
        errors.push(ValidationError::new(
            "upstream.host",
            format!("'{}' is not a valid host", upstream.host),
        ));
    }

    if !upstream.path_base.is_empty() && !upstream.path_base.starts_with('/') {
        errors.push(ValidationError::new(
            "upstream.path_base",
            "must start with '/'",
        ));
    }

    if config.websocket.buffer_size == 0 {
        errors.push(ValidationError::new(
            "websocket.buffer_size",
            "must be greater than zero",
        ));
    }

    if config.websocket.keep_alive_secs == Some(0) {
        errors.push(ValidationError::new(
            "websocket.keep_alive_secs",
            "must be greater than zero when set",
        ));
    }

    if config.rewrite.enabled {
        let rewrite = &config.rewrite;
        match url::Url::parse(&rewrite.public_origin) {
            Ok(url) if url.host_str().is_some() => {}
            _ => errors.push(ValidationError::new(
                "rewrite.public_origin",
                format!("'{}' is not an absolute origin", rewrite.public_origin),
            )),
        }
        if rewrite.mark.is_empty() {
            errors.push(ValidationError::new("rewrite.mark", "must not be empty"));
        }
        if rewrite.anchor_class.is_empty() {
            errors.push(ValidationError::new(
                "rewrite.anchor_class",
                "must not be empty",
            ));
        }
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!(
                "'{}' is not a socket address",
                config.observability.metrics_address
            ),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
