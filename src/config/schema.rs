//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the mirror proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// The single upstream origin every request is forwarded to.
    pub upstream: UpstreamConfig,

    /// WebSocket relay settings.
    pub websocket: WebSocketConfig,

    /// Response body rewriting.
    pub rewrite: RewriteConfig,

    /// Forwarding headers added to outbound requests.
    pub forwarding: ForwardingConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Upstream origin configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// URI scheme used to reach the upstream ("http" or "https").
    pub scheme: String,

    /// Upstream host, optionally with port (e.g., "example.com:8443").
    pub host: String,

    /// Path prefix prepended to every forwarded path.
    pub path_base: String,

    /// Query string appended to every forwarded request.
    pub append_query: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            scheme: "https".to_string(),
            host: String::new(),
            path_base: String::new(),
            append_query: String::new(),
        }
    }
}

/// WebSocket relay configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebSocketConfig {
    /// Relay buffer size in bytes. Must be positive.
    pub buffer_size: usize,

    /// Interval between keep-alive pings on the upstream leg, in seconds.
    pub keep_alive_secs: Option<u64>,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            buffer_size: 4096,
            keep_alive_secs: None,
        }
    }
}

/// Response rewrite configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RewriteConfig {
    /// Enable the rewrite pipeline for matching responses.
    pub enabled: bool,

    /// Externally visible origin of the proxy (e.g., "http://localhost:8080").
    /// Upstream origin references in rewritten documents are replaced by it.
    pub public_origin: String,

    /// Character inserted after matching words.
    pub mark: String,

    /// Class attribute value of the element whose subtree is rewritten.
    pub anchor_class: String,

    /// Media type eligible for rewriting.
    pub media_type: String,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            public_origin: "http://localhost:8080".to_string(),
            mark: "\u{2122}".to_string(),
            anchor_class: "layout".to_string(),
            media_type: "text/html".to_string(),
        }
    }
}

/// Forwarding header configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForwardingConfig {
    /// Add X-Forwarded-For / -Proto / -Host to outbound requests.
    pub x_forwarded: bool,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self { x_forwarded: true }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Time allowed until response headers are produced, in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable, for development.
    #[default]
    Pretty,
    /// One JSON object per line, for log aggregation.
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
