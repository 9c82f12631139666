//! Immutable per-instance proxy options.
//!
//! Built once from a validated [`ProxyConfig`] and shared via `Arc` by every
//! concurrent request. Nothing in here changes after construction.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::schema::ProxyConfig;
use crate::config::validation::validate_config;
use crate::error::ProxyError;
use crate::http::headers::ForwardedHeaders;
use crate::http::request::PrepareRequest;

/// Default WebSocket relay buffer size in bytes.
pub const DEFAULT_WS_BUFFER_SIZE: usize = 4096;

const DEFAULT_BUFFER: NonZeroUsize = match NonZeroUsize::new(DEFAULT_WS_BUFFER_SIZE) {
    Some(size) => size,
    None => unreachable!(),
};

/// Options governing how requests are forwarded to the upstream.
#[derive(Clone)]
pub struct ProxyOptions {
    /// Upstream scheme ("http" or "https").
    pub scheme: String,
    /// Upstream host with optional port.
    pub host: String,
    /// Path prefix prepended to every forwarded path, without trailing slash.
    pub path_base: String,
    /// Query appended to every forwarded request, without leading '?'.
    pub append_query: String,
    /// Hook run against each outbound request right before it is sent.
    pub prepare: Option<Arc<dyn PrepareRequest>>,
    /// Keep-alive ping interval for the upstream WebSocket leg. Never zero.
    keep_alive: Option<Duration>,
    /// WebSocket relay buffer size.
    pub buffer_size: NonZeroUsize,
}

impl ProxyOptions {
    /// Create options for the given upstream with defaults for everything else.
    pub fn new(scheme: impl Into<String>, host: impl Into<String>) -> Result<Self, ProxyError> {
        let scheme = scheme.into();
        let host = host.into();
        if scheme.is_empty() {
            return Err(ProxyError::Configuration("upstream scheme is required".into()));
        }
        if host.is_empty() {
            return Err(ProxyError::Configuration("upstream host is required".into()));
        }
        Ok(Self {
            scheme,
            host,
            path_base: String::new(),
            append_query: String::new(),
            prepare: None,
            keep_alive: None,
            buffer_size: DEFAULT_BUFFER,
        })
    }

    /// Build options from a configuration, failing on any validation error.
    pub fn from_config(config: &ProxyConfig) -> Result<Self, ProxyError> {
        validate_config(config).map_err(|errors| {
            let joined = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            ProxyError::Configuration(joined)
        })?;

        let upstream = &config.upstream;
        let mut options = Self::new(upstream.scheme.clone(), upstream.host.clone())?
            .with_path_base(&upstream.path_base)
            .with_append_query(&upstream.append_query)
            .with_buffer_size(config.websocket.buffer_size)?
            .with_keep_alive(config.websocket.keep_alive_secs.map(Duration::from_secs))?;

        if config.forwarding.x_forwarded {
            options.prepare = Some(Arc::new(ForwardedHeaders));
        }
        Ok(options)
    }

    /// Set the path base. A trailing slash is dropped so joining with the
    /// inbound path never produces `//`.
    pub fn with_path_base(mut self, path_base: &str) -> Self {
        self.path_base = path_base.trim_end_matches('/').to_string();
        self
    }

    /// Set the query appended to every request.
    pub fn with_append_query(mut self, query: &str) -> Self {
        self.append_query = query.trim_start_matches('?').to_string();
        self
    }

    /// Set the WebSocket relay buffer size. Zero is a configuration error.
    pub fn with_buffer_size(mut self, size: usize) -> Result<Self, ProxyError> {
        self.buffer_size = NonZeroUsize::new(size).ok_or_else(|| {
            ProxyError::Configuration("websocket buffer size must be greater than zero".into())
        })?;
        Ok(self)
    }

    /// Install the prepare-request hook.
    pub fn with_prepare(mut self, hook: Arc<dyn PrepareRequest>) -> Self {
        self.prepare = Some(hook);
        self
    }

    /// Set the keep-alive ping interval. A zero interval is a configuration
    /// error; `None` disables pings.
    pub fn with_keep_alive(mut self, interval: Option<Duration>) -> Result<Self, ProxyError> {
        if interval.is_some_and(|i| i.is_zero()) {
            return Err(ProxyError::Configuration(
                "websocket keep-alive interval must be greater than zero".into(),
            ));
        }
        self.keep_alive = interval;
        Ok(self)
    }

    pub fn keep_alive(&self) -> Option<Duration> {
        self.keep_alive
    }
}

impl fmt::Debug for ProxyOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyOptions")
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("path_base", &self.path_base)
            .field("append_query", &self.append_query)
            .field("prepare", &self.prepare.is_some())
            .field("keep_alive", &self.keep_alive)
            .field("buffer_size", &self.buffer_size)
            .finish()
    }
}
