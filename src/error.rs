//! Proxy error taxonomy and its mapping onto caller-facing responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::rewrite::RewriteError;
use crate::upstream::UpstreamError;

/// Errors surfaced by the forwarding engine.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Invalid or incomplete setup. Fatal, never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A required argument was missing or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The upstream could not be reached or refused the request.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The rewrite pipeline found no anchor element in the document.
    #[error("no element with class '{0}' found")]
    StructureNotFound(String),

    /// Decompressing, transforming or recompressing a body failed.
    #[error("content rewrite failed: {0}")]
    Rewrite(String),

    /// The caller went away or the server is shutting down.
    #[error("request cancelled")]
    Cancelled,
}

impl ProxyError {
    /// Status code reported to the caller for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Configuration(_) | ProxyError::InvalidArgument(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ProxyError::UpstreamUnavailable(_) | ProxyError::StructureNotFound(_) => {
                StatusCode::BAD_GATEWAY
            }
            ProxyError::Rewrite(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

impl From<RewriteError> for ProxyError {
    fn from(err: RewriteError) -> Self {
        match err {
            RewriteError::StructureNotFound(class) => ProxyError::StructureNotFound(class),
            other => ProxyError::Rewrite(other.to_string()),
        }
    }
}

impl From<UpstreamError> for ProxyError {
    fn from(err: UpstreamError) -> Self {
        ProxyError::UpstreamUnavailable(err.to_string())
    }
}
