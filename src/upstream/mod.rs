//! Outbound collaborators.
//!
//! # Responsibilities
//! - Issue HTTP requests against the upstream with a lazily-read body
//! - Open outbound WebSocket connections
//!
//! # Design Decisions
//! - Both collaborators are traits so the router never names a concrete
//!   client; tests substitute in-process fakes
//! - Implementations are shared across requests behind `Arc` and must not
//!   need external locking

pub mod http;
pub mod websocket;

use thiserror::Error;

pub use http::{ReqwestUpstream, UpstreamClient};
pub use websocket::{
    FrameSink, FrameStream, Handshake, TungsteniteConnector, UpstreamSocket, WebSocketConnector,
};

/// Failures talking to the upstream.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("websocket handshake failed: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("connect timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("invalid outbound request: {0}")]
    InvalidRequest(String),
}
