//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, timeout, tracing layers)
//!     → routing::ProxyRouter (WebSocket upgrade or plain HTTP)
//!         → request.rs (outbound request, prepare hook)
//!         → response.rs (relay, optional rewrite)
//!         → websocket.rs (handshake, duplex pump)
//!     → Send to client
//! ```

pub mod frame;
pub mod headers;
pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use frame::{CloseReason, Frame};
pub use headers::{is_forwardable, ForwardedHeaders};
pub use request::{build_outbound, PrepareRequest};
pub use server::HttpServer;
