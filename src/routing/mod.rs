//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, headers, path, query)
//!     → matcher.rs (WebSocket upgrade or plain HTTP)
//!     → router.rs (compose target URI, dispatch)
//!         → WebSocket: http::websocket::proxy_websocket
//!         → HTTP: http::request::build_outbound → prepare hook → http::response::relay
//! ```
//!
//! # Design Decisions
//! - One fixed upstream; the router is built once and immutable at runtime
//! - Failures before the first body byte become a complete error response

pub mod matcher;
pub mod router;

pub use matcher::{classify, is_websocket_upgrade, RouteKind};
pub use router::ProxyRouter;
