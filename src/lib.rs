//! Mirror proxy library: a single-upstream reverse proxy that forwards HTTP
//! and WebSocket traffic and can rewrite HTML on the way back.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod rewrite;
pub mod routing;
pub mod upstream;

pub use config::{ProxyConfig, ProxyOptions};
pub use error::ProxyError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use routing::ProxyRouter;
