//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated)
//!     → options.rs (ProxyOptions, immutable)
//!     → shared via Arc by every request
//! ```
//!
//! # Design Decisions
//! - Options are immutable once built; a restart picks up changes
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod options;
pub mod schema;
pub mod validation;

pub use options::ProxyOptions;
pub use schema::ProxyConfig;
pub use schema::{
    ForwardingConfig, ListenerConfig, LogFormat, ObservabilityConfig, RewriteConfig,
    TimeoutConfig, UpstreamConfig, WebSocketConfig,
};
