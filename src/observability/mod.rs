//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Request handling, relay, rewrite and WebSocket sessions produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters and histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Request ID (x-request-id) and WebSocket session ID are log fields
//! - Metric updates are no-ops until an exporter is installed

pub mod logging;
pub mod metrics;
