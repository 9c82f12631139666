//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with a single catch-all proxy handler
//! - Wire up middleware (request ID, tracing, timeout)
//! - Serve a listener until shutdown is triggered

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::Response,
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::lifecycle::Shutdown;
use crate::routing::ProxyRouter;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub proxy: Arc<ProxyRouter>,
    pub shutdown: Shutdown,
}

/// HTTP server for the reverse proxy.
pub struct HttpServer {
    router: Router,
    shutdown: Shutdown,
}

impl HttpServer {
    /// Create a server for the configured upstream.
    pub fn new(config: &ProxyConfig, shutdown: Shutdown) -> Result<Self, ProxyError> {
        let proxy = ProxyRouter::from_config(config)?;
        let timeout = Duration::from_secs(config.timeouts.request_secs);
        Ok(Self::with_proxy(proxy, timeout, shutdown))
    }

    /// Create a server around an already built forwarding engine.
    pub fn with_proxy(proxy: ProxyRouter, request_timeout: Duration, shutdown: Shutdown) -> Self {
        let state = AppState {
            proxy: Arc::new(proxy),
            shutdown: shutdown.clone(),
        };
        Self {
            router: Self::build_router(state, request_timeout),
            shutdown,
        }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// The timeout bounds the time to response headers only; streamed bodies
    /// and upgraded WebSocket sessions are not cut by it.
    #[allow(deprecated)]
    fn build_router(state: AppState, request_timeout: Duration) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(request_timeout))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let shutdown = self.shutdown.clone();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Catch-all handler: every method and path goes to the upstream.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let cancel = state.shutdown.child_token();
    state.proxy.route(request, cancel).await
}
