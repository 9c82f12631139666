//! Proxy dispatch.
//!
//! # Responsibilities
//! - Compose the upstream target URI for each request
//! - Dispatch upgrades to the WebSocket pump and everything else to the
//!   request builder and response relay
//! - Run the prepare-request hook before an HTTP request is sent
//!
//! # Design Decisions
//! - Immutable after construction (shared across requests without locks)
//! - Collaborators are trait objects so tests swap in local fakes

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    http::{Request, Uri},
    response::{IntoResponse, Response},
};
use tokio_util::sync::CancellationToken;

use crate::config::{ProxyConfig, ProxyOptions};
use crate::error::ProxyError;
use crate::http::request::build_outbound;
use crate::http::response::relay;
use crate::http::websocket::proxy_websocket;
use crate::observability::metrics;
use crate::rewrite::ContentRewriter;
use crate::routing::matcher::{classify, RouteKind};
use crate::upstream::{ReqwestUpstream, TungsteniteConnector, UpstreamClient, WebSocketConnector};

/// The forwarding engine for one upstream.
pub struct ProxyRouter {
    options: ProxyOptions,
    client: Arc<dyn UpstreamClient>,
    connector: Arc<dyn WebSocketConnector>,
    rewriter: Option<Arc<ContentRewriter>>,
}

impl ProxyRouter {
    pub fn new(
        options: ProxyOptions,
        client: Arc<dyn UpstreamClient>,
        connector: Arc<dyn WebSocketConnector>,
    ) -> Self {
        Self {
            options,
            client,
            connector,
            rewriter: None,
        }
    }

    pub fn with_rewriter(mut self, rewriter: ContentRewriter) -> Self {
        self.rewriter = Some(Arc::new(rewriter));
        self
    }

    /// Build the router and its default collaborators from configuration.
    pub fn from_config(config: &ProxyConfig) -> Result<Self, ProxyError> {
        let options = ProxyOptions::from_config(config)?;
        let connect_timeout = Duration::from_secs(config.timeouts.connect_secs);
        let client = ReqwestUpstream::new(connect_timeout)
            .map_err(|e| ProxyError::Configuration(e.to_string()))?;
        let connector = TungsteniteConnector::new(connect_timeout);

        let router = Self::new(options, Arc::new(client), Arc::new(connector));
        let rewriter = ContentRewriter::from_config(config)
            .map_err(|e| ProxyError::Configuration(e.to_string()))?;
        Ok(match rewriter {
            Some(rewriter) => router.with_rewriter(rewriter),
            None => router,
        })
    }

    /// Absolute upstream URI for an inbound request URI.
    ///
    /// Path base and inbound path are joined as-is; the inbound query comes
    /// first, then the configured query.
    pub fn target_uri(&self, inbound: &Uri, websocket: bool) -> Result<Uri, ProxyError> {
        let scheme = match (websocket, self.options.scheme.as_str()) {
            (true, "https") => "wss",
            (true, "http") => "ws",
            (_, scheme) => scheme,
        };

        let query = [inbound.query().unwrap_or(""), self.options.append_query.as_str()]
            .into_iter()
            .filter(|q| !q.is_empty())
            .collect::<Vec<_>>()
            .join("&");

        let mut target = format!(
            "{}://{}{}{}",
            scheme,
            self.options.host,
            self.options.path_base,
            inbound.path()
        );
        if !query.is_empty() {
            target.push('?');
            target.push_str(&query);
        }

        target
            .parse()
            .map_err(|_| ProxyError::InvalidArgument("target uri"))
    }

    /// Forward one inbound request and produce the caller-facing response.
    pub async fn route(&self, request: Request<Body>, cancel: CancellationToken) -> Response {
        let start = Instant::now();
        let method = request.method().clone();
        let uri = request.uri().clone();
        let request_id = request
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        tracing::debug!(
            request_id = %request_id,
            method = %method,
            uri = %uri,
            "Proxying request"
        );

        let response = match classify(&request) {
            RouteKind::WebSocket => self.forward_websocket(request, cancel).await,
            RouteKind::Http => match self.forward_http(request, cancel).await {
                Ok(response) => response.into_response(),
                Err(err) => {
                    tracing::warn!(
                        request_id = %request_id,
                        method = %method,
                        uri = %uri,
                        error = %err,
                        "Forwarding failed"
                    );
                    err.into_response()
                }
            },
        };

        let status = response.status().as_u16();
        metrics::record_request(method.as_str(), status, start);
        tracing::debug!(request_id = %request_id, status, "Response headers ready");
        response
    }

    async fn forward_http(
        &self,
        request: Request<Body>,
        cancel: CancellationToken,
    ) -> Result<Response<Body>, ProxyError> {
        let target = self.target_uri(request.uri(), false)?;
        let (parts, body) = request.into_parts();
        let mut outbound = build_outbound(&parts, body, Some(&target))?;

        if let Some(hook) = &self.options.prepare {
            hook.prepare(&parts, &mut outbound).await?;
        }

        relay(self.client.as_ref(), outbound, self.rewriter.as_ref(), cancel).await
    }

    async fn forward_websocket(
        &self,
        request: Request<Body>,
        cancel: CancellationToken,
    ) -> Response {
        let target = match self.target_uri(request.uri(), true) {
            Ok(target) => target,
            Err(err) => return err.into_response(),
        };
        let (parts, _body) = request.into_parts();
        proxy_websocket(parts, target, self.connector.as_ref(), &self.options, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::headers::ForwardedHeaders;
    use crate::upstream::{Handshake, UpstreamError, UpstreamSocket};
    use axum::http::{header, StatusCode};
    use futures_util::future::BoxFuture;
    use std::sync::Mutex;

    /// Records outbound requests and answers 200 with a fixed body.
    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<(String, String, Vec<(String, String)>)>>,
    }

    impl UpstreamClient for Recording {
        fn send(&self, request: Request<Body>) -> BoxFuture<'_, Result<Response<Body>, UpstreamError>> {
            let headers = request
                .headers()
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                .collect();
            self.seen.lock().unwrap().push((
                request.method().to_string(),
                request.uri().to_string(),
                headers,
            ));
            Box::pin(async { Ok(Response::new(Body::from("upstream says hi"))) })
        }
    }

    struct Refusing;

    impl WebSocketConnector for Refusing {
        fn connect(&self, _handshake: Handshake) -> BoxFuture<'_, Result<UpstreamSocket, UpstreamError>> {
            Box::pin(async { Err(UpstreamError::InvalidRequest("handshake rejected".into())) })
        }
    }

    fn options() -> ProxyOptions {
        ProxyOptions::new("https", "example.com")
            .unwrap()
            .with_path_base("/base")
            .with_append_query("y=2")
    }

    fn router(client: Arc<Recording>) -> ProxyRouter {
        ProxyRouter::new(options(), client, Arc::new(Refusing))
    }

    #[test]
    fn target_uri_composes_base_path_and_queries() {
        let router = router(Arc::default());
        let target = router.target_uri(&"/foo?x=1".parse().unwrap(), false).unwrap();
        assert_eq!(target.to_string(), "https://example.com/base/foo?x=1&y=2");
    }

    #[test]
    fn target_uri_without_inbound_query() {
        let router = router(Arc::default());
        let target = router.target_uri(&"/foo".parse().unwrap(), false).unwrap();
        assert_eq!(target.to_string(), "https://example.com/base/foo?y=2");

        let plain = ProxyRouter::new(
            ProxyOptions::new("http", "backend:3000").unwrap(),
            Arc::new(Recording::default()),
            Arc::new(Refusing),
        );
        let target = plain.target_uri(&"/".parse().unwrap(), false).unwrap();
        assert_eq!(target.to_string(), "http://backend:3000/");
    }

    #[test]
    fn websocket_targets_use_ws_schemes() {
        let router = router(Arc::default());
        let target = router.target_uri(&"/chat".parse().unwrap(), true).unwrap();
        assert_eq!(target.scheme_str(), Some("wss"));
        assert_eq!(target.to_string(), "wss://example.com/base/chat?y=2");
    }

    #[tokio::test]
    async fn http_requests_forwarded_with_upstream_host() {
        let client = Arc::new(Recording::default());
        let router = router(client.clone());
        let request = Request::builder()
            .method("GET")
            .uri("/foo?x=1")
            .header(header::HOST, "proxy.local")
            .header("x-custom", "kept")
            .body(Body::empty())
            .unwrap();

        let response = router.route(request, CancellationToken::new()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"upstream says hi");

        let seen = client.seen.lock().unwrap();
        let (method, uri, headers) = &seen[0];
        assert_eq!(method, "GET");
        assert_eq!(uri, "https://example.com/base/foo?x=1&y=2");
        assert!(headers.contains(&("host".into(), "example.com".into())));
        assert!(headers.contains(&("x-custom".into(), "kept".into())));
    }

    #[tokio::test]
    async fn prepare_hook_runs_before_send() {
        let client = Arc::new(Recording::default());
        let router = ProxyRouter::new(
            options().with_prepare(Arc::new(ForwardedHeaders)),
            client.clone(),
            Arc::new(Refusing),
        );
        let request = Request::builder()
            .uri("/")
            .header(header::HOST, "proxy.local")
            .body(Body::empty())
            .unwrap();

        router.route(request, CancellationToken::new()).await;

        let seen = client.seen.lock().unwrap();
        let headers = &seen[0].2;
        assert!(headers.contains(&("x-forwarded-host".into(), "proxy.local".into())));
        assert!(headers.contains(&("x-forwarded-proto".into(), "http".into())));
    }

    #[tokio::test]
    async fn upgrade_without_connection_is_rejected_before_connect() {
        // No hyper upgrade handle is attached outside a real connection, so
        // the upgrade extractor refuses before any upstream work.
        let router = router(Arc::default());
        let request = Request::builder()
            .uri("/chat")
            .header(header::CONNECTION, "upgrade")
            .header(header::UPGRADE, "websocket")
            .header(header::SEC_WEBSOCKET_VERSION, "13")
            .header(header::SEC_WEBSOCKET_KEY, "dGhlIHNhbXBsZSBub25jZQ==")
            .body(Body::empty())
            .unwrap();

        let response = router.route(request, CancellationToken::new()).await;
        assert!(response.status().is_client_error());
    }
}
