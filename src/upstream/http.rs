//! HTTP upstream client.

use std::time::Duration;

use axum::{
    body::{Body, HttpBody},
    http::{Request, Response},
};
use futures_util::future::BoxFuture;
use reqwest::redirect::Policy;

use super::UpstreamError;

/// Sends one outbound request and returns the response with its body unread.
pub trait UpstreamClient: Send + Sync {
    fn send(&self, request: Request<Body>) -> BoxFuture<'_, Result<Response<Body>, UpstreamError>>;
}

/// [`UpstreamClient`] backed by a shared `reqwest` connection pool.
///
/// Redirects are returned to the caller untouched and compressed bodies are
/// passed through as-is, so the relay sees exactly what the upstream sent.
#[derive(Debug, Clone)]
pub struct ReqwestUpstream {
    client: reqwest::Client,
}

impl ReqwestUpstream {
    pub fn new(connect_timeout: Duration) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl UpstreamClient for ReqwestUpstream {
    fn send(&self, request: Request<Body>) -> BoxFuture<'_, Result<Response<Body>, UpstreamError>> {
        Box::pin(async move {
            let (parts, body) = request.into_parts();

            let mut outbound = self
                .client
                .request(parts.method, parts.uri.to_string())
                .headers(parts.headers);
            // An empty body must not turn into a chunked upload.
            if body.size_hint().exact() != Some(0) {
                outbound = outbound.body(reqwest::Body::wrap_stream(body.into_data_stream()));
            }

            // Only the head has been read once `send` resolves.
            let upstream = outbound.send().await?;

            let status = upstream.status();
            let headers = upstream.headers().clone();
            let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
            *response.status_mut() = status;
            *response.headers_mut() = headers;
            Ok(response)
        })
    }
}
