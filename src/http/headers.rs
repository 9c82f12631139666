//! Header filtering and forwarding headers.
//!
//! # Responsibilities
//! - Decide which headers are hop-by-hop for WebSocket upgrade traffic
//! - Add X-Forwarded-For, X-Forwarded-Proto, X-Forwarded-Host
//!
//! # Design Decisions
//! - Header names are compared case-insensitively
//! - The client IP is appended to an existing X-Forwarded-For chain
//! - Proto and Host are overwritten with what this proxy actually saw

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, request::Parts, HeaderMap, HeaderName, HeaderValue, Request},
};
use futures_util::future::BoxFuture;

use crate::error::ProxyError;
use crate::http::request::PrepareRequest;

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
pub const X_FORWARDED_HOST: &str = "x-forwarded-host";

/// Headers that belong to a single WebSocket handshake leg.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "host",
    "upgrade",
    "sec-websocket-accept",
    "sec-websocket-protocol",
    "sec-websocket-key",
    "sec-websocket-version",
    "sec-websocket-extensions",
];

/// Returns false for headers that must not be copied into an outbound
/// WebSocket handshake.
pub fn is_forwardable(name: &str) -> bool {
    !HOP_BY_HOP.iter().any(|hop| hop.eq_ignore_ascii_case(name))
}

/// Copy every forwardable header, keeping repeated values in order.
pub fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        if is_forwardable(name.as_str()) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

/// Prepare hook adding the standard `X-Forwarded-*` headers.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardedHeaders;

impl ForwardedHeaders {
    fn apply(inbound: &Parts, outbound: &mut HeaderMap) -> Result<(), ProxyError> {
        if let Some(ConnectInfo(addr)) = inbound.extensions.get::<ConnectInfo<SocketAddr>>() {
            let chain = match inbound
                .headers
                .get(X_FORWARDED_FOR)
                .and_then(|v| v.to_str().ok())
            {
                Some(existing) => format!("{}, {}", existing, addr.ip()),
                None => addr.ip().to_string(),
            };
            outbound.insert(
                HeaderName::from_static(X_FORWARDED_FOR),
                HeaderValue::from_str(&chain)
                    .map_err(|_| ProxyError::InvalidArgument("x-forwarded-for"))?,
            );
        }

        let proto = inbound.uri.scheme_str().unwrap_or("http");
        outbound.insert(
            HeaderName::from_static(X_FORWARDED_PROTO),
            HeaderValue::from_str(proto).map_err(|_| ProxyError::InvalidArgument("x-forwarded-proto"))?,
        );

        if let Some(host) = inbound.headers.get(header::HOST) {
            outbound.insert(HeaderName::from_static(X_FORWARDED_HOST), host.clone());
        }
        Ok(())
    }
}

impl PrepareRequest for ForwardedHeaders {
    fn prepare<'a>(
        &'a self,
        inbound: &'a Parts,
        outbound: &'a mut Request<Body>,
    ) -> BoxFuture<'a, Result<(), ProxyError>> {
        Box::pin(async move { Self::apply(inbound, outbound.headers_mut()) })
    }
}
