//! Outbound request construction.
//!
//! # Responsibilities
//! - Translate an inbound request into a request against the upstream
//! - Carry the inbound body across as a lazy stream (never buffered)
//! - Force the `Host` header to the upstream authority
//! - Define the prepare-request hook run before each send
//!
//! # Design Decisions
//! - Every inbound header is copied with `append`, so repeated values
//!   survive in order and nothing is silently dropped
//! - Body presence depends on the method, not on whether a payload exists

use axum::{
    body::Body,
    http::{header, request::Parts, HeaderValue, Method, Request, Uri},
};
use futures_util::future::BoxFuture;

use crate::error::ProxyError;

/// Hook allowing calling code to mutate an outbound request before it is sent.
pub trait PrepareRequest: Send + Sync {
    fn prepare<'a>(
        &'a self,
        inbound: &'a Parts,
        outbound: &'a mut Request<Body>,
    ) -> BoxFuture<'a, Result<(), ProxyError>>;
}

/// Methods that conventionally carry no request body.
pub fn is_bodyless(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::DELETE | Method::TRACE
    )
}

/// Build the outbound request for `target` from an inbound request.
///
/// The method is copied from the inbound request while path and query come
/// verbatim from `target`. A body is attached only for content-bearing
/// methods.
pub fn build_outbound(
    inbound: &Parts,
    body: Body,
    target: Option<&Uri>,
) -> Result<Request<Body>, ProxyError> {
    let target = target.ok_or(ProxyError::InvalidArgument("target uri is required"))?;
    let authority = target
        .authority()
        .ok_or(ProxyError::InvalidArgument("target uri has no authority"))?;

    let with_body = !is_bodyless(&inbound.method);
    let body = if with_body { body } else { Body::empty() };

    let mut outbound = Request::builder()
        .method(inbound.method.clone())
        .uri(target.clone())
        .body(body)
        .map_err(|_| ProxyError::InvalidArgument("target uri"))?;

    let headers = outbound.headers_mut();
    for (name, value) in inbound.headers.iter() {
        headers.append(name.clone(), value.clone());
    }
    if !with_body {
        // A length or chunked declaration with no body attached would stall
        // the upstream waiting for bytes that never come.
        headers.remove(header::TRANSFER_ENCODING);
        headers.remove(header::CONTENT_LENGTH);
    }
    let host = HeaderValue::from_str(authority.as_str())
        .map_err(|_| ProxyError::InvalidArgument("target authority"))?;
    headers.insert(header::HOST, host);

    Ok(outbound)
}
