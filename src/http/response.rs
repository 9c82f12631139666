//! Response relay.
//!
//! # Responsibilities
//! - Send the outbound request and copy status and headers back verbatim
//! - Stream the body to the caller through a bounded copy buffer
//! - Route eligible bodies through the content rewrite pipeline
//!
//! # Data Flow
//! ```text
//! UpstreamClient::send → status + headers (Transfer-Encoding removed)
//!     → rewritable?  yes → collect → spawn_blocking(rewrite) → Body::from
//!                    no  → StreamReader → ReaderStream(80 KiB) → Body::from_stream
//! ```
//!
//! # Design Decisions
//! - Headers go out before the body is read, so a failure mid-body shows up
//!   to the caller as a truncated response rather than an error status
//! - A rewritten body is complete before headers are sent, so rewrite
//!   failures become a clean 5xx
//! - Every wait observes the request's cancellation token

use std::io;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, HeaderValue, Request, Response},
};
use futures_util::{stream, StreamExt, TryStreamExt};
use tokio_util::io::{ReaderStream, StreamReader};
use tokio_util::sync::CancellationToken;

use crate::error::ProxyError;
use crate::observability::metrics;
use crate::rewrite::{ContentRewriter, RewriteError};
use crate::upstream::UpstreamClient;

/// Copy buffer used when streaming a body through unchanged.
pub const COPY_BUFFER_SIZE: usize = 80 * 1024;

/// Largest compressed body collected for rewriting.
pub const MAX_REWRITE_BODY: usize = 32 * 1024 * 1024;

/// Send `outbound` and relay the upstream response.
pub async fn relay(
    client: &dyn UpstreamClient,
    outbound: Request<Body>,
    rewriter: Option<&Arc<ContentRewriter>>,
    cancel: CancellationToken,
) -> Result<Response<Body>, ProxyError> {
    let sent = tokio::select! {
        _ = cancel.cancelled() => None,
        result = client.send(outbound) => Some(result),
    };
    let upstream = sent.ok_or(ProxyError::Cancelled)??;

    let (mut parts, body) = upstream.into_parts();
    parts.headers.remove(header::TRANSFER_ENCODING);

    let rewriter = rewriter.filter(|r| r.applies_to(&parts.headers));
    let Some(rewriter) = rewriter else {
        return Ok(Response::from_parts(parts, stream_body(body, cancel)));
    };

    let collected = tokio::select! {
        _ = cancel.cancelled() => None,
        collected = axum::body::to_bytes(body, MAX_REWRITE_BODY) => Some(collected),
    };
    let compressed = collected.ok_or(ProxyError::Cancelled)?.map_err(|e| {
        ProxyError::UpstreamUnavailable(format!("reading body for rewrite: {}", e))
    })?;

    let worker = Arc::clone(rewriter);
    let rewritten = tokio::task::spawn_blocking(move || worker.rewrite(&compressed))
        .await
        .map_err(|e| RewriteError::Task(e.to_string()))
        .and_then(|result| result);

    match rewritten {
        Ok(bytes) => {
            metrics::record_rewrite("rewritten");
            parts
                .headers
                .insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
            Ok(Response::from_parts(parts, Body::from(bytes)))
        }
        Err(err) => {
            metrics::record_rewrite("failed");
            tracing::warn!(error = %err, "Content rewrite failed");
            Err(err.into())
        }
    }
}

/// Re-frame `body` through a fixed-size copy buffer that stops as soon as
/// `cancel` fires.
pub fn stream_body(body: Body, cancel: CancellationToken) -> Body {
    let reader = StreamReader::new(body.into_data_stream().map_err(io::Error::other));
    let chunks = ReaderStream::with_capacity(reader, COPY_BUFFER_SIZE);

    let relayed = stream::unfold(Some((chunks, cancel)), |state| async move {
        let (mut chunks, cancel) = state?;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Some((
                Err(io::Error::new(io::ErrorKind::Interrupted, "relay cancelled")),
                None,
            )),
            next = chunks.next() => next.map(|chunk| (chunk, Some((chunks, cancel)))),
        }
    });
    Body::from_stream(relayed)
}
