//! WebSocket proxy handling.
//!
//! # Responsibilities
//! - Open the upstream leg before the caller's upgrade is accepted
//! - Accept the caller with the subprotocol the upstream selected
//! - Pump frames in both directions until a side closes or fails
//!
//! # Data Flow
//! ```text
//! Client ←── pump(UpstreamToClient) ──── Proxy ←──── upstream stream
//! Client ──── pump(ClientToUpstream) ──→ Proxy ────→ upstream sink
//! ```
//!
//! # Design Decisions
//! - A failed upstream handshake answers 400 and never upgrades the caller
//! - Close frames carry their status and reason across; a failed read
//!   closes the other leg with 1001
//! - Ping/pong stay on their own leg, the transports answer them
//! - Both directions run in one task; when the first ends the second gets a
//!   short grace period to finish its close handshake

use std::fmt::Display;
use std::time::Duration;

use axum::{
    extract::{ws::Message, FromRequestParts, WebSocketUpgrade},
    http::{header, request::Parts, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures_util::{future, Sink, SinkExt, Stream, StreamExt, TryStreamExt};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::ProxyOptions;
use crate::error::ProxyError;
use crate::http::frame::{CloseReason, Frame};
use crate::http::headers::forwardable_headers;
use crate::observability::metrics;
use crate::upstream::{Handshake, UpstreamSocket, WebSocketConnector};

/// Time the second direction gets to finish after the first one ended.
pub const CLOSE_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToUpstream,
    UpstreamToClient,
}

impl Direction {
    pub fn label(self) -> &'static str {
        match self {
            Direction::ClientToUpstream => "client_to_upstream",
            Direction::UpstreamToClient => "upstream_to_client",
        }
    }
}

/// Why a pump direction stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PumpExit {
    /// A close frame was read and relayed.
    Closed(Option<CloseReason>),
    /// The source failed; the sink was closed with 1001.
    SourceFailed,
    /// The source ended without a close frame; the sink was closed with 1001.
    SourceEnded,
    /// The destination rejected a frame.
    SinkFailed,
    Cancelled,
}

enum Event<E> {
    KeepAlive,
    Read(Option<Result<Frame, E>>),
}

/// Relay frames from `source` to `sink` until a close, a failure or
/// cancellation. Frame order is preserved.
pub async fn pump<S, K, E>(
    mut source: S,
    mut sink: K,
    direction: Direction,
    keep_alive: Option<Duration>,
    cancel: CancellationToken,
) -> PumpExit
where
    S: Stream<Item = Result<Frame, E>> + Unpin,
    K: Sink<Frame> + Unpin,
    E: Display,
{
    let mut ticker = keep_alive.map(|period| {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => return PumpExit::Cancelled,
            _ = next_tick(&mut ticker) => Event::KeepAlive,
            next = source.next() => Event::Read(next),
        };

        match event {
            Event::KeepAlive => {
                if let Err(exit) = send(&mut sink, Frame::Ping(Bytes::new()), &cancel).await {
                    return exit;
                }
            }
            Event::Read(Some(Ok(frame))) if frame.is_control() => {}
            Event::Read(Some(Ok(Frame::Close(reason)))) => {
                tracing::debug!(
                    direction = direction.label(),
                    code = reason.as_ref().map(|r| r.code),
                    "Relaying close"
                );
                if let Err(PumpExit::Cancelled) =
                    send(&mut sink, Frame::Close(reason.clone()), &cancel).await
                {
                    return PumpExit::Cancelled;
                }
                return PumpExit::Closed(reason);
            }
            Event::Read(Some(Ok(frame))) => {
                let kind = frame.kind();
                if let Err(exit) = send(&mut sink, frame, &cancel).await {
                    tracing::debug!(direction = direction.label(), kind, "Destination rejected frame");
                    return exit;
                }
                metrics::record_ws_frame(direction.label());
            }
            Event::Read(Some(Err(err))) => {
                tracing::debug!(direction = direction.label(), error = %err, "Source read failed");
                return close_unavailable(&mut sink, &cancel, PumpExit::SourceFailed).await;
            }
            Event::Read(None) => {
                return close_unavailable(&mut sink, &cancel, PumpExit::SourceEnded).await;
            }
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => future::pending::<()>().await,
    }
}

async fn send<K>(sink: &mut K, frame: Frame, cancel: &CancellationToken) -> Result<(), PumpExit>
where
    K: Sink<Frame> + Unpin,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PumpExit::Cancelled),
        sent = sink.send(frame) => sent.map_err(|_| PumpExit::SinkFailed),
    }
}

async fn close_unavailable<K>(sink: &mut K, cancel: &CancellationToken, exit: PumpExit) -> PumpExit
where
    K: Sink<Frame> + Unpin,
{
    let close = Frame::Close(Some(CloseReason::endpoint_unavailable()));
    match send(sink, close, cancel).await {
        Err(PumpExit::Cancelled) => PumpExit::Cancelled,
        _ => exit,
    }
}

/// Run both pump directions for one session until both have ended.
pub async fn run_session<CS, CK, E>(
    client_stream: CS,
    client_sink: CK,
    upstream: UpstreamSocket,
    keep_alive: Option<Duration>,
    cancel: CancellationToken,
) -> (PumpExit, PumpExit)
where
    CS: Stream<Item = Result<Frame, E>> + Unpin,
    CK: Sink<Frame> + Unpin,
    E: Display,
{
    let session = cancel.child_token();
    let UpstreamSocket {
        sink: upstream_sink,
        stream: upstream_stream,
        ..
    } = upstream;

    let outbound = pump(
        client_stream,
        upstream_sink,
        Direction::ClientToUpstream,
        keep_alive,
        session.clone(),
    );
    let inbound = pump(
        upstream_stream,
        client_sink,
        Direction::UpstreamToClient,
        None,
        session.clone(),
    );
    tokio::pin!(outbound);
    tokio::pin!(inbound);

    let (first, outbound_first) = tokio::select! {
        exit = &mut outbound => (exit, true),
        exit = &mut inbound => (exit, false),
    };
    let remaining = async {
        if outbound_first {
            (&mut inbound).await
        } else {
            (&mut outbound).await
        }
    };
    let second = match tokio::time::timeout(CLOSE_GRACE, remaining).await {
        Ok(exit) => exit,
        Err(_) => {
            session.cancel();
            PumpExit::Cancelled
        }
    };

    if outbound_first {
        (first, second)
    } else {
        (second, first)
    }
}

/// Subprotocols listed by the caller, in order.
pub fn requested_protocols(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Proxy one WebSocket upgrade request to `target`.
pub async fn proxy_websocket(
    mut parts: Parts,
    target: Uri,
    connector: &dyn WebSocketConnector,
    options: &ProxyOptions,
    cancel: CancellationToken,
) -> Response {
    let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
        Ok(upgrade) => upgrade,
        Err(rejection) => return rejection.into_response(),
    };

    let session_id = Uuid::new_v4();
    let handshake = Handshake {
        uri: target.clone(),
        protocols: requested_protocols(&parts.headers),
        headers: forwardable_headers(&parts.headers),
        buffer_size: options.buffer_size,
    };

    let connected = tokio::select! {
        _ = cancel.cancelled() => None,
        result = connector.connect(handshake) => Some(result),
    };
    let upstream = match connected {
        Some(Ok(upstream)) => upstream,
        Some(Err(err)) => {
            let err = ProxyError::from(err);
            tracing::warn!(
                session_id = %session_id,
                target = %target,
                error = %err,
                "Upstream WebSocket handshake failed"
            );
            metrics::record_ws_session("connect_failed");
            return (StatusCode::BAD_REQUEST, err.to_string()).into_response();
        }
        None => return ProxyError::Cancelled.into_response(),
    };

    tracing::info!(
        session_id = %session_id,
        target = %target,
        protocol = upstream.protocol.as_deref().unwrap_or(""),
        "WebSocket session opened"
    );

    let mut upgrade = upgrade
        .read_buffer_size(options.buffer_size.get())
        .write_buffer_size(options.buffer_size.get());
    if let Some(protocol) = upstream.protocol.clone() {
        upgrade = upgrade.protocols([protocol]);
    }

    let keep_alive = options.keep_alive();
    upgrade.on_upgrade(move |socket| async move {
        let (sink, stream) = socket.split();
        let client_sink =
            sink.with(|frame: Frame| future::ready(Ok::<_, axum::Error>(Message::from(frame))));
        let client_stream = stream.map_ok(Frame::from);

        let (outbound, inbound) =
            run_session(client_stream, client_sink, upstream, keep_alive, cancel).await;

        let outcome = match (&outbound, &inbound) {
            (PumpExit::Cancelled, _) | (_, PumpExit::Cancelled) => "cancelled",
            (PumpExit::Closed(_), _) | (_, PumpExit::Closed(_)) => "closed",
            _ => "failed",
        };
        metrics::record_ws_session(outcome);
        tracing::info!(
            session_id = %session_id,
            client_to_upstream = ?outbound,
            upstream_to_client = ?inbound,
            "WebSocket session ended"
        );
    })
}
