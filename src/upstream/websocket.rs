//! Outbound WebSocket connector.

use std::io;
use std::num::NonZeroUsize;
use std::pin::Pin;
use std::time::Duration;

use axum::http::{header, HeaderMap, HeaderValue, Uri};
use futures_util::{future, future::BoxFuture, Sink, SinkExt, Stream, StreamExt, TryStreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{
    client::IntoClientRequest,
    error::{ProtocolError, SubProtocolError},
    protocol::WebSocketConfig,
    Error as WsError, Message,
};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::UpstreamError;
use crate::http::frame::Frame;

pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = io::Error> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, io::Error>> + Send>>;

type Upstream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Everything needed to open the upstream leg of a session.
#[derive(Debug, Clone)]
pub struct Handshake {
    pub uri: Uri,
    /// Subprotocols requested by the caller, in preference order.
    pub protocols: Vec<String>,
    /// End-to-end headers; hop-by-hop names are already removed.
    pub headers: HeaderMap,
    pub buffer_size: NonZeroUsize,
}

/// An established upstream WebSocket, split into its two halves.
pub struct UpstreamSocket {
    /// Subprotocol the upstream selected, if any.
    pub protocol: Option<String>,
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// Opens outbound WebSocket connections.
pub trait WebSocketConnector: Send + Sync {
    fn connect(&self, handshake: Handshake) -> BoxFuture<'_, Result<UpstreamSocket, UpstreamError>>;
}

/// [`WebSocketConnector`] over `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct TungsteniteConnector {
    connect_timeout: Duration,
}

impl TungsteniteConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl TungsteniteConnector {
    async fn open(
        &self,
        handshake: &Handshake,
        offer_protocols: bool,
    ) -> Result<(Upstream, Option<String>), UpstreamError> {
        let mut request = handshake.uri.clone().into_client_request()?;
        let headers = request.headers_mut();
        for (name, value) in handshake.headers.iter() {
            headers.append(name.clone(), value.clone());
        }
        if offer_protocols && !handshake.protocols.is_empty() {
            let joined = handshake.protocols.join(", ");
            let value = HeaderValue::from_str(&joined)
                .map_err(|e| UpstreamError::InvalidRequest(e.to_string()))?;
            headers.insert(header::SEC_WEBSOCKET_PROTOCOL, value);
        }

        let mut config = WebSocketConfig::default();
        config.read_buffer_size = handshake.buffer_size.get();
        config.write_buffer_size = handshake.buffer_size.get();

        let connecting = tokio_tungstenite::connect_async_with_config(request, Some(config), false);
        let (socket, response) = tokio::time::timeout(self.connect_timeout, connecting)
            .await
            .map_err(|_| UpstreamError::Timeout(self.connect_timeout))??;

        let protocol = response
            .headers()
            .get(header::SEC_WEBSOCKET_PROTOCOL)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        Ok((socket, protocol))
    }
}

impl WebSocketConnector for TungsteniteConnector {
    fn connect(&self, handshake: Handshake) -> BoxFuture<'_, Result<UpstreamSocket, UpstreamError>> {
        Box::pin(async move {
            let (socket, protocol) = match self.open(&handshake, true).await {
                // tungstenite fails a handshake where the server picked none of
                // the offered subprotocols; RFC 6455 allows it, so the session
                // goes ahead without one.
                Err(UpstreamError::WebSocket(WsError::Protocol(
                    ProtocolError::SecWebSocketSubProtocolError(SubProtocolError::NoSubProtocol),
                ))) => {
                    tracing::debug!(uri = %handshake.uri, "Upstream selected no subprotocol");
                    self.open(&handshake, false).await?
                }
                opened => opened?,
            };

            let (sink, stream) = socket.split();
            let sink = sink
                .sink_map_err(io::Error::other)
                .with(|frame: Frame| future::ready(Ok::<_, io::Error>(Message::from(frame))));
            let stream = stream.map_ok(Frame::from).map_err(io::Error::other);

            Ok(UpstreamSocket {
                protocol,
                sink: Box::pin(sink),
                stream: Box::pin(stream),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    fn handshake(uri: String, protocols: &[&str]) -> Handshake {
        Handshake {
            uri: uri.parse().unwrap(),
            protocols: protocols.iter().map(|p| p.to_string()).collect(),
            headers: HeaderMap::new(),
            buffer_size: NonZeroUsize::new(4096).unwrap(),
        }
    }

    #[tokio::test]
    async fn negotiates_first_protocol_and_relays_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let callback = |req: &Request, mut resp: Response| {
                let offered = req.headers()[header::SEC_WEBSOCKET_PROTOCOL].to_str().unwrap();
                let first = offered.split(',').next().unwrap().trim().to_string();
                resp.headers_mut()
                    .insert(header::SEC_WEBSOCKET_PROTOCOL, first.parse().unwrap());
                Ok::<_, ErrorResponse>(resp)
            };
            let mut ws = tokio_tungstenite::accept_hdr_async(tcp, callback).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_text() {
                    ws.send(msg).await.unwrap();
                }
            }
        });

        let connector = TungsteniteConnector::new(Duration::from_secs(2));
        let mut socket = connector
            .connect(handshake(format!("ws://{}/chat", addr), &["v2", "v1"]))
            .await
            .unwrap();

        assert_eq!(socket.protocol.as_deref(), Some("v2"));
        socket.sink.send(Frame::Text("echo".into())).await.unwrap();
        let reply = socket.stream.next().await.unwrap().unwrap();
        assert_eq!(reply, Frame::Text("echo".into()));
    }

    #[tokio::test]
    async fn upstream_without_subprotocol_still_connects() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Both handshake attempts land here; neither selects a protocol.
            while let Ok((tcp, _)) = listener.accept().await {
                tokio::spawn(async move {
                    if let Ok(mut ws) = tokio_tungstenite::accept_async(tcp).await {
                        while let Some(Ok(msg)) = ws.next().await {
                            if msg.is_text() {
                                let _ = ws.send(msg).await;
                            }
                        }
                    }
                });
            }
        });

        let connector = TungsteniteConnector::new(Duration::from_secs(2));
        let mut socket = connector
            .connect(handshake(format!("ws://{}/chat", addr), &["v1"]))
            .await
            .unwrap();

        assert_eq!(socket.protocol, None);
        socket.sink.send(Frame::Text("still here".into())).await.unwrap();
        let reply = socket.stream.next().await.unwrap().unwrap();
        assert_eq!(reply, Frame::Text("still here".into()));
    }

    #[tokio::test]
    async fn refused_connection_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let connector = TungsteniteConnector::new(Duration::from_secs(1));
        let result = connector
            .connect(handshake(format!("ws://{}/", addr), &[]))
            .await;
        assert!(matches!(result, Err(UpstreamError::WebSocket(_))));
    }
}
