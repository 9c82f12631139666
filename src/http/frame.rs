//! Transport-neutral WebSocket frames.
//!
//! The inbound leg speaks axum's message type and the upstream leg speaks
//! tungstenite's. Both are converted into [`Frame`] so the relay loop only
//! deals with one shape.

use axum::extract::ws::{CloseFrame as AxumCloseFrame, Message as AxumMessage};
use bytes::Bytes;
use tokio_tungstenite::tungstenite::protocol::{frame::coding::CloseCode, CloseFrame};
use tokio_tungstenite::tungstenite::Message;

/// Close status sent to one leg when the other leg's read fails.
pub const ENDPOINT_UNAVAILABLE: u16 = 1001;

/// Close status and reason carried by a close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

impl CloseReason {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Close status used when the peer leg disappeared.
    pub fn endpoint_unavailable() -> Self {
        Self::new(ENDPOINT_UNAVAILABLE, "")
    }
}

/// A complete WebSocket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
    Ping(Bytes),
    Pong(Bytes),
    Close(Option<CloseReason>),
}

impl Frame {
    /// Ping and pong are answered by the transport on each leg.
    pub fn is_control(&self) -> bool {
        matches!(self, Frame::Ping(_) | Frame::Pong(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Text(_) => "text",
            Frame::Binary(_) => "binary",
            Frame::Ping(_) => "ping",
            Frame::Pong(_) => "pong",
            Frame::Close(_) => "close",
        }
    }
}

impl From<AxumMessage> for Frame {
    fn from(message: AxumMessage) -> Self {
        match message {
            AxumMessage::Text(text) => Frame::Text(text.as_str().to_owned()),
            AxumMessage::Binary(data) => Frame::Binary(data),
            AxumMessage::Ping(data) => Frame::Ping(data),
            AxumMessage::Pong(data) => Frame::Pong(data),
            AxumMessage::Close(frame) => Frame::Close(
                frame.map(|f| CloseReason::new(f.code, f.reason.as_str())),
            ),
        }
    }
}

impl From<Frame> for AxumMessage {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => AxumMessage::Text(text.into()),
            Frame::Binary(data) => AxumMessage::Binary(data),
            Frame::Ping(data) => AxumMessage::Ping(data),
            Frame::Pong(data) => AxumMessage::Pong(data),
            Frame::Close(reason) => AxumMessage::Close(reason.map(|r| AxumCloseFrame {
                code: r.code,
                reason: r.reason.into(),
            })),
        }
    }
}

impl From<Message> for Frame {
    fn from(message: Message) -> Self {
        match message {
            Message::Text(text) => Frame::Text(text.as_str().to_owned()),
            Message::Binary(data) => Frame::Binary(data),
            Message::Ping(data) => Frame::Ping(data),
            Message::Pong(data) => Frame::Pong(data),
            Message::Close(frame) => Frame::Close(
                frame.map(|f| CloseReason::new(u16::from(f.code), f.reason.as_str())),
            ),
            // Raw frames are only produced on the write path.
            Message::Frame(raw) => Frame::Binary(Bytes::copy_from_slice(raw.payload())),
        }
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(data) => Message::Binary(data),
            Frame::Ping(data) => Message::Ping(data),
            Frame::Pong(data) => Message::Pong(data),
            Frame::Close(reason) => Message::Close(reason.map(|r| CloseFrame {
                code: CloseCode::from(r.code),
                reason: r.reason.into(),
            })),
        }
    }
}
