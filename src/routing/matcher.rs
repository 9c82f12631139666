//! Request classification.
//!
//! # Design Decisions
//! - Header names and the `Connection`/`Upgrade` tokens compare
//!   case-insensitively
//! - `Connection` may list several tokens; any of them may be `upgrade`

use axum::http::{header, HeaderMap, Request};

/// How a request is forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    WebSocket,
    Http,
}

/// True when the headers ask to switch the connection to WebSocket.
pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    let connection_upgrade = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));

    let upgrade_websocket = headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("websocket"));

    connection_upgrade && upgrade_websocket
}

pub fn classify<B>(request: &Request<B>) -> RouteKind {
    if is_websocket_upgrade(request.headers()) {
        RouteKind::WebSocket
    } else {
        RouteKind::Http
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(connection: Option<&str>, upgrade: Option<&str>) -> Request<()> {
        let mut builder = Request::builder().uri("/socket");
        if let Some(value) = connection {
            builder = builder.header(header::CONNECTION, value);
        }
        if let Some(value) = upgrade {
            builder = builder.header(header::UPGRADE, value);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn test_websocket_upgrade_detected() {
        assert_eq!(classify(&request(Some("Upgrade"), Some("websocket"))), RouteKind::WebSocket);
        assert_eq!(
            classify(&request(Some("keep-alive, UPGRADE"), Some("WebSocket"))),
            RouteKind::WebSocket
        );
    }

    #[test]
    fn test_plain_requests_are_http() {
        assert_eq!(classify(&request(None, None)), RouteKind::Http);
        assert_eq!(classify(&request(Some("keep-alive"), Some("websocket"))), RouteKind::Http);
        assert_eq!(classify(&request(Some("upgrade"), Some("h2c"))), RouteKind::Http);
        assert_eq!(classify(&request(Some("upgrade"), None)), RouteKind::Http);
    }
}
