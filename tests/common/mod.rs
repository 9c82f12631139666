//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::io::Write;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use flate2::{write::GzEncoder, Compression};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::protocol::{frame::coding::CloseCode, CloseFrame};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};

use mirror_proxy::{HttpServer, ProxyConfig, Shutdown};

/// Raw requests seen by a recording backend, one string per request.
pub type Seen = Arc<Mutex<Vec<String>>>;

/// Read one request from `socket`: the head plus a `Content-Length` body.
async fn read_request(socket: &mut TcpStream) -> String {
    let mut raw = Vec::new();
    let mut buf = [0u8; 1024];
    let head_end = loop {
        if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return String::from_utf8_lossy(&raw).into_owned(),
            Ok(n) => raw.extend_from_slice(&buf[..n]),
        }
    };

    let head = String::from_utf8_lossy(&raw[..head_end]).to_ascii_lowercase();
    let length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while raw.len() < head_end + length {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => raw.extend_from_slice(&buf[..n]),
        }
    }
    String::from_utf8_lossy(&raw).into_owned()
}

/// Start a backend that answers every request with the given status line,
/// extra headers and body, and records each raw request.
pub async fn start_backend(status: &'static str, headers: Vec<String>, body: Vec<u8>) -> (SocketAddr, Seen) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    serve(listener, status, headers, body)
}

fn serve(listener: TcpListener, status: &'static str, headers: Vec<String>, body: Vec<u8>) -> (SocketAddr, Seen) {
    let addr = listener.local_addr().unwrap();
    let seen: Seen = Arc::default();
    let body = Arc::new(body);
    let headers = Arc::new(headers);

    let recorded = seen.clone();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let recorded = recorded.clone();
            let body = body.clone();
            let headers = headers.clone();
            tokio::spawn(async move {
                let request = read_request(&mut socket).await;
                recorded.lock().unwrap().push(request);

                let mut response = format!("HTTP/1.1 {}\r\n", status);
                for header in headers.iter() {
                    response.push_str(header);
                    response.push_str("\r\n");
                }
                response.push_str(&format!(
                    "Content-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                ));
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.write_all(&body).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, seen)
}

fn html_headers() -> Vec<String> {
    vec![
        "Content-Type: text/html; charset=utf-8".into(),
        "Content-Encoding: gzip".into(),
    ]
}

/// Start a backend serving `html` gzip-compressed as `text/html`.
pub async fn start_html_backend(html: &str) -> (SocketAddr, Seen) {
    start_backend("200 OK", html_headers(), gzip(html)).await
}

/// Like [`start_html_backend`], for documents that mention the backend's
/// own address.
pub async fn start_html_backend_with<F>(render: F) -> (SocketAddr, Seen)
where
    F: FnOnce(SocketAddr) -> String,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let html = render(listener.local_addr().unwrap());
    serve(listener, "200 OK", html_headers(), gzip(&html))
}

/// Start a WebSocket upstream that echoes text and binary frames. A text
/// frame reading `bye` is answered with a 1000 close carrying reason `bye`.
pub async fn start_ws_backend() -> SocketAddr {
    start_ws_backend_selecting(None).await
}

/// Like [`start_ws_backend`], answering the handshake with `protocol` as
/// the selected subprotocol when the client offered it.
pub async fn start_ws_backend_selecting(protocol: Option<&'static str>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            tokio::spawn(async move {
                let select = move |request: &Request, mut response: Response| {
                    let offered = request
                        .headers()
                        .get("sec-websocket-protocol")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("");
                    if let Some(chosen) = protocol {
                        if offered.split(',').any(|p| p.trim() == chosen) {
                            response
                                .headers_mut()
                                .insert("sec-websocket-protocol", chosen.parse().unwrap());
                        }
                    }
                    Ok::<_, ErrorResponse>(response)
                };
                let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(tcp, select).await else {
                    return;
                };
                while let Some(Ok(message)) = ws.next().await {
                    match message {
                        Message::Text(text) if text.as_str() == "bye" => {
                            let close = CloseFrame {
                                code: CloseCode::Normal,
                                reason: Utf8Bytes::from_static("bye"),
                            };
                            let _ = ws.send(Message::Close(Some(close))).await;
                        }
                        Message::Text(_) | Message::Binary(_) => {
                            if ws.send(message).await.is_err() {
                                break;
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }
            });
        }
    });

    addr
}

/// Send a raw upgrade request offering `protocols` and return the response
/// head, lowercased.
pub async fn raw_upgrade(addr: SocketAddr, path: &str, protocols: &str) -> String {
    let mut socket = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: Upgrade\r\nUpgrade: websocket\r\n\
         Sec-WebSocket-Version: 13\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
         Sec-WebSocket-Protocol: {}\r\n\r\n",
        path, addr, protocols
    );
    socket.write_all(request.as_bytes()).await.unwrap();

    let mut head = Vec::new();
    let mut buf = [0u8; 512];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = tokio::time::timeout(Duration::from_secs(5), socket.read(&mut buf))
            .await
            .expect("no upgrade response")
            .unwrap();
        if n == 0 {
            break;
        }
        head.extend_from_slice(&buf[..n]);
    }
    String::from_utf8_lossy(&head).to_ascii_lowercase()
}

/// Address that refuses connections.
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Configuration forwarding plain HTTP to `upstream`.
pub fn config_for(upstream: SocketAddr) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.upstream.scheme = "http".into();
    config.upstream.host = upstream.to_string();
    config.timeouts.connect_secs = 2;
    config.timeouts.request_secs = 5;
    config
}

/// A running proxy instance.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start the proxy on an ephemeral port. `configure` sees the bound address
/// so it can point the public origin at it.
pub async fn start_proxy<F>(mut config: ProxyConfig, configure: F) -> TestProxy
where
    F: FnOnce(&mut ProxyConfig, SocketAddr),
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    configure(&mut config, addr);

    let shutdown = Shutdown::new();
    let server = HttpServer::new(&config, shutdown.clone()).unwrap();
    tokio::spawn(async move {
        let _ = server.run(listener).await;
    });

    TestProxy { addr, shutdown }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .pool_max_idle_per_host(0)
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

pub fn gzip(text: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

pub fn gunzip(bytes: &[u8]) -> String {
    use std::io::Read;
    let mut out = String::new();
    flate2::read::GzDecoder::new(bytes)
        .read_to_string(&mut out)
        .unwrap();
    out
}
