//! Shared stub servers and helpers for proxy integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use localhost_proxy::{start, ProxyConfig, ProxyHandle};

/// Request as observed by a stub target.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub head: String,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    /// All values of a header, case-insensitive.
    pub fn header_values(&self, name: &str) -> Vec<String> {
        self.head
            .split("\r\n")
            .skip(1)
            .filter_map(|line| line.split_once(':'))
            .filter(|(n, _)| n.trim().eq_ignore_ascii_case(name))
            .map(|(_, v)| v.trim().to_string())
            .collect()
    }

    pub fn request_line(&self) -> &str {
        self.head.split("\r\n").next().unwrap_or_default()
    }
}

/// Start a proxy on an ephemeral loopback port.
pub async fn start_test_proxy() -> ProxyHandle {
    let mut config = ProxyConfig::default();
    config.listener.bind_port = 0;
    config.timeouts.connect_secs = 2;
    start(config).await.expect("proxy starts")
}

/// Read one request from a socket.
///
/// `pending` carries bytes read past the previous request, so several
/// requests can be read off one keep-alive connection. Bodies framed by
/// Content-Length or chunked encoding (without trailers) are supported.
pub async fn read_request(socket: &mut TcpStream, pending: &mut Vec<u8>) -> Option<CapturedRequest> {
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        if let Some(pos) = pending.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        pending.extend_from_slice(&chunk[..n]);
    };
    let head = String::from_utf8_lossy(&pending[..head_end]).into_owned();
    let request = CapturedRequest {
        head,
        body: Vec::new(),
    };
    let chunked = request
        .header_values("transfer-encoding")
        .iter()
        .any(|v| v.eq_ignore_ascii_case("chunked"));

    let body_end = loop {
        let body = &pending[head_end..];
        let end = if chunked {
            if body.starts_with(b"0\r\n\r\n") {
                Some(5)
            } else {
                body.windows(7)
                    .position(|w| w == b"\r\n0\r\n\r\n")
                    .map(|pos| pos + 7)
            }
        } else {
            let length = request
                .header_values("content-length")
                .first()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(0);
            (body.len() >= length).then_some(length)
        };
        if let Some(end) = end {
            break head_end + end;
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        pending.extend_from_slice(&chunk[..n]);
    };

    let body = pending[head_end..body_end].to_vec();
    pending.drain(..body_end);
    Some(CapturedRequest { body, ..request })
}

fn ok_response(payload: &str, close: bool) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: {}\r\n\r\n{}",
        payload.len(),
        if close { "close" } else { "keep-alive" },
        payload
    )
}

/// Stub HTTP target: records each request and answers with `payload`.
///
/// `delay` is applied after the request is captured and before replying.
pub async fn spawn_stub_target(
    payload: String,
    delay: Duration,
) -> (SocketAddr, mpsc::UnboundedReceiver<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            let payload = payload.clone();
            tokio::spawn(async move {
                let Some(request) = read_request(&mut socket, &mut Vec::new()).await else {
                    return;
                };
                let _ = tx.send(request);
                tokio::time::sleep(delay).await;
                let _ = socket.write_all(ok_response(&payload, true).as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, rx)
}

/// Keep-alive stub HTTP target: answers every request on a connection and
/// records each one.
///
/// With `honor_close` the connection is closed after a request carrying
/// `Connection: close`; otherwise it stays open whatever the client asks.
pub async fn spawn_keepalive_target(
    payload: String,
    honor_close: bool,
) -> (SocketAddr, mpsc::UnboundedReceiver<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            let payload = payload.clone();
            tokio::spawn(async move {
                let mut pending = Vec::new();
                while let Some(request) = read_request(&mut socket, &mut pending).await {
                    let close = honor_close
                        && request
                            .header_values("connection")
                            .iter()
                            .any(|v| v.eq_ignore_ascii_case("close"));
                    let _ = tx.send(request);
                    if socket.write_all(ok_response(&payload, close).as_bytes()).await.is_err() {
                        return;
                    }
                    if close {
                        let _ = socket.shutdown().await;
                        return;
                    }
                }
            });
        }
    });

    (addr, rx)
}

/// Stub TLS-ish target that echoes every byte back.
pub async fn spawn_echo_target() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut r, mut w) = socket.split();
                let _ = tokio::io::copy(&mut r, &mut w).await;
            });
        }
    });
    addr
}

/// Target that hands each accepted socket to the test.
pub async fn spawn_capturing_target() -> (SocketAddr, mpsc::UnboundedReceiver<TcpStream>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            if tx.send(socket).is_err() {
                break;
            }
        }
    });
    (addr, rx)
}

/// A loopback address nothing is listening on.
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Read until EOF, failing the test if it takes too long.
pub async fn read_to_end(stream: &mut TcpStream) -> Vec<u8> {
    let mut out = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut out))
        .await
        .expect("peer closed in time")
        .expect("read succeeds");
    out
}

/// Body of a raw HTTP response.
pub fn response_body(raw: &[u8]) -> &[u8] {
    raw.windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| &raw[pos + 4..])
        .unwrap_or_default()
}
