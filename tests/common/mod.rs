//! Shared utilities for integration tests.
//!
//! Every listener binds port 0; helpers return the address they got.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use axum::Router;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use dispatch_proxy::config::{BackendConfig, ProxyConfig, RouteConfig};
use dispatch_proxy::net::Listener;
use dispatch_proxy::{HttpServer, Shutdown};

pub const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Read an HTTP head byte by byte so nothing after `\r\n\r\n` is consumed.
pub async fn read_head<S: AsyncRead + Unpin>(stream: &mut S) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let n = tokio::time::timeout(IO_TIMEOUT, stream.read(&mut byte))
            .await
            .expect("timed out reading head")
            .expect("read failed");
        if n == 0 {
            break;
        }
        head.push(byte[0]);
    }
    String::from_utf8_lossy(&head).into_owned()
}

/// Read until EOF.
pub async fn read_to_eof<S: AsyncRead + Unpin>(stream: &mut S) -> Vec<u8> {
    let mut out = Vec::new();
    tokio::time::timeout(IO_TIMEOUT, stream.read_to_end(&mut out))
        .await
        .expect("timed out waiting for EOF")
        .expect("read failed");
    out
}

/// Value of `name` in a raw HTTP head (case-insensitive).
pub fn header_value<'a>(head: &'a str, name: &str) -> Option<&'a str> {
    head.lines().skip(1).find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim().eq_ignore_ascii_case(name).then(|| value.trim())
    })
}

/// Address nothing listens on.
pub async fn dead_address() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Plain HTTP backend that answers every request with
/// `"<name> <METHOD> <target>"` and reports the `Host` it saw.
pub async fn start_mock_backend(name: &'static str) -> SocketAddr {
    start_programmable_backend(move |method, target, _| async move {
        (200, format!("{name} {method} {target}"))
    })
    .await
}

/// Plain HTTP backend driven by `f(method, target, head)`.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(String, String, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                let head = read_head(&mut socket).await;
                let mut request_line = head.lines().next().unwrap_or("").split(' ');
                let method = request_line.next().unwrap_or("").to_string();
                let target = request_line.next().unwrap_or("").to_string();
                let host = header_value(&head, "host").unwrap_or("").to_string();

                let (status, body) = f(method, target, head).await;
                let status_text = match status {
                    200 => "200 OK",
                    400 => "400 Bad Request",
                    403 => "403 Forbidden",
                    404 => "404 Not Found",
                    500 => "500 Internal Server Error",
                    _ => "200 OK",
                };

                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nX-Seen-Host: {}\r\nKeep-Alive: timeout=5\r\nConnection: close\r\n\r\n{}",
                    status_text,
                    body.len(),
                    host,
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// WebSocket backend that echoes every message on any path.
pub async fn start_ws_echo_backend() -> SocketAddr {
    async fn upgrade(ws: WebSocketUpgrade) -> Response {
        ws.on_upgrade(echo)
    }

    async fn echo(mut socket: WebSocket) {
        while let Some(Ok(msg)) = socket.recv().await {
            if matches!(msg, Message::Close(_)) {
                break;
            }
            if socket.send(msg).await.is_err() {
                break;
            }
        }
    }

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().fallback(upgrade);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// What a raw upgrade backend does once it has sent `101`.
#[derive(Debug, Clone, Copy)]
pub enum RawMode {
    /// Echo bytes until the peer closes.
    Echo,
    /// Send a short message, then close.
    GreetAndClose,
    /// Send `HELLO` in the same write as the `101`, then wait for EOF.
    GreetInline,
}

const SWITCHING: &[u8] =
    b"HTTP/1.1 101 Switching Protocols\r\nConnection: Upgrade\r\nUpgrade: rawtest\r\n\r\n";

/// Backend that switches protocols on any request, then speaks raw bytes.
///
/// Each connection reports the bytes it received after the handshake
/// once its read side sees EOF.
pub async fn start_raw_upgrade_backend(mode: RawMode) -> (SocketAddr, mpsc::UnboundedReceiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let _ = read_head(&mut socket).await;
                let mut greeting = SWITCHING.to_vec();
                if let RawMode::GreetInline = mode {
                    greeting.extend_from_slice(b"HELLO");
                }
                socket.write_all(&greeting).await.unwrap();

                match mode {
                    RawMode::Echo => {
                        let mut received = Vec::new();
                        let mut buf = [0u8; 4096];
                        loop {
                            match socket.read(&mut buf).await {
                                Ok(0) | Err(_) => break,
                                Ok(n) => {
                                    received.extend_from_slice(&buf[..n]);
                                    if socket.write_all(&buf[..n]).await.is_err() {
                                        break;
                                    }
                                }
                            }
                        }
                        let _ = tx.send(received);
                    }
                    RawMode::GreetAndClose => {
                        let _ = socket.write_all(b"goodbye").await;
                        let _ = socket.shutdown().await;
                        let mut rest = Vec::new();
                        let _ = socket.read_to_end(&mut rest).await;
                        let _ = tx.send(rest);
                    }
                    RawMode::GreetInline => {
                        let mut rest = Vec::new();
                        let _ = socket.read_to_end(&mut rest).await;
                        let _ = tx.send(rest);
                    }
                }
            });
        }
    });

    (addr, rx)
}

/// Backend that accepts connections and never answers.
pub async fn start_silent_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    addr
}

/// Config with the given backends and `(prefix, backend)` routes.
pub fn proxy_config(
    backends: &[(&str, SocketAddr)],
    routes: &[(&str, &str)],
    fallback: &str,
) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.timeouts.connect_secs = 2;
    config.timeouts.shutdown_grace_secs = 1;
    config.routing.fallback = fallback.into();
    config.backends = backends
        .iter()
        .map(|(name, addr)| BackendConfig {
            name: (*name).into(),
            address: addr.to_string(),
        })
        .collect();
    config.routes = routes
        .iter()
        .map(|(prefix, backend)| RouteConfig {
            name: None,
            path_prefix: (*prefix).into(),
            backend: (*backend).into(),
        })
        .collect();
    config
}

/// The usual two-backend layout: `/socket.io` → ws, everything else → web.
pub fn web_ws_config(web: SocketAddr, ws: SocketAddr) -> ProxyConfig {
    proxy_config(&[("web", web), ("ws", ws)], &[("/socket.io", "ws")], "web")
}

/// A running proxy.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<()>,
}

/// Start a proxy on an ephemeral port.
pub async fn start_proxy(config: ProxyConfig) -> TestProxy {
    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = tcp.local_addr().unwrap();
    let listener = Listener::from_tcp(tcp, config.listener.max_connections);
    let server = HttpServer::new(config).expect("config should build");

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    let handle = tokio::spawn(async move {
        server.run(listener, receiver).await.unwrap();
    });

    TestProxy {
        addr,
        shutdown,
        handle,
    }
}

/// Open a raw connection and send an upgrade handshake for `target`.
pub async fn raw_upgrade(proxy: SocketAddr, target: &str) -> (TcpStream, String) {
    raw_upgrade_with(proxy, target, b"").await
}

/// Like [`raw_upgrade`], with `early` bytes in the same write as the head.
pub async fn raw_upgrade_with(proxy: SocketAddr, target: &str, early: &[u8]) -> (TcpStream, String) {
    let mut stream = TcpStream::connect(proxy).await.unwrap();
    let mut request = format!(
        "GET {target} HTTP/1.1\r\nHost: {proxy}\r\nConnection: Upgrade\r\nUpgrade: rawtest\r\n\r\n"
    )
    .into_bytes();
    request.extend_from_slice(early);
    stream.write_all(&request).await.unwrap();
    let head = read_head(&mut stream).await;
    (stream, head)
}
