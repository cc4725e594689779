//! Shared utilities for integration tests.
#![allow(dead_code)]

use axum::http::StatusCode;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use ha_gateway::config::parse_config;
use ha_gateway::ha::HaProvider;
use ha_gateway::{GatewayConfig, HttpServer, Shutdown};

pub const STANDBY_MARKER: &str = "This is a standby Livy Instance";

/// Canned response written by a mock backend.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl MockResponse {
    pub fn ok(body: &str) -> Self {
        Self::status(200, body)
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    /// A standby node's rejection page.
    pub fn standby() -> Self {
        Self::status(403, &format!("<html><body>{}</body></html>", STANDBY_MARKER))
    }

    /// A standby node pointing at the active node.
    pub fn standby_redirect(location: &str) -> Self {
        let mut response = Self::status(307, STANDBY_MARKER);
        response.headers.push(("Location".into(), location.into()));
        response
    }
}

/// A raw-TCP HTTP/1.1 backend that records the request line of every hit.
pub struct MockBackend {
    pub addr: SocketAddr,
    hits: Arc<Mutex<Vec<String>>>,
}

impl MockBackend {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// `"METHOD /path?query"` for every request received, in order.
    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }

    pub fn hit_count(&self) -> usize {
        self.hits.lock().unwrap().len()
    }
}

/// Start a backend answering every request with `handler(path)`.
pub async fn start_backend<F>(handler: F) -> MockBackend
where
    F: Fn(&str) -> MockResponse + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(Mutex::new(Vec::new()));
    let handler = Arc::new(handler);

    let recorded = hits.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let handler = handler.clone();
            let recorded = recorded.clone();
            tokio::spawn(async move {
                let _ = serve_one(socket, handler.as_ref(), &recorded).await;
            });
        }
    });

    MockBackend { addr, hits }
}

/// A backend that accepts connections and never answers.
pub async fn start_silent_backend() -> MockBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(Mutex::new(Vec::new()));

    let recorded = hits.clone();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            recorded.lock().unwrap().push("CONNECT".to_string());
            held.push(socket);
        }
    });

    MockBackend { addr, hits }
}

/// Address with nothing listening on it.
pub async fn dead_address() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

async fn serve_one<F>(
    mut socket: TcpStream,
    handler: &F,
    recorded: &Mutex<Vec<String>>,
) -> std::io::Result<()>
where
    F: Fn(&str) -> MockResponse,
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < head_end + content_length {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let request_line = head.lines().next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default();
    let path = parts.next().unwrap_or_default();
    recorded.lock().unwrap().push(format!("{} {}", method, path));

    let response = handler(path);
    let reason = StatusCode::from_u16(response.status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown");
    let mut raw = format!("HTTP/1.1 {} {}\r\n", response.status, reason);
    for (name, value) in &response.headers {
        raw.push_str(&format!("{}: {}\r\n", name, value));
    }
    raw.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n{}",
        response.body.len(),
        response.body
    ));

    socket.write_all(raw.as_bytes()).await?;
    socket.shutdown().await
}

/// Config with one `LIVYSERVER` service on `/livy` over `urls`.
pub fn livy_config(urls: &[String], max_failover_attempts: u32) -> GatewayConfig {
    let urls = urls
        .iter()
        .map(|u| format!("\"{}\"", u))
        .collect::<Vec<_>>()
        .join(", ");
    let request_secs = (u64::from(max_failover_attempts) + 1) * 3;
    parse_config(&format!(
        r#"
        [timeouts]
        attempt_secs = 2
        request_secs = {request_secs}

        [[services]]
        role = "LIVYSERVER"
        path_prefix = "/livy"
        strip_prefix = true
        urls = [{urls}]

        [services.ha]
        max_failover_attempts = {max_failover_attempts}
        failover_sleep_ms = 10
        "#
    ))
    .unwrap()
}

/// A gateway serving on an ephemeral port.
pub struct Gateway {
    pub addr: SocketAddr,
    pub provider: Arc<HaProvider>,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<Result<(), std::io::Error>>,
}

impl Gateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub async fn start_gateway(config: &GatewayConfig) -> Gateway {
    let server = HttpServer::new(config).unwrap();
    let provider = server.provider();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let handle = tokio::spawn(server.run(listener, shutdown.subscribe()));

    Gateway {
        addr,
        provider,
        shutdown,
        handle,
    }
}
