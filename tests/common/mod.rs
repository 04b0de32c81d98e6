//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use quota_gateway::config::{AppConfig, GatewayConfig, RouteConfig};
use quota_gateway::quota::CounterStore;
use quota_gateway::{HttpServer, Shutdown};

/// Raw requests seen by a mock backend, oldest first.
pub type Captured = Arc<Mutex<Vec<String>>>;

/// Start a mock backend that answers every request with `status`,
/// `content_type` and `body`, recording the raw request text.
pub async fn start_mock_backend(
    status: u16,
    content_type: &'static str,
    body: &'static str,
) -> (SocketAddr, Captured) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let captured: Captured = Arc::new(Mutex::new(Vec::new()));
    let seen = captured.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let seen = seen.clone();
            tokio::spawn(async move {
                let raw = read_request(&mut socket).await;
                seen.lock().unwrap().push(raw);

                let content_type_line = if content_type.is_empty() {
                    String::new()
                } else {
                    format!("Content-Type: {}\r\n", content_type)
                };
                let response = format!(
                    "HTTP/1.1 {} OK\r\n{}Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    content_type_line,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, captured)
}

/// Start a backend that answers `json`, gzip-encoded when the request
/// advertises gzip in `Accept-Encoding`.
pub async fn start_gzip_backend(json: &'static str) -> (SocketAddr, Captured) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let captured: Captured = Arc::new(Mutex::new(Vec::new()));
    let seen = captured.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let seen = seen.clone();
            tokio::spawn(async move {
                let raw = read_request(&mut socket).await;
                let wants_gzip = raw
                    .lines()
                    .any(|l| l.to_ascii_lowercase().starts_with("accept-encoding:") && l.contains("gzip"));
                seen.lock().unwrap().push(raw);

                let (encoding, body) = if wants_gzip {
                    ("Content-Encoding: gzip\r\n", gzip(json.as_bytes()))
                } else {
                    ("", json.as_bytes().to_vec())
                };
                let head = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n{}Content-Length: {}\r\nConnection: close\r\n\r\n",
                    encoding,
                    body.len()
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(&body).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, captured)
}

/// Start a backend that reads requests and never answers.
pub async fn start_silent_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let _ = read_request(&mut socket).await;
                tokio::time::sleep(Duration::from_secs(30)).await;
            });
        }
    });

    addr
}

/// Gzip member holding `data` in a single stored deflate block.
pub fn gzip(data: &[u8]) -> Vec<u8> {
    let len = data.len() as u16;
    let mut out = vec![0x1f, 0x8b, 0x08, 0, 0, 0, 0, 0, 0, 0xff];
    out.push(0x01);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&(!len).to_le_bytes());
    out.extend_from_slice(data);
    out.extend_from_slice(&crc32(data).to_le_bytes());
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out
}

fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xffff_ffffu32;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ 0xedb8_8320 } else { crc >> 1 };
        }
    }
    !crc
}

/// Read head and body (by Content-Length) of one HTTP/1.1 request.
async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf);
        if let Some(head_end) = text.find("\r\n\r\n") {
            let content_length = text[..head_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

pub fn app(key: &str, minutely_limit: u64) -> AppConfig {
    AppConfig {
        id: format!("id-{}", key),
        key: key.to_string(),
        name: format!("app {}", key),
        daily_limit: 10_000,
        minutely_limit,
    }
}

/// Config with one catch-all route to `backend` and the given callers.
pub fn gateway_config(backend: SocketAddr, apps: Vec<AppConfig>) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.observability.metrics_enabled = false;
    config.timeouts.upstream_secs = 2;
    config.routes.push(RouteConfig {
        name: "backend".into(),
        host: None,
        path_prefix: "/".into(),
        upstream: format!("http://{}", backend),
        strip_prefix: false,
        priority: 0,
    });
    config.apps = apps;
    config
}

/// A running gateway. Dropping it stops the server.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub config_tx: mpsc::UnboundedSender<GatewayConfig>,
    shutdown: Shutdown,
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn start_gateway(config: GatewayConfig, store: Arc<dyn CounterStore>) -> TestGateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let (config_tx, config_updates) = mpsc::unbounded_channel();
    let server = HttpServer::with_store(config, store);
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestGateway {
        addr,
        config_tx,
        shutdown,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
