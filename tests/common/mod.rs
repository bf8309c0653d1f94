//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::AtomicU32;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use relayd::config::schema::{
    Algorithm, BackendConfig, BalancerConfig, HealthCheckConfig, PoolConfig, Protocol,
};

/// Read the request head from a socket (through the blank line).
async fn read_request_head(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        match tokio::time::timeout(Duration::from_secs(2), socket.read(&mut chunk)).await {
            Ok(Ok(n)) if n > 0 => {
                buf.extend_from_slice(&chunk[..n]);
                if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            _ => break,
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}

fn status_line(status: u16) -> &'static str {
    match status {
        200 => "200 OK",
        404 => "404 Not Found",
        429 => "429 Too Many Requests",
        500 => "500 Internal Server Error",
        502 => "502 Bad Gateway",
        503 => "503 Service Unavailable",
        _ => "200 OK",
    }
}

async fn write_response(
    socket: &mut tokio::net::TcpStream,
    status: u16,
    content_type: &str,
    body: &str,
) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_line(status),
        content_type,
        body.len(),
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

/// Start a mock backend returning a fixed 200 response. Returns its
/// address and a counter of requests served.
pub async fn start_mock_backend(response: &'static str) -> (SocketAddr, Arc<AtomicU32>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicU32::new(0));
    let counter = hits.clone();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let counter = counter.clone();
                    tokio::spawn(async move {
                        let _ = read_request_head(&mut socket).await;
                        counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                        write_response(&mut socket, 200, "text/plain", response).await;
                    });
                }
                Err(_) => break,
            }
        }
    });
    (addr, hits)
}

/// Start a programmable mock backend; the closure decides each response.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let _ = read_request_head(&mut socket).await;
                        let (status, body) = f().await;
                        write_response(&mut socket, status, "text/plain", &body).await;
                    });
                }
                Err(_) => break,
            }
        }
    });
    addr
}

/// Start a mock backend that records each request head it receives.
pub async fn start_capturing_backend(
    response: &'static str,
) -> (SocketAddr, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let captured = Arc::new(Mutex::new(Vec::new()));
    let log = captured.clone();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let log = log.clone();
                    tokio::spawn(async move {
                        let head = read_request_head(&mut socket).await;
                        log.lock().unwrap().push(head);
                        write_response(&mut socket, 200, "text/plain", response).await;
                    });
                }
                Err(_) => break,
            }
        }
    });
    (addr, captured)
}

/// An address nothing is listening on (bound once, then released).
pub async fn dead_backend_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Backend config entry pointing at a mock backend.
pub fn backend(id: &str, addr: SocketAddr) -> BackendConfig {
    BackendConfig {
        id: id.to_string(),
        name: None,
        host: addr.ip().to_string(),
        port: addr.port(),
        protocol: Protocol::Http,
        weight: 1,
        backup: false,
        max_connections: 100,
        insecure_skip_verify: false,
    }
}

/// Pool over the given backends with active health checking off, so tests
/// control eligibility directly.
pub fn pool(id: &str, algorithm: Algorithm, backends: Vec<BackendConfig>) -> PoolConfig {
    PoolConfig {
        id: id.to_string(),
        priority: 0,
        enabled: true,
        algorithm,
        backends,
        weight_overrides: Default::default(),
        sticky: Default::default(),
        health_check: HealthCheckConfig {
            enabled: false,
            ..Default::default()
        },
    }
}

/// Engine config with fast upstream timeouts for tests.
pub fn base_config(pools: Vec<PoolConfig>) -> BalancerConfig {
    let mut config = BalancerConfig {
        pools,
        ..Default::default()
    };
    config.upstream.timeout_secs = 2;
    config.upstream.retry_base_delay_ms = 10;
    config.upstream.retry_max_delay_ms = 50;
    config.observability.metrics_enabled = false;
    config
}

/// A synthetic client address for driving the dispatcher directly.
pub fn client_addr() -> SocketAddr {
    "203.0.113.5:40000".parse().unwrap()
}
