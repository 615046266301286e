//! Shared utilities for integration tests.
//!
//! Everything binds to `127.0.0.1:0`, so tests can run in parallel.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use shipline::config::{LinkConfig, LocalConfig, OffshoreConfig, ShipConfig, TunnelConfig};
use shipline::http::parse_head;
use shipline::lifecycle::Shutdown;
use shipline::net::Listener;
use shipline::offshore::{HttpForwarder, OffshoreDispatcher};
use shipline::ship::{LocalFrontend, UplinkSession};

/// A request as the origin saw it.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl SeenRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub type Seen = Arc<Mutex<Vec<SeenRequest>>>;

/// Start a mock origin. `respond` builds `(status line, body)` for each request.
pub async fn start_origin<F>(respond: F) -> (SocketAddr, Seen)
where
    F: Fn(&SeenRequest) -> (&'static str, String) + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let respond = Arc::new(respond);

    let record = seen.clone();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let respond = respond.clone();
            let record = record.clone();
            tokio::spawn(async move {
                let Some(request) = read_request(&mut socket).await else {
                    return;
                };
                let (status, body) = respond(&request);
                record.lock().unwrap().push(request);

                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, seen)
}

/// Origin that answers `200 OK` with the request path as body.
pub async fn start_path_origin() -> (SocketAddr, Seen) {
    start_origin(|req| ("200 OK", path_of(&req.target))).await
}

fn path_of(target: &str) -> String {
    match target.split_once("://") {
        Some((_, rest)) => rest.find('/').map(|i| rest[i..].to_string()).unwrap_or_else(|| "/".into()),
        None => target.to_string(),
    }
}

async fn read_request(socket: &mut TcpStream) -> Option<SeenRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        if let Ok(Some((head, used))) = parse_head(&buf) {
            let len = head.body_length().unwrap_or(0);
            while buf.len() < used + len {
                let n = socket.read(&mut chunk).await.ok()?;
                if n == 0 {
                    return None;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            return Some(SeenRequest {
                method: head.method.clone(),
                target: head.target.clone(),
                headers: head.headers.iter().map(|(n, v)| (n.to_string(), String::from_utf8_lossy(v).into_owned())).collect(),
                body: buf[used..used + len].to_vec(),
            });
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Raw TCP server that echoes every byte back, for CONNECT tests.
pub async fn start_echo_target() -> SocketAddr {
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

/// An address nothing listens on.
pub async fn dead_address() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Start the offshore proxy. Keep the returned [`Shutdown`] alive.
pub async fn start_offshore() -> (SocketAddr, Shutdown) {
    let mut config = OffshoreConfig::default();
    config.forward.request_timeout_secs = 5;
    config.forward.connect_timeout_secs = 2;
    config.tunnel.linger_ms = 500;

    let forwarder = HttpForwarder::new(&config.forward).unwrap();
    let listener = Listener::bind("127.0.0.1:0", 16).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    tokio::spawn(OffshoreDispatcher::new(forwarder, config).run(listener, shutdown.subscribe()));
    (addr, shutdown)
}

/// Ship settings suited to tests: fast reconnects, short waits.
pub fn ship_config(offshore: SocketAddr) -> ShipConfig {
    ShipConfig {
        local: LocalConfig {
            request_timeout_secs: 5,
            ..LocalConfig::default()
        },
        link: LinkConfig {
            offshore_address: offshore.to_string(),
            connect_timeout_secs: 1,
            base_delay_ms: 20,
            max_delay_ms: 100,
            reconnect_pause_secs: 1,
            response_timeout_secs: 5,
            ..LinkConfig::default()
        },
        tunnel: TunnelConfig { linger_ms: 500 },
        ..ShipConfig::default()
    }
}

/// Start the ship proxy with `config`. Keep the returned [`Shutdown`] alive.
pub async fn start_ship(config: ShipConfig) -> (SocketAddr, Shutdown) {
    let listener = Listener::bind("127.0.0.1:0", 64).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let (uplink, _worker) = UplinkSession::spawn(config.link.clone(), shutdown.subscribe());
    let frontend = LocalFrontend::new(uplink, config.local, config.tunnel);
    tokio::spawn(frontend.run(listener, shutdown.subscribe()));
    (addr, shutdown)
}

/// reqwest client that sends everything through the ship proxy.
pub fn proxied_client(ship: SocketAddr) -> reqwest::Client {
    reqwest::Client::builder()
        .proxy(reqwest::Proxy::http(format!("http://{ship}")).unwrap())
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// Send raw bytes to the ship and read one response (head + Content-Length body).
pub async fn raw_exchange(stream: &mut TcpStream, request: &[u8]) -> String {
    stream.write_all(request).await.unwrap();
    read_response(stream).await
}

pub async fn read_response(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let text = String::from_utf8_lossy(&buf).to_string();
        if let Some(end) = text.find("\r\n\r\n") {
            let len = text[..end]
                .lines()
                .find_map(|l| {
                    let (name, value) = l.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length").then(|| value.trim().parse::<usize>().ok())?
                })
                .unwrap_or(0);
            if buf.len() >= end + 4 + len {
                return text;
            }
        }
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed before full response: {text:?}");
        buf.extend_from_slice(&chunk[..n]);
    }
}
