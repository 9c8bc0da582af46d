//! Shared utilities for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use session_relay::config::SessionConfig;
use session_relay::session::store::{CredentialStore, MemoryStore, StoreError};
use session_relay::session::{RefreshClient, RefreshFailure, TokenGrant};
use session_relay::transport::{PortAcceptor, RemotePort};

/// Session tuning that keeps retry sleeps short.
pub fn fast_session_config() -> SessionConfig {
    SessionConfig {
        base_delay_ms: 1,
        max_delay_ms: 5,
        ..SessionConfig::default()
    }
}

pub fn grant(access: &str, refresh: &str, expires_in: u64) -> TokenGrant {
    TokenGrant {
        access_token: Some(access.to_string()),
        refresh_token: Some(refresh.to_string()),
        expires_in: Some(expires_in),
        token_type: Some("bearer".to_string()),
        ..Default::default()
    }
}

/// Refresh client that replays a script, then repeats a fallback outcome.
pub struct ScriptedRefreshClient {
    script: Mutex<VecDeque<Result<TokenGrant, RefreshFailure>>>,
    fallback: Mutex<Result<TokenGrant, RefreshFailure>>,
    delay: Duration,
    calls: AtomicU32,
    active: Arc<AtomicU32>,
    max_active: AtomicU32,
    seen_tokens: Mutex<Vec<String>>,
}

/// Decrements the active-call count when a call finishes or is dropped.
struct ActiveCall(Arc<AtomicU32>);

impl Drop for ActiveCall {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedRefreshClient {
    pub fn new(fallback: Result<TokenGrant, RefreshFailure>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(fallback),
            delay: Duration::ZERO,
            calls: AtomicU32::new(0),
            active: Arc::new(AtomicU32::new(0)),
            max_active: AtomicU32::new(0),
            seen_tokens: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(Ok(grant("fresh-at", "fresh-rt", 3_600)))
    }

    pub fn failing() -> Self {
        Self::new(Err(RefreshFailure::Transport("connection refused".to_string())))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn then(self, outcome: Result<TokenGrant, RefreshFailure>) -> Self {
        self.script.lock().unwrap().push_back(outcome);
        self
    }

    pub fn set_fallback(&self, outcome: Result<TokenGrant, RefreshFailure>) {
        *self.fallback.lock().unwrap() = outcome;
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of refresh calls observed running at once.
    pub fn max_active(&self) -> u32 {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn seen_tokens(&self) -> Vec<String> {
        self.seen_tokens.lock().unwrap().clone()
    }
}

#[async_trait]
impl RefreshClient for ScriptedRefreshClient {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, RefreshFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        let _active = ActiveCall(self.active.clone());
        self.seen_tokens.lock().unwrap().push(refresh_token.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let scripted = self.script.lock().unwrap().pop_front();
        match scripted {
            Some(outcome) => outcome,
            None => self.fallback.lock().unwrap().clone(),
        }
    }
}

/// Memory store that counts reads.
#[derive(Default)]
pub struct CountingStore {
    pub inner: MemoryStore,
    gets: AtomicU32,
}

impl CountingStore {
    pub fn gets(&self) -> u32 {
        self.gets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialStore for CountingStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.inner.remove(key).await
    }
}

/// Wait for the next opened port, failing the test if none arrives.
pub async fn next_port(acceptor: &mut PortAcceptor) -> RemotePort {
    tokio::time::timeout(Duration::from_secs(2), acceptor.accept())
        .await
        .expect("no port opened within 2s")
        .expect("transport dropped")
}

/// Read one HTTP/1.1 request and return its body.
async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    let header_end = loop {
        let n = match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return String::new(),
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let headers = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
    let content_length = headers
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }

    String::from_utf8_lossy(&buf[header_end..]).to_string()
}

/// Start a programmable refresh endpoint on an ephemeral port. The handler
/// receives the request body and returns (status, body).
pub async fn start_refresh_endpoint<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
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
                        let body = read_request(&mut socket).await;
                        let (status, response_body) = f(body).await;
                        let status_text = match status {
                            200 => "200 OK",
                            400 => "400 Bad Request",
                            401 => "401 Unauthorized",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            response_body.len(),
                            response_body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}
