//! Local axum target for end-to-end tests.
//!
//! Every route is plain GET. A middleware layer counts requests and the
//! status codes answered, so tests can compare what the load driver recorded
//! with what the server actually saw.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const HELLO_BODY: &str = "Hello World!";
/// Cap for `/bytes/{n}`.
pub const MAX_BODY_BYTES: usize = 1 << 20;

#[derive(Debug, Default)]
struct Counters {
    requests: AtomicU64,
    in_flight: AtomicU64,
    by_status: Mutex<BTreeMap<u16, u64>>,
}

/// Shared request counters; clones observe the same totals.
#[derive(Debug, Clone, Default)]
pub struct TestServerStats(Arc<Counters>);

impl TestServerStats {
    pub fn requests_total(&self) -> u64 {
        self.0.requests.load(Ordering::Relaxed)
    }

    /// Requests still being handled, including ones whose client went away.
    pub fn in_flight(&self) -> u64 {
        self.0.in_flight.load(Ordering::Relaxed)
    }

    /// Completed responses that carried `status`.
    pub fn responses_with(&self, status: u16) -> u64 {
        self.0
            .by_status
            .lock()
            .map(|m| m.get(&status).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

/// Decrements `in_flight` even when a disconnect drops the handler mid-await.
struct Settle<'a>(&'a AtomicU64);

impl Drop for Settle<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

async fn count_requests(State(stats): State<TestServerStats>, req: Request, next: Next) -> Response {
    let c = &stats.0;
    c.requests.fetch_add(1, Ordering::Relaxed);
    c.in_flight.fetch_add(1, Ordering::Relaxed);
    let _settle = Settle(&c.in_flight);

    let res = next.run(req).await;
    if let Ok(mut by_status) = c.by_status.lock() {
        *by_status.entry(res.status().as_u16()).or_default() += 1;
    }
    res
}

#[derive(Debug, Deserialize)]
struct SlowParams {
    #[serde(default)]
    ms: u64,
}

async fn hello() -> &'static str {
    HELLO_BODY
}

async fn bytes(Path(n): Path<usize>) -> Result<String, StatusCode> {
    if n > MAX_BODY_BYTES {
        return Err(StatusCode::PAYLOAD_TOO_LARGE);
    }
    Ok("x".repeat(n))
}

async fn status(Path(code): Path<u16>) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}

async fn slow(Query(p): Query<SlowParams>) -> &'static str {
    tokio::time::sleep(Duration::from_millis(p.ms)).await;
    HELLO_BODY
}

pub fn router(stats: TestServerStats) -> Router {
    Router::new()
        .route("/hello", get(hello))
        .route("/bytes/{n}", get(bytes))
        .route("/status/{code}", get(status))
        .route("/slow", get(slow))
        .fallback(|| async { StatusCode::NOT_FOUND })
        .layer(middleware::from_fn_with_state(stats, count_requests))
}

/// URL builders for a running server.
#[derive(Debug, Clone)]
pub struct TestServerUrls {
    pub base_url: String,
    /// `200` with a 12-byte text body.
    pub hello: String,
}

impl TestServerUrls {
    fn new(addr: SocketAddr) -> Self {
        let base_url = format!("http://{addr}");
        Self {
            hello: format!("{base_url}/hello"),
            base_url,
        }
    }

    /// `200` with a body of exactly `n` bytes.
    pub fn bytes(&self, n: usize) -> String {
        format!("{}/bytes/{n}", self.base_url)
    }

    /// `code` with an empty body.
    pub fn status(&self, code: u16) -> String {
        format!("{}/status/{code}", self.base_url)
    }

    /// `200` after `delay`.
    pub fn slow(&self, delay: Duration) -> String {
        format!("{}/slow?ms={}", self.base_url, delay.as_millis())
    }
}

/// A server bound to an ephemeral loopback port, stopped on
/// [`TestServer::shutdown`] or drop.
pub struct TestServer {
    urls: TestServerUrls,
    stats: TestServerStats,
    stop: CancellationToken,
    task: Option<JoinHandle<std::io::Result<()>>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let urls = TestServerUrls::new(listener.local_addr()?);

        let stats = TestServerStats::default();
        let stop = CancellationToken::new();
        let app = router(stats.clone());
        let serve = axum::serve(listener, app).with_graceful_shutdown(stop.clone().cancelled_owned());
        let task = tokio::spawn(async move { serve.await });

        Ok(Self {
            urls,
            stats,
            stop,
            task: Some(task),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.urls.base_url
    }

    pub fn urls(&self) -> &TestServerUrls {
        &self.urls
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    /// Stops accepting and waits for open connections to finish.
    pub async fn shutdown(mut self) {
        self.stop.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.stop.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn get(url: &str) -> (StatusCode, usize) {
        let uri: axum::http::Uri = url.parse().unwrap_or_else(|e| panic!("{e}"));
        let authority = uri.authority().map(|a| a.to_string()).unwrap_or_default();
        let path = uri.path_and_query().map(|p| p.to_string()).unwrap_or_default();

        let mut stream = tokio::net::TcpStream::connect(&authority)
            .await
            .unwrap_or_else(|e| panic!("{e}"));
        let head = format!("GET {path} HTTP/1.1\r\nhost: {authority}\r\nconnection: close\r\n\r\n");
        tokio::io::AsyncWriteExt::write_all(&mut stream, head.as_bytes())
            .await
            .unwrap_or_else(|e| panic!("{e}"));
        let mut raw = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut stream, &mut raw)
            .await
            .unwrap_or_else(|e| panic!("{e}"));

        let text = String::from_utf8_lossy(&raw);
        let code = text
            .split_whitespace()
            .nth(1)
            .and_then(|c| c.parse::<u16>().ok())
            .and_then(|c| StatusCode::from_u16(c).ok())
            .unwrap_or_else(|| panic!("bad response: {text}"));
        let body = text.split_once("\r\n\r\n").map_or(0, |(_, b)| b.len());
        (code, body)
    }

    #[tokio::test]
    async fn counts_requests_by_status() {
        let server = TestServer::start().await.unwrap_or_else(|e| panic!("{e}"));
        let urls = server.urls().clone();

        assert_eq!(get(&urls.hello).await, (StatusCode::OK, HELLO_BODY.len()));
        assert_eq!(get(&urls.bytes(300)).await, (StatusCode::OK, 300));
        assert_eq!(get(&urls.status(503)).await.0, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(get(&format!("{}/nope", urls.base_url)).await.0, StatusCode::NOT_FOUND);

        let stats = server.stats().clone();
        assert_eq!(stats.requests_total(), 4);
        assert_eq!(stats.responses_with(200), 2);
        assert_eq!(stats.responses_with(503), 1);
        assert_eq!(stats.responses_with(404), 1);
        assert_eq!(stats.in_flight(), 0);

        server.shutdown().await;
    }

    #[tokio::test]
    async fn oversized_bodies_are_refused() {
        let server = TestServer::start().await.unwrap_or_else(|e| panic!("{e}"));
        let url = server.urls().bytes(MAX_BODY_BYTES + 1);
        assert_eq!(get(&url).await.0, StatusCode::PAYLOAD_TOO_LARGE);
        server.shutdown().await;
    }
}
