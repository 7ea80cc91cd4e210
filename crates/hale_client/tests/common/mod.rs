//! In-process answer service used by the integration tests. Real HTTP over
//! loopback; behaviour is scripted per test.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

/// One scripted `/query` reply.
#[derive(Debug, Clone)]
pub struct Reply {
    pub delay: Duration,
    pub status: u16,
    pub body: Value,
    /// Sent instead of `body` when set (for non-JSON payloads).
    pub raw: Option<&'static str>,
}

impl Reply {
    pub fn answer(body: Value) -> Self {
        Reply {
            delay: Duration::ZERO,
            status: 200,
            body,
            raw: None,
        }
    }

    pub fn status(status: u16) -> Self {
        Reply {
            delay: Duration::ZERO,
            status,
            body: json!({ "detail": "Error processing query" }),
            raw: None,
        }
    }

    pub fn raw(text: &'static str) -> Self {
        Reply {
            raw: Some(text),
            ..Reply::answer(Value::Null)
        }
    }

    pub fn after(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }
}

#[derive(Debug)]
pub struct MockService {
    pub health_ok: AtomicBool,
    pub health_hits: AtomicUsize,
    health_delay_ms: AtomicU64,
    health_active: AtomicUsize,
    health_peak: AtomicUsize,
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<Value>>,
}

impl MockService {
    pub fn new() -> Arc<Self> {
        Arc::new(MockService {
            health_ok: AtomicBool::new(true),
            health_hits: AtomicUsize::new(0),
            health_delay_ms: AtomicU64::new(0),
            health_active: AtomicUsize::new(0),
            health_peak: AtomicUsize::new(0),
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, reply: Reply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn set_healthy(&self, ok: bool) {
        self.health_ok.store(ok, Ordering::SeqCst);
    }

    pub fn health_hits(&self) -> usize {
        self.health_hits.load(Ordering::SeqCst)
    }

    /// Hold every `/health` response for `ms` milliseconds.
    pub fn slow_health(&self, ms: u64) {
        self.health_delay_ms.store(ms, Ordering::SeqCst);
    }

    /// Most `/health` requests ever in flight at the same time.
    pub fn peak_concurrent_health(&self) -> usize {
        self.health_peak.load(Ordering::SeqCst)
    }

    /// Bodies of every `/query` request received so far.
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }
}

async fn health(State(mock): State<Arc<MockService>>) -> StatusCode {
    mock.health_hits.fetch_add(1, Ordering::SeqCst);
    let active = mock.health_active.fetch_add(1, Ordering::SeqCst) + 1;
    mock.health_peak.fetch_max(active, Ordering::SeqCst);
    let delay = mock.health_delay_ms.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(delay)).await;
    mock.health_active.fetch_sub(1, Ordering::SeqCst);
    if mock.health_ok.load(Ordering::SeqCst) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn query(State(mock): State<Arc<MockService>>, Json(body): Json<Value>) -> Response {
    mock.requests.lock().unwrap().push(body);
    let reply = mock
        .replies
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| Reply::answer(json!({ "answer": "default answer" })));
    tokio::time::sleep(reply.delay).await;
    let status = StatusCode::from_u16(reply.status).unwrap();
    match reply.raw {
        Some(text) => (status, text).into_response(),
        None => (status, Json(reply.body)).into_response(),
    }
}

async fn metrics() -> Json<Value> {
    Json(json!({
        "cpu_percent": 12.5,
        "memory_percent": 41.0,
        "timestamp": "2026-01-01T00:00:00"
    }))
}

fn router(mock: Arc<MockService>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/query", post(query))
        .route("/metrics", get(metrics))
        .with_state(mock)
}

/// Serve `mock` on the current runtime. Returns the base URL.
pub async fn spawn(mock: Arc<MockService>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(mock)).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Serve `mock` from a dedicated thread with its own runtime, for tests that
/// drive the binary. Returns the base URL.
pub fn spawn_in_thread(mock: Arc<MockService>) -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, router(mock)).await.unwrap();
        });
    });
    format!("http://{}", addr)
}

/// A loopback URL with nothing listening on it.
pub fn dead_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}
