#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use probe_service::api::{create_router, AppState};
use probe_service::config::Settings;
use probe_service::observability::HealthChecker;
use probe_service::probes::{DependencyProbe, ProbeResult};
use serde_json::Value;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;
use tracing_subscriber::fmt::MakeWriter;

/// Probe that always answers with a fixed result.
pub struct StaticProbe(pub ProbeResult);

#[async_trait]
impl DependencyProbe for StaticProbe {
    async fn probe(&self) -> ProbeResult {
        self.0.clone()
    }
}

/// Probe that logs, yields and then answers `Ok`.
pub struct ChattyProbe {
    pub name: &'static str,
    pub delay: Duration,
}

#[async_trait]
impl DependencyProbe for ChattyProbe {
    async fn probe(&self) -> ProbeResult {
        tracing::info!(dependency = self.name, "probe started");
        tokio::time::sleep(self.delay).await;
        tracing::info!(dependency = self.name, "probe finished");
        ProbeResult::Ok
    }
}

pub fn test_settings() -> Settings {
    Settings::from_defaults().expect("default settings")
}

pub fn checker(database: ProbeResult, redis: ProbeResult) -> HealthChecker {
    HealthChecker::new(Duration::from_secs(1))
        .with_probe("database", Arc::new(StaticProbe(database)))
        .and_then(|checker| checker.with_probe("redis", Arc::new(StaticProbe(redis))))
        .expect("register dependencies")
}

pub fn app_with(checker: HealthChecker) -> Router {
    let state = AppState::new("probe-test", Arc::new(checker));
    create_router(state, &test_settings()).expect("router")
}

pub fn app(database: ProbeResult, redis: ProbeResult) -> Router {
    app_with(checker(database, redis))
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn request_id(&self) -> &str {
        self.headers
            .get("x-request-id")
            .expect("x-request-id header")
            .to_str()
            .expect("ascii header")
    }
}

pub async fn send(app: Router, request: Request<Body>) -> TestResponse {
    let response = app.oneshot(request).await.expect("infallible router");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    TestResponse {
        status,
        headers,
        body,
    }
}

pub async fn get(app: Router, uri: &str) -> TestResponse {
    send(app, request(Method::GET, uri, None)).await
}

pub fn request(method: Method, uri: &str, request_id: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(id) = request_id {
        builder = builder.header("X-Request-ID", id);
    }
    builder.body(Body::empty()).expect("request")
}

/// In-memory log sink for the JSON formatter.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().expect("log buffer").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

impl LogCapture {
    pub fn records(&self) -> Vec<Value> {
        let bytes = self.0.lock().expect("log buffer").clone();
        String::from_utf8(bytes)
            .expect("utf8 logs")
            .lines()
            .map(|line| serde_json::from_str(line).expect("json log line"))
            .collect()
    }
}
