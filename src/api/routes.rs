use axum::{
    http::{header, HeaderValue},
    middleware::from_fn,
    routing::get,
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower::Layer;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use super::handlers;
use crate::config::{CorsSettings, Settings};
use crate::error::{AppError, Result};
use crate::middleware::{
    envelope_framework_errors, handle_panic, propagate_request_id, with_security_headers,
    REQUEST_ID_HEADER,
};
use crate::observability::HealthChecker;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub app_name: String,
    pub health_checker: Arc<HealthChecker>,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(app_name: impl Into<String>, health_checker: Arc<HealthChecker>) -> Self {
        Self {
            app_name: app_name.into(),
            health_checker,
            metrics_handle: None,
        }
    }

    /// Adds metrics handle to the state.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}

/// Creates the application router with every layer applied.
pub fn create_router(state: AppState, settings: &Settings) -> Result<Router> {
    let health = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/healthz/live", get(handlers::liveness_check))
        .route("/healthz/ready", get(handlers::readiness_check));

    let router = Router::new()
        .route("/", get(handlers::root))
        .route("/metrics", get(handlers::metrics_endpoint));
    let router = match normalize_prefix(&settings.application.api_prefix) {
        Some(prefix) => router.nest(&prefix, health),
        None => router.merge(health),
    };

    apply_layers(
        router.fallback(handlers::not_found).with_state(state),
        settings,
    )
}

/// Wraps `router` in the service middleware stack.
///
/// Layers run outermost first: request id, tracing, security headers, CORS,
/// panic capture, then envelope conversion of framework errors. The
/// envelope wraps `router` as a whole so method mismatches still carry
/// their `Allow` header when it runs.
pub fn apply_layers(router: Router, settings: &Settings) -> Result<Router> {
    let router = Router::new()
        .fallback_service(from_fn(envelope_framework_errors).layer(router))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(cors_layer(&settings.cors)?);

    Ok(with_security_headers(router)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(from_fn(propagate_request_id)))
}

/// `None` means the routes are mounted at the root.
fn normalize_prefix(prefix: &str) -> Option<String> {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        None
    } else {
        Some(format!("/{trimmed}"))
    }
}

fn cors_layer(settings: &CorsSettings) -> Result<CorsLayer> {
    let origins = settings
        .allowed_origins
        .iter()
        .map(|origin| {
            let origin = origin.trim().trim_end_matches('/');
            if origin == "*" {
                return Err(AppError::Config(
                    "wildcard CORS origin cannot be combined with credentials".to_string(),
                ));
            }
            HeaderValue::from_str(origin)
                .map_err(|e| AppError::Config(format!("invalid CORS origin {origin:?}: {e}")))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .expose_headers([header::CONTENT_DISPOSITION, REQUEST_ID_HEADER]))
}
