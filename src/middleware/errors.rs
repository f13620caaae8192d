use std::any::Any;
use std::backtrace::Backtrace;

use axum::extract::Request;
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::error::{internal_error_response, AppError, HttpFault};

/// Rewrites the framework's bare 405 responses into the error envelope.
///
/// Must wrap the whole router: the `Allow` header is only present on the
/// response the router returns, not on the one from the matched route.
pub async fn envelope_framework_errors(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    if response.status() != StatusCode::METHOD_NOT_ALLOWED
        || response.headers().contains_key(header::CONTENT_TYPE)
    {
        return response;
    }

    let allow = response
        .headers()
        .get(header::ALLOW)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(""));
    AppError::from(HttpFault::method_not_allowed(allow)).into_response()
}

/// Converts a handler panic into an opaque 500, logging the payload.
pub fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };

    let backtrace = Backtrace::force_capture();
    error!(
        exception = %format!("panic: {message}\n{backtrace}"),
        "Unhandled exception: handler panicked"
    );
    internal_error_response()
}
