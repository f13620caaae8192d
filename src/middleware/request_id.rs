//! Correlation id middleware.
//!
//! Reads `X-Request-ID` (or generates a UUID v4), binds it for the rest of
//! the request via [`RequestId::scope`], and echoes it on every response,
//! including error responses. Must be the outermost layer.

use axum::async_trait;
use axum::extract::{FromRequestParts, Request};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use std::convert::Infallible;
use tracing::error;

use crate::observability::RequestId;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

pub async fn propagate_request_id(mut request: Request, next: Next) -> Response {
    let request_id = inbound_request_id(request.headers()).unwrap_or_else(RequestId::generate);
    request.extensions_mut().insert(request_id.clone());

    let mut response = request_id.clone().scope(next.run(request)).await;

    match HeaderValue::from_str(request_id.as_str()) {
        Ok(value) => {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        Err(e) => {
            error!(exception = %e, request_id = %request_id, "Failed to encode request id header");
        }
    }
    response
}

fn inbound_request_id(headers: &HeaderMap) -> Option<RequestId> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .map(RequestId::from)
}

/// Lets handlers take the request id as an argument.
#[async_trait]
impl<S> FromRequestParts<S> for RequestId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestId>()
            .cloned()
            .or_else(RequestId::current)
            .unwrap_or_else(RequestId::generate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route(
                "/",
                get(|id: RequestId| async move {
                    let current = RequestId::current().map(|c| c.to_string()).unwrap_or_default();
                    format!("{id}|{current}")
                }),
            )
            .layer(axum::middleware::from_fn(propagate_request_id))
    }

    async fn call(header: Option<&str>) -> (String, String) {
        let mut builder = axum::http::Request::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header("X-Request-ID", value);
        }
        let response = app()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let header = response.headers()[REQUEST_ID_HEADER].to_str().unwrap().to_string();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (header, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_inbound_header_is_passed_through() {
        let (header, body) = call(Some("abc123")).await;
        assert_eq!(header, "abc123");
        assert_eq!(body, "abc123|abc123");
    }

    #[tokio::test]
    async fn test_missing_or_blank_header_generates_uuid() {
        for inbound in [None, Some(""), Some("   ")] {
            let (header, body) = call(inbound).await;
            assert!(uuid::Uuid::parse_str(&header).is_ok());
            assert_eq!(body, format!("{header}|{header}"));
        }
    }

    #[test]
    fn test_inbound_request_id_parsing() {
        let mut headers = HeaderMap::new();
        assert!(inbound_request_id(&headers).is_none());
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("gateway-7"));
        assert_eq!(inbound_request_id(&headers), Some(RequestId::from("gateway-7")));
    }
}
