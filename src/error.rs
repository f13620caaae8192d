use std::collections::BTreeMap;
use std::fmt;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::api::responses::{ErrorDetail, ErrorMeta, ErrorResponse, ErrorSource};

pub type Result<T> = std::result::Result<T, AppError>;

pub const VALIDATION_ERROR_CODE: &str = "validation_error";
pub const HTTP_EXCEPTION_CODE: &str = "http_exception";
pub const INTERNAL_ERROR_CODE: &str = "internal_server_error";

pub const VALIDATION_ERROR_DETAIL: &str =
    "One or more validation errors occurred. Please check the 'field_errors' for details.";
pub const INTERNAL_ERROR_DETAIL: &str = "An unexpected internal server error occurred.";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(ValidationFault),

    #[error("{0}")]
    Http(HttpFault),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Settings(#[from] config::ConfigError),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Redis(#[from] redis::RedisError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<ValidationFault> for AppError {
    fn from(fault: ValidationFault) -> Self {
        AppError::Validation(fault)
    }
}

impl From<HttpFault> for AppError {
    fn from(fault: HttpFault) -> Self {
        AppError::Http(fault)
    }
}

/// Part of the request a field violation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldLocation {
    Body,
    Query,
    Path,
}

impl FieldLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldLocation::Body => "body",
            FieldLocation::Query => "query",
            FieldLocation::Path => "path",
        }
    }
}

/// A single failing field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub location: FieldLocation,
    /// Path segments below the location, e.g. `["items", "0", "sku"]`.
    pub path: Vec<String>,
    pub message: String,
}

impl FieldViolation {
    pub fn new(location: FieldLocation, path: Vec<String>, message: impl Into<String>) -> Self {
        Self {
            location,
            path,
            message: message.into(),
        }
    }

    /// Dotted key used in `field_errors`.
    pub fn field_key(&self) -> String {
        if self.path.is_empty() {
            self.location.as_str().to_string()
        } else {
            self.path.join(".")
        }
    }

    fn source(&self) -> ErrorSource {
        match self.location {
            FieldLocation::Body => {
                let mut pointer = format!("/{}", self.location.as_str());
                for segment in &self.path {
                    pointer.push('/');
                    pointer.push_str(segment);
                }
                ErrorSource::pointer(pointer)
            }
            FieldLocation::Query | FieldLocation::Path => ErrorSource::parameter(
                self.path
                    .first()
                    .cloned()
                    .unwrap_or_else(|| self.location.as_str().to_string()),
            ),
        }
    }
}

/// Request-shape fault. Always rendered as 422.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationFault {
    pub violations: Vec<FieldViolation>,
}

impl ValidationFault {
    pub fn new(violations: Vec<FieldViolation>) -> Self {
        Self { violations }
    }

    pub fn single(violation: FieldViolation) -> Self {
        Self {
            violations: vec![violation],
        }
    }

    /// Violations grouped by dotted field path.
    pub fn field_errors(&self) -> BTreeMap<String, Vec<String>> {
        let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for violation in &self.violations {
            grouped
                .entry(violation.field_key())
                .or_default()
                .push(violation.message.clone());
        }
        grouped
    }

    fn to_detail(&self) -> ErrorDetail {
        let mut detail = ErrorDetail::new(
            StatusCode::UNPROCESSABLE_ENTITY.as_u16(),
            VALIDATION_ERROR_CODE,
            VALIDATION_ERROR_DETAIL,
        )
        .with_meta(ErrorMeta {
            field_errors: Some(self.field_errors()),
            allowed_methods: None,
        });
        if let Some(first) = self.violations.first() {
            detail = detail.with_source(first.source());
        }
        detail
    }
}

impl fmt::Display for ValidationFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<String> = self.violations.iter().map(FieldViolation::field_key).collect();
        write!(f, "{}", fields.join(", "))
    }
}

/// Fault raised with an explicit status, e.g. 404 or 405.
#[derive(Debug, Clone)]
pub struct HttpFault {
    pub status: StatusCode,
    pub detail: String,
    pub code: Option<String>,
    pub headers: HeaderMap,
}

impl HttpFault {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
            code: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "Not Found")
    }

    pub fn method_not_allowed(allow: HeaderValue) -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed").with_header(header::ALLOW, allow)
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    fn allowed_methods(&self) -> Option<Vec<String>> {
        if self.status != StatusCode::METHOD_NOT_ALLOWED {
            return None;
        }
        let allow = self.headers.get(header::ALLOW)?.to_str().ok()?;
        Some(
            allow
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    fn to_detail(&self) -> ErrorDetail {
        let detail = ErrorDetail::new(
            self.status.as_u16(),
            self.code.as_deref().unwrap_or(HTTP_EXCEPTION_CODE),
            self.detail.clone(),
        );
        match self.allowed_methods() {
            Some(methods) => detail.with_meta(ErrorMeta {
                field_errors: None,
                allowed_methods: Some(methods),
            }),
            None => detail,
        }
    }
}

impl fmt::Display for HttpFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status.as_u16(), self.detail)
    }
}

/// Body for an unclassified fault. Never carries the underlying error text.
pub fn internal_error_response() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::single(ErrorDetail::new(
            StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            INTERNAL_ERROR_CODE,
            INTERNAL_ERROR_DETAIL,
        ))),
    )
        .into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Validation(fault) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ErrorResponse::single(fault.to_detail())),
            )
                .into_response(),
            AppError::Http(fault) => {
                let body = Json(ErrorResponse::single(fault.to_detail()));
                (fault.status, fault.headers, body).into_response()
            }
            other => {
                tracing::error!(
                    exception = %format!("{other:?}"),
                    "Unhandled exception: {}",
                    other
                );
                internal_error_response()
            }
        }
    }
}
