//! Extractors that turn malformed input into validation faults.
//!
//! [`ValidatedJson`] and [`ValidatedQuery`] deserialize the request and then
//! run its `validator` rules; any failure becomes an [`AppError::Validation`]
//! carrying one violation per failing field.

use axum::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use serde_path_to_error::Segment;
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

use crate::error::{AppError, FieldLocation, FieldViolation, HttpFault, ValidationFault};

/// JSON body that is deserialized and then validated.
#[derive(Debug, Clone)]
pub struct ValidatedJson<T>(pub T);

/// Query string that is deserialized and then validated.
#[derive(Debug, Clone)]
pub struct ValidatedQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if !is_json_content_type(req.headers()) {
            return Err(HttpFault::new(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "Expected request with `Content-Type: application/json`",
            )
            .into());
        }

        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|rejection| HttpFault::new(rejection.status(), rejection.body_text()))?;

        let value: T = parse_json(&bytes).map_err(ValidationFault::single)?;
        validate(&value, FieldLocation::Body)?;

        Ok(ValidatedJson(value))
    }
}

#[async_trait]
impl<T, S> FromRequestParts<S> for ValidatedQuery<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let query = parts.uri.query().unwrap_or_default();
        let deserializer =
            serde_urlencoded::Deserializer::new(form_urlencoded::parse(query.as_bytes()));
        let value: T = serde_path_to_error::deserialize(deserializer).map_err(|e| {
            let message = e.inner().to_string();
            let path = field_path(e.path().iter(), &message);
            ValidationFault::single(FieldViolation::new(FieldLocation::Query, path, message))
        })?;
        validate(&value, FieldLocation::Query)?;

        Ok(ValidatedQuery(value))
    }
}

fn is_json_content_type(headers: &HeaderMap) -> bool {
    let Some(content_type) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
    else {
        return false;
    };
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
}

/// Deserializes a JSON body, tracking the path to the first failing field.
fn parse_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, FieldViolation> {
    let mut deserializer = serde_json::Deserializer::from_slice(bytes);
    let value = serde_path_to_error::deserialize(&mut deserializer)
        .map_err(|e| json_violation(e.inner(), e.path().iter()))?;
    deserializer
        .end()
        .map_err(|e| json_violation(&e, std::iter::empty::<&Segment>()))?;
    Ok(value)
}

fn json_violation<'a>(
    error: &serde_json::Error,
    path: impl IntoIterator<Item = &'a Segment>,
) -> FieldViolation {
    let full = error.to_string();
    let position = format!(" at line {} column {}", error.line(), error.column());
    let message = full.strip_suffix(&position).unwrap_or(&full).to_string();
    let path = field_path(path, &message);
    FieldViolation::new(FieldLocation::Body, path, message)
}

/// Path segments down to the failing field.
///
/// Struct-level errors such as a missing field stop at the parent, so the
/// field named in the message is appended.
fn field_path<'a>(path: impl IntoIterator<Item = &'a Segment>, message: &str) -> Vec<String> {
    let mut segments: Vec<String> = path
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Seq { index } => Some(index.to_string()),
            Segment::Map { key } => Some(key.clone()),
            Segment::Enum { variant } => Some(variant.clone()),
            Segment::Unknown => None,
        })
        .collect();
    if let Some(field) = quoted_field(message) {
        if segments.last() != Some(&field) {
            segments.push(field);
        }
    }
    segments
}

/// Extracts the field name from serde messages like ``missing field `name` ``.
fn quoted_field(message: &str) -> Option<String> {
    ["missing field `", "unknown field `", "duplicate field `"]
        .iter()
        .find_map(|marker| {
            let rest = &message[message.find(marker)? + marker.len()..];
            rest.find('`').map(|end| rest[..end].to_string())
        })
}

fn validate<T: Validate>(value: &T, location: FieldLocation) -> Result<(), ValidationFault> {
    value.validate().map_err(|errors| {
        let mut violations = Vec::new();
        flatten(&errors, location, &mut Vec::new(), &mut violations);
        violations.sort_by(|a, b| a.path.cmp(&b.path));
        ValidationFault::new(violations)
    })
}

fn flatten(
    errors: &ValidationErrors,
    location: FieldLocation,
    prefix: &mut Vec<String>,
    out: &mut Vec<FieldViolation>,
) {
    for (field, kind) in errors.errors() {
        prefix.push((*field).to_string());
        match kind {
            ValidationErrorsKind::Field(failures) => {
                for failure in failures {
                    let message = failure
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("failed `{}` validation", failure.code));
                    out.push(FieldViolation::new(location, prefix.clone(), message));
                }
            }
            ValidationErrorsKind::Struct(nested) => flatten(nested, location, prefix, out),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    prefix.push(index.to_string());
                    flatten(nested, location, prefix, out);
                    prefix.pop();
                }
            }
        }
        prefix.pop();
    }
}
