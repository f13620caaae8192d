use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Uniform error body: `{"errors": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub errors: Vec<ErrorDetail>,
}

impl ErrorResponse {
    pub fn single(detail: ErrorDetail) -> Self {
        Self {
            errors: vec![detail],
        }
    }
}

/// One error entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// HTTP status code as a string.
    pub status: String,
    pub code: String,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ErrorSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ErrorMeta>,
}

impl ErrorDetail {
    pub fn new(status: u16, code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            status: status.to_string(),
            code: code.into(),
            detail: detail.into(),
            source: None,
            meta: None,
        }
    }

    pub fn with_source(mut self, source: ErrorSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_meta(mut self, meta: ErrorMeta) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// Where in the request the error originated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorSource {
    /// JSON pointer into the request body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointer: Option<String>,
    /// Name of the offending query or path parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
}

impl ErrorSource {
    pub fn pointer(pointer: impl Into<String>) -> Self {
        Self {
            pointer: Some(pointer.into()),
            parameter: None,
        }
    }

    pub fn parameter(parameter: impl Into<String>) -> Self {
        Self {
            pointer: None,
            parameter: Some(parameter.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_errors: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_methods: Option<Vec<String>>,
}

/// Liveness response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LivenessResponse {
    pub status: String,
}

impl LivenessResponse {
    pub fn alive() -> Self {
        Self {
            status: "alive".to_string(),
        }
    }
}

/// Root endpoint response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WelcomeResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_absent_fields_are_omitted() {
        let body = ErrorResponse::single(ErrorDetail::new(404, "http_exception", "Not Found"));
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"errors": [{"status": "404", "code": "http_exception", "detail": "Not Found"}]})
        );
    }

    #[test]
    fn test_source_and_meta_serialization() {
        let mut field_errors = BTreeMap::new();
        field_errors.insert("name".to_string(), vec!["too short".to_string()]);
        let detail = ErrorDetail::new(422, "validation_error", "invalid")
            .with_source(ErrorSource::parameter("limit"))
            .with_meta(ErrorMeta {
                field_errors: Some(field_errors),
                allowed_methods: None,
            });

        let value = serde_json::to_value(&detail).unwrap();
        assert_eq!(value["source"], json!({"parameter": "limit"}));
        assert_eq!(value["meta"], json!({"field_errors": {"name": ["too short"]}}));
    }
}
