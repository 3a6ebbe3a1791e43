//! Response envelope shared by the server and the CLI

use serde::{Deserialize, Serialize};

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
            error: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl ApiResponse<()> {
    /// Successful response that carries only a message
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: None,
            error: None,
        }
    }

    pub fn failure(error: ErrorBody) -> Self {
        Self {
            success: false,
            message: None,
            data: None,
            error: Some(error),
        }
    }
}

/// Error payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable code, e.g. `CUSTOMER_NOT_FOUND`
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<FieldError>,
    /// Extra structured context, such as a partial-failure step report
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl ErrorBody {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: Vec::new(),
            context: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>, message: impl Into<String>) -> Self {
        self.details.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }
}

/// A single field validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_envelope_shape() {
        let body = ErrorBody::new("VALIDATION_FAILED", "Request validation failed")
            .with_field("name", "Name is required");
        let response = ApiResponse::failure(body);

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "VALIDATION_FAILED");
        assert_eq!(json["error"]["details"][0]["field"], "name");
        assert!(json.get("data").is_none());
        assert!(json["error"].get("context").is_none());
    }

    #[test]
    fn test_success_envelope_round_trip() {
        let response = ApiResponse::ok(vec![1, 2, 3]).with_message("done");
        let text = serde_json::to_string(&response).unwrap();
        let parsed: ApiResponse<Vec<i32>> = serde_json::from_str(&text).unwrap();
        assert!(parsed.success);
        assert_eq!(parsed.data, Some(vec![1, 2, 3]));
        assert_eq!(parsed.message.as_deref(), Some("done"));
    }
}
