//! Standardized error handling for API responses
//!
//! Every failure leaves the server as the common envelope
//! `{"success": false, "error": {"code", "message", "details"?}}`.

use crate::kubernetes::OperationReport;
use ageplane_common::api::{ApiResponse, ErrorBody, FieldError};
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

/// API error types with standardized responses
#[derive(Debug)]
pub enum ApiError {
    /// 400, one entry per offending field
    ValidationFailed(Vec<FieldError>),

    /// 400, customer name rejected by the provisioning engine
    InvalidName(String),

    /// 400, body could not be parsed
    BadRequest(String),

    /// 401
    MissingAuthorization,

    /// 401
    InvalidAuthorizationFormat,

    /// 401
    InvalidApiKey,

    /// 404
    NotFound(String),

    /// 409
    Conflict(String),

    /// 429
    RateLimited(String),

    /// 500, a multi-step operation stopped part way
    PartialFailure(OperationReport),

    /// 500
    Internal(String),

    /// 502
    Upstream(String),

    /// 503
    ServiceUnavailable(String),

    /// 504
    UpstreamTimeout(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::ValidationFailed(_) | ApiError::InvalidName(_) | ApiError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::MissingAuthorization
            | ApiError::InvalidAuthorizationFormat
            | ApiError::InvalidApiKey => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::PartialFailure(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Convert error to the error body of the envelope
    pub fn to_error_body(&self) -> ErrorBody {
        match self {
            ApiError::ValidationFailed(fields) => {
                let mut body = ErrorBody::new("VALIDATION_FAILED", "Request validation failed");
                body.details = fields.clone();
                body
            }
            ApiError::InvalidName(msg) => {
                ErrorBody::new("VALIDATION_FAILED", "Request validation failed")
                    .with_field("name", msg)
            }
            ApiError::BadRequest(msg) => ErrorBody::new("INVALID_REQUEST", "Invalid request body")
                .with_field("body", msg),
            ApiError::MissingAuthorization => ErrorBody::new(
                "MISSING_AUTHORIZATION",
                "Authorization header is required",
            ),
            ApiError::InvalidAuthorizationFormat => ErrorBody::new(
                "INVALID_AUTHORIZATION_FORMAT",
                "Authorization header must be 'Bearer <token>'",
            ),
            ApiError::InvalidApiKey => ErrorBody::new("INVALID_API_KEY", "Invalid API key"),
            ApiError::NotFound(msg) => ErrorBody::new("CUSTOMER_NOT_FOUND", msg),
            ApiError::Conflict(msg) => ErrorBody::new("CUSTOMER_EXISTS", msg),
            ApiError::RateLimited(msg) => ErrorBody::new("RATE_LIMIT_EXCEEDED", msg),
            ApiError::PartialFailure(report) => {
                error!(%report, "Partial failure");
                let body = ErrorBody::new("PARTIAL_FAILURE", report.to_string());
                match serde_json::to_value(report) {
                    Ok(context) => body.with_context(context),
                    Err(_) => body,
                }
            }
            ApiError::Internal(msg) => {
                error!("Internal API error: {}", msg);
                ErrorBody::new("INTERNAL_ERROR", "An internal server error occurred")
            }
            ApiError::Upstream(msg) => {
                error!("Upstream error: {}", msg);
                ErrorBody::new("UPSTREAM_ERROR", msg)
            }
            ApiError::ServiceUnavailable(msg) => ErrorBody::new("SERVICE_UNAVAILABLE", msg),
            ApiError::UpstreamTimeout(msg) => {
                error!("Upstream timeout: {}", msg);
                ErrorBody::new("UPSTREAM_TIMEOUT", msg)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(ApiResponse::failure(self.to_error_body()))).into_response()
    }
}

impl From<ageplane_common::Error> for ApiError {
    fn from(err: ageplane_common::Error) -> Self {
        match err {
            ageplane_common::Error::CustomerNotFound(name) => {
                ApiError::NotFound(format!("Customer instance '{}' not found", name))
            }
            ageplane_common::Error::InvalidConfig(msg) => ApiError::BadRequest(msg),
            ageplane_common::Error::Validation(msg) => ApiError::InvalidName(msg),
            ageplane_common::Error::System(msg) => ApiError::Internal(msg),
            ageplane_common::Error::Io(e) => ApiError::Internal(format!("I/O error: {}", e)),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kubernetes::{PlatformError, ProvisionError};
    use axum::body::to_bytes;

    async fn body_json(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_not_found_envelope() {
        let (status, json) = body_json(ApiError::from(ProvisionError::NotFound("acme".into()))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "CUSTOMER_NOT_FOUND");
        assert_eq!(json["error"]["message"], "Customer instance 'acme' not found");
    }

    #[tokio::test]
    async fn test_invalid_name_is_a_field_error() {
        let (status, json) = body_json(ApiError::InvalidName("bad".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "VALIDATION_FAILED");
        assert_eq!(json["error"]["details"][0]["field"], "name");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::from(ProvisionError::AlreadyExists("a".into())).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(ProvisionError::upstream("x", PlatformError::Transport("down".into())))
                .status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::from(ProvisionError::upstream("x", PlatformError::Timeout(std::time::Duration::from_secs(5)))).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(ApiError::InvalidApiKey.status_code(), StatusCode::UNAUTHORIZED);
    }
}
