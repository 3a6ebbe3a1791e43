//! Authentication middleware
//!
//! Checks the `Authorization: Bearer <key>` header against the configured
//! API key. With no key configured every request passes.

use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::warn;

/// Constant-time comparison of a presented key against the expected one
pub fn key_matches(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Extract the bearer token from an Authorization header value
pub fn bearer_token(value: &str) -> Result<&str, ApiError> {
    match value.split_once(' ') {
        Some((scheme, token)) if scheme == "Bearer" && !token.is_empty() => Ok(token),
        _ => Err(ApiError::InvalidAuthorizationFormat),
    }
}

/// API key middleware for the `/api/v1` routes
pub async fn api_key_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let expected = &state.config.auth.api_key;
    if expected.is_empty() {
        return Ok(next.run(request).await);
    }

    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or(ApiError::MissingAuthorization)?
        .to_str()
        .map_err(|_| ApiError::InvalidAuthorizationFormat)?;

    let token = bearer_token(header_value)?;

    if !key_matches(token, expected) {
        warn!(path = %request.uri().path(), "Rejected request with invalid API key");
        return Err(ApiError::InvalidApiKey);
    }

    Ok(next.run(request).await)
}
