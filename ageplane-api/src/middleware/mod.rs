//! API middleware for authentication, rate limiting, CORS and request ids

pub mod auth;
pub mod cors;
pub mod rate_limit;
pub mod request_id;
