//! Rate limiting middleware
//!
//! Token bucket per client IP

use crate::config::RateLimitConfig;
use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Rate limit settings
#[derive(Clone, Debug)]
pub struct RateLimitSettings {
    /// Maximum number of requests allowed in the window
    pub max_requests: u32,
    /// Time window duration
    pub window: Duration,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60),
        }
    }
}

impl From<&RateLimitConfig> for RateLimitSettings {
    fn from(config: &RateLimitConfig) -> Self {
        Self {
            max_requests: config.max_requests,
            window: Duration::from_secs(config.window_secs),
        }
    }
}

/// Token bucket for rate limiting
#[derive(Clone, Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    max_tokens: f64,
    refill_rate: f64, // tokens per second
}

impl TokenBucket {
    fn new(max_tokens: u32, window: Duration) -> Self {
        let refill_rate = max_tokens as f64 / window.as_secs_f64();
        Self {
            tokens: max_tokens as f64,
            last_refill: Instant::now(),
            max_tokens: max_tokens as f64,
            refill_rate,
        }
    }

    fn try_consume(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn remaining(&self) -> u32 {
        self.tokens.floor() as u32
    }

    fn reset_after(&self) -> Duration {
        if self.tokens >= 1.0 {
            Duration::from_secs(0)
        } else {
            let seconds = (1.0 - self.tokens) / self.refill_rate;
            Duration::from_secs_f64(seconds.max(0.0))
        }
    }
}

/// Rate limit check result
#[derive(Debug)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_after: Duration,
}

/// Rate limiter state
pub struct RateLimiter {
    buckets: RwLock<HashMap<String, TokenBucket>>,
    settings: RateLimitSettings,
}

impl RateLimiter {
    pub fn new(settings: RateLimitSettings) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            settings,
        }
    }

    pub fn settings(&self) -> &RateLimitSettings {
        &self.settings
    }

    /// Take one token for `key`
    pub async fn check(&self, key: &str) -> RateLimitResult {
        let mut buckets = self.buckets.write().await;

        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(self.settings.max_requests, self.settings.window));

        let allowed = bucket.try_consume();

        RateLimitResult {
            allowed,
            limit: self.settings.max_requests,
            remaining: bucket.remaining(),
            reset_after: bucket.reset_after(),
        }
    }

    /// Drop buckets idle for longer than one window
    pub async fn cleanup(&self) {
        let mut buckets = self.buckets.write().await;
        let now = Instant::now();
        let window = self.settings.window;

        buckets.retain(|_, bucket| now.duration_since(bucket.last_refill) < window);
    }
}

/// Client key: first `X-Forwarded-For` hop, then the peer address
fn client_key(request: &Request) -> String {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    if let Some(ip) = forwarded {
        return format!("ip:{}", ip);
    }

    match request.extensions().get::<ConnectInfo<SocketAddr>>() {
        Some(ConnectInfo(addr)) => format!("ip:{}", addr.ip()),
        None => "ip:unknown".to_string(),
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let limiter = &state.rate_limiter;
    let result = limiter.check(&client_key(&request)).await;

    let mut response = if result.allowed {
        next.run(request).await
    } else {
        ApiError::RateLimited(format!(
            "Too many requests. Limit: {} requests per {} seconds per IP",
            result.limit,
            limiter.settings().window.as_secs()
        ))
        .into_response()
    };

    let headers = response.headers_mut();
    headers.insert("x-ratelimit-limit", HeaderValue::from(result.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(result.remaining));
    headers.insert(
        "x-ratelimit-reset",
        HeaderValue::from(result.reset_after.as_secs()),
    );
    if !result.allowed {
        headers.insert(
            "retry-after",
            HeaderValue::from(result.reset_after.as_secs().max(1)),
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bucket_exhausts_after_limit() {
        let limiter = RateLimiter::new(RateLimitSettings {
            max_requests: 3,
            window: Duration::from_secs(60),
        });

        for _ in 0..3 {
            assert!(limiter.check("ip:1.2.3.4").await.allowed);
        }
        let denied = limiter.check("ip:1.2.3.4").await;
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert!(denied.reset_after > Duration::from_secs(0));

        assert!(limiter.check("ip:5.6.7.8").await.allowed);
    }

    #[test]
    fn test_settings_from_config() {
        let settings = RateLimitSettings::from(&RateLimitConfig {
            max_requests: 10,
            window_secs: 5,
        });
        assert_eq!(settings.max_requests, 10);
        assert_eq!(settings.window, Duration::from_secs(5));
    }
}
