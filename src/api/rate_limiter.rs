//! Rate limiting middleware for the REST API
//!
//! Token bucket rate limiting per endpoint category:
//! - General API: api_rate_limit per second (default 50/s)
//! - Manual rate refresh: refresh_rate_limit per minute (default 6/min),
//!   since every refresh can spend upstream API quota

use crate::error::{AppError, ErrorResponse};
use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Rate limit type for different endpoint categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitType {
    /// Reads, calculations and rule management
    General,
    /// Forced rate refresh
    Refresh,
}

impl RateLimitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitType::General => "general",
            RateLimitType::Refresh => "refresh",
        }
    }
}

/// Token bucket rate limiter
#[derive(Debug)]
pub struct TokenBucket {
    /// Maximum tokens (requests) held at once
    capacity: u32,
    /// Current available tokens
    tokens: f64,
    /// Tokens added per second
    refill_rate: f64,
    /// Last refill time
    last_refill: Instant,
}

impl TokenBucket {
    /// Bucket allowing `capacity` requests per `period`
    pub fn new(capacity: u32, period: Duration) -> Self {
        let period_secs = period.as_secs_f64().max(f64::EPSILON);
        Self {
            capacity,
            tokens: capacity as f64,
            refill_rate: capacity as f64 / period_secs,
            last_refill: Instant::now(),
        }
    }

    pub fn per_second(rate: u32) -> Self {
        Self::new(rate, Duration::from_secs(1))
    }

    pub fn per_minute(rate: u32) -> Self {
        Self::new(rate, Duration::from_secs(60))
    }

    /// Try to consume a token, returns true if allowed
    pub fn try_acquire(&mut self) -> bool {
        // Refill tokens based on elapsed time
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);
        let refill_amount = elapsed.as_secs_f64() * self.refill_rate;

        self.tokens = (self.tokens + refill_amount).min(self.capacity as f64);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Get time until a token will be available
    pub fn time_until_available(&self) -> Duration {
        if self.tokens >= 1.0 {
            Duration::ZERO
        } else if self.refill_rate <= 0.0 {
            Duration::MAX
        } else {
            let tokens_needed = 1.0 - self.tokens;
            Duration::from_secs_f64(tokens_needed / self.refill_rate)
        }
    }
}

/// Shared rate limiter state
#[derive(Debug)]
pub struct RateLimiterState {
    limiters: Mutex<HashMap<RateLimitType, TokenBucket>>,
}

impl RateLimiterState {
    /// `api_rate` requests per second, `refresh_rate` refreshes per minute
    pub fn new(api_rate: u32, refresh_rate: u32) -> Self {
        let mut limiters = HashMap::new();
        limiters.insert(RateLimitType::General, TokenBucket::per_second(api_rate));
        limiters.insert(RateLimitType::Refresh, TokenBucket::per_minute(refresh_rate));

        Self {
            limiters: Mutex::new(limiters),
        }
    }

    /// Try to acquire a token for the given rate limit type
    pub fn try_acquire(&self, rate_type: RateLimitType) -> bool {
        let mut limiters = self.limiters.lock();
        if let Some(limiter) = limiters.get_mut(&rate_type) {
            limiter.try_acquire()
        } else {
            true // If limiter doesn't exist, allow
        }
    }

    /// Get time until rate limit allows a request
    pub fn time_until_available(&self, rate_type: RateLimitType) -> Duration {
        let limiters = self.limiters.lock();
        if let Some(limiter) = limiters.get(&rate_type) {
            limiter.time_until_available()
        } else {
            Duration::ZERO
        }
    }
}

/// Determine rate limit type based on request path
pub fn get_rate_limit_type(path: &str) -> RateLimitType {
    if path.trim_end_matches('/').ends_with("/rates/refresh") {
        return RateLimitType::Refresh;
    }

    // Everything else is general
    RateLimitType::General
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(state): State<Arc<RateLimiterState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let rate_type = get_rate_limit_type(&path);

    if !state.try_acquire(rate_type) {
        let wait_time = state.time_until_available(rate_type);
        tracing::warn!(
            "Rate limit exceeded for {:?}, path: {}, retry after {}ms",
            rate_type,
            path,
            wait_time.as_millis()
        );
        return rate_limit_response(wait_time, rate_type);
    }

    next.run(request).await
}

/// Create a rate limit exceeded response
fn rate_limit_response(retry_after: Duration, rate_type: RateLimitType) -> Response {
    let retry_seconds = retry_after.as_secs_f64().ceil().min(u32::MAX as f64) as u64;

    let err = AppError::RateLimited(format!(
        "{} requests; retry after {} seconds",
        rate_type.as_str(),
        retry_seconds
    ));
    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(ErrorResponse::from(&err))).into_response();

    // Add Retry-After header
    response
        .headers_mut()
        .insert("Retry-After", HeaderValue::from(retry_seconds));

    // Add rate limit headers
    response
        .headers_mut()
        .insert("X-RateLimit-Type", HeaderValue::from_static(rate_type.as_str()));

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_bucket_basic() {
        let mut bucket = TokenBucket::per_second(10);

        // Should allow first 10 requests
        for _ in 0..10 {
            assert!(bucket.try_acquire());
        }

        // 11th should fail
        assert!(!bucket.try_acquire());
    }

    #[test]
    fn test_token_bucket_refill() {
        let mut bucket = TokenBucket::per_second(100);

        // Drain all tokens
        for _ in 0..100 {
            bucket.try_acquire();
        }
        assert!(!bucket.try_acquire());

        // Simulate time passing (force refill)
        bucket.last_refill = Instant::now() - Duration::from_millis(100);

        // Should have ~10 tokens now (100/s * 0.1s)
        for _ in 0..10 {
            assert!(bucket.try_acquire());
        }
    }

    #[test]
    fn test_per_minute_bucket_waits_seconds() {
        let mut bucket = TokenBucket::per_minute(6);
        for _ in 0..6 {
            assert!(bucket.try_acquire());
        }
        assert!(!bucket.try_acquire());

        // One token every 10 seconds
        let wait = bucket.time_until_available();
        assert!(wait > Duration::from_secs(9) && wait <= Duration::from_secs(10));
    }

    #[test]
    fn test_rate_limit_type_detection() {
        assert_eq!(get_rate_limit_type("/api/v1/rates/refresh"), RateLimitType::Refresh);
        assert_eq!(get_rate_limit_type("/api/v1/rates/refresh/"), RateLimitType::Refresh);
        assert_eq!(get_rate_limit_type("/api/v1/rates/current"), RateLimitType::General);
        assert_eq!(get_rate_limit_type("/api/v1/pricing/calculate"), RateLimitType::General);
    }

    #[test]
    fn test_buckets_are_independent() {
        let state = RateLimiterState::new(100, 1);

        assert!(state.try_acquire(RateLimitType::Refresh));
        assert!(!state.try_acquire(RateLimitType::Refresh));
        assert!(state.try_acquire(RateLimitType::General));
    }
}
