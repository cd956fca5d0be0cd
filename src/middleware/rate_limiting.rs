// ABOUTME: Rate limiting response helpers for HTTP requests
// ABOUTME: Builds standard X-RateLimit headers and 429 rejection responses
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 TikoZap

//! # Rate Limiting Response Helpers
//!
//! Utilities for adding standard HTTP rate limiting headers to responses and
//! creating proper 429 responses when limits are exceeded.

use crate::errors::{AppError, ErrorResponse};
use crate::rate_limiting::RateLimitDecision;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::{HeaderMap, HeaderValue, StatusCode};

/// HTTP header names for rate limiting
pub mod headers {
    /// HTTP header name for maximum requests allowed in the current window
    pub const X_RATE_LIMIT_LIMIT: &str = "X-RateLimit-Limit";
    /// HTTP header name for remaining requests in the current window
    pub const X_RATE_LIMIT_REMAINING: &str = "X-RateLimit-Remaining";
    /// HTTP header name for Unix timestamp when rate limit resets
    pub const X_RATE_LIMIT_RESET: &str = "X-RateLimit-Reset";
    /// HTTP header name for retry-after duration in seconds
    pub const RETRY_AFTER: &str = "Retry-After";
}

/// Create a `HeaderMap` with rate limit headers
#[must_use]
pub fn create_rate_limit_headers(decision: &RateLimitDecision) -> HeaderMap {
    let mut header_map = HeaderMap::new();

    if let Ok(header_value) = HeaderValue::from_str(&decision.limit.to_string()) {
        header_map.insert(headers::X_RATE_LIMIT_LIMIT, header_value);
    }

    if let Ok(header_value) = HeaderValue::from_str(&decision.remaining.to_string()) {
        header_map.insert(headers::X_RATE_LIMIT_REMAINING, header_value);
    }

    let reset_timestamp = decision.reset_at.timestamp();
    if let Ok(header_value) = HeaderValue::from_str(&reset_timestamp.to_string()) {
        header_map.insert(headers::X_RATE_LIMIT_RESET, header_value);
    }

    if let Some(retry_after) = decision.retry_after_seconds {
        if let Ok(header_value) = HeaderValue::from_str(&retry_after.to_string()) {
            header_map.insert(headers::RETRY_AFTER, header_value);
        }
    }

    header_map
}

/// Create a 429 response carrying rate limit headers
#[must_use]
pub fn rate_limit_exceeded_response(decision: &RateLimitDecision) -> Response {
    let error = AppError::rate_limit_exceeded(
        decision.limit,
        decision.retry_after_seconds.unwrap_or(1),
    );
    let body = ErrorResponse::from(error);

    (
        StatusCode::TOO_MANY_REQUESTS,
        create_rate_limit_headers(decision),
        Json(body),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn test_rejection_headers_present() {
        let decision = RateLimitDecision::from_bucket(30, 30, Utc::now() + Duration::seconds(42), false);
        let header_map = create_rate_limit_headers(&decision);

        assert_eq!(header_map.get(headers::X_RATE_LIMIT_LIMIT).unwrap(), "30");
        assert_eq!(header_map.get(headers::X_RATE_LIMIT_REMAINING).unwrap(), "0");
        assert!(header_map.contains_key(headers::RETRY_AFTER));
    }

    #[test]
    fn test_rejection_response_status() {
        let decision = RateLimitDecision::from_bucket(5, 5, Utc::now() + Duration::seconds(10), false);
        let response = rate_limit_exceeded_response(&decision);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
