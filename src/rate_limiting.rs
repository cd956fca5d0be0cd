// ABOUTME: Sliding-fixed-window rate limiting for public, unauthenticated endpoints
// ABOUTME: In-process DashMap variant plus a database-backed variant for multi-instance correctness
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 TikoZap

//! # Rate Limiting
//!
//! Sliding-fixed-window counters keyed by (namespace, client identity). Two
//! variants share the same decision contract:
//!
//! - [`MemoryRateLimiter`] holds buckets in process memory and suits
//!   low-stakes endpoints; entries are cleaned up opportunistically once the
//!   map exceeds a size threshold.
//! - [`PersistentRateLimiter`] delegates to the database so the
//!   check-and-increment stays correct across concurrently running server
//!   instances.
//!
//! Bucket keys are an SHA-256 digest of `namespace:identity`, which bounds
//! key size and keeps raw client identities out of storage.

use crate::config::RateLimitConfig;
use crate::database::Database;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use http::HeaderMap;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Sentinel identity when no proxy header reveals the client
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Result of a rate-limit check
#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    /// Whether the request is admitted
    pub allowed: bool,
    /// Maximum requests allowed in the current window
    pub limit: u32,
    /// Remaining requests in the current window
    pub remaining: u32,
    /// When the current window resets
    pub reset_at: DateTime<Utc>,
    /// Seconds until retry is worthwhile; set only when rejected
    pub retry_after_seconds: Option<u64>,
}

impl RateLimitDecision {
    /// Build a decision from a bucket snapshot
    #[must_use]
    pub fn from_bucket(limit: u32, count: u32, reset_at: DateTime<Utc>, allowed: bool) -> Self {
        let retry_after_seconds = if allowed {
            None
        } else {
            let millis = (reset_at - Utc::now()).num_milliseconds().max(0);
            // Round up; a rejected client always waits at least one second
            Some(u64::try_from((millis + 999) / 1000).unwrap_or(1).max(1))
        };

        Self {
            allowed,
            limit,
            remaining: limit.saturating_sub(count),
            reset_at,
            retry_after_seconds,
        }
    }
}

/// Derive the client identity from proxy headers
///
/// Takes the first entry of the forwarded-for chain, falls back to the
/// real-ip header, and finally to a literal sentinel. Never fails on missing
/// or malformed headers.
#[must_use]
pub fn client_identity(headers: &HeaderMap) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let trimmed = first.trim();
            if !trimmed.is_empty() {
                return trimmed.to_owned();
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        let trimmed = real_ip.trim();
        if !trimmed.is_empty() {
            return trimmed.to_owned();
        }
    }

    UNKNOWN_CLIENT.to_owned()
}

/// Hash a (namespace, identity) pair into a fixed-size bucket key
#[must_use]
pub fn bucket_key(namespace: &str, identity: &str) -> String {
    let digest = Sha256::digest(format!("{namespace}:{identity}").as_bytes());
    hex::encode(digest)
}

/// In-process rate limiter using a sharded concurrent map
///
/// `DashMap` provides fine-grained locking; the entry API makes the
/// check-and-increment an atomic read-modify-write without a global mutex.
#[derive(Clone)]
pub struct MemoryRateLimiter {
    /// Bucket key -> (request count, window reset time)
    state: Arc<DashMap<String, (u32, DateTime<Utc>)>>,
    config: RateLimitConfig,
}

impl MemoryRateLimiter {
    /// Create an empty limiter
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            state: Arc::new(DashMap::new()),
            config,
        }
    }

    /// Check the bucket for one request
    #[must_use]
    pub fn check(
        &self,
        namespace: &str,
        identity: &str,
        limit: u32,
        window: Duration,
    ) -> RateLimitDecision {
        let key = bucket_key(namespace, identity);
        let now = Utc::now();

        let mut entry = self.state.entry(key).or_insert((0, now + window));
        let (count, reset_at) = entry.value_mut();

        // Reset window if expired; the increment below makes this request
        // the first of the new window
        if now >= *reset_at {
            *count = 0;
            *reset_at = now + window;
        }

        let is_limited = *count >= limit;
        if !is_limited {
            *count += 1;
        }

        let snapshot = (*count, *reset_at);
        drop(entry);

        // Lazy cleanup: only run if the map is growing, off the critical path
        // of most requests
        if self.state.len() > self.config.cleanup_threshold {
            self.cleanup_old_entries(now);
        }

        RateLimitDecision::from_bucket(limit, snapshot.0, snapshot.1, !is_limited)
    }

    /// Remove entries whose window elapsed longer than the stale timeout ago
    fn cleanup_old_entries(&self, now: DateTime<Utc>) {
        let stale = Duration::seconds(self.config.stale_entry_secs);
        self.state.retain(|_key, (_count, reset_at)| now < *reset_at + stale);
    }

    /// Number of live buckets, for observability
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.len()
    }

    /// Whether the limiter holds no buckets
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }
}

/// Database-backed rate limiter
///
/// Same window semantics as the in-process variant, but the read-modify-write
/// runs inside one database transaction so concurrent requests across
/// multiple server instances cannot both take the last slot.
#[derive(Clone)]
pub struct PersistentRateLimiter {
    database: Arc<Database>,
}

impl PersistentRateLimiter {
    /// Create a limiter over the shared database
    #[must_use]
    pub const fn new(database: Arc<Database>) -> Self {
        Self { database }
    }

    /// Check the bucket for one request
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying storage fails.
    pub async fn check(
        &self,
        namespace: &str,
        identity: &str,
        limit: u32,
        window: Duration,
    ) -> anyhow::Result<RateLimitDecision> {
        let key = bucket_key(namespace, identity);
        let bucket = self.database.check_rate_limit(&key, limit, window).await?;
        Ok(RateLimitDecision::from_bucket(
            limit,
            bucket.count,
            bucket.reset_at,
            bucket.allowed,
        ))
    }
}
