// ABOUTME: Origin/host allowlist for browser-originated public requests
// ABOUTME: Normalizes hosts and matches tenant domain patterns with wildcard subdomains
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 TikoZap

//! # Origin/Host Allowlist
//!
//! Secondary trust boundary for widget requests arriving from browsers.
//! The request host comes from the `Origin` header, falling back to
//! `Referer`. Hosts are normalized (lowercased, leading `www.` stripped)
//! before matching.
//!
//! A fixed set of operator-owned hosts is always allowed regardless of
//! tenant configuration. Tenant patterns support exact host match and a
//! wildcard-subdomain form: `*.example.com` matches any subdomain of
//! `example.com` but not the apex itself. No host is allowed by default.

use crate::constants::operator_hosts;
use http::HeaderMap;
use url::Url;

/// Extract the request's origin host from the `Origin` or `Referer` header
#[must_use]
pub fn request_host(headers: &HeaderMap) -> Option<String> {
    let raw = headers
        .get(http::header::ORIGIN)
        .or_else(|| headers.get(http::header::REFERER))
        .and_then(|v| v.to_str().ok())?;

    Url::parse(raw)
        .ok()
        .and_then(|url| url.host_str().map(str::to_owned))
}

/// Normalize a host for matching: lowercase, leading `www.` stripped
#[must_use]
pub fn normalize_host(host: &str) -> String {
    let lowered = host.trim().to_ascii_lowercase();
    lowered
        .strip_prefix("www.")
        .map_or(lowered.clone(), str::to_owned)
}

/// Decide whether a host is trusted for the given tenant patterns
///
/// Operator-owned hosts pass regardless of the tenant list. Absence of a
/// match is a reject, never a pass-through.
#[must_use]
pub fn is_host_allowed(host: &str, patterns: &[String]) -> bool {
    let normalized = normalize_host(host);
    if normalized.is_empty() {
        return false;
    }

    if operator_hosts::ALWAYS_ALLOWED
        .iter()
        .any(|operator| normalize_host(operator) == normalized)
    {
        return true;
    }

    patterns.iter().any(|pattern| {
        let pattern = pattern.trim().to_ascii_lowercase();
        if let Some(suffix) = pattern.strip_prefix("*.") {
            // Wildcard requires a subdomain; the apex itself does not match
            normalized.ends_with(&format!(".{suffix}"))
        } else {
            normalize_host(&pattern) == normalized
        }
    })
}
