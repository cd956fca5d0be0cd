// ABOUTME: HTTP middleware helpers for public endpoint protection
// ABOUTME: Rate limit response headers and the origin/host allowlist
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 TikoZap

//! HTTP middleware helpers

/// Origin/host allowlist for browser-originated public requests
pub mod origin;

/// Rate limiting response headers and 429 responses
pub mod rate_limiting;
