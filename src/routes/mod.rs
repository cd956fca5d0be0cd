// ABOUTME: HTTP route handler modules for the voice gateway
// ABOUTME: Webhook endpoints, public widget endpoints, and health checks
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 TikoZap

//! HTTP routes
//!
//! Telephony webhook endpoints are gated by provider signature verification;
//! the public widget endpoints are gated by the origin allowlist and rate
//! limiter instead. Health endpoints are open.

/// Health check routes
pub mod health;

/// Signed telephony webhook routes
pub mod webhooks;

/// Public widget routes
pub mod widget;

pub use health::HealthRoutes;
pub use webhooks::WebhookRoutes;
pub use widget::WidgetRoutes;
