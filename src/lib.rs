// ABOUTME: Main library entry point for the TikoZap voice gateway
// ABOUTME: Provides signed telephony webhook handling, voicemail transcription, and rate limiting
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 TikoZap

#![deny(unsafe_code)]

//! # TikoZap Voice Gateway
//!
//! Inbound telephony event pipeline for TikoZap. The gateway receives signed
//! webhook callbacks from the telephony provider describing the lifecycle of
//! a phone call (ringing, answered, voicemail recorded, transcribed,
//! completed), fetches and transcribes voicemail audio, and writes
//! human-readable events into the per-conversation message ledger.
//!
//! ## Architecture
//!
//! - **Telephony**: webhook signature verification, recording download, and
//!   speech-to-text clients
//! - **Calls**: the call/recording state machine and pipeline orchestration
//! - **Rate limiting**: sliding-fixed-window counters with an in-process and
//!   a database-backed variant
//! - **Routes**: Axum handlers for webhook and public widget endpoints
//! - **Database**: SQLite persistence for call sessions, answer-machine
//!   items, conversations, widgets, and rate-limit buckets
//!
//! Webhook endpoints are protected by provider signature verification; the
//! public widget endpoints sit behind the origin allowlist and rate limiter
//! instead.

/// Call/recording state machine and webhook pipeline orchestration
pub mod calls;

/// Configuration management from environment variables
pub mod config;

/// Application constants and configuration values
pub mod constants;

/// SQLite persistence for call, conversation, widget, and rate-limit data
pub mod database;

/// Unified error handling system with standard error codes and HTTP responses
pub mod errors;

/// Logging configuration and structured logging setup
pub mod logging;

/// HTTP middleware helpers: rate-limit headers and the origin allowlist
pub mod middleware;

/// Core data models for call sessions, answer-machine items, and widgets
pub mod models;

/// Sliding-fixed-window rate limiting (in-process and persistent variants)
pub mod rate_limiting;

/// HTTP route handlers for webhooks, widget endpoints, and health checks
pub mod routes;

/// Server resources and router assembly
pub mod server;

/// Telephony provider integration: signatures, recordings, transcription
pub mod telephony;
