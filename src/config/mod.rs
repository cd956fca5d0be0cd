// ABOUTME: Configuration module exports for environment-driven settings
// ABOUTME: Groups server, telephony, transcription, and rate limit configuration
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 TikoZap

//! Configuration management

/// Environment-based configuration loading
pub mod environment;

pub use environment::{
    CorsConfig, DatabaseConfig, DatabaseUrl, RateLimitConfig, ServerConfig, TelephonyConfig,
    TranscriptionConfig,
};
