// ABOUTME: Application constants and default configuration values
// ABOUTME: Centralizes env var names, rate limit defaults, and telephony settings
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 TikoZap

//! Application constants
//!
//! Central definitions for environment variable names, default limits, and
//! fixed operational values so they are not scattered as magic literals.

/// Environment variable names recognized by the gateway
pub mod env_config {
    /// Telephony provider account identifier
    pub const TELEPHONY_ACCOUNT_SID: &str = "TWILIO_ACCOUNT_SID";
    /// Telephony provider shared secret used for webhook signatures and
    /// recording downloads
    pub const TELEPHONY_AUTH_TOKEN: &str = "TWILIO_AUTH_TOKEN";
    /// Speech-to-text API credential; missing or placeholder value disables
    /// transcription
    pub const TRANSCRIPTION_API_KEY: &str = "OPENAI_API_KEY";
    /// Speech-to-text API base URL override
    pub const TRANSCRIPTION_API_URL: &str = "TRANSCRIPTION_API_URL";
    /// Public base URL of this deployment, used to reconstruct signed webhook URLs
    pub const APP_BASE_URL: &str = "APP_BASE_URL";
    /// HTTP listen port
    pub const HTTP_PORT: &str = "HTTP_PORT";
    /// Database connection URL
    pub const DATABASE_URL: &str = "DATABASE_URL";
    /// Comma-separated CORS origins for dashboard endpoints
    pub const CORS_ALLOWED_ORIGINS: &str = "CORS_ALLOWED_ORIGINS";
}

/// Default values applied when configuration is absent
pub mod defaults {
    /// Default HTTP listen port
    pub const HTTP_PORT: u16 = 8890;
    /// Default database location
    pub const DATABASE_URL: &str = "sqlite:./data/voice_gateway.db";
    /// Default public base URL (local development)
    pub const APP_BASE_URL: &str = "http://localhost:8890";
    /// Default speech-to-text endpoint (OpenAI-compatible)
    pub const TRANSCRIPTION_API_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
    /// Speech-to-text model identifier
    pub const TRANSCRIPTION_MODEL: &str = "whisper-1";
}

/// Rate limiting windows and thresholds
pub mod rate_limits {
    /// Window duration for public endpoint rate limiting
    pub const WINDOW_SECS: u64 = 60;
    /// Requests per window for widget message ingestion
    pub const WIDGET_MESSAGES_PER_WINDOW: u32 = 30;
    /// Requests per window for widget config reads
    pub const WIDGET_CONFIG_PER_WINDOW: u32 = 120;
    /// In-process limiter map size that triggers a cleanup sweep
    pub const CLEANUP_THRESHOLD: usize = 10_000;
    /// Age past which an in-process bucket is discarded by cleanup
    pub const STALE_ENTRY_SECS: i64 = 300;
    /// Namespace for the widget message ingestion limiter
    pub const NS_WIDGET_MESSAGES: &str = "widget:messages";
    /// Namespace for the widget config limiter
    pub const NS_WIDGET_CONFIG: &str = "widget:config";
}

/// Timeouts for outbound calls to the telephony and transcription services
pub mod timeouts {
    /// Recording download timeout in seconds
    pub const RECORDING_FETCH_SECS: u64 = 15;
    /// Speech-to-text request timeout in seconds
    pub const TRANSCRIPTION_SECS: u64 = 30;
}

/// Telephony provider integration values
pub mod telephony {
    /// Signature header sent on every provider webhook
    pub const SIGNATURE_HEADER: &str = "x-twilio-signature";
    /// Audio container extensions the recording endpoint serves directly
    pub const AUDIO_EXTENSIONS: &[&str] = &[".wav", ".mp3", ".ogg", ".flac", ".m4a"];
    /// Extension appended when a recording URL has no recognized one
    pub const DEFAULT_AUDIO_EXTENSION: &str = ".wav";
    /// Call/recording status value that marks a session terminal
    pub const STATUS_COMPLETED: &str = "completed";
    /// Response body characters kept when reporting an upstream failure
    pub const ERROR_BODY_TRUNCATE: usize = 200;
}

/// Transcript handling
pub mod transcripts {
    /// Transcripts at or below this many meaningful characters are treated
    /// as empty and may be overwritten by a later callback
    pub const MIN_MEANINGFUL_LEN: usize = 5;
}

/// First-party hosts that bypass tenant origin allowlists
pub mod operator_hosts {
    /// Hosts always trusted for widget requests regardless of tenant config
    pub const ALWAYS_ALLOWED: &[&str] = &["tikozap.com", "app.tikozap.com", "localhost"];
}

/// Markers identifying a speech-to-text credential that was never filled in
pub mod placeholders {
    /// Substring markers for sample credentials shipped in env templates
    pub const CREDENTIAL_MARKERS: &[&str] = &["your-api-key", "changeme", "placeholder"];
}

/// Service identity for logs
pub mod service_names {
    /// Canonical service name used in structured logs
    pub const VOICE_GATEWAY: &str = "tikozap-voice-gateway";
}
