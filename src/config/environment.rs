// ABOUTME: Environment configuration management for deployment-specific settings
// ABOUTME: Handles environment variables, defaults, and runtime configuration parsing
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Environment-based configuration management for production deployment

use crate::constants::{defaults, env_config, rate_limits};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Type-safe database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DatabaseUrl {
    /// SQLite database with file path
    SQLite { path: PathBuf },
    /// In-memory SQLite (for testing)
    Memory,
}

impl DatabaseUrl {
    /// Parse from string with validation
    pub fn parse_url(s: &str) -> Result<Self> {
        if let Some(path_str) = s.strip_prefix("sqlite:") {
            if path_str == ":memory:" {
                Ok(Self::Memory)
            } else {
                Ok(Self::SQLite {
                    path: PathBuf::from(path_str),
                })
            }
        } else {
            // Fallback: treat as SQLite file path
            Ok(Self::SQLite {
                path: PathBuf::from(s),
            })
        }
    }

    /// Convert to connection string
    #[must_use]
    pub fn to_connection_string(&self) -> String {
        match self {
            Self::SQLite { path } => format!("sqlite:{}", path.display()),
            Self::Memory => "sqlite::memory:".to_owned(),
        }
    }

    /// Check if this is an in-memory database
    #[must_use]
    pub const fn is_memory(&self) -> bool {
        matches!(self, Self::Memory)
    }
}

impl Default for DatabaseUrl {
    fn default() -> Self {
        Self::SQLite {
            path: PathBuf::from("./data/voice_gateway.db"),
        }
    }
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DatabaseConfig {
    /// Database connection URL
    pub url: DatabaseUrl,
}

/// Telephony provider credentials
///
/// The auth token doubles as the webhook signing secret and the HTTP Basic
/// password for recording downloads. Both fields are optional at load time;
/// webhook validation fails closed with a configuration error when the token
/// is absent.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TelephonyConfig {
    /// Provider account identifier
    pub account_sid: Option<String>,
    /// Shared secret for webhook signatures and recording downloads
    pub auth_token: Option<String>,
}

/// Speech-to-text service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// API credential; absent or placeholder value disables transcription
    pub api_key: Option<String>,
    /// Endpoint URL (OpenAI-compatible audio transcription API)
    pub api_url: String,
    /// Model identifier submitted with each request
    pub model: String,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: defaults::TRANSCRIPTION_API_URL.to_owned(),
            model: defaults::TRANSCRIPTION_MODEL.to_owned(),
        }
    }
}

/// CORS configuration for dashboard-facing endpoints
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CorsConfig {
    /// Comma-separated origin list, or "*" / empty for any origin
    pub allowed_origins: String,
}

/// Rate limiting windows and thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Window duration in seconds
    pub window_secs: u64,
    /// Requests per window for widget message ingestion
    pub widget_messages_per_window: u32,
    /// Requests per window for widget config reads
    pub widget_config_per_window: u32,
    /// In-process limiter map size that triggers cleanup
    pub cleanup_threshold: usize,
    /// Age in seconds past which an in-process bucket is swept
    pub stale_entry_secs: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: rate_limits::WINDOW_SECS,
            widget_messages_per_window: rate_limits::WIDGET_MESSAGES_PER_WINDOW,
            widget_config_per_window: rate_limits::WIDGET_CONFIG_PER_WINDOW,
            cleanup_threshold: rate_limits::CLEANUP_THRESHOLD,
            stale_entry_secs: rate_limits::STALE_ENTRY_SECS,
        }
    }
}

/// Complete server configuration loaded from the environment
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerConfig {
    /// HTTP listen port
    #[serde(default)]
    pub http_port: u16,
    /// Public base URL used to reconstruct signed webhook URLs
    #[serde(default)]
    pub app_base_url: String,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Telephony provider credentials
    #[serde(default)]
    pub telephony: TelephonyConfig,
    /// Speech-to-text configuration
    #[serde(default)]
    pub transcription: TranscriptionConfig,
    /// CORS configuration
    #[serde(default)]
    pub cors: CorsConfig,
    /// Rate limit configuration
    #[serde(default = "RateLimitConfig::default")]
    pub rate_limit: RateLimitConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error when a set variable fails to parse (port, database
    /// URL). Absent variables fall back to defaults; credential absence is
    /// surfaced at first use, not at load time.
    pub fn from_env() -> Result<Self> {
        let http_port = match env::var(env_config::HTTP_PORT) {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("Invalid {}: {value}", env_config::HTTP_PORT))?,
            Err(_) => defaults::HTTP_PORT,
        };

        let database_url = env::var(env_config::DATABASE_URL)
            .unwrap_or_else(|_| defaults::DATABASE_URL.to_owned());
        let url = DatabaseUrl::parse_url(&database_url)
            .with_context(|| format!("Invalid {}: {database_url}", env_config::DATABASE_URL))?;

        let app_base_url = env::var(env_config::APP_BASE_URL)
            .unwrap_or_else(|_| defaults::APP_BASE_URL.to_owned())
            .trim_end_matches('/')
            .to_owned();

        let telephony = TelephonyConfig {
            account_sid: env::var(env_config::TELEPHONY_ACCOUNT_SID).ok(),
            auth_token: env::var(env_config::TELEPHONY_AUTH_TOKEN).ok(),
        };

        let transcription = TranscriptionConfig {
            api_key: env::var(env_config::TRANSCRIPTION_API_KEY).ok(),
            api_url: env::var(env_config::TRANSCRIPTION_API_URL)
                .unwrap_or_else(|_| defaults::TRANSCRIPTION_API_URL.to_owned()),
            model: defaults::TRANSCRIPTION_MODEL.to_owned(),
        };

        let cors = CorsConfig {
            allowed_origins: env::var(env_config::CORS_ALLOWED_ORIGINS).unwrap_or_default(),
        };

        Ok(Self {
            http_port,
            app_base_url,
            database: DatabaseConfig { url },
            telephony,
            transcription,
            cors,
            rate_limit: RateLimitConfig::default(),
        })
    }

    /// One-line startup summary safe to log (no secrets)
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "port={} base_url={} db={} telephony_configured={} transcription_configured={}",
            self.http_port,
            self.app_base_url,
            self.database.url.to_connection_string(),
            self.telephony.auth_token.is_some(),
            self.transcription.api_key.is_some(),
        )
    }
}
