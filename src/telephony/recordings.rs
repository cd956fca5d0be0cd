// ABOUTME: Authenticated voicemail recording downloads from the telephony provider
// ABOUTME: Handles extension guessing, HTTP Basic auth, and bounded fetch timeouts
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2026 TikoZap

//! Recording download client
//!
//! The telephony provider reports recording URLs without a file extension and
//! serves the same resource under multiple container formats. The fetcher
//! appends `.wav` when the URL has no recognized audio extension, downloads
//! the audio with HTTP Basic credentials (account SID + auth token), and
//! returns the raw bytes for transcription. Recordings are fetched exactly
//! once, immediately after the provider's notification; nothing is cached.

use crate::config::TelephonyConfig;
use crate::constants::{telephony, timeouts};
use crate::errors::{AppError, AppResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// A downloaded recording ready for transcription
#[derive(Debug, Clone)]
pub struct FetchedRecording {
    /// Raw audio bytes
    pub bytes: Bytes,
    /// Content type reported by the provider
    pub content_type: String,
    /// File name derived from the recording URL
    pub file_name: String,
}

/// Recording download seam for the call pipeline
#[async_trait]
pub trait RecordingSource: Send + Sync {
    /// Download a recording reported by the provider
    async fn fetch(&self, recording_url: &str) -> AppResult<FetchedRecording>;
}

/// Downloads voicemail recordings from the telephony provider
#[derive(Debug)]
pub struct RecordingFetcher {
    account_sid: String,
    auth_token: String,
    http_client: reqwest::Client,
}

impl RecordingFetcher {
    /// Create a fetcher from explicit credentials
    #[must_use]
    pub fn new(account_sid: String, auth_token: String) -> Self {
        Self {
            account_sid,
            auth_token,
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(timeouts::RECORDING_FETCH_SECS))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Create a fetcher from telephony configuration
    ///
    /// # Errors
    ///
    /// Missing credentials are a configuration error raised here, before any
    /// network call is attempted.
    pub fn from_config(config: &TelephonyConfig) -> AppResult<Self> {
        let account_sid = config
            .account_sid
            .clone()
            .ok_or_else(|| AppError::config("Telephony account SID is not configured"))?;
        let auth_token = config
            .auth_token
            .clone()
            .ok_or_else(|| AppError::config("Telephony auth token is not configured"))?;
        Ok(Self::new(account_sid, auth_token))
    }

    /// Normalize a recording URL, appending the default audio extension when
    /// the path carries no recognized one
    #[must_use]
    pub fn normalize_url(recording_url: &str) -> String {
        let (path, query) = match recording_url.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (recording_url, None),
        };

        let has_audio_extension = telephony::AUDIO_EXTENSIONS
            .iter()
            .any(|ext| path.to_ascii_lowercase().ends_with(ext));

        let path = if has_audio_extension {
            path.to_owned()
        } else {
            format!("{path}{}", telephony::DEFAULT_AUDIO_EXTENSION)
        };

        match query {
            Some(query) => format!("{path}?{query}"),
            None => path,
        }
    }
}

#[async_trait]
impl RecordingSource for RecordingFetcher {
    /// Download a recording
    ///
    /// A non-success HTTP status is a hard failure carrying the status code
    /// and a truncated response body for diagnostics.
    async fn fetch(&self, recording_url: &str) -> AppResult<FetchedRecording> {
        let url = Self::normalize_url(recording_url);
        let file_name = url
            .split('?')
            .next()
            .and_then(|path| path.rsplit('/').next())
            .filter(|name| !name.is_empty())
            .unwrap_or("recording.wav")
            .to_owned();

        let response = self
            .http_client
            .get(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await
            .map_err(|e| AppError::external_service("recording download", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let truncated: String = body.chars().take(telephony::ERROR_BODY_TRUNCATE).collect();
            return Err(AppError::external_service(
                "recording download",
                format!("HTTP {status}: {truncated}"),
            ));
        }

        let content_type = response
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("audio/wav")
            .to_owned();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::external_service("recording download", e.to_string()))?;

        Ok(FetchedRecording {
            bytes,
            content_type,
            file_name,
        })
    }
}
