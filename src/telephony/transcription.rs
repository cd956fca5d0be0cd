// ABOUTME: Speech-to-text transcription client for voicemail audio
// ABOUTME: OpenAI-compatible multipart upload with graceful no-op when unconfigured
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2026 TikoZap

//! Voicemail transcription
//!
//! Converts recording audio into text via an OpenAI-compatible transcription
//! API. Voicemail capture must succeed even without transcription configured,
//! so an absent or placeholder credential makes `transcribe` return an empty
//! string instead of failing. Once a real credential is present, service
//! errors propagate so the caller can mark the owning item failed and stop
//! retrying it.

use crate::config::TranscriptionConfig;
use crate::constants::{placeholders, telephony, timeouts};
use crate::errors::{AppError, AppResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

/// Speech-to-text seam for the call pipeline
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe raw audio into text; an empty string means "no transcript"
    async fn transcribe(
        &self,
        audio: &[u8],
        file_name: &str,
        content_type: &str,
    ) -> AppResult<String>;
}

/// Response shape of the transcription API
#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// OpenAI-compatible Whisper transcription client
pub struct WhisperTranscriber {
    config: TranscriptionConfig,
    http_client: reqwest::Client,
}

impl WhisperTranscriber {
    /// Create a transcriber from configuration
    #[must_use]
    pub fn new(config: TranscriptionConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(timeouts::TRANSCRIPTION_SECS))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Whether a usable credential is configured
    ///
    /// Sample values shipped in env templates count as unconfigured.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        match self.config.api_key.as_deref() {
            None | Some("") => false,
            Some(key) => {
                let lowered = key.to_ascii_lowercase();
                !placeholders::CREDENTIAL_MARKERS
                    .iter()
                    .any(|marker| lowered.contains(marker))
            }
        }
    }
}

#[async_trait]
impl SpeechToText for WhisperTranscriber {
    async fn transcribe(
        &self,
        audio: &[u8],
        file_name: &str,
        content_type: &str,
    ) -> AppResult<String> {
        if !self.is_configured() {
            debug!("Transcription credential absent or placeholder; skipping transcription");
            return Ok(String::new());
        }

        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::config("Transcription API key vanished after check"))?;

        let file_part = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name(file_name.to_owned())
            .mime_str(content_type)
            .map_err(|e| AppError::invalid_input(format!("Invalid audio content type: {e}")))?;

        let form = reqwest::multipart::Form::new()
            .part("file", file_part)
            .text("model", self.config.model.clone());

        let response = self
            .http_client
            .post(&self.config.api_url)
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::external_service("transcription", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let truncated: String = body.chars().take(telephony::ERROR_BODY_TRUNCATE).collect();
            return Err(AppError::external_service(
                "transcription",
                format!("HTTP {status}: {truncated}"),
            ));
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| AppError::external_service("transcription", e.to_string()))?;

        let text = parsed.text.trim().to_owned();
        info!(chars = text.len(), "Transcription completed");
        Ok(text)
    }
}
