// ABOUTME: Call/recording state machine orchestration for webhook processing
// ABOUTME: Coordinates database state, recording downloads, and transcription per callback
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 TikoZap

//! # Call Pipeline
//!
//! Orchestrates what happens when an authenticated webhook arrives: advancing
//! the call session state machine, attaching recordings and transcripts to
//! answer-machine items, running the fetch-and-transcribe pipeline, and
//! writing human-readable entries into the conversation ledger.
//!
//! Webhook delivery order is not guaranteed. Every handler re-reads current
//! row state before mutating, and the "most recent non-final item" selection
//! in the database layer makes out-of-order and duplicated deliveries safe:
//! an item with a meaningful transcript is final and is never touched again.

use crate::constants::telephony;
use crate::database::Database;
use crate::errors::{AppResult, ErrorCode};
use crate::models::{
    AnswerMachineItem, AnswerMachineStatus, AnswerMachineType, ConversationMessage,
};
use crate::telephony::{RecordingSource, SpeechToText};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Ledger direction for entries written by the pipeline
const LEDGER_DIRECTION: &str = "caller";

/// Outcome of a recording-status callback run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingOutcome {
    /// Recording fetched and transcript stored
    Transcribed,
    /// Recording captured but transcription is not configured
    CapturedWithoutTranscript,
    /// Fetch or transcription failed irrecoverably; item marked failed
    Failed,
    /// No unresolved voicemail item for the call
    NoMatchingItem,
    /// Status was not terminal; nothing to do
    IgnoredStatus,
}

/// Arguments for creating an answer-machine item
#[derive(Debug, Clone)]
pub struct NewAnswerMachineItem {
    pub tenant_id: Uuid,
    pub conversation_id: Uuid,
    pub call_session_id: Option<Uuid>,
    pub item_type: AnswerMachineType,
    pub from_number: Option<String>,
    pub reason: String,
    pub callback_number: Option<String>,
    pub callback_notes: Option<String>,
}

/// Coordinates webhook processing across storage and external services
pub struct CallPipeline {
    database: Arc<Database>,
    recording_source: Option<Arc<dyn RecordingSource>>,
    transcriber: Arc<dyn SpeechToText>,
}

impl CallPipeline {
    /// Create a pipeline
    ///
    /// The fetcher is optional: without telephony credentials the
    /// recording-status pipeline reports a configuration error instead of
    /// silently skipping.
    #[must_use]
    pub fn new(
        database: Arc<Database>,
        recording_source: Option<Arc<dyn RecordingSource>>,
        transcriber: Arc<dyn SpeechToText>,
    ) -> Self {
        Self {
            database,
            recording_source,
            transcriber,
        }
    }

    /// Create a `NEW` answer-machine item for a diverted caller
    ///
    /// No uniqueness constraint applies; concurrent diversions may create
    /// multiple items and the most-recent selection rule resolves ambiguity.
    pub async fn create_answer_machine_item(
        &self,
        new_item: NewAnswerMachineItem,
    ) -> AppResult<AnswerMachineItem> {
        let now = Utc::now();
        let item = AnswerMachineItem {
            id: Uuid::new_v4(),
            tenant_id: new_item.tenant_id,
            call_session_id: new_item.call_session_id,
            conversation_id: new_item.conversation_id,
            item_type: new_item.item_type,
            status: AnswerMachineStatus::New,
            reason: new_item.reason,
            from_number: new_item.from_number,
            recording_url: None,
            recording_sid: None,
            transcript_text: None,
            callback_number: new_item.callback_number,
            callback_notes: new_item.callback_notes,
            created_at: now,
            updated_at: now,
        };

        self.database.create_answer_machine_item(&item).await?;
        info!(
            item_id = %item.id,
            item_type = item.item_type.as_str(),
            reason = %item.reason,
            "Answer-machine item created"
        );
        Ok(item)
    }

    /// Apply a call status callback
    ///
    /// Only a terminal `completed` value changes anything; a session already
    /// completed is left untouched, and unrecognized status strings are
    /// no-op writes. Returns whether this callback performed the transition.
    pub async fn handle_status_callback(
        &self,
        tenant_id: Uuid,
        call_session_id: Uuid,
        status: &str,
    ) -> AppResult<bool> {
        if !status.eq_ignore_ascii_case(telephony::STATUS_COMPLETED) {
            debug!(
                call_session_id = %call_session_id,
                status = %status,
                "Non-terminal status callback; no-op"
            );
            return Ok(false);
        }

        let transitioned = self
            .database
            .complete_call_session(tenant_id, call_session_id)
            .await?;

        if transitioned {
            info!(call_session_id = %call_session_id, "Call session completed");
        } else {
            debug!(
                call_session_id = %call_session_id,
                "Completed callback for unknown or already-terminal session; no-op"
            );
        }

        Ok(transitioned)
    }

    /// Apply a voicemail recording callback
    ///
    /// Attaches the recording URL to the most recent open voicemail item of
    /// the call. A recording may arrive for a call a human answered, so no
    /// matching item is a benign no-op.
    pub async fn handle_voicemail_callback(
        &self,
        tenant_id: Uuid,
        call_session_id: Uuid,
        recording_url: Option<&str>,
        recording_sid: Option<&str>,
    ) -> AppResult<Option<AnswerMachineItem>> {
        let Some(recording_url) = recording_url else {
            debug!(call_session_id = %call_session_id, "Voicemail callback without recording URL");
            return Ok(None);
        };

        let item = self
            .database
            .attach_recording(tenant_id, call_session_id, recording_url, recording_sid)
            .await?;

        if let Some(ref item) = item {
            info!(item_id = %item.id, "Recording attached to voicemail item");
        }

        Ok(item)
    }

    /// Apply a transcription callback
    ///
    /// Attaches the transcript to the most recent non-final voicemail item,
    /// appends one ledger entry with the text, and bumps the conversation's
    /// last-activity timestamp. Items already carrying a meaningful
    /// transcript are skipped, so a duplicated callback appends nothing.
    pub async fn handle_transcription_callback(
        &self,
        tenant_id: Uuid,
        call_session_id: Uuid,
        transcript_text: &str,
    ) -> AppResult<Option<AnswerMachineItem>> {
        let Some(item) = self
            .database
            .attach_transcript(tenant_id, call_session_id, transcript_text)
            .await?
        else {
            return Ok(None);
        };

        self.append_transcript_ledger_entry(&item, transcript_text)
            .await?;

        Ok(Some(item))
    }

    /// Run the full recording-status pipeline for a terminal recording
    ///
    /// Claims the newest unresolved voicemail item, downloads the audio,
    /// transcribes it, and records the result. Upstream failures mark the
    /// item failed and resolve successfully so the webhook response never
    /// triggers a provider retry storm; configuration errors propagate.
    pub async fn handle_recording_status(
        &self,
        tenant_id: Uuid,
        call_session_id: Uuid,
        recording_status: &str,
        recording_url: Option<&str>,
        recording_sid: Option<&str>,
    ) -> AppResult<RecordingOutcome> {
        if !recording_status.eq_ignore_ascii_case(telephony::STATUS_COMPLETED) {
            debug!(
                call_session_id = %call_session_id,
                status = %recording_status,
                "Non-terminal recording status; no-op"
            );
            return Ok(RecordingOutcome::IgnoredStatus);
        }

        let Some(recording_url) = recording_url else {
            warn!(call_session_id = %call_session_id, "Completed recording without URL; skipping");
            return Ok(RecordingOutcome::IgnoredStatus);
        };

        let Some(item) = self
            .database
            .claim_voicemail_for_processing(tenant_id, call_session_id)
            .await?
        else {
            info!(
                call_session_id = %call_session_id,
                "No unresolved voicemail item for completed recording; skipping"
            );
            return Ok(RecordingOutcome::NoMatchingItem);
        };

        self.database
            .set_item_recording(item.id, recording_url, recording_sid)
            .await?;

        match self.fetch_and_transcribe(recording_url).await {
            Ok(transcript) => {
                self.database
                    .store_transcription_result(item.id, Some(&transcript))
                    .await?;

                if transcript.is_empty() {
                    info!(item_id = %item.id, "Voicemail captured; transcription disabled");
                    Ok(RecordingOutcome::CapturedWithoutTranscript)
                } else {
                    self.append_transcript_ledger_entry(&item, &transcript).await?;
                    Ok(RecordingOutcome::Transcribed)
                }
            }
            Err(err) if err.code == ErrorCode::ConfigError => Err(err),
            Err(err) => {
                error!(
                    item_id = %item.id,
                    error = %err,
                    "Recording pipeline failed; marking item failed"
                );
                self.database.mark_item_failed(item.id).await?;
                Ok(RecordingOutcome::Failed)
            }
        }
    }

    /// Download the recording and run it through speech-to-text
    async fn fetch_and_transcribe(&self, recording_url: &str) -> AppResult<String> {
        let source = self
            .recording_source
            .as_ref()
            .ok_or_else(|| crate::errors::AppError::config("Telephony credentials are not configured"))?;

        let recording = source.fetch(recording_url).await?;
        self.transcriber
            .transcribe(&recording.bytes, &recording.file_name, &recording.content_type)
            .await
    }

    /// Append the transcript ledger entry and bump conversation activity
    async fn append_transcript_ledger_entry(
        &self,
        item: &AnswerMachineItem,
        transcript_text: &str,
    ) -> AppResult<()> {
        let message = ConversationMessage {
            id: Uuid::new_v4(),
            conversation_id: item.conversation_id,
            tenant_id: item.tenant_id,
            direction: LEDGER_DIRECTION.to_owned(),
            content: format!("Voicemail transcript: {transcript_text}"),
            created_at: Utc::now(),
        };

        self.database.append_conversation_message(&message).await?;
        self.database.touch_conversation(item.conversation_id).await?;
        Ok(())
    }
}
