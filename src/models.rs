// ABOUTME: Core data models for call sessions, answer-machine items, and widgets
// ABOUTME: DTOs for multi-tenant telephony state with TEXT-backed status enums
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 TikoZap

//! Core data models
//!
//! Database-facing record types for the telephony pipeline. All records are
//! tenant-scoped; statuses are stored as TEXT and round-trip through the
//! `as_str`/`parse` helpers on each enum.

use crate::constants::transcripts;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a call session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallSessionStatus {
    /// Call is ringing, not yet connected
    Ringing,
    /// Call is connected and live
    InProgress,
    /// Call has ended; terminal, never left
    Completed,
}

impl CallSessionStatus {
    /// Database representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ringing => "RINGING",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
        }
    }

    /// Parse the database representation
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RINGING" => Some(Self::Ringing),
            "IN_PROGRESS" => Some(Self::InProgress),
            "COMPLETED" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// One phone call tracked by the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSession {
    /// Unique session ID
    pub id: Uuid,
    /// Tenant that owns the call
    pub tenant_id: Uuid,
    /// Opaque call identifier assigned by the telephony provider
    pub provider_call_sid: String,
    /// Current lifecycle status
    pub status: CallSessionStatus,
    /// Conversation the call's ledger entries are written into
    pub conversation_id: Uuid,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// When the call ended; None until completed
    pub ended_at: Option<DateTime<Utc>>,
}

impl CallSession {
    /// Create a new ringing session
    #[must_use]
    pub fn new(tenant_id: Uuid, provider_call_sid: String, conversation_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            provider_call_sid,
            status: CallSessionStatus::Ringing,
            conversation_id,
            created_at: Utc::now(),
            ended_at: None,
        }
    }
}

/// Kind of answer-machine capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnswerMachineType {
    /// Caller left a voice message
    Voicemail,
    /// Caller requested a callback
    Callback,
}

impl AnswerMachineType {
    /// Database representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Voicemail => "VOICEMAIL",
            Self::Callback => "CALLBACK",
        }
    }

    /// Parse the database representation
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "VOICEMAIL" => Some(Self::Voicemail),
            "CALLBACK" => Some(Self::Callback),
            _ => None,
        }
    }
}

/// Processing status of an answer-machine item
///
/// `New` doubles as the terminal "ready" state once a transcript is attached;
/// items with a meaningful transcript are final regardless of status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnswerMachineStatus {
    /// Awaiting processing, or ready with a transcript attached
    New,
    /// Claimed by the recording/transcription pipeline
    InProgress,
    /// Transcription failed irrecoverably; never retried automatically
    Failed,
}

impl AnswerMachineStatus {
    /// Database representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::InProgress => "IN_PROGRESS",
            Self::Failed => "FAILED",
        }
    }

    /// Parse the database representation
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NEW" => Some(Self::New),
            "IN_PROGRESS" => Some(Self::InProgress),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A voicemail or callback request captured during a call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerMachineItem {
    /// Unique item ID
    pub id: Uuid,
    /// Tenant that owns the item
    pub tenant_id: Uuid,
    /// Owning call session; nullable, items may be linked retroactively
    pub call_session_id: Option<Uuid>,
    /// Conversation the item's ledger entries belong to
    pub conversation_id: Uuid,
    /// Voicemail or callback request
    pub item_type: AnswerMachineType,
    /// Processing status
    pub status: AnswerMachineStatus,
    /// Why the caller was diverted (after_hours, dtmf_0, dtmf_1, fallback, disabled)
    pub reason: String,
    /// Caller phone number when known
    pub from_number: Option<String>,
    /// Recording URL attached by a later recording callback
    pub recording_url: Option<String>,
    /// Provider recording identifier
    pub recording_sid: Option<String>,
    /// Transcript attached by a later transcription callback
    pub transcript_text: Option<String>,
    /// Callback number; only meaningful for callback items
    pub callback_number: Option<String>,
    /// Callback notes; only meaningful for callback items
    pub callback_notes: Option<String>,
    /// When the item was created
    pub created_at: DateTime<Utc>,
    /// When the item was last mutated
    pub updated_at: DateTime<Utc>,
}

impl AnswerMachineItem {
    /// Whether this item carries a transcript long enough to be final.
    ///
    /// Items with a meaningful transcript must never be re-transcribed or
    /// have their transcript overwritten by a later callback.
    #[must_use]
    pub fn has_meaningful_transcript(&self) -> bool {
        transcript_is_meaningful(self.transcript_text.as_deref())
    }
}

/// Shared meaningful-transcript check used by the item model and the
/// database selection queries
#[must_use]
pub fn transcript_is_meaningful(transcript: Option<&str>) -> bool {
    transcript.is_some_and(|t| {
        t.chars().filter(|c| !c.is_whitespace()).count() > transcripts::MIN_MEANINGFUL_LEN
    })
}

/// A per-contact conversation holding the append-only message ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID
    pub id: Uuid,
    /// Tenant that owns the conversation
    pub tenant_id: Uuid,
    /// Phone number of the contact, when known
    pub contact_number: Option<String>,
    /// When the conversation was created
    pub created_at: DateTime<Utc>,
    /// Bumped whenever the pipeline writes into the ledger
    pub last_activity_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new conversation
    #[must_use]
    pub fn new(tenant_id: Uuid, contact_number: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            contact_number,
            created_at: now,
            last_activity_at: now,
        }
    }
}

/// One append-only ledger entry in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// Unique message ID
    pub id: Uuid,
    /// Conversation this message belongs to
    pub conversation_id: Uuid,
    /// Tenant ID for multi-tenant isolation
    pub tenant_id: Uuid,
    /// Who produced the entry (caller, system, visitor)
    pub direction: String,
    /// Message content
    pub content: String,
    /// When the message was created
    pub created_at: DateTime<Utc>,
}

/// Tenant-configured embeddable widget
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WidgetConfig {
    /// Unique widget ID
    pub id: Uuid,
    /// Owning tenant
    pub tenant_id: Uuid,
    /// Public key embedded in customer pages to identify the widget
    pub public_key: String,
    /// Display name shown in the widget header
    pub display_name: String,
    /// Domain patterns allowed to send messages through this widget
    pub allowed_domains: Vec<String>,
    /// Greeting line shown when the widget opens
    pub greeting: String,
    /// Accent color hex value
    pub accent_color: String,
    /// Disabled widgets answer 404 on every public endpoint
    pub enabled: bool,
    /// When the widget was created
    pub created_at: DateTime<Utc>,
}
