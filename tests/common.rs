// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: Provides database seeding, mock telephony backends, and resource builders
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2026 TikoZap
#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

//! Shared test utilities for `tikozap_voice_gateway`
//!
//! Common setup functions to reduce duplication across integration tests.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::{Arc, Once};
use tikozap_voice_gateway::{
    calls::CallPipeline,
    config::{ServerConfig, TelephonyConfig},
    database::Database,
    errors::{AppError, AppResult},
    models::{
        AnswerMachineItem, AnswerMachineStatus, AnswerMachineType, CallSession, Conversation,
        WidgetConfig,
    },
    server::ServerResources,
    telephony::{FetchedRecording, RecordingSource, SpeechToText},
};
use uuid::Uuid;

static INIT_LOGGER: Once = Once::new();

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let log_level = match std::env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .init();
    });
}

/// Standard test database setup
pub async fn create_test_database() -> Arc<Database> {
    init_test_logging();
    Arc::new(Database::new("sqlite::memory:").await.unwrap())
}

/// Shared signing secret used by webhook tests
pub const TEST_AUTH_TOKEN: &str = "test_auth_token_1234567890";

/// Server configuration matching the test signing setup
pub fn test_config() -> ServerConfig {
    ServerConfig {
        http_port: 0,
        app_base_url: "http://localhost:8890".to_owned(),
        telephony: TelephonyConfig {
            account_sid: Some("AC00000000000000000000000000000000".to_owned()),
            auth_token: Some(TEST_AUTH_TOKEN.to_owned()),
        },
        ..ServerConfig::default()
    }
}

/// Seed a conversation for a tenant
pub async fn seed_conversation(database: &Database, tenant_id: Uuid) -> Conversation {
    let conversation = Conversation::new(tenant_id, Some("+15550100".to_owned()));
    database.create_conversation(&conversation).await.unwrap();
    conversation
}

/// Seed a ringing call session bound to a conversation
pub async fn seed_call_session(
    database: &Database,
    tenant_id: Uuid,
    conversation_id: Uuid,
) -> CallSession {
    let session = CallSession::new(tenant_id, format!("CA{}", Uuid::new_v4().simple()), conversation_id);
    database.create_call_session(&session).await.unwrap();
    session
}

/// Seed a fresh voicemail item for a call session
pub async fn seed_voicemail_item(database: &Database, session: &CallSession) -> AnswerMachineItem {
    let now = chrono::Utc::now();
    let item = AnswerMachineItem {
        id: Uuid::new_v4(),
        tenant_id: session.tenant_id,
        call_session_id: Some(session.id),
        conversation_id: session.conversation_id,
        item_type: AnswerMachineType::Voicemail,
        status: AnswerMachineStatus::New,
        reason: "after_hours".to_owned(),
        from_number: Some("+15550100".to_owned()),
        recording_url: None,
        recording_sid: None,
        transcript_text: None,
        callback_number: None,
        callback_notes: None,
        created_at: now,
        updated_at: now,
    };
    database.create_answer_machine_item(&item).await.unwrap();
    item
}

/// Seed an enabled widget with the given allowed domains
pub async fn seed_widget(
    database: &Database,
    tenant_id: Uuid,
    allowed_domains: &[&str],
) -> WidgetConfig {
    let widget = WidgetConfig {
        id: Uuid::new_v4(),
        tenant_id,
        public_key: format!("pk_{}", Uuid::new_v4().simple()),
        display_name: "Support".to_owned(),
        allowed_domains: allowed_domains.iter().map(|d| (*d).to_owned()).collect(),
        greeting: "How can we help?".to_owned(),
        accent_color: "#6366f1".to_owned(),
        enabled: true,
        created_at: chrono::Utc::now(),
    };
    database.create_widget(&widget).await.unwrap();
    widget
}

/// Recording source returning fixed bytes without touching the network
pub struct StaticRecordingSource;

#[async_trait]
impl RecordingSource for StaticRecordingSource {
    async fn fetch(&self, _recording_url: &str) -> AppResult<FetchedRecording> {
        Ok(FetchedRecording {
            bytes: Bytes::from_static(b"RIFFfake-wav-bytes"),
            content_type: "audio/wav".to_owned(),
            file_name: "RE123.wav".to_owned(),
        })
    }
}

/// Recording source that always fails like an upstream outage
pub struct FailingRecordingSource;

#[async_trait]
impl RecordingSource for FailingRecordingSource {
    async fn fetch(&self, _recording_url: &str) -> AppResult<FetchedRecording> {
        Err(AppError::external_service(
            "recording download",
            "HTTP 404 Not Found: no such recording",
        ))
    }
}

/// Transcriber returning a fixed transcript
pub struct StaticTranscriber(pub String);

#[async_trait]
impl SpeechToText for StaticTranscriber {
    async fn transcribe(
        &self,
        _audio: &[u8],
        _file_name: &str,
        _content_type: &str,
    ) -> AppResult<String> {
        Ok(self.0.clone())
    }
}

/// Transcriber that always fails like a configured-but-broken service
pub struct FailingTranscriber;

#[async_trait]
impl SpeechToText for FailingTranscriber {
    async fn transcribe(
        &self,
        _audio: &[u8],
        _file_name: &str,
        _content_type: &str,
    ) -> AppResult<String> {
        Err(AppError::external_service(
            "transcription",
            "HTTP 500: model unavailable",
        ))
    }
}

/// Pipeline with mock recording and transcription backends
pub fn test_pipeline(
    database: Arc<Database>,
    transcriber: Arc<dyn SpeechToText>,
) -> CallPipeline {
    CallPipeline::new(database, Some(Arc::new(StaticRecordingSource)), transcriber)
}

/// Server resources with mock telephony backends for route tests
pub fn test_resources(database: Arc<Database>) -> Arc<ServerResources> {
    let config = test_config();
    let pipeline = test_pipeline(
        database.clone(),
        Arc::new(StaticTranscriber("call me back please".to_owned())),
    );
    Arc::new(ServerResources::new(database, config).with_pipeline(pipeline))
}
