// ABOUTME: Integration tests for the call/recording state machine and pipeline
// ABOUTME: Covers idempotent completion, transcript finality, and the fetch-transcribe flow
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2026 TikoZap

//! Call pipeline integration tests

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use common::{
    create_test_database, seed_call_session, seed_conversation, seed_voicemail_item,
    test_pipeline, FailingTranscriber, StaticRecordingSource, StaticTranscriber,
};
use std::sync::Arc;
use tikozap_voice_gateway::{
    calls::{CallPipeline, NewAnswerMachineItem, RecordingOutcome},
    config::TranscriptionConfig,
    models::{AnswerMachineStatus, AnswerMachineType, CallSessionStatus},
    telephony::WhisperTranscriber,
};
use uuid::Uuid;

#[tokio::test]
async fn test_completed_callback_is_idempotent() {
    let database = create_test_database().await;
    let tenant_id = Uuid::new_v4();
    let conversation = seed_conversation(&database, tenant_id).await;
    let session = seed_call_session(&database, tenant_id, conversation.id).await;
    let pipeline = test_pipeline(database.clone(), Arc::new(StaticTranscriber(String::new())));

    let first = pipeline
        .handle_status_callback(tenant_id, session.id, "completed")
        .await
        .unwrap();
    assert!(first);

    let after_first = database
        .get_call_session(tenant_id, session.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after_first.status, CallSessionStatus::Completed);
    let ended_at = after_first.ended_at.unwrap();

    // A second completed callback must be a no-op, not an error
    let second = pipeline
        .handle_status_callback(tenant_id, session.id, "completed")
        .await
        .unwrap();
    assert!(!second);

    let after_second = database
        .get_call_session(tenant_id, session.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after_second.status, CallSessionStatus::Completed);
    assert_eq!(after_second.ended_at.unwrap(), ended_at);
}

#[tokio::test]
async fn test_non_terminal_status_is_noop() {
    let database = create_test_database().await;
    let tenant_id = Uuid::new_v4();
    let conversation = seed_conversation(&database, tenant_id).await;
    let session = seed_call_session(&database, tenant_id, conversation.id).await;
    let pipeline = test_pipeline(database.clone(), Arc::new(StaticTranscriber(String::new())));

    for status in ["ringing", "in-progress", "busy", "no-answer", ""] {
        let transitioned = pipeline
            .handle_status_callback(tenant_id, session.id, status)
            .await
            .unwrap();
        assert!(!transitioned, "status {status:?} should not transition");
    }

    let unchanged = database
        .get_call_session(tenant_id, session.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(unchanged.status, CallSessionStatus::Ringing);
    assert!(unchanged.ended_at.is_none());
}

#[tokio::test]
async fn test_ringing_to_in_progress_to_completed() {
    let database = create_test_database().await;
    let tenant_id = Uuid::new_v4();
    let conversation = seed_conversation(&database, tenant_id).await;
    let session = seed_call_session(&database, tenant_id, conversation.id).await;

    assert!(database.start_call_session(tenant_id, session.id).await.unwrap());
    let live = database
        .get_call_session(tenant_id, session.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(live.status, CallSessionStatus::InProgress);

    assert!(database.complete_call_session(tenant_id, session.id).await.unwrap());

    // No transition out of COMPLETED
    assert!(!database.start_call_session(tenant_id, session.id).await.unwrap());
    let done = database
        .get_call_session(tenant_id, session.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(done.status, CallSessionStatus::Completed);
}

#[tokio::test]
async fn test_voicemail_then_transcription_end_to_end() {
    let database = create_test_database().await;
    let tenant_id = Uuid::new_v4();
    let conversation = seed_conversation(&database, tenant_id).await;
    let session = seed_call_session(&database, tenant_id, conversation.id).await;
    let pipeline = test_pipeline(database.clone(), Arc::new(StaticTranscriber(String::new())));

    // Diversion creates the item
    let item = pipeline
        .create_answer_machine_item(NewAnswerMachineItem {
            tenant_id,
            conversation_id: conversation.id,
            call_session_id: Some(session.id),
            item_type: AnswerMachineType::Voicemail,
            from_number: Some("+15550100".to_owned()),
            reason: "after_hours".to_owned(),
            callback_number: None,
            callback_notes: None,
        })
        .await
        .unwrap();
    assert_eq!(item.status, AnswerMachineStatus::New);

    // Recording callback attaches the URL, transcript stays empty
    let attached = pipeline
        .handle_voicemail_callback(
            tenant_id,
            session.id,
            Some("https://provider/rec123"),
            Some("RE123"),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(attached.recording_url.as_deref(), Some("https://provider/rec123"));
    assert!(attached.transcript_text.is_none());
    assert_eq!(attached.status, AnswerMachineStatus::New);

    // Transcription callback sets the text and appends one ledger message
    let transcribed = pipeline
        .handle_transcription_callback(tenant_id, session.id, "call me back please")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        transcribed.transcript_text.as_deref(),
        Some("call me back please")
    );

    let messages = database
        .list_conversation_messages(conversation.id)
        .await
        .unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].content.contains("call me back please"));

    // A repeat of the same callback produces no second ledger message
    let repeat = pipeline
        .handle_transcription_callback(tenant_id, session.id, "call me back please")
        .await
        .unwrap();
    assert!(repeat.is_none());

    let messages = database
        .list_conversation_messages(conversation.id)
        .await
        .unwrap();
    assert_eq!(messages.len(), 1);
}

#[tokio::test]
async fn test_meaningful_transcript_is_never_overwritten() {
    let database = create_test_database().await;
    let tenant_id = Uuid::new_v4();
    let conversation = seed_conversation(&database, tenant_id).await;
    let session = seed_call_session(&database, tenant_id, conversation.id).await;
    let pipeline = test_pipeline(database.clone(), Arc::new(StaticTranscriber(String::new())));
    let item = seed_voicemail_item(&database, &session).await;

    let applied = pipeline
        .handle_transcription_callback(tenant_id, session.id, "call me back please")
        .await
        .unwrap();
    assert!(applied.is_some());

    let overwrite = pipeline
        .handle_transcription_callback(tenant_id, session.id, "completely different text")
        .await
        .unwrap();
    assert!(overwrite.is_none());

    let stored = database
        .get_answer_machine_item(item.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.transcript_text.as_deref(), Some("call me back please"));
    assert_eq!(stored.status, AnswerMachineStatus::New);
}

#[tokio::test]
async fn test_short_transcript_is_not_final() {
    let database = create_test_database().await;
    let tenant_id = Uuid::new_v4();
    let conversation = seed_conversation(&database, tenant_id).await;
    let session = seed_call_session(&database, tenant_id, conversation.id).await;
    let pipeline = test_pipeline(database.clone(), Arc::new(StaticTranscriber(String::new())));
    seed_voicemail_item(&database, &session).await;

    // Five or fewer meaningful characters leave the item open
    let first = pipeline
        .handle_transcription_callback(tenant_id, session.id, "ok")
        .await
        .unwrap();
    assert!(first.is_some());

    let second = pipeline
        .handle_transcription_callback(tenant_id, session.id, "call me back please")
        .await
        .unwrap();
    assert_eq!(
        second.unwrap().transcript_text.as_deref(),
        Some("call me back please")
    );
}

#[tokio::test]
async fn test_recording_for_answered_call_is_benign_noop() {
    let database = create_test_database().await;
    let tenant_id = Uuid::new_v4();
    let conversation = seed_conversation(&database, tenant_id).await;
    let session = seed_call_session(&database, tenant_id, conversation.id).await;
    let pipeline = test_pipeline(database.clone(), Arc::new(StaticTranscriber(String::new())));

    // No voicemail item exists: the call was answered by a human
    let attached = pipeline
        .handle_voicemail_callback(tenant_id, session.id, Some("https://provider/rec9"), None)
        .await
        .unwrap();
    assert!(attached.is_none());
}

#[tokio::test]
async fn test_recording_status_pipeline_transcribes() {
    let database = create_test_database().await;
    let tenant_id = Uuid::new_v4();
    let conversation = seed_conversation(&database, tenant_id).await;
    let session = seed_call_session(&database, tenant_id, conversation.id).await;
    let pipeline = test_pipeline(
        database.clone(),
        Arc::new(StaticTranscriber("please send the invoice again".to_owned())),
    );
    let item = seed_voicemail_item(&database, &session).await;

    let outcome = pipeline
        .handle_recording_status(
            tenant_id,
            session.id,
            "completed",
            Some("https://provider/rec123"),
            Some("RE123"),
        )
        .await
        .unwrap();
    assert_eq!(outcome, RecordingOutcome::Transcribed);

    let stored = database
        .get_answer_machine_item(item.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        stored.transcript_text.as_deref(),
        Some("please send the invoice again")
    );
    assert_eq!(stored.status, AnswerMachineStatus::New);
    assert_eq!(stored.recording_url.as_deref(), Some("https://provider/rec123"));

    let messages = database
        .list_conversation_messages(conversation.id)
        .await
        .unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].content.contains("please send the invoice again"));

    // Provider retry: the item is final now, nothing reruns
    let retry = pipeline
        .handle_recording_status(
            tenant_id,
            session.id,
            "completed",
            Some("https://provider/rec123"),
            Some("RE123"),
        )
        .await
        .unwrap();
    assert_eq!(retry, RecordingOutcome::NoMatchingItem);
    let messages = database
        .list_conversation_messages(conversation.id)
        .await
        .unwrap();
    assert_eq!(messages.len(), 1);
}

#[tokio::test]
async fn test_recording_status_without_credential_still_captures() {
    let database = create_test_database().await;
    let tenant_id = Uuid::new_v4();
    let conversation = seed_conversation(&database, tenant_id).await;
    let session = seed_call_session(&database, tenant_id, conversation.id).await;

    // Real transcriber without a credential: silently disabled
    let transcriber = Arc::new(WhisperTranscriber::new(TranscriptionConfig::default()));
    let pipeline = CallPipeline::new(
        database.clone(),
        Some(Arc::new(StaticRecordingSource)),
        transcriber,
    );
    let item = seed_voicemail_item(&database, &session).await;

    let outcome = pipeline
        .handle_recording_status(
            tenant_id,
            session.id,
            "completed",
            Some("https://provider/rec123"),
            None,
        )
        .await
        .unwrap();
    assert_eq!(outcome, RecordingOutcome::CapturedWithoutTranscript);

    let stored = database
        .get_answer_machine_item(item.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, AnswerMachineStatus::New);
    assert!(stored.transcript_text.is_none());
    assert!(stored.recording_url.is_some());
}

#[tokio::test]
async fn test_recording_status_failure_marks_item_failed() {
    let database = create_test_database().await;
    let tenant_id = Uuid::new_v4();
    let conversation = seed_conversation(&database, tenant_id).await;
    let session = seed_call_session(&database, tenant_id, conversation.id).await;
    let pipeline = test_pipeline(database.clone(), Arc::new(FailingTranscriber));
    let item = seed_voicemail_item(&database, &session).await;

    let outcome = pipeline
        .handle_recording_status(
            tenant_id,
            session.id,
            "completed",
            Some("https://provider/rec123"),
            None,
        )
        .await
        .unwrap();
    assert_eq!(outcome, RecordingOutcome::Failed);

    let stored = database
        .get_answer_machine_item(item.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, AnswerMachineStatus::Failed);

    // Failed items are terminal: a retry callback finds nothing to claim
    let retry = pipeline
        .handle_recording_status(
            tenant_id,
            session.id,
            "completed",
            Some("https://provider/rec123"),
            None,
        )
        .await
        .unwrap();
    assert_eq!(retry, RecordingOutcome::NoMatchingItem);
}

#[tokio::test]
async fn test_recording_status_ignores_non_terminal() {
    let database = create_test_database().await;
    let tenant_id = Uuid::new_v4();
    let conversation = seed_conversation(&database, tenant_id).await;
    let session = seed_call_session(&database, tenant_id, conversation.id).await;
    let pipeline = test_pipeline(database.clone(), Arc::new(StaticTranscriber(String::new())));
    let item = seed_voicemail_item(&database, &session).await;

    let outcome = pipeline
        .handle_recording_status(tenant_id, session.id, "in-progress", Some("https://x"), None)
        .await
        .unwrap();
    assert_eq!(outcome, RecordingOutcome::IgnoredStatus);

    let stored = database
        .get_answer_machine_item(item.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, AnswerMachineStatus::New);
}

#[tokio::test]
async fn test_most_recent_item_wins_selection() {
    let database = create_test_database().await;
    let tenant_id = Uuid::new_v4();
    let conversation = seed_conversation(&database, tenant_id).await;
    let session = seed_call_session(&database, tenant_id, conversation.id).await;
    let pipeline = test_pipeline(database.clone(), Arc::new(StaticTranscriber(String::new())));

    let older = seed_voicemail_item(&database, &session).await;
    // Ensure a strictly later creation timestamp
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let newer = seed_voicemail_item(&database, &session).await;

    let attached = pipeline
        .handle_voicemail_callback(tenant_id, session.id, Some("https://provider/rec42"), None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(attached.id, newer.id);

    let untouched = database
        .get_answer_machine_item(older.id)
        .await
        .unwrap()
        .unwrap();
    assert!(untouched.recording_url.is_none());
}

#[tokio::test]
async fn test_tenant_scoping_blocks_cross_tenant_mutation() {
    let database = create_test_database().await;
    let tenant_id = Uuid::new_v4();
    let other_tenant = Uuid::new_v4();
    let conversation = seed_conversation(&database, tenant_id).await;
    let session = seed_call_session(&database, tenant_id, conversation.id).await;
    let pipeline = test_pipeline(database.clone(), Arc::new(StaticTranscriber(String::new())));
    seed_voicemail_item(&database, &session).await;

    // Another tenant cannot complete or attach to this tenant's call
    let transitioned = pipeline
        .handle_status_callback(other_tenant, session.id, "completed")
        .await
        .unwrap();
    assert!(!transitioned);

    let attached = pipeline
        .handle_voicemail_callback(other_tenant, session.id, Some("https://provider/rec"), None)
        .await
        .unwrap();
    assert!(attached.is_none());
}
