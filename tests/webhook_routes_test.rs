// ABOUTME: Route-level tests for the signed telephony webhook endpoints
// ABOUTME: Covers signature rejection, parameter validation, idempotence, and TwiML responses
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2026 TikoZap

//! Webhook route integration tests

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use axum::body::Body;
use axum::Router;
use common::{
    create_test_database, seed_call_session, seed_conversation, seed_voicemail_item,
    test_resources, TEST_AUTH_TOKEN,
};
use http::{Request, StatusCode};
use std::sync::Arc;
use tikozap_voice_gateway::{
    database::Database,
    models::{AnswerMachineStatus, CallSessionStatus},
    server::{ServerResources, VoiceGatewayServer},
    telephony::SignatureVerifier,
};
use tower::ServiceExt;
use uuid::Uuid;

fn test_router(database: Arc<Database>) -> Router {
    VoiceGatewayServer::new(test_resources(database)).router()
}

/// Build a correctly signed webhook request
fn signed_request(path_and_query: &str, fields: &[(&str, &str)]) -> Request<Body> {
    let params: Vec<(String, String)> = fields
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();

    let verifier = SignatureVerifier::new(TEST_AUTH_TOKEN.to_owned());
    let url = format!("http://localhost:8890{path_and_query}");
    let signature = verifier.compute_signature(&url, &params);

    let body = serde_urlencoded::to_string(&params).unwrap();
    Request::builder()
        .method("POST")
        .uri(path_and_query)
        .header("content-type", "application/x-www-form-urlencoded")
        .header("x-twilio-signature", signature)
        .body(Body::from(body))
        .unwrap()
}

/// Build a webhook request with an arbitrary signature header
fn request_with_signature(
    path_and_query: &str,
    fields: &[(&str, &str)],
    signature: Option<&str>,
) -> Request<Body> {
    let params: Vec<(String, String)> = fields
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    let body = serde_urlencoded::to_string(&params).unwrap();

    let mut builder = Request::builder()
        .method("POST")
        .uri(path_and_query)
        .header("content-type", "application/x-www-form-urlencoded");
    if let Some(signature) = signature {
        builder = builder.header("x-twilio-signature", signature);
    }
    builder.body(Body::from(body)).unwrap()
}

async fn response_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn status_path(tenant_id: Uuid, session_id: Uuid) -> String {
    format!("/webhooks/telephony/status?tenantId={tenant_id}&callSessionId={session_id}")
}

#[tokio::test]
async fn test_tampered_signature_rejected_without_mutation() {
    let database = create_test_database().await;
    let tenant_id = Uuid::new_v4();
    let conversation = seed_conversation(&database, tenant_id).await;
    let session = seed_call_session(&database, tenant_id, conversation.id).await;
    let router = test_router(database.clone());

    let request = request_with_signature(
        &status_path(tenant_id, session.id),
        &[("CallStatus", "completed")],
        Some("dGFtcGVyZWQtc2lnbmF0dXJl"),
    );
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // No state-machine mutation occurred
    let unchanged = database
        .get_call_session(tenant_id, session.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(unchanged.status, CallSessionStatus::Ringing);
}

#[tokio::test]
async fn test_missing_signature_rejected() {
    let database = create_test_database().await;
    let tenant_id = Uuid::new_v4();
    let conversation = seed_conversation(&database, tenant_id).await;
    let session = seed_call_session(&database, tenant_id, conversation.id).await;
    let router = test_router(database.clone());

    let request = request_with_signature(
        &status_path(tenant_id, session.id),
        &[("CallStatus", "completed")],
        None,
    );
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_missing_required_query_params() {
    let database = create_test_database().await;
    let router = test_router(database);

    // Correctly signed, but the required identifiers are absent
    let request = signed_request("/webhooks/telephony/status", &[("CallStatus", "completed")]);
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_completed_status_callback_is_idempotent() {
    let database = create_test_database().await;
    let tenant_id = Uuid::new_v4();
    let conversation = seed_conversation(&database, tenant_id).await;
    let session = seed_call_session(&database, tenant_id, conversation.id).await;
    let router = test_router(database.clone());

    let path = status_path(tenant_id, session.id);

    let response = router
        .clone()
        .oneshot(signed_request(&path, &[("CallStatus", "completed")]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["transitioned"], true);

    let response = router
        .oneshot(signed_request(&path, &[("CallStatus", "completed")]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["transitioned"], false);

    let stored = database
        .get_call_session(tenant_id, session.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, CallSessionStatus::Completed);
}

#[tokio::test]
async fn test_unknown_session_gets_benign_ack() {
    let database = create_test_database().await;
    let router = test_router(database);

    // The provider cannot act on a 4xx, so unknown references ack with 200
    let path = status_path(Uuid::new_v4(), Uuid::new_v4());
    let response = router
        .oneshot(signed_request(&path, &[("CallStatus", "completed")]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["transitioned"], false);
}

#[tokio::test]
async fn test_voicemail_callback_returns_twiml_and_attaches() {
    let database = create_test_database().await;
    let tenant_id = Uuid::new_v4();
    let conversation = seed_conversation(&database, tenant_id).await;
    let session = seed_call_session(&database, tenant_id, conversation.id).await;
    let item = seed_voicemail_item(&database, &session).await;
    let router = test_router(database.clone());

    let path = format!(
        "/webhooks/telephony/voicemail?tenantId={tenant_id}&callSessionId={}&reason=after_hours",
        session.id
    );
    let response = router
        .oneshot(signed_request(
            &path,
            &[
                ("RecordingUrl", "https://provider/rec123"),
                ("RecordingSid", "RE123"),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/xml"
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let twiml = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(twiml.contains("<Response>"));
    assert!(twiml.contains("<Hangup/>"));

    let stored = database
        .get_answer_machine_item(item.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.recording_url.as_deref(), Some("https://provider/rec123"));
    assert!(stored.transcript_text.is_none());
}

#[tokio::test]
async fn test_transcription_callback_deduplicates_ledger() {
    let database = create_test_database().await;
    let tenant_id = Uuid::new_v4();
    let conversation = seed_conversation(&database, tenant_id).await;
    let session = seed_call_session(&database, tenant_id, conversation.id).await;
    seed_voicemail_item(&database, &session).await;
    let router = test_router(database.clone());

    let path = format!(
        "/webhooks/telephony/transcription?tenantId={tenant_id}&callSessionId={}",
        session.id
    );
    let fields = [
        ("TranscriptionText", "call me back please"),
        ("TranscriptionSid", "TR123"),
        ("TranscriptionStatus", "completed"),
    ];

    let response = router
        .clone()
        .oneshot(signed_request(&path, &fields))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["received"], true);

    // Redelivery of the same callback: acked, nothing applied
    let response = router.oneshot(signed_request(&path, &fields)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["received"], false);

    let messages = database
        .list_conversation_messages(conversation.id)
        .await
        .unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].content.contains("call me back please"));
}

#[tokio::test]
async fn test_recording_status_callback_runs_pipeline() {
    let database = create_test_database().await;
    let tenant_id = Uuid::new_v4();
    let conversation = seed_conversation(&database, tenant_id).await;
    let session = seed_call_session(&database, tenant_id, conversation.id).await;
    let item = seed_voicemail_item(&database, &session).await;
    let router = test_router(database.clone());

    let path = format!(
        "/webhooks/telephony/recording-status?tenantId={tenant_id}&callSessionId={}",
        session.id
    );
    let response = router
        .oneshot(signed_request(
            &path,
            &[
                ("RecordingStatus", "completed"),
                ("RecordingUrl", "https://provider/rec123"),
                ("RecordingSid", "RE123"),
                ("CallSid", &session.provider_call_sid),
            ],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let stored = database
        .get_answer_machine_item(item.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, AnswerMachineStatus::New);
    assert_eq!(stored.transcript_text.as_deref(), Some("call me back please"));
}

#[tokio::test]
async fn test_unknown_form_fields_are_ignored() {
    let database = create_test_database().await;
    let tenant_id = Uuid::new_v4();
    let conversation = seed_conversation(&database, tenant_id).await;
    let session = seed_call_session(&database, tenant_id, conversation.id).await;
    let router = test_router(database.clone());

    // The provider's payload shape is not under our control; unknown fields
    // must be treated as absent, not rejected
    let response = router
        .oneshot(signed_request(
            &status_path(tenant_id, session.id),
            &[
                ("CallStatus", "completed"),
                ("AccountSid", "AC123"),
                ("ApiVersion", "2010-04-01"),
                ("Direction", "inbound"),
            ],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let stored = database
        .get_call_session(tenant_id, session.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, CallSessionStatus::Completed);
}

#[tokio::test]
async fn test_missing_signing_secret_is_fatal_not_bypass() {
    let database = create_test_database().await;

    // No auth token configured at all: validation must fail closed with a
    // server error, never silently accept
    let resources = Arc::new(ServerResources::new(
        database,
        tikozap_voice_gateway::config::ServerConfig {
            app_base_url: "http://localhost:8890".to_owned(),
            ..tikozap_voice_gateway::config::ServerConfig::default()
        },
    ));
    let router = VoiceGatewayServer::new(resources).router();

    let request = request_with_signature(
        &status_path(Uuid::new_v4(), Uuid::new_v4()),
        &[("CallStatus", "completed")],
        Some("any-signature"),
    );
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
