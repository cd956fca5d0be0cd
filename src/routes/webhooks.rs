// ABOUTME: Signed telephony webhook route handlers for call lifecycle callbacks
// ABOUTME: Status, voicemail, transcription, and recording-status endpoints with strict field parsing
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 TikoZap

//! Telephony webhook routes
//!
//! All endpoints accept `application/x-www-form-urlencoded` bodies, require
//! `tenantId` and `callSessionId` query parameters, and reject any request
//! whose provider signature does not validate (HTTP 403) before touching
//! state.
//!
//! Once the signature validates, handlers answer 200 regardless of internal
//! processing outcome: the provider cannot act on a 4xx, and a non-200 only
//! triggers redelivery and duplicated side effects. Internal failures are
//! observable through logs, not through the webhook response.
//!
//! The provider's payload shape is an external contract not under this
//! system's control, so field extraction is a strict map: known names are
//! pulled out, unknown or malformed fields are treated as absent.

use crate::constants::telephony;
use crate::errors::{AppError, AppResult};
use crate::server::ServerResources;
use crate::telephony::SignatureCheck;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Spoken response returned to the voicemail callback, ending the call
const VOICEMAIL_TWIML: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Response><Say>Thank you. Your message has been recorded. We will get back to you shortly. Goodbye.</Say><Hangup/></Response>";

/// Query parameters shared by the webhook endpoints
#[derive(Debug, Deserialize)]
pub struct WebhookQuery {
    /// Tenant that owns the call
    #[serde(rename = "tenantId")]
    tenant_id: Option<String>,
    /// Call session the callback refers to
    #[serde(rename = "callSessionId")]
    call_session_id: Option<String>,
    /// Why the caller was diverted (voicemail callback only)
    reason: Option<String>,
}

impl WebhookQuery {
    /// Extract and validate the required identifiers
    fn require_ids(&self) -> AppResult<(Uuid, Uuid)> {
        let tenant_id = self
            .tenant_id
            .as_deref()
            .ok_or_else(|| AppError::missing_field("tenantId"))?;
        let call_session_id = self
            .call_session_id
            .as_deref()
            .ok_or_else(|| AppError::missing_field("callSessionId"))?;

        let tenant_id = Uuid::parse_str(tenant_id)
            .map_err(|e| AppError::invalid_input(format!("Invalid tenantId: {e}")))?;
        let call_session_id = Uuid::parse_str(call_session_id)
            .map_err(|e| AppError::invalid_input(format!("Invalid callSessionId: {e}")))?;

        Ok((tenant_id, call_session_id))
    }
}

/// Look up a form field, treating empty values as absent
fn form_field<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}

/// Telephony webhook routes
pub struct WebhookRoutes;

impl WebhookRoutes {
    /// Create all webhook routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/webhooks/telephony/status", post(Self::handle_status))
            .route("/webhooks/telephony/voicemail", post(Self::handle_voicemail))
            .route(
                "/webhooks/telephony/transcription",
                post(Self::handle_transcription),
            )
            .route(
                "/webhooks/telephony/recording-status",
                post(Self::handle_recording_status),
            )
            .with_state(resources)
    }

    /// Authenticate a webhook request and return its form parameters
    ///
    /// Fails closed: no configured signing secret is a fatal
    /// misconfiguration, and a missing or mismatched signature rejects the
    /// request before any of its content is processed.
    fn verify_signature(
        resources: &ServerResources,
        uri: &Uri,
        headers: &HeaderMap,
        body: &[u8],
    ) -> AppResult<Vec<(String, String)>> {
        let verifier = resources.signature_verifier.as_ref().ok_or_else(|| {
            AppError::config("Telephony auth token is not configured; cannot validate webhooks")
        })?;

        let params: Vec<(String, String)> =
            serde_urlencoded::from_bytes(body).unwrap_or_default();

        let path_and_query = uri
            .path_and_query()
            .map_or_else(|| uri.path().to_owned(), |pq| pq.as_str().to_owned());
        let url = format!("{}{}", resources.config.app_base_url, path_and_query);

        let signature = headers
            .get(telephony::SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok());

        match verifier.verify(&url, &params, signature) {
            SignatureCheck::Valid => Ok(params),
            SignatureCheck::Missing => {
                warn!(path = %uri.path(), "Webhook rejected: signature header missing");
                Err(AppError::signature_missing())
            }
            SignatureCheck::Invalid => {
                warn!(path = %uri.path(), "Webhook rejected: signature mismatch");
                Err(AppError::signature_invalid())
            }
        }
    }

    /// Call status callback
    ///
    /// Only a `completed` value in `CallStatus` (or `RecordingStatus`, which
    /// the provider uses on some status events) transitions the session;
    /// everything else is a no-op write.
    async fn handle_status(
        State(resources): State<Arc<ServerResources>>,
        Query(query): Query<WebhookQuery>,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<Response, AppError> {
        let params = Self::verify_signature(&resources, &uri, &headers, &body)?;
        let (tenant_id, call_session_id) = query.require_ids()?;

        let status = form_field(&params, "CallStatus")
            .or_else(|| form_field(&params, "RecordingStatus"));

        let transitioned = match status {
            Some(status) => {
                resources
                    .pipeline
                    .handle_status_callback(tenant_id, call_session_id, status)
                    .await?
            }
            None => {
                debug!(call_session_id = %call_session_id, "Status callback without status field");
                false
            }
        };

        Ok((
            StatusCode::OK,
            Json(serde_json::json!({ "ok": true, "transitioned": transitioned })),
        )
            .into_response())
    }

    /// Voicemail callback
    ///
    /// Attaches the reported recording to the caller's open voicemail item.
    /// Always answers 200 with a spoken-response document once the signature
    /// validates; processing failures must not fail the call.
    async fn handle_voicemail(
        State(resources): State<Arc<ServerResources>>,
        Query(query): Query<WebhookQuery>,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<Response, AppError> {
        let params = Self::verify_signature(&resources, &uri, &headers, &body)?;
        let (tenant_id, call_session_id) = query.require_ids()?;

        let recording_url = form_field(&params, "RecordingUrl");
        let recording_sid = form_field(&params, "RecordingSid");

        let result = resources
            .pipeline
            .handle_voicemail_callback(tenant_id, call_session_id, recording_url, recording_sid)
            .await;

        if let Err(err) = result {
            // Best-effort: the caller's message is already recorded
            // provider-side, so the call must still end gracefully.
            error!(
                call_session_id = %call_session_id,
                reason = query.reason.as_deref().unwrap_or("unknown"),
                error = %err,
                "Voicemail processing failed; acknowledging anyway"
            );
        }

        Ok((
            StatusCode::OK,
            [(http::header::CONTENT_TYPE, "text/xml")],
            VOICEMAIL_TWIML,
        )
            .into_response())
    }

    /// Transcription callback
    ///
    /// Attaches the transcript text to the most recent non-final voicemail
    /// item; a duplicated callback finds the item final and applies nothing.
    async fn handle_transcription(
        State(resources): State<Arc<ServerResources>>,
        Query(query): Query<WebhookQuery>,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<Response, AppError> {
        let params = Self::verify_signature(&resources, &uri, &headers, &body)?;
        let (tenant_id, call_session_id) = query.require_ids()?;

        let transcript = form_field(&params, "TranscriptionText")
            .or_else(|| form_field(&params, "Transcription"));
        let status = form_field(&params, "TranscriptionStatus").unwrap_or("completed");

        let mut received = false;
        if status.eq_ignore_ascii_case("completed") {
            if let Some(transcript) = transcript {
                match resources
                    .pipeline
                    .handle_transcription_callback(tenant_id, call_session_id, transcript)
                    .await
                {
                    Ok(applied) => received = applied.is_some(),
                    Err(err) => {
                        error!(
                            call_session_id = %call_session_id,
                            error = %err,
                            "Transcription processing failed; acknowledging anyway"
                        );
                    }
                }
            }
        } else {
            debug!(
                call_session_id = %call_session_id,
                status = %status,
                "Transcription callback with non-terminal status"
            );
        }

        Ok((
            StatusCode::OK,
            Json(serde_json::json!({ "ok": true, "received": received, "status": status })),
        )
            .into_response())
    }

    /// Recording-status callback
    ///
    /// On `completed`, runs the full fetch-and-transcribe pipeline for the
    /// call's newest unresolved voicemail item. Upstream failures mark the
    /// item failed and still answer 200; only configuration errors surface.
    async fn handle_recording_status(
        State(resources): State<Arc<ServerResources>>,
        Query(query): Query<WebhookQuery>,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<Response, AppError> {
        let params = Self::verify_signature(&resources, &uri, &headers, &body)?;
        let (tenant_id, call_session_id) = query.require_ids()?;

        let recording_status = form_field(&params, "RecordingStatus").unwrap_or("");
        let recording_url = form_field(&params, "RecordingUrl");
        let recording_sid = form_field(&params, "RecordingSid");

        if let Some(call_sid) = form_field(&params, "CallSid") {
            debug!(call_sid = %call_sid, "Recording status callback");
        }

        let outcome = resources
            .pipeline
            .handle_recording_status(
                tenant_id,
                call_session_id,
                recording_status,
                recording_url,
                recording_sid,
            )
            .await?;

        Ok((
            StatusCode::OK,
            Json(serde_json::json!({ "ok": true, "outcome": format!("{outcome:?}") })),
        )
            .into_response())
    }
}
