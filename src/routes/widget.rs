// ABOUTME: Public widget route handlers for cross-origin embedded scripts
// ABOUTME: Rate-limited, origin-checked config reads and message ingestion
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 TikoZap

//! Public widget routes
//!
//! These endpoints face the open internet without authentication: embedded
//! widget scripts fetch their configuration and post visitor messages
//! cross-origin. Protection comes from the origin allowlist (checked against
//! the widget's configured domains) and the rate limiter rather than from
//! credentials.
//!
//! The config read uses the in-process limiter (a stale count across server
//! instances only mildly over-admits a cheap read); message ingestion uses
//! the persistent limiter so the admission bound holds across instances.

use crate::constants::rate_limits;
use crate::errors::AppError;
use crate::middleware::origin::{is_host_allowed, request_host};
use crate::middleware::rate_limiting::rate_limit_exceeded_response;
use crate::models::{Conversation, ConversationMessage, WidgetConfig};
use crate::rate_limiting::client_identity;
use crate::server::ServerResources;
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Duration;
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use uuid::Uuid;

/// Query parameters for the widget config endpoint
#[derive(Debug, Deserialize)]
pub struct WidgetConfigQuery {
    /// Widget public key
    key: Option<String>,
}

/// Request body for widget message ingestion
#[derive(Debug, Deserialize)]
pub struct WidgetMessageRequest {
    /// Widget public key
    pub key: String,
    /// Existing conversation to append to; a new one is created when absent
    #[serde(rename = "conversationId")]
    pub conversation_id: Option<Uuid>,
    /// Message content
    pub content: String,
    /// Visitor phone number, when the widget collected one
    #[serde(rename = "contactNumber")]
    pub contact_number: Option<String>,
}

/// Public widget routes
pub struct WidgetRoutes;

impl WidgetRoutes {
    /// Create all widget routes
    ///
    /// Both endpoints are meant to be fetched cross-origin by embedded
    /// scripts, so the router always sets permissive CORS headers.
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/api/widget/config", get(Self::handle_config))
            .route("/api/widget/messages", post(Self::handle_message))
            .layer(CorsLayer::permissive())
            .with_state(resources)
    }

    /// Look up an enabled widget or answer 404
    async fn enabled_widget(
        resources: &ServerResources,
        public_key: &str,
    ) -> Result<WidgetConfig, AppError> {
        resources
            .database
            .get_widget_by_public_key(public_key)
            .await
            .map_err(|e| AppError::database(format!("Widget lookup failed: {e}")))?
            .filter(|widget| widget.enabled)
            .ok_or_else(|| AppError::not_found("Widget"))
    }

    /// Widget configuration read
    ///
    /// Returns 404 for unknown or disabled widgets so probing reveals
    /// nothing about tenant configuration.
    async fn handle_config(
        State(resources): State<Arc<ServerResources>>,
        Query(query): Query<WidgetConfigQuery>,
        headers: HeaderMap,
    ) -> Result<Response, AppError> {
        let key = query.key.ok_or_else(|| AppError::missing_field("key"))?;

        let identity = client_identity(&headers);
        let decision = resources.memory_limiter.check(
            rate_limits::NS_WIDGET_CONFIG,
            &identity,
            resources.config.rate_limit.widget_config_per_window,
            Duration::seconds(i64::try_from(resources.config.rate_limit.window_secs).unwrap_or(60)),
        );
        if !decision.allowed {
            return Ok(rate_limit_exceeded_response(&decision));
        }

        let widget = Self::enabled_widget(&resources, &key).await?;

        Ok((
            StatusCode::OK,
            Json(serde_json::json!({
                "key": widget.public_key,
                "displayName": widget.display_name,
                "greeting": widget.greeting,
                "accentColor": widget.accent_color,
            })),
        )
            .into_response())
    }

    /// Widget message ingestion
    ///
    /// The sender's host must match the widget's allowed domains (or an
    /// operator host), and admission is bounded by the persistent rate
    /// limiter so the limit holds across server instances.
    async fn handle_message(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Json(request): Json<WidgetMessageRequest>,
    ) -> Result<Response, AppError> {
        if request.content.trim().is_empty() {
            return Err(AppError::invalid_input("Message content is empty"));
        }

        let widget = Self::enabled_widget(&resources, &request.key).await?;

        let host = request_host(&headers)
            .ok_or_else(|| AppError::origin_not_allowed("request carries no origin"))?;
        if !is_host_allowed(&host, &widget.allowed_domains) {
            warn!(host = %host, widget = %widget.public_key, "Widget message from untrusted host");
            return Err(AppError::origin_not_allowed(host));
        }

        let identity = client_identity(&headers);
        let decision = resources
            .persistent_limiter
            .check(
                rate_limits::NS_WIDGET_MESSAGES,
                &identity,
                resources.config.rate_limit.widget_messages_per_window,
                Duration::seconds(
                    i64::try_from(resources.config.rate_limit.window_secs).unwrap_or(60),
                ),
            )
            .await
            .map_err(|e| AppError::database(format!("Rate limit check failed: {e}")))?;
        if !decision.allowed {
            return Ok(rate_limit_exceeded_response(&decision));
        }

        // Opportunistic GC: the first request of a fresh window is a bounded
        // trigger to drop buckets whose window already elapsed. There are no
        // background threads to do this periodically.
        if decision.remaining == decision.limit.saturating_sub(1) {
            if let Err(e) = resources.database.sweep_expired_rate_limit_buckets().await {
                warn!(error = %e, "Rate limit bucket sweep failed");
            }
        }

        let conversation_id = match request.conversation_id {
            Some(conversation_id) => {
                resources
                    .database
                    .get_conversation(widget.tenant_id, conversation_id)
                    .await
                    .map_err(|e| AppError::database(format!("Conversation lookup failed: {e}")))?
                    .ok_or_else(|| AppError::not_found("Conversation"))?
                    .id
            }
            None => {
                let conversation =
                    Conversation::new(widget.tenant_id, request.contact_number.clone());
                resources
                    .database
                    .create_conversation(&conversation)
                    .await
                    .map_err(|e| AppError::database(format!("Conversation create failed: {e}")))?
            }
        };

        let message = ConversationMessage {
            id: Uuid::new_v4(),
            conversation_id,
            tenant_id: widget.tenant_id,
            direction: "visitor".to_owned(),
            content: request.content,
            created_at: chrono::Utc::now(),
        };

        resources
            .database
            .append_conversation_message(&message)
            .await
            .map_err(|e| AppError::database(format!("Message append failed: {e}")))?;
        resources
            .database
            .touch_conversation(conversation_id)
            .await
            .map_err(|e| AppError::database(format!("Conversation touch failed: {e}")))?;

        info!(widget = %widget.public_key, conversation_id = %conversation_id, "Widget message stored");

        Ok((
            StatusCode::CREATED,
            Json(serde_json::json!({
                "ok": true,
                "conversationId": conversation_id,
                "messageId": message.id,
            })),
        )
            .into_response())
    }
}
