// ABOUTME: Server resources and HTTP router assembly for the voice gateway
// ABOUTME: Wires database, signature verifier, pipeline, and rate limiters into Axum
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 TikoZap

//! Server assembly
//!
//! [`ServerResources`] is the dependency bundle handed to every route
//! handler; [`VoiceGatewayServer`] assembles the router and runs the listen
//! loop.

use crate::calls::CallPipeline;
use crate::config::ServerConfig;
use crate::database::Database;
use crate::rate_limiting::{MemoryRateLimiter, PersistentRateLimiter};
use crate::routes::{HealthRoutes, WebhookRoutes, WidgetRoutes};
use crate::telephony::{
    RecordingFetcher, RecordingSource, SignatureVerifier, SpeechToText, WhisperTranscriber,
};
use anyhow::Result;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Maximum accepted request body size; webhook and widget payloads are small
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Shared dependencies for all route handlers
pub struct ServerResources {
    /// Database connection pool
    pub database: Arc<Database>,
    /// Loaded configuration
    pub config: ServerConfig,
    /// Webhook signature verifier; None when the auth token is not configured
    pub signature_verifier: Option<SignatureVerifier>,
    /// Call pipeline orchestration
    pub pipeline: CallPipeline,
    /// In-process limiter for low-stakes endpoints
    pub memory_limiter: MemoryRateLimiter,
    /// Database-backed limiter for endpoints needing cross-instance bounds
    pub persistent_limiter: PersistentRateLimiter,
}

impl ServerResources {
    /// Build resources from configuration
    ///
    /// The recording fetcher and transcriber are wired from the telephony
    /// and transcription config; an absent auth token leaves the verifier
    /// unset, which makes every webhook fail with a configuration error
    /// rather than a silent bypass.
    #[must_use]
    pub fn new(database: Arc<Database>, config: ServerConfig) -> Self {
        let signature_verifier = config
            .telephony
            .auth_token
            .clone()
            .map(SignatureVerifier::new);

        let recording_source: Option<Arc<dyn RecordingSource>> =
            RecordingFetcher::from_config(&config.telephony)
                .ok()
                .map(|fetcher| Arc::new(fetcher) as Arc<dyn RecordingSource>);

        let transcriber: Arc<dyn SpeechToText> =
            Arc::new(WhisperTranscriber::new(config.transcription.clone()));

        let pipeline = CallPipeline::new(database.clone(), recording_source, transcriber);

        Self {
            memory_limiter: MemoryRateLimiter::new(config.rate_limit.clone()),
            persistent_limiter: PersistentRateLimiter::new(database.clone()),
            signature_verifier,
            pipeline,
            database,
            config,
        }
    }

    /// Replace the pipeline, keeping everything else
    ///
    /// Lets callers inject alternative recording or transcription backends.
    #[must_use]
    pub fn with_pipeline(mut self, pipeline: CallPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }
}

/// The voice gateway HTTP server
pub struct VoiceGatewayServer {
    resources: Arc<ServerResources>,
}

impl VoiceGatewayServer {
    /// Create a server over shared resources
    #[must_use]
    pub const fn new(resources: Arc<ServerResources>) -> Self {
        Self { resources }
    }

    /// Assemble the full router
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .merge(HealthRoutes::routes())
            .merge(WebhookRoutes::routes(self.resources.clone()))
            .merge(WidgetRoutes::routes(self.resources.clone()))
            .layer(TraceLayer::new_for_http())
            .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
    }

    /// Bind and serve until the process is stopped
    ///
    /// # Errors
    ///
    /// Returns an error when binding the listen address or serving fails.
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.resources.config.http_port));
        let listener = tokio::net::TcpListener::bind(addr).await?;

        info!(
            addr = %addr,
            "Voice gateway listening"
        );

        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}
