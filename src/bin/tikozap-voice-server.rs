// ABOUTME: Server binary for the TikoZap voice gateway
// ABOUTME: Loads configuration, initializes logging and storage, and serves the HTTP pipeline
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # TikoZap Voice Gateway Server Binary
//!
//! Starts the inbound telephony webhook pipeline with signature validation,
//! voicemail transcription, and the public widget endpoints.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tikozap_voice_gateway::{
    config::ServerConfig,
    database::Database,
    logging,
    server::{ServerResources, VoiceGatewayServer},
};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "tikozap-voice-server")]
#[command(about = "TikoZap Voice Gateway - inbound telephony webhook pipeline")]
pub struct Args {
    /// Override HTTP port
    #[arg(long)]
    http_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Handle container environments where clap may not work properly
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Argument parsing failed: {e}");
            eprintln!("Using default configuration");
            Args { http_port: None }
        }
    };

    // Load configuration from environment
    let mut config = ServerConfig::from_env()?;

    // Override port if specified
    if let Some(http_port) = args.http_port {
        config.http_port = http_port;
    }

    // Initialize production logging
    logging::init_from_env()?;

    info!("Starting TikoZap Voice Gateway");
    info!("{}", config.summary());

    if config.telephony.auth_token.is_none() {
        warn!("Telephony auth token not configured; webhook validation will fail closed");
    }

    // Initialize database
    let database = Arc::new(Database::new(&config.database.url.to_connection_string()).await?);
    info!("Database initialized");

    let resources = Arc::new(ServerResources::new(database, config));
    VoiceGatewayServer::new(resources).run().await
}
