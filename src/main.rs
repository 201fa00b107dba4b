//! WagWalk relay server -- minimal push/video backend for the mobile app.
//!
//! An axum JSON server that records device push tokens by role, fans
//! notifications out through the push provider, and proxies room and
//! meeting-token creation to the video provider.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:3000
//! DAILY_API_KEY=... cargo run
//!
//! # Run on a custom port
//! DAILY_API_KEY=... cargo run -- --port 8080
//!
//! # Or fully via config file
//! cargo run -- --config relay.toml
//! ```

use std::sync::Arc;

use clap::Parser;
use wagwalk_relay::config::{RelayCliArgs, RelayConfig};
use wagwalk_relay::push::{FcmGateway, PushCredentials};
use wagwalk_relay::registry::MemoryTokenStore;
use wagwalk_relay::server::{self, AppState};
use wagwalk_relay::video::DailyClient;

#[tokio::main]
async fn main() {
    let cli = RelayCliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match RelayConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing with the resolved log level.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    // Push credentials are read once at startup, never reloaded.
    let credentials = match PushCredentials::load(&config.push_credentials) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load push credentials");
            std::process::exit(1);
        }
    };

    let state = match build_state(&config, &credentials) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to construct provider clients");
            std::process::exit(1);
        }
    };

    tracing::info!(addr = %config.bind_addr(), "starting wagwalk relay server");

    match server::start_server(&config.bind_addr(), state, config.max_body_size).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "relay server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "relay server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start relay server");
            std::process::exit(1);
        }
    }
}

/// Wires the token store and the two provider clients into shared state.
fn build_state(
    config: &RelayConfig,
    credentials: &PushCredentials,
) -> Result<Arc<AppState>, Box<dyn std::error::Error + Send + Sync>> {
    let push = FcmGateway::new(config.push_endpoint.clone(), credentials)?;
    let video = DailyClient::new(config.video_api_url.clone(), config.video_api_key.clone())?;

    Ok(Arc::new(AppState {
        tokens: Arc::new(MemoryTokenStore::new()),
        push: Arc::new(push),
        video: Arc::new(video),
    }))
}
