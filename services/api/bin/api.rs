//! Main Entrypoint for the Workky API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing the file stores and outbound clients.
//! 3. Constructing the Axum router and applying middleware.
//! 4. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tracing::{info, warn};
use workky_api::{
    agent::{AgentManager, AgentSettings, vendor::AgoraClient},
    config::Config,
    events::EventRelay,
    oauth_state::OAuthStates,
    rate_limit::RateLimiter,
    router::create_router,
    state::AppState,
};
use workky_core::{
    google::GoogleOAuthClient,
    storage::{BusinessStore, TokenStore},
};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Shared Services ---
    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .with_context(|| format!("Failed to create data dir {}", config.data_dir.display()))?;

    let http_client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .context("Failed to build HTTP client")?;

    let vendor = Arc::new(AgoraClient::new(
        http_client.clone(),
        config.agora_api_base.clone(),
        config.agora_app_id.clone(),
        config.agora_customer_id.clone(),
        config.agora_customer_secret.clone(),
    ));
    let google = config
        .google_oauth
        .clone()
        .map(|oauth| GoogleOAuthClient::new(oauth, http_client.clone()));
    if google.is_none() {
        warn!("GOOGLE_CLIENT_ID/GOOGLE_CLIENT_SECRET not set; calendar linking is disabled");
    }

    let app_state = Arc::new(AppState {
        agents: AgentManager::new(
            vendor,
            BusinessStore::in_dir(&config.data_dir),
            AgentSettings::from(&config),
        ),
        events: EventRelay::new(),
        business: BusinessStore::in_dir(&config.data_dir),
        tokens: TokenStore::in_dir(&config.data_dir),
        google,
        oauth_states: OAuthStates::default(),
        rate_limiter: RateLimiter::per_minute(config.rate_limit_per_minute),
        http_client,
        config: Arc::new(config.clone()),
    });

    // --- 4. Create Router ---
    let app = create_router(app_state);

    // --- 5. Start Server ---
    info!(
        bind_address = %config.bind_address,
        llm_internal_url = %config.llm_internal_url,
        origins = ?config.allowed_origins,
        rate_limit_per_minute = config.rate_limit_per_minute,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
