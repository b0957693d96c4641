//! Main Entrypoint for the Workky Custom LLM Service

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use secrecy::ExposeSecret;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};
use workky_core::{
    google::{GoogleCalendarClient, GoogleOAuthClient},
    llm_client::OpenAICompatibleClient,
    storage::{BusinessStore, TokenStore},
    tools::ToolExecutor,
};
use workky_llm::{
    config::Config, reporter::HttpAgentLog, router::create_router, state::AppState,
};

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();

    let http_client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .context("Failed to build HTTP client")?;

    let llm_config = OpenAIConfig::new()
        .with_api_base(config.llm_base_url.clone())
        .with_api_key(config.llm_api_key.expose_secret());
    let llm = Arc::new(OpenAICompatibleClient::new(llm_config));

    let oauth = config
        .google_oauth
        .clone()
        .map(|oauth| GoogleOAuthClient::new(oauth, http_client.clone()));
    if oauth.is_none() {
        warn!("GOOGLE_CLIENT_ID/GOOGLE_CLIENT_SECRET not set; expired calendar tokens cannot be refreshed");
    }
    let calendar = Arc::new(GoogleCalendarClient::new(
        http_client.clone(),
        TokenStore::in_dir(&config.data_dir),
        oauth,
    ));

    let app_state = Arc::new(AppState {
        llm,
        tools: ToolExecutor::new(
            calendar,
            BusinessStore::in_dir(&config.data_dir),
            config.utc_offset,
        ),
        agent_log: Arc::new(HttpAgentLog::new(http_client, config.agent_log_url.clone())),
        default_model: config.default_model.clone(),
        waiting_delay: config.waiting_delay,
    });

    let app = create_router(app_state);

    info!(
        bind_address = %config.bind_address,
        llm_base_url = %config.llm_base_url,
        agent_log_url = %config.agent_log_url,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server has shut down.");
    Ok(())
}
