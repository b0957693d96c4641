//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the long-lived
//! services every handler needs: the agent manager, the event relay, the
//! file stores, and the Google clients.

use crate::{
    agent::AgentManager, config::Config, events::EventRelay, oauth_state::OAuthStates,
    rate_limit::RateLimiter,
};
use std::sync::Arc;
use workky_core::{
    google::GoogleOAuthClient,
    storage::{BusinessStore, TokenStore},
};

/// The shared application state, created once at startup and passed to all handlers.
/// All fields are public to be accessible from other modules.
pub struct AppState {
    pub config: Arc<Config>,
    pub agents: AgentManager,
    pub events: EventRelay,
    pub business: BusinessStore,
    pub tokens: TokenStore,
    /// `None` when Google client credentials are not configured.
    pub google: Option<GoogleOAuthClient>,
    pub oauth_states: OAuthStates,
    pub rate_limiter: RateLimiter,
    pub http_client: reqwest::Client,
}
