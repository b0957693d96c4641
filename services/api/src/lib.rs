//! Workky API Library Crate
//!
//! This library contains all the core logic for the Workky web service,
//! including the application state, the voice-agent lifecycle, the agent log
//! relay, the LLM passthrough, API handlers, and routing. The `api` binary is
//! a thin wrapper around this library.

pub mod agent;
pub mod config;
pub mod events;
pub mod handlers;
pub mod models;
pub mod oauth_state;
pub mod proxy;
pub mod rate_limit;
pub mod router;
pub mod state;
