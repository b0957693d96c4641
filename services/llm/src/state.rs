use std::sync::Arc;
use std::time::Duration;
use workky_core::{llm_client::LLMClient, tools::ToolExecutor};

use crate::reporter::AgentLogSink;

/// Shared state for the custom LLM service, held behind an `Arc`.
pub struct AppState {
    pub llm: Arc<dyn LLMClient>,
    pub tools: ToolExecutor,
    pub agent_log: Arc<dyn AgentLogSink>,
    pub default_model: String,
    /// Pause after the waiting phrase so speech starts before tools run.
    pub waiting_delay: Duration,
}
