//! Tool-call notifications shown in the browser's live agent log.
//!
//! The custom LLM service posts an [`AgentLogPayload`] whenever a calendar tool
//! starts or finishes; the API service stamps it into an [`AgentLogEvent`] and
//! relays it to every open browser tab.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

pub const TOOL_START: &str = "tool_start";
pub const TOOL_SUCCESS: &str = "tool_success";
pub const TOOL_ERROR: &str = "tool_error";

/// Body of `POST /api/agent-log`.
///
/// `type` is kept as a free-form string so newer producers can introduce kinds
/// the relay does not know about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AgentLogPayload {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub tool: String,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
}

impl AgentLogPayload {
    pub fn new(kind: &str, tool: &str, label: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            tool: tool.to_string(),
            label: label.into(),
            args: None,
        }
    }

    pub fn with_args(mut self, args: Value) -> Self {
        self.args = Some(args);
        self
    }
}

/// A payload as relayed to subscribers, stamped at publish time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AgentLogEvent {
    #[serde(flatten)]
    pub payload: AgentLogPayload,
    pub timestamp: DateTime<Utc>,
}

impl AgentLogEvent {
    pub fn stamped(payload: AgentLogPayload, timestamp: DateTime<Utc>) -> Self {
        Self { payload, timestamp }
    }
}
