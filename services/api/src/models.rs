//! API Models
//!
//! Request and response bodies for the `/api` endpoints, annotated for
//! OpenAPI generation with `utoipa`. Field names follow what the browser
//! client sends and expects.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Connection parameters for the browser's RTC client.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    #[schema(example = "a1b2c3d4e5f6")]
    pub app_id: String,
    /// RTC token, or `null` when the project runs without tokens.
    pub token: Option<String>,
}

#[derive(Deserialize, ToSchema, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StartAgentPayload {
    #[serde(default)]
    #[schema(example = "workky-demo")]
    pub channel: String,
    /// The browser user's RTC uid; numbers and strings are both accepted.
    #[serde(default)]
    #[schema(value_type = String, example = "12345")]
    pub uid: serde_json::Value,
    #[serde(default)]
    pub remote_uids: Option<Vec<String>>,
}

impl StartAgentPayload {
    pub fn uid_string(&self) -> String {
        match &self.uid {
            serde_json::Value::String(s) => s.trim().to_string(),
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct StartAgentResponse {
    pub agent_id: String,
}

#[derive(Deserialize, ToSchema, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StopAgentPayload {
    #[serde(default)]
    pub agent_id: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct OkResponse {
    pub ok: bool,
}

impl OkResponse {
    pub const fn ok() -> Self {
        Self { ok: true }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct AuthUrlResponse {
    pub url: String,
    pub state: String,
}

#[derive(Deserialize, ToSchema, Debug, Clone, Default)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub error: Option<String>,
    pub state: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct GoogleStatus {
    pub connected: bool,
    pub email: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
    /// The agent already running in the channel, on a start conflict.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            agent_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_info_uses_camel_case() {
        let info = SessionInfo {
            app_id: "app".to_string(),
            token: None,
        };
        assert_eq!(
            serde_json::to_value(&info).unwrap(),
            json!({"appId": "app", "token": null})
        );
    }

    #[test]
    fn test_start_agent_payload_accepts_numeric_uid() {
        let payload: StartAgentPayload =
            serde_json::from_value(json!({"channel": "c1", "uid": 4242})).unwrap();
        assert_eq!(payload.uid_string(), "4242");
        assert!(payload.remote_uids.is_none());

        let payload: StartAgentPayload = serde_json::from_value(
            json!({"channel": "c1", "uid": " 7 ", "remoteUids": ["7"]}),
        )
        .unwrap();
        assert_eq!(payload.uid_string(), "7");
        assert_eq!(payload.remote_uids, Some(vec!["7".to_string()]));
    }

    #[test]
    fn test_stop_agent_payload_reads_agent_id() {
        let payload: StopAgentPayload =
            serde_json::from_value(json!({"agentId": "A42"})).unwrap();
        assert_eq!(payload.agent_id, "A42");
    }
}
