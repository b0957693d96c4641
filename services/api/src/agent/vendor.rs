//! Client for the hosted conversational agent platform (Agora Conversational
//! AI, REST v2).

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::{debug, instrument};

#[derive(Debug, thiserror::Error)]
pub enum VendorError {
    #[error("agent platform request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("agent platform returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("agent platform response did not include an agent id")]
    MissingAgentId,
}

impl VendorError {
    /// The status code to surface to the browser.
    pub fn status_code(&self) -> u16 {
        match self {
            VendorError::Status { status, .. } => *status,
            VendorError::Http(_) | VendorError::MissingAgentId => StatusCode::BAD_GATEWAY.as_u16(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, VendorError::Status { status, .. } if *status == StatusCode::CONFLICT.as_u16())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, VendorError::Status { status, .. } if *status == StatusCode::NOT_FOUND.as_u16())
    }

    /// Agent id of the agent already occupying the channel, as reported in a
    /// conflict response body.
    pub fn stale_agent_id(&self) -> Option<String> {
        let VendorError::Status { body, .. } = self else {
            return None;
        };
        let value: Value = serde_json::from_str(body).ok()?;
        ["agent_id", "agentId"]
            .iter()
            .find_map(|key| value.get(key).and_then(Value::as_str))
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }
}

/// Body of the vendor's `join` call.
#[derive(Clone, PartialEq, Serialize)]
pub struct JoinRequest {
    pub name: String,
    pub properties: AgentProperties,
}

impl fmt::Debug for JoinRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinRequest")
            .field("name", &self.name)
            .field("channel", &self.properties.channel)
            .field("remote_rtc_uids", &self.properties.remote_rtc_uids)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, PartialEq, Serialize)]
pub struct AgentProperties {
    pub channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub agent_rtc_uid: String,
    pub remote_rtc_uids: Vec<String>,
    pub enable_string_uid: bool,
    pub idle_timeout: u32,
    pub llm: LlmProperties,
    pub asr: AsrProperties,
    pub tts: TtsProperties,
}

#[derive(Clone, PartialEq, Serialize)]
pub struct LlmProperties {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub system_messages: Vec<SystemMessage>,
    pub greeting_message: String,
    pub failure_message: String,
    pub max_history: u32,
    pub params: LlmParams,
}

#[derive(Clone, PartialEq, Serialize)]
pub struct SystemMessage {
    pub role: &'static str,
    pub content: String,
}

impl SystemMessage {
    pub fn system(content: String) -> Self {
        Self {
            role: "system",
            content,
        }
    }
}

#[derive(Clone, PartialEq, Serialize)]
pub struct LlmParams {
    pub model: String,
}

#[derive(Clone, PartialEq, Serialize)]
pub struct AsrProperties {
    pub language: String,
}

#[derive(Clone, PartialEq, Serialize)]
pub struct TtsProperties {
    pub vendor: String,
    pub params: TtsParams,
}

#[derive(Clone, PartialEq, Serialize)]
pub struct TtsParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub region: String,
    pub voice_name: String,
}

#[derive(Debug, Deserialize)]
struct JoinResponse {
    #[serde(default)]
    agent_id: Option<String>,
}

/// Starts and stops hosted voice agents.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AgentVendor: Send + Sync {
    /// Starts an agent and returns its vendor-assigned id.
    async fn join(&self, request: &JoinRequest) -> Result<String, VendorError>;

    async fn leave(&self, agent_id: &str) -> Result<(), VendorError>;
}

pub struct AgoraClient {
    http_client: reqwest::Client,
    api_base: String,
    app_id: String,
    customer_id: String,
    customer_secret: SecretString,
}

impl AgoraClient {
    pub fn new(
        http_client: reqwest::Client,
        api_base: String,
        app_id: String,
        customer_id: String,
        customer_secret: SecretString,
    ) -> Self {
        Self {
            http_client,
            api_base,
            app_id,
            customer_id,
            customer_secret,
        }
    }

    fn project_url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.api_base, self.app_id, path)
    }

    async fn post(&self, url: String, body: &impl Serialize) -> Result<String, VendorError> {
        let response = self
            .http_client
            .post(url)
            .basic_auth(&self.customer_id, Some(self.customer_secret.expose_secret()))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(VendorError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl AgentVendor for AgoraClient {
    #[instrument(skip(self, request), fields(channel = %request.properties.channel))]
    async fn join(&self, request: &JoinRequest) -> Result<String, VendorError> {
        let body = self.post(self.project_url("join"), request).await?;
        debug!(%body, "Agent join response");
        let response: JoinResponse =
            serde_json::from_str(&body).map_err(|_| VendorError::MissingAgentId)?;
        response
            .agent_id
            .filter(|id| !id.is_empty())
            .ok_or(VendorError::MissingAgentId)
    }

    #[instrument(skip(self))]
    async fn leave(&self, agent_id: &str) -> Result<(), VendorError> {
        self.post(
            self.project_url(&format!("agents/{agent_id}/leave")),
            &serde_json::json!({}),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16, body: &str) -> VendorError {
        VendorError::Status {
            status,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_conflict_body_yields_stale_agent_id() {
        let err = status(
            409,
            r#"{"detail":"task conflict","reason":"TaskConflict","agent_id":"A42STALE"}"#,
        );
        assert!(err.is_conflict());
        assert_eq!(err.stale_agent_id().as_deref(), Some("A42STALE"));
        assert_eq!(err.status_code(), 409);
    }

    #[test]
    fn test_unparseable_body_has_no_stale_id() {
        assert_eq!(status(409, "conflict").stale_agent_id(), None);
        assert_eq!(status(409, r#"{"agent_id":""}"#).stale_agent_id(), None);
        assert!(!status(500, "").is_conflict());
        assert!(status(404, "").is_not_found());
        assert_eq!(VendorError::MissingAgentId.status_code(), 502);
    }

    #[test]
    fn test_project_urls() {
        let client = AgoraClient::new(
            reqwest::Client::new(),
            "https://agora.test/v2/projects".to_string(),
            "app".to_string(),
            "id".to_string(),
            SecretString::from("secret".to_string()),
        );
        assert_eq!(client.project_url("join"), "https://agora.test/v2/projects/app/join");
        assert_eq!(
            client.project_url("agents/A1/leave"),
            "https://agora.test/v2/projects/app/agents/A1/leave"
        );
    }
}
