//! Best-effort delivery of tool progress to the API service's agent log.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;
use workky_core::agent_log::AgentLogPayload;

const REPORT_TIMEOUT: Duration = Duration::from_secs(2);

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AgentLogSink: Send + Sync {
    /// Delivers `payload`; failures are swallowed so they never affect the call.
    async fn report(&self, payload: AgentLogPayload);
}

/// Posts payloads as JSON to `POST /api/agent-log`.
pub struct HttpAgentLog {
    http_client: reqwest::Client,
    url: String,
}

impl HttpAgentLog {
    pub fn new(http_client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http_client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl AgentLogSink for HttpAgentLog {
    async fn report(&self, payload: AgentLogPayload) {
        let result = self
            .http_client
            .post(&self.url)
            .timeout(REPORT_TIMEOUT)
            .json(&payload)
            .send()
            .await
            .and_then(|response| response.error_for_status());

        if let Err(e) = result {
            debug!(error = %e, kind = %payload.kind, "Agent log delivery failed");
        }
    }
}
