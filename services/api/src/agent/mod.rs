//! Voice Agent Lifecycle
//!
//! Starts a hosted voice agent in a caller's RTC channel with a system prompt
//! built from the business configuration, and stops it again. At most one
//! agent runs per channel; the [`registry::AgentRegistry`] enforces this
//! before the vendor is contacted.

pub mod registry;
pub mod retry;
pub mod vendor;

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use workky_core::prompt::{AgentPrompt, build_prompt};
use workky_core::storage::BusinessStore;

use crate::config::{Config, TtsConfig};
use registry::AgentRegistry;
use retry::{ConflictRetry, RetryDecision};
use vendor::{
    AgentProperties, AgentVendor, AsrProperties, JoinRequest, LlmParams, LlmProperties,
    SystemMessage, TtsParams, TtsProperties, VendorError,
};

pub const MAX_CHANNEL_LEN: usize = 64;
pub const MAX_AGENT_ID_LEN: usize = 128;

const FAILURE_MESSAGE: &str = "Sorry, I'm having trouble right now. Please try again in a moment.";
const MAX_HISTORY: u32 = 32;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("{0}")]
    Invalid(String),
    #[error("channel {channel} already has an active agent")]
    ChannelBusy {
        channel: String,
        agent_id: Option<String>,
    },
    #[error(transparent)]
    Vendor(#[from] VendorError),
}

/// Everything the join request needs besides the channel and the prompt.
#[derive(Clone, Debug)]
pub struct AgentSettings {
    pub app_token: Option<String>,
    pub agent_rtc_uid: String,
    pub llm_url: String,
    pub llm_api_key: Option<SecretString>,
    pub llm_model: String,
    pub tts: TtsConfig,
    pub asr_language: String,
    pub idle_timeout_secs: u32,
    pub retry_delay: Duration,
    pub utc_offset: FixedOffset,
}

impl From<&Config> for AgentSettings {
    fn from(config: &Config) -> Self {
        Self {
            app_token: config.agora_app_token.clone(),
            agent_rtc_uid: config.agent_rtc_uid.clone(),
            llm_url: config.custom_llm_url.clone(),
            llm_api_key: config.custom_llm_api_key.clone(),
            llm_model: config.llm_model.clone(),
            tts: config.tts.clone(),
            asr_language: config.asr_language.clone(),
            idle_timeout_secs: config.agent_idle_timeout_secs,
            retry_delay: config.agent_retry_delay,
            utc_offset: config.utc_offset,
        }
    }
}

/// Wall-clock time at the business, independent of the server's timezone.
pub fn business_now(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDateTime {
    now.with_timezone(&offset).naive_local()
}

/// Characters the RTC SDK accepts in a channel name besides ASCII alphanumerics.
const CHANNEL_PUNCTUATION: &str = " !#$%&()+-:;<=.>?@[]^_{}|~,";

pub fn validate_channel(channel: &str) -> Result<(), AgentError> {
    if channel.is_empty() {
        return Err(AgentError::Invalid("channel is required".to_string()));
    }
    if channel.chars().count() > MAX_CHANNEL_LEN {
        return Err(AgentError::Invalid(format!(
            "channel must be at most {MAX_CHANNEL_LEN} characters"
        )));
    }
    if !channel
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || CHANNEL_PUNCTUATION.contains(c))
    {
        return Err(AgentError::Invalid(
            "channel contains unsupported characters".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_agent_id(agent_id: &str) -> Result<(), AgentError> {
    if agent_id.is_empty() {
        return Err(AgentError::Invalid("agentId is required".to_string()));
    }
    if agent_id.len() > MAX_AGENT_ID_LEN
        || !agent_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(AgentError::Invalid("agentId is malformed".to_string()));
    }
    Ok(())
}

/// Starts and stops hosted agents on behalf of browser sessions.
pub struct AgentManager {
    vendor: Arc<dyn AgentVendor>,
    business: BusinessStore,
    settings: AgentSettings,
    registry: AgentRegistry,
}

impl AgentManager {
    pub fn new(vendor: Arc<dyn AgentVendor>, business: BusinessStore, settings: AgentSettings) -> Self {
        Self {
            vendor,
            business,
            settings,
            registry: AgentRegistry::new(),
        }
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Starts an agent in `channel` and returns its vendor-assigned id.
    #[instrument(skip(self, remote_uids))]
    pub async fn start_agent(
        &self,
        channel: &str,
        uid: &str,
        remote_uids: Option<Vec<String>>,
    ) -> Result<String, AgentError> {
        validate_channel(channel)?;
        if uid.trim().is_empty() {
            return Err(AgentError::Invalid("uid is required".to_string()));
        }

        let reservation = self
            .registry
            .reserve(channel)
            .map_err(|held| AgentError::ChannelBusy {
                channel: channel.to_string(),
                agent_id: held.agent_id,
            })?;

        let business = match self.business.load().await {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "Could not read business config, using a generic prompt");
                None
            }
        };
        let prompt = build_prompt(
            business.as_ref(),
            business_now(Utc::now(), self.settings.utc_offset),
        );
        let request = self.join_request(channel, remote_uids, prompt);

        let agent_id = self.join_with_retry(&request).await.map_err(|e| {
            error!(error = %e, channel, "Failed to start agent");
            e
        })?;

        reservation.commit(&agent_id);
        info!(%agent_id, channel, "Agent started");
        Ok(agent_id)
    }

    async fn join_with_retry(&self, request: &JoinRequest) -> Result<String, VendorError> {
        let mut policy = ConflictRetry::default();
        loop {
            let err = match self.vendor.join(request).await {
                Ok(agent_id) => return Ok(agent_id),
                Err(err) => err,
            };
            match policy.on_failure(&err) {
                RetryDecision::Retry { stale_agent_id } => {
                    warn!(stale_agent_id = ?stale_agent_id, "Channel already has an agent, stopping it and retrying");
                    if let Some(stale) = stale_agent_id {
                        if let Err(e) = self.vendor.leave(&stale).await {
                            warn!(error = %e, agent_id = %stale, "Failed to stop stale agent");
                        }
                        self.registry.release_agent(&stale);
                    }
                    tokio::time::sleep(self.settings.retry_delay).await;
                }
                RetryDecision::GiveUp => return Err(err),
            }
        }
    }

    /// Stops an agent. An agent the vendor no longer knows counts as stopped.
    #[instrument(skip(self))]
    pub async fn stop_agent(&self, agent_id: &str) -> Result<(), AgentError> {
        validate_agent_id(agent_id)?;

        match self.vendor.leave(agent_id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                info!(agent_id, "Agent already gone");
            }
            Err(e) => {
                error!(error = %e, agent_id, "Failed to stop agent");
                return Err(e.into());
            }
        }
        self.registry.release_agent(agent_id);
        info!(agent_id, "Agent stopped");
        Ok(())
    }

    fn join_request(
        &self,
        channel: &str,
        remote_uids: Option<Vec<String>>,
        prompt: AgentPrompt,
    ) -> JoinRequest {
        let settings = &self.settings;
        let remote_rtc_uids = remote_uids
            .map(|uids| {
                uids.into_iter()
                    .map(|u| u.trim().to_string())
                    .filter(|u| !u.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|uids| !uids.is_empty())
            .unwrap_or_else(|| vec!["*".to_string()]);

        let suffix = Uuid::new_v4().simple().to_string();
        JoinRequest {
            name: format!("workky-{}", &suffix[..12]),
            properties: AgentProperties {
                channel: channel.to_string(),
                token: settings.app_token.clone(),
                enable_string_uid: !settings
                    .agent_rtc_uid
                    .chars()
                    .all(|c| c.is_ascii_digit()),
                agent_rtc_uid: settings.agent_rtc_uid.clone(),
                remote_rtc_uids,
                idle_timeout: settings.idle_timeout_secs,
                llm: LlmProperties {
                    url: settings.llm_url.clone(),
                    api_key: settings
                        .llm_api_key
                        .as_ref()
                        .map(|k| k.expose_secret().to_string()),
                    system_messages: vec![SystemMessage::system(prompt.system_prompt)],
                    greeting_message: prompt.greeting,
                    failure_message: FAILURE_MESSAGE.to_string(),
                    max_history: MAX_HISTORY,
                    params: LlmParams {
                        model: settings.llm_model.clone(),
                    },
                },
                asr: AsrProperties {
                    language: settings.asr_language.clone(),
                },
                tts: TtsProperties {
                    vendor: settings.tts.vendor.clone(),
                    params: TtsParams {
                        key: settings
                            .tts
                            .api_key
                            .as_ref()
                            .map(|k| k.expose_secret().to_string()),
                        region: settings.tts.region.clone(),
                        voice_name: settings.tts.voice.clone(),
                    },
                },
            },
        }
    }
}
