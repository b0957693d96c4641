use secrecy::SecretString;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use chrono::FixedOffset;
use tracing::Level;
use workky_core::google::GoogleOAuthConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Settings of the custom LLM service, loaded once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub llm_base_url: String,
    pub llm_api_key: SecretString,
    /// Model used when a request does not name one.
    pub default_model: String,
    pub agent_log_url: String,
    pub data_dir: PathBuf,
    pub utc_offset: FixedOffset,
    pub waiting_delay: Duration,
    pub google_oauth: Option<GoogleOAuthConfig>,
    pub log_level: Level,
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn or_default(name: &str, default: &str) -> String {
    optional(name).unwrap_or_else(|| default.to_string())
}

fn parsed<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address = parsed("BIND_ADDRESS", SocketAddr::from(([0, 0, 0, 0], 8000)))?;

        let llm_api_key = optional("LLM_API_KEY")
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingVar("LLM_API_KEY".to_string()))?;

        let offset_hours: i32 = parsed("LOCAL_UTC_OFFSET_HOURS", 2)?;
        let utc_offset = FixedOffset::east_opt(offset_hours * 3600).ok_or_else(|| {
            ConfigError::InvalidValue(
                "LOCAL_UTC_OFFSET_HOURS".to_string(),
                format!("{offset_hours} is outside -23..=23"),
            )
        })?;

        let google_oauth = match (optional("GOOGLE_CLIENT_ID"), optional("GOOGLE_CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => Some(GoogleOAuthConfig {
                client_id,
                client_secret: SecretString::from(client_secret),
                // Only used for refreshing; the redirect happens in the API service.
                redirect_uri: or_default(
                    "GOOGLE_REDIRECT_URI",
                    "http://localhost:5000/api/google/callback",
                ),
            }),
            _ => None,
        };

        let log_level_str = or_default("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            llm_base_url: or_default("LLM_BASE_URL", "https://api.openai.com/v1")
                .trim_end_matches('/')
                .to_string(),
            llm_api_key,
            default_model: or_default("LLM_MODEL", "llama-3.1-8b-instant"),
            agent_log_url: or_default("AGENT_LOG_URL", "http://localhost:5000/api/agent-log"),
            data_dir: PathBuf::from(or_default("DATA_DIR", "./data")),
            utc_offset,
            waiting_delay: Duration::from_millis(parsed("WAITING_DELAY_MS", 3000)?),
            google_oauth,
            log_level,
        })
    }
}
