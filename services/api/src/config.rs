use chrono::FixedOffset;
use secrecy::SecretString;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;
use workky_core::google::GoogleOAuthConfig;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Text-to-speech settings forwarded to the hosted agent.
#[derive(Clone, Debug)]
pub struct TtsConfig {
    pub vendor: String,
    pub api_key: Option<SecretString>,
    pub region: String,
    pub voice: String,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub agora_app_id: String,
    pub agora_app_token: Option<String>,
    pub agora_customer_id: String,
    pub agora_customer_secret: SecretString,
    pub agora_api_base: String,
    pub agent_rtc_uid: String,
    pub custom_llm_url: String,
    pub custom_llm_api_key: Option<SecretString>,
    pub llm_model: String,
    pub llm_internal_url: String,
    pub tts: TtsConfig,
    pub asr_language: String,
    pub agent_idle_timeout_secs: u32,
    pub agent_retry_delay: Duration,
    pub data_dir: PathBuf,
    /// Fixed UTC offset of the business; the prompt's current time uses it.
    pub utc_offset: FixedOffset,
    pub allowed_origins: Vec<String>,
    pub rate_limit_per_minute: u32,
    pub google_oauth: Option<GoogleOAuthConfig>,
    pub log_level: Level,
}

fn required(name: &str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingVar(name.to_string()))
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
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str = or_default("BIND_ADDRESS", "0.0.0.0:5000");
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let agora_app_id = required("AGORA_APP_ID")?;
        let agora_customer_id = required("AGORA_CUSTOMER_ID")?;
        let agora_customer_secret = SecretString::from(required("AGORA_CUSTOMER_SECRET")?);
        let custom_llm_url = required("CUSTOM_LLM_URL")?;

        let allowed_origins = or_default("ALLOWED_ORIGINS", "http://localhost:5000")
            .split(',')
            .map(|o| o.trim().trim_end_matches('/').to_string())
            .filter(|o| !o.is_empty())
            .collect();

        let rate_limit_per_minute = parsed("RATE_LIMIT_PER_MINUTE", 30)?;
        if rate_limit_per_minute == 0 {
            return Err(ConfigError::InvalidValue(
                "RATE_LIMIT_PER_MINUTE".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

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
            agora_app_id,
            agora_app_token: optional("AGORA_APP_TOKEN"),
            agora_customer_id,
            agora_customer_secret,
            agora_api_base: or_default(
                "AGORA_API_BASE",
                "https://api.agora.io/api/conversational-ai-agent/v2/projects",
            )
            .trim_end_matches('/')
            .to_string(),
            agent_rtc_uid: or_default("AGENT_RTC_UID", "0"),
            custom_llm_url,
            custom_llm_api_key: optional("CUSTOM_LLM_API_KEY").map(SecretString::from),
            llm_model: or_default("LLM_MODEL", "llama-3.1-8b-instant"),
            llm_internal_url: or_default(
                "LLM_INTERNAL_URL",
                "http://localhost:8000/chat/completions",
            ),
            tts: TtsConfig {
                vendor: or_default("TTS_VENDOR", "microsoft"),
                api_key: optional("TTS_API_KEY").map(SecretString::from),
                region: or_default("TTS_REGION", "eastus"),
                voice: or_default("TTS_VOICE", "en-US-AndrewMultilingualNeural"),
            },
            asr_language: or_default("ASR_LANGUAGE", "en-US"),
            agent_idle_timeout_secs: parsed("AGENT_IDLE_TIMEOUT_SECS", 120)?,
            agent_retry_delay: Duration::from_millis(parsed("AGENT_RETRY_DELAY_MS", 1000)?),
            data_dir: PathBuf::from(or_default("DATA_DIR", "./data")),
            utc_offset,
            allowed_origins,
            rate_limit_per_minute,
            google_oauth,
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;
    use std::env;

    const VARS: [&str; 26] = [
        "BIND_ADDRESS",
        "AGORA_APP_ID",
        "AGORA_APP_TOKEN",
        "AGORA_CUSTOMER_ID",
        "AGORA_CUSTOMER_SECRET",
        "AGORA_API_BASE",
        "AGENT_RTC_UID",
        "CUSTOM_LLM_URL",
        "CUSTOM_LLM_API_KEY",
        "LLM_MODEL",
        "LLM_INTERNAL_URL",
        "TTS_VENDOR",
        "TTS_API_KEY",
        "TTS_REGION",
        "TTS_VOICE",
        "ASR_LANGUAGE",
        "AGENT_IDLE_TIMEOUT_SECS",
        "AGENT_RETRY_DELAY_MS",
        "DATA_DIR",
        "LOCAL_UTC_OFFSET_HOURS",
        "ALLOWED_ORIGINS",
        "RATE_LIMIT_PER_MINUTE",
        "GOOGLE_CLIENT_ID",
        "GOOGLE_CLIENT_SECRET",
        "GOOGLE_REDIRECT_URI",
        "RUST_LOG",
    ];

    fn clear_env_vars() {
        unsafe {
            for var in VARS {
                env::remove_var(var);
            }
        }
    }

    fn set_minimal_env() {
        unsafe {
            env::set_var("AGORA_APP_ID", "app-123");
            env::set_var("AGORA_CUSTOMER_ID", "customer");
            env::set_var("AGORA_CUSTOMER_SECRET", "secret");
            env::set_var("CUSTOM_LLM_URL", "https://llm.example.com/chat/completions");
        }
    }

    #[test]
    fn test_config_error_display() {
        let missing_var = ConfigError::MissingVar("TEST_VAR".to_string());
        assert_eq!(
            format!("{}", missing_var),
            "Missing environment variable: TEST_VAR"
        );

        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    #[serial]
    fn test_config_from_env_minimal() {
        clear_env_vars();
        set_minimal_env();

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:5000");
        assert_eq!(config.agora_app_id, "app-123");
        assert_eq!(config.agora_app_token, None);
        assert_eq!(config.agora_customer_secret.expose_secret(), "secret");
        assert_eq!(config.rate_limit_per_minute, 30);
        assert_eq!(config.agent_idle_timeout_secs, 120);
        assert_eq!(config.agent_retry_delay, Duration::from_millis(1000));
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.utc_offset.local_minus_utc(), 2 * 3600);
        assert_eq!(config.allowed_origins, vec!["http://localhost:5000"]);
        assert!(config.google_oauth.is_none());
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("BIND_ADDRESS", "127.0.0.1:8080");
            env::set_var("AGORA_APP_TOKEN", "rtc-token");
            env::set_var("AGORA_API_BASE", "https://agora.test/v2/projects/");
            env::set_var(
                "ALLOWED_ORIGINS",
                "https://app.workky.io/, http://localhost:3000",
            );
            env::set_var("RATE_LIMIT_PER_MINUTE", "5");
            env::set_var("LOCAL_UTC_OFFSET_HOURS", "-5");
            env::set_var("GOOGLE_CLIENT_ID", "gid");
            env::set_var("GOOGLE_CLIENT_SECRET", "gsecret");
            env::set_var("RUST_LOG", "debug");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "127.0.0.1:8080");
        assert_eq!(config.agora_app_token.as_deref(), Some("rtc-token"));
        assert_eq!(config.agora_api_base, "https://agora.test/v2/projects");
        assert_eq!(
            config.allowed_origins,
            vec!["https://app.workky.io", "http://localhost:3000"]
        );
        assert_eq!(config.rate_limit_per_minute, 5);
        assert_eq!(config.utc_offset.local_minus_utc(), -5 * 3600);
        let google = config.google_oauth.expect("google oauth configured");
        assert_eq!(google.client_id, "gid");
        assert_eq!(
            google.redirect_uri,
            "http://localhost:5000/api/google/callback"
        );
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    #[serial]
    fn test_config_missing_required_vars() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::remove_var("AGORA_CUSTOMER_SECRET");
        }

        match Config::from_env().unwrap_err() {
            ConfigError::MissingVar(var) => assert_eq!(var, "AGORA_CUSTOMER_SECRET"),
            other => panic!("Expected MissingVar, got {other:?}"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_numbers() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("RATE_LIMIT_PER_MINUTE", "lots");
        }

        match Config::from_env().unwrap_err() {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RATE_LIMIT_PER_MINUTE"),
            other => panic!("Expected InvalidValue, got {other:?}"),
        }

        unsafe {
            env::set_var("RATE_LIMIT_PER_MINUTE", "0");
        }
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::InvalidValue(_, _))
        ));
    }

    #[test]
    #[serial]
    fn test_config_invalid_log_level() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("RUST_LOG", "not-a-level");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RUST_LOG"),
            _ => panic!("Expected InvalidValue for RUST_LOG"),
        }
    }
}
