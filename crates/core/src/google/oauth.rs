//! Google OAuth 2.0 authorization-code flow for linking a merchant calendar.
//!
//! 1. [`GoogleOAuthClient::authorization_url`] builds the consent URL with a
//!    CSRF `state` and `access_type=offline` so Google issues a refresh token.
//! 2. Google redirects back with `code`; [`GoogleOAuthClient::exchange_code`]
//!    trades it for tokens.
//! 3. [`GoogleOAuthClient::user_email`] identifies the linked account.
//! 4. [`GoogleOAuthClient::refresh`] renews an expired access token.

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::fmt;
use tracing::{debug, warn};
use url::Url;

use super::token::StoredToken;

pub const GOOGLE_AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// Scopes needed to read availability, create/delete events and learn the
/// linked account's address.
pub const CALENDAR_SCOPES: [&str; 4] = [
    "https://www.googleapis.com/auth/calendar.readonly",
    "https://www.googleapis.com/auth/calendar.events",
    "https://www.googleapis.com/auth/userinfo.email",
    "openid",
];

/// Attempts made when the code exchange fails at the transport level.
const EXCHANGE_ATTEMPTS: u32 = 2;

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),
    #[error("failed to parse response: {0}")]
    ParseError(String),
    #[error("Google API error: {0}")]
    GoogleError(String),
}

#[derive(Clone)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub redirect_uri: String,
}

impl fmt::Debug for GoogleOAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleOAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

/// Token endpoint response for both code exchange and refresh.
#[derive(Clone, Deserialize)]
pub struct GoogleTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl fmt::Debug for GoogleTokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleTokenResponse")
            .field("access_token", &"[REDACTED]")
            .field("expires_in", &self.expires_in)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("scope", &self.scope)
            .finish()
    }
}

impl GoogleTokenResponse {
    pub fn expiry(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires_in.map(|secs| now + Duration::seconds(secs))
    }

    fn scopes(&self) -> Vec<String> {
        match &self.scope {
            Some(scope) => scope.split_whitespace().map(str::to_string).collect(),
            None => CALENDAR_SCOPES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Converts a fresh code-exchange response into the persisted form.
    pub fn into_stored(self, client_id: &str, email: Option<String>, now: DateTime<Utc>) -> StoredToken {
        StoredToken {
            expiry: self.expiry(now),
            scopes: self.scopes(),
            token: self.access_token,
            refresh_token: self.refresh_token,
            token_uri: GOOGLE_TOKEN_URL.to_string(),
            client_id: client_id.to_string(),
            email,
        }
    }

    /// Applies a refresh response to an existing stored token.
    ///
    /// Google usually omits the refresh token on refresh, in which case the
    /// existing one is kept.
    pub fn apply_to(self, stored: &mut StoredToken, now: DateTime<Utc>) {
        stored.expiry = self.expiry(now);
        stored.token = self.access_token;
        if let Some(refresh) = self.refresh_token {
            stored.refresh_token = Some(refresh);
        }
    }
}

#[derive(Debug, Deserialize)]
struct GoogleErrorResponse {
    error: String,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    email: Option<String>,
}

/// Generates a random, URL-safe CSRF `state` value.
pub fn generate_state() -> String {
    let bytes: [u8; 16] = rand::random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[derive(Debug, Clone)]
pub struct GoogleOAuthClient {
    config: GoogleOAuthConfig,
    http_client: reqwest::Client,
}

impl GoogleOAuthClient {
    pub fn new(config: GoogleOAuthConfig, http_client: reqwest::Client) -> Self {
        Self {
            config,
            http_client,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.config.client_id
    }

    /// Builds the Google consent URL for the given CSRF `state`.
    pub fn authorization_url(&self, state: &str) -> Result<String, OAuthError> {
        let mut url = Url::parse(GOOGLE_AUTHORIZE_URL)
            .map_err(|e| OAuthError::ParseError(format!("invalid authorize URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &CALENDAR_SCOPES.join(" "))
            .append_pair("state", state)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("include_granted_scopes", "true");
        Ok(url.to_string())
    }

    /// Exchanges an authorization code for tokens.
    ///
    /// A transport failure (connect/timeout) is retried once; Google rejecting
    /// the code is not.
    #[tracing::instrument(skip_all, name = "GoogleOAuthClient::exchange_code")]
    pub async fn exchange_code(&self, code: &str) -> Result<GoogleTokenResponse, OAuthError> {
        let form = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret()),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];

        let mut attempt = 1;
        loop {
            match self.post_token_form(&form).await {
                Err(OAuthError::HttpRequest(e))
                    if attempt < EXCHANGE_ATTEMPTS && (e.is_connect() || e.is_timeout()) =>
                {
                    warn!(error = %e, attempt, "Token exchange transport failure, retrying");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    #[tracing::instrument(skip_all, name = "GoogleOAuthClient::refresh")]
    pub async fn refresh(&self, refresh_token: &str) -> Result<GoogleTokenResponse, OAuthError> {
        debug!("Refreshing Google access token");
        self.post_token_form(&[
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
        .await
    }

    async fn post_token_form(&self, form: &[(&str, &str)]) -> Result<GoogleTokenResponse, OAuthError> {
        let response = self
            .http_client
            .post(GOOGLE_TOKEN_URL)
            .form(form)
            .send()
            .await?;
        let body = response.text().await?;
        parse_token_body(&body)
    }

    /// Fetches the linked account's email address.
    pub async fn user_email(&self, access_token: &str) -> Result<Option<String>, OAuthError> {
        let response = self
            .http_client
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OAuthError::GoogleError(format!(
                "failed to get user info: {body}"
            )));
        }

        let info: UserInfo = response
            .json()
            .await
            .map_err(|e| OAuthError::ParseError(format!("failed to parse user info: {e}")))?;
        Ok(info.email)
    }
}

fn parse_token_body(body: &str) -> Result<GoogleTokenResponse, OAuthError> {
    if let Ok(error_response) = serde_json::from_str::<GoogleErrorResponse>(body) {
        if !error_response.error.is_empty() {
            let message = error_response
                .error_description
                .unwrap_or(error_response.error);
            return Err(OAuthError::GoogleError(message));
        }
    }
    serde_json::from_str(body)
        .map_err(|e| OAuthError::ParseError(format!("failed to parse token response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GoogleOAuthClient {
        GoogleOAuthClient::new(
            GoogleOAuthConfig {
                client_id: "client-123".to_string(),
                client_secret: SecretString::from("shh".to_string()),
                redirect_uri: "http://localhost:5000/api/google/callback".to_string(),
            },
            reqwest::Client::new(),
        )
    }

    #[test]
    fn test_authorization_url_contains_flow_parameters() {
        let url = Url::parse(&client().authorization_url("abc123").unwrap()).unwrap();
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(url.host_str(), Some("accounts.google.com"));
        assert_eq!(pairs["client_id"], "client-123");
        assert_eq!(pairs["state"], "abc123");
        assert_eq!(pairs["access_type"], "offline");
        assert_eq!(pairs["prompt"], "consent");
        assert_eq!(pairs["response_type"], "code");
        assert!(pairs["scope"].contains("calendar.events"));
        assert!(!url.as_str().contains("shh"));
    }

    #[test]
    fn test_generate_state_is_random_hex() {
        let a = generate_state();
        let b = generate_state();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_parse_token_body_maps_google_errors() {
        let err = parse_token_body(r#"{"error":"invalid_grant","error_description":"Bad Request"}"#)
            .unwrap_err();
        assert!(matches!(err, OAuthError::GoogleError(m) if m == "Bad Request"));

        let ok = parse_token_body(r#"{"access_token":"a","expires_in":3599,"scope":"openid email"}"#)
            .unwrap();
        assert_eq!(ok.access_token, "a");
        assert_eq!(ok.scopes(), vec!["openid", "email"]);
    }

    #[test]
    fn test_refresh_keeps_existing_refresh_token() {
        let now = Utc::now();
        let exchanged = parse_token_body(
            r#"{"access_token":"first","expires_in":3600,"refresh_token":"r1"}"#,
        )
        .unwrap();
        let mut stored = exchanged.into_stored("client-123", Some("a@b.c".to_string()), now);
        assert_eq!(stored.refresh_token.as_deref(), Some("r1"));

        let refreshed = parse_token_body(r#"{"access_token":"second","expires_in":3600}"#).unwrap();
        refreshed.apply_to(&mut stored, now);

        assert_eq!(stored.token, "second");
        assert_eq!(stored.refresh_token.as_deref(), Some("r1"));
        assert_eq!(stored.email.as_deref(), Some("a@b.c"));
        assert!(!stored.is_expired(now));
    }
}
