use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tokens are treated as expired this long before Google's stated expiry.
const EXPIRY_SKEW_SECS: i64 = 60;

/// The linked Google account's credentials as persisted in `token.json`.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredToken {
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub token_uri: String,
    pub client_id: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(default)]
    pub email: Option<String>,
}

impl StoredToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry
            .is_some_and(|expiry| expiry <= now + Duration::seconds(EXPIRY_SKEW_SECS))
    }
}

impl fmt::Debug for StoredToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredToken")
            .field("token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("token_uri", &self.token_uri)
            .field("client_id", &self.client_id)
            .field("scopes", &self.scopes)
            .field("expiry", &self.expiry)
            .field("email", &self.email)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(expiry: Option<DateTime<Utc>>) -> StoredToken {
        StoredToken {
            token: "ya29.secret".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            token_uri: "https://oauth2.googleapis.com/token".to_string(),
            client_id: "client".to_string(),
            scopes: vec!["openid".to_string()],
            expiry,
            email: Some("owner@example.com".to_string()),
        }
    }

    #[test]
    fn test_expiry_uses_skew() {
        let now = Utc::now();
        assert!(token(Some(now + Duration::seconds(30))).is_expired(now));
        assert!(!token(Some(now + Duration::minutes(10))).is_expired(now));
        assert!(!token(None).is_expired(now));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let debug = format!("{:?}", token(None));
        assert!(!debug.contains("ya29.secret"));
        assert!(!debug.contains("1//refresh"));
        assert!(debug.contains("owner@example.com"));
    }
}
