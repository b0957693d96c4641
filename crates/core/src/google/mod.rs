//! Google integration: OAuth account linking and Calendar access.

pub mod calendar;
pub mod oauth;
pub mod token;

pub use calendar::GoogleCalendarClient;
pub use oauth::{GoogleOAuthClient, GoogleOAuthConfig, OAuthError};
pub use token::StoredToken;
