//! Google Calendar v3 REST client for the merchant's primary calendar.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::{RequestBuilder, Response};
use serde::Deserialize;
use tracing::{info, instrument, warn};
use url::Url;

use super::oauth::GoogleOAuthClient;
use crate::calendar::{CalendarError, CalendarEvent, CalendarService, EventQuery, NewEvent};
use crate::storage::TokenStore;

const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3/calendars/primary";

/// URL of a single event. The id is pushed as one percent-encoded path
/// segment, so ids like `../x` or `a/b` stay inside the events collection.
fn event_url(event_id: &str) -> Result<Url, CalendarError> {
    let invalid = || CalendarError::InvalidEventId(event_id.to_string());
    if matches!(event_id.trim(), "" | "." | "..") {
        return Err(invalid());
    }

    let mut url = Url::parse(CALENDAR_API_BASE).map_err(|_| invalid())?;
    url.path_segments_mut()
        .map_err(|_| invalid())?
        .push("events")
        .push(event_id);
    Ok(url)
}

#[derive(Debug, Deserialize)]
struct EventList {
    #[serde(default)]
    items: Vec<CalendarEvent>,
}

/// Calendar client that reads credentials from the token file on every call,
/// so linking or re-linking an account takes effect without a restart.
pub struct GoogleCalendarClient {
    http_client: reqwest::Client,
    tokens: TokenStore,
    oauth: Option<GoogleOAuthClient>,
}

impl GoogleCalendarClient {
    /// `oauth` is needed to refresh expired access tokens; without it an
    /// expired token is reported as invalid credentials.
    pub fn new(
        http_client: reqwest::Client,
        tokens: TokenStore,
        oauth: Option<GoogleOAuthClient>,
    ) -> Self {
        Self {
            http_client,
            tokens,
            oauth,
        }
    }

    async fn access_token(&self) -> Result<String, CalendarError> {
        let mut stored = self
            .tokens
            .load()
            .await?
            .ok_or(CalendarError::NotConnected)?;

        let now = Utc::now();
        if !stored.is_expired(now) {
            return Ok(stored.token);
        }

        let (Some(oauth), Some(refresh_token)) = (&self.oauth, stored.refresh_token.clone()) else {
            warn!("Stored Google token expired and cannot be refreshed");
            return Err(CalendarError::InvalidCredentials);
        };

        let refreshed = oauth.refresh(&refresh_token).await.map_err(|e| {
            warn!(error = %e, "Google token refresh failed");
            CalendarError::InvalidCredentials
        })?;
        refreshed.apply_to(&mut stored, now);
        self.tokens.save(&stored).await?;
        info!("Refreshed Google access token");
        Ok(stored.token)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, CalendarError> {
        let token = self.access_token().await?;
        let response = request.bearer_auth(token).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(CalendarError::InvalidCredentials);
        }
        let body = response.text().await.unwrap_or_default();
        Err(CalendarError::Api {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl CalendarService for GoogleCalendarClient {
    #[instrument(skip(self), fields(text = ?query.text))]
    async fn list_events(&self, query: EventQuery) -> Result<Vec<CalendarEvent>, CalendarError> {
        let mut params = vec![
            (
                "timeMin",
                query.time_min.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
            (
                "timeMax",
                query.time_max.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
        ];
        if let Some(text) = query.text {
            params.push(("q", text));
        }

        let request = self
            .http_client
            .get(format!("{CALENDAR_API_BASE}/events"))
            .query(&params);
        let list: EventList = self.send(request).await?.json().await?;
        Ok(list.items)
    }

    #[instrument(skip(self))]
    async fn get_event(&self, event_id: &str) -> Result<CalendarEvent, CalendarError> {
        let request = self.http_client.get(event_url(event_id)?);
        Ok(self.send(request).await?.json().await?)
    }

    #[instrument(skip(self, event), fields(summary = %event.summary))]
    async fn insert_event(&self, event: NewEvent) -> Result<CalendarEvent, CalendarError> {
        let request = self
            .http_client
            .post(format!("{CALENDAR_API_BASE}/events"))
            .json(&event);
        Ok(self.send(request).await?.json().await?)
    }

    #[instrument(skip(self))]
    async fn delete_event(&self, event_id: &str) -> Result<(), CalendarError> {
        let request = self.http_client.delete(event_url(event_id)?);
        self.send(request).await?;
        Ok(())
    }
}
