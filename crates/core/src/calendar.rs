//! Calendar access used by the appointment tools.
//!
//! The tools only need four operations on the merchant's primary calendar.
//! They are expressed as a trait so tool logic can be exercised against a mock
//! while production uses the Google Calendar client.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    #[error(
        "Google Calendar is not connected. Please ask the business owner to connect their calendar."
    )]
    NotConnected,
    #[error("Google Calendar credentials are invalid. Please reconnect your calendar.")]
    InvalidCredentials,
    #[error("Calendar request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Calendar API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("Invalid calendar event id: {0:?}")]
    InvalidEventId(String),
    #[error("Token storage failed: {0}")]
    Storage(#[from] crate::storage::StoreError),
}

/// Start or end of an event. All-day events only carry `date`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time: Option<DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl EventTime {
    pub fn at(date_time: DateTime<FixedOffset>) -> Self {
        Self {
            date_time: Some(date_time),
            date: None,
            time_zone: None,
        }
    }

    /// Human-readable form used when listing candidate appointments.
    pub fn display(&self) -> String {
        match (&self.date_time, &self.date) {
            (Some(dt), _) => dt.to_rfc3339(),
            (None, Some(date)) => date.clone(),
            (None, None) => "?".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub html_link: Option<String>,
    #[serde(default)]
    pub start: EventTime,
    #[serde(default)]
    pub end: EventTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attendee {
    pub email: String,
}

/// Body of an event insert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewEvent {
    pub summary: String,
    pub description: String,
    pub start: EventTime,
    pub end: EventTime,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attendees: Vec<Attendee>,
}

/// A time-bounded event search, optionally filtered by free text.
#[derive(Debug, Clone, PartialEq)]
pub struct EventQuery {
    pub time_min: DateTime<FixedOffset>,
    pub time_max: DateTime<FixedOffset>,
    pub text: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CalendarService: Send + Sync {
    /// Lists single (expanded) events in the query window ordered by start time.
    async fn list_events(&self, query: EventQuery) -> Result<Vec<CalendarEvent>, CalendarError>;

    async fn get_event(&self, event_id: &str) -> Result<CalendarEvent, CalendarError>;

    async fn insert_event(&self, event: NewEvent) -> Result<CalendarEvent, CalendarError>;

    async fn delete_event(&self, event_id: &str) -> Result<(), CalendarError>;
}
