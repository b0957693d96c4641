//! Calendar tools offered to the voice agent's LLM.
//!
//! The catalog is expressed in the OpenAI function-calling schema. Tool
//! results are JSON objects that the LLM reads back to the caller, so error
//! cases are reported inside the result (`{"error": ...}`) rather than failing
//! the completion.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveTime, Utc};
use rand::seq::IndexedRandom;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};

use crate::agent_log::{TOOL_ERROR, TOOL_SUCCESS};
use crate::availability::{self, BusyPeriod};
use crate::business::{BusinessConfig, Day};
use crate::calendar::{Attendee, CalendarError, CalendarService, EventQuery, EventTime, NewEvent};
use crate::storage::BusinessStore;

pub const CHECK_AVAILABILITY: &str = "check_availability";
pub const BOOK_APPOINTMENT: &str = "book_appointment";
pub const DELETE_APPOINTMENT: &str = "delete_appointment";

/// How far ahead a cancellation searches when no date is given.
const CANCEL_SEARCH_DAYS: i64 = 60;

/// The calendar tool definitions in OpenAI function-calling format.
pub fn calendar_tools() -> Vec<Value> {
    vec![
        json!({
            "type": "function",
            "function": {
                "name": CHECK_AVAILABILITY,
                "description": "Check available appointment time slots for a given date. \
                    Returns a list of open slots based on business hours and existing calendar events. \
                    Use this when a customer asks about availability or wants to know open times.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "date": {"type": "string", "description": "The date to check availability for, in YYYY-MM-DD format."},
                        "service_name": {"type": "string", "description": "Optional service name to determine the appointment duration."}
                    },
                    "required": ["date"]
                }
            }
        }),
        json!({
            "type": "function",
            "function": {
                "name": BOOK_APPOINTMENT,
                "description": "Book an appointment on Google Calendar for a customer. \
                    Requires date, time, service name, and customer name. \
                    Use this after confirming availability and collecting customer details.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "date": {"type": "string", "description": "Appointment date in YYYY-MM-DD format."},
                        "time": {"type": "string", "description": "Appointment start time in HH:MM 24-hour format."},
                        "service_name": {"type": "string", "description": "Name of the service being booked."},
                        "customer_name": {"type": "string", "description": "Full name of the customer."},
                        "customer_phone": {"type": "string", "description": "Customer phone number (optional)."},
                        "customer_email": {"type": "string", "description": "Customer email address (optional)."},
                        "notes": {"type": "string", "description": "Additional notes or special requests (optional)."}
                    },
                    "required": ["date", "time", "service_name", "customer_name"]
                }
            }
        }),
        json!({
            "type": "function",
            "function": {
                "name": DELETE_APPOINTMENT,
                "description": "Cancel/delete an existing appointment from Google Calendar. \
                    Can search by event ID or by customer name. \
                    Use this when a customer wants to cancel their appointment.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "event_id": {"type": "string", "description": "The Google Calendar event ID if known."},
                        "customer_name": {"type": "string", "description": "Customer name to search for the appointment."},
                        "date": {"type": "string", "description": "Date of the appointment in YYYY-MM-DD format (helps narrow the search)."}
                    },
                    "required": []
                }
            }
        }),
    ]
}

/// Phrases spoken while a tool runs, keyed by tool name.
fn waiting_messages(tool: &str) -> &'static [&'static str] {
    match tool {
        CHECK_AVAILABILITY => &[
            "Let me pull up the calendar for you, one moment.",
            "I'm checking the available slots right now.",
            "Give me just a second while I look at the schedule.",
            "Let me see what openings we have on that day.",
        ],
        BOOK_APPOINTMENT => &[
            "I'm booking that appointment for you now, just a moment.",
            "Let me get that scheduled for you, one second.",
            "I'm locking in your booking right now.",
            "Almost done, I'm confirming your appointment.",
        ],
        DELETE_APPOINTMENT => &[
            "I'm looking up your appointment now, one moment.",
            "Let me pull that booking up and cancel it for you.",
            "I'm processing the cancellation, just a second.",
            "Give me a moment while I remove that appointment.",
        ],
        _ => &[
            "One moment while I look that up.",
            "Give me just a second.",
            "Let me check on that for you.",
        ],
    }
}

/// Picks a waiting phrase appropriate to `tool`.
pub fn waiting_message(tool: &str) -> &'static str {
    let choices = waiting_messages(tool);
    choices
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or("One moment please.")
}

/// Label shown in the browser's agent log when a tool starts.
pub fn tool_label(tool: &str) -> String {
    match tool {
        CHECK_AVAILABILITY => "📅 Checking calendar availability".to_string(),
        BOOK_APPOINTMENT => "📝 Booking appointment".to_string(),
        DELETE_APPOINTMENT => "🗑️ Cancelling appointment".to_string(),
        other => format!("🔧 Running {other}"),
    }
}

/// Agent-log classification of a finished tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub kind: &'static str,
    pub label: String,
}

pub fn classify_outcome(result: &Value) -> ToolOutcome {
    let truthy = |key: &str| match result.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Null) | None => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    };

    if truthy("success") {
        let label = result
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Done")
            .to_string();
        ToolOutcome { kind: TOOL_SUCCESS, label }
    } else if truthy("error") {
        let error = match &result["error"] {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        ToolOutcome {
            kind: TOOL_ERROR,
            label: format!("Error: {error}"),
        }
    } else if result.get("available").is_some_and(|v| !v.is_null()) {
        let slots = result
            .get("total_slots")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        ToolOutcome {
            kind: TOOL_SUCCESS,
            label: format!("Found {slots} available slot(s)"),
        }
    } else {
        ToolOutcome {
            kind: TOOL_SUCCESS,
            label: "Completed".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CheckAvailabilityArgs {
    date: String,
    service_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BookAppointmentArgs {
    date: String,
    time: String,
    service_name: String,
    customer_name: String,
    customer_phone: String,
    customer_email: String,
    notes: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DeleteAppointmentArgs {
    event_id: Option<String>,
    customer_name: Option<String>,
    date: Option<String>,
}

fn args_or_default<T: Default + serde::de::DeserializeOwned>(args: &Value) -> T {
    serde_json::from_value(args.clone()).unwrap_or_default()
}

fn error(message: impl Into<String>) -> Value {
    json!({ "error": message.into() })
}

fn calendar_failure(context: &str, err: CalendarError) -> Value {
    match err {
        CalendarError::NotConnected | CalendarError::InvalidCredentials => error(err.to_string()),
        other => error(format!("{context}: {other}")),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Runs calendar tools against the merchant's calendar and business config.
pub struct ToolExecutor {
    calendar: Arc<dyn CalendarService>,
    business: BusinessStore,
    offset: FixedOffset,
}

impl ToolExecutor {
    /// `offset` is the business's fixed UTC offset; dates and times spoken
    /// by callers are interpreted in it.
    pub fn new(calendar: Arc<dyn CalendarService>, business: BusinessStore, offset: FixedOffset) -> Self {
        Self {
            calendar,
            business,
            offset,
        }
    }

    /// Executes `name` with JSON `args`, always producing a JSON result.
    pub async fn execute(&self, name: &str, args: &Value) -> Value {
        info!(tool = name, %args, "Executing tool");
        match name {
            CHECK_AVAILABILITY => self.check_availability(args_or_default(args)).await,
            BOOK_APPOINTMENT => self.book_appointment(args_or_default(args)).await,
            DELETE_APPOINTMENT => self.delete_appointment(args_or_default(args)).await,
            unknown => error(format!("Unknown tool: {unknown}")),
        }
    }

    async fn business_config(&self) -> BusinessConfig {
        match self.business.load().await {
            Ok(config) => config.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Failed to load business config, using defaults");
                BusinessConfig::default()
            }
        }
    }

    async fn check_availability(&self, args: CheckAvailabilityArgs) -> Value {
        let config = self.business_config().await;
        let date = match availability::parse_date(&args.date) {
            Ok(date) => date,
            Err(e) => return error(e.to_string()),
        };
        let day = Day::from(date.weekday());

        let Some(hours) = config.open_hours(day) else {
            return json!({
                "available": false,
                "message": format!("The business is closed on {day}s."),
                "slots": [],
            });
        };

        let duration = config.duration_for(non_empty(args.service_name).as_deref());
        let window = match availability::business_day_window(date, hours, self.offset) {
            Ok(window) => window,
            Err(e) => return error(e.to_string()),
        };

        let events = match self
            .calendar
            .list_events(EventQuery {
                time_min: window.0,
                time_max: window.1,
                text: None,
            })
            .await
        {
            Ok(events) => events,
            Err(e) => return calendar_failure("Failed to fetch calendar events", e),
        };

        let busy: Vec<BusyPeriod> = events
            .iter()
            .filter_map(|evt| {
                Some(BusyPeriod {
                    start: evt.start.date_time?,
                    end: evt.end.date_time?,
                })
            })
            .collect();

        let slots = availability::open_slots(window, duration, config.booking_rules.buffer_minutes, &busy);
        json!({
            "available": !slots.is_empty(),
            "date": args.date,
            "day": day.to_string(),
            "business_hours": format!("{} - {}", hours.open, hours.close),
            "service_duration_minutes": duration,
            "total_slots": slots.len(),
            "message": format!("Found {} available slot(s) on {}, {}.", slots.len(), day, args.date),
            "slots": slots,
        })
    }

    async fn book_appointment(&self, args: BookAppointmentArgs) -> Value {
        if args.customer_name.trim().is_empty() {
            return error("A customer name is required to book an appointment.");
        }
        let config = self.business_config().await;
        let service = config.find_service(&args.service_name);
        let duration = config.duration_for(Some(&args.service_name));

        let start = match (
            availability::parse_date(&args.date),
            availability::parse_time(&args.time),
        ) {
            (Ok(date), Ok(time)) => availability::local_datetime(date, time, self.offset),
            _ => {
                return error(
                    "Invalid date/time format. Use YYYY-MM-DD for date and HH:MM for time.",
                );
            }
        };
        let end = start + Duration::minutes(i64::from(duration));

        if let Err(e) = availability::check_booking_window(start, Utc::now(), &config.booking_rules) {
            return error(e.to_string());
        }

        let service_name = service.map_or(args.service_name.trim(), |s| s.name.as_str());
        let price = service.and_then(|s| s.price);

        let mut description = vec![
            format!("Service: {service_name}"),
            format!("Duration: {duration} minutes"),
            format!("Customer: {}", args.customer_name),
        ];
        if !args.customer_phone.is_empty() {
            description.push(format!("Phone: {}", args.customer_phone));
        }
        if !args.customer_email.is_empty() {
            description.push(format!("Email: {}", args.customer_email));
        }
        if let Some(price) = price {
            description.push(format!("Price: {}", config.pricing.format_amount(price)));
        }
        if !args.notes.is_empty() {
            description.push(format!("Notes: {}", args.notes));
        }
        description.push(format!(
            "\nBooked via {} AI Assistant",
            config.business_name().unwrap_or("Workky")
        ));

        let attendees = if args.customer_email.is_empty() {
            vec![]
        } else {
            vec![Attendee {
                email: args.customer_email.clone(),
            }]
        };

        let event = NewEvent {
            summary: format!("{service_name} - {}", args.customer_name),
            description: description.join("\n"),
            start: EventTime::at(start),
            end: EventTime::at(end),
            attendees,
        };

        match self.calendar.insert_event(event).await {
            Ok(created) => json!({
                "success": true,
                "event_id": created.id,
                "summary": created.summary,
                "start": start.format("%Y-%m-%d %H:%M").to_string(),
                "end": end.format("%Y-%m-%d %H:%M").to_string(),
                "duration_minutes": duration,
                "price": price.map(|p| config.pricing.format_amount(p)).unwrap_or_else(|| "N/A".to_string()),
                "link": created.html_link.unwrap_or_default(),
                "message": format!(
                    "Appointment booked successfully! {} for {} on {} at {}.",
                    service_name, args.customer_name, args.date, args.time
                ),
            }),
            Err(e) => calendar_failure("Failed to create appointment", e),
        }
    }

    async fn delete_appointment(&self, args: DeleteAppointmentArgs) -> Value {
        if let Some(event_id) = non_empty(args.event_id) {
            let event = match self.calendar.get_event(&event_id).await {
                Ok(event) => event,
                Err(e) => return calendar_failure("Failed to delete appointment", e),
            };
            if let Err(e) = self.calendar.delete_event(&event_id).await {
                return calendar_failure("Failed to delete appointment", e);
            }
            let summary = event.summary.unwrap_or_else(|| "Unknown".to_string());
            return json!({
                "success": true,
                "message": format!("Appointment '{summary}' has been cancelled successfully."),
                "event_id": event_id,
            });
        }

        let Some(customer_name) = non_empty(args.customer_name) else {
            return error(
                "Please provide either an event_id or customer_name to cancel an appointment.",
            );
        };

        let (time_min, time_max) = match non_empty(args.date) {
            Some(date) => match availability::parse_date(&date) {
                Ok(date) => (
                    availability::local_datetime(date, NaiveTime::MIN, self.offset),
                    availability::local_datetime(
                        date,
                        NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN),
                        self.offset,
                    ),
                ),
                Err(e) => return error(e.to_string()),
            },
            None => {
                let now: DateTime<FixedOffset> = Utc::now().with_timezone(&self.offset);
                (now, now + Duration::days(CANCEL_SEARCH_DAYS))
            }
        };

        let events = match self
            .calendar
            .list_events(EventQuery {
                time_min,
                time_max,
                text: Some(customer_name.clone()),
            })
            .await
        {
            Ok(events) => events,
            Err(e) => return calendar_failure("Failed to search for appointments", e),
        };

        match events.as_slice() {
            [] => error(format!("No appointments found for '{customer_name}'.")),
            [only] => {
                if let Err(e) = self.calendar.delete_event(&only.id).await {
                    return calendar_failure("Failed to delete appointment", e);
                }
                let summary = only.summary.as_deref().unwrap_or("Unknown");
                json!({
                    "success": true,
                    "message": format!("Appointment '{summary}' has been cancelled successfully."),
                    "event_id": only.id,
                })
            }
            many => {
                let appointments: Vec<Value> = many
                    .iter()
                    .map(|evt| {
                        json!({
                            "event_id": evt.id,
                            "summary": evt.summary.as_deref().unwrap_or("Unknown"),
                            "start": evt.start.display(),
                        })
                    })
                    .collect();
                json!({
                    "multiple_matches": true,
                    "message": format!(
                        "Found {} appointments matching '{}'. Please specify which one to cancel.",
                        many.len(),
                        customer_name
                    ),
                    "appointments": appointments,
                })
            }
        }
    }
}
