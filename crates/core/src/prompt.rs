//! Builds the voice agent's system prompt and greeting from the merchant's
//! business configuration.

use chrono::NaiveDateTime;
use std::fmt::Write;

use crate::business::{BusinessConfig, Day};

/// What the agent is told before the first caller turn.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentPrompt {
    pub system_prompt: String,
    pub greeting: String,
}

const GENERIC_PROMPT: &str = "You are a friendly, professional AI receptionist answering phone calls. \
Help callers with questions, check appointment availability, and book or cancel appointments \
using your calendar tools.";

const GENERIC_GREETING: &str = "Hello, thank you for calling! How can I help you today?";

const PHONE_INSTRUCTIONS: &str = "\
## How to respond
- You are speaking on a phone call. Keep every reply to one to three short, natural sentences.
- Never use markdown, bullet points, numbered lists, emojis or special characters; your words are spoken aloud.
- Say times and prices the way a person would say them out loud.
- Ask for one piece of information at a time.
- Before booking, confirm the service, date, time and the caller's name.
- Use the check_availability tool before offering times, and the book_appointment or delete_appointment tools to change the calendar.
- Never invent availability, prices or services that are not listed above.
- If you cannot help with something, offer to take a message for the business owner.";

/// Builds the system prompt and greeting for a call happening at `now`
/// (business-local time).
///
/// Without a configuration the agent acts as a generic receptionist.
pub fn build_prompt(config: Option<&BusinessConfig>, now: NaiveDateTime) -> AgentPrompt {
    let Some(config) = config else {
        return AgentPrompt {
            system_prompt: format!(
                "{GENERIC_PROMPT}\n\n{}\n\n{PHONE_INSTRUCTIONS}",
                date_line(now)
            ),
            greeting: GENERIC_GREETING.to_string(),
        };
    };

    let name = config.business_name().unwrap_or("our business");
    let sections = [
        identity_section(config, name),
        date_line(now),
        hours_section(config),
        services_section(config),
        rules_section(config),
        PHONE_INSTRUCTIONS.to_string(),
    ];

    AgentPrompt {
        system_prompt: sections
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n"),
        greeting: format!("Hello, thank you for calling {name}! How can I help you today?"),
    }
}

fn identity_section(config: &BusinessConfig, name: &str) -> String {
    let info = &config.business_info;
    let mut out = format!(
        "You are the friendly AI receptionist for {name}, answering phone calls on the business's behalf."
    );
    if !info.description.trim().is_empty() {
        let _ = write!(out, "\nAbout the business: {}", info.description.trim());
    }
    for (label, value) in [
        ("Phone", &info.phone),
        ("Email", &info.email),
        ("Address", &info.address),
        ("Website", &info.website),
    ] {
        if !value.trim().is_empty() {
            let _ = write!(out, "\n{label}: {}", value.trim());
        }
    }
    out
}

fn date_line(now: NaiveDateTime) -> String {
    format!(
        "The current date and time is {}.",
        now.format("%A, %B %-d, %Y at %H:%M")
    )
}

fn hours_section(config: &BusinessConfig) -> String {
    let mut out = String::from("## Business hours");
    for day in Day::ALL {
        match config.open_hours(day) {
            Some(hours) => {
                let _ = write!(out, "\n{day}: {} to {}", hours.open, hours.close);
            }
            None => {
                let _ = write!(out, "\n{day}: Closed");
            }
        }
    }
    out
}

fn services_section(config: &BusinessConfig) -> String {
    if config.services.is_empty() {
        return String::new();
    }
    let mut out = String::from("## Services");
    for service in &config.services {
        let _ = write!(out, "\n- {}", service.name.trim());
        if service.duration_minutes > 0 {
            let _ = write!(out, " ({} minutes)", service.duration_minutes);
        }
        if let Some(price) = service.price {
            let _ = write!(out, ", {}", config.pricing.format_amount(price));
        }
        if !service.description.trim().is_empty() {
            let _ = write!(out, ": {}", service.description.trim());
        }
    }
    out
}

fn rules_section(config: &BusinessConfig) -> String {
    let rules = &config.booking_rules;
    let mut out = String::from("## Booking rules");
    let _ = write!(
        out,
        "\n- Appointments must be booked at least {} hour(s) in advance.",
        rules.min_notice_hours
    );
    let _ = write!(
        out,
        "\n- Appointments can be booked up to {} day(s) ahead.",
        rules.max_advance_days
    );
    let _ = write!(
        out,
        "\n- If no service is specified, appointments last {} minutes.",
        rules.default_duration_minutes
    );
    if rules.buffer_minutes > 0 {
        let _ = write!(
            out,
            "\n- Leave {} minutes between appointments.",
            rules.buffer_minutes
        );
    }
    let _ = write!(
        out,
        "\n- Prices are in {}.",
        config.pricing.currency.trim()
    );
    if config.pricing.tax_rate_percent > 0.0 {
        let _ = write!(
            out,
            " A tax of {}% is added to listed prices.",
            config.pricing.tax_rate_percent
        );
    }
    out
}
