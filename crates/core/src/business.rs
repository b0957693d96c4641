//! Merchant Business Configuration
//!
//! The onboarding wizard produces a single JSON document describing the
//! business: who it is, what it sells, when it is open and how bookings work.
//! Field names follow the wizard's camelCase keys so the document can be
//! exchanged with the browser unchanged.

use chrono::Weekday;
use fuzzy_matcher::{FuzzyMatcher, skim::SkimMatcherV2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use utoipa::ToSchema;

/// The complete onboarding configuration for one business.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct BusinessConfig {
    pub business_info: BusinessInfo,
    pub services: Vec<Service>,
    /// Opening hours keyed by lowercase weekday name.
    #[schema(value_type = Object)]
    pub hours: BTreeMap<Day, DayHours>,
    pub booking_rules: BookingRules,
    pub pricing: Pricing,
}

/// Identity and contact fields of the business.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct BusinessInfo {
    pub name: String,
    pub description: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub website: String,
}

/// A bookable service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct Service {
    pub name: String,
    /// Duration in minutes. Zero means "use the default booking duration".
    #[serde(rename = "duration", deserialize_with = "lenient::u32")]
    pub duration_minutes: u32,
    #[serde(deserialize_with = "lenient::optional_f64")]
    pub price: Option<f64>,
    pub description: String,
}

/// Opening hours for a single weekday, as wall-clock `HH:MM` strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct DayHours {
    pub enabled: bool,
    pub open: String,
    pub close: String,
}

impl Default for DayHours {
    fn default() -> Self {
        Self {
            enabled: false,
            open: "09:00".to_string(),
            close: "17:00".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct BookingRules {
    #[serde(rename = "minNotice", deserialize_with = "lenient::u32")]
    pub min_notice_hours: u32,
    #[serde(rename = "maxAdvance", deserialize_with = "lenient::u32")]
    pub max_advance_days: u32,
    #[serde(rename = "defaultDuration", deserialize_with = "lenient::u32")]
    pub default_duration_minutes: u32,
    #[serde(rename = "bufferTime", deserialize_with = "lenient::u32")]
    pub buffer_minutes: u32,
}

impl Default for BookingRules {
    fn default() -> Self {
        Self {
            min_notice_hours: 1,
            max_advance_days: 30,
            default_duration_minutes: 30,
            buffer_minutes: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct Pricing {
    pub currency: String,
    #[serde(rename = "taxRate", deserialize_with = "lenient::f64")]
    pub tax_rate_percent: f64,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            tax_rate_percent: 0.0,
        }
    }
}

impl Pricing {
    /// Formats an amount the way it should be read out, e.g. `$25.00` or `25.00 CHF`.
    pub fn format_amount(&self, amount: f64) -> String {
        let code = self.currency.trim().to_uppercase();
        match code.as_str() {
            "" | "USD" | "CAD" | "AUD" => format!("${amount:.2}"),
            "EUR" => format!("€{amount:.2}"),
            "GBP" => format!("£{amount:.2}"),
            _ => format!("{amount:.2} {code}"),
        }
    }
}

/// Day of the week, serialized as its lowercase English name.
///
/// The derived ordering runs Monday through Sunday, which is the order hours
/// are presented in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Day {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Day {
    pub const ALL: [Day; 7] = [
        Day::Monday,
        Day::Tuesday,
        Day::Wednesday,
        Day::Thursday,
        Day::Friday,
        Day::Saturday,
        Day::Sunday,
    ];
}

impl From<Weekday> for Day {
    fn from(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Mon => Day::Monday,
            Weekday::Tue => Day::Tuesday,
            Weekday::Wed => Day::Wednesday,
            Weekday::Thu => Day::Thursday,
            Weekday::Fri => Day::Friday,
            Weekday::Sat => Day::Saturday,
            Weekday::Sun => Day::Sunday,
        }
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Day::Monday => "Monday",
            Day::Tuesday => "Tuesday",
            Day::Wednesday => "Wednesday",
            Day::Thursday => "Thursday",
            Day::Friday => "Friday",
            Day::Saturday => "Saturday",
            Day::Sunday => "Sunday",
        };
        f.write_str(name)
    }
}

impl BusinessConfig {
    /// The trimmed business name, if one was entered.
    pub fn business_name(&self) -> Option<&str> {
        let name = self.business_info.name.trim();
        (!name.is_empty()).then_some(name)
    }

    /// Hours for `day`, or `None` when the business is closed that day.
    pub fn open_hours(&self, day: Day) -> Option<&DayHours> {
        self.hours.get(&day).filter(|h| h.enabled)
    }

    /// Looks up a service by the name a caller used.
    ///
    /// An exact case-insensitive match wins; otherwise the best fuzzy match is
    /// returned, since spoken names rarely match the catalog verbatim.
    pub fn find_service(&self, name: &str) -> Option<&Service> {
        let wanted = name.trim();
        if wanted.is_empty() {
            return None;
        }
        if let Some(exact) = self
            .services
            .iter()
            .find(|s| s.name.trim().eq_ignore_ascii_case(wanted))
        {
            return Some(exact);
        }

        let matcher = SkimMatcherV2::default().ignore_case();
        self.services
            .iter()
            .filter_map(|s| matcher.fuzzy_match(&s.name, wanted).map(|score| (score, s)))
            .max_by_key(|(score, _)| *score)
            .map(|(_, s)| s)
    }

    /// Appointment length for the named service, falling back to the default
    /// booking duration when the service is unknown or has no duration.
    pub fn duration_for(&self, service_name: Option<&str>) -> u32 {
        service_name
            .and_then(|name| self.find_service(name))
            .map(|s| s.duration_minutes)
            .filter(|d| *d > 0)
            .unwrap_or(self.booking_rules.default_duration_minutes)
    }
}

/// Deserializers that accept either JSON numbers or numeric strings.
///
/// Form inputs in the onboarding wizard post numbers as strings; empty strings
/// and `null` fall back to zero / `None`.
mod lenient {
    use serde::{Deserialize, Deserializer, de::Error};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrText {
        Number(f64),
        Text(String),
        Missing,
    }

    fn parse<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
        match NumberOrText::deserialize(deserializer)? {
            NumberOrText::Number(n) => Ok(Some(n)),
            NumberOrText::Text(text) if text.trim().is_empty() => Ok(None),
            NumberOrText::Text(text) => text
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| D::Error::custom(format!("'{text}' is not a number"))),
            NumberOrText::Missing => Ok(None),
        }
    }

    pub fn u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        match parse(deserializer)? {
            Some(n) if n < 0.0 || !n.is_finite() => Err(D::Error::custom(format!(
                "expected a non-negative number, got {n}"
            ))),
            Some(n) => Ok(n.round() as u32),
            None => Ok(0),
        }
    }

    pub fn f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(parse(deserializer)?.unwrap_or(0.0))
    }

    pub fn optional_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
        parse(deserializer)
    }
}
