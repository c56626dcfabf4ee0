// Helper functions for serialization and safe logging

use chrono::{NaiveDate, NaiveTime};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serializer};
use std::sync::OnceLock;

/// Wire format for local times ("14:00")
pub const TIME_FORMAT: &str = "%H:%M";

/// Parses "HH:MM" or "HH:MM:SS"
pub fn parse_clock_time(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

pub fn format_clock_time(time: &NaiveTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

fn loose_date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?:(?P<year>\d{4})\s*[.\-/년]\s*)?(?P<month>\d{1,2})\s*[.\-/월]\s*(?P<day>\d{1,2})")
            .expect("date pattern is valid")
    })
}

/// Parses the date forms used by the registry site and schedule images:
/// "2025-11-10", "2025.11.10", "2025/11/10", "2025년 11월 10일", "11월 10일(월)".
/// A missing year falls back to `default_year`.
pub fn parse_loose_date(value: &str, default_year: i32) -> Option<NaiveDate> {
    let captures = loose_date_pattern().captures(value.trim())?;
    let year = match captures.name("year") {
        Some(y) => y.as_str().parse().ok()?,
        None => default_year,
    };
    let month: u32 = captures.name("month")?.as_str().parse().ok()?;
    let day: u32 = captures.name("day")?.as_str().parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Serializes an optional time as "HH:MM" for API responses
pub fn serialize_opt_time<S>(time: &Option<NaiveTime>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match time {
        Some(t) => serializer.serialize_str(&format_clock_time(t)),
        None => serializer.serialize_none(),
    }
}

/// Deserializes "HH:MM" (or "HH:MM:SS"); empty strings become None
pub fn deserialize_opt_time<'de, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse_clock_time(value).map(Some).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid time '{}', expected HH:MM", value))
        }),
    }
}

/// Shortens text for log lines without splitting a multi-byte character
///
/// # Example
/// ```
/// let short = truncate_for_log("1~4차 시험접수마감", 5);
/// // Returns: "1~4차 …"
/// ```
pub fn truncate_for_log(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{}…", head)
}
