// src/schedules/extraction.rs
//! Schema validation and cleanup of JSON returned by the extraction models

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::deadlines::parse_korean_time;
use super::models::{ExamType, InternalDeadline, ScheduleFragment, SessionRange};
use super::regions::expand_locations;
use crate::common::helpers::{parse_clock_time, parse_loose_date};

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Response did not contain a JSON object")]
    NoJsonObject,

    #[error("Response JSON could not be parsed: {0}")]
    InvalidJson(String),

    #[error("Response is missing the 'schedules' key")]
    MissingSchedules,

    #[error("Unexpected response shape: {0}")]
    InvalidShape(String),
}

/// Result of reading one schedule image
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageExtraction {
    pub extracted_text: String,
    pub schedules: Vec<ScheduleFragment>,
}

/// Slice from the first '{' to the last '}', which skips code fences and chatter
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end >= start).then(|| &raw[start..=end])
}

fn parse_envelope(raw: &str) -> Result<(Map<String, Value>, Vec<Value>), ExtractionError> {
    let json_text = extract_json_object(raw).ok_or(ExtractionError::NoJsonObject)?;
    let value: Value = serde_json::from_str(json_text)
        .map_err(|e| ExtractionError::InvalidJson(e.to_string()))?;

    let Value::Object(mut object) = value else {
        return Err(ExtractionError::InvalidShape("top level is not an object".to_string()));
    };

    let schedules = match object.remove("schedules") {
        None => return Err(ExtractionError::MissingSchedules),
        Some(Value::Array(items)) => items,
        Some(Value::Null) => Vec::new(),
        Some(other) => {
            return Err(ExtractionError::InvalidShape(format!(
                "'schedules' is {} instead of an array",
                json_type(&other)
            )))
        }
    };

    Ok((object, schedules))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ============================================================================
// Field coercion
// ============================================================================

/// First present, non-null field among the given spellings
fn field<'a>(entry: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .filter_map(|name| entry.get(*name))
        .find(|v| !v.is_null())
}

fn text_field(entry: &Map<String, Value>, names: &[&str]) -> Option<String> {
    match field(entry, names)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Accepts 3, "3", "3차", "제3회"
fn session_number_field(entry: &Map<String, Value>, names: &[&str]) -> Option<u32> {
    let number = match field(entry, names)? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => {
            let digits: String = s
                .chars()
                .skip_while(|c| !c.is_ascii_digit())
                .take_while(|c| c.is_ascii_digit())
                .collect();
            digits.parse().ok()
        }
        _ => None,
    };
    number.filter(|n| *n > 0)
}

fn date_field(entry: &Map<String, Value>, names: &[&str], year: i32) -> Option<NaiveDate> {
    parse_loose_date(&text_field(entry, names)?, year)
}

/// Accepts "10:00" or "오전 10시"
fn parse_loose_time(value: &str) -> Option<NaiveTime> {
    parse_clock_time(value).or_else(|| parse_korean_time(value))
}

fn time_field(entry: &Map<String, Value>, names: &[&str]) -> Option<NaiveTime> {
    parse_loose_time(&text_field(entry, names)?)
}

/// "10:00~11:40" style ranges, either side optional
fn time_range_field(
    entry: &Map<String, Value>,
    names: &[&str],
) -> (Option<NaiveTime>, Option<NaiveTime>) {
    let Some(range) = text_field(entry, names) else {
        return (None, None);
    };
    match range.split_once(['~', '-', '∼', '～']) {
        Some((start, end)) => (parse_loose_time(start), parse_loose_time(end)),
        None => (parse_loose_time(&range), None),
    }
}

/// Locations may arrive as an array, a comma-separated string, or a single region group
fn locations_field(entry: &Map<String, Value>, names: &[&str]) -> Vec<String> {
    let raw: Vec<String> = match field(entry, names) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(s)) => s
            .split([',', '/', '·'])
            .map(|part| part.trim().to_string())
            .collect(),
        _ => Vec::new(),
    };
    expand_locations(&raw)
}

// ============================================================================
// Image extraction
// ============================================================================

/// Validates and normalizes a vision-model response of the form
/// `{"extractedText": "...", "schedules": [...]}`.
///
/// A response that is not JSON or has no `schedules` key is an error.
/// Individual entries that carry neither a session number nor an exam date
/// are dropped; region groups are expanded to concrete cities.
pub fn parse_image_response(
    raw: &str,
    year: i32,
    exam_type: ExamType,
) -> Result<ImageExtraction, ExtractionError> {
    let (envelope, entries) = parse_envelope(raw)?;

    let extracted_text = text_field(&envelope, &["extractedText", "extracted_text"])
        .unwrap_or_default();

    let mut schedules = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let Value::Object(entry) = entry else {
            warn!(index = index, "Skipping non-object schedule entry");
            continue;
        };

        match image_fragment(entry, year, exam_type) {
            Some(fragment) => schedules.push(fragment),
            None => debug!(index = index, "Skipping schedule entry without session or date"),
        }
    }

    Ok(ImageExtraction {
        extracted_text,
        schedules,
    })
}

fn image_fragment(
    entry: &Map<String, Value>,
    year: i32,
    default_exam_type: ExamType,
) -> Option<ScheduleFragment> {
    let session_number = session_number_field(entry, &["sessionNumber", "session_number", "session"]);
    let exam_date = date_field(entry, &["examDate", "exam_date", "date"], year);
    if session_number.is_none() && exam_date.is_none() {
        return None;
    }

    let exam_type = text_field(entry, &["examType", "exam_type"])
        .and_then(|t| t.parse().ok())
        .unwrap_or(default_exam_type);

    let mut fragment = ScheduleFragment::image(year, exam_type, session_number);
    fragment.exam_date = exam_date;

    let (range_start, range_end) = time_range_field(entry, &["examTime", "exam_time"]);
    fragment.exam_time_start =
        time_field(entry, &["examTimeStart", "exam_time_start", "startTime"]).or(range_start);
    fragment.exam_time_end =
        time_field(entry, &["examTimeEnd", "exam_time_end", "endTime"]).or(range_end);

    fragment.locations = locations_field(entry, &["locations", "regions", "region", "location"]);
    fragment.registration_period =
        text_field(entry, &["registrationPeriod", "registration_period"]);
    fragment.result_date = date_field(entry, &["resultDate", "result_date"], year);
    fragment.notes = text_field(entry, &["notes", "note"]).unwrap_or_default();

    Some(fragment)
}

// ============================================================================
// Internal deadline extraction
// ============================================================================

/// Validates a text-model response of the form `{"schedules": [InternalDeadline...]}`.
/// Entries without a usable session range or deadline date are dropped.
pub fn parse_deadline_response(
    raw: &str,
    year: i32,
) -> Result<Vec<InternalDeadline>, ExtractionError> {
    let (_, entries) = parse_envelope(raw)?;

    let deadlines: Vec<InternalDeadline> = entries
        .iter()
        .filter_map(|entry| match entry {
            Value::Object(entry) => deadline_entry(entry, year),
            _ => None,
        })
        .collect();

    debug!(
        entries = entries.len(),
        deadlines = deadlines.len(),
        "Normalized deadline extraction response"
    );
    Ok(deadlines)
}

fn deadline_entry(entry: &Map<String, Value>, year: i32) -> Option<InternalDeadline> {
    let session_range: SessionRange = match field(entry, &["sessionRange", "session_range"])? {
        Value::Number(n) => SessionRange::single(u32::try_from(n.as_u64()?).ok()?),
        Value::String(s) => s.parse().ok()?,
        _ => return None,
    };
    if !session_range.is_plausible() {
        warn!(range = %session_range, "Dropping implausible session range");
        return None;
    }

    Some(InternalDeadline {
        session_range,
        deadline_date: date_field(entry, &["deadlineDate", "deadline_date"], year)?,
        deadline_time: time_field(entry, &["deadlineTime", "deadline_time"]),
        notice_date: date_field(entry, &["noticeDate", "notice_date"], year),
        notice_time: time_field(entry, &["noticeTime", "notice_time"]),
        notes: text_field(entry, &["notes", "note"]).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_response_is_accepted() {
        let raw = "```json\n{\"extractedText\": \"11월 시험일정\", \"schedules\": [\
            {\"sessionNumber\": \"1차\", \"examDate\": \"11월 10일(월)\", \"locations\": [\"수도권\"]}]}\n```";

        let extraction = parse_image_response(raw, 2025, ExamType::Life).unwrap();

        assert_eq!(extraction.extracted_text, "11월 시험일정");
        assert_eq!(extraction.schedules.len(), 1);
        let fragment = &extraction.schedules[0];
        assert_eq!(fragment.session_number, Some(1));
        assert_eq!(fragment.exam_date, NaiveDate::from_ymd_opt(2025, 11, 10));
        assert_eq!(fragment.locations, vec!["서울", "인천", "제주"]);
    }

    #[test]
    fn test_exam_time_range_is_split() {
        let raw = r#"{"schedules": [{"sessionNumber": 2, "examTime": "10:00~11:40"}]}"#;

        let extraction = parse_image_response(raw, 2025, ExamType::NonLife).unwrap();

        let fragment = &extraction.schedules[0];
        assert_eq!(fragment.exam_type, ExamType::NonLife);
        assert_eq!(fragment.exam_time_start, NaiveTime::from_hms_opt(10, 0, 0));
        assert_eq!(fragment.exam_time_end, NaiveTime::from_hms_opt(11, 40, 0));
    }

    #[test]
    fn test_missing_schedules_key_is_an_error() {
        let err = parse_image_response(r#"{"extractedText": "x"}"#, 2025, ExamType::Life);
        assert!(matches!(err, Err(ExtractionError::MissingSchedules)));
    }

    #[test]
    fn test_non_json_is_an_error() {
        let err = parse_image_response("I could not read the image.", 2025, ExamType::Life);
        assert!(matches!(err, Err(ExtractionError::NoJsonObject)));

        let err = parse_image_response("{not json}", 2025, ExamType::Life);
        assert!(matches!(err, Err(ExtractionError::InvalidJson(_))));
    }

    #[test]
    fn test_entries_without_key_fields_are_dropped() {
        let raw = r#"{"schedules": [{"locations": ["영남"]}, {"examDate": "2025-11-17"}]}"#;

        let extraction = parse_image_response(raw, 2025, ExamType::Life).unwrap();

        assert_eq!(extraction.schedules.len(), 1);
        assert_eq!(extraction.schedules[0].session_number, None);
    }

    #[test]
    fn test_deadline_response_normalizes_entries() {
        let raw = r#"{"schedules": [
            {"sessionRange": "1~4", "deadlineDate": "2025-10-01", "deadlineTime": "14:00",
             "noticeDate": "10월 20일", "noticeTime": "오전 10시"},
            {"sessionRange": 5, "deadlineDate": "2025-11-03"},
            {"sessionRange": "미정", "deadlineDate": "2025-11-03"}
        ]}"#;

        let deadlines = parse_deadline_response(raw, 2025).unwrap();

        assert_eq!(deadlines.len(), 2);
        assert_eq!(deadlines[0].session_range, SessionRange::new(1, 4));
        assert_eq!(deadlines[0].notice_time, NaiveTime::from_hms_opt(10, 0, 0));
        assert_eq!(deadlines[1].session_range, SessionRange::single(5));
        assert_eq!(deadlines[1].deadline_time, None);
    }
}
