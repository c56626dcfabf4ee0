// src/schedules/validators.rs

use super::models::*;
use crate::common::config::MAX_IMAGE_BYTES;
use crate::common::{ValidationResult, Validator};

const MIN_YEAR: i32 = 2000;
const MAX_YEAR: i32 = 2100;
const MAX_TEXT_CHARS: usize = 20_000;

fn check_year(result: &mut ValidationResult, year: i32) {
    result.check(
        (MIN_YEAR..=MAX_YEAR).contains(&year),
        "year",
        "Year must be between 2000 and 2100",
    );
}

fn check_month(result: &mut ValidationResult, field: &str, month: u32) {
    result.check(
        (1..=12).contains(&month),
        field,
        "Month must be between 1 and 12",
    );
}

fn check_text(result: &mut ValidationResult, field: &str, text: &str) {
    if text.trim().is_empty() {
        result.add_error(field, "Text is required");
    } else if text.chars().count() > MAX_TEXT_CHARS {
        result.add_error(field, "Text must be less than 20000 characters");
    }
}

/// Mime type of an accepted schedule image, from its magic bytes
pub fn detect_image_mime(bytes: &[u8]) -> Option<&'static str> {
    let info = infer::Infer::new().get(bytes)?;
    match info.mime_type() {
        mime @ ("image/png" | "image/jpeg" | "image/gif" | "image/webp") => Some(mime),
        _ => None,
    }
}

// ============================================================================
// Schedule Validators
// ============================================================================

pub struct ScheduleRequestValidator;

impl Validator<CrawlRequest> for ScheduleRequestValidator {
    fn validate(&self, data: &CrawlRequest) -> ValidationResult {
        let mut result = ValidationResult::new();
        check_year(&mut result, data.year);
        check_month(&mut result, "month", data.month);
        result
    }
}

impl Validator<ParseInternalRequest> for ScheduleRequestValidator {
    fn validate(&self, data: &ParseInternalRequest) -> ValidationResult {
        let mut result = ValidationResult::new();
        check_year(&mut result, data.year);
        check_text(&mut result, "text", &data.text);
        result
    }
}

impl Validator<MergeRequest> for ScheduleRequestValidator {
    fn validate(&self, data: &MergeRequest) -> ValidationResult {
        let mut result = ValidationResult::new();
        check_year(&mut result, data.year);

        // Zero sessions cannot be keyed
        result.check(
            data.image_schedules
                .iter()
                .all(|f| f.session_number != Some(0)),
            "imageSchedules",
            "Session numbers start at 1",
        );
        result.check(
            data.crawled_sessions.iter().all(|s| s.session_number > 0),
            "crawledSessions",
            "Session numbers start at 1",
        );
        result.check(
            data.internal_deadlines
                .iter()
                .all(|d| d.session_range.is_plausible()),
            "internalDeadlines",
            "Session ranges start at 1 and span at most 100 sessions",
        );
        result
    }
}

impl Validator<SaveRequest> for ScheduleRequestValidator {
    fn validate(&self, data: &SaveRequest) -> ValidationResult {
        let mut result = ValidationResult::new();

        if data.schedules.is_empty() {
            result.add_error("schedules", "At least one schedule is required");
        }
        for schedule in &data.schedules {
            if !(MIN_YEAR..=MAX_YEAR).contains(&schedule.year) {
                result.add_error("schedules.year", "Year must be between 2000 and 2100");
                break;
            }
        }
        result.check(
            data.schedules.iter().all(|s| s.session_number > 0),
            "schedules.sessionNumber",
            "Session numbers start at 1",
        );
        result
    }
}

impl Validator<ImageUpload> for ScheduleRequestValidator {
    fn validate(&self, data: &ImageUpload) -> ValidationResult {
        let mut result = ValidationResult::new();

        if data.bytes.is_empty() {
            result.add_error("image", "Image is required");
        } else if data.bytes.len() > MAX_IMAGE_BYTES {
            result.add_error("image", "Image must be 10 MB or smaller");
        } else if detect_image_mime(&data.bytes).is_none() {
            result.add_error("image", "Image must be PNG, JPEG, GIF or WebP");
        }
        result
    }
}

impl Validator<ParseImageForm> for ScheduleRequestValidator {
    fn validate(&self, data: &ParseImageForm) -> ValidationResult {
        let mut result = ValidationResult::new();
        check_year(&mut result, data.year);
        result.merge(Validator::<ImageUpload>::validate(self, &data.image));
        result
    }
}

impl Validator<ComprehensiveForm> for ScheduleRequestValidator {
    fn validate(&self, data: &ComprehensiveForm) -> ValidationResult {
        let mut result = ValidationResult::new();
        check_year(&mut result, data.year);

        for month in &data.months {
            check_month(&mut result, "months", *month);
        }
        if let Some(image) = &data.image {
            result.merge(Validator::<ImageUpload>::validate(self, image));
        }
        if let Some(text) = &data.internal_text {
            check_text(&mut result, "internalText", text);
        }
        if data.months.is_empty() && data.image.is_none() && data.internal_text.is_none() {
            result.add_error("sources", "Provide months, an image or internal text");
        }
        result
    }
}
