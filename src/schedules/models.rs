// src/schedules/models.rs

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::common::helpers::{deserialize_opt_time, serialize_opt_time};

// ============================================================================
// Exam Tracks
// ============================================================================

/// Insurance-license exam track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExamType {
    #[serde(rename = "생보", alias = "life")]
    Life,
    #[serde(rename = "손보", alias = "non_life")]
    NonLife,
    #[serde(rename = "제3보험", alias = "third_sector")]
    ThirdSector,
}

impl ExamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExamType::Life => "생보",
            ExamType::NonLife => "손보",
            ExamType::ThirdSector => "제3보험",
        }
    }

    /// Code sent to the exam registry when crawling
    pub fn registry_code(&self) -> &'static str {
        match self {
            ExamType::Life => "L",
            ExamType::NonLife => "N",
            ExamType::ThirdSector => "T",
        }
    }
}

impl fmt::Display for ExamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExamType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "생보" | "생명보험" | "life" => Ok(ExamType::Life),
            "손보" | "손해보험" | "non_life" => Ok(ExamType::NonLife),
            "제3보험" | "third_sector" => Ok(ExamType::ThirdSector),
            other => Err(format!("Unknown exam type: {}", other)),
        }
    }
}

/// Provenance of a single fragment. Caller-supplied fragments default to image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentSource {
    #[default]
    Image,
    Crawled,
    Internal,
}

// ============================================================================
// Session Ranges
// ============================================================================

/// Widest session range accepted from deadline text or model output
pub const MAX_SESSION_SPAN: u32 = 100;

/// Inclusive range of session numbers, written "N" or "N~M"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionRange {
    pub start: u32,
    pub end: u32,
}

impl SessionRange {
    pub fn single(n: u32) -> Self {
        Self { start: n, end: n }
    }

    /// Builds a range, swapping bounds written in reverse
    pub fn new(start: u32, end: u32) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self { start: end, end: start }
        }
    }

    pub fn is_single(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, session_number: u32) -> bool {
        self.start <= session_number && session_number <= self.end
    }

    /// Sessions are numbered from 1 and a range covers at most `MAX_SESSION_SPAN`
    pub fn is_plausible(&self) -> bool {
        self.start >= 1 && self.end - self.start < MAX_SESSION_SPAN
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> {
        self.start..=self.end
    }
}

impl fmt::Display for SessionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single() {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}~{}", self.start, self.end)
        }
    }
}

impl FromStr for SessionRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cleaned = s.trim().trim_end_matches('차').trim();
        let parse = |part: &str| {
            part.trim()
                .trim_end_matches('차')
                .trim()
                .parse::<u32>()
                .map_err(|_| format!("Invalid session range: {}", s))
        };

        match cleaned.split_once(['~', '-', '∼', '～']) {
            Some((start, end)) => Ok(SessionRange::new(parse(start)?, parse(end)?)),
            None => Ok(SessionRange::single(parse(cleaned)?)),
        }
    }
}

impl Serialize for SessionRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SessionRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::Number(n) => n
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .map(SessionRange::single)
                .ok_or_else(|| serde::de::Error::custom("session number out of range")),
            serde_json::Value::String(s) => s.parse().map_err(serde::de::Error::custom),
            _ => Err(serde::de::Error::custom("expected session range string or number")),
        }
    }
}

// ============================================================================
// Fragments
// ============================================================================

/// One unit of raw evidence about an exam session, before reconciliation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleFragment {
    pub year: i32,
    pub exam_type: ExamType,
    #[serde(default)]
    pub session_number: Option<u32>,
    #[serde(default)]
    pub session_range: Option<SessionRange>,
    #[serde(default)]
    pub exam_date: Option<NaiveDate>,
    #[serde(
        default,
        serialize_with = "serialize_opt_time",
        deserialize_with = "deserialize_opt_time"
    )]
    pub exam_time_start: Option<NaiveTime>,
    #[serde(
        default,
        serialize_with = "serialize_opt_time",
        deserialize_with = "deserialize_opt_time"
    )]
    pub exam_time_end: Option<NaiveTime>,
    #[serde(default)]
    pub region_name: Option<String>,
    #[serde(default)]
    pub region_code: Option<String>,
    #[serde(default)]
    pub registration_period: Option<String>,
    #[serde(default)]
    pub result_date: Option<NaiveDate>,
    #[serde(default)]
    pub internal_deadline_date: Option<NaiveDate>,
    #[serde(
        default,
        serialize_with = "serialize_opt_time",
        deserialize_with = "deserialize_opt_time"
    )]
    pub internal_deadline_time: Option<NaiveTime>,
    #[serde(default)]
    pub notice_date: Option<NaiveDate>,
    #[serde(
        default,
        serialize_with = "serialize_opt_time",
        deserialize_with = "deserialize_opt_time"
    )]
    pub notice_time: Option<NaiveTime>,
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub source: FragmentSource,
}

impl ScheduleFragment {
    fn empty(year: i32, exam_type: ExamType, source: FragmentSource) -> Self {
        Self {
            year,
            exam_type,
            session_number: None,
            session_range: None,
            exam_date: None,
            exam_time_start: None,
            exam_time_end: None,
            region_name: None,
            region_code: None,
            registration_period: None,
            result_date: None,
            internal_deadline_date: None,
            internal_deadline_time: None,
            notice_date: None,
            notice_time: None,
            locations: Vec::new(),
            notes: String::new(),
            source,
        }
    }

    /// A crawl fragment: exactly one region, a concrete date, no session number
    pub fn crawled(
        year: i32,
        exam_type: ExamType,
        exam_date: NaiveDate,
        region_name: &str,
        region_code: &str,
    ) -> Self {
        let mut fragment = Self::empty(year, exam_type, FragmentSource::Crawled);
        fragment.exam_date = Some(exam_date);
        fragment.region_name = Some(region_name.to_string());
        fragment.region_code = Some(region_code.to_string());
        fragment.locations = vec![region_name.to_string()];
        fragment
    }

    pub fn image(year: i32, exam_type: ExamType, session_number: Option<u32>) -> Self {
        let mut fragment = Self::empty(year, exam_type, FragmentSource::Image);
        fragment.session_number = session_number;
        fragment
    }
}

// ============================================================================
// Grouped Sessions
// ============================================================================

/// One exam sitting, aggregated over every region that sits on the same date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupedSession {
    pub year: i32,
    pub exam_type: ExamType,
    pub session_number: u32,
    pub exam_date: NaiveDate,
    #[serde(
        default,
        serialize_with = "serialize_opt_time",
        deserialize_with = "deserialize_opt_time"
    )]
    pub exam_time_start: Option<NaiveTime>,
    #[serde(
        default,
        serialize_with = "serialize_opt_time",
        deserialize_with = "deserialize_opt_time"
    )]
    pub exam_time_end: Option<NaiveTime>,
    #[serde(default)]
    pub registration_period: Option<String>,
    #[serde(default)]
    pub result_date: Option<NaiveDate>,
    pub locations: Vec<String>,
    #[serde(default)]
    pub region_codes: Vec<String>,
    #[serde(default)]
    pub notes: String,
}

// ============================================================================
// Internal Deadlines
// ============================================================================

/// Company-internal application cutoff for one or more sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalDeadline {
    pub session_range: SessionRange,
    pub deadline_date: NaiveDate,
    #[serde(
        default,
        serialize_with = "serialize_opt_time",
        deserialize_with = "deserialize_opt_time"
    )]
    pub deadline_time: Option<NaiveTime>,
    #[serde(default)]
    pub notice_date: Option<NaiveDate>,
    #[serde(
        default,
        serialize_with = "serialize_opt_time",
        deserialize_with = "deserialize_opt_time"
    )]
    pub notice_time: Option<NaiveTime>,
    #[serde(default)]
    pub notes: String,
}

impl InternalDeadline {
    pub fn applies_to(&self, session_number: u32) -> bool {
        self.session_range.contains(session_number)
    }
}

// ============================================================================
// Comprehensive Schedules
// ============================================================================

/// Which source streams contributed to a merged record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    ComprehensiveMatch,
    ImageInternal,
    ImageCrawled,
    CrawledInternal,
    ImageOnly,
    CrawledOnly,
    InternalOnly,
}

impl DataSource {
    /// Decision table over the contributing streams; None when nothing contributed
    pub fn from_contributions(image: bool, crawled: bool, internal: bool) -> Option<Self> {
        match (image, crawled, internal) {
            (true, true, true) => Some(DataSource::ComprehensiveMatch),
            (true, false, true) => Some(DataSource::ImageInternal),
            (true, true, false) => Some(DataSource::ImageCrawled),
            (false, true, true) => Some(DataSource::CrawledInternal),
            (true, false, false) => Some(DataSource::ImageOnly),
            (false, true, false) => Some(DataSource::CrawledOnly),
            (false, false, true) => Some(DataSource::InternalOnly),
            (false, false, false) => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::ComprehensiveMatch => "comprehensive_match",
            DataSource::ImageInternal => "image_internal",
            DataSource::ImageCrawled => "image_crawled",
            DataSource::CrawledInternal => "crawled_internal",
            DataSource::ImageOnly => "image_only",
            DataSource::CrawledOnly => "crawled_only",
            DataSource::InternalOnly => "internal_only",
        }
    }

    pub fn persisted(&self) -> PersistedSource {
        PersistedSource::from_provenance(self.as_str())
    }
}

/// Reduced provenance stored alongside each schedule row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistedSource {
    Combined,
    OfficialOnly,
    InternalOnly,
}

impl PersistedSource {
    /// Maps any provenance label; unknown labels are stored as combined
    pub fn from_provenance(label: &str) -> Self {
        match label {
            "comprehensive_match" | "image_internal" | "image_crawled" | "crawled_internal" => {
                PersistedSource::Combined
            }
            "image_only" | "crawled_only" | "official_crawled" => PersistedSource::OfficialOnly,
            "internal_only" => PersistedSource::InternalOnly,
            _ => PersistedSource::Combined,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PersistedSource::Combined => "combined",
            PersistedSource::OfficialOnly => "official_only",
            PersistedSource::InternalOnly => "internal_only",
        }
    }
}

/// Final reconciled record, unique per (exam_type, session_number)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComprehensiveSchedule {
    pub year: i32,
    pub exam_type: ExamType,
    pub session_number: u32,
    #[serde(default)]
    pub exam_date: Option<NaiveDate>,
    #[serde(
        default,
        serialize_with = "serialize_opt_time",
        deserialize_with = "deserialize_opt_time"
    )]
    pub exam_time_start: Option<NaiveTime>,
    #[serde(
        default,
        serialize_with = "serialize_opt_time",
        deserialize_with = "deserialize_opt_time"
    )]
    pub exam_time_end: Option<NaiveTime>,
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub region_codes: Vec<String>,
    #[serde(default)]
    pub registration_period: Option<String>,
    #[serde(default)]
    pub result_date: Option<NaiveDate>,
    #[serde(default)]
    pub internal_deadline_date: Option<NaiveDate>,
    #[serde(
        default,
        serialize_with = "serialize_opt_time",
        deserialize_with = "deserialize_opt_time"
    )]
    pub internal_deadline_time: Option<NaiveTime>,
    #[serde(default)]
    pub notice_date: Option<NaiveDate>,
    #[serde(
        default,
        serialize_with = "serialize_opt_time",
        deserialize_with = "deserialize_opt_time"
    )]
    pub notice_time: Option<NaiveTime>,
    #[serde(default)]
    pub has_internal_deadline: bool,
    pub data_source: DataSource,
    #[serde(default)]
    pub notes: String,
}

impl ComprehensiveSchedule {
    pub fn key(&self) -> (ExamType, u32) {
        (self.exam_type, self.session_number)
    }
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlRequest {
    pub year: i32,
    pub month: u32,
    pub exam_type: ExamType,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseInternalRequest {
    pub text: String,
    pub year: i32,
    /// Ask the text model when the rule-based parser finds nothing
    #[serde(default)]
    pub use_ai_fallback: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    pub year: i32,
    pub exam_type: ExamType,
    #[serde(default)]
    pub image_schedules: Vec<ScheduleFragment>,
    #[serde(default)]
    pub crawled_sessions: Vec<GroupedSession>,
    #[serde(default)]
    pub internal_deadlines: Vec<InternalDeadline>,
}

#[derive(Debug, Deserialize)]
pub struct SaveRequest {
    pub schedules: Vec<ComprehensiveSchedule>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSchedulesQuery {
    pub year: i32,
    pub exam_type: Option<ExamType>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteSchedulesQuery {
    pub year: i32,
}

/// An uploaded schedule image
#[derive(Debug)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
}

/// Multipart form of the parse-image endpoint
#[derive(Debug)]
pub struct ParseImageForm {
    pub year: i32,
    pub exam_type: ExamType,
    pub image: ImageUpload,
}

/// Multipart form of the comprehensive endpoint. Every source is optional;
/// months left empty skip the crawl.
#[derive(Debug)]
pub struct ComprehensiveForm {
    pub year: i32,
    pub exam_type: ExamType,
    pub months: Vec<u32>,
    pub image: Option<ImageUpload>,
    pub internal_text: Option<String>,
    pub save: bool,
}
