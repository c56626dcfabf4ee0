// src/schedules/deadlines.rs
//! Internal-deadline matcher
//!
//! Parses company deadline announcements such as
//! `1~4차 시험접수마감: 10월 1일(수) 오후 2시` and resolves which
//! deadline applies to a given session number.

use chrono::{NaiveDate, NaiveTime};
use regex::{Captures, Regex};
use std::sync::OnceLock;
use tracing::debug;

use super::models::{InternalDeadline, SessionRange};
use crate::common::helpers::{format_clock_time, truncate_for_log};

const DATE_TIME_TAIL: &str = r"(?P<month>\d{1,2})\s*월\s*(?P<day>\d{1,2})\s*일\s*(?:\([^)]*\))?\s*(?P<meridiem>오전|오후)\s*(?P<hour>\d{1,2})\s*시(?:\s*(?P<minute>\d{1,2})\s*분|\s*(?P<half>반))?";

const SESSION_PREFIX: &str = r"(?P<start>\d+)\s*(?:[~∼～\-]\s*(?P<end>\d+)\s*)?차";

fn deadline_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(&format!(
            r"^{}\s*시험\s*접수\s*마감\s*[:：]?\s*{}",
            SESSION_PREFIX, DATE_TIME_TAIL
        ))
        .expect("deadline pattern is valid")
    })
}

fn notice_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(&format!(
            r"^(?:{}\s*)?수험표\s*공지\s*(?:\(\s*예정\s*\)|예정)?\s*[:：]\s*{}",
            SESSION_PREFIX, DATE_TIME_TAIL
        ))
        .expect("notice pattern is valid")
    })
}

fn clock_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?P<meridiem>오전|오후)\s*(?P<hour>\d{1,2})\s*시(?:\s*(?P<minute>\d{1,2})\s*분|\s*(?P<half>반))?")
            .expect("clock pattern is valid")
    })
}

// ============================================================================
// Korean 12-hour clock
// ============================================================================

/// Converts a Korean AM/PM hour to a 24-hour time.
/// `오후` adds 12 unless the hour is already 12; `오전 12시` is midnight.
pub fn to_24_hour(meridiem: &str, hour: u32, minute: u32) -> Option<NaiveTime> {
    if hour > 12 {
        return None;
    }
    let hour = match (meridiem, hour) {
        ("오전", 12) => 0,
        ("오전", h) => h,
        ("오후", 12) => 12,
        ("오후", h) => h + 12,
        _ => return None,
    };
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Parses the first `오전/오후 N시` expression in the text
pub fn parse_korean_time(text: &str) -> Option<NaiveTime> {
    let captures = clock_pattern().captures(text)?;
    time_from_captures(&captures)
}

/// `"오후 2시"` → `"14:00"`
pub fn korean_time_to_24h(text: &str) -> Option<String> {
    parse_korean_time(text).map(|t| format_clock_time(&t))
}

fn time_from_captures(captures: &Captures<'_>) -> Option<NaiveTime> {
    let meridiem = captures.name("meridiem")?.as_str();
    let hour: u32 = captures.name("hour")?.as_str().parse().ok()?;
    let minute: u32 = match (captures.name("minute"), captures.name("half")) {
        (Some(m), _) => m.as_str().parse().ok()?,
        (None, Some(_)) => 30,
        (None, None) => 0,
    };
    to_24_hour(meridiem, hour, minute)
}

fn date_from_captures(captures: &Captures<'_>, year: i32) -> Option<NaiveDate> {
    let month: u32 = captures.name("month")?.as_str().parse().ok()?;
    let day: u32 = captures.name("day")?.as_str().parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn range_from_captures(captures: &Captures<'_>) -> Option<SessionRange> {
    let start: u32 = captures.name("start")?.as_str().parse().ok()?;
    let end: u32 = match captures.name("end") {
        Some(end) => end.as_str().parse().ok()?,
        None => start,
    };
    Some(SessionRange::new(start, end))
}

// ============================================================================
// Parsing
// ============================================================================

/// Parses deadline announcements line by line.
///
/// A `N~M차 시험접수마감` line creates a deadline. A `수험표 공지` line attaches
/// its date and time to the most recently parsed deadline, so notice lines must
/// follow the deadline they belong to. A notice line that names its own range
/// (`1~4차 수험표 공지: ...`) attaches to the latest deadline with that range
/// instead. Lines matching neither form are skipped.
pub fn parse_internal_deadlines(text: &str, year: i32) -> Vec<InternalDeadline> {
    let mut deadlines: Vec<InternalDeadline> = Vec::new();

    for (line_no, raw_line) in text.lines().enumerate() {
        let line = raw_line
            .trim()
            .trim_start_matches(['-', '•', '*', '·', '▶'])
            .trim();
        if line.is_empty() {
            continue;
        }

        if let Some(captures) = deadline_pattern().captures(line) {
            match build_deadline(&captures, year, line) {
                Some(deadline) => deadlines.push(deadline),
                None => debug!(
                    line = line_no + 1,
                    text = %truncate_for_log(line, 40),
                    "Skipping deadline line with invalid date or time"
                ),
            }
            continue;
        }

        if let Some(captures) = notice_pattern().captures(line) {
            attach_notice(&mut deadlines, &captures, year, line_no + 1);
            continue;
        }

        debug!(
            line = line_no + 1,
            text = %truncate_for_log(line, 40),
            "Skipping unrecognised deadline line"
        );
    }

    debug!(count = deadlines.len(), year = year, "Parsed internal deadlines");
    deadlines
}

fn build_deadline(captures: &Captures<'_>, year: i32, line: &str) -> Option<InternalDeadline> {
    Some(InternalDeadline {
        session_range: range_from_captures(captures).filter(SessionRange::is_plausible)?,
        deadline_date: date_from_captures(captures, year)?,
        deadline_time: Some(time_from_captures(captures)?),
        notice_date: None,
        notice_time: None,
        notes: line.to_string(),
    })
}

fn attach_notice(
    deadlines: &mut [InternalDeadline],
    captures: &Captures<'_>,
    year: i32,
    line_no: usize,
) {
    let (Some(notice_date), Some(notice_time)) = (
        date_from_captures(captures, year),
        time_from_captures(captures),
    ) else {
        debug!(line = line_no, "Skipping notice line with invalid date or time");
        return;
    };

    let target = match range_from_captures(captures) {
        Some(range) => deadlines.iter_mut().rev().find(|d| d.session_range == range),
        None => deadlines.last_mut(),
    };

    match target {
        Some(deadline) => {
            deadline.notice_date = Some(notice_date);
            deadline.notice_time = Some(notice_time);
        }
        None => debug!(line = line_no, "Notice line has no deadline to attach to"),
    }
}

// ============================================================================
// Matching
// ============================================================================

/// First deadline, in list order, whose range covers the session
pub fn find_matching_deadline(
    session_number: u32,
    deadlines: &[InternalDeadline],
) -> Option<&InternalDeadline> {
    deadlines.iter().find(|d| d.applies_to(session_number))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, d).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    const ANNOUNCEMENT: &str = "\
1~4차 시험접수마감: 10월 1일(수) 오후 2시
수험표 공지(예정): 10월 20일(월) 오전 10시

5차 시험접수마감: 11월 3일(월) 오전 11시
수험표 공지: 11월 10일(월) 오후 12시
";

    #[test]
    fn test_korean_time_conversion() {
        assert_eq!(korean_time_to_24h("오후 2시").as_deref(), Some("14:00"));
        assert_eq!(korean_time_to_24h("오전 11시").as_deref(), Some("11:00"));
        assert_eq!(korean_time_to_24h("오후 12시").as_deref(), Some("12:00"));
        assert_eq!(korean_time_to_24h("오전 12시").as_deref(), Some("00:00"));
    }

    #[test]
    fn test_korean_time_with_minutes() {
        assert_eq!(korean_time_to_24h("오후 3시 30분").as_deref(), Some("15:30"));
        assert_eq!(korean_time_to_24h("오전 9시반").as_deref(), Some("09:30"));
        assert_eq!(korean_time_to_24h("오후 13시"), None);
    }

    #[test]
    fn test_parses_ranges_and_single_sessions() {
        let deadlines = parse_internal_deadlines(ANNOUNCEMENT, 2025);

        assert_eq!(deadlines.len(), 2);
        assert_eq!(deadlines[0].session_range.to_string(), "1~4");
        assert_eq!(deadlines[0].deadline_date, date(10, 1));
        assert_eq!(deadlines[0].deadline_time, Some(time(14, 0)));
        assert_eq!(deadlines[1].session_range.to_string(), "5");
        assert_eq!(deadlines[1].deadline_time, Some(time(11, 0)));
    }

    #[test]
    fn test_notice_attaches_to_preceding_deadline() {
        let deadlines = parse_internal_deadlines(ANNOUNCEMENT, 2025);

        assert_eq!(deadlines[0].notice_date, Some(date(10, 20)));
        assert_eq!(deadlines[0].notice_time, Some(time(10, 0)));
        assert_eq!(deadlines[1].notice_date, Some(date(11, 10)));
        assert_eq!(deadlines[1].notice_time, Some(time(12, 0)));
    }

    #[test]
    fn test_notice_with_explicit_range_targets_that_deadline() {
        let text = "\
1~4차 시험접수마감: 10월 1일(수) 오후 2시
5~8차 시험접수마감: 10월 29일(수) 오후 2시
1~4차 수험표 공지: 10월 20일(월) 오전 10시
";
        let deadlines = parse_internal_deadlines(text, 2025);

        assert_eq!(deadlines[0].notice_date, Some(date(10, 20)));
        assert_eq!(deadlines[1].notice_date, None);
    }

    #[test]
    fn test_notice_before_any_deadline_is_dropped() {
        let text = "수험표 공지: 10월 20일(월) 오전 10시\n3차 시험접수마감: 10월 1일 오후 5시";
        let deadlines = parse_internal_deadlines(text, 2025);

        assert_eq!(deadlines.len(), 1);
        assert_eq!(deadlines[0].notice_date, None);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let text = "\
안내드립니다
2차 시험접수마감: 13월 40일 오후 2시
- 3차 시험접수마감 : 10월 15일 오전 9시
";
        let deadlines = parse_internal_deadlines(text, 2025);

        assert_eq!(deadlines.len(), 1);
        assert_eq!(deadlines[0].session_range, SessionRange::single(3));
        assert_eq!(deadlines[0].deadline_time, Some(time(9, 0)));
    }

    #[test]
    fn test_find_matching_deadline_inside_range() {
        let deadlines = parse_internal_deadlines("1~4차 시험접수마감: 10월 1일 오후 2시", 2025);

        assert!(find_matching_deadline(2, &deadlines).is_some());
        assert!(find_matching_deadline(4, &deadlines).is_some());
        assert!(find_matching_deadline(5, &deadlines).is_none());
    }

    #[test]
    fn test_find_matching_deadline_exact_number() {
        let deadlines = parse_internal_deadlines("5차 시험접수마감: 11월 3일 오전 11시", 2025);

        assert!(find_matching_deadline(5, &deadlines).is_some());
        assert!(find_matching_deadline(4, &deadlines).is_none());
    }

    #[test]
    fn test_first_overlapping_deadline_wins() {
        let text = "\
1~4차 시험접수마감: 10월 1일 오후 2시
3~6차 시험접수마감: 10월 8일 오후 2시
";
        let deadlines = parse_internal_deadlines(text, 2025);

        let matched = find_matching_deadline(3, &deadlines).unwrap();
        assert_eq!(matched.deadline_date, date(10, 1));
    }

    #[test]
    fn test_implausible_ranges_are_skipped() {
        let text = "\
0차 시험접수마감: 10월 1일 오후 2시
1~500차 시험접수마감: 10월 1일 오후 2시
1~4차 시험접수마감: 10월 1일 오후 2시
";
        let deadlines = parse_internal_deadlines(text, 2025);

        assert_eq!(deadlines.len(), 1);
        assert_eq!(deadlines[0].session_range, SessionRange::new(1, 4));
    }
}
