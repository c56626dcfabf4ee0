// src/schedules/grouping.rs
//! Date-grouping engine: turns per-region crawl rows into numbered sessions

use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::models::{FragmentSource, GroupedSession, ScheduleFragment};
use super::regions::region_by_code;

/// Groups crawl fragments by exam date.
///
/// Session numbers are the 1-based rank of each distinct date in calendar
/// order; crawl fragments never carry their own session number. Locations
/// keep the order in which regions were encountered, and the first fragment
/// seen for a date supplies times, registration window and result date.
pub fn group_by_date(fragments: &[ScheduleFragment]) -> Vec<GroupedSession> {
    let mut by_date: BTreeMap<NaiveDate, Vec<&ScheduleFragment>> = BTreeMap::new();

    for fragment in fragments {
        if fragment.source != FragmentSource::Crawled {
            warn!(source = ?fragment.source, "Skipping non-crawled fragment in date grouping");
            continue;
        }
        let Some(exam_date) = fragment.exam_date else {
            warn!(
                region = ?fragment.region_name,
                "Skipping crawled fragment without exam date"
            );
            continue;
        };
        by_date.entry(exam_date).or_default().push(fragment);
    }

    let sessions: Vec<GroupedSession> = by_date
        .into_iter()
        .enumerate()
        .map(|(index, (exam_date, members))| build_session(index as u32 + 1, exam_date, &members))
        .collect();

    debug!(
        fragments = fragments.len(),
        sessions = sessions.len(),
        "Grouped crawl fragments by date"
    );

    sessions
}

fn build_session(
    session_number: u32,
    exam_date: NaiveDate,
    members: &[&ScheduleFragment],
) -> GroupedSession {
    // BTreeMap entries are only created with a first member
    let representative = members[0];

    let mut locations: Vec<String> = Vec::new();
    let mut region_codes: Vec<String> = Vec::new();

    for member in members {
        // Rows that carry only a region code take the registry's name for it
        let name = match (member.region_name.as_deref(), member.region_code.as_deref()) {
            (Some(name), _) => name,
            (None, Some(code)) => match region_by_code(code) {
                Some(region) => region.name,
                None => continue,
            },
            (None, None) => continue,
        };
        if locations.iter().any(|l| l == name) {
            continue;
        }
        locations.push(name.to_string());
        region_codes.push(member.region_code.clone().unwrap_or_default());
    }

    let notes = format!(
        "{} - {} ({}개 지역)",
        exam_date.format("%Y-%m-%d"),
        locations.join(", "),
        locations.len()
    );

    GroupedSession {
        year: representative.year,
        exam_type: representative.exam_type,
        session_number,
        exam_date,
        exam_time_start: representative.exam_time_start,
        exam_time_end: representative.exam_time_end,
        registration_period: representative.registration_period.clone(),
        result_date: representative.result_date,
        locations,
        region_codes,
        notes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedules::models::ExamType;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn crawled(d: NaiveDate, name: &str, code: &str) -> ScheduleFragment {
        ScheduleFragment::crawled(2025, ExamType::Life, d, name, code)
    }

    #[test]
    fn test_groups_regions_sharing_a_date() {
        let fragments = vec![
            crawled(date(2025, 11, 10), "서울", "01"),
            crawled(date(2025, 11, 10), "인천", "02"),
            crawled(date(2025, 11, 17), "부산", "04"),
        ];

        let sessions = group_by_date(&fragments);

        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].session_number, 1);
        assert_eq!(sessions[0].locations, vec!["서울", "인천"]);
        assert_eq!(sessions[0].region_codes, vec!["01", "02"]);
        assert_eq!(sessions[1].session_number, 2);
        assert_eq!(sessions[1].locations, vec!["부산"]);
    }

    #[test]
    fn test_numbering_follows_calendar_not_input_order() {
        let fragments = vec![
            crawled(date(2025, 11, 24), "대전", "09"),
            crawled(date(2025, 11, 3), "광주", "07"),
            crawled(date(2025, 11, 17), "대구", "06"),
        ];

        let sessions = group_by_date(&fragments);
        let dates: Vec<NaiveDate> = sessions.iter().map(|s| s.exam_date).collect();

        assert_eq!(dates, vec![date(2025, 11, 3), date(2025, 11, 17), date(2025, 11, 24)]);
        assert_eq!(sessions[0].locations, vec!["광주"]);
    }

    #[test]
    fn test_representative_is_first_encountered() {
        let mut first = crawled(date(2025, 11, 10), "서울", "01");
        first.registration_period = Some("10.13 ~ 10.17".to_string());
        let mut second = crawled(date(2025, 11, 10), "인천", "02");
        second.registration_period = Some("10.14 ~ 10.18".to_string());

        let sessions = group_by_date(&[first, second]);

        assert_eq!(
            sessions[0].registration_period.as_deref(),
            Some("10.13 ~ 10.17")
        );
    }

    #[test]
    fn test_notes_summarise_locations() {
        let fragments = vec![
            crawled(date(2025, 11, 10), "서울", "01"),
            crawled(date(2025, 11, 10), "인천", "02"),
        ];

        let sessions = group_by_date(&fragments);

        assert_eq!(sessions[0].notes, "2025-11-10 - 서울, 인천 (2개 지역)");
    }

    #[test]
    fn test_code_only_rows_take_registry_name() {
        let mut code_only = crawled(date(2025, 11, 10), "부산", "04");
        code_only.region_name = None;
        let mut unknown = crawled(date(2025, 11, 10), "세종", "99");
        unknown.region_name = None;

        let sessions = group_by_date(&[code_only, unknown]);

        assert_eq!(sessions[0].locations, vec!["부산"]);
        assert_eq!(sessions[0].region_codes, vec!["04"]);
    }

    #[test]
    fn test_empty_input_yields_no_sessions() {
        assert!(group_by_date(&[]).is_empty());
    }

    #[test]
    fn test_fragments_without_date_are_skipped() {
        let mut undated = crawled(date(2025, 11, 10), "서울", "01");
        undated.exam_date = None;

        assert!(group_by_date(&[undated]).is_empty());
    }

    proptest! {
        #[test]
        fn prop_sessions_increase_with_date(days in proptest::collection::vec(1u32..=28, 0..40)) {
            let regions = crate::schedules::regions::all_regions();
            let fragments: Vec<ScheduleFragment> = days
                .iter()
                .enumerate()
                .map(|(i, d)| {
                    let region = regions[i % regions.len()];
                    crawled(date(2025, 11, *d), region.name, region.code)
                })
                .collect();

            let sessions = group_by_date(&fragments);

            let mut distinct = days.clone();
            distinct.sort_unstable();
            distinct.dedup();
            prop_assert_eq!(sessions.len(), distinct.len());

            for (index, session) in sessions.iter().enumerate() {
                prop_assert_eq!(session.session_number as usize, index + 1);
            }
            for pair in sessions.windows(2) {
                prop_assert!(pair[0].exam_date < pair[1].exam_date);
            }
        }
    }
}
