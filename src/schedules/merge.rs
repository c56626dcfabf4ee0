// src/schedules/merge.rs
//! Comprehensive merge engine
//!
//! Reconciles image-extracted fragments, date-grouped crawl sessions and
//! internal deadlines into one record per (exam type, session number).
//! Source priority is image > crawled > internal.

use std::collections::HashSet;
use tracing::{debug, warn};

use super::deadlines::find_matching_deadline;
use super::models::{
    ComprehensiveSchedule, DataSource, ExamType, GroupedSession, InternalDeadline,
    ScheduleFragment,
};
use super::regions::{expand_locations, region_by_name};

/// Request-level facts the internal stream does not carry itself
#[derive(Debug, Clone, Copy)]
pub struct MergeContext {
    pub year: i32,
    /// Exam type assigned to records that only come from internal deadlines
    pub exam_type: ExamType,
}

type SessionKey = (ExamType, u32);

struct Contributions<'a> {
    image: Option<&'a ScheduleFragment>,
    crawled: Option<&'a GroupedSession>,
    deadline: Option<&'a InternalDeadline>,
}

/// Merges the three streams.
///
/// Every key present in any input appears exactly once in the output, sorted
/// by exam type and session number. Within one stream the first record for a
/// key wins. Image fragments without a session number borrow one from the
/// crawled session of the same exam type sitting on the same date; if there
/// is none they cannot be keyed and are skipped.
pub fn merge_schedules(
    ctx: &MergeContext,
    image: &[ScheduleFragment],
    crawled: &[GroupedSession],
    internal: &[InternalDeadline],
) -> Vec<ComprehensiveSchedule> {
    let mut processed: HashSet<SessionKey> = HashSet::new();
    let mut merged: Vec<ComprehensiveSchedule> = Vec::new();

    for fragment in image {
        let Some(session_number) = resolve_image_session(fragment, crawled) else {
            warn!(
                exam_type = %fragment.exam_type,
                exam_date = ?fragment.exam_date,
                "Image schedule has no session number and no crawled session on its date"
            );
            continue;
        };
        let key = (fragment.exam_type, session_number);
        if !processed.insert(key) {
            debug!(session = session_number, "Duplicate image schedule ignored");
            continue;
        }

        let contributions = Contributions {
            image: Some(fragment),
            crawled: crawled
                .iter()
                .find(|s| s.exam_type == key.0 && s.session_number == key.1),
            deadline: deadline_for(ctx, key, internal),
        };
        merged.extend(build_record(ctx, key, &contributions));
    }

    for session in crawled {
        let key = (session.exam_type, session.session_number);
        if !processed.insert(key) {
            continue;
        }

        let contributions = Contributions {
            image: None,
            crawled: Some(session),
            deadline: deadline_for(ctx, key, internal),
        };
        merged.extend(build_record(ctx, key, &contributions));
    }

    for deadline in internal {
        for session_number in deadline.session_range.iter() {
            let key = (ctx.exam_type, session_number);
            if !processed.insert(key) {
                continue;
            }

            let contributions = Contributions {
                image: None,
                crawled: None,
                deadline: Some(deadline),
            };
            merged.extend(build_record(ctx, key, &contributions));
        }
    }

    merged.sort_by_key(|record| record.key());

    debug!(
        image = image.len(),
        crawled = crawled.len(),
        internal = internal.len(),
        merged = merged.len(),
        "Merged schedule sources"
    );

    merged
}

/// Internal deadlines belong to the context exam type only
fn deadline_for<'a>(
    ctx: &MergeContext,
    (exam_type, session_number): SessionKey,
    internal: &'a [InternalDeadline],
) -> Option<&'a InternalDeadline> {
    if exam_type != ctx.exam_type {
        return None;
    }
    find_matching_deadline(session_number, internal)
}

fn resolve_image_session(fragment: &ScheduleFragment, crawled: &[GroupedSession]) -> Option<u32> {
    if let Some(n) = fragment.session_number {
        return Some(n);
    }
    let exam_date = fragment.exam_date?;
    crawled
        .iter()
        .find(|s| s.exam_type == fragment.exam_type && s.exam_date == exam_date)
        .map(|s| s.session_number)
}

fn build_record(
    ctx: &MergeContext,
    (exam_type, session_number): SessionKey,
    sources: &Contributions<'_>,
) -> Option<ComprehensiveSchedule> {
    let data_source = DataSource::from_contributions(
        sources.image.is_some(),
        sources.crawled.is_some(),
        sources.deadline.is_some(),
    )?;

    let image = sources.image;
    let crawled = sources.crawled;
    let deadline = sources.deadline;

    let year = image
        .map(|f| f.year)
        .or(crawled.map(|s| s.year))
        .unwrap_or(ctx.year);

    let (locations, region_codes) = match image.filter(|f| !f.locations.is_empty()) {
        Some(fragment) => {
            // Caller-supplied fragments may still carry region-group names
            let locations = expand_locations(&fragment.locations);
            let codes = locations
                .iter()
                .map(|name| {
                    region_by_name(name)
                        .map(|r| r.code.to_string())
                        .unwrap_or_default()
                })
                .collect();
            (locations, codes)
        }
        None => crawled
            .map(|s| (s.locations.clone(), s.region_codes.clone()))
            .unwrap_or_default(),
    };

    let notes = [
        image.map(|f| f.notes.as_str()),
        crawled.map(|s| s.notes.as_str()),
        deadline.map(|d| d.notes.as_str()),
    ]
    .into_iter()
    .flatten()
    .map(str::trim)
    .filter(|n| !n.is_empty())
    .collect::<Vec<_>>()
    .join(" | ");

    Some(ComprehensiveSchedule {
        year,
        exam_type,
        session_number,
        exam_date: image
            .and_then(|f| f.exam_date)
            .or(crawled.map(|s| s.exam_date)),
        exam_time_start: image
            .and_then(|f| f.exam_time_start)
            .or(crawled.and_then(|s| s.exam_time_start)),
        exam_time_end: image
            .and_then(|f| f.exam_time_end)
            .or(crawled.and_then(|s| s.exam_time_end)),
        locations,
        region_codes,
        registration_period: crawled
            .and_then(|s| s.registration_period.clone())
            .or(image.and_then(|f| f.registration_period.clone())),
        result_date: crawled
            .and_then(|s| s.result_date)
            .or(image.and_then(|f| f.result_date)),
        internal_deadline_date: deadline.map(|d| d.deadline_date),
        internal_deadline_time: deadline.and_then(|d| d.deadline_time),
        notice_date: deadline.and_then(|d| d.notice_date),
        notice_time: deadline.and_then(|d| d.notice_time),
        has_internal_deadline: deadline.is_some(),
        data_source,
        notes,
    })
}
