// src/schedules/pipeline.rs
//! Full reconciliation: crawl grouping, image and internal sources, merge.
//! Each source is failable on its own; a failed source is reported and the
//! merge runs on what remains.

use crate::schedules::extraction::ImageExtraction;
use crate::schedules::grouping::group_by_date;
use crate::schedules::merge::{merge_schedules, MergeContext};
use crate::schedules::models::{
    ComprehensiveSchedule, GroupedSession, InternalDeadline, ScheduleFragment,
};
use crate::services::crawler::{CrawlReport, FailedRegion};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Crawl,
    Image,
    Internal,
}

/// What happened to one input source
#[derive(Debug, Clone)]
pub enum SourceOutcome<T> {
    /// The caller did not supply this source
    Skipped,
    Succeeded(T),
    Failed(String),
}

impl<T> SourceOutcome<T> {
    pub fn from_result<E: std::fmt::Display>(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => SourceOutcome::Succeeded(value),
            Err(e) => SourceOutcome::Failed(e.to_string()),
        }
    }

    fn status(&self, source: SourceKind, records: usize) -> SourceStatus {
        let (state, error) = match self {
            SourceOutcome::Skipped => (SourceState::Skipped, None),
            SourceOutcome::Succeeded(_) => (SourceState::Succeeded, None),
            SourceOutcome::Failed(reason) => (SourceState::Failed, Some(reason.clone())),
        };
        SourceStatus {
            source,
            state,
            records,
            error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceState {
    Skipped,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStatus {
    pub source: SourceKind,
    pub state: SourceState,
    pub records: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    pub reconciliation_id: String,
    pub year: i32,
    pub exam_type: String,
    pub schedules: Vec<ComprehensiveSchedule>,
    pub grouped_sessions: Vec<GroupedSession>,
    pub sources: Vec<SourceStatus>,
    pub failed_regions: Vec<FailedRegion>,
    pub warnings: Vec<String>,
}

impl ReconciliationReport {
    pub fn failed_sources(&self) -> impl Iterator<Item = SourceKind> + '_ {
        self.sources
            .iter()
            .filter(|s| s.state == SourceState::Failed)
            .map(|s| s.source)
    }
}

/// Merges whatever the three sources produced. Never fails: missing or
/// failed sources only reduce the output and add warnings.
pub fn reconcile(
    ctx: MergeContext,
    crawl: SourceOutcome<CrawlReport>,
    image: SourceOutcome<ImageExtraction>,
    internal: SourceOutcome<Vec<InternalDeadline>>,
) -> ReconciliationReport {
    let mut warnings = Vec::new();

    let (grouped_sessions, failed_regions) = match &crawl {
        SourceOutcome::Succeeded(report) => {
            if report.is_partial() {
                let names: Vec<&str> = report
                    .failed_regions
                    .iter()
                    .map(|r| r.region_name.as_str())
                    .collect();
                warnings.push(format!(
                    "크롤링 실패 지역 {}곳: {}",
                    names.len(),
                    names.join(", ")
                ));
            }
            let matching: Vec<_> = report
                .fragments
                .iter()
                .filter(|f| f.exam_type == ctx.exam_type)
                .cloned()
                .collect();
            (group_by_date(&matching), report.failed_regions.clone())
        }
        _ => (Vec::new(), Vec::new()),
    };

    let image_fragments: &[ScheduleFragment] = match &image {
        SourceOutcome::Succeeded(extraction) => extraction.schedules.as_slice(),
        _ => &[],
    };
    let deadlines: &[InternalDeadline] = match &internal {
        SourceOutcome::Succeeded(deadlines) => deadlines.as_slice(),
        _ => &[],
    };

    let sources = vec![
        crawl.status(SourceKind::Crawl, grouped_sessions.len()),
        image.status(SourceKind::Image, image_fragments.len()),
        internal.status(SourceKind::Internal, deadlines.len()),
    ];

    for status in &sources {
        if let Some(error) = &status.error {
            warn!(source = ?status.source, error = %error, "Source failed; merging without it");
            warnings.push(format!("{:?} source failed: {}", status.source, error));
        }
    }

    let schedules = merge_schedules(&ctx, image_fragments, &grouped_sessions, deadlines);
    if schedules.is_empty() {
        warnings.push("병합 결과가 없습니다".to_string());
    }

    let report = ReconciliationReport {
        reconciliation_id: Uuid::new_v4().to_string(),
        year: ctx.year,
        exam_type: ctx.exam_type.as_str().to_string(),
        schedules,
        grouped_sessions,
        sources,
        failed_regions,
        warnings,
    };

    info!(
        reconciliation_id = %report.reconciliation_id,
        schedules = report.schedules.len(),
        warnings = report.warnings.len(),
        "Reconciliation finished"
    );

    report
}
