// src/schedules/handlers/reconcile.rs
//! Merge, comprehensive reconciliation and persistence endpoints

use axum::{
    extract::{Multipart, Query},
    response::IntoResponse,
    Extension, Json,
};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::forms::read_comprehensive_form;
use super::sources::{extract_image, resolve_deadlines};
use crate::common::{ApiError, AppState, Validator};
use crate::schedules::merge::{merge_schedules, MergeContext};
use crate::schedules::models::{
    ComprehensiveSchedule, DeleteSchedulesQuery, FragmentSource, ListSchedulesQuery, MergeRequest,
    SaveRequest,
};
use crate::schedules::pipeline::{reconcile, ReconciliationReport, SourceOutcome};
use crate::schedules::repository::UpsertSummary;
use crate::schedules::validators::ScheduleRequestValidator;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComprehensiveResponse {
    #[serde(flatten)]
    pub report: ReconciliationReport,
    pub saved: Option<UpsertSummary>,
}

/// Record count per provenance label
fn source_breakdown(schedules: &[ComprehensiveSchedule]) -> BTreeMap<&'static str, usize> {
    let mut counts = BTreeMap::new();
    for schedule in schedules {
        *counts.entry(schedule.data_source.as_str()).or_insert(0) += 1;
    }
    counts
}

/// POST /api/admin/exam-schedules/merge - Merge caller-supplied streams
pub async fn merge_streams(Json(mut req): Json<MergeRequest>) -> Result<impl IntoResponse, ApiError> {
    ScheduleRequestValidator.validate(&req).into_result()?;

    for fragment in &mut req.image_schedules {
        fragment.source = FragmentSource::Image;
    }

    let ctx = MergeContext {
        year: req.year,
        exam_type: req.exam_type,
    };
    let schedules = merge_schedules(
        &ctx,
        &req.image_schedules,
        &req.crawled_sessions,
        &req.internal_deadlines,
    );

    Ok(Json(json!({
        "count": schedules.len(),
        "bySource": source_breakdown(&schedules),
        "schedules": schedules,
    })))
}

/// POST /api/admin/exam-schedules/comprehensive - Run every supplied source,
/// merge, and optionally save
pub async fn run_comprehensive(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let form = read_comprehensive_form(multipart).await?;
    ScheduleRequestValidator.validate(&form).into_result()?;

    let (crawler, openai, repository) = {
        let state = state_lock.read().await;
        (
            state.crawler.clone(),
            state.openai_service.clone(),
            state.schedules.clone(),
        )
    };

    let crawl_source = async {
        if form.months.is_empty() {
            return SourceOutcome::Skipped;
        }
        SourceOutcome::from_result(
            crawler
                .crawl_months(form.year, &form.months, form.exam_type)
                .await,
        )
    };

    let image_source = async {
        match &form.image {
            None => SourceOutcome::Skipped,
            Some(image) => SourceOutcome::from_result(
                extract_image(&openai, &image.bytes, form.year, form.exam_type).await,
            ),
        }
    };

    let internal_source = async {
        match &form.internal_text {
            None => SourceOutcome::Skipped,
            Some(text) => match resolve_deadlines(&openai, text, form.year, true).await {
                Ok((deadlines, _)) if deadlines.is_empty() => {
                    SourceOutcome::Failed("No internal deadlines found in text".to_string())
                }
                Ok((deadlines, _)) => SourceOutcome::Succeeded(deadlines),
                Err(e) => SourceOutcome::Failed(e.to_string()),
            },
        }
    };

    let (crawl, image, internal) = tokio::join!(crawl_source, image_source, internal_source);

    let ctx = MergeContext {
        year: form.year,
        exam_type: form.exam_type,
    };
    let report = reconcile(ctx, crawl, image, internal);

    let saved = if form.save && !report.schedules.is_empty() {
        Some(repository.upsert_all(&report.schedules).await?)
    } else {
        None
    };

    info!(
        reconciliation_id = %report.reconciliation_id,
        schedules = report.schedules.len(),
        failed_sources = ?report.failed_sources().collect::<Vec<_>>(),
        saved = saved.is_some(),
        "Comprehensive reconciliation completed"
    );

    Ok(Json(ComprehensiveResponse { report, saved }))
}

/// POST /api/admin/exam-schedules/save - Upsert reconciled schedules
pub async fn save_schedules(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Json(req): Json<SaveRequest>,
) -> Result<impl IntoResponse, ApiError> {
    ScheduleRequestValidator.validate(&req).into_result()?;

    let repository = state_lock.read().await.schedules.clone();
    let summary = repository.upsert_all(&req.schedules).await?;

    Ok(Json(json!({
        "message": "Schedules saved successfully",
        "inserted": summary.inserted,
        "updated": summary.updated,
    })))
}

/// GET /api/exam-schedules?year=2025&examType=생보 - List stored schedules
pub async fn list_schedules(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Query(query): Query<ListSchedulesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if !(2000..=2100).contains(&query.year) {
        return Err(ApiError::ValidationError(
            "year: Year must be between 2000 and 2100".to_string(),
        ));
    }

    let repository = state_lock.read().await.schedules.clone();
    let schedules = repository.list(query.year, query.exam_type).await?;

    Ok(Json(json!({
        "year": query.year,
        "count": schedules.len(),
        "schedules": schedules,
    })))
}

/// DELETE /api/admin/exam-schedules?year=2025 - Remove a year's stored schedules
pub async fn delete_schedules(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Query(query): Query<DeleteSchedulesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if !(2000..=2100).contains(&query.year) {
        return Err(ApiError::ValidationError(
            "year: Year must be between 2000 and 2100".to_string(),
        ));
    }

    let repository = state_lock.read().await.schedules.clone();
    let deleted = repository.delete_year(query.year).await?;
    warn!(year = query.year, deleted = deleted, "Stored schedules deleted");

    Ok(Json(json!({
        "message": "Schedules deleted",
        "year": query.year,
        "deleted": deleted,
    })))
}
