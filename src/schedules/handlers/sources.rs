// src/schedules/handlers/sources.rs
//! Single-source endpoints: registry crawl, image extraction, deadline text

use axum::{extract::Multipart, response::IntoResponse, Extension, Json};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::forms::read_parse_image_form;
use crate::common::helpers::truncate_for_log;
use crate::common::{ApiError, AppState, Validator};
use crate::schedules::deadlines::parse_internal_deadlines;
use crate::schedules::extraction::{parse_deadline_response, parse_image_response, ImageExtraction};
use crate::schedules::grouping::group_by_date;
use crate::schedules::models::{CrawlRequest, ExamType, InternalDeadline, ParseInternalRequest};
use crate::schedules::validators::{detect_image_mime, ScheduleRequestValidator};
use crate::services::OpenAIService;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadlineMethod {
    Rules,
    Ai,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseInternalResponse {
    pub deadlines: Vec<InternalDeadline>,
    pub method: DeadlineMethod,
    pub count: usize,
}

// ============================================================================
// Shared extraction steps
// ============================================================================

/// Rule-based parse first; the text model is asked only when the rules find
/// nothing and `allow_ai` is set.
pub async fn resolve_deadlines(
    openai: &OpenAIService,
    text: &str,
    year: i32,
    allow_ai: bool,
) -> Result<(Vec<InternalDeadline>, DeadlineMethod), ApiError> {
    let deadlines = parse_internal_deadlines(text, year);
    if !deadlines.is_empty() || !allow_ai {
        return Ok((deadlines, DeadlineMethod::Rules));
    }

    info!(
        text = %truncate_for_log(text, 40),
        "No deadline lines matched; asking text model"
    );
    let raw = openai.extract_deadlines_text(text, year).await?;
    let deadlines = parse_deadline_response(&raw, year)?;
    Ok((deadlines, DeadlineMethod::Ai))
}

/// Sends an already validated image to the vision model and normalizes its answer
pub async fn extract_image(
    openai: &OpenAIService,
    bytes: &[u8],
    year: i32,
    exam_type: ExamType,
) -> Result<ImageExtraction, ApiError> {
    let mime_type = detect_image_mime(bytes)
        .ok_or_else(|| ApiError::BadRequest("Invalid image type".to_string()))?;

    let raw = openai
        .extract_schedule_image(bytes, mime_type, year, exam_type.as_str())
        .await?;
    let extraction = parse_image_response(&raw, year, exam_type)?;

    if extraction.schedules.is_empty() {
        warn!(year = year, exam_type = %exam_type, "Image extraction found no schedules");
    }
    Ok(extraction)
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/health - Liveness check including the database
pub async fn health_check(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
) -> impl IntoResponse {
    let db = state_lock.read().await.db.clone();
    let database = match sqlx::query("SELECT 1").execute(&db).await {
        Ok(_) => "ok",
        Err(e) => {
            warn!(error = %e, "Health check database ping failed");
            "unavailable"
        }
    };

    Json(json!({
        "status": "ok",
        "database": database,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// POST /api/admin/exam-schedules/crawl - Crawl one month and group by date
pub async fn crawl_schedules(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Json(req): Json<CrawlRequest>,
) -> Result<impl IntoResponse, ApiError> {
    ScheduleRequestValidator.validate(&req).into_result()?;

    let crawler = state_lock.read().await.crawler.clone();
    let report = crawler.crawl_month(req.year, req.month, req.exam_type).await?;
    let grouped_sessions = group_by_date(&report.fragments);

    info!(
        year = req.year,
        month = req.month,
        exam_type = %req.exam_type,
        sessions = grouped_sessions.len(),
        "Crawl grouped into sessions"
    );

    Ok(Json(json!({
        "year": req.year,
        "month": req.month,
        "examType": req.exam_type,
        "fragmentCount": report.fragments.len(),
        "groupedSessions": grouped_sessions,
        "failedRegions": report.failed_regions,
        "partial": report.is_partial(),
    })))
}

/// POST /api/admin/exam-schedules/parse-image - Extract schedules from an image
pub async fn parse_schedule_image(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let form = read_parse_image_form(multipart).await?;
    ScheduleRequestValidator.validate(&form).into_result()?;

    let openai = state_lock.read().await.openai_service.clone();
    let extraction = extract_image(&openai, &form.image.bytes, form.year, form.exam_type).await?;

    info!(
        year = form.year,
        exam_type = %form.exam_type,
        schedules = extraction.schedules.len(),
        "Schedule image parsed"
    );

    Ok(Json(extraction))
}

/// POST /api/admin/exam-schedules/parse-internal - Parse internal deadline text
pub async fn parse_internal(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Json(req): Json<ParseInternalRequest>,
) -> Result<impl IntoResponse, ApiError> {
    ScheduleRequestValidator.validate(&req).into_result()?;

    let openai = state_lock.read().await.openai_service.clone();
    let (deadlines, method) =
        resolve_deadlines(&openai, &req.text, req.year, req.use_ai_fallback).await?;

    info!(
        year = req.year,
        method = ?method,
        deadlines = deadlines.len(),
        "Internal deadlines parsed"
    );

    Ok(Json(ParseInternalResponse {
        count: deadlines.len(),
        deadlines,
        method,
    }))
}
