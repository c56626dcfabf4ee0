// src/schedules/routes.rs

use axum::{
    routing::{delete, get, post},
    Router,
};

use super::handlers;

/// Create the exam schedule router
pub fn schedules_routes() -> Router {
    Router::new()
        .route("/api/health", get(handlers::health_check))
        // Single-source extraction
        .route("/api/admin/exam-schedules/crawl", post(handlers::crawl_schedules))
        .route(
            "/api/admin/exam-schedules/parse-image",
            post(handlers::parse_schedule_image),
        )
        .route(
            "/api/admin/exam-schedules/parse-internal",
            post(handlers::parse_internal),
        )
        // Reconciliation and persistence
        .route("/api/admin/exam-schedules/merge", post(handlers::merge_streams))
        .route(
            "/api/admin/exam-schedules/comprehensive",
            post(handlers::run_comprehensive),
        )
        .route("/api/admin/exam-schedules/save", post(handlers::save_schedules))
        .route("/api/admin/exam-schedules", delete(handlers::delete_schedules))
        // Public
        .route("/api/exam-schedules", get(handlers::list_schedules))
}
