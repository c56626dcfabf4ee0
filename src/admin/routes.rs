// src/admin/routes.rs

use axum::{
    routing::{delete, get, post},
    Router,
};

use super::handlers;

/// Create the admin settings router
pub fn admin_routes() -> Router {
    Router::new()
        .route(
            "/api/admin/settings",
            get(handlers::get_system_settings).put(handlers::update_system_settings),
        )
        .route("/api/admin/settings/:key", delete(handlers::delete_system_setting))
        .route(
            "/api/admin/settings/test-openai",
            post(handlers::test_openai_connection),
        )
}
