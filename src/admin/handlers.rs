// src/admin/handlers.rs

use axum::{
    extract::{Extension, Path},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::common::helpers::truncate_for_log;
use crate::common::{ApiError, AppState};
use crate::services::settings::{keys, SettingEntry};

#[derive(Debug, Deserialize)]
pub struct UpdateSettingsRequest {
    pub settings: HashMap<String, String>,
    #[serde(default)]
    pub updated_by: Option<String>,
}

fn check_known_key(key: &str) -> Result<(), ApiError> {
    if keys::ALL.contains(&key) {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!("Unknown setting key: {}", key)))
    }
}

/// GET /api/admin/settings - List stored settings with secrets masked
pub async fn get_system_settings(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
) -> Result<Json<Vec<SettingEntry>>, ApiError> {
    let settings = state_lock.read().await.settings_service.clone();

    let entries = settings.list_settings().await.map_err(|e| {
        error!(error = %e, "Error fetching system settings");
        ApiError::InternalServer(format!("Failed to fetch settings: {}", e))
    })?;

    Ok(Json(entries))
}

/// PUT /api/admin/settings - Update one or more settings
pub async fn update_system_settings(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Json(request): Json<UpdateSettingsRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if request.settings.is_empty() {
        return Err(ApiError::BadRequest("No settings provided".to_string()));
    }
    for key in request.settings.keys() {
        check_known_key(key)?;
    }

    let settings = state_lock.read().await.settings_service.clone();

    for (key, value) in &request.settings {
        if value.trim().is_empty() {
            warn!(key = %key, "Rejected empty setting value");
            return Err(ApiError::ValidationError(format!(
                "{}: Value must not be empty",
                key
            )));
        }

        settings
            .set_setting(key, value.trim(), request.updated_by.as_deref())
            .await
            .map_err(|e| {
                error!(key = %key, error = %e, "Error updating setting");
                ApiError::InternalServer(format!("Failed to update setting {}: {}", key, e))
            })?;
    }

    info!(
        settings_count = request.settings.len(),
        "System settings updated successfully"
    );

    Ok(Json(json!({
        "message": "Settings updated successfully",
        "updated": request.settings.len(),
    })))
}

/// DELETE /api/admin/settings/:key - Remove a stored value so the
/// environment fallback applies again
pub async fn delete_system_setting(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Path(key): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    check_known_key(&key)?;

    let settings = state_lock.read().await.settings_service.clone();
    settings.delete_setting(&key).await.map_err(|e| {
        error!(key = %key, error = %e, "Error deleting setting");
        ApiError::InternalServer(format!("Failed to delete setting {}: {}", key, e))
    })?;

    Ok(Json(json!({
        "message": "Setting deleted",
        "key": key,
    })))
}

/// POST /api/admin/settings/test-openai - Round-trip a tiny completion
pub async fn test_openai_connection(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let openai = state_lock.read().await.openai_service.clone();

    match openai.test_connection().await {
        Ok(reply) => {
            info!("OpenAI connection test succeeded");
            Ok(Json(json!({
                "success": true,
                "reply": truncate_for_log(&reply, 200),
            })))
        }
        Err(e) => {
            warn!(error = %e, "OpenAI connection test failed");
            Ok(Json(json!({
                "success": false,
                "error": e.to_string(),
            })))
        }
    }
}
