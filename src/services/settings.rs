// src/services/settings.rs
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Setting keys read by the extraction and crawl services
pub mod keys {
    pub const OPENAI_API_KEY: &str = "openai_api_key";
    pub const OPENAI_BASE_URL: &str = "openai_base_url";
    pub const OPENAI_MODEL_VISION: &str = "openai_model_vision";
    pub const OPENAI_MODEL_TEXT: &str = "openai_model_text";
    pub const EXAM_REGISTRY_BASE_URL: &str = "exam_registry_base_url";
    pub const EXAM_REGISTRY_SCHEDULE_PATH: &str = "exam_registry_schedule_path";
    pub const CRAWL_REQUEST_DELAY_MS: &str = "crawl_request_delay_ms";

    pub const ALL: &[&str] = &[
        OPENAI_API_KEY,
        OPENAI_BASE_URL,
        OPENAI_MODEL_VISION,
        OPENAI_MODEL_TEXT,
        EXAM_REGISTRY_BASE_URL,
        EXAM_REGISTRY_SCHEDULE_PATH,
        CRAWL_REQUEST_DELAY_MS,
    ];
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone)]
struct CachedSetting {
    value: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingEntry {
    pub key: String,
    pub value: String,
    pub updated_at: Option<String>,
    pub updated_by: Option<String>,
}

/// Runtime configuration stored in `system_settings`, cached with a TTL and
/// falling back to the upper-cased environment variable of the same name.
#[derive(Debug)]
pub struct SettingsService {
    db_pool: SqlitePool,
    cache: Arc<RwLock<HashMap<String, CachedSetting>>>,
    cache_ttl: Duration,
}

impl SettingsService {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self::with_ttl(db_pool, Duration::minutes(5))
    }

    pub fn with_ttl(db_pool: SqlitePool, cache_ttl: Duration) -> Self {
        Self {
            db_pool,
            cache: Arc::new(RwLock::new(HashMap::new())),
            cache_ttl,
        }
    }

    /// Get a setting value by key
    pub async fn get_setting(&self, key: &str) -> Result<Option<String>, SettingsError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(key) {
                if cached.expires_at > Utc::now() {
                    debug!(key = %key, "Setting retrieved from cache");
                    return Ok(Some(cached.value.clone()));
                }
            }
        }

        let row = sqlx::query_as::<_, (String,)>("SELECT value FROM system_settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.db_pool)
            .await?;

        if let Some((value,)) = row {
            let mut cache = self.cache.write().await;
            cache.insert(
                key.to_string(),
                CachedSetting {
                    value: value.clone(),
                    expires_at: Utc::now() + self.cache_ttl,
                },
            );
            debug!(key = %key, "Setting retrieved from database");
            return Ok(Some(value));
        }

        if let Ok(env_value) = env::var(key.to_uppercase()) {
            if !env_value.trim().is_empty() {
                debug!(key = %key, "Setting retrieved from environment variable");
                return Ok(Some(env_value));
            }
        }

        debug!(key = %key, "Setting not found");
        Ok(None)
    }

    /// Get a numeric setting, falling back to `default` when unset
    pub async fn get_u64(&self, key: &str, default: u64) -> Result<u64, SettingsError> {
        match self.get_setting(key).await? {
            None => Ok(default),
            Some(value) => value.trim().parse().map_err(|_| {
                warn!(key = %key, value = %value, "Numeric setting has invalid value");
                SettingsError::InvalidValue {
                    key: key.to_string(),
                    value,
                }
            }),
        }
    }

    /// Insert or update a setting
    pub async fn set_setting(
        &self,
        key: &str,
        value: &str,
        updated_by: Option<&str>,
    ) -> Result<(), SettingsError> {
        sqlx::query(
            r#"
            INSERT INTO system_settings (key, value, updated_at, updated_by)
            VALUES (?, ?, datetime('now'), ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at,
                updated_by = excluded.updated_by
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(updated_by)
        .execute(&self.db_pool)
        .await?;

        self.invalidate_cache_key(key).await;

        info!(key = %key, "Setting updated successfully");
        Ok(())
    }

    /// All stored settings; secrets are masked
    pub async fn list_settings(&self) -> Result<Vec<SettingEntry>, SettingsError> {
        let rows = sqlx::query_as::<_, (String, String, Option<String>, Option<String>)>(
            "SELECT key, value, updated_at, updated_by FROM system_settings ORDER BY key",
        )
        .fetch_all(&self.db_pool)
        .await?;

        let entries: Vec<SettingEntry> = rows
            .into_iter()
            .map(|(key, value, updated_at, updated_by)| {
                let value = if is_secret(&key) { mask_secret(&value) } else { value };
                SettingEntry {
                    key,
                    value,
                    updated_at,
                    updated_by,
                }
            })
            .collect();

        debug!(count = entries.len(), "Retrieved all settings");
        Ok(entries)
    }

    pub async fn invalidate_cache_key(&self, key: &str) {
        let mut cache = self.cache.write().await;
        cache.remove(key);
        debug!(key = %key, "Cache entry invalidated");
    }

    pub async fn delete_setting(&self, key: &str) -> Result<(), SettingsError> {
        sqlx::query("DELETE FROM system_settings WHERE key = ?")
            .bind(key)
            .execute(&self.db_pool)
            .await?;

        self.invalidate_cache_key(key).await;

        info!(key = %key, "Setting deleted");
        Ok(())
    }
}

fn is_secret(key: &str) -> bool {
    key.ends_with("_api_key") || key.ends_with("_secret")
}

fn mask_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        "***".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        crate::common::migrations::create_system_tables(&pool)
            .await
            .unwrap();

        pool
    }

    #[tokio::test]
    async fn test_set_and_get_setting() {
        let service = SettingsService::new(setup_test_db().await);

        service
            .set_setting("exam_registry_base_url", "https://registry.test", Some("admin"))
            .await
            .unwrap();

        let value = service.get_setting("exam_registry_base_url").await.unwrap();
        assert_eq!(value, Some("https://registry.test".to_string()));
    }

    #[tokio::test]
    async fn test_update_invalidates_cache() {
        let service = SettingsService::new(setup_test_db().await);

        service.set_setting("crawl_request_delay_ms", "500", None).await.unwrap();
        assert_eq!(service.get_u64("crawl_request_delay_ms", 1000).await.unwrap(), 500);

        service.set_setting("crawl_request_delay_ms", "250", None).await.unwrap();
        assert_eq!(service.get_u64("crawl_request_delay_ms", 1000).await.unwrap(), 250);
    }

    #[tokio::test]
    async fn test_numeric_setting_defaults_and_rejects_garbage() {
        let service = SettingsService::new(setup_test_db().await);

        assert_eq!(service.get_u64("schedule_test_unset_delay", 1000).await.unwrap(), 1000);

        service.set_setting("schedule_test_bad_delay", "soon", None).await.unwrap();
        assert!(matches!(
            service.get_u64("schedule_test_bad_delay", 1000).await,
            Err(SettingsError::InvalidValue { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_masks_api_keys() {
        let service = SettingsService::new(setup_test_db().await);

        service
            .set_setting("openai_api_key", "sk-test-1234567890", None)
            .await
            .unwrap();
        service.set_setting("openai_model_text", "gpt-4o-mini", None).await.unwrap();

        let entries = service.list_settings().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].key, "openai_api_key");
        assert_eq!(entries[0].value, "sk-t...7890");
        assert_eq!(entries[1].value, "gpt-4o-mini");
    }

    #[tokio::test]
    async fn test_delete_setting() {
        let service = SettingsService::new(setup_test_db().await);

        service.set_setting("schedule_test_delete_me", "value", None).await.unwrap();
        service.delete_setting("schedule_test_delete_me").await.unwrap();

        let value = service.get_setting("schedule_test_delete_me").await.unwrap();
        assert_eq!(value, None);
    }
}
