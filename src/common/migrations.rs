// src/common/migrations.rs
//! Database migration and schema management

use sqlx::SqlitePool;
use std::env;
use tracing::{info, warn};

use crate::services::settings::keys;

/// Run all database migrations
///
/// Tables are created if missing. With RESET_DB=true they are dropped first.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let should_reset_db = env::var("RESET_DB").unwrap_or_else(|_| "false".to_string()) == "true";

    if should_reset_db {
        warn!("⚠️  RESET_DB=true - Dropping all tables and recreating schema...");
        drop_all_tables(pool).await?;
        info!("✅ Dropped old tables");
    } else {
        info!("ℹ️  Skipping table drop (RESET_DB not set). Tables will be created if they don't exist.");
    }

    create_system_tables(pool).await?;
    create_schedule_tables(pool).await?;
    create_indexes(pool).await?;

    init_default_settings(pool).await?;

    info!("✅ Database migration completed successfully!");

    Ok(())
}

/// Copies settings from environment variables into `system_settings`.
/// Existing rows are left alone.
async fn init_default_settings(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let env_settings = [
        (keys::OPENAI_API_KEY, "OPENAI_API_KEY"),
        (keys::OPENAI_BASE_URL, "OPENAI_BASE_URL"),
        (keys::OPENAI_MODEL_VISION, "OPENAI_MODEL_VISION"),
        (keys::OPENAI_MODEL_TEXT, "OPENAI_MODEL_TEXT"),
        (keys::EXAM_REGISTRY_BASE_URL, "EXAM_REGISTRY_BASE_URL"),
        (keys::EXAM_REGISTRY_SCHEDULE_PATH, "EXAM_REGISTRY_SCHEDULE_PATH"),
        (keys::CRAWL_REQUEST_DELAY_MS, "CRAWL_REQUEST_DELAY_MS"),
    ];

    for (db_key, env_key) in env_settings {
        let Ok(value) = env::var(env_key) else {
            continue;
        };
        if value.trim().is_empty() {
            continue;
        }

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO system_settings (key, value, updated_at, updated_by)
            VALUES (?, ?, datetime('now'), 'system')
            "#,
        )
        .bind(db_key)
        .bind(&value)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            info!(key = %db_key, "Initialized setting from environment variable");
        }
    }

    Ok(())
}

async fn drop_all_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let tables = ["exam_schedules", "system_settings"];

    for table in tables {
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
            .execute(pool)
            .await?;
    }

    Ok(())
}

pub async fn create_system_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS system_settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            description TEXT,
            updated_at TEXT DEFAULT (datetime('now')),
            updated_by TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// One row per (year, exam type, session). Locations and region codes are
/// JSON arrays; dates are "YYYY-MM-DD" and times "HH:MM".
pub async fn create_schedule_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS exam_schedules (
            id TEXT PRIMARY KEY,
            year INTEGER NOT NULL,
            exam_type TEXT NOT NULL,
            session_number INTEGER NOT NULL,
            exam_date TEXT,
            exam_time_start TEXT,
            exam_time_end TEXT,
            locations TEXT NOT NULL DEFAULT '[]',
            region_codes TEXT NOT NULL DEFAULT '[]',
            registration_period TEXT,
            result_date TEXT,
            internal_deadline_date TEXT,
            internal_deadline_time TEXT,
            notice_date TEXT,
            notice_time TEXT,
            has_internal_deadline INTEGER NOT NULL DEFAULT 0,
            data_source TEXT NOT NULL,
            notes TEXT NOT NULL DEFAULT '',
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now')),
            UNIQUE(year, exam_type, session_number)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_indexes(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_exam_schedules_year_type ON exam_schedules(year, exam_type)",
        "CREATE INDEX IF NOT EXISTS idx_exam_schedules_exam_date ON exam_schedules(exam_date)",
    ];

    for index in indexes {
        sqlx::query(index).execute(pool).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    #[tokio::test]
    async fn test_migrations_are_repeatable() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('exam_schedules', 'system_settings')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 2);
    }
}
