// src/schedules/repository.rs
//! Persistence of reconciled schedules in `exam_schedules`

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use super::models::{ComprehensiveSchedule, ExamType};
use crate::common::helpers::format_clock_time;

// ============================================================================
// Row Models
// ============================================================================

#[derive(FromRow, Debug)]
pub struct ExamScheduleRow {
    pub id: String,
    pub year: i64,
    pub exam_type: String,
    pub session_number: i64,
    pub exam_date: Option<String>,
    pub exam_time_start: Option<String>,
    pub exam_time_end: Option<String>,
    pub locations: String,    // JSON array
    pub region_codes: String, // JSON array
    pub registration_period: Option<String>,
    pub result_date: Option<String>,
    pub internal_deadline_date: Option<String>,
    pub internal_deadline_time: Option<String>,
    pub notice_date: Option<String>,
    pub notice_time: Option<String>,
    pub has_internal_deadline: i64, // 0 or 1 in SQLite
    pub data_source: String,
    pub notes: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// A persisted schedule as returned by the list endpoint
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StoredSchedule {
    pub id: String,
    pub year: i32,
    pub exam_type: String,
    pub session_number: u32,
    pub exam_date: Option<String>,
    pub exam_time_start: Option<String>,
    pub exam_time_end: Option<String>,
    pub locations: Vec<String>,
    pub region_codes: Vec<String>,
    pub registration_period: Option<String>,
    pub result_date: Option<String>,
    pub internal_deadline_date: Option<String>,
    pub internal_deadline_time: Option<String>,
    pub notice_date: Option<String>,
    pub notice_time: Option<String>,
    pub has_internal_deadline: bool,
    pub data_source: String,
    pub notes: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl From<ExamScheduleRow> for StoredSchedule {
    fn from(row: ExamScheduleRow) -> Self {
        Self {
            id: row.id,
            year: row.year as i32,
            exam_type: row.exam_type,
            session_number: row.session_number as u32,
            exam_date: row.exam_date,
            exam_time_start: row.exam_time_start,
            exam_time_end: row.exam_time_end,
            locations: serde_json::from_str(&row.locations).unwrap_or_default(),
            region_codes: serde_json::from_str(&row.region_codes).unwrap_or_default(),
            registration_period: row.registration_period,
            result_date: row.result_date,
            internal_deadline_date: row.internal_deadline_date,
            internal_deadline_time: row.internal_deadline_time,
            notice_date: row.notice_date,
            notice_time: row.notice_time,
            has_internal_deadline: row.has_internal_deadline != 0,
            data_source: row.data_source,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Serialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpsertSummary {
    pub inserted: usize,
    pub updated: usize,
}

fn format_date(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format("%Y-%m-%d").to_string())
}

// ============================================================================
// Repository
// ============================================================================

#[derive(Debug, Clone)]
pub struct ScheduleRepository {
    pool: SqlitePool,
}

impl ScheduleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Writes every schedule in one transaction, keyed by
    /// (year, exam_type, session_number). Re-running with the same input
    /// updates rows in place and never duplicates them.
    pub async fn upsert_all(
        &self,
        schedules: &[ComprehensiveSchedule],
    ) -> Result<UpsertSummary, sqlx::Error> {
        let mut summary = UpsertSummary::default();
        let mut tx = self.pool.begin().await?;

        for schedule in schedules {
            let existing: Option<(String,)> = sqlx::query_as(
                "SELECT id FROM exam_schedules WHERE year = ? AND exam_type = ? AND session_number = ?",
            )
            .bind(schedule.year)
            .bind(schedule.exam_type.as_str())
            .bind(schedule.session_number)
            .fetch_optional(&mut *tx)
            .await?;

            let locations =
                serde_json::to_string(&schedule.locations).unwrap_or_else(|_| "[]".to_string());
            let region_codes =
                serde_json::to_string(&schedule.region_codes).unwrap_or_else(|_| "[]".to_string());

            sqlx::query(
                r#"
                INSERT INTO exam_schedules (
                    id, year, exam_type, session_number, exam_date, exam_time_start, exam_time_end,
                    locations, region_codes, registration_period, result_date,
                    internal_deadline_date, internal_deadline_time, notice_date, notice_time,
                    has_internal_deadline, data_source, notes, created_at, updated_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now'), datetime('now'))
                ON CONFLICT(year, exam_type, session_number) DO UPDATE SET
                    exam_date = excluded.exam_date,
                    exam_time_start = excluded.exam_time_start,
                    exam_time_end = excluded.exam_time_end,
                    locations = excluded.locations,
                    region_codes = excluded.region_codes,
                    registration_period = excluded.registration_period,
                    result_date = excluded.result_date,
                    internal_deadline_date = excluded.internal_deadline_date,
                    internal_deadline_time = excluded.internal_deadline_time,
                    notice_date = excluded.notice_date,
                    notice_time = excluded.notice_time,
                    has_internal_deadline = excluded.has_internal_deadline,
                    data_source = excluded.data_source,
                    notes = excluded.notes,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(schedule.year)
            .bind(schedule.exam_type.as_str())
            .bind(schedule.session_number)
            .bind(format_date(schedule.exam_date))
            .bind(schedule.exam_time_start.as_ref().map(format_clock_time))
            .bind(schedule.exam_time_end.as_ref().map(format_clock_time))
            .bind(locations)
            .bind(region_codes)
            .bind(&schedule.registration_period)
            .bind(format_date(schedule.result_date))
            .bind(format_date(schedule.internal_deadline_date))
            .bind(schedule.internal_deadline_time.as_ref().map(format_clock_time))
            .bind(format_date(schedule.notice_date))
            .bind(schedule.notice_time.as_ref().map(format_clock_time))
            .bind(schedule.has_internal_deadline)
            .bind(schedule.data_source.persisted().as_str())
            .bind(&schedule.notes)
            .execute(&mut *tx)
            .await?;

            if existing.is_some() {
                summary.updated += 1;
            } else {
                summary.inserted += 1;
            }
        }

        tx.commit().await?;

        info!(
            inserted = summary.inserted,
            updated = summary.updated,
            "Exam schedules saved"
        );
        Ok(summary)
    }

    pub async fn list(
        &self,
        year: i32,
        exam_type: Option<ExamType>,
    ) -> Result<Vec<StoredSchedule>, sqlx::Error> {
        let rows = match exam_type {
            Some(exam_type) => {
                sqlx::query_as::<_, ExamScheduleRow>(
                    "SELECT * FROM exam_schedules WHERE year = ? AND exam_type = ? ORDER BY session_number",
                )
                .bind(year)
                .bind(exam_type.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, ExamScheduleRow>(
                    "SELECT * FROM exam_schedules WHERE year = ? ORDER BY exam_type, session_number",
                )
                .bind(year)
                .fetch_all(&self.pool)
                .await?
            }
        };

        debug!(year = year, rows = rows.len(), "Listed exam schedules");
        Ok(rows.into_iter().map(StoredSchedule::from).collect())
    }

    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM exam_schedules")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn delete_year(&self, year: i32) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM exam_schedules WHERE year = ?")
            .bind(year)
            .execute(&self.pool)
            .await?;

        info!(year = year, deleted = result.rows_affected(), "Exam schedules deleted");
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedules::models::DataSource;
    use chrono::NaiveTime;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_repository() -> ScheduleRepository {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        crate::common::migrations::create_schedule_tables(&pool)
            .await
            .unwrap();

        ScheduleRepository::new(pool)
    }

    fn schedule(session_number: u32, data_source: DataSource) -> ComprehensiveSchedule {
        ComprehensiveSchedule {
            year: 2025,
            exam_type: ExamType::Life,
            session_number,
            exam_date: NaiveDate::from_ymd_opt(2025, 11, 10),
            exam_time_start: NaiveTime::from_hms_opt(10, 0, 0),
            exam_time_end: NaiveTime::from_hms_opt(11, 40, 0),
            locations: vec!["서울".to_string(), "부산".to_string()],
            region_codes: vec!["01".to_string(), "04".to_string()],
            registration_period: Some("10.20 ~ 10.24".to_string()),
            result_date: NaiveDate::from_ymd_opt(2025, 11, 14),
            internal_deadline_date: NaiveDate::from_ymd_opt(2025, 10, 1),
            internal_deadline_time: NaiveTime::from_hms_opt(14, 0, 0),
            notice_date: None,
            notice_time: None,
            has_internal_deadline: true,
            data_source,
            notes: String::new(),
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let repo = setup_repository().await;
        let batch = vec![
            schedule(1, DataSource::ComprehensiveMatch),
            schedule(2, DataSource::CrawledOnly),
        ];

        let first = repo.upsert_all(&batch).await.unwrap();
        assert_eq!(first, UpsertSummary { inserted: 2, updated: 0 });

        let second = repo.upsert_all(&batch).await.unwrap();
        assert_eq!(second, UpsertSummary { inserted: 0, updated: 2 });

        assert_eq!(repo.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_stored_fields_round_trip() {
        let repo = setup_repository().await;
        repo.upsert_all(&[schedule(1, DataSource::ImageCrawled)])
            .await
            .unwrap();

        let stored = repo.list(2025, Some(ExamType::Life)).await.unwrap();
        assert_eq!(stored.len(), 1);

        let row = &stored[0];
        assert_eq!(row.exam_type, "생보");
        assert_eq!(row.exam_date.as_deref(), Some("2025-11-10"));
        assert_eq!(row.exam_time_start.as_deref(), Some("10:00"));
        assert_eq!(row.internal_deadline_time.as_deref(), Some("14:00"));
        assert_eq!(row.locations, vec!["서울".to_string(), "부산".to_string()]);
        assert!(row.has_internal_deadline);
        assert_eq!(row.data_source, "combined");
    }

    #[tokio::test]
    async fn test_update_replaces_provenance() {
        let repo = setup_repository().await;
        repo.upsert_all(&[schedule(3, DataSource::InternalOnly)])
            .await
            .unwrap();
        repo.upsert_all(&[schedule(3, DataSource::CrawledOnly)])
            .await
            .unwrap();

        let stored = repo.list(2025, None).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].data_source, "official_only");
    }

    #[tokio::test]
    async fn test_list_filters_and_delete_year() {
        let repo = setup_repository().await;
        let mut non_life = schedule(1, DataSource::CrawledOnly);
        non_life.exam_type = ExamType::NonLife;
        let mut other_year = schedule(1, DataSource::CrawledOnly);
        other_year.year = 2024;

        repo.upsert_all(&[schedule(1, DataSource::CrawledOnly), non_life, other_year])
            .await
            .unwrap();

        assert_eq!(repo.list(2025, None).await.unwrap().len(), 2);
        assert_eq!(repo.list(2025, Some(ExamType::NonLife)).await.unwrap().len(), 1);

        assert_eq!(repo.delete_year(2025).await.unwrap(), 2);
        assert_eq!(repo.count().await.unwrap(), 1);
    }
}
