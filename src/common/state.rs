// Application state shared across all modules

use sqlx::SqlitePool;
use std::sync::Arc;

use crate::schedules::repository::ScheduleRepository;
use crate::services::{ExamRegistryCrawler, OpenAIService, SettingsService};

/// Application state containing database pool and services
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub settings_service: Arc<SettingsService>,
    pub openai_service: Arc<OpenAIService>,
    pub crawler: Arc<ExamRegistryCrawler>,
    pub schedules: ScheduleRepository,
}
