// src/services/crawler.rs
use crate::common::helpers::{parse_clock_time, parse_loose_date};
use crate::schedules::models::{ExamType, ScheduleFragment};
use crate::schedules::regions::{all_regions, Region};
use crate::services::settings::{keys, SettingsService};
use chrono::Datelike;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_SCHEDULE_PATH: &str = "/exam/schedule";
const DEFAULT_REQUEST_DELAY_MS: u64 = 1000;

#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    #[error("Exam registry base URL not configured")]
    NotConfigured,

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Registry returned HTTP {0}")]
    HttpStatus(u16),

    #[error("Schedule markup not recognised: {0}")]
    Markup(String),

    #[error("Settings error: {0}")]
    SettingsError(String),
}

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub base_url: String,
    pub schedule_path: String,
    pub request_delay: Duration,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedRegion {
    pub region_code: String,
    pub region_name: String,
    pub month: u32,
    pub reason: String,
}

/// Result of crawling every region for one month. A region that could not
/// be fetched or parsed is listed in `failed_regions`, never silently empty.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlReport {
    pub fragments: Vec<ScheduleFragment>,
    pub failed_regions: Vec<FailedRegion>,
    pub regions_crawled: usize,
}

impl CrawlReport {
    pub fn is_partial(&self) -> bool {
        !self.failed_regions.is_empty()
    }

    fn absorb(&mut self, mut other: CrawlReport) {
        self.fragments.append(&mut other.fragments);
        self.failed_regions.append(&mut other.failed_regions);
        self.regions_crawled += other.regions_crawled;
    }
}

#[derive(Debug)]
pub struct ExamRegistryCrawler {
    settings_service: Arc<SettingsService>,
    client: Client,
}

impl ExamRegistryCrawler {
    pub fn new(settings_service: Arc<SettingsService>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("exam-schedule-api/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            settings_service,
            client,
        }
    }

    pub async fn get_config(&self) -> Result<CrawlConfig, CrawlError> {
        let settings_err = |e: crate::services::settings::SettingsError| {
            CrawlError::SettingsError(e.to_string())
        };

        let base_url = self
            .settings_service
            .get_setting(keys::EXAM_REGISTRY_BASE_URL)
            .await
            .map_err(settings_err)?
            .ok_or(CrawlError::NotConfigured)?;

        let schedule_path = self
            .settings_service
            .get_setting(keys::EXAM_REGISTRY_SCHEDULE_PATH)
            .await
            .map_err(settings_err)?
            .unwrap_or_else(|| DEFAULT_SCHEDULE_PATH.to_string());

        let delay_ms = self
            .settings_service
            .get_u64(keys::CRAWL_REQUEST_DELAY_MS, DEFAULT_REQUEST_DELAY_MS)
            .await
            .map_err(settings_err)?;

        Ok(CrawlConfig {
            base_url,
            schedule_path,
            request_delay: Duration::from_millis(delay_ms),
        })
    }

    /// Crawls every configured region for one month, one request at a time
    /// with `request_delay` between requests.
    pub async fn crawl_month(
        &self,
        year: i32,
        month: u32,
        exam_type: ExamType,
    ) -> Result<CrawlReport, CrawlError> {
        let config = self.get_config().await?;
        let mut report = CrawlReport::default();

        info!(
            year = year,
            month = month,
            exam_type = %exam_type,
            regions = all_regions().len(),
            "Starting exam registry crawl"
        );

        for (index, region) in all_regions().iter().enumerate() {
            if index > 0 && !config.request_delay.is_zero() {
                tokio::time::sleep(config.request_delay).await;
            }

            match self.fetch_region(&config, region, year, month, exam_type).await {
                Ok(mut fragments) => {
                    debug!(
                        region = %region.name,
                        rows = fragments.len(),
                        "Region crawled"
                    );
                    report.regions_crawled += 1;
                    report.fragments.append(&mut fragments);
                }
                Err(e) => {
                    warn!(region = %region.name, error = %e, "Region crawl failed");
                    report.failed_regions.push(FailedRegion {
                        region_code: region.code.to_string(),
                        region_name: region.name.to_string(),
                        month,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            fragments = report.fragments.len(),
            failed_regions = report.failed_regions.len(),
            "Exam registry crawl finished"
        );

        Ok(report)
    }

    /// Crawls several months of one year back to back into a single report
    pub async fn crawl_months(
        &self,
        year: i32,
        months: &[u32],
        exam_type: ExamType,
    ) -> Result<CrawlReport, CrawlError> {
        let mut combined = CrawlReport::default();
        for &month in months {
            let report = self.crawl_month(year, month, exam_type).await?;
            combined.absorb(report);
        }
        Ok(combined)
    }

    async fn fetch_region(
        &self,
        config: &CrawlConfig,
        region: &Region,
        year: i32,
        month: u32,
        exam_type: ExamType,
    ) -> Result<Vec<ScheduleFragment>, CrawlError> {
        let url = format!(
            "{}/{}",
            config.base_url.trim_end_matches('/'),
            config.schedule_path.trim_start_matches('/')
        );

        let response = self
            .client
            .get(&url)
            .query(&[
                ("year", year.to_string()),
                ("month", format!("{:02}", month)),
                ("examType", exam_type.registry_code().to_string()),
                ("regionCode", region.code.to_string()),
            ])
            .send()
            .await
            .map_err(|e| CrawlError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CrawlError::HttpStatus(status.as_u16()));
        }

        let html = response
            .text()
            .await
            .map_err(|e| CrawlError::RequestFailed(e.to_string()))?;

        parse_schedule_table(&html, region, year, month, exam_type)
    }
}

fn selector(css: &str) -> Result<Selector, CrawlError> {
    Selector::parse(css).map_err(|e| CrawlError::Markup(format!("'{}': {}", css, e)))
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Reads the registry's schedule table. Columns are exam date, registration
/// period, result date and an optional "HH:MM~HH:MM" exam time. Rows outside
/// the requested month and rows without a date (the "no data" row) are skipped.
/// A page without any table is an error so that it is reported as a failed
/// region rather than a month without exams.
pub fn parse_schedule_table(
    html: &str,
    region: &Region,
    year: i32,
    month: u32,
    exam_type: ExamType,
) -> Result<Vec<ScheduleFragment>, CrawlError> {
    let document = Html::parse_document(html);
    let table_selector = selector("table")?;
    let row_selector = selector("table tbody tr")?;
    let cell_selector = selector("td")?;

    if document.select(&table_selector).next().is_none() {
        return Err(CrawlError::Markup("schedule table not found".to_string()));
    }

    let mut fragments = Vec::new();

    for row in document.select(&row_selector) {
        let cells: Vec<String> = row.select(&cell_selector).map(cell_text).collect();

        let Some(exam_date) = cells.first().and_then(|c| parse_loose_date(c, year)) else {
            continue;
        };
        if exam_date.year() != year || exam_date.month() != month {
            debug!(date = %exam_date, "Skipping row outside requested month");
            continue;
        }

        let mut fragment =
            ScheduleFragment::crawled(year, exam_type, exam_date, region.name, region.code);
        fragment.registration_period = cells.get(1).filter(|c| !c.is_empty()).cloned();
        fragment.result_date = cells.get(2).and_then(|c| parse_loose_date(c, year));

        if let Some((start, end)) = cells.get(3).and_then(|c| c.split_once('~')) {
            fragment.exam_time_start = parse_clock_time(start);
            fragment.exam_time_end = parse_clock_time(end);
        }

        fragments.push(fragment);
    }

    Ok(fragments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedules::regions::region_by_code;
    use chrono::{NaiveDate, NaiveTime};

    const SEOUL_PAGE: &str = r#"
        <html><body>
        <table class="schedule">
          <thead><tr><th>시험일</th><th>접수기간</th><th>합격자발표</th><th>시험시간</th></tr></thead>
          <tbody>
            <tr><td>2025.11.10(월)</td><td>10.20 ~ 10.24</td><td>2025.11.14</td><td>10:00~11:40</td></tr>
            <tr><td>2025-11-24</td><td>11.03 ~ 11.07</td><td>2025-11-28</td><td></td></tr>
            <tr><td>2025-12-01</td><td>11.10 ~ 11.14</td><td></td><td></td></tr>
          </tbody>
        </table>
        </body></html>
    "#;

    fn seoul() -> &'static Region {
        region_by_code("01").unwrap()
    }

    #[test]
    fn test_parse_schedule_table_reads_rows_in_month() {
        let fragments = parse_schedule_table(SEOUL_PAGE, seoul(), 2025, 11, ExamType::Life).unwrap();

        assert_eq!(fragments.len(), 2);

        let first = &fragments[0];
        assert_eq!(first.exam_date, NaiveDate::from_ymd_opt(2025, 11, 10));
        assert_eq!(first.locations, vec!["서울".to_string()]);
        assert_eq!(first.region_code.as_deref(), Some("01"));
        assert_eq!(first.registration_period.as_deref(), Some("10.20 ~ 10.24"));
        assert_eq!(first.result_date, NaiveDate::from_ymd_opt(2025, 11, 14));
        assert_eq!(first.exam_time_start, NaiveTime::from_hms_opt(10, 0, 0));
        assert_eq!(first.exam_time_end, NaiveTime::from_hms_opt(11, 40, 0));

        assert_eq!(fragments[1].exam_time_start, None);
    }

    #[test]
    fn test_parse_schedule_table_empty_month() {
        let html = r#"<table><tbody><tr><td colspan="4">조회된 일정이 없습니다.</td></tr></tbody></table>"#;
        let fragments = parse_schedule_table(html, seoul(), 2025, 11, ExamType::NonLife).unwrap();
        assert!(fragments.is_empty());
    }

    #[test]
    fn test_parse_schedule_table_without_table_is_error() {
        let html = "<html><body><p>점검 중입니다</p></body></html>";
        let result = parse_schedule_table(html, seoul(), 2025, 11, ExamType::Life);
        assert!(matches!(result, Err(CrawlError::Markup(_))));
    }

    #[test]
    fn test_partial_report_flag() {
        let mut report = CrawlReport::default();
        assert!(!report.is_partial());

        report.failed_regions.push(FailedRegion {
            region_code: "03".to_string(),
            region_name: "제주".to_string(),
            month: 11,
            reason: "Registry returned HTTP 503".to_string(),
        });
        assert!(report.is_partial());
    }

    #[test]
    fn test_absorb_combines_months() {
        let date = NaiveDate::from_ymd_opt(2025, 10, 13).unwrap();
        let mut october = CrawlReport {
            fragments: vec![ScheduleFragment::crawled(2025, ExamType::Life, date, "서울", "01")],
            failed_regions: Vec::new(),
            regions_crawled: 13,
        };
        let november = parse_schedule_table(SEOUL_PAGE, seoul(), 2025, 11, ExamType::Life)
            .map(|fragments| CrawlReport {
                fragments,
                failed_regions: Vec::new(),
                regions_crawled: 13,
            })
            .unwrap();

        october.absorb(november);
        assert_eq!(october.fragments.len(), 3);
        assert_eq!(october.regions_crawled, 26);
    }

    #[tokio::test]
    async fn test_crawl_waits_between_region_requests() {
        use axum::{routing::get, Extension, Router};
        use sqlx::sqlite::SqlitePoolOptions;
        use std::sync::Mutex;
        use std::time::Instant;

        type Arrivals = Arc<Mutex<Vec<Instant>>>;

        async fn registry_page(Extension(arrivals): Extension<Arrivals>) -> axum::response::Html<&'static str> {
            arrivals.lock().unwrap().push(Instant::now());
            axum::response::Html(SEOUL_PAGE)
        }

        let arrivals: Arrivals = Arc::new(Mutex::new(Vec::new()));
        let registry = Router::new()
            .route(DEFAULT_SCHEDULE_PATH, get(registry_page))
            .layer(Extension(arrivals.clone()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, registry).await.unwrap();
        });

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::common::migrations::create_system_tables(&pool).await.unwrap();
        let settings = Arc::new(SettingsService::new(pool));
        settings
            .set_setting(keys::EXAM_REGISTRY_BASE_URL, &format!("http://{}", addr), None)
            .await
            .unwrap();
        settings
            .set_setting(keys::CRAWL_REQUEST_DELAY_MS, "30", None)
            .await
            .unwrap();

        let crawler = ExamRegistryCrawler::new(settings, Duration::from_secs(5));
        let report = crawler.crawl_month(2025, 11, ExamType::Life).await.unwrap();

        assert_eq!(report.regions_crawled, all_regions().len());
        assert!(!report.is_partial());
        assert_eq!(report.fragments.len(), 2 * all_regions().len());

        let arrivals = arrivals.lock().unwrap();
        assert_eq!(arrivals.len(), all_regions().len());
        for pair in arrivals.windows(2) {
            assert!(pair[1].duration_since(pair[0]) >= Duration::from_millis(30));
        }
    }
}
