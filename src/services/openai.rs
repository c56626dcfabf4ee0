// src/services/openai.rs
use crate::services::settings::{keys, SettingsService};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

#[derive(Debug, thiserror::Error)]
pub enum OpenAIError {
    #[error("API key not configured")]
    NotConfigured,

    #[error("API request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Settings error: {0}")]
    SettingsError(String),
}

#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    pub api_key: String,
    pub base_url: String,
    pub models: ModelConfig,
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub schedule_vision: String,
    pub deadline_text: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            schedule_vision: "gpt-4o".to_string(),
            deadline_text: "gpt-4o-mini".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ExtractionPurpose {
    ScheduleImage,
    DeadlineText,
}

impl ExtractionPurpose {
    fn max_tokens(&self) -> u32 {
        match self {
            ExtractionPurpose::ScheduleImage => 4000,
            ExtractionPurpose::DeadlineText => 2000,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    response_format: Value,
}

/// `content` is either a plain string or an array of typed parts
#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Value,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: u32,
}

/// Chat-completions client for the two extraction collaborators. Calls are
/// made once; a failed call is reported to the caller, which degrades to the
/// remaining sources.
#[derive(Debug)]
pub struct OpenAIService {
    settings_service: Arc<SettingsService>,
    client: Client,
}

impl OpenAIService {
    pub fn new(settings_service: Arc<SettingsService>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            settings_service,
            client,
        }
    }

    /// Get OpenAI configuration from settings
    pub async fn get_config(&self) -> Result<OpenAIConfig, OpenAIError> {
        let api_key = self
            .get_optional(keys::OPENAI_API_KEY)
            .await?
            .ok_or(OpenAIError::NotConfigured)?;

        let base_url = self
            .get_optional(keys::OPENAI_BASE_URL)
            .await?
            .unwrap_or_else(|| "https://api.openai.com".to_string());

        let defaults = ModelConfig::default();
        let models = ModelConfig {
            schedule_vision: self
                .get_optional(keys::OPENAI_MODEL_VISION)
                .await?
                .unwrap_or(defaults.schedule_vision),
            deadline_text: self
                .get_optional(keys::OPENAI_MODEL_TEXT)
                .await?
                .unwrap_or(defaults.deadline_text),
        };

        Ok(OpenAIConfig {
            api_key,
            base_url,
            models,
        })
    }

    async fn get_optional(&self, key: &str) -> Result<Option<String>, OpenAIError> {
        self.settings_service
            .get_setting(key)
            .await
            .map_err(|e| OpenAIError::SettingsError(e.to_string()))
    }

    /// Sends a schedule-table image to the vision model and returns its raw
    /// JSON answer (`{"extractedText", "schedules"}`).
    pub async fn extract_schedule_image(
        &self,
        image: &[u8],
        mime_type: &str,
        year: i32,
        exam_type_label: &str,
    ) -> Result<String, OpenAIError> {
        let config = self.get_config().await?;
        let data_url = format!("data:{};base64,{}", mime_type, STANDARD.encode(image));

        let messages = vec![
            ChatMessage {
                role: "system",
                content: Value::String(system_prompt(ExtractionPurpose::ScheduleImage).to_string()),
            },
            ChatMessage {
                role: "user",
                content: json!([
                    {
                        "type": "text",
                        "text": format!(
                            "{}년 {} 자격시험 일정표입니다. 모든 회차를 추출하세요.",
                            year, exam_type_label
                        )
                    },
                    {
                        "type": "image_url",
                        "image_url": { "url": data_url, "detail": "high" }
                    }
                ]),
            },
        ];

        debug!(
            model = %config.models.schedule_vision,
            image_bytes = image.len(),
            mime_type = %mime_type,
            "Sending schedule image extraction request"
        );

        self.complete(
            &config,
            ExtractionPurpose::ScheduleImage,
            &config.models.schedule_vision,
            messages,
        )
        .await
    }

    /// Sends internal deadline text to the text model and returns its raw
    /// JSON answer (`{"schedules": [...]}`).
    pub async fn extract_deadlines_text(&self, text: &str, year: i32) -> Result<String, OpenAIError> {
        let config = self.get_config().await?;

        let messages = vec![
            ChatMessage {
                role: "system",
                content: Value::String(system_prompt(ExtractionPurpose::DeadlineText).to_string()),
            },
            ChatMessage {
                role: "user",
                content: Value::String(format!("기준 연도: {}\n\n{}", year, text)),
            },
        ];

        debug!(
            model = %config.models.deadline_text,
            text_chars = text.chars().count(),
            "Sending deadline text extraction request"
        );

        self.complete(
            &config,
            ExtractionPurpose::DeadlineText,
            &config.models.deadline_text,
            messages,
        )
        .await
    }

    async fn complete(
        &self,
        config: &OpenAIConfig,
        purpose: ExtractionPurpose,
        model: &str,
        messages: Vec<ChatMessage>,
    ) -> Result<String, OpenAIError> {
        let request = ChatCompletionRequest {
            model: model.to_string(),
            messages,
            temperature: 0.0,
            max_tokens: purpose.max_tokens(),
            response_format: json!({ "type": "json_object" }),
        };

        let response = self.make_request(config, &request).await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| OpenAIError::InvalidResponse("No content in response".to_string()))?;

        if let Some(usage) = response.usage {
            info!(
                purpose = ?purpose,
                model = %model,
                tokens_used = usage.total_tokens,
                "OpenAI extraction completed"
            );
        }

        Ok(content)
    }

    /// Make a single API request
    async fn make_request(
        &self,
        config: &OpenAIConfig,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, OpenAIError> {
        let url = format!("{}/v1/chat/completions", config.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", config.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| OpenAIError::RequestFailed(e.to_string()))?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(OpenAIError::RateLimitExceeded);
        }

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = %status, error = %error_text, "OpenAI API request failed");
            return Err(OpenAIError::RequestFailed(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|e| OpenAIError::InvalidResponse(e.to_string()))
    }

    /// Test OpenAI connection
    pub async fn test_connection(&self) -> Result<String, OpenAIError> {
        let config = self.get_config().await?;

        let messages = vec![ChatMessage {
            role: "user",
            content: Value::String(
                "Reply with the JSON object {\"status\": \"ok\"}.".to_string(),
            ),
        }];

        self.complete(
            &config,
            ExtractionPurpose::DeadlineText,
            &config.models.deadline_text,
            messages,
        )
        .await
    }
}

fn system_prompt(purpose: ExtractionPurpose) -> &'static str {
    match purpose {
        ExtractionPurpose::ScheduleImage => {
            "당신은 보험 자격시험 일정표 이미지를 읽는 도우미입니다. \
             이미지의 모든 텍스트를 extractedText에 그대로 옮기고, 각 회차를 schedules 배열로 정리하세요. \
             각 항목은 sessionNumber(숫자), examDate(YYYY-MM-DD), examTimeStart(HH:MM), examTimeEnd(HH:MM), \
             locations(지역명 배열), registrationPeriod(문자열), resultDate(YYYY-MM-DD), notes(문자열)를 가집니다. \
             알 수 없는 값은 null로 두고 추측하지 마세요. 반드시 JSON 객체 하나만 출력하세요."
        }
        ExtractionPurpose::DeadlineText => {
            "당신은 사내 시험 접수 마감 공지를 구조화하는 도우미입니다. \
             각 마감 항목을 schedules 배열로 정리하세요. \
             각 항목은 sessionRange(\"1~4\" 또는 숫자), deadlineDate(YYYY-MM-DD), deadlineTime(HH:MM, 24시간제), \
             noticeDate(YYYY-MM-DD), noticeTime(HH:MM, 24시간제), notes(문자열)를 가집니다. \
             '오후 2시'는 14:00처럼 변환하세요. 반드시 JSON 객체 하나만 출력하세요."
        }
    }
}
