// Error handling types for the API

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::fmt;
use tracing::error;

use super::validation::ValidationResult;
use crate::schedules::extraction::ExtractionError;
use crate::services::crawler::CrawlError;
use crate::services::openai::OpenAIError;

/// API error types
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    InternalServer(String),
    ServiceUnavailable(String),
    DatabaseError(sqlx::Error),
    ValidationError(String),
    /// A model answered but its output could not be used
    ExtractionError(String),
    /// The registry or model endpoint failed
    UpstreamError(String),
    RateLimited(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            ApiError::InternalServer(msg) => write!(f, "Internal Server Error: {}", msg),
            ApiError::ServiceUnavailable(msg) => write!(f, "Service Unavailable: {}", msg),
            ApiError::DatabaseError(e) => write!(f, "Database Error: {}", e),
            ApiError::ValidationError(msg) => write!(f, "Validation Error: {}", msg),
            ApiError::ExtractionError(msg) => write!(f, "Extraction Error: {}", msg),
            ApiError::UpstreamError(msg) => write!(f, "Upstream Error: {}", msg),
            ApiError::RateLimited(msg) => write!(f, "Rate Limited: {}", msg),
        }
    }
}

/// JSON error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::InternalServer(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_SERVER_ERROR")
            }
            ApiError::ServiceUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE")
            }
            ApiError::DatabaseError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            ApiError::ValidationError(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ApiError::ExtractionError(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "EXTRACTION_ERROR")
            }
            ApiError::UpstreamError(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            ApiError::RateLimited(_) => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, code) = self.status_and_code();
        let error_message = match self {
            ApiError::DatabaseError(e) => {
                error!(error = %e, "Database error occurred");
                "Database operation failed".to_string()
            }
            ApiError::BadRequest(msg)
            | ApiError::NotFound(msg)
            | ApiError::InternalServer(msg)
            | ApiError::ServiceUnavailable(msg)
            | ApiError::ValidationError(msg)
            | ApiError::ExtractionError(msg)
            | ApiError::UpstreamError(msg)
            | ApiError::RateLimited(msg) => msg,
        };

        let error_response = ErrorResponse {
            error: error_message,
            code: code.to_string(),
        };

        (status, Json(error_response)).into_response()
    }
}

/// Helper function to convert ValidationResult to ApiError
impl From<ValidationResult> for ApiError {
    fn from(result: ValidationResult) -> Self {
        if result.is_valid {
            ApiError::InternalServer(
                "Validation result was valid but converted to error".to_string(),
            )
        } else {
            let error_messages: Vec<String> = result
                .errors
                .iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect();
            ApiError::ValidationError(error_messages.join(", "))
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        ApiError::DatabaseError(e)
    }
}

impl From<OpenAIError> for ApiError {
    fn from(e: OpenAIError) -> Self {
        match e {
            OpenAIError::NotConfigured => {
                ApiError::ServiceUnavailable("OpenAI API key is not configured".to_string())
            }
            OpenAIError::RateLimitExceeded => ApiError::RateLimited(e.to_string()),
            OpenAIError::SettingsError(msg) => ApiError::InternalServer(msg),
            OpenAIError::RequestFailed(_) | OpenAIError::InvalidResponse(_) => {
                ApiError::UpstreamError(e.to_string())
            }
        }
    }
}

impl From<CrawlError> for ApiError {
    fn from(e: CrawlError) -> Self {
        match e {
            CrawlError::NotConfigured => ApiError::ServiceUnavailable(e.to_string()),
            CrawlError::SettingsError(msg) => ApiError::InternalServer(msg),
            _ => ApiError::UpstreamError(e.to_string()),
        }
    }
}

impl From<ExtractionError> for ApiError {
    fn from(e: ExtractionError) -> Self {
        ApiError::ExtractionError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from(OpenAIError::RateLimitExceeded).status_and_code().0,
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::from(OpenAIError::NotConfigured).status_and_code().0,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(ExtractionError::MissingSchedules).status_and_code(),
            (StatusCode::UNPROCESSABLE_ENTITY, "EXTRACTION_ERROR")
        );
        assert_eq!(
            ApiError::from(CrawlError::HttpStatus(503)).status_and_code().0,
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_validation_result_message() {
        let mut result = ValidationResult::new();
        result.add_error("year", "Year must be between 2000 and 2100");
        result.add_error("month", "Month must be between 1 and 12");

        match ApiError::from(result) {
            ApiError::ValidationError(msg) => {
                assert_eq!(
                    msg,
                    "year: Year must be between 2000 and 2100, month: Month must be between 1 and 12"
                );
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
