// src/schedules/handlers/forms.rs
//! Multipart form decoding for the image and comprehensive endpoints

use axum::extract::Multipart;
use std::collections::HashMap;
use tracing::debug;

use crate::common::ApiError;
use crate::schedules::models::{ComprehensiveForm, ExamType, ImageUpload, ParseImageForm};

#[derive(Debug, Default)]
struct RawForm {
    fields: HashMap<String, String>,
    image: Option<Vec<u8>>,
}

impl RawForm {
    fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn year(&self) -> Result<i32, ApiError> {
        let raw = self
            .text("year")
            .ok_or_else(|| ApiError::BadRequest("year is required".to_string()))?;
        raw.parse()
            .map_err(|_| ApiError::BadRequest(format!("Invalid year: {}", raw)))
    }

    fn exam_type(&self) -> Result<ExamType, ApiError> {
        self.text("examType")
            .or_else(|| self.text("exam_type"))
            .ok_or_else(|| ApiError::BadRequest("examType is required".to_string()))?
            .parse()
            .map_err(ApiError::BadRequest)
    }
}

async fn read_form(mut multipart: Multipart) -> Result<RawForm, ApiError> {
    let mut form = RawForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if name == "image" {
            let bytes = field
                .bytes()
                .await
                .map_err(|_| ApiError::BadRequest("Invalid file".to_string()))?;
            debug!(bytes = bytes.len(), "Received schedule image");
            form.image = Some(bytes.to_vec());
        } else {
            let value = field
                .text()
                .await
                .map_err(|_| ApiError::BadRequest(format!("Invalid field: {}", name)))?;
            form.fields.insert(name, value);
        }
    }

    Ok(form)
}

/// Parses "10,11,12" into distinct months in the order given
pub fn parse_months(raw: &str) -> Result<Vec<u32>, ApiError> {
    let mut months = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let month: u32 = part
            .parse()
            .map_err(|_| ApiError::BadRequest(format!("Invalid month: {}", part)))?;
        if !months.contains(&month) {
            months.push(month);
        }
    }
    Ok(months)
}

fn parse_flag(raw: Option<&str>) -> bool {
    matches!(raw, Some("true" | "1" | "yes" | "on"))
}

pub async fn read_parse_image_form(multipart: Multipart) -> Result<ParseImageForm, ApiError> {
    let form = read_form(multipart).await?;

    Ok(ParseImageForm {
        year: form.year()?,
        exam_type: form.exam_type()?,
        image: ImageUpload {
            bytes: form
                .image
                .ok_or_else(|| ApiError::BadRequest("No image provided".to_string()))?,
        },
    })
}

pub async fn read_comprehensive_form(multipart: Multipart) -> Result<ComprehensiveForm, ApiError> {
    let form = read_form(multipart).await?;

    let months = match form.text("months").or_else(|| form.text("month")) {
        Some(raw) => parse_months(raw)?,
        None => Vec::new(),
    };

    Ok(ComprehensiveForm {
        year: form.year()?,
        exam_type: form.exam_type()?,
        months,
        internal_text: form
            .text("internalText")
            .or_else(|| form.text("internal_text"))
            .map(str::to_string),
        save: parse_flag(form.text("save")),
        image: form
            .image
            .filter(|bytes| !bytes.is_empty())
            .map(|bytes| ImageUpload { bytes }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_months_dedupes_and_keeps_order() {
        assert_eq!(parse_months("11, 10,11,,12").unwrap(), vec![11, 10, 12]);
        assert!(parse_months("11,dec").is_err());
        assert!(parse_months("").unwrap().is_empty());
    }

    #[test]
    fn test_raw_form_fields() {
        let mut form = RawForm::default();
        form.fields.insert("year".to_string(), " 2025 ".to_string());
        form.fields.insert("exam_type".to_string(), "손보".to_string());
        form.fields.insert("save".to_string(), "true".to_string());

        assert_eq!(form.year().unwrap(), 2025);
        assert_eq!(form.exam_type().unwrap(), ExamType::NonLife);
        assert!(parse_flag(form.text("save")));
        assert!(!parse_flag(form.text("missing")));
    }

    #[test]
    fn test_raw_form_rejects_unknown_exam_type() {
        let mut form = RawForm::default();
        form.fields.insert("examType".to_string(), "화재".to_string());
        assert!(matches!(form.exam_type(), Err(ApiError::BadRequest(_))));
        assert!(matches!(form.year(), Err(ApiError::BadRequest(_))));
    }
}
