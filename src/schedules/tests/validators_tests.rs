// src/schedules/tests/validators_tests.rs

#[cfg(test)]
mod tests {
    use crate::common::config::MAX_IMAGE_BYTES;
    use crate::common::Validator;
    use crate::schedules::models::*;
    use crate::schedules::validators::*;

    const PNG_HEADER: [u8; 16] = [
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48,
        0x44, 0x52,
    ];

    fn png() -> ImageUpload {
        ImageUpload {
            bytes: PNG_HEADER.to_vec(),
        }
    }

    #[test]
    fn test_crawl_request_valid() {
        let validator = ScheduleRequestValidator;
        let request = CrawlRequest {
            year: 2025,
            month: 11,
            exam_type: ExamType::Life,
        };

        let result = validator.validate(&request);
        assert!(result.is_valid);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_crawl_request_out_of_range() {
        let validator = ScheduleRequestValidator;
        let request = CrawlRequest {
            year: 1999,
            month: 13,
            exam_type: ExamType::NonLife,
        };

        let result = validator.validate(&request);
        assert!(!result.is_valid);
        let fields: Vec<&str> = result.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["year", "month"]);
    }

    #[test]
    fn test_parse_internal_requires_text() {
        let validator = ScheduleRequestValidator;
        let request = ParseInternalRequest {
            text: "   \n".to_string(),
            year: 2025,
            use_ai_fallback: false,
        };

        let result = validator.validate(&request);
        assert!(!result.is_valid);
        assert_eq!(result.errors[0].field, "text");
    }

    #[test]
    fn test_image_upload_checks() {
        let validator = ScheduleRequestValidator;

        assert!(validator.validate(&png()).is_valid);
        assert_eq!(detect_image_mime(&PNG_HEADER), Some("image/png"));

        let empty = ImageUpload { bytes: Vec::new() };
        assert!(!validator.validate(&empty).is_valid);

        let text = ImageUpload {
            bytes: b"1~4\xec\xb0\xa8 not an image".to_vec(),
        };
        assert!(!validator.validate(&text).is_valid);

        let mut oversized = PNG_HEADER.to_vec();
        oversized.resize(MAX_IMAGE_BYTES + 1, 0);
        let result = validator.validate(&ImageUpload { bytes: oversized });
        assert_eq!(result.errors[0].message, "Image must be 10 MB or smaller");
    }

    #[test]
    fn test_parse_image_form_collects_image_errors() {
        let validator = ScheduleRequestValidator;

        let valid = ParseImageForm {
            year: 2025,
            exam_type: ExamType::Life,
            image: png(),
        };
        assert!(validator.validate(&valid).is_valid);

        let invalid = ParseImageForm {
            year: 1999,
            exam_type: ExamType::Life,
            image: ImageUpload { bytes: Vec::new() },
        };
        let result = validator.validate(&invalid);
        assert!(!result.is_valid);
        let fields: Vec<&str> = result.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["year", "image"]);
    }

    #[test]
    fn test_comprehensive_form_needs_a_source() {
        let validator = ScheduleRequestValidator;
        let mut form = ComprehensiveForm {
            year: 2025,
            exam_type: ExamType::Life,
            months: Vec::new(),
            image: None,
            internal_text: None,
            save: false,
        };

        let result = validator.validate(&form);
        assert!(!result.is_valid);
        assert_eq!(result.errors[0].field, "sources");

        form.months = vec![10, 11];
        form.image = Some(png());
        assert!(validator.validate(&form).is_valid);

        form.months.push(0);
        assert!(!validator.validate(&form).is_valid);
    }

    #[test]
    fn test_save_request_rejects_empty_and_zero_sessions() {
        let validator = ScheduleRequestValidator;

        let empty = SaveRequest { schedules: Vec::new() };
        assert!(!validator.validate(&empty).is_valid);

        let zero = SaveRequest {
            schedules: vec![ComprehensiveSchedule {
                year: 2025,
                exam_type: ExamType::Life,
                session_number: 0,
                exam_date: None,
                exam_time_start: None,
                exam_time_end: None,
                locations: Vec::new(),
                region_codes: Vec::new(),
                registration_period: None,
                result_date: None,
                internal_deadline_date: None,
                internal_deadline_time: None,
                notice_date: None,
                notice_time: None,
                has_internal_deadline: false,
                data_source: DataSource::InternalOnly,
                notes: String::new(),
            }],
        };
        let result = validator.validate(&zero);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].field, "schedules.sessionNumber");
    }

    #[test]
    fn test_merge_request_rejects_zero_ranges() {
        let validator = ScheduleRequestValidator;
        let request: MergeRequest = serde_json::from_str(
            r#"{
                "year": 2025,
                "examType": "생보",
                "internalDeadlines": [{"sessionRange": "0~2", "deadlineDate": "2025-10-01"}]
            }"#,
        )
        .unwrap();

        let result = validator.validate(&request);
        assert!(!result.is_valid);
        assert_eq!(result.errors[0].field, "internalDeadlines");
    }
}
