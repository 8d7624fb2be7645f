//! # Observability Tests Module
//!
//! Test suite for logging configuration, spans and metric recording.

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::Duration;
    use survey_scan::observability;
    use survey_scan::observability_config::{presets, LogFormat, ObservabilityConfig};

    /// Test that metrics recording works without an installed recorder
    #[test]
    fn test_metrics_recording() {
        observability::record_batch_image("success", Duration::from_millis(120));
        observability::record_batch_image("failure", Duration::from_millis(3));
        observability::record_image_quality(0.73);
        observability::record_field_extraction_failure("checkbox");
        observability::record_batch_summary(4, 1, Duration::from_secs(2));
    }

    /// Test span creation functions
    #[test]
    fn test_span_creation() {
        let image_span = observability::image_span("preprocess", Path::new("scan_001.jpg"));
        let _entered = image_span.enter();
        let ocr_span = observability::ocr_span("participant_header");
        let _ocr = ocr_span.enter();
    }

    /// Test configuration presets
    #[test]
    fn test_presets() {
        let development = presets::development();
        assert!(development.is_development());
        assert_eq!(development.log_format, LogFormat::Pretty);

        let production = presets::production();
        assert!(production.is_production());
        assert_eq!(production.log_format, LogFormat::Json);
        assert!(production.validate().is_ok());
    }

    /// Test that tracing initialization succeeds once and is not repeatable
    #[test]
    fn test_init_tracing_once() {
        let config = ObservabilityConfig::default();
        let first = observability::init_tracing(&config);
        let second = observability::init_tracing(&config);
        assert!(first.is_ok());
        assert!(second.is_err());
    }
}
