//! # Batch Processing Tests Module
//!
//! Directory runs in sequential and parallel mode.

mod common;

#[cfg(test)]
mod tests {
    use super::common::{banded, save_png};
    use std::fs;
    use std::path::Path;
    use survey_scan::batch::BatchProcessor;
    use survey_scan::config::ScanConfig;
    use survey_scan::errors::SurveyError;

    fn config(input: &Path, output: &Path, parallel: bool) -> ScanConfig {
        ScanConfig {
            input_dir: input.to_path_buf(),
            output_dir: output.to_path_buf(),
            parallel,
            max_threads: Some(2),
            ..ScanConfig::default()
        }
    }

    /// Test that an empty directory yields an empty report in both modes
    #[test]
    fn test_empty_directory() {
        let input = tempfile::tempdir().expect("tempdir should be created");
        let output = tempfile::tempdir().expect("tempdir should be created");
        fs::write(input.path().join("notes.txt"), b"not an image").expect("write should succeed");

        for parallel in [false, true] {
            let processor = BatchProcessor::new(&config(input.path(), output.path(), parallel))
                .expect("processor should build");
            let report = processor.process_directory().expect("run should succeed");
            assert!(report.is_empty());
            assert!(report.per_image.is_empty());
            assert!(report.failed_files.is_empty());
        }
    }

    /// Test one corrupt and one valid image in both modes
    #[test]
    fn test_corrupt_and_valid_images() {
        for parallel in [false, true] {
            let input = tempfile::tempdir().expect("tempdir should be created");
            let output = tempfile::tempdir().expect("tempdir should be created");
            save_png(input.path(), "valid.png", &banded(200, 200, 25, 0, 255));
            let corrupt = input.path().join("corrupt.JPG");
            fs::write(&corrupt, b"\xff\xd8 truncated jpeg").expect("write should succeed");

            let processor = BatchProcessor::new(&config(input.path(), output.path(), parallel))
                .expect("processor should build");
            let report = processor.process_directory().expect("run should succeed");

            assert_eq!(report.success_count, 1, "parallel={}", parallel);
            assert_eq!(report.failure_count, 1, "parallel={}", parallel);
            assert_eq!(report.failed_files, vec![corrupt.clone()]);
            assert_eq!(report.per_image[0].filename, "valid.png");
            assert!(report.per_image[0].quality_score >= 0.5);

            let written = output.path().join("processed_valid.png");
            assert_eq!(report.per_image[0].output_path, written);
            let processed = image::open(&written).expect("output should decode").to_luma8();
            assert_eq!(processed.dimensions(), (200, 200));

            let stats = processor.processing_stats().expect("stats should be computed");
            assert_eq!(stats.total_processed, 1);
            assert_eq!(stats.total_files, 2);
        }
    }

    /// Test that low-quality images are counted as failures
    #[test]
    fn test_rejected_image_is_a_failure() {
        let input = tempfile::tempdir().expect("tempdir should be created");
        let output = input.path().join("out");
        save_png(
            input.path(),
            "flat.png",
            &image::GrayImage::from_pixel(80, 80, image::Luma([128])),
        );

        let processor =
            BatchProcessor::new(&config(input.path(), &output, false)).expect("processor should build");
        let report = processor.process_directory().expect("run should succeed");
        assert_eq!(report.success_count, 0);
        assert_eq!(report.failure_count, 1);
        assert!(output.is_dir());
        assert!(!output.join("processed_flat.png").exists());
    }

    /// Test construction errors for invalid input paths
    #[test]
    fn test_invalid_input_paths() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let missing = dir.path().join("missing");
        assert!(matches!(
            BatchProcessor::new(&config(&missing, dir.path(), false)),
            Err(SurveyError::NotFound(_))
        ));

        let file = dir.path().join("scan.png");
        fs::write(&file, b"x").expect("write should succeed");
        assert!(matches!(
            BatchProcessor::new(&config(&file, dir.path(), false)),
            Err(SurveyError::NotADirectory(_))
        ));
    }

    /// Test that the report serializes for the command line output
    #[test]
    fn test_report_serializes() {
        let input = tempfile::tempdir().expect("tempdir should be created");
        let output = tempfile::tempdir().expect("tempdir should be created");
        let report = BatchProcessor::new(&config(input.path(), output.path(), false))
            .expect("processor should build")
            .process_directory()
            .expect("run should succeed");
        let json = serde_json::to_value(&report).expect("report should serialize");
        assert_eq!(json["success_count"], 0);
        assert!(json["failed_files"].as_array().is_some_and(|a| a.is_empty()));
    }
}
