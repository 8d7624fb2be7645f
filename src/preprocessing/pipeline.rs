//! # Preprocessing Pipeline
//!
//! Orchestrates the fixed sequence that turns a captured photo into an
//! OCR-ready binary image: grayscale → denoise → CLAHE → adaptive threshold →
//! skew detection and correction. A quality gate in front of the pipeline
//! rejects captures that are not worth recognizing.

use image::{DynamicImage, GrayImage};
use std::path::Path;
use tracing::{debug, info, warn};

use super::deskewing::{correct_skew, detect_skew};
use super::filtering::{apply_clahe, denoise_non_local_means};
use super::quality::{check_image_problems, optimization_suggestions, quality_metrics};
use super::thresholding::{adaptive_gaussian_threshold, binarize_otsu_inverted};
use super::types::{AcceptedImage, PreprocessOutcome, ProblemReport, QualityMetrics, Rejection};
use crate::config::{PreprocessParams, QualityThresholds, ScanConfig};
use crate::errors::{error_logging, SurveyError, SurveyResult};
use crate::observability;

/// Runs the quality gate and preprocessing pipeline on captured images.
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    min_quality_score: f64,
    thresholds: QualityThresholds,
    params: PreprocessParams,
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::new(&ScanConfig::default())
    }
}

impl ImagePreprocessor {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            min_quality_score: config.min_quality_score,
            thresholds: config.quality.clone(),
            params: config.preprocess.clone(),
        }
    }

    pub fn min_quality_score(&self) -> f64 {
        self.min_quality_score
    }

    pub fn thresholds(&self) -> &QualityThresholds {
        &self.thresholds
    }

    /// Loads and preprocesses one image file.
    ///
    /// # Errors
    ///
    /// Only a missing file is returned as `Err(SurveyError::NotFound)`. Decode
    /// and processing failures are logged and reported as
    /// `PreprocessOutcome::Failed`; captures scoring below the minimum quality
    /// are reported as `PreprocessOutcome::Rejected`.
    pub fn preprocess_image(&self, path: &Path) -> SurveyResult<PreprocessOutcome> {
        if !path.exists() {
            return Err(SurveyError::NotFound(path.to_path_buf()));
        }

        let image = match image::open(path) {
            Ok(image) => image,
            Err(e) => {
                let err = SurveyError::LoadError {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                };
                error_logging::log_image_error(&err, "load", path);
                return Ok(PreprocessOutcome::Failed(err));
            }
        };

        let metrics = quality_metrics(&image);
        observability::record_image_quality(metrics.overall_quality);

        if metrics.overall_quality < self.min_quality_score {
            let problems = check_image_problems(&image, &self.thresholds);
            let suggestions = optimization_suggestions(&problems, &self.thresholds);
            let rejection = Rejection {
                path: path.to_path_buf(),
                quality_score: metrics.overall_quality,
                min_quality_score: self.min_quality_score,
                problems,
                suggestions,
            };
            log_rejection(&rejection);
            return Ok(PreprocessOutcome::Rejected(rejection));
        }

        match self.process_steps(&image) {
            Ok((processed, skew)) => Ok(PreprocessOutcome::Accepted(AcceptedImage {
                image: processed,
                metrics,
                corrected_skew_degrees: skew,
            })),
            Err(err) => {
                error_logging::log_image_error(&err, "preprocess", path);
                Ok(PreprocessOutcome::Failed(err))
            }
        }
    }

    /// Runs the fixed pipeline on an in-memory image.
    ///
    /// Returns the binarized image and the skew angle measured before
    /// correction.
    pub fn process_steps(&self, image: &DynamicImage) -> SurveyResult<(GrayImage, f64)> {
        let start_time = std::time::Instant::now();

        let gray = image.to_luma8();
        let denoised = denoise_non_local_means(&gray, self.params.denoise_strength)?;
        let enhanced = apply_clahe(
            &denoised,
            self.params.clahe_clip_limit,
            self.params.clahe_grid,
        )?;
        let binary = adaptive_gaussian_threshold(
            &enhanced,
            self.params.adaptive_block_size,
            self.params.adaptive_offset,
        )?;

        let angle = detect_skew(&binary);
        let output = if angle.abs() > self.params.min_correction_degrees {
            correct_skew(&binary, angle)
        } else {
            debug!(
                target: "survey_preprocessing",
                "Skew angle {:.2}° is below threshold, skipping correction",
                angle
            );
            binary
        };

        debug!(
            target: "survey_preprocessing",
            "Preprocessing pipeline completed in {}ms: {}x{}, skew={:.2}°",
            start_time.elapsed().as_millis(),
            output.width(),
            output.height(),
            angle
        );

        Ok((output, angle))
    }

    /// Quality component scores, independent of the accept/reject decision
    pub fn quality_metrics(&self, image: &DynamicImage) -> QualityMetrics {
        quality_metrics(image)
    }

    pub fn check_image_problems(&self, image: &DynamicImage) -> ProblemReport {
        check_image_problems(image, &self.thresholds)
    }

    pub fn optimization_suggestions(&self, report: &ProblemReport) -> Vec<String> {
        optimization_suggestions(report, &self.thresholds)
    }

    /// Local contrast enhancement applied to regions before text recognition
    pub fn enhance_text_region(&self, region: &GrayImage) -> SurveyResult<GrayImage> {
        apply_clahe(region, self.params.clahe_clip_limit, self.params.clahe_grid)
    }

    /// Inverted Otsu binarization: pen marks become 255 foreground
    pub fn enhance_marks_region(&self, region: &GrayImage) -> GrayImage {
        binarize_otsu_inverted(region)
    }

    /// Conditions a crop for OCR: contrast enhancement then adaptive threshold
    pub fn prepare_for_ocr(&self, region: &GrayImage) -> SurveyResult<GrayImage> {
        let enhanced = self.enhance_text_region(region)?;
        adaptive_gaussian_threshold(
            &enhanced,
            self.params.adaptive_block_size,
            self.params.adaptive_offset,
        )
    }
}

fn log_rejection(rejection: &Rejection) {
    let flags: Vec<&str> = rejection
        .problems
        .flags()
        .iter()
        .map(|flag| flag.name())
        .collect();
    warn!(
        path = %rejection.path.display(),
        quality = rejection.quality_score,
        min_quality = rejection.min_quality_score,
        problems = ?flags,
        "Image rejected for low quality"
    );
    for suggestion in &rejection.suggestions {
        info!(path = %rejection.path.display(), "Suggestion: {}", suggestion);
    }
}
