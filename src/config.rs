//! # Scan Configuration
//!
//! This module provides a centralized configuration system that consolidates
//! every tunable of the scanning pipeline into a single structured object.
//! Quality thresholds and mark-density limits are empirical defaults, not
//! physical constants, so they live here rather than in the algorithms.

use crate::errors::{SurveyError, SurveyResult};
use crate::ocr_config::OcrConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Thresholds that turn quality statistics into problem flags
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityThresholds {
    /// Mean intensity below this (0-255) is too dark
    pub min_brightness: f64,
    /// Mean intensity above this (0-255) is too bright
    pub max_brightness: f64,
    /// Intensity standard deviation below this is low contrast
    pub min_contrast_stdev: f64,
    /// Laplacian variance below this is blurry
    pub min_laplacian_variance: f64,
    /// Absolute skew above this many degrees is flagged
    pub max_skew_degrees: f64,
    /// Largest accepted width or height in pixels
    pub max_image_dimension: u32,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_brightness: 50.0,
            max_brightness: 200.0,
            min_contrast_stdev: 30.0,
            min_laplacian_variance: 100.0,
            max_skew_degrees: 5.0,
            max_image_dimension: 4000,
        }
    }
}

impl QualityThresholds {
    /// Validate quality thresholds
    pub fn validate(&self) -> SurveyResult<()> {
        if !(0.0..=255.0).contains(&self.min_brightness)
            || !(0.0..=255.0).contains(&self.max_brightness)
        {
            return Err(SurveyError::Config(
                "Brightness thresholds must be within 0-255".to_string(),
            ));
        }
        if self.min_brightness >= self.max_brightness {
            return Err(SurveyError::Config(
                "min_brightness must be lower than max_brightness".to_string(),
            ));
        }
        if self.min_contrast_stdev < 0.0 || self.min_laplacian_variance < 0.0 {
            return Err(SurveyError::Config(
                "Contrast and sharpness thresholds cannot be negative".to_string(),
            ));
        }
        if !(0.0..=45.0).contains(&self.max_skew_degrees) {
            return Err(SurveyError::Config(
                "max_skew_degrees must be within 0-45".to_string(),
            ));
        }
        if self.max_image_dimension == 0 {
            return Err(SurveyError::Config(
                "max_image_dimension cannot be 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parameters of the fixed preprocessing pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessParams {
    /// Filter strength `h` of the non-local means denoiser
    pub denoise_strength: f32,
    /// CLAHE clip limit
    pub clahe_clip_limit: f32,
    /// CLAHE tile grid (columns, rows)
    pub clahe_grid: (u32, u32),
    /// Adaptive threshold neighbourhood size, odd
    pub adaptive_block_size: u32,
    /// Constant subtracted from the local weighted mean
    pub adaptive_offset: f32,
    /// Skew below this many degrees is left uncorrected
    pub min_correction_degrees: f64,
}

impl Default for PreprocessParams {
    fn default() -> Self {
        Self {
            denoise_strength: 10.0,
            clahe_clip_limit: 2.0,
            clahe_grid: (8, 8),
            adaptive_block_size: 11,
            adaptive_offset: 2.0,
            min_correction_degrees: 0.5,
        }
    }
}

impl PreprocessParams {
    /// Validate pipeline parameters
    pub fn validate(&self) -> SurveyResult<()> {
        if self.denoise_strength <= 0.0 {
            return Err(SurveyError::Config(
                "denoise_strength must be positive".to_string(),
            ));
        }
        if self.clahe_clip_limit <= 0.0 {
            return Err(SurveyError::Config(
                "clahe_clip_limit must be positive".to_string(),
            ));
        }
        if self.clahe_grid.0 == 0 || self.clahe_grid.1 == 0 {
            return Err(SurveyError::Config(
                "clahe_grid dimensions cannot be 0".to_string(),
            ));
        }
        if self.adaptive_block_size < 3 || self.adaptive_block_size % 2 == 0 {
            return Err(SurveyError::Config(
                "adaptive_block_size must be an odd number of at least 3".to_string(),
            ));
        }
        if self.min_correction_degrees < 0.0 {
            return Err(SurveyError::Config(
                "min_correction_degrees cannot be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Limits used by the mark-density vote and the free-form parser
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkDetection {
    /// Fraction of a checkbox band that must be ink to count as selected
    pub checkbox_fill_ratio: f64,
    /// Minimum contour area in px² for a free-form mark
    pub min_mark_contour_area: f64,
    /// Height of the strips used to re-locate an OCR line
    pub strip_height: u32,
    /// Fraction of the image height scanned for the participant header
    pub header_fraction: f64,
}

impl Default for MarkDetection {
    fn default() -> Self {
        Self {
            checkbox_fill_ratio: 0.2,
            min_mark_contour_area: 50.0,
            strip_height: 50,
            header_fraction: 0.2,
        }
    }
}

impl MarkDetection {
    /// Validate mark detection limits
    pub fn validate(&self) -> SurveyResult<()> {
        if !(0.0..1.0).contains(&self.checkbox_fill_ratio) {
            return Err(SurveyError::Config(
                "checkbox_fill_ratio must be within [0, 1)".to_string(),
            ));
        }
        if self.min_mark_contour_area < 0.0 {
            return Err(SurveyError::Config(
                "min_mark_contour_area cannot be negative".to_string(),
            ));
        }
        if self.strip_height == 0 {
            return Err(SurveyError::Config("strip_height cannot be 0".to_string()));
        }
        if !(0.0..=1.0).contains(&self.header_fraction) || self.header_fraction == 0.0 {
            return Err(SurveyError::Config(
                "header_fraction must be within (0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parameters of template alignment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignmentParams {
    /// Nearest / second-nearest distance ratio for accepting a match
    pub ratio_threshold: f32,
    /// Fewer good matches than this leaves the image unaligned
    pub min_matches: usize,
    /// RANSAC inlier distance in pixels
    pub reprojection_threshold: f64,
    /// Upper bound on keypoints kept per image
    pub max_features: usize,
    /// RANSAC iterations
    pub ransac_iterations: usize,
}

impl Default for AlignmentParams {
    fn default() -> Self {
        Self {
            ratio_threshold: 0.7,
            min_matches: 10,
            reprojection_threshold: 5.0,
            max_features: 500,
            ransac_iterations: 2000,
        }
    }
}

impl AlignmentParams {
    /// Validate alignment parameters
    pub fn validate(&self) -> SurveyResult<()> {
        if !(0.0..=1.0).contains(&self.ratio_threshold) || self.ratio_threshold == 0.0 {
            return Err(SurveyError::Config(
                "ratio_threshold must be within (0, 1]".to_string(),
            ));
        }
        if self.min_matches < 4 {
            return Err(SurveyError::Config(
                "min_matches must be at least 4 to fit a homography".to_string(),
            ));
        }
        if self.reprojection_threshold <= 0.0 {
            return Err(SurveyError::Config(
                "reprojection_threshold must be positive".to_string(),
            ));
        }
        if self.max_features == 0 || self.ransac_iterations == 0 {
            return Err(SurveyError::Config(
                "max_features and ransac_iterations cannot be 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Unified scan configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Directory of captured images
    pub input_dir: PathBuf,
    /// Directory receiving `processed_<name>` outputs
    pub output_dir: PathBuf,
    /// Accepted file extensions, lowercase with leading dot
    pub extensions: Vec<String>,
    /// Dispatch images to a thread pool
    pub parallel: bool,
    /// Worker count for parallel runs; rayon's default when absent
    pub max_threads: Option<usize>,
    /// Images scoring below this are rejected before OCR
    pub min_quality_score: f64,
    /// Problem flag thresholds
    pub quality: QualityThresholds,
    /// Preprocessing pipeline parameters
    pub preprocess: PreprocessParams,
    /// Mark detection limits
    pub marks: MarkDetection,
    /// Template alignment parameters
    pub alignment: AlignmentParams,
    /// OCR processing configuration
    pub ocr: OcrConfig,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("input"),
            output_dir: PathBuf::from("output"),
            extensions: vec![".png".to_string(), ".jpg".to_string(), ".jpeg".to_string()],
            parallel: false,
            max_threads: None,
            min_quality_score: 0.5,
            quality: QualityThresholds::default(),
            preprocess: PreprocessParams::default(),
            marks: MarkDetection::default(),
            alignment: AlignmentParams::default(),
            ocr: OcrConfig::default(),
        }
    }
}

impl ScanConfig {
    /// Load configuration from environment variables on top of the defaults
    pub fn from_env() -> SurveyResult<Self> {
        let mut config = Self::default();

        if let Ok(dir) = env::var("SURVEY_INPUT_DIR") {
            config.input_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = env::var("SURVEY_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        config.parallel = env::var("SURVEY_PARALLEL")
            .unwrap_or_else(|_| "false".to_string())
            .to_lowercase()
            == "true";
        if let Ok(threads) = env::var("SURVEY_MAX_THREADS") {
            config.max_threads = Some(threads.parse().map_err(|_| {
                SurveyError::Config("SURVEY_MAX_THREADS must be a valid number".to_string())
            })?);
        }
        config.min_quality_score = env::var("SURVEY_MIN_QUALITY")
            .unwrap_or_else(|_| "0.5".to_string())
            .parse()
            .map_err(|_| {
                SurveyError::Config("SURVEY_MIN_QUALITY must be a valid number".to_string())
            })?;
        if let Ok(extensions) = env::var("SURVEY_EXTENSIONS") {
            config.extensions = parse_extensions(&extensions);
        }
        if let Ok(languages) = env::var("OCR_LANGUAGES") {
            config.ocr.languages = languages;
        }
        config.ocr.tessdata_path = env::var("TESSDATA_PREFIX").ok();

        Ok(config)
    }

    /// Validate all configuration sections
    pub fn validate(&self) -> SurveyResult<()> {
        if self.extensions.is_empty() {
            return Err(SurveyError::Config(
                "At least one file extension is required".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_quality_score) {
            return Err(SurveyError::Config(
                "min_quality_score must be within 0-1".to_string(),
            ));
        }
        if self.max_threads == Some(0) {
            return Err(SurveyError::Config("max_threads cannot be 0".to_string()));
        }
        self.quality.validate()?;
        self.preprocess.validate()?;
        self.marks.validate()?;
        self.alignment.validate()?;
        self.ocr.validate()?;
        Ok(())
    }

    /// Get a summary of the current configuration for logging
    pub fn summary(&self) -> String {
        format!(
            "Configuration: input_dir={}, output_dir={}, extensions={}, parallel={}, min_quality={}, ocr_languages={}",
            self.input_dir.display(),
            self.output_dir.display(),
            self.extensions.join(","),
            self.parallel,
            self.min_quality_score,
            self.ocr.languages
        )
    }
}

/// Parse a comma separated extension list into lowercase dotted form
pub fn parse_extensions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{}", ext))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validation() {
        let config = ScanConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.extensions, vec![".png", ".jpg", ".jpeg"]);
        assert!(!config.parallel);
        assert_eq!(config.min_quality_score, 0.5);
        assert_eq!(config.quality.max_image_dimension, 4000);
    }

    #[test]
    fn test_parse_extensions() {
        assert_eq!(
            parse_extensions("PNG, .jpg,,tiff "),
            vec![".png", ".jpg", ".tiff"]
        );
        assert!(parse_extensions(" , ").is_empty());
    }

    #[test]
    fn test_quality_threshold_validation() {
        let mut thresholds = QualityThresholds::default();
        assert!(thresholds.validate().is_ok());

        thresholds.min_brightness = 220.0;
        assert!(thresholds.validate().is_err());
        thresholds.min_brightness = 50.0;

        thresholds.max_skew_degrees = 60.0;
        assert!(thresholds.validate().is_err());
        thresholds.max_skew_degrees = 5.0;

        thresholds.max_image_dimension = 0;
        assert!(thresholds.validate().is_err());
    }

    #[test]
    fn test_preprocess_params_validation() {
        let mut params = PreprocessParams::default();
        assert!(params.validate().is_ok());

        params.adaptive_block_size = 10;
        assert!(params.validate().is_err());
        params.adaptive_block_size = 11;

        params.clahe_grid = (0, 8);
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_scan_config_validation() {
        let mut config = ScanConfig::default();

        config.min_quality_score = 1.5;
        assert!(config.validate().is_err());
        config.min_quality_score = 0.5;

        config.extensions.clear();
        assert!(config.validate().is_err());
        config.extensions = vec![".png".to_string()];

        config.max_threads = Some(0);
        assert!(config.validate().is_err());
        config.max_threads = Some(4);

        config.alignment.min_matches = 3;
        assert!(config.validate().is_err());
        config.alignment.min_matches = 10;

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_summary_mentions_directories() {
        let summary = ScanConfig::default().summary();
        assert!(summary.contains("input_dir=input"));
        assert!(summary.contains("ocr_languages=spa"));
    }
}
