//! # Shared Types for Image Preprocessing
//!
//! This module contains the shared types used across the preprocessing
//! sub-modules: quality metrics, problem reports and the tagged outcome of
//! running one image through the pipeline.

use image::GrayImage;
use serde::Serialize;
use std::path::PathBuf;

use crate::config::QualityThresholds;
use crate::errors::SurveyError;

/// Component scores of an image quality assessment.
///
/// Every score lies in [0, 1]; `overall_quality` is their unweighted mean,
/// with skew contributing `1 - min(|angle| / 45, 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualityMetrics {
    /// Mean intensity / 255
    pub brightness: f64,
    /// Intensity standard deviation / 128, clamped
    pub contrast: f64,
    /// Laplacian variance / 1000, clamped
    pub sharpness: f64,
    /// min(width, height) / 1000, clamped
    pub size_score: f64,
    /// Dominant line angle in degrees, within [-45, 45]
    pub skew_angle_degrees: f64,
    pub overall_quality: f64,
}

impl QualityMetrics {
    /// Brightness scored by its distance from mid-scale
    pub fn brightness_score(&self) -> f64 {
        1.0 - (0.5 - self.brightness).abs()
    }

    pub fn skew_score(&self) -> f64 {
        1.0 - (self.skew_angle_degrees.abs() / 45.0).min(1.0)
    }

    /// All-zero metrics reported when an assessment cannot be computed
    pub fn zero() -> Self {
        Self {
            brightness: 0.0,
            contrast: 0.0,
            sharpness: 0.0,
            size_score: 0.0,
            skew_angle_degrees: 0.0,
            overall_quality: 0.0,
        }
    }
}

/// Raw statistics the problem flags are derived from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ImageStatistics {
    pub width: u32,
    pub height: u32,
    /// Mean intensity on the 0-255 scale
    pub mean_intensity: f64,
    /// Intensity standard deviation on the 0-255 scale
    pub intensity_stdev: f64,
    pub laplacian_variance: f64,
    pub skew_angle_degrees: f64,
}

/// Concrete defects an image can be flagged for, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ProblemFlag {
    TooLarge,
    TooDark,
    TooBright,
    LowContrast,
    Blurry,
    Skewed,
}

impl ProblemFlag {
    pub const ALL: [ProblemFlag; 6] = [
        ProblemFlag::TooLarge,
        ProblemFlag::TooDark,
        ProblemFlag::TooBright,
        ProblemFlag::LowContrast,
        ProblemFlag::Blurry,
        ProblemFlag::Skewed,
    ];

    /// Stable identifier used in logs and reports
    pub fn name(&self) -> &'static str {
        match self {
            ProblemFlag::TooLarge => "tooLarge",
            ProblemFlag::TooDark => "tooDark",
            ProblemFlag::TooBright => "tooBright",
            ProblemFlag::LowContrast => "lowContrast",
            ProblemFlag::Blurry => "blurry",
            ProblemFlag::Skewed => "skewed",
        }
    }

    /// Remediation hint shown to the operator
    pub fn suggestion(&self, thresholds: &QualityThresholds) -> String {
        match self {
            ProblemFlag::TooLarge => format!(
                "Reduce the image size to at most {}x{} pixels",
                thresholds.max_image_dimension, thresholds.max_image_dimension
            ),
            ProblemFlag::TooDark => "Increase the image brightness".to_string(),
            ProblemFlag::TooBright => "Reduce the brightness or increase the contrast".to_string(),
            ProblemFlag::LowContrast => "Improve the image contrast".to_string(),
            ProblemFlag::Blurry => {
                "Use a sharper image or apply a sharpening technique".to_string()
            }
            ProblemFlag::Skewed => "Correct the image rotation".to_string(),
        }
    }
}

/// Independent defect flags computed from fixed thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProblemReport {
    pub too_large: bool,
    pub too_dark: bool,
    pub too_bright: bool,
    pub low_contrast: bool,
    pub blurry: bool,
    pub skewed: bool,
    pub statistics: ImageStatistics,
}

impl ProblemReport {
    pub fn is_set(&self, flag: ProblemFlag) -> bool {
        match flag {
            ProblemFlag::TooLarge => self.too_large,
            ProblemFlag::TooDark => self.too_dark,
            ProblemFlag::TooBright => self.too_bright,
            ProblemFlag::LowContrast => self.low_contrast,
            ProblemFlag::Blurry => self.blurry,
            ProblemFlag::Skewed => self.skewed,
        }
    }

    /// The flags that are set, in declaration order
    pub fn flags(&self) -> Vec<ProblemFlag> {
        ProblemFlag::ALL
            .into_iter()
            .filter(|flag| self.is_set(*flag))
            .collect()
    }

    pub fn has_problems(&self) -> bool {
        ProblemFlag::ALL.iter().any(|flag| self.is_set(*flag))
    }
}

/// An image that passed the quality gate and went through the full pipeline.
#[derive(Debug, Clone)]
pub struct AcceptedImage {
    /// Binarized, deskewed image ready for OCR
    pub image: GrayImage,
    pub metrics: QualityMetrics,
    /// Skew measured on the binarized image before correction
    pub corrected_skew_degrees: f64,
}

impl AcceptedImage {
    pub fn quality_score(&self) -> f64 {
        self.metrics.overall_quality
    }
}

/// Why an image was skipped before OCR.
#[derive(Debug, Clone)]
pub struct Rejection {
    pub path: PathBuf,
    pub quality_score: f64,
    pub min_quality_score: f64,
    pub problems: ProblemReport,
    pub suggestions: Vec<String>,
}

impl Rejection {
    /// Converts the rejection into the error surfaced by full-survey processing
    pub fn into_error(self) -> SurveyError {
        SurveyError::RejectedLowQuality {
            path: self.path,
            quality: self.quality_score,
        }
    }
}

/// Tagged result of preprocessing one image.
///
/// Low-quality rejection is an expected outcome, kept apart from failures so
/// callers can ask for a re-scan instead of investigating corruption.
#[derive(Debug, Clone)]
pub enum PreprocessOutcome {
    Accepted(AcceptedImage),
    Rejected(Rejection),
    Failed(SurveyError),
}

impl PreprocessOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, PreprocessOutcome::Accepted(_))
    }

    /// Short label used for metrics and logs
    pub fn label(&self) -> &'static str {
        match self {
            PreprocessOutcome::Accepted(_) => "accepted",
            PreprocessOutcome::Rejected(_) => "rejected",
            PreprocessOutcome::Failed(_) => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statistics() -> ImageStatistics {
        ImageStatistics {
            width: 100,
            height: 100,
            mean_intensity: 120.0,
            intensity_stdev: 40.0,
            laplacian_variance: 500.0,
            skew_angle_degrees: 0.0,
        }
    }

    #[test]
    fn test_flags_follow_declaration_order() {
        let report = ProblemReport {
            too_large: false,
            too_dark: false,
            too_bright: true,
            low_contrast: false,
            blurry: true,
            skewed: true,
            statistics: statistics(),
        };
        assert_eq!(
            report.flags(),
            vec![ProblemFlag::TooBright, ProblemFlag::Blurry, ProblemFlag::Skewed]
        );
        assert!(report.has_problems());
    }

    #[test]
    fn test_skew_score_saturates() {
        let mut metrics = QualityMetrics::zero();
        metrics.skew_angle_degrees = -90.0;
        assert_eq!(metrics.skew_score(), 0.0);
        metrics.skew_angle_degrees = 0.0;
        assert_eq!(metrics.skew_score(), 1.0);
    }

    #[test]
    fn test_too_large_suggestion_mentions_limit() {
        let thresholds = QualityThresholds::default();
        assert!(ProblemFlag::TooLarge
            .suggestion(&thresholds)
            .contains("4000x4000"));
    }
}
