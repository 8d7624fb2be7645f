//! # Image Preprocessing Module
//!
//! This module turns captured survey photos into normalized, OCR-ready images.
//!
//! The module is organized into focused sub-modules:
//! - `quality`: Quality scoring and problem flags with remediation hints
//! - `deskewing`: Line-based skew detection and rotation correction
//! - `filtering`: Non-local means denoising and CLAHE contrast enhancement
//! - `thresholding`: Otsu and Gaussian adaptive binarization
//! - `pipeline`: The quality gate and fixed preprocessing sequence
//! - `types`: Shared types

pub mod deskewing;
pub mod filtering;
pub mod pipeline;
pub mod quality;
pub mod thresholding;
pub mod types;

// Re-export commonly used types and functions for convenience
pub use types::{
    AcceptedImage, ImageStatistics, PreprocessOutcome, ProblemFlag, ProblemReport, QualityMetrics,
    Rejection,
};

pub use deskewing::{correct_skew, detect_line_segments, detect_skew};
pub use filtering::{apply_clahe, denoise_non_local_means};
pub use pipeline::ImagePreprocessor;
pub use quality::{assess_quality, check_image_problems, optimization_suggestions, quality_metrics};
pub use thresholding::{
    adaptive_gaussian_threshold, binarize_otsu, binarize_otsu_inverted, foreground_ratio,
    otsu_level,
};
