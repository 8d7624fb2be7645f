//! # Survey Scan Error Types
//!
//! This module defines the error taxonomy shared by the scanning pipeline.
//! Construction-time path errors are fatal to the operation that raised them;
//! per-image and per-field failures are recovered by the caller.

use std::fmt;
use std::path::PathBuf;

use crate::ocr_errors::OcrError;

/// General error type for the scanning pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum SurveyError {
    /// A file or directory does not exist
    NotFound(PathBuf),
    /// A path that must be a directory is not one
    NotADirectory(PathBuf),
    /// Bytes on disk could not be decoded as an image
    LoadError { path: PathBuf, message: String },
    /// A field specification was rejected at registration
    InvalidSpec(String),
    /// A single field could not be extracted
    Extraction { field: String, message: String },
    /// The image scored below the configured minimum quality.
    /// Not a fault: low-quality captures are expected in bulk workflows.
    RejectedLowQuality { path: PathBuf, quality: f64 },
    /// Image processing operation failed
    Processing(String),
    /// File system errors
    Io(String),
    /// Text recognition errors
    Ocr(OcrError),
    /// Configuration validation errors
    Config(String),
}

impl fmt::Display for SurveyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SurveyError::NotFound(path) => write!(f, "[NOT_FOUND] {}", path.display()),
            SurveyError::NotADirectory(path) => {
                write!(f, "[NOT_A_DIRECTORY] {}", path.display())
            }
            SurveyError::LoadError { path, message } => {
                write!(f, "[LOAD] Failed to load image {}: {}", path.display(), message)
            }
            SurveyError::InvalidSpec(msg) => write!(f, "[INVALID_SPEC] {}", msg),
            SurveyError::Extraction { field, message } => {
                write!(f, "[EXTRACTION] Field '{}': {}", field, message)
            }
            SurveyError::RejectedLowQuality { path, quality } => write!(
                f,
                "[REJECTED] Image {} scored {:.2}, below the minimum quality",
                path.display(),
                quality
            ),
            SurveyError::Processing(msg) => write!(f, "[PROCESSING] {}", msg),
            SurveyError::Io(msg) => write!(f, "[FILESYSTEM] {}", msg),
            SurveyError::Ocr(err) => write!(f, "{}", err),
            SurveyError::Config(msg) => write!(f, "[CONFIG] {}", msg),
        }
    }
}

impl std::error::Error for SurveyError {}

impl From<OcrError> for SurveyError {
    fn from(err: OcrError) -> Self {
        SurveyError::Ocr(err)
    }
}

impl From<std::io::Error> for SurveyError {
    fn from(err: std::io::Error) -> Self {
        SurveyError::Io(err.to_string())
    }
}

impl From<image::ImageError> for SurveyError {
    fn from(err: image::ImageError) -> Self {
        SurveyError::Processing(err.to_string())
    }
}

/// Result type alias for convenience
pub type SurveyResult<T> = Result<T, SurveyError>;

/// Standardized error logging utilities for consistent error reporting across the pipeline
pub mod error_logging {
    use std::path::Path;
    use tracing::{error, warn};

    /// Log a per-image failure with the source path and pipeline stage
    pub fn log_image_error(error: &impl std::fmt::Display, operation: &str, path: &Path) {
        error!(
            error = %error,
            operation = %operation,
            path = %path.display(),
            "Image processing failed"
        );
    }

    /// Log a per-field extraction failure; the field degrades to an empty value
    pub fn log_field_error(error: &impl std::fmt::Display, field: &str, field_type: &str) {
        warn!(
            error = %error,
            field = %field,
            field_type = %field_type,
            "Field extraction failed, recording empty value"
        );
    }

    /// Log OCR errors with region context
    pub fn log_ocr_error(
        error: &impl std::fmt::Display,
        operation: &str,
        region_size: Option<(u32, u32)>,
    ) {
        error!(
            error = %error,
            operation = %operation,
            region_size = ?region_size,
            "OCR processing failed"
        );
    }

    /// Log file system errors with path and operation context
    pub fn log_filesystem_error(error: &impl std::fmt::Display, operation: &str, path: &Path) {
        error!(
            error = %error,
            operation = %operation,
            path = %path.display(),
            "File system operation failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_path() {
        let err = SurveyError::NotFound(PathBuf::from("/tmp/missing.png"));
        assert!(err.to_string().contains("missing.png"));
    }

    #[test]
    fn test_ocr_error_conversion() {
        let err: SurveyError = OcrError::Extraction("boom".to_string()).into();
        assert!(matches!(err, SurveyError::Ocr(OcrError::Extraction(_))));
    }

    #[test]
    fn test_rejection_display_carries_score() {
        let err = SurveyError::RejectedLowQuality {
            path: PathBuf::from("scan.jpg"),
            quality: 0.31,
        };
        assert!(err.to_string().contains("0.31"));
    }
}
