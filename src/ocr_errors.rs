//! # OCR Error Types Module
//!
//! This module defines the error type returned by text-recognition backends.
//! Field extraction and free-form parsing recover from these locally.

/// Custom error types for OCR operations
#[derive(Debug, Clone, PartialEq)]
pub enum OcrError {
    /// OCR engine initialization errors
    Initialization(String),
    /// The pixel region could not be handed to the engine
    ImageEncode(String),
    /// Text extraction errors
    Extraction(String),
}

impl std::fmt::Display for OcrError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OcrError::Initialization(msg) => {
                write!(f, "[OCR_INIT] OCR engine initialization failed: {}", msg)
            }
            OcrError::ImageEncode(msg) => {
                write!(f, "[OCR_IMAGE] Failed to prepare region for OCR: {}", msg)
            }
            OcrError::Extraction(msg) => {
                write!(f, "[OCR_EXTRACT] Text extraction from region failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for OcrError {}

impl From<anyhow::Error> for OcrError {
    fn from(err: anyhow::Error) -> Self {
        OcrError::Extraction(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefixes() {
        assert!(OcrError::Initialization("x".into())
            .to_string()
            .starts_with("[OCR_INIT]"));
        assert!(OcrError::ImageEncode("x".into())
            .to_string()
            .starts_with("[OCR_IMAGE]"));
        assert!(OcrError::Extraction("x".into())
            .to_string()
            .starts_with("[OCR_EXTRACT]"));
    }
}
