//! # OCR Configuration Module
//!
//! This module defines configuration structures for text recognition:
//! language selection, page layout mode and the character whitelist the
//! engine must honor for field extraction accuracy.

use serde::{Deserialize, Serialize};

use crate::errors::{SurveyError, SurveyResult};

// Constants for OCR configuration
pub const DEFAULT_LANGUAGES: &str = "spa";
/// Uppercase Latin, Spanish accented vowels and Ñ, digits and the marker punctuation.
pub const DEFAULT_CHARACTER_WHITELIST: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZÁÉÍÓÚÑ0123456789_$:/ ";

/// Page Segmentation Mode for Tesseract OCR
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum PageSegMode {
    /// Fully automatic page segmentation
    Auto = 3,
    /// Assume a single column of text
    SingleColumn = 4,
    /// Assume a single uniform block of text
    #[default]
    SingleBlock = 6,
    /// Treat the image as a single text line
    SingleLine = 7,
    /// Find as much text as possible in no particular order
    SparseText = 11,
}

impl PageSegMode {
    /// Convert PSM mode to string value for Tesseract
    pub fn as_str(&self) -> &'static str {
        match self {
            PageSegMode::Auto => "3",
            PageSegMode::SingleColumn => "4",
            PageSegMode::SingleBlock => "6",
            PageSegMode::SingleLine => "7",
            PageSegMode::SparseText => "11",
        }
    }
}

/// Configuration structure for OCR processing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    /// OCR language codes (e.g., "spa", "spa+eng")
    pub languages: String,
    /// Page segmentation mode requested for every region
    pub page_seg_mode: PageSegMode,
    /// Characters the engine may emit
    pub character_whitelist: String,
    /// Explicit tessdata directory; the engine default is used when absent
    pub tessdata_path: Option<String>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            languages: DEFAULT_LANGUAGES.to_string(),
            page_seg_mode: PageSegMode::default(),
            character_whitelist: DEFAULT_CHARACTER_WHITELIST.to_string(),
            tessdata_path: None,
        }
    }
}

impl OcrConfig {
    /// Validate OCR configuration parameters
    pub fn validate(&self) -> SurveyResult<()> {
        if self.languages.trim().is_empty() {
            return Err(SurveyError::Config("languages cannot be empty".to_string()));
        }
        if self.character_whitelist.is_empty() {
            return Err(SurveyError::Config(
                "character_whitelist cannot be empty".to_string(),
            ));
        }
        if let Some(path) = &self.tessdata_path {
            if path.trim().is_empty() {
                return Err(SurveyError::Config(
                    "tessdata_path cannot be blank when set".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_page_seg_mode_is_single_block() {
        assert_eq!(PageSegMode::default(), PageSegMode::SingleBlock);
        assert_eq!(PageSegMode::SingleBlock.as_str(), "6");
    }

    #[test]
    fn test_default_whitelist_contents() {
        let config = OcrConfig::default();
        assert!(config.character_whitelist.contains("ABCDEFGHIJKLMNOPQRSTUVWXYZ"));
        assert!(config.character_whitelist.contains("ÁÉÍÓÚÑ"));
        assert!(config.character_whitelist.contains("0123456789"));
        assert!(config.character_whitelist.contains('$'));
        assert_eq!(config.languages, "spa");
    }

    #[test]
    #[allow(unused_assignments)]
    fn test_ocr_config_validation() {
        let mut config = OcrConfig::default();
        assert!(config.validate().is_ok());

        config.languages = "  ".to_string();
        assert!(config.validate().is_err());
        config.languages = "spa".to_string();

        config.character_whitelist = String::new();
        assert!(config.validate().is_err());
        config.character_whitelist = DEFAULT_CHARACTER_WHITELIST.to_string();

        config.tessdata_path = Some(String::new());
        assert!(config.validate().is_err());
    }
}
