//! # OCR Processing Module
//!
//! This module defines the text-recognition capability the scanner depends on
//! and its Tesseract-backed implementation.
//!
//! ## Contract
//!
//! Every request carries a language hint and a restricted character whitelist,
//! and asks for a single uniform block layout. Implementations return the raw
//! recognized text; trimming and blank-line removal happen in [`clean_text`].
//!
//! ## Dependencies
//!
//! - `leptess`: Rust bindings for Tesseract OCR and Leptonica
//! - `image`: PNG encoding of the pixel region handed to the engine

use image::{DynamicImage, GrayImage, ImageFormat};
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;

use crate::instance_manager::OcrInstanceManager;
use crate::observability;
use crate::ocr_config::OcrConfig;
use crate::ocr_errors::OcrError;

/// Recognize text in a pixel region.
///
/// Implementations must be shareable across batch workers.
pub trait TextRecognizer: Send + Sync {
    /// Returns the text found in `region`, restricted to `allowed_characters`.
    fn recognize_text(
        &self,
        region: &GrayImage,
        language_hint: &str,
        allowed_characters: &str,
    ) -> Result<String, OcrError>;
}

/// Tesseract implementation of [`TextRecognizer`] reusing pooled engine instances.
pub struct TesseractRecognizer {
    config: OcrConfig,
    instances: Arc<OcrInstanceManager>,
}

impl TesseractRecognizer {
    pub fn new(config: OcrConfig) -> Self {
        Self::with_instance_manager(config, Arc::new(OcrInstanceManager::new()))
    }

    pub fn with_instance_manager(config: OcrConfig, instances: Arc<OcrInstanceManager>) -> Self {
        Self { config, instances }
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn recognize_text(
        &self,
        region: &GrayImage,
        language_hint: &str,
        allowed_characters: &str,
    ) -> Result<String, OcrError> {
        let _span = observability::ocr_span("recognize_text").entered();
        let start_time = std::time::Instant::now();
        let png = encode_region(region)?;

        let instance = self
            .instances
            .get_instance(
                self.config.tessdata_path.as_deref(),
                language_hint,
                self.config.page_seg_mode,
                allowed_characters,
            )
            .map_err(|e| OcrError::Initialization(e.to_string()))?;

        let text = {
            let mut tess = instance.lock();
            tess.set_image_from_mem(&png).map_err(|e| {
                OcrError::ImageEncode(format!("Failed to load region into Tesseract: {e}"))
            })?;
            tess.get_utf8_text().map_err(|e| {
                OcrError::Extraction(format!("Failed to extract text from region: {e}"))
            })?
        };

        debug!(
            "OCR region {}x{} completed in {}ms, {} characters",
            region.width(),
            region.height(),
            start_time.elapsed().as_millis(),
            text.len()
        );

        Ok(text)
    }
}

/// Encodes a grayscale region as PNG bytes for the engine.
pub fn encode_region(region: &GrayImage) -> Result<Vec<u8>, OcrError> {
    if region.width() == 0 || region.height() == 0 {
        return Err(OcrError::ImageEncode("region is empty".to_string()));
    }
    let mut bytes = Vec::new();
    DynamicImage::ImageLuma8(region.clone())
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| OcrError::ImageEncode(e.to_string()))?;
    Ok(bytes)
}

/// Trims every line and drops blank ones.
pub fn clean_text(raw: &str) -> String {
    raw.trim()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<&str>>()
        .join("\n")
}
