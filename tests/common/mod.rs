//! # Test Helper Library
//!
//! Synthetic images and a scripted text recognizer shared by the integration
//! tests, so no Tesseract install is needed to run them.

#![allow(dead_code)]

use image::{GrayImage, Luma};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use survey_scan::ocr::TextRecognizer;
use survey_scan::ocr_errors::OcrError;

/// Horizontal bands alternating between `dark` and `light`, starting dark
pub fn banded(width: u32, height: u32, band: u32, dark: u8, light: u8) -> GrayImage {
    GrayImage::from_fn(width, height, |_, y| {
        if (y / band) % 2 == 0 {
            Luma([dark])
        } else {
            Luma([light])
        }
    })
}

/// Saves `image` as PNG under `dir` and returns its path
pub fn save_png(dir: &Path, name: &str, image: &GrayImage) -> PathBuf {
    let path = dir.join(name);
    image.save(&path).expect("test image should be saved");
    path
}

/// Returns the scripted text of the first rule whose height matches the region.
///
/// Regions with no matching rule recognize as `fallback`. Every request is
/// recorded as the region dimensions.
pub struct ScriptedRecognizer {
    by_height: Vec<(u32, String)>,
    fallback: Result<String, OcrError>,
    pub requests: Mutex<Vec<(u32, u32)>>,
}

impl ScriptedRecognizer {
    pub fn constant(text: &str) -> Self {
        Self {
            by_height: Vec::new(),
            fallback: Ok(text.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            by_height: Vec::new(),
            fallback: Err(OcrError::Extraction("scripted failure".to_string())),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn by_height(rules: &[(u32, &str)]) -> Self {
        Self {
            by_height: rules.iter().map(|(h, t)| (*h, t.to_string())).collect(),
            fallback: Ok(String::new()),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl TextRecognizer for ScriptedRecognizer {
    fn recognize_text(
        &self,
        region: &GrayImage,
        _language_hint: &str,
        _allowed_characters: &str,
    ) -> Result<String, OcrError> {
        self.requests.lock().push(region.dimensions());
        match self.by_height.iter().find(|(h, _)| *h == region.height()) {
            Some((_, text)) => Ok(text.clone()),
            None => self.fallback.clone(),
        }
    }
}
