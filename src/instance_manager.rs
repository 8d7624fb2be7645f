//! # OCR Instance Manager Module
//!
//! This module provides thread-safe OCR instance management for reusing Tesseract instances.
//! Reusing instances avoids paying engine initialization for every field crop.

use leptess::LepTess;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::ocr_config::PageSegMode;

/// Thread-safe OCR instance manager for reusing Tesseract instances
///
/// Instances are keyed by language, tessdata directory, page segmentation
/// mode and whitelist, since all four are baked into the engine state.
pub struct OcrInstanceManager {
    instances: Mutex<HashMap<String, Arc<Mutex<LepTess>>>>,
}

impl OcrInstanceManager {
    /// Create a new OCR instance manager with an empty pool
    pub fn new() -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// Get or create an OCR instance for the given engine settings
    ///
    /// # Errors
    ///
    /// Returns error if Tesseract instance creation fails (e.g., missing traineddata)
    pub fn get_instance(
        &self,
        tessdata_path: Option<&str>,
        language: &str,
        page_seg_mode: PageSegMode,
        whitelist: &str,
    ) -> anyhow::Result<Arc<Mutex<LepTess>>> {
        let key = format!(
            "{}:{}:{}:{}",
            language,
            tessdata_path.unwrap_or("default"),
            page_seg_mode.as_str(),
            whitelist
        );

        if let Some(instance) = self.instances.lock().get(&key) {
            return Ok(Arc::clone(instance));
        }

        info!(
            "Creating new OCR instance for language: {} (psm {})",
            language,
            page_seg_mode.as_str()
        );

        let mut tess = LepTess::new(tessdata_path, language)
            .map_err(|e| anyhow::anyhow!("Failed to initialize Tesseract OCR instance: {}", e))?;

        tess.set_variable(
            leptess::Variable::TesseditPagesegMode,
            page_seg_mode.as_str(),
        )
        .map_err(|e| anyhow::anyhow!("Failed to set PSM mode: {}", e))?;

        tess.set_variable(leptess::Variable::TesseditCharWhitelist, whitelist)
            .map_err(|e| anyhow::anyhow!("Failed to set character whitelist: {}", e))?;

        let instance = Arc::new(Mutex::new(tess));
        self.instances.lock().insert(key, Arc::clone(&instance));

        Ok(instance)
    }

    /// Get the number of cached instances
    pub fn instance_count(&self) -> usize {
        self.instances.lock().len()
    }
}

impl Default for OcrInstanceManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_manager_is_empty() {
        let manager = OcrInstanceManager::new();
        assert_eq!(manager.instance_count(), 0);
    }
}
