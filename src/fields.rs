//! # Field Extraction Module
//!
//! Reads pre-registered rectangular fields out of a scanned form. A
//! [`ScanTemplate`] holds the field layout (and optionally a reference image
//! the capture is aligned against); a [`SurveyScanner`] applies it.
//!
//! ## Field kinds
//!
//! - **Text**: the recognized text of the crop, trimmed
//! - **Number**: the digit characters of the recognized text
//! - **Checkbox**: a mark-density vote over equal horizontal bands, one band
//!   per option in declaration order
//!
//! A field that fails to extract degrades to an empty string and never aborts
//! the scan of the remaining fields.

use image::imageops::crop_imm;
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::alignment::TemplateAligner;
use crate::config::{AlignmentParams, MarkDetection, ScanConfig};
use crate::errors::{error_logging, SurveyError, SurveyResult};
use crate::observability;
use crate::ocr::{clean_text, TextRecognizer};
use crate::ocr_config::OcrConfig;
use crate::preprocessing::{binarize_otsu_inverted, ImagePreprocessor};

/// What a field contains and how it is read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Number,
    Checkbox { options: Vec<String> },
}

impl FieldKind {
    /// Builds a kind from its type tag, validating checkbox options.
    ///
    /// # Errors
    ///
    /// `SurveyError::InvalidSpec` for an unknown tag or a checkbox without options.
    pub fn from_tag(tag: &str, options: Vec<String>) -> SurveyResult<Self> {
        let kind = match tag {
            "text" => FieldKind::Text,
            "number" => FieldKind::Number,
            "checkbox" => FieldKind::Checkbox { options },
            other => {
                return Err(SurveyError::InvalidSpec(format!(
                    "unknown field type '{}', expected text, number or checkbox",
                    other
                )))
            }
        };
        kind.validate()?;
        Ok(kind)
    }

    pub fn tag(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Number => "number",
            FieldKind::Checkbox { .. } => "checkbox",
        }
    }

    fn validate(&self) -> SurveyResult<()> {
        if let FieldKind::Checkbox { options } = self {
            if options.is_empty() {
                return Err(SurveyError::InvalidSpec(
                    "checkbox fields require at least one option".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Field rectangle in reference-image pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FieldBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The part of the box inside a `width` x `height` image, if any.
    pub fn clipped_to(&self, width: u32, height: u32) -> Option<FieldBox> {
        if self.x >= width || self.y >= height {
            return None;
        }
        let clipped_width = self.width.min(width - self.x);
        let clipped_height = self.height.min(height - self.y);
        if clipped_width == 0 || clipped_height == 0 {
            return None;
        }
        Some(FieldBox::new(self.x, self.y, clipped_width, clipped_height))
    }
}

/// A named field with its location and kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyFieldSpec {
    pub name: String,
    pub region: FieldBox,
    pub kind: FieldKind,
}

impl SurveyFieldSpec {
    pub fn new(name: impl Into<String>, region: FieldBox, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            region,
            kind,
        }
    }
}

/// Flat, string-tagged field definition as found in template JSON files
#[derive(Debug, Clone, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub options: Vec<String>,
}

impl TryFrom<FieldDefinition> for SurveyFieldSpec {
    type Error = SurveyError;

    fn try_from(definition: FieldDefinition) -> SurveyResult<Self> {
        let kind = FieldKind::from_tag(&definition.field_type, definition.options)?;
        Ok(SurveyFieldSpec::new(
            definition.name,
            FieldBox::new(definition.x, definition.y, definition.width, definition.height),
            kind,
        ))
    }
}

/// Layout of a fixed form: registered fields plus an optional reference image
#[derive(Debug, Clone, Default)]
pub struct ScanTemplate {
    fields: Vec<SurveyFieldSpec>,
    reference: Option<GrayImage>,
}

impl ScanTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON array of field definitions.
    ///
    /// # Examples
    ///
    /// ```
    /// use survey_scan::fields::ScanTemplate;
    ///
    /// let template = ScanTemplate::from_json(
    ///     r#"[{"name": "age", "x": 10, "y": 20, "width": 80, "height": 30, "type": "number"}]"#,
    /// ).unwrap();
    /// assert_eq!(template.fields().len(), 1);
    /// ```
    pub fn from_json(json: &str) -> SurveyResult<Self> {
        let definitions: Vec<FieldDefinition> = serde_json::from_str(json)
            .map_err(|e| SurveyError::InvalidSpec(format!("malformed template JSON: {}", e)))?;
        let mut template = Self::new();
        for definition in definitions {
            template.register_field(definition)?;
        }
        Ok(template)
    }

    /// Loads the reference image fields are laid out against, stored in grayscale.
    pub fn with_reference_image(mut self, path: &Path) -> SurveyResult<Self> {
        if !path.exists() {
            return Err(SurveyError::NotFound(path.to_path_buf()));
        }
        let image = image::open(path).map_err(|e| SurveyError::LoadError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        self.reference = Some(image.to_luma8());
        Ok(self)
    }

    /// Registers a string-tagged definition.
    ///
    /// # Errors
    ///
    /// `SurveyError::InvalidSpec` when the type tag is unknown, a checkbox
    /// has no options or the name is already registered.
    pub fn register_field(&mut self, definition: FieldDefinition) -> SurveyResult<()> {
        let spec = SurveyFieldSpec::try_from(definition)?;
        self.register(spec)
    }

    /// Registers an already-typed field. Field names are unique per template.
    pub fn register(&mut self, spec: SurveyFieldSpec) -> SurveyResult<()> {
        spec.kind.validate()?;
        if spec.name.trim().is_empty() {
            return Err(SurveyError::InvalidSpec("field name cannot be empty".to_string()));
        }
        if spec.region.width == 0 || spec.region.height == 0 {
            return Err(SurveyError::InvalidSpec(format!(
                "field '{}' has an empty region",
                spec.name
            )));
        }
        if self.fields.iter().any(|field| field.name == spec.name) {
            return Err(SurveyError::InvalidSpec(format!(
                "field '{}' is already registered",
                spec.name
            )));
        }
        debug!(field = %spec.name, kind = spec.kind.tag(), "Registered field");
        self.fields.push(spec);
        Ok(())
    }

    pub fn fields(&self) -> &[SurveyFieldSpec] {
        &self.fields
    }

    pub fn reference_image(&self) -> Option<&GrayImage> {
        self.reference.as_ref()
    }
}

/// Extracts registered fields from captured images.
pub struct SurveyScanner {
    template: ScanTemplate,
    aligner: Option<TemplateAligner>,
    recognizer: Arc<dyn TextRecognizer>,
    preprocessor: ImagePreprocessor,
    marks: MarkDetection,
    ocr: OcrConfig,
}

impl SurveyScanner {
    pub fn new(template: ScanTemplate, recognizer: Arc<dyn TextRecognizer>, config: &ScanConfig) -> Self {
        let aligner = template
            .reference_image()
            .map(|reference| TemplateAligner::new(reference, config.alignment.clone()));
        Self {
            template,
            aligner,
            recognizer,
            preprocessor: ImagePreprocessor::new(config),
            marks: config.marks.clone(),
            ocr: config.ocr.clone(),
        }
    }

    /// Scanner with default configuration
    pub fn with_defaults(template: ScanTemplate, recognizer: Arc<dyn TextRecognizer>) -> Self {
        Self::new(template, recognizer, &ScanConfig::default())
    }

    pub fn template(&self) -> &ScanTemplate {
        &self.template
    }

    /// Replaces the alignment parameters, recomputing reference features.
    pub fn set_alignment_params(&mut self, params: AlignmentParams) {
        self.aligner = self
            .template
            .reference_image()
            .map(|reference| TemplateAligner::new(reference, params));
    }

    /// Reads every registered field from `image`.
    ///
    /// When the template carries a reference image the capture is aligned
    /// first. Failing fields map to an empty string.
    pub fn scan(&self, image: &GrayImage) -> BTreeMap<String, String> {
        let start_time = std::time::Instant::now();
        let aligned: Cow<'_, GrayImage> = match &self.aligner {
            Some(aligner) => Cow::Owned(aligner.align(image)),
            None => Cow::Borrowed(image),
        };

        let mut values = BTreeMap::new();
        for field in self.template.fields() {
            let value = match self.extract_field(&aligned, field) {
                Ok(value) => value,
                Err(err) => {
                    error_logging::log_field_error(&err, &field.name, field.kind.tag());
                    observability::record_field_extraction_failure(field.kind.tag());
                    String::new()
                }
            };
            values.insert(field.name.clone(), value);
        }

        info!(
            fields = values.len(),
            duration_ms = start_time.elapsed().as_millis() as u64,
            "Field scan completed"
        );
        values
    }

    fn extract_field(&self, image: &GrayImage, field: &SurveyFieldSpec) -> SurveyResult<String> {
        let region = field
            .region
            .clipped_to(image.width(), image.height())
            .ok_or_else(|| SurveyError::Extraction {
                field: field.name.clone(),
                message: format!(
                    "region {:?} lies outside the {}x{} image",
                    field.region,
                    image.width(),
                    image.height()
                ),
            })?;
        let crop = crop_imm(image, region.x, region.y, region.width, region.height).to_image();

        match &field.kind {
            FieldKind::Text => self.read_text(&crop),
            FieldKind::Number => Ok(self
                .read_text(&crop)?
                .chars()
                .filter(|c| c.is_ascii_digit())
                .collect()),
            FieldKind::Checkbox { options } => self.read_checkbox(&field.name, &crop, options),
        }
    }

    fn read_text(&self, crop: &GrayImage) -> SurveyResult<String> {
        let prepared = self.preprocessor.prepare_for_ocr(crop)?;
        let raw = self.recognizer.recognize_text(
            &prepared,
            &self.ocr.languages,
            &self.ocr.character_whitelist,
        )?;
        Ok(clean_text(&raw).trim().to_string())
    }

    fn read_checkbox(&self, name: &str, crop: &GrayImage, options: &[String]) -> SurveyResult<String> {
        let selected = checkbox_selection(crop, options, self.marks.checkbox_fill_ratio).ok_or_else(
            || SurveyError::Extraction {
                field: name.to_string(),
                message: format!(
                    "region height {} is too small for {} options",
                    crop.height(),
                    options.len()
                ),
            },
        )?;
        Ok(selected.join(", "))
    }
}

/// Options whose band holds more ink than `fill_ratio` of its area.
///
/// The crop is split into `options.len()` horizontal bands covering its full
/// height, band `i` spanning rows `i*h/n .. (i+1)*h/n`. Returns `None` when
/// the crop is too short to give every option a band.
pub fn checkbox_selection<'a>(
    crop: &GrayImage,
    options: &'a [String],
    fill_ratio: f64,
) -> Option<Vec<&'a str>> {
    if options.is_empty() {
        return Some(Vec::new());
    }
    let count = options.len() as u64;
    let height = crop.height() as u64;
    if height < count || crop.width() == 0 {
        return None;
    }

    let binary = binarize_otsu_inverted(crop);
    let band_edge = |index: u64| (index * height / count) as u32;

    let selected = options
        .iter()
        .enumerate()
        .filter(|(index, _)| {
            let top = band_edge(*index as u64);
            let bottom = band_edge(*index as u64 + 1);
            let band_area = ((bottom - top) * binary.width()) as f64;
            let marked = (top..bottom)
                .flat_map(|y| (0..binary.width()).map(move |x| (x, y)))
                .filter(|&(x, y)| binary.get_pixel(x, y)[0] == 255)
                .count();
            marked as f64 > fill_ratio * band_area
        })
        .map(|(_, option)| option.as_str())
        .collect();
    Some(selected)
}
