//! # Survey Scan
//!
//! Digitizes photographed paper surveys: a quality gate and preprocessing
//! pipeline for captured images, template alignment, field extraction for
//! fixed layouts, a parser for free-form questionnaires, and a batch runner
//! over directories of captures.

pub mod alignment;
pub mod batch;
pub mod confidence;
pub mod config;
pub mod errors;
pub mod fields;
pub mod instance_manager;
pub mod observability;
pub mod observability_config;
pub mod ocr;
pub mod ocr_config;
pub mod ocr_errors;
pub mod outcome;
pub mod preprocessing;
pub mod survey_parser;

// Re-export types for easier access
pub use batch::{BatchProcessor, BatchRunReport};
pub use config::ScanConfig;
pub use errors::{SurveyError, SurveyResult};
pub use fields::{FieldKind, ScanTemplate, SurveyScanner};
pub use outcome::{OutcomeSink, SurveyOutcome};
pub use preprocessing::{ImagePreprocessor, PreprocessOutcome};
pub use survey_parser::SurveyParser;
