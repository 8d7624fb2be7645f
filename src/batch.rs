//! # Batch Processing Module
//!
//! Runs the preprocessing pipeline over every image in a directory and writes
//! the binarized results next to each other in an output directory, named
//! `processed_<original name>`.
//!
//! Images are independent of each other, so parallel runs dispatch one job
//! per file to a bounded rayon pool. The only shared state is the run report,
//! which workers update under a mutex; each worker writes its own output file.

use parking_lot::Mutex;
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

use crate::config::ScanConfig;
use crate::errors::{error_logging, SurveyError, SurveyResult};
use crate::observability;
use crate::preprocessing::{ImagePreprocessor, PreprocessOutcome};

/// Prefix of every file written to the output directory
pub const OUTPUT_PREFIX: &str = "processed_";

/// A successfully processed image
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageReport {
    pub filename: String,
    pub quality_score: f64,
    pub output_path: PathBuf,
}

/// Aggregate result of a batch run.
///
/// In parallel runs `per_image` and `failed_files` are in completion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchRunReport {
    pub success_count: usize,
    pub failure_count: usize,
    pub per_image: Vec<ImageReport>,
    pub failed_files: Vec<PathBuf>,
}

impl BatchRunReport {
    pub fn is_empty(&self) -> bool {
        self.success_count == 0 && self.failure_count == 0
    }

    pub fn mean_quality(&self) -> Option<f64> {
        if self.per_image.is_empty() {
            return None;
        }
        let total: f64 = self.per_image.iter().map(|r| r.quality_score).sum();
        Some(total / self.per_image.len() as f64)
    }

    pub fn best_image(&self) -> Option<&ImageReport> {
        self.per_image
            .iter()
            .max_by(|a, b| a.quality_score.total_cmp(&b.quality_score))
    }

    pub fn worst_image(&self) -> Option<&ImageReport> {
        self.per_image
            .iter()
            .min_by(|a, b| a.quality_score.total_cmp(&b.quality_score))
    }

    fn record(&mut self, result: ImageResult) {
        match result {
            ImageResult::Processed(report) => {
                self.success_count += 1;
                self.per_image.push(report);
            }
            ImageResult::Failed(path) => {
                self.failure_count += 1;
                self.failed_files.push(path);
            }
        }
    }
}

/// File counts of the input and output directories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProcessingStats {
    /// `processed_*` files present in the output directory
    pub total_processed: usize,
    /// Files present in the input directory
    pub total_files: usize,
}

enum ImageResult {
    Processed(ImageReport),
    Failed(PathBuf),
}

/// Preprocesses every matching image of a directory.
pub struct BatchProcessor {
    input_dir: PathBuf,
    output_dir: PathBuf,
    extensions: Vec<String>,
    parallel: bool,
    max_threads: Option<usize>,
    preprocessor: ImagePreprocessor,
}

impl BatchProcessor {
    /// Validates the input directory and creates the output directory.
    ///
    /// # Errors
    ///
    /// - `SurveyError::NotFound` when the input directory does not exist
    /// - `SurveyError::NotADirectory` when it is a file
    /// - `SurveyError::Io` when the output directory cannot be created
    pub fn new(config: &ScanConfig) -> SurveyResult<Self> {
        let input_dir = config.input_dir.clone();
        if !input_dir.exists() {
            return Err(SurveyError::NotFound(input_dir));
        }
        if !input_dir.is_dir() {
            return Err(SurveyError::NotADirectory(input_dir));
        }

        fs::create_dir_all(&config.output_dir).map_err(|e| {
            error_logging::log_filesystem_error(&e, "create_output_dir", &config.output_dir);
            SurveyError::from(e)
        })?;

        Ok(Self {
            input_dir,
            output_dir: config.output_dir.clone(),
            extensions: config.extensions.iter().map(|e| e.to_lowercase()).collect(),
            parallel: config.parallel,
            max_threads: config.max_threads,
            preprocessor: ImagePreprocessor::new(config),
        })
    }

    pub fn set_parallel(&mut self, parallel: bool) {
        self.parallel = parallel;
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Processes every matching image and reports successes and failures.
    ///
    /// A directory without matching images yields an empty report. Per-image
    /// failures are recorded and never abort the run.
    pub fn process_directory(&self) -> SurveyResult<BatchRunReport> {
        let start_time = Instant::now();
        let files = self.image_files()?;

        if files.is_empty() {
            warn!(
                input_dir = %self.input_dir.display(),
                extensions = ?self.extensions,
                "No images found to process"
            );
            return Ok(BatchRunReport::default());
        }

        info!(
            count = files.len(),
            parallel = self.parallel,
            "Starting batch processing"
        );

        let report = if self.parallel {
            self.process_parallel(&files)?
        } else {
            let mut report = BatchRunReport::default();
            for path in &files {
                report.record(self.process_file(path));
            }
            report
        };

        let elapsed = start_time.elapsed();
        observability::record_batch_summary(report.success_count, report.failure_count, elapsed);
        log_summary(&report, elapsed.as_millis());
        Ok(report)
    }

    fn process_parallel(&self, files: &[PathBuf]) -> SurveyResult<BatchRunReport> {
        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(threads) = self.max_threads {
            builder = builder.num_threads(threads);
        }
        let pool = builder
            .build()
            .map_err(|e| SurveyError::Processing(format!("Failed to build worker pool: {}", e)))?;

        let report = Mutex::new(BatchRunReport::default());
        pool.install(|| {
            files.par_iter().for_each(|path| {
                let result = self.process_file(path);
                report.lock().record(result);
            });
        });
        Ok(report.into_inner())
    }

    fn process_file(&self, path: &Path) -> ImageResult {
        let _span = observability::image_span("batch_preprocess", path).entered();
        let start_time = Instant::now();

        let result = match self.preprocessor.preprocess_image(path) {
            Ok(PreprocessOutcome::Accepted(accepted)) => {
                let filename = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let output_path = self.output_dir.join(format!("{}{}", OUTPUT_PREFIX, filename));
                match accepted.image.save(&output_path) {
                    Ok(()) => {
                        info!(
                            path = %path.display(),
                            quality = accepted.quality_score(),
                            "Image processed"
                        );
                        ImageResult::Processed(ImageReport {
                            filename,
                            quality_score: accepted.quality_score(),
                            output_path,
                        })
                    }
                    Err(e) => {
                        error_logging::log_filesystem_error(&e, "save_processed", &output_path);
                        ImageResult::Failed(path.to_path_buf())
                    }
                }
            }
            // Rejections and load failures are logged by the preprocessor
            Ok(PreprocessOutcome::Rejected(_)) | Ok(PreprocessOutcome::Failed(_)) => {
                ImageResult::Failed(path.to_path_buf())
            }
            Err(err) => {
                error_logging::log_image_error(&err, "preprocess", path);
                ImageResult::Failed(path.to_path_buf())
            }
        };

        let outcome = match result {
            ImageResult::Processed(_) => "success",
            ImageResult::Failed(_) => "failure",
        };
        observability::record_batch_image(outcome, start_time.elapsed());
        result
    }

    /// Input files with an accepted extension, in sorted order.
    fn image_files(&self) -> SurveyResult<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.input_dir).map_err(|e| {
            error_logging::log_filesystem_error(&e, "read_input_dir", &self.input_dir);
            SurveyError::from(e)
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && self.has_accepted_extension(path))
            .collect();
        files.sort();
        Ok(files)
    }

    fn has_accepted_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{}", ext.to_lowercase()))
            .is_some_and(|ext| self.extensions.contains(&ext))
    }

    /// Counts files in the input directory and processed outputs.
    pub fn processing_stats(&self) -> SurveyResult<ProcessingStats> {
        let total_files = count_files(&self.input_dir, |_| true)?;
        let total_processed = count_files(&self.output_dir, |name| name.starts_with(OUTPUT_PREFIX))?;
        Ok(ProcessingStats {
            total_processed,
            total_files,
        })
    }
}

fn count_files(dir: &Path, name_filter: impl Fn(&str) -> bool) -> SurveyResult<usize> {
    if !dir.exists() {
        return Ok(0);
    }
    Ok(fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .filter(|entry| name_filter(&entry.file_name().to_string_lossy()))
        .count())
}

fn log_summary(report: &BatchRunReport, duration_ms: u128) {
    info!(
        success_count = report.success_count,
        failure_count = report.failure_count,
        duration_ms = duration_ms as u64,
        "Batch processing completed"
    );

    if let (Some(mean), Some(best), Some(worst)) = (
        report.mean_quality(),
        report.best_image(),
        report.worst_image(),
    ) {
        info!(
            mean_quality = mean,
            best_file = %best.filename,
            best_quality = best.quality_score,
            worst_file = %worst.filename,
            worst_quality = worst.quality_score,
            "Batch quality summary"
        );
    }
}
