//! # Image Quality Assessment Module
//!
//! This module scores a captured image for usability and classifies concrete
//! defects with remediation hints. It evaluates brightness, contrast,
//! sharpness, size and skew.

use image::{DynamicImage, GrayImage};
use tracing;

use super::deskewing::detect_skew;
use super::types::{ImageStatistics, ProblemFlag, ProblemReport, QualityMetrics};
use crate::config::QualityThresholds;

/// Scores an image between 0.0 (unusable) and 1.0 (ideal).
///
/// The score is the unweighted mean of five components: brightness closeness
/// to mid-scale, contrast, sharpness, size and skew. Returns 0.0 instead of
/// failing when the statistics cannot be computed.
///
/// # Examples
///
/// ```no_run
/// use survey_scan::preprocessing::assess_quality;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let img = image::open("survey_page.jpg")?;
/// if assess_quality(&img) < 0.5 {
///     println!("Please retake the photo");
/// }
/// # Ok(())
/// # }
/// ```
pub fn assess_quality(image: &DynamicImage) -> f64 {
    quality_metrics(image).overall_quality
}

/// Computes the five component scores plus their mean.
pub fn quality_metrics(image: &DynamicImage) -> QualityMetrics {
    let start_time = std::time::Instant::now();
    let gray = image.to_luma8();
    let statistics = image_statistics(&gray);

    let brightness = statistics.mean_intensity / 255.0;
    let contrast = (statistics.intensity_stdev / 128.0).min(1.0);
    let sharpness = (statistics.laplacian_variance / 1000.0).min(1.0);
    let size_score = (statistics.width.min(statistics.height) as f64 / 1000.0).min(1.0);

    let mut metrics = QualityMetrics {
        brightness,
        contrast,
        sharpness,
        size_score,
        skew_angle_degrees: statistics.skew_angle_degrees,
        overall_quality: 0.0,
    };
    let overall = (metrics.brightness_score()
        + metrics.contrast
        + metrics.sharpness
        + metrics.size_score
        + metrics.skew_score())
        / 5.0;

    if !overall.is_finite() {
        tracing::warn!(
            target: "survey_preprocessing",
            "Quality assessment produced a non-finite score, reporting 0.0"
        );
        return QualityMetrics::zero();
    }
    metrics.overall_quality = overall.clamp(0.0, 1.0);

    tracing::debug!(
        target: "survey_preprocessing",
        "Quality assessment completed in {}ms: overall={:.3}, brightness={:.3}, contrast={:.3}, sharpness={:.3}, size={:.3}, skew={:.2}°",
        start_time.elapsed().as_millis(),
        metrics.overall_quality,
        metrics.brightness,
        metrics.contrast,
        metrics.sharpness,
        metrics.size_score,
        metrics.skew_angle_degrees
    );

    metrics
}

/// Flags every threshold the image violates; each flag is computed independently.
pub fn check_image_problems(image: &DynamicImage, thresholds: &QualityThresholds) -> ProblemReport {
    let gray = image.to_luma8();
    let statistics = image_statistics(&gray);

    ProblemReport {
        too_large: statistics.width > thresholds.max_image_dimension
            || statistics.height > thresholds.max_image_dimension,
        too_dark: statistics.mean_intensity < thresholds.min_brightness,
        too_bright: statistics.mean_intensity > thresholds.max_brightness,
        low_contrast: statistics.intensity_stdev < thresholds.min_contrast_stdev,
        blurry: statistics.laplacian_variance < thresholds.min_laplacian_variance,
        skewed: statistics.skew_angle_degrees.abs() > thresholds.max_skew_degrees,
        statistics,
    }
}

/// One remediation string per set flag, in flag declaration order.
pub fn optimization_suggestions(
    report: &ProblemReport,
    thresholds: &QualityThresholds,
) -> Vec<String> {
    report
        .flags()
        .iter()
        .map(|flag: &ProblemFlag| flag.suggestion(thresholds))
        .collect()
}

/// Gathers the raw statistics shared by scoring and problem detection.
pub fn image_statistics(gray: &GrayImage) -> ImageStatistics {
    let (mean, stdev) = mean_and_stdev(gray);
    ImageStatistics {
        width: gray.width(),
        height: gray.height(),
        mean_intensity: mean,
        intensity_stdev: stdev,
        laplacian_variance: laplacian_variance(gray),
        skew_angle_degrees: if gray.width() == 0 || gray.height() == 0 {
            0.0
        } else {
            detect_skew(gray)
        },
    }
}

/// Mean and population standard deviation of the intensities.
fn mean_and_stdev(gray: &GrayImage) -> (f64, f64) {
    let total_pixels = gray.width() as f64 * gray.height() as f64;
    if total_pixels == 0.0 {
        return (0.0, 0.0);
    }

    let mut histogram = [0u64; 256];
    for pixel in gray.pixels() {
        histogram[pixel[0] as usize] += 1;
    }

    let mean = histogram
        .iter()
        .enumerate()
        .map(|(value, &count)| value as f64 * count as f64)
        .sum::<f64>()
        / total_pixels;
    let variance = histogram
        .iter()
        .enumerate()
        .map(|(value, &count)| (value as f64 - mean).powi(2) * count as f64)
        .sum::<f64>()
        / total_pixels;

    (mean, variance.sqrt())
}

/// Variance of the 4-neighbour Laplacian over interior pixels.
pub fn laplacian_variance(gray: &GrayImage) -> f64 {
    let (width, height) = gray.dimensions();
    if width < 3 || height < 3 {
        return 0.0;
    }

    let mut sum = 0.0f64;
    let mut sum_squares = 0.0f64;
    let mut pixel_count = 0u64;

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            // Laplacian kernel: [[0, 1, 0], [1, -4, 1], [0, 1, 0]]
            let center = gray.get_pixel(x, y)[0] as f64;
            let top = gray.get_pixel(x, y - 1)[0] as f64;
            let bottom = gray.get_pixel(x, y + 1)[0] as f64;
            let left = gray.get_pixel(x - 1, y)[0] as f64;
            let right = gray.get_pixel(x + 1, y)[0] as f64;

            let laplacian = top + bottom + left + right - 4.0 * center;
            sum += laplacian;
            sum_squares += laplacian * laplacian;
            pixel_count += 1;
        }
    }

    let mean = sum / pixel_count as f64;
    (sum_squares / pixel_count as f64 - mean * mean).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn uniform(width: u32, height: u32, intensity: u8) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, Luma([intensity])))
    }

    #[test]
    fn test_uniform_image_has_no_contrast_or_sharpness() {
        let metrics = quality_metrics(&uniform(100, 100, 127));
        assert_eq!(metrics.contrast, 0.0);
        assert_eq!(metrics.sharpness, 0.0);
        assert!((metrics.size_score - 0.1).abs() < 1e-9);
        assert_eq!(metrics.skew_angle_degrees, 0.0);
        // brightness ~1.0, skew 1.0, size 0.1 → (1 + 0 + 0 + 0.1 + 1) / 5
        assert!((metrics.overall_quality - 0.42).abs() < 0.01);
    }

    #[test]
    fn test_mean_and_stdev() {
        let img = GrayImage::from_fn(10, 10, |x, _| if x < 5 { Luma([0]) } else { Luma([200]) });
        let (mean, stdev) = mean_and_stdev(&img);
        assert!((mean - 100.0).abs() < 1e-9);
        assert!((stdev - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_laplacian_variance_small_image() {
        let img = GrayImage::from_pixel(2, 2, Luma([10]));
        assert_eq!(laplacian_variance(&img), 0.0);
    }

    #[test]
    fn test_laplacian_variance_detects_edges() {
        let img = GrayImage::from_fn(20, 20, |_, y| if y < 10 { Luma([0]) } else { Luma([255]) });
        assert!(laplacian_variance(&img) > 1000.0);
    }

    #[test]
    fn test_suggestions_empty_without_problems() {
        let img = GrayImage::from_fn(200, 200, |_, y| {
            if (y / 25) % 2 == 0 {
                Luma([60])
            } else {
                Luma([190])
            }
        });
        let thresholds = QualityThresholds::default();
        let report = check_image_problems(&DynamicImage::ImageLuma8(img), &thresholds);
        assert!(!report.has_problems(), "{:?}", report);
        assert!(optimization_suggestions(&report, &thresholds).is_empty());
    }

    #[test]
    fn test_suggestions_for_dark_flat_image() {
        let thresholds = QualityThresholds::default();
        let report = check_image_problems(&uniform(50, 50, 10), &thresholds);
        assert!(report.too_dark);
        assert!(report.low_contrast);
        assert!(report.blurry);
        assert!(!report.too_bright);

        let suggestions = optimization_suggestions(&report, &thresholds);
        assert_eq!(suggestions.len(), 3);
        assert_eq!(suggestions[0], "Increase the image brightness");
    }

    #[test]
    fn test_color_image_is_converted() {
        let img = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            40,
            40,
            image::Rgb([128, 128, 128]),
        ));
        let metrics = quality_metrics(&img);
        assert!((metrics.brightness - 128.0 / 255.0).abs() < 0.01);
    }
}
