//! # Image Thresholding Module
//!
//! This module provides binary thresholding for the scanning pipeline:
//! global Otsu binarization, its inverted form for locating pen marks, and a
//! Gaussian-weighted adaptive threshold for uneven lighting.

use image::{GrayImage, Luma};
use imageproc::filter::gaussian_blur_f32;
use tracing;

use crate::errors::{SurveyError, SurveyResult};

/// Finds the Otsu level of a grayscale image.
///
/// Pixels strictly above the returned level belong to the bright class.
/// Images with a single intensity have no between-class variance and fall
/// back to 128.
pub fn otsu_level(image: &GrayImage) -> u8 {
    let mut histogram = [0u32; 256];
    for pixel in image.pixels() {
        histogram[pixel[0] as usize] += 1;
    }
    let total_pixels = (image.width() as f64) * (image.height() as f64);
    if total_pixels == 0.0 {
        return 128;
    }
    find_otsu_threshold(&histogram, total_pixels)
}

/// Finds the optimal threshold by maximizing between-class variance.
fn find_otsu_threshold(histogram: &[u32; 256], total_pixels: f64) -> u8 {
    let mut cumulative_sums = [0f64; 256];
    let mut cumulative_weighted_sums = [0f64; 256];

    let mut cumulative_sum = 0f64;
    let mut cumulative_weighted_sum = 0f64;
    for (i, &count) in histogram.iter().enumerate() {
        cumulative_sum += count as f64;
        cumulative_weighted_sum += (i as f64) * count as f64;
        cumulative_sums[i] = cumulative_sum;
        cumulative_weighted_sums[i] = cumulative_weighted_sum;
    }

    let total_weighted_sum = cumulative_weighted_sums[255];
    let mut max_variance = 0f64;
    let mut optimal_threshold = 128u8;

    for threshold in 0..255usize {
        let background = cumulative_sums[threshold];
        let foreground = total_pixels - background;
        if background == 0.0 || foreground == 0.0 {
            continue;
        }

        let w0 = background / total_pixels;
        let w1 = 1.0 - w0;
        let mu0 = cumulative_weighted_sums[threshold] / background;
        let mu1 = (total_weighted_sum - cumulative_weighted_sums[threshold]) / foreground;

        let variance = w0 * w1 * (mu0 - mu1).powi(2);
        if variance > max_variance {
            max_variance = variance;
            optimal_threshold = threshold as u8;
        }
    }

    optimal_threshold
}

/// Binarizes with the Otsu level: bright pixels become 255, the rest 0.
pub fn binarize_otsu(image: &GrayImage) -> GrayImage {
    let level = otsu_level(image);
    apply_level(image, level, false)
}

/// Inverted Otsu binarization: dark ink becomes 255 foreground.
pub fn binarize_otsu_inverted(image: &GrayImage) -> GrayImage {
    let level = otsu_level(image);
    apply_level(image, level, true)
}

fn apply_level(image: &GrayImage, level: u8, inverted: bool) -> GrayImage {
    let (on, off) = if inverted { (0u8, 255u8) } else { (255u8, 0u8) };
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        if image.get_pixel(x, y)[0] > level {
            Luma([on])
        } else {
            Luma([off])
        }
    })
}

/// Gaussian sigma matching a square kernel of `block_size` pixels
pub fn gaussian_sigma_for_block(block_size: u32) -> f32 {
    0.3 * ((block_size as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Adaptive threshold against the Gaussian-weighted local mean.
///
/// A pixel becomes 255 when it is brighter than the weighted mean of its
/// `block_size` neighbourhood minus `offset`, and 0 otherwise, so flat paper
/// stays white and ink strokes turn black regardless of lighting gradients.
pub fn adaptive_gaussian_threshold(
    image: &GrayImage,
    block_size: u32,
    offset: f32,
) -> SurveyResult<GrayImage> {
    if block_size < 3 || block_size % 2 == 0 {
        return Err(SurveyError::Processing(format!(
            "Invalid adaptive threshold block size: {}. Must be odd and >= 3",
            block_size
        )));
    }
    if image.width() == 0 || image.height() == 0 {
        return Err(SurveyError::Processing(
            "Empty image for adaptive thresholding".to_string(),
        ));
    }

    let start_time = std::time::Instant::now();
    let local_mean = gaussian_blur_f32(image, gaussian_sigma_for_block(block_size));

    let binary = GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let threshold = local_mean.get_pixel(x, y)[0] as f32 - offset;
        if image.get_pixel(x, y)[0] as f32 > threshold {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    });

    tracing::debug!(
        target: "survey_preprocessing",
        "Adaptive threshold completed in {}ms: block_size={}, offset={}",
        start_time.elapsed().as_millis(),
        block_size,
        offset
    );

    Ok(binary)
}

/// Fraction of pixels equal to 255 in a binary image.
pub fn foreground_ratio(binary: &GrayImage) -> f64 {
    let total = binary.width() as u64 * binary.height() as u64;
    if total == 0 {
        return 0.0;
    }
    let marked = binary.pixels().filter(|p| p[0] == 255).count() as u64;
    marked as f64 / total as f64
}
