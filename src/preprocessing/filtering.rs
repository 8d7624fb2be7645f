//! # Image Filtering Module
//!
//! This module provides the noise reduction and contrast enhancement stages of
//! the scanning pipeline: a non-local means denoiser that keeps pen strokes
//! sharp, and contrast-limited adaptive histogram equalization (CLAHE) that
//! evens out uneven lighting across the page.

use image::{GrayImage, Luma};
use rayon::prelude::*;
use tracing;

use crate::errors::{SurveyError, SurveyResult};

/// Half-size of the compared patches (3x3)
const PATCH_RADIUS: i32 = 1;
/// Half-size of the search window (11x11)
const SEARCH_RADIUS: i32 = 5;

/// Removes noise with a non-local means filter.
///
/// Every pixel becomes a weighted average of the pixels in its search
/// window, weighted by how similar their surrounding patches are:
/// `w = exp(-d² / h²)` where `d²` is the mean squared patch difference.
/// Larger `strength` values smooth more aggressively.
///
/// # Arguments
///
/// * `image` - The grayscale image to denoise
/// * `strength` - Filter strength `h`, must be positive
///
/// # Returns
///
/// Returns the denoised image or a `SurveyError::Processing` for invalid input
pub fn denoise_non_local_means(image: &GrayImage, strength: f32) -> SurveyResult<GrayImage> {
    if strength <= 0.0 {
        return Err(SurveyError::Processing(format!(
            "Invalid denoise strength: {}. Must be > 0.0",
            strength
        )));
    }
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(SurveyError::Processing(
            "Empty image for noise reduction".to_string(),
        ));
    }

    let start_time = std::time::Instant::now();

    let pad = PATCH_RADIUS + SEARCH_RADIUS;
    let padded_width = width as i32 + 2 * pad;
    let padded = pad_replicate(image, pad);
    let h2 = strength * strength;
    let patch_area = ((2 * PATCH_RADIUS + 1) * (2 * PATCH_RADIUS + 1)) as f32;

    let mut output = vec![0u8; (width * height) as usize];
    output
        .par_chunks_mut(width as usize)
        .enumerate()
        .for_each(|(y, row)| {
            let py = y as i32 + pad;
            for (x, out) in row.iter_mut().enumerate() {
                let px = x as i32 + pad;
                let mut weight_sum = 0f32;
                let mut value_sum = 0f32;

                for sy in -SEARCH_RADIUS..=SEARCH_RADIUS {
                    for sx in -SEARCH_RADIUS..=SEARCH_RADIUS {
                        let qx = px + sx;
                        let qy = py + sy;

                        let mut distance = 0f32;
                        for dy in -PATCH_RADIUS..=PATCH_RADIUS {
                            for dx in -PATCH_RADIUS..=PATCH_RADIUS {
                                let a = padded[((py + dy) * padded_width + px + dx) as usize];
                                let b = padded[((qy + dy) * padded_width + qx + dx) as usize];
                                distance += (a - b) * (a - b);
                            }
                        }

                        let weight = (-(distance / patch_area) / h2).exp();
                        weight_sum += weight;
                        value_sum += weight * padded[(qy * padded_width + qx) as usize];
                    }
                }

                *out = (value_sum / weight_sum).round().clamp(0.0, 255.0) as u8;
            }
        });

    tracing::debug!(
        target: "survey_preprocessing",
        "Non-local means denoising completed in {}ms: strength={}, dimensions={}x{}",
        start_time.elapsed().as_millis(),
        strength,
        width,
        height
    );

    GrayImage::from_raw(width, height, output).ok_or_else(|| {
        SurveyError::Processing("Denoised buffer does not match image dimensions".to_string())
    })
}

/// Copies the image into an f32 buffer with `pad` replicated border pixels.
fn pad_replicate(image: &GrayImage, pad: i32) -> Vec<f32> {
    let (width, height) = (image.width() as i32, image.height() as i32);
    let padded_width = width + 2 * pad;
    let padded_height = height + 2 * pad;
    let mut padded = Vec::with_capacity((padded_width * padded_height) as usize);
    for y in 0..padded_height {
        let sy = (y - pad).clamp(0, height - 1) as u32;
        for x in 0..padded_width {
            let sx = (x - pad).clamp(0, width - 1) as u32;
            padded.push(image.get_pixel(sx, sy)[0] as f32);
        }
    }
    padded
}

/// Applies Contrast Limited Adaptive Histogram Equalization (CLAHE).
///
/// The image is split into a `grid` of tiles (columns, rows). Each tile gets
/// its own equalization lookup table built from a histogram clipped at
/// `clip_limit * tile_area / 256`, with the excess spread evenly over all
/// bins. Pixels are mapped by bilinear interpolation between the four
/// nearest tile tables, so no seams appear at tile borders.
///
/// # Arguments
///
/// * `image` - The grayscale image to enhance
/// * `clip_limit` - Histogram clip limit (2.0 is a good default)
/// * `grid` - Number of tiles horizontally and vertically
///
/// # Returns
///
/// Returns the enhanced image or a `SurveyError::Processing` for invalid parameters
pub fn apply_clahe(image: &GrayImage, clip_limit: f32, grid: (u32, u32)) -> SurveyResult<GrayImage> {
    if clip_limit <= 0.0 {
        return Err(SurveyError::Processing(format!(
            "Invalid clip limit: {}. Must be > 0.0",
            clip_limit
        )));
    }
    if grid.0 == 0 || grid.1 == 0 {
        return Err(SurveyError::Processing(
            "Invalid tile grid: dimensions must be > 0".to_string(),
        ));
    }
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(SurveyError::Processing(
            "Empty image for contrast enhancement".to_string(),
        ));
    }

    let start_time = std::time::Instant::now();

    let tile_width = width.div_ceil(grid.0.min(width));
    let tile_height = height.div_ceil(grid.1.min(height));
    // Rounded-up tiles may cover the image with fewer than `grid` tiles
    let tiles_x = width.div_ceil(tile_width);
    let tiles_y = height.div_ceil(tile_height);

    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for tile_y in 0..tiles_y {
        for tile_x in 0..tiles_x {
            let x0 = tile_x * tile_width;
            let y0 = tile_y * tile_height;
            let x1 = (x0 + tile_width).min(width);
            let y1 = (y0 + tile_height).min(height);
            luts.push(tile_lut(image, (x0, y0, x1, y1), clip_limit));
        }
    }

    let output = GrayImage::from_fn(width, height, |x, y| {
        let (tx0, tx1, fx) = tile_neighbours(x, tile_width, tiles_x);
        let (ty0, ty1, fy) = tile_neighbours(y, tile_height, tiles_y);
        let value = image.get_pixel(x, y)[0] as usize;

        let lut = |tx: u32, ty: u32| luts[(ty * tiles_x + tx) as usize][value] as f32;
        let top = lut(tx0, ty0) * (1.0 - fx) + lut(tx1, ty0) * fx;
        let bottom = lut(tx0, ty1) * (1.0 - fx) + lut(tx1, ty1) * fx;
        Luma([(top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8])
    });

    tracing::debug!(
        target: "survey_preprocessing",
        "CLAHE applied in {}ms: clip_limit={}, grid={:?}",
        start_time.elapsed().as_millis(),
        clip_limit,
        grid
    );

    Ok(output)
}

/// Locates the two tiles whose centres bracket `coord` and the blend factor.
fn tile_neighbours(coord: u32, tile_size: u32, tile_count: u32) -> (u32, u32, f32) {
    let position = (coord as f32 + 0.5) / tile_size as f32 - 0.5;
    if position <= 0.0 {
        return (0, 0, 0.0);
    }
    let lower = position.floor() as u32;
    if lower >= tile_count - 1 {
        return (tile_count - 1, tile_count - 1, 0.0);
    }
    (lower, lower + 1, position - lower as f32)
}

/// Builds the clipped equalization table of one tile.
fn tile_lut(image: &GrayImage, bounds: (u32, u32, u32, u32), clip_limit: f32) -> [u8; 256] {
    let (x0, y0, x1, y1) = bounds;
    let mut histogram = [0u32; 256];
    for y in y0..y1 {
        for x in x0..x1 {
            histogram[image.get_pixel(x, y)[0] as usize] += 1;
        }
    }
    let total_pixels = ((x1 - x0) * (y1 - y0)) as f32;

    let clip_limit_pixels = ((clip_limit * total_pixels / 256.0).round() as u32).max(1);
    let mut excess_pixels = 0u32;
    for count in &mut histogram {
        if *count > clip_limit_pixels {
            excess_pixels += *count - clip_limit_pixels;
            *count = clip_limit_pixels;
        }
    }

    let uniform_increment = excess_pixels / 256;
    let mut remainder = excess_pixels % 256;
    for count in &mut histogram {
        *count += uniform_increment;
        if remainder > 0 {
            *count += 1;
            remainder -= 1;
        }
    }

    let mut lut = [0u8; 256];
    let mut cumulative = 0u32;
    for (value, count) in histogram.iter().enumerate() {
        cumulative += count;
        lut[value] = ((cumulative as f32 / total_pixels) * 255.0).round().min(255.0) as u8;
    }
    lut
}
