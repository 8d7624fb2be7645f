//! Oriented FAST keypoints with rotated BRIEF descriptors.
//!
//! Keypoints are detected on a small image pyramid so that captures taken
//! closer to or further from the paper still match the reference template.
//! Each keypoint is oriented by its intensity centroid, and its binary
//! descriptor is sampled along a pattern rotated by that orientation.

use image::imageops::{resize, FilterType};
use image::GrayImage;
use imageproc::corners::corners_fast9;
use imageproc::filter::gaussian_blur_f32;
use lazy_static::lazy_static;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

/// Pyramid levels searched for keypoints
const PYRAMID_LEVELS: usize = 4;
/// Downscale factor between consecutive levels
const PYRAMID_SCALE: f32 = 1.2;
/// FAST intensity threshold
const FAST_THRESHOLD: u8 = 20;
/// Radius of the intensity centroid patch
const ORIENTATION_RADIUS: i32 = 15;
/// Half-size of the square the BRIEF pairs are drawn from
const PATTERN_HALF_SIZE: i32 = 13;
/// Keypoints closer than this to a level border are dropped
const BORDER: u32 = 20;
/// Smoothing applied before sampling descriptor pairs
const DESCRIPTOR_SIGMA: f32 = 2.0;
const DESCRIPTOR_BITS: usize = 256;

lazy_static! {
    /// Fixed sampling pattern shared by every descriptor
    static ref BRIEF_PATTERN: Vec<[(i32, i32); 2]> = {
        let mut rng = StdRng::seed_from_u64(0x0005_EED5);
        (0..DESCRIPTOR_BITS)
            .map(|_| {
                [
                    (
                        rng.random_range(-PATTERN_HALF_SIZE..=PATTERN_HALF_SIZE),
                        rng.random_range(-PATTERN_HALF_SIZE..=PATTERN_HALF_SIZE),
                    ),
                    (
                        rng.random_range(-PATTERN_HALF_SIZE..=PATTERN_HALF_SIZE),
                        rng.random_range(-PATTERN_HALF_SIZE..=PATTERN_HALF_SIZE),
                    ),
                ]
            })
            .collect()
    };
}

/// A keypoint in full-resolution pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// Orientation in radians
    pub angle: f32,
    pub level: usize,
    pub score: f32,
}

/// 256-bit binary descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor(pub [u64; 4]);

impl Descriptor {
    pub fn hamming_distance(&self, other: &Descriptor) -> u32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Feature {
    pub keypoint: Keypoint,
    pub descriptor: Descriptor,
}

/// A descriptor correspondence between two feature sets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureMatch {
    pub query_index: usize,
    pub train_index: usize,
    pub distance: u32,
}

/// Detects up to `max_features` oriented keypoints and describes them.
pub fn detect_and_describe(image: &GrayImage, max_features: usize) -> Vec<Feature> {
    let mut features = Vec::new();
    let mut scale = 1.0f32;

    for level in 0..PYRAMID_LEVELS {
        let width = (image.width() as f32 / scale).round() as u32;
        let height = (image.height() as f32 / scale).round() as u32;
        if width <= 2 * BORDER || height <= 2 * BORDER {
            break;
        }

        let level_image = if level == 0 {
            image.clone()
        } else {
            resize(image, width, height, FilterType::Triangle)
        };
        let smoothed = gaussian_blur_f32(&level_image, DESCRIPTOR_SIGMA);

        for corner in corners_fast9(&level_image, FAST_THRESHOLD) {
            if corner.x < BORDER
                || corner.y < BORDER
                || corner.x >= width - BORDER
                || corner.y >= height - BORDER
            {
                continue;
            }
            let angle = intensity_centroid_angle(&level_image, corner.x, corner.y);
            let descriptor = describe(&smoothed, corner.x, corner.y, angle);
            features.push(Feature {
                keypoint: Keypoint {
                    x: corner.x as f32 * scale,
                    y: corner.y as f32 * scale,
                    angle,
                    level,
                    score: corner.score,
                },
                descriptor,
            });
        }

        scale *= PYRAMID_SCALE;
    }

    features.sort_by(|a, b| b.keypoint.score.total_cmp(&a.keypoint.score));
    features.truncate(max_features);
    features
}

/// Orientation of the intensity centroid of a circular patch.
fn intensity_centroid_angle(image: &GrayImage, cx: u32, cy: u32) -> f32 {
    let mut m01 = 0f32;
    let mut m10 = 0f32;
    for dy in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
        let half_width = ((ORIENTATION_RADIUS * ORIENTATION_RADIUS - dy * dy) as f32).sqrt() as i32;
        for dx in -half_width..=half_width {
            let value = image.get_pixel((cx as i32 + dx) as u32, (cy as i32 + dy) as u32)[0] as f32;
            m10 += dx as f32 * value;
            m01 += dy as f32 * value;
        }
    }
    m01.atan2(m10)
}

/// Samples the rotated BRIEF pattern around a keypoint.
fn describe(smoothed: &GrayImage, cx: u32, cy: u32, angle: f32) -> Descriptor {
    let (sin_a, cos_a) = angle.sin_cos();
    let sample = |(dx, dy): (i32, i32)| -> u8 {
        let rx = (cos_a * dx as f32 - sin_a * dy as f32).round() as i32;
        let ry = (sin_a * dx as f32 + cos_a * dy as f32).round() as i32;
        smoothed.get_pixel((cx as i32 + rx) as u32, (cy as i32 + ry) as u32)[0]
    };

    let mut bits = [0u64; 4];
    for (i, [p, q]) in BRIEF_PATTERN.iter().enumerate() {
        if sample(*p) < sample(*q) {
            bits[i / 64] |= 1u64 << (i % 64);
        }
    }
    Descriptor(bits)
}

/// Brute-force Hamming matching with a nearest / second-nearest ratio test.
///
/// A query feature is matched only when its best distance is below
/// `ratio` times the second-best distance.
pub fn match_features(query: &[Feature], train: &[Feature], ratio: f32) -> Vec<FeatureMatch> {
    if train.len() < 2 {
        return Vec::new();
    }

    query
        .par_iter()
        .enumerate()
        .filter_map(|(query_index, feature)| {
            let mut best = (u32::MAX, 0usize);
            let mut second = u32::MAX;
            for (train_index, candidate) in train.iter().enumerate() {
                let distance = feature.descriptor.hamming_distance(&candidate.descriptor);
                if distance < best.0 {
                    second = best.0;
                    best = (distance, train_index);
                } else if distance < second {
                    second = distance;
                }
            }
            if (best.0 as f32) < ratio * second as f32 {
                Some(FeatureMatch {
                    query_index,
                    train_index: best.1,
                    distance: best.0,
                })
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn textured(width: u32, height: u32, seed: u64) -> GrayImage {
        let mut rng = StdRng::seed_from_u64(seed);
        let blocks: Vec<u8> = (0..((width / 8 + 1) * (height / 8 + 1)))
            .map(|_| rng.random_range(0..=255u8))
            .collect();
        GrayImage::from_fn(width, height, |x, y| {
            Luma([blocks[((y / 8) * (width / 8 + 1) + x / 8) as usize]])
        })
    }

    #[test]
    fn test_hamming_distance() {
        let a = Descriptor([0, 0, 0, 0]);
        let b = Descriptor([0b1011, 0, u64::MAX, 0]);
        assert_eq!(a.hamming_distance(&b), 3 + 64);
        assert_eq!(b.hamming_distance(&b), 0);
    }

    #[test]
    fn test_pattern_is_stable_and_bounded() {
        assert_eq!(BRIEF_PATTERN.len(), DESCRIPTOR_BITS);
        for [p, q] in BRIEF_PATTERN.iter() {
            for (dx, dy) in [p, q] {
                assert!(dx.abs() <= PATTERN_HALF_SIZE && dy.abs() <= PATTERN_HALF_SIZE);
            }
        }
    }

    #[test]
    fn test_blank_image_has_no_features() {
        let img = GrayImage::from_pixel(120, 120, Luma([200]));
        assert!(detect_and_describe(&img, 500).is_empty());
    }

    #[test]
    fn test_textured_image_features_respect_limit() {
        let img = textured(200, 200, 7);
        let features = detect_and_describe(&img, 50);
        assert!(!features.is_empty());
        assert!(features.len() <= 50);
        for feature in &features {
            assert!(feature.keypoint.x >= 0.0 && feature.keypoint.x < 200.0);
            assert!(feature.keypoint.y >= 0.0 && feature.keypoint.y < 200.0);
        }
    }

    #[test]
    fn test_self_matching_pairs_identical_keypoints() {
        let img = textured(200, 200, 11);
        let features = detect_and_describe(&img, 300);
        let matches = match_features(&features, &features, 0.7);
        assert!(!matches.is_empty());
        for m in &matches {
            assert_eq!(m.distance, 0);
            let a = features[m.query_index].keypoint;
            let b = features[m.train_index].keypoint;
            assert!((a.x - b.x).abs() < 1e-3 && (a.y - b.y).abs() < 1e-3);
        }
    }

    #[test]
    fn test_matching_needs_two_candidates() {
        let img = textured(120, 120, 3);
        let features = detect_and_describe(&img, 1);
        assert!(match_features(&features, &features, 0.7).is_empty());
    }
}
