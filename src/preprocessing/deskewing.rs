//! # Image Deskewing Module
//!
//! This module detects the dominant line orientation of a form and rotates
//! the image to compensate.
//!
//! Detection uses line segments rather than a single best-fit line: hand
//! scanned forms contain many short unrelated edges (table rules, checkbox
//! borders), and the median angle of the segment population stays stable
//! when a minority of segments is mis-detected.

use image::{GrayImage, Luma};
use imageproc::edges::canny;
use imageproc::hough::{detect_lines, LineDetectionOptions, PolarLine};
use tracing;

use super::thresholding::binarize_otsu;

/// Canny hysteresis thresholds
const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;
/// Minimum accumulator votes for a Hough line
const HOUGH_VOTE_THRESHOLD: u32 = 100;
/// Non-maximum suppression radius in the accumulator
const HOUGH_SUPPRESSION_RADIUS: u32 = 8;
/// Shortest segment kept, in pixels
const MIN_LINE_LENGTH: f64 = 100.0;
/// Largest run of missing edge pixels bridged inside one segment
const MAX_LINE_GAP: u32 = 10;

/// A straight edge segment between two pixel positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSegment {
    pub start: (f64, f64),
    pub end: (f64, f64),
}

impl LineSegment {
    pub fn length(&self) -> f64 {
        let dx = self.end.0 - self.start.0;
        let dy = self.end.1 - self.start.1;
        (dx * dx + dy * dy).sqrt()
    }

    /// Angle folded into [-45, 45] degrees, or `None` for vertical segments.
    pub fn folded_angle_degrees(&self) -> Option<f64> {
        let mut dx = self.end.0 - self.start.0;
        let mut dy = self.end.1 - self.start.1;
        if dx.abs() < f64::EPSILON {
            return None;
        }
        if dx < 0.0 {
            dx = -dx;
            dy = -dy;
        }
        let mut angle = dy.atan2(dx).to_degrees();
        if angle > 45.0 {
            angle -= 90.0;
        } else if angle < -45.0 {
            angle += 90.0;
        }
        Some(angle)
    }
}

/// Detects the skew angle of a grayscale image in degrees within [-45, 45].
///
/// The image is binarized with Otsu's level, edges are extracted with Canny
/// and line segments are found with a probabilistic Hough search. Positive
/// angles mean lines descend to the right. Returns 0.0 when no usable
/// segment exists.
pub fn detect_skew(image: &GrayImage) -> f64 {
    let start_time = std::time::Instant::now();

    let binary = binarize_otsu(image);
    let edges = canny(&binary, CANNY_LOW, CANNY_HIGH);
    let segments = detect_line_segments(&edges);

    let mut angles: Vec<f64> = segments
        .iter()
        .filter_map(LineSegment::folded_angle_degrees)
        .collect();

    let angle = median(&mut angles).unwrap_or(0.0);

    tracing::debug!(
        target: "survey_preprocessing",
        "Skew detection completed in {}ms: {} segments, angle={:.2}°",
        start_time.elapsed().as_millis(),
        angles.len(),
        angle
    );

    angle
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Finds edge segments of at least 100 px, bridging gaps of up to 10 px.
///
/// Candidate lines come from the peaks of a polar Hough accumulator; each
/// line is then walked across the edge map to split it into the segments
/// actually supported by edge pixels.
pub fn detect_line_segments(edges: &GrayImage) -> Vec<LineSegment> {
    let options = LineDetectionOptions {
        vote_threshold: HOUGH_VOTE_THRESHOLD,
        suppression_radius: HOUGH_SUPPRESSION_RADIUS,
    };
    detect_lines(edges, options)
        .iter()
        .flat_map(|line| walk_line(edges, line))
        .collect()
}

/// Splits one polar line into edge-supported segments.
fn walk_line(edges: &GrayImage, line: &PolarLine) -> Vec<LineSegment> {
    let (width, height) = (edges.width() as i64, edges.height() as i64);
    let theta = (line.angle_in_degrees as f64).to_radians();
    let (normal_x, normal_y) = (theta.cos(), theta.sin());
    let (base_x, base_y) = (line.r as f64 * normal_x, line.r as f64 * normal_y);
    let (dir_x, dir_y) = (-normal_y, normal_x);
    let reach = ((width * width + height * height) as f64).sqrt().ceil() as i64;

    let edge_at = |t: i64| -> Option<(f64, f64)> {
        for offset in [0.0, -1.0, 1.0] {
            let x = (base_x + t as f64 * dir_x + offset * normal_x).round() as i64;
            let y = (base_y + t as f64 * dir_y + offset * normal_y).round() as i64;
            if x >= 0 && y >= 0 && x < width && y < height && edges.get_pixel(x as u32, y as u32)[0] > 0 {
                return Some((x as f64, y as f64));
            }
        }
        None
    };

    let mut segments = Vec::new();
    let mut current: Option<((f64, f64), (f64, f64))> = None;
    let mut gap = 0u32;

    for t in -reach..=reach {
        match edge_at(t) {
            Some(point) => {
                current = match current {
                    Some((start, _)) => Some((start, point)),
                    None => Some((point, point)),
                };
                gap = 0;
            }
            None => {
                if current.is_some() {
                    gap += 1;
                    if gap > MAX_LINE_GAP {
                        push_segment(&mut segments, current.take());
                        gap = 0;
                    }
                }
            }
        }
    }
    push_segment(&mut segments, current);

    segments
}

fn push_segment(segments: &mut Vec<LineSegment>, run: Option<((f64, f64), (f64, f64))>) {
    if let Some((start, end)) = run {
        let segment = LineSegment { start, end };
        if segment.length() >= MIN_LINE_LENGTH {
            segments.push(segment);
        }
    }
}

/// Rotates the image about its centre so that lines at `angle_degrees` become horizontal.
///
/// Uses bicubic interpolation with replicated borders and keeps the original
/// dimensions.
pub fn correct_skew(image: &GrayImage, angle_degrees: f64) -> GrayImage {
    let start_time = std::time::Instant::now();
    let (width, height) = image.dimensions();
    let theta = angle_degrees.to_radians();
    let (sin_a, cos_a) = (theta.sin(), theta.cos());
    let cx = (width as f64 - 1.0) / 2.0;
    let cy = (height as f64 - 1.0) / 2.0;

    let rotated = GrayImage::from_fn(width, height, |x, y| {
        let dx = x as f64 - cx;
        let dy = y as f64 - cy;
        let src_x = cos_a * dx - sin_a * dy + cx;
        let src_y = sin_a * dx + cos_a * dy + cy;
        Luma([bicubic_interpolate(image, src_x as f32, src_y as f32)])
    });

    tracing::debug!(
        target: "survey_preprocessing",
        "Skew correction completed in {}ms: rotated by {:.2}°",
        start_time.elapsed().as_millis(),
        -angle_degrees
    );

    rotated
}

/// Gets a pixel value with border replication for out-of-bounds coordinates.
fn get_pixel_replicate(image: &GrayImage, x: i32, y: i32) -> f32 {
    let clamped_x = x.clamp(0, image.width() as i32 - 1) as u32;
    let clamped_y = y.clamp(0, image.height() as i32 - 1) as u32;
    image.get_pixel(clamped_x, clamped_y)[0] as f32
}

/// Cubic convolution kernel with a = -0.75.
#[inline]
fn cubic_kernel(t: f32) -> f32 {
    const A: f32 = -0.75;
    let t_abs = t.abs();
    if t_abs <= 1.0 {
        (A + 2.0) * t_abs * t_abs * t_abs - (A + 3.0) * t_abs * t_abs + 1.0
    } else if t_abs < 2.0 {
        A * t_abs * t_abs * t_abs - 5.0 * A * t_abs * t_abs + 8.0 * A * t_abs - 4.0 * A
    } else {
        0.0
    }
}

fn bicubic_interpolate(image: &GrayImage, x: f32, y: f32) -> u8 {
    let x_int = x.floor() as i32;
    let y_int = y.floor() as i32;
    let dx = x - x_int as f32;
    let dy = y - y_int as f32;

    let wx = [
        cubic_kernel(dx + 1.0),
        cubic_kernel(dx),
        cubic_kernel(dx - 1.0),
        cubic_kernel(dx - 2.0),
    ];
    let wy = [
        cubic_kernel(dy + 1.0),
        cubic_kernel(dy),
        cubic_kernel(dy - 1.0),
        cubic_kernel(dy - 2.0),
    ];

    let mut value = 0.0f32;
    for (j, &weight_y) in wy.iter().enumerate() {
        let sample_y = y_int - 1 + j as i32;
        for (i, &weight_x) in wx.iter().enumerate() {
            let sample_x = x_int - 1 + i as i32;
            value += weight_x * weight_y * get_pixel_replicate(image, sample_x, sample_y);
        }
    }

    value.round().clamp(0.0, 255.0) as u8
}
