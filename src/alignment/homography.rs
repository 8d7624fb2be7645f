//! Robust homography estimation and perspective warping.
//!
//! Homographies are fitted with the normalized direct linear transform and
//! made robust against bad correspondences with RANSAC.

use image::GrayImage;
use nalgebra::{DMatrix, DVector, Matrix3, Vector3};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

/// RANSAC homography configuration.
#[derive(Debug, Clone, Copy)]
pub struct RansacHomographyConfig {
    pub max_iters: usize,
    /// Reprojection distance in pixels under which a correspondence is an inlier
    pub inlier_threshold: f64,
    pub min_inliers: usize,
    pub seed: u64,
}

impl Default for RansacHomographyConfig {
    fn default() -> Self {
        Self {
            max_iters: 2000,
            inlier_threshold: 5.0,
            min_inliers: 4,
            seed: 0x5CA9,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RansacHomographyResult {
    pub h: Matrix3<f64>,
    /// One flag per input correspondence
    pub inliers: Vec<bool>,
    pub inlier_count: usize,
}

/// Projects a point through a homography; `None` when it lands at infinity.
pub fn project(h: &Matrix3<f64>, point: (f64, f64)) -> Option<(f64, f64)> {
    let p = h * Vector3::new(point.0, point.1, 1.0);
    if p.z.abs() < f64::EPSILON {
        return None;
    }
    Some((p.x / p.z, p.y / p.z))
}

/// Similarity transform moving the centroid to the origin with mean distance √2.
fn normalization(points: &[(f64, f64)]) -> Matrix3<f64> {
    let n = points.len() as f64;
    let (mx, my) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), (x, y)| (sx + x, sy + y));
    let (mx, my) = (mx / n, my / n);
    let mean_distance = points
        .iter()
        .map(|(x, y)| ((x - mx).powi(2) + (y - my).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    let s = if mean_distance > f64::EPSILON {
        std::f64::consts::SQRT_2 / mean_distance
    } else {
        1.0
    };
    Matrix3::new(s, 0.0, -s * mx, 0.0, s, -s * my, 0.0, 0.0, 1.0)
}

/// Least-squares homography mapping `src` onto `dst` (at least four pairs).
///
/// Coordinates are normalized before solving so the system stays well
/// conditioned for image-sized coordinates.
pub fn fit_homography(src: &[(f64, f64)], dst: &[(f64, f64)]) -> Option<Matrix3<f64>> {
    if src.len() < 4 || src.len() != dst.len() {
        return None;
    }

    let t_src = normalization(src);
    let t_dst = normalization(dst);

    let rows = src.len() * 2;
    let mut a = DMatrix::<f64>::zeros(rows, 8);
    let mut b = DVector::<f64>::zeros(rows);

    for (i, (s, d)) in src.iter().zip(dst.iter()).enumerate() {
        let (sx, sy) = project(&t_src, *s)?;
        let (dx, dy) = project(&t_dst, *d)?;

        a.set_row(
            i * 2,
            &nalgebra::RowDVector::from_row_slice(&[
                sx,
                sy,
                1.0,
                0.0,
                0.0,
                0.0,
                -sx * dx,
                -sy * dx,
            ]),
        );
        b[i * 2] = dx;

        a.set_row(
            i * 2 + 1,
            &nalgebra::RowDVector::from_row_slice(&[
                0.0,
                0.0,
                0.0,
                sx,
                sy,
                1.0,
                -sx * dy,
                -sy * dy,
            ]),
        );
        b[i * 2 + 1] = dy;
    }

    let svd = a.svd(true, true);
    let singular_min = svd.singular_values.min();
    if singular_min < 1e-9 {
        return None;
    }
    let solution = svd.solve(&b, 1e-12).ok()?;

    let normalized = Matrix3::new(
        solution[0],
        solution[1],
        solution[2],
        solution[3],
        solution[4],
        solution[5],
        solution[6],
        solution[7],
        1.0,
    );
    let h = t_dst.try_inverse()? * normalized * t_src;
    if h[(2, 2)].abs() < f64::EPSILON {
        return None;
    }
    Some(h / h[(2, 2)])
}

fn reprojection_error(h: &Matrix3<f64>, src: (f64, f64), dst: (f64, f64)) -> f64 {
    match project(h, src) {
        Some((x, y)) => ((x - dst.0).powi(2) + (y - dst.1).powi(2)).sqrt(),
        None => f64::INFINITY,
    }
}

/// Fits a homography with RANSAC, then refits on the consensus set.
pub fn fit_homography_ransac(
    src: &[(f64, f64)],
    dst: &[(f64, f64)],
    config: &RansacHomographyConfig,
) -> Option<RansacHomographyResult> {
    let n = src.len();
    if n < 4 || n != dst.len() {
        return None;
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut best_inliers: Vec<bool> = Vec::new();
    let mut best_count = 0usize;

    for _ in 0..config.max_iters {
        let sample = rand::seq::index::sample(&mut rng, n, 4);
        let sample_src: Vec<(f64, f64)> = sample.iter().map(|i| src[i]).collect();
        let sample_dst: Vec<(f64, f64)> = sample.iter().map(|i| dst[i]).collect();

        let Some(h) = fit_homography(&sample_src, &sample_dst) else {
            continue;
        };

        let inliers: Vec<bool> = src
            .iter()
            .zip(dst.iter())
            .map(|(s, d)| reprojection_error(&h, *s, *d) < config.inlier_threshold)
            .collect();
        let count = inliers.iter().filter(|&&inlier| inlier).count();

        if count > best_count {
            best_count = count;
            best_inliers = inliers;
            if best_count == n {
                break;
            }
        }
    }

    if best_count < config.min_inliers.max(4) {
        return None;
    }

    let (inlier_src, inlier_dst): (Vec<(f64, f64)>, Vec<(f64, f64)>) = src
        .iter()
        .zip(dst.iter())
        .zip(best_inliers.iter())
        .filter(|(_, &inlier)| inlier)
        .map(|((s, d), _)| (*s, *d))
        .unzip();
    let h = fit_homography(&inlier_src, &inlier_dst)?;

    let inliers: Vec<bool> = src
        .iter()
        .zip(dst.iter())
        .map(|(s, d)| reprojection_error(&h, *s, *d) < config.inlier_threshold)
        .collect();
    let inlier_count = inliers.iter().filter(|&&inlier| inlier).count();

    Some(RansacHomographyResult {
        h,
        inliers,
        inlier_count,
    })
}

/// Warps `source` into a `width` x `height` frame.
///
/// `h` maps output pixel coordinates to source coordinates. Samples are
/// bilinear; pixels that fall outside the source are black.
pub fn warp_perspective(source: &GrayImage, h: &Matrix3<f64>, width: u32, height: u32) -> GrayImage {
    if width == 0 || height == 0 || source.width() == 0 || source.height() == 0 {
        return GrayImage::new(width, height);
    }
    let mut buffer = vec![0u8; (width * height) as usize];
    buffer
        .par_chunks_mut(width as usize)
        .enumerate()
        .for_each(|(dst_y, row)| {
            for (dst_x, out) in row.iter_mut().enumerate() {
                if let Some((sx, sy)) = project(h, (dst_x as f64, dst_y as f64)) {
                    *out = bilinear_or_black(source, sx, sy);
                }
            }
        });
    GrayImage::from_raw(width, height, buffer).unwrap_or_else(|| GrayImage::new(width, height))
}

fn bilinear_or_black(image: &GrayImage, x: f64, y: f64) -> u8 {
    let (width, height) = (image.width() as f64, image.height() as f64);
    if x < 0.0 || y < 0.0 || x > width - 1.0 || y > height - 1.0 {
        return 0;
    }
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(image.width() - 1);
    let y1 = (y0 + 1).min(image.height() - 1);
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let p = |px: u32, py: u32| image.get_pixel(px, py)[0] as f64;
    let top = p(x0, y0) * (1.0 - fx) + p(x1, y0) * fx;
    let bottom = p(x0, y1) * (1.0 - fx) + p(x1, y1) * fx;
    (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn grid_points() -> Vec<(f64, f64)> {
        let mut points = Vec::new();
        for i in 0..5 {
            for j in 0..4 {
                points.push((20.0 + i as f64 * 37.0, 15.0 + j as f64 * 41.0));
            }
        }
        points
    }

    fn known_homography() -> Matrix3<f64> {
        Matrix3::new(1.02, 0.05, 12.0, -0.03, 0.98, -7.0, 0.0001, -0.00005, 1.0)
    }

    #[test]
    fn test_fit_recovers_known_homography() {
        let h = known_homography();
        let src = grid_points();
        let dst: Vec<(f64, f64)> = src.iter().filter_map(|p| project(&h, *p)).collect();

        let fitted = fit_homography(&src, &dst).expect("fit should succeed");
        for p in &src {
            let a = project(&h, *p).expect("finite");
            let b = project(&fitted, *p).expect("finite");
            assert!((a.0 - b.0).abs() < 1e-6 && (a.1 - b.1).abs() < 1e-6);
        }
    }

    #[test]
    fn test_fit_rejects_collinear_points() {
        let src: Vec<(f64, f64)> = (0..6).map(|i| (i as f64 * 10.0, i as f64 * 5.0)).collect();
        assert!(fit_homography(&src, &src).is_none());
    }

    #[test]
    fn test_ransac_ignores_outliers() {
        let h = known_homography();
        let src = grid_points();
        let mut dst: Vec<(f64, f64)> = src.iter().filter_map(|p| project(&h, *p)).collect();
        dst[3] = (500.0, -40.0);
        dst[11] = (-80.0, 300.0);

        let result = fit_homography_ransac(&src, &dst, &RansacHomographyConfig::default())
            .expect("ransac should find a model");
        assert_eq!(result.inlier_count, src.len() - 2);
        assert!(!result.inliers[3]);
        assert!(!result.inliers[11]);
    }

    #[test]
    fn test_warp_identity_preserves_pixels() {
        let img = GrayImage::from_fn(30, 20, |x, y| Luma([(x * 7 + y * 3) as u8]));
        let warped = warp_perspective(&img, &Matrix3::identity(), 30, 20);
        assert_eq!(warped, img);
    }

    #[test]
    fn test_warp_outside_is_black() {
        let img = GrayImage::from_pixel(10, 10, Luma([200]));
        let shift = Matrix3::new(1.0, 0.0, 5.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0);
        let warped = warp_perspective(&img, &shift, 10, 10);
        assert_eq!(warped.get_pixel(0, 0)[0], 200);
        assert_eq!(warped.get_pixel(9, 0)[0], 0);
    }
}
