//! # Template Alignment
//!
//! Warps a captured photo into the pixel frame of a reference form so that
//! field boxes defined against the reference apply regardless of how the
//! paper was rotated or tilted at capture time.
//!
//! - `features`: oriented FAST keypoints, rotated BRIEF descriptors, ratio-test matching
//! - `homography`: normalized DLT, RANSAC and perspective warping

pub mod features;
pub mod homography;

use image::GrayImage;
use tracing::{debug, info};

use crate::config::AlignmentParams;
use features::{detect_and_describe, match_features, Feature};
use homography::{fit_homography_ransac, warp_perspective, RansacHomographyConfig};

/// Aligns captured images against a fixed reference image.
///
/// Reference features are computed once at construction. Alignment is
/// best-effort: whenever a reliable transform cannot be estimated the
/// captured image is returned unchanged.
pub struct TemplateAligner {
    reference_width: u32,
    reference_height: u32,
    reference_features: Vec<Feature>,
    params: AlignmentParams,
}

impl TemplateAligner {
    pub fn new(reference: &GrayImage, params: AlignmentParams) -> Self {
        let reference_features = detect_and_describe(reference, params.max_features);
        debug!(
            features = reference_features.len(),
            "Reference template features computed"
        );
        Self {
            reference_width: reference.width(),
            reference_height: reference.height(),
            reference_features,
            params,
        }
    }

    pub fn reference_feature_count(&self) -> usize {
        self.reference_features.len()
    }

    pub fn align(&self, captured: &GrayImage) -> GrayImage {
        let start_time = std::time::Instant::now();

        let captured_features = detect_and_describe(captured, self.params.max_features);
        let matches = match_features(
            &self.reference_features,
            &captured_features,
            self.params.ratio_threshold,
        );

        if matches.len() < self.params.min_matches {
            info!(
                good_matches = matches.len(),
                required = self.params.min_matches,
                "Not enough feature matches, skipping template alignment"
            );
            return captured.clone();
        }

        let (reference_points, captured_points): (Vec<(f64, f64)>, Vec<(f64, f64)>) = matches
            .iter()
            .map(|m| {
                let r = self.reference_features[m.query_index].keypoint;
                let c = captured_features[m.train_index].keypoint;
                ((r.x as f64, r.y as f64), (c.x as f64, c.y as f64))
            })
            .unzip();

        let ransac = RansacHomographyConfig {
            max_iters: self.params.ransac_iterations,
            inlier_threshold: self.params.reprojection_threshold,
            min_inliers: 4,
            ..RansacHomographyConfig::default()
        };
        let Some(result) = fit_homography_ransac(&reference_points, &captured_points, &ransac)
        else {
            info!(
                good_matches = matches.len(),
                "Homography estimation failed, skipping template alignment"
            );
            return captured.clone();
        };

        let aligned = warp_perspective(
            captured,
            &result.h,
            self.reference_width,
            self.reference_height,
        );

        debug!(
            target: "survey_preprocessing",
            "Template alignment completed in {}ms: {} matches, {} inliers",
            start_time.elapsed().as_millis(),
            matches.len(),
            result.inlier_count
        );

        aligned
    }
}
