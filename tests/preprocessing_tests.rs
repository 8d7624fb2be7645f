//! # Preprocessing Tests Module
//!
//! Quality scoring, problem flags and skew correction on synthetic captures.

mod common;

#[cfg(test)]
mod tests {
    use super::common::banded;
    use image::{DynamicImage, GrayImage, Luma};
    use survey_scan::config::QualityThresholds;
    use survey_scan::preprocessing::{
        assess_quality, check_image_problems, correct_skew, detect_skew, optimization_suggestions,
        quality_metrics, ProblemFlag,
    };

    fn flags_of(image: GrayImage) -> Vec<ProblemFlag> {
        check_image_problems(&DynamicImage::ImageLuma8(image), &QualityThresholds::default()).flags()
    }

    /// Test that a sharp, mid-gray, large, straight page scores close to 1.0
    #[test]
    fn test_ideal_capture_scores_near_one() {
        let image = DynamicImage::ImageLuma8(banded(1000, 1000, 50, 0, 255));
        let score = assess_quality(&image);
        assert!(score > 0.95, "score was {}", score);
    }

    /// Test that a flat image never beats the zero-contrast baseline
    #[test]
    fn test_flat_image_is_penalized() {
        for intensity in [0u8, 127, 255] {
            let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(100, 100, Luma([intensity])));
            let metrics = quality_metrics(&image);
            assert_eq!(metrics.contrast, 0.0);
            assert!(metrics.overall_quality <= 0.42 + 1e-6);
        }
    }

    /// Test that a clean banded page raises no flag
    #[test]
    fn test_clean_page_has_no_problems() {
        assert!(flags_of(banded(500, 500, 25, 60, 190)).is_empty());
    }

    /// Test each flag in isolation with an image built to violate one threshold
    #[test]
    fn test_problem_flags_are_independent() {
        assert_eq!(flags_of(banded(500, 500, 25, 10, 80)), vec![ProblemFlag::TooDark]);
        assert_eq!(
            flags_of(banded(500, 500, 25, 175, 245)),
            vec![ProblemFlag::TooBright]
        );
        assert_eq!(
            flags_of(banded(500, 500, 25, 100, 156)),
            vec![ProblemFlag::LowContrast]
        );
        assert_eq!(flags_of(banded(4001, 100, 25, 60, 190)), vec![ProblemFlag::TooLarge]);

        let gradient = GrayImage::from_fn(500, 500, |_, y| Luma([(y * 255 / 499) as u8]));
        assert_eq!(flags_of(gradient), vec![ProblemFlag::Blurry]);

        let tilted = correct_skew(&banded(500, 500, 25, 60, 190), -10.0);
        assert_eq!(flags_of(tilted), vec![ProblemFlag::Skewed]);
    }

    /// Test that suggestions follow flag order
    #[test]
    fn test_suggestions_match_flags() {
        let thresholds = QualityThresholds::default();
        let report = check_image_problems(
            &DynamicImage::ImageLuma8(banded(4001, 100, 25, 10, 80)),
            &thresholds,
        );
        let suggestions = optimization_suggestions(&report, &thresholds);
        assert_eq!(suggestions.len(), 2);
        assert_eq!(suggestions[0], "Reduce the image size to at most 4000x4000 pixels");
        assert_eq!(suggestions[1], "Increase the image brightness");
    }

    /// Test the detect/correct round trip leaves at most one degree of skew
    #[test]
    fn test_skew_round_trip() {
        let straight = banded(400, 400, 40, 30, 220);
        for tilt in [-4.0, 3.0] {
            let tilted = correct_skew(&straight, tilt);
            let measured = detect_skew(&tilted);
            assert!((measured + tilt).abs() < 1.5, "tilt {} measured {}", tilt, measured);

            let corrected = correct_skew(&tilted, measured);
            let residual = detect_skew(&corrected);
            assert!(residual.abs() <= 1.0, "residual {}", residual);
        }
    }
}
