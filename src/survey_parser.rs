//! # Free-Form Survey Parser
//!
//! Parses questionnaires that have no registered layout. Only the textual
//! convention is fixed: a `$` marks a question header and a line holding only
//! a number (optionally followed by blanks or underscores) is an answer option.
//!
//! Parsing takes two passes over the preprocessed page:
//!
//! 1. **Header**: the top band is recognized and searched for
//!    `ID_PARTICIPANTE <digits>`.
//! 2. **Body**: the whole page is recognized line by line. Bulk recognition
//!    keeps no line geometry, so each option line is re-located by recognizing
//!    the page in fixed-height strips; the first strip whose text contains the
//!    line is taken as its position. That strip is then checked for pen marks.
//!
//! Re-location is approximate: when the same option text appears in several
//! strips the first one wins.

use image::imageops::crop_imm;
use image::GrayImage;
use imageproc::contours::{find_contours, BorderType, Contour};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{MarkDetection, ScanConfig};
use crate::errors::{error_logging, SurveyResult};
use crate::observability;
use crate::ocr::{clean_text, TextRecognizer};
use crate::ocr_config::OcrConfig;
use crate::outcome::SurveyOutcome;
use crate::preprocessing::{ImagePreprocessor, PreprocessOutcome};

lazy_static! {
    static ref PARTICIPANT_ID_REGEX: Regex =
        Regex::new(r"ID_PARTICIPANTE\s*(\d+)").expect("Invalid participant id regex pattern");
    static ref OPTION_LINE_REGEX: Regex =
        Regex::new(r"^(\d+)[\s_]*$").expect("Invalid option line regex pattern");
}

/// Parser for free-form questionnaires.
pub struct SurveyParser {
    preprocessor: ImagePreprocessor,
    recognizer: Arc<dyn TextRecognizer>,
    marks: MarkDetection,
    ocr: OcrConfig,
}

impl SurveyParser {
    pub fn new(config: &ScanConfig, recognizer: Arc<dyn TextRecognizer>) -> Self {
        Self {
            preprocessor: ImagePreprocessor::new(config),
            recognizer,
            marks: config.marks.clone(),
            ocr: config.ocr.clone(),
        }
    }

    /// Preprocesses, parses and scores one survey page.
    ///
    /// # Errors
    ///
    /// - `SurveyError::NotFound` when `path` does not exist
    /// - `SurveyError::RejectedLowQuality` when the page fails the quality gate
    /// - the load or processing error when preprocessing fails
    pub fn process_image(&self, path: &Path) -> SurveyResult<SurveyOutcome> {
        let _span = observability::image_span("parse_survey", path).entered();

        let accepted = match self.preprocessor.preprocess_image(path)? {
            PreprocessOutcome::Accepted(accepted) => accepted,
            PreprocessOutcome::Rejected(rejection) => return Err(rejection.into_error()),
            PreprocessOutcome::Failed(err) => return Err(err),
        };

        let participant_id = self.extract_participant_id(&accepted.image);
        let responses = self.parse_responses(&accepted.image);
        let outcome = SurveyOutcome::new(participant_id, responses);

        info!(
            path = %path.display(),
            participant_id = %outcome.participant_id,
            questions = outcome.responses.len(),
            confidence = outcome.confidence,
            "Survey parsed"
        );
        Ok(outcome)
    }

    /// Reads the participant identifier from the header band, or "" when absent.
    pub fn extract_participant_id(&self, image: &GrayImage) -> String {
        if image.width() == 0 || image.height() == 0 {
            return String::new();
        }
        let header_height =
            ((image.height() as f64 * self.marks.header_fraction) as u32).clamp(1, image.height());
        let header = crop_imm(image, 0, 0, image.width(), header_height).to_image();

        let text = match self.recognize(&header) {
            Ok(text) => text,
            Err(err) => {
                error_logging::log_ocr_error(&err, "participant_header", Some(header.dimensions()));
                return String::new();
            }
        };

        match PARTICIPANT_ID_REGEX.captures(&text) {
            Some(captures) => captures[1].to_string(),
            None => {
                debug!("No participant identifier found in header");
                String::new()
            }
        }
    }

    /// Recovers question to answer associations from the page text.
    ///
    /// Each `$` line registers a question with an empty answer; a bare `$`
    /// closes the current question without opening a new one. Option lines
    /// under a question are re-located on the page, and the numbers of those
    /// carrying a pen mark are joined with `", "` as its answer.
    pub fn parse_responses(&self, image: &GrayImage) -> BTreeMap<String, String> {
        let mut responses = BTreeMap::new();
        if image.width() == 0 || image.height() == 0 {
            return responses;
        }

        let text = match self.recognize(image) {
            Ok(text) => text,
            Err(err) => {
                error_logging::log_ocr_error(&err, "survey_body", Some(image.dimensions()));
                return responses;
            }
        };

        let mut strips = StripIndex::new(image, self.marks.strip_height);
        let mut current_question: Option<String> = None;

        for line in text.lines() {
            if let Some(position) = line.find('$') {
                let question = line[position + 1..].trim().to_string();
                if question.is_empty() {
                    current_question = None;
                    continue;
                }
                responses.entry(question.clone()).or_insert_with(String::new);
                current_question = Some(question);
                continue;
            }

            let Some(question) = current_question.as_ref() else {
                continue;
            };
            let line = line.trim();
            let Some(captures) = OPTION_LINE_REGEX.captures(line) else {
                continue;
            };
            let option_number = &captures[1];

            let Some(strip) = strips.locate(line, |region| self.recognize(region)) else {
                debug!(line = %line, "Option line could not be re-located");
                continue;
            };

            if self.strip_has_mark(&strip) {
                let answer = responses.entry(question.clone()).or_insert_with(String::new);
                if !answer.is_empty() {
                    answer.push_str(", ");
                }
                answer.push_str(option_number);
            }
        }

        responses
    }

    /// True when the strip holds a pen mark larger than the minimum contour area.
    fn strip_has_mark(&self, strip: &GrayImage) -> bool {
        let marks = self.preprocessor.enhance_marks_region(strip);
        find_contours::<i32>(&marks)
            .iter()
            .filter(|contour| contour.border_type == BorderType::Outer)
            .any(|contour| contour_area(contour) > self.marks.min_mark_contour_area)
    }

    fn recognize(&self, region: &GrayImage) -> SurveyResult<String> {
        let prepared = self.preprocessor.prepare_for_ocr(region)?;
        let raw = self.recognizer.recognize_text(
            &prepared,
            &self.ocr.languages,
            &self.ocr.character_whitelist,
        )?;
        Ok(clean_text(&raw))
    }
}

/// Fixed-height horizontal strips of a page with lazily recognized text.
struct StripIndex<'a> {
    image: &'a GrayImage,
    strip_height: u32,
    texts: Vec<Option<String>>,
}

impl<'a> StripIndex<'a> {
    fn new(image: &'a GrayImage, strip_height: u32) -> Self {
        let strip_height = strip_height.max(1);
        let count = image.height().div_ceil(strip_height) as usize;
        Self {
            image,
            strip_height,
            texts: vec![None; count],
        }
    }

    fn crop(&self, index: usize) -> GrayImage {
        let top = index as u32 * self.strip_height;
        let height = self.strip_height.min(self.image.height() - top);
        crop_imm(self.image, 0, top, self.image.width(), height).to_image()
    }

    /// First strip whose text contains `line`; each strip is recognized at most once.
    fn locate<F>(&mut self, line: &str, mut recognize: F) -> Option<GrayImage>
    where
        F: FnMut(&GrayImage) -> SurveyResult<String>,
    {
        for index in 0..self.texts.len() {
            if self.texts[index].is_none() {
                let strip = self.crop(index);
                let text = recognize(&strip).unwrap_or_else(|err| {
                    warn!(strip = index, error = %err, "Strip recognition failed");
                    String::new()
                });
                self.texts[index] = Some(text);
            }
            if self.texts[index]
                .as_deref()
                .is_some_and(|text| text.contains(line))
            {
                return Some(self.crop(index));
            }
        }
        None
    }
}

/// Shoelace area of a closed contour.
fn contour_area(contour: &Contour<i32>) -> f64 {
    let points = &contour.points;
    if points.len() < 3 {
        return 0.0;
    }
    let twice_area: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
        .sum();
    (twice_area as f64 / 2.0).abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr_errors::OcrError;
    use image::Luma;
    use imageproc::point::Point;
    use parking_lot::Mutex;

    /// Answers with a fixed text per region height.
    struct HeightScripted {
        by_height: Vec<(u32, String)>,
        calls: Mutex<Vec<u32>>,
    }

    impl TextRecognizer for HeightScripted {
        fn recognize_text(&self, region: &GrayImage, _: &str, _: &str) -> Result<String, OcrError> {
            self.calls.lock().push(region.height());
            Ok(self
                .by_height
                .iter()
                .find(|(height, _)| *height == region.height())
                .map(|(_, text)| text.clone())
                .unwrap_or_default())
        }
    }

    fn parser(by_height: Vec<(u32, &str)>) -> (SurveyParser, Arc<HeightScripted>) {
        let recognizer = Arc::new(HeightScripted {
            by_height: by_height
                .into_iter()
                .map(|(h, t)| (h, t.to_string()))
                .collect(),
            calls: Mutex::new(Vec::new()),
        });
        (
            SurveyParser::new(&ScanConfig::default(), recognizer.clone()),
            recognizer,
        )
    }

    /// 300x200 page with a pen mark in the first 50px strip
    fn marked_page() -> GrayImage {
        let mut page = GrayImage::from_pixel(300, 200, Luma([255]));
        for y in 10..40 {
            for x in 200..230 {
                page.put_pixel(x, y, Luma([0]));
            }
        }
        page
    }

    #[test]
    fn test_participant_id_found() {
        let (parser, _) = parser(vec![(40, "ENCUESTA\nID_PARTICIPANTE 12345")]);
        let page = GrayImage::from_pixel(300, 200, Luma([255]));
        assert_eq!(parser.extract_participant_id(&page), "12345");
    }

    #[test]
    fn test_participant_id_absent() {
        let (parser, _) = parser(vec![(40, "ENCUESTA DE SALUD")]);
        let page = GrayImage::from_pixel(300, 200, Luma([255]));
        assert_eq!(parser.extract_participant_id(&page), "");
    }

    #[test]
    fn test_questions_without_marks_are_blank() {
        let (parser, _) = parser(vec![(200, "$ EDAD\n1 MENOS DE 18\n$ SEXO")]);
        let page = GrayImage::from_pixel(300, 200, Luma([255]));
        let responses = parser.parse_responses(&page);
        assert_eq!(responses.len(), 2);
        assert_eq!(responses["EDAD"], "");
        assert_eq!(responses["SEXO"], "");
    }

    #[test]
    fn test_option_lines_before_any_question_are_ignored() {
        let (parser, _) = parser(vec![(200, "1 HUERFANA\n2 OTRA")]);
        let page = GrayImage::from_pixel(300, 200, Luma([255]));
        assert!(parser.parse_responses(&page).is_empty());
    }

    #[test]
    fn test_marked_options_use_first_matching_strip() {
        let (parser, recognizer) = parser(vec![(200, "$ EDAD\n1\n2 __"), (50, "1 SI 2 __ NO")]);
        let responses = parser.parse_responses(&marked_page());
        assert_eq!(responses["EDAD"], "1, 2");

        let strip_calls = recognizer
            .calls
            .lock()
            .iter()
            .filter(|&&height| height == 50)
            .count();
        assert_eq!(strip_calls, 1);
    }

    #[test]
    fn test_bare_dollar_closes_current_question() {
        let (parser, _) = parser(vec![(200, "$ EDAD\n$\n1"), (50, "1")]);
        let responses = parser.parse_responses(&marked_page());
        assert_eq!(responses.len(), 1);
        assert_eq!(responses["EDAD"], "");
    }

    #[test]
    fn test_digit_led_text_is_not_an_option() {
        let (parser, _) = parser(vec![(200, "$ EDAD\n18 ANOS O MAS"), (50, "18 ANOS O MAS")]);
        assert_eq!(parser.parse_responses(&marked_page())["EDAD"], "");

        let (parser, _) = self::parser(vec![(200, "$ EDAD\n18 ___"), (50, "18 ___")]);
        assert_eq!(parser.parse_responses(&marked_page())["EDAD"], "18");
    }

    #[test]
    fn test_contour_area_of_square() {
        let contour = Contour {
            points: vec![
                Point::new(0, 0),
                Point::new(10, 0),
                Point::new(10, 10),
                Point::new(0, 10),
            ],
            border_type: BorderType::Outer,
            parent: None,
        };
        assert_eq!(contour_area(&contour), 100.0);
    }

    #[test]
    fn test_strip_mark_detection() {
        let (parser, _) = parser(vec![]);
        let blank = GrayImage::from_pixel(200, 50, Luma([255]));
        assert!(!parser.strip_has_mark(&blank));

        let mut marked = blank.clone();
        for y in 10..40 {
            for x in 100..130 {
                marked.put_pixel(x, y, Luma([0]));
            }
        }
        assert!(parser.strip_has_mark(&marked));
    }
}
