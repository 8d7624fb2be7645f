//! Completeness-based confidence for parsed survey responses.
//!
//! The score is a cheap completeness proxy: it says how many questions have
//! an answer, not how accurately the characters were recognized.

use std::collections::BTreeMap;

/// Fraction of questions with a non-blank answer.
///
/// An answer made only of whitespace counts as unanswered. Parsed answers
/// are already trimmed, so for them this is the same as non-empty.
/// Returns 0.0 for an empty response map.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeMap;
/// use survey_scan::confidence::confidence;
///
/// let mut responses = BTreeMap::new();
/// responses.insert("q1".to_string(), "X".to_string());
/// responses.insert("q2".to_string(), String::new());
/// assert_eq!(confidence(&responses), 0.5);
/// ```
pub fn confidence(responses: &BTreeMap<String, String>) -> f64 {
    if responses.is_empty() {
        return 0.0;
    }
    let answered = responses
        .values()
        .filter(|answer| !answer.trim().is_empty())
        .count();
    answered as f64 / responses.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn responses(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(q, a)| (q.to_string(), a.to_string()))
            .collect()
    }

    #[test]
    fn test_empty_responses() {
        assert_eq!(confidence(&BTreeMap::new()), 0.0);
    }

    #[test]
    fn test_partial_and_full_responses() {
        assert_eq!(confidence(&responses(&[("q1", "X"), ("q2", "")])), 0.5);
        assert_eq!(confidence(&responses(&[("q1", "X"), ("q2", "Y")])), 1.0);
    }

    #[test]
    fn test_whitespace_answer_counts_as_blank() {
        assert_eq!(confidence(&responses(&[("q1", "  "), ("q2", "1, 3")])), 0.5);
    }
}
