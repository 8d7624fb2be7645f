//! # Survey Outcome
//!
//! The record handed to persistence once a survey page has been parsed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::confidence::confidence;
use crate::errors::{SurveyError, SurveyResult};

/// Parsed result of one survey page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyOutcome {
    /// Digits following `ID_PARTICIPANTE`, empty when absent
    pub participant_id: String,
    /// Question text to comma-joined answer
    pub responses: BTreeMap<String, String>,
    pub confidence: f64,
    pub processed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl SurveyOutcome {
    /// Builds an outcome stamped with the current time, scoring its confidence.
    pub fn new(participant_id: impl Into<String>, responses: BTreeMap<String, String>) -> Self {
        let confidence = confidence(&responses);
        Self {
            participant_id: participant_id.into(),
            responses,
            confidence,
            processed_at: Utc::now(),
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// True when there is at least one response and none is blank
    pub fn is_complete(&self) -> bool {
        !self.responses.is_empty()
            && self
                .responses
                .values()
                .all(|answer| !answer.trim().is_empty())
    }

    /// Percentage of answered questions, 0 to 100
    pub fn completion_rate(&self) -> f64 {
        confidence(&self.responses) * 100.0
    }

    pub fn to_json(&self) -> SurveyResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| SurveyError::Processing(format!("Failed to serialize outcome: {}", e)))
    }
}

/// Storage collaborator receiving parsed outcomes
pub trait OutcomeSink: Send + Sync {
    fn store(&self, outcome: &SurveyOutcome) -> SurveyResult<()>;
}
