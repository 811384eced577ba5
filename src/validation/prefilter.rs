//! Defensive in-memory pre-filter.
//!
//! Re-applies every quality threshold the leasing query already checked,
//! catching drift between the SQL predicate and application policy, and
//! adds the one rule SQL cannot express: a keyword scan over the filter's
//! free-text reasoning for signals that the text is not a validatable
//! prediction.

use crate::config::ValidationConfig;
use crate::storage::{Prediction, PredictionDetails};

/// How much of the quoted filter reasoning a rejection reason may carry.
const MAX_QUOTED_REASONING_CHARS: usize = 200;

/// A pre-filter rejection with a human-readable reason.
///
/// The reason becomes the proof of the resulting `Invalid` row.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub reason: String,
}

impl Rejection {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Re-check all quality gates on a leased tuple. Absent values pass the
/// threshold checks; the timeframe status is required.
pub fn evaluate(
    prediction: &Prediction,
    details: &PredictionDetails,
    config: &ValidationConfig,
) -> Result<(), Rejection> {
    match details.timeframe_status.as_deref() {
        None | Some("missing") => {
            return Err(Rejection::new("Timeframe status is missing"));
        }
        Some(_) => {}
    }

    if let (Some(start), Some(end)) = (details.timeframe_start, details.timeframe_end) {
        if start > end {
            return Err(Rejection::new("Timeframe starts after it ends"));
        }
    }

    if let Some(confidence) = details.filter_validation_confidence {
        if confidence < config.min_filter_confidence {
            return Err(Rejection::new(format!(
                "Filter confidence too low: {:.2} (threshold: {:.2})",
                confidence, config.min_filter_confidence
            )));
        }
    }

    if let Some(quality) = prediction.prediction_quality {
        if quality < config.min_prediction_quality {
            return Err(Rejection::new(format!(
                "Prediction quality too low: {:.0} (threshold: {:.0})",
                quality, config.min_prediction_quality
            )));
        }
    }

    if let Some(confidence) = prediction.llm_confidence {
        if confidence < config.min_llm_confidence {
            return Err(Rejection::new(format!(
                "LLM confidence too low: {:.2} (threshold: {:.2})",
                confidence, config.min_llm_confidence
            )));
        }
    }

    if let Some(vagueness) = prediction.vagueness {
        if vagueness > config.max_vagueness {
            return Err(Rejection::new(format!(
                "Prediction too vague: {:.2} (threshold: {:.2})",
                vagueness, config.max_vagueness
            )));
        }
    }

    if let Some(reasoning) = &details.filter_validation_reasoning {
        let folded = reasoning.to_lowercase();
        if let Some(keyword) = config
            .invalid_reasoning_keywords
            .iter()
            .find(|kw| folded.contains(kw.as_str()))
        {
            let quoted: String = reasoning
                .chars()
                .take(MAX_QUOTED_REASONING_CHARS)
                .collect();
            return Err(Rejection::new(format!(
                "Filter reasoning indicates an invalid prediction (\"{}\"): {}",
                keyword, quoted
            )));
        }
    }

    Ok(())
}
