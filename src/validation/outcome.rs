//! Outcome mapping, proof formatting and source selection.

use reqwest::Url;

use crate::search::SearchResult;
use crate::storage::{Outcome, Source, MAX_SOURCES};

use super::judge::{Decision, Judgment};

/// Map a reconciled judgment onto the stored outcome.
///
/// TRUE splits at score 9, FALSE at score 2; INCONCLUSIVE always means
/// the context was missing.
pub fn map_outcome(judgment: &Judgment) -> Outcome {
    match judgment.decision {
        Decision::True if judgment.score >= 9 => Outcome::MaturedTrue,
        Decision::True => Outcome::MaturedMostlyTrue,
        Decision::False if judgment.score <= 2 => Outcome::MaturedFalse,
        Decision::False => Outcome::MaturedMostlyFalse,
        Decision::Inconclusive => Outcome::MissingContext,
    }
}

/// Compose the proof text: summary, then evidence, then reasoning.
///
/// Length clamping happens when the record is built; this only joins the
/// pieces.
pub fn format_proof(judgment: &Judgment) -> String {
    let mut proof = judgment.summary.clone();

    if let Some(evidence) = &judgment.evidence {
        proof.push_str("\n\n");
        proof.push_str(evidence);
    }

    if let Some(reasoning) = &judgment.reasoning {
        proof.push_str("\n\nReasoning: ");
        proof.push_str(reasoning);
    }

    proof
}

/// Pick up to two supporting sources from the combined results,
/// preserving their original ordering and dropping malformed URLs.
///
/// An inconclusive decision gets no sources: nothing in the set actually
/// supported an outcome.
pub fn pick_sources(decision: Decision, combined: &[SearchResult]) -> Vec<Source> {
    if decision == Decision::Inconclusive {
        return Vec::new();
    }

    combined
        .iter()
        .filter(|r| is_well_formed_url(&r.url))
        .take(MAX_SOURCES)
        .map(|r| Source {
            url: r.url.clone(),
            title: r.title.clone(),
            excerpt: r.excerpt.clone(),
            pub_date: r.pub_date.clone(),
        })
        .collect()
}

fn is_well_formed_url(raw: &str) -> bool {
    match Url::parse(raw) {
        Ok(url) => matches!(url.scheme(), "http" | "https"),
        Err(_) => false,
    }
}
