//! Result judgment.
//!
//! Posts the prediction text and the combined search results to the chat
//! endpoint and parses the tagged reply. The numeric score is the source
//! of truth: the textual decision is advisory and gets reconciled against
//! the score range after parsing.

use tracing::{debug, warn};

use crate::chat::{ChatClient, ChatMessage};
use crate::error::ChatResult;
use crate::prompts::RESULT_JUDGE_PROMPT;
use crate::search::SearchResult;

const JUDGE_TEMPERATURE: f64 = 0.2;
const JUDGE_MAX_TOKENS: u32 = 1000;
const DEFAULT_SCORE: i64 = 5;

/// The judge's verdict on a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    True,
    False,
    Inconclusive,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::True => write!(f, "TRUE"),
            Decision::False => write!(f, "FALSE"),
            Decision::Inconclusive => write!(f, "INCONCLUSIVE"),
        }
    }
}

/// Parsed and reconciled judgment of one prediction.
#[derive(Debug, Clone)]
pub struct Judgment {
    pub decision: Decision,
    /// 0 = certainly false, 10 = certainly true
    pub score: i64,
    pub summary: String,
    pub evidence: Option<String>,
    pub reasoning: Option<String>,
    /// Whether the evidence set is enough to commit to an outcome
    pub sufficient: bool,
    pub next_query_suggestion: Option<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Judges predictions against search results via the chat endpoint.
#[derive(Clone)]
pub struct ResultJudge {
    chat: ChatClient,
    model: String,
}

impl ResultJudge {
    /// Create a judge bound to one chat model.
    pub fn new(chat: ChatClient, model: impl Into<String>) -> Self {
        Self {
            chat,
            model: model.into(),
        }
    }

    /// Judge the prediction against up to `max_results` of the combined
    /// search results.
    pub async fn judge(
        &self,
        prediction_text: &str,
        results: &[SearchResult],
        max_results: usize,
    ) -> ChatResult<Judgment> {
        let prompt = build_prompt(prediction_text, results, max_results);
        let messages = vec![
            ChatMessage::system(RESULT_JUDGE_PROMPT),
            ChatMessage::user(prompt),
        ];

        let completion = self
            .chat
            .complete(&self.model, messages, JUDGE_TEMPERATURE, JUDGE_MAX_TOKENS)
            .await?;

        let judgment = parse_reply(
            &completion.content,
            completion.input_tokens,
            completion.output_tokens,
        );

        debug!(
            decision = %judgment.decision,
            score = judgment.score,
            sufficient = judgment.sufficient,
            "Judged prediction"
        );

        Ok(judgment)
    }
}

fn build_prompt(prediction_text: &str, results: &[SearchResult], max_results: usize) -> String {
    let mut prompt = format!("Prediction: {}\n\nSearch results:\n", prediction_text);

    for (i, result) in results.iter().take(max_results).enumerate() {
        prompt.push_str(&format!(
            "{}. {}\n   URL: {}\n",
            i + 1,
            result.title.as_deref().unwrap_or("(untitled)"),
            result.url
        ));
        if let Some(date) = &result.pub_date {
            prompt.push_str(&format!("   Date: {}\n", date));
        }
        if let Some(excerpt) = &result.excerpt {
            prompt.push_str(&format!("   {}\n", excerpt));
        }
    }

    prompt
}

/// Parse the tagged reply, falling back to a mid-range score and an
/// inconclusive decision when tags are malformed or absent.
fn parse_reply(content: &str, input_tokens: u64, output_tokens: u64) -> Judgment {
    let score = extract_tag(content, "score")
        .and_then(|s| s.trim().parse::<i64>().ok())
        .map(|s| s.clamp(0, 10))
        .unwrap_or_else(|| {
            warn!("Judge reply had no parseable score, defaulting to mid-range");
            DEFAULT_SCORE
        });

    let stated = match extract_tag(content, "decision") {
        Some(s) => {
            let upper = s.trim().to_uppercase();
            if upper.contains("INCONCLUSIVE") {
                Decision::Inconclusive
            } else if upper.contains("TRUE") {
                Decision::True
            } else if upper.contains("FALSE") {
                Decision::False
            } else {
                Decision::Inconclusive
            }
        }
        None => Decision::Inconclusive,
    };

    let decision = reconcile(score);
    if decision != stated {
        warn!(
            stated = %stated,
            reconciled = %decision,
            score = score,
            "Judge decision disagreed with score, score wins"
        );
    }

    let summary = extract_tag(content, "summary")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "No summary provided".to_string());

    let evidence = extract_tag(content, "evidence")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let reasoning = extract_tag(content, "reasoning")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let sufficient = extract_tag(content, "sufficient")
        .map(|s| s.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let next_query_suggestion = extract_tag(content, "next_query")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    Judgment {
        decision,
        score,
        summary,
        evidence,
        reasoning,
        sufficient,
        next_query_suggestion,
        input_tokens,
        output_tokens,
    }
}

/// Force the decision into the range the score dictates: >= 7 is TRUE,
/// <= 3 is FALSE, anything between is INCONCLUSIVE.
fn reconcile(score: i64) -> Decision {
    match score {
        s if s >= 7 => Decision::True,
        s if s <= 3 => Decision::False,
        _ => Decision::Inconclusive,
    }
}

/// Pull the inner text of `<tag>...</tag>`, if present.
fn extract_tag<'a>(content: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = content.find(&open)? + open.len();
    let end = content[start..].find(&close)? + start;
    Some(&content[start..end])
}
