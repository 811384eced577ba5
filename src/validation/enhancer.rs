//! Search-query enhancement.
//!
//! Turns the extracted prediction text into web-search queries: an
//! n-angle parallel pass for the initial queries and a single refinement
//! call that knows which queries already failed.

use futures::future::join_all;

use crate::chat::{ChatClient, ChatMessage};
use crate::error::ChatResult;
use crate::prompts::{QUERY_ANGLES, QUERY_ENHANCER_PROMPT, QUERY_REFINE_PROMPT};

/// Output-token cap per query-generation call.
const MAX_QUERY_TOKENS: u32 = 200;

/// Queries from a multi-angle enhancement pass, with aggregated tokens.
#[derive(Debug, Clone)]
pub struct EnhancedQueries {
    pub queries: Vec<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// A single refined query with its token counts.
#[derive(Debug, Clone)]
pub struct RefinedQuery {
    pub query: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// An earlier query that failed to produce sufficient evidence.
#[derive(Debug, Clone)]
pub struct PastAttempt {
    pub query: String,
    pub successful: bool,
    /// Judge-supplied hint about what a better search should include.
    pub reasoning: Option<String>,
}

/// Generates search queries from prediction text via the chat endpoint.
#[derive(Clone)]
pub struct QueryEnhancer {
    chat: ChatClient,
    model: String,
}

impl QueryEnhancer {
    /// Create an enhancer bound to one chat model.
    pub fn new(chat: ChatClient, model: impl Into<String>) -> Self {
        Self {
            chat,
            model: model.into(),
        }
    }

    /// Produce `n` diverse queries by issuing `n` chat calls in parallel,
    /// one per angle directive. Temperature rises per angle to diversify
    /// outputs. Only the first `n` of the fixed angles are used.
    pub async fn enhance_multiple(&self, text: &str, n: usize) -> ChatResult<EnhancedQueries> {
        let angles = &QUERY_ANGLES[..n.min(QUERY_ANGLES.len())];

        let calls = angles.iter().enumerate().map(|(i, angle)| {
            let messages = vec![
                ChatMessage::system(QUERY_ENHANCER_PROMPT),
                ChatMessage::user(format!("{}\n\nPrediction: {}", angle, text)),
            ];
            self.chat.complete(
                &self.model,
                messages,
                0.7 + 0.1 * i as f64,
                MAX_QUERY_TOKENS,
            )
        });

        let mut queries = Vec::with_capacity(angles.len());
        let mut input_tokens = 0;
        let mut output_tokens = 0;

        for completion in join_all(calls).await {
            let completion = completion?;
            queries.push(normalize_query(&completion.content));
            input_tokens += completion.input_tokens;
            output_tokens += completion.output_tokens;
        }

        Ok(EnhancedQueries {
            queries,
            input_tokens,
            output_tokens,
        })
    }

    /// Produce one new query given the prediction and the failed attempts
    /// so far. Temperature rises with the number of failures.
    pub async fn enhance_refine(
        &self,
        text: &str,
        past_attempts: &[PastAttempt],
    ) -> ChatResult<RefinedQuery> {
        let mut prompt = format!("Prediction: {}\n\nFailed queries:\n", text);
        for attempt in past_attempts {
            match &attempt.reasoning {
                Some(hint) => {
                    prompt.push_str(&format!("- \"{}\" (hint: {})\n", attempt.query, hint))
                }
                None => prompt.push_str(&format!("- \"{}\"\n", attempt.query)),
            }
        }
        prompt.push_str("\nWrite one new query that takes a different angle.");

        let messages = vec![
            ChatMessage::system(QUERY_REFINE_PROMPT),
            ChatMessage::user(prompt),
        ];

        let completion = self
            .chat
            .complete(
                &self.model,
                messages,
                0.7 + 0.1 * past_attempts.len() as f64,
                MAX_QUERY_TOKENS,
            )
            .await?;

        Ok(RefinedQuery {
            query: normalize_query(&completion.content),
            input_tokens: completion.input_tokens,
            output_tokens: completion.output_tokens,
        })
    }
}

/// Normalize a model-produced query: keep the first line, trim
/// whitespace, and strip one matched pair of straight or curly quotes.
pub fn normalize_query(raw: &str) -> String {
    let line = raw.trim().lines().next().unwrap_or("").trim();

    let stripped = strip_quote_pair(line, '"', '"')
        .or_else(|| strip_quote_pair(line, '\'', '\''))
        .or_else(|| strip_quote_pair(line, '\u{201C}', '\u{201D}'))
        .or_else(|| strip_quote_pair(line, '\u{2018}', '\u{2019}'))
        .unwrap_or(line);

    stripped.trim().to_string()
}

fn strip_quote_pair(line: &str, open: char, close: char) -> Option<&str> {
    let inner = line.strip_prefix(open)?.strip_suffix(close)?;
    if inner.is_empty() {
        return None;
    }
    Some(inner)
}
