//! The validator pipeline.
//!
//! Orchestrates one leased prediction from pre-filter to a finished
//! [`ValidationRecord`]. Adapter failures never escape: whatever goes
//! wrong after leasing, the pipeline returns a persistable record so the
//! prediction is not retried on the next sweep. Only storage errors
//! propagate, which the worker treats as recoverable.

use tracing::{info, warn};

use crate::chat::ChatClient;
use crate::config::ValidationConfig;
use crate::error::{AppError, StorageResult};
use crate::search::{SearchClient, SearchResult};
use crate::storage::{LeasedTuple, Outcome, PostSource, Source, ValidationRecord};

use super::enhancer::{PastAttempt, QueryEnhancer};
use super::judge::ResultJudge;
use super::outcome::{format_proof, map_outcome, pick_sources};
use super::{goal, prefilter};

/// Per-validation cost breakdown handed to the cost tracker after commit.
#[derive(Debug, Clone, Default)]
pub struct ValidationCosts {
    pub search_api_calls: u64,
    pub enhancer_input_tokens: u64,
    pub enhancer_output_tokens: u64,
    pub judge_input_tokens: u64,
    pub judge_output_tokens: u64,
    /// The extracted prediction text, when extraction got that far
    pub prediction_text: Option<String>,
}

impl ValidationCosts {
    /// Total input tokens across both chat stages.
    pub fn total_input_tokens(&self) -> u64 {
        self.enhancer_input_tokens + self.judge_input_tokens
    }

    /// Total output tokens across both chat stages.
    pub fn total_output_tokens(&self) -> u64 {
        self.enhancer_output_tokens + self.judge_output_tokens
    }
}

/// A finished validation: the record to persist plus what it cost.
#[derive(Debug, Clone)]
pub struct ValidationOutput {
    pub record: ValidationRecord,
    pub costs: ValidationCosts,
}

/// Runs the full validation pipeline for one leased prediction.
#[derive(Clone)]
pub struct ValidatorPipeline {
    enhancer: QueryEnhancer,
    judge: ResultJudge,
    search: SearchClient,
    config: ValidationConfig,
}

impl ValidatorPipeline {
    /// Wire the pipeline from shared adapter clients.
    pub fn new(
        chat: ChatClient,
        search: SearchClient,
        enhancer_model: impl Into<String>,
        judge_model: impl Into<String>,
        config: ValidationConfig,
    ) -> Self {
        Self {
            enhancer: QueryEnhancer::new(chat.clone(), enhancer_model),
            judge: ResultJudge::new(chat, judge_model),
            search,
            config,
        }
    }

    /// Validate one leased tuple.
    ///
    /// Storage errors (post lookups) propagate; everything else resolves
    /// into a record with one of the six written outcomes.
    pub async fn run(
        &self,
        tuple: &LeasedTuple,
        posts: &dyn PostSource,
    ) -> StorageResult<ValidationOutput> {
        let prediction_id = tuple.prediction.id.clone();
        let mut costs = ValidationCosts::default();

        if let Err(rejection) = prefilter::evaluate(&tuple.prediction, &tuple.details, &self.config)
        {
            info!(prediction_id = %prediction_id, reason = %rejection.reason, "Pre-filter rejected prediction");
            return Ok(ValidationOutput {
                record: ValidationRecord::new(
                    prediction_id,
                    Outcome::Invalid,
                    rejection.reason,
                    Vec::new(),
                ),
                costs,
            });
        }

        let Some(text) = goal::extract(tuple, posts).await? else {
            warn!(prediction_id = %prediction_id, "No prediction text could be extracted");
            return Ok(ValidationOutput {
                record: ValidationRecord::new(
                    prediction_id,
                    Outcome::Invalid,
                    "Unable to extract prediction text",
                    Vec::new(),
                ),
                costs,
            });
        };

        costs.prediction_text = Some(text.clone());

        let record = match self.search_and_judge(&text, &mut costs).await {
            Ok((outcome, proof, sources)) => {
                ValidationRecord::new(prediction_id, outcome, proof, sources)
            }
            Err(e) => {
                warn!(prediction_id = %prediction_id, error = %e, "Validation failed, writing invalid outcome");
                ValidationRecord::new(
                    prediction_id,
                    Outcome::Invalid,
                    format!("Validation error: {}", e),
                    Vec::new(),
                )
            }
        };

        Ok(ValidationOutput { record, costs })
    }

    /// The external-call stages: enhance, fan out, judge, optionally
    /// refine once, then map.
    async fn search_and_judge(
        &self,
        text: &str,
        costs: &mut ValidationCosts,
    ) -> Result<(Outcome, String, Vec<Source>), AppError> {
        let enhanced = self
            .enhancer
            .enhance_multiple(text, self.config.initial_queries)
            .await?;
        costs.enhancer_input_tokens += enhanced.input_tokens;
        costs.enhancer_output_tokens += enhanced.output_tokens;

        let mut combined: Vec<SearchResult> = self
            .search
            .fan_out(&enhanced.queries, self.config.results_per_query)
            .await?;
        costs.search_api_calls += enhanced.queries.len() as u64;

        if combined.is_empty() {
            return Ok((
                Outcome::MissingContext,
                "No search results found".to_string(),
                Vec::new(),
            ));
        }

        let mut judgment = self
            .judge
            .judge(text, &combined, self.config.max_total_results)
            .await?;
        costs.judge_input_tokens += judgment.input_tokens;
        costs.judge_output_tokens += judgment.output_tokens;

        let needs_refinement = !judgment.sufficient
            && combined.len() < self.config.max_total_results
            && self.config.max_refinement_iterations > 0;

        if needs_refinement {
            let past_attempts: Vec<PastAttempt> = enhanced
                .queries
                .iter()
                .map(|q| PastAttempt {
                    query: q.clone(),
                    successful: false,
                    reasoning: judgment.next_query_suggestion.clone(),
                })
                .collect();

            let refined = self.enhancer.enhance_refine(text, &past_attempts).await?;
            costs.enhancer_input_tokens += refined.input_tokens;
            costs.enhancer_output_tokens += refined.output_tokens;

            let more = self
                .search
                .fan_out(
                    std::slice::from_ref(&refined.query),
                    self.config.results_per_query,
                )
                .await?;
            costs.search_api_calls += 1;
            combined.extend(more);

            judgment = self
                .judge
                .judge(text, &combined, self.config.max_total_results)
                .await?;
            costs.judge_input_tokens += judgment.input_tokens;
            costs.judge_output_tokens += judgment.output_tokens;
        }

        let outcome = map_outcome(&judgment);
        let proof = format_proof(&judgment);
        let sources = pick_sources(judgment.decision, &combined);

        Ok((outcome, proof, sources))
    }
}
