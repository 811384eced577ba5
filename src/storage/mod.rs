//! Storage layer: domain types read from the upstream pipeline and the
//! leasing protocol the workers drive.
//!
//! The upstream tables (`parsed_prediction`, `parsed_prediction_details`,
//! `scraped_post`) are read-only here. The core owns exactly one table,
//! `validation_result`, written once per prediction under a unique
//! constraint on the prediction id.

mod postgres;

pub use postgres::{PgLease, PgStorage};

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageResult;

/// Maximum proof length in characters; longer proofs are ellipsis-truncated.
pub const MAX_PROOF_CHARS: usize = 700;

/// Maximum number of supporting sources per result.
pub const MAX_SOURCES: usize = 2;

/// A half-open index range over a post's text identifying the claim
/// substring. Offsets are Unicode code points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalSlice {
    pub start: usize,
    pub end: usize,
    /// Post the slice points into; the leased post when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_post_id: Option<String>,
}

/// One parsed claim produced by the upstream pipeline.
#[derive(Debug, Clone)]
pub struct Prediction {
    pub id: String,
    pub source_post_id: String,
    pub goal_slices: Vec<GoalSlice>,
    /// Parser confidence, 0..1
    pub llm_confidence: Option<f64>,
    /// Quality score, 0..100
    pub prediction_quality: Option<f64>,
    /// Vagueness score, 0..1
    pub vagueness: Option<f64>,
}

/// Extra per-prediction metadata from the upstream filter stage.
#[derive(Debug, Clone)]
pub struct PredictionDetails {
    pub prediction_id: String,
    /// Pre-computed summary of the claim, preferred over slicing
    pub prediction_context: Option<String>,
    pub timeframe_start: Option<DateTime<Utc>>,
    pub timeframe_end: Option<DateTime<Utc>>,
    /// Status enum from upstream; the sentinel "missing" disqualifies
    pub timeframe_status: Option<String>,
    pub filter_validation_confidence: Option<f64>,
    pub filter_validation_reasoning: Option<String>,
}

/// Original post text a prediction's slices may reference.
#[derive(Debug, Clone)]
pub struct Post {
    pub id: String,
    pub text: String,
}

/// The tuple a lease hands to the pipeline.
#[derive(Debug, Clone)]
pub struct LeasedTuple {
    pub prediction: Prediction,
    pub details: PredictionDetails,
    pub post: Post,
}

/// Final label written to storage.
///
/// `NotMatured` is declared for schema compatibility and never produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    MaturedTrue,
    MaturedMostlyTrue,
    MaturedFalse,
    MaturedMostlyFalse,
    MissingContext,
    NotMatured,
    Invalid,
}

impl Outcome {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::MaturedTrue => "matured_true",
            Outcome::MaturedMostlyTrue => "matured_mostly_true",
            Outcome::MaturedFalse => "matured_false",
            Outcome::MaturedMostlyFalse => "matured_mostly_false",
            Outcome::MissingContext => "missing_context",
            Outcome::NotMatured => "not_matured",
            Outcome::Invalid => "invalid",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "matured_true" => Ok(Outcome::MaturedTrue),
            "matured_mostly_true" => Ok(Outcome::MaturedMostlyTrue),
            "matured_false" => Ok(Outcome::MaturedFalse),
            "matured_mostly_false" => Ok(Outcome::MaturedMostlyFalse),
            "missing_context" => Ok(Outcome::MissingContext),
            "not_matured" => Ok(Outcome::NotMatured),
            "invalid" => Ok(Outcome::Invalid),
            _ => Err(format!("Unknown outcome: {}", s)),
        }
    }
}

/// A search result whose URL parsed as well-formed http(s).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pub_date: Option<String>,
}

/// The core's output row: one validation verdict per prediction.
#[derive(Debug, Clone)]
pub struct ValidationRecord {
    pub id: String,
    pub prediction_id: String,
    pub outcome: Outcome,
    pub proof: String,
    pub sources: Vec<Source>,
    pub created_at: DateTime<Utc>,
}

impl ValidationRecord {
    /// Build a record, clamping proof and sources to their bounds.
    pub fn new(
        prediction_id: impl Into<String>,
        outcome: Outcome,
        proof: impl Into<String>,
        mut sources: Vec<Source>,
    ) -> Self {
        sources.truncate(MAX_SOURCES);
        Self {
            id: Uuid::new_v4().to_string(),
            prediction_id: prediction_id.into(),
            outcome,
            proof: truncate_proof(&proof.into()),
            sources,
            created_at: Utc::now(),
        }
    }
}

/// Truncate a proof to [`MAX_PROOF_CHARS`] characters, replacing the tail
/// with a 3-char ellipsis. Strings already within the bound pass through
/// unchanged, so the operation is idempotent.
pub fn truncate_proof(proof: &str) -> String {
    if proof.chars().count() <= MAX_PROOF_CHARS {
        return proof.to_string();
    }
    let mut truncated: String = proof.chars().take(MAX_PROOF_CHARS - 3).collect();
    truncated.push_str("...");
    truncated
}

/// On-demand post text lookup for cross-post goal slices.
#[async_trait]
pub trait PostSource: Send + Sync {
    /// Fetch a post's text by id; `None` when the post does not exist.
    async fn post_text(&self, post_id: &str) -> StorageResult<Option<String>>;
}

/// In-memory post store for tests and offline slicing.
#[derive(Debug, Default, Clone)]
pub struct StaticPosts {
    posts: HashMap<String, String>,
}

impl StaticPosts {
    /// Build from (id, text) pairs.
    pub fn new(posts: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            posts: posts.into_iter().collect(),
        }
    }
}

#[async_trait]
impl PostSource for StaticPosts {
    async fn post_text(&self, post_id: &str) -> StorageResult<Option<String>> {
        Ok(self.posts.get(post_id).cloned())
    }
}

/// Source of leasable validation jobs.
///
/// The Postgres implementation backs a lease with a `FOR UPDATE SKIP
/// LOCKED` row lock held for the lifetime of the job's transaction; tests
/// substitute an in-memory queue with the same at-most-once contract.
#[async_trait]
pub trait ValidationQueue: Send + Sync {
    /// The leased-job handle this queue hands out.
    type Job: LeasedJob;

    /// Lease the next matured, unvalidated, quality-passing prediction,
    /// or `None` when the queue is empty. Safe under parallel callers.
    async fn lease(&self, now: DateTime<Utc>) -> StorageResult<Option<Self::Job>>;
}

/// A leased prediction holding its row lock until persisted or dropped.
///
/// Dropping a job without calling [`persist`](LeasedJob::persist) releases
/// the lease without writing, leaving the prediction eligible for the
/// next sweep.
#[async_trait]
pub trait LeasedJob: Send {
    /// The leased prediction tuple.
    fn tuple(&self) -> &LeasedTuple;

    /// Insert the record if no row exists for this prediction, then
    /// commit and release the lock. Returns `false` when another worker
    /// already persisted a result (the unique-constraint race).
    async fn persist(self, record: ValidationRecord) -> StorageResult<bool>;
}
