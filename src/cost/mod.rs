//! Cost and telemetry tracking.
//!
//! One tracker instance is shared by every worker. It keeps two counter
//! sets: **session** counts since start-up and **historical** counts
//! seeded from the persisted cost log at start and advanced as new
//! validations land. The dashboard pulls snapshots; nothing here renders.

mod log;

pub use log::{CostLog, CostLogEntry};

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::warn;

use crate::storage::Outcome;

/// Search API pricing: 100 USD per 35,000 calls (plan-specific).
const SEARCH_COST_PER_CALL_USD: f64 = 100.0 / 35000.0;
/// LLM input pricing per million tokens.
const INPUT_COST_PER_MILLION_USD: f64 = 0.30;
/// LLM output pricing per million tokens.
const OUTPUT_COST_PER_MILLION_USD: f64 = 2.50;

/// One set of aggregate counters.
#[derive(Debug, Clone, Default)]
pub struct CostCounters {
    pub validated: u64,
    pub search_api_calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub outcomes: HashMap<Outcome, u64>,
}

impl CostCounters {
    /// Fold one validation into the counters.
    pub fn record(&mut self, outcome: Outcome, search_calls: u64, input: u64, output: u64) {
        self.validated += 1;
        self.search_api_calls += search_calls;
        self.input_tokens += input;
        self.output_tokens += output;
        *self.outcomes.entry(outcome).or_insert(0) += 1;
    }

    /// Derived search spend in USD.
    pub fn search_cost_usd(&self) -> f64 {
        self.search_api_calls as f64 * SEARCH_COST_PER_CALL_USD
    }

    /// Derived LLM spend in USD.
    pub fn llm_cost_usd(&self) -> f64 {
        (self.input_tokens as f64 / 1e6) * INPUT_COST_PER_MILLION_USD
            + (self.output_tokens as f64 / 1e6) * OUTPUT_COST_PER_MILLION_USD
    }

    /// Total derived spend in USD.
    pub fn total_cost_usd(&self) -> f64 {
        self.search_cost_usd() + self.llm_cost_usd()
    }
}

/// What a worker is currently doing, for the dashboard.
#[derive(Debug, Clone)]
pub struct WorkerActivity {
    pub activity: String,
    pub is_active: bool,
    pub last_update: DateTime<Utc>,
}

/// Point-in-time view of the tracker, pulled by the dashboard.
#[derive(Debug, Clone)]
pub struct CostSnapshot {
    pub session: CostCounters,
    pub historical: CostCounters,
    pub workers: BTreeMap<usize, WorkerActivity>,
    pub started_at: DateTime<Utc>,
    /// Session validations extrapolated to an hourly rate
    pub validations_per_hour: f64,
}

#[derive(Debug)]
struct TrackerState {
    session: CostCounters,
    historical: CostCounters,
    workers: BTreeMap<usize, WorkerActivity>,
    started_at: DateTime<Utc>,
}

/// Process-wide cost tracker. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct CostTracker {
    state: Arc<RwLock<TrackerState>>,
    log: CostLog,
}

impl CostTracker {
    /// Create a tracker, seeding historical counters from the cost log.
    pub async fn init(log: CostLog) -> Self {
        let historical = log.replay().await;

        Self {
            state: Arc::new(RwLock::new(TrackerState {
                session: CostCounters::default(),
                historical,
                workers: BTreeMap::new(),
                started_at: Utc::now(),
            })),
            log,
        }
    }

    /// Record one committed validation and append it to the cost log.
    ///
    /// The append is best-effort: a failed write is logged and does not
    /// affect the validation.
    pub async fn record_validation(&self, entry: CostLogEntry) {
        {
            let mut state = self.state.write().await;
            let input = entry.total_input_tokens;
            let output = entry.total_output_tokens;
            state
                .session
                .record(entry.outcome, entry.search_api_calls, input, output);
            state
                .historical
                .record(entry.outcome, entry.search_api_calls, input, output);
        }

        if let Err(e) = self.log.append(&entry).await {
            warn!(error = %e, prediction_id = %entry.prediction_id, "Failed to append cost log entry");
        }
    }

    /// Update a worker's current activity.
    pub async fn mark_worker(&self, worker_id: usize, activity: &str, is_active: bool) {
        let mut state = self.state.write().await;
        state.workers.insert(
            worker_id,
            WorkerActivity {
                activity: activity.to_string(),
                is_active,
                last_update: Utc::now(),
            },
        );
    }

    /// Take a point-in-time snapshot for the dashboard.
    pub async fn snapshot(&self) -> CostSnapshot {
        let state = self.state.read().await;
        let elapsed_secs = (Utc::now() - state.started_at).num_seconds().max(0) as f64;
        let validations_per_hour = if elapsed_secs > 0.0 {
            state.session.validated as f64 * 3600.0 / elapsed_secs
        } else {
            0.0
        };

        CostSnapshot {
            session: state.session.clone(),
            historical: state.historical.clone(),
            workers: state.workers.clone(),
            started_at: state.started_at,
            validations_per_hour,
        }
    }
}
