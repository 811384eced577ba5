//! Append-only JSONL cost log.
//!
//! One JSON object per line. Appends are serialized behind a mutex so
//! concurrent workers never interleave partial lines; replay at start-up
//! rebuilds the historical counters.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::CostCounters;
use crate::config::CostLogConfig;
use crate::storage::Outcome;
use crate::validation::ValidationOutput;

/// Per-validation cost record, one JSONL line.
///
/// Field names are the log's wire format and consumed downstream; do not
/// rename.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostLogEntry {
    pub prediction_id: String,
    pub prediction_context: Option<String>,
    #[serde(rename = "searchApiCalls")]
    pub search_api_calls: u64,
    #[serde(rename = "queryEnhancerInputTokens")]
    pub query_enhancer_input_tokens: u64,
    #[serde(rename = "queryEnhancerOutputTokens")]
    pub query_enhancer_output_tokens: u64,
    #[serde(rename = "resultJudgeInputTokens")]
    pub result_judge_input_tokens: u64,
    #[serde(rename = "resultJudgeOutputTokens")]
    pub result_judge_output_tokens: u64,
    #[serde(rename = "totalInputTokens")]
    pub total_input_tokens: u64,
    #[serde(rename = "totalOutputTokens")]
    pub total_output_tokens: u64,
    pub outcome: Outcome,
    pub timestamp: DateTime<Utc>,
}

impl CostLogEntry {
    /// Build an entry from a finished validation.
    pub fn from_output(output: &ValidationOutput) -> Self {
        let costs = &output.costs;

        Self {
            prediction_id: output.record.prediction_id.clone(),
            prediction_context: costs.prediction_text.clone(),
            search_api_calls: costs.search_api_calls,
            query_enhancer_input_tokens: costs.enhancer_input_tokens,
            query_enhancer_output_tokens: costs.enhancer_output_tokens,
            result_judge_input_tokens: costs.judge_input_tokens,
            result_judge_output_tokens: costs.judge_output_tokens,
            total_input_tokens: costs.total_input_tokens(),
            total_output_tokens: costs.total_output_tokens(),
            outcome: output.record.outcome,
            timestamp: Utc::now(),
        }
    }
}

/// Concurrent-append-safe JSONL writer with start-up replay.
#[derive(Clone)]
pub struct CostLog {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl CostLog {
    /// Create a log over the configured path. The file is created on
    /// first append.
    pub fn new(config: &CostLogConfig) -> Self {
        Self {
            path: config.path.clone(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Append one entry as a single JSON line.
    pub async fn append(&self, entry: &CostLogEntry) -> std::io::Result<()> {
        let mut line = serde_json::to_string(entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }

    /// Rebuild aggregate counters from the log. A missing file is an
    /// empty history; malformed lines are skipped with a warning.
    pub async fn replay(&self) -> CostCounters {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return CostCounters::default();
            }
            Err(e) => {
                warn!(error = %e, path = %self.path.display(), "Failed to read cost log, starting with empty history");
                return CostCounters::default();
            }
        };

        let mut counters = CostCounters::default();
        let mut skipped = 0usize;

        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<CostLogEntry>(line) {
                Ok(entry) => counters.record(
                    entry.outcome,
                    entry.search_api_calls,
                    entry.total_input_tokens,
                    entry.total_output_tokens,
                ),
                Err(_) => skipped += 1,
            }
        }

        if skipped > 0 {
            warn!(skipped = skipped, "Skipped malformed cost log lines during replay");
        }

        info!(
            validations = counters.validated,
            search_calls = counters.search_api_calls,
            "Reloaded historical cost counters"
        );

        counters
    }
}
