//! # Prediction Validator
//!
//! A distributed worker pool that validates matured public predictions:
//! claims made earlier whose stated deadline has now passed. Each
//! validation fans out to a web-search API and two LLM stages, decides an
//! outcome, and persists it exactly once.
//!
//! ## Architecture
//!
//! ```text
//! Supervisor ── spawns ──> Workers (N)
//!                             │ lease (FOR UPDATE SKIP LOCKED)
//!                             ▼
//!                      Postgres ◄─── validation_result (unique per prediction)
//!                             │
//!                  Validator Pipeline
//!        pre-filter → goal text → enhance → search → judge
//!                             │                      │
//!                       Chat endpoint          Search endpoint
//!                             │
//!                       Cost Tracker ──> snapshots for the dashboard
//! ```
//!
//! ## Guarantees
//!
//! - At most one `validation_result` row per prediction, enforced by
//!   skip-locked leasing plus a unique constraint.
//! - Every leased prediction terminates in one of six outcomes within a
//!   bounded number of external calls.
//! - Proofs are at most 700 characters; at most two supporting sources.

#![warn(missing_docs)]

/// Chat-completion adapter shared by the enhancer and the judge.
pub mod chat;
/// Configuration management loaded from the environment.
pub mod config;
/// Cost/telemetry tracking and the append-only cost log.
pub mod cost;
/// Error types and result aliases for the application.
pub mod error;
/// System prompts for the chat stages.
pub mod prompts;
/// Web-search adapter and concurrent fan-out.
pub mod search;
/// Domain types, leasing protocol, and the Postgres implementation.
pub mod storage;
/// The validation pipeline and its stages.
pub mod validation;
/// Worker loop and supervisor lifecycle.
pub mod worker;

pub use config::Config;
pub use error::{AppError, AppResult};
