use std::env;
use std::path::PathBuf;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub chat: ChatConfig,
    pub search: SearchConfig,
    pub logging: LoggingConfig,
    pub workers: WorkerConfig,
    pub cost_log: CostLogConfig,
    pub validation: ValidationConfig,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Chat-completion endpoint configuration
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub api_key: String,
    pub base_url: String,
    /// Model used for search-query enhancement
    pub enhancer_model: String,
    /// Model used for result judgment
    pub judge_model: String,
    pub timeout_ms: u64,
}

/// Web-search endpoint configuration
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Worker pool configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of parallel validation workers
    pub count: usize,
    /// Sleep after finding the queue empty
    pub idle_sleep_secs: u64,
    /// Sleep after a recoverable error
    pub error_sleep_secs: u64,
}

/// Cost log configuration
#[derive(Debug, Clone)]
pub struct CostLogConfig {
    pub path: PathBuf,
}

/// Tunable knobs for the validation pipeline.
///
/// Collected in one record so tests can override individual values
/// without touching the environment.
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Search queries generated on the first enhancement pass
    pub initial_queries: usize,
    /// Maximum results requested per search query
    pub results_per_query: u8,
    /// Combined-result ceiling; once reached, no refinement happens
    pub max_total_results: usize,
    /// Refinement passes after an insufficient first judgment.
    /// Present as a knob; the pipeline runs at most one pass.
    pub max_refinement_iterations: usize,
    /// Minimum filter-validation confidence (null passes)
    pub min_filter_confidence: f64,
    /// Minimum prediction quality, 0..100 (null passes)
    pub min_prediction_quality: f64,
    /// Minimum parser confidence, 0..1 (null passes)
    pub min_llm_confidence: f64,
    /// Maximum vagueness, 0..1 (null passes)
    pub max_vagueness: f64,
    /// Lower-cased substrings that mark filter reasoning as "not a
    /// prediction". Data, not code: overridable via a keyword file.
    pub invalid_reasoning_keywords: Vec<String>,
}

/// Built-in keyword list signalling that the filter judged the text not to
/// be a validatable prediction.
const DEFAULT_INVALID_REASONING_KEYWORDS: &[&str] = &[
    "not a prediction",
    "not a valid prediction",
    "no prediction",
    "invalid prediction",
    "not making a prediction",
    "does not contain a prediction",
    "doesn't contain a prediction",
    "no clear prediction",
    "lacks a prediction",
    "missing prediction",
    "not predictive",
    "too vague",
    "overly vague",
    "impossible to validate",
    "cannot be validated",
    "not verifiable",
    "unverifiable",
    "heavy hedging",
    "quoting someone else",
    "is an announcement",
    "factual announcement",
];

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database = DatabaseConfig {
            url: env::var("DATABASE_URL").map_err(|_| AppError::Config {
                message: "DATABASE_URL is required".to_string(),
            })?,
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(15),
        };

        let timeout_ms = env::var("REQUEST_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(60000);

        let chat = ChatConfig {
            api_key: env::var("CHAT_API_KEY").map_err(|_| AppError::Config {
                message: "CHAT_API_KEY is required".to_string(),
            })?,
            base_url: env::var("CHAT_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            enhancer_model: env::var("CHAT_ENHANCER_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            judge_model: env::var("CHAT_JUDGE_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            timeout_ms,
        };

        let search = SearchConfig {
            api_key: env::var("SEARCH_API_KEY").map_err(|_| AppError::Config {
                message: "SEARCH_API_KEY is required".to_string(),
            })?,
            base_url: env::var("SEARCH_BASE_URL")
                .unwrap_or_else(|_| "https://serpapi.com".to_string()),
            timeout_ms,
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let workers = WorkerConfig {
            count: env::var("WORKER_COUNT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            idle_sleep_secs: 10,
            error_sleep_secs: 5,
        };

        let cost_log = CostLogConfig {
            path: PathBuf::from(
                env::var("COST_LOG_PATH").unwrap_or_else(|_| "costs.json".to_string()),
            ),
        };

        let mut validation = ValidationConfig::default();
        if let Ok(path) = env::var("PREFILTER_KEYWORDS_PATH") {
            validation.invalid_reasoning_keywords = load_keyword_file(&path)?;
        }

        Ok(Config {
            database,
            chat,
            search,
            logging,
            workers,
            cost_log,
            validation,
        })
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            initial_queries: 2,
            results_per_query: 10,
            max_total_results: 30,
            max_refinement_iterations: 1,
            min_filter_confidence: 0.85,
            min_prediction_quality: 30.0,
            min_llm_confidence: 0.50,
            max_vagueness: 0.80,
            invalid_reasoning_keywords: DEFAULT_INVALID_REASONING_KEYWORDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Read a newline-separated keyword file, lower-casing and skipping blanks.
fn load_keyword_file(path: &str) -> Result<Vec<String>, AppError> {
    let content = std::fs::read_to_string(path).map_err(|e| AppError::Config {
        message: format!("Failed to read keyword file {}: {}", path, e),
    })?;

    let keywords: Vec<String> = content
        .lines()
        .map(|l| l.trim().to_lowercase())
        .filter(|l| !l.is_empty())
        .collect();

    if keywords.is_empty() {
        return Err(AppError::Config {
            message: format!("Keyword file {} contains no keywords", path),
        });
    }

    Ok(keywords)
}
