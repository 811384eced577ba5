use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Chat error: {0}")]
    Chat(#[from] ChatError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Chat-completion endpoint errors
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Chat API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid chat response: {message}")]
    InvalidResponse { message: String },

    #[error("Chat request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Web-search endpoint errors
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Search API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid search response: {message}")]
    InvalidResponse { message: String },

    #[error("Search request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for chat operations
pub type ChatResult<T> = Result<T, ChatError>;

/// Result type alias for search operations
pub type SearchApiResult<T> = Result<T, SearchError>;
