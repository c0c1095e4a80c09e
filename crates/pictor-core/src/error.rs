//! Error types for the Pictor pipeline.
//!
//! Transport errors (`ApiError`) carry a transient/permanent classification
//! consumed by the request executor; per-item validation failures live in
//! `types::RejectionReason` and never surface here; everything fatal funnels
//! into `PictorError`.

use thiserror::Error;

/// Top-level error type for Pictor operations.
#[derive(Error, Debug)]
pub enum PictorError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Search provider failure (run-fatal)
    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    /// Invalid selection criteria
    #[error("Selection error: {0}")]
    Selection(#[from] SelectionError),

    /// Hosting or metadata store failure (run-fatal)
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    /// A required API key is unset
    #[error("Missing credential: {0}")]
    MissingCredential(String),
}

/// A single failed outbound call, before retry handling.
///
/// The executor classifies these into transient (retried) and permanent
/// (fail fast) via [`ApiError::is_transient`].
#[derive(Error, Debug, Clone)]
pub enum ApiError {
    /// Provider returned a non-success HTTP status
    #[error("{provider} returned HTTP {status}: {message}")]
    Http {
        provider: String,
        status: u16,
        message: String,
    },

    /// Connection-level failure (DNS, refused, reset)
    #[error("{provider} network error: {message}")]
    Network { provider: String, message: String },

    /// The call exceeded its timeout
    #[error("{provider} timed out after {timeout_ms}ms")]
    Timeout { provider: String, timeout_ms: u64 },

    /// Response arrived but failed schema validation
    #[error("{provider} returned an invalid response: {message}")]
    InvalidResponse { provider: String, message: String },
}

impl ApiError {
    /// Whether the error is worth retrying.
    ///
    /// Retryable: timeouts, network failures, 429, 5xx.
    /// Not retryable: other 4xx, schema-invalid responses.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Timeout { .. } | ApiError::Network { .. } => true,
            ApiError::Http { status, .. } => *status == 429 || (500..=599).contains(status),
            ApiError::InvalidResponse { .. } => false,
        }
    }

    /// HTTP status code, when the error carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Provider name the error originated from.
    pub fn provider(&self) -> &str {
        match self {
            ApiError::Http { provider, .. }
            | ApiError::Network { provider, .. }
            | ApiError::Timeout { provider, .. }
            | ApiError::InvalidResponse { provider, .. } => provider,
        }
    }
}

/// Outcome of a call after the executor's retry policy is exhausted.
#[derive(Error, Debug)]
pub enum ExecutorError {
    /// All retry attempts failed; carries the last underlying error.
    #[error("exhausted {attempts} attempts, last error: {last}")]
    ExhaustedRetries { attempts: u32, last: ApiError },

    /// Permanent error, failed on first classification without retry.
    #[error("permanent error: {0}")]
    Permanent(ApiError),
}

impl ExecutorError {
    /// The underlying transport error.
    pub fn inner(&self) -> &ApiError {
        match self {
            ExecutorError::ExhaustedRetries { last, .. } => last,
            ExecutorError::Permanent(e) => e,
        }
    }
}

/// Search provider failures, surfaced with distinct machine-readable codes.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("search provider authentication failed: {0}")]
    AuthFailure(String),

    #[error("search provider quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("search provider rate limited: {0}")]
    RateLimited(String),

    #[error("search execution failed: {0}")]
    ExecutionFailed(String),
}

impl From<ExecutorError> for SearchError {
    fn from(err: ExecutorError) -> Self {
        let message = err.to_string();
        match err.inner().status() {
            Some(401) | Some(403) => SearchError::AuthFailure(message),
            Some(402) => SearchError::QuotaExhausted(message),
            Some(429) => SearchError::RateLimited(message),
            _ => SearchError::ExecutionFailed(message),
        }
    }
}

/// Selection engine errors. Only invalid criteria configuration raises;
/// too few candidates never does.
#[derive(Error, Debug)]
pub enum SelectionError {
    #[error("invalid selection criteria: {0}")]
    InvalidCriteria(String),
}

/// Storage adapter errors (hosting or metadata store).
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("image hosting failed: {0}")]
    Hosting(ExecutorError),

    #[error("metadata store failed: {0}")]
    Records(ExecutorError),
}

/// Convenience type alias for Pictor results.
pub type Result<T> = std::result::Result<T, PictorError>;
