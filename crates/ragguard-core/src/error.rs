//! Error types for ragguard

use std::time::Duration;
use thiserror::Error;

/// Result type alias using RagGuardError
pub type Result<T> = std::result::Result<T, RagGuardError>;

/// Error type alias for convenience
pub type Error = RagGuardError;

/// Exit codes for CLI
pub mod exit_codes {
    pub const GENERAL_ERROR: i32 = 1;
    pub const NOT_FOUND: i32 = 2;
    pub const INVALID_INPUT: i32 = 3;
    pub const UNAVAILABLE: i32 = 4;
}

/// Main error type for ragguard
#[derive(Debug, Error)]
pub enum RagGuardError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl RagGuardError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Yaml(_) => exit_codes::INVALID_INPUT,
            Self::Query(e) => e.exit_code(),
            _ => exit_codes::GENERAL_ERROR,
        }
    }
}

/// Rejection of a question before it reaches any backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("question must not be empty")]
    Empty,

    #[error("question too short (minimum {min} characters)")]
    TooShort { min: usize },

    #[error("question too long (maximum {max} characters)")]
    TooLong { max: usize },

    #[error("question must contain at least {min} alphanumeric characters")]
    InsufficientAlphanumeric { min: usize },

    #[error("question contains suspicious content")]
    SuspiciousContent,
}

/// Failure of the retrieval backend
#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    #[error("search backend unavailable: {0}")]
    Unavailable(String),

    #[error("search timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid search response: {0}")]
    InvalidResponse(String),
}

/// Failure of the generation backend. Every variant counts as a breaker failure.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("generation quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("generation failed: {0}")]
    Failed(String),
}

/// Terminal outcomes of [`crate::QueryOrchestrator::ask`].
///
/// Generation-path failures never show up here; they are absorbed into a
/// degraded answer.
#[derive(Debug, Clone, Error)]
pub enum QueryError {
    #[error("invalid question: {0}")]
    Validation(#[from] ValidationError),

    #[error("rate limit exceeded, retry in {}s", retry_after.as_secs().max(1))]
    RateLimited { retry_after: Duration },

    #[error("retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("no context available to answer the question")]
    NoContext,
}

impl QueryError {
    /// Short machine-readable kind, shared by HTTP bodies and audit records
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::RateLimited { .. } => "rate_limited",
            Self::Retrieval(_) => "retrieval_failed",
            Self::NoContext => "no_context",
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) | Self::RateLimited { .. } => exit_codes::INVALID_INPUT,
            Self::Retrieval(_) => exit_codes::UNAVAILABLE,
            Self::NoContext => exit_codes::NOT_FOUND,
        }
    }
}
