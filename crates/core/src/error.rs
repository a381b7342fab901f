//! Error types for FRAG.
//!
//! This module defines a unified error enum covering configuration, I/O,
//! backend (generation and search), prompt and tree errors, plus the
//! per-call `BackendError` taxonomy used by the retry-then-degrade policy.

use thiserror::Error;

/// Unified error type for FRAG.
///
/// Only `Config` and `TreeInvariant` are fatal to a pipeline run. Backend
/// errors are recovered locally and turned into degradation entries.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generation or search backend errors
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// An aspect tree invariant was broken (builder bug)
    #[error("Tree invariant violated: {0}")]
    TreeInvariant(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

/// Failure of a single external call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The call did not finish within its timeout
    #[error("{backend}: timed out after {timeout_ms}ms")]
    Timeout { backend: String, timeout_ms: u64 },

    /// The provider rejected the call because of quota or rate limits
    #[error("{backend}: rate limited")]
    RateLimited { backend: String },

    /// The provider answered, but the payload could not be used
    #[error("{backend}: malformed response: {detail}")]
    Malformed { backend: String, detail: String },

    /// Transport or provider-side failure
    #[error("{backend}: unavailable: {detail}")]
    Unavailable { backend: String, detail: String },

    /// The call was not issued because the run was cancelled
    #[error("{backend}: cancelled")]
    Cancelled { backend: String },
}

impl BackendError {
    pub fn timeout(backend: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            backend: backend.into(),
            timeout_ms,
        }
    }

    pub fn rate_limited(backend: impl Into<String>) -> Self {
        Self::RateLimited {
            backend: backend.into(),
        }
    }

    pub fn malformed(backend: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Malformed {
            backend: backend.into(),
            detail: detail.into(),
        }
    }

    pub fn unavailable(backend: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Unavailable {
            backend: backend.into(),
            detail: detail.into(),
        }
    }

    pub fn cancelled(backend: impl Into<String>) -> Self {
        Self::Cancelled {
            backend: backend.into(),
        }
    }

    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Cancelled { .. })
    }

    /// Short machine-readable label, used in reports and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::RateLimited { .. } => "rate_limited",
            Self::Malformed { .. } => "malformed",
            Self::Unavailable { .. } => "unavailable",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
