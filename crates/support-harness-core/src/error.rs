//! Error taxonomy shared by every pipeline stage.
//!
//! | Variant | Retried? | Meaning |
//! |---------|----------|---------|
//! | [`RagError::InvalidInput`] | never | malformed or empty request fields |
//! | [`RagError::ProviderUnavailable`] | reads only | network error or timeout from a backend |
//! | [`RagError::RateLimited`] | never | backend asked us to slow down |
//! | [`RagError::NotFound`] | never | unknown conversation, chunk, or document |
//! | [`RagError::DimensionMismatch`] | never | vector length disagrees with the index |
//! | [`RagError::Storage`] | never | backend accepted the call but failed it |
//!
//! Low-confidence retrieval is deliberately absent: it is reported through
//! `fallback_triggered`, not as an error.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by the retrieval-augmented pipeline.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl RagError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::ProviderUnavailable(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Whether a retry of the same idempotent call could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ProviderUnavailable(_))
    }
}

/// Convenience alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, RagError>;
