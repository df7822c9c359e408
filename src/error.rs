//! Error types for the Lectern QA engine
//!
//! This module provides structured error handling using thiserror. Each
//! pipeline boundary (validation, retrieval, provider calls, persistence)
//! surfaces its own variant so failure handling stays explicit.

use thiserror::Error;

/// Main error type for Lectern operations
#[derive(Error, Debug)]
pub enum LecternError {
    /// Request or chunking parameters rejected before any side effect
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Referenced lesson does not exist
    #[error("Lesson not found: {0}")]
    LessonNotFound(i64),

    /// Embedding or completion provider failure (transport, auth, quota, timeout)
    #[error("Provider error: {0}")]
    Provider(String),

    /// Request rejected by the sliding-window rate limiter
    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Internal invariant violated (e.g. embedding count mismatch)
    #[error("Internal inconsistency: {0}")]
    Inconsistency(String),

    /// Database operation failed
    #[error("Database error: {0}")]
    Database(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Lectern operations
pub type Result<T> = std::result::Result<T, LecternError>;

impl LecternError {
    /// Whether the caller may retry the request unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LecternError::Provider(_) | LecternError::RateLimited { .. }
        )
    }
}
