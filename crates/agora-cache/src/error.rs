//! Error types for the query cache

use crate::key::QueryKey;
use agora_core::BackendError;

/// Errors during cache operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// Readiness predicate is false
    #[error("query {key} is disabled")]
    Disabled {
        /// Entry key
        key: QueryKey,
    },

    /// Type mismatch in cache retrieval
    #[error("type mismatch for {key}: expected {expected}")]
    TypeMismatch {
        /// Entry key
        key: QueryKey,
        /// Requested type
        expected: &'static str,
    },

    /// Fetch was overtaken by an optimistic mutation and no value is cached
    #[error("fetch for {key} was superseded")]
    Superseded {
        /// Entry key
        key: QueryKey,
    },

    /// Backend call failed after retries
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Fetch task panicked or was aborted
    #[error("fetch task failed: {0}")]
    TaskFailed(String),
}

impl CacheError {
    /// Underlying backend error, if any
    #[inline]
    #[must_use]
    pub fn backend(&self) -> Option<&BackendError> {
        match self {
            Self::Backend(e) => Some(e),
            _ => None,
        }
    }

    /// Check if the query was gated off
    #[inline]
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        matches!(self, Self::Disabled { .. })
    }
}

/// Result type alias for cache operations
pub type CacheResult<T> = Result<T, CacheError>;
