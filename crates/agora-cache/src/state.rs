//! Observable query state
//!
//! `QueryState<T>` is the read-only snapshot handed to presentation code:
//! `{data, is_loading, is_fetching, is_error, error, refetch}` in hook terms.

use agora_core::BackendError;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Snapshot of one cache entry
#[derive(Debug)]
pub struct QueryState<T> {
    /// Last known value (kept across errors and invalidation)
    pub data: Option<Arc<T>>,
    /// Error from the most recent settled fetch
    pub error: Option<BackendError>,
    /// A fetch is in flight
    pub is_fetching: bool,
    /// Readiness predicate was false at the last attempt
    pub is_disabled: bool,
    /// Marked for refetch
    pub is_invalidated: bool,
    /// At least one fetch has settled
    pub is_fetched: bool,
    /// When the value was last written by a fetch
    pub updated_at: Option<DateTime<Utc>>,
}

impl<T> QueryState<T> {
    /// No value yet and a fetch is running
    #[inline]
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.is_fetching && self.data.is_none()
    }

    /// Most recent fetch failed
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// A value is available and the most recent fetch succeeded
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.data.is_some() && self.error.is_none()
    }
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            is_fetching: false,
            is_disabled: false,
            is_invalidated: false,
            is_fetched: false,
            updated_at: None,
        }
    }
}

impl<T> Clone for QueryState<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            error: self.error.clone(),
            is_fetching: self.is_fetching,
            is_disabled: self.is_disabled,
            is_invalidated: self.is_invalidated,
            is_fetched: self.is_fetched,
            updated_at: self.updated_at,
        }
    }
}

/// Statistics for cache monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of entries in cache
    pub entry_count: usize,
    /// Entries with a fetch in flight
    pub in_flight: usize,
    /// Entries with at least one live subscription
    pub observed: usize,
}
