//! Bound queries
//!
//! A [`Query`] pairs a cache key with its fetcher and options so
//! presentation code can fetch, observe or refetch without repeating them.

use crate::error::ClientResult;
use agora_cache::{FetchOptions, Fetcher, QueryCache, QueryKey, QueryState, Subscription};
use std::fmt;
use std::sync::Arc;

/// Cache-backed read of one domain value
pub struct Query<T> {
    cache: QueryCache,
    key: QueryKey,
    fetcher: Fetcher<T>,
    options: FetchOptions<T>,
}

impl<T: Send + Sync + 'static> Query<T> {
    pub(crate) fn new(
        cache: QueryCache,
        key: QueryKey,
        fetcher: Fetcher<T>,
        options: FetchOptions<T>,
    ) -> Self {
        Self {
            cache,
            key,
            fetcher,
            options,
        }
    }

    /// Cache key
    #[inline]
    #[must_use]
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Options in effect
    #[inline]
    #[must_use]
    pub fn options(&self) -> &FetchOptions<T> {
        &self.options
    }

    /// Cached value, fetching if missing, invalidated or errored
    ///
    /// # Errors
    /// `ClientError::Cache` when gated off or when the fetch fails.
    pub async fn fetch(&self) -> ClientResult<Arc<T>> {
        Ok(self
            .cache
            .fetch_with(&self.key, &self.fetcher, &self.options)
            .await?)
    }

    /// Fetch regardless of freshness
    ///
    /// # Errors
    /// As [`Query::fetch`].
    pub async fn refetch(&self) -> ClientResult<Arc<T>> {
        Ok(self
            .cache
            .refetch(&self.key, &self.fetcher, &self.options)
            .await?)
    }

    /// Observe the value (polls when the options ask for it)
    #[must_use]
    pub fn subscribe(&self) -> Subscription<T> {
        self.cache
            .subscribe_with(&self.key, self.fetcher.clone(), self.options.clone())
    }

    /// Current snapshot
    #[must_use]
    pub fn state(&self) -> QueryState<T> {
        self.cache.state(&self.key)
    }

    /// Mark for refetch
    pub fn invalidate(&self) -> usize {
        self.cache.invalidate(&self.key)
    }
}

impl<T> fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("key", &self.key)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
