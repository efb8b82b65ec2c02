//! Live observation of one cache entry

use crate::cache::{CacheEntry, Fetcher, QueryCache};
use crate::error::CacheResult;
use crate::key::QueryKey;
use crate::options::FetchOptions;
use crate::state::QueryState;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Handle held by a consumer that displays an entry
///
/// While at least one subscription exists the entry refetches on
/// invalidation and polls if its options ask for it.
pub struct Subscription<T> {
    cache: QueryCache,
    entry: Arc<CacheEntry>,
    changes: watch::Receiver<u64>,
    fetcher: Fetcher<T>,
    options: FetchOptions<T>,
}

impl<T: Send + Sync + 'static> Subscription<T> {
    pub(crate) fn new(
        cache: QueryCache,
        entry: Arc<CacheEntry>,
        fetcher: Fetcher<T>,
        options: FetchOptions<T>,
    ) -> Self {
        let changes = entry.watch();
        Self {
            cache,
            entry,
            changes,
            fetcher,
            options,
        }
    }

    /// Observed key
    #[inline]
    #[must_use]
    pub fn key(&self) -> &QueryKey {
        self.entry.key()
    }

    /// Current snapshot
    #[must_use]
    pub fn state(&self) -> QueryState<T> {
        self.entry.snapshot()
    }

    /// Wait for the next change and return the new snapshot
    pub async fn changed(&mut self) -> QueryState<T> {
        // The sender lives in the entry we hold, so this only fails on shutdown.
        let _ = self.changes.changed().await;
        self.state()
    }

    /// Wait until the snapshot satisfies `predicate`
    pub async fn wait_for(&mut self, predicate: impl Fn(&QueryState<T>) -> bool) -> QueryState<T> {
        loop {
            self.changes.borrow_and_update();
            let state = self.state();
            if predicate(&state) {
                return state;
            }
            if self.changes.changed().await.is_err() {
                return self.state();
            }
        }
    }

    /// Refetch now, sharing any fetch already in flight
    ///
    /// # Errors
    /// As [`QueryCache::fetch`].
    pub async fn refetch(&self) -> CacheResult<Arc<T>> {
        self.cache
            .refetch(self.entry.key(), &self.fetcher, &self.options)
            .await
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.entry.release_observer();
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", self.entry.key())
            .field("options", &self.options)
            .finish()
    }
}
