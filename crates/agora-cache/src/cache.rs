//! Keyed query cache
//!
//! Single source of truth mapping [`QueryKey`] → cache entry, shared by every
//! consumer through an explicit, cheaply cloneable [`QueryCache`] handle.
//!
//! - Concurrent callers share one fetch per key until the key is invalidated
//! - Failures keep the last known value
//! - Invalidation marks entries stale without clearing them
//! - Observed entries refetch on invalidation and poll on an interval

use crate::error::{CacheError, CacheResult};
use crate::key::QueryKey;
use crate::options::{FetchOptions, RetryPolicy};
use crate::state::{CacheStats, QueryState};
use crate::subscription::Subscription;
use agora_core::{BackendError, BackendResult, CacheConfig};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

pub(crate) type Erased = Arc<dyn Any + Send + Sync>;

/// Type-erased, re-invocable fetch function
pub type Fetcher<T> = Arc<dyn Fn() -> BoxFuture<'static, BackendResult<T>> + Send + Sync>;

type SharedFetch = Shared<BoxFuture<'static, CacheResult<Erased>>>;
type Trigger = Arc<dyn Fn() + Send + Sync>;

enum Load<T> {
    Done(CacheResult<Arc<T>>),
    Wait(SharedFetch),
}

/// Wrap a closure returning a future into a [`Fetcher`]
pub fn fetcher<T, F, Fut>(f: F) -> Fetcher<T>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = BackendResult<T>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

struct InFlight {
    id: u64,
    epoch: u64,
    future: SharedFetch,
}

#[derive(Default)]
pub(crate) struct EntryState {
    value: Option<Erased>,
    error: Option<BackendError>,
    in_flight: Option<InFlight>,
    invalidated: bool,
    disabled: bool,
    fetched: bool,
    /// Bumped on every invalidation
    epoch: u64,
    /// Optimistic mutations in progress on this entry
    mutating: u32,
    updated_at: Option<DateTime<Utc>>,
}

impl EntryState {
    fn needs_fetch(&self) -> bool {
        self.value.is_none() || self.invalidated || self.error.is_some()
    }
}

#[derive(Default)]
struct Observers {
    count: usize,
    poller: Option<JoinHandle<()>>,
    /// Interval of the running poller
    period: Option<Duration>,
    /// Most recent subscriber's refetch
    trigger: Option<Trigger>,
}

/// One keyed entry
pub(crate) struct CacheEntry {
    key: QueryKey,
    state: Mutex<EntryState>,
    version: watch::Sender<u64>,
    observers: Mutex<Observers>,
}

impl CacheEntry {
    fn new(key: QueryKey) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            key,
            state: Mutex::new(EntryState::default()),
            version,
            observers: Mutex::new(Observers::default()),
        }
    }

    pub(crate) fn key(&self) -> &QueryKey {
        &self.key
    }

    pub(crate) fn notify(&self) {
        self.version.send_modify(|v| *v = v.wrapping_add(1));
    }

    pub(crate) fn watch(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    pub(crate) fn snapshot<T: Send + Sync + 'static>(&self) -> QueryState<T> {
        let st = self.state.lock();
        QueryState {
            data: st.value.clone().and_then(|v| v.downcast::<T>().ok()),
            error: st.error.clone(),
            is_fetching: st.in_flight.is_some(),
            is_disabled: st.disabled,
            is_invalidated: st.invalidated,
            is_fetched: st.fetched,
            updated_at: st.updated_at,
        }
    }

    fn current<T: Send + Sync + 'static>(&self) -> Option<CacheResult<Arc<T>>> {
        let value = self.state.lock().value.clone()?;
        Some(downcast(&self.key, value))
    }

    fn trigger(&self) -> Option<Trigger> {
        self.observers.lock().trigger.clone()
    }

    fn is_observed(&self) -> bool {
        self.observers.lock().count > 0
    }

    /// Supersede any in-flight fetch, snapshot the value and apply `patch`
    pub(crate) fn begin_optimistic<T: Send + Sync + 'static>(
        &self,
        patch: &(dyn Fn(&T) -> T + Send + Sync),
    ) -> Option<Erased> {
        let snapshot = {
            let mut st = self.state.lock();
            if let Some(superseded) = st.in_flight.take() {
                debug!(key = %self.key, fetch = superseded.id, "superseding in-flight fetch");
            }
            st.mutating += 1;
            let snapshot = st.value.clone();
            match snapshot.clone().map(|v| v.downcast::<T>()) {
                Some(Ok(current)) => {
                    let patched: Erased = Arc::new(patch(&*current));
                    st.value = Some(patched);
                }
                Some(Err(_)) => {
                    warn!(key = %self.key, "optimistic patch skipped: cached value has another type");
                }
                None => {}
            }
            snapshot
        };
        self.notify();
        snapshot
    }

    /// Finish an optimistic mutation, restoring `rollback` when given
    pub(crate) fn end_optimistic(&self, rollback: Option<Option<Erased>>) {
        {
            let mut st = self.state.lock();
            st.mutating = st.mutating.saturating_sub(1);
            if let Some(snapshot) = rollback {
                st.value = snapshot;
            }
        }
        self.notify();
    }

    pub(crate) fn release_observer(&self) {
        let mut obs = self.observers.lock();
        obs.count = obs.count.saturating_sub(1);
        if obs.count == 0 {
            if let Some(poller) = obs.poller.take() {
                poller.abort();
                debug!(key = %self.key, "last observer dropped, polling stopped");
            }
            obs.period = None;
            obs.trigger = None;
        }
    }
}

fn downcast<T: Send + Sync + 'static>(key: &QueryKey, value: Erased) -> CacheResult<Arc<T>> {
    value
        .downcast::<T>()
        .map_err(|_| CacheError::TypeMismatch {
            key: key.clone(),
            expected: std::any::type_name::<T>(),
        })
}

struct CacheInner {
    entries: DashMap<QueryKey, Arc<CacheEntry>>,
    next_fetch: AtomicU64,
    config: CacheConfig,
}

/// Process-wide keyed cache of server-derived values
///
/// Cloning shares the same underlying entries.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<CacheInner>,
}

impl QueryCache {
    /// Create cache with configuration
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: DashMap::new(),
                next_fetch: AtomicU64::new(1),
                config,
            }),
        }
    }

    fn from_weak(weak: &Weak<CacheInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    /// Configuration in effect
    #[inline]
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Fetch options seeded with the configured retry policy
    #[must_use]
    pub fn options<T>(&self) -> FetchOptions<T> {
        FetchOptions::new().with_retry(RetryPolicy::from(self.inner.config.retry))
    }

    /// Fetch options that also poll on the configured interval
    #[must_use]
    pub fn polling_options<T>(&self) -> FetchOptions<T> {
        self.options().with_poll_interval(self.inner.config.poll_interval())
    }

    pub(crate) fn entry(&self, key: &QueryKey) -> Arc<CacheEntry> {
        self.inner
            .entries
            .entry(key.clone())
            .or_insert_with(|| Arc::new(CacheEntry::new(key.clone())))
            .clone()
    }

    fn existing(&self, key: &QueryKey) -> Option<Arc<CacheEntry>> {
        self.inner.entries.get(key).map(|e| e.value().clone())
    }

    fn matching(&self, prefix: &QueryKey) -> Vec<Arc<CacheEntry>> {
        self.inner
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.value().clone())
            .collect()
    }

    /// Get the value for `key`, fetching when missing, invalidated or errored
    ///
    /// Concurrent callers for the same key share one backend call.
    ///
    /// # Errors
    /// - `CacheError::Disabled` while the readiness predicate is false
    /// - `CacheError::Backend` when the fetch fails after retries
    /// - `CacheError::TypeMismatch` when the key holds another type
    pub async fn fetch<T, F, Fut>(
        &self,
        key: &QueryKey,
        f: F,
        options: &FetchOptions<T>,
    ) -> CacheResult<Arc<T>>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BackendResult<T>> + Send + 'static,
    {
        self.fetch_with(key, &fetcher(f), options).await
    }

    /// [`QueryCache::fetch`] with a prebuilt [`Fetcher`]
    ///
    /// # Errors
    /// As [`QueryCache::fetch`].
    pub async fn fetch_with<T>(
        &self,
        key: &QueryKey,
        fetcher: &Fetcher<T>,
        options: &FetchOptions<T>,
    ) -> CacheResult<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        self.load(key, fetcher, options, false).await
    }

    /// Fetch even when a fresh value is cached (attaches to an in-flight fetch)
    ///
    /// # Errors
    /// As [`QueryCache::fetch`].
    pub async fn refetch<T>(
        &self,
        key: &QueryKey,
        fetcher: &Fetcher<T>,
        options: &FetchOptions<T>,
    ) -> CacheResult<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        self.load(key, fetcher, options, true).await
    }

    async fn load<T>(
        &self,
        key: &QueryKey,
        fetcher: &Fetcher<T>,
        options: &FetchOptions<T>,
        force: bool,
    ) -> CacheResult<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        let entry = self.entry(key);

        // A superseded waiter loads once more to pick up the replacing fetch.
        let mut reloaded = false;
        loop {
            let shared = match self.begin_load(&entry, fetcher, options, force) {
                Load::Done(result) => return result,
                Load::Wait(shared) => shared,
            };

            match shared.await {
                Ok(value) => return downcast(key, value),
                Err(CacheError::Superseded { .. }) if !reloaded => {
                    trace!(key = %key, "fetch superseded, loading again");
                    reloaded = true;
                }
                Err(CacheError::Superseded { .. }) => {
                    return entry
                        .current::<T>()
                        .unwrap_or_else(|| Err(CacheError::Superseded { key: key.clone() }));
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn begin_load<T>(
        &self,
        entry: &Arc<CacheEntry>,
        fetcher: &Fetcher<T>,
        options: &FetchOptions<T>,
        force: bool,
    ) -> Load<T>
    where
        T: Send + Sync + 'static,
    {
        let key = entry.key();
        let mut st = entry.state.lock();

        if !options.is_ready() {
            let newly_disabled = !st.disabled;
            st.disabled = true;
            drop(st);
            if newly_disabled {
                trace!(key = %key, "query disabled");
                entry.notify();
            }
            return Load::Done(Err(CacheError::Disabled { key: key.clone() }));
        }
        st.disabled = false;

        if st.mutating > 0 {
            if let Some(value) = st.value.clone() {
                return Load::Done(downcast(key, value));
            }
        }

        // Only a fetch started after the latest invalidation may be shared.
        let current_epoch = st.epoch;
        let attached = st
            .in_flight
            .as_ref()
            .filter(|f| f.epoch == current_epoch)
            .map(|f| (f.id, f.future.clone()));
        if let Some((id, future)) = attached {
            trace!(key = %key, fetch = id, "attaching to in-flight fetch");
            return Load::Wait(future);
        }

        if !force && !st.needs_fetch() {
            if let Some(value) = st.value.clone() {
                return Load::Done(downcast(key, value));
            }
        }
        let id = self.inner.next_fetch.fetch_add(1, Ordering::Relaxed);
        match st.in_flight.as_ref() {
            Some(stale) => debug!(key = %key, fetch = id, stale = stale.id, "replacing stale in-flight fetch"),
            None => debug!(key = %key, fetch = id, "starting fetch"),
        }
        let task = tokio::spawn(run_fetch(
            entry.clone(),
            id,
            fetcher.clone(),
            options.retry,
            options.absence_fallback,
        ));
        let future = async move {
            task.await
                .unwrap_or_else(|e| Err(CacheError::TaskFailed(e.to_string())))
        }
        .boxed()
        .shared();
        st.in_flight = Some(InFlight {
            id,
            epoch: current_epoch,
            future: future.clone(),
        });
        drop(st);
        entry.notify();
        Load::Wait(future)
    }

    /// Snapshot of the entry for `key`
    #[must_use]
    pub fn state<T: Send + Sync + 'static>(&self, key: &QueryKey) -> QueryState<T> {
        self.existing(key)
            .map_or_else(QueryState::default, |e| e.snapshot::<T>())
    }

    /// Check if an entry exists for `key`
    #[inline]
    #[must_use]
    pub fn contains(&self, key: &QueryKey) -> bool {
        self.inner.entries.contains_key(key)
    }

    /// Change notifications for `key` (creates the entry if missing)
    #[must_use]
    pub fn watch(&self, key: &QueryKey) -> watch::Receiver<u64> {
        self.entry(key).watch()
    }

    /// Mark every entry under `prefix` for refetch
    ///
    /// Displayed values are kept. Observed entries refetch in the background.
    /// Returns the number of matching entries.
    pub fn invalidate(&self, prefix: &QueryKey) -> usize {
        let matched = self.matching(prefix);
        for entry in &matched {
            {
                let mut st = entry.state.lock();
                st.epoch += 1;
                st.invalidated = true;
            }
            entry.notify();
            if let Some(trigger) = entry.trigger() {
                trigger();
            }
        }
        debug!(prefix = %prefix, matched = matched.len(), "invalidated");
        matched.len()
    }

    /// Re-run observed entries that were gated off
    ///
    /// Call after a readiness input changes (identity, connection).
    pub fn resume_disabled(&self) -> usize {
        let mut resumed = 0;
        for entry in self.matching(&QueryKey::root()) {
            let disabled = entry.state.lock().disabled;
            if disabled {
                if let Some(trigger) = entry.trigger() {
                    trigger();
                    resumed += 1;
                }
            }
        }
        if resumed > 0 {
            debug!(resumed, "resumed disabled queries");
        }
        resumed
    }

    /// Drop every cached value and error; observed entries refetch
    pub fn clear(&self) {
        let entries = self.matching(&QueryKey::root());
        for entry in &entries {
            {
                let mut st = entry.state.lock();
                let mutating = st.mutating;
                let epoch = st.epoch + 1;
                *st = EntryState {
                    epoch,
                    mutating,
                    ..EntryState::default()
                };
            }
            entry.notify();
            if let Some(trigger) = entry.trigger() {
                trigger();
            }
        }
        tracing::info!(entries = entries.len(), "query cache cleared");
    }

    /// Observe `key`: fetch now, refetch on invalidation, poll if configured
    ///
    /// The entry polls at the shortest interval requested by any subscriber
    /// and stops when the last [`Subscription`] for the key is dropped.
    /// Invalidation refetches with the most recent subscriber's fetcher.
    pub fn subscribe<T, F, Fut>(
        &self,
        key: &QueryKey,
        f: F,
        options: FetchOptions<T>,
    ) -> Subscription<T>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BackendResult<T>> + Send + 'static,
    {
        self.subscribe_with(key, fetcher(f), options)
    }

    /// [`QueryCache::subscribe`] with a prebuilt [`Fetcher`]
    pub fn subscribe_with<T>(
        &self,
        key: &QueryKey,
        fetcher: Fetcher<T>,
        options: FetchOptions<T>,
    ) -> Subscription<T>
    where
        T: Send + Sync + 'static,
    {
        let entry = self.entry(key);
        let trigger = self.make_trigger(key.clone(), fetcher.clone(), options.clone());
        {
            let mut obs = entry.observers.lock();
            obs.count += 1;
            obs.trigger = Some(trigger.clone());
            if let Some(period) = options.poll_interval {
                if obs.period.map_or(true, |running| period < running) {
                    if let Some(previous) = obs.poller.take() {
                        previous.abort();
                    }
                    debug!(key = %key, period_ms = period.as_millis(), "polling started");
                    obs.period = Some(period);
                    obs.poller = Some(self.spawn_poller(
                        key.clone(),
                        fetcher.clone(),
                        options.clone(),
                        period,
                    ));
                }
            }
        }
        trigger();
        Subscription::new(self.clone(), entry, fetcher, options)
    }

    fn make_trigger<T>(&self, key: QueryKey, fetcher: Fetcher<T>, options: FetchOptions<T>) -> Trigger
    where
        T: Send + Sync + 'static,
    {
        let weak = Arc::downgrade(&self.inner);
        Arc::new(move || {
            let Some(cache) = Self::from_weak(&weak) else {
                return;
            };
            let key = key.clone();
            let fetcher = fetcher.clone();
            let options = options.clone();
            tokio::spawn(async move {
                if let Err(e) = cache.fetch_with(&key, &fetcher, &options).await {
                    trace!(key = %key, error = %e, "background fetch did not produce a value");
                }
            });
        })
    }

    fn spawn_poller<T>(
        &self,
        key: QueryKey,
        fetcher: Fetcher<T>,
        options: FetchOptions<T>,
        period: Duration,
    ) -> JoinHandle<()>
    where
        T: Send + Sync + 'static,
    {
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(cache) = Self::from_weak(&weak) else {
                    break;
                };
                if let Err(e) = cache.refetch(&key, &fetcher, &options).await {
                    trace!(key = %key, error = %e, "poll did not produce a value");
                }
            }
        })
    }

    /// Get cache statistics
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            entry_count: self.inner.entries.len(),
            ..CacheStats::default()
        };
        for entry in self.matching(&QueryKey::root()) {
            if entry.state.lock().in_flight.is_some() {
                stats.in_flight += 1;
            }
            if entry.is_observed() {
                stats.observed += 1;
            }
        }
        stats
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("entries", &self.inner.entries.len())
            .field("config", &self.inner.config)
            .finish()
    }
}

async fn run_fetch<T>(
    entry: Arc<CacheEntry>,
    id: u64,
    fetcher: Fetcher<T>,
    retry: RetryPolicy,
    absence_fallback: Option<fn() -> T>,
) -> CacheResult<Erased>
where
    T: Send + Sync + 'static,
{
    let outcome = match fetch_with_retry(entry.key(), &fetcher, retry).await {
        Err(e) if e.kind().is_expected_absence() => match absence_fallback {
            Some(empty) => {
                debug!(key = %entry.key(), "expected absence resolved to empty value");
                Ok(empty())
            }
            None => Err(e),
        },
        other => other,
    };

    let result = {
        let mut st = entry.state.lock();
        let current_epoch = st.in_flight.as_ref().filter(|f| f.id == id).map(|f| f.epoch);
        let started_epoch = match current_epoch {
            Some(epoch) if st.mutating == 0 => epoch,
            other => {
                if other.is_some() {
                    st.in_flight = None;
                }
                drop(st);
                debug!(key = %entry.key(), fetch = id, "discarding superseded fetch result");
                entry.notify();
                return Err(CacheError::Superseded {
                    key: entry.key().clone(),
                });
            }
        };

        st.in_flight = None;
        st.fetched = true;
        st.invalidated = st.epoch != started_epoch;
        match outcome {
            Ok(value) => {
                let erased: Erased = Arc::new(value);
                st.value = Some(erased.clone());
                st.error = None;
                st.updated_at = Some(Utc::now());
                Ok(erased)
            }
            Err(e) => {
                warn!(key = %entry.key(), fetch = id, error = %e, "fetch failed");
                st.error = Some(e.clone());
                Err(CacheError::Backend(e))
            }
        }
    };
    entry.notify();
    result
}

async fn fetch_with_retry<T>(
    key: &QueryKey,
    fetcher: &Fetcher<T>,
    retry: RetryPolicy,
) -> BackendResult<T> {
    let mut retries = 0;
    loop {
        match fetcher().await {
            Ok(value) => return Ok(value),
            Err(e) if retry.should_retry(retries, &e) => {
                let delay = retry.delay_for(retries);
                retries += 1;
                debug!(
                    key = %key,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    error = %e,
                    "fetch failed, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
