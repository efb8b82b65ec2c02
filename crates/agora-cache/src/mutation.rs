//! Mutation coordination
//!
//! Two flavours of write:
//! - [`QueryCache::mutate`]: run the server call, invalidate on success
//! - [`QueryCache::mutate_optimistic`]: patch the displayed entries first,
//!   restore the exact snapshots on failure, invalidate on settle
//!
//! [`MutationTracker`] records per-operation `{status, last_error}` for
//! presentation code that disables buttons or shows failure toasts.

use crate::cache::{CacheEntry, Erased, QueryCache};
use crate::key::QueryKey;
use agora_core::{BackendResult, RequestId};
use dashmap::DashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// Local patch applied to one or more entries before the server confirms
pub struct OptimisticUpdate<T> {
    targets: Vec<QueryKey>,
    patch: Arc<dyn Fn(&T) -> T + Send + Sync>,
}

impl<T> OptimisticUpdate<T> {
    /// Create update with patch function
    #[must_use]
    pub fn new(patch: impl Fn(&T) -> T + Send + Sync + 'static) -> Self {
        Self {
            targets: Vec::new(),
            patch: Arc::new(patch),
        }
    }

    /// Add an entry to patch
    #[inline]
    #[must_use]
    pub fn target(mut self, key: QueryKey) -> Self {
        self.targets.push(key);
        self
    }

    /// Entries patched
    #[inline]
    #[must_use]
    pub fn targets(&self) -> &[QueryKey] {
        &self.targets
    }
}

impl<T> fmt::Debug for OptimisticUpdate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptimisticUpdate")
            .field("targets", &self.targets)
            .finish_non_exhaustive()
    }
}

/// Snapshots held while the server call runs
///
/// Dropping without [`PendingMutation::settle`] rolls back.
struct PendingMutation {
    entries: Vec<(Arc<CacheEntry>, Option<Erased>)>,
}

impl PendingMutation {
    fn settle(&mut self, committed: bool) {
        for (entry, snapshot) in self.entries.drain(..) {
            entry.end_optimistic(if committed { None } else { Some(snapshot) });
        }
    }
}

impl Drop for PendingMutation {
    fn drop(&mut self) {
        self.settle(false);
    }
}

impl QueryCache {
    /// Run `call`, then invalidate `invalidations` if it succeeded
    ///
    /// # Errors
    /// The server call's error, unchanged.
    pub async fn mutate<R, Fut>(&self, call: Fut, invalidations: &[QueryKey]) -> BackendResult<R>
    where
        Fut: Future<Output = BackendResult<R>>,
    {
        let outcome = call.await;
        match &outcome {
            Ok(_) => {
                for key in invalidations {
                    self.invalidate(key);
                }
            }
            Err(e) => debug!(error = %e, "mutation failed, cache untouched"),
        }
        outcome
    }

    /// Apply `update` locally, run `call`, roll back on failure
    ///
    /// In-flight fetches for the targets are superseded so a stale response
    /// cannot overwrite the patch. On settle (either outcome) the targets and
    /// `dependents` are invalidated.
    ///
    /// # Errors
    /// The server call's error, after the snapshots are restored.
    pub async fn mutate_optimistic<T, R, Fut>(
        &self,
        update: OptimisticUpdate<T>,
        call: Fut,
        dependents: &[QueryKey],
    ) -> BackendResult<R>
    where
        T: Send + Sync + 'static,
        Fut: Future<Output = BackendResult<R>>,
    {
        let mut pending = PendingMutation {
            entries: update
                .targets
                .iter()
                .map(|key| {
                    let entry = self.entry(key);
                    let snapshot = entry.begin_optimistic(&*update.patch);
                    (entry, snapshot)
                })
                .collect(),
        };

        let outcome = call.await;
        match &outcome {
            Ok(_) => pending.settle(true),
            Err(e) => {
                warn!(
                    targets = update.targets.len(),
                    error = %e,
                    "optimistic mutation failed, restoring snapshots"
                );
                pending.settle(false);
            }
        }

        for key in update.targets.iter().chain(dependents) {
            self.invalidate(key);
        }
        outcome
    }
}

/// Lifecycle of a named mutation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MutationStatus {
    /// Never run
    #[default]
    Idle,
    /// A call is running
    Pending,
    /// Last call succeeded
    Success,
    /// Last call failed
    Error,
}

/// Observable state of a named mutation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationState {
    /// Current status
    pub status: MutationStatus,
    /// Message of the last failure, cleared on success
    pub last_error: Option<String>,
    /// Completed calls
    pub runs: u64,
    /// Calls currently running
    pub in_flight: u32,
}

impl MutationState {
    /// Check if a call is running
    #[inline]
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.in_flight > 0
    }
}

/// Per-operation mutation status registry
#[derive(Debug, Clone, Default)]
pub struct MutationTracker {
    states: Arc<DashMap<&'static str, MutationState>>,
}

impl MutationTracker {
    /// Create empty tracker
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `fut`, recording its progress under `name`
    ///
    /// # Errors
    /// The future's error, unchanged.
    pub async fn track<R, E, Fut>(&self, name: &'static str, fut: Fut) -> Result<R, E>
    where
        E: fmt::Display,
        Fut: Future<Output = Result<R, E>>,
    {
        {
            let mut state = self.states.entry(name).or_default();
            state.in_flight += 1;
            state.status = MutationStatus::Pending;
        }
        let request = RequestId::new();
        debug!(%request, mutation = name, "mutation started");

        let outcome = fut.await;
        debug!(%request, mutation = name, ok = outcome.is_ok(), "mutation settled");

        let mut state = self.states.entry(name).or_default();
        state.in_flight = state.in_flight.saturating_sub(1);
        state.runs += 1;
        match &outcome {
            Ok(_) => {
                state.last_error = None;
                if state.in_flight == 0 {
                    state.status = MutationStatus::Success;
                }
            }
            Err(e) => {
                state.last_error = Some(e.to_string());
                if state.in_flight == 0 {
                    state.status = MutationStatus::Error;
                }
            }
        }
        outcome
    }

    /// State of `name` (idle if never run)
    #[must_use]
    pub fn state(&self, name: &str) -> MutationState {
        self.states
            .get(name)
            .map(|s| s.value().clone())
            .unwrap_or_default()
    }

    /// Forget the outcome of `name` (e.g. after a toast was shown)
    pub fn reset(&self, name: &str) {
        if let Some(mut state) = self.states.get_mut(name) {
            if state.in_flight == 0 {
                *state = MutationState::default();
            }
        }
    }
}
