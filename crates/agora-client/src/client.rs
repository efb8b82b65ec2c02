//! Client facade
//!
//! [`CommunityClient`] wires the layers together:
//! - the identity adapter drives the handle manager
//! - a ready handle gates every query and backs every fetch
//! - the caller profile is observed for the lifetime of the client
//! - a background observer feeds the watchdog from all three stages
//!
//! Presentation code talks to the domain methods (chat, events, profiles,
//! leaderboard, admin, onboarding) and reads
//! [`WatchdogReport`]s for the initialization banner.

use crate::auth::{AuthSnapshot, IdentityAdapter};
use crate::error::{ClientError, ClientResult};
use crate::handle::{ConnectionHandle, HandleKey, HandleManager, HandleStatus};
use crate::keys;
use crate::query::Query;
use crate::watchdog::{StageInputs, Watchdog, WatchdogReport};
use agora_cache::{
    fetcher, FetchOptions, MutationState, MutationTracker, OptimisticUpdate, QueryCache, QueryKey,
    Subscription,
};
use agora_core::{Backend, BackendError, BackendResult, ClientConfig, Connector, PrivateUserProfile};
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const NOT_READY: &str = "Actor not available";

struct ClientInner {
    config: ClientConfig,
    auth: IdentityAdapter,
    handles: HandleManager,
    cache: QueryCache,
    watchdog: Watchdog,
    mutations: MutationTracker,
    session: Mutex<Option<Subscription<Option<PrivateUserProfile>>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

/// Entry point for presentation code
///
/// Cheap to clone; background tasks stop when the last clone is dropped.
/// Must be created inside a tokio runtime.
#[derive(Clone)]
pub struct CommunityClient {
    inner: Arc<ClientInner>,
}

impl CommunityClient {
    /// Start a client over `connector`, driven by `auth`
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>, auth: IdentityAdapter, config: ClientConfig) -> Self {
        let handles = HandleManager::new(connector, config.handle);
        let cache = QueryCache::new(config.cache);
        let watchdog = Watchdog::new(config.watchdog);

        let client = Self {
            inner: Arc::new(ClientInner {
                config,
                auth: auth.clone(),
                handles: handles.clone(),
                cache: cache.clone(),
                watchdog: watchdog.clone(),
                mutations: MutationTracker::new(),
                session: Mutex::new(None),
                tasks: Mutex::new(Vec::new()),
            }),
        };

        let session = client.current_user_profile().subscribe();
        *client.inner.session.lock() = Some(session);

        let driver = tokio::spawn(drive_connection(auth.clone(), handles.clone(), cache.clone()));
        let observer = tokio::spawn(observe_initialization(auth, handles, cache, watchdog));
        client.inner.tasks.lock().extend([driver, observer]);

        info!("community client started");
        client
    }

    /// Start a client with default configuration
    #[must_use]
    pub fn with_defaults(connector: Arc<dyn Connector>, auth: IdentityAdapter) -> Self {
        Self::new(connector, auth, ClientConfig::default())
    }

    /// Configuration in effect
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Identity adapter
    #[inline]
    #[must_use]
    pub fn auth(&self) -> &IdentityAdapter {
        &self.inner.auth
    }

    /// Connection handle manager
    #[inline]
    #[must_use]
    pub fn handles(&self) -> &HandleManager {
        &self.inner.handles
    }

    /// Shared query cache
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &QueryCache {
        &self.inner.cache
    }

    /// Initialization watchdog
    #[inline]
    #[must_use]
    pub fn watchdog(&self) -> &Watchdog {
        &self.inner.watchdog
    }

    /// State of the named mutation (e.g. `"postMessage"`)
    #[must_use]
    pub fn mutation_state(&self, name: &str) -> MutationState {
        self.inner.mutations.state(name)
    }

    /// Wait for a handle bound to the current identity, or its failure
    ///
    /// # Errors
    /// - `ClientError::Handle` when construction failed
    /// - `ClientError::NotReady` if the client is shutting down
    pub async fn wait_ready(&self) -> ClientResult<Arc<ConnectionHandle>> {
        let mut auth_rx = self.inner.auth.subscribe();
        let mut status_rx = self.inner.handles.subscribe();
        loop {
            let snapshot = auth_rx.borrow_and_update().clone();
            let status = status_rx.borrow_and_update().clone();
            let expected = HandleKey::for_identity(snapshot.identity.as_ref());
            if !snapshot.is_initializing {
                match status {
                    HandleStatus::Ready(handle) if *handle.key() == expected => return Ok(handle),
                    HandleStatus::Failed(e) if *e.key() == expected => return Err(e.into()),
                    _ => {}
                }
            }

            tokio::select! {
                changed = auth_rx.changed() => changed.map_err(|_| ClientError::NotReady)?,
                changed = status_rx.changed() => changed.map_err(|_| ClientError::NotReady)?,
            }
        }
    }

    /// Re-run only the failed initialization stages
    ///
    /// Connection failures rebuild the handle; a failed profile is refetched
    /// when authenticated, otherwise it is marked for refetch.
    pub async fn retry_initialization(&self) -> WatchdogReport {
        let report = self.inner.watchdog.report();
        let auth = self.inner.auth.snapshot();
        let connection_failed = report.connection.is_error || self.inner.handles.status().is_failed();
        info!(
            connection_error = connection_failed,
            profile_error = report.profile.is_error,
            "retrying initialization"
        );

        if connection_failed {
            self.inner.handles.retry(&auth).await;
        }
        if auth.is_authenticated() {
            let profile = self.current_user_profile();
            if report.profile.is_error {
                if let Err(e) = profile.refetch().await {
                    warn!(error = %e, "profile retry failed");
                }
            } else {
                profile.invalidate();
            }
        }
        self.inner.watchdog.report()
    }

    /// Drop every cached value and handle, then reconnect
    pub async fn full_reload(&self) -> HandleStatus {
        info!("full reload");
        self.inner.cache.clear();
        self.inner.handles.reset().await;
        self.inner.handles.sync(&self.inner.auth.snapshot()).await
    }

    pub(crate) fn backend(&self) -> ClientResult<Arc<dyn Backend>> {
        self.inner.handles.current_backend().ok_or(ClientError::NotReady)
    }

    /// Options gated on a handle bound to the current identity
    pub(crate) fn connected<T>(&self) -> FetchOptions<T> {
        let handles = self.inner.handles.clone();
        let auth = self.inner.auth.clone();
        self.inner
            .cache
            .options()
            .enabled_when(move || handles.is_ready_for(&auth.snapshot()))
    }

    /// Options additionally gated on an authenticated caller
    pub(crate) fn authenticated<T>(&self) -> FetchOptions<T> {
        let handles = self.inner.handles.clone();
        let auth = self.inner.auth.clone();
        self.inner.cache.options().enabled_when(move || {
            let snapshot = auth.snapshot();
            snapshot.is_authenticated() && handles.is_ready_for(&snapshot)
        })
    }

    /// Connected options that poll on the configured interval
    pub(crate) fn live<T>(&self) -> FetchOptions<T> {
        self.connected()
            .with_poll_interval(self.inner.cache.config().poll_interval())
    }

    pub(crate) fn query<T, F, Fut>(&self, key: QueryKey, options: FetchOptions<T>, call: F) -> Query<T>
    where
        T: Send + Sync + 'static,
        F: Fn(Arc<dyn Backend>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BackendResult<T>> + Send + 'static,
    {
        let handles = self.inner.handles.clone();
        let fetch = fetcher(move || {
            let pending = handles.current_backend().map(&call);
            async move {
                match pending {
                    Some(call) => call.await,
                    None => Err(BackendError::transient(NOT_READY)),
                }
            }
        });
        Query::new(self.inner.cache.clone(), key, fetch, options)
    }

    /// Run a tracked write, invalidating `invalidations` on success
    pub(crate) async fn write<R, Fut>(
        &self,
        name: &'static str,
        invalidations: &[QueryKey],
        call: Fut,
    ) -> ClientResult<R>
    where
        Fut: Future<Output = BackendResult<R>>,
    {
        Ok(self
            .inner
            .mutations
            .track(name, self.inner.cache.mutate(call, invalidations))
            .await?)
    }

    /// Run a tracked optimistic write
    pub(crate) async fn write_optimistic<T, R, Fut>(
        &self,
        name: &'static str,
        update: OptimisticUpdate<T>,
        dependents: &[QueryKey],
        call: Fut,
    ) -> ClientResult<R>
    where
        T: Send + Sync + 'static,
        Fut: Future<Output = BackendResult<R>>,
    {
        Ok(self
            .inner
            .mutations
            .track(name, self.inner.cache.mutate_optimistic(update, call, dependents))
            .await?)
    }
}

impl fmt::Debug for CommunityClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommunityClient")
            .field("handles", &self.inner.handles)
            .field("cache", &self.inner.cache)
            .field("watchdog", &self.inner.watchdog)
            .finish_non_exhaustive()
    }
}

/// Keep the handle in line with the identity and re-gate the cache
async fn drive_connection(auth: IdentityAdapter, handles: HandleManager, cache: QueryCache) {
    let mut auth_rx = auth.subscribe();
    let mut status_rx = handles.subscribe();
    let mut bound: Option<HandleKey> = None;

    let initial = auth_rx.borrow_and_update().clone();
    handles.sync(&initial).await;

    loop {
        let status = status_rx.borrow_and_update().clone();
        if let Some(handle) = status.handle() {
            rebind(&cache, &mut bound, handle.key());
            cache.resume_disabled();
        }

        tokio::select! {
            changed = auth_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = auth_rx.borrow_and_update().clone();
                handles.sync(&snapshot).await;
            }
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    debug!("connection driver stopped");
}

/// Values cached for one identity must not leak into another
fn rebind(cache: &QueryCache, bound: &mut Option<HandleKey>, key: &HandleKey) {
    match bound.replace(key.clone()) {
        Some(previous) if previous != *key => {
            if previous.is_anonymous() {
                info!(identity = %key, "identity bound, refreshing queries");
                cache.invalidate(&QueryKey::root());
            } else {
                info!(from = %previous, to = %key, "session changed, clearing cache");
                cache.clear();
            }
        }
        _ => {}
    }
}

fn sample(auth: &AuthSnapshot, status: &HandleStatus, profile_loading: bool, profile_error: bool) -> StageInputs {
    StageInputs {
        auth_loading: auth.is_initializing,
        auth_error: auth.is_login_error(),
        connection_loading: status.is_connecting(),
        connection_error: status.is_failed(),
        profile_loading: status.is_connecting() || profile_loading,
        profile_error,
        authenticated: auth.is_authenticated(),
    }
}

/// Feed the watchdog from the identity, handle and profile channels
async fn observe_initialization(
    auth: IdentityAdapter,
    handles: HandleManager,
    cache: QueryCache,
    watchdog: Watchdog,
) {
    let profile_key = keys::current_user_profile();
    let mut auth_rx = auth.subscribe();
    let mut status_rx = handles.subscribe();
    let mut profile_rx = cache.watch(&profile_key);

    loop {
        let snapshot = auth_rx.borrow_and_update().clone();
        let status = status_rx.borrow_and_update().clone();
        profile_rx.borrow_and_update();
        let profile = cache.state::<Option<PrivateUserProfile>>(&profile_key);
        watchdog.observe(sample(&snapshot, &status, profile.is_loading(), profile.is_error()));

        tokio::select! {
            changed = auth_rx.changed() => if changed.is_err() { break },
            changed = status_rx.changed() => if changed.is_err() { break },
            changed = profile_rx.changed() => if changed.is_err() { break },
        }
    }
    debug!("initialization observer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::Identity;

    #[test]
    fn connecting_counts_as_profile_loading() {
        let auth = AuthSnapshot {
            identity: Some(Identity::new("alice-principal")),
            ..AuthSnapshot::default()
        };
        let inputs = sample(&auth, &HandleStatus::Connecting, false, false);
        assert!(inputs.connection_loading);
        assert!(inputs.profile_loading);
        assert!(inputs.authenticated);
    }

    #[test]
    fn anonymous_sample_is_unauthenticated() {
        let inputs = sample(&AuthSnapshot::default(), &HandleStatus::Waiting, true, true);
        assert!(!inputs.authenticated);
        assert!(!inputs.connection_loading);
    }
}
