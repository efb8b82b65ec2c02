//! Connection handle manager
//!
//! Builds and caches one backend connection per identity:
//! - Keyed by principal, or `anonymous` for anonymous and absent identities
//! - Cached handles are reused without reconstruction and never expire by time
//! - Concurrent callers for one key share a single construction
//! - Failed construction is retried a bounded number of times
//! - Authenticated handles fire a background admin probe that never blocks readiness
//!
//! The manager publishes a [`HandleStatus`] for the currently selected
//! identity on a `watch` channel.

use crate::auth::AuthSnapshot;
use crate::error::HandleError;
use agora_cache::RetryPolicy;
use agora_core::{Backend, BackendError, Connector, HandleConfig, Identity, PrincipalId, RetryConfig};
use chrono::{DateTime, Utc};
use moka::future::Cache;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Identity key a handle is bound to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HandleKey {
    /// Anonymous or absent identity
    Anonymous,
    /// Authenticated principal
    Principal(PrincipalId),
}

impl HandleKey {
    /// Key for an optional identity
    #[must_use]
    pub fn for_identity(identity: Option<&Identity>) -> Self {
        match identity {
            Some(identity) if !identity.is_anonymous() => Self::Principal(identity.principal().clone()),
            _ => Self::Anonymous,
        }
    }

    /// Check if the key is anonymous
    #[inline]
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }
}

impl fmt::Display for HandleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("anonymous"),
            Self::Principal(p) => write!(f, "{p}"),
        }
    }
}

/// Outcome of the background admin probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Probe answered
    Completed {
        /// Caller holds the admin role
        is_admin: bool,
    },
    /// Probe did not answer within the timeout
    TimedOut,
    /// Probe call failed
    Failed(BackendError),
}

/// Identity-bound connection to the backend
///
/// Immutable once built; an identity change produces a new handle.
#[derive(Debug)]
pub struct ConnectionHandle {
    key: HandleKey,
    backend: Arc<dyn Backend>,
    created_at: DateTime<Utc>,
    probe: watch::Sender<Option<ProbeOutcome>>,
}

impl ConnectionHandle {
    fn new(key: HandleKey, backend: Arc<dyn Backend>) -> Self {
        let (probe, _) = watch::channel(None);
        Self {
            key,
            backend,
            created_at: Utc::now(),
            probe,
        }
    }

    /// Bound identity key
    #[inline]
    #[must_use]
    pub fn key(&self) -> &HandleKey {
        &self.key
    }

    /// Callable backend surface
    #[inline]
    #[must_use]
    pub fn backend(&self) -> Arc<dyn Backend> {
        self.backend.clone()
    }

    /// Construction time
    #[inline]
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Probe result, once written
    #[must_use]
    pub fn probe_outcome(&self) -> Option<ProbeOutcome> {
        self.probe.borrow().clone()
    }

    /// Wait for the probe result (`None` for anonymous handles)
    pub async fn probe_settled(&self) -> Option<ProbeOutcome> {
        if self.key.is_anonymous() {
            return None;
        }
        let mut rx = self.probe.subscribe();
        let settled = rx.wait_for(Option::is_some).await.ok()?;
        settled.clone()
    }

    fn spawn_probe(self: &Arc<Self>, timeout: Duration) {
        let handle = Arc::downgrade(self);
        let backend = self.backend.clone();
        let key = self.key.clone();
        tokio::spawn(async move {
            let outcome = match tokio::time::timeout(timeout, backend.is_caller_admin()).await {
                Ok(Ok(is_admin)) => {
                    debug!(key = %key, is_admin, "admin probe answered");
                    ProbeOutcome::Completed { is_admin }
                }
                Ok(Err(e)) => {
                    warn!(key = %key, error = %e, "admin probe failed (non-fatal)");
                    ProbeOutcome::Failed(e)
                }
                Err(_) => {
                    warn!(
                        key = %key,
                        timeout_ms = timeout.as_millis(),
                        "admin probe timed out (non-fatal)"
                    );
                    ProbeOutcome::TimedOut
                }
            };
            if let Some(handle) = handle.upgrade() {
                handle.probe.send_replace(Some(outcome));
            }
        });
    }
}

/// Handle readiness for the selected identity
#[derive(Debug, Clone, Default)]
pub enum HandleStatus {
    /// Identity provider still bootstrapping; construction gated off
    #[default]
    Waiting,
    /// Construction in progress
    Connecting,
    /// Handle available
    Ready(Arc<ConnectionHandle>),
    /// Construction failed after retries
    Failed(HandleError),
}

impl HandleStatus {
    /// Construction in progress
    #[inline]
    #[must_use]
    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting)
    }

    /// Construction failed
    #[inline]
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Ready or failed
    #[inline]
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Ready(_) | Self::Failed(_))
    }

    /// Handle, when ready
    #[must_use]
    pub fn handle(&self) -> Option<&Arc<ConnectionHandle>> {
        match self {
            Self::Ready(handle) => Some(handle),
            _ => None,
        }
    }

    /// Error, when failed
    #[must_use]
    pub fn error(&self) -> Option<&HandleError> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }

    fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Waiting, Self::Waiting) | (Self::Connecting, Self::Connecting) => true,
            (Self::Ready(a), Self::Ready(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

struct ManagerInner {
    connector: Arc<dyn Connector>,
    handles: Cache<HandleKey, Arc<ConnectionHandle>>,
    config: HandleConfig,
    status: watch::Sender<HandleStatus>,
    selected: Mutex<Option<HandleKey>>,
}

/// Cache of identity-bound connection handles
#[derive(Clone)]
pub struct HandleManager {
    inner: Arc<ManagerInner>,
}

impl HandleManager {
    /// Create manager over `connector`
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>, config: HandleConfig) -> Self {
        let (status, _) = watch::channel(HandleStatus::Waiting);
        Self {
            inner: Arc::new(ManagerInner {
                connector,
                handles: Cache::builder().max_capacity(config.max_identities).build(),
                config,
                status,
                selected: Mutex::new(None),
            }),
        }
    }

    /// Configuration in effect
    #[inline]
    #[must_use]
    pub fn config(&self) -> &HandleConfig {
        &self.inner.config
    }

    /// Get or build the handle for `identity`
    ///
    /// Does not change the published status.
    ///
    /// # Errors
    /// `HandleError::Construction` once every attempt has failed.
    pub async fn get_handle(&self, identity: Option<&Identity>) -> Result<Arc<ConnectionHandle>, HandleError> {
        let key = HandleKey::for_identity(identity);
        self.inner
            .handles
            .try_get_with(key.clone(), construct(self.inner.clone(), key, identity.cloned()))
            .await
            .map_err(|e| (*e).clone())
    }

    /// Cached handle for `identity`, without constructing
    pub async fn cached(&self, identity: Option<&Identity>) -> Option<Arc<ConnectionHandle>> {
        self.inner.handles.get(&HandleKey::for_identity(identity)).await
    }

    /// Bring the published status in line with `auth`
    ///
    /// Selecting a different identity drops the previous key's handle.
    pub async fn sync(&self, auth: &AuthSnapshot) -> HandleStatus {
        if auth.is_initializing {
            self.publish(HandleStatus::Waiting);
            return HandleStatus::Waiting;
        }

        let key = HandleKey::for_identity(auth.identity.as_ref());
        let previous = self.inner.selected.lock().replace(key.clone());
        if let Some(previous) = previous.filter(|p| *p != key) {
            info!(from = %previous, to = %key, "identity changed, dropping previous handle");
            self.inner.handles.invalidate(&previous).await;
        }

        if let Some(handle) = self.inner.handles.get(&key).await {
            let status = HandleStatus::Ready(handle);
            self.publish(status.clone());
            return status;
        }

        self.publish(HandleStatus::Connecting);
        let status = match self.get_handle(auth.identity.as_ref()).await {
            Ok(handle) => HandleStatus::Ready(handle),
            Err(e) => {
                tracing::error!(key = %key, error = %e, "connection handle unavailable");
                HandleStatus::Failed(e)
            }
        };
        if self.inner.selected.lock().as_ref() == Some(&key) {
            self.publish(status.clone());
        }
        status
    }

    /// Discard the selected identity's handle and rebuild it
    pub async fn retry(&self, auth: &AuthSnapshot) -> HandleStatus {
        let key = HandleKey::for_identity(auth.identity.as_ref());
        info!(key = %key, "retrying connection handle");
        self.inner.handles.invalidate(&key).await;
        self.sync(auth).await
    }

    /// Drop every cached handle
    pub async fn reset(&self) {
        self.inner.handles.invalidate_all();
        self.inner.handles.run_pending_tasks().await;
        self.inner.selected.lock().take();
        self.publish(HandleStatus::Waiting);
        debug!("connection handles reset");
    }

    fn publish(&self, status: HandleStatus) {
        self.inner.status.send_if_modified(|current| {
            if current.same_as(&status) {
                false
            } else {
                *current = status;
                true
            }
        });
    }

    /// Published status
    #[must_use]
    pub fn status(&self) -> HandleStatus {
        self.inner.status.borrow().clone()
    }

    /// Status change notifications
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<HandleStatus> {
        self.inner.status.subscribe()
    }

    /// Wait until the published status is ready or failed
    pub async fn wait_settled(&self) -> HandleStatus {
        let mut rx = self.subscribe();
        let settled = match rx.wait_for(HandleStatus::is_settled).await {
            Ok(status) => status.clone(),
            Err(_) => self.status(),
        };
        settled
    }

    /// Ready handle
    #[must_use]
    pub fn current(&self) -> Option<Arc<ConnectionHandle>> {
        self.inner.status.borrow().handle().cloned()
    }

    /// Ready backend
    #[must_use]
    pub fn current_backend(&self) -> Option<Arc<dyn Backend>> {
        self.current().map(|h| h.backend())
    }

    /// Ready handle is bound to the identity in `auth`
    #[must_use]
    pub fn is_ready_for(&self, auth: &AuthSnapshot) -> bool {
        !auth.is_initializing
            && self
                .inner
                .status
                .borrow()
                .handle()
                .is_some_and(|h| *h.key() == HandleKey::for_identity(auth.identity.as_ref()))
    }

    /// Number of cached handles
    #[must_use]
    pub fn cached_count(&self) -> u64 {
        self.inner.handles.entry_count()
    }
}

impl fmt::Debug for HandleManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleManager")
            .field("config", &self.inner.config)
            .field("selected", &*self.inner.selected.lock())
            .finish_non_exhaustive()
    }
}

async fn construct(
    inner: Arc<ManagerInner>,
    key: HandleKey,
    identity: Option<Identity>,
) -> Result<Arc<ConnectionHandle>, HandleError> {
    let config = inner.config;
    let retry = RetryPolicy::from(RetryConfig {
        max_retries: config.construction_retries,
        ..RetryConfig::default()
    });

    let mut attempts = 0;
    loop {
        attempts += 1;
        debug!(key = %key, attempt = attempts, "constructing connection handle");
        match inner.connector.connect(identity.clone()).await {
            Ok(backend) => {
                let handle = Arc::new(ConnectionHandle::new(key.clone(), backend));
                if !key.is_anonymous() {
                    handle.spawn_probe(config.probe_timeout());
                }
                info!(key = %key, attempts, "connection handle ready");
                return Ok(handle);
            }
            Err(e) if attempts <= config.construction_retries => {
                let delay = retry.delay_for(attempts - 1);
                warn!(
                    key = %key,
                    attempt = attempts,
                    delay_ms = delay.as_millis(),
                    error = %e,
                    "connection handle construction failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                return Err(HandleError::Construction {
                    key,
                    attempts,
                    source: e,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::BackendResult;
    use agora_test_utils::MemoryConnector;
    use async_trait::async_trait;
    use mockall::mock;
    use pretty_assertions::assert_eq;

    mock! {
        Connector {}

        #[async_trait]
        impl Connector for Connector {
            async fn connect(&self, identity: Option<Identity>) -> BackendResult<Arc<dyn Backend>>;
        }
    }

    fn manager(connector: impl Connector + 'static) -> HandleManager {
        HandleManager::new(Arc::new(connector), HandleConfig::default())
    }

    #[test]
    fn anonymous_principal_maps_to_anonymous_key() {
        assert_eq!(HandleKey::for_identity(Some(&Identity::anonymous())), HandleKey::Anonymous);
        assert_eq!(HandleKey::for_identity(None), HandleKey::Anonymous);
        assert_eq!(
            HandleKey::for_identity(Some(&Identity::new("aaaaa-aa"))).to_string(),
            "aaaaa-aa"
        );
    }

    #[tokio::test]
    async fn same_identity_reuses_handle() {
        let manager = manager(MemoryConnector::default());
        let alice = Identity::new("alice-principal");

        let first = manager.get_handle(Some(&alice)).await.unwrap();
        let second = manager.get_handle(Some(&alice)).await.unwrap();
        let anonymous = manager.get_handle(None).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &anonymous));
        assert_eq!(anonymous.key(), &HandleKey::Anonymous);
    }

    #[tokio::test(start_paused = true)]
    async fn construction_is_retried_once() {
        let memory = MemoryConnector::default();
        let mut connector = MockConnector::new();
        let mut calls = 0;
        connector.expect_connect().times(2).returning(move |identity| {
            calls += 1;
            if calls == 1 {
                Err(BackendError::transient("replica unavailable"))
            } else {
                Ok(memory.backend_for(identity.as_ref()))
            }
        });

        let handle = manager(connector).get_handle(None).await.unwrap();
        assert!(handle.key().is_anonymous());
    }

    #[tokio::test(start_paused = true)]
    async fn construction_failure_surfaces_after_retry() {
        let mut connector = MockConnector::new();
        connector
            .expect_connect()
            .times(2)
            .returning(|_| Err(BackendError::transient("replica unavailable")));
        let manager = manager(connector);

        let status = manager.sync(&AuthSnapshot::default()).await;

        match status {
            HandleStatus::Failed(HandleError::Construction { attempts, .. }) => assert_eq!(attempts, 2),
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(manager.status().is_failed());
    }

    #[tokio::test]
    async fn initializing_provider_gates_construction() {
        let mut connector = MockConnector::new();
        connector.expect_connect().never();
        let manager = manager(connector);

        let status = manager
            .sync(&AuthSnapshot {
                is_initializing: true,
                ..AuthSnapshot::default()
            })
            .await;

        assert!(matches!(status, HandleStatus::Waiting));
        assert!(manager.current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn probe_timeout_is_recorded_without_blocking() {
        let connector = MemoryConnector::default();
        connector.store().set_latency("is_caller_admin", Duration::from_secs(60));
        let manager = manager(connector);
        let alice = Identity::new("alice-principal");

        let handle = manager.get_handle(Some(&alice)).await.unwrap();
        assert_eq!(handle.probe_outcome(), None);

        assert_eq!(handle.probe_settled().await, Some(ProbeOutcome::TimedOut));
    }

    #[tokio::test]
    async fn identity_switch_drops_previous_handle() {
        let manager = manager(MemoryConnector::default());
        let alice = AuthSnapshot {
            identity: Some(Identity::new("alice-principal")),
            ..AuthSnapshot::default()
        };

        let first = manager.sync(&alice).await;
        manager.sync(&AuthSnapshot::default()).await;
        let again = manager.sync(&alice).await;

        let (Some(first), Some(again)) = (first.handle(), again.handle()) else {
            panic!("expected ready handles");
        };
        assert!(!Arc::ptr_eq(first, again));
        assert!(manager.is_ready_for(&alice));
        assert!(!manager.is_ready_for(&AuthSnapshot::default()));
    }
}
