//! Identity provider adapter
//!
//! Wraps an external identity provider as a stream of [`AuthSnapshot`]s.
//! Provider events are pushed in; observers read snapshots through a
//! `watch` channel. Nothing here fails: a rejected login is the
//! [`LoginStatus::LoginError`] status.

use agora_core::{Identity, PrincipalId};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Login lifecycle as reported by the provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LoginStatus {
    /// No login attempted
    #[default]
    Idle,
    /// Login flow open
    LoggingIn,
    /// Last login failed
    LoginError,
    /// Logged in
    LoggedIn,
}

/// Point-in-time identity state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthSnapshot {
    /// Current identity (absent before bootstrap or after logout)
    pub identity: Option<Identity>,
    /// Login lifecycle
    pub status: LoginStatus,
    /// Provider is restoring a stored session
    pub is_initializing: bool,
}

impl AuthSnapshot {
    /// Identity present and not anonymous
    #[inline]
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.identity.as_ref().is_some_and(|i| !i.is_anonymous())
    }

    /// Principal of an authenticated identity
    #[must_use]
    pub fn principal(&self) -> Option<&PrincipalId> {
        self.identity
            .as_ref()
            .filter(|i| !i.is_anonymous())
            .map(Identity::principal)
    }

    /// Last login attempt failed
    #[inline]
    #[must_use]
    pub fn is_login_error(&self) -> bool {
        self.status == LoginStatus::LoginError
    }
}

/// Push-driven adapter over the identity provider
#[derive(Debug, Clone)]
pub struct IdentityAdapter {
    state: Arc<watch::Sender<AuthSnapshot>>,
}

impl IdentityAdapter {
    /// Adapter with no identity, not initializing
    #[must_use]
    pub fn new() -> Self {
        Self::from_snapshot(AuthSnapshot::default())
    }

    /// Adapter in the bootstrap phase
    #[must_use]
    pub fn initializing() -> Self {
        Self::from_snapshot(AuthSnapshot {
            is_initializing: true,
            ..AuthSnapshot::default()
        })
    }

    /// Adapter already holding `identity`
    #[must_use]
    pub fn with_identity(identity: Identity) -> Self {
        Self::from_snapshot(AuthSnapshot {
            identity: Some(identity),
            status: LoginStatus::LoggedIn,
            is_initializing: false,
        })
    }

    fn from_snapshot(snapshot: AuthSnapshot) -> Self {
        let (state, _) = watch::channel(snapshot);
        Self {
            state: Arc::new(state),
        }
    }

    /// Current snapshot
    #[must_use]
    pub fn snapshot(&self) -> AuthSnapshot {
        self.state.borrow().clone()
    }

    /// Snapshot change notifications
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.state.subscribe()
    }

    /// Check if the current identity is authenticated
    #[inline]
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    fn update(&self, f: impl FnOnce(&mut AuthSnapshot)) {
        self.state.send_if_modified(|snapshot| {
            let before = snapshot.clone();
            f(snapshot);
            *snapshot != before
        });
    }

    /// Provider started restoring a stored session
    pub fn bootstrap_started(&self) {
        debug!("identity bootstrap started");
        self.update(|s| s.is_initializing = true);
    }

    /// Provider finished bootstrap, possibly with a restored identity
    pub fn bootstrap_finished(&self, restored: Option<Identity>) {
        info!(
            restored = restored.as_ref().map(|i| i.principal().to_string()),
            "identity bootstrap finished"
        );
        self.update(|s| {
            s.is_initializing = false;
            if let Some(identity) = restored {
                s.status = LoginStatus::LoggedIn;
                s.identity = Some(identity);
            }
        });
    }

    /// Login flow opened
    pub fn login_started(&self) {
        self.update(|s| s.status = LoginStatus::LoggingIn);
    }

    /// Login completed
    pub fn login_succeeded(&self, identity: Identity) {
        info!(principal = %identity.principal(), "logged in");
        self.update(|s| {
            s.identity = Some(identity);
            s.status = LoginStatus::LoggedIn;
        });
    }

    /// Login rejected or aborted
    pub fn login_failed(&self, reason: &str) {
        warn!(reason, "login failed");
        self.update(|s| s.status = LoginStatus::LoginError);
    }

    /// Session ended
    pub fn logout(&self) {
        info!("logged out");
        self.update(|s| {
            s.identity = None;
            s.status = LoginStatus::Idle;
        });
    }
}

impl Default for IdentityAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn anonymous_identity_is_not_authenticated() {
        let adapter = IdentityAdapter::with_identity(Identity::anonymous());
        assert!(!adapter.is_authenticated());
        assert_eq!(adapter.snapshot().principal(), None);
    }

    #[test]
    fn login_lifecycle() {
        let adapter = IdentityAdapter::initializing();
        assert!(adapter.snapshot().is_initializing);

        adapter.bootstrap_finished(None);
        adapter.login_started();
        assert_eq!(adapter.snapshot().status, LoginStatus::LoggingIn);

        adapter.login_failed("window closed");
        assert!(adapter.snapshot().is_login_error());

        adapter.login_succeeded(Identity::new("aaaaa-aa"));
        let snapshot = adapter.snapshot();
        assert!(snapshot.is_authenticated());
        assert_eq!(snapshot.principal().map(PrincipalId::as_str), Some("aaaaa-aa"));

        adapter.logout();
        assert_eq!(adapter.snapshot(), AuthSnapshot::default());
    }

    #[tokio::test]
    async fn redundant_events_do_not_notify() {
        let adapter = IdentityAdapter::new();
        let mut rx = adapter.subscribe();
        rx.borrow_and_update();

        adapter.logout();
        assert!(!rx.has_changed().unwrap());

        adapter.login_started();
        assert!(rx.has_changed().unwrap());
    }
}
