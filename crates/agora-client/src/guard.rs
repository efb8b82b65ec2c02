//! Access guards
//!
//! Route-level decisions derived from identity and cached query state.
//! Presentation code maps each [`AccessDecision`] to a spinner, a redirect
//! or the protected content.

use crate::auth::AuthSnapshot;
use crate::client::CommunityClient;
use agora_cache::QueryState;
use agora_core::PrivateUserProfile;
use serde::Serialize;

/// Outcome of a guard check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessDecision {
    /// Inputs still loading
    Pending,
    /// Show protected content
    Allow,
    /// Caller must sign in
    Login,
    /// Caller must finish onboarding
    Onboarding,
    /// Caller lacks the required role
    Denied,
}

/// Require an authenticated caller
#[must_use]
pub fn require_auth(auth: &AuthSnapshot) -> AccessDecision {
    if auth.is_initializing {
        AccessDecision::Pending
    } else if auth.is_authenticated() {
        AccessDecision::Allow
    } else {
        AccessDecision::Login
    }
}

/// Require a caller who completed onboarding
///
/// Onboarding is needed once the profile has been fetched and is either
/// absent or not marked complete.
#[must_use]
pub fn require_onboarding(
    auth: &AuthSnapshot,
    profile: &QueryState<Option<PrivateUserProfile>>,
) -> AccessDecision {
    match require_auth(auth) {
        AccessDecision::Allow => {}
        other => return other,
    }
    if profile.is_loading() || !profile.is_fetched {
        return AccessDecision::Pending;
    }
    let onboarded = profile
        .data
        .as_deref()
        .and_then(Option::as_ref)
        .is_some_and(|p| p.onboarding_complete);
    if onboarded {
        AccessDecision::Allow
    } else {
        AccessDecision::Onboarding
    }
}

/// Require the admin role
#[must_use]
pub fn require_admin(is_admin: &QueryState<bool>) -> AccessDecision {
    match is_admin.data.as_deref() {
        Some(true) => AccessDecision::Allow,
        Some(false) => AccessDecision::Denied,
        None if is_admin.is_error() => AccessDecision::Denied,
        None => AccessDecision::Pending,
    }
}

impl CommunityClient {
    /// [`require_auth`] for the current identity
    #[must_use]
    pub fn require_auth(&self) -> AccessDecision {
        require_auth(&self.auth().snapshot())
    }

    /// [`require_onboarding`] for the current identity and cached profile
    #[must_use]
    pub fn require_onboarding(&self) -> AccessDecision {
        require_onboarding(&self.auth().snapshot(), &self.current_user_profile().state())
    }

    /// [`require_admin`] against the cached admin flag
    #[must_use]
    pub fn require_admin(&self) -> AccessDecision {
        require_admin(&self.is_admin().state())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::Identity;
    use std::sync::Arc;

    fn signed_in() -> AuthSnapshot {
        AuthSnapshot {
            identity: Some(Identity::new("alice-principal")),
            ..AuthSnapshot::default()
        }
    }

    fn fetched(profile: Option<PrivateUserProfile>) -> QueryState<Option<PrivateUserProfile>> {
        QueryState {
            data: Some(Arc::new(profile)),
            is_fetched: true,
            ..QueryState::default()
        }
    }

    #[test]
    fn anonymous_callers_are_sent_to_login() {
        let auth = AuthSnapshot {
            identity: Some(Identity::anonymous()),
            ..AuthSnapshot::default()
        };
        assert_eq!(require_auth(&auth), AccessDecision::Login);
        assert_eq!(require_onboarding(&auth, &fetched(None)), AccessDecision::Login);
    }

    #[test]
    fn bootstrap_is_pending() {
        let auth = AuthSnapshot {
            is_initializing: true,
            ..AuthSnapshot::default()
        };
        assert_eq!(require_auth(&auth), AccessDecision::Pending);
    }

    #[test]
    fn onboarding_follows_profile_state() {
        let auth = signed_in();
        assert_eq!(require_onboarding(&auth, &QueryState::default()), AccessDecision::Pending);
        assert_eq!(require_onboarding(&auth, &fetched(None)), AccessDecision::Onboarding);

        let incomplete = PrivateUserProfile {
            registration_complete: true,
            ..PrivateUserProfile::default()
        };
        assert_eq!(require_onboarding(&auth, &fetched(Some(incomplete))), AccessDecision::Onboarding);

        let complete = PrivateUserProfile {
            onboarding_complete: true,
            ..PrivateUserProfile::default()
        };
        assert_eq!(require_onboarding(&auth, &fetched(Some(complete))), AccessDecision::Allow);
    }

    #[test]
    fn admin_guard() {
        let mut state = QueryState::<bool>::default();
        assert_eq!(require_admin(&state), AccessDecision::Pending);
        state.data = Some(Arc::new(false));
        assert_eq!(require_admin(&state), AccessDecision::Denied);
        state.data = Some(Arc::new(true));
        assert_eq!(require_admin(&state), AccessDecision::Allow);
    }
}
