//! Cache keys for every domain query
//!
//! Prefixes matter: invalidating [`messages`] covers both message lists,
//! [`events`] covers the popular list, [`event_root`] covers every
//! `event/<id>` and [`public_profile_root`] every `publicProfile/<p>`.

use agora_cache::QueryKey;
use agora_core::{EventId, PrincipalId};

/// Caller's private profile
#[must_use]
pub fn current_user_profile() -> QueryKey {
    QueryKey::new("currentUserProfile")
}

/// Another user's private profile (admin)
#[must_use]
pub fn user_profile(principal: &PrincipalId) -> QueryKey {
    QueryKey::new("userProfile").with(principal)
}

/// Caller is admin
#[must_use]
pub fn is_admin() -> QueryKey {
    QueryKey::new("isAdmin")
}

/// Caller role
#[must_use]
pub fn user_role() -> QueryKey {
    QueryKey::new("userRole")
}

/// Caller approval flag
#[must_use]
pub fn is_approved() -> QueryKey {
    QueryKey::new("isApproved")
}

/// Approval queue (admin)
#[must_use]
pub fn approvals() -> QueryKey {
    QueryKey::new("approvals")
}

/// Points leaderboard
#[must_use]
pub fn leaderboard() -> QueryKey {
    QueryKey::new("leaderboard")
}

/// Platform statistics
#[must_use]
pub fn statistics() -> QueryKey {
    QueryKey::new("statistics")
}

/// Both message lists
#[must_use]
pub fn messages() -> QueryKey {
    QueryKey::new("messages")
}

/// Approved messages
#[must_use]
pub fn visible_messages() -> QueryKey {
    messages().with("visible")
}

/// Every message including unapproved (admin)
#[must_use]
pub fn all_messages() -> QueryKey {
    messages().with("all")
}

/// Event list
#[must_use]
pub fn events() -> QueryKey {
    QueryKey::new("events")
}

/// Most attended events
#[must_use]
pub fn popular_events() -> QueryKey {
    events().with("popular")
}

/// Every single-event entry
#[must_use]
pub fn event_root() -> QueryKey {
    QueryKey::new("event")
}

/// One event
#[must_use]
pub fn event(id: EventId) -> QueryKey {
    event_root().with(id)
}

/// Validated events attended by `principal`
#[must_use]
pub fn validated_events(principal: &PrincipalId) -> QueryKey {
    QueryKey::new("validatedEvents").with(principal)
}

/// Directory listing
#[must_use]
pub fn public_profiles() -> QueryKey {
    QueryKey::new("publicProfiles")
}

/// Directory listing filtered by validation
#[must_use]
pub fn public_profiles_by_validation(validated: bool) -> QueryKey {
    public_profiles().with(if validated { "validated" } else { "unvalidated" })
}

/// Every single-profile entry
#[must_use]
pub fn public_profile_root() -> QueryKey {
    QueryKey::new("publicProfile")
}

/// One public profile
#[must_use]
pub fn public_profile(principal: &PrincipalId) -> QueryKey {
    public_profile_root().with(principal)
}

/// Caller's own public profile
#[must_use]
pub fn own_public_profile() -> QueryKey {
    public_profile_root().with("@self")
}
