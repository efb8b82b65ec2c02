//! Core domain types
//!
//! Mirrors the entities exposed by the community backend:
//! - Identities and principals
//! - Chat messages, events and RSVP counters
//! - Private and public profiles, leaderboard, statistics
//! - Roles and approval workflow records

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Textual principal of the anonymous caller
pub const ANONYMOUS_PRINCIPAL: &str = "2vxsx-fae";

/// Stable unique principal identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PrincipalId(String);

impl PrincipalId {
    /// Create principal from its textual form
    #[inline]
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// The anonymous principal
    #[inline]
    #[must_use]
    pub fn anonymous() -> Self {
        Self(ANONYMOUS_PRINCIPAL.to_string())
    }

    /// Check if this is the anonymous principal
    #[inline]
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.0 == ANONYMOUS_PRINCIPAL
    }

    /// Get textual form
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PrincipalId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Opaque credential issued by the identity provider
///
/// Session-scoped: created at login, dropped at logout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    principal: PrincipalId,
}

impl Identity {
    /// Create identity for principal
    #[inline]
    #[must_use]
    pub fn new(principal: impl Into<PrincipalId>) -> Self {
        Self {
            principal: principal.into(),
        }
    }

    /// Identity carrying the anonymous principal
    #[inline]
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            principal: PrincipalId::anonymous(),
        }
    }

    /// Get principal
    #[inline]
    #[must_use]
    pub fn principal(&self) -> &PrincipalId {
        &self.principal
    }

    /// Derived from the principal
    #[inline]
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.principal.is_anonymous()
    }
}

/// Chat message identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Event identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Correlation id for a client-side operation (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub Ulid);

impl RequestId {
    /// Generate new request ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Guestbook / chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message ID
    pub id: MessageId,
    /// Message body
    pub content: String,
    /// Vote count
    pub votes: u64,
    /// Author principal
    pub author: PrincipalId,
    /// Visible to non-admins once approved
    pub approved: bool,
    /// Server timestamp (nanoseconds)
    pub timestamp: i64,
}

impl ChatMessage {
    /// Authors may remove their own messages; admins may remove any
    #[inline]
    #[must_use]
    pub fn removable_by(&self, caller: &PrincipalId, caller_is_admin: bool) -> bool {
        caller_is_admin || (&self.author == caller && !caller.is_anonymous())
    }
}

/// Community event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event ID
    pub id: EventId,
    /// Title
    pub title: String,
    /// Description
    pub description: String,
    /// Date (free-form, as entered by organisers)
    pub date: String,
    /// Location
    pub location: String,
    /// Attending responses
    pub rsvp_count: u64,
    /// Not attending responses
    pub not_attending_count: u64,
}

/// Fields supplied when creating or editing an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDraft {
    /// Title
    pub title: String,
    /// Description
    pub description: String,
    /// Date
    pub date: String,
    /// Location
    pub location: String,
}

impl EventDraft {
    /// Create new draft
    #[inline]
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        date: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            date: date.into(),
            location: location.into(),
        }
    }
}

/// Caller-private profile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateUserProfile {
    /// Public display name
    pub display_name: String,
    /// Legal name
    pub full_name: String,
    /// Email
    pub email: String,
    /// Phone
    pub phone: String,
    /// Postal address
    pub address: String,
    /// Date of birth
    pub date_of_birth: String,
    /// Website
    pub website: String,
    /// Free-form social links
    pub social_links: String,
    /// Registration step done
    pub registration_complete: bool,
    /// Profile form done
    pub profile_complete: bool,
    /// Onboarding flow done
    pub onboarding_complete: bool,
    /// Community points
    pub points: u64,
}

/// Publicly visible directory profile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicProfile {
    /// Owner
    pub principal: PrincipalId,
    /// Display name (may be empty)
    pub display_name: String,
    /// Company name (may be empty)
    pub company_name: String,
    /// Biography
    pub biography: String,
    /// Services offered
    pub services_offered: String,
    /// Website
    pub website: String,
    /// Free-form social links
    pub social_links: String,
    /// Validated by an admin
    pub validated: bool,
    /// Events attended
    pub events_attended: u64,
}

impl Default for PrincipalId {
    fn default() -> Self {
        Self::anonymous()
    }
}

/// Leaderboard row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// Member
    pub principal: PrincipalId,
    /// Points
    pub points: u64,
}

/// Platform-wide counters for the admin dashboard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    /// Registered users
    pub total_users: u64,
    /// Messages posted
    pub total_messages: u64,
    /// Events created
    pub total_events: u64,
    /// Points awarded
    pub total_points: u64,
}

/// Access-control role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Administrator
    Admin,
    /// Registered user
    User,
    /// Unregistered caller
    Guest,
}

/// Approval workflow status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    /// Awaiting decision
    Pending,
    /// Approved
    Approved,
    /// Rejected
    Rejected,
}

/// Approval record for the admin queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserApprovalInfo {
    /// Requesting principal
    pub principal: PrincipalId,
    /// Current status
    pub status: ApprovalStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(author: &str) -> ChatMessage {
        ChatMessage {
            id: MessageId(1),
            content: "hello".to_string(),
            votes: 0,
            author: PrincipalId::new(author),
            approved: true,
            timestamp: 0,
        }
    }

    #[test]
    fn anonymous_identity_detection() {
        assert!(Identity::anonymous().is_anonymous());
        assert!(!Identity::new("aaaaa-aa").is_anonymous());
        assert_eq!(PrincipalId::default(), PrincipalId::anonymous());
    }

    #[test]
    fn author_or_admin_may_remove() {
        let msg = message("alice");

        assert!(msg.removable_by(&PrincipalId::new("alice"), false));
        assert!(msg.removable_by(&PrincipalId::new("bob"), true));
        assert!(!msg.removable_by(&PrincipalId::new("bob"), false));
    }

    #[test]
    fn anonymous_author_cannot_remove() {
        let msg = message(ANONYMOUS_PRINCIPAL);
        assert!(!msg.removable_by(&PrincipalId::anonymous(), false));
    }

    #[test]
    fn request_id_generation() {
        assert_ne!(RequestId::new(), RequestId::new());
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&UserRole::Admin).unwrap();
        assert_eq!(json, "\"admin\"");
    }
}
