//! Backend RPC surface
//!
//! The community backend is a black box: every procedure is an asynchronous
//! call that either returns a value or fails with a [`BackendError`]. Calls are
//! not deduplicated here; de-duplication happens per cache key in the query
//! layer.

use crate::error::{BackendError, BackendResult};
use crate::types::{
    ApprovalStatus, ChatMessage, Event, EventDraft, EventId, Identity, LeaderboardEntry, MessageId,
    PrincipalId, PrivateUserProfile, PublicProfile, Statistics, UserApprovalInfo, UserRole,
};
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

/// Remote procedures exposed by the community backend
///
/// Implementations are bound to one caller identity at construction time.
#[async_trait]
pub trait Backend: Send + Sync + Debug {
    // Onboarding and caller profile

    /// Register the caller as a user
    async fn register_user(&self) -> BackendResult<()>;

    /// Mark the caller's onboarding as complete
    async fn complete_onboarding(&self) -> BackendResult<()>;

    /// Fetch the caller's private profile
    async fn get_caller_user_profile(&self) -> BackendResult<Option<PrivateUserProfile>>;

    /// Save the caller's private profile
    async fn save_caller_user_profile(&self, profile: PrivateUserProfile) -> BackendResult<()>;

    /// Fetch another user's private profile (admin)
    async fn get_user_profile(&self, user: PrincipalId) -> BackendResult<Option<PrivateUserProfile>>;

    // Events

    /// List all events
    async fn list_events(&self) -> BackendResult<Vec<Event>>;

    /// List events ranked by attendance
    async fn get_popular_events(&self) -> BackendResult<Vec<Event>>;

    /// Fetch one event with live RSVP counters
    async fn get_event(&self, id: EventId) -> BackendResult<Event>;

    /// Create an event (admin)
    async fn create_event(&self, draft: EventDraft) -> BackendResult<EventId>;

    /// Update an event (admin)
    async fn update_event(&self, id: EventId, draft: EventDraft) -> BackendResult<()>;

    /// Delete an event (admin)
    async fn delete_event(&self, id: EventId) -> BackendResult<()>;

    /// Respond to an event
    async fn rsvp_to_event(&self, id: EventId, attending: bool) -> BackendResult<()>;

    /// Count events a principal attended that were validated
    async fn count_validated_events(&self, principal: PrincipalId) -> BackendResult<u64>;

    // Chat

    /// Post a message (pending approval)
    async fn post_message(&self, content: String) -> BackendResult<MessageId>;

    /// Vote on a message
    async fn vote_message(&self, id: MessageId) -> BackendResult<()>;

    /// Approve a message (admin)
    async fn approve_message(&self, id: MessageId) -> BackendResult<()>;

    /// Remove a message (author or admin)
    async fn remove_message(&self, id: MessageId) -> BackendResult<()>;

    /// Messages visible to the caller
    async fn get_visible_messages(&self) -> BackendResult<Vec<ChatMessage>>;

    /// Every message including unapproved ones (admin)
    async fn get_all_messages(&self) -> BackendResult<Vec<ChatMessage>>;

    // Public profiles

    /// List public profiles
    async fn list_public_profiles(&self) -> BackendResult<Vec<PublicProfile>>;

    /// List public profiles filtered by validation flag
    async fn list_public_profiles_by_validation(
        &self,
        validated: bool,
    ) -> BackendResult<Vec<PublicProfile>>;

    /// Fetch one public profile
    async fn get_public_profile(&self, principal: PrincipalId) -> BackendResult<PublicProfile>;

    /// Fetch the caller's public profile
    async fn get_own_public_profile(&self) -> BackendResult<Option<PublicProfile>>;

    /// Create or update a public profile
    async fn create_or_update_public_profile(&self, profile: PublicProfile) -> BackendResult<()>;

    /// Set the validation flag on a public profile (admin)
    async fn set_profile_validation(
        &self,
        principal: PrincipalId,
        validated: bool,
    ) -> BackendResult<()>;

    // Leaderboard and statistics

    /// Points leaderboard
    async fn get_leaderboard(&self) -> BackendResult<Vec<LeaderboardEntry>>;

    /// Platform statistics (admin)
    async fn get_statistics(&self) -> BackendResult<Statistics>;

    // Roles and approvals

    /// Check whether the caller is an admin
    async fn is_caller_admin(&self) -> BackendResult<bool>;

    /// Caller's role
    async fn get_caller_user_role(&self) -> BackendResult<UserRole>;

    /// Assign a role to a user (admin)
    async fn assign_caller_user_role(&self, user: PrincipalId, role: UserRole)
        -> BackendResult<()>;

    /// Check whether the caller is approved
    async fn is_caller_approved(&self) -> BackendResult<bool>;

    /// Request approval for the caller
    async fn request_approval(&self) -> BackendResult<()>;

    /// Approval queue (admin)
    async fn list_approvals(&self) -> BackendResult<Vec<UserApprovalInfo>>;

    /// Decide an approval (admin)
    async fn set_approval(&self, user: PrincipalId, status: ApprovalStatus) -> BackendResult<()>;
}

/// Builds backend connections bound to an identity
///
/// `None` requests an anonymous connection.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Construct a connection for the identity
    async fn connect(&self, identity: Option<Identity>) -> Result<Arc<dyn Backend>, BackendError>;
}
