//! In-memory community backend
//!
//! [`MemoryStore`] holds the shared world; [`MemoryBackend`] is one caller's
//! view of it and [`MemoryConnector`] hands those views out per identity.
//! Every procedure counts its calls and honours injected latency and failures,
//! so tests can script slow or flaky backends. Rejections use the same free
//! text a real backend would, classified by `BackendError::classify`.

use agora_core::{
    ApprovalStatus, Backend, BackendError, BackendResult, ChatMessage, Connector, Event, EventDraft,
    EventId, Identity, LeaderboardEntry, MessageId, PrincipalId, PrivateUserProfile, PublicProfile,
    Statistics, UserApprovalInfo, UserRole,
};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Points for posting a message
pub const POST_POINTS: u64 = 10;
/// Points for voting on a message
pub const VOTE_POINTS: u64 = 1;
/// Points for confirming attendance
pub const RSVP_POINTS: u64 = 5;
/// Size of the popular events list
pub const POPULAR_EVENTS: usize = 3;

/// Call counter name for connection construction
pub const CONNECT: &str = "connect";

const ANONYMOUS_CALLER: &str = "Unauthorized: anonymous callers must log in";
const NOT_REGISTERED: &str = "Unauthorized: user is not registered";
const ADMIN_ONLY: &str = "Only admins can perform this action";

type Outcome<T> = Result<T, &'static str>;

#[derive(Debug, Default)]
struct World {
    users: BTreeMap<PrincipalId, PrivateUserProfile>,
    admins: BTreeSet<PrincipalId>,
    messages: BTreeMap<MessageId, ChatMessage>,
    votes: BTreeSet<(MessageId, PrincipalId)>,
    events: BTreeMap<EventId, Event>,
    rsvps: BTreeMap<(EventId, PrincipalId), bool>,
    public_profiles: BTreeMap<PrincipalId, PublicProfile>,
    approvals: BTreeMap<PrincipalId, ApprovalStatus>,
    next_message: u64,
    next_event: u64,
    clock: i64,
}

impl World {
    fn registered(&self, caller: &PrincipalId) -> Outcome<()> {
        if caller.is_anonymous() {
            Err(ANONYMOUS_CALLER)
        } else if self.users.contains_key(caller) {
            Ok(())
        } else {
            Err(NOT_REGISTERED)
        }
    }

    fn admin(&self, caller: &PrincipalId) -> Outcome<()> {
        if self.admins.contains(caller) {
            Ok(())
        } else {
            Err(ADMIN_ONLY)
        }
    }

    fn is_admin(&self, caller: &PrincipalId) -> bool {
        self.admins.contains(caller)
    }

    fn tick(&mut self) -> i64 {
        self.clock += 1_000_000_000;
        self.clock
    }

    fn award(&mut self, principal: &PrincipalId, points: u64) {
        if let Some(profile) = self.users.get_mut(principal) {
            profile.points += points;
        }
    }

    fn enroll(&mut self, principal: &PrincipalId) -> &mut PrivateUserProfile {
        let profile = self.users.entry(principal.clone()).or_default();
        profile.registration_complete = true;
        profile
    }

    fn attended(&self, principal: &PrincipalId) -> u64 {
        let count = self
            .rsvps
            .iter()
            .filter(|((event, who), attending)| {
                **attending && who == principal && self.events.contains_key(event)
            })
            .count();
        count as u64
    }

    fn public_view(&self, profile: &PublicProfile) -> PublicProfile {
        PublicProfile {
            events_attended: self.attended(&profile.principal),
            ..profile.clone()
        }
    }

    fn message_mut(&mut self, id: MessageId) -> Outcome<&mut ChatMessage> {
        self.messages.get_mut(&id).ok_or("Message not found")
    }

    fn event_mut(&mut self, id: EventId) -> Outcome<&mut Event> {
        self.events.get_mut(&id).ok_or("Event not found")
    }

    // Onboarding

    fn register_user(&mut self, caller: &PrincipalId) -> Outcome<()> {
        if caller.is_anonymous() {
            return Err(ANONYMOUS_CALLER);
        }
        self.enroll(caller);
        Ok(())
    }

    fn complete_onboarding(&mut self, caller: &PrincipalId) -> Outcome<()> {
        self.registered(caller)?;
        self.enroll(caller).onboarding_complete = true;
        Ok(())
    }

    fn caller_profile(&self, caller: &PrincipalId) -> Outcome<Option<PrivateUserProfile>> {
        if caller.is_anonymous() {
            return Err(ANONYMOUS_CALLER);
        }
        Ok(self.users.get(caller).cloned())
    }

    fn save_profile(&mut self, caller: &PrincipalId, profile: PrivateUserProfile) -> Outcome<()> {
        self.registered(caller)?;
        let current = self.enroll(caller);
        *current = PrivateUserProfile {
            registration_complete: true,
            profile_complete: true,
            onboarding_complete: current.onboarding_complete || profile.onboarding_complete,
            points: current.points,
            ..profile
        };
        Ok(())
    }

    fn user_profile(&self, caller: &PrincipalId, user: &PrincipalId) -> Outcome<Option<PrivateUserProfile>> {
        if caller != user {
            self.admin(caller)?;
        }
        Ok(self.users.get(user).cloned())
    }

    // Events

    fn popular_events(&self) -> Vec<Event> {
        let mut events: Vec<Event> = self.events.values().cloned().collect();
        events.sort_by(|a, b| b.rsvp_count.cmp(&a.rsvp_count).then(a.id.cmp(&b.id)));
        events.truncate(POPULAR_EVENTS);
        events
    }

    fn create_event(&mut self, caller: &PrincipalId, draft: EventDraft) -> Outcome<EventId> {
        self.admin(caller)?;
        self.next_event += 1;
        let id = EventId(self.next_event);
        self.events.insert(
            id,
            Event {
                id,
                title: draft.title,
                description: draft.description,
                date: draft.date,
                location: draft.location,
                rsvp_count: 0,
                not_attending_count: 0,
            },
        );
        Ok(id)
    }

    fn update_event(&mut self, caller: &PrincipalId, id: EventId, draft: EventDraft) -> Outcome<()> {
        self.admin(caller)?;
        let event = self.event_mut(id)?;
        event.title = draft.title;
        event.description = draft.description;
        event.date = draft.date;
        event.location = draft.location;
        Ok(())
    }

    fn delete_event(&mut self, caller: &PrincipalId, id: EventId) -> Outcome<()> {
        self.admin(caller)?;
        self.events.remove(&id).ok_or("Event not found")?;
        self.rsvps.retain(|(event, _), _| *event != id);
        Ok(())
    }

    fn rsvp(&mut self, caller: &PrincipalId, id: EventId, attending: bool) -> Outcome<()> {
        self.registered(caller)?;
        let key = (id, caller.clone());
        if self.rsvps.contains_key(&key) {
            return Err("You have already responded to this event");
        }
        let event = self.event_mut(id)?;
        if attending {
            event.rsvp_count += 1;
        } else {
            event.not_attending_count += 1;
        }
        self.rsvps.insert(key, attending);
        if attending {
            self.award(caller, RSVP_POINTS);
        }
        Ok(())
    }

    // Chat

    fn post_message(&mut self, caller: &PrincipalId, content: String) -> Outcome<MessageId> {
        self.registered(caller)?;
        if content.trim().is_empty() {
            return Err("Invalid message: content is empty");
        }
        self.next_message += 1;
        let id = MessageId(self.next_message);
        let message = ChatMessage {
            id,
            content,
            votes: 0,
            author: caller.clone(),
            approved: self.is_admin(caller),
            timestamp: self.tick(),
        };
        self.messages.insert(id, message);
        self.award(caller, POST_POINTS);
        Ok(id)
    }

    fn vote_message(&mut self, caller: &PrincipalId, id: MessageId) -> Outcome<()> {
        self.registered(caller)?;
        let message = self.message_mut(id)?;
        if !message.approved {
            return Err("Invalid vote: message is awaiting approval");
        }
        if !self.votes.insert((id, caller.clone())) {
            return Err("You have already voted on this message");
        }
        self.message_mut(id)?.votes += 1;
        self.award(caller, VOTE_POINTS);
        Ok(())
    }

    fn approve_message(&mut self, caller: &PrincipalId, id: MessageId) -> Outcome<()> {
        self.admin(caller)?;
        self.message_mut(id)?.approved = true;
        Ok(())
    }

    fn remove_message(&mut self, caller: &PrincipalId, id: MessageId) -> Outcome<()> {
        let is_admin = self.is_admin(caller);
        let message = self.messages.get(&id).ok_or("Message not found")?;
        if !message.removable_by(caller, is_admin) {
            return Err("Permission denied: only the author or an admin can remove this message");
        }
        self.messages.remove(&id);
        self.votes.retain(|(message, _)| *message != id);
        Ok(())
    }

    fn visible_messages(&self) -> Vec<ChatMessage> {
        self.messages.values().filter(|m| m.approved).cloned().collect()
    }

    // Public profiles

    fn save_public_profile(&mut self, caller: &PrincipalId, profile: PublicProfile) -> Outcome<()> {
        self.registered(caller)?;
        let owner = if profile.principal.is_anonymous() {
            caller.clone()
        } else {
            profile.principal.clone()
        };
        let is_admin = self.is_admin(caller);
        if owner != *caller && !is_admin {
            return Err("Only admins can edit other profiles");
        }
        let validated = match self.public_profiles.get(&owner) {
            Some(existing) if !is_admin => existing.validated,
            Some(_) => profile.validated,
            None => is_admin && profile.validated,
        };
        self.public_profiles.insert(
            owner.clone(),
            PublicProfile {
                principal: owner,
                validated,
                events_attended: 0,
                ..profile
            },
        );
        Ok(())
    }

    fn set_profile_validation(&mut self, caller: &PrincipalId, principal: &PrincipalId, validated: bool) -> Outcome<()> {
        self.admin(caller)?;
        self.public_profiles
            .get_mut(principal)
            .ok_or("Profile not found")?
            .validated = validated;
        if validated {
            self.enroll(principal).profile_complete = true;
        }
        Ok(())
    }

    // Leaderboard and statistics

    fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        let mut rows: Vec<LeaderboardEntry> = self
            .users
            .iter()
            .map(|(principal, profile)| LeaderboardEntry {
                principal: principal.clone(),
                points: profile.points,
            })
            .collect();
        rows.sort_by(|a, b| b.points.cmp(&a.points).then_with(|| a.principal.cmp(&b.principal)));
        rows
    }

    fn statistics(&self, caller: &PrincipalId) -> Outcome<Statistics> {
        self.admin(caller)?;
        Ok(Statistics {
            total_users: self.users.len() as u64,
            total_messages: self.messages.len() as u64,
            total_events: self.events.len() as u64,
            total_points: self.users.values().map(|p| p.points).sum(),
        })
    }

    // Roles and approvals

    fn caller_is_admin(&self, caller: &PrincipalId) -> Outcome<bool> {
        if caller.is_anonymous() {
            return Ok(false);
        }
        self.registered(caller)?;
        Ok(self.is_admin(caller))
    }

    fn role(&self, caller: &PrincipalId) -> UserRole {
        if self.is_admin(caller) {
            UserRole::Admin
        } else if self.users.contains_key(caller) {
            UserRole::User
        } else {
            UserRole::Guest
        }
    }

    fn assign_role(&mut self, caller: &PrincipalId, user: &PrincipalId, role: UserRole) -> Outcome<()> {
        self.admin(caller)?;
        match role {
            UserRole::Admin => {
                self.enroll(user);
                self.admins.insert(user.clone());
            }
            UserRole::User => {
                self.enroll(user);
                self.admins.remove(user);
            }
            UserRole::Guest => {
                self.admins.remove(user);
                self.users.remove(user);
            }
        }
        Ok(())
    }

    fn caller_is_approved(&self, caller: &PrincipalId) -> Outcome<bool> {
        self.registered(caller)?;
        Ok(self.is_admin(caller) || self.approvals.get(caller) == Some(&ApprovalStatus::Approved))
    }

    fn request_approval(&mut self, caller: &PrincipalId) -> Outcome<()> {
        self.registered(caller)?;
        self.approvals
            .entry(caller.clone())
            .or_insert(ApprovalStatus::Pending);
        Ok(())
    }

    fn approvals(&self, caller: &PrincipalId) -> Outcome<Vec<UserApprovalInfo>> {
        self.admin(caller)?;
        Ok(self
            .approvals
            .iter()
            .map(|(principal, status)| UserApprovalInfo {
                principal: principal.clone(),
                status: *status,
            })
            .collect())
    }

    fn set_approval(&mut self, caller: &PrincipalId, user: &PrincipalId, status: ApprovalStatus) -> Outcome<()> {
        self.admin(caller)?;
        self.approvals.insert(user.clone(), status);
        Ok(())
    }
}

/// Shared backend state with call accounting and fault injection
#[derive(Default)]
pub struct MemoryStore {
    world: Mutex<World>,
    calls: DashMap<String, u64>,
    latency: DashMap<String, Duration>,
    reply_delay: DashMap<String, Duration>,
    failures: DashMap<String, VecDeque<String>>,
}

impl MemoryStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls made to `op` so far (including failed ones)
    #[must_use]
    pub fn calls(&self, op: &str) -> u64 {
        self.calls.get(op).map_or(0, |n| *n)
    }

    /// Calls per operation
    #[must_use]
    pub fn call_counts(&self) -> BTreeMap<String, u64> {
        self.calls
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    /// Forget call counts
    pub fn reset_calls(&self) {
        self.calls.clear();
    }

    /// Delay every call to `op`
    pub fn set_latency(&self, op: &str, latency: Duration) {
        self.latency.insert(op.to_string(), latency);
    }

    /// Delay replies from `op` after its state has been read
    pub fn set_reply_delay(&self, op: &str, delay: Duration) {
        self.reply_delay.insert(op.to_string(), delay);
    }

    /// Remove injected latency and reply delay from `op`
    pub fn clear_latency(&self, op: &str) {
        self.latency.remove(op);
        self.reply_delay.remove(op);
    }

    /// Fail the next call to `op` with raw backend text
    pub fn fail_next(&self, op: &str, message: &str) {
        self.fail_times(op, 1, message);
    }

    /// Fail the next `times` calls to `op`
    pub fn fail_times(&self, op: &str, times: usize, message: &str) {
        let mut queue = self.failures.entry(op.to_string()).or_default();
        queue.extend(std::iter::repeat(message.to_string()).take(times));
    }

    /// Drop pending injected failures
    pub fn clear_failures(&self) {
        self.failures.clear();
    }

    async fn enter(&self, op: &str) -> BackendResult<()> {
        *self.calls.entry(op.to_string()).or_default() += 1;
        let latency = self.latency.get(op).map(|l| *l);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let injected = self.failures.get_mut(op).and_then(|mut q| q.pop_front());
        match injected {
            Some(message) => {
                tracing::debug!(op, %message, "injected failure");
                Err(BackendError::classify(message))
            }
            None => Ok(()),
        }
    }

    // Seeding and inspection

    /// Register `principal` with a display name
    pub fn register(&self, principal: &PrincipalId, display_name: &str) {
        self.world.lock().enroll(principal).display_name = display_name.to_string();
    }

    /// Register `principal` and mark onboarding and profile complete
    pub fn seed_member(&self, principal: &PrincipalId, display_name: &str) {
        let mut world = self.world.lock();
        let profile = world.enroll(principal);
        profile.display_name = display_name.to_string();
        profile.profile_complete = true;
        profile.onboarding_complete = true;
    }

    /// Register `principal` as an onboarded admin
    pub fn grant_admin(&self, principal: &PrincipalId) {
        self.seed_member(principal, "admin");
        self.world.lock().admins.insert(principal.clone());
    }

    /// Insert a message directly
    pub fn seed_message(&self, author: &PrincipalId, content: &str, approved: bool) -> MessageId {
        let mut world = self.world.lock();
        world.next_message += 1;
        let id = MessageId(world.next_message);
        let timestamp = world.tick();
        world.messages.insert(
            id,
            ChatMessage {
                id,
                content: content.to_string(),
                votes: 0,
                author: author.clone(),
                approved,
                timestamp,
            },
        );
        id
    }

    /// Insert an event directly
    pub fn seed_event(&self, draft: EventDraft) -> EventId {
        let mut world = self.world.lock();
        world.next_event += 1;
        let id = EventId(world.next_event);
        world.events.insert(
            id,
            Event {
                id,
                title: draft.title,
                description: draft.description,
                date: draft.date,
                location: draft.location,
                rsvp_count: 0,
                not_attending_count: 0,
            },
        );
        id
    }

    /// Stored private profile
    #[must_use]
    pub fn profile(&self, principal: &PrincipalId) -> Option<PrivateUserProfile> {
        self.world.lock().users.get(principal).cloned()
    }

    /// Stored message
    #[must_use]
    pub fn message(&self, id: MessageId) -> Option<ChatMessage> {
        self.world.lock().messages.get(&id).cloned()
    }

    /// Stored event
    #[must_use]
    pub fn event(&self, id: EventId) -> Option<Event> {
        self.world.lock().events.get(&id).cloned()
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let world = self.world.lock();
        f.debug_struct("MemoryStore")
            .field("users", &world.users.len())
            .field("messages", &world.messages.len())
            .field("events", &world.events.len())
            .finish_non_exhaustive()
    }
}

/// One caller's connection to a [`MemoryStore`]
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    store: Arc<MemoryStore>,
    caller: PrincipalId,
}

impl MemoryBackend {
    /// Bind `caller` to `store`
    #[must_use]
    pub fn new(store: Arc<MemoryStore>, caller: PrincipalId) -> Self {
        Self { store, caller }
    }

    /// Bound caller
    #[must_use]
    pub fn caller(&self) -> &PrincipalId {
        &self.caller
    }

    async fn call<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut World, &PrincipalId) -> Outcome<T> + Send,
    ) -> BackendResult<T> {
        self.store.enter(op).await?;
        let outcome = {
            let mut world = self.store.world.lock();
            f(&mut world, &self.caller).map_err(BackendError::classify)
        };
        let delay = self.store.reply_delay.get(op).map(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        outcome
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn register_user(&self) -> BackendResult<()> {
        self.call("register_user", |w, caller| w.register_user(caller)).await
    }

    async fn complete_onboarding(&self) -> BackendResult<()> {
        self.call("complete_onboarding", |w, caller| w.complete_onboarding(caller))
            .await
    }

    async fn get_caller_user_profile(&self) -> BackendResult<Option<PrivateUserProfile>> {
        self.call("get_caller_user_profile", |w, caller| w.caller_profile(caller))
            .await
    }

    async fn save_caller_user_profile(&self, profile: PrivateUserProfile) -> BackendResult<()> {
        self.call("save_caller_user_profile", |w, caller| w.save_profile(caller, profile))
            .await
    }

    async fn get_user_profile(&self, user: PrincipalId) -> BackendResult<Option<PrivateUserProfile>> {
        self.call("get_user_profile", |w, caller| w.user_profile(caller, &user))
            .await
    }

    async fn list_events(&self) -> BackendResult<Vec<Event>> {
        self.call("list_events", |w, _| Ok(w.events.values().cloned().collect()))
            .await
    }

    async fn get_popular_events(&self) -> BackendResult<Vec<Event>> {
        self.call("get_popular_events", |w, _| Ok(w.popular_events()))
            .await
    }

    async fn get_event(&self, id: EventId) -> BackendResult<Event> {
        self.call("get_event", |w, _| w.events.get(&id).cloned().ok_or("Event not found"))
            .await
    }

    async fn create_event(&self, draft: EventDraft) -> BackendResult<EventId> {
        self.call("create_event", |w, caller| w.create_event(caller, draft))
            .await
    }

    async fn update_event(&self, id: EventId, draft: EventDraft) -> BackendResult<()> {
        self.call("update_event", |w, caller| w.update_event(caller, id, draft))
            .await
    }

    async fn delete_event(&self, id: EventId) -> BackendResult<()> {
        self.call("delete_event", |w, caller| w.delete_event(caller, id))
            .await
    }

    async fn rsvp_to_event(&self, id: EventId, attending: bool) -> BackendResult<()> {
        self.call("rsvp_to_event", |w, caller| w.rsvp(caller, id, attending))
            .await
    }

    async fn count_validated_events(&self, principal: PrincipalId) -> BackendResult<u64> {
        self.call("count_validated_events", |w, _| Ok(w.attended(&principal)))
            .await
    }

    async fn post_message(&self, content: String) -> BackendResult<MessageId> {
        self.call("post_message", |w, caller| w.post_message(caller, content))
            .await
    }

    async fn vote_message(&self, id: MessageId) -> BackendResult<()> {
        self.call("vote_message", |w, caller| w.vote_message(caller, id))
            .await
    }

    async fn approve_message(&self, id: MessageId) -> BackendResult<()> {
        self.call("approve_message", |w, caller| w.approve_message(caller, id))
            .await
    }

    async fn remove_message(&self, id: MessageId) -> BackendResult<()> {
        self.call("remove_message", |w, caller| w.remove_message(caller, id))
            .await
    }

    async fn get_visible_messages(&self) -> BackendResult<Vec<ChatMessage>> {
        self.call("get_visible_messages", |w, _| Ok(w.visible_messages()))
            .await
    }

    async fn get_all_messages(&self) -> BackendResult<Vec<ChatMessage>> {
        self.call("get_all_messages", |w, caller| {
            w.admin(caller)?;
            Ok(w.messages.values().cloned().collect())
        })
        .await
    }

    async fn list_public_profiles(&self) -> BackendResult<Vec<PublicProfile>> {
        self.call("list_public_profiles", |w, _| {
            Ok(w.public_profiles.values().map(|p| w.public_view(p)).collect())
        })
        .await
    }

    async fn list_public_profiles_by_validation(
        &self,
        validated: bool,
    ) -> BackendResult<Vec<PublicProfile>> {
        self.call("list_public_profiles_by_validation", |w, _| {
            Ok(w.public_profiles
                .values()
                .filter(|p| p.validated == validated)
                .map(|p| w.public_view(p))
                .collect())
        })
        .await
    }

    async fn get_public_profile(&self, principal: PrincipalId) -> BackendResult<PublicProfile> {
        self.call("get_public_profile", |w, _| {
            w.public_profiles
                .get(&principal)
                .map(|p| w.public_view(p))
                .ok_or("Profile not found")
        })
        .await
    }

    async fn get_own_public_profile(&self) -> BackendResult<Option<PublicProfile>> {
        self.call("get_own_public_profile", |w, caller| {
            if caller.is_anonymous() {
                return Err(ANONYMOUS_CALLER);
            }
            Ok(w.public_profiles.get(caller).map(|p| w.public_view(p)))
        })
        .await
    }

    async fn create_or_update_public_profile(&self, profile: PublicProfile) -> BackendResult<()> {
        self.call("create_or_update_public_profile", |w, caller| {
            w.save_public_profile(caller, profile)
        })
        .await
    }

    async fn set_profile_validation(
        &self,
        principal: PrincipalId,
        validated: bool,
    ) -> BackendResult<()> {
        self.call("set_profile_validation", |w, caller| {
            w.set_profile_validation(caller, &principal, validated)
        })
        .await
    }

    async fn get_leaderboard(&self) -> BackendResult<Vec<LeaderboardEntry>> {
        self.call("get_leaderboard", |w, _| Ok(w.leaderboard())).await
    }

    async fn get_statistics(&self) -> BackendResult<Statistics> {
        self.call("get_statistics", |w, caller| w.statistics(caller)).await
    }

    async fn is_caller_admin(&self) -> BackendResult<bool> {
        self.call("is_caller_admin", |w, caller| w.caller_is_admin(caller))
            .await
    }

    async fn get_caller_user_role(&self) -> BackendResult<UserRole> {
        self.call("get_caller_user_role", |w, caller| Ok(w.role(caller)))
            .await
    }

    async fn assign_caller_user_role(&self, user: PrincipalId, role: UserRole) -> BackendResult<()> {
        self.call("assign_caller_user_role", |w, caller| w.assign_role(caller, &user, role))
            .await
    }

    async fn is_caller_approved(&self) -> BackendResult<bool> {
        self.call("is_caller_approved", |w, caller| w.caller_is_approved(caller))
            .await
    }

    async fn request_approval(&self) -> BackendResult<()> {
        self.call("request_approval", |w, caller| w.request_approval(caller))
            .await
    }

    async fn list_approvals(&self) -> BackendResult<Vec<UserApprovalInfo>> {
        self.call("list_approvals", |w, caller| w.approvals(caller)).await
    }

    async fn set_approval(&self, user: PrincipalId, status: ApprovalStatus) -> BackendResult<()> {
        self.call("set_approval", |w, caller| w.set_approval(caller, &user, status))
            .await
    }
}

/// Connector over a shared [`MemoryStore`]
///
/// Connection attempts are counted under [`CONNECT`] and obey injected
/// latency and failures like any procedure.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    store: Arc<MemoryStore>,
}

impl MemoryConnector {
    /// Connector over `store`
    #[must_use]
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    /// Shared store
    #[must_use]
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Backend bound to `identity` (anonymous when `None`), bypassing accounting
    #[must_use]
    pub fn backend_for(&self, identity: Option<&Identity>) -> Arc<dyn Backend> {
        let caller = identity.map_or_else(PrincipalId::anonymous, |i| i.principal().clone());
        Arc::new(MemoryBackend::new(self.store.clone(), caller))
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, identity: Option<Identity>) -> Result<Arc<dyn Backend>, BackendError> {
        self.store.enter(CONNECT).await?;
        Ok(self.backend_for(identity.as_ref()))
    }
}
