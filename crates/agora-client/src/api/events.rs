//! Community events and RSVPs

use crate::client::CommunityClient;
use crate::error::ClientResult;
use crate::keys;
use crate::query::Query;
use agora_core::{Event, EventDraft, EventId, PrincipalId};

impl CommunityClient {
    /// Every event
    #[must_use]
    pub fn events(&self) -> Query<Vec<Event>> {
        self.query(keys::events(), self.connected(), |backend| async move {
            backend.list_events().await
        })
    }

    /// Most attended events
    #[must_use]
    pub fn popular_events(&self) -> Query<Vec<Event>> {
        self.query(keys::popular_events(), self.connected(), |backend| async move {
            backend.get_popular_events().await
        })
    }

    /// One event; RSVP counts are polled while observed
    #[must_use]
    pub fn event(&self, id: EventId) -> Query<Event> {
        self.query(keys::event(id), self.live(), move |backend| async move {
            backend.get_event(id).await
        })
    }

    /// Validated events attended by `principal`
    #[must_use]
    pub fn validated_event_count(&self, principal: &PrincipalId) -> Query<u64> {
        let owner = principal.clone();
        self.query(keys::validated_events(principal), self.connected(), move |backend| {
            let owner = owner.clone();
            async move { backend.count_validated_events(owner).await }
        })
    }

    /// Create an event (admin)
    ///
    /// # Errors
    /// `ClientError::NotReady` without a connection, or the backend rejection.
    pub async fn create_event(&self, draft: EventDraft) -> ClientResult<EventId> {
        let backend = self.backend()?;
        self.write("createEvent", &[keys::events()], backend.create_event(draft))
            .await
    }

    /// Edit an event (admin)
    ///
    /// # Errors
    /// `ClientError::NotReady` without a connection, or the backend rejection.
    pub async fn update_event(&self, id: EventId, draft: EventDraft) -> ClientResult<()> {
        let backend = self.backend()?;
        self.write(
            "updateEvent",
            &[keys::events(), keys::event_root()],
            backend.update_event(id, draft),
        )
        .await
    }

    /// Delete an event (admin)
    ///
    /// # Errors
    /// `ClientError::NotReady` without a connection, or the backend rejection.
    pub async fn delete_event(&self, id: EventId) -> ClientResult<()> {
        let backend = self.backend()?;
        self.write("deleteEvent", &[keys::events()], backend.delete_event(id))
            .await
    }

    /// Answer an event invitation
    ///
    /// # Errors
    /// `ClientError::NotReady` without a connection, or the backend rejection
    /// (`ErrorKind::AlreadyResponded` on a second answer).
    pub async fn rsvp(&self, id: EventId, attending: bool) -> ClientResult<()> {
        let backend = self.backend()?;
        self.write(
            "rsvpToEvent",
            &[keys::event_root(), keys::events()],
            backend.rsvp_to_event(id, attending),
        )
        .await
    }
}
