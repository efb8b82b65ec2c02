//! Moderated community chat

use crate::client::CommunityClient;
use crate::error::ClientResult;
use crate::keys;
use crate::query::Query;
use agora_cache::OptimisticUpdate;
use agora_core::{ChatMessage, MessageId};

impl CommunityClient {
    /// Approved messages, polled while observed
    #[must_use]
    pub fn visible_messages(&self) -> Query<Vec<ChatMessage>> {
        self.query(keys::visible_messages(), self.live(), |backend| async move {
            backend.get_visible_messages().await
        })
    }

    /// Every message including unapproved ones, polled while observed
    #[must_use]
    pub fn all_messages(&self) -> Query<Vec<ChatMessage>> {
        self.query(keys::all_messages(), self.live(), |backend| async move {
            backend.get_all_messages().await
        })
    }

    /// Post a message
    ///
    /// # Errors
    /// `ClientError::NotReady` without a connection, or the backend rejection.
    pub async fn post_message(&self, content: impl Into<String>) -> ClientResult<MessageId> {
        let backend = self.backend()?;
        self.write(
            "postMessage",
            &[keys::messages(), keys::current_user_profile()],
            backend.post_message(content.into()),
        )
        .await
    }

    /// Upvote a message
    ///
    /// The vote shows immediately and is withdrawn if the backend refuses it
    /// (e.g. `ErrorKind::AlreadyVoted`).
    ///
    /// # Errors
    /// `ClientError::NotReady` without a connection, or the backend rejection.
    pub async fn vote_message(&self, id: MessageId) -> ClientResult<()> {
        let backend = self.backend()?;
        let update = OptimisticUpdate::new(move |messages: &Vec<ChatMessage>| {
            messages
                .iter()
                .cloned()
                .map(|mut m| {
                    if m.id == id {
                        m.votes += 1;
                    }
                    m
                })
                .collect()
        })
        .target(keys::visible_messages())
        .target(keys::all_messages());
        self.write_optimistic(
            "voteMessage",
            update,
            &[keys::current_user_profile()],
            backend.vote_message(id),
        )
        .await
    }

    /// Approve a message for public display (admin)
    ///
    /// # Errors
    /// `ClientError::NotReady` without a connection, or the backend rejection.
    pub async fn approve_message(&self, id: MessageId) -> ClientResult<()> {
        let backend = self.backend()?;
        self.write("approveMessage", &[keys::messages()], backend.approve_message(id))
            .await
    }

    /// Remove a message
    ///
    /// The message disappears from both lists at once and is restored if the
    /// backend refuses the removal.
    ///
    /// # Errors
    /// `ClientError::NotReady` without a connection, or the backend rejection.
    pub async fn remove_message(&self, id: MessageId) -> ClientResult<()> {
        let backend = self.backend()?;
        let update = OptimisticUpdate::new(move |messages: &Vec<ChatMessage>| {
            messages.iter().filter(|m| m.id != id).cloned().collect()
        })
        .target(keys::visible_messages())
        .target(keys::all_messages());
        self.write_optimistic("removeMessage", update, &[], backend.remove_message(id))
            .await
    }

    /// Check if the caller may remove `message` (its author, or an admin)
    #[must_use]
    pub fn can_remove_message(&self, message: &ChatMessage) -> bool {
        let Some(principal) = self.auth().snapshot().principal().cloned() else {
            return false;
        };
        let is_admin = self.is_admin().state().data.is_some_and(|admin| *admin);
        message.removable_by(&principal, is_admin)
    }
}
