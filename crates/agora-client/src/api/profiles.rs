//! Private and public profiles

use crate::client::CommunityClient;
use crate::error::ClientResult;
use crate::keys;
use crate::query::Query;
use agora_core::{PrincipalId, PrivateUserProfile, PublicProfile};

impl CommunityClient {
    /// Caller's private profile
    ///
    /// Gated on an authenticated caller. An unregistered caller reads as
    /// `None` rather than an error.
    #[must_use]
    pub fn current_user_profile(&self) -> Query<Option<PrivateUserProfile>> {
        self.query(
            keys::current_user_profile(),
            self.authenticated().absence_as_empty(),
            |backend| async move { backend.get_caller_user_profile().await },
        )
    }

    /// Another member's private profile (admin)
    #[must_use]
    pub fn user_profile(&self, principal: &PrincipalId) -> Query<Option<PrivateUserProfile>> {
        let user = principal.clone();
        self.query(keys::user_profile(principal), self.connected(), move |backend| {
            let user = user.clone();
            async move { backend.get_user_profile(user).await }
        })
    }

    /// Community directory
    #[must_use]
    pub fn public_profiles(&self) -> Query<Vec<PublicProfile>> {
        self.query(keys::public_profiles(), self.connected(), |backend| async move {
            backend.list_public_profiles().await
        })
    }

    /// Directory filtered by admin validation
    #[must_use]
    pub fn public_profiles_by_validation(&self, validated: bool) -> Query<Vec<PublicProfile>> {
        self.query(
            keys::public_profiles_by_validation(validated),
            self.connected(),
            move |backend| async move { backend.list_public_profiles_by_validation(validated).await },
        )
    }

    /// One member's public profile
    #[must_use]
    pub fn public_profile(&self, principal: &PrincipalId) -> Query<PublicProfile> {
        let owner = principal.clone();
        self.query(keys::public_profile(principal), self.connected(), move |backend| {
            let owner = owner.clone();
            async move { backend.get_public_profile(owner).await }
        })
    }

    /// Caller's own public profile, `None` until created
    #[must_use]
    pub fn own_public_profile(&self) -> Query<Option<PublicProfile>> {
        self.query(
            keys::own_public_profile(),
            self.authenticated().absence_as_empty(),
            |backend| async move { backend.get_own_public_profile().await },
        )
    }

    /// Create or update the caller's public profile
    ///
    /// # Errors
    /// `ClientError::NotReady` without a connection, or the backend rejection.
    pub async fn save_public_profile(&self, profile: PublicProfile) -> ClientResult<()> {
        let backend = self.backend()?;
        self.write(
            "createOrUpdatePublicProfile",
            &[keys::public_profiles(), keys::public_profile_root()],
            backend.create_or_update_public_profile(profile),
        )
        .await
    }

    /// Mark a member's public profile validated or not (admin)
    ///
    /// # Errors
    /// `ClientError::NotReady` without a connection, or the backend rejection.
    pub async fn set_profile_validation(&self, principal: PrincipalId, validated: bool) -> ClientResult<()> {
        let backend = self.backend()?;
        self.write(
            "setProfileValidation",
            &[
                keys::public_profiles(),
                keys::public_profile_root(),
                keys::current_user_profile(),
            ],
            backend.set_profile_validation(principal, validated),
        )
        .await
    }
}
