//! Registration and onboarding

use crate::client::CommunityClient;
use crate::error::ClientResult;
use crate::keys;
use agora_core::PrivateUserProfile;

impl CommunityClient {
    /// Register the caller as a community member
    ///
    /// # Errors
    /// `ClientError::NotReady` without a connection, or the backend rejection.
    pub async fn register_user(&self) -> ClientResult<()> {
        let backend = self.backend()?;
        self.write("registerUser", &[keys::current_user_profile()], backend.register_user())
            .await
    }

    /// Mark onboarding complete
    ///
    /// # Errors
    /// `ClientError::NotReady` without a connection, or the backend rejection.
    pub async fn complete_onboarding(&self) -> ClientResult<()> {
        let backend = self.backend()?;
        self.write(
            "completeOnboarding",
            &[keys::current_user_profile()],
            backend.complete_onboarding(),
        )
        .await
    }

    /// Save the caller's private profile
    ///
    /// # Errors
    /// `ClientError::NotReady` without a connection, or the backend rejection.
    pub async fn save_profile(&self, profile: PrivateUserProfile) -> ClientResult<()> {
        let backend = self.backend()?;
        self.write(
            "saveCallerUserProfile",
            &[keys::current_user_profile()],
            backend.save_caller_user_profile(profile),
        )
        .await
    }
}
