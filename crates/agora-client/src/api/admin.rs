//! Roles and the approval workflow

use crate::client::CommunityClient;
use crate::error::ClientResult;
use crate::keys;
use crate::query::Query;
use agora_core::{ApprovalStatus, PrincipalId, UserApprovalInfo, UserRole};

impl CommunityClient {
    /// Caller holds the admin role (`false` for unregistered callers)
    #[must_use]
    pub fn is_admin(&self) -> Query<bool> {
        self.query(
            keys::is_admin(),
            self.connected().absence_as_empty(),
            |backend| async move { backend.is_caller_admin().await },
        )
    }

    /// Caller role
    #[must_use]
    pub fn user_role(&self) -> Query<UserRole> {
        self.query(keys::user_role(), self.connected(), |backend| async move {
            backend.get_caller_user_role().await
        })
    }

    /// Caller approval flag (`false` for unregistered callers)
    #[must_use]
    pub fn is_approved(&self) -> Query<bool> {
        self.query(
            keys::is_approved(),
            self.authenticated().absence_as_empty(),
            |backend| async move { backend.is_caller_approved().await },
        )
    }

    /// Approval queue (admin)
    #[must_use]
    pub fn approvals(&self) -> Query<Vec<UserApprovalInfo>> {
        self.query(keys::approvals(), self.connected(), |backend| async move {
            backend.list_approvals().await
        })
    }

    /// Grant `role` to `user` (admin)
    ///
    /// # Errors
    /// `ClientError::NotReady` without a connection, or the backend rejection.
    pub async fn assign_role(&self, user: PrincipalId, role: UserRole) -> ClientResult<()> {
        let backend = self.backend()?;
        self.write(
            "assignCallerUserRole",
            &[keys::is_admin(), keys::user_role(), keys::approvals()],
            backend.assign_caller_user_role(user, role),
        )
        .await
    }

    /// Ask an admin to approve the caller
    ///
    /// # Errors
    /// `ClientError::NotReady` without a connection, or the backend rejection.
    pub async fn request_approval(&self) -> ClientResult<()> {
        let backend = self.backend()?;
        self.write(
            "requestApproval",
            &[keys::is_approved(), keys::approvals()],
            backend.request_approval(),
        )
        .await
    }

    /// Decide an approval request (admin)
    ///
    /// # Errors
    /// `ClientError::NotReady` without a connection, or the backend rejection.
    pub async fn set_approval(&self, user: PrincipalId, status: ApprovalStatus) -> ClientResult<()> {
        let backend = self.backend()?;
        self.write("setApproval", &[keys::approvals()], backend.set_approval(user, status))
            .await
    }
}
