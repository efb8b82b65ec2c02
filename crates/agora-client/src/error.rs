//! Error types for the client layer

use crate::handle::HandleKey;
use agora_cache::CacheError;
use agora_core::{BackendError, ErrorKind};

/// Errors while building a connection handle
#[derive(Debug, Clone, thiserror::Error)]
pub enum HandleError {
    /// Every construction attempt failed
    #[error("connection for {key} failed after {attempts} attempt(s): {source}")]
    Construction {
        /// Identity key
        key: HandleKey,
        /// Attempts made
        attempts: u32,
        /// Last failure
        #[source]
        source: BackendError,
    },
}

impl HandleError {
    /// Identity key the failure belongs to
    #[inline]
    #[must_use]
    pub fn key(&self) -> &HandleKey {
        let Self::Construction { key, .. } = self;
        key
    }

    /// Check if a manual retry may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        let Self::Construction { source, .. } = self;
        source.is_retryable()
    }
}

/// Errors surfaced to presentation code
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// No connection handle yet
    #[error("backend connection not available")]
    NotReady,

    /// Backend rejected or failed the call
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Cache layer error
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Connection handle error
    #[error(transparent)]
    Handle(#[from] HandleError),
}

impl ClientError {
    /// Underlying backend error, if any
    #[must_use]
    pub fn backend(&self) -> Option<&BackendError> {
        match self {
            Self::Backend(e) | Self::Handle(HandleError::Construction { source: e, .. }) => Some(e),
            Self::Cache(e) => e.backend(),
            _ => None,
        }
    }

    /// Backend error kind, if any
    #[inline]
    #[must_use]
    pub fn kind(&self) -> Option<ErrorKind> {
        self.backend().map(BackendError::kind)
    }

    /// Check if retrying may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NotReady => true,
            Self::Handle(e) => e.is_retryable(),
            _ => self.backend().is_some_and(BackendError::is_retryable),
        }
    }
}

/// Result type alias for client operations
pub type ClientResult<T> = Result<T, ClientError>;
