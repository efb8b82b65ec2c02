//! Error types for backend calls
//!
//! The backend reports failures as free text. That text is classified exactly
//! once, at the RPC boundary, into an [`ErrorKind`]; everything above this
//! crate matches on the kind and never re-parses the message.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured classification of a backend failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Infrastructure failure (network, timeout, replica unavailable)
    Transient,
    /// Caller has no registered profile (anonymous / unregistered / unauthorized)
    NotRegistered,
    /// Caller already voted on the message
    AlreadyVoted,
    /// Caller already responded to the event
    AlreadyResponded,
    /// Other business or validation rejection
    Rejected,
}

impl ErrorKind {
    /// Check if the kind signals an expected absence rather than a failure
    #[inline]
    #[must_use]
    pub fn is_expected_absence(self) -> bool {
        matches!(self, Self::NotRegistered)
    }

    /// Check if the kind is worth retrying automatically
    #[inline]
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Stable lowercase name
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::NotRegistered => "not_registered",
            Self::AlreadyVoted => "already_voted",
            Self::AlreadyResponded => "already_responded",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const ABSENCE_MARKERS: &[&str] = &[
    "must be registered",
    "not registered",
    "anonymous",
    "unauthorized",
];

const REJECTION_MARKERS: &[&str] = &[
    "not found",
    "only admins",
    "permission",
    "invalid",
    "does not exist",
];

/// Failure returned by a backend procedure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct BackendError {
    kind: ErrorKind,
    message: String,
}

impl BackendError {
    /// Create error with an explicit kind
    #[inline]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Classify raw backend error text
    ///
    /// Unrecognised text is treated as transient.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        let kind = if ABSENCE_MARKERS.iter().any(|m| lower.contains(m)) {
            ErrorKind::NotRegistered
        } else if lower.contains("already voted") {
            ErrorKind::AlreadyVoted
        } else if lower.contains("already responded") {
            ErrorKind::AlreadyResponded
        } else if REJECTION_MARKERS.iter().any(|m| lower.contains(m)) {
            ErrorKind::Rejected
        } else {
            ErrorKind::Transient
        };

        Self { kind, message }
    }

    /// Transient failure with message
    #[inline]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    /// Get classification
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Get raw message
    #[inline]
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Result type alias for backend procedures
pub type BackendResult<T> = Result<T, BackendError>;
