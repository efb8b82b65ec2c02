//! Agora Core
//!
//! Shared vocabulary for the Agora client layers:
//! - Domain entities returned by the community backend (messages, events, profiles)
//! - The `Backend` RPC surface and the `Connector` that binds it to an identity
//! - Structured error kinds, classified once at the RPC edge
//! - Client configuration
//!
//! # Architecture
//!
//! ```text
//! IdentityAdapter → HandleManager → QueryCache → Mutations → Watchdog
//!                        │
//!                        └── Connector::connect(identity) → Arc<dyn Backend>
//! ```
//!
//! Nothing in this crate holds runtime state; it is the contract every other
//! crate builds on.

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod backend;
pub mod config;
pub mod display;
pub mod error;
pub mod types;

pub use backend::{Backend, Connector};
pub use config::{
    CacheConfig, ClientConfig, ConfigError, HandleConfig, LogConfig, RetryConfig, WatchdogConfig,
};
pub use error::{BackendError, BackendResult, ErrorKind};
pub use types::{
    ApprovalStatus, ChatMessage, Event, EventDraft, EventId, Identity, LeaderboardEntry, MessageId,
    PrincipalId, PrivateUserProfile, PublicProfile, RequestId, Statistics, UserApprovalInfo,
    UserRole,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with Agora domain types
    pub use crate::backend::{Backend, Connector};
    pub use crate::config::ClientConfig;
    pub use crate::error::{BackendError, BackendResult, ErrorKind};
    pub use crate::types::{
        ChatMessage, Event, EventId, Identity, MessageId, PrincipalId, PrivateUserProfile,
        PublicProfile,
    };
}
