//! Agora Client
//!
//! Initialization and data-synchronization core of the Agora community client.
//!
//! # Layers
//!
//! - [`IdentityAdapter`]: Current identity and login status as a watch channel
//! - [`HandleManager`]: One backend connection per identity, built once and
//!   shared; anonymous handles skip the admin probe
//! - [`QueryCache`](agora_cache::QueryCache): Keyed server state with retries,
//!   polling and optimistic writes
//! - [`Watchdog`]: Flags auth, connection and profile stages that stall past
//!   their thresholds
//! - [`CommunityClient`]: Wires the above together and exposes domain queries
//!   and mutations
//!
//! # Example
//!
//! ```rust,ignore
//! use agora_client::{CommunityClient, IdentityAdapter};
//!
//! let auth = IdentityAdapter::initializing();
//! let client = CommunityClient::with_defaults(connector, auth.clone());
//! auth.bootstrap_finished(stored_identity);
//!
//! client.wait_ready().await?;
//! let messages = client.visible_messages().subscribe();
//! client.post_message("hello").await?;
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod api;
pub mod auth;
pub mod client;
pub mod error;
pub mod guard;
pub mod handle;
pub mod keys;
pub mod query;
pub mod telemetry;
pub mod watchdog;

pub use auth::{AuthSnapshot, IdentityAdapter, LoginStatus};
pub use client::CommunityClient;
pub use error::{ClientError, ClientResult, HandleError};
pub use guard::AccessDecision;
pub use handle::{ConnectionHandle, HandleKey, HandleManager, HandleStatus, ProbeOutcome};
pub use query::Query;
pub use telemetry::init_tracing;
pub use watchdog::{Notice, Severity, Stage, StageInputs, StageStatus, Watchdog, WatchdogReport};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for client consumers
    pub use crate::{
        AccessDecision, AuthSnapshot, ClientError, ClientResult, CommunityClient, HandleStatus,
        IdentityAdapter, Query, Stage, WatchdogReport,
    };
    pub use agora_cache::{QueryState, Subscription};
}
