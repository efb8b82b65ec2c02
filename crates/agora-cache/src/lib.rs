//! Agora Query Cache
//!
//! Process-wide cache of server-derived values keyed by semantic keys.
//!
//! # Core Concepts
//!
//! - [`QueryKey`]: Ordered key segments; invalidation matches by prefix
//! - [`QueryCache`]: Explicit service handle shared by every consumer
//! - [`FetchOptions`]: Retry policy, poll interval, readiness gate, absence handling
//! - [`QueryState`]: `{data, is_loading, is_fetching, is_error, error}` snapshot
//! - [`Subscription`]: Observer that refetches on invalidation and polls
//! - [`OptimisticUpdate`]: Patch applied before the server confirms a write
//!
//! # Example
//!
//! ```rust,ignore
//! use agora_cache::{QueryCache, QueryKey};
//!
//! let cache = QueryCache::default();
//! let key = QueryKey::new("leaderboard");
//! let rows = cache.fetch(&key, move || backend.get_leaderboard(), &cache.options()).await?;
//!
//! // After a write
//! cache.invalidate(&key);
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod cache;
mod error;
mod key;
mod mutation;
mod options;
mod state;
mod subscription;

pub use cache::{fetcher, Fetcher, QueryCache};
pub use error::{CacheError, CacheResult};
pub use key::QueryKey;
pub use mutation::{MutationState, MutationStatus, MutationTracker, OptimisticUpdate};
pub use options::{FetchOptions, Readiness, RetryPolicy};
pub use state::{CacheStats, QueryState};
pub use subscription::Subscription;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for cache consumers
    pub use crate::{
        CacheError, CacheResult, FetchOptions, OptimisticUpdate, QueryCache, QueryKey, QueryState,
        Subscription,
    };
}
