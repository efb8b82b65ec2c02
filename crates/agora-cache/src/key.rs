//! Semantic cache keys
//!
//! A key is an ordered list of segments, e.g. `messages/visible` or
//! `event/7`. Invalidation matches by prefix, so `event` covers every
//! `event/<id>` entry.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Semantic identifier for a cached value
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    /// Create single-segment key
    #[inline]
    #[must_use]
    pub fn new(root: impl Into<String>) -> Self {
        Self(vec![root.into()])
    }

    /// Empty key, a prefix of every key
    #[inline]
    #[must_use]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Create key from segments
    #[must_use]
    pub fn from_parts<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    /// Append a segment
    #[inline]
    #[must_use]
    pub fn with(mut self, part: impl ToString) -> Self {
        self.0.push(part.to_string());
        self
    }

    /// Get segments
    #[inline]
    #[must_use]
    pub fn parts(&self) -> &[String] {
        &self.0
    }

    /// Number of segments
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if key has no segments
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check if `prefix` matches the leading segments of this key
    ///
    /// The empty key is a prefix of every key.
    #[inline]
    #[must_use]
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

impl From<&str> for QueryKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
