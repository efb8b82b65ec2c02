//! Client configuration
//!
//! All timing knobs live here so tests can shrink them and deployments can
//! override them from a TOML file. Every section has a `Default` matching the
//! production values.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Errors loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO error reading the file
    #[error("io error reading {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// TOML did not match the schema
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Values parsed but are inconsistent
    #[error("invalid configuration value: {0}")]
    Invalid(String),
}

/// Top-level client configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Connection handle manager
    pub handle: HandleConfig,
    /// Query cache
    pub cache: CacheConfig,
    /// Initialization watchdog
    pub watchdog: WatchdogConfig,
    /// Logging
    pub log: LogConfig,
}

impl ClientConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from TOML text
    ///
    /// # Errors
    /// - `ConfigError::Parse` on malformed TOML
    /// - `ConfigError::Invalid` on inconsistent values
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// Returns `ConfigError::Io` if the file cannot be read, otherwise as
    /// [`ClientConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "loaded client configuration");
        Ok(config)
    }

    /// Check cross-field consistency
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` describing the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "cache.poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.cache.retry.base_delay_ms > self.cache.retry.max_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "cache.retry.base_delay_ms ({}) exceeds max_delay_ms ({})",
                self.cache.retry.base_delay_ms, self.cache.retry.max_delay_ms
            )));
        }
        if self.handle.max_identities == 0 {
            return Err(ConfigError::Invalid(
                "handle.max_identities must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// With handle configuration
    #[inline]
    #[must_use]
    pub fn with_handle(mut self, handle: HandleConfig) -> Self {
        self.handle = handle;
        self
    }

    /// With cache configuration
    #[inline]
    #[must_use]
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// With watchdog configuration
    #[inline]
    #[must_use]
    pub fn with_watchdog(mut self, watchdog: WatchdogConfig) -> Self {
        self.watchdog = watchdog;
        self
    }
}

/// Connection handle manager settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandleConfig {
    /// Background admin probe timeout
    pub probe_timeout_ms: u64,
    /// Automatic retries after a failed construction
    pub construction_retries: u32,
    /// Identities kept in the handle cache
    pub max_identities: u64,
}

impl HandleConfig {
    /// Probe timeout as duration
    #[inline]
    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl Default for HandleConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 5_000,
            construction_retries: 1,
            max_identities: 16,
        }
    }
}

/// Query cache settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Poll interval for live entries
    pub poll_interval_ms: u64,
    /// Default retry policy
    pub retry: RetryConfig,
}

impl CacheConfig {
    /// Poll interval as duration
    #[inline]
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            retry: RetryConfig::default(),
        }
    }
}

/// Bounded exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// First backoff delay
    pub base_delay_ms: u64,
    /// Backoff ceiling
    pub max_delay_ms: u64,
}

impl RetryConfig {
    /// No automatic retries
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 1_000,
            max_delay_ms: 5_000,
        }
    }
}

/// Per-stage slow thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Identity provider bootstrap
    pub auth_ms: u64,
    /// Connection handle construction
    pub connection_ms: u64,
    /// Caller profile fetch
    pub profile_ms: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            auth_ms: 3_000,
            connection_ms: 4_000,
            profile_ms: 5_000,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG`
    pub filter: String,
    /// Emit JSON lines
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn defaults_match_production_values() {
        let config = ClientConfig::default();
        assert_eq!(config.handle.probe_timeout(), Duration::from_secs(5));
        assert_eq!(config.handle.construction_retries, 1);
        assert_eq!(config.cache.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.cache.retry.max_retries, 2);
        assert_eq!(config.watchdog.auth_ms, 3_000);
        assert_eq!(config.watchdog.connection_ms, 4_000);
        assert_eq!(config.watchdog.profile_ms, 5_000);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = ClientConfig::from_toml_str(
            r#"
            [watchdog]
            auth_ms = 100

            [cache.retry]
            max_retries = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.watchdog.auth_ms, 100);
        assert_eq!(config.watchdog.profile_ms, 5_000);
        assert_eq!(config.cache.retry.max_retries, 0);
        assert_eq!(config.cache.retry.base_delay_ms, 1_000);
        assert_eq!(config.log, LogConfig::default());
    }

    #[test]
    fn rejects_inconsistent_backoff() {
        let err = ClientConfig::from_toml_str(
            r#"
            [cache.retry]
            base_delay_ms = 10000
            max_delay_ms = 10
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[log]\nfilter = \"debug\"\njson = true").unwrap();

        let config = ClientConfig::load(file.path()).unwrap();
        assert_eq!(config.log.filter, "debug");
        assert!(config.log.json);
    }

    #[test]
    fn load_missing_file() {
        let err = ClientConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
