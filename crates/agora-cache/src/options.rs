//! Per-query fetch configuration
//!
//! Replaces declarative hook options with an explicit struct evaluated by the
//! cache service: retry policy, poll interval, readiness predicate and
//! expected-absence handling.

use agora_core::{BackendError, RetryConfig};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Predicate gating a fetch; while false the entry is disabled
pub type Readiness = Arc<dyn Fn() -> bool + Send + Sync>;

/// Bounded exponential backoff for retryable errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    /// Create policy
    #[inline]
    #[must_use]
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    /// Never retry
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO, Duration::ZERO)
    }

    /// Retries after the first attempt
    #[inline]
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before retry number `retry` (0-based): `base * 2^retry`, capped
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Check if another attempt is allowed after `retries_so_far` retries
    #[inline]
    #[must_use]
    pub fn should_retry(&self, retries_so_far: u32, error: &BackendError) -> bool {
        error.is_retryable() && retries_so_far < self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(RetryConfig::default())
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
    }
}

/// Fetch options for values of type `T`
pub struct FetchOptions<T> {
    pub(crate) retry: RetryPolicy,
    pub(crate) poll_interval: Option<Duration>,
    pub(crate) readiness: Option<Readiness>,
    pub(crate) absence_fallback: Option<fn() -> T>,
}

impl<T> FetchOptions<T> {
    /// Default retry policy, no polling, always enabled
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            retry: RetryPolicy::default(),
            poll_interval: None,
            readiness: None,
            absence_fallback: None,
        }
    }

    /// With retry policy
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Refetch on a fixed interval while observed
    #[inline]
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Gate fetching on a readiness predicate
    #[inline]
    #[must_use]
    pub fn enabled_when(mut self, predicate: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.readiness = Some(Arc::new(predicate));
        self
    }

    /// Evaluate readiness
    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.readiness.as_ref().map_or(true, |ready| ready())
    }

    /// Retry policy in effect
    #[inline]
    #[must_use]
    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    /// Poll interval, if polling
    #[inline]
    #[must_use]
    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval
    }
}

impl<T: Default> FetchOptions<T> {
    /// Resolve expected-absence errors to `T::default()` instead of failing
    #[inline]
    #[must_use]
    pub fn absence_as_empty(mut self) -> Self {
        self.absence_fallback = Some(T::default);
        self
    }
}

impl<T> Default for FetchOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for FetchOptions<T> {
    fn clone(&self) -> Self {
        Self {
            retry: self.retry,
            poll_interval: self.poll_interval,
            readiness: self.readiness.clone(),
            absence_fallback: self.absence_fallback,
        }
    }
}

impl<T> fmt::Debug for FetchOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchOptions")
            .field("retry", &self.retry)
            .field("poll_interval", &self.poll_interval)
            .field("gated", &self.readiness.is_some())
            .field("absence_as_empty", &self.absence_fallback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn default_backoff_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries(), 2);
        assert_eq!(policy.delay_for(0), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(1), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(4_000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(5_000));
    }

    #[test]
    fn only_retryable_errors_are_retried() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(0, &BackendError::classify("network timeout")));
        assert!(policy.should_retry(1, &BackendError::classify("network timeout")));
        assert!(!policy.should_retry(2, &BackendError::classify("network timeout")));
        assert!(!policy.should_retry(0, &BackendError::classify("must be registered")));
    }

    #[test]
    fn readiness_predicate_is_live() {
        let flag = Arc::new(AtomicBool::new(false));
        let observed = flag.clone();
        let options = FetchOptions::<u32>::new().enabled_when(move || observed.load(Ordering::SeqCst));

        assert!(!options.is_ready());
        flag.store(true, Ordering::SeqCst);
        assert!(options.is_ready());
    }

    #[test]
    fn absence_fallback_produces_default() {
        let options = FetchOptions::<Option<u32>>::new().absence_as_empty();
        let fallback = options.absence_fallback.unwrap();
        assert_eq!(fallback(), None);
    }

    proptest! {
        #[test]
        fn prop_backoff_never_exceeds_cap(retry in 0u32..64) {
            let policy = RetryPolicy::default();
            prop_assert!(policy.delay_for(retry) <= Duration::from_millis(5_000));
            prop_assert!(policy.delay_for(retry) >= Duration::from_millis(1_000));
        }
    }
}
