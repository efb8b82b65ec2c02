//! Tracing subscriber setup
//!
//! Library code only emits `tracing` events. Binaries call [`init_tracing`]
//! once; `RUST_LOG` overrides the configured filter.

use agora_core::LogConfig;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber
///
/// # Errors
/// `TryInitError` if a global subscriber is already installed.
pub fn init_tracing(config: &LogConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));
    let registry = tracing_subscriber::registry().with(filter);
    if config.json {
        registry.with(fmt::layer().json().with_target(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_is_rejected() {
        let config = LogConfig {
            filter: "warn".to_string(),
            json: true,
        };
        // Another test may already have installed one
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }
}
