//! Subscriber setup for binaries and tests embedding the crate

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::error::{Error, Result};
use crate::training::LoggingConfig;

/// Install a global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `config.level`. Fails if a global
/// subscriber is already set.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| Error::config(format!("invalid log level '{}': {e}", config.level)))?;

    let layer = if config.json {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_filter(env_filter)
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_ansi(false)
            .with_filter(env_filter)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| Error::Other(e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails() {
        let config = LoggingConfig {
            level: "debug".to_string(),
            json: true,
        };
        // another test may already own the global subscriber
        let _ = init_logging(&config);
        assert!(init_logging(&config).is_err());
    }
}
