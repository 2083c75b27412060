use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogConfig, LogFormat};

/// Initialize tracing with an `EnvFilter` and a pretty or JSON fmt layer.
///
/// `RUST_LOG` wins over the configured filter when set. Fails if a global
/// subscriber is already installed.
pub fn init_tracing(config: &LogConfig) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?,
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init()?,
    }

    tracing::debug!(filter = %config.filter, format = ?config.format, "Tracing initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails() {
        let config = LogConfig {
            filter: "debug".to_string(),
            format: LogFormat::Json,
        };
        assert!(init_tracing(&config).is_ok());
        assert!(init_tracing(&config).is_err());
    }
}
