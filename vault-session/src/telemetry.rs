//! Tracing subscriber setup for applications embedding the client.

use crate::error::{VaultError, VaultResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Tracing configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Log level filter used when `RUST_LOG` is unset
    pub log_level: String,
    /// Whether to output JSON format
    pub json_output: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            log_level: "vault_session=info".to_string(),
            json_output: false,
        }
    }
}

impl TracingConfig {
    /// Create config with custom log level.
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Enable JSON output.
    #[must_use]
    pub const fn with_json_output(mut self) -> Self {
        self.json_output = true;
        self
    }
}

/// Install the global subscriber. Call once at application startup.
///
/// # Errors
///
/// Returns `InvalidConfig` if the filter does not parse or a global
/// subscriber is already installed.
pub fn init_tracing(config: &TracingConfig) -> VaultResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level)
            .map_err(|e| VaultError::InvalidConfig(format!("log filter: {e}")))?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json_output {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    result.map_err(|e| VaultError::InvalidConfig(format!("tracing: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TracingConfig::default();
        assert_eq!(config.log_level, "vault_session=info");
        assert!(!config.json_output);
    }

    #[test]
    fn test_second_init_fails() {
        let config = TracingConfig::default().with_log_level("debug");
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }
}
