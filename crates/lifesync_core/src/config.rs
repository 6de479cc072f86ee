//! Runtime configuration for one client.
//!
//! # Responsibility
//! - Hold tunables for the outbox, flush scheduler and HTTP transport.
//! - Load them from a JSON file where every field is optional.
//!
//! # Invariants
//! - A config that passed `validate()` never yields a zero-capacity queue or
//!   a zero timeout.

use crate::outbox::queue::OverflowPolicy;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_OUTBOX_CAPACITY: usize = 200;
pub const DEFAULT_NOTIFY_CHANNEL: &str = "lifesync-progress";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    /// Base URL for `/progress/*` and `/card/*` endpoints.
    pub api_base_url: String,
    pub bearer_token: Option<String>,
    pub outbox_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    /// Delay before the startup flush so it does not compete with app load.
    pub startup_flush_delay_ms: u64,
    /// How long a context's queue namespace stays owned without a refresh.
    pub lease_ttl_ms: u64,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub beacon_timeout_ms: u64,
    pub notify_channel: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8787".to_string(),
            bearer_token: None,
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
            overflow_policy: OverflowPolicy::default(),
            startup_flush_delay_ms: 3_000,
            lease_ttl_ms: 30_000,
            connect_timeout_ms: 5_000,
            request_timeout_ms: 10_000,
            beacon_timeout_ms: 1_500,
            notify_channel: DEFAULT_NOTIFY_CHANNEL.to_string(),
        }
    }
}

impl CoreConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = self.api_base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "api_base_url must start with http:// or https://, got `{base}`"
            )));
        }
        if self.outbox_capacity == 0 {
            return Err(ConfigError::Invalid(
                "outbox_capacity must be greater than zero".to_string(),
            ));
        }
        for (name, value) in [
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("request_timeout_ms", self.request_timeout_ms),
            ("beacon_timeout_ms", self.beacon_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be greater than zero")));
            }
        }
        if self.notify_channel.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "notify_channel cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Joins an endpoint path onto the base URL without doubling slashes.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_base_url.trim().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn startup_flush_delay(&self) -> Duration {
        Duration::from_millis(self.startup_flush_delay_ms)
    }
}

/// Reads and validates a JSON config file.
pub fn load_config(path: impl AsRef<Path>) -> Result<CoreConfig, ConfigError> {
    let raw = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
    let config: CoreConfig = serde_json::from_str(&raw).map_err(ConfigError::Parse)?;
    config.validate()?;
    Ok(config)
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read config: {err}"),
            Self::Parse(err) => write!(f, "failed to parse config: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{load_config, ConfigError, CoreConfig};
    use crate::outbox::queue::OverflowPolicy;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        CoreConfig::default()
            .validate()
            .expect("default config should validate");
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let config = CoreConfig {
            api_base_url: "https://api.example.test/".to_string(),
            ..CoreConfig::default()
        };
        assert_eq!(
            config.endpoint("/progress/events"),
            "https://api.example.test/progress/events"
        );
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let config = CoreConfig {
            outbox_capacity: 0,
            ..CoreConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn load_config_fills_missing_fields_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file should be created");
        write!(
            file,
            r#"{{"api_base_url":"https://sync.example.test","overflow_policy":"drop_newest"}}"#
        )
        .expect("config should be written");

        let config = load_config(file.path()).expect("config should load");
        assert_eq!(config.api_base_url, "https://sync.example.test");
        assert_eq!(config.overflow_policy, OverflowPolicy::DropNewest);
        assert_eq!(config.outbox_capacity, 200);
    }

    #[test]
    fn load_config_rejects_unknown_fields() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file should be created");
        write!(file, r#"{{"outbox_size":5}}"#).expect("config should be written");
        assert!(matches!(load_config(file.path()), Err(ConfigError::Parse(_))));
    }
}
