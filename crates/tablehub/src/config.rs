//! Server and hub configuration.
//!
//! Defaults are usable as-is. A deployment overrides them with
//! environment variables:
//!
//! | Variable | Field |
//! |---|---|
//! | `TABLEHUB_BIND` | [`ServerConfig::bind`] |
//! | `TABLEHUB_TIMEOUT` | [`HubConfig::timeout_secs`] |
//! | `TABLEHUB_CHANNEL_SIZE` | [`HubConfig::channel_size`] |
//! | `TABLEHUB_CLIENT_BUFFER` | [`HubConfig::client_buffer`] |

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a [`Hub`](crate::Hub).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Seconds an unstarted room may sit idle before it is destroyed.
    /// `0` disables idle reclamation.
    pub timeout_secs: u64,

    /// Capacity of the hub's inbound channels.
    pub channel_size: usize,

    /// Capacity of each client's outbound mailbox. A client that falls
    /// this far behind is disconnected.
    pub client_buffer: usize,
}

impl HubConfig {
    /// The idle timeout for new rooms, or `None` when disabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 600,
            channel_size: 256,
            client_buffer: 256,
        }
    }
}

/// Configuration for a [`TablehubServer`](crate::TablehubServer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub bind: String,
    pub hub: HubConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            hub: HubConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `TABLEHUB_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(bind) = lookup("TABLEHUB_BIND") {
            config.bind = bind;
        }
        if let Some(value) = lookup("TABLEHUB_TIMEOUT") {
            config.hub.timeout_secs = parse("TABLEHUB_TIMEOUT", value)?;
        }
        if let Some(value) = lookup("TABLEHUB_CHANNEL_SIZE") {
            config.hub.channel_size = parse("TABLEHUB_CHANNEL_SIZE", value)?;
        }
        if let Some(value) = lookup("TABLEHUB_CLIENT_BUFFER") {
            config.hub.client_buffer = parse("TABLEHUB_CLIENT_BUFFER", value)?;
        }
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.hub.channel_size == 0 {
            return Err(ConfigError::Invalid {
                key: "TABLEHUB_CHANNEL_SIZE",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.hub.client_buffer == 0 {
            return Err(ConfigError::Invalid {
                key: "TABLEHUB_CLIENT_BUFFER",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

fn parse<T>(key: &'static str, value: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let parsed = value.trim().parse::<T>();
    parsed.map_err(|e| ConfigError::Invalid {
        key,
        reason: e.to_string(),
        value,
    })
}

/// A configuration value that couldn't be used.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(
        vars: &[(&str, &str)],
    ) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(
            config.hub.idle_timeout(),
            Some(Duration::from_secs(600))
        );
    }

    #[test]
    fn test_env_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("TABLEHUB_BIND", "0.0.0.0:9000"),
            ("TABLEHUB_TIMEOUT", "30"),
            ("TABLEHUB_CLIENT_BUFFER", " 8 "),
        ]))
        .unwrap();
        assert_eq!(config.bind, "0.0.0.0:9000");
        assert_eq!(config.hub.timeout_secs, 30);
        assert_eq!(config.hub.client_buffer, 8);
    }

    #[test]
    fn test_zero_timeout_disables_idle_reclamation() {
        let config =
            ServerConfig::from_lookup(lookup(&[("TABLEHUB_TIMEOUT", "0")]))
                .unwrap();
        assert_eq!(config.hub.idle_timeout(), None);
    }

    #[test]
    fn test_invalid_number_is_reported_with_key() {
        let err =
            ServerConfig::from_lookup(lookup(&[("TABLEHUB_TIMEOUT", "soon")]))
                .unwrap_err();
        let ConfigError::Invalid { key, value, .. } = err;
        assert_eq!(key, "TABLEHUB_TIMEOUT");
        assert_eq!(value, "soon");
    }

    #[test]
    fn test_zero_client_buffer_is_rejected() {
        let err = ServerConfig::from_lookup(lookup(&[(
            "TABLEHUB_CLIENT_BUFFER",
            "0",
        )]))
        .unwrap_err();
        assert!(err.to_string().contains("TABLEHUB_CLIENT_BUFFER"));
    }

    #[test]
    fn test_hub_config_deserializes_with_defaults() {
        let config: HubConfig =
            serde_json::from_str(r#"{"timeout_secs": 5}"#).unwrap();
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.client_buffer, 256);
    }
}
