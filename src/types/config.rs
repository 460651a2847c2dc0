//! Configuration structures.
//!
//! Every section has defaults, so a partial JSON document (or none at all)
//! yields a usable configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::{Result, SubscriberId};

/// Global configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Caller-side configuration.
    #[serde(default)]
    pub client: ClientConfig,

    /// Event channel configuration.
    #[serde(default)]
    pub channel: ChannelConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Parse a configuration from JSON; missing sections take their defaults.
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

/// Caller-side configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Deadline for a proxied call. `None` waits for the relay forever.
    #[serde(with = "humantime_serde")]
    pub call_timeout: Option<Duration>,

    /// Publish to the event channel even when the probe reports no native
    /// transport at all. When false such calls fail fast.
    pub proxy_when_unavailable: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            call_timeout: Some(Duration::from_secs(30)),
            proxy_when_unavailable: false,
        }
    }
}

/// Event channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Name used as the subscriber id prefix for standing listeners.
    pub subscriber_prefix: String,
}

impl ChannelConfig {
    /// Fresh subscriber id for a standing listener, e.g. `ctx-relay-<uuid>`.
    pub fn subscriber_id(&self, role: &str) -> SubscriberId {
        SubscriberId::with_prefix(&format!("{}-{}", self.subscriber_prefix, role))
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            subscriber_prefix: "ctx".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Tracing log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.client.call_timeout, Some(Duration::from_secs(30)));
        assert!(!config.client.proxy_when_unavailable);
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_partial_json() {
        let config = Config::from_json_str(
            r#"{"client": {"call_timeout": "250ms", "proxy_when_unavailable": true}}"#,
        )
        .unwrap();
        assert_eq!(config.client.call_timeout, Some(Duration::from_millis(250)));
        assert!(config.client.proxy_when_unavailable);
        assert_eq!(config.channel.subscriber_prefix, "ctx");
    }

    #[test]
    fn test_null_timeout_disables_deadline() {
        let config = Config::from_json_str(r#"{"client": {"call_timeout": null}}"#).unwrap();
        assert_eq!(config.client.call_timeout, None);
    }

    #[test]
    fn test_subscriber_id_prefix() {
        let channel = ChannelConfig::default();
        let id = channel.subscriber_id("relay");
        assert!(id.as_str().starts_with("ctx-relay-"));
        assert_ne!(id, channel.subscriber_id("relay"));
    }

    #[test]
    fn test_invalid_json_is_serialization_error() {
        let err = Config::from_json_str("{not json").unwrap_err();
        assert_eq!(err.code(), "INTERNAL");
    }
}
