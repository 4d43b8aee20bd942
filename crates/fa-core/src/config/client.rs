//! Client configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use fa_protocol::DEFAULT_NAMESPACE;

use super::serde_utils::duration_secs;
use crate::error::ConfigError;

/// Configuration for the analysis client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the analysis backend (start-job and event check)
    pub api_endpoint: String,

    /// Event context sent with every job
    pub event_id: String,

    /// Language code the backend should answer in
    pub language: String,

    /// Prefix of every session topic
    pub topic_namespace: String,

    /// Timeout for the start-job request
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,

    /// Timeout for the broker handshake
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// How long a session may stay unsettled before it is failed
    #[serde(with = "duration_secs")]
    pub stage_timeout: Duration,

    /// Message broker settings
    pub broker: BrokerConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_endpoint: "http://localhost:8080".to_string(),
            event_id: "default".to_string(),
            language: "zh".to_string(),
            topic_namespace: DEFAULT_NAMESPACE.to_string(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(15),
            stage_timeout: Duration::from_secs(120),
            broker: BrokerConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Reject values that would break topic derivation or requests
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("api_endpoint must not be empty".into()));
        }
        let namespace = self.topic_namespace.trim_matches('/');
        if namespace.is_empty() || namespace.contains(['+', '#']) {
            return Err(ConfigError::Invalid(format!(
                "topic_namespace {:?} is not a valid topic prefix",
                self.topic_namespace
            )));
        }
        if self.stage_timeout.is_zero() {
            return Err(ConfigError::Invalid("stage_timeout must be positive".into()));
        }
        Ok(())
    }
}

/// MQTT broker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Broker hostname
    pub host: String,

    /// Broker port
    pub port: u16,

    /// Client id prefix; each connection appends a unique suffix
    pub client_id_prefix: String,

    /// Keep-alive interval
    #[serde(with = "duration_secs")]
    pub keep_alive: Duration,

    /// Optional username
    pub username: Option<String>,

    /// Optional password
    pub password: Option<String>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id_prefix: "face-analysis".to_string(),
            keep_alive: Duration::from_secs(30),
            username: None,
            password: None,
        }
    }
}
