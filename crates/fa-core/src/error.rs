//! Core error types for the face-analysis client

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors from the start-job handshake.
///
/// Terminal for the attempt; only a retake starts a new one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmissionError {
    /// Image could not be prepared for upload
    #[error("Failed to encode image: {0}")]
    Encode(String),

    /// Backend answered with a non-success status
    #[error("Backend rejected the job (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// Backend answered 2xx but without a usable session id
    #[error("Backend response did not include a session id")]
    MissingSessionId,

    /// Backend could not be reached or the response could not be read
    #[error("Backend unreachable: {0}")]
    Network(String),

    /// An analysis is already running on this surface
    #[error("An analysis is already in progress")]
    Busy,
}

/// Broker transport errors.
///
/// Once a session id exists, any of these makes the session unrecoverable
/// even though the backend job may still be running.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Network path to the broker failed
    #[error("Network connection interrupted: {0}")]
    Network(String),

    /// Broker rejected our credentials
    #[error("Broker authentication failed: {0}")]
    Auth(String),

    /// Broker refused a subscription or publish
    #[error("Broker denied permission: {0}")]
    Permission(String),

    /// Handshake did not finish in time
    #[error("Broker handshake timed out after {0:?}")]
    Timeout(Duration),

    /// Transport was closed underneath us
    #[error("Transport closed")]
    Closed,

    /// Anything the transport could not classify
    #[error("Transport error: {0}")]
    Transport(String),
}

impl ConnectionError {
    /// Classify a raw transport error message
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_ascii_lowercase();

        if lower.contains("auth") || lower.contains("not authorized") || lower.contains("credential") {
            ConnectionError::Auth(message)
        } else if lower.contains("permission") || lower.contains("denied") || lower.contains("refused subscription") {
            ConnectionError::Permission(message)
        } else if lower.contains("connection") || lower.contains("network") || lower.contains("io error") {
            ConnectionError::Network(message)
        } else {
            ConnectionError::Transport(message)
        }
    }

    /// Short guidance for the user
    pub fn hint(&self) -> &'static str {
        match self {
            ConnectionError::Network(_) | ConnectionError::Timeout(_) | ConnectionError::Closed => {
                "Network connection interrupted, check the network and try again"
            }
            ConnectionError::Auth(_) => "Authentication failed, reload and try again",
            ConnectionError::Permission(_) => "Insufficient permissions, contact the event administrator",
            ConnectionError::Transport(_) => "Connection problem, please try again",
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
