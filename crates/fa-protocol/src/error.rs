//! Protocol error types

use thiserror::Error;

/// Errors raised while classifying or decoding a broker message
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Session identifier cannot be embedded in a topic
    #[error("Invalid session id: {0:?}")]
    InvalidSessionId(String),

    /// Topic belongs to a different namespace or session
    #[error("Topic does not belong to this session: {0}")]
    ForeignSession(String),

    /// Topic suffix is not one of the known categories
    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    /// Stage identifier is not one of the known stages
    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    /// Status identifier is not one of the known statuses
    #[error("Unknown status: {0}")]
    UnknownStatus(String),

    /// A required payload field was absent or null
    #[error("Missing field in payload: {0}")]
    MissingField(&'static str),

    /// Payload is not valid JSON for its topic
    #[error("Malformed payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
}
