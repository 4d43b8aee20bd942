//! Session identifier type

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ProtocolError;

/// Opaque identifier the backend assigns to one analysis job
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Validate a raw identifier returned by the backend.
    ///
    /// The id becomes a topic level, so it must be non-empty and free of
    /// topic separators and broker wildcards.
    pub fn parse(raw: impl Into<String>) -> Result<Self, ProtocolError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.contains(['/', '+', '#']) {
            return Err(ProtocolError::InvalidSessionId(raw));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Get the raw ID string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<&str> for SessionId {
    type Error = ProtocolError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}
