//! Core domain types

use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Monotonically increasing tag for one session attempt.
///
/// Every submit and every retake advances the generation. Deliveries carry
/// the generation they were subscribed under, and anything not matching the
/// current one is dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Generation(u64);

impl Generation {
    /// Generation before any attempt
    pub const ZERO: Generation = Generation(0);

    /// The generation after this one
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    /// Raw counter value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen-{}", self.0)
    }
}

/// A captured photo held locally while its session is alive
#[derive(Clone, PartialEq, Eq)]
pub struct CapturedImage {
    data: Bytes,
    content_type: String,
}

impl CapturedImage {
    /// Wrap encoded image bytes
    pub fn new(data: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            content_type: content_type.into(),
        }
    }

    /// Guess the content type from the file extension
    pub fn content_type_for(path: &std::path::Path) -> &'static str {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("png") => "image/png",
            Some("webp") => "image/webp",
            _ => "image/jpeg",
        }
    }

    /// Raw bytes
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// MIME type
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether no bytes were captured
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Standard base64 without a data-URL prefix, as the backend expects
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }
}

impl fmt::Debug for CapturedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturedImage")
            .field("content_type", &self.content_type)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Whether an event currently accepts submissions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventAccess {
    /// Event is open
    pub is_accessible: bool,
    /// Display name of the event
    #[serde(default)]
    pub event_name: Option<String>,
    /// Message to show, typically why the event is closed
    #[serde(default)]
    pub message: Option<String>,
}
