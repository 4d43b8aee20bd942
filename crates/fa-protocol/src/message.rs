//! Payload types published by the analysis pipeline
//!
//! All payloads are JSON objects:
//!
//! | topic            | payload                        |
//! |------------------|--------------------------------|
//! | `status`         | `{ "stage", "status" }`        |
//! | `result/{stage}` | `{ "result", "summary"? }`     |
//! | `error`          | `{ "stage"?, "error"? }`       |
//! | `completed`      | anything (advisory only)       |
//!
//! Stage and status identifiers inside payloads are kept as raw strings here.
//! Interpreting them is left to the session tracker, which drops unknown
//! values instead of failing the whole message.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::stage::StageName;

/// Progress update for one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPayload {
    /// Stage identifier, e.g. `faceShape`
    pub stage: String,
    /// Status identifier, e.g. `processing`
    pub status: String,
}

/// Result of one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultPayload {
    /// Stage-specific result document
    pub result: Value,
    /// Optional prose summary (sent with the overall stage)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Failure report; without a stage it applies to the whole job
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Stage identifier, absent for job-level errors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// Human-readable error text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ErrorPayload {
    /// Error text, falling back to a stage-derived default
    pub fn message(&self) -> String {
        match (&self.error, &self.stage) {
            (Some(text), _) if !text.trim().is_empty() => text.clone(),
            (_, Some(stage)) => format!("{} stage failed", stage),
            _ => "analysis failed".to_string(),
        }
    }
}

/// A classified and decoded broker message
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// From the `status` topic
    Status(StatusPayload),
    /// From a `result/{stage}` topic
    StageResult {
        /// Stage named by the topic
        stage: StageName,
        /// Decoded payload
        payload: ResultPayload,
    },
    /// From the `error` topic
    Error(ErrorPayload),
    /// From the `completed` topic
    Completed(Value),
}

impl InboundMessage {
    /// Short label for logging
    pub fn label(&self) -> &'static str {
        match self {
            InboundMessage::Status(_) => "status",
            InboundMessage::StageResult { .. } => "result",
            InboundMessage::Error(_) => "error",
            InboundMessage::Completed(_) => "completed",
        }
    }
}
