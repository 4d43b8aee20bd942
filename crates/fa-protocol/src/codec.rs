//! JSON decoding of inbound payloads

use serde_json::Value;

use crate::error::ProtocolError;
use crate::message::{ErrorPayload, InboundMessage, ResultPayload, StatusPayload};
use crate::topic::TopicKind;

/// Decode a raw payload received on a topic of the given kind.
///
/// The `completed` topic is advisory, so its payload never fails to decode:
/// empty bodies become `null` and non-JSON bodies are kept as a string.
pub fn decode(kind: TopicKind, payload: &[u8]) -> Result<InboundMessage, ProtocolError> {
    match kind {
        TopicKind::Status => {
            let status: StatusPayload = serde_json::from_slice(payload)?;
            Ok(InboundMessage::Status(status))
        }
        TopicKind::StageResult(stage) => {
            let result: ResultPayload = serde_json::from_slice(payload)?;
            if result.result.is_null() {
                return Err(ProtocolError::MissingField("result"));
            }
            Ok(InboundMessage::StageResult {
                stage,
                payload: result,
            })
        }
        TopicKind::Error => {
            let error: ErrorPayload = serde_json::from_slice(payload)?;
            Ok(InboundMessage::Error(error))
        }
        TopicKind::Completed => {
            let hint = if payload.iter().all(u8::is_ascii_whitespace) {
                Value::Null
            } else {
                serde_json::from_slice(payload)
                    .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(payload).into_owned()))
            };
            Ok(InboundMessage::Completed(hint))
        }
    }
}
