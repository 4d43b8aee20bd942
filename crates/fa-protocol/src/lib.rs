//! fa-protocol: Notification vocabulary for staged face analysis
//!
//! This crate defines the topic layout and JSON payloads the analysis
//! pipeline publishes for a session, and the classification of inbound
//! broker messages into typed [`InboundMessage`] values.

pub mod codec;
pub mod error;
pub mod message;
pub mod session;
pub mod stage;
pub mod topic;

pub use codec::decode;
pub use error::ProtocolError;
pub use message::{ErrorPayload, InboundMessage, ResultPayload, StatusPayload};
pub use session::SessionId;
pub use stage::{StageName, StageStatus};
pub use topic::{TopicKind, TopicSet, DEFAULT_NAMESPACE};
