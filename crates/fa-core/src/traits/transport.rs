//! Message broker transport traits
//!
//! The broker is an external collaborator: the channel client only needs to
//! open a connection, subscribe and unsubscribe topics, and receive whatever
//! the broker delivers on an event stream.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::ConnectionError;

/// Something delivered by an open transport
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A message published on a subscribed topic
    Message {
        /// Full topic name
        topic: String,
        /// Raw payload bytes
        payload: Bytes,
    },
    /// The transport failed after it was opened
    Failed(ConnectionError),
}

/// An opened transport: a control handle plus its inbound event stream
pub struct TransportSession {
    /// Subscription control
    pub link: Box<dyn TransportLink>,
    /// Inbound deliveries; closing means the transport is gone
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Factory for broker connections
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a new connection and complete the handshake
    async fn open(&self, client_id: &str) -> Result<TransportSession, ConnectionError>;
}

/// Control handle of one open broker connection
#[async_trait]
pub trait TransportLink: Send + Sync {
    /// Subscribe a topic
    async fn subscribe(&self, topic: &str) -> Result<(), ConnectionError>;

    /// Unsubscribe a topic
    async fn unsubscribe(&self, topic: &str) -> Result<(), ConnectionError>;

    /// Close the connection; calling it on an already-failed link must not panic
    async fn close(&self) -> Result<(), ConnectionError>;
}
