//! Delivery dispatch loop

use std::sync::Arc;

use tokio::sync::mpsc;

use fa_core::traits::TransportEvent;
use fa_core::ConnectionError;
use fa_protocol::{decode, InboundMessage, TopicSet};

use super::{ChannelHandler, Connection};

/// Run until the connection is disconnected or the transport goes away
pub(crate) async fn run(
    connection: Connection,
    mut events: mpsc::Receiver<TransportEvent>,
    handler: Arc<dyn ChannelHandler>,
) {
    let cancel = connection.cancel_token();

    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = events.recv() => event,
        };

        match event {
            Some(TransportEvent::Message { topic, payload }) => {
                deliver(connection.topics(), handler.as_ref(), &topic, &payload);
            }
            Some(TransportEvent::Failed(error)) => {
                if connection.mark_failed() {
                    tracing::error!(
                        "Transport for session {} failed: {}",
                        connection.session_id(),
                        error
                    );
                    handler.on_connection_error(error);
                }
                break;
            }
            None => {
                if !cancel.is_cancelled() && connection.mark_failed() {
                    tracing::error!(
                        "Transport for session {} closed unexpectedly",
                        connection.session_id()
                    );
                    handler.on_connection_error(ConnectionError::Closed);
                }
                break;
            }
        }
    }

    tracing::debug!("Dispatch loop for session {} stopped", connection.session_id());
}

/// Classify, decode and hand one delivery to the handler
pub(crate) fn deliver(topics: &TopicSet, handler: &dyn ChannelHandler, topic: &str, payload: &[u8]) {
    let kind = match topics.classify(topic) {
        Ok(kind) => kind,
        Err(e) => {
            tracing::warn!("Dropping delivery on {}: {}", topic, e);
            return;
        }
    };

    let message = match decode(kind, payload) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!("Dropping malformed {} payload: {}", topic, e);
            return;
        }
    };

    tracing::debug!(topic = %topic, kind = message.label(), "Delivering message");

    match message {
        InboundMessage::Status(payload) => handler.on_status(payload),
        InboundMessage::StageResult { stage, payload } => handler.on_stage_result(stage, payload),
        InboundMessage::Error(payload) => handler.on_error(payload),
        InboundMessage::Completed(payload) => handler.on_completed(payload),
    }
}
