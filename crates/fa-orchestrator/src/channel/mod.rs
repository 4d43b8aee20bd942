//! Message channel client
//!
//! One [`Connection`] per session: [`ChannelClient::connect`] opens the
//! broker transport, subscribes the session's fixed topic set and spawns a
//! dispatch task that classifies every delivery by topic and hands the
//! parsed payload to a [`ChannelHandler`].
//!
//! Transport failures never surface as a failed `connect`; they reach the
//! handler through [`ChannelHandler::on_connection_error`].

mod client;
mod connection;
mod dispatch;

pub use client::ChannelClient;
pub use connection::{Connection, ConnectionStatus};

use serde_json::Value;

use fa_core::ConnectionError;
use fa_protocol::{ErrorPayload, ResultPayload, StageName, StatusPayload};

/// Receiver of parsed deliveries for one connection.
///
/// Calls are made sequentially from the connection's dispatch task and must
/// not block it.
pub trait ChannelHandler: Send + Sync {
    /// A stage status update
    fn on_status(&self, payload: StatusPayload);

    /// A stage result
    fn on_stage_result(&self, stage: StageName, payload: ResultPayload);

    /// A stage or job error
    fn on_error(&self, payload: ErrorPayload);

    /// The broker's completion hint
    fn on_completed(&self, payload: Value);

    /// The transport failed or could not be opened
    fn on_connection_error(&self, error: ConnectionError);
}
