//! Channel client

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use fa_core::config::ClientConfig;
use fa_core::traits::{Transport, TransportSession};
use fa_core::{ConnectionError, Generation};
use fa_protocol::{SessionId, TopicSet, DEFAULT_NAMESPACE};

use super::{dispatch, ChannelHandler, Connection};

/// Default handshake timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Opens per-session connections over a broker transport
#[derive(Clone)]
pub struct ChannelClient {
    transport: Arc<dyn Transport>,
    namespace: String,
    client_id_prefix: String,
    connect_timeout: Duration,
}

impl ChannelClient {
    /// Create a client using the default namespace
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            namespace: DEFAULT_NAMESPACE.to_string(),
            client_id_prefix: "face-analysis".to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Create a client from the namespace and broker settings of a config
    pub fn from_config(transport: Arc<dyn Transport>, config: &ClientConfig) -> Self {
        Self::new(transport)
            .with_namespace(config.topic_namespace.clone())
            .with_client_id_prefix(config.broker.client_id_prefix.clone())
            .with_connect_timeout(config.connect_timeout)
    }

    /// Set the topic namespace
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the prefix of generated client ids
    pub fn with_client_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.client_id_prefix = prefix.into();
        self
    }

    /// Set the handshake timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Open a connection for a session and subscribe its topic set.
    ///
    /// Never fails: if the transport cannot be opened, or no topic could be
    /// subscribed, the handler's `on_connection_error` is invoked from a
    /// separate task and the returned connection is already dead. A single
    /// failed subscription is only logged.
    pub async fn connect(
        &self,
        session_id: &SessionId,
        generation: Generation,
        handler: Arc<dyn ChannelHandler>,
    ) -> Connection {
        let topics = TopicSet::derive(&self.namespace, session_id);
        let client_id = self.client_id();

        tracing::info!(
            "Connecting channel for session {} ({}) as {}",
            session_id,
            generation,
            client_id
        );

        let opened = match tokio::time::timeout(self.connect_timeout, self.transport.open(&client_id)).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::Timeout(self.connect_timeout)),
        };

        let TransportSession { link, events } = match opened {
            Ok(session) => session,
            Err(e) => {
                tracing::error!("Failed to open transport for session {}: {}", session_id, e);
                report(handler, e);
                return Connection::detached(session_id.clone(), generation, topics);
            }
        };

        let mut subscribed = Vec::with_capacity(6);
        for topic in topics.all() {
            match link.subscribe(topic).await {
                Ok(()) => subscribed.push(topic.to_string()),
                Err(e) => tracing::warn!("Failed to subscribe {}: {}", topic, e),
            }
        }

        let none_subscribed = subscribed.is_empty();
        let connection = Connection::attached(session_id.clone(), generation, topics, link, subscribed);

        if none_subscribed {
            tracing::error!("No topics could be subscribed for session {}", session_id);
            connection.mark_failed();
            report(
                handler,
                ConnectionError::Permission(format!("no topics could be subscribed for session {}", session_id)),
            );
            return connection;
        }

        tracing::debug!(
            session_id = %session_id,
            generation = generation.as_u64(),
            topics = connection.status().active_subscriptions,
            "Channel subscribed"
        );

        tokio::spawn(dispatch::run(connection.clone(), events, handler));
        connection
    }

    fn client_id(&self) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!("{}-{}", self.client_id_prefix, &suffix[..12])
    }
}

/// Invoke the connection-error callback off the caller's stack
fn report(handler: Arc<dyn ChannelHandler>, error: ConnectionError) {
    tokio::spawn(async move {
        handler.on_connection_error(error);
    });
}
