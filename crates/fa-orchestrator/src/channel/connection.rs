//! Connection handle

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use fa_core::traits::TransportLink;
use fa_core::Generation;
use fa_protocol::{SessionId, TopicSet};

/// Point-in-time view of a connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    /// Open, not failed and not disconnected
    pub connected: bool,
    /// Session the connection serves
    pub session_id: SessionId,
    /// Generation the connection was opened under
    pub generation: Generation,
    /// Number of topics currently subscribed
    pub active_subscriptions: usize,
}

/// Handle to one session's subscriptions.
///
/// Cloning shares the same underlying connection. `disconnect` is
/// idempotent across all clones.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

struct Inner {
    session_id: SessionId,
    generation: Generation,
    topics: TopicSet,
    link: Mutex<LinkState>,
    attached: bool,
    closed: AtomicBool,
    failed: AtomicBool,
    active: AtomicUsize,
    cancel: CancellationToken,
}

struct LinkState {
    link: Option<Box<dyn TransportLink>>,
    subscribed: Vec<String>,
}

impl Connection {
    /// A connection whose transport never opened
    pub(crate) fn detached(session_id: SessionId, generation: Generation, topics: TopicSet) -> Self {
        let connection = Self::build(session_id, generation, topics, None, Vec::new());
        connection.inner.failed.store(true, Ordering::Release);
        connection
    }

    /// A connection over an open transport link
    pub(crate) fn attached(
        session_id: SessionId,
        generation: Generation,
        topics: TopicSet,
        link: Box<dyn TransportLink>,
        subscribed: Vec<String>,
    ) -> Self {
        Self::build(session_id, generation, topics, Some(link), subscribed)
    }

    fn build(
        session_id: SessionId,
        generation: Generation,
        topics: TopicSet,
        link: Option<Box<dyn TransportLink>>,
        subscribed: Vec<String>,
    ) -> Self {
        let attached = link.is_some();
        let active = AtomicUsize::new(subscribed.len());
        Self {
            inner: Arc::new(Inner {
                session_id,
                generation,
                topics,
                link: Mutex::new(LinkState { link, subscribed }),
                attached,
                closed: AtomicBool::new(false),
                failed: AtomicBool::new(false),
                active,
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Session this connection serves
    pub fn session_id(&self) -> &SessionId {
        &self.inner.session_id
    }

    /// Topics derived for the session
    pub fn topics(&self) -> &TopicSet {
        &self.inner.topics
    }

    /// Whether deliveries can still arrive
    pub fn is_connected(&self) -> bool {
        self.inner.attached
            && !self.inner.closed.load(Ordering::Acquire)
            && !self.inner.failed.load(Ordering::Acquire)
    }

    /// Snapshot of the connection
    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            connected: self.is_connected(),
            session_id: self.inner.session_id.clone(),
            generation: self.inner.generation,
            active_subscriptions: self.inner.active.load(Ordering::Acquire),
        }
    }

    /// Mark the transport as failed. Returns true for the first caller only,
    /// and false once the connection was closed on purpose.
    pub(crate) fn mark_failed(&self) -> bool {
        if self.inner.closed.load(Ordering::Acquire) {
            return false;
        }
        self.inner
            .failed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    /// Unsubscribe every topic this connection opened and close the
    /// transport.
    ///
    /// Idempotent: only the first call does any work, later calls (and
    /// calls on a detached or failed connection) return immediately or
    /// quietly tolerate transport errors.
    pub async fn disconnect(&self) {
        // Only one caller wins the close
        if self
            .inner
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(
                "Connection for session {} already disconnected",
                self.inner.session_id
            );
            return;
        }

        self.inner.cancel.cancel();

        let mut state = self.inner.link.lock().await;
        let subscribed = std::mem::take(&mut state.subscribed);
        self.inner.active.store(0, Ordering::Release);

        let Some(link) = state.link.take() else {
            return;
        };

        let failed = self.inner.failed.load(Ordering::Acquire);
        for topic in &subscribed {
            if let Err(e) = link.unsubscribe(topic).await {
                if failed {
                    tracing::debug!("Unsubscribe of {} on failed transport: {}", topic, e);
                } else {
                    tracing::warn!("Failed to unsubscribe {}: {}", topic, e);
                }
            }
        }

        if let Err(e) = link.close().await {
            tracing::debug!("Transport close for session {}: {}", self.inner.session_id, e);
        }

        tracing::info!(
            "Disconnected session {} ({}, {} topics released)",
            self.inner.session_id,
            self.inner.generation,
            subscribed.len()
        );
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("session_id", &self.inner.session_id)
            .field("generation", &self.inner.generation)
            .field("connected", &self.is_connected())
            .finish()
    }
}
