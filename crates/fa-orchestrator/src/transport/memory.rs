//! In-process broker
//!
//! Routes published payloads to every link subscribed to the exact topic.
//! Failure injection hooks let tests exercise the connection error paths
//! without a real broker.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use fa_core::traits::{Transport, TransportEvent, TransportLink, TransportSession};
use fa_core::ConnectionError;

/// Capacity of each link's event queue
const LINK_BUFFER: usize = 256;

type LinkId = u64;

/// Shared in-memory broker; clones refer to the same broker
#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

#[derive(Default)]
struct BrokerInner {
    /// Topic -> subscribed links
    subscriptions: DashMap<String, Vec<LinkId>>,
    /// Open links and their event senders
    links: DashMap<LinkId, mpsc::Sender<TransportEvent>>,
    next_link: AtomicU64,
    opens: AtomicUsize,
    fail_next_open: Mutex<Option<ConnectionError>>,
    denied: DashSet<String>,
}

impl MemoryBroker {
    /// Create an empty broker
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish raw bytes; returns how many links received them
    pub async fn publish(&self, topic: &str, payload: impl Into<Bytes>) -> usize {
        let payload = payload.into();

        // Collect senders first so no map guard is held across an await
        let targets: Vec<mpsc::Sender<TransportEvent>> = match self.inner.subscriptions.get(topic) {
            Some(ids) => ids
                .iter()
                .filter_map(|id| self.inner.links.get(id).map(|tx| tx.value().clone()))
                .collect(),
            None => Vec::new(),
        };

        let mut delivered = 0;
        for tx in targets {
            let event = TransportEvent::Message {
                topic: topic.to_string(),
                payload: payload.clone(),
            };
            if tx.send(event).await.is_ok() {
                delivered += 1;
            }
        }

        tracing::trace!("Published to {} ({} receivers)", topic, delivered);
        delivered
    }

    /// Publish a JSON document
    pub async fn publish_json(&self, topic: &str, value: &serde_json::Value) -> usize {
        self.publish(topic, value.to_string()).await
    }

    /// Make the next `open` fail with the given error
    pub fn fail_next_open(&self, error: ConnectionError) {
        *self.inner.fail_next_open.lock() = Some(error);
    }

    /// Reject every subscription to a topic
    pub fn deny_topic(&self, topic: impl Into<String>) {
        self.inner.denied.insert(topic.into());
    }

    /// Fail every open link, as if the broker went away
    pub async fn fail_all(&self, error: ConnectionError) {
        let ids: Vec<LinkId> = self.inner.links.iter().map(|entry| *entry.key()).collect();
        let mut senders = Vec::with_capacity(ids.len());
        for id in ids {
            self.inner.drop_subscriptions(id);
            if let Some((_, tx)) = self.inner.links.remove(&id) {
                senders.push(tx);
            }
        }

        for tx in senders {
            let _ = tx.send(TransportEvent::Failed(error.clone())).await;
        }
    }

    /// Number of links subscribed to a topic
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner.subscriptions.get(topic).map(|ids| ids.len()).unwrap_or(0)
    }

    /// Number of topic subscriptions across all links
    pub fn total_subscriptions(&self) -> usize {
        self.inner.subscriptions.iter().map(|entry| entry.value().len()).sum()
    }

    /// Number of links currently open
    pub fn open_links(&self) -> usize {
        self.inner.links.len()
    }

    /// Number of successful opens so far
    pub fn opens(&self) -> usize {
        self.inner.opens.load(Ordering::Acquire)
    }
}

impl BrokerInner {
    fn drop_subscriptions(&self, id: LinkId) {
        self.subscriptions.retain(|_, ids| {
            ids.retain(|other| *other != id);
            !ids.is_empty()
        });
    }
}

#[async_trait]
impl Transport for MemoryBroker {
    async fn open(&self, client_id: &str) -> Result<TransportSession, ConnectionError> {
        if let Some(error) = self.inner.fail_next_open.lock().take() {
            tracing::debug!("Refusing connection from {}: {}", client_id, error);
            return Err(error);
        }

        let id = self.inner.next_link.fetch_add(1, Ordering::AcqRel);
        let (tx, rx) = mpsc::channel(LINK_BUFFER);
        self.inner.links.insert(id, tx);
        self.inner.opens.fetch_add(1, Ordering::AcqRel);

        tracing::debug!("Memory link {} opened for {}", id, client_id);

        Ok(TransportSession {
            link: Box::new(MemoryLink {
                id,
                broker: Arc::clone(&self.inner),
                closed: AtomicBool::new(false),
            }),
            events: rx,
        })
    }
}

struct MemoryLink {
    id: LinkId,
    broker: Arc<BrokerInner>,
    closed: AtomicBool,
}

#[async_trait]
impl TransportLink for MemoryLink {
    async fn subscribe(&self, topic: &str) -> Result<(), ConnectionError> {
        if self.closed.load(Ordering::Acquire) || !self.broker.links.contains_key(&self.id) {
            return Err(ConnectionError::Closed);
        }
        if self.broker.denied.contains(topic) {
            return Err(ConnectionError::Permission(format!("subscription to {} denied", topic)));
        }

        let mut ids = self.broker.subscriptions.entry(topic.to_string()).or_default();
        if !ids.contains(&self.id) {
            ids.push(self.id);
        }
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), ConnectionError> {
        let now_empty = match self.broker.subscriptions.get_mut(topic) {
            Some(mut ids) => {
                ids.retain(|other| *other != self.id);
                ids.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.broker.subscriptions.remove_if(topic, |_, ids| ids.is_empty());
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }
        self.broker.drop_subscriptions(self.id);
        self.broker.links.remove(&self.id);
        Ok(())
    }
}
