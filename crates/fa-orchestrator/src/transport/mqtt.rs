//! MQTT transport

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
    SubscribeReasonCode,
};
use tokio::sync::mpsc;

use fa_core::config::BrokerConfig;
use fa_core::traits::{Transport, TransportEvent, TransportLink, TransportSession};
use fa_core::ConnectionError;

/// Capacity of the client request queue and the inbound event queue
const QUEUE_CAPACITY: usize = 64;

/// Opens MQTT connections to one broker
#[derive(Debug, Clone)]
pub struct MqttTransport {
    config: BrokerConfig,
    handshake_timeout: Duration,
}

impl MqttTransport {
    /// Create a transport for the configured broker
    pub fn new(config: BrokerConfig, handshake_timeout: Duration) -> Self {
        Self {
            config,
            handshake_timeout,
        }
    }

    fn options(&self, client_id: &str) -> MqttOptions {
        let mut options = MqttOptions::new(client_id, self.config.host.clone(), self.config.port);
        options.set_keep_alive(self.config.keep_alive.max(Duration::from_secs(1)));
        options.set_clean_session(true);
        if let Some(username) = &self.config.username {
            options.set_credentials(username.clone(), self.config.password.clone().unwrap_or_default());
        }
        options
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn open(&self, client_id: &str) -> Result<TransportSession, ConnectionError> {
        let (client, mut eventloop) = AsyncClient::new(self.options(client_id), QUEUE_CAPACITY);

        tracing::debug!(
            "Connecting to MQTT broker {}:{} as {}",
            self.config.host,
            self.config.port,
            client_id
        );

        match tokio::time::timeout(self.handshake_timeout, handshake(&mut eventloop)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(ConnectionError::Timeout(self.handshake_timeout)),
        }

        tracing::info!("Connected to MQTT broker {}:{}", self.config.host, self.config.port);

        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let closing = Arc::new(AtomicBool::new(false));
        tokio::spawn(poll_events(eventloop, tx, Arc::clone(&closing)));

        Ok(TransportSession {
            link: Box::new(MqttLink { client, closing }),
            events: rx,
        })
    }
}

/// Drive the event loop until the broker acknowledges the connection
async fn handshake(eventloop: &mut EventLoop) -> Result<(), ConnectionError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => return refused(ack.code),
            Ok(_) => continue,
            Err(rumqttc::ConnectionError::ConnectionRefused(code)) => return refused(code),
            Err(e) => return Err(ConnectionError::classify(e.to_string())),
        }
    }
}

fn refused(code: ConnectReturnCode) -> Result<(), ConnectionError> {
    match code {
        ConnectReturnCode::Success => Ok(()),
        ConnectReturnCode::BadUserNamePassword | ConnectReturnCode::NotAuthorized => {
            Err(ConnectionError::Auth(format!("broker refused connection: {:?}", code)))
        }
        ConnectReturnCode::ServiceUnavailable => {
            Err(ConnectionError::Network(format!("broker refused connection: {:?}", code)))
        }
        other => Err(ConnectionError::Transport(format!("broker refused connection: {:?}", other))),
    }
}

/// Forward broker traffic to the event queue until disconnect or failure
async fn poll_events(mut eventloop: EventLoop, tx: mpsc::Sender<TransportEvent>, closing: Arc<AtomicBool>) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let event = TransportEvent::Message {
                    topic: publish.topic.clone(),
                    payload: publish.payload.clone(),
                };
                if tx.send(event).await.is_err() {
                    break;
                }
            }
            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                for code in &ack.return_codes {
                    if matches!(code, SubscribeReasonCode::Failure) {
                        tracing::warn!("Broker rejected a subscription (packet {})", ack.pkid);
                    }
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                tracing::debug!("MQTT disconnect sent");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                if !closing.load(Ordering::Acquire) {
                    let _ = tx
                        .send(TransportEvent::Failed(ConnectionError::classify(e.to_string())))
                        .await;
                }
                break;
            }
        }
    }
}

struct MqttLink {
    client: AsyncClient,
    closing: Arc<AtomicBool>,
}

#[async_trait]
impl TransportLink for MqttLink {
    async fn subscribe(&self, topic: &str) -> Result<(), ConnectionError> {
        self.client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| ConnectionError::classify(e.to_string()))
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), ConnectionError> {
        self.client
            .try_unsubscribe(topic)
            .map_err(|e| ConnectionError::Transport(e.to_string()))
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        if self.closing.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.client
            .try_disconnect()
            .map_err(|e| ConnectionError::Transport(e.to_string()))
    }
}
