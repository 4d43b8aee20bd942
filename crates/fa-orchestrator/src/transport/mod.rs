//! Broker transports
//!
//! - [`MqttTransport`]: a real MQTT broker connection
//! - [`MemoryBroker`]: an in-process broker used by tests and demos

mod memory;
mod mqtt;

pub use memory::MemoryBroker;
pub use mqtt::MqttTransport;
