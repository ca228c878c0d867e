//! Connection abstraction consumed by the provisioning core.
//!
//! The core never touches the MQTT client directly. It drives a
//! [`Connection`]: connect/disconnect plus topic-keyed publish/subscribe,
//! each returning an [`Ack`] that resolves on delivery confirmation.
//! Production uses [`MqttSession`](crate::MqttSession); tests script their
//! own implementation.

use std::sync::Arc;

use rumqttc::QoS;

use crate::ack::Ack;
use crate::error::Error;
use crate::transport::ConnectionParameters;

/// Callback invoked with the payload of every message received on a
/// subscribed topic. Runs on the session driver task, so it must not block.
pub type MessageHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// One authenticated broker connection.
pub trait Connection: Send + Sync {
    /// Start the connect handshake. Resolves with the broker's
    /// `session_present` flag once CONNACK arrives.
    fn connect(&self) -> Ack<bool>;

    /// Send DISCONNECT. Resolves once the packet has been handed to the
    /// network. Resolves immediately if the session is not connected.
    fn disconnect(&self) -> Ack<()>;

    /// Subscribe to `topic` and route every inbound message on it to
    /// `on_message`. The handler is registered before the request is sent,
    /// so replies racing the SUBACK are not lost.
    fn subscribe(&self, topic: &str, qos: QoS, on_message: MessageHandler) -> Ack<u16>;

    /// Publish `payload` to `topic`. For QoS 1 the ack resolves on PUBACK.
    fn publish(&self, topic: &str, qos: QoS, payload: Vec<u8>) -> Ack<u16>;
}

/// Opens [`Connection`]s. Injected into the provisioner so tests can
/// substitute scripted connections.
pub trait Connector: Send + Sync {
    type Connection: Connection;

    /// Build a session for `params`. Does not connect.
    fn open(&self, params: &ConnectionParameters) -> Result<Self::Connection, Error>;
}
