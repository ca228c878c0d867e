// fleetprov-mqtt: acknowledged MQTT sessions for claim-based fleet provisioning

pub mod ack;
pub mod connection;
pub mod error;
pub mod proxy;
pub mod session;
pub mod transport;

pub use ack::{Ack, AckSender};
pub use connection::{Connection, Connector, MessageHandler};
pub use error::Error;
pub use proxy::{ProxyConfig, ProxyCredentials, ProxyScheme, ProxyTls};
pub use rumqttc::QoS;
pub use session::{MqttConnector, MqttSession};
pub use transport::{ConnectionParameters, DEFAULT_MQTT_PORT};
