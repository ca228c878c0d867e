use thiserror::Error;

/// Top-level error type for the `fleetprov-mqtt` crate.
///
/// Covers every failure mode of the session layer: reading TLS material,
/// building the client, the broker connection itself, and per-operation
/// acknowledgements. `fleetprov-core` classifies these into retryable and
/// fatal provisioning failures.
#[derive(Debug, Error)]
pub enum Error {
    // ── TLS material ────────────────────────────────────────────────
    /// A certificate, key, or CA file could not be read.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Proxy ───────────────────────────────────────────────────────
    /// The proxy URL could not be parsed or uses an unsupported scheme.
    #[error("Invalid proxy URL '{url}': {reason}")]
    InvalidProxyUrl { url: String, reason: String },

    // ── Connection ──────────────────────────────────────────────────
    /// The broker could not be reached or the connection dropped.
    #[error("MQTT connection error: {0}")]
    Connection(String),

    /// The broker answered CONNECT with a non-success return code.
    #[error("MQTT connection refused: {0}")]
    ConnectionRefused(String),

    /// The network operation did not complete in time.
    #[error("MQTT operation timed out: {0}")]
    Timeout(String),

    /// The session was closed before the operation was acknowledged.
    #[error("MQTT session closed before the operation was acknowledged")]
    ConnectionClosed,

    // ── Operations ──────────────────────────────────────────────────
    /// The client request queue rejected the operation.
    #[error("MQTT client error: {0}")]
    Client(String),

    /// The broker answered SUBSCRIBE with a failure return code.
    #[error("Subscription to '{topic}' rejected by broker")]
    SubscribeRejected { topic: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` if this error signals an operation timeout.
    ///
    /// Transport libraries report timeouts in several shapes, so the message
    /// is inspected as well as the variant.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::TimedOut,
            Self::Connection(msg) | Self::Client(msg) => {
                let msg = msg.to_ascii_lowercase();
                msg.contains("timed out") || msg.contains("timeout")
            }
            _ => false,
        }
    }
}

impl From<rumqttc::ClientError> for Error {
    fn from(err: rumqttc::ClientError) -> Self {
        Self::Client(err.to_string())
    }
}

impl From<rumqttc::ConnectionError> for Error {
    fn from(err: rumqttc::ConnectionError) -> Self {
        match err {
            rumqttc::ConnectionError::NetworkTimeout | rumqttc::ConnectionError::FlushTimeout => {
                Self::Timeout(err.to_string())
            }
            rumqttc::ConnectionError::ConnectionRefused(code) => {
                Self::ConnectionRefused(format!("{code:?}"))
            }
            rumqttc::ConnectionError::Io(e) => Self::Io(e),
            other => Self::Connection(other.to_string()),
        }
    }
}
