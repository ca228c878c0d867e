// Transport configuration for the claim-certificate MQTT connection.
//
// `ConnectionParameters` is the immutable description of one connection;
// `build_options` turns it into `rumqttc::MqttOptions`, loading the PEM
// material from disk and wiring mutual TLS, ALPN, and the optional proxy.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rumqttc::{MqttOptions, TlsConfiguration, Transport};
use secrecy::ExposeSecret;

use crate::error::Error;
use crate::proxy::{ProxyConfig, ProxyScheme};

/// Default port for MQTT over mutual TLS.
pub const DEFAULT_MQTT_PORT: u16 = 8883;

/// ALPN protocol that lets AWS IoT accept MQTT with client certificates on 443.
const ALPN_MQTT_CA: &[u8] = b"x-amzn-mqtt-ca";

const KEEP_ALIVE: Duration = Duration::from_secs(60);

/// Identity responses carry a certificate and private key; leave headroom.
const MAX_PACKET_SIZE: usize = 256 * 1024;

/// Everything needed to open one authenticated broker connection.
#[derive(Debug, Clone)]
pub struct ConnectionParameters {
    /// Claim certificate (PEM).
    pub cert_path: PathBuf,
    /// Claim certificate private key (PEM).
    pub key_path: PathBuf,
    /// Root CA used to verify the broker (PEM).
    pub root_ca_path: PathBuf,
    /// Broker host name, e.g. `abc123-ats.iot.us-east-1.amazonaws.com`.
    pub endpoint: String,
    pub client_id: String,
    /// Broker port. `None` means [`DEFAULT_MQTT_PORT`].
    pub port: Option<u16>,
    pub proxy: Option<ProxyConfig>,
}

impl ConnectionParameters {
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_MQTT_PORT)
    }
}

/// Build `rumqttc` options from connection parameters.
pub fn build_options(params: &ConnectionParameters) -> Result<MqttOptions, Error> {
    let port = params.effective_port();
    let mut options = MqttOptions::new(params.client_id.clone(), params.endpoint.clone(), port);
    options
        .set_clean_session(true)
        .set_keep_alive(KEEP_ALIVE)
        .set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);

    let ca = read_pem(&params.root_ca_path, "root CA")?;
    let cert = read_pem(&params.cert_path, "claim certificate")?;
    let key = read_pem(&params.key_path, "claim private key")?;
    let alpn = (port == 443).then(|| vec![ALPN_MQTT_CA.to_vec()]);

    options.set_transport(Transport::tls_with_config(TlsConfiguration::Simple {
        ca,
        alpn,
        client_auth: Some((cert, key)),
    }));

    if let Some(proxy) = &params.proxy {
        options.set_proxy(build_proxy(proxy)?);
    }

    Ok(options)
}

fn build_proxy(proxy: &ProxyConfig) -> Result<rumqttc::Proxy, Error> {
    let ty = match (proxy.scheme, &proxy.tls) {
        (ProxyScheme::Https, Some(tls)) => rumqttc::ProxyType::Https(TlsConfiguration::Simple {
            ca: read_pem(&tls.ca_path, "proxy CA")?,
            alpn: None,
            client_auth: None,
        }),
        (ProxyScheme::Https, None) => {
            return Err(Error::Tls(
                "https proxy configured without trust anchors".into(),
            ));
        }
        (ProxyScheme::Http, _) => rumqttc::ProxyType::Http,
    };

    let auth = match &proxy.credentials {
        Some(creds) => rumqttc::ProxyAuth::Basic {
            username: creds.username.clone(),
            password: creds.password.expose_secret().to_owned(),
        },
        None => rumqttc::ProxyAuth::None,
    };

    Ok(rumqttc::Proxy {
        ty,
        auth,
        addr: proxy.host.clone(),
        port: proxy.port,
    })
}

fn read_pem(path: &Path, what: &str) -> Result<Vec<u8>, Error> {
    std::fs::read(path)
        .map_err(|e| Error::Tls(format!("failed to read {what} {}: {e}", path.display())))
}
