//! End-to-end provisioning run.
//!
//! [`Provisioner::provision`] validates the parameter bag, opens one session
//! through the injected [`Connector`], and drives it through
//! [`ProvisioningStage`]s:
//!
//! ```text
//! ParametersResolved → Connecting → ConnectionOpen → IdentityObtained
//!     → ThingRegistered → ConfigurationAssembled → Disconnected
//! ```
//!
//! Only the connect step is retried. Every other failure ends the run, but
//! an open session is always disconnected first and a disconnect failure
//! never overrides the run's outcome.

use std::time::Duration;

use fleetprov_mqtt::{Connection, ConnectionParameters, Connector, ProxyConfig, ProxyTls};
use secrecy::ExposeSecret;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::ProvisioningConfiguration;
use crate::correlator::{DEFAULT_OPERATION_TIMEOUT, acked, wait_for};
use crate::error::CoreError;
use crate::identity::{IdentityClient, RegisterThingRequest};
use crate::params::{CsrPaths, ParameterBag, ProvisionParameters};
use crate::persist;

/// Delay between connect attempts after a retryable failure.
pub const DEFAULT_CONNECT_RETRY_DELAY: Duration = Duration::from_secs(5);

// ── ProvisioningStage ────────────────────────────────────────────────

/// Progress of a provisioning run, observable through
/// [`Provisioner::stages`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ProvisioningStage {
    NotStarted,
    ParametersResolved,
    Connecting,
    ConnectionOpen,
    IdentityObtained,
    ThingRegistered,
    ConfigurationAssembled,
    /// Terminal. Reached on success and on failure.
    Disconnected,
}

// ── ProvisionerOptions ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisionerOptions {
    /// Bound on each acknowledgement and reply wait.
    pub operation_timeout: Duration,
    pub connect_retry_delay: Duration,
}

impl Default for ProvisionerOptions {
    fn default() -> Self {
        Self {
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            connect_retry_delay: DEFAULT_CONNECT_RETRY_DELAY,
        }
    }
}

// ── Provisioner ──────────────────────────────────────────────────────

pub struct Provisioner<C: Connector> {
    connector: C,
    options: ProvisionerOptions,
    cancel: CancellationToken,
    stage: watch::Sender<ProvisioningStage>,
}

impl<C: Connector> Provisioner<C> {
    /// `cancel` interrupts the run at its next wait.
    pub fn new(connector: C, options: ProvisionerOptions, cancel: CancellationToken) -> Self {
        let (stage, _) = watch::channel(ProvisioningStage::NotStarted);
        Self {
            connector,
            options,
            cancel,
            stage,
        }
    }

    pub fn stages(&self) -> watch::Receiver<ProvisioningStage> {
        self.stage.subscribe()
    }

    /// Validate `bag` and run one provisioning attempt.
    pub async fn provision(
        &self,
        bag: &ParameterBag,
    ) -> Result<ProvisioningConfiguration, CoreError> {
        let params = ProvisionParameters::from_bag(bag)?;
        self.run(&params).await
    }

    /// Run one provisioning attempt with already validated parameters.
    pub async fn run(
        &self,
        params: &ProvisionParameters,
    ) -> Result<ProvisioningConfiguration, CoreError> {
        tracing::debug!(parameters = ?params, "resolved provisioning parameters");
        self.set_stage(ProvisioningStage::ParametersResolved);

        let result = self.open_and_provision(params).await;
        self.set_stage(ProvisioningStage::Disconnected);

        if let Err(e) = &result {
            if !e.is_interrupted() {
                tracing::error!(
                    error = %e,
                    kind = %e.kind(),
                    "provisioning failed"
                );
            }
        }
        result
    }

    async fn open_and_provision(
        &self,
        params: &ProvisionParameters,
    ) -> Result<ProvisioningConfiguration, CoreError> {
        let connection_params = connection_parameters(params)?;
        // Dropping the session releases its TLS and proxy material.
        let connection = self
            .connector
            .open(&connection_params)
            .map_err(|e| CoreError::transport("Failed to create MQTT connection", e))?;

        self.set_stage(ProvisioningStage::Connecting);
        self.connect(&connection).await?;
        self.set_stage(ProvisioningStage::ConnectionOpen);

        let outcome = self.exchange(&connection, params).await;
        self.disconnect(&connection).await;
        outcome
    }

    /// Connect, retrying retryable failures until success or cancellation.
    async fn connect(&self, connection: &C::Connection) -> Result<(), CoreError> {
        const CONTEXT: &str = "Failed to connect to AWS IoT";
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match wait_for(
                acked(connection.connect(), CONTEXT),
                self.options.operation_timeout,
                &self.cancel,
                CONTEXT,
            )
            .await
            {
                Ok(session_present) => {
                    tracing::info!(attempt, session_present, "connected to AWS IoT");
                    return Ok(());
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(
                        error = %e,
                        attempt,
                        retry_in_ms = u64::try_from(self.options.connect_retry_delay.as_millis())
                            .unwrap_or(u64::MAX),
                        retryable = true,
                        "connect failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        () = self.cancel.cancelled() => {
                            return Err(CoreError::Interrupted { context: CONTEXT.to_owned() });
                        }
                        () = tokio::time::sleep(self.options.connect_retry_delay) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn exchange(
        &self,
        connection: &C::Connection,
        params: &ProvisionParameters,
    ) -> Result<ProvisioningConfiguration, CoreError> {
        let identity = IdentityClient::new(connection, self.cancel.clone());

        let ownership_token = match &params.csr {
            None => self.create_keys_and_certificate(&identity, params).await?,
            Some(csr) => self.sign_csr(&identity, params, csr).await?,
        };
        self.set_stage(ProvisioningStage::IdentityObtained);

        let request = RegisterThingRequest {
            template_name: params.provisioning_template.clone(),
            certificate_ownership_token: ownership_token,
            parameters: params.template_parameters.clone(),
        };
        let reply = identity
            .register_thing(&request, self.options.operation_timeout)
            .await?;
        let registered = wait_for(
            reply,
            self.options.operation_timeout,
            &self.cancel,
            "Failed to register thing",
        )
        .await?;
        tracing::info!(
            thing_name = %registered.thing_name,
            template = %params.provisioning_template,
            "registered thing"
        );
        self.set_stage(ProvisioningStage::ThingRegistered);

        let configuration = ProvisioningConfiguration::assemble(params, &registered.thing_name);
        self.set_stage(ProvisioningStage::ConfigurationAssembled);
        Ok(configuration)
    }

    async fn create_keys_and_certificate(
        &self,
        identity: &IdentityClient<'_, C::Connection>,
        params: &ProvisionParameters,
    ) -> Result<String, CoreError> {
        let reply = identity
            .create_keys_and_certificate(self.options.operation_timeout)
            .await?;
        let issued = wait_for(
            reply,
            self.options.operation_timeout,
            &self.cancel,
            "Failed to create keys and certificate",
        )
        .await?;
        tracing::info!(certificate_id = %issued.certificate_id, "received keys and certificate");

        persist::write_private_file(&params.certificate_path, &issued.certificate_pem)?;
        persist::write_private_file(&params.private_key_path, &issued.private_key)?;
        Ok(issued.certificate_ownership_token)
    }

    async fn sign_csr(
        &self,
        identity: &IdentityClient<'_, C::Connection>,
        params: &ProvisionParameters,
        csr: &CsrPaths,
    ) -> Result<String, CoreError> {
        let request =
            std::fs::read_to_string(&csr.csr_path).map_err(|source| CoreError::CsrRead {
                path: csr.csr_path.clone(),
                source,
            })?;
        // Both halves of the identity must be in hand before anything is written.
        let private_key = persist::read_private_file(&csr.private_key_path)?;
        let reply = identity
            .create_certificate_from_csr(&request, self.options.operation_timeout)
            .await?;
        let issued = wait_for(
            reply,
            self.options.operation_timeout,
            &self.cancel,
            "Failed to create certificate from CSR",
        )
        .await?;
        tracing::info!(certificate_id = %issued.certificate_id, "received certificate for CSR");

        persist::write_private_file(&params.certificate_path, &issued.certificate_pem)?;
        persist::write_private_file(&params.private_key_path, &private_key)?;
        persist::restrict_private_file(&csr.private_key_path)?;
        Ok(issued.certificate_ownership_token)
    }

    /// Best effort. Runs even after cancellation.
    async fn disconnect(&self, connection: &C::Connection) {
        const CONTEXT: &str = "Failed to disconnect";
        let result = wait_for(
            acked(connection.disconnect(), CONTEXT),
            self.options.operation_timeout,
            &CancellationToken::new(),
            CONTEXT,
        )
        .await;
        match result {
            Ok(()) => tracing::debug!("disconnected from AWS IoT"),
            Err(e) => tracing::warn!(error = %e, "disconnect failed (non-fatal)"),
        }
    }

    fn set_stage(&self, stage: ProvisioningStage) {
        self.stage.send_replace(stage);
        tracing::info!(%stage, "provisioning stage");
    }
}

/// Build the broker connection description. The client id is the device
/// id when one is configured, otherwise a fresh UUID.
fn connection_parameters(params: &ProvisionParameters) -> Result<ConnectionParameters, CoreError> {
    let proxy = ProxyConfig::resolve(
        params.proxy_url.as_ref().map(|s| s.expose_secret()),
        params.proxy_username.as_deref(),
        params.proxy_password.as_ref().map(|s| s.expose_secret()),
        Some(ProxyTls {
            ca_path: params.root_ca_path.clone(),
        }),
    )
    .map_err(|e| CoreError::transport("Invalid proxy configuration", e))?;

    Ok(ConnectionParameters {
        cert_path: params.claim_certificate_path.clone(),
        key_path: params.claim_certificate_private_key_path.clone(),
        root_ca_path: params.root_ca_path.clone(),
        endpoint: params.iot_data_endpoint.clone(),
        client_id: params
            .device_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        port: params.mqtt_port,
        proxy,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn params(extra: serde_json::Value) -> ProvisionParameters {
        let mut raw = json!({
            "provisioningTemplate": "T1",
            "claimCertificatePath": "/claim/cert.pem",
            "claimCertificatePrivateKeyPath": "/claim/key.pem",
            "rootCaPath": "/gg/root.pem",
            "iotDataEndpoint": "E",
            "rootPath": "/gg"
        });
        if let (Some(base), Some(extra)) = (raw.as_object_mut(), extra.as_object()) {
            base.extend(extra.clone());
        }
        ProvisionParameters::from_bag(&serde_json::from_value(raw).unwrap()).unwrap()
    }

    #[test]
    fn client_id_is_device_id_when_given() {
        let built = connection_parameters(&params(json!({ "deviceId": "dev-7" }))).unwrap();
        assert_eq!(built.client_id, "dev-7");
        assert_eq!(built.endpoint, "E");
        assert!(built.proxy.is_none());
    }

    #[test]
    fn client_id_defaults_to_uuid() {
        let built = connection_parameters(&params(json!({}))).unwrap();
        assert!(uuid::Uuid::parse_str(&built.client_id).is_ok());
    }

    #[test]
    fn https_proxy_trusts_root_ca() {
        let built =
            connection_parameters(&params(json!({ "proxyUrl": "https://proxy:8443" }))).unwrap();
        let proxy = built.proxy.unwrap();
        assert_eq!(proxy.port, 8443);
        assert_eq!(
            proxy.tls,
            Some(ProxyTls {
                ca_path: "/gg/root.pem".into()
            })
        );
    }

    #[test]
    fn bad_proxy_url_is_fatal() {
        let err = connection_parameters(&params(json!({ "proxyUrl": "socks5://proxy" })))
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Fatal);
    }

    #[test]
    fn stage_names() {
        assert_eq!(
            ProvisioningStage::ThingRegistered.to_string(),
            "ThingRegistered"
        );
    }
}
