//! Identity exchange over the fleet provisioning MQTT API.
//!
//! Every flow follows the same shape:
//!
//! 1. subscribe to `<request>/accepted`, wait for the ack
//! 2. subscribe to `<request>/rejected`, wait for the ack
//! 3. publish the request, wait for the publish ack
//! 4. return a [`PendingReply`] resolved by whichever reply arrives first
//!
//! Subscriptions always precede the publish so the reply cannot be missed.
//! The semantic reply is not awaited here; the caller decides how long to
//! wait for it.

mod model;
pub mod topics;

use std::sync::Arc;
use std::time::Duration;

use fleetprov_mqtt::{Connection, MessageHandler, QoS};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::correlator::{DEFAULT_OPERATION_TIMEOUT, acked, wait_for};
use crate::error::CoreError;
use crate::reply::{PendingReply, ReplySlot};

pub use model::{
    CreateCertificateFromCsrRequest, CreateCertificateFromCsrResponse,
    CreateKeysAndCertificateRequest, CreateKeysAndCertificateResponse, ErrorResponse,
    RegisterThingRequest, RegisterThingResponse,
};

/// Issues identity requests over an open [`Connection`].
pub struct IdentityClient<'a, C: Connection> {
    connection: &'a C,
    cancel: CancellationToken,
}

impl<'a, C: Connection> IdentityClient<'a, C> {
    pub fn new(connection: &'a C, cancel: CancellationToken) -> Self {
        Self { connection, cancel }
    }

    /// Ask the service to generate a key pair and certificate.
    ///
    /// `timeout` bounds each subscription ack.
    pub async fn create_keys_and_certificate(
        &self,
        timeout: Duration,
    ) -> Result<PendingReply<CreateKeysAndCertificateResponse>, CoreError> {
        self.exchange(
            "CreateKeysAndCertificate",
            topics::CREATE_KEYS_AND_CERTIFICATE,
            &CreateKeysAndCertificateRequest::default(),
            timeout,
        )
        .await
    }

    /// Ask the service to sign `csr` (PEM). The reply carries no private key.
    pub async fn create_certificate_from_csr(
        &self,
        csr: &str,
        timeout: Duration,
    ) -> Result<PendingReply<CreateCertificateFromCsrResponse>, CoreError> {
        let request = CreateCertificateFromCsrRequest {
            certificate_signing_request: csr.to_owned(),
        };
        self.exchange(
            "CreateCertificateFromCsr",
            topics::CREATE_CERTIFICATE_FROM_CSR,
            &request,
            timeout,
        )
        .await
    }

    /// Register a thing against the template named in `request`.
    pub async fn register_thing(
        &self,
        request: &RegisterThingRequest,
        timeout: Duration,
    ) -> Result<PendingReply<RegisterThingResponse>, CoreError> {
        let topic = topics::register_thing(&request.template_name);
        self.exchange("RegisterThing", &topic, request, timeout).await
    }

    async fn exchange<Req, Resp>(
        &self,
        operation: &'static str,
        request_topic: &str,
        request: &Req,
        timeout: Duration,
    ) -> Result<PendingReply<Resp>, CoreError>
    where
        Req: Serialize,
        Resp: DeserializeOwned + Send + 'static,
    {
        let (slot, reply) = ReplySlot::new();

        let accepted_slot = slot.clone();
        let on_accepted: MessageHandler = Arc::new(move |payload: &[u8]| {
            tracing::info!(operation, "received accepted reply");
            let decoded = serde_json::from_slice::<Resp>(payload).map_err(|e| {
                CoreError::MalformedReply {
                    context: operation.to_owned(),
                    message: e.to_string(),
                }
            });
            accepted_slot.complete(decoded);
        });

        let on_rejected: MessageHandler = Arc::new(move |payload: &[u8]| {
            let err = match serde_json::from_slice::<ErrorResponse>(payload) {
                Ok(response) => response.into_error(operation),
                Err(e) => CoreError::MalformedReply {
                    context: operation.to_owned(),
                    message: e.to_string(),
                },
            };
            tracing::error!(operation, error = %err, "request rejected");
            slot.complete(Err(err));
        });

        let accepted = topics::accepted(request_topic);
        self.subscribe(&accepted, on_accepted, timeout).await?;
        tracing::info!(operation, topic = %accepted, "subscribed to accepted topic");

        let rejected = topics::rejected(request_topic);
        self.subscribe(&rejected, on_rejected, timeout).await?;
        tracing::info!(operation, topic = %rejected, "subscribed to rejected topic");

        let payload = serde_json::to_vec(request)
            .map_err(|e| CoreError::Internal(format!("failed to encode {operation}: {e}")))?;
        let context = format!("Failed to publish to {request_topic}");
        let connection = self.connection;
        let ack = connection.publish(request_topic, QoS::AtLeastOnce, payload);
        wait_for(
            acked(ack, &context),
            DEFAULT_OPERATION_TIMEOUT,
            &self.cancel,
            &context,
        )
        .await?;
        tracing::info!(operation, topic = request_topic, "published request");

        Ok(reply)
    }

    async fn subscribe(
        &self,
        topic: &str,
        on_message: MessageHandler,
        timeout: Duration,
    ) -> Result<u16, CoreError> {
        let context = format!("Failed to subscribe to {topic}");
        let connection = self.connection;
        let ack = connection.subscribe(topic, QoS::AtLeastOnce, on_message);
        wait_for(acked(ack, &context), timeout, &self.cancel, &context).await
    }
}
