//! Claim-based fleet provisioning on top of `fleetprov-mqtt`.
//!
//! A device holding only a shared *claim certificate* uses this crate to
//! obtain its own identity and register itself:
//!
//! - **[`Provisioner`]**: runs one provisioning attempt end to end. Opens a
//!   session through an injected [`Connector`](fleetprov_mqtt::Connector),
//!   retries the connect on retryable failures, exchanges identity, writes
//!   the certificate and key, registers the thing, and always disconnects.
//!   Progress is published as [`ProvisioningStage`] values.
//!
//! - **[`IdentityClient`]**: the three request/response flows of the fleet
//!   provisioning MQTT API. Each flow subscribes to the accepted and rejected
//!   reply topics, publishes the request, and hands back a [`PendingReply`]
//!   that the first reply resolves.
//!
//! - **[`wait_for`](correlator::wait_for)**: bounded, cancellable waits that
//!   classify every failure as retryable, fatal, or interrupted
//!   ([`ErrorKind`]).
//!
//! - **[`ProvisionParameters`]**: validated view over the loosely typed
//!   parameter bag, reporting every missing key at once.

pub mod config;
pub mod correlator;
pub mod error;
pub mod identity;
pub mod params;
pub mod persist;
pub mod provisioner;
pub mod reply;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{NucleusConfiguration, ProvisioningConfiguration, SystemConfiguration};
pub use correlator::DEFAULT_OPERATION_TIMEOUT;
pub use error::{CoreError, ErrorKind};
pub use identity::{
    CreateCertificateFromCsrResponse, CreateKeysAndCertificateResponse, ErrorResponse,
    IdentityClient, RegisterThingRequest, RegisterThingResponse,
};
pub use params::{ParameterBag, ProvisionParameters};
pub use provisioner::{
    DEFAULT_CONNECT_RETRY_DELAY, Provisioner, ProvisionerOptions, ProvisioningStage,
};
pub use reply::{PendingReply, ReplySlot};
