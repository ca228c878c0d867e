// ── Core error types ──
//
// Provisioning failures, classified by what the caller should do next.
// Transport errors from fleetprov-mqtt are wrapped with the step they
// occurred in; consumers match on `kind()` rather than on the cause.

use std::path::PathBuf;

use thiserror::Error;

/// What a failure means for the provisioning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ErrorKind {
    /// Transient; the same step may succeed if attempted again.
    Retryable,
    /// Permanent for this run.
    Fatal,
    /// The run was cancelled.
    Interrupted,
    /// The parameter bag is incomplete or malformed.
    Validation,
}

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Retryable ────────────────────────────────────────────────────
    #[error("{context}: timed out after {timeout_secs}s")]
    Timeout { context: String, timeout_secs: u64 },

    #[error("{context}: {source}")]
    TransportTimeout {
        context: String,
        #[source]
        source: fleetprov_mqtt::Error,
    },

    // ── Fatal ────────────────────────────────────────────────────────
    #[error("{context}: {source}")]
    Transport {
        context: String,
        #[source]
        source: fleetprov_mqtt::Error,
    },

    /// The server answered on a rejected topic.
    #[error("{context}: request rejected: {message}")]
    Rejected {
        context: String,
        message: String,
        status_code: Option<u16>,
        error_code: Option<String>,
    },

    #[error("{context}: malformed reply: {message}")]
    MalformedReply { context: String, message: String },

    #[error("{context} {}: {source}", .path.display())]
    Persistence {
        context: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read CSR file {}: {source}", .path.display())]
    CsrRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Internal error: {0}")]
    Internal(String),

    // ── Interrupted ──────────────────────────────────────────────────
    #[error("{context}: interrupted")]
    Interrupted { context: String },

    // ── Validation ───────────────────────────────────────────────────
    /// Every violation found in the parameter bag, in key order.
    #[error("{}", .violations.join("; "))]
    Validation { violations: Vec<String> },
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } | Self::TransportTimeout { .. } => ErrorKind::Retryable,
            Self::Interrupted { .. } => ErrorKind::Interrupted,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Transport { .. }
            | Self::Rejected { .. }
            | Self::MalformedReply { .. }
            | Self::Persistence { .. }
            | Self::CsrRead { .. }
            | Self::Internal(_) => ErrorKind::Fatal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Retryable
    }

    pub fn is_interrupted(&self) -> bool {
        self.kind() == ErrorKind::Interrupted
    }

    /// Wrap a transport error from `context`, keeping timeouts retryable.
    pub fn transport(context: impl Into<String>, source: fleetprov_mqtt::Error) -> Self {
        let context = context.into();
        if source.is_timeout() {
            Self::TransportTimeout { context, source }
        } else {
            Self::Transport { context, source }
        }
    }

    pub(crate) fn missing_parameter(key: &str) -> String {
        format!("Required parameter {key} missing for aws.greengrass.FleetProvisioningByClaim")
    }
}
