//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` kinds into user-facing errors with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use fleetprov_config::ConfigError;
use fleetprov_core::{CoreError, ErrorKind};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const TIMEOUT: i32 = 8;
    pub const INTERRUPTED: i32 = 130;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Parameters ───────────────────────────────────────────────────
    #[error("Invalid provisioning parameters:\n{message}")]
    #[diagnostic(
        code(fleetprov::validation),
        help(
            "Set the missing keys in the parameter file (--config) or via\n\
             FLEETPROV_* environment variables, e.g. FLEETPROV_ROOT_PATH."
        )
    )]
    Validation { message: String },

    #[error(transparent)]
    #[diagnostic(
        code(fleetprov::config),
        help("Check the parameter file path and its TOML syntax.")
    )]
    Config(#[from] ConfigError),

    // ── Provisioning ─────────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(
        code(fleetprov::rejected),
        help(
            "The provisioning service refused the request. Check that the claim\n\
             certificate's policy allows the fleet provisioning topics and that the\n\
             provisioning template exists and accepts the template parameters."
        )
    )]
    Rejected { message: String },

    #[error("{message}")]
    #[diagnostic(
        code(fleetprov::timeout),
        help("Increase --timeout or check connectivity to the IoT data endpoint.")
    )]
    Timeout { message: String },

    #[error("Provisioning interrupted")]
    #[diagnostic(code(fleetprov::interrupted))]
    Interrupted,

    #[error(transparent)]
    #[diagnostic(code(fleetprov::provisioning))]
    Provisioning(CoreError),

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to render output: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validation { .. } | Self::Config(_) => exit_code::USAGE,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Interrupted => exit_code::INTERRUPTED,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err.kind() {
            ErrorKind::Validation => match err {
                CoreError::Validation { violations } => Self::Validation {
                    message: violations
                        .iter()
                        .map(|v| format!("  - {v}"))
                        .collect::<Vec<_>>()
                        .join("\n"),
                },
                other => Self::Provisioning(other),
            },
            ErrorKind::Retryable => Self::Timeout {
                message: err.to_string(),
            },
            ErrorKind::Interrupted => Self::Interrupted,
            ErrorKind::Fatal => match err {
                CoreError::Rejected { .. } => Self::Rejected {
                    message: err.to_string(),
                },
                other => Self::Provisioning(other),
            },
        }
    }
}
