//! Clap derive structures for the `fleetprov` CLI.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::Value;

use fleetprov_core::ParameterBag;
use fleetprov_core::params::keys;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// fleetprov -- bootstrap a device identity with a fleet provisioning claim
#[derive(Debug, Parser)]
#[command(
    name = "fleetprov",
    version,
    about = "Provision an IoT device identity using a fleet provisioning claim certificate",
    long_about = "Connects to AWS IoT with a shared claim certificate, obtains a device\n\
        certificate and private key, registers the thing against a fleet\n\
        provisioning template, and prints the resulting device configuration.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Parameter file (TOML). Defaults to provision.toml in the config directory
    #[arg(long, short = 'c', env = "FLEETPROV_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "FLEETPROV_OUTPUT",
        default_value = "yaml",
        global = true
    )]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// YAML (default)
    Yaml,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run fleet provisioning and print the device configuration
    #[command(alias = "run")]
    Provision(ProvisionArgs),

    /// Check the provisioning parameters without connecting
    #[command(alias = "check")]
    Validate(ValidateArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Overrides for the most common parameters.
#[derive(Debug, Args)]
pub struct ParameterOverrides {
    /// Fleet provisioning template name
    #[arg(long)]
    pub template: Option<String>,

    /// AWS IoT data endpoint
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Directory that receives the device certificate and key
    #[arg(long)]
    pub root_path: Option<PathBuf>,

    /// Device id, also used as the MQTT client id
    #[arg(long)]
    pub device_id: Option<String>,
}

impl ParameterOverrides {
    pub fn to_bag(&self) -> ParameterBag {
        let mut bag = ParameterBag::new();
        let mut set = |key: &str, value: Option<String>| {
            if let Some(value) = value {
                bag.insert(key.to_owned(), Value::String(value));
            }
        };
        set(keys::PROVISIONING_TEMPLATE, self.template.clone());
        set(keys::IOT_DATA_ENDPOINT, self.endpoint.clone());
        set(
            keys::ROOT_PATH,
            self.root_path.as_ref().map(|p| p.display().to_string()),
        );
        set(keys::DEVICE_ID, self.device_id.clone());
        bag
    }
}

#[derive(Debug, Args)]
pub struct ProvisionArgs {
    #[command(flatten)]
    pub overrides: ParameterOverrides,

    /// Bound on each network step (e.g. 30s, 2m)
    #[arg(long, value_parser = humantime::parse_duration, default_value = "30s")]
    pub timeout: Duration,

    /// Delay between connect attempts after a transient failure
    #[arg(long, value_parser = humantime::parse_duration, default_value = "5s")]
    pub connect_retry_delay: Duration,

    /// Write the device configuration to this file instead of stdout
    #[arg(long)]
    pub output_file: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub overrides: ParameterOverrides,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
