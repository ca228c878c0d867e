//! Command handlers.

pub mod provision;
pub mod validate;

use fleetprov_core::ParameterBag;

use crate::cli::{GlobalOpts, ParameterOverrides};
use crate::error::CliError;

/// Load the parameter bag with CLI overrides applied on top.
fn load(global: &GlobalOpts, overrides: &ParameterOverrides) -> Result<ParameterBag, CliError> {
    Ok(fleetprov_config::load_parameters_with(
        global.config.as_deref(),
        overrides.to_bag(),
    )?)
}
