//! `fleetprov validate`: resolve and check parameters offline.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use fleetprov_core::ProvisionParameters;

use crate::cli::{GlobalOpts, ValidateArgs};
use crate::error::CliError;
use crate::output;

const REDACTED: &str = "<redacted>";

/// Resolved parameters as shown to the user. Secrets are masked.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Summary<'a> {
    provisioning_template: &'a str,
    iot_data_endpoint: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    mqtt_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    device_id: Option<&'a str>,
    claim_certificate_path: &'a PathBuf,
    claim_certificate_private_key_path: &'a PathBuf,
    root_ca_path: &'a PathBuf,
    certificate_path: &'a PathBuf,
    private_key_path: &'a PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    csr_path: Option<&'a PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    template_parameters: Option<&'a BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    proxy_url: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    proxy_username: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    proxy_password: Option<&'static str>,
}

impl<'a> From<&'a ProvisionParameters> for Summary<'a> {
    fn from(p: &'a ProvisionParameters) -> Self {
        Self {
            provisioning_template: &p.provisioning_template,
            iot_data_endpoint: &p.iot_data_endpoint,
            mqtt_port: p.mqtt_port,
            device_id: p.device_id.as_deref(),
            claim_certificate_path: &p.claim_certificate_path,
            claim_certificate_private_key_path: &p.claim_certificate_private_key_path,
            root_ca_path: &p.root_ca_path,
            certificate_path: &p.certificate_path,
            private_key_path: &p.private_key_path,
            csr_path: p.csr.as_ref().map(|csr| &csr.csr_path),
            template_parameters: Some(&p.template_parameters).filter(|m| !m.is_empty()),
            proxy_url: p.proxy_url.as_ref().map(|_| REDACTED),
            proxy_username: p.proxy_username.as_deref(),
            proxy_password: p.proxy_password.as_ref().map(|_| REDACTED),
        }
    }
}

pub fn handle(args: &ValidateArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let bag = super::load(global, &args.overrides)?;
    let params = ProvisionParameters::from_bag(&bag)?;
    let rendered = output::render(global.output, &Summary::from(&params))?;
    output::print_output(&rendered, global.quiet);
    Ok(())
}
