// ── Provisioning output ──
//
// The configuration handed back after a successful run. Serialised in
// camelCase with absent optionals omitted, so it can be merged directly
// into a device runtime configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::params::ProvisionParameters;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningConfiguration {
    pub system: SystemConfiguration,
    pub nucleus: NucleusConfiguration,
}

/// Identity of the provisioned device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemConfiguration {
    pub thing_name: String,
    pub certificate_file_path: PathBuf,
    pub private_key_path: PathBuf,
    #[serde(rename = "rootCAPath")]
    pub root_ca_path: PathBuf,
}

/// Cloud endpoints the device should use from now on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NucleusConfiguration {
    pub iot_data_endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iot_credentials_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iot_role_alias: Option<String>,
}

impl ProvisioningConfiguration {
    pub fn assemble(params: &ProvisionParameters, thing_name: &str) -> Self {
        Self {
            system: SystemConfiguration {
                thing_name: thing_name.to_owned(),
                certificate_file_path: params.certificate_path.clone(),
                private_key_path: params.private_key_path.clone(),
                root_ca_path: params.root_ca_path.clone(),
            },
            nucleus: NucleusConfiguration {
                iot_data_endpoint: params.iot_data_endpoint.clone(),
                aws_region: params.aws_region.clone(),
                iot_credentials_endpoint: params.iot_credential_endpoint.clone(),
                iot_role_alias: params.iot_role_alias.clone(),
            },
        }
    }
}
