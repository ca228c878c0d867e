//! Parameter bag validation.
//!
//! Provisioning is configured through a loosely typed key/value bag with
//! camelCase keys (see [`keys`]). [`ProvisionParameters::from_bag`] checks
//! every key up front and reports all violations in one
//! [`CoreError::Validation`], then resolves the output file locations.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use secrecy::SecretString;
use serde_json::Value;

use crate::error::CoreError;

/// Raw provisioning parameters as loaded from configuration.
pub type ParameterBag = BTreeMap<String, Value>;

/// Parameter names accepted in the bag.
pub mod keys {
    pub const PROVISIONING_TEMPLATE: &str = "provisioningTemplate";
    pub const CLAIM_CERTIFICATE_PATH: &str = "claimCertificatePath";
    pub const CLAIM_CERTIFICATE_PRIVATE_KEY_PATH: &str = "claimCertificatePrivateKeyPath";
    pub const ROOT_CA_PATH: &str = "rootCaPath";
    pub const IOT_DATA_ENDPOINT: &str = "iotDataEndpoint";
    pub const ROOT_PATH: &str = "rootPath";
    pub const MQTT_PORT: &str = "mqttPort";
    pub const DEVICE_ID: &str = "deviceId";
    pub const TEMPLATE_PARAMETERS: &str = "templateParameters";
    pub const AWS_REGION: &str = "awsRegion";
    pub const IOT_CREDENTIAL_ENDPOINT: &str = "iotCredentialEndpoint";
    pub const IOT_ROLE_ALIAS: &str = "iotRoleAlias";
    pub const PROXY_URL: &str = "proxyUrl";
    pub const PROXY_USERNAME: &str = "proxyUsername";
    pub const PROXY_PASSWORD: &str = "proxyPassword";
    pub const CSR_PATH: &str = "csrPath";
    pub const CSR_PRIVATE_KEY_PATH: &str = "csrPrivateKeyPath";
    pub const CERT_PATH: &str = "certPath";
    pub const KEY_PATH: &str = "keyPath";

    /// Keys that must be present and non-empty, in reporting order.
    pub const REQUIRED: [&str; 6] = [
        PROVISIONING_TEMPLATE,
        CLAIM_CERTIFICATE_PATH,
        CLAIM_CERTIFICATE_PRIVATE_KEY_PATH,
        ROOT_CA_PATH,
        IOT_DATA_ENDPOINT,
        ROOT_PATH,
    ];

    /// Every recognised key.
    pub const ALL: [&str; 19] = [
        PROVISIONING_TEMPLATE,
        CLAIM_CERTIFICATE_PATH,
        CLAIM_CERTIFICATE_PRIVATE_KEY_PATH,
        ROOT_CA_PATH,
        IOT_DATA_ENDPOINT,
        ROOT_PATH,
        MQTT_PORT,
        DEVICE_ID,
        TEMPLATE_PARAMETERS,
        AWS_REGION,
        IOT_CREDENTIAL_ENDPOINT,
        IOT_ROLE_ALIAS,
        PROXY_URL,
        PROXY_USERNAME,
        PROXY_PASSWORD,
        CSR_PATH,
        CSR_PRIVATE_KEY_PATH,
        CERT_PATH,
        KEY_PATH,
    ];
}

/// File name of the issued certificate under `rootPath`.
pub const DEFAULT_CERT_FILE: &str = "thingCert.crt";
/// File name of the issued private key under `rootPath`.
pub const DEFAULT_KEY_FILE: &str = "privKey.key";

/// CSR to submit instead of asking the service for a key pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrPaths {
    pub csr_path: PathBuf,
    /// Private key matching the CSR; copied to the key location.
    pub private_key_path: PathBuf,
}

/// Validated provisioning parameters.
#[derive(Debug, Clone)]
pub struct ProvisionParameters {
    pub provisioning_template: String,
    pub claim_certificate_path: PathBuf,
    pub claim_certificate_private_key_path: PathBuf,
    pub root_ca_path: PathBuf,
    pub iot_data_endpoint: String,
    pub root_path: PathBuf,
    pub mqtt_port: Option<u16>,
    pub device_id: Option<String>,
    pub template_parameters: BTreeMap<String, String>,
    pub aws_region: Option<String>,
    pub iot_credential_endpoint: Option<String>,
    pub iot_role_alias: Option<String>,
    /// May embed credentials, so it is kept secret like the password.
    pub proxy_url: Option<SecretString>,
    pub proxy_username: Option<String>,
    pub proxy_password: Option<SecretString>,
    pub csr: Option<CsrPaths>,
    /// Where the issued certificate is written.
    pub certificate_path: PathBuf,
    /// Where the issued (or CSR) private key is written.
    pub private_key_path: PathBuf,
}

impl ProvisionParameters {
    /// Validate `bag`, collecting every violation before failing.
    pub fn from_bag(bag: &ParameterBag) -> Result<Self, CoreError> {
        let mut violations = Vec::new();

        for key in keys::REQUIRED {
            if text(bag, key).is_none() {
                violations.push(CoreError::missing_parameter(key));
            }
        }

        let csr_path = text(bag, keys::CSR_PATH);
        let csr_private_key_path = text(bag, keys::CSR_PRIVATE_KEY_PATH);
        if csr_path.is_some() && csr_private_key_path.is_none() {
            violations.push(CoreError::missing_parameter(keys::CSR_PRIVATE_KEY_PATH));
        }

        let mqtt_port = match port(bag) {
            Ok(port) => port,
            Err(violation) => {
                violations.push(violation);
                None
            }
        };

        let template_parameters = match template_parameters(bag) {
            Ok(parameters) => parameters,
            Err(violation) => {
                violations.push(violation);
                BTreeMap::new()
            }
        };

        if !violations.is_empty() {
            return Err(CoreError::Validation { violations });
        }

        // Required keys were checked above.
        let required = |key: &str| text(bag, key).unwrap_or_default();
        let root_path = normalize(Path::new(&required(keys::ROOT_PATH)));
        let certificate_path = text(bag, keys::CERT_PATH).map_or_else(
            || root_path.join(DEFAULT_CERT_FILE),
            |p| normalize(Path::new(&p)),
        );
        let private_key_path = text(bag, keys::KEY_PATH).map_or_else(
            || root_path.join(DEFAULT_KEY_FILE),
            |p| normalize(Path::new(&p)),
        );

        Ok(Self {
            provisioning_template: required(keys::PROVISIONING_TEMPLATE),
            claim_certificate_path: PathBuf::from(required(keys::CLAIM_CERTIFICATE_PATH)),
            claim_certificate_private_key_path: PathBuf::from(required(
                keys::CLAIM_CERTIFICATE_PRIVATE_KEY_PATH,
            )),
            root_ca_path: PathBuf::from(required(keys::ROOT_CA_PATH)),
            iot_data_endpoint: required(keys::IOT_DATA_ENDPOINT),
            root_path,
            mqtt_port,
            device_id: text(bag, keys::DEVICE_ID),
            template_parameters,
            aws_region: text(bag, keys::AWS_REGION),
            iot_credential_endpoint: text(bag, keys::IOT_CREDENTIAL_ENDPOINT),
            iot_role_alias: text(bag, keys::IOT_ROLE_ALIAS),
            proxy_url: text(bag, keys::PROXY_URL).map(SecretString::from),
            proxy_username: text(bag, keys::PROXY_USERNAME),
            proxy_password: text(bag, keys::PROXY_PASSWORD).map(SecretString::from),
            csr: csr_path.zip(csr_private_key_path).map(|(csr, key)| CsrPaths {
                csr_path: normalize(Path::new(&csr)),
                private_key_path: normalize(Path::new(&key)),
            }),
            certificate_path,
            private_key_path,
        })
    }
}

/// Scalar value of `key` as text. Absent, null, and empty values are `None`.
fn text(bag: &ParameterBag, key: &str) -> Option<String> {
    match bag.get(key)? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn port(bag: &ParameterBag) -> Result<Option<u16>, String> {
    let Some(raw) = text(bag, keys::MQTT_PORT) else {
        return Ok(None);
    };
    match raw.trim().parse::<u16>() {
        Ok(port) if port > 0 => Ok(Some(port)),
        _ => Err(format!(
            "Invalid parameter {}: '{raw}' is not a port number",
            keys::MQTT_PORT
        )),
    }
}

fn template_parameters(bag: &ParameterBag) -> Result<BTreeMap<String, String>, String> {
    match bag.get(keys::TEMPLATE_PARAMETERS) {
        None | Some(Value::Null) => Ok(BTreeMap::new()),
        Some(Value::Object(map)) => Ok(map
            .iter()
            .filter_map(|(k, v)| match v {
                Value::Null => None,
                Value::String(s) => Some((k.clone(), s.clone())),
                other => Some((k.clone(), other.to_string())),
            })
            .collect()),
        Some(_) => Err(format!(
            "Invalid parameter {}: expected a map",
            keys::TEMPLATE_PARAMETERS
        )),
    }
}

/// Lexically normalise `path`: drop `.` and fold `..` into its parent.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let folds = matches!(out.components().next_back(), Some(Component::Normal(_)));
                if folds {
                    out.pop();
                } else if !matches!(
                    out.components().next_back(),
                    Some(Component::RootDir | Component::Prefix(_))
                ) {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
