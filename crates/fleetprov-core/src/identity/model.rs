// ── Fleet provisioning wire types ──
//
// Request and response bodies exchanged on the `$aws/certificates/...` and
// `$aws/provisioning-templates/...` topics. Field names follow the AWS
// JSON payloads (camelCase).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ── Issuance ─────────────────────────────────────────────────────────

/// Body of a create-keys-and-certificate request. Always `{}`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateKeysAndCertificateRequest {}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateKeysAndCertificateResponse {
    pub certificate_id: String,
    pub certificate_pem: String,
    pub private_key: String,
    pub certificate_ownership_token: String,
}

impl fmt::Debug for CreateKeysAndCertificateResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateKeysAndCertificateResponse")
            .field("certificate_id", &self.certificate_id)
            .field("certificate_pem", &self.certificate_pem)
            .field("private_key", &"[REDACTED]")
            .field("certificate_ownership_token", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCertificateFromCsrRequest {
    pub certificate_signing_request: String,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCertificateFromCsrResponse {
    pub certificate_id: String,
    pub certificate_pem: String,
    pub certificate_ownership_token: String,
}

impl fmt::Debug for CreateCertificateFromCsrResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateCertificateFromCsrResponse")
            .field("certificate_id", &self.certificate_id)
            .field("certificate_pem", &self.certificate_pem)
            .field("certificate_ownership_token", &"[REDACTED]")
            .finish()
    }
}

// ── Registration ─────────────────────────────────────────────────────

/// Register-thing request. The template name travels in the topic, not
/// the payload; `parameters` is left out of the payload when empty.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterThingRequest {
    #[serde(skip)]
    pub template_name: String,
    pub certificate_ownership_token: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
}

impl fmt::Debug for RegisterThingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterThingRequest")
            .field("template_name", &self.template_name)
            .field("certificate_ownership_token", &"[REDACTED]")
            .field("parameters", &self.parameters)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterThingResponse {
    pub thing_name: String,
    #[serde(default)]
    pub device_configuration: BTreeMap<String, String>,
}

// ── Rejection ────────────────────────────────────────────────────────

/// Payload published on every `/rejected` topic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl ErrorResponse {
    pub fn into_error(self, context: &str) -> CoreError {
        let message = self
            .error_message
            .clone()
            .unwrap_or_else(|| self.error_code.clone().unwrap_or_else(|| "no reason given".into()));
        CoreError::Rejected {
            context: context.to_owned(),
            message,
            status_code: self.status_code,
            error_code: self.error_code,
        }
    }
}
