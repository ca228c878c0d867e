// Fleet provisioning MQTT API topics (JSON payload format).

pub const CREATE_KEYS_AND_CERTIFICATE: &str = "$aws/certificates/create/json";
pub const CREATE_CERTIFICATE_FROM_CSR: &str = "$aws/certificates/create-from-csr/json";

/// Request topic for registering a thing against `template`.
pub fn register_thing(template: &str) -> String {
    format!("$aws/provisioning-templates/{template}/provision/json")
}

pub fn accepted(request_topic: &str) -> String {
    format!("{request_topic}/accepted")
}

pub fn rejected(request_topic: &str) -> String {
    format!("{request_topic}/rejected")
}
