//! Provisioning parameter loading.
//!
//! The parameter bag is assembled from, in increasing precedence:
//! a TOML file (`provision.toml` in the platform config directory unless a
//! path is given), `FLEETPROV_*` environment variables, and explicit
//! overrides from the caller (typically CLI flags).
//!
//! Environment variable names are matched to the camelCase parameter keys
//! ignoring case and underscores, so `FLEETPROV_ROOT_PATH` and
//! `FLEETPROV_ROOTPATH` both set `rootPath`. Unknown variables are ignored.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
    value::UncasedStr,
};
use thiserror::Error;

use fleetprov_core::ParameterBag;
use fleetprov_core::params::keys;

/// Environment variable prefix for parameter overrides.
pub const ENV_PREFIX: &str = "FLEETPROV_";

const CONFIG_FILE: &str = "provision.toml";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Default parameter file location via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "fleetprov", "fleetprov").map_or_else(
        || {
            let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
            p.push(".config");
            p.push("fleetprov");
            p.push(CONFIG_FILE);
            p
        },
        |dirs| dirs.config_dir().join(CONFIG_FILE),
    )
}

// ── Loading ─────────────────────────────────────────────────────────

/// Load the parameter bag from `path` (or the default location) and the
/// environment.
///
/// An explicit `path` must exist; a missing default file is treated as
/// empty.
pub fn load_parameters(path: Option<&Path>) -> Result<ParameterBag, ConfigError> {
    load_parameters_with(path, ParameterBag::new())
}

/// Like [`load_parameters`], with `overrides` taking precedence over both
/// file and environment. Empty override values are ignored.
pub fn load_parameters_with(
    path: Option<&Path>,
    overrides: ParameterBag,
) -> Result<ParameterBag, ConfigError> {
    let file = match path {
        Some(p) if !p.exists() => {
            return Err(ConfigError::NotFound {
                path: p.to_path_buf(),
            });
        }
        Some(p) => p.to_path_buf(),
        None => config_path(),
    };

    let overrides: ParameterBag = overrides
        .into_iter()
        .filter(|(_, v)| !(v.is_null() || v.as_str().is_some_and(str::is_empty)))
        .collect();

    let bag: ParameterBag = Figment::new()
        .merge(Toml::file(&file))
        .merge(environment())
        .merge(Serialized::defaults(overrides))
        .extract()?;
    Ok(bag)
}

fn environment() -> Env {
    // Env lowercases keys after `map` unless told otherwise.
    Env::prefixed(ENV_PREFIX)
        .lowercase(false)
        .filter(|key| canonical_key(key).is_some())
        .map(|key| {
            canonical_key(key)
                .map_or_else(|| key.as_str().to_owned(), str::to_owned)
                .into()
        })
}

/// Map an environment key (already stripped of its prefix) to the
/// parameter key it names.
fn canonical_key(key: &UncasedStr) -> Option<&'static str> {
    let folded: String = key
        .as_str()
        .chars()
        .filter(|c| *c != '_')
        .map(|c| c.to_ascii_lowercase())
        .collect();
    keys::ALL
        .into_iter()
        .find(|candidate| candidate.to_ascii_lowercase() == folded)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use figment::Jail;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn canonical_key_ignores_case_and_underscores() {
        assert_eq!(
            canonical_key(UncasedStr::new("ROOT_PATH")),
            Some("rootPath")
        );
        assert_eq!(
            canonical_key(UncasedStr::new("iotdataendpoint")),
            Some("iotDataEndpoint")
        );
        assert_eq!(canonical_key(UncasedStr::new("LOG_LEVEL")), None);
    }

    #[test]
    fn file_then_environment_then_overrides() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "provision.toml",
                r#"
                provisioningTemplate = "FromFile"
                rootPath = "/greengrass/v2"
                mqttPort = 8883

                [templateParameters]
                SerialNumber = "SN-1"
                "#,
            )?;
            jail.set_env("FLEETPROV_PROVISIONING_TEMPLATE", "FromEnv");
            jail.set_env(
                "FLEETPROV_IOT_DATA_ENDPOINT",
                "abc-ats.iot.eu-west-1.amazonaws.com",
            );
            jail.set_env("FLEETPROV_UNRELATED", "ignored");

            let overrides = ParameterBag::from([
                ("rootPath".to_owned(), json!("/override")),
                ("deviceId".to_owned(), json!("")),
            ]);
            let bag = load_parameters_with(Some(Path::new("provision.toml")), overrides)
                .map_err(|e| e.to_string())?;

            assert_eq!(bag["provisioningTemplate"], json!("FromEnv"));
            assert_eq!(
                bag["iotDataEndpoint"],
                json!("abc-ats.iot.eu-west-1.amazonaws.com")
            );
            assert_eq!(bag["rootPath"], json!("/override"));
            assert_eq!(bag["mqttPort"], json!(8883));
            assert_eq!(bag["templateParameters"], json!({ "SerialNumber": "SN-1" }));
            assert!(!bag.contains_key("deviceId"));
            assert!(!bag.keys().any(|k| k.eq_ignore_ascii_case("unrelated")));
            Ok(())
        });
    }

    #[test]
    fn environment_keys_keep_camel_case() {
        Jail::expect_with(|jail| {
            let home = jail.directory().display().to_string();
            jail.set_env("HOME", home);
            jail.set_env("XDG_CONFIG_HOME", jail.directory().join("xdg").display());
            jail.set_env("FLEETPROV_ROOT_PATH", "/gg");
            jail.set_env(
                "FLEETPROV_CLAIM_CERTIFICATE_PRIVATE_KEY_PATH",
                "/claim/key.pem",
            );
            jail.set_env("FLEETPROV_MQTT_PORT", "443");

            let bag = load_parameters(None).map_err(|e| e.to_string())?;

            assert_eq!(
                bag.keys().map(String::as_str).collect::<Vec<_>>(),
                vec!["claimCertificatePrivateKeyPath", "mqttPort", "rootPath"]
            );
            Ok(())
        });
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let err = load_parameters(Some(Path::new("/nonexistent/fleetprov/provision.toml")))
            .unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn missing_default_file_yields_environment_only() {
        Jail::expect_with(|jail| {
            let home = jail.directory().display().to_string();
            jail.set_env("HOME", home);
            jail.set_env("XDG_CONFIG_HOME", jail.directory().join("xdg").display());
            jail.set_env("FLEETPROV_ROOTPATH", "/gg");
            let bag = load_parameters(None).map_err(|e| e.to_string())?;
            assert_eq!(bag.get("rootPath"), Some(&json!("/gg")));
            Ok(())
        });
    }
}
