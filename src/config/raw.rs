//! Declared configuration
//!
//! The as-written configuration tree. Every scalar and every nested group is
//! tri-state so that an explicit `null` and a missing key are both kept
//! distinct from a real value.

use crate::error::ConfigError;
use serde::{Deserialize, Deserializer};
use std::path::Path;

/// A declared value: missing, explicitly null, or set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Declared<T> {
    Absent,
    Null,
    Value(T),
}

impl<T> Declared<T> {
    /// The value, if one was declared
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Value(v) => Some(v),
            Self::Absent | Self::Null => None,
        }
    }

    pub fn is_set(&self) -> bool {
        matches!(self, Self::Value(_))
    }
}

impl<T> Default for Declared<T> {
    fn default() -> Self {
        Self::Absent
    }
}

impl<T> From<T> for Declared<T> {
    fn from(value: T) -> Self {
        Self::Value(value)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Declared<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Missing keys never reach here; `#[serde(default)]` yields Absent
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(v) => Self::Value(v),
            None => Self::Null,
        })
    }
}

/// Root of the declarative configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawConfiguration {
    pub cloud: Declared<String>,
    pub tenant_id: Declared<String>,
    pub auth_method: Declared<String>,
    pub entra_id_options: Declared<RawEntraIdOptions>,
    pub client_options: Declared<RawClientOptions>,
    pub telemetry_optout: Declared<bool>,
    pub debug_mode: Declared<bool>,
}

/// Identity options (one shared block for every auth method)
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawEntraIdOptions {
    pub client_id: Declared<String>,
    pub client_secret: Declared<String>,
    pub client_certificate: Declared<String>,
    pub client_certificate_file_path: Declared<String>,
    pub client_certificate_password: Declared<String>,
    pub send_certificate_chain: Declared<bool>,
    pub username: Declared<String>,
    pub password: Declared<String>,
    pub user_assertion: Declared<String>,
    pub disable_instance_discovery: Declared<bool>,
    pub additionally_allowed_tenants: Declared<Vec<String>>,
    pub redirect_url: Declared<String>,
    pub federated_token_file_path: Declared<String>,
    pub managed_identity_id: Declared<String>,
    pub managed_identity_endpoint: Declared<String>,
    pub managed_identity_secret: Declared<String>,
    pub oidc_token_file_path: Declared<String>,
    pub oidc_request_url: Declared<String>,
    pub oidc_request_token: Declared<String>,
    pub oidc_audience: Declared<String>,
    pub ado_service_connection_id: Declared<String>,
}

/// Transport options
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawClientOptions {
    pub enable_headers_inspection: Declared<bool>,
    pub enable_retry: Declared<bool>,
    pub max_retries: Declared<u32>,
    pub retry_delay_seconds: Declared<u64>,
    pub max_retry_delay_seconds: Declared<u64>,
    pub enable_redirect: Declared<bool>,
    pub max_redirects: Declared<u32>,
    pub enable_compression: Declared<bool>,
    pub custom_user_agent: Declared<String>,
    pub use_proxy: Declared<bool>,
    pub proxy_url: Declared<String>,
    pub proxy_username: Declared<String>,
    pub proxy_password: Declared<String>,
    pub timeout_seconds: Declared<u64>,
    pub enable_chaos: Declared<bool>,
    pub chaos_percentage: Declared<u32>,
    pub chaos_status_code: Declared<u16>,
    pub chaos_status_message: Declared<String>,
}

impl RawConfiguration {
    /// Parse a YAML document
    pub fn from_yaml_str(content: &str) -> Result<Self, serde_yaml::Error> {
        // An empty document means "nothing declared"
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// Parse a JSON document
    pub fn from_json_str(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Load from disk; `.json` files are read as JSON, anything else as YAML
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let load_err = |reason: String| ConfigError::Load {
            path: path.to_path_buf(),
            reason,
        };

        let content = std::fs::read_to_string(path).map_err(|e| load_err(e.to_string()))?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if is_json {
            Self::from_json_str(&content).map_err(|e| load_err(e.to_string()))
        } else {
            Self::from_yaml_str(&content).map_err(|e| load_err(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_null_and_value_are_distinct() {
        let raw = RawConfiguration::from_yaml_str(
            "cloud: dod\ntenant_id: null\nclient_options: ~\n",
        )
        .unwrap();

        assert_eq!(raw.cloud, Declared::Value("dod".to_string()));
        assert_eq!(raw.tenant_id, Declared::Null);
        assert_eq!(raw.auth_method, Declared::Absent);
        assert_eq!(raw.client_options, Declared::Null);
        assert_eq!(raw.entra_id_options, Declared::Absent);
    }

    #[test]
    fn test_nested_groups_parse_from_json() {
        let raw = RawConfiguration::from_json_str(
            r#"{
                "auth_method": "client_secret",
                "entra_id_options": {
                    "client_id": "11111111-1111-1111-1111-111111111111",
                    "additionally_allowed_tenants": ["*"]
                },
                "client_options": { "enable_retry": true, "max_retries": 5 }
            }"#,
        )
        .unwrap();

        let entra = raw.entra_id_options.value().unwrap();
        assert!(entra.client_id.is_set());
        assert_eq!(
            entra.additionally_allowed_tenants.value().unwrap(),
            &vec!["*".to_string()]
        );
        let client = raw.client_options.value().unwrap();
        assert_eq!(client.max_retries, Declared::Value(5));
        assert_eq!(client.timeout_seconds, Declared::Absent);
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(RawConfiguration::from_yaml_str("clouds: public\n").is_err());
        assert!(RawConfiguration::from_yaml_str("client_options:\n  retries: 3\n").is_err());
    }

    #[test]
    fn test_empty_document_is_empty_config() {
        assert_eq!(
            RawConfiguration::from_yaml_str("  \n").unwrap(),
            RawConfiguration::default()
        );
    }

    #[test]
    fn test_load_reports_path() {
        let err = RawConfiguration::load(Path::new("/nonexistent/provider.yaml")).unwrap_err();
        match err {
            ConfigError::Load { path, .. } => {
                assert_eq!(path, Path::new("/nonexistent/provider.yaml"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
