//! Configuration resolution
//!
//! Every field takes its value from exactly one source, checked in order:
//! the first environment alias with a non-empty value, then the declared
//! value, then the documented default.

use super::aliases::{self, OidcAliases};
use super::env::{parse_bool, parse_list, EnvironmentSnapshot};
use super::raw::{Declared, RawClientOptions, RawConfiguration, RawEntraIdOptions};
use serde::{Serialize, Serializer};
use std::str::FromStr;

pub const DEFAULT_CLOUD: &str = "public";
pub const DEFAULT_OIDC_AUDIENCE: &str = "api://AzureADTokenExchange";

const REDACTED: &str = "<redacted>";

fn redact<S: Serializer>(value: &str, serializer: S) -> Result<S::Ok, S::Error> {
    if value.is_empty() {
        serializer.serialize_str("")
    } else {
        serializer.serialize_str(REDACTED)
    }
}

/// Fully resolved configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedConfiguration {
    pub cloud: String,
    pub tenant_id: String,
    pub auth_method: String,
    /// `None` when neither declared nor touched by any environment variable
    pub entra_id_options: Option<EntraIdOptions>,
    pub client_options: Option<ClientOptions>,
    pub telemetry_optout: bool,
    pub debug_mode: bool,
}

/// Resolved identity options
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntraIdOptions {
    pub client_id: String,
    #[serde(serialize_with = "redact")]
    pub client_secret: String,
    #[serde(serialize_with = "redact")]
    pub client_certificate: String,
    pub client_certificate_file_path: String,
    #[serde(serialize_with = "redact")]
    pub client_certificate_password: String,
    pub send_certificate_chain: bool,
    pub username: String,
    #[serde(serialize_with = "redact")]
    pub password: String,
    #[serde(serialize_with = "redact")]
    pub user_assertion: String,
    pub disable_instance_discovery: bool,
    pub additionally_allowed_tenants: Vec<String>,
    pub redirect_url: String,
    pub federated_token_file_path: String,
    pub managed_identity_id: String,
    pub managed_identity_endpoint: String,
    #[serde(serialize_with = "redact")]
    pub managed_identity_secret: String,
    pub oidc_token_file_path: String,
    pub oidc_request_url: String,
    #[serde(serialize_with = "redact")]
    pub oidc_request_token: String,
    pub oidc_audience: String,
    pub ado_service_connection_id: String,
}

impl Default for EntraIdOptions {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            client_certificate: String::new(),
            client_certificate_file_path: String::new(),
            client_certificate_password: String::new(),
            send_certificate_chain: false,
            username: String::new(),
            password: String::new(),
            user_assertion: String::new(),
            disable_instance_discovery: false,
            additionally_allowed_tenants: Vec::new(),
            redirect_url: String::new(),
            federated_token_file_path: String::new(),
            managed_identity_id: String::new(),
            managed_identity_endpoint: String::new(),
            managed_identity_secret: String::new(),
            oidc_token_file_path: String::new(),
            oidc_request_url: String::new(),
            oidc_request_token: String::new(),
            oidc_audience: DEFAULT_OIDC_AUDIENCE.to_string(),
            ado_service_connection_id: String::new(),
        }
    }
}

/// Resolved transport options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClientOptions {
    pub enable_headers_inspection: bool,
    pub enable_retry: bool,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub max_retry_delay_seconds: u64,
    pub enable_redirect: bool,
    pub max_redirects: u32,
    pub enable_compression: bool,
    pub custom_user_agent: String,
    pub use_proxy: bool,
    pub proxy_url: String,
    pub proxy_username: String,
    #[serde(serialize_with = "redact")]
    pub proxy_password: String,
    pub timeout_seconds: u64,
    pub enable_chaos: bool,
    pub chaos_percentage: u32,
    pub chaos_status_code: u16,
    pub chaos_status_message: String,
}

impl ResolvedConfiguration {
    /// Identity options, falling back to defaults for a null group
    pub fn entra_id_options_or_default(&self) -> EntraIdOptions {
        self.entra_id_options.clone().unwrap_or_default()
    }

    /// Transport options, falling back to defaults for a null group
    pub fn client_options_or_default(&self) -> ClientOptions {
        self.client_options.clone().unwrap_or_default()
    }
}

/// Per-field lookup against one environment snapshot
struct FieldResolver<'a> {
    env: &'a EnvironmentSnapshot,
}

impl<'a> FieldResolver<'a> {
    fn env_value(&self, field: &'static str, aliases: &[&'static str]) -> Option<&'a str> {
        let (name, value) = self.env.first(aliases)?;
        tracing::debug!(field, variable = name, "resolved from environment");
        Some(value)
    }

    fn string(
        &self,
        field: &'static str,
        aliases: &[&'static str],
        declared: &Declared<String>,
        default: &str,
    ) -> String {
        if let Some(value) = self.env_value(field, aliases) {
            return value.to_string();
        }
        declared
            .value()
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    fn flag(&self, field: &'static str, aliases: &[&'static str], declared: &Declared<bool>) -> bool {
        if let Some(value) = self.env_value(field, aliases) {
            return parse_bool(value);
        }
        declared.value().copied().unwrap_or(false)
    }

    fn number<T>(&self, field: &'static str, aliases: &[&'static str], declared: &Declared<T>) -> T
    where
        T: FromStr + Copy + Default,
    {
        for name in aliases {
            let Some(value) = self.env.get(name) else {
                continue;
            };
            match value.trim().parse::<T>() {
                Ok(parsed) => {
                    tracing::debug!(field, variable = *name, "resolved from environment");
                    return parsed;
                }
                Err(_) => {
                    tracing::warn!(field, variable = *name, "ignoring non-numeric environment value");
                }
            }
        }
        declared.value().copied().unwrap_or_default()
    }

    fn list(
        &self,
        field: &'static str,
        aliases: &[&'static str],
        declared: &Declared<Vec<String>>,
    ) -> Vec<String> {
        if let Some(value) = self.env_value(field, aliases) {
            return parse_list(value);
        }
        declared.value().cloned().unwrap_or_default()
    }
}

/// Merge declared configuration with the environment
pub fn resolve(raw: &RawConfiguration, env: &EnvironmentSnapshot) -> ResolvedConfiguration {
    let r = FieldResolver { env };

    let auth_method = r.string("auth_method", aliases::AUTH_METHOD, &raw.auth_method, "");
    let oidc = aliases::oidc_for(&auth_method);

    ResolvedConfiguration {
        cloud: r.string("cloud", aliases::CLOUD, &raw.cloud, DEFAULT_CLOUD),
        tenant_id: r.string("tenant_id", aliases::TENANT_ID, &raw.tenant_id, ""),
        entra_id_options: resolve_entra_id_options(&r, &raw.entra_id_options, oidc),
        client_options: resolve_client_options(&r, &raw.client_options),
        telemetry_optout: r.flag("telemetry_optout", aliases::TELEMETRY_OPTOUT, &raw.telemetry_optout),
        debug_mode: r.flag("debug_mode", aliases::DEBUG_MODE, &raw.debug_mode),
        auth_method,
    }
}

fn resolve_entra_id_options(
    r: &FieldResolver<'_>,
    declared: &Declared<RawEntraIdOptions>,
    oidc: OidcAliases,
) -> Option<EntraIdOptions> {
    let materialized = r.env.any_set(aliases::ENTRA_ID_OPTIONS)
        || r.env.any_set(&[oidc.request_url, oidc.request_token]);
    if !declared.is_set() && !materialized {
        return None;
    }

    let empty = RawEntraIdOptions::default();
    let g = declared.value().unwrap_or(&empty);

    Some(EntraIdOptions {
        client_id: r.string("client_id", aliases::CLIENT_ID, &g.client_id, ""),
        client_secret: r.string("client_secret", aliases::CLIENT_SECRET, &g.client_secret, ""),
        client_certificate: r.string(
            "client_certificate",
            aliases::CLIENT_CERTIFICATE,
            &g.client_certificate,
            "",
        ),
        client_certificate_file_path: r.string(
            "client_certificate_file_path",
            aliases::CLIENT_CERTIFICATE_FILE_PATH,
            &g.client_certificate_file_path,
            "",
        ),
        client_certificate_password: r.string(
            "client_certificate_password",
            aliases::CLIENT_CERTIFICATE_PASSWORD,
            &g.client_certificate_password,
            "",
        ),
        send_certificate_chain: r.flag(
            "send_certificate_chain",
            aliases::SEND_CERTIFICATE_CHAIN,
            &g.send_certificate_chain,
        ),
        username: r.string("username", aliases::USERNAME, &g.username, ""),
        password: r.string("password", aliases::PASSWORD, &g.password, ""),
        user_assertion: r.string("user_assertion", aliases::USER_ASSERTION, &g.user_assertion, ""),
        disable_instance_discovery: r.flag(
            "disable_instance_discovery",
            aliases::DISABLE_INSTANCE_DISCOVERY,
            &g.disable_instance_discovery,
        ),
        additionally_allowed_tenants: r.list(
            "additionally_allowed_tenants",
            aliases::ADDITIONALLY_ALLOWED_TENANTS,
            &g.additionally_allowed_tenants,
        ),
        redirect_url: r.string("redirect_url", aliases::REDIRECT_URL, &g.redirect_url, ""),
        federated_token_file_path: r.string(
            "federated_token_file_path",
            aliases::FEDERATED_TOKEN_FILE_PATH,
            &g.federated_token_file_path,
            "",
        ),
        managed_identity_id: r.string(
            "managed_identity_id",
            aliases::MANAGED_IDENTITY_ID,
            &g.managed_identity_id,
            "",
        ),
        managed_identity_endpoint: r.string(
            "managed_identity_endpoint",
            aliases::MANAGED_IDENTITY_ENDPOINT,
            &g.managed_identity_endpoint,
            "",
        ),
        managed_identity_secret: r.string(
            "managed_identity_secret",
            aliases::MANAGED_IDENTITY_SECRET,
            &g.managed_identity_secret,
            "",
        ),
        oidc_token_file_path: r.string(
            "oidc_token_file_path",
            aliases::OIDC_TOKEN_FILE_PATH,
            &g.oidc_token_file_path,
            "",
        ),
        oidc_request_url: r.string("oidc_request_url", oidc.request_url, &g.oidc_request_url, ""),
        oidc_request_token: r.string(
            "oidc_request_token",
            oidc.request_token,
            &g.oidc_request_token,
            "",
        ),
        oidc_audience: r.string(
            "oidc_audience",
            aliases::OIDC_AUDIENCE,
            &g.oidc_audience,
            DEFAULT_OIDC_AUDIENCE,
        ),
        ado_service_connection_id: r.string(
            "ado_service_connection_id",
            aliases::ADO_SERVICE_CONNECTION_ID,
            &g.ado_service_connection_id,
            "",
        ),
    })
}

fn resolve_client_options(
    r: &FieldResolver<'_>,
    declared: &Declared<RawClientOptions>,
) -> Option<ClientOptions> {
    if !declared.is_set() && !r.env.any_set(aliases::CLIENT_OPTIONS) {
        return None;
    }

    let empty = RawClientOptions::default();
    let g = declared.value().unwrap_or(&empty);

    Some(ClientOptions {
        enable_headers_inspection: r.flag(
            "enable_headers_inspection",
            aliases::ENABLE_HEADERS_INSPECTION,
            &g.enable_headers_inspection,
        ),
        enable_retry: r.flag("enable_retry", aliases::ENABLE_RETRY, &g.enable_retry),
        max_retries: r.number("max_retries", aliases::MAX_RETRIES, &g.max_retries),
        retry_delay_seconds: r.number(
            "retry_delay_seconds",
            aliases::RETRY_DELAY_SECONDS,
            &g.retry_delay_seconds,
        ),
        max_retry_delay_seconds: r.number(
            "max_retry_delay_seconds",
            aliases::MAX_RETRY_DELAY_SECONDS,
            &g.max_retry_delay_seconds,
        ),
        enable_redirect: r.flag("enable_redirect", aliases::ENABLE_REDIRECT, &g.enable_redirect),
        max_redirects: r.number("max_redirects", aliases::MAX_REDIRECTS, &g.max_redirects),
        enable_compression: r.flag(
            "enable_compression",
            aliases::ENABLE_COMPRESSION,
            &g.enable_compression,
        ),
        custom_user_agent: r.string(
            "custom_user_agent",
            aliases::CUSTOM_USER_AGENT,
            &g.custom_user_agent,
            "",
        ),
        use_proxy: r.flag("use_proxy", aliases::USE_PROXY, &g.use_proxy),
        proxy_url: r.string("proxy_url", aliases::PROXY_URL, &g.proxy_url, ""),
        proxy_username: r.string("proxy_username", aliases::PROXY_USERNAME, &g.proxy_username, ""),
        proxy_password: r.string("proxy_password", aliases::PROXY_PASSWORD, &g.proxy_password, ""),
        timeout_seconds: r.number("timeout_seconds", aliases::TIMEOUT_SECONDS, &g.timeout_seconds),
        enable_chaos: r.flag("enable_chaos", aliases::ENABLE_CHAOS, &g.enable_chaos),
        chaos_percentage: r.number("chaos_percentage", aliases::CHAOS_PERCENTAGE, &g.chaos_percentage),
        chaos_status_code: r.number(
            "chaos_status_code",
            aliases::CHAOS_STATUS_CODE,
            &g.chaos_status_code,
        ),
        chaos_status_message: r.string(
            "chaos_status_message",
            aliases::CHAOS_STATUS_MESSAGE,
            &g.chaos_status_message,
            "",
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> EnvironmentSnapshot {
        EnvironmentSnapshot::from_pairs(pairs.iter().copied())
    }

    #[test]
    fn test_first_priority_alias_beats_declared_and_lower_alias() {
        let raw = RawConfiguration {
            cloud: Declared::Value("public".to_string()),
            ..Default::default()
        };
        let resolved = resolve(&raw, &env(&[("AZURE_CLOUD", "gcc"), ("M365_CLOUD", "dod")]));
        assert_eq!(resolved.cloud, "dod");
    }

    #[test]
    fn test_declared_then_default() {
        let raw = RawConfiguration {
            tenant_id: Declared::Value("contoso".to_string()),
            cloud: Declared::Null,
            ..Default::default()
        };
        let resolved = resolve(&raw, &EnvironmentSnapshot::default());
        assert_eq!(resolved.tenant_id, "contoso");
        assert_eq!(resolved.cloud, DEFAULT_CLOUD);
        assert_eq!(resolved.auth_method, "");
        assert!(!resolved.debug_mode);
    }

    #[test]
    fn test_env_false_overrides_declared_true() {
        let raw = RawConfiguration {
            debug_mode: Declared::Value(true),
            ..Default::default()
        };
        let resolved = resolve(&raw, &env(&[("M365_DEBUG_MODE", "no")]));
        assert!(!resolved.debug_mode);
    }

    #[test]
    fn test_absent_groups_stay_null() {
        let resolved = resolve(&RawConfiguration::default(), &env(&[("PATH", "/usr/bin")]));
        assert_eq!(resolved.entra_id_options, None);
        assert_eq!(resolved.client_options, None);
    }

    #[test]
    fn test_env_materializes_undeclared_groups() {
        let resolved = resolve(
            &RawConfiguration {
                entra_id_options: Declared::Null,
                ..Default::default()
            },
            &env(&[
                ("M365_ADDITIONALLY_ALLOWED_TENANTS", "a, b"),
                ("M365_MAX_RETRIES", "7"),
            ]),
        );

        let entra = resolved.entra_id_options.unwrap();
        assert_eq!(entra.additionally_allowed_tenants, vec!["a", "b"]);
        assert_eq!(entra.oidc_audience, DEFAULT_OIDC_AUDIENCE);
        let client = resolved.client_options.unwrap();
        assert_eq!(client.max_retries, 7);
        assert!(!client.enable_retry);
    }

    #[test]
    fn test_malformed_number_falls_through() {
        let raw = RawConfiguration {
            client_options: Declared::Value(RawClientOptions {
                max_retries: Declared::Value(4),
                ..Default::default()
            }),
            ..Default::default()
        };
        let resolved = resolve(&raw, &env(&[("M365_MAX_RETRIES", "lots")]));
        assert_eq!(resolved.client_options.unwrap().max_retries, 4);
    }

    #[test]
    fn test_oidc_alias_set_follows_auth_method() {
        let vars = env(&[
            ("ACTIONS_ID_TOKEN_REQUEST_URL", "https://gh.example/token"),
            ("SYSTEM_OIDCREQUESTURI", "https://ado.example/oidc"),
            ("M365_OIDC_REQUEST_URL", "https://generic.example/oidc"),
        ]);

        let with_method = |method: &str| {
            let raw = RawConfiguration {
                auth_method: Declared::Value(method.to_string()),
                ..Default::default()
            };
            resolve(&raw, &vars).entra_id_options.unwrap().oidc_request_url
        };

        assert_eq!(with_method("oidc_github"), "https://gh.example/token");
        assert_eq!(with_method("oidc_azure_devops"), "https://ado.example/oidc");
        assert_eq!(with_method("oidc"), "https://generic.example/oidc");
    }

    #[test]
    fn test_redacted_serialization() {
        let raw = RawConfiguration {
            entra_id_options: Declared::Value(RawEntraIdOptions {
                client_id: Declared::Value("app".to_string()),
                client_secret: Declared::Value("hunter2".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let json = serde_json::to_value(resolve(&raw, &EnvironmentSnapshot::default())).unwrap();
        assert_eq!(json["entra_id_options"]["client_id"], "app");
        assert_eq!(json["entra_id_options"]["client_secret"], REDACTED);
        assert_eq!(json["entra_id_options"]["password"], "");
    }
}
