//! Entra ID authentication
//!
//! Selects one authentication strategy from the resolved configuration and
//! builds a [`Credential`] for it. Building a credential validates the
//! strategy's required fields and reads local material (certificates, token
//! files); tokens are only requested on first use.
//!
//! # Module Structure
//!
//! - [`spec`] - Per-strategy field validation, producing a [`CredentialSpec`]
//! - [`certificate`] - PEM certificate parsing and client assertion signing
//! - [`credential`] - The credential handle with its token cache
//! - `flows` - Token endpoint conversations for each strategy
//! - `browser` - Loopback authorization code flow with PKCE

mod browser;
pub mod certificate;
pub mod credential;
mod flows;
pub mod spec;

pub use certificate::ClientCertificate;
pub use credential::{AccessToken, Credential, Prompt};
pub use spec::{CredentialSpec, ManagedIdentityId, ManagedIdentitySource, OidcTokenSource};

use crate::cloud::CloudEndpoints;
use crate::config::ResolvedConfiguration;
use crate::error::{ConfigError, Result};
use std::fmt;
use std::str::FromStr;

/// Supported authentication strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    DeviceCode,
    ClientSecret,
    ClientCertificate,
    OnBehalfOf,
    InteractiveBrowser,
    UsernamePassword,
    WorkloadIdentity,
    ManagedIdentity,
    /// Generic OIDC federation; CI flavours only differ in environment aliases
    Oidc,
}

/// Accepted `auth_method` strings
pub const AUTH_METHODS: &[&str] = &[
    "device_code",
    "client_secret",
    "client_certificate",
    "on_behalf_of",
    "interactive_browser",
    "username_password",
    "workload_identity",
    "managed_identity",
    "oidc",
    "oidc_github",
    "oidc_azure_devops",
];

impl FromStr for AuthMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "device_code" => Ok(Self::DeviceCode),
            "client_secret" => Ok(Self::ClientSecret),
            "client_certificate" => Ok(Self::ClientCertificate),
            "on_behalf_of" => Ok(Self::OnBehalfOf),
            "interactive_browser" => Ok(Self::InteractiveBrowser),
            "username_password" => Ok(Self::UsernamePassword),
            "workload_identity" => Ok(Self::WorkloadIdentity),
            "managed_identity" => Ok(Self::ManagedIdentity),
            "oidc" | "oidc_github" | "oidc_azure_devops" => Ok(Self::Oidc),
            other => Err(ConfigError::UnsupportedAuthMethod(other.to_string())),
        }
    }
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeviceCode => "device_code",
            Self::ClientSecret => "client_secret",
            Self::ClientCertificate => "client_certificate",
            Self::OnBehalfOf => "on_behalf_of",
            Self::InteractiveBrowser => "interactive_browser",
            Self::UsernamePassword => "username_password",
            Self::WorkloadIdentity => "workload_identity",
            Self::ManagedIdentity => "managed_identity",
            Self::Oidc => "oidc",
        }
    }

    /// Whether the strategy needs a tenant and application id
    pub fn requires_tenant(&self) -> bool {
        !matches!(self, Self::ManagedIdentity)
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the credential for `auth_method` from the resolved configuration
///
/// Only the fields the chosen strategy needs are read; anything else in the
/// identity block is ignored.
pub fn select(
    auth_method: &str,
    cfg: &ResolvedConfiguration,
    endpoints: &CloudEndpoints,
) -> Result<Credential> {
    let method: AuthMethod = auth_method.parse()?;
    let options = cfg.entra_id_options_or_default();

    tracing::debug!("Selecting credential strategy: {}", auth_method);

    let spec = CredentialSpec::build(auth_method, method, &cfg.tenant_id, &options)?;
    let allowed_tenants = spec::validate_allowed_tenants(&options.additionally_allowed_tenants)?;
    let http = crate::http::transport::build_identity_client(&cfg.client_options_or_default())?;

    Credential::new(spec, endpoints, allowed_tenants, http)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_listed_method_parses() {
        for method in AUTH_METHODS {
            assert!(method.parse::<AuthMethod>().is_ok(), "{method}");
        }
    }

    #[test]
    fn test_ci_flavours_share_generic_oidc() {
        assert_eq!("oidc_github".parse::<AuthMethod>().unwrap(), AuthMethod::Oidc);
        assert_eq!("oidc_azure_devops".parse::<AuthMethod>().unwrap(), AuthMethod::Oidc);
    }

    #[test]
    fn test_unknown_method() {
        assert_eq!(
            "Client_Secret".parse::<AuthMethod>(),
            Err(ConfigError::UnsupportedAuthMethod("Client_Secret".to_string()))
        );
        assert!("azure_developer_cli".parse::<AuthMethod>().is_err());
        assert!("".parse::<AuthMethod>().is_err());
    }
}
