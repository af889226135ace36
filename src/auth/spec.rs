//! Credential specifications
//!
//! One variant per strategy, holding only what that strategy needs.
//! [`CredentialSpec::build`] is where missing and conflicting fields are
//! reported.

use super::AuthMethod;
use crate::config::EntraIdOptions;
use crate::error::{ConfigError, CredentialError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::path::{Path, PathBuf};
use url::Url;
use uuid::Uuid;

pub const DEFAULT_REDIRECT_URL: &str = "http://localhost:8400";

/// Validated, strategy-specific credential input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSpec {
    DeviceCode {
        tenant_id: String,
        client_id: String,
    },
    ClientSecret {
        tenant_id: String,
        client_id: String,
        client_secret: String,
    },
    ClientCertificate {
        tenant_id: String,
        client_id: String,
        certificate: Vec<u8>,
        certificate_password: String,
        send_chain: bool,
    },
    OnBehalfOf {
        tenant_id: String,
        client_id: String,
        user_assertion: String,
        client_auth: ClientAuth,
    },
    InteractiveBrowser {
        tenant_id: String,
        client_id: String,
        redirect_url: Url,
    },
    UsernamePassword {
        tenant_id: String,
        client_id: String,
        username: String,
        password: String,
    },
    WorkloadIdentity {
        tenant_id: String,
        client_id: String,
        token_file: PathBuf,
    },
    ManagedIdentity {
        id: Option<ManagedIdentityId>,
        source: ManagedIdentitySource,
    },
    Oidc {
        tenant_id: String,
        client_id: String,
        source: OidcTokenSource,
    },
}

/// How a confidential client proves its identity to the token endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAuth {
    Secret(String),
    Certificate {
        certificate: Vec<u8>,
        certificate_password: String,
        send_chain: bool,
    },
}

/// User-assigned identity selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagedIdentityId {
    ClientId(String),
    ResourceId(String),
}

/// Where managed identity tokens come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagedIdentitySource {
    Imds,
    AppService { endpoint: Url, secret: String },
}

/// Where the federated OIDC token comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OidcTokenSource {
    File(PathBuf),
    Request {
        url: Url,
        token: String,
        audience: String,
        /// Set for Azure DevOps service connections
        service_connection_id: Option<String>,
    },
}

fn required(value: &str, field: &'static str, method: &str) -> Result<String, ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingRequiredField {
            field,
            method: method.to_string(),
        });
    }
    Ok(value.to_string())
}

fn guid(value: &str, field: &'static str, method: &str) -> Result<String, ConfigError> {
    let value = required(value, field, method)?;
    Uuid::parse_str(&value).map_err(|_| ConfigError::InvalidField {
        field,
        reason: format!("'{}' is not a GUID", value),
    })?;
    Ok(value)
}

fn parse_url(value: &str, field: &'static str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|e| ConfigError::InvalidUrl {
        field,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Check `additionally_allowed_tenants` entries (GUIDs or `*`)
pub fn validate_allowed_tenants(tenants: &[String]) -> Result<Vec<String>, ConfigError> {
    for tenant in tenants {
        if tenant != "*" && Uuid::parse_str(tenant).is_err() {
            return Err(ConfigError::InvalidField {
                field: "additionally_allowed_tenants",
                reason: format!("'{}' is neither a GUID nor '*'", tenant),
            });
        }
    }
    Ok(tenants.to_vec())
}

/// Read the certificate from whichever single source is configured
fn certificate_bytes(options: &EntraIdOptions, method: &str) -> Result<Vec<u8>> {
    let inline = options.client_certificate.trim();
    let path = options.client_certificate_file_path.trim();

    match (inline.is_empty(), path.is_empty()) {
        (false, false) => Err(ConfigError::ConflictingCertificateSource.into()),
        (true, true) => Err(ConfigError::MissingRequiredField {
            field: "client_certificate",
            method: method.to_string(),
        }
        .into()),
        (false, true) => decode_inline_certificate(inline),
        (true, false) => {
            let path = Path::new(path);
            std::fs::read(path).map_err(|source| {
                CredentialError::CertificateRead {
                    path: path.to_path_buf(),
                    source,
                }
                .into()
            })
        }
    }
}

/// Inline data is PEM text, or base64 of PEM or of a PKCS#12 archive
fn decode_inline_certificate(inline: &str) -> Result<Vec<u8>> {
    if inline.contains("-----BEGIN") {
        return Ok(inline.as_bytes().to_vec());
    }
    let compact: String = inline.split_whitespace().collect();
    STANDARD.decode(compact).map_err(|e| {
        CredentialError::CertificateDecode(format!("inline certificate is not PEM or base64: {}", e))
            .into()
    })
}

fn client_auth(options: &EntraIdOptions, method: &str) -> Result<ClientAuth> {
    if !options.client_secret.is_empty() {
        return Ok(ClientAuth::Secret(options.client_secret.clone()));
    }

    let has_certificate = !options.client_certificate.trim().is_empty()
        || !options.client_certificate_file_path.trim().is_empty();
    if !has_certificate {
        return Err(ConfigError::MissingRequiredField {
            field: "client_secret",
            method: method.to_string(),
        }
        .into());
    }

    Ok(ClientAuth::Certificate {
        certificate: certificate_bytes(options, method)?,
        certificate_password: options.client_certificate_password.clone(),
        send_chain: options.send_certificate_chain,
    })
}

fn redirect_url(value: &str) -> Result<Url, ConfigError> {
    let raw = if value.trim().is_empty() {
        DEFAULT_REDIRECT_URL
    } else {
        value.trim()
    };
    let url = parse_url(raw, "redirect_url")?;

    let loopback = matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"));
    if url.scheme() != "http" || !loopback {
        return Err(ConfigError::InvalidUrl {
            field: "redirect_url",
            value: raw.to_string(),
            reason: "must be a loopback http URL such as http://localhost:8400".to_string(),
        });
    }
    Ok(url)
}

/// Read a federated token file and check it looks like a JWT
pub(crate) fn read_token_file(path: &Path) -> Result<String, CredentialError> {
    let malformed = |reason: String| CredentialError::MalformedTokenFile {
        path: path.to_path_buf(),
        reason,
    };

    let content = std::fs::read_to_string(path).map_err(|e| malformed(format!("unreadable: {}", e)))?;
    let token = content.trim();

    if token.is_empty() {
        return Err(malformed("file is empty".to_string()));
    }
    if token.split('.').count() != 3 {
        return Err(malformed(
            "expected a JWT with three dot-separated segments".to_string(),
        ));
    }
    Ok(token.to_string())
}

fn oidc_source(options: &EntraIdOptions, method: &str) -> Result<OidcTokenSource> {
    if !options.oidc_token_file_path.trim().is_empty() {
        let path = PathBuf::from(options.oidc_token_file_path.trim());
        read_token_file(&path)?;
        return Ok(OidcTokenSource::File(path));
    }

    let url = options.oidc_request_url.trim();
    let token = options.oidc_request_token.trim();
    if url.is_empty() && token.is_empty() {
        return Err(ConfigError::MissingRequiredField {
            field: "oidc_token_file_path",
            method: method.to_string(),
        }
        .into());
    }

    let url = parse_url(&required(url, "oidc_request_url", method)?, "oidc_request_url")?;
    let token = required(token, "oidc_request_token", method)?;

    let service_connection_id = match options.ado_service_connection_id.trim() {
        "" if method == "oidc_azure_devops" => {
            return Err(ConfigError::MissingRequiredField {
                field: "ado_service_connection_id",
                method: method.to_string(),
            }
            .into())
        }
        "" => None,
        id => Some(id.to_string()),
    };

    Ok(OidcTokenSource::Request {
        url,
        token,
        audience: options.oidc_audience.clone(),
        service_connection_id,
    })
}

fn managed_identity(options: &EntraIdOptions) -> Result<CredentialSpec> {
    let id = match options.managed_identity_id.trim() {
        "" => None,
        id if id.starts_with('/') => Some(ManagedIdentityId::ResourceId(id.to_string())),
        id => Some(ManagedIdentityId::ClientId(id.to_string())),
    };

    let endpoint = options.managed_identity_endpoint.trim();
    let secret = options.managed_identity_secret.trim();
    let source = if !endpoint.is_empty() && !secret.is_empty() {
        ManagedIdentitySource::AppService {
            endpoint: parse_url(endpoint, "managed_identity_endpoint")?,
            secret: secret.to_string(),
        }
    } else {
        if !endpoint.is_empty() {
            tracing::warn!("managed_identity_endpoint set without a secret, using IMDS");
        }
        ManagedIdentitySource::Imds
    };

    Ok(CredentialSpec::ManagedIdentity { id, source })
}

impl CredentialSpec {
    /// Validate and collect the fields for `method`
    ///
    /// `method_name` is the configured string, used in error messages and to
    /// tell the OIDC flavours apart.
    pub fn build(
        method_name: &str,
        method: AuthMethod,
        tenant_id: &str,
        options: &EntraIdOptions,
    ) -> Result<Self> {
        if !method.requires_tenant() {
            return managed_identity(options);
        }

        let tenant_id = guid(tenant_id, "tenant_id", method_name)?;
        let client_id = guid(&options.client_id, "client_id", method_name)?;

        let spec = match method {
            AuthMethod::DeviceCode => Self::DeviceCode {
                tenant_id,
                client_id,
            },
            AuthMethod::ClientSecret => Self::ClientSecret {
                client_secret: required(&options.client_secret, "client_secret", method_name)?,
                tenant_id,
                client_id,
            },
            AuthMethod::ClientCertificate => Self::ClientCertificate {
                certificate: certificate_bytes(options, method_name)?,
                certificate_password: options.client_certificate_password.clone(),
                send_chain: options.send_certificate_chain,
                tenant_id,
                client_id,
            },
            AuthMethod::OnBehalfOf => Self::OnBehalfOf {
                user_assertion: required(&options.user_assertion, "user_assertion", method_name)?,
                client_auth: client_auth(options, method_name)?,
                tenant_id,
                client_id,
            },
            AuthMethod::InteractiveBrowser => Self::InteractiveBrowser {
                redirect_url: redirect_url(&options.redirect_url)?,
                tenant_id,
                client_id,
            },
            AuthMethod::UsernamePassword => Self::UsernamePassword {
                username: required(&options.username, "username", method_name)?,
                password: required(&options.password, "password", method_name)?,
                tenant_id,
                client_id,
            },
            AuthMethod::WorkloadIdentity => {
                let path = PathBuf::from(required(
                    &options.federated_token_file_path,
                    "federated_token_file_path",
                    method_name,
                )?);
                read_token_file(&path)?;
                Self::WorkloadIdentity {
                    tenant_id,
                    client_id,
                    token_file: path,
                }
            }
            AuthMethod::Oidc => Self::Oidc {
                source: oidc_source(options, method_name)?,
                tenant_id,
                client_id,
            },
            AuthMethod::ManagedIdentity => return managed_identity(options),
        };

        Ok(spec)
    }

    /// Tenant the credential is bound to; empty for managed identity
    pub fn tenant_id(&self) -> &str {
        match self {
            Self::DeviceCode { tenant_id, .. }
            | Self::ClientSecret { tenant_id, .. }
            | Self::ClientCertificate { tenant_id, .. }
            | Self::OnBehalfOf { tenant_id, .. }
            | Self::InteractiveBrowser { tenant_id, .. }
            | Self::UsernamePassword { tenant_id, .. }
            | Self::WorkloadIdentity { tenant_id, .. }
            | Self::Oidc { tenant_id, .. } => tenant_id,
            Self::ManagedIdentity { .. } => "",
        }
    }

    pub fn method(&self) -> AuthMethod {
        match self {
            Self::DeviceCode { .. } => AuthMethod::DeviceCode,
            Self::ClientSecret { .. } => AuthMethod::ClientSecret,
            Self::ClientCertificate { .. } => AuthMethod::ClientCertificate,
            Self::OnBehalfOf { .. } => AuthMethod::OnBehalfOf,
            Self::InteractiveBrowser { .. } => AuthMethod::InteractiveBrowser,
            Self::UsernamePassword { .. } => AuthMethod::UsernamePassword,
            Self::WorkloadIdentity { .. } => AuthMethod::WorkloadIdentity,
            Self::ManagedIdentity { .. } => AuthMethod::ManagedIdentity,
            Self::Oidc { .. } => AuthMethod::Oidc,
        }
    }
}
