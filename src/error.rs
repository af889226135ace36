//! Error types
//!
//! Configuration and credential errors are fatal and abort bundle
//! construction. Transport errors are what the retry stage works with and
//! what callers see once the retry budget is spent.

use std::path::PathBuf;
use thiserror::Error;

/// Crate-wide result alias
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Umbrella error returned by bundle construction and requests
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Invalid or incomplete configuration. Never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unsupported cloud '{0}' (expected one of: public, dod, gcc, gcchigh, china, ex, rx)")]
    UnsupportedCloud(String),

    #[error("unsupported auth method '{0}'")]
    UnsupportedAuthMethod(String),

    #[error("missing required field '{field}' for auth method '{method}'")]
    MissingRequiredField { field: &'static str, method: String },

    #[error("client_certificate and client_certificate_file_path are mutually exclusive; set only one")]
    ConflictingCertificateSource,

    #[error("invalid URL in '{field}' ({value}): {reason}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid value for '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("failed to load configuration from {}: {reason}", path.display())]
    Load { path: PathBuf, reason: String },
}

impl ConfigError {
    /// Offending field name, when the error refers to one
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::MissingRequiredField { field, .. }
            | Self::InvalidUrl { field, .. }
            | Self::InvalidField { field, .. } => Some(field),
            Self::ConflictingCertificateSource => Some("client_certificate"),
            Self::UnsupportedCloud(_) => Some("cloud"),
            Self::UnsupportedAuthMethod(_) => Some("auth_method"),
            Self::Load { .. } => None,
        }
    }
}

/// Failure while building a credential or acquiring a token with it
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("failed to read certificate file {}: {source}", path.display())]
    CertificateRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode client certificate: {0}")]
    CertificateDecode(String),

    #[error("malformed token file {}: {reason}", path.display())]
    MalformedTokenFile { path: PathBuf, reason: String },

    #[error("token request failed ({error}): {description}")]
    TokenRequest { error: String, description: String },

    #[error("tenant '{0}' is not the configured tenant and is not listed in additionally_allowed_tenants")]
    TenantNotAllowed(String),

    #[error("interactive sign-in failed: {0}")]
    Interaction(String),

    #[error("identity endpoint request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Failure while sending a request through the pipeline
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API request failed: {status} - {message}")]
    Status { status: u16, message: String },

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("stopped after {0} redirects")]
    TooManyRedirects(u32),

    #[error("failed to build request: {0}")]
    Build(String),

    #[error("failed to process body: {0}")]
    Body(String),
}

impl TransportError {
    /// Status code carried by a terminal API error
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_message_names_field_and_method() {
        let err = ConfigError::MissingRequiredField {
            field: "client_secret",
            method: "client_secret".to_string(),
        };
        assert_eq!(err.field(), Some("client_secret"));
        assert!(err.to_string().contains("'client_secret'"));
    }

    #[test]
    fn test_umbrella_conversion() {
        let err: Error = ConfigError::UnsupportedCloud("mars".to_string()).into();
        assert!(matches!(err, Error::Config(ConfigError::UnsupportedCloud(ref c)) if c == "mars"));
    }
}
