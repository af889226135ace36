//! Credential handle
//!
//! A [`Credential`] is bound to one strategy, authority, tenant and
//! allowed-tenant list. Tokens are acquired on first use and cached per
//! tenant until shortly before they expire.

use super::certificate::ClientCertificate;
use super::flows::{Flow, IssuedToken};
use super::spec::{ClientAuth, CredentialSpec};
use super::AuthMethod;
use crate::cloud::CloudEndpoints;
use crate::error::{CredentialError, Result};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Refresh tokens this long before they actually expire
const TOKEN_EXPIRY_BUFFER_SECS: i64 = 60;

/// Receives sign-in instructions for the user (device code, browser URL)
pub type Prompt = Arc<dyn Fn(&str) + Send + Sync>;

/// Bearer token with its expiry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: DateTime<Utc>,
}

#[derive(Clone)]
struct CachedToken {
    token: AccessToken,
    refresh_token: Option<String>,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Utc::now() + Duration::seconds(TOKEN_EXPIRY_BUFFER_SECS) < self.token.expires_on
    }
}

impl From<IssuedToken> for CachedToken {
    fn from(issued: IssuedToken) -> Self {
        Self {
            token: AccessToken {
                token: issued.access_token,
                expires_on: issued.expires_on,
            },
            refresh_token: issued.refresh_token,
        }
    }
}

struct Inner {
    spec: CredentialSpec,
    certificate: Option<ClientCertificate>,
    endpoints: CloudEndpoints,
    allowed_tenants: Vec<String>,
    http: reqwest::Client,
    token_cache: RwLock<HashMap<String, CachedToken>>,
    /// One acquisition at a time per tenant
    acquiring: parking_lot::Mutex<HashMap<String, Arc<Mutex<()>>>>,
    prompt: parking_lot::RwLock<Option<Prompt>>,
}

/// Opaque, cheaply cloneable credential
#[derive(Clone)]
pub struct Credential {
    inner: Arc<Inner>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("method", &self.method())
            .field("tenant_id", &self.tenant_id())
            .field("authority", &self.inner.endpoints.authority_url)
            .field("allowed_tenants", &self.inner.allowed_tenants)
            .finish()
    }
}

impl Credential {
    /// Bind a validated spec to an authority; no network I/O happens here
    pub fn new(
        spec: CredentialSpec,
        endpoints: &CloudEndpoints,
        allowed_tenants: Vec<String>,
        http: reqwest::Client,
    ) -> Result<Self> {
        let certificate = match &spec {
            CredentialSpec::ClientCertificate {
                certificate,
                certificate_password,
                ..
            }
            | CredentialSpec::OnBehalfOf {
                client_auth:
                    ClientAuth::Certificate {
                        certificate,
                        certificate_password,
                        ..
                    },
                ..
            } => Some(ClientCertificate::from_bytes(certificate, certificate_password)?),
            _ => None,
        };

        if let Some(cert) = &certificate {
            tracing::debug!("Loaded client certificate {}", cert.thumbprint());
        }

        Ok(Self {
            inner: Arc::new(Inner {
                spec,
                certificate,
                endpoints: endpoints.clone(),
                allowed_tenants,
                http,
                token_cache: RwLock::new(HashMap::new()),
                acquiring: parking_lot::Mutex::new(HashMap::new()),
                prompt: parking_lot::RwLock::new(None),
            }),
        })
    }

    /// Route interactive sign-in instructions to `prompt`; without one they are only logged
    pub fn set_prompt(&self, prompt: Prompt) {
        *self.inner.prompt.write() = Some(prompt);
    }

    pub fn method(&self) -> AuthMethod {
        self.inner.spec.method()
    }

    /// Configured tenant; empty for managed identity
    pub fn tenant_id(&self) -> &str {
        self.inner.spec.tenant_id()
    }

    pub fn scope(&self) -> &str {
        &self.inner.endpoints.api_scope
    }

    pub fn authority_url(&self) -> &str {
        &self.inner.endpoints.authority_url
    }

    pub fn allowed_tenants(&self) -> &[String] {
        &self.inner.allowed_tenants
    }

    fn check_tenant(&self, tenant: &str) -> Result<(), CredentialError> {
        if tenant == self.tenant_id()
            || self
                .inner
                .allowed_tenants
                .iter()
                .any(|t| t == "*" || t.eq_ignore_ascii_case(tenant))
        {
            return Ok(());
        }
        Err(CredentialError::TenantNotAllowed(tenant.to_string()))
    }

    /// Token for the configured tenant
    pub async fn get_token(&self) -> Result<AccessToken, CredentialError> {
        let tenant = self.tenant_id().to_string();
        self.get_token_for_tenant(&tenant).await
    }

    /// Token for `tenant`, which must be the configured or an allowed tenant
    pub async fn get_token_for_tenant(&self, tenant: &str) -> Result<AccessToken, CredentialError> {
        self.check_tenant(tenant)?;

        if let Some(token) = self.cached(tenant).await {
            return Ok(token);
        }

        let gate = self
            .inner
            .acquiring
            .lock()
            .entry(tenant.to_string())
            .or_default()
            .clone();
        let _guard = gate.lock().await;

        // Another caller may have filled the cache while we waited
        let refresh_token = {
            let cache = self.inner.token_cache.read().await;
            match cache.get(tenant) {
                Some(cached) if cached.is_valid() => return Ok(cached.token.clone()),
                Some(cached) => {
                    tracing::debug!("Cached token expired, fetching new token");
                    cached.refresh_token.clone()
                }
                None => None,
            }
        };

        let flow = Flow {
            http: &self.inner.http,
            endpoints: &self.inner.endpoints,
            spec: &self.inner.spec,
            certificate: self.inner.certificate.as_ref(),
            prompt: self.inner.prompt.read().clone(),
        };

        let issued = match refresh_token {
            Some(refresh_token) => match flow.refresh(tenant, &refresh_token).await {
                Ok(issued) => issued,
                Err(e) => {
                    tracing::debug!("Refresh token rejected ({}), starting a new sign-in", e);
                    flow.acquire(tenant).await?
                }
            },
            None => flow.acquire(tenant).await?,
        };

        let cached = CachedToken::from(issued);
        let token = cached.token.clone();
        {
            let mut cache = self.inner.token_cache.write().await;
            cache.insert(tenant.to_string(), cached);
        }

        tracing::debug!(
            "New token cached for {} ({}), expires {}",
            if tenant.is_empty() { "managed identity" } else { tenant },
            self.method(),
            token.expires_on
        );

        Ok(token)
    }

    async fn cached(&self, tenant: &str) -> Option<AccessToken> {
        let cache = self.inner.token_cache.read().await;
        cache
            .get(tenant)
            .filter(|cached| cached.is_valid())
            .map(|cached| cached.token.clone())
    }

    /// `Authorization` header value for the configured tenant
    pub async fn authorization_header(&self) -> Result<String, CredentialError> {
        let token = self.get_token().await?;
        Ok(format!("Bearer {}", token.token))
    }

    /// Drop every cached token and fetch a fresh one
    pub async fn refresh(&self) -> Result<AccessToken, CredentialError> {
        {
            let mut cache = self.inner.token_cache.write().await;
            cache.clear();
        }
        self.get_token().await
    }
}
