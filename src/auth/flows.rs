//! Token endpoint conversations
//!
//! One method per grant. Every reply goes through [`parse_token_response`],
//! so AAD errors look the same whichever strategy hit them.

use super::browser;
use super::certificate::ClientCertificate;
use super::credential::Prompt;
use super::spec::{
    read_token_file, ClientAuth, CredentialSpec, ManagedIdentityId, ManagedIdentitySource,
    OidcTokenSource,
};
use crate::cloud::CloudEndpoints;
use crate::error::CredentialError;
use crate::http::transport::sanitize_for_log;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use url::Url;

const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";
const ADO_OIDC_API_VERSION: &str = "7.1";

/// Assumed lifetime when the identity endpoint reports none
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 60 * 60;

/// Issued token, normalized across endpoints
#[derive(Debug, Clone)]
pub(crate) struct IssuedToken {
    pub access_token: String,
    pub expires_on: DateTime<Utc>,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<Value>,
    #[serde(default)]
    expires_on: Option<Value>,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    error_description: String,
}

#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    user_code: String,
    verification_uri: String,
    expires_in: u64,
    #[serde(default = "default_poll_interval")]
    interval: u64,
    #[serde(default)]
    message: String,
}

fn default_poll_interval() -> u64 {
    5
}

/// Seconds carried as a JSON number or a numeric string
fn seconds(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// `now + secs`, `None` for non-positive or unrepresentable lifetimes
fn after(now: DateTime<Utc>, secs: i64) -> Option<DateTime<Utc>> {
    if secs <= 0 {
        return None;
    }
    now.checked_add_signed(ChronoDuration::try_seconds(secs)?)
}

/// Turn an identity endpoint reply into a token or a structured error
pub(crate) fn parse_token_response(status: StatusCode, body: &str) -> Result<IssuedToken, CredentialError> {
    if !status.is_success() {
        return Err(match serde_json::from_str::<ErrorResponse>(body) {
            Ok(e) => CredentialError::TokenRequest {
                error: e.error,
                description: e.error_description,
            },
            Err(_) => CredentialError::TokenRequest {
                error: status.as_u16().to_string(),
                description: sanitize_for_log(body),
            },
        });
    }

    let parsed: TokenResponse = serde_json::from_str(body).map_err(|e| CredentialError::TokenRequest {
        error: "invalid_response".to_string(),
        description: format!("could not parse token response: {}", e),
    })?;

    let now = Utc::now();
    let expires_on = parsed
        .expires_in
        .as_ref()
        .and_then(seconds)
        .and_then(|secs| after(now, secs))
        .or_else(|| {
            parsed
                .expires_on
                .as_ref()
                .and_then(seconds)
                .filter(|epoch| *epoch > 0)
                .and_then(|epoch| Utc.timestamp_opt(epoch, 0).single())
        })
        .or_else(|| after(now, DEFAULT_TOKEN_LIFETIME_SECS))
        .unwrap_or(now);

    Ok(IssuedToken {
        access_token: parsed.access_token,
        expires_on,
        refresh_token: parsed.refresh_token,
    })
}

/// Everything a flow needs to talk to the identity service
pub(crate) struct Flow<'a> {
    pub http: &'a Client,
    pub endpoints: &'a CloudEndpoints,
    pub spec: &'a CredentialSpec,
    pub certificate: Option<&'a ClientCertificate>,
    pub prompt: Option<Prompt>,
}

impl Flow<'_> {
    fn notify(&self, message: &str) {
        tracing::warn!("{}", message);
        if let Some(prompt) = &self.prompt {
            prompt(message);
        }
    }

    async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<IssuedToken, CredentialError> {
        tracing::debug!("POST {}", url);

        let response = self.http.post(url).form(form).send().await?;
        let status = response.status();
        let body = response.text().await?;

        parse_token_response(status, &body)
    }

    fn public_scope(&self) -> String {
        format!("{} offline_access", self.endpoints.api_scope)
    }

    /// `client_credentials` grant authenticated by a signed or federated assertion
    async fn assertion_grant(
        &self,
        token_url: &str,
        client_id: &str,
        assertion: &str,
    ) -> Result<IssuedToken, CredentialError> {
        self.post_form(
            token_url,
            &[
                ("grant_type", "client_credentials"),
                ("client_id", client_id),
                ("client_assertion_type", CLIENT_ASSERTION_TYPE),
                ("client_assertion", assertion),
                ("scope", self.endpoints.api_scope.as_str()),
            ],
        )
        .await
    }

    fn signed_assertion(
        &self,
        client_id: &str,
        token_url: &str,
        send_chain: bool,
    ) -> Result<String, CredentialError> {
        let certificate = self.certificate.ok_or_else(|| {
            CredentialError::CertificateDecode("certificate was not loaded".to_string())
        })?;
        certificate.assertion(client_id, token_url, send_chain)
    }

    /// Acquire a fresh token for `tenant`
    pub async fn acquire(&self, tenant: &str) -> Result<IssuedToken, CredentialError> {
        let token_url = self.endpoints.oauth_endpoint(tenant, "token");

        match self.spec {
            CredentialSpec::ClientSecret {
                client_id,
                client_secret,
                ..
            } => {
                self.post_form(
                    &token_url,
                    &[
                        ("grant_type", "client_credentials"),
                        ("client_id", client_id.as_str()),
                        ("client_secret", client_secret.as_str()),
                        ("scope", self.endpoints.api_scope.as_str()),
                    ],
                )
                .await
            }
            CredentialSpec::ClientCertificate {
                client_id,
                send_chain,
                ..
            } => {
                let assertion = self.signed_assertion(client_id, &token_url, *send_chain)?;
                self.assertion_grant(&token_url, client_id, &assertion).await
            }
            CredentialSpec::WorkloadIdentity {
                client_id,
                token_file,
                ..
            } => {
                let assertion = read_token_file(token_file)?;
                self.assertion_grant(&token_url, client_id, &assertion).await
            }
            CredentialSpec::Oidc {
                client_id, source, ..
            } => {
                let assertion = self.oidc_assertion(source).await?;
                self.assertion_grant(&token_url, client_id, &assertion).await
            }
            CredentialSpec::UsernamePassword {
                client_id,
                username,
                password,
                ..
            } => {
                let scope = self.public_scope();
                self.post_form(
                    &token_url,
                    &[
                        ("grant_type", "password"),
                        ("client_id", client_id.as_str()),
                        ("username", username.as_str()),
                        ("password", password.as_str()),
                        ("scope", scope.as_str()),
                    ],
                )
                .await
            }
            CredentialSpec::OnBehalfOf {
                client_id,
                user_assertion,
                client_auth,
                ..
            } => self.on_behalf_of(&token_url, client_id, user_assertion, client_auth).await,
            CredentialSpec::DeviceCode { client_id, .. } => {
                self.device_code(tenant, &token_url, client_id).await
            }
            CredentialSpec::InteractiveBrowser {
                client_id,
                redirect_url,
                ..
            } => {
                let scope = self.public_scope();
                let authorize_url = self.endpoints.oauth_endpoint(tenant, "authorize");
                let grant = browser::authorize(&authorize_url, client_id, redirect_url, &scope, |url| {
                    self.notify(&format!("Open this URL in a browser to sign in: {}", url))
                })
                .await?;
                self.post_form(
                    &token_url,
                    &[
                        ("grant_type", "authorization_code"),
                        ("client_id", client_id.as_str()),
                        ("code", grant.code.as_str()),
                        ("redirect_uri", redirect_url.as_str()),
                        ("code_verifier", grant.verifier.as_str()),
                        ("scope", scope.as_str()),
                    ],
                )
                .await
            }
            CredentialSpec::ManagedIdentity { id, source } => self.managed_identity(id.as_ref(), source).await,
        }
    }

    /// Redeem a refresh token issued to a public client
    pub async fn refresh(&self, tenant: &str, refresh_token: &str) -> Result<IssuedToken, CredentialError> {
        let client_id = match self.spec {
            CredentialSpec::DeviceCode { client_id, .. }
            | CredentialSpec::InteractiveBrowser { client_id, .. }
            | CredentialSpec::UsernamePassword { client_id, .. } => client_id,
            _ => return self.acquire(tenant).await,
        };

        let token_url = self.endpoints.oauth_endpoint(tenant, "token");
        let scope = self.public_scope();
        self.post_form(
            &token_url,
            &[
                ("grant_type", "refresh_token"),
                ("client_id", client_id.as_str()),
                ("refresh_token", refresh_token),
                ("scope", scope.as_str()),
            ],
        )
        .await
    }

    async fn on_behalf_of(
        &self,
        token_url: &str,
        client_id: &str,
        user_assertion: &str,
        client_auth: &ClientAuth,
    ) -> Result<IssuedToken, CredentialError> {
        let mut form = vec![
            ("grant_type", JWT_BEARER_GRANT.to_string()),
            ("client_id", client_id.to_string()),
            ("assertion", user_assertion.to_string()),
            ("scope", self.endpoints.api_scope.clone()),
            ("requested_token_use", "on_behalf_of".to_string()),
        ];

        match client_auth {
            ClientAuth::Secret(secret) => form.push(("client_secret", secret.clone())),
            ClientAuth::Certificate { send_chain, .. } => {
                let assertion = self.signed_assertion(client_id, token_url, *send_chain)?;
                form.push(("client_assertion_type", CLIENT_ASSERTION_TYPE.to_string()));
                form.push(("client_assertion", assertion));
            }
        }

        let form: Vec<(&str, &str)> = form.iter().map(|(k, v)| (*k, v.as_str())).collect();
        self.post_form(token_url, &form).await
    }

    async fn device_code(
        &self,
        tenant: &str,
        token_url: &str,
        client_id: &str,
    ) -> Result<IssuedToken, CredentialError> {
        let scope = self.public_scope();
        let code_url = self.endpoints.oauth_endpoint(tenant, "devicecode");

        let response = self
            .http
            .post(&code_url)
            .form(&[("client_id", client_id), ("scope", scope.as_str())])
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(parse_token_response(status, &body)
                .err()
                .unwrap_or_else(|| CredentialError::Interaction("device code request failed".to_string())));
        }

        let code: DeviceCodeResponse = serde_json::from_str(&body).map_err(|e| {
            CredentialError::Interaction(format!("could not parse device code response: {}", e))
        })?;

        let message = if code.message.is_empty() {
            format!(
                "To sign in, open {} and enter the code {}",
                code.verification_uri, code.user_code
            )
        } else {
            code.message.clone()
        };
        self.notify(&message);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(code.expires_in);
        let mut interval = code.interval.max(1);

        loop {
            tokio::time::sleep(Duration::from_secs(interval)).await;
            if tokio::time::Instant::now() >= deadline {
                return Err(CredentialError::Interaction(
                    "device code expired before sign-in completed".to_string(),
                ));
            }

            let result = self
                .post_form(
                    token_url,
                    &[
                        ("grant_type", DEVICE_CODE_GRANT),
                        ("client_id", client_id),
                        ("device_code", code.device_code.as_str()),
                    ],
                )
                .await;

            match result {
                Ok(token) => return Ok(token),
                Err(CredentialError::TokenRequest { error, .. }) if error == "authorization_pending" => {
                    tracing::trace!("Device code sign-in pending");
                }
                Err(CredentialError::TokenRequest { error, .. }) if error == "slow_down" => {
                    interval += 5;
                    tracing::debug!("Device code polling slowed to {}s", interval);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn oidc_assertion(&self, source: &OidcTokenSource) -> Result<String, CredentialError> {
        let (url, token, audience, service_connection_id) = match source {
            OidcTokenSource::File(path) => return read_token_file(path),
            OidcTokenSource::Request {
                url,
                token,
                audience,
                service_connection_id,
            } => (url, token, audience, service_connection_id),
        };

        let mut url: Url = url.clone();
        let request = match service_connection_id {
            Some(id) => {
                url.query_pairs_mut()
                    .append_pair("api-version", ADO_OIDC_API_VERSION)
                    .append_pair("serviceConnectionId", id);
                self.http.post(url.as_str()).header("Content-Type", "application/json").body("{}")
            }
            None => {
                if !audience.is_empty() {
                    url.query_pairs_mut().append_pair("audience", audience);
                }
                self.http.get(url.as_str())
            }
        };

        tracing::debug!("Requesting OIDC token from {}", url.host_str().unwrap_or_default());

        let response = request.bearer_auth(token).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(CredentialError::TokenRequest {
                error: format!("oidc_request_{}", status.as_u16()),
                description: sanitize_for_log(&body),
            });
        }

        let json: Value = serde_json::from_str(&body).map_err(|e| CredentialError::TokenRequest {
            error: "invalid_oidc_response".to_string(),
            description: e.to_string(),
        })?;

        json.get("value")
            .or_else(|| json.get("oidcToken"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| CredentialError::TokenRequest {
                error: "invalid_oidc_response".to_string(),
                description: "response carries neither 'value' nor 'oidcToken'".to_string(),
            })
    }

    async fn managed_identity(
        &self,
        id: Option<&ManagedIdentityId>,
        source: &ManagedIdentitySource,
    ) -> Result<IssuedToken, CredentialError> {
        let resource = self.endpoints.resource();

        let (request, resource_id_param) = match source {
            ManagedIdentitySource::AppService { endpoint, secret } => {
                let request = self
                    .http
                    .get(endpoint.as_str())
                    .header("X-IDENTITY-HEADER", secret)
                    .query(&[("api-version", APP_SERVICE_API_VERSION), ("resource", resource)]);
                (request, "mi_res_id")
            }
            ManagedIdentitySource::Imds => {
                let request = self
                    .http
                    .get(IMDS_ENDPOINT)
                    .header("Metadata", "true")
                    .query(&[("api-version", IMDS_API_VERSION), ("resource", resource)]);
                (request, "msi_res_id")
            }
        };

        let request = match id {
            Some(ManagedIdentityId::ClientId(client_id)) => request.query(&[("client_id", client_id)]),
            Some(ManagedIdentityId::ResourceId(resource_id)) => {
                request.query(&[(resource_id_param, resource_id)])
            }
            None => request,
        };

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        parse_token_response(status, &body)
    }
}
