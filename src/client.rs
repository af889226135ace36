//! Client bundle
//!
//! The single artifact handed to resource code: endpoints for the selected
//! cloud, the credential, and the transport with its middleware pipeline.
//!
//! # Example
//!
//! ```ignore
//! use m365_provider::{build_client_bundle, ApiVersion, EnvironmentSnapshot, RawConfiguration};
//!
//! async fn example() -> m365_provider::Result<()> {
//!     let raw = RawConfiguration::load("provider.yaml".as_ref())?;
//!     let bundle = build_client_bundle(&raw, &EnvironmentSnapshot::from_process())?;
//!     let me = bundle.get_json(ApiVersion::V1, "organization").await?;
//!     Ok(())
//! }
//! ```

use crate::auth::{self, Credential};
use crate::cloud::{self, ApiVersion, CloudEndpoints};
use crate::config::{resolve, EnvironmentSnapshot, RawConfiguration, ResolvedConfiguration};
use crate::error::{Result, TransportError};
use crate::http::transport::{sanitize_for_log, Transport};
use crate::http::{self, HeadersInspector, MiddlewarePipeline};
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Method, Request, Response};
use serde_json::Value;
use std::sync::Arc;

struct Inner {
    endpoints: CloudEndpoints,
    credential: Credential,
    transport: Transport,
}

/// Ready-to-use client; clones share everything
#[derive(Clone)]
pub struct ClientBundle {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ClientBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBundle")
            .field("endpoints", &self.inner.endpoints)
            .field("credential", &self.inner.credential)
            .field("pipeline", self.inner.transport.pipeline())
            .finish()
    }
}

/// Wire the transport together and pair it with endpoints and credential
///
/// Structural validation only; nothing is sent.
pub fn assemble(
    cfg: &ResolvedConfiguration,
    pipeline: MiddlewarePipeline,
    endpoints: CloudEndpoints,
    credential: Credential,
) -> Result<ClientBundle> {
    let options = cfg.client_options_or_default();
    let transport = Transport::from_options(&options, pipeline, cfg.telemetry_optout)?;

    tracing::info!(
        "Client bundle ready: cloud={}, auth={}, stages={:?}",
        cfg.cloud,
        credential.method(),
        transport.pipeline().stage_names()
    );

    Ok(ClientBundle {
        inner: Arc::new(Inner {
            endpoints,
            credential,
            transport,
        }),
    })
}

/// Resolve, validate and assemble in one go
pub fn build_client_bundle(raw: &RawConfiguration, env: &EnvironmentSnapshot) -> Result<ClientBundle> {
    let cfg = resolve(raw, env);
    let endpoints = cloud::lookup(&cfg.cloud)?;
    bundle_from_resolved(&cfg, endpoints)
}

/// Assemble from an already-resolved configuration and explicit endpoints
pub fn bundle_from_resolved(cfg: &ResolvedConfiguration, endpoints: CloudEndpoints) -> Result<ClientBundle> {
    let credential = auth::select(&cfg.auth_method, cfg, &endpoints)?;
    let pipeline = http::build(&cfg.client_options_or_default());
    assemble(cfg, pipeline, endpoints, credential)
}

/// Human-readable message from a Graph error body
fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let graph_error = parsed.as_ref().and_then(|v| v.get("error"));

    let message = match graph_error {
        Some(e) => {
            let code = e.get("code").and_then(Value::as_str).unwrap_or_default();
            let message = e.get("message").and_then(Value::as_str).unwrap_or_default();
            match (code.is_empty(), message.is_empty()) {
                (false, false) => format!("{}: {}", code, message),
                (true, false) => message.to_string(),
                (false, true) => code.to_string(),
                (true, true) => String::new(),
            }
        }
        None => body.to_string(),
    };

    if message.trim().is_empty() {
        return status.canonical_reason().unwrap_or("Unknown error").to_string();
    }
    sanitize_for_log(&message)
}

impl ClientBundle {
    pub fn endpoints(&self) -> &CloudEndpoints {
        &self.inner.endpoints
    }

    /// Full URL for `path` under the given API version
    pub fn url(&self, version: ApiVersion, path: &str) -> String {
        self.inner.endpoints.url(version, path)
    }

    pub fn credential(&self) -> &Credential {
        &self.inner.credential
    }

    pub async fn authorization_header(&self) -> Result<String> {
        Ok(self.inner.credential.authorization_header().await?)
    }

    pub fn transport(&self) -> &Transport {
        &self.inner.transport
    }

    /// Header buffer, present when header inspection is enabled
    pub fn headers_inspector(&self) -> Option<&HeadersInspector> {
        self.inner.transport.pipeline().headers_inspector()
    }

    /// Run a prepared request through the pipeline, without authorization
    pub async fn execute(&self, req: Request) -> Result<Response, TransportError> {
        self.inner.transport.execute(req).await
    }

    async fn send_json(&self, method: Method, url: &str, body: Option<&Value>) -> Result<Value> {
        tracing::debug!("{} {}", method, url);

        let header = self.authorization_header().await?;
        let mut builder = self.inner.transport.request(method, url);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let mut request = builder
            .build()
            .map_err(|e| TransportError::Build(e.to_string()))?;
        let value = HeaderValue::from_str(&header).map_err(|e| TransportError::Build(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, value);

        let response = self.execute(request).await?;
        let status = response.status();
        let response_body = response.text().await.map_err(TransportError::from)?;

        if !status.is_success() {
            // Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&response_body));
            return Err(TransportError::Status {
                status: status.as_u16(),
                message: error_message(status, &response_body),
            }
            .into());
        }

        // Handle empty response
        if response_body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&response_body)
            .map_err(|e| TransportError::Body(format!("failed to parse response JSON: {}", e)).into())
    }

    pub async fn get_json(&self, version: ApiVersion, path: &str) -> Result<Value> {
        self.send_json(Method::GET, &self.url(version, path), None).await
    }

    pub async fn post_json(&self, version: ApiVersion, path: &str, body: &Value) -> Result<Value> {
        self.send_json(Method::POST, &self.url(version, path), Some(body)).await
    }

    pub async fn patch_json(&self, version: ApiVersion, path: &str, body: &Value) -> Result<Value> {
        self.send_json(Method::PATCH, &self.url(version, path), Some(body)).await
    }

    pub async fn delete(&self, version: ApiVersion, path: &str) -> Result<Value> {
        self.send_json(Method::DELETE, &self.url(version, path), None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_graph_error_message() {
        let body = r#"{"error":{"code":"Request_ResourceNotFound","message":"Resource 'x' does not exist."}}"#;
        assert_eq!(
            error_message(StatusCode::NOT_FOUND, body),
            "Request_ResourceNotFound: Resource 'x' does not exist."
        );
    }

    #[test]
    fn test_non_json_and_empty_error_bodies() {
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, "upstream down"), "upstream down");
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, ""), "Bad Gateway");
    }

    #[test]
    fn test_bundle_from_environment_only() {
        let env = EnvironmentSnapshot::from_pairs([
            ("M365_AUTH_METHOD", "client_secret"),
            ("M365_TENANT_ID", "00000000-0000-0000-0000-000000000001"),
            ("M365_CLIENT_ID", "00000000-0000-0000-0000-000000000002"),
            ("M365_CLIENT_SECRET", "s3cret"),
            ("M365_ENABLE_RETRY", "true"),
            ("M365_CLOUD", "gcchigh"),
        ]);
        let bundle = build_client_bundle(&RawConfiguration::default(), &env).unwrap();
        assert_eq!(bundle.url(ApiVersion::Beta, "users"), "https://graph.microsoft.us/beta/users");
        assert_eq!(bundle.transport().pipeline().stage_names(), vec!["retry"]);
        assert!(bundle.headers_inspector().is_none());
        assert!(!format!("{:?}", bundle).contains("s3cret"));
    }

    #[test]
    fn test_unsupported_cloud_aborts() {
        let env = EnvironmentSnapshot::from_pairs([("M365_CLOUD", "mars")]);
        let err = build_client_bundle(&RawConfiguration::default(), &env).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Config(crate::ConfigError::UnsupportedCloud(ref c)) if c == "mars"
        ));
    }
}
