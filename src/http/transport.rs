//! HTTP transport
//!
//! Builds the reqwest client (proxy, timeout, no automatic redirects) and
//! pairs it with the middleware pipeline. `timeout_seconds` bounds each
//! whole pipeline run, so retry backoff counts against it.

use super::middleware::MiddlewarePipeline;
use super::user_agent::PRODUCT_USER_AGENT;
use crate::config::ClientOptions;
use crate::error::{ConfigError, Result, TransportError};
use reqwest::header::HeaderValue;
use reqwest::{Client, ClientBuilder, Method, Request, RequestBuilder, Response};
use std::time::Duration;
use url::Url;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Per-request correlation header
pub const CLIENT_REQUEST_ID_HEADER: &str = "client-request-id";

/// Sanitize a response body for logs and error messages
/// Truncates long bodies and strips control characters
pub fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| c.is_control(), "")
}

/// Proxy settings, if the options ask for a usable proxy
fn proxy(cfg: &ClientOptions) -> Result<Option<reqwest::Proxy>, ConfigError> {
    if !cfg.use_proxy {
        return Ok(None);
    }
    if cfg.proxy_url.trim().is_empty() {
        tracing::warn!("use_proxy is set but proxy_url is empty, connecting directly");
        return Ok(None);
    }

    let invalid = |reason: String| ConfigError::InvalidUrl {
        field: "proxy_url",
        value: cfg.proxy_url.clone(),
        reason,
    };

    let url = Url::parse(cfg.proxy_url.trim()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https" | "socks5" | "socks5h") {
        return Err(invalid(format!("unsupported proxy scheme '{}'", url.scheme())));
    }

    let mut proxy = reqwest::Proxy::all(url.as_str()).map_err(|e| invalid(e.to_string()))?;
    if !cfg.proxy_username.is_empty() {
        proxy = proxy.basic_auth(&cfg.proxy_username, &cfg.proxy_password);
    }

    tracing::debug!("Using proxy {}", url.host_str().unwrap_or_default());
    Ok(Some(proxy))
}

/// Builder with the options shared by Graph and identity traffic
fn base_builder(cfg: &ClientOptions) -> Result<ClientBuilder, ConfigError> {
    let mut builder = Client::builder().user_agent(PRODUCT_USER_AGENT);

    builder = match proxy(cfg)? {
        Some(proxy) => builder.proxy(proxy),
        // Direct means direct, whatever HTTP(S)_PROXY says
        None => builder.no_proxy(),
    };

    if cfg.timeout_seconds > 0 {
        builder = builder.timeout(Duration::from_secs(cfg.timeout_seconds));
    }

    Ok(builder)
}

/// Client for token endpoints; same proxy and timeout as Graph traffic
pub fn build_identity_client(cfg: &ClientOptions) -> Result<Client> {
    base_builder(cfg)?
        .build()
        .map_err(|e| TransportError::Build(e.to_string()).into())
}

/// Client for Graph traffic; redirects are left to the pipeline
pub fn build_http_client(cfg: &ClientOptions) -> Result<Client> {
    base_builder(cfg)?
        .redirect(reqwest::redirect::Policy::none())
        .gzip(cfg.enable_compression)
        .build()
        .map_err(|e| TransportError::Build(e.to_string()).into())
}

/// HTTP client plus middleware pipeline
#[derive(Debug, Clone)]
pub struct Transport {
    client: Client,
    pipeline: MiddlewarePipeline,
    correlation: bool,
    /// Bound on one `execute` call, retries and backoff included
    timeout: Option<Duration>,
}

impl Transport {
    pub fn new(client: Client, pipeline: MiddlewarePipeline, telemetry_optout: bool) -> Self {
        Self {
            client,
            pipeline,
            correlation: !telemetry_optout,
            timeout: None,
        }
    }

    /// Cap the whole pipeline run, not just each attempt
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout).filter(|t| !t.is_zero());
        self
    }

    /// Build the client from `cfg` and attach `pipeline`
    pub fn from_options(cfg: &ClientOptions, pipeline: MiddlewarePipeline, telemetry_optout: bool) -> Result<Self> {
        Ok(Self::new(build_http_client(cfg)?, pipeline, telemetry_optout)
            .with_timeout(Duration::from_secs(cfg.timeout_seconds)))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn pipeline(&self) -> &MiddlewarePipeline {
        &self.pipeline
    }

    /// Start a request; send it with [`Transport::execute`]
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client.request(method, url)
    }

    /// Run `req` through the pipeline
    pub async fn execute(&self, mut req: Request) -> Result<Response, TransportError> {
        if self.correlation && !req.headers().contains_key(CLIENT_REQUEST_ID_HEADER) {
            let id = uuid::Uuid::new_v4().to_string();
            if let Ok(value) = HeaderValue::from_str(&id) {
                req.headers_mut().insert(CLIENT_REQUEST_ID_HEADER, value);
            }
        }

        tracing::debug!("{} {}", req.method(), req.url());
        let Some(limit) = self.timeout else {
            return self.pipeline.execute(&self.client, req).await;
        };

        match tokio::time::timeout(limit, self.pipeline.execute(&self.client, req)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("Request abandoned after {:?}", limit);
                Err(TransportError::Timeout(limit))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_truncates_and_strips() {
        let long = "x".repeat(500);
        let sanitized = sanitize_for_log(&long);
        assert!(sanitized.starts_with(&"x".repeat(200)));
        assert!(sanitized.ends_with("[truncated, 500 bytes total]"));

        assert_eq!(sanitize_for_log("line\r\nbreak\u{7}"), "linebreak");
    }

    #[test]
    fn test_sanitize_respects_char_boundaries() {
        let body = "é".repeat(150);
        assert!(sanitize_for_log(&body).contains("truncated"));
    }

    #[test]
    fn test_proxy_without_url_goes_direct() {
        let cfg = ClientOptions {
            use_proxy: true,
            ..Default::default()
        };
        assert!(proxy(&cfg).unwrap().is_none());
        assert!(build_http_client(&cfg).is_ok());
    }

    #[test]
    fn test_invalid_proxy_url() {
        let cfg = ClientOptions {
            use_proxy: true,
            proxy_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            proxy(&cfg),
            Err(ConfigError::InvalidUrl { field: "proxy_url", .. })
        ));

        let cfg = ClientOptions {
            use_proxy: true,
            proxy_url: "ftp://proxy.contoso.com".to_string(),
            ..Default::default()
        };
        assert!(proxy(&cfg).is_err());
    }

    #[test]
    fn test_authenticated_proxy_builds() {
        let cfg = ClientOptions {
            use_proxy: true,
            proxy_url: "http://proxy.contoso.com:3128".to_string(),
            proxy_username: "svc".to_string(),
            proxy_password: "pw".to_string(),
            timeout_seconds: 30,
            ..Default::default()
        };
        assert!(proxy(&cfg).unwrap().is_some());
        assert!(build_http_client(&cfg).is_ok());
    }
}
