//! National cloud endpoints
//!
//! Maps a cloud identifier to the Entra ID authority, the Graph scope and
//! the two Graph service roots.

use crate::error::ConfigError;
use serde::Serialize;

/// Graph API surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ApiVersion {
    V1,
    Beta,
}

/// Endpoints for one cloud
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CloudEndpoints {
    /// Authority base, always with a trailing slash
    pub authority_url: String,
    pub api_scope: String,
    pub service_root_v1: String,
    pub service_root_beta: String,
}

/// Supported cloud identifiers
pub const SUPPORTED_CLOUDS: &[&str] = &["public", "dod", "gcc", "gcchigh", "china", "ex", "rx"];

struct Entry {
    authority: &'static str,
    graph: &'static str,
}

fn entry(cloud: &str) -> Option<Entry> {
    let e = match cloud {
        // GCC tenants live in the commercial cloud
        "public" | "gcc" => Entry {
            authority: "https://login.microsoftonline.com/",
            graph: "https://graph.microsoft.com",
        },
        "gcchigh" => Entry {
            authority: "https://login.microsoftonline.us/",
            graph: "https://graph.microsoft.us",
        },
        "dod" => Entry {
            authority: "https://login.microsoftonline.us/",
            graph: "https://dod-graph.microsoft.us",
        },
        "china" => Entry {
            authority: "https://login.chinacloudapi.cn/",
            graph: "https://microsoftgraph.chinacloudapi.cn",
        },
        "ex" => Entry {
            authority: "https://login.microsoftonline.eaglex.ic.gov/",
            graph: "https://graph.eaglex.ic.gov",
        },
        "rx" => Entry {
            authority: "https://login.microsoftonline.microsoft.scloud/",
            graph: "https://graph.microsoft.scloud",
        },
        _ => return None,
    };
    Some(e)
}

/// Look up the endpoints for a cloud identifier
pub fn lookup(cloud: &str) -> Result<CloudEndpoints, ConfigError> {
    let Some(e) = entry(cloud) else {
        return Err(ConfigError::UnsupportedCloud(cloud.to_string()));
    };

    Ok(CloudEndpoints {
        authority_url: e.authority.to_string(),
        api_scope: format!("{}/.default", e.graph),
        service_root_v1: format!("{}/v1.0", e.graph),
        service_root_beta: format!("{}/beta", e.graph),
    })
}

impl CloudEndpoints {
    /// Build endpoints by hand, e.g. to point a test harness at a mock server
    pub fn custom(authority_url: &str, api_scope: &str, service_root: &str) -> Self {
        let authority_url = if authority_url.ends_with('/') {
            authority_url.to_string()
        } else {
            format!("{}/", authority_url)
        };
        let root = service_root.trim_end_matches('/');

        Self {
            authority_url,
            api_scope: api_scope.to_string(),
            service_root_v1: format!("{}/v1.0", root),
            service_root_beta: format!("{}/beta", root),
        }
    }

    /// Service root for an API version
    pub fn service_root(&self, version: ApiVersion) -> &str {
        match version {
            ApiVersion::V1 => &self.service_root_v1,
            ApiVersion::Beta => &self.service_root_beta,
        }
    }

    /// Build a full API URL from a relative path like `users/{id}`
    pub fn url(&self, version: ApiVersion, path: &str) -> String {
        format!("{}/{}", self.service_root(version), path.trim_start_matches('/'))
    }

    /// OAuth2 v2.0 endpoint for a tenant, e.g. `token` or `devicecode`
    pub fn oauth_endpoint(&self, tenant: &str, endpoint: &str) -> String {
        format!(
            "{}{}/oauth2/v2.0/{}",
            self.authority_url,
            urlencoding::encode(tenant),
            endpoint
        )
    }

    /// Resource identifier used by managed identity endpoints
    pub fn resource(&self) -> &str {
        self.api_scope
            .strip_suffix("/.default")
            .unwrap_or(&self.api_scope)
    }
}
