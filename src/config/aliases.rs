//! Environment variable names, in priority order per field

pub const CLOUD: &[&str] = &["M365_CLOUD", "AZURE_CLOUD"];
pub const TENANT_ID: &[&str] = &["M365_TENANT_ID", "AZURE_TENANT_ID"];
pub const AUTH_METHOD: &[&str] = &["M365_AUTH_METHOD"];
pub const TELEMETRY_OPTOUT: &[&str] = &["M365_TELEMETRY_OPTOUT"];
pub const DEBUG_MODE: &[&str] = &["M365_DEBUG_MODE"];

// entra_id_options
pub const CLIENT_ID: &[&str] = &["M365_CLIENT_ID", "AZURE_CLIENT_ID"];
pub const CLIENT_SECRET: &[&str] = &["M365_CLIENT_SECRET", "AZURE_CLIENT_SECRET"];
pub const CLIENT_CERTIFICATE: &[&str] = &["M365_CLIENT_CERTIFICATE"];
pub const CLIENT_CERTIFICATE_FILE_PATH: &[&str] = &[
    "M365_CLIENT_CERTIFICATE_FILE_PATH",
    "AZURE_CLIENT_CERTIFICATE_PATH",
];
pub const CLIENT_CERTIFICATE_PASSWORD: &[&str] = &[
    "M365_CLIENT_CERTIFICATE_PASSWORD",
    "AZURE_CLIENT_CERTIFICATE_PASSWORD",
];
pub const SEND_CERTIFICATE_CHAIN: &[&str] = &["M365_SEND_CERTIFICATE_CHAIN"];
pub const USERNAME: &[&str] = &["M365_USERNAME", "AZURE_USERNAME"];
pub const PASSWORD: &[&str] = &["M365_PASSWORD", "AZURE_PASSWORD"];
pub const USER_ASSERTION: &[&str] = &["M365_USER_ASSERTION"];
pub const DISABLE_INSTANCE_DISCOVERY: &[&str] = &["M365_DISABLE_INSTANCE_DISCOVERY"];
pub const ADDITIONALLY_ALLOWED_TENANTS: &[&str] = &[
    "M365_ADDITIONALLY_ALLOWED_TENANTS",
    "AZURE_ADDITIONALLY_ALLOWED_TENANTS",
];
pub const REDIRECT_URL: &[&str] = &["M365_REDIRECT_URL"];
pub const FEDERATED_TOKEN_FILE_PATH: &[&str] =
    &["M365_FEDERATED_TOKEN_FILE", "AZURE_FEDERATED_TOKEN_FILE"];
pub const MANAGED_IDENTITY_ID: &[&str] = &["M365_MANAGED_IDENTITY_ID"];
pub const MANAGED_IDENTITY_ENDPOINT: &[&str] = &["IDENTITY_ENDPOINT", "MSI_ENDPOINT"];
pub const MANAGED_IDENTITY_SECRET: &[&str] = &["IDENTITY_HEADER", "MSI_SECRET"];
pub const OIDC_TOKEN_FILE_PATH: &[&str] = &["M365_OIDC_TOKEN_FILE_PATH"];
pub const OIDC_AUDIENCE: &[&str] = &["M365_OIDC_AUDIENCE"];
pub const ADO_SERVICE_CONNECTION_ID: &[&str] = &[
    "M365_ADO_SERVICE_CONNECTION_ID",
    "ARM_ADO_PIPELINE_SERVICE_CONNECTION_ID",
    "ARM_OIDC_AZURE_SERVICE_CONNECTION_ID",
];

/// Request URL/token aliases for one OIDC flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OidcAliases {
    pub request_url: &'static [&'static str],
    pub request_token: &'static [&'static str],
}

pub const OIDC_GENERIC: OidcAliases = OidcAliases {
    request_url: &["M365_OIDC_REQUEST_URL", "ACTIONS_ID_TOKEN_REQUEST_URL"],
    request_token: &["M365_OIDC_REQUEST_TOKEN", "ACTIONS_ID_TOKEN_REQUEST_TOKEN"],
};

pub const OIDC_GITHUB: OidcAliases = OidcAliases {
    request_url: &["ACTIONS_ID_TOKEN_REQUEST_URL", "M365_OIDC_REQUEST_URL"],
    request_token: &["ACTIONS_ID_TOKEN_REQUEST_TOKEN", "M365_OIDC_REQUEST_TOKEN"],
};

pub const OIDC_AZURE_DEVOPS: OidcAliases = OidcAliases {
    request_url: &["SYSTEM_OIDCREQUESTURI", "M365_OIDC_REQUEST_URL"],
    request_token: &["SYSTEM_ACCESSTOKEN", "M365_OIDC_REQUEST_TOKEN"],
};

/// Alias set for the OIDC request fields, chosen by auth method
pub fn oidc_for(auth_method: &str) -> OidcAliases {
    match auth_method {
        "oidc_github" => OIDC_GITHUB,
        "oidc_azure_devops" => OIDC_AZURE_DEVOPS,
        _ => OIDC_GENERIC,
    }
}

/// Every alias set of the identity group except the OIDC request pair
pub const ENTRA_ID_OPTIONS: &[&[&str]] = &[
    CLIENT_ID,
    CLIENT_SECRET,
    CLIENT_CERTIFICATE,
    CLIENT_CERTIFICATE_FILE_PATH,
    CLIENT_CERTIFICATE_PASSWORD,
    SEND_CERTIFICATE_CHAIN,
    USERNAME,
    PASSWORD,
    USER_ASSERTION,
    DISABLE_INSTANCE_DISCOVERY,
    ADDITIONALLY_ALLOWED_TENANTS,
    REDIRECT_URL,
    FEDERATED_TOKEN_FILE_PATH,
    MANAGED_IDENTITY_ID,
    MANAGED_IDENTITY_ENDPOINT,
    MANAGED_IDENTITY_SECRET,
    OIDC_TOKEN_FILE_PATH,
    OIDC_AUDIENCE,
    ADO_SERVICE_CONNECTION_ID,
];

// client_options
pub const ENABLE_HEADERS_INSPECTION: &[&str] = &["M365_ENABLE_HEADERS_INSPECTION"];
pub const ENABLE_RETRY: &[&str] = &["M365_ENABLE_RETRY"];
pub const MAX_RETRIES: &[&str] = &["M365_MAX_RETRIES"];
pub const RETRY_DELAY_SECONDS: &[&str] = &["M365_RETRY_DELAY_SECONDS"];
pub const MAX_RETRY_DELAY_SECONDS: &[&str] = &["M365_MAX_RETRY_DELAY_SECONDS"];
pub const ENABLE_REDIRECT: &[&str] = &["M365_ENABLE_REDIRECT"];
pub const MAX_REDIRECTS: &[&str] = &["M365_MAX_REDIRECTS"];
pub const ENABLE_COMPRESSION: &[&str] = &["M365_ENABLE_COMPRESSION"];
pub const CUSTOM_USER_AGENT: &[&str] = &["M365_CUSTOM_USER_AGENT"];
pub const USE_PROXY: &[&str] = &["M365_USE_PROXY"];
pub const PROXY_URL: &[&str] = &["M365_PROXY_URL", "HTTPS_PROXY"];
pub const PROXY_USERNAME: &[&str] = &["M365_PROXY_USERNAME"];
pub const PROXY_PASSWORD: &[&str] = &["M365_PROXY_PASSWORD"];
pub const TIMEOUT_SECONDS: &[&str] = &["M365_TIMEOUT_SECONDS"];
pub const ENABLE_CHAOS: &[&str] = &["M365_ENABLE_CHAOS"];
pub const CHAOS_PERCENTAGE: &[&str] = &["M365_CHAOS_PERCENTAGE"];
pub const CHAOS_STATUS_CODE: &[&str] = &["M365_CHAOS_STATUS_CODE"];
pub const CHAOS_STATUS_MESSAGE: &[&str] = &["M365_CHAOS_STATUS_MESSAGE"];

pub const CLIENT_OPTIONS: &[&[&str]] = &[
    ENABLE_HEADERS_INSPECTION,
    ENABLE_RETRY,
    MAX_RETRIES,
    RETRY_DELAY_SECONDS,
    MAX_RETRY_DELAY_SECONDS,
    ENABLE_REDIRECT,
    MAX_REDIRECTS,
    ENABLE_COMPRESSION,
    CUSTOM_USER_AGENT,
    USE_PROXY,
    PROXY_URL,
    PROXY_USERNAME,
    PROXY_PASSWORD,
    TIMEOUT_SECONDS,
    ENABLE_CHAOS,
    CHAOS_PERCENTAGE,
    CHAOS_STATUS_CODE,
    CHAOS_STATUS_MESSAGE,
];
