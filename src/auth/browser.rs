//! Interactive browser sign-in
//!
//! Authorization code flow with PKCE. A one-shot listener on the loopback
//! redirect URL receives the code.

use crate::error::CredentialError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;

/// How long to wait for the user to finish signing in
const SIGN_IN_TIMEOUT: Duration = Duration::from_secs(5 * 60);

const MAX_REQUEST_BYTES: usize = 16 * 1024;

const SUCCESS_PAGE: &str = "<html><body>Sign-in complete. You can close this window.</body></html>";

/// Code returned to the redirect URL plus the verifier to redeem it
#[derive(Debug)]
pub(crate) struct AuthorizationGrant {
    pub code: String,
    pub verifier: String,
}

/// PKCE verifier and its S256 challenge
fn pkce_pair() -> (String, String) {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let verifier = URL_SAFE_NO_PAD.encode(bytes);
    let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
    (verifier, challenge)
}

fn authorization_url(
    authorize_endpoint: &str,
    client_id: &str,
    redirect_url: &Url,
    scope: &str,
    challenge: &str,
    state: &str,
) -> Result<Url, CredentialError> {
    let mut url = Url::parse(authorize_endpoint)
        .map_err(|e| CredentialError::Interaction(format!("invalid authorize endpoint: {}", e)))?;
    url.query_pairs_mut()
        .append_pair("client_id", client_id)
        .append_pair("response_type", "code")
        .append_pair("redirect_uri", redirect_url.as_str())
        .append_pair("response_mode", "query")
        .append_pair("scope", scope)
        .append_pair("state", state)
        .append_pair("code_challenge", challenge)
        .append_pair("code_challenge_method", "S256");
    Ok(url)
}

/// Extract the authorization code from the callback request line
///
/// `request_line` is the first line of the HTTP request, e.g.
/// `GET /?code=...&state=... HTTP/1.1`.
pub(crate) fn parse_callback(request_line: &str, expected_state: &str) -> Result<String, CredentialError> {
    let target = request_line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| CredentialError::Interaction("malformed callback request".to_string()))?;

    let url = Url::parse("http://localhost")
        .and_then(|base| base.join(target))
        .map_err(|e| CredentialError::Interaction(format!("malformed callback target: {}", e)))?;

    let mut code = None;
    let mut state = None;
    let mut error = None;
    let mut description = String::new();
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "error_description" => description = value.into_owned(),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Err(CredentialError::TokenRequest { error, description });
    }
    if state.as_deref() != Some(expected_state) {
        return Err(CredentialError::Interaction(
            "state mismatch in authorization callback".to_string(),
        ));
    }
    code.ok_or_else(|| CredentialError::Interaction("callback carried no authorization code".to_string()))
}

/// Run the browser leg and wait for the redirect
pub(crate) async fn authorize(
    authorize_endpoint: &str,
    client_id: &str,
    redirect_url: &Url,
    scope: &str,
    show_url: impl FnOnce(&Url),
) -> Result<AuthorizationGrant, CredentialError> {
    let port = redirect_url.port_or_known_default().unwrap_or(80);
    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .map_err(|e| CredentialError::Interaction(format!("cannot listen on port {}: {}", port, e)))?;

    let (verifier, challenge) = pkce_pair();
    let state = uuid::Uuid::new_v4().to_string();
    let url = authorization_url(authorize_endpoint, client_id, redirect_url, scope, &challenge, &state)?;

    show_url(&url);

    let (mut stream, peer) = tokio::time::timeout(SIGN_IN_TIMEOUT, listener.accept())
        .await
        .map_err(|_| CredentialError::Interaction("timed out waiting for browser sign-in".to_string()))?
        .map_err(|e| CredentialError::Interaction(format!("callback connection failed: {}", e)))?;
    tracing::debug!("Authorization callback from {}", peer);

    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") && buf.len() < MAX_REQUEST_BYTES {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| CredentialError::Interaction(format!("failed to read callback: {}", e)))?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let request = String::from_utf8_lossy(&buf);
    let request_line = request.lines().next().unwrap_or_default();
    let result = parse_callback(request_line, &state);

    let body = match &result {
        Ok(_) => SUCCESS_PAGE.to_string(),
        Err(e) => format!("<html><body>Sign-in failed: {}</body></html>", e),
    };
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        tracing::debug!("Failed to answer authorization callback: {}", e);
    }

    Ok(AuthorizationGrant {
        code: result?,
        verifier,
    })
}
