//! Dynamic Client Registration (RFC 7591) and registration management
//! (RFC 7592) wire operations.

use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};
use crate::oauth::discovery::AuthorizationServerMetadata;

/// Redirect URI declared at registration time.
///
/// Some registration endpoints reject clients without a redirect URI even
/// though no authorization code flow is ever run; this address is never
/// dereferenced.
pub const PLACEHOLDER_REDIRECT_URI: &str = "https://example.org/nonexistent";

/// Client metadata sent to the registration endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientRegistrationRequest {
    /// Human-readable client name, also part of the local registry key.
    pub client_name: String,
    /// Grant types the client declares.
    pub grant_types: Vec<String>,
    /// Redirect URIs the client declares.
    pub redirect_uris: Vec<String>,
}

impl ClientRegistrationRequest {
    /// Builds the metadata for a machine client: `authorization_code` and
    /// `client_credentials` grants and the placeholder redirect URI.
    pub fn for_client_credentials(client_name: &str) -> Self {
        Self {
            client_name: client_name.to_string(),
            grant_types: vec![
                "authorization_code".to_string(),
                "client_credentials".to_string(),
            ],
            redirect_uris: vec![PLACEHOLDER_REDIRECT_URI.to_string()],
        }
    }
}

/// Registration endpoint response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRegistrationResponse {
    /// Issued client identifier.
    pub client_id: String,
    /// Issued client secret, absent for public clients.
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Registration management URI (RFC 7592).
    #[serde(default)]
    pub registration_client_uri: Option<String>,
    /// Bearer credential for the registration management URI.
    #[serde(default)]
    pub registration_access_token: Option<String>,
    /// Echoed client name, when the server returns it.
    #[serde(default)]
    pub client_name: Option<String>,
}

/// POSTs `request` to the server's registration endpoint.
///
/// `initial_access_token` is presented as a bearer credential when the
/// registration endpoint is protected.
///
/// # Errors
///
/// Returns [`AuthError::Registration`] when the server advertises no
/// registration endpoint, the request fails, or the server answers with a
/// non-success status.
pub async fn register_client(
    http: &reqwest::Client,
    server: &AuthorizationServerMetadata,
    request: &ClientRegistrationRequest,
    initial_access_token: Option<&str>,
) -> Result<ClientRegistrationResponse> {
    let endpoint = server.registration_endpoint.as_deref().ok_or_else(|| {
        AuthError::Registration(format!(
            "authorization server {} does not advertise a registration endpoint",
            server.issuer
        ))
    })?;

    let mut req = http.post(endpoint).json(request);
    if let Some(token) = initial_access_token {
        req = req.bearer_auth(token);
    }

    let resp = req
        .send()
        .await
        .map_err(|e| AuthError::Registration(format!("dynamic client registration failed: {e}")))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        return Err(AuthError::Registration(format!(
            "registration endpoint returned {status}: {text}"
        ))
        .into());
    }

    let registration: ClientRegistrationResponse = resp
        .json()
        .await
        .map_err(|e| AuthError::Registration(format!("failed to parse registration response: {e}")))?;

    Ok(registration)
}

/// Reads a client's configuration from its registration management URI.
///
/// Only the status code is of interest: success means the server still
/// knows the client.
pub async fn read_client_configuration(
    http: &reqwest::Client,
    registration_client_uri: &str,
    registration_access_token: &str,
) -> Result<reqwest::StatusCode> {
    let resp = http
        .get(registration_client_uri)
        .bearer_auth(registration_access_token)
        .send()
        .await
        .map_err(AuthError::from)?;
    Ok(resp.status())
}
