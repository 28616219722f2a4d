//! Client credentials grant (RFC 6749 section 4.4) with resource indicators
//! (RFC 8707).
//!
//! Two client authentication methods are supported: `client_secret_basic`
//! and `client_secret_jwt` (RFC 7523, HS256 assertion keyed by the client
//! secret).

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};
use crate::oauth::discovery::AuthorizationServerMetadata;
use crate::registry::ClientRegistration;

/// `client_assertion_type` value for JWT client authentication.
const JWT_BEARER_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Lifetime of a signed client assertion, in seconds.
const ASSERTION_LIFETIME_SECS: i64 = 60;

/// Token endpoint client authentication method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientAuthMethod {
    /// HTTP Basic with the client id and secret.
    ClientSecretBasic,
    /// HS256 JWT assertion signed with the client secret.
    ClientSecretJwt,
}

impl ClientAuthMethod {
    /// Registered method name (RFC 7591 `token_endpoint_auth_method`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientSecretBasic => "client_secret_basic",
            Self::ClientSecretJwt => "client_secret_jwt",
        }
    }
}

/// Successful token endpoint response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Issued access token.
    pub access_token: String,
    /// Token type, normally `Bearer`.
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Lifetime in seconds, when advertised.
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Granted scope.
    #[serde(default)]
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Result of a client credentials grant that reached the token endpoint.
#[derive(Debug, Clone)]
pub enum GrantOutcome {
    /// The server issued a token.
    Granted(TokenResponse),
    /// The server rejected the client authentication with `401`.
    Unauthorized,
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    sub: &'a str,
    aud: &'a str,
    jti: String,
    iat: i64,
    exp: i64,
}

/// Signs a `client_secret_jwt` assertion.
///
/// The audience is the issuer identifier, which servers accept alongside the
/// token endpoint URL.
fn client_assertion(client_id: &str, client_secret: &str, audience: &str) -> Result<String> {
    let now = chrono::Utc::now().timestamp();
    let claims = AssertionClaims {
        iss: client_id,
        sub: client_id,
        aud: audience,
        jti: uuid::Uuid::new_v4().to_string(),
        iat: now,
        exp: now + ASSERTION_LIFETIME_SECS,
    };

    let token = jsonwebtoken::encode(
        &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(client_secret.as_bytes()),
    )
    .map_err(|e| AuthError::TokenRequest(format!("failed to sign client assertion: {e}")))?;

    Ok(token)
}

/// Builds the `Authorization: Basic` value; id and secret are
/// form-urlencoded first (RFC 6749 section 2.3.1).
fn basic_credentials(client_id: &str, client_secret: &str) -> String {
    let encode = |s: &str| url::form_urlencoded::byte_serialize(s.as_bytes()).collect::<String>();
    let raw = format!("{}:{}", encode(client_id), encode(client_secret));
    format!(
        "Basic {}",
        base64::engine::general_purpose::STANDARD.encode(raw)
    )
}

/// Requests a token scoped to `resource` with the client credentials grant.
///
/// # Errors
///
/// Returns [`AuthError::TokenRequest`] if the registration has no secret,
/// the request fails, or the token endpoint answers with a non-success
/// status other than `401`.
pub async fn client_credentials_grant(
    http: &reqwest::Client,
    server: &AuthorizationServerMetadata,
    registration: &ClientRegistration,
    method: ClientAuthMethod,
    resource: &str,
) -> Result<GrantOutcome> {
    let secret = registration.client_secret.as_deref().ok_or_else(|| {
        AuthError::TokenRequest(format!(
            "client {} has no secret for {}",
            registration.client_id,
            method.as_str()
        ))
    })?;

    let mut params: Vec<(&str, String)> = vec![
        ("grant_type", "client_credentials".to_string()),
        ("resource", resource.to_string()),
    ];

    let mut req = http.post(&server.token_endpoint);
    match method {
        ClientAuthMethod::ClientSecretBasic => {
            req = req.header(
                reqwest::header::AUTHORIZATION,
                basic_credentials(&registration.client_id, secret),
            );
        }
        ClientAuthMethod::ClientSecretJwt => {
            params.push(("client_id", registration.client_id.clone()));
            params.push(("client_assertion_type", JWT_BEARER_ASSERTION_TYPE.to_string()));
            params.push((
                "client_assertion",
                client_assertion(&registration.client_id, secret, &server.issuer)?,
            ));
        }
    }

    let resp = req
        .form(&params)
        .send()
        .await
        .map_err(|e| AuthError::TokenRequest(format!("token request failed: {e}")))?;

    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Ok(GrantOutcome::Unauthorized);
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(
            AuthError::TokenRequest(format!("token endpoint returned {status}: {body}")).into(),
        );
    }

    let token: TokenResponse = resp
        .json()
        .await
        .map_err(|e| AuthError::TokenRequest(format!("failed to parse token response: {e}")))?;

    Ok(GrantOutcome::Granted(token))
}
