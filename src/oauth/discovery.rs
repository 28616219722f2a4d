//! OAuth 2.0 / OIDC discovery
//!
//! This module implements RFC 9728 Protected Resource Metadata retrieval and
//! RFC 8414 / OpenID Connect Discovery to locate authorization server
//! endpoints.
//!
//! # Discovery sequence
//!
//! 1. A protected resource answers `401 Unauthorized` with a
//!    `WWW-Authenticate: Bearer resource_metadata="<url>"` challenge.
//! 2. [`fetch_protected_resource_metadata`] retrieves that document, which
//!    lists one or more authorization server issuers.
//! 3. [`fetch_authorization_server_metadata`] tries five well-known endpoint
//!    orderings for an issuer and normalizes the advertised endpoints to the
//!    issuer's scheme.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AuthError, Result};

// ---------------------------------------------------------------------------
// Protected Resource Metadata (RFC 9728)
// ---------------------------------------------------------------------------

/// Metadata document describing a protected resource.
///
/// # Examples
///
/// ```
/// use oidc_interceptor::oauth::discovery::ProtectedResourceMetadata;
///
/// let json = r#"{
///     "resource": "https://api.example.com",
///     "authorization_servers": ["https://auth.example.com"],
///     "bearer_methods_supported": ["header"]
/// }"#;
///
/// let meta: ProtectedResourceMetadata = serde_json::from_str(json).unwrap();
/// assert_eq!(meta.authorization_servers.len(), 1);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectedResourceMetadata {
    /// The URI of the protected resource itself.
    pub resource: String,

    /// Issuer URIs of the authorization servers protecting this resource.
    #[serde(default)]
    pub authorization_servers: Vec<String>,

    /// Supported methods for presenting bearer tokens (e.g. `"header"`).
    #[serde(default)]
    pub bearer_methods_supported: Vec<String>,

    /// OAuth scopes supported by this resource, if advertised.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,
}

// ---------------------------------------------------------------------------
// Authorization Server Metadata (RFC 8414 / OIDC Discovery)
// ---------------------------------------------------------------------------

/// Metadata document describing an OAuth 2.0 / OIDC authorization server.
///
/// Only the fields the client-credentials pipeline needs are modelled; the
/// rest of the document is kept in [`extra`](Self::extra).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationServerMetadata {
    /// The issuer identifier URI for this authorization server.
    pub issuer: String,

    /// The URL of the token endpoint (RFC 6749 section 3.2).
    pub token_endpoint: String,

    /// The URL of the authorization endpoint, absent on servers that only
    /// support non-interactive grants.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,

    /// URL of the Dynamic Client Registration endpoint (RFC 7591).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<String>,

    /// Client authentication methods accepted at the token endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_methods_supported: Option<Vec<String>>,

    /// List of `grant_type` values the server supports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_types_supported: Option<Vec<String>>,

    /// Additional server metadata fields not explicitly modelled above.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Discovery helpers
// ---------------------------------------------------------------------------

/// Fetches the RFC 9728 Protected Resource Metadata document at
/// `metadata_url`.
///
/// # Errors
///
/// Returns [`AuthError::Discovery`] if the request fails, the server answers
/// with a non-success status, or the body is not a valid document.
pub async fn fetch_protected_resource_metadata(
    http: &reqwest::Client,
    metadata_url: &Url,
) -> Result<ProtectedResourceMetadata> {
    let resp = http
        .get(metadata_url.clone())
        .send()
        .await
        .map_err(|e| AuthError::Discovery(format!("resource metadata fetch failed: {e}")))?;

    if !resp.status().is_success() {
        return Err(AuthError::Discovery(format!(
            "resource metadata endpoint {} returned {}",
            metadata_url,
            resp.status()
        ))
        .into());
    }

    let meta: ProtectedResourceMetadata = resp.json().await.map_err(|e| {
        AuthError::Discovery(format!("failed to parse protected resource metadata: {e}"))
    })?;

    Ok(meta)
}

/// Constructs the candidate well-known URLs for authorization server
/// metadata discovery, in the order they are tried:
///
/// 1. `/.well-known/oauth-authorization-server/<path>` (path insertion)
/// 2. `/.well-known/openid-configuration/<path>` (path insertion)
/// 3. `<issuer>/.well-known/openid-configuration` (path appending)
/// 4. `/.well-known/oauth-authorization-server`
/// 5. `/.well-known/openid-configuration`
///
/// Duplicates (which occur for issuers without a path) are skipped.
fn build_as_candidate_urls(issuer: &Url) -> Vec<Url> {
    let path = issuer.path().trim_end_matches('/').to_string();
    let origin = issuer.origin().ascii_serialization();

    let raw = [
        format!("{origin}/.well-known/oauth-authorization-server{path}"),
        format!("{origin}/.well-known/openid-configuration{path}"),
        format!("{origin}{path}/.well-known/openid-configuration"),
        format!("{origin}/.well-known/oauth-authorization-server"),
        format!("{origin}/.well-known/openid-configuration"),
    ];

    let mut candidates: Vec<Url> = Vec::with_capacity(raw.len());
    for candidate in raw.iter().filter_map(|s| Url::parse(s).ok()) {
        if !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
    }
    candidates
}

/// Rewrites every `http://` URL in a discovery document to `https://` when
/// the issuer itself is `https`.
///
/// Authorization servers running behind TLS-terminating proxies frequently
/// advertise their endpoints with the internal scheme.
pub fn normalize_endpoint_schemes(document: &mut serde_json::Value, issuer: &Url) {
    if issuer.scheme() != "https" {
        return;
    }

    match document {
        serde_json::Value::String(s) => {
            if let Some(rest) = s.strip_prefix("http://") {
                *s = format!("https://{rest}");
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                normalize_endpoint_schemes(item, issuer);
            }
        }
        serde_json::Value::Object(map) => {
            for value in map.values_mut() {
                normalize_endpoint_schemes(value, issuer);
            }
        }
        _ => {}
    }
}

/// Compares issuer identifiers, ignoring a trailing `/`.
fn same_issuer(advertised: &str, requested: &Url) -> bool {
    advertised.trim_end_matches('/') == requested.as_str().trim_end_matches('/')
}

/// Fetches the authorization server metadata document for `issuer`.
///
/// Tries the well-known orderings from [`build_as_candidate_urls`] and
/// returns the first document that parses and whose `issuer` matches the
/// requested one. Endpoint URLs are normalized with
/// [`normalize_endpoint_schemes`].
///
/// # Errors
///
/// Returns [`AuthError::Discovery`] if no candidate yields a valid document.
pub async fn fetch_authorization_server_metadata(
    http: &reqwest::Client,
    issuer: &Url,
) -> Result<AuthorizationServerMetadata> {
    for candidate in build_as_candidate_urls(issuer) {
        let resp = match http.get(candidate.clone()).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!("discovery candidate {} failed: {}", candidate, e);
                continue;
            }
        };

        if !resp.status().is_success() {
            tracing::debug!("discovery candidate {} returned {}", candidate, resp.status());
            continue;
        }

        let mut document: serde_json::Value = match resp.json().await {
            Ok(v) => v,
            Err(_) => continue,
        };
        normalize_endpoint_schemes(&mut document, issuer);

        let meta: AuthorizationServerMetadata = match serde_json::from_value(document) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!("discovery candidate {} is not valid metadata: {}", candidate, e);
                continue;
            }
        };

        if !same_issuer(&meta.issuer, issuer) {
            return Err(AuthError::Discovery(format!(
                "issuer mismatch: requested {}, document declares {}",
                issuer, meta.issuer
            ))
            .into());
        }

        return Ok(meta);
    }

    Err(AuthError::Discovery(format!(
        "authorization server metadata not found for issuer {}",
        issuer
    ))
    .into())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_as_candidate_urls_root_issuer_deduplicates() {
        let issuer = Url::parse("https://auth.example.com").unwrap();
        let candidates = build_as_candidate_urls(&issuer);
        assert_eq!(candidates.len(), 2);
        assert_eq!(
            candidates[0].as_str(),
            "https://auth.example.com/.well-known/oauth-authorization-server"
        );
        assert_eq!(
            candidates[1].as_str(),
            "https://auth.example.com/.well-known/openid-configuration"
        );
    }

    #[test]
    fn test_build_as_candidate_urls_with_path_produces_five() {
        let issuer = Url::parse("http://localhost:3000/oidc").unwrap();
        let candidates: Vec<String> = build_as_candidate_urls(&issuer)
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(
            candidates,
            vec![
                "http://localhost:3000/.well-known/oauth-authorization-server/oidc",
                "http://localhost:3000/.well-known/openid-configuration/oidc",
                "http://localhost:3000/oidc/.well-known/openid-configuration",
                "http://localhost:3000/.well-known/oauth-authorization-server",
                "http://localhost:3000/.well-known/openid-configuration",
            ]
        );
    }

    #[test]
    fn test_normalize_upgrades_http_endpoints_for_https_issuer() {
        let issuer = Url::parse("https://auth.example.com").unwrap();
        let mut doc = serde_json::json!({
            "issuer": "https://auth.example.com",
            "token_endpoint": "http://auth.example.com/token",
            "mtls_endpoint_aliases": { "token_endpoint": "http://mtls.example.com/token" },
            "grant_types_supported": ["client_credentials"],
            "require_pushed_authorization_requests": false
        });

        normalize_endpoint_schemes(&mut doc, &issuer);

        assert_eq!(doc["token_endpoint"], "https://auth.example.com/token");
        assert_eq!(
            doc["mtls_endpoint_aliases"]["token_endpoint"],
            "https://mtls.example.com/token"
        );
        assert_eq!(doc["grant_types_supported"][0], "client_credentials");
        assert_eq!(doc["require_pushed_authorization_requests"], false);
    }

    #[test]
    fn test_normalize_leaves_http_issuer_untouched() {
        let issuer = Url::parse("http://localhost:3000/oidc").unwrap();
        let mut doc = serde_json::json!({ "token_endpoint": "http://localhost:3000/oidc/token" });
        normalize_endpoint_schemes(&mut doc, &issuer);
        assert_eq!(doc["token_endpoint"], "http://localhost:3000/oidc/token");
    }

    #[test]
    fn test_same_issuer_ignores_trailing_slash() {
        let issuer = Url::parse("http://127.0.0.1:8080").unwrap();
        assert!(same_issuer("http://127.0.0.1:8080", &issuer));
        assert!(same_issuer("http://127.0.0.1:8080/", &issuer));
        assert!(!same_issuer("http://127.0.0.1:9090", &issuer));
    }

    #[test]
    fn test_protected_resource_metadata_deserializes_minimal() {
        let meta: ProtectedResourceMetadata =
            serde_json::from_str(r#"{ "resource": "https://api.example.com" }"#).unwrap();
        assert!(meta.authorization_servers.is_empty());
        assert!(meta.bearer_methods_supported.is_empty());
    }

    #[test]
    fn test_authorization_server_metadata_captures_extra_fields() {
        let json = r#"{
            "issuer": "https://auth.example.com",
            "token_endpoint": "https://auth.example.com/token",
            "registration_endpoint": "https://auth.example.com/reg",
            "jwks_uri": "https://auth.example.com/jwks"
        }"#;

        let meta: AuthorizationServerMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(
            meta.registration_endpoint.as_deref(),
            Some("https://auth.example.com/reg")
        );
        assert!(meta.authorization_endpoint.is_none());
        assert_eq!(meta.extra["jwks_uri"], "https://auth.example.com/jwks");
    }
}
