//! Persistent registry of dynamically registered OAuth clients
//!
//! Registrations are keyed by a deterministic identifier derived from the
//! issuer and the client name (see [`client_key`]), so a registration can be
//! found again after a restart without a secondary index.
//!
//! - [`yaml`] -- file-backed repository serialized as YAML

pub mod yaml;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::oauth::ClientRegistrationResponse;

pub use yaml::YamlClientRepository;

/// Root namespace under which per-issuer namespaces are derived.
const ISSUER_NAMESPACE: Uuid = Uuid::from_u128(0x5ec17d33_2d73_4a1c_9bac_88a4e527f273);

/// Computes the registry key of the client `client_name` at `issuer`.
///
/// The key is `"<client_name>-<uuid>"` where the UUID is a v5 hash of the
/// client name inside a v5 namespace derived from the issuer. The function
/// is pure: equal inputs always produce equal keys.
///
/// # Examples
///
/// ```
/// use oidc_interceptor::registry::client_key;
///
/// let a = client_key("https://auth.example.com", "svc");
/// assert_eq!(a, client_key("https://auth.example.com", "svc"));
/// assert!(a.starts_with("svc-"));
/// assert_ne!(a, client_key("https://other.example.com", "svc"));
/// ```
pub fn client_key(issuer: &str, client_name: &str) -> String {
    let issuer_namespace = Uuid::new_v5(&ISSUER_NAMESPACE, issuer.as_bytes());
    let id = Uuid::new_v5(&issuer_namespace, client_name.as_bytes());
    format!("{client_name}-{id}")
}

/// A client registration as persisted in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRegistration {
    /// Client identifier issued by the authorization server.
    pub client_id: String,
    /// Client secret issued by the authorization server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Name the client registered under.
    pub client_name: String,
    /// Registration management URI (RFC 7592).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_client_uri: Option<String>,
    /// Bearer credential for the registration management URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_access_token: Option<String>,
    /// Issuer the client is registered with.
    pub issuer: String,
}

impl ClientRegistration {
    /// Binds a registration endpoint response to its issuer and name.
    pub fn from_response(
        issuer: &str,
        client_name: &str,
        response: ClientRegistrationResponse,
    ) -> Self {
        Self {
            client_id: response.client_id,
            client_secret: response.client_secret,
            client_name: client_name.to_string(),
            registration_client_uri: response.registration_client_uri,
            registration_access_token: response.registration_access_token,
            issuer: issuer.to_string(),
        }
    }

    /// Registry key of this record, see [`client_key`].
    pub fn key(&self) -> String {
        client_key(&self.issuer, &self.client_name)
    }
}

/// Storage of client registrations.
///
/// Implementations must serialize their operations so that concurrent
/// callers never observe a partially written store, and must never hold two
/// records with the same [`key`](ClientRegistration::key).
#[async_trait]
pub trait ClientRepository: Send + Sync {
    /// Finds the registration of `client_name` at `issuer`.
    async fn get_by_name(&self, issuer: &str, client_name: &str) -> Result<Option<ClientRegistration>>;

    /// Finds a registration by its registry key.
    async fn get(&self, key: &str) -> Result<Option<ClientRegistration>>;

    /// Inserts `registration`, replacing any record with the same key.
    async fn create(&self, registration: ClientRegistration) -> Result<()>;

    /// Removes the registration of `client_name` at `issuer`, if any.
    async fn delete_by_name(&self, issuer: &str, client_name: &str) -> Result<()>;

    /// Returns every stored registration in storage order.
    async fn list(&self) -> Result<Vec<ClientRegistration>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_key_is_deterministic() {
        assert_eq!(
            client_key("http://localhost:3000/oidc", "race"),
            client_key("http://localhost:3000/oidc", "race")
        );
    }

    #[test]
    fn test_client_key_differs_by_name_and_issuer() {
        let base = client_key("http://localhost:3000/oidc", "test");
        assert_ne!(base, client_key("http://localhost:3000/oidc", "test2"));
        assert_ne!(base, client_key("http://localhost:3001/oidc", "test"));
    }

    #[test]
    fn test_client_key_shape() {
        let key = client_key("https://auth.example.com", "svc");
        let uuid_part = key.strip_prefix("svc-").unwrap();
        let parsed = Uuid::parse_str(uuid_part).unwrap();
        assert_eq!(parsed.get_version_num(), 5);
    }

    #[test]
    fn test_from_response_binds_issuer_and_name() {
        let response = ClientRegistrationResponse {
            client_id: "cid".to_string(),
            client_secret: Some("s".to_string()),
            registration_client_uri: Some("https://auth/reg/cid".to_string()),
            registration_access_token: Some("rat".to_string()),
            client_name: None,
        };
        let reg = ClientRegistration::from_response("https://auth", "svc", response);
        assert_eq!(reg.issuer, "https://auth");
        assert_eq!(reg.client_name, "svc");
        assert_eq!(reg.key(), client_key("https://auth", "svc"));
    }
}
