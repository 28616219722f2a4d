//! A client registration bound to its authorization server
//!
//! [`RegisteredClient`] obtains resource-scoped access tokens with the
//! client credentials grant and checks whether the server still knows the
//! registration.

use std::sync::Arc;

use crate::error::Result;
use crate::oauth::{ClientAuthMethod, GrantOutcome};
use crate::registry::ClientRegistration;
use crate::resource::ProtectedResource;
use crate::server::AuthorizationServer;

/// An access token issued for one protected resource.
///
/// Tokens carry no expiry tracking: a cached token is used until the
/// resource rejects it.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    /// The bearer credential.
    pub value: String,
    /// Token type reported by the server, normally `Bearer`.
    pub token_type: String,
    /// Resource the token was requested for.
    pub resource: ProtectedResource,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("resource", &self.resource)
            .finish()
    }
}

/// A live client registration.
#[derive(Debug, Clone)]
pub struct RegisteredClient {
    registration: ClientRegistration,
    server: Arc<AuthorizationServer>,
}

impl RegisteredClient {
    /// Binds `registration` to the server it was issued by.
    pub fn new(registration: ClientRegistration, server: Arc<AuthorizationServer>) -> Self {
        Self {
            registration,
            server,
        }
    }

    /// The stored registration.
    pub fn registration(&self) -> &ClientRegistration {
        &self.registration
    }

    /// Requests an access token scoped to `resource`.
    ///
    /// Authenticates with `client_secret_basic` first and falls back to
    /// `client_secret_jwt` when the token endpoint answers `401`. Returns
    /// `Ok(None)` when both methods are rejected.
    ///
    /// # Errors
    ///
    /// Any failure other than a `401` from the token endpoint.
    pub async fn get_resource_access_token(
        &self,
        resource: &ProtectedResource,
    ) -> Result<Option<AccessToken>> {
        let metadata = self.server.metadata().await?;
        let oauth = self.server.oauth();

        for method in [
            ClientAuthMethod::ClientSecretBasic,
            ClientAuthMethod::ClientSecretJwt,
        ] {
            let outcome = oauth
                .client_credentials_grant(&metadata, &self.registration, method, resource.as_str())
                .await?;

            match outcome {
                GrantOutcome::Granted(token) => {
                    tracing::debug!(
                        "obtained token for {} using {}",
                        resource,
                        method.as_str()
                    );
                    return Ok(Some(AccessToken {
                        value: token.access_token,
                        token_type: token.token_type,
                        resource: resource.clone(),
                    }));
                }
                GrantOutcome::Unauthorized => {
                    tracing::debug!(
                        "token endpoint rejected {} for client {}",
                        method.as_str(),
                        self.registration.client_id
                    );
                }
            }
        }

        Ok(None)
    }

    /// Returns `true` iff the registration management URI answers with a
    /// success status.
    ///
    /// A registration without a management URI or access token cannot be
    /// verified and counts as not registered. Transport failures also count
    /// as not registered.
    pub async fn get_is_registered(&self) -> bool {
        let (Some(uri), Some(token)) = (
            self.registration.registration_client_uri.as_deref(),
            self.registration.registration_access_token.as_deref(),
        ) else {
            return false;
        };

        match self.server.oauth().check_registration(uri, token).await {
            Ok(status) => status.is_success(),
            Err(e) => {
                tracing::warn!("registration check for {} failed: {}", uri, e);
                false
            }
        }
    }
}
