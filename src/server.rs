//! Authorization server handle
//!
//! An [`AuthorizationServer`] owns the discovery metadata of one issuer and
//! manages this client's registration with it. Discovery starts as soon as
//! the handle is constructed; every operation waits on that single attempt.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use url::Url;

use crate::client::RegisteredClient;
use crate::error::{AuthError, Result};
use crate::oauth::{AuthorizationServerMetadata, ClientRegistrationRequest, OAuthPrimitives};
use crate::registry::{ClientRegistration, ClientRepository};

type Discovery =
    Shared<BoxFuture<'static, std::result::Result<Arc<AuthorizationServerMetadata>, Arc<anyhow::Error>>>>;

/// Handle to one authorization server.
pub struct AuthorizationServer {
    issuer: Url,
    repository: Arc<dyn ClientRepository>,
    oauth: Arc<dyn OAuthPrimitives>,
    ready: Discovery,
}

impl std::fmt::Debug for AuthorizationServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationServer")
            .field("issuer", &self.issuer.as_str())
            .finish_non_exhaustive()
    }
}

impl AuthorizationServer {
    /// Creates the handle and starts discovering `issuer`.
    ///
    /// When called inside a Tokio runtime, discovery is spawned immediately;
    /// otherwise it runs on the first operation.
    pub fn new(
        issuer: Url,
        repository: Arc<dyn ClientRepository>,
        oauth: Arc<dyn OAuthPrimitives>,
    ) -> Arc<Self> {
        let ready = {
            let oauth = Arc::clone(&oauth);
            let issuer = issuer.clone();
            async move {
                tracing::debug!("discovering authorization server {}", issuer);
                oauth
                    .discover(&issuer)
                    .await
                    .map(Arc::new)
                    .map_err(Arc::new)
            }
            .boxed()
            .shared()
        };

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(ready.clone());
        }

        Arc::new(Self {
            issuer,
            repository,
            oauth,
            ready,
        })
    }

    /// Issuer identifier of this server.
    pub fn issuer(&self) -> &Url {
        &self.issuer
    }

    pub(crate) fn oauth(&self) -> &Arc<dyn OAuthPrimitives> {
        &self.oauth
    }

    /// Waits for discovery and returns the server metadata.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Discovery`] if discovery failed. The failure is
    /// permanent for this handle.
    pub async fn metadata(&self) -> Result<Arc<AuthorizationServerMetadata>> {
        self.ready
            .clone()
            .await
            .map_err(|e| anyhow::Error::from(AuthError::Discovery(format!("{}: {:#}", self.issuer, e))))
    }

    /// Returns `true` once discovery has finished with an error.
    pub fn discovery_failed(&self) -> bool {
        matches!(self.ready.peek(), Some(Err(_)))
    }

    /// Returns a registered client named `client_name`, reusing a stored
    /// registration when the server still recognizes it.
    ///
    /// A stored registration that fails its liveness check is deleted and
    /// replaced by a fresh registration. `initial_access_token` is presented
    /// to protected registration endpoints.
    pub async fn ensure_client_registered(
        self: &Arc<Self>,
        client_name: &str,
        initial_access_token: Option<&str>,
    ) -> Result<RegisteredClient> {
        self.metadata().await?;

        let issuer = self.issuer.as_str();
        if let Some(saved) = self.repository.get_by_name(issuer, client_name).await? {
            let client = RegisteredClient::new(saved, Arc::clone(self));
            if client.get_is_registered().await {
                tracing::debug!("reusing registration of {} at {}", client_name, issuer);
                return Ok(client);
            }

            tracing::warn!(
                "stored registration of {} is no longer recognized by {}, re-registering",
                client_name,
                issuer
            );
            self.repository.delete_by_name(issuer, client_name).await?;
        }

        self.register(client_name, initial_access_token).await
    }

    async fn register(
        self: &Arc<Self>,
        client_name: &str,
        initial_access_token: Option<&str>,
    ) -> Result<RegisteredClient> {
        let metadata = self.metadata().await?;
        let request = ClientRegistrationRequest::for_client_credentials(client_name);

        let response = self
            .oauth
            .register_client(&metadata, &request, initial_access_token)
            .await?;
        let registration =
            ClientRegistration::from_response(self.issuer.as_str(), client_name, response);

        self.repository.create(registration.clone()).await?;
        tracing::info!(
            "registered client {} with {} as {}",
            client_name,
            self.issuer,
            registration.client_id
        );

        Ok(RegisteredClient::new(registration, Arc::clone(self)))
    }
}
