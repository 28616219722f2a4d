//! OAuth wire primitives
//!
//! Everything that builds or parses an OAuth protocol message lives behind
//! the [`OAuthPrimitives`] trait. The orchestration layers above
//! ([`AuthorizationServer`](crate::server::AuthorizationServer),
//! [`RegisteredClient`](crate::client::RegisteredClient) and
//! [`OidcInterceptor`](crate::interceptor::OidcInterceptor)) only call these
//! operations.
//!
//! # Module Layout
//!
//! - [`discovery`]    -- RFC 9728 resource metadata and RFC 8414 / OIDC
//!   discovery
//! - [`registration`] -- RFC 7591 dynamic registration, RFC 7592 reads
//! - [`token`]        -- client credentials grant with Basic / JWT auth

pub mod discovery;
pub mod registration;
pub mod token;

use async_trait::async_trait;
use url::Url;

use crate::error::Result;
use crate::registry::ClientRegistration;

pub use discovery::{AuthorizationServerMetadata, ProtectedResourceMetadata};
pub use registration::{ClientRegistrationRequest, ClientRegistrationResponse};
pub use token::{ClientAuthMethod, GrantOutcome, TokenResponse};

/// OAuth protocol operations used by the authentication pipeline.
#[async_trait]
pub trait OAuthPrimitives: Send + Sync {
    /// Fetches the protected resource metadata document at `url`.
    async fn fetch_resource_metadata(&self, url: &Url) -> Result<ProtectedResourceMetadata>;

    /// Discovers the metadata of the authorization server `issuer`.
    async fn discover(&self, issuer: &Url) -> Result<AuthorizationServerMetadata>;

    /// Registers a client with dynamic client registration.
    async fn register_client(
        &self,
        server: &AuthorizationServerMetadata,
        request: &ClientRegistrationRequest,
        initial_access_token: Option<&str>,
    ) -> Result<ClientRegistrationResponse>;

    /// Runs the client credentials grant for `resource`.
    async fn client_credentials_grant(
        &self,
        server: &AuthorizationServerMetadata,
        registration: &ClientRegistration,
        method: ClientAuthMethod,
        resource: &str,
    ) -> Result<GrantOutcome>;

    /// Reads the registration management URI, returning the response status.
    async fn check_registration(
        &self,
        registration_client_uri: &str,
        registration_access_token: &str,
    ) -> Result<reqwest::StatusCode>;
}

/// [`OAuthPrimitives`] over a [`reqwest::Client`].
///
/// # Examples
///
/// ```
/// use oidc_interceptor::oauth::HttpOAuth;
///
/// let oauth = HttpOAuth::new(reqwest::Client::new());
/// ```
#[derive(Debug, Clone, Default)]
pub struct HttpOAuth {
    http: reqwest::Client,
}

impl HttpOAuth {
    /// Wraps an HTTP client. The client must not itself be instrumented by
    /// an [`OidcInterceptor`](crate::interceptor::OidcInterceptor).
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl OAuthPrimitives for HttpOAuth {
    async fn fetch_resource_metadata(&self, url: &Url) -> Result<ProtectedResourceMetadata> {
        discovery::fetch_protected_resource_metadata(&self.http, url).await
    }

    async fn discover(&self, issuer: &Url) -> Result<AuthorizationServerMetadata> {
        discovery::fetch_authorization_server_metadata(&self.http, issuer).await
    }

    async fn register_client(
        &self,
        server: &AuthorizationServerMetadata,
        request: &ClientRegistrationRequest,
        initial_access_token: Option<&str>,
    ) -> Result<ClientRegistrationResponse> {
        registration::register_client(&self.http, server, request, initial_access_token).await
    }

    async fn client_credentials_grant(
        &self,
        server: &AuthorizationServerMetadata,
        registration: &ClientRegistration,
        method: ClientAuthMethod,
        resource: &str,
    ) -> Result<GrantOutcome> {
        token::client_credentials_grant(&self.http, server, registration, method, resource).await
    }

    async fn check_registration(
        &self,
        registration_client_uri: &str,
        registration_access_token: &str,
    ) -> Result<reqwest::StatusCode> {
        registration::read_client_configuration(
            &self.http,
            registration_client_uri,
            registration_access_token,
        )
        .await
    }
}
