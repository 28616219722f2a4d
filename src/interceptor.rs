//! Request/response orchestration
//!
//! [`OidcInterceptor`] wraps a [`reqwest::Client`]. Before a request is sent
//! it attaches the cached access token of the request's
//! [`ProtectedResource`]. When a response is `401 Unauthorized` with a
//! `Bearer` challenge carrying `resource_metadata`, it runs the acquisition
//! sequence:
//!
//! 1. fetch the protected resource metadata,
//! 2. resolve each advertised issuer through the discovery cache,
//! 3. select one authorization server,
//! 4. ensure a client registration exists there,
//! 5. request a token scoped to the resource,
//!
//! then caches the token and retries the request once.
//!
//! Concurrent failures for one resource share a single acquisition: the
//! pending entry is inserted in the same critical section that found none.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use rand::Rng as _;
use reqwest::header::{HeaderValue, AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::{IntoUrl, Method, Request, RequestBuilder, Response, StatusCode};
use url::Url;

use crate::client::AccessToken;
use crate::config::Config;
use crate::error::{AuthError, Result};
use crate::oauth::{HttpOAuth, OAuthPrimitives};
use crate::registry::{ClientRepository, YamlClientRepository};
use crate::resource::{BearerChallenge, ProtectedResource};
use crate::server::AuthorizationServer;

/// Picks an authorization server: receives the number of candidates (at
/// least two) and returns the index to use.
pub type ServerSelector = Arc<dyn Fn(usize) -> usize + Send + Sync>;

/// Selector choosing uniformly at random.
pub fn random_selector() -> ServerSelector {
    Arc::new(|count| rand::rng().random_range(0..count))
}

/// Outcome of one acquisition, observed identically by every waiter.
#[derive(Clone)]
enum Acquisition {
    Token(AccessToken),
    /// Both client authentication methods were rejected.
    Rejected,
    Failed(Arc<anyhow::Error>),
}

type PendingAcquisition = Shared<BoxFuture<'static, Acquisition>>;

#[derive(Default)]
struct State {
    tokens: HashMap<ProtectedResource, AccessToken>,
    pending: HashMap<ProtectedResource, PendingAcquisition>,
}

struct Inner {
    http: reqwest::Client,
    oauth: Arc<dyn OAuthPrimitives>,
    repository: Arc<dyn ClientRepository>,
    client_name: String,
    initial_access_token: Option<String>,
    selector: ServerSelector,
    /// Discovery cache keyed by issuer reference as advertised.
    servers: Mutex<HashMap<String, Arc<AuthorizationServer>>>,
    state: Mutex<State>,
}

/// What the response hook does after inspecting shared state.
enum Next {
    Retry,
    Await {
        acquisition: PendingAcquisition,
        initiator: bool,
    },
}

/// HTTP client wrapper that authenticates requests to OAuth-protected
/// resources.
///
/// Cloning is cheap; clones share the token cache, the pending acquisitions,
/// and the discovery cache.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use oidc_interceptor::interceptor::OidcInterceptor;
/// use oidc_interceptor::registry::YamlClientRepository;
///
/// # async fn example() -> oidc_interceptor::Result<()> {
/// let repository = Arc::new(YamlClientRepository::new("data/clients.yaml")?);
/// let interceptor = OidcInterceptor::builder("my-service", repository).build();
///
/// let response = interceptor.get("https://api.example.com/protected").await?;
/// println!("{}", response.status());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct OidcInterceptor {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for OidcInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OidcInterceptor")
            .field("client_name", &self.inner.client_name)
            .finish_non_exhaustive()
    }
}

/// Builder for [`OidcInterceptor`].
pub struct OidcInterceptorBuilder {
    client_name: String,
    repository: Arc<dyn ClientRepository>,
    http: Option<reqwest::Client>,
    oauth: Option<Arc<dyn OAuthPrimitives>>,
    initial_access_token: Option<String>,
    selector: Option<ServerSelector>,
}

impl OidcInterceptorBuilder {
    /// HTTP client used for the instrumented requests. Defaults to
    /// `reqwest::Client::new()`.
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// OAuth primitives implementation. Defaults to [`HttpOAuth`] over the
    /// HTTP client.
    pub fn oauth(mut self, oauth: Arc<dyn OAuthPrimitives>) -> Self {
        self.oauth = Some(oauth);
        self
    }

    /// Initial access token presented to protected registration endpoints.
    pub fn initial_access_token(mut self, token: impl Into<String>) -> Self {
        self.initial_access_token = Some(token.into());
        self
    }

    /// Authorization server selection policy. Defaults to
    /// [`random_selector`].
    pub fn server_selector(mut self, selector: ServerSelector) -> Self {
        self.selector = Some(selector);
        self
    }

    /// Builds the interceptor.
    pub fn build(self) -> OidcInterceptor {
        let http = self.http.unwrap_or_default();
        let oauth = self
            .oauth
            .unwrap_or_else(|| Arc::new(HttpOAuth::new(http.clone())));

        OidcInterceptor {
            inner: Arc::new(Inner {
                http,
                oauth,
                repository: self.repository,
                client_name: self.client_name,
                initial_access_token: self.initial_access_token,
                selector: self.selector.unwrap_or_else(random_selector),
                servers: Mutex::new(HashMap::new()),
                state: Mutex::new(State::default()),
            }),
        }
    }
}

impl OidcInterceptor {
    /// Starts building an interceptor that registers as `client_name` and
    /// persists registrations in `repository`.
    pub fn builder(
        client_name: impl Into<String>,
        repository: Arc<dyn ClientRepository>,
    ) -> OidcInterceptorBuilder {
        OidcInterceptorBuilder {
            client_name: client_name.into(),
            repository,
            http: None,
            oauth: None,
            initial_access_token: None,
            selector: None,
        }
    }

    /// Builds an interceptor from configuration: a YAML registry at
    /// `registry.path` and an HTTP client with `http.timeout_seconds`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the registry
    /// directory cannot be created, or the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let repository = Arc::new(YamlClientRepository::new(&config.registry.path)?);
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http.timeout_seconds))
            .build()
            .map_err(|e| AuthError::Config(format!("failed to build HTTP client: {e}")))?;

        let mut builder = Self::builder(config.client.client_name.clone(), repository).http_client(http);
        if let Some(token) = &config.initial_access_token {
            builder = builder.initial_access_token(token.clone());
        }
        Ok(builder.build())
    }

    /// Starts a request on the wrapped HTTP client; send it with
    /// [`send`](Self::send).
    pub fn request<U: IntoUrl>(&self, method: Method, url: U) -> RequestBuilder {
        self.inner.http.request(method, url)
    }

    /// Builds and executes `builder`.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let request = builder.build().map_err(AuthError::from)?;
        self.execute(request).await
    }

    /// Executes an authenticated `GET`.
    pub async fn get<U: IntoUrl>(&self, url: U) -> Result<Response> {
        self.send(self.inner.http.get(url)).await
    }

    /// Runs `request` through the request hook, the wrapped client, and the
    /// response hook.
    ///
    /// # Errors
    ///
    /// Transport errors of the wrapped client, and
    /// [`AuthError::Acquisition`] when a token acquisition started by this
    /// request failed. A resource that rejects both client authentication
    /// methods yields the original `401` response, not an error.
    pub async fn execute(&self, mut request: Request) -> Result<Response> {
        let original = request.try_clone();
        let attached = self.on_request(&mut request).await;
        let response = self.inner.http.execute(request).await.map_err(AuthError::from)?;
        self.on_response(original, attached, response).await
    }

    /// Cached token for `resource`, if any.
    pub fn cached_token(&self, resource: &ProtectedResource) -> Option<AccessToken> {
        self.state().tokens.get(resource).cloned()
    }

    /// Request hook: attaches `Authorization: Bearer <token>` when a token
    /// for the request's resource is cached or being acquired.
    ///
    /// Requests that already carry an `Authorization` header are left
    /// untouched. Returns the attached token.
    pub async fn on_request(&self, request: &mut Request) -> Option<AccessToken> {
        if request.headers().contains_key(AUTHORIZATION) {
            return None;
        }

        let resource = ProtectedResource::from_url(request.url());
        let pending = {
            let state = self.state();
            if let Some(token) = state.tokens.get(&resource) {
                let token = token.clone();
                drop(state);
                tracing::debug!("attaching cached token for {}", resource);
                return attach(request, token);
            }
            state.pending.get(&resource).cloned()
        };

        match pending?.await {
            Acquisition::Token(token) => {
                tracing::debug!("attaching freshly acquired token for {}", resource);
                attach(request, token)
            }
            Acquisition::Rejected | Acquisition::Failed(_) => None,
        }
    }

    /// Response hook: drives token acquisition for qualifying `401`
    /// responses and retries `original` once.
    ///
    /// `original` is the request as the caller built it, before the request
    /// hook ran; `attached` is the token the request hook added. Responses
    /// that are not a `401` with a `Bearer resource_metadata` challenge are
    /// returned unchanged, as are `401`s for requests whose caller supplied
    /// its own `Authorization` header.
    pub async fn on_response(
        &self,
        original: Option<Request>,
        attached: Option<AccessToken>,
        response: Response,
    ) -> Result<Response> {
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        if original
            .as_ref()
            .is_some_and(|r| r.headers().contains_key(AUTHORIZATION))
        {
            return Ok(response);
        }

        let Some(challenge) = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .and_then(BearerChallenge::parse)
        else {
            return Ok(response);
        };

        let resource = match &original {
            Some(request) => ProtectedResource::from_url(request.url()),
            None => ProtectedResource::from_url(response.url()),
        };

        let next = {
            let mut state = self.state();
            if let Some(acquisition) = state.pending.get(&resource) {
                Next::Await {
                    acquisition: acquisition.clone(),
                    initiator: false,
                }
            } else if state
                .tokens
                .get(&resource)
                .is_some_and(|cached| attached.as_ref().map(|a| &a.value) != Some(&cached.value))
            {
                // A newer token arrived while this request was in flight.
                Next::Retry
            } else {
                // Any cached token here is the one the resource just rejected.
                if state.tokens.remove(&resource).is_some() {
                    tracing::debug!("evicting rejected token for {}", resource);
                }
                let acquisition = self.start_acquisition(resource.clone(), challenge);
                state.pending.insert(resource.clone(), acquisition.clone());
                Next::Await {
                    acquisition,
                    initiator: true,
                }
            }
        };

        let (acquisition, initiator) = match next {
            Next::Retry => return self.retry(original, response).await,
            Next::Await {
                acquisition,
                initiator,
            } => (acquisition, initiator),
        };

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            if initiator {
                handle.spawn(acquisition.clone());
            }
        }

        let outcome = acquisition.await;

        if !initiator {
            return if self.cached_token(&resource).is_some() {
                self.retry(original, response).await
            } else {
                Ok(response)
            };
        }

        match outcome {
            Acquisition::Token(_) => self.retry(original, response).await,
            Acquisition::Rejected => Ok(response),
            Acquisition::Failed(e) => Err(AuthError::Acquisition {
                resource: resource.to_string(),
                message: format!("{e:#}"),
            }
            .into()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates the shared acquisition future. It caches the token on success
    /// and always vacates its pending slot before resolving.
    fn start_acquisition(
        &self,
        resource: ProtectedResource,
        challenge: BearerChallenge,
    ) -> PendingAcquisition {
        let this = self.clone();
        async move {
            let outcome = match this.acquire(&resource, &challenge).await {
                Ok(Some(token)) => {
                    tracing::info!("acquired access token for {}", resource);
                    Acquisition::Token(token)
                }
                Ok(None) => {
                    tracing::warn!("authorization server rejected client for {}", resource);
                    Acquisition::Rejected
                }
                Err(e) => {
                    tracing::error!("token acquisition for {} failed: {:#}", resource, e);
                    Acquisition::Failed(Arc::new(e))
                }
            };

            let mut state = this.state();
            if let Acquisition::Token(token) = &outcome {
                state.tokens.insert(resource.clone(), token.clone());
            }
            state.pending.remove(&resource);
            outcome
        }
        .boxed()
        .shared()
    }

    async fn acquire(
        &self,
        resource: &ProtectedResource,
        challenge: &BearerChallenge,
    ) -> Result<Option<AccessToken>> {
        let metadata_url = Url::parse(&challenge.resource_metadata).map_err(|e| {
            AuthError::Challenge(format!(
                "invalid resource_metadata {:?}: {e}",
                challenge.resource_metadata
            ))
        })?;

        let metadata = self.inner.oauth.fetch_resource_metadata(&metadata_url).await?;
        if metadata.resource.trim_end_matches('/') != resource.as_str().trim_end_matches('/') {
            tracing::debug!(
                "resource metadata describes {} while requesting {}",
                metadata.resource,
                resource
            );
        }

        let servers = self
            .discover_servers(&metadata.authorization_servers)
            .collect::<Result<Vec<_>>>()?;
        let server = self.select_server(&servers)?;

        let client = server
            .ensure_client_registered(
                &self.inner.client_name,
                self.inner.initial_access_token.as_deref(),
            )
            .await?;

        client.get_resource_access_token(resource).await
    }

    /// Lazily resolves each issuer reference through the discovery cache.
    /// The sequence can be restarted by calling this again.
    fn discover_servers<'a>(
        &'a self,
        issuers: &'a [String],
    ) -> impl Iterator<Item = Result<Arc<AuthorizationServer>>> + 'a {
        issuers.iter().map(move |issuer| self.authorization_server(issuer))
    }

    /// Returns the cached server for `issuer`, creating it on a miss or when
    /// the cached entry's discovery failed.
    fn authorization_server(&self, issuer: &str) -> Result<Arc<AuthorizationServer>> {
        let mut servers = self
            .inner
            .servers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(server) = servers.get(issuer).filter(|s| !s.discovery_failed()) {
            return Ok(Arc::clone(server));
        }

        let url = Url::parse(issuer)
            .map_err(|e| AuthError::Discovery(format!("invalid issuer {issuer:?}: {e}")))?;
        let server = AuthorizationServer::new(
            url,
            Arc::clone(&self.inner.repository),
            Arc::clone(&self.inner.oauth),
        );
        servers.insert(issuer.to_string(), Arc::clone(&server));
        Ok(server)
    }

    fn select_server(&self, servers: &[Arc<AuthorizationServer>]) -> Result<Arc<AuthorizationServer>> {
        let index = match servers.len() {
            0 => {
                return Err(AuthError::Discovery(
                    "resource metadata lists no authorization servers".to_string(),
                )
                .into())
            }
            1 => 0,
            n => (self.inner.selector)(n) % n,
        };
        Ok(Arc::clone(&servers[index]))
    }

    /// Replays `original` through the request hook. The retried response is
    /// returned as is.
    async fn retry(&self, original: Option<Request>, response: Response) -> Result<Response> {
        let Some(mut request) = original else {
            tracing::debug!("request body cannot be replayed, returning original 401");
            return Ok(response);
        };
        self.on_request(&mut request).await;
        Ok(self.inner.http.execute(request).await.map_err(AuthError::from)?)
    }
}

fn attach(request: &mut Request, token: AccessToken) -> Option<AccessToken> {
    match HeaderValue::from_str(&format!("Bearer {}", token.value)) {
        Ok(mut value) => {
            value.set_sensitive(true);
            request.headers_mut().insert(AUTHORIZATION, value);
            Some(token)
        }
        Err(_) => {
            tracing::warn!("access token for {} is not a valid header value", token.resource);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::YamlClientRepository;

    fn interceptor(selector: ServerSelector) -> (OidcInterceptor, tempfile::TempDir) {
        let tmp = tempfile::TempDir::new().unwrap();
        let repo = Arc::new(YamlClientRepository::new(tmp.path().join("clients.yaml")).unwrap());
        let interceptor = OidcInterceptor::builder("test", repo)
            .server_selector(selector)
            .build();
        (interceptor, tmp)
    }

    #[tokio::test]
    async fn test_discovery_cache_reuses_server_per_issuer() {
        let (interceptor, _tmp) = interceptor(random_selector());
        let a = interceptor.authorization_server("http://127.0.0.1:1/oidc").unwrap();
        let b = interceptor.authorization_server("http://127.0.0.1:1/oidc").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_invalid_issuer_is_discovery_error() {
        let (interceptor, _tmp) = interceptor(random_selector());
        let err = interceptor.authorization_server("not a url").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AuthError>(),
            Some(AuthError::Discovery(_))
        ));
    }

    #[tokio::test]
    async fn test_select_server_uses_injected_selector() {
        let (interceptor, _tmp) = interceptor(Arc::new(|count| count - 1));
        let issuers = vec![
            "http://127.0.0.1:1/a".to_string(),
            "http://127.0.0.1:1/b".to_string(),
            "http://127.0.0.1:1/c".to_string(),
        ];
        let servers = interceptor
            .discover_servers(&issuers)
            .collect::<Result<Vec<_>>>()
            .unwrap();

        let chosen = interceptor.select_server(&servers).unwrap();
        assert_eq!(chosen.issuer().as_str(), "http://127.0.0.1:1/c");
    }

    #[tokio::test]
    async fn test_select_server_rejects_empty_list() {
        let (interceptor, _tmp) = interceptor(random_selector());
        assert!(interceptor.select_server(&[]).is_err());
    }

    #[test]
    fn test_from_config_creates_registry_directory() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.registry.path = tmp.path().join("state/clients.yaml");

        let interceptor = OidcInterceptor::from_config(&config).unwrap();
        assert_eq!(interceptor.inner.client_name, "oidc-interceptor");
        assert!(tmp.path().join("state").is_dir());
    }

    #[test]
    fn test_from_config_rejects_invalid_config() {
        let mut config = Config::default();
        config.http.timeout_seconds = 0;
        assert!(OidcInterceptor::from_config(&config).is_err());
    }

    #[test]
    fn test_random_selector_stays_in_range() {
        let selector = random_selector();
        for _ in 0..100 {
            assert!(selector(3) < 3);
        }
    }

    #[tokio::test]
    async fn test_on_request_keeps_caller_authorization() {
        let (interceptor, _tmp) = interceptor(random_selector());
        let mut request = reqwest::Client::new()
            .get("http://127.0.0.1:1/protected")
            .header(AUTHORIZATION, "Bearer caller")
            .build()
            .unwrap();

        assert!(interceptor.on_request(&mut request).await.is_none());
        assert_eq!(request.headers()[AUTHORIZATION], "Bearer caller");
    }

    #[tokio::test]
    async fn test_on_request_without_token_passes_through() {
        let (interceptor, _tmp) = interceptor(random_selector());
        let mut request = reqwest::Client::new()
            .get("http://127.0.0.1:1/protected")
            .build()
            .unwrap();

        assert!(interceptor.on_request(&mut request).await.is_none());
        assert!(!request.headers().contains_key(AUTHORIZATION));
    }

    #[tokio::test]
    async fn test_on_request_attaches_cached_token() {
        let (interceptor, _tmp) = interceptor(random_selector());
        let url = Url::parse("http://127.0.0.1:1/protected").unwrap();
        let resource = ProtectedResource::from_url(&url);
        interceptor.state().tokens.insert(
            resource.clone(),
            AccessToken {
                value: "cached".to_string(),
                token_type: "Bearer".to_string(),
                resource,
            },
        );

        let mut request = reqwest::Client::new()
            .get("http://127.0.0.1:1/protected?page=3")
            .build()
            .unwrap();
        let attached = interceptor.on_request(&mut request).await;

        assert_eq!(attached.map(|t| t.value), Some("cached".to_string()));
        assert_eq!(request.headers()[AUTHORIZATION], "Bearer cached");
    }
}
