//! Shared fixtures: one wiremock server playing both the protected resource
//! (under `/api`) and its authorization server (issuer `/oidc`).

use std::sync::Arc;

use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use oidc_interceptor::registry::{client_key, ClientRegistration, YamlClientRepository};
use oidc_interceptor::OidcInterceptor;

pub const CLIENT_NAME: &str = "integration";
pub const TOKEN: &str = "tok-1";
pub const PROTECTED_PATH: &str = "/api/data";

pub struct Fixture {
    pub server: MockServer,
    pub repository: Arc<YamlClientRepository>,
    pub _tmp: TempDir,
}

#[allow(dead_code)]
impl Fixture {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let tmp = TempDir::new().expect("failed to create tempdir");
        let repository = Arc::new(
            YamlClientRepository::new(tmp.path().join("clients.yaml"))
                .expect("failed to create registry"),
        );
        Self {
            server,
            repository,
            _tmp: tmp,
        }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Issuer exactly as the registry stores it.
    pub fn issuer(&self) -> String {
        url::Url::parse(&format!("{}/oidc", self.uri()))
            .expect("valid issuer")
            .to_string()
    }

    pub fn protected_url(&self) -> String {
        format!("{}{}", self.uri(), PROTECTED_PATH)
    }

    pub fn interceptor(&self) -> OidcInterceptor {
        OidcInterceptor::builder(CLIENT_NAME, self.repository.clone()).build()
    }

    /// Resource that accepts `Bearer tok-1` and challenges everything else.
    pub async fn mount_protected_resource(&self) {
        Mock::given(method("GET"))
            .and(path(PROTECTED_PATH))
            .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_string("protected payload"))
            .with_priority(1)
            .mount(&self.server)
            .await;

        Mock::given(method("GET"))
            .and(path(PROTECTED_PATH))
            .respond_with(ResponseTemplate::new(401).insert_header(
                "www-authenticate",
                format!(
                    r#"Bearer realm="api", resource_metadata="{}/.well-known/oauth-protected-resource""#,
                    self.uri()
                )
                .as_str(),
            ))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_resource_metadata(&self, expected_calls: u64) {
        Mock::given(method("GET"))
            .and(path("/.well-known/oauth-protected-resource"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "resource": format!("{}/api", self.uri()),
                "authorization_servers": [format!("{}/oidc", self.uri())],
                "bearer_methods_supported": ["header"]
            })))
            .expect(expected_calls)
            .mount(&self.server)
            .await;
    }

    pub async fn mount_discovery(&self, expected_calls: u64) {
        let base = self.uri();
        Mock::given(method("GET"))
            .and(path("/.well-known/oauth-authorization-server/oidc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "issuer": format!("{base}/oidc"),
                "token_endpoint": format!("{base}/oidc/token"),
                "registration_endpoint": format!("{base}/oidc/reg"),
                "grant_types_supported": ["client_credentials", "authorization_code"],
                "token_endpoint_auth_methods_supported": ["client_secret_basic", "client_secret_jwt"]
            })))
            .expect(expected_calls)
            .mount(&self.server)
            .await;
    }

    /// Registration endpoint issuing `client_id`/`secret` and its
    /// management URI.
    pub async fn mount_registration(&self, client_id: &str, secret: &str, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/oidc/reg"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "client_id": client_id,
                "client_secret": secret,
                "client_name": CLIENT_NAME,
                "registration_client_uri": format!("{}/oidc/reg/{client_id}", self.uri()),
                "registration_access_token": format!("rat-{client_id}")
            })))
            .expect(expected_calls)
            .mount(&self.server)
            .await;
    }

    pub async fn mount_registration_check(&self, client_id: &str, status: u16, expected_calls: u64) {
        Mock::given(method("GET"))
            .and(path(format!("/oidc/reg/{client_id}").as_str()))
            .and(header("authorization", format!("Bearer rat-{client_id}").as_str()))
            .respond_with(ResponseTemplate::new(status))
            .expect(expected_calls)
            .mount(&self.server)
            .await;
    }

    pub async fn mount_token(&self, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/oidc/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": TOKEN,
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .expect(expected_calls)
            .mount(&self.server)
            .await;
    }

    /// Everything a first request needs, each endpoint hit exactly once.
    pub async fn mount_happy_path(&self) {
        self.mount_protected_resource().await;
        self.mount_resource_metadata(1).await;
        self.mount_discovery(1).await;
        self.mount_registration("cid-1", "sec-1", 1).await;
        self.mount_token(1).await;
    }

    /// A registration as `register` would have stored it earlier.
    pub fn stored_registration(&self, client_id: &str, secret: &str) -> ClientRegistration {
        ClientRegistration {
            client_id: client_id.to_string(),
            client_secret: Some(secret.to_string()),
            client_name: CLIENT_NAME.to_string(),
            registration_client_uri: Some(format!("{}/oidc/reg/{client_id}", self.uri())),
            registration_access_token: Some(format!("rat-{client_id}")),
            issuer: self.issuer(),
        }
    }

    pub fn key(&self) -> String {
        client_key(&self.issuer(), CLIENT_NAME)
    }
}
