//! OIDC Interceptor - authenticated HTTP for OAuth-protected resources
//!
//! This library wraps a [`reqwest::Client`] so that requests to resources
//! protected by an OAuth 2.0 / OIDC authorization server are authenticated
//! without prior configuration of that server.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `interceptor`: request/response hooks, token cache, and coalescing of
//!   concurrent token acquisitions
//! - `server`: one authorization server, its discovery metadata, and this
//!   client's registration with it
//! - `client`: a registered client and token requests
//! - `oauth`: the OAuth wire primitives (discovery, registration, token)
//! - `registry`: persistent store of client registrations
//! - `resource`: protected resource identity and `WWW-Authenticate` parsing
//! - `config`: configuration management and validation
//! - `error`: error types and result aliases
//! - `cli`: command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use oidc_interceptor::{Config, OidcInterceptor};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/config.yaml")?;
//!     let interceptor = OidcInterceptor::from_config(&config)?;
//!
//!     let response = interceptor.get("https://api.example.com/reports").await?;
//!     println!("{}", response.text().await?);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod interceptor;
pub mod oauth;
pub mod registry;
pub mod resource;
pub mod server;

// Re-export commonly used types
pub use client::{AccessToken, RegisteredClient};
pub use config::Config;
pub use error::{AuthError, Result};
pub use interceptor::{OidcInterceptor, OidcInterceptorBuilder, ServerSelector};
pub use oauth::{HttpOAuth, OAuthPrimitives};
pub use registry::{ClientRegistration, ClientRepository, YamlClientRepository};
pub use resource::{BearerChallenge, ProtectedResource};
pub use server::AuthorizationServer;
