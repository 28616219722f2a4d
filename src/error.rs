//! Error types for the OIDC interceptor
//!
//! This module defines all error types used throughout the crate, using
//! `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for interceptor operations
///
/// This enum covers configuration loading, authorization server discovery,
/// dynamic client registration, token acquisition, and the persistent
/// client registry.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Authorization server or protected resource metadata discovery failed
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// Dynamic client registration (RFC 7591) failed
    #[error("Registration error: {0}")]
    Registration(String),

    /// Token endpoint request failed with something other than a 401
    #[error("Token request error: {0}")]
    TokenRequest(String),

    /// Client registry persistence errors
    #[error("Registry error: {0}")]
    Registry(String),

    /// `WWW-Authenticate` challenge could not be used
    #[error("Challenge error: {0}")]
    Challenge(String),

    /// The discovery, registration, and token sequence for a resource failed
    #[error("Token acquisition failed for {resource}: {message}")]
    Acquisition {
        /// Canonical protected resource identity
        resource: String,
        /// Description of the underlying failure
        message: String,
    },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

/// Result type alias for interceptor operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation. The concrete
/// [`AuthError`] can be recovered with `downcast_ref`.
pub type Result<T> = anyhow::Result<T>;
