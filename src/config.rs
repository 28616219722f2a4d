//! Configuration management for the interceptor
//!
//! Configuration is read from a YAML file, then overridden by
//! `OIDC_INTERCEPTOR_*` environment variables and finally by CLI flags.

use crate::error::{AuthError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Identity this client registers under
    #[serde(default)]
    pub client: ClientConfig,

    /// Client registry storage
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Outbound HTTP settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Initial access token for protected registration endpoints
    #[serde(default)]
    pub initial_access_token: Option<String>,
}

/// Client identity configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Name sent as `client_name` during registration and used in the
    /// registry key
    #[serde(default = "default_client_name")]
    pub client_name: String,
}

fn default_client_name() -> String {
    "oidc-interceptor".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_name: default_client_name(),
        }
    }
}

/// Registry storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Path of the YAML registry file
    #[serde(default = "default_registry_path")]
    pub path: PathBuf,
}

/// Default registry location: `clients.yaml` in the platform data directory,
/// or the working directory when no home directory can be determined.
fn default_registry_path() -> PathBuf {
    ProjectDirs::from("org", "oidc-interceptor", "oidc-interceptor")
        .map(|dirs| dirs.data_dir().join("clients.yaml"))
        .unwrap_or_else(|| PathBuf::from("clients.yaml"))
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: default_registry_path(),
        }
    }
}

/// Outbound HTTP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout in seconds, applied to resource and
    /// authorization server requests alike
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_timeout_seconds() -> u64 {
    30
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment variable overrides
    ///
    /// A missing file is not an error: defaults are used and a warning is
    /// logged.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if the file exists but cannot be read
    /// or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path.display());
            Self::default()
        };

        config.apply_env_vars();
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| AuthError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| AuthError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(name) = std::env::var("OIDC_INTERCEPTOR_CLIENT_NAME") {
            self.client.client_name = name;
        }

        if let Ok(path) = std::env::var("OIDC_INTERCEPTOR_REGISTRY_PATH") {
            self.registry.path = PathBuf::from(path);
        }

        if let Ok(token) = std::env::var("OIDC_INTERCEPTOR_INITIAL_ACCESS_TOKEN") {
            self.initial_access_token = Some(token).filter(|t| !t.is_empty());
        }

        if let Ok(timeout) = std::env::var("OIDC_INTERCEPTOR_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.http.timeout_seconds = value;
            } else {
                tracing::warn!("Invalid OIDC_INTERCEPTOR_TIMEOUT_SECONDS: {}", timeout);
            }
        }
    }

    /// Apply command-line overrides, which take precedence over the file and
    /// the environment
    pub fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(name) = &cli.client_name {
            self.client.client_name = name.clone();
        }

        if let Some(path) = &cli.registry {
            self.registry.path = path.clone();
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.client.client_name.trim().is_empty() {
            return Err(AuthError::Config("client_name cannot be empty".to_string()).into());
        }

        if self.http.timeout_seconds == 0 {
            return Err(
                AuthError::Config("timeout_seconds must be greater than 0".to_string()).into(),
            );
        }

        if self.registry.path.as_os_str().is_empty() {
            return Err(AuthError::Config("registry.path cannot be empty".to_string()).into());
        }

        Ok(())
    }
}
