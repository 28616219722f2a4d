//! YAML file backed client repository
//!
//! The file holds an ordered list of [`ClientRegistration`] records. An
//! absent file means an empty registry, and an empty registry is stored by
//! removing the file rather than writing an empty list.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{AuthError, Result};
use crate::registry::{client_key, ClientRegistration, ClientRepository};

/// Client repository persisted to a single YAML file.
///
/// Every operation holds the instance lock for its whole read-modify-write
/// sequence. Two instances pointing at the same file are not coordinated.
///
/// # Examples
///
/// ```no_run
/// use oidc_interceptor::registry::{ClientRepository, YamlClientRepository};
///
/// # async fn example() -> oidc_interceptor::Result<()> {
/// let repo = YamlClientRepository::new("data/clients.yaml")?;
/// let found = repo.get_by_name("https://auth.example.com", "svc").await?;
/// assert!(found.is_none());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct YamlClientRepository {
    path: PathBuf,
    lock: Mutex<()>,
}

impl YamlClientRepository {
    /// Creates a repository backed by `path`, creating its parent directory.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Registry`] if the parent directory cannot be
    /// created.
    pub fn new<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                AuthError::Registry(format!(
                    "failed to create registry directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<Vec<ClientRegistration>> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AuthError::Io(e).into()),
        };

        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let clients: Vec<ClientRegistration> = serde_yaml::from_str(&text).map_err(|e| {
            AuthError::Registry(format!("failed to parse {}: {e}", self.path.display()))
        })?;
        Ok(clients)
    }

    /// Persists `clients`; an empty list removes the file.
    async fn save(&self, clients: &[ClientRegistration]) -> Result<()> {
        if clients.is_empty() {
            return match tokio::fs::remove_file(&self.path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(AuthError::Io(e).into()),
            };
        }

        let text = serde_yaml::to_string(clients).map_err(AuthError::from)?;
        let tmp = self.path.with_extension("yaml.tmp");
        tokio::fs::write(&tmp, text).await.map_err(|e| {
            AuthError::Registry(format!("failed to write {}: {e}", tmp.display()))
        })?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            AuthError::Registry(format!("failed to replace {}: {e}", self.path.display()))
        })?;
        Ok(())
    }
}

#[async_trait]
impl ClientRepository for YamlClientRepository {
    async fn get_by_name(&self, issuer: &str, client_name: &str) -> Result<Option<ClientRegistration>> {
        let _guard = self.lock.lock().await;
        let key = client_key(issuer, client_name);
        Ok(self.read().await?.into_iter().find(|c| c.key() == key))
    }

    async fn get(&self, key: &str) -> Result<Option<ClientRegistration>> {
        let _guard = self.lock.lock().await;
        Ok(self.read().await?.into_iter().find(|c| c.key() == key))
    }

    async fn create(&self, registration: ClientRegistration) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut clients = self.read().await?;
        let key = registration.key();

        match clients.iter_mut().find(|c| c.key() == key) {
            Some(existing) => *existing = registration,
            None => clients.push(registration),
        }

        self.save(&clients).await?;
        tracing::debug!("stored client registration {}", key);
        Ok(())
    }

    async fn delete_by_name(&self, issuer: &str, client_name: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let key = client_key(issuer, client_name);
        let mut clients = self.read().await?;
        clients.retain(|c| c.key() != key);
        self.save(&clients).await?;
        tracing::debug!("removed client registration {}", key);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ClientRegistration>> {
        let _guard = self.lock.lock().await;
        self.read().await
    }
}
