use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::StoreError;

pub const AUTH_TOKEN_KEY: &str = "authToken";
pub const USER_KEY: &str = "user";
pub const TERMS_ACCEPTED_KEY: &str = "termsAccepted";
pub const BIOMETRIC_ENABLED_KEY: &str = "biometricEnabled";

pub const ALL_KEYS: [&str; 4] = [
    AUTH_TOKEN_KEY,
    USER_KEY,
    TERMS_ACCEPTED_KEY,
    BIOMETRIC_ENABLED_KEY,
];

/// Async key/value store with at-rest protection, provided by the host.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Persisted session material. `user` is owned by the auth domain and kept opaque.
#[derive(Debug, Clone, PartialEq)]
pub struct Credential {
    pub token: String,
    pub user: Value,
    pub terms_accepted: bool,
    pub biometric_enabled: bool,
}

/// Persist a credential after a successful sign-in.
///
/// Flags are stored as `"true"` or removed entirely, never written as `"false"`.
pub async fn save_credential(
    store: &dyn CredentialStore,
    credential: &Credential,
) -> Result<(), StoreError> {
    store.set(AUTH_TOKEN_KEY, &credential.token).await?;
    store
        .set(USER_KEY, &serde_json::to_string(&credential.user)?)
        .await?;
    write_flag(store, TERMS_ACCEPTED_KEY, credential.terms_accepted).await?;
    write_flag(store, BIOMETRIC_ENABLED_KEY, credential.biometric_enabled).await?;
    tracing::info!(
        biometric_enabled = credential.biometric_enabled,
        "credential saved"
    );
    Ok(())
}

/// Remove every session key. Used by logout.
pub async fn clear_credential(store: &dyn CredentialStore) -> Result<(), StoreError> {
    for key in ALL_KEYS {
        store.remove(key).await?;
    }
    tracing::info!("credential cleared");
    Ok(())
}

async fn write_flag(store: &dyn CredentialStore, key: &str, enabled: bool) -> Result<(), StoreError> {
    if enabled {
        store.set(key, "true").await
    } else {
        store.remove(key).await
    }
}

/// JSON map on disk, readable only by the current user.
pub struct FileCredentialStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(data) if data.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(data) => Ok(serde_json::from_str(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, entries: BTreeMap<String, String>) -> Result<(), StoreError> {
        let path = self.path.clone();
        let data = serde_json::to_string_pretty(&entries)?;
        tokio::task::spawn_blocking(move || write_private(&path, data.as_bytes()))
            .await
            .map_err(|e| StoreError::Unavailable(format!("writer task failed: {e}")))??;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await?;
        entries.insert(key.to_string(), value.to_string());
        self.persist(entries).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await?;
        if entries.remove(key).is_none() {
            return Ok(());
        }
        self.persist(entries).await
    }
}

fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Write with restricted permissions (0o600)
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(data)?;
    file.sync_all()
}

/// In-process store for tests and embedders without a platform keychain.
#[derive(Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            entries: Mutex::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

#[cfg(not(unix))]
trait OpenOptionsExt {
    fn mode(&mut self, _mode: u32) -> &mut Self;
}

#[cfg(not(unix))]
impl OpenOptionsExt for std::fs::OpenOptions {
    fn mode(&mut self, _mode: u32) -> &mut Self {
        self
    }
}
