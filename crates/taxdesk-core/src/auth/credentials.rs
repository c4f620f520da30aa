use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::CredentialBackend;

const SERVICE_NAME: &str = "taxdesk";

/// Credentials file name in the cache directory
const CREDENTIALS_FILE: &str = "credentials.json";

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("Credential file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt credential entry: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// A persisted token with its own expiry, like a cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl StoredToken {
    pub fn new(value: impl Into<String>, ttl: Duration) -> Self {
        Self {
            value: value.into(),
            expires_at: Utc::now() + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Token values read back from a store. Expired entries are already dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredTokens {
    pub access: Option<String>,
    pub refresh: Option<String>,
}

/// Persistent home of the access and refresh tokens.
///
/// Entries are replaced wholesale, never patched. Implementations must be
/// usable from the watchdog task and the API client at the same time.
pub trait CredentialStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<StoredToken>, StoreError>;

    fn set(&self, key: &str, token: &StoredToken) -> Result<(), StoreError>;

    /// Remove an entry; removing a missing entry is not an error
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Read both tokens, evicting any that have expired
    fn load(&self) -> Result<StoredTokens, StoreError> {
        Ok(StoredTokens {
            access: self.live_value(ACCESS_TOKEN_KEY)?,
            refresh: self.live_value(REFRESH_TOKEN_KEY)?,
        })
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.remove(ACCESS_TOKEN_KEY)?;
        self.remove(REFRESH_TOKEN_KEY)
    }

    fn live_value(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.get(key)? {
            Some(token) if token.is_expired() => {
                debug!(key, "Evicting expired credential");
                self.remove(key)?;
                Ok(None)
            }
            Some(token) => Ok(Some(token.value)),
            None => Ok(None),
        }
    }
}

/// Open the store selected in the configuration
pub fn open_store(backend: CredentialBackend, cache_dir: PathBuf) -> Arc<dyn CredentialStore> {
    match backend {
        CredentialBackend::Keyring => Arc::new(KeyringCredentialStore::new()),
        CredentialBackend::File => Arc::new(FileCredentialStore::new(cache_dir)),
        CredentialBackend::Memory => Arc::new(MemoryCredentialStore::default()),
    }
}

/// Tokens kept in the OS keychain, one entry per token.
pub struct KeyringCredentialStore {
    service: String,
}

impl KeyringCredentialStore {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry, StoreError> {
        Ok(Entry::new(&self.service, key)?)
    }
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn get(&self, key: &str) -> Result<Option<StoredToken>, StoreError> {
        match self.entry(key)?.get_password() {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, token: &StoredToken) -> Result<(), StoreError> {
        let raw = serde_json::to_string(token)?;
        self.entry(key)?.set_password(&raw)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Tokens kept in a JSON file in the cache directory.
pub struct FileCredentialStore {
    path: PathBuf,
    // Serializes read-modify-write cycles on the file
    lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            path: cache_dir.join(CREDENTIALS_FILE),
            lock: Mutex::new(()),
        }
    }

    fn read_all(&self) -> Result<HashMap<String, StoredToken>, StoreError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        match serde_json::from_str(&contents) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                warn!(error = %e, path = ?self.path, "Discarding unreadable credential file");
                Ok(HashMap::new())
            }
        }
    }

    fn write_all(&self, entries: &HashMap<String, StoredToken>) -> Result<(), StoreError> {
        if entries.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path)?;
            }
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(entries)?)?;
        restrict_permissions(&self.path)?;
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &std::path::Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &std::path::Path) -> std::io::Result<()> {
    Ok(())
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, key: &str) -> Result<Option<StoredToken>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, token: &StoredToken) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), token.clone());
        self.write_all(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.read_all()?;
        if entries.remove(key).is_some() {
            self.write_all(&entries)?;
        }
        Ok(())
    }
}

/// Tokens kept in memory only.
#[derive(Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<HashMap<String, StoredToken>>,
}

impl MemoryCredentialStore {
    pub fn with_tokens(access: Option<StoredToken>, refresh: Option<StoredToken>) -> Self {
        let mut entries = HashMap::new();
        if let Some(token) = access {
            entries.insert(ACCESS_TOKEN_KEY.to_string(), token);
        }
        if let Some(token) = refresh {
            entries.insert(REFRESH_TOKEN_KEY.to_string(), token);
        }
        Self {
            entries: Mutex::new(entries),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, key: &str) -> Result<Option<StoredToken>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, token: &StoredToken) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), token.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_load_and_clear() {
        let store = MemoryCredentialStore::with_tokens(
            Some(StoredToken::new("access-1", Duration::minutes(15))),
            Some(StoredToken::new("refresh-1", Duration::days(14))),
        );
        let tokens = store.load().expect("load");
        assert_eq!(tokens.access.as_deref(), Some("access-1"));
        assert_eq!(tokens.refresh.as_deref(), Some("refresh-1"));

        store.clear().expect("clear");
        assert_eq!(store.load().expect("load"), StoredTokens::default());
        // Clearing twice is fine
        store.clear().expect("clear again");
    }

    #[test]
    fn test_expired_entries_are_evicted() {
        let store = MemoryCredentialStore::with_tokens(
            Some(StoredToken::new("stale", Duration::seconds(-1))),
            Some(StoredToken::new("refresh-1", Duration::days(14))),
        );
        let tokens = store.load().expect("load");
        assert_eq!(tokens.access, None);
        assert_eq!(tokens.refresh.as_deref(), Some("refresh-1"));
        assert!(store.get(ACCESS_TOKEN_KEY).expect("get").is_none());
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileCredentialStore::new(dir.path().to_path_buf());
        store
            .set(ACCESS_TOKEN_KEY, &StoredToken::new("access-1", Duration::minutes(15)))
            .expect("set access");
        store
            .set(REFRESH_TOKEN_KEY, &StoredToken::new("refresh-1", Duration::days(14)))
            .expect("set refresh");

        let reopened = FileCredentialStore::new(dir.path().to_path_buf());
        let tokens = reopened.load().expect("load");
        assert_eq!(tokens.access.as_deref(), Some("access-1"));
        assert_eq!(tokens.refresh.as_deref(), Some("refresh-1"));
    }

    #[test]
    fn test_file_store_replaces_wholesale() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileCredentialStore::new(dir.path().to_path_buf());
        store
            .set(ACCESS_TOKEN_KEY, &StoredToken::new("old", Duration::minutes(15)))
            .expect("set");
        store
            .set(ACCESS_TOKEN_KEY, &StoredToken::new("new", Duration::minutes(15)))
            .expect("set");
        assert_eq!(store.load().expect("load").access.as_deref(), Some("new"));
    }

    #[test]
    fn test_file_store_clear_removes_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileCredentialStore::new(dir.path().to_path_buf());
        store
            .set(REFRESH_TOKEN_KEY, &StoredToken::new("refresh-1", Duration::days(14)))
            .expect("set");
        assert!(dir.path().join(CREDENTIALS_FILE).exists());

        store.clear().expect("clear");
        assert!(!dir.path().join(CREDENTIALS_FILE).exists());
        store.clear().expect("clear again");
    }

    #[test]
    fn test_file_store_tolerates_corrupt_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(CREDENTIALS_FILE), "{not json").expect("write");
        let store = FileCredentialStore::new(dir.path().to_path_buf());
        assert_eq!(store.load().expect("load"), StoredTokens::default());
    }
}
