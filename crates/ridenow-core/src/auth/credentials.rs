use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use keyring::Entry;
use thiserror::Error;

/// Slot holding the short-lived access token
pub const ACCESS_TOKEN_KEY: &str = "accessToken";
/// Slot holding the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
/// Slot holding the JSON-serialized user record
pub const USER_KEY: &str = "user";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Credential store unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to access credential '{key}': {reason}")]
    Access { key: String, reason: String },
}

/// Durable string key-value storage for credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a key. Removing a key that is not present succeeds.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Credentials kept in the OS keychain, one entry per key under a single service name.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Run a keychain operation on the blocking pool; the platform
    /// backends make synchronous IPC calls.
    async fn with_entry<T, F>(&self, key: &str, op: F) -> Result<T, StoreError>
    where
        F: FnOnce(Entry, &str) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let service = self.service.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || {
            let entry = Entry::new(&service, &key).map_err(|e| StoreError::Access {
                key: key.clone(),
                reason: format!("Failed to create keyring entry: {}", e),
            })?;
            op(entry, &key)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("keyring task failed: {}", e)))?
    }
}

fn access_error(key: &str, err: keyring::Error) -> StoreError {
    StoreError::Access {
        key: key.to_string(),
        reason: err.to_string(),
    }
}

#[async_trait]
impl CredentialStore for KeyringStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.with_entry(key, |entry, key| match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(access_error(key, e)),
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let value = value.to_string();
        self.with_entry(key, move |entry, key| {
            entry.set_password(&value).map_err(|e| access_error(key, e))
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.with_entry(key, |entry, key| match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(access_error(key, e)),
        })
        .await
    }
}

/// In-process store. Used for headless runs and as the test double.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `set` fail, to exercise best-effort persistence paths
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .map(|entries| entries.contains_key(key))
            .unwrap_or(false)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Access {
                key: key.to_string(),
                reason: "writes disabled".to_string(),
            });
        }
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        assert_eq!(store.get(ACCESS_TOKEN_KEY).await.expect("get"), None);

        store.set(ACCESS_TOKEN_KEY, "abc").await.expect("set");
        assert_eq!(store.get(ACCESS_TOKEN_KEY).await.expect("get").as_deref(), Some("abc"));

        store.delete(ACCESS_TOKEN_KEY).await.expect("delete");
        assert!(!store.contains(ACCESS_TOKEN_KEY));
    }

    #[tokio::test]
    async fn test_memory_store_delete_missing_is_ok() {
        let store = MemoryStore::new();
        store.delete(USER_KEY).await.expect("deleting a missing key succeeds");
        store.delete(USER_KEY).await.expect("and again");
    }

    #[tokio::test]
    async fn test_memory_store_failing_writes() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        let err = store.set(REFRESH_TOKEN_KEY, "r1").await.unwrap_err();
        assert!(matches!(err, StoreError::Access { ref key, .. } if key == REFRESH_TOKEN_KEY));
        assert!(!store.contains(REFRESH_TOKEN_KEY));
    }

    #[tokio::test]
    async fn test_keyring_missing_entry_reads_as_absent() {
        let store = KeyringStore::new("ridenow-test");
        assert_eq!(store.get("never-written").await.expect("get"), None);
        store.delete("never-written").await.expect("deleting a missing entry succeeds");
    }
}
