//! Keychain-backed key-value storage for the OAuth credential slots.

#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::{Mutex, OnceLock, PoisonError};

#[cfg(not(test))]
use keyring::Entry;

use fodmap_core::storage::{KeyValueStore, StorageError, StorageResult};

#[cfg(not(test))]
const KEYRING_SERVICE_NAME: &str = "myfodmap-cli";

/// One keychain entry per credential slot, namespaced by profile.
#[derive(Debug, Clone)]
pub struct KeyringStore {
    profile: String,
}

impl KeyringStore {
    pub fn new(profile_name: &str) -> Self {
        Self {
            profile: profile_name.to_string(),
        }
    }

    fn username(&self, key: &str) -> String {
        format!("{}:{key}", self.profile)
    }

    #[cfg(test)]
    fn test_store() -> std::sync::MutexGuard<'static, HashMap<String, String>> {
        static STORE: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();
        STORE
            .get_or_init(|| Mutex::new(HashMap::new()))
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(not(test))]
    fn entry(&self, key: &str) -> StorageResult<Entry> {
        Entry::new(KEYRING_SERVICE_NAME, &self.username(key))
            .map_err(|error| StorageError::Unavailable(error.to_string()))
    }
}

impl KeyValueStore for KeyringStore {
    #[cfg(not(test))]
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(StorageError::Unavailable(error.to_string())),
        }
    }

    #[cfg(test)]
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(Self::test_store().get(&self.username(key)).cloned())
    }

    #[cfg(not(test))]
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.entry(key)?
            .set_password(value)
            .map_err(|error| StorageError::Unavailable(error.to_string()))
    }

    #[cfg(test)]
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        Self::test_store().insert(self.username(key), value.to_string());
        Ok(())
    }

    #[cfg(not(test))]
    fn remove(&self, key: &str) -> StorageResult<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(StorageError::Unavailable(error.to_string())),
        }
    }

    #[cfg(test)]
    fn remove(&self, key: &str) -> StorageResult<()> {
        Self::test_store().remove(&self.username(key));
        Ok(())
    }
}
