//! Persistence of the OAuth credential in three key-value slots.
//!
//! The slots are separate from the document and are never exported or
//! synced. Partially written state reads back as no credential, and storage
//! failures degrade to "signed out" rather than surfacing errors.

use chrono::{DateTime, Utc};

use crate::models::Credential;
use crate::storage::SharedKeyValueStore;

pub const ACCESS_TOKEN_KEY: &str = "g_access_token";
pub const TOKEN_EXPIRY_KEY: &str = "g_token_expiry";
pub const REFRESH_TOKEN_KEY: &str = "g_refresh_token";

#[derive(Clone)]
pub struct CredentialStore {
    storage: SharedKeyValueStore,
}

impl CredentialStore {
    pub fn new(storage: SharedKeyValueStore) -> Self {
        Self { storage }
    }

    /// Write all three slots. The refresh slot is only overwritten when a
    /// refresh token is supplied.
    pub fn save(&self, credential: &Credential) {
        self.write(ACCESS_TOKEN_KEY, &credential.access_token);
        self.write(
            TOKEN_EXPIRY_KEY,
            &credential.expires_at.timestamp_millis().to_string(),
        );
        if let Some(refresh_token) = credential.refresh_token.as_deref() {
            self.write(REFRESH_TOKEN_KEY, refresh_token);
        }
    }

    /// Read the stored credential.
    ///
    /// A refresh token alone still loads, as an already-expired credential,
    /// so the manager can renew it silently.
    pub fn load(&self) -> Option<Credential> {
        let access_token = self.read(ACCESS_TOKEN_KEY);
        let expires_at = self.read(TOKEN_EXPIRY_KEY).and_then(|raw| parse_expiry(&raw));
        let refresh_token = self.read(REFRESH_TOKEN_KEY);

        match (access_token, expires_at, refresh_token) {
            (Some(access_token), Some(expires_at), refresh_token) => Some(Credential {
                access_token,
                expires_at,
                refresh_token,
            }),
            (_, _, Some(refresh_token)) => Some(Credential {
                access_token: String::new(),
                expires_at: DateTime::<Utc>::UNIX_EPOCH,
                refresh_token: Some(refresh_token),
            }),
            _ => None,
        }
    }

    pub fn clear(&self) {
        for key in [ACCESS_TOKEN_KEY, TOKEN_EXPIRY_KEY, REFRESH_TOKEN_KEY] {
            if let Err(error) = self.storage.remove(key) {
                tracing::warn!("Failed to clear credential slot '{}': {}", key, error);
            }
        }
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.storage.get(key) {
            Ok(value) => value.filter(|value| !value.trim().is_empty()),
            Err(error) => {
                tracing::warn!("Credential slot '{}' unavailable: {}", key, error);
                None
            }
        }
    }

    fn write(&self, key: &str, value: &str) {
        if let Err(error) = self.storage.set(key, value) {
            tracing::warn!("Failed to persist credential slot '{}': {}", key, error);
        }
    }
}

fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
}
