//! Runtime configuration for sync and OAuth.
//!
//! Sync behaviour is tuned through [`SyncSettings`]; the OAuth client
//! identity comes from the environment so it never lands in the synced
//! document or in profile files.

use std::env;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::auth::{AuthError, AuthResult};
use crate::util::normalize_text_option;

/// Fixed name of the single remote file.
pub const REMOTE_FILE_NAME: &str = "myFodmap.json";
/// MIME type of the remote file.
pub const MIME_TYPE: &str = "application/json";
/// Smallest allowed expiry buffer, in seconds.
pub const MIN_EXPIRY_BUFFER_SECONDS: i64 = 60;
/// Expiry buffer used unless a profile overrides it.
pub const DEFAULT_EXPIRY_BUFFER_SECONDS: i64 = 300;

pub const ENV_CLIENT_ID: &str = "MYFODMAP_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "MYFODMAP_CLIENT_SECRET";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Seconds before expiry at which an access token stops being used.
    pub expiry_buffer_seconds: i64,
    /// Push straight to the remote after every local mutation.
    pub push_on_mutation: bool,
    #[serde(skip)]
    remote_file_name: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            expiry_buffer_seconds: DEFAULT_EXPIRY_BUFFER_SECONDS,
            push_on_mutation: false,
            remote_file_name: REMOTE_FILE_NAME.to_string(),
        }
    }
}

impl SyncSettings {
    #[must_use]
    pub const fn with_expiry_buffer_seconds(mut self, seconds: i64) -> Self {
        self.expiry_buffer_seconds = seconds;
        self
    }

    #[must_use]
    pub const fn with_push_on_mutation(mut self, enabled: bool) -> Self {
        self.push_on_mutation = enabled;
        self
    }

    /// The effective buffer, never below [`MIN_EXPIRY_BUFFER_SECONDS`].
    #[must_use]
    pub fn expiry_buffer(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.expiry_buffer_seconds.max(MIN_EXPIRY_BUFFER_SECONDS))
    }

    #[must_use]
    pub fn remote_file_name(&self) -> &str {
        if self.remote_file_name.is_empty() {
            REMOTE_FILE_NAME
        } else {
            &self.remote_file_name
        }
    }
}

/// OAuth client registration used by the Google authorizer.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: Option<String>,
}

impl OAuthClientConfig {
    pub fn new(client_id: impl Into<String>, client_secret: Option<String>) -> AuthResult<Self> {
        let client_id = normalize_text_option(Some(client_id.into())).ok_or_else(|| {
            AuthError::InvalidConfiguration("OAuth client id cannot be empty".to_string())
        })?;
        Ok(Self {
            client_id,
            client_secret: normalize_text_option(client_secret),
        })
    }

    /// Load from `MYFODMAP_CLIENT_ID` / `MYFODMAP_CLIENT_SECRET`.
    ///
    /// Returns `Ok(None)` when neither is set and an error when only the
    /// secret is.
    pub fn from_env() -> AuthResult<Option<Self>> {
        parse_client_config(|key| env::var(key).ok())
    }
}

impl fmt::Debug for OAuthClientConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("OAuthClientConfig")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

fn parse_client_config(
    lookup: impl Fn(&str) -> Option<String>,
) -> AuthResult<Option<OAuthClientConfig>> {
    let client_id = normalize_text_option(lookup(ENV_CLIENT_ID));
    let client_secret = normalize_text_option(lookup(ENV_CLIENT_SECRET));

    match (client_id, client_secret) {
        (None, None) => Ok(None),
        (None, Some(_)) => Err(AuthError::InvalidConfiguration(format!(
            "OAuth configuration is incomplete. Missing: {ENV_CLIENT_ID}"
        ))),
        (Some(client_id), client_secret) => Ok(Some(OAuthClientConfig {
            client_id,
            client_secret,
        })),
    }
}
