use std::io;

use fodmap_core::auth::AuthError;
use fodmap_core::remote::RemoteError;
use fodmap_core::storage::StorageError;
use fodmap_core::sync::SyncError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] fodmap_core::Error),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Category not found: {0}")]
    CategoryNotFound(String),
    #[error("Not connected to Google Drive. Run `myfodmap auth login` first.")]
    NotSignedIn,
    #[error(
        "Google sign-in is not configured. Set MYFODMAP_CLIENT_ID or run `myfodmap config init --client-id <ID>`."
    )]
    OAuthNotConfigured,
    #[error("Refusing to reset without --yes")]
    ResetNotConfirmed,
}
