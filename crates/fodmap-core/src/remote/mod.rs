//! Remote object store access.
//!
//! [`RemoteStore`] is the raw file API (Google Drive in production).
//! [`BlobClient`] layers the single-file semantics on top: token checks,
//! locating `myFodmap.json`, and create-or-update uploads.

mod blob_client;
mod drive;

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use blob_client::{BlobClient, UploadOutcome};
pub use drive::{GoogleDriveStore, DRIVE_API_URL, DRIVE_UPLOAD_URL};

#[derive(Debug, Error)]
pub enum RemoteError {
    /// The remote refused the access token (401/403).
    #[error("Remote rejected the access token (HTTP {0})")]
    Unauthorized(u16),
    #[error("Remote file not found: {0}")]
    NotFound(String),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Remote API error: {message} ({status})")]
    Api { status: u16, message: String },
    #[error("Failed to parse remote response: {0}")]
    Json(#[from] serde_json::Error),
}

impl RemoteError {
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub name: String,
    pub mime_type: String,
}

impl FileMetadata {
    pub fn json(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mime_type: crate::config::MIME_TYPE.to_string(),
        }
    }
}

/// File API of the remote object store.
pub trait RemoteStore: Send + Sync + 'static {
    /// Non-trashed files with exactly this name.
    fn list(
        &self,
        access_token: &str,
        name: &str,
    ) -> impl Future<Output = RemoteResult<Vec<RemoteFile>>> + Send;

    fn get(&self, access_token: &str, id: &str) -> impl Future<Output = RemoteResult<String>> + Send;

    /// Returns the new file's id.
    fn create(
        &self,
        access_token: &str,
        metadata: &FileMetadata,
        content: &str,
    ) -> impl Future<Output = RemoteResult<String>> + Send;

    fn update(
        &self,
        access_token: &str,
        id: &str,
        metadata: &FileMetadata,
        content: &str,
    ) -> impl Future<Output = RemoteResult<()>> + Send;
}
