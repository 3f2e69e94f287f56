//! Single-file view of the remote store.
//!
//! Every operation first makes sure the access token is usable; if it cannot
//! be, the operation fails with [`SyncError::AuthExpired`]. A 401/403 from the
//! remote invalidates the credential and fails the same way.

use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{FileMetadata, RemoteError, RemoteFile, RemoteStore};
use crate::auth::{Authorizer, TokenManager};
use crate::sync::{Connectivity, SkipReason, SyncError, SyncResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded,
    /// Not connected or offline; nothing was sent.
    Skipped(SkipReason),
}

pub struct BlobClient<R: RemoteStore, A: Authorizer> {
    remote: R,
    tokens: TokenManager<A>,
    connectivity: Connectivity,
    file_name: String,
    file_id: Mutex<Option<String>>,
}

impl<R: RemoteStore, A: Authorizer> BlobClient<R, A> {
    pub fn new(
        remote: R,
        tokens: TokenManager<A>,
        connectivity: Connectivity,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            remote,
            tokens,
            connectivity,
            file_name: file_name.into(),
            file_id: Mutex::new(None),
        }
    }

    pub const fn remote(&self) -> &R {
        &self.remote
    }

    pub const fn tokens(&self) -> &TokenManager<A> {
        &self.tokens
    }

    pub const fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Handle of the remote file remembered for this session, if any.
    pub fn file_id(&self) -> Option<String> {
        self.handle().clone()
    }

    /// Find the remote file by name. `None` means it does not exist yet.
    pub async fn locate(&self) -> SyncResult<Option<RemoteFile>> {
        let token = self.token().await?;
        let files = self
            .remote
            .list(&token, &self.file_name)
            .await
            .map_err(|error| self.fail(error))?;

        let found = files.into_iter().next();
        match found.as_ref() {
            Some(file) => {
                tracing::debug!(file_id = %file.id, "Located remote file");
                *self.handle() = Some(file.id.clone());
            }
            None => tracing::debug!("No remote file named '{}'", self.file_name),
        }
        Ok(found)
    }

    /// Fetch the remote content, locating the file first when needed.
    pub async fn download(&self) -> SyncResult<Option<String>> {
        let token = self.token().await?;
        let Some(id) = self.known_or_located().await? else {
            return Ok(None);
        };

        match self.remote.get(&token, &id).await {
            Ok(content) => Ok(Some(content)),
            Err(RemoteError::NotFound(_)) => {
                tracing::info!("Remote file {} disappeared, locating again", id);
                self.forget(&id);
                let Some(file) = self.locate().await? else {
                    return Ok(None);
                };
                let token = self.token().await?;
                self.remote
                    .get(&token, &file.id)
                    .await
                    .map(Some)
                    .map_err(|error| self.fail(error))
            }
            Err(error) => Err(self.fail(error)),
        }
    }

    /// Create-or-update the remote file.
    ///
    /// Silently skipped when not connected or offline, so callers must not
    /// assume the upload happened without checking the outcome.
    pub async fn upload(&self, content: &str) -> SyncResult<UploadOutcome> {
        if !self.tokens.is_connected() {
            tracing::debug!("Not connected, skipping upload");
            return Ok(UploadOutcome::Skipped(SkipReason::NotConnected));
        }
        if !self.connectivity.is_online() {
            tracing::debug!("Offline, skipping upload");
            return Ok(UploadOutcome::Skipped(SkipReason::Offline));
        }

        let token = self.token().await?;
        let metadata = FileMetadata::json(&self.file_name);

        if let Some(id) = self.known_or_located().await? {
            match self.remote.update(&token, &id, &metadata, content).await {
                Ok(()) => {
                    tracing::info!("Updated remote file");
                    return Ok(UploadOutcome::Uploaded);
                }
                Err(RemoteError::NotFound(_)) => {
                    tracing::info!("Remote file {} disappeared, creating a new one", id);
                    self.forget(&id);
                }
                Err(error) => return Err(self.fail(error)),
            }
        }

        let id = self
            .remote
            .create(&token, &metadata, content)
            .await
            .map_err(|error| self.fail(error))?;
        tracing::info!("Created remote file");
        *self.handle() = Some(id);
        Ok(UploadOutcome::Uploaded)
    }

    async fn known_or_located(&self) -> SyncResult<Option<String>> {
        if let Some(id) = self.file_id() {
            return Ok(Some(id));
        }
        Ok(self.locate().await?.map(|file| file.id))
    }

    async fn token(&self) -> SyncResult<String> {
        if !self.tokens.ensure_valid().await {
            return Err(SyncError::AuthExpired);
        }
        self.tokens.access_token().ok_or(SyncError::AuthExpired)
    }

    fn fail(&self, error: RemoteError) -> SyncError {
        if error.is_unauthorized() {
            tracing::warn!("Remote rejected the access token, clearing credential");
            self.tokens.invalidate();
            SyncError::AuthExpired
        } else {
            tracing::warn!("Remote call failed: {}", error);
            SyncError::Remote(error)
        }
    }

    fn forget(&self, id: &str) {
        let mut handle = self.handle();
        if handle.as_deref() == Some(id) {
            *handle = None;
        }
    }

    fn handle(&self) -> MutexGuard<'_, Option<String>> {
        self.file_id.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
