//! Error types for fodmap-core

use thiserror::Error;

use crate::auth::AuthError;
use crate::remote::RemoteError;
use crate::storage::StorageError;
use crate::sync::SyncError;

/// Result type alias using fodmap-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in fodmap-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// A mutation was rejected before touching the document
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Local key-value storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Authorization error
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Remote object store error
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Reconciliation error
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// A persisted or imported document could not be understood
    #[error("Corrupt document: {0}")]
    CorruptData(String),

    /// A remote import would move the document clock backwards
    #[error("Refusing to import a document older than the local copy")]
    StaleImport,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Precondition failures for document mutations.
///
/// These are returned to the caller as-is; the document is left untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Name cannot be empty")]
    EmptyName,
    #[error("Category '{0}' already exists")]
    DuplicateCategory(String),
    #[error("Food '{name}' already exists in '{category}'")]
    DuplicateFood { name: String, category: String },
    #[error("Category '{0}' not found")]
    CategoryNotFound(String),
    #[error("Food '{0}' not found")]
    FoodNotFound(String),
    #[error("Tolerated count ({tolerated}) cannot exceed total count ({total})")]
    ToleratedExceedsTotal { tolerated: u32, total: u32 },
    #[error("Count overflow for food '{0}'")]
    CountOverflow(String),
}
