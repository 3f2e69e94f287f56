//! Last-writer-wins reconciliation between the local document and the
//! single remote file.

mod connectivity;
mod reconciler;

use thiserror::Error;

use crate::remote::RemoteError;

pub use connectivity::Connectivity;
pub use reconciler::Reconciler;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The credential could not be made usable; interactive sign-in needed.
    #[error("Google Drive session expired. Please reconnect.")]
    AuthExpired,
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("Local store error: {0}")]
    Local(#[source] Box<crate::Error>),
}

impl From<crate::Error> for SyncError {
    fn from(error: crate::Error) -> Self {
        Self::Local(Box::new(error))
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

/// Why a sync opportunity did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotConnected,
    Offline,
    /// Another reconciliation is already running.
    InProgress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Skipped(SkipReason),
    /// No remote file existed; local data was uploaded to create it.
    Bootstrapped,
    /// Neither side has anything to exchange.
    NothingToSync,
    Pulled,
    Pushed,
    /// Timestamps were equal; no data moved.
    UpToDate,
}

impl SyncOutcome {
    pub const fn transferred(self) -> bool {
        matches!(self, Self::Bootstrapped | Self::Pulled | Self::Pushed)
    }
}

/// What prompted a sync opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    LocalMutation,
    /// Sign-in or token restoration just succeeded.
    Connected,
    VisibilityRegained,
    CameOnline,
    Manual,
}
