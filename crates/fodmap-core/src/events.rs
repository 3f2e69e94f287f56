//! Outward notifications consumed by UI collaborators.
//!
//! Event names mirror the contract the UI subscribes to: `connected`,
//! `disconnected`, `sync-completed`, `auth-expired`, `toast`, `data-updated`
//! and `data-sync-needed`.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Error,
}

impl Severity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    Connected,
    Disconnected,
    SyncCompleted(DateTime<Utc>),
    AuthExpired,
    Toast { message: String, severity: Severity },
    DataUpdated,
    DataSyncNeeded,
}

impl AppEvent {
    pub fn toast(message: impl Into<String>, severity: Severity) -> Self {
        Self::Toast {
            message: message.into(),
            severity,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::SyncCompleted(_) => "sync-completed",
            Self::AuthExpired => "auth-expired",
            Self::Toast { .. } => "toast",
            Self::DataUpdated => "data-updated",
            Self::DataSyncNeeded => "data-sync-needed",
        }
    }
}

/// Fan-out channel for [`AppEvent`]s. Clones publish into the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AppEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Having no subscribers is fine.
    pub fn emit(&self, event: AppEvent) {
        tracing::debug!(event = event.name(), "emitting event");
        let _ = self.sender.send(event);
    }
}

/// Drain every event currently buffered in `receiver`.
pub fn drain(receiver: &mut broadcast::Receiver<AppEvent>) -> Vec<AppEvent> {
    let mut events = Vec::new();
    loop {
        match receiver.try_recv() {
            Ok(event) => events.push(event),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                tracing::warn!("event receiver lagged by {skipped} events");
            }
            Err(_) => break,
        }
    }
    events
}
