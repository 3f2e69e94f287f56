//! The local store: exclusive owner of the in-memory [`Document`].
//!
//! Every mutation validates first, applies to a draft, bumps the logical
//! clock, persists, and only then replaces the live document. A failure at
//! any step leaves both memory and storage untouched.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use super::SharedKeyValueStore;
use crate::clock::SharedClock;
use crate::error::{Error, Result, ValidationError};
use crate::events::{AppEvent, EventBus};
use crate::models::{Document, Food, Outcome};

/// Storage key of the persisted document.
pub const DOCUMENT_KEY: &str = "myFodmap";

/// Where an imported document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOrigin {
    /// A file the user chose. Counts as a local change.
    User,
    /// Remote data pulled by reconciliation. Must not echo back out.
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportOptions {
    pub origin: ImportOrigin,
}

impl ImportOptions {
    pub const fn from_user() -> Self {
        Self {
            origin: ImportOrigin::User,
        }
    }

    pub const fn from_remote() -> Self {
        Self {
            origin: ImportOrigin::Remote,
        }
    }

    const fn signals_sync(self) -> bool {
        matches!(self.origin, ImportOrigin::User)
    }
}

pub struct LocalStore {
    storage: SharedKeyValueStore,
    clock: SharedClock,
    events: EventBus,
    document: Mutex<Document>,
}

impl LocalStore {
    /// Create a store holding an empty document, without reading storage.
    pub fn new(storage: SharedKeyValueStore, clock: SharedClock, events: EventBus) -> Self {
        Self {
            storage,
            clock,
            events,
            document: Mutex::new(Document::new()),
        }
    }

    /// Create a store and load whatever document is persisted.
    pub fn open(storage: SharedKeyValueStore, clock: SharedClock, events: EventBus) -> Self {
        let store = Self::new(storage, clock, events);
        store.load();
        store
    }

    /// Read the persisted document.
    ///
    /// Unreadable or corrupt data never fails the caller: the raw payload is
    /// set aside under a `.corrupt-<millis>` key and an empty document is used.
    pub fn load(&self) -> Document {
        let loaded = match self.storage.get(DOCUMENT_KEY) {
            Ok(Some(raw)) => self.parse_persisted(&raw),
            Ok(None) => Document::new(),
            Err(error) => {
                tracing::warn!("Local storage unavailable, starting empty: {}", error);
                Document::new()
            }
        };
        *self.lock() = loaded.clone();
        loaded
    }

    /// Snapshot of the current document.
    pub fn document(&self) -> Document {
        self.lock().clone()
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.lock().last_modified()
    }

    pub fn has_data(&self) -> bool {
        self.lock().has_data()
    }

    pub fn category_names(&self) -> Vec<String> {
        self.lock().category_names()
    }

    pub fn find_food(&self, name: &str) -> Option<(String, Food)> {
        self.lock()
            .find_food(name)
            .map(|(category, food)| (category.name().to_string(), food.clone()))
    }

    pub fn add_category(&self, name: &str) -> Result<()> {
        self.mutate(|doc, _| doc.add_category(name).map(|()| true))
            .map(drop)
    }

    /// Returns `false` when the name was unchanged and nothing was written.
    pub fn rename_category(&self, old_name: &str, new_name: &str) -> Result<bool> {
        self.mutate(|doc, _| doc.rename_category(old_name, new_name))
    }

    pub fn delete_category(&self, name: &str) -> Result<()> {
        self.mutate(|doc, _| doc.delete_category(name).map(|_| true))
            .map(drop)
    }

    pub fn add_food(&self, name: &str, category: &str) -> Result<()> {
        self.mutate(|doc, _| doc.add_food(name, category).map(|()| true))
            .map(drop)
    }

    /// Returns `false` when the name was unchanged and nothing was written.
    pub fn rename_food(&self, old_name: &str, new_name: &str) -> Result<bool> {
        self.mutate(|doc, _| doc.rename_food(old_name, new_name))
    }

    pub fn delete_food(&self, name: &str) -> Result<()> {
        self.mutate(|doc, _| doc.delete_food(name).map(|_| true))
            .map(drop)
    }

    pub fn log_food(&self, name: &str, outcome: Outcome) -> Result<()> {
        self.mutate(|doc, now| doc.log_food(name, outcome, now).map(|()| true))
            .map(drop)
    }

    pub fn update_food_stats(&self, name: &str, total_count: u32, tolerated_count: u32) -> Result<()> {
        self.mutate(|doc, now| {
            doc.update_food_stats(name, total_count, tolerated_count, now)
                .map(|()| true)
        })
        .map(drop)
    }

    /// Replace the whole document with an external one.
    ///
    /// The payload must parse and satisfy the uniqueness invariants. A user
    /// import is stamped as a fresh local change; a remote import keeps the
    /// remote clock, refuses to move it backwards, and does not raise
    /// `data-sync-needed`.
    pub fn import_document(&self, raw: &str, options: ImportOptions) -> Result<()> {
        let mut incoming: Document =
            serde_json::from_str(raw).map_err(|error| Error::CorruptData(error.to_string()))?;
        incoming
            .validate()
            .map_err(|error| Error::CorruptData(error.to_string()))?;

        let mut guard = self.lock();
        match options.origin {
            ImportOrigin::User => {
                let now = self.clock.now();
                incoming.set_last_modified(guard.last_modified());
                incoming.touch(now);
            }
            ImportOrigin::Remote => {
                if incoming.last_modified() < guard.last_modified() {
                    return Err(Error::StaleImport);
                }
            }
        }

        self.persist(&incoming)?;
        *guard = incoming;
        drop(guard);

        tracing::info!(origin = ?options.origin, "Imported document");
        self.events.emit(AppEvent::DataUpdated);
        if options.signals_sync() {
            self.events.emit(AppEvent::DataSyncNeeded);
        }
        Ok(())
    }

    /// Serialize the full document, `lastModified` included.
    pub fn export_document(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&*self.lock())?)
    }

    /// Drop all local data, as on a fresh install.
    pub fn clear(&self) -> Result<()> {
        let mut guard = self.lock();
        self.storage.remove(DOCUMENT_KEY)?;
        *guard = Document::new();
        drop(guard);
        self.events.emit(AppEvent::DataUpdated);
        Ok(())
    }

    fn mutate<F>(&self, operation: F) -> Result<bool>
    where
        F: FnOnce(&mut Document, DateTime<Utc>) -> std::result::Result<bool, ValidationError>,
    {
        let mut guard = self.lock();
        let now = self.clock.now();
        let mut draft = guard.clone();
        if !operation(&mut draft, now)? {
            return Ok(false);
        }
        draft.touch(now);
        self.persist(&draft)?;
        *guard = draft;
        drop(guard);

        self.events.emit(AppEvent::DataUpdated);
        self.events.emit(AppEvent::DataSyncNeeded);
        Ok(true)
    }

    fn persist(&self, document: &Document) -> Result<()> {
        let raw = serde_json::to_string(document)?;
        self.storage.set(DOCUMENT_KEY, &raw)?;
        Ok(())
    }

    fn parse_persisted(&self, raw: &str) -> Document {
        let parsed = serde_json::from_str::<Document>(raw)
            .map_err(|error| error.to_string())
            .and_then(|doc| doc.validate().map(|()| doc).map_err(|error| error.to_string()));

        match parsed {
            Ok(doc) => doc,
            Err(error) => {
                tracing::error!("Failed to parse local data, starting empty: {}", error);
                self.quarantine(raw);
                Document::new()
            }
        }
    }

    fn quarantine(&self, raw: &str) {
        let key = format!(
            "{DOCUMENT_KEY}.corrupt-{}",
            self.clock.now().timestamp_millis()
        );
        if let Err(error) = self.storage.set(&key, raw) {
            tracing::warn!("Could not keep a copy of corrupt local data: {}", error);
            return;
        }
        match self.storage.remove(DOCUMENT_KEY) {
            Ok(()) => tracing::warn!("Moved corrupt local data to '{}'", key),
            Err(error) => tracing::warn!(
                "Copied corrupt local data to '{}' but could not remove it: {}",
                key,
                error
            ),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Document> {
        self.document.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
