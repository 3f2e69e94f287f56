//! Reconciliation engine.
//!
//! Decides on each sync opportunity whether to push, pull or do nothing,
//! using the documents' `lastModified` stamps as the only signal:
//!
//! | remote file | comparison    | action                                   |
//! |-------------|---------------|------------------------------------------|
//! | absent      |               | upload local if it has any data          |
//! | present     | remote newer  | import remote without echoing it back    |
//! | present     | local newer   | upload local                             |
//! | present     | equal         | no transfer, record a successful sync    |

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};

use super::{SkipReason, SyncError, SyncOutcome, SyncResult, SyncTrigger};
use crate::auth::{Authorizer, TokenManager};
use crate::clock::SharedClock;
use crate::config::SyncSettings;
use crate::events::{AppEvent, EventBus, Severity};
use crate::models::Document;
use crate::remote::{BlobClient, RemoteStore, UploadOutcome};
use crate::storage::{ImportOptions, LocalStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Regular,
    /// First run after connecting: a local document that was never stamped
    /// defers to the remote.
    Initial,
}

pub struct Reconciler<R: RemoteStore, A: Authorizer> {
    store: Arc<LocalStore>,
    blob: BlobClient<R, A>,
    events: EventBus,
    clock: SharedClock,
    settings: SyncSettings,
    in_progress: AtomicBool,
    last_sync: Mutex<Option<DateTime<Utc>>>,
}

impl<R: RemoteStore, A: Authorizer> Reconciler<R, A> {
    pub fn new(
        store: Arc<LocalStore>,
        blob: BlobClient<R, A>,
        events: EventBus,
        clock: SharedClock,
        settings: SyncSettings,
    ) -> Self {
        Self {
            store,
            blob,
            events,
            clock,
            settings,
            in_progress: AtomicBool::new(false),
            last_sync: Mutex::new(None),
        }
    }

    pub const fn blob(&self) -> &BlobClient<R, A> {
        &self.blob
    }

    pub const fn tokens(&self) -> &TokenManager<A> {
        self.blob.tokens()
    }

    pub const fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// When the last successful exchange or equal-timestamp check happened.
    pub fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        *self.last_sync.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    pub async fn reconcile(&self) -> SyncResult<SyncOutcome> {
        self.run(Mode::Regular).await
    }

    /// Run once after a successful connection or token restoration.
    pub async fn initial_sync(&self) -> SyncResult<SyncOutcome> {
        self.run(Mode::Initial).await
    }

    /// Route a sync opportunity. Returns `None` when the trigger is ignored
    /// under the current settings.
    pub async fn handle_trigger(&self, trigger: SyncTrigger) -> Option<SyncResult<SyncOutcome>> {
        tracing::debug!(?trigger, "Sync opportunity");
        match trigger {
            SyncTrigger::LocalMutation if self.settings.push_on_mutation => {
                Some(self.push_local().await)
            }
            SyncTrigger::LocalMutation => None,
            SyncTrigger::Connected => Some(self.initial_sync().await),
            SyncTrigger::VisibilityRegained | SyncTrigger::CameOnline | SyncTrigger::Manual => {
                Some(self.reconcile().await)
            }
        }
    }

    /// Record a connectivity change, reconciling when it brought us online.
    pub async fn set_online(&self, online: bool) -> Option<SyncResult<SyncOutcome>> {
        if self.blob.connectivity().set_online(online) {
            self.handle_trigger(SyncTrigger::CameOnline).await
        } else {
            None
        }
    }

    /// Outbound-only fast path: upload the local document without comparing.
    pub async fn push_local(&self) -> SyncResult<SyncOutcome> {
        if let Some(reason) = self.precondition() {
            return Ok(SyncOutcome::Skipped(reason));
        }
        let Some(_guard) = InProgressGuard::acquire(&self.in_progress) else {
            return Ok(SyncOutcome::Skipped(SkipReason::InProgress));
        };
        let result = self.upload_local(SyncOutcome::Pushed).await;
        self.settle(result)
    }

    async fn run(&self, mode: Mode) -> SyncResult<SyncOutcome> {
        if let Some(reason) = self.precondition() {
            tracing::debug!(?reason, "Skipping reconciliation");
            return Ok(SyncOutcome::Skipped(reason));
        }
        let Some(_guard) = InProgressGuard::acquire(&self.in_progress) else {
            tracing::debug!("Reconciliation already running");
            return Ok(SyncOutcome::Skipped(SkipReason::InProgress));
        };

        let result = self.exchange(mode).await;
        self.settle(result)
    }

    fn precondition(&self) -> Option<SkipReason> {
        if !self.blob.tokens().is_connected() {
            Some(SkipReason::NotConnected)
        } else if !self.blob.connectivity().is_online() {
            Some(SkipReason::Offline)
        } else {
            None
        }
    }

    async fn exchange(&self, mode: Mode) -> SyncResult<SyncOutcome> {
        let remote = self.fetch_remote().await?;
        let local_modified = self.store.last_modified();

        let Some((raw, remote_doc)) = remote else {
            if self.store.has_data() {
                tracing::info!("No usable remote data, uploading local document");
                return self.upload_local(SyncOutcome::Bootstrapped).await;
            }
            tracing::debug!("Nothing to sync on either side");
            return Ok(SyncOutcome::NothingToSync);
        };

        let remote_modified = remote_doc.last_modified();
        let remote_wins = match mode {
            Mode::Initial if local_modified.is_none() => true,
            _ => remote_modified > local_modified,
        };

        if remote_wins {
            tracing::info!(
                remote = ?remote_modified,
                local = ?local_modified,
                "Remote is newer, importing"
            );
            self.store.import_document(&raw, ImportOptions::from_remote())?;
            self.record_sync();
            self.events
                .emit(AppEvent::toast("Data synced from cloud", Severity::Success));
            Ok(SyncOutcome::Pulled)
        } else if local_modified > remote_modified {
            tracing::info!(
                remote = ?remote_modified,
                local = ?local_modified,
                "Local is newer, uploading"
            );
            self.upload_local(SyncOutcome::Pushed).await
        } else {
            tracing::debug!("Local and remote are in step");
            self.record_sync();
            Ok(SyncOutcome::UpToDate)
        }
    }

    /// Download and parse the remote document. Content that does not parse
    /// counts as no remote data at all.
    async fn fetch_remote(&self) -> SyncResult<Option<(String, Document)>> {
        let Some(raw) = self.blob.download().await? else {
            return Ok(None);
        };

        let parsed = serde_json::from_str::<Document>(&raw)
            .map_err(|error| error.to_string())
            .and_then(|doc| doc.validate().map(|()| doc).map_err(|error| error.to_string()));
        match parsed {
            Ok(document) => Ok(Some((raw, document))),
            Err(error) => {
                tracing::warn!("Remote document is unusable, treating as absent: {}", error);
                Ok(None)
            }
        }
    }

    async fn upload_local(&self, success: SyncOutcome) -> SyncResult<SyncOutcome> {
        let content = self.store.export_document()?;
        match self.blob.upload(&content).await? {
            UploadOutcome::Uploaded => {
                self.record_sync();
                Ok(success)
            }
            UploadOutcome::Skipped(reason) => Ok(SyncOutcome::Skipped(reason)),
        }
    }

    fn settle(&self, result: SyncResult<SyncOutcome>) -> SyncResult<SyncOutcome> {
        match &result {
            Ok(outcome) => tracing::debug!(?outcome, "Sync finished"),
            Err(SyncError::AuthExpired) => {
                tracing::warn!("Sync stopped: reauthentication required");
                self.blob.tokens().invalidate();
                self.events.emit(AppEvent::AuthExpired);
                self.events.emit(AppEvent::Disconnected);
                self.events.emit(AppEvent::toast(
                    "Google Drive session expired. Please reconnect.",
                    Severity::Error,
                ));
            }
            Err(error) => {
                tracing::error!("Sync failed: {}", error);
                self.events
                    .emit(AppEvent::toast(format!("Sync failed: {error}"), Severity::Error));
            }
        }
        result
    }

    fn record_sync(&self) {
        let now = self.clock.now();
        *self.last_sync.lock().unwrap_or_else(PoisonError::into_inner) = Some(now);
        self.events.emit(AppEvent::SyncCompleted(now));
    }
}

/// Holds the in-progress flag for the lifetime of one run, releasing it on
/// every exit path.
struct InProgressGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InProgressGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;
    use futures::FutureExt;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::clock::ManualClock;
    use crate::events::drain;
    use crate::remote::RemoteError;
    use crate::storage::MemoryKeyValueStore;
    use crate::sync::Connectivity;
    use crate::test_support::{
        at, connected_tokens_with_clock, token_manager, MemoryRemote, ScriptedAuthorizer,
    };

    const FILE: &str = "myFodmap.json";

    struct Fixture {
        engine: Reconciler<MemoryRemote, ScriptedAuthorizer>,
        store: Arc<LocalStore>,
        remote: MemoryRemote,
        clock: ManualClock,
        events: EventBus,
        connectivity: Connectivity,
    }

    async fn fixture_with(settings: SyncSettings, connected: bool) -> Fixture {
        let clock = ManualClock::new(at("2024-01-01T00:00:00Z"));
        let events = EventBus::new();
        let store = Arc::new(LocalStore::open(
            MemoryKeyValueStore::shared(),
            Arc::new(clock.clone()),
            events.clone(),
        ));
        let tokens = if connected {
            connected_tokens_with_clock(&clock).await
        } else {
            token_manager(ScriptedAuthorizer::new(clock.clone()), &clock)
        };
        let remote = MemoryRemote::new();
        let connectivity = Connectivity::new(true);
        let blob = BlobClient::new(remote.clone(), tokens, connectivity.clone(), FILE);
        let engine = Reconciler::new(
            Arc::clone(&store),
            blob,
            events.clone(),
            Arc::new(clock.clone()),
            settings,
        );
        Fixture {
            engine,
            store,
            remote,
            clock,
            events,
            connectivity,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(SyncSettings::default(), true).await
    }

    fn remote_doc(last_modified: &str, category: &str) -> String {
        format!(
            r#"{{"categories":[{{"name":"{category}","foods":[]}}],"lastModified":"{last_modified}"}}"#
        )
    }

    #[tokio::test(flavor = "current_thread")]
    async fn empty_local_and_no_remote_does_nothing() {
        let fx = fixture().await;

        let outcome = fx.engine.reconcile().await.unwrap();

        assert_eq!(outcome, SyncOutcome::NothingToSync);
        assert_eq!(fx.remote.create_calls(), 0);
        assert_eq!(fx.remote.update_calls(), 0);
        assert_eq!(fx.engine.last_sync_time(), None);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn local_data_bootstraps_missing_remote_then_settles() {
        let fx = fixture().await;
        fx.store.add_category("Dairy").unwrap();

        assert_eq!(fx.engine.reconcile().await.unwrap(), SyncOutcome::Bootstrapped);
        assert_eq!(fx.remote.create_calls(), 1);
        let uploaded = fx.remote.content_named(FILE).unwrap();
        assert!(uploaded.contains("Dairy"));

        assert_eq!(fx.engine.reconcile().await.unwrap(), SyncOutcome::UpToDate);
        assert_eq!(fx.remote.create_calls(), 1);
        assert_eq!(fx.remote.update_calls(), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn newer_remote_is_imported_without_echo() {
        let fx = fixture().await;
        fx.store.add_category("Dairy").unwrap();
        fx.remote
            .put_file(FILE, &remote_doc("2024-01-02T00:00:00Z", "Fruit"));
        let mut receiver = fx.events.subscribe();

        assert_eq!(fx.engine.reconcile().await.unwrap(), SyncOutcome::Pulled);

        assert_eq!(fx.store.category_names(), vec!["Fruit"]);
        assert_eq!(fx.store.last_modified(), Some(at("2024-01-02T00:00:00Z")));
        assert_eq!(fx.remote.update_calls(), 0);
        assert_eq!(fx.remote.create_calls(), 0);
        let events = drain(&mut receiver);
        assert!(!events.contains(&AppEvent::DataSyncNeeded));
        assert!(events.contains(&AppEvent::DataUpdated));
        assert!(events.contains(&AppEvent::SyncCompleted(at("2024-01-01T00:00:00Z"))));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn newer_local_is_uploaded_in_place() {
        let fx = fixture().await;
        let id = fx
            .remote
            .put_file(FILE, &remote_doc("2023-12-31T00:00:00Z", "Fruit"));
        fx.store.add_category("Dairy").unwrap();

        assert_eq!(fx.engine.reconcile().await.unwrap(), SyncOutcome::Pushed);

        assert_eq!(fx.remote.update_calls(), 1);
        assert!(fx.remote.content_of(&id).unwrap().contains("Dairy"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn reconcile_is_idempotent() {
        let fx = fixture().await;
        fx.remote
            .put_file(FILE, &remote_doc("2023-12-31T00:00:00Z", "Fruit"));
        fx.store.add_category("Dairy").unwrap();

        fx.engine.reconcile().await.unwrap();
        let writes = fx.remote.create_calls() + fx.remote.update_calls();
        let local = fx.store.document();

        fx.clock.advance(Duration::minutes(5));
        assert_eq!(fx.engine.reconcile().await.unwrap(), SyncOutcome::UpToDate);
        assert_eq!(fx.remote.create_calls() + fx.remote.update_calls(), writes);
        assert_eq!(fx.store.document(), local);
        assert_eq!(fx.engine.last_sync_time(), Some(at("2024-01-01T00:05:00Z")));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn corrupt_remote_counts_as_absent() {
        let fx = fixture().await;
        let id = fx.remote.put_file(FILE, "{ definitely not json");
        fx.store.add_category("Dairy").unwrap();

        assert_eq!(fx.engine.reconcile().await.unwrap(), SyncOutcome::Bootstrapped);
        assert!(fx.remote.content_of(&id).unwrap().contains("Dairy"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn initial_sync_prefers_remote_for_fresh_install() {
        let fx = fixture().await;
        fx.remote.put_file(FILE, r#"{"categories":[{"name":"Fruit","foods":[]}]}"#);

        assert_eq!(fx.engine.initial_sync().await.unwrap(), SyncOutcome::Pulled);
        assert_eq!(fx.store.category_names(), vec!["Fruit"]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn regular_sync_treats_unstamped_sides_as_equal() {
        let fx = fixture().await;
        fx.remote.put_file(FILE, r#"{"categories":[{"name":"Fruit","foods":[]}]}"#);

        assert_eq!(fx.engine.reconcile().await.unwrap(), SyncOutcome::UpToDate);
        assert!(!fx.store.has_data());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn skips_when_offline_or_disconnected() {
        let fx = fixture().await;
        fx.store.add_category("Dairy").unwrap();
        fx.connectivity.set_online(false);
        assert_eq!(
            fx.engine.reconcile().await.unwrap(),
            SyncOutcome::Skipped(SkipReason::Offline)
        );

        let disconnected = fixture_with(SyncSettings::default(), false).await;
        assert_eq!(
            disconnected.engine.reconcile().await.unwrap(),
            SyncOutcome::Skipped(SkipReason::NotConnected)
        );
        assert_eq!(fx.remote.total_calls(), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn coming_back_online_reconciles() {
        let fx = fixture().await;
        fx.store.add_category("Dairy").unwrap();
        fx.engine.set_online(false).await;

        let outcome = fx.engine.set_online(true).await.unwrap().unwrap();

        assert_eq!(outcome, SyncOutcome::Bootstrapped);
        assert!(fx.engine.set_online(true).await.is_none());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn overlapping_runs_are_serialized() {
        let fx = fixture().await;
        fx.store.add_category("Dairy").unwrap();
        let gate = fx.remote.hold_calls();

        let first = fx.engine.reconcile();
        let second = async {
            tokio::task::yield_now().await;
            let outcome = fx.engine.reconcile().await;
            gate.notify_one();
            outcome
        };
        let (first, second) = tokio::join!(first, second);

        assert_eq!(first.unwrap(), SyncOutcome::Bootstrapped);
        assert_eq!(second.unwrap(), SyncOutcome::Skipped(SkipReason::InProgress));
        assert!(!fx.engine.is_in_progress());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn failure_releases_in_progress_flag_and_leaves_stores_untouched() {
        let fx = fixture().await;
        fx.store.add_category("Dairy").unwrap();
        let local = fx.store.document();
        let mut receiver = fx.events.subscribe();
        fx.remote.fail_next(RemoteError::Api {
            status: 500,
            message: "Backend Error (500)".to_string(),
        });

        assert!(matches!(fx.engine.reconcile().await, Err(SyncError::Remote(_))));
        assert!(!fx.engine.is_in_progress());
        assert_eq!(fx.store.document(), local);
        assert_eq!(fx.remote.file_ids(), Vec::<String>::new());
        assert!(matches!(
            drain(&mut receiver).as_slice(),
            [AppEvent::Toast { severity: Severity::Error, .. }]
        ));

        assert_eq!(fx.engine.reconcile().await.unwrap(), SyncOutcome::Bootstrapped);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn auth_failure_surfaces_reauthentication() {
        let fx = fixture().await;
        fx.store.add_category("Dairy").unwrap();
        let mut receiver = fx.events.subscribe();
        fx.remote.fail_next(RemoteError::Unauthorized(401));

        assert!(matches!(fx.engine.reconcile().await, Err(SyncError::AuthExpired)));

        assert!(!fx.engine.tokens().is_connected());
        let events = drain(&mut receiver);
        assert_eq!(&events[..2], &[AppEvent::AuthExpired, AppEvent::Disconnected]);
        assert_eq!(
            fx.engine.reconcile().await.unwrap(),
            SyncOutcome::Skipped(SkipReason::NotConnected)
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn local_mutation_trigger_respects_push_setting() {
        let fx = fixture().await;
        fx.store.add_category("Dairy").unwrap();
        assert!(fx
            .engine
            .handle_trigger(SyncTrigger::LocalMutation)
            .await
            .is_none());
        assert_eq!(fx.remote.total_calls(), 0);

        let eager = fixture_with(SyncSettings::default().with_push_on_mutation(true), true).await;
        eager.store.add_category("Dairy").unwrap();
        let outcome = eager
            .engine
            .handle_trigger(SyncTrigger::LocalMutation)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, SyncOutcome::Pushed);
        assert_eq!(eager.remote.create_calls(), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn connected_trigger_runs_initial_sync() {
        let fx = fixture().await;
        fx.remote.put_file(FILE, r#"{"categories":[{"name":"Fruit","foods":[]}]}"#);

        let outcome = fx
            .engine
            .handle_trigger(SyncTrigger::Connected)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, SyncOutcome::Pulled);
    }

    #[test]
    fn guard_releases_flag_on_drop() {
        let flag = AtomicBool::new(false);
        {
            let guard = InProgressGuard::acquire(&flag);
            assert!(guard.is_some());
            assert!(InProgressGuard::acquire(&flag).is_none());
        }
        assert!(!flag.load(Ordering::SeqCst));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn fresh_token_check_completes_without_suspending() {
        let fx = fixture().await;
        assert!(fx.engine.tokens().ensure_valid().now_or_never().unwrap());
    }
}
