//! Per-invocation wiring: profile, data directory, local store, and the
//! Google Drive reconciler built on demand.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fodmap_core::auth::{CredentialStore, GoogleOAuthClient, TokenManager};
use fodmap_core::clock::{system_clock, SharedClock};
use fodmap_core::config::{OAuthClientConfig, SyncSettings};
use fodmap_core::events::{drain, AppEvent, EventBus};
use fodmap_core::remote::{BlobClient, GoogleDriveStore};
use fodmap_core::storage::{FileKeyValueStore, LocalStore, SharedKeyValueStore};
use fodmap_core::sync::{Connectivity, Reconciler, SyncTrigger};
use tokio::sync::broadcast;

use crate::config_profiles::{normalize_text_option, CliProfile, CliProfilesConfig};
use crate::error::CliError;
use crate::secret_store::KeyringStore;

pub const DATA_DIR_ENV: &str = "MYFODMAP_DATA_DIR";

pub type DriveReconciler = Reconciler<GoogleDriveStore, GoogleOAuthClient>;

pub struct AppContext {
    pub profile_name: String,
    pub data_dir: PathBuf,
    pub store: Arc<LocalStore>,
    pub events: EventBus,
    pub clock: SharedClock,
    pub connectivity: Connectivity,
    pub settings: SyncSettings,
    pub oauth: Option<OAuthClientConfig>,
    receiver: broadcast::Receiver<AppEvent>,
}

impl AppContext {
    pub fn new(
        profile_name: &str,
        data_dir: PathBuf,
        settings: SyncSettings,
        oauth: Option<OAuthClientConfig>,
        offline: bool,
        clock: SharedClock,
    ) -> Result<Self, CliError> {
        let events = EventBus::new();
        let receiver = events.subscribe();
        let storage: SharedKeyValueStore = Arc::new(FileKeyValueStore::open(&data_dir)?);
        let store = Arc::new(LocalStore::open(storage, clock.clone(), events.clone()));

        Ok(Self {
            profile_name: profile_name.to_string(),
            data_dir,
            store,
            events,
            clock,
            connectivity: Connectivity::new(!offline),
            settings,
            oauth,
            receiver,
        })
    }

    pub fn from_cli(
        profile: Option<&str>,
        data_dir: Option<PathBuf>,
        offline: bool,
    ) -> Result<Self, CliError> {
        let config = CliProfilesConfig::load().map_err(CliError::Config)?;
        let profile_name = config.resolve_profile_name(profile);
        let profile = config.profile(&profile_name).cloned().unwrap_or_default();
        let data_dir = resolve_data_dir(data_dir, &profile_name)?;
        let oauth = resolve_oauth_config(&profile)?;
        tracing::debug!(
            profile = %profile_name,
            data_dir = %data_dir.display(),
            oauth_configured = oauth.is_some(),
            "Resolved CLI context"
        );

        Self::new(
            &profile_name,
            data_dir,
            profile.sync_settings(),
            oauth,
            offline,
            system_clock(),
        )
    }

    pub fn credential_store(&self) -> CredentialStore {
        CredentialStore::new(Arc::new(KeyringStore::new(&self.profile_name)))
    }

    pub fn reconciler(&self) -> Result<DriveReconciler, CliError> {
        let oauth = self.oauth.clone().ok_or(CliError::OAuthNotConfigured)?;
        let authorizer = GoogleOAuthClient::new(oauth)?
            .with_clock(self.clock.clone())
            .with_authorize_url_handler(|url| {
                eprintln!("Open this URL in your browser to connect Google Drive:\n\n  {url}\n");
            });
        let tokens = TokenManager::new(
            authorizer,
            self.credential_store(),
            self.events.clone(),
            self.clock.clone(),
            self.settings.expiry_buffer(),
        );
        let blob = BlobClient::new(
            GoogleDriveStore::new()?,
            tokens,
            self.connectivity.clone(),
            self.settings.remote_file_name(),
        );

        Ok(Reconciler::new(
            Arc::clone(&self.store),
            blob,
            self.events.clone(),
            self.clock.clone(),
            self.settings.clone(),
        ))
    }

    /// Push a local change straight away when the profile asks for it.
    /// Failures only warn; the change is already saved locally.
    pub async fn after_mutation(&mut self) {
        if self.settings.push_on_mutation && self.oauth.is_some() {
            match self.reconciler() {
                Ok(reconciler) => {
                    if reconciler.tokens().restore().await {
                        match reconciler.handle_trigger(SyncTrigger::LocalMutation).await {
                            Some(Ok(outcome)) => tracing::info!(?outcome, "Pushed local change"),
                            Some(Err(error)) => tracing::warn!("Push after change failed: {error}"),
                            None => {}
                        }
                    } else {
                        tracing::debug!("Not connected, change stays local");
                    }
                }
                Err(error) => tracing::warn!("Push after change skipped: {error}"),
            }
        }
        self.report_events();
    }

    /// Print pending toasts to stderr. Other events are only traced.
    pub fn report_events(&mut self) {
        for event in drain(&mut self.receiver) {
            match event {
                AppEvent::Toast { message, severity } => {
                    eprintln!("[{}] {message}", severity.as_str());
                }
                other => tracing::debug!(event = other.name(), "Event"),
            }
        }
    }
}

/// Explicit flag, then `MYFODMAP_DATA_DIR`, then the platform data dir.
pub fn resolve_data_dir(explicit: Option<PathBuf>, profile_name: &str) -> Result<PathBuf, CliError> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    if let Some(path) = normalize_text_option(env::var(DATA_DIR_ENV).ok()) {
        return Ok(PathBuf::from(path));
    }
    default_data_dir(profile_name)
}

fn default_data_dir(profile_name: &str) -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("myfodmap").join(profile_name))
        .ok_or_else(|| CliError::Config("Failed to resolve data directory".to_string()))
}

/// Environment variables win over the profile's stored client id.
pub fn resolve_oauth_config(profile: &CliProfile) -> Result<Option<OAuthClientConfig>, CliError> {
    if let Some(config) = OAuthClientConfig::from_env()? {
        return Ok(Some(config));
    }
    profile
        .client_id
        .clone()
        .map(|id| OAuthClientConfig::new(id, None))
        .transpose()
        .map_err(CliError::from)
}

pub fn document_path(data_dir: &Path) -> PathBuf {
    data_dir.join(format!("{}.json", fodmap_core::storage::DOCUMENT_KEY))
}
