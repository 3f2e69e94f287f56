//! Test doubles shared by the unit tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Notify;

use crate::auth::{AuthError, AuthResult, Authorizer, ConsentGrant, CredentialStore, TokenManager};
use crate::clock::{Clock, ManualClock};
use crate::events::EventBus;
use crate::models::Credential;
use crate::remote::{FileMetadata, RemoteError, RemoteFile, RemoteResult, RemoteStore};
use crate::storage::{KeyValueStore, MemoryKeyValueStore, StorageError, StorageResult};

pub fn at(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Wait on a one-shot gate if one is armed.
async fn pass_gate(gate: &Mutex<Option<Arc<Notify>>>) {
    let armed = locked(gate).take();
    if let Some(notify) = armed {
        notify.notified().await;
    }
}

/// Storage whose every call fails.
pub struct FailingStore;

impl KeyValueStore for FailingStore {
    fn get(&self, _key: &str) -> StorageResult<Option<String>> {
        Err(StorageError::Unavailable("storage disabled".to_string()))
    }

    fn set(&self, _key: &str, _value: &str) -> StorageResult<()> {
        Err(StorageError::Unavailable("storage disabled".to_string()))
    }

    fn remove(&self, _key: &str) -> StorageResult<()> {
        Err(StorageError::Unavailable("storage disabled".to_string()))
    }
}

/// Authorizer with scripted answers that counts refresh calls.
#[derive(Clone)]
pub struct ScriptedAuthorizer {
    script: Arc<Script>,
}

struct Script {
    clock: ManualClock,
    refresh_calls: AtomicUsize,
    refresh_failures: Mutex<VecDeque<AuthError>>,
    rotated_refresh_token: Mutex<Option<String>>,
    consent: Mutex<Option<ConsentGrant>>,
    exchanged_codes: Mutex<Vec<String>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl ScriptedAuthorizer {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            script: Arc::new(Script {
                clock,
                refresh_calls: AtomicUsize::new(0),
                refresh_failures: Mutex::new(VecDeque::new()),
                rotated_refresh_token: Mutex::new(None),
                consent: Mutex::new(None),
                exchanged_codes: Mutex::new(Vec::new()),
                gate: Mutex::new(None),
            }),
        }
    }

    pub fn refresh_calls(&self) -> usize {
        self.script.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn fail_next_refresh(&self, error: AuthError) {
        locked(&self.script.refresh_failures).push_back(error);
    }

    pub fn rotate_refresh_token(&self, token: &str) {
        *locked(&self.script.rotated_refresh_token) = Some(token.to_string());
    }

    /// The next consent returns this authorization code.
    pub fn grant_code(&self, code: &str) {
        *locked(&self.script.consent) = Some(ConsentGrant::Code(code.to_string()));
    }

    pub fn exchanged_codes(&self) -> Vec<String> {
        locked(&self.script.exchanged_codes).clone()
    }

    /// Hold the next refresh until the returned handle is notified.
    pub fn hold_refreshes(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *locked(&self.script.gate) = Some(Arc::clone(&notify));
        notify
    }

    fn issue(&self, access_token: String, refresh_token: Option<String>) -> Credential {
        Credential {
            access_token,
            expires_at: self.script.clock.now() + Duration::hours(1),
            refresh_token,
        }
    }
}

impl Authorizer for ScriptedAuthorizer {
    async fn request_interactive_consent(&self) -> AuthResult<ConsentGrant> {
        let grant = locked(&self.script.consent).take();
        grant.ok_or(AuthError::Cancelled)
    }

    async fn exchange_code(&self, code: &str) -> AuthResult<Credential> {
        locked(&self.script.exchanged_codes).push(code.to_string());
        Ok(self.issue(
            "exchanged-access".to_string(),
            Some("refresh-token".to_string()),
        ))
    }

    async fn refresh(&self, _refresh_token: &str) -> AuthResult<Credential> {
        let call = self.script.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        pass_gate(&self.script.gate).await;
        tokio::task::yield_now().await;

        let failure = locked(&self.script.refresh_failures).pop_front();
        if let Some(error) = failure {
            return Err(error);
        }
        let rotated = locked(&self.script.rotated_refresh_token).clone();
        Ok(self.issue(format!("access-{call}"), rotated))
    }
}

pub fn token_manager(
    authorizer: ScriptedAuthorizer,
    clock: &ManualClock,
) -> TokenManager<ScriptedAuthorizer> {
    TokenManager::new(
        authorizer,
        CredentialStore::new(MemoryKeyValueStore::shared()),
        EventBus::new(),
        Arc::new(clock.clone()),
        Duration::seconds(60),
    )
}

/// A token manager that has completed an interactive sign-in.
pub async fn connected_tokens_with_clock(clock: &ManualClock) -> TokenManager<ScriptedAuthorizer> {
    let authorizer = ScriptedAuthorizer::new(clock.clone());
    authorizer.grant_code("test-code");
    let tokens = token_manager(authorizer, clock);
    tokens.authenticate_interactively().await.unwrap();
    tokens
}

pub async fn connected_tokens() -> (TokenManager<ScriptedAuthorizer>, ManualClock) {
    let clock = ManualClock::new(at("2024-01-01T00:00:00Z"));
    let tokens = connected_tokens_with_clock(&clock).await;
    (tokens, clock)
}

/// In-memory remote object store with call counters and failure injection.
#[derive(Clone, Default)]
pub struct MemoryRemote {
    state: Arc<RemoteState>,
}

#[derive(Default)]
struct RemoteState {
    files: Mutex<BTreeMap<String, (String, String)>>,
    next_id: AtomicUsize,
    list_calls: AtomicUsize,
    get_calls: AtomicUsize,
    create_calls: AtomicUsize,
    update_calls: AtomicUsize,
    failures: Mutex<VecDeque<RemoteError>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a file directly, bypassing counters. Returns its id.
    pub fn put_file(&self, name: &str, content: &str) -> String {
        let id = self.allocate_id();
        locked(&self.state.files).insert(id.clone(), (name.to_string(), content.to_string()));
        id
    }

    pub fn delete_file(&self, id: &str) {
        locked(&self.state.files).remove(id);
    }

    pub fn content_of(&self, id: &str) -> Option<String> {
        locked(&self.state.files)
            .get(id)
            .map(|(_, content)| content.clone())
    }

    pub fn content_named(&self, name: &str) -> Option<String> {
        locked(&self.state.files)
            .values()
            .find(|(file_name, _)| file_name == name)
            .map(|(_, content)| content.clone())
    }

    pub fn file_ids(&self) -> Vec<String> {
        locked(&self.state.files).keys().cloned().collect()
    }

    pub fn create_calls(&self) -> usize {
        self.state.create_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.state.update_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.state.list_calls.load(Ordering::SeqCst)
            + self.state.get_calls.load(Ordering::SeqCst)
            + self.create_calls()
            + self.update_calls()
    }

    /// The next call of any kind fails with `error`.
    pub fn fail_next(&self, error: RemoteError) {
        locked(&self.state.failures).push_back(error);
    }

    /// Hold the next call until the returned handle is notified.
    pub fn hold_calls(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *locked(&self.state.gate) = Some(Arc::clone(&notify));
        notify
    }

    fn allocate_id(&self) -> String {
        format!("file-{}", self.state.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn enter(&self, counter: &AtomicUsize) -> RemoteResult<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        pass_gate(&self.state.gate).await;
        let failure = locked(&self.state.failures).pop_front();
        failure.map_or(Ok(()), Err)
    }
}

impl RemoteStore for MemoryRemote {
    async fn list(&self, _access_token: &str, name: &str) -> RemoteResult<Vec<RemoteFile>> {
        self.enter(&self.state.list_calls).await?;
        Ok(locked(&self.state.files)
            .iter()
            .filter(|(_, (file_name, _))| file_name == name)
            .map(|(id, (file_name, _))| RemoteFile {
                id: id.clone(),
                name: file_name.clone(),
            })
            .collect())
    }

    async fn get(&self, _access_token: &str, id: &str) -> RemoteResult<String> {
        self.enter(&self.state.get_calls).await?;
        self.content_of(id)
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))
    }

    async fn create(
        &self,
        _access_token: &str,
        metadata: &FileMetadata,
        content: &str,
    ) -> RemoteResult<String> {
        self.enter(&self.state.create_calls).await?;
        Ok(self.put_file(&metadata.name, content))
    }

    async fn update(
        &self,
        _access_token: &str,
        id: &str,
        metadata: &FileMetadata,
        content: &str,
    ) -> RemoteResult<()> {
        self.enter(&self.state.update_calls).await?;
        let mut files = locked(&self.state.files);
        let entry = files
            .get_mut(id)
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;
        *entry = (metadata.name.clone(), content.to_string());
        Ok(())
    }
}
