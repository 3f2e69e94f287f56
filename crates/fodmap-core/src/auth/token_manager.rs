//! Token lifecycle manager.
//!
//! Holds the in-memory credential, decides when it is usable, and renews it
//! silently through the refresh token. Concurrent callers that find the
//! token stale share one in-flight refresh.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};

use super::{AuthError, AuthResult, Authorizer, ConsentGrant, CredentialStore};
use crate::clock::SharedClock;
use crate::events::{AppEvent, EventBus};
use crate::models::Credential;

type PendingRefresh = Shared<BoxFuture<'static, bool>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticating,
    Authenticated,
    RefreshingSilently,
}

impl AuthState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Authenticating => "authenticating",
            Self::Authenticated => "authenticated",
            Self::RefreshingSilently => "refreshing",
        }
    }
}

pub struct TokenManager<A: Authorizer> {
    inner: Arc<Inner<A>>,
}

impl<A: Authorizer> Clone for TokenManager<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<A> {
    authorizer: A,
    store: CredentialStore,
    events: EventBus,
    clock: SharedClock,
    buffer: Duration,
    state: Mutex<TokenState>,
}

struct TokenState {
    credential: Option<Credential>,
    auth_state: AuthState,
    pending_refresh: Option<PendingRefresh>,
    /// Bumped whenever the credential is replaced or dropped, so a refresh
    /// that started before cannot resurrect stale state.
    generation: u64,
}

impl<A: Authorizer> TokenManager<A> {
    /// `buffer` is how long before expiry a token stops counting as valid.
    pub fn new(
        authorizer: A,
        store: CredentialStore,
        events: EventBus,
        clock: SharedClock,
        buffer: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                authorizer,
                store,
                events,
                clock,
                buffer,
                state: Mutex::new(TokenState {
                    credential: None,
                    auth_state: AuthState::Unauthenticated,
                    pending_refresh: None,
                    generation: 0,
                }),
            }),
        }
    }

    pub fn authorizer(&self) -> &A {
        &self.inner.authorizer
    }

    pub fn state(&self) -> AuthState {
        self.inner.lock().auth_state
    }

    /// True while a usable access token or a refresh token is held.
    pub fn is_connected(&self) -> bool {
        let now = self.inner.clock.now();
        self.inner.lock().credential.as_ref().is_some_and(|credential| {
            credential.is_usable_at(now, self.inner.buffer) || credential.has_refresh_token()
        })
    }

    /// True iff a token is loaded and `now < expires_at - buffer`.
    pub fn is_valid(&self) -> bool {
        let now = self.inner.clock.now();
        self.inner
            .lock()
            .credential
            .as_ref()
            .is_some_and(|credential| credential.is_usable_at(now, self.inner.buffer))
    }

    pub fn access_token(&self) -> Option<String> {
        let now = self.inner.clock.now();
        self.inner
            .lock()
            .credential
            .as_ref()
            .filter(|credential| credential.is_usable_at(now, self.inner.buffer))
            .map(|credential| credential.access_token.clone())
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.inner
            .lock()
            .credential
            .as_ref()
            .filter(|credential| !credential.access_token.is_empty())
            .map(|credential| credential.expires_at)
    }

    /// Load the persisted credential at startup, renewing it silently when
    /// it has expired. Emits `connected` when a usable token results.
    pub async fn restore(&self) -> bool {
        let Some(credential) = self.inner.store.load() else {
            tracing::debug!("No stored credential");
            return false;
        };

        let now = self.inner.clock.now();
        let usable = credential.is_usable_at(now, self.inner.buffer);
        let refreshable = credential.has_refresh_token();
        {
            let mut state = self.inner.lock();
            state.credential = (usable || refreshable).then_some(credential);
            state.generation += 1;
            state.auth_state = if usable {
                AuthState::Authenticated
            } else {
                AuthState::Unauthenticated
            };
        }

        let connected = if usable {
            true
        } else if refreshable {
            tracing::info!("Stored access token expired, attempting silent refresh");
            self.silent_refresh().await
        } else {
            false
        };

        if connected {
            self.inner.events.emit(AppEvent::Connected);
        }
        connected
    }

    /// Returns immediately when the token is valid, otherwise runs (or joins)
    /// one silent refresh. Never prompts.
    pub async fn ensure_valid(&self) -> bool {
        if self.is_valid() {
            return true;
        }
        self.silent_refresh().await
    }

    /// Renew the access token with the stored refresh token.
    ///
    /// At most one refresh runs at a time; concurrent callers await the same
    /// outcome. Any failure clears the credential entirely.
    pub async fn silent_refresh(&self) -> bool {
        let pending = {
            let mut state = self.inner.lock();
            if let Some(pending) = state.pending_refresh.as_ref() {
                pending.clone()
            } else {
                let Some(refresh_token) = state
                    .credential
                    .as_ref()
                    .filter(|credential| credential.has_refresh_token())
                    .and_then(|credential| credential.refresh_token.clone())
                else {
                    tracing::debug!("No refresh token available, reauthentication required");
                    return false;
                };

                state.auth_state = AuthState::RefreshingSilently;
                let generation = state.generation;
                let inner = Arc::clone(&self.inner);
                let pending = async move { inner.run_refresh(refresh_token, generation).await }
                    .boxed()
                    .shared();
                state.pending_refresh = Some(pending.clone());
                pending
            }
        };
        pending.await
    }

    /// Run the interactive consent flow and install the resulting credential.
    pub async fn authenticate_interactively(&self) -> AuthResult<()> {
        self.inner.lock().auth_state = AuthState::Authenticating;

        let result = match self.inner.authorizer.request_interactive_consent().await {
            Ok(ConsentGrant::Code(code)) => self.inner.authorizer.exchange_code(&code).await,
            Ok(ConsentGrant::Credential(credential)) => Ok(credential),
            Err(error) => Err(error),
        };

        match result {
            Ok(credential) => {
                self.inner.install(credential);
                tracing::info!("Connected to Google Drive");
                self.inner.events.emit(AppEvent::Connected);
                Ok(())
            }
            Err(error) => {
                if matches!(error, AuthError::Cancelled) {
                    tracing::info!("Sign-in cancelled");
                } else {
                    tracing::warn!("Interactive sign-in failed: {}", error);
                }
                let mut state = self.inner.lock();
                state.auth_state = if state.credential.is_some() {
                    AuthState::Authenticated
                } else {
                    AuthState::Unauthenticated
                };
                Err(error)
            }
        }
    }

    /// Drop all credential state, in memory and persisted.
    pub fn invalidate(&self) {
        self.inner.clear();
    }

    /// Invalidate and tell listeners the session is gone.
    pub fn logout(&self) {
        self.invalidate();
        tracing::info!("Disconnected from Google Drive");
        self.inner.events.emit(AppEvent::Disconnected);
    }
}

impl<A: Authorizer> Inner<A> {
    async fn run_refresh(&self, refresh_token: String, generation: u64) -> bool {
        let result = self.authorizer.refresh(&refresh_token).await;

        let mut state = self.lock();
        state.pending_refresh = None;
        if state.generation != generation {
            tracing::debug!("Discarding refresh result for a replaced credential");
            return false;
        }

        match result {
            Ok(mut credential) => {
                if !credential.has_refresh_token() {
                    credential.refresh_token = Some(refresh_token);
                }
                self.store.save(&credential);
                state.credential = Some(credential);
                state.auth_state = AuthState::Authenticated;
                drop(state);
                tracing::info!("Access token refreshed");
                true
            }
            Err(error) => {
                drop(state);
                if matches!(error, AuthError::InvalidGrant) {
                    tracing::warn!("Refresh token revoked or expired, reauthentication required");
                } else {
                    tracing::warn!("Silent refresh failed: {}", error);
                }
                self.clear();
                false
            }
        }
    }

    fn install(&self, mut credential: Credential) {
        let mut state = self.lock();
        if !credential.has_refresh_token() {
            credential.refresh_token = state
                .credential
                .as_ref()
                .and_then(|previous| previous.refresh_token.clone());
        }
        self.store.save(&credential);
        state.credential = Some(credential);
        state.auth_state = AuthState::Authenticated;
        state.pending_refresh = None;
        state.generation += 1;
    }

    fn clear(&self) {
        let mut state = self.lock();
        state.credential = None;
        state.auth_state = AuthState::Unauthenticated;
        state.pending_refresh = None;
        state.generation += 1;
        drop(state);
        self.store.clear();
    }

    fn lock(&self) -> MutexGuard<'_, TokenState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::future::join_all;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::config::SyncSettings;
    use crate::events::drain;
    use crate::storage::MemoryKeyValueStore;
    use crate::test_support::{at, ScriptedAuthorizer};

    struct Fixture {
        manager: TokenManager<ScriptedAuthorizer>,
        authorizer: ScriptedAuthorizer,
        store: CredentialStore,
        clock: ManualClock,
        events: EventBus,
    }

    fn fixture() -> Fixture {
        fixture_with_buffer(Duration::seconds(60))
    }

    fn fixture_with_buffer(buffer: Duration) -> Fixture {
        let clock = ManualClock::new(at("2024-01-01T00:00:00Z"));
        let authorizer = ScriptedAuthorizer::new(clock.clone());
        let store = CredentialStore::new(MemoryKeyValueStore::shared());
        let events = EventBus::new();
        let manager = TokenManager::new(
            authorizer.clone(),
            store.clone(),
            events.clone(),
            Arc::new(clock.clone()),
            buffer,
        );
        Fixture {
            manager,
            authorizer,
            store,
            clock,
            events,
        }
    }

    fn stored(fx: &Fixture, expires_in: Duration, refresh: Option<&str>) {
        fx.store.save(&Credential {
            access_token: "stored-access".to_string(),
            expires_at: fx.clock.now() + expires_in,
            refresh_token: refresh.map(str::to_string),
        });
    }

    #[tokio::test(flavor = "current_thread")]
    async fn restore_with_valid_token_connects_without_refresh() {
        let fx = fixture();
        stored(&fx, Duration::hours(1), Some("refresh"));
        let mut receiver = fx.events.subscribe();

        assert!(fx.manager.restore().await);
        assert_eq!(fx.manager.state(), AuthState::Authenticated);
        assert_eq!(fx.authorizer.refresh_calls(), 0);
        assert_eq!(drain(&mut receiver), vec![AppEvent::Connected]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn restore_with_expired_token_refreshes_silently() {
        let fx = fixture();
        stored(&fx, Duration::minutes(-5), Some("refresh"));

        assert!(fx.manager.restore().await);
        assert_eq!(fx.authorizer.refresh_calls(), 1);
        assert_eq!(fx.manager.access_token().as_deref(), Some("access-1"));
        assert_eq!(
            fx.store.load().unwrap().refresh_token.as_deref(),
            Some("refresh")
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn restore_without_anything_stays_unauthenticated() {
        let fx = fixture();
        assert!(!fx.manager.restore().await);
        assert!(!fx.manager.is_connected());
        assert_eq!(fx.manager.state(), AuthState::Unauthenticated);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn token_inside_buffer_is_not_valid_and_gets_refreshed() {
        let fx = fixture();
        stored(&fx, Duration::seconds(120), Some("refresh"));
        assert!(fx.manager.restore().await);
        assert!(fx.manager.is_valid());

        fx.clock.advance(Duration::seconds(61));
        assert!(!fx.manager.is_valid());
        assert!(fx.manager.is_connected());

        assert!(fx.manager.ensure_valid().await);
        assert_eq!(fx.authorizer.refresh_calls(), 1);
        assert!(fx.manager.is_valid());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn token_two_minutes_from_expiry_is_renewed_under_default_buffer() {
        let fx = fixture_with_buffer(SyncSettings::default().expiry_buffer());
        stored(&fx, Duration::seconds(120), Some("refresh"));
        fx.manager.inner.lock().credential = fx.store.load();

        assert!(!fx.manager.is_valid());
        assert!(fx.manager.ensure_valid().await);
        assert_eq!(fx.authorizer.refresh_calls(), 1);
        assert_eq!(fx.manager.access_token().as_deref(), Some("access-1"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn valid_token_short_circuits_ensure_valid() {
        let fx = fixture();
        stored(&fx, Duration::hours(1), Some("refresh"));
        fx.manager.restore().await;

        for _ in 0..3 {
            assert!(fx.manager.ensure_valid().await);
        }
        assert_eq!(fx.authorizer.refresh_calls(), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn concurrent_ensure_valid_shares_one_refresh() {
        let fx = fixture();
        stored(&fx, Duration::minutes(-1), Some("refresh"));
        fx.manager.inner.lock().credential = fx.store.load();

        let results = join_all((0..8).map(|_| fx.manager.ensure_valid())).await;

        assert!(results.into_iter().all(|ok| ok));
        assert_eq!(fx.authorizer.refresh_calls(), 1);
        assert!(fx.manager.inner.lock().pending_refresh.is_none());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn invalid_grant_clears_everything_and_stops_retrying() {
        let fx = fixture();
        stored(&fx, Duration::hours(1), Some("dead-refresh"));
        fx.manager.restore().await;
        fx.clock.advance(Duration::hours(2));
        fx.authorizer.fail_next_refresh(AuthError::InvalidGrant);

        assert!(!fx.manager.ensure_valid().await);
        assert!(!fx.manager.is_connected());
        assert_eq!(fx.store.load(), None);
        assert_eq!(fx.authorizer.refresh_calls(), 1);

        assert!(!fx.manager.ensure_valid().await);
        assert_eq!(fx.authorizer.refresh_calls(), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn transient_refresh_failure_also_requires_reauthentication() {
        let fx = fixture();
        stored(&fx, Duration::minutes(-1), Some("refresh"));
        fx.authorizer
            .fail_next_refresh(AuthError::Api("backend unavailable (503)".to_string()));

        assert!(!fx.manager.restore().await);
        assert_eq!(fx.manager.state(), AuthState::Unauthenticated);
        assert_eq!(fx.store.load(), None);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn rotated_refresh_token_is_persisted() {
        let fx = fixture();
        stored(&fx, Duration::minutes(-1), Some("refresh-old"));
        fx.authorizer.rotate_refresh_token("refresh-new");

        assert!(fx.manager.restore().await);
        assert_eq!(
            fx.store.load().unwrap().refresh_token.as_deref(),
            Some("refresh-new")
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn interactive_code_flow_stores_credential_and_emits_connected() {
        let fx = fixture();
        let mut receiver = fx.events.subscribe();
        fx.authorizer.grant_code("auth-code");

        fx.manager.authenticate_interactively().await.unwrap();

        assert_eq!(fx.authorizer.exchanged_codes(), vec!["auth-code".to_string()]);
        assert_eq!(fx.manager.state(), AuthState::Authenticated);
        assert!(fx.store.load().is_some());
        assert_eq!(drain(&mut receiver), vec![AppEvent::Connected]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn cancelled_consent_returns_to_unauthenticated() {
        let fx = fixture();
        let mut receiver = fx.events.subscribe();

        let error = fx.manager.authenticate_interactively().await.unwrap_err();

        assert!(matches!(error, AuthError::Cancelled));
        assert_eq!(fx.manager.state(), AuthState::Unauthenticated);
        assert!(drain(&mut receiver).is_empty());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn invalidate_during_refresh_discards_the_result() {
        let fx = fixture();
        stored(&fx, Duration::minutes(-1), Some("refresh"));
        fx.manager.inner.lock().credential = fx.store.load();
        let gate = fx.authorizer.hold_refreshes();

        let refresh = fx.manager.silent_refresh();
        let invalidate = async {
            tokio::task::yield_now().await;
            fx.manager.invalidate();
            gate.notify_one();
        };
        let (refreshed, ()) = tokio::join!(refresh, invalidate);

        assert!(!refreshed);
        assert!(!fx.manager.is_connected());
        assert_eq!(fx.store.load(), None);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn logout_clears_and_emits_disconnected() {
        let fx = fixture();
        stored(&fx, Duration::hours(1), Some("refresh"));
        fx.manager.restore().await;
        let mut receiver = fx.events.subscribe();

        fx.manager.logout();

        assert!(!fx.manager.is_connected());
        assert_eq!(fx.store.load(), None);
        assert_eq!(drain(&mut receiver), vec![AppEvent::Disconnected]);
    }
}
