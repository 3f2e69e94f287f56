//! Google OAuth 2.0 authorizer for installed apps.
//!
//! Consent runs through the system browser with a loopback redirect to a
//! short-lived callback server on `127.0.0.1`. Each flow carries its own
//! random `state`, checked against the callback before the code is exchanged.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration as StdDuration;

use axum::{extract::Query, response::Html, routing::get, Router};
use chrono::Duration;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use url::Url;
use uuid::Uuid;

use super::{parse_api_error, AuthError, AuthResult, Authorizer, ConsentGrant};
use crate::clock::{system_clock, SharedClock};
use crate::config::OAuthClientConfig;
use crate::models::Credential;

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
/// Access limited to files this app created.
pub const DRIVE_FILE_SCOPE: &str = "https://www.googleapis.com/auth/drive.file";

const LOOPBACK_HOST: &str = "127.0.0.1";
/// How long the callback server waits for the browser.
pub const CONSENT_TIMEOUT: StdDuration = StdDuration::from_secs(300);

const SIGNED_IN_PAGE: &str = "<html><body><h1>Signed in</h1>\
    <p>You can close this window and return to the terminal.</p></body></html>";
const FAILED_PAGE: &str = "<html><body><h1>Sign-in did not complete</h1>\
    <p>Return to the terminal for details.</p></body></html>";
const WAITING_PAGE: &str = "<html><body><p>Waiting for Google sign-in.</p></body></html>";

type AuthorizeUrlHandler = Arc<dyn Fn(&Url) + Send + Sync>;
type CallbackSender = Arc<Mutex<Option<oneshot::Sender<AuthResult<String>>>>>;

#[derive(Clone)]
pub struct GoogleOAuthClient {
    config: OAuthClientConfig,
    auth_url: String,
    token_url: String,
    redirect_uri: String,
    client: Client,
    clock: SharedClock,
    consent_timeout: StdDuration,
    on_authorize_url: AuthorizeUrlHandler,
}

impl fmt::Debug for GoogleOAuthClient {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("GoogleOAuthClient")
            .field("config", &self.config)
            .field("token_url", &self.token_url)
            .finish_non_exhaustive()
    }
}

impl GoogleOAuthClient {
    pub fn new(config: OAuthClientConfig) -> AuthResult<Self> {
        Ok(Self {
            config,
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            redirect_uri: format!("http://{LOOPBACK_HOST}"),
            client: Client::builder().build()?,
            clock: system_clock(),
            consent_timeout: CONSENT_TIMEOUT,
            on_authorize_url: Arc::new(|url: &Url| {
                tracing::info!("Open this URL to authorize access: {}", url);
            }),
        })
    }

    /// Called with the consent URL; the CLI prints it for the user.
    #[must_use]
    pub fn with_authorize_url_handler(
        mut self,
        handler: impl Fn(&Url) + Send + Sync + 'static,
    ) -> Self {
        self.on_authorize_url = Arc::new(handler);
        self
    }

    #[must_use]
    pub const fn with_consent_timeout(mut self, timeout: StdDuration) -> Self {
        self.consent_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Override the endpoints, e.g. to point at a local test server.
    pub fn with_endpoints(mut self, auth_url: &str, token_url: &str) -> AuthResult<Self> {
        self.auth_url = normalize_endpoint(auth_url)?;
        self.token_url = normalize_endpoint(token_url)?;
        Ok(self)
    }

    /// Build the consent URL for one flow.
    pub fn authorize_url(&self, redirect_uri: &str, state: &str) -> AuthResult<Url> {
        let mut url = Url::parse(&self.auth_url)
            .map_err(|error| AuthError::InvalidConfiguration(error.to_string()))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", DRIVE_FILE_SCOPE)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("state", state);
        Ok(url)
    }

    async fn run_loopback_consent(&self) -> AuthResult<Credential> {
        let listener = TcpListener::bind((LOOPBACK_HOST, 0)).await?;
        let port = listener.local_addr()?.port();
        let redirect_uri = format!("http://{LOOPBACK_HOST}:{port}");
        let state = Uuid::new_v4().to_string();
        let url = self.authorize_url(&redirect_uri, &state)?;

        let (tx, rx) = oneshot::channel::<AuthResult<String>>();
        let sender: CallbackSender = Arc::new(Mutex::new(Some(tx)));
        let app = Router::new().route(
            "/",
            get(move |Query(params): Query<CallbackParams>| {
                let sender = Arc::clone(&sender);
                let state = state.clone();
                async move { handle_callback(&params, &state, &sender) }
            }),
        );
        let server = tokio::spawn(async move {
            if let Err(error) = axum::serve(listener, app).await {
                tracing::debug!("OAuth callback server stopped: {}", error);
            }
        });

        (self.on_authorize_url)(&url);
        tracing::debug!("Waiting for OAuth callback on port {}", port);

        let outcome = tokio::time::timeout(self.consent_timeout, rx).await;
        server.abort();

        let code = match outcome {
            Ok(Ok(result)) => result?,
            Ok(Err(_)) => {
                return Err(AuthError::Consent(
                    "Callback server closed before sign-in completed".to_string(),
                ))
            }
            Err(_) => {
                tracing::warn!(
                    "No OAuth callback within {}s",
                    self.consent_timeout.as_secs()
                );
                return Err(AuthError::Timeout);
            }
        };

        self.exchange(&code, &redirect_uri).await
    }

    async fn exchange(&self, code: &str, redirect_uri: &str) -> AuthResult<Credential> {
        let mut form = vec![
            ("client_id", self.config.client_id.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];
        if let Some(secret) = self.config.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }
        let credential = self.token_request(&form).await?;
        tracing::debug!(
            has_refresh_token = credential.has_refresh_token(),
            "Exchanged authorization code"
        );
        Ok(credential)
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> AuthResult<Credential> {
        let response = self.client.post(&self.token_url).form(form).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(token_error(status, &body));
        }
        let payload: TokenResponse = serde_json::from_str(&body)?;
        payload.into_credential(self.clock.now())
    }
}

impl Authorizer for GoogleOAuthClient {
    async fn request_interactive_consent(&self) -> AuthResult<ConsentGrant> {
        self.run_loopback_consent()
            .await
            .map(ConsentGrant::Credential)
    }

    async fn exchange_code(&self, code: &str) -> AuthResult<Credential> {
        let code = code.trim();
        if code.is_empty() {
            return Err(AuthError::Api("Authorization code is required".to_string()));
        }
        self.exchange(code, &self.redirect_uri).await
    }

    async fn refresh(&self, refresh_token: &str) -> AuthResult<Credential> {
        if refresh_token.trim().is_empty() {
            return Err(AuthError::InvalidGrant);
        }
        let mut form = vec![
            ("client_id", self.config.client_id.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        if let Some(secret) = self.config.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }
        self.token_request(&form).await
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
}

impl TokenResponse {
    fn into_credential(self, now: chrono::DateTime<chrono::Utc>) -> AuthResult<Credential> {
        match (self.access_token, self.expires_in) {
            (Some(access_token), Some(expires_in)) if !access_token.trim().is_empty() => {
                Ok(Credential {
                    access_token,
                    expires_at: now + Duration::seconds(expires_in),
                    refresh_token: self.refresh_token.filter(|token| !token.trim().is_empty()),
                })
            }
            _ => Err(AuthError::Api(
                "Token response did not include an access token and expiry".to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: Option<String>,
}

fn token_error(status: StatusCode, body: &str) -> AuthError {
    let code = serde_json::from_str::<TokenErrorResponse>(body)
        .ok()
        .and_then(|payload| payload.error);
    if code.as_deref() == Some("invalid_grant") {
        AuthError::InvalidGrant
    } else {
        AuthError::Api(parse_api_error(status, body))
    }
}

fn normalize_endpoint(url: &str) -> AuthResult<String> {
    let trimmed = url.trim();
    if !crate::util::is_http_url(trimmed) {
        return Err(AuthError::InvalidConfiguration(format!(
            "OAuth endpoint must include http:// or https://: {trimmed}"
        )));
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Default, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Interpret the redirect's query.
///
/// `Ok(None)` means the request carried neither a code nor an error and the
/// server should keep waiting.
fn parse_callback(params: &CallbackParams, expected_state: &str) -> AuthResult<Option<String>> {
    if params.code.is_none() && params.error.is_none() {
        return Ok(None);
    }
    if params.state.as_deref() != Some(expected_state) {
        return Err(AuthError::Consent(
            "OAuth state mismatch; ignoring callback".to_string(),
        ));
    }
    if let Some(error) = params.error.as_deref() {
        return Err(if error == "access_denied" {
            AuthError::Cancelled
        } else {
            AuthError::Consent(error.to_string())
        });
    }
    Ok(params.code.clone().filter(|code| !code.is_empty()))
}

fn handle_callback(
    params: &CallbackParams,
    expected_state: &str,
    sender: &CallbackSender,
) -> Html<&'static str> {
    let result = match parse_callback(params, expected_state) {
        Ok(None) => return Html(WAITING_PAGE),
        Ok(Some(code)) => Ok(code),
        Err(error) => Err(error),
    };
    let page = if result.is_ok() {
        SIGNED_IN_PAGE
    } else {
        FAILED_PAGE
    };
    if let Some(tx) = sender
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take()
    {
        let _ = tx.send(result);
    }
    Html(page)
}
