//! OAuth token lifecycle.
//!
//! [`Authorizer`] is the external authorization capability (Google OAuth in
//! production, a scripted double in tests). [`TokenManager`] owns the
//! in-memory credential and is the only component that changes it.

mod credential_store;
mod google;
mod token_manager;

use std::future::Future;

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

use crate::models::Credential;

pub use credential_store::{
    CredentialStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, TOKEN_EXPIRY_KEY,
};
pub use google::{
    GoogleOAuthClient, CONSENT_TIMEOUT, DRIVE_FILE_SCOPE, GOOGLE_AUTH_URL, GOOGLE_TOKEN_URL,
};
pub use token_manager::{AuthState, TokenManager};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Google sign-in is not configured. Set MYFODMAP_CLIENT_ID.")]
    NotConfigured,
    #[error("Invalid auth configuration: {0}")]
    InvalidConfiguration(String),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Failed to parse JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Auth API error: {0}")]
    Api(String),
    /// The refresh token was revoked or has expired for good.
    #[error("Refresh token is no longer valid")]
    InvalidGrant,
    #[error("Sign-in was cancelled")]
    Cancelled,
    #[error("Sign-in timed out waiting for the browser")]
    Timeout,
    #[error("Consent flow failed: {0}")]
    Consent(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AuthResult<T> = Result<T, AuthError>;

/// What an interactive consent returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsentGrant {
    /// An authorization code still to be exchanged.
    Code(String),
    /// A ready-to-use credential (implicit flows).
    Credential(Credential),
}

/// External authorization capability.
pub trait Authorizer: Send + Sync + 'static {
    /// Run the interactive consent flow.
    fn request_interactive_consent(&self) -> impl Future<Output = AuthResult<ConsentGrant>> + Send;

    fn exchange_code(&self, code: &str) -> impl Future<Output = AuthResult<Credential>> + Send;

    /// Renew using a refresh token. [`AuthError::InvalidGrant`] means the
    /// refresh token is dead and must not be retried.
    fn refresh(&self, refresh_token: &str) -> impl Future<Output = AuthResult<Credential>> + Send;
}

#[derive(Debug, Deserialize)]
struct OAuthErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
    message: Option<String>,
}

/// Turn an OAuth or Google API error body into a short message.
pub(crate) fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<OAuthErrorResponse>(body) {
        if let Some(message) = payload
            .error_description
            .or(payload.message)
            .or(payload.error)
        {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = crate::util::compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}
