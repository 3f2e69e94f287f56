//! OAuth credential held by the token lifecycle manager.

use std::fmt;

use chrono::{DateTime, Duration, Utc};

/// Access token plus absolute expiry and an optional long-lived refresh token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub refresh_token: Option<String>,
}

impl Credential {
    /// True when `now` is still before the expiry minus the safety buffer.
    #[must_use]
    pub fn is_usable_at(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        !self.access_token.is_empty() && now < self.expires_at - buffer
    }

    #[must_use]
    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token
            .as_deref()
            .is_some_and(|token| !token.trim().is_empty())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(expires_at: DateTime<Utc>) -> Credential {
        Credential {
            access_token: "secret-access-token".to_string(),
            expires_at,
            refresh_token: Some("secret-refresh-token".to_string()),
        }
    }

    #[test]
    fn usable_respects_buffer() {
        let now = Utc::now();
        let cred = credential(now + Duration::seconds(120));
        assert!(cred.is_usable_at(now, Duration::seconds(60)));
        assert!(!cred.is_usable_at(now, Duration::seconds(120)));
        assert!(!cred.is_usable_at(now + Duration::seconds(61), Duration::seconds(60)));
    }

    #[test]
    fn debug_redacts_tokens() {
        let rendered = format!("{:?}", credential(Utc::now()));
        assert!(!rendered.contains("secret-access-token"));
        assert!(!rendered.contains("secret-refresh-token"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
