use bridge_traits::Credentials;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AuthError, Result};

/// Authentication state as seen by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AuthState {
    /// No session has been provided
    #[default]
    SignedOut,
    /// A session is present and not past its expiry
    SignedIn,
    /// A session is present but can no longer be used
    Expired,
}

impl AuthState {
    /// Check if remote calls can be attempted.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::SignedIn)
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthState::SignedOut => write!(f, "Signed Out"),
            AuthState::SignedIn => write!(f, "Signed In"),
            AuthState::Expired => write!(f, "Expired"),
        }
    }
}

/// A bearer session obtained by the host from the provider's OAuth flow.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    /// Provider account id of the signed-in user
    pub account_id: Option<String>,
    /// Absolute expiry; `None` for long-lived tokens
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Create a session, rejecting empty tokens.
    pub fn new(access_token: impl Into<String>) -> Result<Self> {
        let access_token = access_token.into();
        if access_token.trim().is_empty() {
            return Err(AuthError::InvalidSession(
                "access token is empty".to_string(),
            ));
        }

        Ok(Self {
            access_token,
            account_id: None,
            expires_at: None,
        })
    }

    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |expiry| now >= expiry)
    }

    /// Snapshot of this session for a single remote call.
    pub fn credentials(&self) -> Credentials {
        let credentials = Credentials::new(self.access_token.clone());
        match &self.account_id {
            Some(account_id) => credentials.with_account(account_id.clone()),
            None => credentials,
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"[REDACTED]")
            .field("account_id", &self.account_id)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
