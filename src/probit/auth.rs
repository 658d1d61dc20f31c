//! Authentication state for the ProBit API
//!
//! The access token and the rate-limit cooldown live together in one
//! [`SessionState`] shared by every REST call and by the stream supervisor.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::messages::TokenResponse;

/// A token is refreshed once less than this much validity remains
pub const REFRESH_MARGIN_SECONDS: i64 = 60;

/// Client id and secret used to obtain access tokens
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Value of the `Authorization` header for the token endpoint
    pub fn basic_header(&self) -> String {
        let raw = format!("{}:{}", self.client_id, self.client_secret);
        format!("Basic {}", BASE64.encode(raw.as_bytes()))
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Bearer token with its absolute expiry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
}

impl AuthToken {
    /// Build a token from the token endpoint response received at `now`
    pub fn from_response(response: TokenResponse, now: DateTime<Utc>) -> Self {
        Self {
            access_token: response.access_token,
            token_type: response.token_type,
            expires_at: now + Duration::seconds(response.expires_in),
        }
    }

    /// True when less than the refresh margin of validity remains at `now`
    pub fn needs_refresh_at(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(REFRESH_MARGIN_SECONDS) >= self.expires_at
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

/// Mutable state shared across all calls of one session
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub token: Option<AuthToken>,
    pub rate_limited_until: Option<DateTime<Utc>>,
}

impl SessionState {
    pub fn needs_auth_at(&self, now: DateTime<Utc>) -> bool {
        match &self.token {
            Some(token) => token.needs_refresh_at(now),
            None => true,
        }
    }

    /// The cooldown instant, if it still lies ahead of `now`
    pub fn cooldown_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.rate_limited_until.filter(|until| now < *until)
    }

    /// Push the cooldown out to `until`; an existing later cooldown is kept
    pub fn extend_cooldown(&mut self, until: DateTime<Utc>) -> DateTime<Utc> {
        let until = match self.rate_limited_until {
            Some(current) if current > until => current,
            _ => until,
        };
        self.rate_limited_until = Some(until);
        until
    }
}

/// Handle to the state shared by the REST client and the stream supervisor
pub type SharedState = Arc<RwLock<SessionState>>;
