//! Token endpoint responses and persisted user credentials.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::jwt::Jwt;

/// Token response from the provider's token endpoint.
///
/// `refresh_expires_in` is a Keycloak extension; providers that omit it get a
/// refresh-token lifetime of zero, meaning "unknown".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Encoded access token.
    pub access_token: String,
    /// Encoded refresh token.
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
    /// Refresh token lifetime in seconds.
    #[serde(default)]
    pub refresh_expires_in: u64,
    /// Granted scopes.
    #[serde(default)]
    pub scope: String,
    /// Token type, usually "Bearer".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// OIDC ID token, when issued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

/// A logged-in user's token set.
///
/// Never mutated in place: every login or refresh produces a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserCredentials {
    /// Client time when the tokens were acquired.
    pub timestamp: DateTime<Utc>,
    /// Bearer token for API calls.
    pub access_token: Jwt,
    /// Access token lifetime in seconds.
    pub access_token_expiration: u64,
    /// Token used to obtain a new access token.
    pub refresh_token: Jwt,
    /// Refresh token lifetime in seconds.
    pub refresh_token_expiration: u64,
    /// Granted scopes, space separated.
    pub scope: String,
}

impl UserCredentials {
    /// Build credentials from a token response received at `timestamp`.
    pub fn from_response(response: &TokenResponse, timestamp: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            timestamp,
            access_token: Jwt::decode(&response.access_token)?,
            access_token_expiration: response.expires_in,
            refresh_token: Jwt::decode(&response.refresh_token)?,
            refresh_token_expiration: response.refresh_expires_in,
            scope: response.scope.clone(),
        })
    }

    /// Instant at which the access token expires.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.timestamp + seconds(self.access_token_expiration)
    }

    /// Instant at which the refresh token expires, if its lifetime is known.
    pub fn refresh_expires_at(&self) -> Option<DateTime<Utc>> {
        (self.refresh_token_expiration > 0)
            .then(|| self.timestamp + seconds(self.refresh_token_expiration))
    }

    /// Seconds elapsed since acquisition, as of `now`.
    pub fn elapsed(&self, now: DateTime<Utc>) -> f64 {
        (now - self.timestamp).num_milliseconds() as f64 / 1000.0
    }

    /// Remaining access token lifetime as of `now`, clamped at zero.
    pub fn remaining(&self, now: DateTime<Utc>) -> std::time::Duration {
        (self.expires_at() - now).to_std().unwrap_or_default()
    }

    /// Check if the access token has expired as of `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    /// The `preferred_username` claim of the access token.
    pub fn username(&self) -> Option<&str> {
        self.access_token.claim_str("preferred_username")
    }
}

// Lifetimes are capped so date arithmetic cannot overflow.
fn seconds(secs: u64) -> Duration {
    Duration::seconds(secs.min(u64::from(u32::MAX)) as i64)
}
