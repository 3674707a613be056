//! Error types for loopauth.
//!
//! Every public operation in the workspace fails with one [`AuthError`]
//! variant. The variants map one-to-one onto the failure kinds of the
//! credential lifecycle: discovery, token decoding, the login redirect,
//! refresh, lock contention and persisted-state corruption.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The main error type for loopauth operations.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Provider metadata is unreachable or malformed.
    #[error("Discovery failed for {url}: {reason}")]
    Discovery {
        /// Discovery document URL.
        url: String,
        /// What went wrong.
        reason: String,
    },

    /// A compact JWT could not be decoded.
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// The browser redirect carried no `code` query parameter.
    #[error("Authorization code missing from redirect request: {request}")]
    AuthorizationCodeMissing {
        /// Raw inbound request, for diagnosis.
        request: String,
    },

    /// The authorization-code exchange was rejected or unreachable.
    #[error("Token exchange failed{}: {body}", fmt_status(.status))]
    TokenExchange {
        /// HTTP status, when a response was received.
        status: Option<u16>,
        /// Response body or transport error text.
        body: String,
    },

    /// The refresh-token exchange failed.
    #[error("Token refresh failed{}: {body}", fmt_status(.status))]
    Refresh {
        /// HTTP status, when a response was received.
        status: Option<u16>,
        /// Response body or transport error text.
        body: String,
        /// The provider rejected the refresh token itself.
        session_expired: bool,
    },

    /// The credential lock could not be acquired in time.
    #[error("Timed out after {waited:?} waiting for lock {}", .path.display())]
    LockTimeout {
        /// Lock file path.
        path: PathBuf,
        /// Total time spent waiting.
        waited: Duration,
    },

    /// The lock file is owned by someone else.
    #[error("Lock {} is not owned by this process (expected {expected:?}, found {found:?})", .path.display())]
    LockOwnership {
        /// Lock file path.
        path: PathBuf,
        /// Owner record written on acquisition.
        expected: String,
        /// Owner record found on release.
        found: String,
    },

    /// The persisted credential file cannot be deserialized.
    #[error("Corrupt credentials in {}: {reason}", .path.display())]
    CorruptCredentials {
        /// Credential file path.
        path: PathBuf,
        /// Parse failure.
        reason: String,
    },

    /// A single-use redirect listener was used twice.
    #[error("Redirect listener already closed")]
    AlreadyClosed,

    /// `login` called while credentials are present.
    #[error("User already logged in")]
    AlreadyLoggedIn,

    /// An operation that needs credentials found none.
    #[error("User not logged in")]
    NotLoggedIn,

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

/// Result type alias using AuthError.
pub type Result<T> = std::result::Result<T, AuthError>;

impl AuthError {
    /// Create a discovery error.
    pub fn discovery(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Discovery {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Create a token exchange error.
    pub fn token_exchange(status: Option<u16>, body: impl Into<String>) -> Self {
        Self::TokenExchange {
            status,
            body: body.into(),
        }
    }

    /// Create a refresh error.
    ///
    /// The session is considered expired when the provider answers with the
    /// OAuth `invalid_grant` error code on a 400 or 401.
    pub fn refresh(status: Option<u16>, body: impl Into<String>) -> Self {
        let body = body.into();
        let session_expired = matches!(status, Some(400) | Some(401))
            && oauth_error_code(&body).as_deref() == Some("invalid_grant");
        Self::Refresh {
            status,
            body,
            session_expired,
        }
    }

    /// Create a corrupt credentials error.
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptCredentials {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Check if this is a lock contention or protocol failure.
    pub fn is_lock_error(&self) -> bool {
        matches!(self, Self::LockTimeout { .. } | Self::LockOwnership { .. })
    }

    /// Check if this error comes from the interactive login flow.
    pub fn is_login_error(&self) -> bool {
        matches!(
            self,
            Self::AuthorizationCodeMissing { .. } | Self::TokenExchange { .. } | Self::AlreadyClosed
        )
    }

    /// Check if the caller has to run a fresh login to recover.
    pub fn requires_login(&self) -> bool {
        match self {
            Self::CorruptCredentials { .. } | Self::NotLoggedIn => true,
            Self::Refresh {
                session_expired, ..
            } => *session_expired,
            _ => false,
        }
    }

    /// Get the HTTP status if this error carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::TokenExchange { status, .. } | Self::Refresh { status, .. } => *status,
            _ => None,
        }
    }
}

/// Extract the `error` field of an OAuth error response body.
fn oauth_error_code(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value.get("error")?.as_str().map(str::to_owned)
}
