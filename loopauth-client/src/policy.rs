//! When to exchange the refresh token.

use chrono::{DateTime, Utc};
use loopauth_core::{AuthError, Result, UserCredentials};

/// Refresh once more than `threshold` of the access token lifetime has elapsed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefreshPolicy {
    threshold: f64,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            threshold: Self::DEFAULT_THRESHOLD,
        }
    }
}

impl RefreshPolicy {
    /// Refresh after half the lifetime.
    pub const DEFAULT_THRESHOLD: f64 = 0.5;

    /// Create a policy. `threshold` must lie in `[0, 1]`.
    pub fn new(threshold: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(AuthError::Configuration(format!(
                "refresh threshold must be within [0, 1], got {threshold}"
            )));
        }
        Ok(Self { threshold })
    }

    /// Configured threshold.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Fraction of the access token lifetime elapsed as of `now`.
    ///
    /// A zero lifetime counts as fully elapsed.
    pub fn fraction_elapsed(credentials: &UserCredentials, now: DateTime<Utc>) -> f64 {
        if credentials.access_token_expiration == 0 {
            return f64::INFINITY;
        }
        credentials.elapsed(now) / credentials.access_token_expiration as f64
    }

    /// Check if a refresh exchange should happen as of `now`.
    pub fn is_due(&self, credentials: &UserCredentials, now: DateTime<Utc>) -> bool {
        Self::fraction_elapsed(credentials, now) > self.threshold
    }
}
