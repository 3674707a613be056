//! Client configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::{AuthError, Result};

/// Path suffix of the OIDC discovery document.
pub const WELL_KNOWN_PATH: &str = ".well-known/openid-configuration";

/// Default credential file name.
pub const DEFAULT_CREDENTIAL_PATH: &str = "oidc_credentials.json";

/// Environment variable holding the discovery URL.
pub const ENV_DISCOVERY_URL: &str = "OIDC_DISCOVERY_URL";
/// Environment variable holding the client id.
pub const ENV_CLIENT_ID: &str = "OIDC_CLIENT_ID";
/// Environment variable holding the credential file path.
pub const ENV_CREDENTIAL_PATH: &str = "OIDC_CREDENTIAL_PATH";

/// Configuration for an OIDC public client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Discovery document URL, or the issuer base URL ending in `/`.
    #[serde(alias = "provider_wk_url")]
    pub discovery_url: String,
    /// Public client identifier.
    pub client_id: String,
    /// Where credentials are persisted.
    #[serde(default = "default_credential_path", alias = "credential_output")]
    pub credential_path: PathBuf,
}

fn default_credential_path() -> PathBuf {
    PathBuf::from(DEFAULT_CREDENTIAL_PATH)
}

impl ClientConfig {
    /// Create a new client configuration.
    pub fn new(discovery_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            discovery_url: discovery_url.into(),
            client_id: client_id.into(),
            credential_path: default_credential_path(),
        }
    }

    /// Set the credential file path.
    #[must_use]
    pub fn with_credential_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.credential_path = path.into();
        self
    }

    /// Load and validate configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load and validate configuration from a key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let require = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| AuthError::Configuration(format!("{key} is not set")))
        };

        let mut config = Self::new(require(ENV_DISCOVERY_URL)?, require(ENV_CLIENT_ID)?);
        if let Some(path) = lookup(ENV_CREDENTIAL_PATH).filter(|v| !v.is_empty()) {
            config.credential_path = PathBuf::from(path);
        }
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents).map_err(|e| {
            AuthError::Configuration(format!("{}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration invariants.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(AuthError::Configuration("client_id is empty".to_string()));
        }
        if self.credential_path.as_os_str().is_empty() {
            return Err(AuthError::Configuration("credential_path is empty".to_string()));
        }
        if self
            .credential_path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("lock"))
        {
            return Err(AuthError::Configuration(format!(
                "credential_path {} collides with its lock file",
                self.credential_path.display()
            )));
        }
        self.well_known_url().map(|_| ())
    }

    /// Resolve the discovery document URL.
    ///
    /// An issuer base URL must end in `/` so that joining the well-known path
    /// keeps its last segment (for example a Keycloak realm).
    pub fn well_known_url(&self) -> Result<Url> {
        let url = Url::parse(&self.discovery_url).map_err(|e| {
            AuthError::Configuration(format!("invalid discovery URL {:?}: {e}", self.discovery_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AuthError::Configuration(format!(
                "discovery URL must be http(s): {}",
                self.discovery_url
            )));
        }

        let path = url.path().trim_end_matches('/');
        if path.ends_with(WELL_KNOWN_PATH) {
            return Ok(url);
        }
        if !url.path().ends_with('/') {
            return Err(AuthError::Configuration(format!(
                "issuer URL must end with '/': {}",
                self.discovery_url
            )));
        }
        url.join(WELL_KNOWN_PATH)
            .map_err(|e| AuthError::Configuration(format!("cannot join discovery path: {e}")))
    }
}
