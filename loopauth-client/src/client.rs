//! The OIDC client: login, refresh, logout.
//!
//! [`OidcClient`] owns the credential lifecycle for one public client. Every
//! state change runs inside one critical section ("check policy, maybe
//! exchange, persist, update memory") so a background refresher and a
//! foreground caller never interleave. Across processes the credential file's
//! lock does the same job.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use loopauth_core::{AuthError, ClientConfig, Result, UserCredentials};
use loopauth_provider::redirect::DEFAULT_READ_TIMEOUT;
use loopauth_provider::{end_session, ProviderConfiguration, RedirectListener, TokenEndpoint};
use loopauth_store::{CredentialStore, LockOptions};
use parking_lot::RwLock;
use tokio::sync::Mutex;

use crate::browser::{BrowserLauncher, SystemBrowser};
use crate::policy::RefreshPolicy;

/// Default lock acquisition timeout.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Default interface for the redirect listener.
pub const DEFAULT_LISTENER_HOST: &str = "127.0.0.1";

/// What a call to [`OidcClient::refresh`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Not due yet; no network call.
    Skipped,
    /// The refresh token was exchanged for a new token set.
    Refreshed,
    /// There were no credentials, so an interactive login ran instead.
    LoggedIn,
}

/// Builder for [`OidcClient`].
pub struct OidcClientBuilder {
    config: ClientConfig,
    refresh_threshold: f64,
    lock_timeout: Duration,
    listener_host: String,
    listener_read_timeout: Duration,
    http: Option<reqwest::Client>,
    browser: Arc<dyn BrowserLauncher>,
}

impl OidcClientBuilder {
    /// Create a builder with default tuning.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            refresh_threshold: RefreshPolicy::DEFAULT_THRESHOLD,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            listener_host: DEFAULT_LISTENER_HOST.to_string(),
            listener_read_timeout: DEFAULT_READ_TIMEOUT,
            http: None,
            browser: Arc::new(SystemBrowser),
        }
    }

    /// Fraction of the access token lifetime after which a refresh happens.
    #[must_use]
    pub fn refresh_threshold(mut self, threshold: f64) -> Self {
        self.refresh_threshold = threshold;
        self
    }

    /// Credential lock acquisition timeout.
    #[must_use]
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Interface the redirect listener binds.
    #[must_use]
    pub fn listener_host(mut self, host: impl Into<String>) -> Self {
        self.listener_host = host.into();
        self
    }

    /// Per-read timeout while draining the redirect request.
    #[must_use]
    pub fn listener_read_timeout(mut self, timeout: Duration) -> Self {
        self.listener_read_timeout = timeout;
        self
    }

    /// HTTP client for discovery and token requests.
    #[must_use]
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// How the authorization URL is opened.
    #[must_use]
    pub fn browser(mut self, browser: impl BrowserLauncher + 'static) -> Self {
        self.browser = Arc::new(browser);
        self
    }

    /// Fetch provider metadata and restore any persisted session.
    ///
    /// Fails with [`AuthError::Discovery`] when the provider is unreachable.
    /// An unreadable credential file is logged and the client starts logged
    /// out. A failed startup refresh is logged and the stored credentials stay
    /// in use.
    pub async fn build(self) -> Result<OidcClient> {
        self.config.validate()?;
        let policy = RefreshPolicy::new(self.refresh_threshold)?;
        let http = self.http.unwrap_or_default();

        let provider = ProviderConfiguration::fetch(&http, &self.config.well_known_url()?).await?;
        let endpoint = TokenEndpoint::new(
            http.clone(),
            provider.token_endpoint.clone(),
            self.config.client_id.clone(),
        );
        let store = CredentialStore::new(self.config.credential_path.clone())
            .with_lock_options(LockOptions::new().timeout(self.lock_timeout));

        let client = OidcClient {
            config: self.config,
            provider,
            endpoint,
            http,
            store,
            policy,
            browser: self.browser,
            listener_host: self.listener_host,
            listener_read_timeout: self.listener_read_timeout,
            session: Mutex::new(()),
            credentials: RwLock::new(None),
        };
        client.restore().await?;
        Ok(client)
    }
}

impl fmt::Debug for OidcClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OidcClientBuilder")
            .field("config", &self.config)
            .field("refresh_threshold", &self.refresh_threshold)
            .field("lock_timeout", &self.lock_timeout)
            .field("listener_host", &self.listener_host)
            .finish_non_exhaustive()
    }
}

/// OIDC authorization-code client with persisted, self-refreshing credentials.
pub struct OidcClient {
    config: ClientConfig,
    provider: ProviderConfiguration,
    endpoint: TokenEndpoint,
    http: reqwest::Client,
    store: CredentialStore,
    policy: RefreshPolicy,
    browser: Arc<dyn BrowserLauncher>,
    listener_host: String,
    listener_read_timeout: Duration,
    // Held across every state transition.
    session: Mutex<()>,
    // Written only while `session` is held.
    credentials: RwLock<Option<UserCredentials>>,
}

impl OidcClient {
    /// Start building a client.
    pub fn builder(config: ClientConfig) -> OidcClientBuilder {
        OidcClientBuilder::new(config)
    }

    /// Build a client with default tuning.
    pub async fn new(config: ClientConfig) -> Result<Self> {
        OidcClientBuilder::new(config).build().await
    }

    /// Client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Provider endpoints from discovery.
    pub fn provider(&self) -> &ProviderConfiguration {
        &self.provider
    }

    /// Credential store backing this client.
    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Refresh policy in effect.
    pub fn policy(&self) -> RefreshPolicy {
        self.policy
    }

    /// Check if credentials are held.
    pub fn is_logged(&self) -> bool {
        self.credentials.read().is_some()
    }

    /// Current credentials without any refresh check.
    pub fn snapshot(&self) -> Option<UserCredentials> {
        self.credentials.read().clone()
    }

    /// Run the interactive authorization-code login.
    ///
    /// Fails with [`AuthError::AlreadyLoggedIn`] when credentials are held.
    /// The future resolves only after the browser redirect arrives.
    pub async fn login(&self) -> Result<UserCredentials> {
        let _session = self.session.lock().await;
        if self.is_logged() {
            return Err(AuthError::AlreadyLoggedIn);
        }
        self.login_locked().await
    }

    /// Apply the refresh policy.
    ///
    /// When logged out this starts an interactive login instead. A failed
    /// exchange leaves the current credentials in place, unless the provider
    /// rejected the refresh token itself: then the session is cleared and the
    /// error reports `session_expired`.
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        let _session = self.session.lock().await;
        self.refresh_locked().await
    }

    /// End the session.
    ///
    /// The provider is notified on a best-effort basis. Logging out while
    /// logged out does nothing.
    pub async fn logout(&self) -> Result<()> {
        let _session = self.session.lock().await;
        let Some(current) = self.snapshot() else {
            tracing::debug!("Logout requested while logged out");
            return Ok(());
        };

        let url = self
            .provider
            .end_session_url(&current.access_token.encoded, &self.config.client_id);
        if let Err(e) = end_session(&self.http, url).await {
            tracing::warn!(error = %e, "End-session notification failed; logging out locally");
        }

        self.store.remove().await?;
        *self.credentials.write() = None;
        tracing::info!(user = current.username().unwrap_or("unknown"), "Logged out");
        Ok(())
    }

    /// Refresh if due, then return the current credentials.
    ///
    /// Fails with [`AuthError::NotLoggedIn`] rather than starting a login.
    pub async fn current_user(&self) -> Result<UserCredentials> {
        let _session = self.session.lock().await;
        if !self.is_logged() {
            return Err(AuthError::NotLoggedIn);
        }
        self.refresh_locked().await?;
        self.snapshot().ok_or(AuthError::NotLoggedIn)
    }

    /// Encoded access token, refreshed if due.
    pub async fn access_token(&self) -> Result<String> {
        Ok(self.current_user().await?.access_token.encoded)
    }

    async fn restore(&self) -> Result<()> {
        if !self.store.exists() {
            tracing::debug!(path = %self.store.path().display(), "No stored credentials");
            return Ok(());
        }

        let _session = self.session.lock().await;
        match self.store.load().await {
            Ok(credentials) => {
                tracing::info!(
                    user = credentials.username().unwrap_or("unknown"),
                    "Restored stored credentials"
                );
                *self.credentials.write() = Some(credentials);
            }
            Err(e @ AuthError::CorruptCredentials { .. }) => {
                tracing::warn!(error = %e, "Ignoring unreadable credential file");
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        match self.refresh_locked().await {
            Ok(_) => Ok(()),
            Err(e @ AuthError::Refresh { .. }) => {
                tracing::warn!(error = %e, "Startup refresh failed");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn login_locked(&self) -> Result<UserCredentials> {
        let mut listener = RedirectListener::bind(&self.listener_host, self.endpoint.clone())
            .await?
            .with_read_timeout(self.listener_read_timeout);

        let auth_url = self
            .provider
            .authorization_url(&self.config.client_id, listener.url());
        tracing::info!(url = %auth_url, "Open this URL in a browser to log in");
        if let Err(e) = self.browser.open(auth_url.as_str()) {
            tracing::warn!(error = %e, "Could not open a browser");
        }

        let response = listener.read_token().await?;
        let credentials = UserCredentials::from_response(&response, Utc::now())?;
        self.store.save(&credentials).await?;
        *self.credentials.write() = Some(credentials.clone());

        tracing::info!(
            user = credentials.username().unwrap_or("unknown"),
            expires_in = credentials.access_token_expiration,
            "Logged in"
        );
        Ok(credentials)
    }

    async fn refresh_locked(&self) -> Result<RefreshOutcome> {
        let Some(current) = self.snapshot() else {
            tracing::info!("Not logged in; starting login");
            self.login_locked().await?;
            return Ok(RefreshOutcome::LoggedIn);
        };

        let now = Utc::now();
        if !self.policy.is_due(&current, now) {
            tracing::debug!(
                elapsed = RefreshPolicy::fraction_elapsed(&current, now),
                threshold = self.policy.threshold(),
                "Refresh not due"
            );
            return Ok(RefreshOutcome::Skipped);
        }

        match self
            .endpoint
            .refresh(&current.refresh_token.encoded, &current.scope)
            .await
        {
            Ok(response) => {
                let credentials = UserCredentials::from_response(&response, Utc::now())?;
                self.store.save(&credentials).await?;
                tracing::info!(
                    expires_in = credentials.access_token_expiration,
                    "Access token refreshed"
                );
                *self.credentials.write() = Some(credentials);
                Ok(RefreshOutcome::Refreshed)
            }
            Err(e @ AuthError::Refresh { session_expired: true, .. }) => {
                // Another participant may have rotated the token since we read it.
                match self
                    .store
                    .remove_if_refresh_token(&current.refresh_token.encoded)
                    .await
                {
                    Ok(Some(stored)) => {
                        tracing::info!(
                            expires_in = stored.access_token_expiration,
                            "Refresh token was rotated by another client; adopting stored credentials"
                        );
                        *self.credentials.write() = Some(stored);
                        Ok(RefreshOutcome::Refreshed)
                    }
                    Ok(None) => {
                        tracing::warn!(error = %e, "Refresh token rejected; session expired");
                        *self.credentials.write() = None;
                        Err(e)
                    }
                    Err(remove) => {
                        tracing::warn!(
                            error = %e,
                            remove_error = %remove,
                            "Refresh token rejected but expired credentials could not be removed"
                        );
                        Err(remove)
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Refresh failed; keeping current credentials");
                Err(e)
            }
        }
    }
}

impl fmt::Debug for OidcClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OidcClient")
            .field("config", &self.config)
            .field("provider", &self.provider.issuer.as_str())
            .field("policy", &self.policy)
            .field("logged_in", &self.is_logged())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn provider(server: &MockServer) {
        let base = server.uri();
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": base,
                "authorization_endpoint": format!("{base}/auth"),
                "token_endpoint": format!("{base}/token"),
                "end_session_endpoint": format!("{base}/logout"),
                "introspection_endpoint": format!("{base}/introspect"),
                "userinfo_endpoint": format!("{base}/userinfo"),
            })))
            .mount(server)
            .await;
    }

    fn config(server: &MockServer, dir: &tempfile::TempDir) -> ClientConfig {
        ClientConfig::new(format!("{}/", server.uri()), "cli")
            .with_credential_path(dir.path().join("creds.json"))
    }

    #[tokio::test]
    async fn test_build_logged_out() {
        let server = MockServer::start().await;
        provider(&server).await;
        let dir = tempfile::tempdir().unwrap();

        let client = OidcClient::builder(config(&server, &dir))
            .browser(crate::browser::NoBrowser)
            .build()
            .await
            .unwrap();
        assert!(!client.is_logged());
        assert!(client.snapshot().is_none());
        assert_eq!(client.provider().token_endpoint.path(), "/token");
    }

    #[tokio::test]
    async fn test_build_discovery_failure() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        let err = OidcClient::new(config(&server, &dir)).await.unwrap_err();
        assert!(matches!(err, AuthError::Discovery { .. }));
    }

    #[tokio::test]
    async fn test_build_rejects_threshold() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        let err = OidcClient::builder(config(&server, &dir))
            .refresh_threshold(1.5)
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_logged_out() {
        let server = MockServer::start().await;
        provider(&server).await;
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("creds.json"), "not json").unwrap();

        let client = OidcClient::new(config(&server, &dir)).await.unwrap();
        assert!(!client.is_logged());
    }

    #[tokio::test]
    async fn test_current_user_requires_login() {
        let server = MockServer::start().await;
        provider(&server).await;
        let dir = tempfile::tempdir().unwrap();

        let client = OidcClient::new(config(&server, &dir)).await.unwrap();
        assert!(matches!(client.current_user().await, Err(AuthError::NotLoggedIn)));
        assert!(matches!(client.access_token().await, Err(AuthError::NotLoggedIn)));
    }

    #[tokio::test]
    async fn test_logout_when_logged_out_is_noop() {
        let server = MockServer::start().await;
        provider(&server).await;
        Mock::given(path("/logout"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();

        let client = OidcClient::new(config(&server, &dir)).await.unwrap();
        client.logout().await.unwrap();
        assert!(!client.is_logged());
    }
}
