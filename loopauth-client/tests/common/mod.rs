//! Mock identity provider and fixtures shared by the client tests.

#![allow(dead_code)]

use std::io;
use std::path::Path;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use loopauth_client::{NoBrowser, OidcClient};
use loopauth_core::{ClientConfig, TokenResponse, UserCredentials};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Build an unsigned compact JWT carrying `claims`.
pub fn jwt(claims: Value) -> String {
    format!(
        "{}.{}.c2lnbmF0dXJl",
        URL_SAFE_NO_PAD.encode(json!({"alg": "RS256", "typ": "JWT"}).to_string()),
        URL_SAFE_NO_PAD.encode(claims.to_string())
    )
}

/// Token endpoint response for `user`, tagged with `generation` so successive
/// responses are distinguishable.
pub fn token_response(user: &str, generation: u32) -> Value {
    json!({
        "access_token": jwt(json!({"preferred_username": user, "gen": generation})),
        "refresh_token": jwt(json!({"typ": "Refresh", "gen": generation})),
        "expires_in": 300,
        "refresh_expires_in": 1800,
        "scope": "openid profile",
        "token_type": "Bearer"
    })
}

/// Start a mock provider serving a discovery document.
pub async fn mock_idp() -> MockServer {
    let server = MockServer::start().await;
    let base = server.uri();
    Mock::given(method("GET"))
        .and(path("/realms/dev/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": format!("{base}/realms/dev"),
            "authorization_endpoint": format!("{base}/realms/dev/auth"),
            "token_endpoint": format!("{base}/realms/dev/token"),
            "end_session_endpoint": format!("{base}/realms/dev/logout"),
            "introspection_endpoint": format!("{base}/realms/dev/introspect"),
            "userinfo_endpoint": format!("{base}/realms/dev/userinfo"),
        })))
        .mount(&server)
        .await;
    server
}

/// Client configuration pointing at `server` and storing under `dir`.
pub fn config(server: &MockServer, dir: &Path) -> ClientConfig {
    ClientConfig::new(format!("{}/realms/dev/", server.uri()), "cli")
        .with_credential_path(dir.join("oidc_credentials.json"))
}

/// Write credentials acquired `elapsed_secs` ago with a `lifetime` second access token.
pub fn seed_credentials(path: &Path, elapsed_secs: i64, lifetime: u64) -> UserCredentials {
    let response: TokenResponse = serde_json::from_value(token_response("alice", 0)).unwrap();
    let mut credentials =
        UserCredentials::from_response(&response, Utc::now() - Duration::seconds(elapsed_secs))
            .unwrap();
    credentials.access_token_expiration = lifetime;
    std::fs::write(path, serde_json::to_string_pretty(&credentials).unwrap()).unwrap();
    credentials
}

/// Build a client that never opens a browser.
pub async fn headless_client(server: &MockServer, dir: &Path) -> OidcClient {
    OidcClient::builder(config(server, dir))
        .browser(NoBrowser)
        .build()
        .await
        .unwrap()
}

/// Completed browser redirects: status and body of the listener's reply.
pub type Redirects = Arc<Mutex<Vec<JoinHandle<(u16, String)>>>>;

/// A browser that follows the authorization URL straight back to the
/// redirect URI with `code`, as a provider would after a successful login.
pub fn redirecting_browser(
    code: &'static str,
) -> (impl Fn(&str) -> io::Result<()> + Send + Sync + 'static, Redirects) {
    let redirects: Redirects = Arc::default();
    let handles = Arc::clone(&redirects);

    let browser = move |auth_url: &str| -> io::Result<()> {
        let auth_url = Url::parse(auth_url).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let redirect_uri = auth_url
            .query_pairs()
            .find(|(k, _)| k == "redirect_uri")
            .map(|(_, v)| v.into_owned())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no redirect_uri"))?;

        let target = format!("{redirect_uri}/?code={code}&session_state=xyz");
        handles.lock().push(tokio::spawn(async move {
            let response = reqwest::get(target).await.unwrap();
            let status = response.status().as_u16();
            (status, response.text().await.unwrap())
        }));
        Ok(())
    };
    (browser, redirects)
}

/// Await the single redirect the browser performed.
pub async fn single_redirect(redirects: &Redirects) -> (u16, String) {
    let handle = {
        let mut handles = redirects.lock();
        assert_eq!(handles.len(), 1, "expected exactly one redirect");
        handles.remove(0)
    };
    handle.await.unwrap()
}
