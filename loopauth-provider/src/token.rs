//! Token endpoint requests.
//!
//! Both grants post `application/x-www-form-urlencoded` bodies and expect a
//! JSON [`TokenResponse`]. Neither call retries; the caller owns retry policy.

use loopauth_core::{AuthError, Result, TokenResponse};
use url::Url;

/// Failure of a single token endpoint call, before it is mapped to a grant-specific error.
struct EndpointFailure {
    status: Option<u16>,
    body: String,
}

/// Client for a provider's token endpoint.
#[derive(Debug, Clone)]
pub struct TokenEndpoint {
    http: reqwest::Client,
    url: Url,
    client_id: String,
}

impl TokenEndpoint {
    /// Create a token endpoint client for a public client.
    pub fn new(http: reqwest::Client, url: Url, client_id: impl Into<String>) -> Self {
        Self {
            http,
            url,
            client_id: client_id.into(),
        }
    }

    /// Endpoint URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Client identifier sent with every request.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenResponse> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", redirect_uri),
        ];

        self.post_form(&params)
            .await
            .map_err(|f| AuthError::token_exchange(f.status, f.body))
    }

    /// Exchange a refresh token for a new token set.
    pub async fn refresh(&self, refresh_token: &str, scope: &str) -> Result<TokenResponse> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
            ("scope", scope),
        ];

        self.post_form(&params)
            .await
            .map_err(|f| AuthError::refresh(f.status, f.body))
    }

    async fn post_form(
        &self,
        params: &[(&str, &str)],
    ) -> std::result::Result<TokenResponse, EndpointFailure> {
        let transport = |e: reqwest::Error| EndpointFailure {
            status: None,
            body: e.to_string(),
        };

        let response = self
            .http
            .post(self.url.clone())
            .header("Accept", "application/json")
            .form(params)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        let body = response.text().await.map_err(transport)?;

        if !status.is_success() {
            return Err(EndpointFailure {
                status: Some(status.as_u16()),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| EndpointFailure {
            status: Some(status.as_u16()),
            body: format!("invalid token response ({e}): {body}"),
        })
    }
}

/// Notify the provider that the session ended.
///
/// Returns the transport or status error so the caller can decide whether it
/// matters; logout treats it as best effort. The error never carries the URL,
/// since its query holds the token hint.
pub async fn end_session(http: &reqwest::Client, url: Url) -> std::result::Result<(), reqwest::Error> {
    http.get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(reqwest::Error::without_url)?;
    Ok(())
}
