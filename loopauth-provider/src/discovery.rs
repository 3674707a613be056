//! Provider discovery via `.well-known/openid-configuration`.

use loopauth_core::{AuthError, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// Endpoints of an OIDC provider, as published in its discovery document.
///
/// Only obtainable through [`ProviderConfiguration::fetch`] or deserialization,
/// both of which require every endpoint to be an absolute URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfiguration {
    /// Issuer identifier.
    pub issuer: Url,
    /// Where the browser is sent to log in.
    pub authorization_endpoint: Url,
    /// Code and refresh-token exchange.
    pub token_endpoint: Url,
    /// RP-initiated logout.
    pub end_session_endpoint: Url,
    /// Token introspection.
    pub introspection_endpoint: Url,
    /// User claims.
    pub userinfo_endpoint: Url,
}

impl ProviderConfiguration {
    /// Fetch and validate the discovery document.
    ///
    /// Performs a single GET with no retry.
    pub async fn fetch(http: &reqwest::Client, url: &Url) -> Result<Self> {
        tracing::debug!(url = %url, "Fetching discovery document");

        let response = http
            .get(url.clone())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| AuthError::discovery(url.as_str(), e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::discovery(url.as_str(), e.to_string()))?;

        if !status.is_success() {
            return Err(AuthError::discovery(
                url.as_str(),
                format!("HTTP {}: {}", status.as_u16(), body),
            ));
        }

        Self::from_json(&body).map_err(|e| AuthError::discovery(url.as_str(), e.to_string()))
    }

    /// Parse a discovery document.
    pub fn from_json(document: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(document)
    }

    /// Build the URL the user opens to log in.
    pub fn authorization_url(&self, client_id: &str, redirect_uri: &str) -> Url {
        let mut url = self.authorization_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("client_id", client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", redirect_uri);
        url
    }

    /// Build the end-session URL for RP-initiated logout.
    pub fn end_session_url(&self, id_token_hint: &str, client_id: &str) -> Url {
        let mut url = self.end_session_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("id_token_hint", id_token_hint)
            .append_pair("client_id", client_id);
        url
    }
}
