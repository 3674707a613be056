//! # loopauth
//!
//! OIDC Authorization Code login for native and command-line applications.
//!
//! A user logs in once through their browser; the resulting tokens are stored
//! in a JSON file shared by every process of that user and refreshed as they
//! age.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use loopauth::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ClientConfig::from_env()?;
//!     let client = OidcClient::new(config).await?;
//!
//!     if !client.is_logged() {
//!         client.login().await?;
//!     }
//!     let user = client.current_user().await?;
//!     println!("{:?} until {}", user.username(), user.expires_at());
//!     Ok(())
//! }
//! ```
//!
//! ## Crates
//!
//! | Crate | Contents |
//! |-------|----------|
//! | [`core`] | errors, JWT decoding, credentials, configuration |
//! | [`provider`] | discovery, token endpoint, loopback redirect listener |
//! | [`store`] | credential file and its advisory lock |
//! | [`client`] | the client, refresh policy, background refresh |
//!
//! ## Background Refresh
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use loopauth::prelude::*;
//!
//! # async fn example(client: OidcClient) {
//! let auto = AutoRefresh::spawn(Arc::new(client));
//! let mut tokens = auto.subscribe();
//! while tokens.changed().await.is_ok() {
//!     let _bearer = tokens.borrow().clone();
//! }
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

/// Errors, JWT decoding, credentials and configuration.
pub use loopauth_core as core;

/// Provider discovery, token endpoint and redirect listener.
pub use loopauth_provider as provider;

/// Credential persistence.
pub use loopauth_store as store;

/// The OIDC client.
pub use loopauth_client as client;

pub use loopauth_client::{
    AutoRefresh, AutoRefreshOptions, BrowserLauncher, NoBrowser, OidcClient, OidcClientBuilder,
    RefreshOutcome, RefreshPolicy, SystemBrowser,
};
pub use loopauth_core::{AuthError, ClientConfig, Jwt, Result, TokenResponse, UserCredentials};
pub use loopauth_provider::ProviderConfiguration;
pub use loopauth_store::CredentialStore;

/// Everything needed to log in and use tokens.
pub mod prelude {
    pub use crate::client::{
        AutoRefresh, AutoRefreshOptions, BrowserLauncher, OidcClient, OidcClientBuilder,
        RefreshOutcome,
    };
    pub use crate::core::{AuthError, ClientConfig, Result, UserCredentials};
}
