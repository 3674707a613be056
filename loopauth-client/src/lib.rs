//! # loopauth-client
//!
//! The credential lifecycle of an OIDC public client on a user's machine.
//!
//! [`OidcClient`] discovers the provider, restores stored credentials, runs
//! the browser login through a loopback redirect, refreshes according to a
//! [`RefreshPolicy`] and logs out. [`AutoRefresh`] keeps a client fresh from a
//! background task.
//!
//! ## Example
//!
//! ```rust,no_run
//! use loopauth_client::OidcClient;
//! use loopauth_core::ClientConfig;
//!
//! # async fn example() -> loopauth_core::Result<()> {
//! let config = ClientConfig::new("https://idp.example/realms/dev/", "my-cli");
//! let client = OidcClient::builder(config)
//!     .refresh_threshold(0.75)
//!     .build()
//!     .await?;
//!
//! if !client.is_logged() {
//!     client.login().await?;
//! }
//! let token = client.access_token().await?;
//! # let _ = token;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod auto_refresh;
pub mod browser;
pub mod client;
pub mod policy;

pub use auto_refresh::{AutoRefresh, AutoRefreshOptions};
pub use browser::{BrowserLauncher, NoBrowser, SystemBrowser};
pub use client::{OidcClient, OidcClientBuilder, RefreshOutcome};
pub use policy::RefreshPolicy;
