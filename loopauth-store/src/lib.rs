//! # loopauth-store
//!
//! Credential persistence for loopauth.
//!
//! [`CredentialStore`] keeps one [`UserCredentials`](loopauth_core::UserCredentials)
//! record as a JSON file and guards every access with a [`LockGuard`], so
//! several processes sharing the file never interleave their writes.
//!
//! ## Example
//!
//! ```rust,no_run
//! use loopauth_store::{CredentialStore, LockOptions};
//! use std::time::Duration;
//!
//! # async fn example() -> loopauth_core::Result<()> {
//! let store = CredentialStore::new("oidc_credentials.json")
//!     .with_lock_options(LockOptions::new().timeout(Duration::from_secs(5)));
//!
//! if store.exists() {
//!     let credentials = store.load().await?;
//!     println!("{:?}", credentials.username());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod lock;
pub mod store;

pub use lock::{lock_path, LockGuard, LockOptions};
pub use store::CredentialStore;
