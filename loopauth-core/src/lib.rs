//! # loopauth-core
//!
//! Core types, token decoding, and error handling for the loopauth OIDC client.
//!
//! - **Errors**: [`AuthError`], one variant per credential lifecycle failure
//! - **JWT**: [`Jwt`], an unverified compact token decoder
//! - **Credentials**: [`TokenResponse`] and [`UserCredentials`]
//! - **Configuration**: [`ClientConfig`] with environment and file loading
//!
//! ## Example
//!
//! ```rust
//! use loopauth_core::{ClientConfig, Jwt};
//!
//! let config = ClientConfig::new("https://idp.example/realms/dev/", "my-cli");
//! assert!(config.validate().is_ok());
//!
//! let jwt = Jwt::decode("eyJhbGciOiJub25lIn0.eyJzdWIiOiJhbGljZSJ9.").unwrap();
//! assert_eq!(jwt.claim_str("sub"), Some("alice"));
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod credentials;
pub mod errors;
pub mod jwt;

pub use config::ClientConfig;
pub use credentials::{TokenResponse, UserCredentials};
pub use errors::{AuthError, Result};
pub use jwt::Jwt;
