//! # loopauth-provider
//!
//! Everything that talks to the identity provider:
//!
//! - [`ProviderConfiguration`]: endpoints from the discovery document
//! - [`TokenEndpoint`]: authorization-code and refresh-token grants
//! - [`RedirectListener`]: single-use loopback receiver for the login redirect
//!
//! Note: This crate does NOT store tokens. Persisting them is the job of
//! `loopauth-store`, and deciding when to refresh is the job of
//! `loopauth-client`.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod discovery;
pub mod redirect;
pub mod token;

pub use discovery::ProviderConfiguration;
pub use redirect::{ListenerState, RedirectListener};
pub use token::{end_session, TokenEndpoint};
