//! Transport security material for the Tandem server
//!
//! Provides:
//! - Certificate and private key loading from PEM files
//! - Intermediate certificate chains
//! - [`Credentials`] wrapping a ready `rustls` server configuration
//! - Named Diffie-Hellman groups ([`DhParams`])
//!
//! Credentials are immutable; a configuration reload builds new ones and
//! swaps them onto the listeners.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod credentials;
pub mod dh;
pub mod loader;

pub use credentials::{offered_groups, Credentials};
pub use dh::DhParams;
pub use loader::{load_certificates, load_private_key};
