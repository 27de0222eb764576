//! # Tandem Core
//!
//! Core types shared by every Tandem crate:
//! - Connection and session handles tracked by the directory
//! - The [`Directory`] abstraction and an in-memory implementation
//! - Authentication context and security policy
//! - Error types

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod connection;
pub mod directory;
pub mod error;
pub mod session;
pub mod types;

pub use connection::{AuthContext, AuthState, Connection};
pub use directory::{Directory, InMemoryDirectory};
pub use error::{Error, Result};
pub use session::{Session, SessionKind};
pub use types::{AddressFamily, ConnectionId, SecurityPolicy, SessionId};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::connection::{AuthContext, AuthState, Connection};
    pub use crate::directory::{Directory, InMemoryDirectory};
    pub use crate::error::{Error, Result};
    pub use crate::session::{Session, SessionKind};
    pub use crate::types::*;
}
