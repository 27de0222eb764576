//! # Tandem Storage
//!
//! Storage backends the directory is bound to:
//! - **FilesystemStorage**: documents stored as files below a root directory
//! - **FilesystemAccountStorage**: user accounts, attached to a filesystem
//!   storage and persisted in its root
//!
//! ## Example
//!
//! ```rust,no_run
//! use tandem_storage::{FilesystemAccountStorage, FilesystemStorage};
//!
//! # fn example() -> tandem_storage::Result<()> {
//! let storage = FilesystemStorage::new("/var/lib/tandem");
//! let mut accounts = FilesystemAccountStorage::new();
//! accounts.attach(&storage)?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

mod accounts;
mod error;
mod filesystem;

pub use accounts::{Account, FilesystemAccountStorage, ACCOUNTS_FILE};
pub use error::{Error, Result};
pub use filesystem::FilesystemStorage;
