//! # Tandem Runtime
//!
//! Server lifecycle and live reconfiguration:
//! - Listening endpoints on IPv6 and IPv4 with per-endpoint security settings
//! - The live server state ([`ServerRun`]) and its configuration snapshot
//! - Staged, all-or-nothing configuration reload ([`ReloadEngine`])
//! - The event loop accepting connections and serializing reloads ([`Server`])
//! - Reload on configuration file changes ([`ConfigWatcher`])
//!
//! ## Example
//!
//! ```rust,no_run
//! use tandem_config::ConfigSource;
//! use tandem_core::InMemoryDirectory;
//! use tandem_runtime::prelude::*;
//! use tandem_storage::{FilesystemAccountStorage, FilesystemStorage};
//!
//! # async fn example() -> std::result::Result<(), ReloadError> {
//! let directory = InMemoryDirectory::new(
//!     FilesystemStorage::new("documents"),
//!     FilesystemAccountStorage::new(),
//! );
//! let source = ConfigSource::File("/etc/tandem/tandem.yaml".into());
//!
//! let server = Server::start(source, directory, RunOptions::default())?;
//! let handle = server.handle();
//! tokio::spawn(server.run());
//!
//! let summary = handle.reload().await?;
//! println!("{} plugins loaded", summary.plugins_loaded);
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

pub mod error;
pub mod listener;
pub mod pool;
pub mod reload;
pub mod run;
pub mod server;
pub mod snapshot;
pub mod testing;
pub mod watcher;

pub use error::{ReloadError, Result};
pub use listener::{Listener, ListenerFactory, TcpListenerFactory, TcpListenerSocket};
pub use pool::{EndpointId, ServerEndpoint, ServerPool};
pub use reload::{ReloadEngine, ReloadOutcome, ReloadSummary};
pub use run::{RunOptions, ServerRun};
pub use server::{Server, ServerEvent, ServerHandle, ServerStatus};
pub use snapshot::ConfigSnapshot;
pub use watcher::ConfigWatcher;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{ReloadError, Result};
    pub use crate::reload::{ReloadEngine, ReloadOutcome, ReloadSummary};
    pub use crate::run::{RunOptions, ServerRun};
    pub use crate::server::{Server, ServerHandle, ServerStatus};
    pub use crate::snapshot::ConfigSnapshot;
    pub use crate::watcher::ConfigWatcher;
}
