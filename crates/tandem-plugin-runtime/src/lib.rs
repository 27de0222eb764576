//! # Tandem Plugin Runtime
//!
//! Loading, lifecycle and event dispatch for Tandem plugins.
//!
//! ## Features
//!
//! - **Module sources**: built-in modules and shared libraries from a search path
//! - **Loader**: descriptor checks, parameter validation and initialization
//! - **Registry**: per-connection and per-session plugin state
//! - **Batch loading**: independent per-plugin failures with a load report
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::collections::BTreeMap;
//! use tandem_core::InMemoryDirectory;
//! use tandem_plugin_runtime::*;
//! use tandem_storage::{FilesystemAccountStorage, FilesystemStorage};
//!
//! let directory = InMemoryDirectory::new(
//!     FilesystemStorage::new("documents"),
//!     FilesystemAccountStorage::new(),
//! );
//!
//! let loader = PluginLoader::new(NativeModuleSource::new("/usr/lib/tandem/plugins"));
//! let mut manager = PluginManager::new(loader);
//!
//! let report = manager.load_all(&["logging".to_string()], &BTreeMap::new(), &directory);
//! println!("{} plugins active", report.active());
//! ```

#![deny(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod error;
pub mod instance;
pub mod loader;
pub mod manager;
pub mod registry;
pub mod source;

pub use error::{LoadError, Result};
pub use instance::{PluginId, PluginInstance};
pub use loader::PluginLoader;
pub use manager::{LoadReport, PluginManager};
pub use registry::PluginRegistry;
pub use source::{
    ChainedModuleSource, ModuleSource, NativeModuleSource, PluginModule, StaticModuleSource,
};

// Re-export plugin API types for convenience
pub use tandem_plugin_api::{Plugin, PluginDescriptor, PluginError, SideState};

/// Prelude module with commonly used types
pub mod prelude {
    pub use crate::error::{LoadError, Result};
    pub use crate::loader::PluginLoader;
    pub use crate::manager::{LoadReport, PluginManager};
    pub use crate::registry::PluginRegistry;
    pub use crate::source::{ChainedModuleSource, ModuleSource, NativeModuleSource, StaticModuleSource};
    pub use tandem_plugin_api::prelude::*;
}
