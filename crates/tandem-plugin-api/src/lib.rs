//! # Tandem Plugin API
//!
//! This crate provides the SDK for developing plugins for the Tandem server.
//!
//! A plugin is a module exposing a [`PluginDescriptor`]: a name, a
//! description, a parameter schema, an optional session-type filter and a
//! factory for the [`Plugin`] value. The server creates one plugin value per
//! load, validates its parameters, initializes it and then reports every
//! connection and session to it until it is unloaded.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tandem_plugin_api::prelude::*;
//!
//! #[derive(Debug, Default)]
//! struct Greeter;
//!
//! impl Plugin for Greeter {
//!     fn on_initialize(&mut self, _ctx: &PluginContext, _params: &PluginParams) -> Result<(), PluginError> {
//!         Ok(())
//!     }
//!
//!     fn on_connection_added(&mut self, connection: &Connection, _state: &mut SideState) {
//!         println!("hello {}", connection.remote_addr());
//!     }
//! }
//!
//! export_plugin!(PluginDescriptor::new("greeter", "Greets clients", || Box::new(Greeter)));
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod context;
pub mod error;
pub mod params;
pub mod plugin;

#[cfg(feature = "testing")]
pub mod testing;

// Re-export commonly used types
pub use context::PluginContext;
pub use error::PluginError;
pub use params::{ParamValue, ParameterKind, ParameterSpec, PluginParams};
pub use plugin::{
    Plugin, PluginDescriptor, PluginFactory, RegisterFn, SideState, API_VERSION, REGISTER_SYMBOL,
};

/// Prelude module with commonly used types
pub mod prelude {
    pub use crate::context::PluginContext;
    pub use crate::error::PluginError;
    pub use crate::export_plugin;
    pub use crate::params::{ParameterKind, ParameterSpec, PluginParams};
    pub use crate::plugin::{Plugin, PluginDescriptor, SideState};
    pub use tandem_core::{Connection, Session};
}
