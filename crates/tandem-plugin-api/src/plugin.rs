//! Core plugin trait and descriptor

use crate::context::PluginContext;
use crate::error::Result;
use crate::params::{ParameterSpec, PluginParams};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tandem_core::{Connection, Session};

/// Version of the plugin interface
///
/// Modules built against a different version are refused by the loader.
pub const API_VERSION: u32 = 1;

/// Symbol a native plugin module exports, see [`export_plugin!`]
///
/// [`export_plugin!`]: crate::export_plugin
pub const REGISTER_SYMBOL: &[u8] = b"tandem_plugin_register";

/// Signature of the registration function
pub type RegisterFn = fn() -> PluginDescriptor;

/// Per-(plugin, connection) or per-(plugin, session) state
///
/// Created by the plugin, owned by the server, handed back to the plugin on
/// every callback for the same connection or session.
pub type SideState = Box<dyn Any + Send>;

/// Creates a plugin value with its defaults established
pub type PluginFactory = Arc<dyn Fn() -> Box<dyn Plugin> + Send + Sync>;

/// Core plugin trait that all plugins must implement
///
/// Callbacks run on the server's event loop and must not block.
pub trait Plugin: Send + fmt::Debug {
    /// Initialize the plugin with its validated parameters
    ///
    /// If this fails the plugin is not loaded, but
    /// [`on_deinitialize`](Plugin::on_deinitialize) still runs once.
    fn on_initialize(&mut self, ctx: &PluginContext, params: &PluginParams) -> Result<()>;

    /// Release everything acquired since creation
    fn on_deinitialize(&mut self) {}

    /// Fresh state for a connection this plugin observes
    fn connection_state(&self) -> SideState {
        Box::new(())
    }

    /// Fresh state for a session that passes the session-type filter
    fn session_state(&self) -> SideState {
        Box::new(())
    }

    /// A connection appeared
    fn on_connection_added(&mut self, _connection: &Connection, _state: &mut SideState) {}

    /// A connection is going away; its state is dropped afterwards
    fn on_connection_removed(&mut self, _connection: &Connection, _state: &mut SideState) {}

    /// A session appeared
    ///
    /// Called for every session. `state` is `None` when the session does not
    /// pass the plugin's session-type filter.
    fn on_session_added(&mut self, _session: &Session, _state: Option<&mut SideState>) {}

    /// A session is going away
    fn on_session_removed(&mut self, _session: &Session, _state: Option<&mut SideState>) {}
}

/// Fixed description of a plugin module
#[derive(Clone)]
pub struct PluginDescriptor {
    /// Interface version the module was built against
    pub api_version: u32,

    /// Plugin name, must match the name it is loaded under
    pub name: &'static str,

    /// Human-readable description
    pub description: &'static str,

    /// Declared parameters
    pub parameters: &'static [ParameterSpec],

    /// Only sessions of this type (or derived types) get session state
    pub session_type: Option<&'static str>,

    /// Creates the plugin value
    pub create: PluginFactory,
}

impl PluginDescriptor {
    /// Descriptor for the current interface version
    pub fn new<F>(name: &'static str, description: &'static str, create: F) -> Self
    where
        F: Fn() -> Box<dyn Plugin> + Send + Sync + 'static,
    {
        Self {
            api_version: API_VERSION,
            name,
            description,
            parameters: &[],
            session_type: None,
            create: Arc::new(create),
        }
    }

    /// Declare the parameter schema
    pub fn with_parameters(mut self, parameters: &'static [ParameterSpec]) -> Self {
        self.parameters = parameters;
        self
    }

    /// Restrict session state to sessions of `session_type`
    pub fn with_session_type(mut self, session_type: &'static str) -> Self {
        self.session_type = Some(session_type);
        self
    }

    /// Whether sessions of `session` get state from this plugin
    pub fn accepts_session(&self, session: &Session) -> bool {
        self.session_type
            .map_or(true, |ty| session.kind().is_a(ty))
    }
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("api_version", &self.api_version)
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters.len())
            .field("session_type", &self.session_type)
            .finish()
    }
}

/// Export a plugin descriptor from a native module
///
/// Defines the registration function the loader looks up. The module must be
/// built as a `cdylib` named `tandem_plugin_<name>`.
///
/// ```rust,ignore
/// tandem_plugin_api::export_plugin!(
///     PluginDescriptor::new("hello", "Says hello", || Box::new(Hello::default()))
/// );
/// ```
#[macro_export]
macro_rules! export_plugin {
    ($descriptor:expr) => {
        #[allow(unsafe_code)]
        #[no_mangle]
        pub fn tandem_plugin_register() -> $crate::PluginDescriptor {
            $descriptor
        }
    };
}
