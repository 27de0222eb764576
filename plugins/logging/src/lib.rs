//! # Logging Plugin
//!
//! Logs the lifecycle of connections and sessions through the server's
//! `tracing` subscriber.
//!
//! ## Parameters
//!
//! - `log-connections` (boolean, default `true`): log connections coming and going
//! - `log-sessions` (boolean, default `true`): log sessions being opened and closed
//!
//! ## Example
//!
//! ```yaml
//! plugins:
//!   load: [logging]
//!   parameters:
//!     logging:
//!       log-sessions: false
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

use std::time::Instant;
use tandem_plugin_api::prelude::*;
use tandem_plugin_api::ParameterKind;
use tracing::{debug, info};

/// Parameters accepted by the logging plugin
pub const PARAMETERS: &[ParameterSpec] = &[
    ParameterSpec::optional(
        "log-connections",
        ParameterKind::Boolean,
        "Log connections being added and removed",
    ),
    ParameterSpec::optional(
        "log-sessions",
        ParameterKind::Boolean,
        "Log sessions being added and removed",
    ),
];

/// Connection and session logger
#[derive(Debug)]
pub struct LoggingPlugin {
    log_connections: bool,
    log_sessions: bool,
}

/// Per-connection state: when the connection was first seen
#[derive(Debug, Clone, Copy)]
pub struct ConnectionLog {
    /// Time the plugin saw the connection
    pub since: Instant,
}

impl LoggingPlugin {
    /// Plugin with both kinds of logging enabled
    pub fn new() -> Self {
        Self {
            log_connections: true,
            log_sessions: true,
        }
    }

    /// Descriptor of the plugin
    pub fn descriptor() -> PluginDescriptor {
        PluginDescriptor::new(
            "logging",
            "Logs connection and session lifecycle events",
            || Box::new(LoggingPlugin::new()),
        )
        .with_parameters(PARAMETERS)
    }
}

impl Default for LoggingPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for LoggingPlugin {
    fn on_initialize(&mut self, ctx: &PluginContext, params: &PluginParams) -> Result<(), PluginError> {
        ctx.adopt_host_logging();

        self.log_connections = params.get_bool("log-connections").unwrap_or(true);
        self.log_sessions = params.get_bool("log-sessions").unwrap_or(true);

        debug!(
            plugin = ctx.plugin_name(),
            log_connections = self.log_connections,
            log_sessions = self.log_sessions,
            "Logging plugin initialized"
        );
        Ok(())
    }

    fn on_deinitialize(&mut self) {
        debug!("Logging plugin deinitialized");
    }

    fn connection_state(&self) -> SideState {
        Box::new(ConnectionLog {
            since: Instant::now(),
        })
    }

    fn on_connection_added(&mut self, connection: &Connection, _state: &mut SideState) {
        if self.log_connections {
            info!(
                connection = %connection.id(),
                peer = %connection.remote_addr(),
                "Client connected"
            );
        }
    }

    fn on_connection_removed(&mut self, connection: &Connection, state: &mut SideState) {
        if !self.log_connections {
            return;
        }

        let duration = state
            .downcast_ref::<ConnectionLog>()
            .map(|log| log.since.elapsed());
        info!(
            connection = %connection.id(),
            peer = %connection.remote_addr(),
            duration = ?duration,
            "Client disconnected"
        );
    }

    fn on_session_added(&mut self, session: &Session, _state: Option<&mut SideState>) {
        if self.log_sessions {
            info!(
                session = %session.id(),
                path = session.path(),
                kind = session.kind().name(),
                "Session opened"
            );
        }
    }

    fn on_session_removed(&mut self, session: &Session, _state: Option<&mut SideState>) {
        if self.log_sessions {
            info!(session = %session.id(), path = session.path(), "Session closed");
        }
    }
}

tandem_plugin_api::export_plugin!(LoggingPlugin::descriptor());

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tandem_core::ConnectionId;
    use tandem_storage::FilesystemStorage;

    fn initialize(raw: serde_json::Value) -> Result<LoggingPlugin, PluginError> {
        let raw = raw.as_object().cloned().unwrap_or_default();
        let params = PluginParams::parse(PARAMETERS, &raw)?;
        let ctx = PluginContext::new("logging", FilesystemStorage::new("/tmp"));

        let mut plugin = LoggingPlugin::new();
        plugin.on_initialize(&ctx, &params)?;
        Ok(plugin)
    }

    #[test]
    fn test_defaults() {
        let plugin = initialize(json!({})).unwrap();
        assert!(plugin.log_connections);
        assert!(plugin.log_sessions);
    }

    #[test]
    fn test_parameters() {
        let plugin = initialize(json!({"log-connections": false, "log_sessions": "false"})).unwrap();
        assert!(!plugin.log_connections);
        assert!(!plugin.log_sessions);

        assert!(PluginParams::parse(PARAMETERS, json!({"verbose": true}).as_object().unwrap()).is_err());
    }

    #[test]
    fn test_connection_state() {
        let mut plugin = initialize(json!({})).unwrap();
        let connection = Connection::new(ConnectionId(7), "127.0.0.1:5000".parse().unwrap());

        let mut state = plugin.connection_state();
        plugin.on_connection_added(&connection, &mut state);
        plugin.on_connection_removed(&connection, &mut state);

        assert!(state.downcast_ref::<ConnectionLog>().is_some());
    }

    #[test]
    fn test_descriptor() {
        let descriptor = tandem_plugin_register();
        assert_eq!(descriptor.name, "logging");
        assert_eq!(descriptor.parameters.len(), 2);
        assert!(descriptor.session_type.is_none());
    }
}
