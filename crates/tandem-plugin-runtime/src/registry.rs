//! Plugin registry: active instances and their side-tables
//!
//! The registry mirrors the server's connection and session sets into every
//! loaded plugin. For each (plugin, connection) pair it keeps the state the
//! plugin created for that connection, and likewise for sessions that pass
//! the plugin's session-type filter.
//!
//! Additions are dispatched in load order, removals in reverse load order, so
//! a plugin loaded later never outlives (in terms of callbacks) one loaded
//! before it.

use crate::instance::{PluginId, PluginInstance};
use std::collections::{BTreeMap, HashMap};
use tandem_core::{Connection, ConnectionId, Directory, Session, SessionId};
use tandem_plugin_api::SideState;
use tracing::{debug, info, warn};

/// Active plugin instances and their per-connection / per-session state
#[derive(Debug, Default)]
pub struct PluginRegistry {
    instances: Vec<PluginInstance>,
    connections: BTreeMap<ConnectionId, Connection>,
    sessions: BTreeMap<SessionId, Session>,
    connection_entries: HashMap<(PluginId, ConnectionId), SideState>,
    session_entries: HashMap<(PluginId, SessionId), SideState>,
}

impl PluginRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an initialized instance
    ///
    /// Every connection and session already observed is reported to the new
    /// instance, connections first.
    pub fn insert(&mut self, mut instance: PluginInstance) -> PluginId {
        let id = instance.id();

        for connection in self.connections.values() {
            let state = Self::add_connection_entry(&mut instance, connection);
            self.connection_entries.insert((id, connection.id()), state);
        }
        for session in self.sessions.values() {
            if let Some(state) = Self::add_session_entry(&mut instance, session) {
                self.session_entries.insert((id, session.id()), state);
            }
        }

        debug!(plugin = %instance.name(), %id, "Plugin registered");
        self.instances.push(instance);
        id
    }

    /// Observe everything in `directory` not seen yet
    pub fn observe(&mut self, directory: &dyn Directory) {
        for connection in directory.connections() {
            if !self.connections.contains_key(&connection.id()) {
                self.on_connection_added(connection);
            }
        }
        for session in directory.sessions() {
            if !self.sessions.contains_key(&session.id()) {
                self.on_session_added(session);
            }
        }
    }

    /// A connection appeared
    pub fn on_connection_added(&mut self, connection: &Connection) {
        if self.connections.contains_key(&connection.id()) {
            warn!(connection = %connection.id(), "Connection reported twice, ignoring");
            return;
        }

        for instance in &mut self.instances {
            let state = Self::add_connection_entry(instance, connection);
            self.connection_entries
                .insert((instance.id(), connection.id()), state);
        }
        self.connections.insert(connection.id(), connection.clone());
    }

    /// A connection is going away
    pub fn on_connection_removed(&mut self, connection: &Connection) {
        if self.connections.remove(&connection.id()).is_none() {
            warn!(connection = %connection.id(), "Unknown connection removed, ignoring");
            return;
        }

        for instance in self.instances.iter_mut().rev() {
            Self::remove_connection_entry(&mut self.connection_entries, instance, connection);
        }
    }

    /// A session appeared
    pub fn on_session_added(&mut self, session: &Session) {
        if self.sessions.contains_key(&session.id()) {
            warn!(session = %session.id(), "Session reported twice, ignoring");
            return;
        }

        for instance in &mut self.instances {
            if let Some(state) = Self::add_session_entry(instance, session) {
                self.session_entries
                    .insert((instance.id(), session.id()), state);
            }
        }
        self.sessions.insert(session.id(), session.clone());
    }

    /// A session is going away
    pub fn on_session_removed(&mut self, session: &Session) {
        if self.sessions.remove(&session.id()).is_none() {
            warn!(session = %session.id(), "Unknown session removed, ignoring");
            return;
        }

        for instance in self.instances.iter_mut().rev() {
            Self::remove_session_entry(&mut self.session_entries, instance, session);
        }
    }

    /// State of `plugin` for `connection`
    pub fn connection_info(&self, plugin: PluginId, connection: ConnectionId) -> Option<&SideState> {
        self.connection_entries.get(&(plugin, connection))
    }

    /// State of `plugin` for `connection`, mutably
    pub fn connection_info_mut(
        &mut self,
        plugin: PluginId,
        connection: ConnectionId,
    ) -> Option<&mut SideState> {
        self.connection_entries.get_mut(&(plugin, connection))
    }

    /// Typed state of `plugin` for `connection`
    pub fn connection_info_as<T: 'static>(
        &self,
        plugin: PluginId,
        connection: ConnectionId,
    ) -> Option<&T> {
        self.connection_info(plugin, connection)?.downcast_ref()
    }

    /// State of `plugin` for `session`
    ///
    /// `None` as well when the session does not pass the plugin's filter.
    pub fn session_info(&self, plugin: PluginId, session: SessionId) -> Option<&SideState> {
        self.session_entries.get(&(plugin, session))
    }

    /// State of `plugin` for `session`, mutably
    pub fn session_info_mut(
        &mut self,
        plugin: PluginId,
        session: SessionId,
    ) -> Option<&mut SideState> {
        self.session_entries.get_mut(&(plugin, session))
    }

    /// Typed state of `plugin` for `session`
    pub fn session_info_as<T: 'static>(&self, plugin: PluginId, session: SessionId) -> Option<&T> {
        self.session_info(plugin, session)?.downcast_ref()
    }

    /// Identifier of the instance loaded under `name`
    pub fn plugin_id(&self, name: &str) -> Option<PluginId> {
        self.instances
            .iter()
            .find(|i| i.name() == name)
            .map(PluginInstance::id)
    }

    /// Whether a plugin named `name` is loaded
    pub fn contains(&self, name: &str) -> bool {
        self.plugin_id(name).is_some()
    }

    /// Names of the loaded plugins in load order
    pub fn active_plugins(&self) -> Vec<&str> {
        self.instances.iter().map(PluginInstance::name).collect()
    }

    /// Number of loaded plugins
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Whether no plugin is loaded
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Number of (plugin, connection) entries
    pub fn connection_entry_count(&self) -> usize {
        self.connection_entries.len()
    }

    /// Number of (plugin, session) entries
    pub fn session_entry_count(&self) -> usize {
        self.session_entries.len()
    }

    /// Unload one plugin
    ///
    /// The plugin sees every observed connection and session removed before
    /// it is deinitialized. Returns `false` if no such plugin is loaded.
    pub fn unload(&mut self, name: &str) -> bool {
        let Some(index) = self.instances.iter().position(|i| i.name() == name) else {
            return false;
        };

        let mut instance = self.instances.remove(index);
        self.teardown(&mut instance);
        info!(plugin = %name, "Plugin unloaded");
        true
    }

    /// Unload every plugin, last loaded first
    ///
    /// Calling this again is a no-op.
    pub fn unload_all(&mut self) {
        if self.instances.is_empty() {
            return;
        }

        let count = self.instances.len();
        while let Some(mut instance) = self.instances.pop() {
            self.teardown(&mut instance);
        }

        self.connection_entries.clear();
        self.session_entries.clear();

        info!(plugins = count, "All plugins unloaded");
    }

    fn teardown(&mut self, instance: &mut PluginInstance) {
        for connection in self.connections.values().rev() {
            Self::remove_connection_entry(&mut self.connection_entries, instance, connection);
        }
        for session in self.sessions.values().rev() {
            Self::remove_session_entry(&mut self.session_entries, instance, session);
        }
        instance.deinitialize();
    }

    fn add_connection_entry(instance: &mut PluginInstance, connection: &Connection) -> SideState {
        let mut state = instance.plugin().connection_state();
        instance
            .plugin_mut()
            .on_connection_added(connection, &mut state);
        state
    }

    fn remove_connection_entry(
        entries: &mut HashMap<(PluginId, ConnectionId), SideState>,
        instance: &mut PluginInstance,
        connection: &Connection,
    ) {
        match entries.remove(&(instance.id(), connection.id())) {
            Some(mut state) => instance
                .plugin_mut()
                .on_connection_removed(connection, &mut state),
            None => warn!(
                plugin = %instance.name(),
                connection = %connection.id(),
                "Missing connection entry"
            ),
        }
    }

    fn add_session_entry(instance: &mut PluginInstance, session: &Session) -> Option<SideState> {
        if instance.descriptor().accepts_session(session) {
            let mut state = instance.plugin().session_state();
            instance
                .plugin_mut()
                .on_session_added(session, Some(&mut state));
            Some(state)
        } else {
            instance.plugin_mut().on_session_added(session, None);
            None
        }
    }

    fn remove_session_entry(
        entries: &mut HashMap<(PluginId, SessionId), SideState>,
        instance: &mut PluginInstance,
        session: &Session,
    ) {
        let mut state = entries.remove(&(instance.id(), session.id()));
        instance
            .plugin_mut()
            .on_session_removed(session, state.as_mut());
    }
}

impl Drop for PluginRegistry {
    fn drop(&mut self) {
        self.unload_all();
    }
}
