//! Test doubles for plugin hosts
//!
//! [`RecordingPlugin`] appends every callback it receives to a shared
//! [`EventLog`], so a test can assert on ordering across several plugins.

use crate::context::PluginContext;
use crate::error::{PluginError, Result};
use crate::params::{ParameterKind, ParameterSpec, PluginParams};
use crate::plugin::{Plugin, PluginDescriptor, SideState};
use parking_lot::Mutex;
use std::sync::Arc;
use tandem_core::{Connection, ConnectionId, Session, SessionId};

/// A callback observed by a [`RecordingPlugin`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginEvent {
    /// `on_initialize`
    Initialized(&'static str),
    /// `on_deinitialize`
    Deinitialized(&'static str),
    /// `on_connection_added`
    ConnectionAdded(&'static str, ConnectionId),
    /// `on_connection_removed`
    ConnectionRemoved(&'static str, ConnectionId),
    /// `on_session_added`, with whether state was handed in
    SessionAdded(&'static str, SessionId, bool),
    /// `on_session_removed`, with whether state was handed in
    SessionRemoved(&'static str, SessionId, bool),
}

/// Shared, ordered log of plugin callbacks
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<PluginEvent>>>);

impl EventLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events so far
    pub fn events(&self) -> Vec<PluginEvent> {
        self.0.lock().clone()
    }

    /// Number of events matching `predicate`
    pub fn count(&self, predicate: impl Fn(&PluginEvent) -> bool) -> usize {
        self.0.lock().iter().filter(|e| predicate(e)).count()
    }

    /// Forget all events
    pub fn clear(&self) {
        self.0.lock().clear();
    }

    fn push(&self, event: PluginEvent) {
        self.0.lock().push(event);
    }
}

/// Connection state created by a [`RecordingPlugin`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedConnection {
    /// Plugin that created the state
    pub plugin: &'static str,
    /// Connection the state belongs to
    pub connection: ConnectionId,
}

/// Session state created by a [`RecordingPlugin`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordedSession {
    /// Session the state was bound to, set on add
    pub session: Option<SessionId>,
}

/// Parameters accepted by [`RecordingPlugin`]
pub const RECORDING_PARAMETERS: &[ParameterSpec] = &[
    ParameterSpec::optional("fail", ParameterKind::Boolean, "Fail initialization"),
    ParameterSpec::optional("label", ParameterKind::String, "Free-form label"),
];

/// Plugin that records its callbacks
#[derive(Debug)]
pub struct RecordingPlugin {
    name: &'static str,
    log: EventLog,
    fail_initialize: bool,
}

impl RecordingPlugin {
    /// Plugin recording into `log`
    pub fn new(name: &'static str, log: EventLog) -> Self {
        Self {
            name,
            log,
            fail_initialize: false,
        }
    }

    /// Descriptor of a recording plugin
    pub fn descriptor(name: &'static str, log: &EventLog) -> PluginDescriptor {
        let log = log.clone();
        PluginDescriptor::new(name, "Records plugin callbacks", move || {
            Box::new(RecordingPlugin::new(name, log.clone()))
        })
        .with_parameters(RECORDING_PARAMETERS)
    }

    /// Descriptor of a recording plugin whose initialization always fails
    pub fn failing_descriptor(name: &'static str, log: &EventLog) -> PluginDescriptor {
        let log = log.clone();
        PluginDescriptor::new(name, "Fails to initialize", move || {
            Box::new(RecordingPlugin {
                name,
                log: log.clone(),
                fail_initialize: true,
            })
        })
        .with_parameters(RECORDING_PARAMETERS)
    }
}

impl Plugin for RecordingPlugin {
    fn on_initialize(&mut self, _ctx: &PluginContext, params: &PluginParams) -> Result<()> {
        self.log.push(PluginEvent::Initialized(self.name));

        if self.fail_initialize || params.get_bool("fail") == Some(true) {
            return Err(PluginError::init(format!("{} refuses to start", self.name)));
        }
        Ok(())
    }

    fn on_deinitialize(&mut self) {
        self.log.push(PluginEvent::Deinitialized(self.name));
    }

    fn connection_state(&self) -> SideState {
        Box::new(None::<RecordedConnection>)
    }

    fn session_state(&self) -> SideState {
        Box::new(RecordedSession::default())
    }

    fn on_connection_added(&mut self, connection: &Connection, state: &mut SideState) {
        if let Some(slot) = state.downcast_mut::<Option<RecordedConnection>>() {
            *slot = Some(RecordedConnection {
                plugin: self.name,
                connection: connection.id(),
            });
        }
        self.log
            .push(PluginEvent::ConnectionAdded(self.name, connection.id()));
    }

    fn on_connection_removed(&mut self, connection: &Connection, _state: &mut SideState) {
        self.log
            .push(PluginEvent::ConnectionRemoved(self.name, connection.id()));
    }

    fn on_session_added(&mut self, session: &Session, state: Option<&mut SideState>) {
        let has_state = state.is_some();
        if let Some(recorded) = state.and_then(|s| s.downcast_mut::<RecordedSession>()) {
            recorded.session = Some(session.id());
        }
        self.log
            .push(PluginEvent::SessionAdded(self.name, session.id(), has_state));
    }

    fn on_session_removed(&mut self, session: &Session, state: Option<&mut SideState>) {
        self.log.push(PluginEvent::SessionRemoved(
            self.name,
            session.id(),
            state.is_some(),
        ));
    }
}
