//! Directory of live connections and sessions

use crate::connection::{AuthContext, Connection};
use crate::session::Session;
use crate::types::{ConnectionId, SessionId};
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tandem_storage::{FilesystemAccountStorage, FilesystemStorage};
use tracing::{debug, info};

/// Directory abstraction
///
/// The directory owns the connections and sessions of a server together with
/// the storage backend and the authentication context handed to new
/// connections. Iteration follows ascending identifier order.
pub trait Directory: Send + fmt::Debug {
    /// Live connections
    fn connections(&self) -> Vec<&Connection>;

    /// Look up a connection
    fn connection(&self, id: ConnectionId) -> Option<&Connection>;

    /// Apply `f` to every live connection
    fn for_each_connection_mut(&mut self, f: &mut dyn FnMut(&mut Connection));

    /// Live sessions
    fn sessions(&self) -> Vec<&Session>;

    /// Look up a session
    fn session(&self, id: SessionId) -> Option<&Session>;

    /// Document storage
    fn storage(&self) -> &FilesystemStorage;

    /// Account storage attached to [`Directory::storage`]
    fn account_storage(&self) -> &FilesystemAccountStorage;

    /// Replace the document and account storage
    fn set_storage(&mut self, storage: FilesystemStorage, accounts: FilesystemAccountStorage);

    /// Authentication context handed to new connections
    fn security_context(&self) -> Option<&Arc<AuthContext>>;

    /// Replace the authentication context handed to new connections
    fn set_security_context(&mut self, context: Option<Arc<AuthContext>>);

    /// Register a connection
    ///
    /// The connection adopts the current security context.
    fn add_connection(&mut self, connection: Connection) -> Result<()>;

    /// Forget a connection
    fn remove_connection(&mut self, id: ConnectionId) -> Option<Connection>;

    /// Register a session
    fn add_session(&mut self, session: Session) -> Result<()>;

    /// Forget a session
    fn remove_session(&mut self, id: SessionId) -> Option<Session>;

    /// Root directory of the document storage
    fn storage_root(&self) -> &Path {
        self.storage().root_directory()
    }
}

/// Directory kept entirely in memory
#[derive(Debug)]
pub struct InMemoryDirectory {
    connections: BTreeMap<ConnectionId, Connection>,
    sessions: BTreeMap<SessionId, Session>,
    storage: FilesystemStorage,
    accounts: FilesystemAccountStorage,
    security_context: Option<Arc<AuthContext>>,
}

impl InMemoryDirectory {
    /// Create an empty directory over `storage`
    pub fn new(storage: FilesystemStorage, accounts: FilesystemAccountStorage) -> Self {
        Self {
            connections: BTreeMap::new(),
            sessions: BTreeMap::new(),
            storage,
            accounts,
            security_context: None,
        }
    }
}

impl Directory for InMemoryDirectory {
    fn connections(&self) -> Vec<&Connection> {
        self.connections.values().collect()
    }

    fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    fn for_each_connection_mut(&mut self, f: &mut dyn FnMut(&mut Connection)) {
        for connection in self.connections.values_mut() {
            f(connection);
        }
    }

    fn sessions(&self) -> Vec<&Session> {
        self.sessions.values().collect()
    }

    fn session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    fn storage(&self) -> &FilesystemStorage {
        &self.storage
    }

    fn account_storage(&self) -> &FilesystemAccountStorage {
        &self.accounts
    }

    fn set_storage(&mut self, storage: FilesystemStorage, accounts: FilesystemAccountStorage) {
        info!(
            old = %self.storage.root_directory().display(),
            new = %storage.root_directory().display(),
            "Replacing directory storage"
        );
        self.storage = storage;
        self.accounts = accounts;
    }

    fn security_context(&self) -> Option<&Arc<AuthContext>> {
        self.security_context.as_ref()
    }

    fn set_security_context(&mut self, context: Option<Arc<AuthContext>>) {
        self.security_context = context;
    }

    fn add_connection(&mut self, mut connection: Connection) -> Result<()> {
        let id = connection.id();
        if self.connections.contains_key(&id) {
            return Err(Error::Runtime(format!("Connection {id} already registered")));
        }

        connection.reset_authentication(self.security_context.clone());
        debug!(connection = %id, peer = %connection.remote_addr(), "Connection added");
        self.connections.insert(id, connection);
        Ok(())
    }

    fn remove_connection(&mut self, id: ConnectionId) -> Option<Connection> {
        let removed = self.connections.remove(&id);
        if removed.is_some() {
            debug!(connection = %id, "Connection removed");
        }
        removed
    }

    fn add_session(&mut self, session: Session) -> Result<()> {
        let id = session.id();
        if self.sessions.contains_key(&id) {
            return Err(Error::Runtime(format!("Session {id} already registered")));
        }

        debug!(session = %id, kind = %session.kind(), path = session.path(), "Session added");
        self.sessions.insert(id, session);
        Ok(())
    }

    fn remove_session(&mut self, id: SessionId) -> Option<Session> {
        self.sessions.remove(&id)
    }
}
