//! Live server state

use crate::error::{ReloadError, Result};
use crate::listener::{ListenerFactory, TcpListenerFactory};
use crate::pool::{ServerEndpoint, ServerPool};
use crate::reload::{self, ReloadEngine, ReloadOutcome};
use crate::snapshot::ConfigSnapshot;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tandem_config::{Config, ConfigSource};
use tandem_core::{Connection, ConnectionId, Directory, Session, SessionId};
use tandem_plugin_runtime::{
    ChainedModuleSource, ModuleSource, NativeModuleSource, PluginLoader, PluginManager,
    PluginRegistry, StaticModuleSource,
};
use tracing::info;

/// Collaborators a [`ServerRun`] creates its resources with
#[derive(Clone)]
pub struct RunOptions {
    listener_factory: Arc<dyn ListenerFactory>,
    modules: Arc<dyn ModuleSource>,
    strict_plugins: bool,
}

impl RunOptions {
    /// TCP listeners and no built-in plugin modules
    pub fn new() -> Self {
        Self {
            listener_factory: Arc::new(TcpListenerFactory),
            modules: Arc::new(StaticModuleSource::new()),
            strict_plugins: false,
        }
    }

    /// Create listeners with `factory`
    pub fn with_listener_factory(mut self, factory: impl ListenerFactory + 'static) -> Self {
        self.listener_factory = Arc::new(factory);
        self
    }

    /// Resolve plugins from `modules` before the configured search path
    pub fn with_modules(mut self, modules: impl ModuleSource + 'static) -> Self {
        self.modules = Arc::new(modules);
        self
    }

    /// Refuse to start when a plugin fails to load
    ///
    /// Only startup is affected; a reload never fails because of a plugin.
    pub fn strict_plugins(mut self, strict: bool) -> Self {
        self.strict_plugins = strict;
        self
    }

    pub(crate) fn listener_factory(&self) -> &dyn ListenerFactory {
        self.listener_factory.as_ref()
    }

    /// Loader for the built-in modules plus native modules in `path`
    pub(crate) fn plugin_loader(&self, path: Option<&Path>) -> PluginLoader {
        match path {
            Some(path) => PluginLoader::new(
                ChainedModuleSource::new()
                    .with(Arc::clone(&self.modules))
                    .with(NativeModuleSource::new(path)),
            ),
            None => PluginLoader::from_arc(Arc::clone(&self.modules)),
        }
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOptions")
            .field("listener_factory", &self.listener_factory)
            .field("modules", &self.modules)
            .field("strict_plugins", &self.strict_plugins)
            .finish()
    }
}

/// The running server: configuration, endpoints, plugins and directory
///
/// A `ServerRun` has a single owner. Everything that changes it, including
/// a reload, takes `&mut self`.
#[derive(Debug)]
pub struct ServerRun<D: Directory> {
    pub(crate) snapshot: Arc<ConfigSnapshot>,
    pub(crate) pool: ServerPool,
    pub(crate) plugins: PluginManager,
    pub(crate) directory: D,
    pub(crate) options: RunOptions,
}

impl<D: Directory> ServerRun<D> {
    /// Read `source` and start serving
    pub fn start(source: &ConfigSource, directory: D, options: RunOptions) -> Result<Self> {
        let config = source
            .load()
            .map_err(|e| ReloadError::ConfigParseFailed(e.to_string()))?;
        Self::with_config(config, directory, options)
    }

    /// Start serving a validated configuration
    ///
    /// Runs the same stages as a reload against a server with no listeners:
    /// listeners for the configured port, the configured storage installed
    /// into `directory`, then the plugins.
    pub fn with_config(config: Config, mut directory: D, options: RunOptions) -> Result<Self> {
        let snapshot = reload::prepare_snapshot(config, None)?;

        let mut listeners = reload::bind_listeners(
            options.listener_factory(),
            snapshot.listen_address(),
            snapshot.port(),
        )?;
        let (storage, accounts) = reload::attach_storage(snapshot.storage_root())?;
        reload::open_listeners(&mut listeners)?;

        let mut pool = ServerPool::new();
        for listener in listeners {
            pool.add(ServerEndpoint::new(
                listener,
                snapshot.security_policy(),
                snapshot.credentials().cloned(),
                snapshot.auth_context().cloned(),
            ));
        }

        reload::install_storage(&mut directory, storage, accounts);
        reload::install_auth_context(&mut pool, &mut directory, snapshot.auth_context());

        let mut plugins = PluginManager::new(options.plugin_loader(snapshot.plugin_path()));
        let report = plugins.load_all(
            snapshot.plugins(),
            snapshot.plugin_parameters(),
            &directory,
        );

        if options.strict_plugins {
            if let Some(err) = report.failures.into_iter().next() {
                plugins.unload_all();
                pool.close_all();
                return Err(err.into());
            }
        }

        info!(
            port = ?pool.port(),
            endpoints = pool.len(),
            policy = %snapshot.security_policy(),
            storage = %snapshot.storage_root().display(),
            plugins = plugins.registry().len(),
            "Server started"
        );

        Ok(Self {
            snapshot: Arc::new(snapshot),
            pool,
            plugins,
            directory,
            options,
        })
    }

    /// Reload from `source`
    ///
    /// On error nothing about the running server changed.
    pub fn reload(&mut self, engine: &ReloadEngine, source: &ConfigSource) -> ReloadOutcome {
        engine.reload(self, source)
    }

    /// The active configuration
    pub fn snapshot(&self) -> &Arc<ConfigSnapshot> {
        &self.snapshot
    }

    /// The listening endpoints
    pub fn pool(&self) -> &ServerPool {
        &self.pool
    }

    /// Port the server listens on
    pub fn local_port(&self) -> Option<u16> {
        self.pool.port()
    }

    /// Loaded plugins and their state
    pub fn registry(&self) -> &PluginRegistry {
        self.plugins.registry()
    }

    /// The directory
    pub fn directory(&self) -> &D {
        &self.directory
    }

    /// The directory, mutably
    ///
    /// Connections and sessions added or removed through this reference are
    /// not reported to plugins; use [`ServerRun::add_connection`] and friends.
    pub fn directory_mut(&mut self) -> &mut D {
        &mut self.directory
    }

    /// Register a connection and report it to the plugins
    pub fn add_connection(&mut self, connection: Connection) -> tandem_core::Result<()> {
        let id = connection.id();
        self.directory.add_connection(connection)?;
        if let Some(connection) = self.directory.connection(id) {
            self.plugins.registry_mut().on_connection_added(connection);
        }
        Ok(())
    }

    /// Forget a connection, reporting it to the plugins first
    pub fn remove_connection(&mut self, id: ConnectionId) -> Option<Connection> {
        if let Some(connection) = self.directory.connection(id) {
            self.plugins.registry_mut().on_connection_removed(connection);
        }
        self.directory.remove_connection(id)
    }

    /// Register a session and report it to the plugins
    pub fn add_session(&mut self, session: Session) -> tandem_core::Result<()> {
        let id = session.id();
        self.directory.add_session(session)?;
        if let Some(session) = self.directory.session(id) {
            self.plugins.registry_mut().on_session_added(session);
        }
        Ok(())
    }

    /// Forget a session, reporting it to the plugins first
    pub fn remove_session(&mut self, id: SessionId) -> Option<Session> {
        if let Some(session) = self.directory.session(id) {
            self.plugins.registry_mut().on_session_removed(session);
        }
        self.directory.remove_session(id)
    }

    /// Unload the plugins and close every endpoint
    pub fn shutdown(&mut self) {
        self.plugins.unload_all();
        self.pool.close_all();
        info!("Server stopped");
    }
}
