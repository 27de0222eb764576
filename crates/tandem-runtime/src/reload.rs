//! Live configuration reload
//!
//! A reload runs in stages. Everything up to and including opening new
//! listeners only acquires resources the running server does not know
//! about yet; any failure there drops them and returns an error, leaving the
//! server exactly as it was. Once new listeners are open the reload commits:
//! endpoints, plugins and storage, authentication and finally the snapshot
//! are replaced, and nothing after that point fails the reload.

use crate::error::{ReloadError, Result};
use crate::listener::{families_for, Listener, ListenerFactory};
use crate::pool::{ServerEndpoint, ServerPool};
use crate::run::ServerRun;
use crate::snapshot::ConfigSnapshot;
use std::net::IpAddr;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tandem_config::{Config, ConfigSource};
use tandem_core::{AddressFamily, AuthContext, Directory};
use tandem_plugin_runtime::{LoadError, PluginManager};
use tandem_storage::{FilesystemAccountStorage, FilesystemStorage};
use tandem_tls::DhParams;
use tracing::{debug, error, info, warn};

/// What a successful reload changed
#[derive(Debug, Default)]
pub struct ReloadSummary {
    /// Listeners were replaced because the port changed
    pub listeners_replaced: bool,
    /// A storage at a new root was installed
    pub storage_replaced: bool,
    /// Plugins active after the reload
    pub plugins_loaded: usize,
    /// Plugins that failed to load
    pub plugin_failures: Vec<LoadError>,
    /// Authentication handshakes aborted by the new authentication context
    pub aborted_authentications: usize,
}

/// Result of a reload
pub type ReloadOutcome = Result<ReloadSummary>;

/// Runs reloads against a [`ServerRun`]
#[derive(Debug, Default)]
pub struct ReloadEngine {
    generation: AtomicU64,
}

impl ReloadEngine {
    /// Create an engine
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of reloads attempted so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }

    /// Reload `run` from `source`
    pub fn reload<D: Directory>(&self, run: &mut ServerRun<D>, source: &ConfigSource) -> ReloadOutcome {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        info!(generation, "Reloading configuration");

        match Self::run_stages(run, source) {
            Ok(summary) => {
                info!(
                    generation,
                    listeners_replaced = summary.listeners_replaced,
                    storage_replaced = summary.storage_replaced,
                    plugins = summary.plugins_loaded,
                    plugin_failures = summary.plugin_failures.len(),
                    "Configuration reloaded"
                );
                Ok(summary)
            }
            Err(e) => {
                error!(generation, kind = e.kind(), error = %e, "Reload failed, keeping current configuration");
                Err(e)
            }
        }
    }

    fn run_stages<D: Directory>(run: &mut ServerRun<D>, source: &ConfigSource) -> ReloadOutcome {
        // Parse and security material
        let config = source
            .load()
            .map_err(|e| ReloadError::ConfigParseFailed(e.to_string()))?;
        let candidate = prepare_snapshot(config, run.snapshot.dh_params())?;

        // Listen address
        if candidate.listen_address() != run.snapshot.listen_address() {
            return Err(ReloadError::ListenAddressChangeUnsupported {
                current: describe_address(run.snapshot.listen_address()),
                requested: describe_address(candidate.listen_address()),
            });
        }

        // Port
        let Some(current_port) = run.pool.port() else {
            debug_assert!(false, "running server without listener");
            return Err(ReloadError::internal("the server has no open listener"));
        };
        let port_changed = candidate.port() != current_port
            && !(candidate.port() == 0 && run.snapshot.port() == 0);

        // Speculative listeners
        let mut listeners = if port_changed {
            debug!(from = current_port, to = candidate.port(), "Port changed");
            Some(bind_listeners(
                run.options.listener_factory(),
                candidate.listen_address(),
                candidate.port(),
            )?)
        } else {
            None
        };

        // Speculative storage
        let storage = if candidate.storage_root() != run.snapshot.storage_root() {
            debug!(
                from = %run.snapshot.storage_root().display(),
                to = %candidate.storage_root().display(),
                "Storage root changed"
            );
            Some(attach_storage(candidate.storage_root())?)
        } else {
            None
        };

        // Last point of return
        if let Some(listeners) = &mut listeners {
            open_listeners(listeners)?;
        }

        let mut summary = ReloadSummary {
            listeners_replaced: listeners.is_some(),
            storage_replaced: storage.is_some(),
            ..ReloadSummary::default()
        };

        // Endpoints
        match listeners {
            Some(listeners) => replace_endpoints(&mut run.pool, listeners, &candidate),
            None => {
                for endpoint in run.pool.endpoints_mut() {
                    endpoint.set_credentials(candidate.credentials().cloned());
                    endpoint.set_security_policy(candidate.security_policy());
                }
            }
        }

        // Old plugins go before the storage they were initialized with
        run.plugins.unload_all();
        if let Some((storage, accounts)) = storage {
            install_storage(&mut run.directory, storage, accounts);
        }

        run.plugins = PluginManager::new(run.options.plugin_loader(candidate.plugin_path()));
        let report = run.plugins.load_all(
            candidate.plugins(),
            candidate.plugin_parameters(),
            &run.directory,
        );
        summary.plugins_loaded = report.active();
        summary.plugin_failures = report.failures;

        // Authentication
        summary.aborted_authentications =
            install_auth_context(&mut run.pool, &mut run.directory, candidate.auth_context());

        run.snapshot = Arc::new(candidate);
        Ok(summary)
    }
}

/// Build the candidate snapshot and make sure its DH parameters exist
///
/// `live` parameters are reused when the group did not change.
pub(crate) fn prepare_snapshot(config: Config, live: Option<&Arc<DhParams>>) -> Result<ConfigSnapshot> {
    let snapshot = ConfigSnapshot::from_config(config)
        .map_err(|e| ReloadError::ConfigParseFailed(e.to_string()))?;

    if snapshot.credentials().is_none() {
        return Ok(snapshot);
    }

    let params = DhParams::ensure(live, snapshot.dh_group())
        .map_err(|e| ReloadError::SecurityMaterial(e.to_string()))?;
    snapshot
        .with_dh_params(params)
        .map_err(|e| ReloadError::SecurityMaterial(e.to_string()))
}

/// Create and bind listeners for `address`
///
/// Succeeds if at least one family binds. When all fail, the IPv4 error is
/// reported, or the only error if a single family was tried.
pub(crate) fn bind_listeners(
    factory: &dyn ListenerFactory,
    address: Option<IpAddr>,
    port: u16,
) -> Result<Vec<Box<dyn Listener>>> {
    let mut bound = Vec::new();
    let mut last_error = None;

    for family in families_for(address) {
        let mut listener = factory.create(family, address, port);
        match listener.bind() {
            Ok(()) => bound.push(listener),
            Err(e) => {
                warn!(%family, port, error = %e, "Failed to bind listener");
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(e) if bound.is_empty() => Err(ReloadError::ListenerBindFailed(e.to_string())),
        _ => Ok(bound),
    }
}

/// Open bound listeners, dropping the ones that fail
///
/// Fails if none opens, reporting the first error.
pub(crate) fn open_listeners(listeners: &mut Vec<Box<dyn Listener>>) -> Result<()> {
    let mut first_error = None;

    listeners.retain_mut(|listener| match listener.open() {
        Ok(()) => true,
        Err(e) => {
            warn!(family = %listener.family(), error = %e, "Failed to open listener");
            first_error.get_or_insert(e);
            false
        }
    });

    match first_error {
        Some(e) if listeners.is_empty() => Err(ReloadError::ListenerOpenFailed(e.to_string())),
        _ => Ok(()),
    }
}

/// Storage at `root` with an account storage attached to it
///
/// Nothing is created on disk until [`install_storage`].
pub(crate) fn attach_storage(root: &Path) -> Result<(FilesystemStorage, FilesystemAccountStorage)> {
    let storage = FilesystemStorage::new(root);
    let mut accounts = FilesystemAccountStorage::new();
    accounts
        .attach(&storage)
        .map_err(|e| ReloadError::StorageAttachFailed(e.to_string()))?;
    Ok((storage, accounts))
}

/// Create the storage root and hand the storage to `directory`
///
/// Runs after the commit point, so a root that cannot be created is only
/// logged; the first document write retries it.
pub(crate) fn install_storage(
    directory: &mut dyn Directory,
    storage: FilesystemStorage,
    accounts: FilesystemAccountStorage,
) {
    if let Err(e) = storage.ensure_root() {
        warn!(root = %storage.root_directory().display(), error = %e, "Cannot create storage root");
    }
    directory.set_storage(storage, accounts);
}

/// Close the current endpoints and register `listeners`, IPv6 first
fn replace_endpoints(pool: &mut ServerPool, mut listeners: Vec<Box<dyn Listener>>, candidate: &ConfigSnapshot) {
    for mut endpoint in pool.take_all() {
        endpoint.close();
    }

    listeners.sort_by_key(|l| l.family() != AddressFamily::Ipv6);
    for listener in listeners {
        pool.add(ServerEndpoint::new(
            listener,
            candidate.security_policy(),
            candidate.credentials().cloned(),
            candidate.auth_context().cloned(),
        ));
    }
}

/// Install `context` on every endpoint and connection
///
/// Returns the number of authentication handshakes that were aborted.
pub(crate) fn install_auth_context(
    pool: &mut ServerPool,
    directory: &mut dyn Directory,
    context: Option<&Arc<AuthContext>>,
) -> usize {
    for endpoint in pool.endpoints_mut() {
        endpoint.set_auth_context(context.cloned());
    }

    directory.set_security_context(context.cloned());

    let mut aborted = 0;
    directory.for_each_connection_mut(&mut |connection| {
        if connection.reset_authentication(context.cloned()) {
            aborted += 1;
        }
    });

    if aborted > 0 {
        info!(aborted, "Aborted authentication in progress");
    }
    aborted
}

fn describe_address(address: Option<IpAddr>) -> String {
    address.map_or_else(|| "any address".to_string(), |a| a.to_string())
}
