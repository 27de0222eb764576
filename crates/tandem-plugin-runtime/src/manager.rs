//! Plugin manager for batch operations

use crate::error::LoadError;
use crate::loader::PluginLoader;
use crate::registry::PluginRegistry;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use tandem_core::Directory;
use tracing::{error, info, warn};

/// Outcome of [`PluginManager::load_all`]
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Plugins that loaded, in load order
    pub loaded: Vec<String>,
    /// Plugins that did not
    pub failures: Vec<LoadError>,
}

impl LoadReport {
    /// Number of plugins that loaded
    pub fn active(&self) -> usize {
        self.loaded.len()
    }

    /// Whether every requested plugin loaded
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A loader paired with the registry it fills
#[derive(Debug)]
pub struct PluginManager {
    loader: PluginLoader,
    registry: PluginRegistry,
}

impl PluginManager {
    /// Create a manager with an empty registry
    pub fn new(loader: PluginLoader) -> Self {
        Self {
            loader,
            registry: PluginRegistry::new(),
        }
    }

    /// The loader
    pub fn loader(&self) -> &PluginLoader {
        &self.loader
    }

    /// The registry
    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// The registry, mutably
    pub fn registry_mut(&mut self) -> &mut PluginRegistry {
        &mut self.registry
    }

    /// Load every plugin in `requested`
    ///
    /// Plugins load independently: a failure is logged and recorded in the
    /// report and the rest of the batch continues. Names listed twice are
    /// loaded once. Each plugin gets its table from `parameters` (empty if
    /// absent) and the directory's current storage. Afterwards every
    /// connection and session in `directory` is reported to the registry.
    pub fn load_all(
        &mut self,
        requested: &[String],
        parameters: &BTreeMap<String, Map<String, Value>>,
        directory: &dyn Directory,
    ) -> LoadReport {
        let empty = Map::new();
        let mut seen = BTreeSet::new();
        let mut report = LoadReport::default();

        for name in requested {
            if !seen.insert(name.as_str()) {
                warn!(plugin = %name, "Plugin requested more than once, loading it once");
                continue;
            }
            if self.registry.contains(name) {
                warn!(plugin = %name, "Plugin already loaded");
                continue;
            }

            let raw = parameters.get(name).unwrap_or(&empty);
            match self.loader.load(name, raw, directory.storage()) {
                Ok(instance) => {
                    self.registry.insert(instance);
                    report.loaded.push(name.clone());
                }
                Err(e) => {
                    error!(plugin = %name, error = %e, "Failed to load plugin");
                    report.failures.push(e);
                }
            }
        }

        self.registry.observe(directory);

        if !requested.is_empty() && report.loaded.is_empty() {
            warn!("No plugin could be loaded, plugins are disabled until the next reload");
        } else {
            info!(
                loaded = report.loaded.len(),
                failed = report.failures.len(),
                "Plugins loaded"
            );
        }

        report
    }

    /// Unload every plugin
    pub fn unload_all(&mut self) {
        self.registry.unload_all();
    }
}
