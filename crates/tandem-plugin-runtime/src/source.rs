//! Where plugin modules come from
//!
//! A [`ModuleSource`] turns a plugin name into a [`PluginModule`]: the
//! module's descriptor plus whatever keeps the module's code mapped.

use crate::error::{LoadError, Result};
use libloading::Library;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tandem_plugin_api::{PluginDescriptor, RegisterFn, REGISTER_SYMBOL};
use tracing::debug;

/// A resolved plugin module
pub struct PluginModule {
    descriptor: PluginDescriptor,
    library: Option<Arc<Library>>,
}

impl PluginModule {
    /// Module compiled into the server
    pub fn builtin(descriptor: PluginDescriptor) -> Self {
        Self {
            descriptor,
            library: None,
        }
    }

    /// Descriptor of the module
    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    /// Whether the module was loaded from a shared library
    pub fn is_native(&self) -> bool {
        self.library.is_some()
    }

    pub(crate) fn into_parts(self) -> (Option<Arc<Library>>, PluginDescriptor) {
        (self.library, self.descriptor)
    }
}

impl fmt::Debug for PluginModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginModule")
            .field("descriptor", &self.descriptor)
            .field("native", &self.is_native())
            .finish()
    }
}

/// Resolves plugin names to modules
pub trait ModuleSource: Send + Sync + fmt::Debug {
    /// Find and open the module for `name`
    ///
    /// Fails with [`LoadError::OpenFailed`] if there is no such module.
    fn resolve(&self, name: &str) -> Result<PluginModule>;
}

impl<S: ModuleSource + ?Sized> ModuleSource for Arc<S> {
    fn resolve(&self, name: &str) -> Result<PluginModule> {
        (**self).resolve(name)
    }
}

/// Modules compiled into the server
#[derive(Default)]
pub struct StaticModuleSource {
    modules: BTreeMap<String, Arc<dyn Fn() -> PluginDescriptor + Send + Sync>>,
}

impl StaticModuleSource {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module under `name`
    pub fn register<F>(&mut self, name: impl Into<String>, register: F) -> &mut Self
    where
        F: Fn() -> PluginDescriptor + Send + Sync + 'static,
    {
        self.modules.insert(name.into(), Arc::new(register));
        self
    }

    /// Register a descriptor under its own name
    pub fn with_descriptor(mut self, descriptor: PluginDescriptor) -> Self {
        let name = descriptor.name;
        self.register(name, move || descriptor.clone());
        self
    }

    /// Names of all registered modules
    pub fn names(&self) -> Vec<&str> {
        self.modules.keys().map(String::as_str).collect()
    }
}

impl fmt::Debug for StaticModuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticModuleSource")
            .field("modules", &self.names())
            .finish()
    }
}

impl ModuleSource for StaticModuleSource {
    fn resolve(&self, name: &str) -> Result<PluginModule> {
        let register = self
            .modules
            .get(name)
            .ok_or_else(|| LoadError::open_failed(name, "no built-in module with this name"))?;
        Ok(PluginModule::builtin(register()))
    }
}

/// Shared libraries in a search directory
#[derive(Debug, Clone)]
pub struct NativeModuleSource {
    search_path: PathBuf,
}

impl NativeModuleSource {
    /// Search `search_path` for modules
    pub fn new(search_path: impl Into<PathBuf>) -> Self {
        Self {
            search_path: search_path.into(),
        }
    }

    /// Directory searched for modules
    pub fn search_path(&self) -> &Path {
        &self.search_path
    }

    /// File a plugin is expected in
    ///
    /// `libtandem_plugin_<name>.so` on Linux, with `-` in the name mapped
    /// to `_`, and the platform's equivalent elsewhere.
    pub fn module_path(&self, name: &str) -> PathBuf {
        let stem = format!("tandem_plugin_{}", name.replace('-', "_"));
        self.search_path.join(libloading::library_filename(stem))
    }

    #[allow(unsafe_code)]
    fn open(&self, name: &str, path: &Path) -> Result<PluginModule> {
        // SAFETY: loading runs the module's initializers; modules in the
        // search path are trusted to be tandem plugins built by the same
        // toolchain.
        let library = unsafe { Library::new(path) }
            .map_err(|e| LoadError::open_failed(name, e))?;

        // SAFETY: the symbol is declared by `export_plugin!` with exactly
        // the `RegisterFn` signature.
        let register: RegisterFn = unsafe {
            let symbol = library
                .get::<RegisterFn>(REGISTER_SYMBOL)
                .map_err(|e| LoadError::no_entry_point(name, e))?;
            *symbol
        };

        let descriptor = register();
        debug!(plugin = %name, path = %path.display(), "Opened native plugin module");

        Ok(PluginModule {
            descriptor,
            library: Some(Arc::new(library)),
        })
    }
}

impl ModuleSource for NativeModuleSource {
    fn resolve(&self, name: &str) -> Result<PluginModule> {
        let path = self.module_path(name);
        if !path.is_file() {
            return Err(LoadError::open_failed(
                name,
                format!("{} not found", path.display()),
            ));
        }
        self.open(name, &path)
    }
}

/// Tries several sources in order
#[derive(Debug, Default)]
pub struct ChainedModuleSource {
    sources: Vec<Box<dyn ModuleSource>>,
}

impl ChainedModuleSource {
    /// Create an empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a source
    pub fn with(mut self, source: impl ModuleSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }
}

impl ModuleSource for ChainedModuleSource {
    /// The first source that opens the module wins. Other errors than
    /// [`LoadError::OpenFailed`] stop the search; if every source reports
    /// `OpenFailed`, their messages are combined.
    fn resolve(&self, name: &str) -> Result<PluginModule> {
        let mut messages = Vec::new();

        for source in &self.sources {
            match source.resolve(name) {
                Ok(module) => return Ok(module),
                Err(LoadError::OpenFailed { message, .. }) => messages.push(message),
                Err(other) => return Err(other),
            }
        }

        if messages.is_empty() {
            messages.push("no module sources configured".to_string());
        }
        Err(LoadError::open_failed(name, messages.join("; ")))
    }
}
