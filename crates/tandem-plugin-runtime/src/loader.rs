//! Plugin loader

use crate::error::{LoadError, Result};
use crate::instance::PluginInstance;
use crate::source::ModuleSource;
use serde_json::{Map, Value};
use std::sync::Arc;
use tandem_plugin_api::{PluginContext, PluginParams, API_VERSION};
use tandem_storage::FilesystemStorage;
use tracing::{debug, info};

/// Turns plugin names into initialized [`PluginInstance`]s
#[derive(Debug, Clone)]
pub struct PluginLoader {
    source: Arc<dyn ModuleSource>,
}

impl PluginLoader {
    /// Load modules from `source`
    pub fn new(source: impl ModuleSource + 'static) -> Self {
        Self {
            source: Arc::new(source),
        }
    }

    /// Load modules from a shared source
    pub fn from_arc(source: Arc<dyn ModuleSource>) -> Self {
        Self { source }
    }

    /// Load and initialize the plugin `name`
    ///
    /// The module is resolved and its descriptor checked, the plugin value is
    /// created, `raw` is parsed against the declared parameters and finally
    /// `on_initialize` runs. A plugin whose parameters are rejected was never
    /// initialized and is dropped without `on_deinitialize`. A plugin whose
    /// `on_initialize` fails is deinitialized exactly once before the error
    /// is returned.
    pub fn load(
        &self,
        name: &str,
        raw: &Map<String, Value>,
        storage: &FilesystemStorage,
    ) -> Result<PluginInstance> {
        // Locals drop in reverse order, so the library outlives everything
        // created from it
        let (library, descriptor) = self.source.resolve(name)?.into_parts();

        if descriptor.api_version != API_VERSION {
            return Err(LoadError::AbiMismatch {
                name: name.to_string(),
                found: descriptor.api_version,
                expected: API_VERSION,
            });
        }

        if descriptor.name != name {
            return Err(LoadError::NameMismatch {
                requested: name.to_string(),
                found: descriptor.name.to_string(),
            });
        }

        let plugin = (descriptor.create)();
        let params = PluginParams::parse(descriptor.parameters, raw).map_err(|source| {
            LoadError::Parameter {
                name: name.to_string(),
                source,
            }
        })?;

        let mut instance = PluginInstance::new(descriptor, plugin, library);
        let ctx = PluginContext::new(name, storage.clone());

        debug!(plugin = %name, parameters = params.len(), "Initializing plugin");
        if let Err(e) = instance.plugin_mut().on_initialize(&ctx, &params) {
            let message = e.to_string();
            drop(e);
            instance.deinitialize();
            return Err(LoadError::Initialize {
                name: name.to_string(),
                message,
            });
        }

        info!(plugin = %name, id = %instance.id(), "Plugin loaded");
        Ok(instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StaticModuleSource;
    use serde_json::json;
    use tandem_plugin_api::testing::{EventLog, PluginEvent, RecordingPlugin};
    use tandem_plugin_api::PluginDescriptor;

    fn storage() -> FilesystemStorage {
        FilesystemStorage::new("/srv/tandem")
    }

    fn loader(log: &EventLog) -> PluginLoader {
        PluginLoader::new(
            StaticModuleSource::new()
                .with_descriptor(RecordingPlugin::descriptor("rec", log))
                .with_descriptor(RecordingPlugin::failing_descriptor("bad", log)),
        )
    }

    #[test]
    fn test_load_initializes() {
        let log = EventLog::new();
        let instance = loader(&log).load("rec", &Map::new(), &storage()).unwrap();

        assert_eq!(instance.name(), "rec");
        assert_eq!(log.events(), vec![PluginEvent::Initialized("rec")]);
    }

    #[test]
    fn test_unknown_plugin() {
        let log = EventLog::new();
        let err = loader(&log).load("nope", &Map::new(), &storage()).unwrap_err();

        assert!(matches!(err, LoadError::OpenFailed { .. }));
        assert!(log.events().is_empty());
    }

    #[test]
    fn test_initialize_failure_deinitializes_once() {
        let log = EventLog::new();
        let err = loader(&log).load("bad", &Map::new(), &storage()).unwrap_err();

        assert!(matches!(err, LoadError::Initialize { .. }));
        assert_eq!(
            log.events(),
            vec![
                PluginEvent::Initialized("bad"),
                PluginEvent::Deinitialized("bad")
            ]
        );
    }

    #[test]
    fn test_parameter_failure_skips_lifecycle() {
        let log = EventLog::new();
        let raw = json!({"unknown-key": 1});
        let err = loader(&log)
            .load("rec", raw.as_object().unwrap(), &storage())
            .unwrap_err();

        assert!(matches!(err, LoadError::Parameter { .. }));
        assert!(log.events().is_empty());
    }

    #[test]
    fn test_parameters_reach_plugin() {
        let log = EventLog::new();
        let raw = json!({"fail": true});
        let err = loader(&log)
            .load("rec", raw.as_object().unwrap(), &storage())
            .unwrap_err();

        assert!(matches!(err, LoadError::Initialize { .. }));
        assert_eq!(log.count(|e| matches!(e, PluginEvent::Deinitialized(_))), 1);
    }

    #[test]
    fn test_abi_mismatch() {
        let log = EventLog::new();
        let mut descriptor = RecordingPlugin::descriptor("old", &log);
        descriptor.api_version = API_VERSION + 1;
        let loader = PluginLoader::new(StaticModuleSource::new().with_descriptor(descriptor));

        assert!(matches!(
            loader.load("old", &Map::new(), &storage()),
            Err(LoadError::AbiMismatch { .. })
        ));
    }

    #[test]
    fn test_name_mismatch() {
        let log = EventLog::new();
        let descriptor: PluginDescriptor = RecordingPlugin::descriptor("real-name", &log);
        let mut source = StaticModuleSource::new();
        source.register("alias", move || descriptor.clone());

        assert!(matches!(
            PluginLoader::new(source).load("alias", &Map::new(), &storage()),
            Err(LoadError::NameMismatch { .. })
        ));
    }

    #[derive(Debug)]
    struct BrokenDisk;

    impl tandem_plugin_api::Plugin for BrokenDisk {
        fn on_initialize(
            &mut self,
            _ctx: &PluginContext,
            _params: &PluginParams,
        ) -> std::result::Result<(), tandem_plugin_api::PluginError> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk on fire").into())
        }
    }

    #[test]
    fn test_initialize_error_is_kept_as_text() {
        let descriptor = PluginDescriptor::new("disk", "Fails with an I/O error", || {
            Box::new(BrokenDisk)
        });
        let loader = PluginLoader::new(StaticModuleSource::new().with_descriptor(descriptor));

        let err = loader.load("disk", &Map::new(), &storage()).unwrap_err();
        match &err {
            LoadError::Initialize { name, message } => {
                assert_eq!(name, "disk");
                assert!(message.contains("disk on fire"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(std::error::Error::source(&err).is_none());
    }
}
