//! # Autosave Plugin
//!
//! Writes text documents back to storage while they are being edited.
//!
//! Every text session gets an [`AutosaveSession`]. The session host reports
//! new document content through [`AutosaveSession::record_change`] (found via
//! the plugin registry's session lookups) and calls
//! [`AutosaveSession::flush_if_due`] periodically. Pending content is written
//! once `interval` seconds passed since the last save, and always when the
//! session closes. After each save the optional `hook` runs with the path of
//! the written file as its only argument.
//!
//! ## Parameters
//!
//! - `interval` (unsigned integer, required): seconds between saves
//! - `hook` (path): program to run after a document was saved

#![deny(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};
use tandem_plugin_api::prelude::*;
use tandem_plugin_api::ParameterKind;
use tandem_storage::FilesystemStorage;
use tracing::{debug, info, warn};

/// Parameters accepted by the autosave plugin
pub const PARAMETERS: &[ParameterSpec] = &[
    ParameterSpec::required("interval", ParameterKind::UInt, "Seconds between saves"),
    ParameterSpec::optional("hook", ParameterKind::Path, "Program run after each save"),
];

/// Session type the plugin keeps state for
pub const SESSION_TYPE: &str = "text";

/// Periodic document saver
#[derive(Debug, Default)]
pub struct AutosavePlugin {
    settings: Option<Settings>,
}

#[derive(Debug, Clone)]
struct Settings {
    interval: Duration,
    hook: Option<PathBuf>,
    storage: FilesystemStorage,
}

impl AutosavePlugin {
    /// Uninitialized plugin
    pub fn new() -> Self {
        Self::default()
    }

    /// Descriptor of the plugin
    pub fn descriptor() -> PluginDescriptor {
        PluginDescriptor::new(
            "autosave",
            "Periodically saves text documents to storage",
            || Box::new(AutosavePlugin::new()),
        )
        .with_parameters(PARAMETERS)
        .with_session_type(SESSION_TYPE)
    }

    /// Configured save interval
    pub fn interval(&self) -> Option<Duration> {
        self.settings.as_ref().map(|s| s.interval)
    }
}

impl Plugin for AutosavePlugin {
    fn on_initialize(&mut self, ctx: &PluginContext, params: &PluginParams) -> Result<(), PluginError> {
        ctx.adopt_host_logging();

        let interval = match params.get_uint("interval") {
            Some(0) | None => return Err(PluginError::parameter("interval", "must be at least 1")),
            Some(seconds) => Duration::from_secs(seconds),
        };
        let hook = params.get_path("hook").map(Path::to_path_buf);

        info!(
            plugin = ctx.plugin_name(),
            interval = ?interval,
            hook = ?hook,
            "Autosave enabled"
        );

        self.settings = Some(Settings {
            interval,
            hook,
            storage: ctx.storage().clone(),
        });
        Ok(())
    }

    fn on_deinitialize(&mut self) {
        self.settings = None;
    }

    fn session_state(&self) -> SideState {
        Box::new(AutosaveSession::default())
    }

    fn on_session_added(&mut self, session: &Session, state: Option<&mut SideState>) {
        let (Some(settings), Some(state)) = (&self.settings, state) else {
            return;
        };
        if let Some(autosave) = state.downcast_mut::<AutosaveSession>() {
            autosave.bind(session.path(), settings.clone());
            debug!(session = %session.id(), path = session.path(), "Autosave tracking session");
        }
    }

    fn on_session_removed(&mut self, session: &Session, state: Option<&mut SideState>) {
        let Some(autosave) = state.and_then(|s| s.downcast_mut::<AutosaveSession>()) else {
            return;
        };
        if let Err(e) = autosave.flush() {
            warn!(session = %session.id(), path = session.path(), error = %e, "Final save failed");
        }
    }
}

/// Autosave state of one text session
#[derive(Debug, Default)]
pub struct AutosaveSession {
    target: Option<Target>,
    pending: Option<Vec<u8>>,
    last_save: Option<Instant>,
    saves: u64,
}

#[derive(Debug)]
struct Target {
    document: String,
    settings: Settings,
}

impl AutosaveSession {
    fn bind(&mut self, document: &str, settings: Settings) {
        self.target = Some(Target {
            document: document.to_string(),
            settings,
        });
        self.last_save = Some(Instant::now());
    }

    /// Replace the content waiting to be saved
    pub fn record_change(&mut self, content: Vec<u8>) {
        self.pending = Some(content);
    }

    /// Whether there is content that was not saved yet
    pub fn is_dirty(&self) -> bool {
        self.pending.is_some()
    }

    /// Whether unsaved content is older than the save interval at `now`
    pub fn is_due(&self, now: Instant) -> bool {
        match (&self.target, self.last_save) {
            (Some(target), Some(last)) if self.is_dirty() => {
                now.saturating_duration_since(last) >= target.settings.interval
            }
            _ => false,
        }
    }

    /// Save if [`is_due`](Self::is_due); returns whether a save happened
    pub fn flush_if_due(&mut self, now: Instant) -> Result<bool, PluginError> {
        if self.is_due(now) {
            self.flush()
        } else {
            Ok(false)
        }
    }

    /// Save pending content now; returns whether there was anything to save
    pub fn flush(&mut self) -> Result<bool, PluginError> {
        let Some(target) = &self.target else {
            return Ok(false);
        };
        let Some(content) = self.pending.take() else {
            return Ok(false);
        };

        let storage = &target.settings.storage;
        if let Err(e) = storage.write_document(&target.document, &content) {
            self.pending = Some(content);
            return Err(e.into());
        }

        self.last_save = Some(Instant::now());
        self.saves += 1;
        debug!(document = %target.document, bytes = content.len(), "Document saved");

        if let Some(hook) = &target.settings.hook {
            let path = storage.document_path(&target.document)?;
            run_hook(hook, &path);
        }
        Ok(true)
    }

    /// Number of saves so far
    pub fn saves(&self) -> u64 {
        self.saves
    }
}

/// Start `hook` for `path` without waiting for it
fn run_hook(hook: &Path, path: &Path) {
    match Command::new(hook).arg(path).spawn() {
        Ok(mut child) => {
            let hook = hook.to_path_buf();
            // Reap the child off the event loop
            std::thread::spawn(move || match child.wait() {
                Ok(status) if !status.success() => {
                    warn!(hook = %hook.display(), %status, "Autosave hook failed");
                }
                Err(e) => warn!(hook = %hook.display(), error = %e, "Autosave hook failed"),
                Ok(_) => {}
            });
        }
        Err(e) => warn!(hook = %hook.display(), error = %e, "Could not run autosave hook"),
    }
}

tandem_plugin_api::export_plugin!(AutosavePlugin::descriptor());
