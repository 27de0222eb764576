//! Configuration file watcher

use crate::server::ServerHandle;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tandem_core::{Error, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Requests a reload when a configuration file changes
///
/// The directories containing the files are watched rather than the files,
/// so editors that save by replacing the file are noticed too. Events are
/// debounced: a burst of changes results in one reload request once no
/// further change arrived for the debounce period.
pub struct ConfigWatcher {
    paths: Vec<PathBuf>,
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl ConfigWatcher {
    /// Watch `paths` and send reload requests to `handle`
    ///
    /// Must be called within a tokio runtime.
    pub fn spawn(paths: Vec<PathBuf>, debounce: Duration, handle: ServerHandle) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default(),
        )
        .map_err(|e| Error::Runtime(format!("Failed to create file watcher: {e}")))?;

        let directories: BTreeSet<&Path> = paths
            .iter()
            .map(|p| p.parent().filter(|d| !d.as_os_str().is_empty()).unwrap_or(Path::new(".")))
            .collect();
        for dir in directories {
            watcher
                .watch(dir, RecursiveMode::NonRecursive)
                .map_err(|e| {
                    Error::Runtime(format!("Failed to watch {}: {e}", dir.display()))
                })?;
        }

        info!(files = ?paths, debounce = ?debounce, "Watching configuration files");

        let task = tokio::spawn(watch_loop(rx, paths.clone(), debounce, handle));
        Ok(Self {
            paths,
            _watcher: watcher,
            task,
        })
    }

    /// Watched files
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl fmt::Debug for ConfigWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigWatcher")
            .field("paths", &self.paths)
            .finish()
    }
}

async fn watch_loop(
    mut rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    paths: Vec<PathBuf>,
    debounce: Duration,
    handle: ServerHandle,
) {
    while let Some(res) = rx.recv().await {
        match res {
            Ok(event) if is_relevant(&event, &paths) => {
                debug!(kind = ?event.kind, paths = ?event.paths, "Configuration file changed");

                // Wait for the burst to settle
                loop {
                    match tokio::time::timeout(debounce, rx.recv()).await {
                        Ok(Some(_)) => continue,
                        Ok(None) => return,
                        Err(_) => break,
                    }
                }

                if handle.request_reload() {
                    info!("Configuration changed, reload requested");
                } else {
                    warn!("Could not queue reload request");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "File watcher error"),
        }
    }
}

/// Whether `event` modifies one of `paths`
fn is_relevant(event: &Event, paths: &[PathBuf]) -> bool {
    matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
    ) && event
        .paths
        .iter()
        .any(|changed| paths.iter().any(|p| same_file(changed, p)))
}

fn same_file(changed: &Path, watched: &Path) -> bool {
    if changed == watched {
        return true;
    }
    // Events carry absolute paths, configured paths may be relative
    changed.file_name() == watched.file_name()
        && match (changed.parent(), watched.canonicalize().ok()) {
            (Some(parent), Some(watched)) => Some(parent) == watched.parent(),
            _ => false,
        }
}
