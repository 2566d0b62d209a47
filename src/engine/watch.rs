//! # Directory watcher adapter.
//!
//! Wraps a `notify` watcher and turns filesystem events on the scripts
//! directory into [`DirectoryChange`] notifications. The engine does not
//! interpret them beyond "rescan".

use std::path::{Path, PathBuf};

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::RuntimeError;

/// Something changed in the watched directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryChange {
    /// Paths reported by the watcher (may be empty).
    pub paths: Vec<PathBuf>,
}

/// Keeps a directory watch alive; dropping it stops notifications.
pub struct DirectoryWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl DirectoryWatcher {
    /// Watches `dir` (not recursively).
    pub fn new(dir: &Path) -> Result<(Self, mpsc::UnboundedReceiver<DirectoryChange>), RuntimeError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let watch_err = |source| RuntimeError::Watch {
            path: dir.to_path_buf(),
            source,
        };

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Access(_)) {
                        return;
                    }
                    debug!(kind = ?event.kind, paths = ?event.paths, "watch event");
                    let _ = tx.send(DirectoryChange { paths: event.paths });
                }
                Err(e) => warn!(error = %e, "watch error"),
            },
            Config::default(),
        )
        .map_err(watch_err)?;
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(watch_err)?;

        Ok((
            Self {
                _watcher: watcher,
                root: dir.to_path_buf(),
            },
            rx,
        ))
    }

    /// Watched directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}
