//! Hot reload: diff the module directory against the loaded hosts.

use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::error::{LoadError, ScanError};
use crate::events::{Event, EventKind};
use crate::host::{panic_message, HostCore, ScriptHost};

use super::directory::ModuleFile;
use super::Engine;

/// Outcome of one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Eligible files found.
    pub scanned: usize,
    /// New modules loaded.
    pub added: usize,
    /// Modified modules reloaded.
    pub updated: usize,
    /// Modules whose file disappeared.
    pub removed: usize,
    /// Files that could not be loaded or started.
    pub failed: Vec<LoadFailure>,
}

/// One module that failed to load during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadFailure {
    /// Module file.
    pub path: PathBuf,
    /// Stable error label.
    pub label: &'static str,
    /// Rendered error.
    pub error: String,
}

impl From<&LoadError> for LoadFailure {
    fn from(e: &LoadError) -> Self {
        Self {
            path: e.path().clone(),
            label: e.as_label(),
            error: e.to_string(),
        }
    }
}

impl Engine {
    /// Runs one scan now, waiting for any scan in flight to finish first.
    pub async fn scan(&self) -> Result<ScanReport, ScanError> {
        let _gate = self.inner.scan_gate.lock().await;
        self.scan_locked().await
    }

    /// Schedules a scan in the background.
    ///
    /// Requests made while one is already queued are merged into it, so a
    /// burst of change notifications costs at most one scan after the one
    /// in flight.
    pub fn request_rescan(&self) {
        if self.inner.rescan_pending.swap(true, Ordering::SeqCst) {
            debug!("rescan already queued");
            return;
        }
        let engine = self.clone();
        self.inner.services.runtime.spawn(async move {
            let _gate = engine.inner.scan_gate.lock().await;
            engine.inner.rescan_pending.store(false, Ordering::SeqCst);
            if engine.inner.token.is_cancelled() {
                return;
            }
            // failures are already logged and published
            let _ = engine.scan_locked().await;
        });
    }

    async fn scan_locked(&self) -> Result<ScanReport, ScanError> {
        let bus = &self.inner.services.bus;
        let files = match self.inner.directory.list().await {
            Ok(files) => files,
            Err(e) => {
                error!(label = e.as_label(), error = %e, "scan failed");
                bus.publish(Event::new(EventKind::ScanFailed).with_reason(e.to_string()));
                return Err(e);
            }
        };

        let mut report = ScanReport {
            scanned: files.len(),
            ..ScanReport::default()
        };
        let mut seen = HashSet::with_capacity(files.len());

        for file in &files {
            seen.insert(file.path.clone());
            let updating = match self.host(&file.path) {
                None => false,
                Some(host) if host.modified() == file.modified => continue,
                Some(host) => {
                    self.unload(&host, "modified");
                    self.inner.loader.evict(&file.path);
                    true
                }
            };
            match self.load(file).await {
                Ok(_) if updating => report.updated += 1,
                Ok(_) => report.added += 1,
                Err(e) => {
                    error!(path = %file.path.display(), label = e.as_label(), error = %e, "module failed to load");
                    bus.publish(
                        Event::new(EventKind::HostFailed)
                            .with_host(file.path.display().to_string())
                            .with_reason(e.to_string()),
                    );
                    report.failed.push(LoadFailure::from(&e));
                }
            }
        }

        let gone: Vec<ScriptHost> = self
            .hosts()
            .into_iter()
            .filter(|h| !seen.contains(h.path()))
            .collect();
        for host in &gone {
            self.unload(host, "deleted");
            self.inner.loader.evict(host.path());
            report.removed += 1;
        }

        info!(
            scanned = report.scanned,
            added = report.added,
            updated = report.updated,
            removed = report.removed,
            failed = report.failed.len(),
            "scan finished"
        );
        bus.publish(Event::new(EventKind::ScanCompleted).with_report(report.clone()));
        Ok(report)
    }

    /// Constructs, registers and starts the module of `file`.
    ///
    /// Construction runs synchronously with the new host as the current one;
    /// scripts are started on the next scheduler tick. Any failure shuts the
    /// partial host down with reason `"failed"` and leaves it unregistered.
    async fn load(&self, file: &ModuleFile) -> Result<ScriptHost, LoadError> {
        let factory = self.inner.loader.load(&file.path)?;
        let core = HostCore::new(&file.path, file.modified, self.inner.services.clone());

        *self.inner.constructing.lock() = Some(Arc::clone(&core));
        let built = panic::catch_unwind(AssertUnwindSafe(|| factory(self)));
        *self.inner.constructing.lock() = None;

        let constructed = match built {
            Ok(Ok(module)) => {
                core.set_module(module);
                Ok(())
            }
            Ok(Err(e)) => Err(LoadError::Construct {
                path: file.path.clone(),
                error: format!("{e:#}"),
            }),
            Err(payload) => Err(LoadError::Panicked {
                path: file.path.clone(),
                message: panic_message(payload.as_ref()),
            }),
        };
        if let Err(e) = constructed {
            core.shutdown("failed");
            return Err(e);
        }

        let host = ScriptHost::new(core);
        self.inner.hosts.lock().push(host.clone());
        debug!(host = %file.path.display(), "host constructed");

        tokio::task::yield_now().await;
        if let Err(e) = host.core.start() {
            host.shutdown("failed");
            self.inner.hosts.lock().retain(|h| !h.same_as(&host));
            return Err(LoadError::Start {
                path: file.path.clone(),
                error: format!("{e:#}"),
            });
        }

        info!(host = %file.path.display(), scripts = host.scripts().len(), "host loaded");
        self.inner
            .services
            .bus
            .publish(Event::new(EventKind::HostLoaded).with_host(file.path.display().to_string()));
        Ok(host)
    }
}
