use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::error::{HostError, TransportError};
use crate::events::{Event, EventKind};
use crate::host::{panic_message, HostCore, HostServices, Outbound, ScriptHost, SendRequest, Stage};
use crate::message::Message;
use crate::script::{FaultMode, Script};

use super::builder::EngineBuilder;
use super::directory::ModuleDirectory;
use super::loader::ModuleLoader;
use super::transport::Transport;
use super::watch::DirectoryChange;

/// The script engine. Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct Engine {
    pub(crate) inner: Arc<EngineInner>,
}

pub(crate) struct EngineInner {
    pub(crate) config: EngineConfig,
    pub(crate) services: HostServices,
    pub(crate) loader: Arc<dyn ModuleLoader>,
    pub(crate) directory: Arc<dyn ModuleDirectory>,
    /// Loaded hosts, in load order; at most one per path.
    pub(crate) hosts: Mutex<Vec<ScriptHost>>,
    /// Host under construction; only set while its factory runs.
    pub(crate) constructing: Mutex<Option<Arc<HostCore>>>,
    pub(crate) scan_gate: tokio::sync::Mutex<()>,
    pub(crate) rescan_pending: AtomicBool,
    pub(crate) token: CancellationToken,
}

impl Engine {
    /// Starts building an engine.
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// Configuration the engine was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Receiver of runtime events published after this call.
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.inner.services.bus.subscribe()
    }

    /// Creates a script in the module currently being constructed.
    ///
    /// Only valid inside a module factory; elsewhere fails with
    /// [`HostError::NoCurrentHost`].
    pub fn new_script(&self, name: Option<&str>) -> Result<Script, HostError> {
        let core = self
            .inner
            .constructing
            .lock()
            .clone()
            .ok_or(HostError::NoCurrentHost)?;
        core.new_script(name)
    }

    /// Loaded hosts, in load order.
    pub fn hosts(&self) -> Vec<ScriptHost> {
        self.inner.hosts.lock().clone()
    }

    /// Host loaded from `path`, if any.
    pub fn host(&self, path: &Path) -> Option<ScriptHost> {
        self.inner
            .hosts
            .lock()
            .iter()
            .find(|h| h.path() == path)
            .cloned()
    }

    /// Delivers one inbound message to every loaded host.
    ///
    /// Device aliases are applied first. Hosts are snapshotted once; the
    /// main pass reaches all of them before the post pass starts.
    pub fn dispatch(&self, mut msg: Message) {
        if self.inner.config.device_aliases.apply(&mut msg) {
            debug!(unit = %msg.unit_path(), "device alias applied");
        }
        let hosts = self.hosts();
        debug!(kind = %msg.kind, unit = %msg.unit_path(), hosts = hosts.len(), "dispatching");

        for stage in [Stage::Main, Stage::Post] {
            for host in &hosts {
                let delivered = panic::catch_unwind(AssertUnwindSafe(|| host.dispatch(&msg, stage)));
                if let Err(payload) = delivered {
                    let reason = panic_message(payload.as_ref());
                    error!(host = %host.path().display(), ?stage, %reason, "host failed during dispatch");
                    self.inner.services.bus.publish(
                        Event::new(EventKind::HostFailed)
                            .with_host(host.path().display().to_string())
                            .with_reason(reason),
                    );
                }
            }
        }
    }

    /// Serves until `token` is cancelled or `messages` closes.
    ///
    /// Performs the initial scan, then dispatches inbound messages and turns
    /// every directory change into a coalesced rescan. A failed initial scan
    /// is logged and published; the next directory change retries it. On
    /// exit every host is shut down with reason `"shutdown"`.
    pub async fn run(
        &self,
        mut messages: mpsc::Receiver<Message>,
        mut changes: Option<mpsc::UnboundedReceiver<DirectoryChange>>,
        token: CancellationToken,
    ) {
        if let Err(e) = self.scan().await {
            warn!(label = e.as_label(), "initial scan failed, serving until the next change");
        }

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                msg = messages.recv() => match msg {
                    Some(msg) => self.dispatch(msg),
                    None => {
                        info!("inbound message stream closed");
                        break;
                    }
                },
                Some(change) = next_change(&mut changes) => {
                    debug!(paths = ?change.paths, "directory changed");
                    self.request_rescan();
                }
            }
        }

        self.shutdown().await;
    }

    /// Shuts every host down and stops the engine's background tasks.
    ///
    /// Waits for an in-flight scan to finish first.
    pub async fn shutdown(&self) {
        let _gate = self.inner.scan_gate.lock().await;
        self.inner
            .services
            .bus
            .publish(Event::new(EventKind::ShutdownRequested));

        let hosts: Vec<ScriptHost> = self.inner.hosts.lock().clone();
        for host in &hosts {
            self.unload(host, "shutdown");
        }
        self.inner.token.cancel();
        info!(hosts = hosts.len(), "engine stopped");
    }

    /// Shuts a host down and drops it from the loaded set.
    pub(crate) fn unload(&self, host: &ScriptHost, reason: &str) {
        host.shutdown(reason);
        self.inner.hosts.lock().retain(|h| !h.same_as(host));
        info!(host = %host.path().display(), reason, "host unloaded");
        self.inner.services.bus.publish(
            Event::new(EventKind::HostDestroyed)
                .with_host(host.path().display().to_string())
                .with_reason(reason),
        );
    }
}

async fn next_change(
    rx: &mut Option<mpsc::UnboundedReceiver<DirectoryChange>>,
) -> Option<DirectoryChange> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Hands publish requests to the transport and reports the outcome back to
/// the sending script.
pub(crate) async fn relay(
    mut requests: mpsc::UnboundedReceiver<SendRequest>,
    transport: Option<Arc<dyn Transport>>,
    token: CancellationToken,
) {
    loop {
        let req = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            req = requests.recv() => match req {
                Some(req) => req,
                None => break,
            },
        };
        let SendRequest { script, out } = req;
        let Outbound {
            kind,
            body_name,
            body,
            target,
            on_done,
        } = out;

        let result = match &transport {
            Some(t) => t.send(&kind, &body_name, &body, target.as_deref()).await,
            None => Err(TransportError::Send {
                message: "no transport configured".to_string(),
            }),
        };

        match on_done {
            Some(cb) => {
                let _ = script.invoke("send", FaultMode::Contain, None, |s| cb(s, result));
            }
            None => {
                if let Err(e) = result {
                    warn!(script = %script.name(), label = e.as_label(), error = %e, "send failed");
                    script.log_error(format!("send {kind} {body_name} failed: {e}"));
                }
            }
        }
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("scripts_dir", &self.inner.config.scripts_dir)
            .field("hosts", &self.inner.hosts.lock().len())
            .finish()
    }
}
