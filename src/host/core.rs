use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::engine::ModuleHandle;
use crate::error::HostError;
use crate::events::Bus;
use crate::filter::Selector;
use crate::logs::LogSink;
use crate::message::{Message, MessageKind};
use crate::query::QueryClient;
use crate::script::{FaultMode, Script};

use super::resource::{MessageHandler, Payload, ReleaseHandle, Resource, ResourceInfo, ResourceKind, Stage, Subscription};
use super::send::{Outbound, SendRequest};

/// Process-wide host id counter.
static HOST_IDS: AtomicU64 = AtomicU64::new(1);

/// Engine-provided plumbing shared by every host.
#[derive(Clone)]
pub(crate) struct HostServices {
    pub(crate) bus: Bus,
    pub(crate) logs: Arc<dyn LogSink>,
    pub(crate) query: Option<Arc<dyn QueryClient>>,
    pub(crate) outbound: mpsc::UnboundedSender<SendRequest>,
    pub(crate) runtime: Handle,
}

pub(crate) struct HostCore {
    id: u64,
    path: PathBuf,
    label: Arc<str>,
    modified: SystemTime,
    services: HostServices,
    /// Insertion-ordered; names are unique.
    units: Mutex<Vec<Script>>,
    /// Registration-ordered.
    resources: Mutex<Vec<Arc<Resource>>>,
    module: Mutex<Option<ModuleHandle>>,
}

impl HostCore {
    pub(crate) fn new(path: &Path, modified: SystemTime, services: HostServices) -> Arc<Self> {
        Arc::new(Self {
            id: HOST_IDS.fetch_add(1, Ordering::Relaxed),
            label: Arc::from(path.display().to_string()),
            path: path.to_path_buf(),
            modified,
            services,
            units: Mutex::new(Vec::new()),
            resources: Mutex::new(Vec::new()),
            module: Mutex::new(None),
        })
    }

    pub(crate) fn label(&self) -> Arc<str> {
        Arc::clone(&self.label)
    }

    pub(crate) fn bus(&self) -> &Bus {
        &self.services.bus
    }

    pub(crate) fn logs(&self) -> Arc<dyn LogSink> {
        Arc::clone(&self.services.logs)
    }

    pub(crate) fn query(&self) -> Option<Arc<dyn QueryClient>> {
        self.services.query.clone()
    }

    pub(crate) fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.services.runtime.spawn(fut);
    }

    // ---- units ----

    /// Creates a script; the default name is `<file stem> #<host id>`.
    pub(crate) fn new_script(self: &Arc<Self>, name: Option<&str>) -> Result<Script, HostError> {
        let name = match name {
            Some(n) => n.to_string(),
            None => format!("{} #{}", self.stem(), self.id),
        };
        let mut units = self.units.lock();
        if units.iter().any(|s| s.name() == name) {
            return Err(HostError::DuplicateScript { name });
        }
        let script = Script::new(Arc::from(name), self);
        debug!(host = %self.label, script = %script.name(), "script created");
        units.push(script.clone());
        Ok(script)
    }

    fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.label.to_string())
    }

    fn units(&self) -> Vec<Script> {
        self.units.lock().clone()
    }

    /// Drops a destroyed script from the unit list.
    pub(crate) fn forget(&self, script: &Script) {
        self.units.lock().retain(|s| s != script);
    }

    // ---- registry ----

    pub(crate) fn register(self: &Arc<Self>, kind: ResourceKind, owner: &Script, payload: Payload) -> ReleaseHandle {
        let resource = Arc::new(Resource::new(kind, owner, payload));
        let handle = ReleaseHandle::new(resource.id, self);
        debug!(host = %self.label, script = %owner.name(), id = resource.id, ?kind, "resource registered");
        self.resources.lock().push(resource);
        handle
    }

    /// Removes one resource and runs its cleanup. No-op if already gone.
    pub(crate) fn release(&self, id: u64) -> bool {
        let removed = {
            let mut resources = self.resources.lock();
            resources
                .iter()
                .position(|r| r.id == id)
                .map(|pos| resources.remove(pos))
        };
        match removed {
            Some(resource) => {
                resource.cleanup();
                true
            }
            None => false,
        }
    }

    /// Removes and cleans up every resource owned by `script`, in
    /// registration order.
    pub(crate) fn sweep(&self, script: &Script) {
        let swept: Vec<Arc<Resource>> = {
            let mut resources = self.resources.lock();
            let (gone, keep): (Vec<_>, Vec<_>) =
                resources.drain(..).partition(|r| r.owner == *script);
            *resources = keep;
            gone
        };
        for resource in &swept {
            resource.cleanup();
        }
        if !swept.is_empty() {
            debug!(host = %self.label, script = %script.name(), count = swept.len(), "resources swept");
        }
    }

    pub(crate) fn subscribe(
        self: &Arc<Self>,
        owner: &Script,
        stage: Stage,
        kind: Option<MessageKind>,
        selector: Selector,
        handler: MessageHandler,
    ) -> ReleaseHandle {
        let sub = Subscription {
            stage,
            kind,
            selector,
            handler,
        };
        self.register(ResourceKind::Subscription, owner, Payload::Subscription(sub))
    }

    // ---- dispatch ----

    /// Delivers `msg` to every matching subscription of this host, in
    /// registration order.
    pub(crate) fn dispatch(&self, msg: &Message, stage: Stage) {
        let snapshot: Vec<Arc<Resource>> = self.resources.lock().clone();
        let context = match stage {
            Stage::Main => "message",
            Stage::Post => "message:post",
        };

        for resource in snapshot {
            let Payload::Subscription(sub) = &resource.payload else {
                continue;
            };
            if !resource.owner.is_running() {
                continue;
            }
            // selectors may run user predicates
            let matched = resource
                .owner
                .invoke("match", FaultMode::Contain, None, |_| Ok(sub.accepts(stage, msg)));
            if !matches!(matched, Ok(Some(true))) {
                continue;
            }
            // an earlier handler may have released it
            if resource.is_released() {
                continue;
            }
            let handler = Arc::clone(&sub.handler);
            let _ = resource
                .owner
                .invoke(context, FaultMode::Contain, None, |s| handler(s, msg));
        }
    }

    // ---- outbound ----

    pub(crate) fn send(&self, script: &Script, out: Outbound) -> Result<(), HostError> {
        debug!(host = %self.label, script = %script.name(), kind = %out.kind, body = %out.body_name, "send requested");
        self.services
            .outbound
            .send(SendRequest {
                script: script.clone(),
                out,
            })
            .map_err(|_| HostError::HostGone)
    }

    // ---- host lifecycle ----

    /// Initializes every script, then runs every script, in creation order.
    pub(crate) fn start(&self) -> anyhow::Result<()> {
        let units = self.units();
        for script in &units {
            script.initialize()?;
        }
        for script in &units {
            script.run()?;
        }
        info!(host = %self.label, scripts = units.len(), "host running");
        Ok(())
    }

    /// Shuts every script down and drops the module handle.
    pub(crate) fn shutdown(&self, reason: &str) {
        for script in self.units() {
            script.shutdown(reason);
        }
        let module = self.module.lock().take();
        drop(module);
        debug!(host = %self.label, reason, "host shut down");
    }

    pub(crate) fn set_module(&self, module: ModuleHandle) {
        *self.module.lock() = Some(module);
    }
}

/// Handle to one loaded module. Cheap to clone.
#[derive(Clone)]
pub struct ScriptHost {
    pub(crate) core: Arc<HostCore>,
}

impl ScriptHost {
    pub(crate) fn new(core: Arc<HostCore>) -> Self {
        Self { core }
    }

    /// Process-unique host id.
    pub fn id(&self) -> u64 {
        self.core.id
    }

    /// Module file this host was built from.
    pub fn path(&self) -> &Path {
        &self.core.path
    }

    /// Modification time of the module file when it was loaded.
    pub fn modified(&self) -> SystemTime {
        self.core.modified
    }

    /// Live scripts, in creation order.
    pub fn scripts(&self) -> Vec<Script> {
        self.core.units()
    }

    /// Looks a script up by name.
    pub fn script(&self, name: &str) -> Option<Script> {
        self.core.units.lock().iter().find(|s| s.name() == name).cloned()
    }

    /// Live resources, in registration order.
    pub fn resources(&self) -> Vec<ResourceInfo> {
        self.core.resources.lock().iter().map(|r| r.info()).collect()
    }

    /// Delivers `msg` to this host's subscriptions for `stage`.
    pub fn dispatch(&self, msg: &Message, stage: Stage) {
        self.core.dispatch(msg, stage);
    }

    /// Shuts every script down.
    pub fn shutdown(&self, reason: &str) {
        self.core.shutdown(reason);
    }

    /// True if both handles refer to the same host.
    pub fn same_as(&self, other: &ScriptHost) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }
}

impl fmt::Debug for ScriptHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptHost")
            .field("id", &self.core.id)
            .field("path", &self.core.path)
            .finish()
    }
}
