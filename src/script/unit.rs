use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error};

use crate::events::{Bus, Event};
use crate::host::{panic_message, HostCore};
use crate::logs::{LogLevel, LogSink, ScriptLogLine};

use super::fault::{FaultMode, HandlerFault};
use super::state::{Lifecycle, LifecycleHook, Phase, ScriptState};

/// Process-wide script id counter.
static SCRIPT_IDS: AtomicU64 = AtomicU64::new(0);

/// Handle to one script. Cheap to clone; clones refer to the same script.
#[derive(Clone)]
pub struct Script {
    pub(crate) inner: Arc<ScriptInner>,
}

pub(crate) struct ScriptInner {
    id: u64,
    name: Arc<str>,
    module: Arc<str>,
    host: Mutex<Option<Weak<HostCore>>>,
    bus: Bus,
    logs: Arc<dyn LogSink>,
    state: Mutex<ScriptState>,
    /// Self-time in nanoseconds. May dip below zero while a cross-script call
    /// is being billed back.
    cpu_nanos: AtomicI64,
    /// Wrapped calls of this script currently on the stack.
    depth: AtomicU32,
    last_error: Mutex<Option<HandlerFault>>,
    hooks: Mutex<Vec<LifecycleHook>>,
}

impl Script {
    pub(crate) fn new(name: Arc<str>, host: &Arc<HostCore>) -> Self {
        Self {
            inner: Arc::new(ScriptInner {
                id: SCRIPT_IDS.fetch_add(1, Ordering::Relaxed),
                name,
                module: host.label(),
                host: Mutex::new(Some(Arc::downgrade(host))),
                bus: host.bus().clone(),
                logs: host.logs(),
                state: Mutex::new(ScriptState::CONSTRUCTED),
                cpu_nanos: AtomicI64::new(0),
                depth: AtomicU32::new(0),
                last_error: Mutex::new(None),
                hooks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Process-unique id.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Name, unique within the owning host.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Path of the module file this script was created by.
    pub fn module(&self) -> &str {
        &self.inner.module
    }

    /// Current state.
    pub fn state(&self) -> ScriptState {
        *self.inner.state.lock()
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.state().phase
    }

    /// Settled in `Running`.
    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// Cumulative self-time spent in this script's handlers.
    ///
    /// Time spent inside [`call_in_context`](Script::call_in_context) is
    /// billed to the callee, not to the caller.
    pub fn cpu_time(&self) -> Duration {
        let nanos = self.inner.cpu_nanos.load(Ordering::Relaxed).max(0);
        Duration::from_nanos(nanos as u64)
    }

    /// Most recent fault raised by this script's handlers.
    pub fn last_error(&self) -> Option<HandlerFault> {
        self.inner.last_error.lock().clone()
    }

    /// Registers a hook called on every later transition of this script.
    pub fn on_lifecycle<F>(&self, hook: F)
    where
        F: Fn(&Script, Lifecycle) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.hooks.lock().push(Arc::new(hook));
    }

    /// Shuts the script down: sweeps every resource it owns and detaches it
    /// from its host. Idempotent.
    pub fn shutdown(&self, reason: &str) {
        {
            let mut st = self.inner.state.lock();
            if st.phase == Phase::Destroyed {
                return;
            }
            *st = ScriptState::entering(Phase::Destroyed);
        }
        self.transition_quiet(Lifecycle::Destroying, reason);

        let host = self.host_core();
        if let Some(core) = &host {
            core.sweep(self);
        }

        self.set_state(ScriptState::settled(Phase::Destroyed));
        self.transition_quiet(Lifecycle::Destroyed, reason);

        *self.inner.host.lock() = None;
        if let Some(core) = host {
            core.forget(self);
        }
    }

    /// Runs `f` in `other`'s context.
    ///
    /// The callee's time is billed to `other`. When this script is itself
    /// inside a wrapped call, the span is subtracted from it so it is counted
    /// once. A fault in `f` is recorded on `other` and returned. `Ok(None)`
    /// means `other` is not running and `f` was skipped.
    pub fn call_in_context<R>(
        &self,
        other: &Script,
        f: impl FnOnce(&Script) -> anyhow::Result<R>,
    ) -> anyhow::Result<Option<R>> {
        let mut spent = Duration::ZERO;
        let out = other.invoke("call_in_context", FaultMode::Propagate, Some(&mut spent), f);
        if self.inner.depth.load(Ordering::Relaxed) > 0 {
            self.charge(-nanos(spent));
        }
        out.map_err(anyhow::Error::new)
    }

    // ---- lifecycle (driven by the host) ----

    pub(crate) fn initialize(&self) -> anyhow::Result<()> {
        if self.state() != ScriptState::CONSTRUCTED {
            return Ok(());
        }
        self.transition(Lifecycle::Initializing, None)?;
        self.set_state(ScriptState::settled(Phase::Initialized));
        self.transition(Lifecycle::Initialized, None)
    }

    pub(crate) fn run(&self) -> anyhow::Result<()> {
        {
            let mut st = self.inner.state.lock();
            if *st != ScriptState::settled(Phase::Initialized) {
                return Ok(());
            }
            *st = ScriptState::entering(Phase::Running);
        }
        self.transition(Lifecycle::Starting, None)?;
        self.set_state(ScriptState::settled(Phase::Running));
        self.transition(Lifecycle::Running, None)
    }

    fn set_state(&self, state: ScriptState) {
        *self.inner.state.lock() = state;
    }

    /// Publishes the transition and runs hooks; the first hook failure is returned.
    fn transition(&self, edge: Lifecycle, reason: Option<&str>) -> anyhow::Result<()> {
        let mut ev = Event::new(edge.event_kind())
            .with_host(Arc::clone(&self.inner.module))
            .with_script(Arc::clone(&self.inner.name));
        if let Some(r) = reason {
            ev = ev.with_reason(r);
        }
        self.inner.bus.publish(ev);

        let hooks: Vec<LifecycleHook> = self.inner.hooks.lock().clone();
        for hook in hooks {
            match panic::catch_unwind(AssertUnwindSafe(|| hook(self, edge))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e.context(format!("{edge:?} hook of '{}'", self.name()))),
                Err(payload) => {
                    return Err(anyhow::anyhow!(
                        "{edge:?} hook of '{}' panicked: {}",
                        self.name(),
                        panic_message(payload.as_ref())
                    ))
                }
            }
        }
        Ok(())
    }

    fn transition_quiet(&self, edge: Lifecycle, reason: &str) {
        if let Err(e) = self.transition(edge, Some(reason)) {
            self.write_log(LogLevel::Error, format!("{e:#}"), None);
        }
    }

    // ---- invocation wrapper ----

    /// Calls user code on behalf of this script.
    ///
    /// Skipped (`Ok(None)`) unless the script is settled in `Running`. The
    /// elapsed time is added to this script's CPU time and, when `capture` is
    /// given, stored there. Faults are recorded, logged and published, then
    /// either swallowed or returned according to `mode`.
    pub(crate) fn invoke<R>(
        &self,
        context: &str,
        mode: FaultMode,
        capture: Option<&mut Duration>,
        f: impl FnOnce(&Script) -> anyhow::Result<R>,
    ) -> Result<Option<R>, HandlerFault> {
        if !self.is_running() {
            debug!(script = %self.name(), context, "skipping call into non-running script");
            return Ok(None);
        }

        self.inner.depth.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(self)));
        let elapsed = started.elapsed();
        self.inner.depth.fetch_sub(1, Ordering::Relaxed);

        self.charge(nanos(elapsed));
        if let Some(slot) = capture {
            *slot = elapsed;
        }

        let fault = match outcome {
            Ok(Ok(value)) => return Ok(Some(value)),
            Ok(Err(err)) => HandlerFault::from_error(context, &err),
            Err(payload) => HandlerFault::from_panic(context, payload.as_ref()),
        };
        self.record_fault(&fault);

        match mode {
            FaultMode::Contain => Ok(None),
            FaultMode::Propagate => Err(fault),
        }
    }

    #[cfg(test)]
    pub(crate) fn cpu_nanos(&self) -> i64 {
        self.inner.cpu_nanos.load(Ordering::Relaxed)
    }

    fn charge(&self, nanos: i64) {
        self.inner.cpu_nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    fn record_fault(&self, fault: &HandlerFault) {
        *self.inner.last_error.lock() = Some(fault.clone());

        match &fault.backtrace {
            Some(bt) => error!(
                module = %self.inner.module,
                script = %self.name(),
                context = %fault.context,
                backtrace = %bt,
                "handler failed: {}",
                fault.message
            ),
            None => error!(
                module = %self.inner.module,
                script = %self.name(),
                context = %fault.context,
                "handler failed: {}",
                fault.message
            ),
        }
        self.write_log(LogLevel::Error, fault.to_string(), fault.backtrace.clone());
        self.inner.bus.publish(
            Event::new(crate::events::EventKind::HandlerFailed)
                .with_host(Arc::clone(&self.inner.module))
                .with_script(Arc::clone(&self.inner.name))
                .with_reason(fault.to_string()),
        );
    }

    // ---- shared plumbing for capabilities ----

    pub(crate) fn host_core(&self) -> Option<Arc<HostCore>> {
        self.inner.host.lock().as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn write_log(&self, level: LogLevel, message: String, backtrace: Option<String>) {
        let line = ScriptLogLine::new(
            Arc::clone(&self.inner.module),
            Arc::clone(&self.inner.name),
            level,
            message,
        )
        .with_backtrace(backtrace);
        self.inner.logs.write(&line);
    }
}

fn nanos(d: Duration) -> i64 {
    i64::try_from(d.as_nanos()).unwrap_or(i64::MAX)
}

impl PartialEq for Script {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Script {}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Script")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("module", &self.inner.module)
            .field("state", &self.state())
            .finish()
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.inner.name, self.inner.module)
    }
}
