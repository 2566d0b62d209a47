use std::fmt;
use std::sync::Arc;

use crate::events::EventKind;

use super::Script;

/// Coarse lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Constructed, not yet started.
    Initialized,
    /// Receiving messages and timer fires.
    Running,
    /// Shut down; terminal.
    Destroyed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Initialized => "initialized",
            Phase::Running => "running",
            Phase::Destroyed => "destroyed",
        })
    }
}

/// Phase plus the transitioning flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptState {
    /// Current (or target) phase.
    pub phase: Phase,
    /// True while entering `phase`.
    pub transitioning: bool,
}

impl ScriptState {
    pub(crate) const CONSTRUCTED: ScriptState = ScriptState {
        phase: Phase::Initialized,
        transitioning: true,
    };

    pub(crate) fn settled(phase: Phase) -> Self {
        Self {
            phase,
            transitioning: false,
        }
    }

    pub(crate) fn entering(phase: Phase) -> Self {
        Self {
            phase,
            transitioning: true,
        }
    }

    /// Settled in `Running`.
    #[inline]
    pub fn is_running(&self) -> bool {
        self.phase == Phase::Running && !self.transitioning
    }
}

/// Transition edge observed by lifecycle hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    /// Entering `Initialized`.
    Initializing,
    /// Settled in `Initialized`.
    Initialized,
    /// Entering `Running`.
    Starting,
    /// Settled in `Running`.
    Running,
    /// Entering `Destroyed`; resources are swept right after the hooks.
    Destroying,
    /// Settled in `Destroyed`.
    Destroyed,
}

impl Lifecycle {
    pub(crate) fn event_kind(self) -> EventKind {
        match self {
            Lifecycle::Initializing => EventKind::ScriptInitializing,
            Lifecycle::Initialized => EventKind::ScriptInitialized,
            Lifecycle::Starting => EventKind::ScriptStarting,
            Lifecycle::Running => EventKind::ScriptRunning,
            Lifecycle::Destroying => EventKind::ScriptDestroying,
            Lifecycle::Destroyed => EventKind::ScriptDestroyed,
        }
    }
}

/// Hook called on every transition edge of one script.
///
/// An error (or panic) while initializing or starting fails the whole module;
/// during shutdown it is only logged.
pub type LifecycleHook = Arc<dyn Fn(&Script, Lifecycle) -> anyhow::Result<()> + Send + Sync>;
