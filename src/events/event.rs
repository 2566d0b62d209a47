//! # Runtime events emitted by the engine, hosts and scripts.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Script lifecycle**: the six transition edges of the script state machine
//! - **Handler faults**: user code returned an error or panicked
//! - **Host management**: a module was loaded, failed or destroyed
//! - **Scans**: a hot-reload pass finished or aborted
//!
//! The [`Event`] struct carries optional metadata (host path, script name,
//! reason, scan report).
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use scripthost::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::HandlerFailed)
//!     .with_script("hall-lights")
//!     .with_reason("boom");
//!
//! assert_eq!(ev.kind, EventKind::HandlerFailed);
//! assert_eq!(ev.script.as_deref(), Some("hall-lights"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::engine::ScanReport;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets `script` (subscriber name) and `reason` (panic message).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets `script` (subscriber name) and `reason`.
    SubscriberOverflow,

    // === Script lifecycle ===
    /// Script constructed, settling into `Initialized`.
    ScriptInitializing,
    /// Script settled in `Initialized`.
    ScriptInitialized,
    /// Script entering `Running`.
    ScriptStarting,
    /// Script settled in `Running`; it now receives messages and timer fires.
    ScriptRunning,
    /// Script entering `Destroyed`; its resources are being swept.
    ///
    /// Sets `reason` (shutdown reason).
    ScriptDestroying,
    /// Script fully destroyed.
    ///
    /// Sets `reason` (shutdown reason).
    ScriptDestroyed,

    /// Handler code failed (returned an error or panicked).
    ///
    /// Sets `host`, `script`, `reason` (what was invoked and the error).
    HandlerFailed,

    // === Host management ===
    /// A module was constructed and registered as loaded.
    HostLoaded,
    /// A module failed to construct, initialize or run.
    ///
    /// Sets `reason`.
    HostFailed,
    /// A module was shut down and removed from the loaded set.
    ///
    /// Sets `reason` (`modified`, `deleted`, `shutdown`, `failed`).
    HostDestroyed,

    // === Scans ===
    /// A directory scan finished. Sets `report`.
    ScanCompleted,
    /// A directory scan aborted on an I/O failure. Sets `reason`.
    ScanFailed,

    // === Engine ===
    /// Shutdown requested (cancellation or OS signal observed).
    ShutdownRequested,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Module path of the host involved, if any.
    pub host: Option<Arc<str>>,
    /// Name of the script involved, if any.
    pub script: Option<Arc<str>>,
    /// Human-readable reason (errors, shutdown reasons, overflow details).
    pub reason: Option<Arc<str>>,
    /// Scan counters (only for `ScanCompleted`).
    pub report: Option<ScanReport>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            host: None,
            script: None,
            reason: None,
            report: None,
        }
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a script name.
    #[inline]
    pub fn with_script(mut self, script: impl Into<Arc<str>>) -> Self {
        self.script = Some(script.into());
        self
    }

    /// Attaches a host (module path).
    #[inline]
    pub fn with_host(mut self, host: impl Into<Arc<str>>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Attaches a scan report.
    #[inline]
    pub fn with_report(mut self, report: ScanReport) -> Self {
        self.report = Some(report);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_script(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_script(subscriber)
            .with_reason(info)
    }

    /// True for the six script lifecycle kinds.
    #[inline]
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self.kind,
            EventKind::ScriptInitializing
                | EventKind::ScriptInitialized
                | EventKind::ScriptStarting
                | EventKind::ScriptRunning
                | EventKind::ScriptDestroying
                | EventKind::ScriptDestroyed
        )
    }
}
