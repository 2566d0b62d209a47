//! # LogWriter: renders runtime events through `tracing`.
//!
//! ## Example output
//! ```text
//! INFO  host loaded host="rules/kitchen.rule"
//! INFO  script running host="rules/kitchen.rule" script="kitchen #0"
//! ERROR handler failed host="rules/kitchen.rule" script="kitchen #0" reason="timeout: boom"
//! INFO  scan completed scanned=3 added=1 updated=1 removed=1 failed=0
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default, Debug)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let host = e.host.as_deref().unwrap_or("-");
        let script = e.script.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");

        match e.kind {
            EventKind::ScriptInitializing
            | EventKind::ScriptInitialized
            | EventKind::ScriptStarting
            | EventKind::ScriptDestroying => {
                debug!(host, script, kind = ?e.kind, "script transition");
            }
            EventKind::ScriptRunning => info!(host, script, "script running"),
            EventKind::ScriptDestroyed => info!(host, script, reason, "script destroyed"),
            EventKind::HandlerFailed => error!(host, script, reason, "handler failed"),
            EventKind::HostLoaded => info!(host, "host loaded"),
            EventKind::HostFailed => error!(host, reason, "host failed"),
            EventKind::HostDestroyed => info!(host, reason, "host destroyed"),
            EventKind::ScanCompleted => {
                if let Some(r) = &e.report {
                    info!(
                        scanned = r.scanned,
                        added = r.added,
                        updated = r.updated,
                        removed = r.removed,
                        failed = r.failed.len(),
                        "scan completed"
                    );
                }
            }
            EventKind::ScanFailed => error!(reason, "scan failed"),
            EventKind::ShutdownRequested => info!("shutdown requested"),
            EventKind::SubscriberOverflow => warn!(subscriber = script, reason, "subscriber overflow"),
            EventKind::SubscriberPanicked => {
                error!(subscriber = script, reason, "subscriber panicked")
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
