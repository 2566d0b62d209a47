//! # Event subscriber trait.
//!
//! [`Subscribe`] is the extension point for observers of the script host
//! (log shipping, metrics, a dashboard of script faults).
//!
//! Each subscriber gets:
//! - **Dedicated worker task** (runs independently of dispatch)
//! - **Per-subscriber bounded queue** (capacity via [`Subscribe::queue_capacity`])
//! - **Panic isolation** (panics are caught and reported as `EventKind::SubscriberPanicked`)
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use scripthost::{Event, EventKind, Subscribe};
//!
//! struct FaultCounter;
//!
//! #[async_trait]
//! impl Subscribe for FaultCounter {
//!     async fn on_event(&self, ev: &Event) {
//!         if matches!(ev.kind, EventKind::HandlerFailed) {
//!             // bump a counter, page someone, ...
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "fault-counter" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Event subscriber for runtime observability.
///
/// Subscribers never run on the dispatch path: a slow subscriber only fills
/// its own queue, after which its events are dropped and reported.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single event. Events arrive in FIFO order per subscriber.
    async fn on_event(&self, event: &Event);

    /// Returns the subscriber name used in overflow/panic events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Returns the preferred queue capacity (clamped to at least 1). Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
