//! # Script hosts: one per loaded module file.
//!
//! A [`ScriptHost`] owns the scripts its module created and a registry of
//! every resource (subscription, timer, scheduled job) those scripts hold.
//!
//! ```text
//! Script.on_trigger(..) ─┐
//! Script.set_timeout(..) ┼─► HostCore::register ─► resources[] ─► ReleaseHandle
//! Script.schedule(..)   ─┘                             │
//!                                                      ├─ release(id): remove + cleanup once
//! Script.shutdown ─► Destroying ─► sweep(script) ──────┘  (cancel timers, drop handlers)
//!
//! Engine::dispatch ─► ScriptHost::dispatch(msg, stage)
//!                       └─ snapshot matching subscriptions ─► Script::invoke (per match)
//! ```
//!
//! ## Rules
//! - Every resource is owned by a script of the same host.
//! - Release is idempotent; cleanup runs at most once.
//! - No lock is held while user code runs.
//! - One-shot timers leave the registry once their callback returned or was skipped.

mod core;
mod resource;
mod send;
mod timers;

use std::any::Any;

pub(crate) use self::core::{HostCore, HostServices};
pub use self::core::ScriptHost;
pub use resource::{MessageHandler, ReleaseHandle, ResourceInfo, ResourceKind, Stage};
pub use send::{Outbound, SendCallback};
pub(crate) use send::SendRequest;

/// Renders a panic payload (`&str` or `String`), or a placeholder.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests;
