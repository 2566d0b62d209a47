//! Runtime events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Script` transitions, `ScriptHost` (handler faults),
//!   `Engine` (host load/unload, scans, shutdown), `SubscriberSet` workers.
//! - **Consumers**: the engine's subscriber listener (fans out to `SubscriberSet`)
//!   and anyone holding a receiver from [`Engine::events`](crate::Engine::events).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
