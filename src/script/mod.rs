//! # Scripts: the units user code runs as.
//!
//! A [`Script`] is created by a module while it is being constructed and lives
//! until its host shuts it down (or it shuts itself down).
//!
//! ```text
//!  construct        initialize()                run()                 shutdown(reason)
//! ───────────► Initialized* ──► Initialized ──► Running* ──► Running ──► Destroyed* ──► Destroyed
//!                 Initializing   Initialized     Starting     Running     Destroying     Destroyed
//!                                                                           (sweep)
//! ```
//! `*` marks the transitioning sub-state; the second row is the event emitted
//! on entry.
//!
//! ## Rules
//! - Transitions only move forward; `shutdown` on a destroyed script is a no-op.
//! - Only a settled `Running` script receives messages and timer fires.
//! - Every call into user code goes through [`Script::invoke`]-style wrapping:
//!   CPU self-time accounting, fault capture, `HandlerFault` recording.
//! - Capability methods on a destroyed script fail with
//!   [`HostError::ScriptDestroyed`](crate::HostError::ScriptDestroyed).

mod capabilities;
mod fault;
mod state;
mod unit;

pub use capabilities::DEFAULT_DATE_FORMAT;
pub use fault::HandlerFault;
pub(crate) use fault::FaultMode;
pub use state::{Lifecycle, LifecycleHook, Phase, ScriptState};
pub use unit::Script;
