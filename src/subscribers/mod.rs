//! # Event subscribers for the script host runtime.
//!
//! ```text
//! Script / ScriptHost / Engine ── publish(Event) ──► Bus ──► engine listener
//!                                                               │
//!                                                         SubscriberSet
//!                                                     ┌─────────┼─────────┐
//!                                                     ▼         ▼         ▼
//!                                                 LogWriter  Metrics   Custom
//! ```

mod log;
mod set;
mod subscriber;

pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
