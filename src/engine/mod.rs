//! # Engine: loaded hosts, hot reload and message fan-out.
//!
//! ```text
//!             ┌──────────── ModuleDirectory::list ◄── scan() / request_rescan()
//!             │                                          ▲
//!             ▼                                          │ DirectoryChange (watch)
//!   diff by path + mtime ──► ModuleLoader::load ──► factory(&Engine) ──► ScriptHost
//!                                                                          │
//! inbound Message ──► DeviceAliases::apply ──► every host: Main pass, then Post pass
//!                                                                          │
//! Transport::send ◄── relay task ◄── SendRequest ◄── Script::send ◄────────┘
//! ```
//!
//! ## Rules
//! - One scan at a time. Change notifications arriving during a scan queue
//!   exactly one follow-up scan.
//! - A modified module is fully shut down before its replacement is loaded.
//! - Aliases are applied once per inbound message, before any host sees it.
//! - A host failing during dispatch does not stop delivery to the others.

mod builder;
mod core;
mod directory;
mod loader;
mod scan;
mod shutdown;
mod transport;
mod watch;

pub use self::core::Engine;
pub use builder::EngineBuilder;
pub use directory::{FsDirectory, ModuleDirectory, ModuleFile};
pub use loader::{ModuleFactory, ModuleHandle, ModuleLoader, PluginRegistry};
pub use scan::{LoadFailure, ScanReport};
pub use shutdown::wait_for_shutdown_signal;
pub use transport::{ChannelTransport, Transport};
pub use watch::{DirectoryChange, DirectoryWatcher};
