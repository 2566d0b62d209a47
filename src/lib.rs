//! # scripthost
//!
//! **scripthost** keeps a directory of automation modules loaded and reacting
//! to a home-automation message bus (xPL style: `xpl-cmnd` / `xpl-stat` /
//! `xpl-trig` messages addressed by `source/device/type`).
//!
//! Each module file becomes a [`ScriptHost`] owning one or more [`Script`]s.
//! Scripts subscribe to messages, publish messages, and run timers and cron
//! jobs. The [`Engine`] reloads modules when their files change and fans
//! every inbound message out to them.
//!
//! ## Architecture
//! ```text
//!  scripts dir ──(notify)──► DirectoryChange ──► Engine::request_rescan ──► scan (one at a time)
//!                                                                             │ add / update / remove
//!                                                                             ▼
//!  inbound Message ──► Engine::dispatch ──► aliases ──► ┌───────────┐ ┌───────────┐
//!                                                       │ScriptHost │ │ScriptHost │ ...
//!                                                       │ resources │ │ resources │
//!                                                       └─────┬─────┘ └─────┬─────┘
//!                                                             ▼             ▼
//!                                                  Script::invoke (cpu accounting, fault capture)
//!                                                             │
//!  Transport::send ◄── relay ◄── SendRequest ◄────────────────┘
//!
//!  Script / ScriptHost / Engine ── Event ──► Bus ──► SubscriberSet ──► LogWriter, ...
//! ```
//!
//! ## Features
//! | Area               | Description                                              | Key types                                  |
//! |--------------------|----------------------------------------------------------|--------------------------------------------|
//! | **Engine**         | Hot reload, dispatch fan-out, outbound relay             | [`Engine`], [`EngineBuilder`]              |
//! | **Scripts**        | Lifecycle, subscriptions, timers, cron, publishing       | [`Script`], [`ReleaseHandle`], [`Outbound`]|
//! | **Matching**       | Unit-path wildcards, regex, sets, predicates, criteria   | [`Filter`], [`Selector`], [`Criteria`]     |
//! | **Plugins**        | Module loading and listing seams                         | [`ModuleLoader`], [`PluginRegistry`]       |
//! | **Observability**  | Runtime events and subscribers                           | [`Event`], [`Subscribe`], [`LogWriter`]    |
//! | **Errors**         | Typed errors per failure domain                          | [`HostError`], [`LoadError`], ...          |
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use tokio_util::sync::CancellationToken;
//! use scripthost::{Engine, EngineConfig, LogWriter, PluginRegistry, Subscribe};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // rules/porch.rule activates the "porch" plugin
//!     let plugins = PluginRegistry::new().with("porch", |engine| {
//!         let script = engine.new_script(Some("porch-light"))?;
//!         script.on_trigger("*/porch/motion", |s, msg| {
//!             s.log(format!("motion: {:?}", msg.body.get("current")));
//!             Ok(())
//!         })?;
//!         Ok(Box::new(()))
//!     });
//!
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
//!     let engine = Engine::builder(EngineConfig::new("rules"))
//!         .with_loader(Arc::new(plugins))
//!         .with_subscribers(subs)
//!         .build()?;
//!
//!     let (_tx, rx) = mpsc::channel(64);
//!     engine.run(rx, None, CancellationToken::new()).await;
//!     Ok(())
//! }
//! ```

mod config;
mod engine;
mod error;
mod events;
mod filter;
mod host;
mod logs;
mod message;
mod query;
mod script;
mod subscribers;

// ---- Public re-exports ----

pub use config::EngineConfig;
pub use engine::{
    wait_for_shutdown_signal, ChannelTransport, DirectoryChange, DirectoryWatcher, Engine,
    EngineBuilder, FsDirectory, LoadFailure, ModuleDirectory, ModuleFactory, ModuleFile,
    ModuleHandle, ModuleLoader, PluginRegistry, ScanReport, Transport,
};
pub use error::{ConfigError, HostError, LoadError, RuntimeError, ScanError, TransportError};
pub use events::{Bus, Event, EventKind};
pub use filter::{Criteria, Filter, Predicate, Selector};
pub use host::{
    MessageHandler, Outbound, ReleaseHandle, ResourceInfo, ResourceKind, ScriptHost, SendCallback,
    Stage,
};
pub use logs::{FileLogSink, LogLevel, LogSink, ScriptLogLine, TracingLogSink};
pub use message::{Body, DeviceAliases, Header, Message, MessageKind};
pub use query::{Aggregate, QueryClient, QueryValue};
pub use script::{
    HandlerFault, Lifecycle, LifecycleHook, Phase, Script, ScriptState, DEFAULT_DATE_FORMAT,
};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
