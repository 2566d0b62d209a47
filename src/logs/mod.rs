//! # Per-module script logs.
//!
//! Scripts write `LOG`/`ERROR` lines through a [`LogSink`]. Each line carries
//! the module path it came from and the script name (or the module identity
//! when the line is not tied to one script).
//!
//! - [`TracingLogSink`] forwards lines to `tracing` (default)
//! - [`FileLogSink`] appends to `<dir>/<module stem>.log`

mod file;
mod sink;

pub use file::FileLogSink;
pub use sink::{LogLevel, LogSink, ScriptLogLine, TracingLogSink};
