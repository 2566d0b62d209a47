use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Local};
use tracing::{error, info};

/// Severity of a script log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Regular output (`script.log`).
    Log,
    /// Error output (`script.log_error`, handler faults).
    Error,
}

impl LogLevel {
    /// Tag rendered inside brackets.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Log => "LOG",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line written by (or on behalf of) a script.
#[derive(Debug, Clone)]
pub struct ScriptLogLine {
    /// Path of the module file the script belongs to.
    pub module: Arc<str>,
    /// Script name, or the module identity for host-level lines.
    pub name: Arc<str>,
    /// Severity.
    pub level: LogLevel,
    /// Local timestamp.
    pub at: DateTime<Local>,
    /// Message text.
    pub message: String,
    /// Captured backtrace for error lines, if any.
    pub backtrace: Option<String>,
}

impl ScriptLogLine {
    /// Creates a line stamped with the current local time.
    pub fn new(
        module: Arc<str>,
        name: Arc<str>,
        level: LogLevel,
        message: impl Into<String>,
    ) -> Self {
        Self {
            module,
            name,
            level,
            at: Local::now(),
            message: message.into(),
            backtrace: None,
        }
    }

    /// Attaches a backtrace.
    pub fn with_backtrace(mut self, backtrace: Option<String>) -> Self {
        self.backtrace = backtrace;
        self
    }

    /// Renders `dd/mm/yyyy HH:MM:ss [LEVEL] name: message`.
    pub fn render(&self) -> String {
        format!(
            "{} [{}] {}: {}",
            self.at.format("%d/%m/%Y %H:%M:%S"),
            self.level,
            self.name,
            self.message
        )
    }
}

/// Destination of script log lines.
///
/// Called synchronously from the dispatch path: implementations must not block
/// for long and must not panic.
pub trait LogSink: Send + Sync + 'static {
    /// Writes one line.
    fn write(&self, line: &ScriptLogLine);
}

/// Sink forwarding script lines to `tracing` under the `script` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn write(&self, line: &ScriptLogLine) {
        let module = &*line.module;
        let script = &*line.name;
        match line.level {
            LogLevel::Log => info!(target: "script", module, script, "{}", line.message),
            LogLevel::Error => match &line.backtrace {
                Some(bt) => error!(target: "script", module, script, backtrace = %bt, "{}", line.message),
                None => error!(target: "script", module, script, "{}", line.message),
            },
        }
    }
}
