//! Error types used by the script host runtime.
//!
//! Each failure domain gets its own enum:
//!
//! - [`HostError`]: a script asked for something its host cannot give
//!   (destroyed script, duplicate name, bad cron expression).
//! - [`LoadError`]: a module could not be constructed or started.
//! - [`ScanError`]: the script directory could not be listed or stat'ed.
//! - [`TransportError`]: the bus transport refused an outbound message.
//! - [`ConfigError`]: an alias table could not be read.
//! - [`RuntimeError`]: the engine could not be built or served.
//!
//! All of them provide `as_label` (stable snake_case label for logs).
//! Faults raised by user handler code are not errors of this crate: they are
//! captured as [`HandlerFault`](crate::HandlerFault) on the offending script.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// # Errors raised by a script's capability surface.
///
/// These fail fast: nothing is registered when one is returned.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// The script has been destroyed; it cannot subscribe, publish or schedule anymore.
    #[error("script '{script}' has been destroyed")]
    ScriptDestroyed {
        /// Name of the destroyed script.
        script: String,
    },

    /// A script with the same name already exists in this host.
    #[error("script '{name}' already exists")]
    DuplicateScript {
        /// The conflicting name.
        name: String,
    },

    /// `Engine::new_script` was called outside of a module constructor.
    #[error("no script host is being constructed")]
    NoCurrentHost,

    /// The cron expression could not be parsed.
    #[error("invalid schedule '{expr}': {reason}")]
    InvalidSchedule {
        /// The rejected expression.
        expr: String,
        /// Parser message.
        reason: String,
    },

    /// The owning host was dropped while the script was still referenced.
    #[error("script host is gone")]
    HostGone,
}

impl HostError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use scripthost::HostError;
    ///
    /// let err = HostError::DuplicateScript { name: "lights".into() };
    /// assert_eq!(err.as_label(), "host_duplicate_script");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            HostError::ScriptDestroyed { .. } => "host_script_destroyed",
            HostError::DuplicateScript { .. } => "host_duplicate_script",
            HostError::NoCurrentHost => "host_no_current_host",
            HostError::InvalidSchedule { .. } => "host_invalid_schedule",
            HostError::HostGone => "host_gone",
        }
    }
}

/// # Errors raised while turning a module file into a loaded host.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LoadError {
    /// The loader has no entry point for this path.
    #[error("no module entry point for '{path}'")]
    NotFound {
        /// Module file path.
        path: PathBuf,
    },

    /// The module constructor returned an error.
    #[error("module '{path}' failed to construct: {error}")]
    Construct {
        /// Module file path.
        path: PathBuf,
        /// Rendered error chain.
        error: String,
    },

    /// The module constructor panicked.
    #[error("module '{path}' panicked during construction: {message}")]
    Panicked {
        /// Module file path.
        path: PathBuf,
        /// Panic payload, if printable.
        message: String,
    },

    /// A script of the module failed to initialize or start.
    #[error("module '{path}' failed to start: {error}")]
    Start {
        /// Module file path.
        path: PathBuf,
        /// Rendered error chain.
        error: String,
    },
}

impl LoadError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            LoadError::NotFound { .. } => "load_not_found",
            LoadError::Construct { .. } => "load_construct_failed",
            LoadError::Panicked { .. } => "load_panicked",
            LoadError::Start { .. } => "load_start_failed",
        }
    }

    /// Returns the module path the error refers to.
    pub fn path(&self) -> &PathBuf {
        match self {
            LoadError::NotFound { path }
            | LoadError::Construct { path, .. }
            | LoadError::Panicked { path, .. }
            | LoadError::Start { path, .. } => path,
        }
    }
}

/// # Errors aborting one directory scan.
///
/// The engine stays alive; the next trigger retries.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ScanError {
    /// Listing or stat'ing failed.
    #[error("cannot read '{path}': {source}")]
    Io {
        /// Directory or file that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl ScanError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ScanError::Io { .. } => "scan_io",
        }
    }
}

/// # Errors reported by the bus transport.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The transport does not handle this message kind.
    #[error("unsupported message kind '{kind}'")]
    Unsupported {
        /// Wire name of the kind.
        kind: String,
    },

    /// Sending failed.
    #[error("send failed: {message}")]
    Send {
        /// Transport-specific message.
        message: String,
    },
}

impl TransportError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            TransportError::Unsupported { .. } => "transport_unsupported",
            TransportError::Send { .. } => "transport_send_failed",
        }
    }
}

/// # Errors raised while reading configuration inputs (alias tables).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An inline alias entry is not of the form `from=to`.
    #[error("malformed alias entry '{entry}' (expected from=to)")]
    AliasSyntax {
        /// The offending entry.
        entry: String,
    },

    /// The alias file could not be read.
    #[error("cannot read alias file '{path}': {source}")]
    AliasFile {
        /// Alias file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The alias file is not a JSON object of strings.
    #[error("alias file '{path}' is not a JSON object of strings: {message}")]
    AliasJson {
        /// Alias file path.
        path: PathBuf,
        /// Parser message.
        message: String,
    },
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::AliasSyntax { .. } => "config_alias_syntax",
            ConfigError::AliasFile { .. } => "config_alias_file",
            ConfigError::AliasJson { .. } => "config_alias_json",
        }
    }
}

/// # Errors produced by the engine's serve loop.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Signal registration or watcher setup failed.
    #[error("runtime i/o failure: {0}")]
    Io(#[from] io::Error),

    /// The scripts directory could not be watched.
    #[error("cannot watch '{path}': {source}")]
    Watch {
        /// Watched directory.
        path: PathBuf,
        /// Underlying watcher error.
        #[source]
        source: notify::Error,
    },

    /// The engine was built outside of a tokio runtime.
    #[error("engine must be built inside a tokio runtime")]
    NoRuntime,
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::Io(_) => "runtime_io",
            RuntimeError::Watch { .. } => "runtime_watch",
            RuntimeError::NoRuntime => "runtime_no_runtime",
        }
    }
}
