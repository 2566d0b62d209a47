use std::any::Any;
use std::backtrace::BacktraceStatus;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::host::panic_message;

/// What the invocation wrapper does with a fault after recording it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FaultMode {
    /// Swallow; dispatch continues.
    Contain,
    /// Hand the fault back to the caller (cross-script calls).
    Propagate,
}

/// A failure raised by user code: an `Err` return or a panic.
///
/// Recorded as the script's `last_error`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{context}: {message}")]
pub struct HandlerFault {
    /// What was being invoked (`message`, `timeout`, `interval`, ...).
    pub context: String,
    /// Rendered error chain or panic payload.
    pub message: String,
    /// Backtrace captured with the error, when backtraces are enabled.
    pub backtrace: Option<String>,
    /// When the fault happened.
    pub at: DateTime<Utc>,
}

impl HandlerFault {
    pub(crate) fn from_error(context: &str, err: &anyhow::Error) -> Self {
        let bt = err.backtrace();
        Self {
            context: context.to_string(),
            message: format!("{err:#}"),
            backtrace: (bt.status() == BacktraceStatus::Captured).then(|| bt.to_string()),
            at: Utc::now(),
        }
    }

    pub(crate) fn from_panic(context: &str, payload: &(dyn Any + Send)) -> Self {
        Self {
            context: context.to_string(),
            message: format!("panicked: {}", panic_message(payload)),
            backtrace: None,
            at: Utc::now(),
        }
    }
}
