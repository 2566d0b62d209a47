//! # Engine configuration.
//!
//! Provides [`EngineConfig`], the settings an [`Engine`](crate::Engine) is
//! built from. The binary fills it from command-line flags; embedders build
//! it directly.
//!
//! ## Sentinel values
//! - `log_dir = None` → `<system temp dir>/scripthost-logs`
//! - `bus_capacity = 0` → treated as 1

use std::path::PathBuf;

use crate::message::DeviceAliases;

/// Directory name used under the system temp dir when no log dir is set.
const DEFAULT_LOG_SUBDIR: &str = "scripthost-logs";

/// Configuration of the script engine.
///
/// ## Field semantics
/// - `scripts_dir`: directory scanned for module files (not recursive)
/// - `extension`: module file extension, without the dot
/// - `log_dir`: where per-module script logs go (`None` = temp dir)
/// - `device_aliases`: applied to every inbound message before dispatch
/// - `bus_capacity`: runtime event ring buffer size (min 1)
///
/// ## Notes
/// All fields are public. Prefer the helper accessors over repeating the
/// sentinel checks.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Directory holding module files.
    pub scripts_dir: PathBuf,

    /// Module file extension, without the leading dot.
    pub extension: String,

    /// Directory for per-module script logs.
    pub log_dir: Option<PathBuf>,

    /// Device alias table.
    pub device_aliases: DeviceAliases,

    /// Capacity of the runtime event bus.
    ///
    /// Receivers lagging more than `bus_capacity` events behind skip the
    /// oldest ones.
    pub bus_capacity: usize,
}

impl EngineConfig {
    /// Config scanning `scripts_dir` with every other field at its default.
    pub fn new(scripts_dir: impl Into<PathBuf>) -> Self {
        Self {
            scripts_dir: scripts_dir.into(),
            ..Self::default()
        }
    }

    /// Effective script log directory.
    #[inline]
    pub fn effective_log_dir(&self) -> PathBuf {
        self.log_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_LOG_SUBDIR))
    }

    /// Bus capacity clamped to at least 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for EngineConfig {
    /// Default configuration:
    /// - `scripts_dir = "rules"`
    /// - `extension = "rule"`
    /// - `log_dir = None`
    /// - no device aliases
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            scripts_dir: PathBuf::from("rules"),
            extension: "rule".to_string(),
            log_dir: None,
            device_aliases: DeviceAliases::default(),
            bus_capacity: 1024,
        }
    }
}
