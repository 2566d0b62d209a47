//! # Module loading seam.
//!
//! A [`ModuleLoader`] turns a module file into a [`ModuleFactory`]. The engine
//! calls the factory with itself while the new host is the "current" one, so
//! [`Engine::new_script`] creates scripts in that host. What the factory
//! returns is kept alive with the host and never inspected.
//!
//! [`PluginRegistry`] is the in-process loader: factories compiled into the
//! binary, selected by file stem (`rules/porch.rule` → `"porch"`).

use std::any::Any;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::LoadError;

use super::Engine;

/// Opaque value returned by a module factory; dropped when the host shuts down.
pub type ModuleHandle = Box<dyn Any + Send + Sync>;

/// Module entry point.
pub type ModuleFactory = Arc<dyn Fn(&Engine) -> anyhow::Result<ModuleHandle> + Send + Sync>;

/// Resolves module files to entry points.
pub trait ModuleLoader: Send + Sync + 'static {
    /// Entry point for `path`.
    fn load(&self, path: &Path) -> Result<ModuleFactory, LoadError>;

    /// Forgets anything cached for `path`; called before a modified file is reloaded.
    fn evict(&self, path: &Path);
}

/// In-process loader keyed by file stem.
///
/// ## Example
/// ```rust
/// use scripthost::PluginRegistry;
///
/// let plugins = PluginRegistry::new().with("porch", |engine| {
///     let script = engine.new_script(Some("porch-light"))?;
///     script.on_trigger("*/porch/motion", |s, _| {
///         s.log("motion on the porch");
///         Ok(())
///     })?;
///     Ok(Box::new(()))
/// });
/// assert!(plugins.contains("porch"));
/// ```
#[derive(Default)]
pub struct PluginRegistry {
    factories: RwLock<HashMap<String, ModuleFactory>>,
}

impl PluginRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under `stem` (builder style).
    pub fn with<F>(self, stem: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Engine) -> anyhow::Result<ModuleHandle> + Send + Sync + 'static,
    {
        self.register(stem, factory);
        self
    }

    /// Registers (or replaces) a factory under `stem`.
    pub fn register<F>(&self, stem: impl Into<String>, factory: F)
    where
        F: Fn(&Engine) -> anyhow::Result<ModuleHandle> + Send + Sync + 'static,
    {
        self.factories.write().insert(stem.into(), Arc::new(factory));
    }

    /// True if a factory is registered under `stem`.
    pub fn contains(&self, stem: &str) -> bool {
        self.factories.read().contains_key(stem)
    }
}

impl ModuleLoader for PluginRegistry {
    fn load(&self, path: &Path) -> Result<ModuleFactory, LoadError> {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.factories
            .read()
            .get(&stem)
            .cloned()
            .ok_or_else(|| LoadError::NotFound {
                path: path.to_path_buf(),
            })
    }

    fn evict(&self, _path: &Path) {}
}
