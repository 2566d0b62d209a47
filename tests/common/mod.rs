#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use scripthost::{
    Engine, EngineConfig, Message, MessageKind, ModuleDirectory, ModuleFile, PluginRegistry,
    ScanError,
};

/// In-memory module listing with a call counter and optional latency.
#[derive(Default)]
pub struct MemoryDir {
    files: Mutex<Vec<ModuleFile>>,
    lists: AtomicUsize,
    failing: AtomicBool,
    delay: Mutex<Duration>,
}

impl MemoryDir {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Replaces the listing with `(stem, mtime seconds)` pairs.
    pub fn set(&self, files: &[(&str, u64)]) {
        *self.files.lock().unwrap() = files
            .iter()
            .map(|(stem, secs)| ModuleFile {
                path: rule(stem),
                modified: SystemTime::UNIX_EPOCH + Duration::from_secs(*secs),
            })
            .collect();
    }

    pub fn set_delay(&self, d: Duration) {
        *self.delay.lock().unwrap() = d;
    }

    pub fn fail(&self, on: bool) {
        self.failing.store(on, Ordering::SeqCst);
    }

    pub fn lists(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModuleDirectory for MemoryDir {
    async fn list(&self) -> Result<Vec<ModuleFile>, ScanError> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(ScanError::Io {
                path: PathBuf::from("/rules"),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            });
        }
        Ok(self.files.lock().unwrap().clone())
    }
}

pub fn rule(stem: &str) -> PathBuf {
    Path::new("/rules").join(format!("{stem}.rule"))
}

/// Registry where every stem creates one script named after it.
pub fn plain_modules(stems: &[&str]) -> PluginRegistry {
    let plugins = PluginRegistry::new();
    for stem in stems {
        let name = stem.to_string();
        plugins.register(*stem, move |engine: &Engine| {
            engine.new_script(Some(&name))?;
            Ok(Box::new(()))
        });
    }
    plugins
}

pub fn engine_with(dir: &Arc<MemoryDir>, plugins: PluginRegistry, config: EngineConfig) -> Engine {
    let directory: Arc<dyn ModuleDirectory> = dir.clone();
    Engine::builder(config)
        .with_directory(directory)
        .with_loader(Arc::new(plugins))
        .build()
        .unwrap()
}

pub fn trigger(source: &str, device: &str, kind: &str) -> Message {
    Message::new(MessageKind::Trigger, "sensor.basic")
        .with_source(source)
        .with_attr("device", device)
        .with_attr("type", kind)
}
