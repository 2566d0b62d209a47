use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::error::RuntimeError;
use crate::events::{Bus, Event};
use crate::host::HostServices;
use crate::logs::{LogSink, TracingLogSink};
use crate::query::QueryClient;
use crate::subscribers::{Subscribe, SubscriberSet};

use super::core::{relay, EngineInner};
use super::directory::{FsDirectory, ModuleDirectory};
use super::loader::{ModuleLoader, PluginRegistry};
use super::transport::Transport;
use super::Engine;

/// Builder for an [`Engine`] with optional collaborators.
///
/// Defaults: [`FsDirectory`] over `scripts_dir`/`extension`, an empty
/// [`PluginRegistry`], [`TracingLogSink`], no transport, no query client,
/// no subscribers.
pub struct EngineBuilder {
    config: EngineConfig,
    loader: Option<Arc<dyn ModuleLoader>>,
    directory: Option<Arc<dyn ModuleDirectory>>,
    transport: Option<Arc<dyn Transport>>,
    logs: Option<Arc<dyn LogSink>>,
    query: Option<Arc<dyn QueryClient>>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl EngineBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            loader: None,
            directory: None,
            transport: None,
            logs: None,
            query: None,
            subscribers: Vec::new(),
        }
    }

    /// Sets the module loader.
    pub fn with_loader(mut self, loader: Arc<dyn ModuleLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Replaces the default filesystem listing.
    pub fn with_directory(mut self, directory: Arc<dyn ModuleDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Sets the outbound transport. Without one every send fails.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the script log sink.
    pub fn with_log_sink(mut self, logs: Arc<dyn LogSink>) -> Self {
        self.logs = Some(logs);
        self
    }

    /// Sets the history query client used by `Script::query_*`.
    pub fn with_query(mut self, query: Arc<dyn QueryClient>) -> Self {
        self.query = Some(query);
        self
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (script lifecycle, handler faults,
    /// host load/unload, scans) through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the engine and spawns its background tasks:
    /// - the relay from script publish requests to the transport
    /// - the subscriber listener (when subscribers were given)
    ///
    /// Must be called inside a tokio runtime.
    pub fn build(self) -> Result<Engine, RuntimeError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| RuntimeError::NoRuntime)?;
        let bus = Bus::new(self.config.bus_capacity_clamped());
        let token = CancellationToken::new();

        let (outbound, requests) = mpsc::unbounded_channel();
        runtime.spawn(relay(requests, self.transport, token.clone()));

        if !self.subscribers.is_empty() {
            let rx = bus.subscribe();
            let set = SubscriberSet::new(self.subscribers, bus.clone());
            runtime.spawn(subscriber_listener(rx, set, token.clone()));
        }

        let directory = self.directory.unwrap_or_else(|| {
            Arc::new(FsDirectory::new(
                self.config.scripts_dir.clone(),
                &self.config.extension,
            ))
        });
        let loader = self
            .loader
            .unwrap_or_else(|| Arc::new(PluginRegistry::new()));
        let logs = self.logs.unwrap_or_else(|| Arc::new(TracingLogSink));

        let services = HostServices {
            bus,
            logs,
            query: self.query,
            outbound,
            runtime,
        };

        Ok(Engine {
            inner: Arc::new(EngineInner {
                config: self.config,
                services,
                loader,
                directory,
                hosts: Mutex::new(Vec::new()),
                constructing: Mutex::new(None),
                scan_gate: tokio::sync::Mutex::new(()),
                rescan_pending: AtomicBool::new(false),
                token,
            }),
        })
    }
}

/// Forwards bus events to the subscriber set until the engine stops, then
/// drains what is left and waits for the workers.
async fn subscriber_listener(
    mut rx: broadcast::Receiver<Event>,
    set: SubscriberSet,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            ev = rx.recv() => match ev {
                Ok(ev) => set.emit(&ev),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    while let Ok(ev) = rx.try_recv() {
        set.emit(&ev);
    }
    set.shutdown().await;
}
