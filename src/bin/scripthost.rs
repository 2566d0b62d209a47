//! `scripthost`: serves a scripts directory over a JSON-lines bus.
//!
//! Inbound messages are read from stdin, one JSON object per line:
//! `{"kind":"xpl-trig","header":{"source":"acme-rf.home"},"bodyName":"sensor.basic","body":{"device":"porch"}}`.
//! Outbound messages are written to stdout in the same form.
//!
//! Modules are compiled in and activated by file stem: `<scripts-dir>/monitor.rule`
//! loads the built-in `monitor` module.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use scripthost::{
    wait_for_shutdown_signal, ChannelTransport, DeviceAliases, DirectoryWatcher, Engine,
    EngineConfig, FileLogSink, LogWriter, Message, PluginRegistry, Subscribe,
};

/// Command-line options.
#[derive(Debug, Parser)]
#[command(name = "scripthost", version, about = "Hot-reloading host for bus automation scripts")]
struct Args {
    /// Directory holding module files.
    #[arg(long, default_value = "rules")]
    scripts_dir: PathBuf,

    /// Module file extension (without the dot).
    #[arg(long, default_value = "rule")]
    extension: String,

    /// Directory for per-module script logs (default: <tmp>/scripthost-logs).
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Device aliases: a JSON file or an inline `from=to,from2=to2` list.
    #[arg(long)]
    device_aliases: Option<String>,

    /// Do not watch the scripts directory; scan once at startup.
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let mut config = EngineConfig::new(&args.scripts_dir);
    config.extension = args.extension.clone();
    config.log_dir = args.log_dir.clone();
    if let Some(spec) = &args.device_aliases {
        config.device_aliases = DeviceAliases::load(spec).context("loading device aliases")?;
    }

    tokio::fs::create_dir_all(&config.scripts_dir)
        .await
        .with_context(|| format!("creating {}", config.scripts_dir.display()))?;
    let log_dir = config.effective_log_dir();
    let logs = FileLogSink::new(&log_dir).with_context(|| format!("creating {}", log_dir.display()))?;

    let (transport, outbound) = ChannelTransport::new();
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];

    let engine = Engine::builder(config.clone())
        .with_loader(Arc::new(builtin_modules()))
        .with_transport(Arc::new(transport))
        .with_log_sink(Arc::new(logs))
        .with_subscribers(subs)
        .build()?;

    let (_watcher, changes) = if args.no_watch {
        (None, None)
    } else {
        let (w, rx) = DirectoryWatcher::new(&config.scripts_dir)?;
        (Some(w), Some(rx))
    };

    let token = CancellationToken::new();
    let (inbound_tx, inbound_rx) = mpsc::channel(256);
    tokio::spawn(read_stdin(inbound_tx, token.clone()));
    tokio::spawn(write_stdout(outbound));

    let signal_token = token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "cannot listen for shutdown signals");
            return;
        }
        info!("shutdown signal received");
        signal_token.cancel();
    });

    info!(dir = %config.scripts_dir.display(), logs = %log_dir.display(), "serving");
    engine.run(inbound_rx, changes, token).await;
    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Parses stdin lines into messages until EOF or cancellation.
async fn read_stdin(tx: mpsc::Sender<Message>, token: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = token.cancelled() => break,
            line = lines.next_line() => line,
        };
        match line {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => match serde_json::from_str::<Message>(&line) {
                Ok(msg) => {
                    if tx.send(msg).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "ignoring malformed message line"),
            },
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "stdin read failed");
                break;
            }
        }
    }
}

/// Writes outbound messages to stdout as JSON lines.
async fn write_stdout(mut rx: mpsc::UnboundedReceiver<Message>) {
    let mut out = tokio::io::stdout();
    while let Some(msg) = rx.recv().await {
        let mut line = match serde_json::to_vec(&msg) {
            Ok(line) => line,
            Err(e) => {
                error!(error = %e, "cannot encode outbound message");
                continue;
            }
        };
        line.push(b'\n');
        if let Err(e) = out.write_all(&line).await {
            error!(error = %e, "stdout write failed");
            break;
        }
        let _ = out.flush().await;
    }
}

/// Modules compiled into the binary.
fn builtin_modules() -> PluginRegistry {
    PluginRegistry::new().with("monitor", |engine| {
        let script = engine.new_script(Some("monitor"))?;
        let watched = engine.clone();
        script.set_interval(Duration::from_secs(60), move |s| {
            for host in watched.hosts() {
                for unit in host.scripts() {
                    match unit.last_error() {
                        Some(fault) => s.log(format!(
                            "{} cpu={:?} last_error={} at {}",
                            unit.name(),
                            unit.cpu_time(),
                            fault,
                            s.format_date(&fault.at, None)
                        )),
                        None => s.log(format!("{} cpu={:?}", unit.name(), unit.cpu_time())),
                    }
                }
            }
            Ok(())
        })?;
        Ok(Box::new(()))
    })
}
