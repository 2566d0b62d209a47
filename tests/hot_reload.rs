mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use common::{engine_with, plain_modules, rule, MemoryDir};
use scripthost::{
    Engine, EngineConfig, EventKind, FsDirectory, Lifecycle, ModuleDirectory, Phase,
    PluginRegistry,
};

fn loaded_stems(engine: &Engine) -> Vec<String> {
    let mut stems: Vec<String> = engine
        .hosts()
        .iter()
        .map(|h| h.path().file_stem().unwrap().to_string_lossy().into_owned())
        .collect();
    stems.sort();
    stems
}

#[tokio::test]
async fn scan_adds_updates_and_removes() {
    let dir = MemoryDir::new();
    dir.set(&[("a", 1), ("c", 1), ("d", 1)]);
    let engine = engine_with(&dir, plain_modules(&["a", "b", "c", "d"]), EngineConfig::default());

    let first = engine.scan().await.unwrap();
    assert_eq!((first.scanned, first.added), (3, 3));
    let old_c = engine.host(&rule("c")).unwrap().script("c").unwrap();
    let old_d = engine.host(&rule("d")).unwrap().script("d").unwrap();
    let a_id = engine.host(&rule("a")).unwrap().id();

    let mut events = engine.events();
    dir.set(&[("a", 1), ("b", 1), ("c", 2)]);
    let report = engine.scan().await.unwrap();

    assert_eq!(report.scanned, 3);
    assert_eq!(report.added, 1);
    assert_eq!(report.updated, 1);
    assert_eq!(report.removed, 1);
    assert!(report.failed.is_empty());
    assert_eq!(loaded_stems(&engine), ["a", "b", "c"]);

    // unchanged module keeps its host; the modified one gets a fresh script
    assert_eq!(engine.host(&rule("a")).unwrap().id(), a_id);
    assert_eq!(old_c.phase(), Phase::Destroyed);
    assert_eq!(old_d.phase(), Phase::Destroyed);
    let new_c = engine.host(&rule("c")).unwrap().script("c").unwrap();
    assert_ne!(new_c.id(), old_c.id());
    assert!(new_c.is_running());

    let mut reasons = Vec::new();
    while let Ok(ev) = events.try_recv() {
        if matches!(ev.kind, EventKind::HostDestroyed) {
            reasons.push(ev.reason.unwrap().to_string());
        }
        if matches!(ev.kind, EventKind::ScanCompleted) {
            assert_eq!(ev.report.as_ref(), Some(&report));
        }
    }
    reasons.sort();
    assert_eq!(reasons, ["deleted", "modified"]);
}

#[tokio::test]
async fn unchanged_directory_is_a_no_op() {
    let dir = MemoryDir::new();
    dir.set(&[("a", 1)]);
    let engine = engine_with(&dir, plain_modules(&["a"]), EngineConfig::default());

    engine.scan().await.unwrap();
    let report = engine.scan().await.unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!((report.added, report.updated, report.removed), (0, 0, 0));
}

#[tokio::test]
async fn construction_failures_do_not_stop_the_scan() {
    let dir = MemoryDir::new();
    dir.set(&[("broken", 1), ("good", 1), ("missing", 1), ("panics", 1)]);
    let plugins = plain_modules(&["good"])
        .with("broken", |engine: &Engine| {
            engine.new_script(Some("half-built"))?;
            anyhow::bail!("bad configuration")
        })
        .with("panics", |_: &Engine| panic!("boom"));
    let engine = engine_with(&dir, plugins, EngineConfig::default());

    let report = engine.scan().await.unwrap();
    assert_eq!(report.added, 1);
    let mut labels: Vec<_> = report.failed.iter().map(|f| f.label).collect();
    labels.sort();
    assert_eq!(labels, ["load_construct_failed", "load_not_found", "load_panicked"]);
    assert_eq!(loaded_stems(&engine), ["good"]);

    let broken = report.failed.iter().find(|f| f.path == rule("broken")).unwrap();
    assert!(broken.error.contains("bad configuration"));
}

#[tokio::test]
async fn failing_start_hook_unloads_the_module() {
    let dir = MemoryDir::new();
    dir.set(&[("flaky", 1)]);
    let captured = Arc::new(parking_lot::Mutex::new(None));
    let slot = Arc::clone(&captured);
    let plugins = PluginRegistry::new().with("flaky", move |engine: &Engine| {
        let script = engine.new_script(None)?;
        script.on_lifecycle(|_, step| match step {
            Lifecycle::Starting => anyhow::bail!("device unreachable"),
            _ => Ok(()),
        });
        *slot.lock() = Some(script);
        Ok(Box::new(()))
    });
    let engine = engine_with(&dir, plugins, EngineConfig::default());

    let report = engine.scan().await.unwrap();
    assert_eq!(report.added, 0);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].label, "load_start_failed");
    assert!(engine.hosts().is_empty());

    let script = captured.lock().clone().unwrap();
    assert_eq!(script.phase(), Phase::Destroyed);
}

#[tokio::test]
async fn listing_failure_keeps_loaded_hosts() {
    let dir = MemoryDir::new();
    dir.set(&[("a", 1)]);
    let engine = engine_with(&dir, plain_modules(&["a"]), EngineConfig::default());
    engine.scan().await.unwrap();

    dir.fail(true);
    let err = engine.scan().await.unwrap_err();
    assert_eq!(err.as_label(), "scan_io");
    assert_eq!(loaded_stems(&engine), ["a"]);

    dir.fail(false);
    dir.set(&[]);
    let report = engine.scan().await.unwrap();
    assert_eq!(report.removed, 1);
    assert!(engine.hosts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn rescan_requests_during_a_scan_are_coalesced() {
    let dir = MemoryDir::new();
    dir.set(&[("a", 1)]);
    dir.set_delay(Duration::from_millis(50));
    let engine = engine_with(&dir, plain_modules(&["a"]), EngineConfig::default());

    engine.request_rescan();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(dir.lists(), 1);

    // scan in flight: both requests collapse into one follow-up
    engine.request_rescan();
    engine.request_rescan();
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(dir.lists(), 2);
    assert_eq!(loaded_stems(&engine), ["a"]);
}

#[tokio::test]
async fn constructs_once_per_load() {
    let dir = MemoryDir::new();
    dir.set(&[("a", 1)]);
    let built = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&built);
    let plugins = PluginRegistry::new().with("a", move |engine: &Engine| {
        counter.fetch_add(1, Ordering::SeqCst);
        engine.new_script(None)?;
        Ok(Box::new(()))
    });
    let engine = engine_with(&dir, plugins, EngineConfig::default());

    engine.scan().await.unwrap();
    engine.scan().await.unwrap();
    assert_eq!(built.load(Ordering::SeqCst), 1);

    dir.set(&[("a", 2)]);
    engine.scan().await.unwrap();
    assert_eq!(built.load(Ordering::SeqCst), 2);

    // default name is "<stem> #<host id>"
    let host = engine.host(&rule("a")).unwrap();
    let script = &host.scripts()[0];
    assert_eq!(script.name(), format!("a #{}", host.id()));
}

#[tokio::test]
async fn file_directory_drives_reloads() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("porch.rule");
    std::fs::write(&path, "").unwrap();
    std::fs::write(tmp.path().join("notes.txt"), "").unwrap();

    let directory: Arc<dyn ModuleDirectory> = Arc::new(FsDirectory::new(tmp.path(), "rule"));
    let engine = Engine::builder(EngineConfig::new(tmp.path()))
        .with_directory(directory)
        .with_loader(Arc::new(plain_modules(&["porch"])))
        .build()
        .unwrap();

    let report = engine.scan().await.unwrap();
    assert_eq!((report.scanned, report.added), (1, 1));

    let later = SystemTime::now() + Duration::from_secs(60);
    std::fs::File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(later)
        .unwrap();
    assert_eq!(engine.scan().await.unwrap().updated, 1);

    std::fs::remove_file(&path).unwrap();
    let report = engine.scan().await.unwrap();
    assert_eq!((report.scanned, report.removed), (0, 1));
}
