use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::*;
use crate::error::HostError;
use crate::events::{Bus, EventKind};
use crate::filter::Filter;
use crate::logs::TracingLogSink;
use crate::message::{Message, MessageKind};
use crate::script::{FaultMode, Lifecycle, Phase, Script, ScriptState};

fn host(path: &str) -> (Arc<HostCore>, mpsc::UnboundedReceiver<SendRequest>, Bus) {
    let bus = Bus::new(256);
    let (tx, rx) = mpsc::unbounded_channel();
    let services = HostServices {
        bus: bus.clone(),
        logs: Arc::new(TracingLogSink),
        query: None,
        outbound: tx,
        runtime: tokio::runtime::Handle::current(),
    };
    (HostCore::new(Path::new(path), SystemTime::UNIX_EPOCH, services), rx, bus)
}

fn live(core: &Arc<HostCore>) -> usize {
    ScriptHost::new(Arc::clone(core)).resources().len()
}

fn kitchen_light() -> Message {
    Message::new(MessageKind::Trigger, "sensor.basic")
        .with_source("acme-rf.home")
        .with_attr("device", "kitchen")
        .with_attr("type", "light")
}

fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let c = Arc::new(AtomicUsize::new(0));
    (Arc::clone(&c), c)
}

#[tokio::test]
async fn lifecycle_moves_forward_and_emits_every_edge() {
    let (core, _rx, bus) = host("rules/kitchen.rule");
    let mut events = bus.subscribe();
    let script = core.new_script(Some("lights")).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    script.on_lifecycle(move |_, edge| {
        sink.lock().push(edge);
        Ok(())
    });

    assert_eq!(
        script.state(),
        ScriptState {
            phase: Phase::Initialized,
            transitioning: true
        }
    );
    core.start().unwrap();
    assert!(script.is_running());

    script.shutdown("test");
    script.shutdown("again");

    assert_eq!(
        *seen.lock(),
        vec![
            Lifecycle::Initializing,
            Lifecycle::Initialized,
            Lifecycle::Starting,
            Lifecycle::Running,
            Lifecycle::Destroying,
            Lifecycle::Destroyed,
        ]
    );
    assert_eq!(script.phase(), Phase::Destroyed);
    assert!(ScriptHost::new(Arc::clone(&core)).scripts().is_empty());

    let mut kinds = Vec::new();
    while let Ok(ev) = events.try_recv() {
        if ev.is_lifecycle() {
            kinds.push(ev.kind);
        }
    }
    assert_eq!(kinds.len(), 6);
    assert_eq!(kinds.last(), Some(&EventKind::ScriptDestroyed));
}

#[tokio::test]
async fn default_names_and_duplicates() {
    let (core, _rx, _bus) = host("rules/hall.rule");
    let script = core.new_script(None).unwrap();
    assert_eq!(script.name(), format!("hall #{}", ScriptHost::new(Arc::clone(&core)).id()));

    core.new_script(Some("x")).unwrap();
    let err = core.new_script(Some("x")).unwrap_err();
    assert_eq!(err, HostError::DuplicateScript { name: "x".into() });
}

#[tokio::test]
async fn failing_start_hook_is_reported() {
    let (core, _rx, _bus) = host("rules/bad.rule");
    let script = core.new_script(Some("bad")).unwrap();
    script.on_lifecycle(|_, edge| match edge {
        Lifecycle::Starting => anyhow::bail!("no config"),
        _ => Ok(()),
    });
    let err = core.start().unwrap_err();
    assert!(format!("{err:#}").contains("no config"));
    assert!(!script.is_running());
}

#[tokio::test]
async fn dispatch_only_reaches_running_scripts() {
    let (core, _rx, _bus) = host("rules/kitchen.rule");
    let script = core.new_script(Some("lights")).unwrap();
    let (hits, seen) = counter();
    script
        .on_trigger("*/kitchen/light", move |_, _| {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

    core.dispatch(&kitchen_light(), Stage::Main);
    assert_eq!(seen.load(Ordering::SeqCst), 0);

    core.start().unwrap();
    core.dispatch(&kitchen_light(), Stage::Main);
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    // kind mismatch
    let mut status = kitchen_light();
    status.kind = MessageKind::Status;
    core.dispatch(&status, Stage::Main);
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    script.shutdown("done");
    core.dispatch(&kitchen_light(), Stage::Main);
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn matches_run_in_registration_order_per_stage() {
    let (core, _rx, _bus) = host("rules/order.rule");
    let a = core.new_script(Some("a")).unwrap();
    let b = core.new_script(Some("b")).unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));

    for (script, tag) in [(&a, "a1"), (&b, "b1"), (&a, "a2")] {
        let log = Arc::clone(&log);
        script
            .on_message("*", move |_, _| {
                log.lock().push(tag);
                Ok(())
            })
            .unwrap();
    }
    let post = Arc::clone(&log);
    b.after_message("*", move |_, _| {
        post.lock().push("b-post");
        Ok(())
    })
    .unwrap();

    core.start().unwrap();
    core.dispatch(&kitchen_light(), Stage::Main);
    assert_eq!(*log.lock(), vec!["a1", "b1", "a2"]);
    core.dispatch(&kitchen_light(), Stage::Post);
    assert_eq!(*log.lock(), vec!["a1", "b1", "a2", "b-post"]);
}

#[tokio::test]
async fn faulty_handler_does_not_block_other_scripts() {
    let (core, _rx, bus) = host("rules/faults.rule");
    let mut events = bus.subscribe();
    let broken = core.new_script(Some("broken")).unwrap();
    let panicky = core.new_script(Some("panicky")).unwrap();
    let healthy = core.new_script(Some("healthy")).unwrap();

    broken
        .on_message("*", |_, _| Err(anyhow::anyhow!("sensor offline")))
        .unwrap();
    panicky
        .on_message("*", |_, _| panic!("handler exploded"))
        .unwrap();
    let (hits, seen) = counter();
    healthy
        .on_message("*", move |_, _| {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

    core.start().unwrap();
    core.dispatch(&kitchen_light(), Stage::Main);

    assert_eq!(seen.load(Ordering::SeqCst), 1);
    let fault = broken.last_error().unwrap();
    assert_eq!(fault.context, "message");
    assert_eq!(fault.message, "sensor offline");
    assert!(panicky.last_error().unwrap().message.contains("handler exploded"));
    assert!(healthy.last_error().is_none());
    assert!(broken.is_running());

    let mut failed = 0;
    while let Ok(ev) = events.try_recv() {
        if ev.kind == EventKind::HandlerFailed {
            failed += 1;
        }
    }
    assert_eq!(failed, 2);
}

#[tokio::test]
async fn release_is_idempotent() {
    let (core, _rx, _bus) = host("rules/release.rule");
    let script = core.new_script(Some("s")).unwrap();
    let handle = script.on_message("*", |_, _| Ok(())).unwrap();
    let copy = handle.clone();

    assert_eq!(live(&core), 1);
    assert!(handle.release());
    assert!(!handle.release());
    assert!(!copy.release());
    assert!(live(&core) == 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_sweeps_every_owned_resource() {
    let (core, _rx, _bus) = host("rules/sweep.rule");
    let a = core.new_script(Some("a")).unwrap();
    let b = core.new_script(Some("b")).unwrap();
    core.start().unwrap();

    let (fired, seen) = counter();
    a.on_message("*", |_, _| Ok(())).unwrap();
    let f = Arc::clone(&fired);
    a.set_timeout(Duration::from_millis(50), move |_| {
        f.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();
    let f = Arc::clone(&fired);
    a.set_interval(Duration::from_millis(20), move |_| {
        f.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();
    a.schedule("0 * * * * *", |_| Ok(())).unwrap();
    a.defer(|_| Ok(())).unwrap();
    b.on_message("*", |_, _| Ok(())).unwrap();

    a.shutdown("test");

    let left: Vec<ResourceInfo> = ScriptHost::new(Arc::clone(&core)).resources();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].owner, "b");
    assert_eq!(left[0].kind, ResourceKind::Subscription);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(seen.load(Ordering::SeqCst), 0);

    let err = a.on_message("*", |_, _| Ok(())).unwrap_err();
    assert_eq!(err.as_label(), "host_script_destroyed");
    assert!(a.set_timeout(Duration::ZERO, |_| Ok(())).is_err());
}

#[tokio::test(start_paused = true)]
async fn one_shot_timers_fire_once_and_leave_the_registry() {
    let (core, _rx, _bus) = host("rules/timers.rule");
    let script = core.new_script(Some("t")).unwrap();
    core.start().unwrap();

    let (fired, seen) = counter();
    let f = Arc::clone(&fired);
    script
        .set_timeout(Duration::from_millis(100), move |_| {
            f.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
    let f = Arc::clone(&fired);
    script
        .defer(move |_| {
            f.fetch_add(10, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
    assert_eq!(live(&core), 2);

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(seen.load(Ordering::SeqCst), 10);
    assert_eq!(live(&core), 1);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(seen.load(Ordering::SeqCst), 11);
    assert!(live(&core) == 0);
}

#[tokio::test(start_paused = true)]
async fn released_timers_never_fire() {
    let (core, _rx, _bus) = host("rules/cancel.rule");
    let script = core.new_script(Some("t")).unwrap();
    core.start().unwrap();

    let (fired, seen) = counter();
    let f = Arc::clone(&fired);
    let timeout = script
        .set_timeout(Duration::from_millis(100), move |_| {
            f.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
    let f = Arc::clone(&fired);
    let interval = script
        .set_interval(Duration::from_millis(100), move |_| {
            f.fetch_add(100, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(seen.load(Ordering::SeqCst), 301);
    assert!(!timeout.release());
    assert!(interval.release());

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(seen.load(Ordering::SeqCst), 301);
    assert!(live(&core) == 0);
}

#[tokio::test(start_paused = true)]
async fn timers_skip_scripts_that_are_not_running() {
    let (core, _rx, _bus) = host("rules/idle.rule");
    let script = core.new_script(Some("idle")).unwrap();
    let (fired, seen) = counter();
    script
        .set_timeout(Duration::from_millis(10), move |_| {
            fired.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(seen.load(Ordering::SeqCst), 0);
    assert!(live(&core) == 0);
}

#[tokio::test]
async fn invalid_cron_expression_registers_nothing() {
    let (core, _rx, _bus) = host("rules/cron.rule");
    let script = core.new_script(Some("c")).unwrap();
    let err = script.schedule("every tuesday", |_| Ok(())).unwrap_err();
    assert_eq!(err.as_label(), "host_invalid_schedule");
    assert!(live(&core) == 0);
}

#[tokio::test]
async fn nested_calls_are_billed_once() {
    let (core, _rx, _bus) = host("rules/cpu.rule");
    let a = core.new_script(Some("a")).unwrap();
    let b = core.new_script(Some("b")).unwrap();
    core.start().unwrap();

    let started = Instant::now();
    let b2 = b.clone();
    a.invoke("test", FaultMode::Contain, None, move |a| {
        std::thread::sleep(Duration::from_millis(5));
        a.call_in_context(&b2, |_| {
            std::thread::sleep(Duration::from_millis(40));
            Ok(())
        })?;
        Ok(())
    })
    .unwrap();
    let wall = started.elapsed();

    assert!(b.cpu_time() >= Duration::from_millis(40));
    assert!(a.cpu_time() >= Duration::from_millis(5));
    assert!(a.cpu_time() < Duration::from_millis(30), "a billed {:?}", a.cpu_time());
    assert!(a.cpu_time() + b.cpu_time() <= wall);
}

#[tokio::test]
async fn cross_script_fault_propagates_to_caller() {
    let (core, _rx, _bus) = host("rules/call.rule");
    let a = core.new_script(Some("a")).unwrap();
    let b = core.new_script(Some("b")).unwrap();
    core.start().unwrap();

    let err = a
        .call_in_context(&b, |_| -> anyhow::Result<()> { anyhow::bail!("callee failed") })
        .unwrap_err();
    assert!(err.to_string().contains("callee failed"));
    assert_eq!(b.last_error().unwrap().context, "call_in_context");
    assert!(a.last_error().is_none());

    b.shutdown("gone");
    let skipped = a.call_in_context(&b, |_| Ok(1)).unwrap();
    assert_eq!(skipped, None);
}

#[tokio::test]
async fn send_forwards_a_request() {
    let (core, mut rx, _bus) = host("rules/send.rule");
    let script: Script = core.new_script(Some("s")).unwrap();
    script
        .send(Outbound::trigger("sensor.basic").attr("device", "porch").to("acme-rf.home"))
        .unwrap();
    let req = rx.recv().await.unwrap();
    assert_eq!(req.script, script);
    assert_eq!(req.out.kind, MessageKind::Trigger);
    assert_eq!(req.out.target.as_deref(), Some("acme-rf.home"));
    assert_eq!(req.out.body.get("device").map(String::as_str), Some("porch"));
}

#[tokio::test]
async fn panicking_predicate_is_contained() {
    let (core, _rx, _bus) = host("rules/predicate.rule");
    let a = core.new_script(Some("a")).unwrap();
    let b = core.new_script(Some("b")).unwrap();
    a.on_message(Filter::predicate(|_, _, _| panic!("predicate exploded")), |_, _| Ok(()))
        .unwrap();
    let (hits, seen) = counter();
    b.on_message("*", move |_, _| {
        hits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();
    core.start().unwrap();

    core.dispatch(&kitchen_light(), Stage::Main);

    assert_eq!(seen.load(Ordering::SeqCst), 1);
    let fault = a.last_error().unwrap();
    assert_eq!(fault.context, "match");
    assert!(fault.message.contains("predicate exploded"));
    assert!(a.is_running());
    assert!(b.last_error().is_none());
}

#[tokio::test]
async fn subscription_released_mid_dispatch_is_skipped() {
    let (core, _rx, _bus) = host("rules/release.rule");
    let script = core.new_script(Some("s")).unwrap();
    let later: Arc<Mutex<Option<ReleaseHandle>>> = Arc::default();
    let slot = Arc::clone(&later);
    script
        .on_message("*", move |_, _| {
            if let Some(h) = slot.lock().take() {
                assert!(h.release());
            }
            Ok(())
        })
        .unwrap();
    let (hits, seen) = counter();
    let second = script
        .on_message("*", move |_, _| {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
    *later.lock() = Some(second);
    core.start().unwrap();

    core.dispatch(&kitchen_light(), Stage::Main);
    core.dispatch(&kitchen_light(), Stage::Main);

    assert_eq!(seen.load(Ordering::SeqCst), 0);
    assert_eq!(live(&core), 1);
}

#[tokio::test]
async fn dispatch_skips_script_while_it_is_starting() {
    let (core, _rx, _bus) = host("rules/starting.rule");
    let script = core.new_script(Some("s")).unwrap();
    let (hits, seen) = counter();
    script
        .on_message("*", move |_, _| {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

    let observed = Arc::new(Mutex::new(None));
    let state = Arc::clone(&observed);
    let weak = Arc::downgrade(&core);
    script.on_lifecycle(move |s, edge| {
        if edge == Lifecycle::Starting {
            *state.lock() = Some(s.state());
            if let Some(core) = weak.upgrade() {
                core.dispatch(&kitchen_light(), Stage::Main);
            }
        }
        Ok(())
    });

    core.start().unwrap();
    assert_eq!(
        *observed.lock(),
        Some(ScriptState {
            phase: Phase::Running,
            transitioning: true
        })
    );
    assert_eq!(seen.load(Ordering::SeqCst), 0);

    core.dispatch(&kitchen_light(), Stage::Main);
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn initializing_is_published_when_the_host_starts() {
    let (core, _rx, bus) = host("rules/init.rule");
    let mut events = bus.subscribe();
    let _script = core.new_script(Some("s")).unwrap();
    assert!(events.try_recv().is_err());

    core.start().unwrap();
    let first = events.try_recv().unwrap();
    assert_eq!(first.kind, EventKind::ScriptInitializing);
}

#[tokio::test]
async fn call_outside_a_wrapped_call_leaves_caller_unbilled() {
    let (core, _rx, _bus) = host("rules/hook-call.rule");
    let a = core.new_script(Some("a")).unwrap();
    let b = core.new_script(Some("b")).unwrap();
    core.start().unwrap();

    a.call_in_context(&b, |_| {
        std::thread::sleep(Duration::from_millis(20));
        Ok(())
    })
    .unwrap();
    assert_eq!(a.cpu_nanos(), 0);
    assert!(b.cpu_time() >= Duration::from_millis(20));

    a.invoke("test", FaultMode::Contain, None, |_| {
        std::thread::sleep(Duration::from_millis(10));
        Ok(())
    })
    .unwrap();
    assert!(a.cpu_time() >= Duration::from_millis(10));
}

#[tokio::test]
async fn late_cron_tick_does_not_replay_missed_occurrences() {
    let (core, _rx, _bus) = host("rules/cron.rule");
    let script = core.new_script(Some("cron")).unwrap();
    core.start().unwrap();

    let fires: Arc<Mutex<Vec<Instant>>> = Arc::default();
    let sink = Arc::clone(&fires);
    let job = script
        .schedule("* * * * * *", move |_| {
            let first = {
                let mut fires = sink.lock();
                fires.push(Instant::now());
                fires.len() == 1
            };
            if first {
                std::thread::sleep(Duration::from_millis(2500));
            }
            Ok(())
        })
        .unwrap();

    tokio::time::sleep(Duration::from_millis(5500)).await;
    job.release();

    let fires = fires.lock().clone();
    assert!(fires.len() >= 2, "fired {} times", fires.len());
    for pair in fires.windows(2) {
        let gap = pair[1] - pair[0];
        assert!(gap >= Duration::from_millis(500), "back-to-back fire after {gap:?}");
    }
}
