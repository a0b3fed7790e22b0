//! Store readiness, the model readiness gate, the one-shot timer and
//! post-load reconciliation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use mesh_ui_model::{Descriptor, DescriptorKind, Record};

use mesh_ui_runtime::config::SyncConfig;
use mesh_ui_runtime::error::StoreError;
use mesh_ui_runtime::readiness::{GateState, OneShotTimer, ReadinessGate, Reconciler};
use mesh_ui_runtime::registry::MeshRegistry;
use mesh_ui_runtime::store::{MemoryStore, ReadySignal, RecordStore, StoreOutcome, StoreRegistry};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn wait_until(timeout: Duration, check: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    check()
}

fn counting_gate(stores: &[Arc<MemoryStore<Record>>]) -> (Arc<ReadinessGate>, Arc<AtomicUsize>) {
    let gate = ReadinessGate::new();
    for store in stores {
        gate.track(store.clone());
    }
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    gate.on_model_ready(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    gate.arm();
    (gate, fired)
}

// ─────────────────────────────────────────────────────────────
// Memory store
// ─────────────────────────────────────────────────────────────

#[test]
fn memory_store_crud() {
    let store: MemoryStore<Record> = MemoryStore::ready("rows");
    assert_eq!(
        store.add(Record::new("r1").with_field("Name", "one")).expect("add"),
        StoreOutcome::Applied
    );
    store.add(Record::new("r2")).expect("add");

    assert_eq!(store.get_by_id("r1").expect("r1").sequence, 1);
    assert_eq!(store.get_by_id("r2").expect("r2").sequence, 2);

    let dup = store.add(Record::new("r1")).unwrap_err();
    assert!(matches!(dup, StoreError::Rejected { operation: "add", .. }));

    assert_eq!(
        store.update(Record::new("nope")).expect("update"),
        StoreOutcome::Missing
    );
    let named = store.query(&|r: &Record| r.fields.get("Name") == "one");
    assert_eq!(named.len(), 1);

    assert_eq!(store.remove("r2").expect("remove"), StoreOutcome::Applied);
    assert_eq!(store.remove("r2").expect("remove"), StoreOutcome::Missing);
    assert_eq!(store.len(), 1);
}

#[test]
fn ready_callbacks_run_once() {
    let store: MemoryStore<Record> = MemoryStore::new("rows");
    let calls = Arc::new(AtomicUsize::new(0));

    let before = Arc::clone(&calls);
    store.on_ready(Box::new(move || {
        before.fetch_add(1, Ordering::SeqCst);
    }));
    assert!(!store.is_ready());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    store.mark_ready();
    store.mark_ready();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let after = Arc::clone(&calls);
    store.on_ready(Box::new(move || {
        after.fetch_add(1, Ordering::SeqCst);
    }));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn store_registry_resolves_by_kind() {
    let stores = StoreRegistry::new();
    let created = stores.register_memory_descriptor_stores(false);
    assert_eq!(created.len(), DescriptorKind::ALL.len());
    stores.register_data_store("devices", Arc::new(MemoryStore::<Record>::new("devices")));

    let tiles = &created[&DescriptorKind::Tile];
    tiles
        .add(Arc::new(Descriptor::new(DescriptorKind::Tile, "lamp")))
        .expect("add");

    assert!(stores.descriptor(DescriptorKind::Tile, "lamp").is_some());
    assert!(stores.descriptor(DescriptorKind::Form, "lamp").is_none());
    assert_eq!(
        stores.find_descriptor("lamp").map(|d| d.kind),
        Some(DescriptorKind::Tile)
    );
    assert!(stores.data_store("devices").is_some());
    assert!(stores.data_store("people").is_none());
    assert_eq!(stores.ready_signals().len(), DescriptorKind::ALL.len() + 1);
}

// ─────────────────────────────────────────────────────────────
// Readiness gate
// ─────────────────────────────────────────────────────────────

#[test]
fn gate_fires_once_for_every_ready_order() {
    init_logging();
    let orders: [[usize; 3]; 6] = [
        [0, 1, 2],
        [0, 2, 1],
        [1, 0, 2],
        [1, 2, 0],
        [2, 0, 1],
        [2, 1, 0],
    ];
    for order in orders {
        let stores: Vec<Arc<MemoryStore<Record>>> = (0..3)
            .map(|i| Arc::new(MemoryStore::new(&format!("store-{}", i))))
            .collect();
        let (gate, fired) = counting_gate(&stores);
        assert_eq!(gate.state(), GateState::WaitingOnStores);

        for (step, idx) in order.iter().enumerate() {
            stores[*idx].mark_ready();
            let expected = if step == 2 { 1 } else { 0 };
            assert_eq!(fired.load(Ordering::SeqCst), expected, "order {:?}", order);
        }
        assert!(gate.is_ready());

        for store in &stores {
            store.mark_ready();
        }
        gate.evaluate();
        assert_eq!(fired.load(Ordering::SeqCst), 1, "order {:?}", order);
    }
}

#[test]
fn stores_ready_before_arm_fire_immediately() {
    let stores = vec![
        Arc::new(MemoryStore::<Record>::ready("a")),
        Arc::new(MemoryStore::<Record>::ready("b")),
    ];
    let (gate, fired) = counting_gate(&stores);
    assert_eq!(gate.state(), GateState::Ready);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn stalled_store_blocks_ready() {
    let stores = vec![
        Arc::new(MemoryStore::<Record>::new("fast")),
        Arc::new(MemoryStore::<Record>::new("stalled")),
    ];
    let (gate, fired) = counting_gate(&stores);
    stores[0].mark_ready();
    gate.evaluate();
    assert_eq!(gate.state(), GateState::WaitingOnStores);
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[test]
fn late_listener_runs_immediately() {
    let gate = ReadinessGate::new();
    assert_eq!(gate.state(), GateState::Uninitialized);
    gate.track(Arc::new(MemoryStore::<Record>::ready("only")));
    gate.arm();
    assert!(gate.is_ready());

    let ran = Arc::new(AtomicUsize::new(0));
    let flag = Arc::clone(&ran);
    gate.on_model_ready(move || {
        flag.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[test]
fn tracking_after_ready_is_ignored() {
    init_logging();
    let gate = ReadinessGate::new();
    gate.track(Arc::new(MemoryStore::<Record>::ready("first")));
    gate.arm();
    assert!(gate.is_ready());

    gate.track(Arc::new(MemoryStore::<Record>::new("late")));
    gate.evaluate();
    assert_eq!(gate.state(), GateState::Ready);
}

#[test]
fn store_tracked_after_arm_is_still_awaited() {
    let first = Arc::new(MemoryStore::<Record>::new("first"));
    let late = Arc::new(MemoryStore::<Record>::new("late"));
    let (gate, fired) = counting_gate(&[first.clone()]);
    gate.track(late.clone());

    first.mark_ready();
    assert_eq!(gate.state(), GateState::WaitingOnStores);
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    late.mark_ready();
    assert!(gate.is_ready());
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn unarmed_gate_never_fires() {
    let gate = ReadinessGate::new();
    gate.track(Arc::new(MemoryStore::<Record>::ready("only")));
    gate.evaluate();
    assert_eq!(gate.state(), GateState::WaitingOnStores);
}

#[test]
fn gate_tracks_a_whole_store_registry() {
    let stores = StoreRegistry::new();
    let created = stores.register_memory_descriptor_stores(false);
    let gate = ReadinessGate::new();
    gate.track_all(stores.ready_signals());
    gate.arm();

    for store in created.values() {
        assert!(!gate.is_ready());
        store.mark_ready();
    }
    assert!(gate.is_ready());
}

// ─────────────────────────────────────────────────────────────
// One-shot timer
// ─────────────────────────────────────────────────────────────

#[test]
fn scheduling_replaces_the_outstanding_job() {
    let timer = OneShotTimer::new(Arc::new(MeshRegistry::new("self")));
    let ran = Arc::new(Mutex::new(Vec::new()));

    let first = Arc::clone(&ran);
    timer.schedule(Duration::from_millis(150), move || {
        first.lock().unwrap().push("first");
    });
    let second = Arc::clone(&ran);
    timer.schedule(Duration::from_millis(10), move || {
        second.lock().unwrap().push("second");
    });
    assert!(timer.is_pending());

    assert!(wait_until(Duration::from_secs(2), || !timer.is_pending()));
    thread::sleep(Duration::from_millis(250));
    assert_eq!(*ran.lock().unwrap(), vec!["second"]);
}

#[test]
fn cancelled_job_never_runs() {
    let timer = OneShotTimer::new(Arc::new(MeshRegistry::new("self")));
    let ran = Arc::new(AtomicUsize::new(0));
    let flag = Arc::clone(&ran);
    timer.schedule(Duration::from_millis(20), move || {
        flag.fetch_add(1, Ordering::SeqCst);
    });
    timer.cancel();
    assert!(!timer.is_pending());

    thread::sleep(Duration::from_millis(120));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[test]
fn replaced_and_cancelled_sleepers_exit_early() {
    let timer = OneShotTimer::new(Arc::new(MeshRegistry::new("self")));
    let token = Arc::new(());

    let replaced = Arc::clone(&token);
    timer.schedule(Duration::from_secs(60), move || drop(replaced));
    let cancelled = Arc::clone(&token);
    timer.schedule(Duration::from_secs(60), move || drop(cancelled));

    assert!(wait_until(Duration::from_secs(2), || Arc::strong_count(&token) == 2));
    timer.cancel();
    assert!(wait_until(Duration::from_secs(2), || Arc::strong_count(&token) == 1));
}

#[test]
fn jobs_skip_after_shutdown() {
    let registry = Arc::new(MeshRegistry::new("self"));
    let timer = OneShotTimer::new(Arc::clone(&registry));
    let ran = Arc::new(AtomicUsize::new(0));
    let flag = Arc::clone(&ran);
    timer.schedule(Duration::from_millis(20), move || {
        flag.fetch_add(1, Ordering::SeqCst);
    });
    registry.shutdown();

    thread::sleep(Duration::from_millis(120));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

// ─────────────────────────────────────────────────────────────
// Reconciler
// ─────────────────────────────────────────────────────────────

#[test]
fn empty_reconcile_retries_after_backoff() {
    init_logging();
    let config = SyncConfig {
        reconcile_backoff_ms: 20,
        ..SyncConfig::default()
    };
    let reconciler = Reconciler::new("devices", Arc::new(MeshRegistry::new("self")), &config);

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    reconciler.run(Arc::new(move || {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            0
        } else {
            3
        }
    }));
    assert!(!reconciler.is_complete());
    assert!(reconciler.is_retry_pending());

    assert!(wait_until(Duration::from_secs(2), || reconciler.is_complete()));
    assert_eq!(reconciler.attempts(), 2);
    assert!(!reconciler.is_retry_pending());
}

#[test]
fn non_empty_reconcile_completes_at_once() {
    let reconciler = Reconciler::with_backoff(
        "devices",
        Arc::new(MeshRegistry::new("self")),
        Duration::from_millis(20),
    );
    reconciler.run(Arc::new(|| 5));
    assert!(reconciler.is_complete());
    assert_eq!(reconciler.attempts(), 1);
    assert!(!reconciler.is_retry_pending());
}

#[test]
fn shutdown_stops_reconcile_retries() {
    let registry = Arc::new(MeshRegistry::new("self"));
    let reconciler =
        Reconciler::with_backoff("devices", Arc::clone(&registry), Duration::from_millis(20));
    registry.shutdown();

    reconciler.run(Arc::new(|| 0));
    thread::sleep(Duration::from_millis(150));
    assert_eq!(reconciler.attempts(), 1);
    assert!(!reconciler.is_complete());
}
