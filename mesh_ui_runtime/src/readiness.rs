//! Model readiness gate, one-shot retry timer and post-load reconciler.
//!
//! States: Uninitialized -> WaitingOnStores -> Ready. Ready is terminal.
//! The gate re-evaluates the conjunction of tracked store signals on every
//! store callback; the first true result fires the model-ready listeners
//! exactly once. A store that never reports ready holds the gate forever.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use crate::config::SyncConfig;
use crate::registry::MeshRegistry;
use crate::store::{ReadyCallback, ReadySignal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Uninitialized,
    WaitingOnStores,
    Ready,
}

struct GateCore {
    state: GateState,
    armed: bool,
    listeners: Vec<ReadyCallback>,
}

pub struct ReadinessGate {
    me: Weak<ReadinessGate>,
    tracked: Mutex<Vec<Arc<dyn ReadySignal>>>,
    core: Mutex<GateCore>,
}

impl ReadinessGate {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            tracked: Mutex::new(Vec::new()),
            core: Mutex::new(GateCore {
                state: GateState::Uninitialized,
                armed: false,
                listeners: Vec::new(),
            }),
        })
    }

    pub fn state(&self) -> GateState {
        self.lock_core().state
    }

    pub fn is_ready(&self) -> bool {
        self.state() == GateState::Ready
    }

    /// Add a store to the conjunction. Ignored once Ready. A store tracked
    /// after `arm` is subscribed immediately.
    pub fn track(&self, signal: Arc<dyn ReadySignal>) {
        let armed = {
            let mut core = self.lock_core();
            match core.state {
                GateState::Ready => {
                    warn!(
                        "readiness gate already ready; ignoring store {}",
                        signal.signal_name()
                    );
                    return;
                }
                GateState::Uninitialized => core.state = GateState::WaitingOnStores,
                GateState::WaitingOnStores => {}
            }
            self.tracked
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(Arc::clone(&signal));
            core.armed
        };
        debug!("readiness gate tracking {}", signal.signal_name());
        if armed {
            self.subscribe(signal.as_ref());
        }
    }

    pub fn track_all<I>(&self, signals: I)
    where
        I: IntoIterator<Item = Arc<dyn ReadySignal>>,
    {
        for signal in signals {
            self.track(signal);
        }
    }

    /// Subscribe to every tracked store and evaluate once right away.
    pub fn arm(&self) {
        let tracked = {
            let mut core = self.lock_core();
            if core.armed {
                return;
            }
            core.armed = true;
            self.tracked_snapshot()
        };
        for signal in &tracked {
            self.subscribe(signal.as_ref());
        }
        self.evaluate();
    }

    fn subscribe(&self, signal: &dyn ReadySignal) {
        let gate = self.me.clone();
        signal.on_ready(Box::new(move || {
            if let Some(gate) = gate.upgrade() {
                gate.evaluate();
            }
        }));
    }

    /// Run `callback` once the model is ready; immediately if it already is.
    pub fn on_model_ready<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut core = self.lock_core();
            if core.state != GateState::Ready {
                core.listeners.push(Box::new(callback));
                return;
            }
        }
        callback();
    }

    /// Check the conjunction; fire listeners on the first true result.
    pub fn evaluate(&self) {
        let tracked = self.tracked_snapshot();
        let waiting: Vec<&str> = tracked
            .iter()
            .filter(|s| !s.is_ready())
            .map(|s| s.signal_name())
            .collect();
        if !waiting.is_empty() {
            debug!("readiness gate waiting on {:?}", waiting);
            return;
        }

        let listeners = {
            let mut core = self.lock_core();
            if core.state == GateState::Ready || !core.armed {
                return;
            }
            core.state = GateState::Ready;
            std::mem::take(&mut core.listeners)
        };
        info!(
            "model ready: {} stores, {} listeners",
            tracked.len(),
            listeners.len()
        );
        for listener in listeners {
            listener();
        }
    }

    fn tracked_snapshot(&self) -> Vec<Arc<dyn ReadySignal>> {
        self.tracked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lock_core(&self) -> MutexGuard<'_, GateCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── One-shot timer ─────────────────────────────────────────────

/// At most one outstanding delayed job. Scheduling replaces the previous
/// job; a replaced or cancelled job never runs and its sleeper wakes early.
pub struct OneShotTimer {
    registry: Arc<MeshRegistry>,
    next_generation: AtomicU64,
    armed: Arc<Armed>,
}

/// Generation of the outstanding job, 0 when idle.
struct Armed {
    generation: Mutex<u64>,
    changed: Condvar,
}

impl Armed {
    fn lock(&self) -> MutexGuard<'_, u64> {
        self.generation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn replace(&self, generation: u64) -> u64 {
        let previous = std::mem::replace(&mut *self.lock(), generation);
        self.changed.notify_all();
        previous
    }
}

impl OneShotTimer {
    pub fn new(registry: Arc<MeshRegistry>) -> Self {
        Self {
            registry,
            next_generation: AtomicU64::new(1),
            armed: Arc::new(Armed {
                generation: Mutex::new(0),
                changed: Condvar::new(),
            }),
        }
    }

    pub fn schedule<F>(&self, delay: Duration, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let previous = self.armed.replace(generation);
        if previous != 0 {
            debug!("timer job {} replaced by {}", previous, generation);
        }

        let armed = Arc::clone(&self.armed);
        let registry = Arc::clone(&self.registry);
        thread::spawn(move || {
            {
                let current = armed.lock();
                let (mut current, _) = armed
                    .changed
                    .wait_timeout_while(current, delay, |g| *g == generation)
                    .unwrap_or_else(PoisonError::into_inner);
                if *current != generation {
                    return;
                }
                *current = 0;
            }
            if !registry.is_running() {
                debug!("timer job {} skipped: shutting down", generation);
                return;
            }
            job();
        });
    }

    pub fn cancel(&self) {
        self.armed.replace(0);
    }

    pub fn is_pending(&self) -> bool {
        *self.armed.lock() != 0
    }
}

// ── Reconciler ─────────────────────────────────────────────────

pub type ReconcileFn = Arc<dyn Fn() -> usize + Send + Sync>;

/// Post-load reconciliation for one store. An empty result at boot looks
/// the same as a cold store, so zero records schedule a retry.
pub struct Reconciler {
    name: String,
    backoff: Duration,
    timer: OneShotTimer,
    attempts: AtomicU32,
    complete: AtomicBool,
}

impl Reconciler {
    pub fn new(name: &str, registry: Arc<MeshRegistry>, config: &SyncConfig) -> Arc<Self> {
        Self::with_backoff(
            name,
            registry,
            Duration::from_millis(config.reconcile_backoff_ms),
        )
    }

    pub fn with_backoff(name: &str, registry: Arc<MeshRegistry>, backoff: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            backoff,
            timer: OneShotTimer::new(registry),
            attempts: AtomicU32::new(0),
            complete: AtomicBool::new(false),
        })
    }

    pub fn run(self: &Arc<Self>, reconcile: ReconcileFn) {
        let attempt = self.attempts.fetch_add(1, Ordering::AcqRel) + 1;
        let count = reconcile();
        if count == 0 {
            warn!(
                "{}: reconcile attempt {} found no records, retrying in {:?}",
                self.name, attempt, self.backoff
            );
            let this = Arc::clone(self);
            self.timer
                .schedule(self.backoff, move || this.run(reconcile));
            return;
        }
        self.timer.cancel();
        self.complete.store(true, Ordering::Release);
        info!(
            "{}: reconciled {} records after {} attempts",
            self.name, count, attempt
        );
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Acquire)
    }

    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    pub fn is_retry_pending(&self) -> bool {
        self.timer.is_pending()
    }
}
