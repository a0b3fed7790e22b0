//! Record stores and the typed store registry.
//!
//! Every descriptor kind and every data-source kind is backed by a keyed
//! store behind the `RecordStore<T>` capability. The registry resolves
//! stores by `DescriptorKind` (descriptors) or source kind (data rows);
//! nothing is looked up by method name.
//!
//! Stores become ready asynchronously and say so through `ReadySignal`.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use log::{debug, info};

use mesh_ui_model::{Descriptor, DescriptorKind, Keyed, Record};

use crate::error::StoreError;

pub type ReadyCallback = Box<dyn FnOnce() + Send>;

/// Asynchronous "I am ready" signal of a backing store.
pub trait ReadySignal: Send + Sync {
    fn signal_name(&self) -> &str;

    fn is_ready(&self) -> bool;

    /// Run `callback` once when ready; immediately if already ready.
    fn on_ready(&self, callback: ReadyCallback);
}

/// Result of a store mutation that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Applied,
    /// No record with that id.
    Missing,
    /// Accepted, completes asynchronously. The caller re-issues later.
    Pending,
}

pub type StoreResult = Result<StoreOutcome, StoreError>;

/// Keyed record store capability.
pub trait RecordStore<T>: ReadySignal {
    fn add(&self, item: T) -> StoreResult;
    fn update(&self, item: T) -> StoreResult;
    fn remove(&self, id: &str) -> StoreResult;
    fn get_by_id(&self, id: &str) -> Option<T>;
    fn query(&self, predicate: &dyn Fn(&T) -> bool) -> Vec<T>;

    fn all(&self) -> Vec<T> {
        self.query(&|_| true)
    }
}

/// Hook for stores that assign an insertion sequence.
pub trait Stamp {
    fn stamp(&mut self, _sequence: u64) {}
}

impl Stamp for Record {
    fn stamp(&mut self, sequence: u64) {
        if self.sequence == 0 {
            self.sequence = sequence;
        }
    }
}

impl Stamp for Arc<Descriptor> {}

// ── In-memory store ────────────────────────────────────────────

struct ReadyState {
    ready: bool,
    callbacks: Vec<ReadyCallback>,
}

/// Map-backed store. Ready only once `mark_ready` is called.
pub struct MemoryStore<T> {
    name: String,
    items: Mutex<BTreeMap<String, T>>,
    next_sequence: AtomicU64,
    ready: Mutex<ReadyState>,
}

impl<T> MemoryStore<T>
where
    T: Keyed + Stamp + Clone + Send + Sync + 'static,
{
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            items: Mutex::new(BTreeMap::new()),
            next_sequence: AtomicU64::new(1),
            ready: Mutex::new(ReadyState {
                ready: false,
                callbacks: Vec::new(),
            }),
        }
    }

    /// Store that reports ready from the start.
    pub fn ready(name: &str) -> Self {
        let store = Self::new(name);
        store.mark_ready();
        store
    }

    /// Flip to ready and run pending callbacks. Idempotent.
    pub fn mark_ready(&self) {
        let callbacks = {
            let mut state = self.ready.lock().unwrap_or_else(PoisonError::into_inner);
            if state.ready {
                return;
            }
            state.ready = true;
            std::mem::take(&mut state.callbacks)
        };
        info!("store {} ready ({} listeners)", self.name, callbacks.len());
        for callback in callbacks {
            callback();
        }
    }

    pub fn len(&self) -> usize {
        self.lock_items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_items(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> ReadySignal for MemoryStore<T>
where
    T: Keyed + Stamp + Clone + Send + Sync + 'static,
{
    fn signal_name(&self) -> &str {
        &self.name
    }

    fn is_ready(&self) -> bool {
        self.ready
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .ready
    }

    fn on_ready(&self, callback: ReadyCallback) {
        {
            let mut state = self.ready.lock().unwrap_or_else(PoisonError::into_inner);
            if !state.ready {
                state.callbacks.push(callback);
                return;
            }
        }
        callback();
    }
}

impl<T> RecordStore<T> for MemoryStore<T>
where
    T: Keyed + Stamp + Clone + Send + Sync + 'static,
{
    fn add(&self, mut item: T) -> StoreResult {
        let mut items = self.lock_items();
        if items.contains_key(item.key()) {
            return Err(StoreError::Rejected {
                store: self.name.clone(),
                operation: "add",
                id: item.key().to_string(),
                reason: "id already present".to_string(),
            });
        }
        item.stamp(self.next_sequence.fetch_add(1, Ordering::Relaxed));
        items.insert(item.key().to_string(), item);
        Ok(StoreOutcome::Applied)
    }

    fn update(&self, item: T) -> StoreResult {
        let mut items = self.lock_items();
        match items.get_mut(item.key()) {
            Some(slot) => {
                *slot = item;
                Ok(StoreOutcome::Applied)
            }
            None => Ok(StoreOutcome::Missing),
        }
    }

    fn remove(&self, id: &str) -> StoreResult {
        match self.lock_items().remove(id) {
            Some(_) => Ok(StoreOutcome::Applied),
            None => Ok(StoreOutcome::Missing),
        }
    }

    fn get_by_id(&self, id: &str) -> Option<T> {
        self.lock_items().get(id).cloned()
    }

    fn query(&self, predicate: &dyn Fn(&T) -> bool) -> Vec<T> {
        self.lock_items()
            .values()
            .filter(|item| predicate(item))
            .cloned()
            .collect()
    }
}

// ── Registry ───────────────────────────────────────────────────

pub type DescriptorStore = dyn RecordStore<Arc<Descriptor>>;
pub type DataStore = dyn RecordStore<Record>;

/// Typed registry of every backing store on this node.
#[derive(Default)]
pub struct StoreRegistry {
    descriptors: RwLock<HashMap<DescriptorKind, Arc<DescriptorStore>>>,
    data: RwLock<HashMap<String, Arc<DataStore>>>,
    signals: RwLock<Vec<Arc<dyn ReadySignal>>>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_descriptor_store<S>(&self, kind: DescriptorKind, store: Arc<S>)
    where
        S: RecordStore<Arc<Descriptor>> + 'static,
    {
        self.push_signal(store.clone());
        self.descriptors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind, store);
        debug!("descriptor store registered for {}", kind);
    }

    pub fn register_data_store<S>(&self, source_kind: &str, store: Arc<S>)
    where
        S: RecordStore<Record> + 'static,
    {
        self.push_signal(store.clone());
        self.data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(source_kind.to_string(), store);
        debug!("data store registered for {}", source_kind);
    }

    /// Register a fresh in-memory store for every descriptor kind.
    pub fn register_memory_descriptor_stores(
        &self,
        ready: bool,
    ) -> BTreeMap<DescriptorKind, Arc<MemoryStore<Arc<Descriptor>>>> {
        let mut created = BTreeMap::new();
        for kind in DescriptorKind::ALL {
            let name = format!("descriptors:{}", kind);
            let store = Arc::new(if ready {
                MemoryStore::ready(&name)
            } else {
                MemoryStore::new(&name)
            });
            self.register_descriptor_store(kind, Arc::clone(&store));
            created.insert(kind, store);
        }
        created
    }

    fn push_signal(&self, signal: Arc<dyn ReadySignal>) {
        self.signals
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(signal);
    }

    pub fn descriptor_store(&self, kind: DescriptorKind) -> Option<Arc<DescriptorStore>> {
        self.descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
    }

    pub fn data_store(&self, source_kind: &str) -> Option<Arc<DataStore>> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(source_kind)
            .cloned()
    }

    /// Readiness signals of every registered store.
    pub fn ready_signals(&self) -> Vec<Arc<dyn ReadySignal>> {
        self.signals
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn descriptor(&self, kind: DescriptorKind, id: &str) -> Option<Arc<Descriptor>> {
        self.descriptor_store(kind)?.get_by_id(id)
    }

    /// Look a descriptor up by id across every kind.
    pub fn find_descriptor(&self, id: &str) -> Option<Arc<Descriptor>> {
        DescriptorKind::ALL
            .iter()
            .find_map(|kind| self.descriptor(*kind, id))
    }

    pub fn descriptors(&self, kind: DescriptorKind) -> Vec<Arc<Descriptor>> {
        self.descriptor_store(kind)
            .map(|store| store.all())
            .unwrap_or_default()
    }

    /// Descriptors of any kind matching `predicate`.
    pub fn query_descriptors(&self, predicate: &dyn Fn(&Descriptor) -> bool) -> Vec<Arc<Descriptor>> {
        let stores: Vec<Arc<DescriptorStore>> = self
            .descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        stores
            .iter()
            .flat_map(|store| store.query(&|d: &Arc<Descriptor>| predicate(d)))
            .collect()
    }
}
