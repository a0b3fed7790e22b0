//! Process-scoped mesh registry.
//!
//! Holds what would otherwise be ambient global state: the Known-Node Set,
//! the registered-engine map and the advisory "still running" switch.
//! One instance per process, injected into every protocol component.
//!
//! Init:     `MeshRegistry::new(node_id)`, running with empty sets.
//! Teardown: `shutdown()` flips the switch (in-flight work finishes);
//!           `teardown()` also drops engines, breaking engine ↔ registry
//!           reference cycles.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use log::{debug, info};

use crate::collaborators::EngineHandle;

pub struct MeshRegistry {
    node_id: String,
    running: AtomicBool,
    known_nodes: RwLock<BTreeSet<String>>,
    engines: RwLock<BTreeMap<String, Arc<dyn EngineHandle>>>,
}

impl MeshRegistry {
    pub fn new(node_id: &str) -> Self {
        Self {
            node_id: node_id.to_string(),
            running: AtomicBool::new(true),
            known_nodes: RwLock::new(BTreeSet::new()),
            engines: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    // ── Running switch ────────────────────────────────────────────

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn shutdown(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            info!("mesh registry {}: shutting down", self.node_id);
        }
    }

    /// Shut down and drop every engine and known node.
    pub fn teardown(&self) {
        self.shutdown();
        self.engines
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.known_nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    // ── Known-Node Set ────────────────────────────────────────────

    /// Record a node that asked for model metadata. True if new.
    pub fn note_node(&self, node_id: &str) -> bool {
        if node_id.is_empty() {
            return false;
        }
        let inserted = self
            .known_nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(node_id.to_string());
        if inserted {
            debug!("known node added: {}", node_id);
        }
        inserted
    }

    pub fn forget_node(&self, node_id: &str) -> bool {
        self.known_nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(node_id)
    }

    pub fn is_known(&self, node_id: &str) -> bool {
        self.known_nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(node_id)
    }

    pub fn known_nodes(&self) -> Vec<String> {
        self.known_nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    // ── Engines ───────────────────────────────────────────────────

    pub fn register_engine(&self, engine: Arc<dyn EngineHandle>) {
        let name = engine.name().to_string();
        self.engines
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), engine);
        info!("engine registered: {}", name);
    }

    pub fn unregister_engine(&self, name: &str) -> bool {
        self.engines
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some()
    }

    pub fn engine(&self, name: &str) -> Option<Arc<dyn EngineHandle>> {
        self.engines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Every engine, ordered by name.
    pub fn engines(&self) -> Vec<Arc<dyn EngineHandle>> {
        self.engines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}
