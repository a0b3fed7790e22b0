//! Contracts of the services this core consumes but does not own:
//! access control, localization, picker sources, raw resources and
//! engines that can take forwarded commands.
//!
//! A few minimal implementations are provided for nodes that run
//! without the real services.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::command::RoutedCommand;

pub trait AccessControl: Send + Sync {
    fn has_access(&self, user_id: &str, level: u32) -> bool;
}

pub trait Localizer: Send + Sync {
    fn localize(&self, lcid: u32, engine: &str, text: &str) -> String;
}

/// One row of a picker list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickerEntry {
    pub id: String,
    pub name: String,
}

impl PickerEntry {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
        }
    }
}

/// Backing lists for the specialized picker sub-verbs.
pub trait PickerSource: Send + Sync {
    fn things(&self, filter: &str) -> Vec<PickerEntry>;
    fn device_types(&self) -> Vec<PickerEntry>;
    fn properties(&self, thing_id: &str) -> Vec<PickerEntry>;
    fn certificates(&self) -> Vec<PickerEntry>;
    fn resolve_name(&self, id: &str) -> Option<String>;
}

pub trait ResourceProvider: Send + Sync {
    fn resource(&self, name: &str) -> Option<Vec<u8>>;
}

/// A named engine on this node. Engines own stores and dashboards and
/// accept commands forwarded from other engines.
pub trait EngineHandle: Send + Sync {
    fn name(&self) -> &str;

    fn is_enabled(&self) -> bool {
        true
    }

    fn is_loaded(&self) -> bool {
        true
    }

    /// Descriptor id of the panel this engine contributes to dashboards.
    fn dashboard_panel(&self) -> Option<String> {
        None
    }

    fn handle_command(&self, command: RoutedCommand);
}

// ── Minimal implementations ────────────────────────────────────

/// Per-user numeric levels; a user may see anything at or below theirs.
/// Unknown users only see level 0.
#[derive(Default)]
pub struct UserLevels {
    levels: RwLock<HashMap<String, u32>>,
}

impl UserLevels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, user_id: &str, level: u32) {
        if let Ok(mut levels) = self.levels.write() {
            levels.insert(user_id.to_string(), level);
        }
    }
}

impl AccessControl for UserLevels {
    fn has_access(&self, user_id: &str, level: u32) -> bool {
        if level == 0 {
            return true;
        }
        self.levels
            .read()
            .ok()
            .and_then(|levels| levels.get(user_id).copied())
            .map(|granted| granted >= level)
            .unwrap_or(false)
    }
}

/// Returns text unchanged.
pub struct PassthroughLocalizer;

impl Localizer for PassthroughLocalizer {
    fn localize(&self, _lcid: u32, _engine: &str, text: &str) -> String {
        text.to_string()
    }
}

/// Empty picker lists.
pub struct NoPickers;

impl PickerSource for NoPickers {
    fn things(&self, _filter: &str) -> Vec<PickerEntry> {
        Vec::new()
    }

    fn device_types(&self) -> Vec<PickerEntry> {
        Vec::new()
    }

    fn properties(&self, _thing_id: &str) -> Vec<PickerEntry> {
        Vec::new()
    }

    fn certificates(&self) -> Vec<PickerEntry> {
        Vec::new()
    }

    fn resolve_name(&self, _id: &str) -> Option<String> {
        None
    }
}

/// In-memory resources keyed by name.
#[derive(Default)]
pub struct MemoryResources {
    items: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: &str, bytes: Vec<u8>) {
        if let Ok(mut items) = self.items.write() {
            items.insert(name.to_string(), bytes);
        }
    }
}

impl ResourceProvider for MemoryResources {
    fn resource(&self, name: &str) -> Option<Vec<u8>> {
        self.items.read().ok().and_then(|items| items.get(name).cloned())
    }
}
