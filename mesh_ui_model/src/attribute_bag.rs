//! Mesh UI Model: Attribute Bag
//!
//! Ordered, string-encoded property container carried by every descriptor.
//!
//! Storage: a list of `name<sep>value` entries in insertion order. An entry
//! without a separator is a flag and reads back as `"true"`.
//!
//! Lookups go through a derived name→value index that lives behind its own
//! lock. The index is rebuilt whenever its size diverges from the entry
//! count, so it is only eventually consistent with the latest mutation.
//!
//! Lock order: entries → index. Never the reverse.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::de::Deserializer;
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};

/// Separator between name and value unless a bag is built with another one.
pub const DEFAULT_SEPARATOR: &str = "=";

/// Value reported for an entry that carries no separator.
pub const FLAG_VALUE: &str = "true";

/// Properties that only make sense on the hosting node. `merge` skips them
/// when asked to ignore reserved names.
pub const NODE_ONLY_PROPERTIES: &[&str] = &[
    "NodeID",
    "EngineName",
    "OwnerThing",
    "DataSource",
    "AccessLevel",
];

/// True if `name` belongs to the reserved node-only set.
pub fn is_node_only(name: &str) -> bool {
    NODE_ONLY_PROPERTIES.contains(&name)
}

/// Ordered key/value bag with a lazily synchronized lookup index.
pub struct AttributeBag {
    separator: String,
    entries: Mutex<Vec<String>>,
    index: RwLock<HashMap<String, String>>,
}

impl AttributeBag {
    /// Empty bag using `=` as separator.
    pub fn new() -> Self {
        Self::with_separator(DEFAULT_SEPARATOR)
    }

    /// Empty bag using a custom separator.
    pub fn with_separator(separator: &str) -> Self {
        Self {
            separator: separator.to_string(),
            entries: Mutex::new(Vec::new()),
            index: RwLock::new(HashMap::new()),
        }
    }

    /// Build a bag from its wire form (default separator).
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_entries_with(DEFAULT_SEPARATOR, entries)
    }

    /// Build a bag from its wire form using `separator`.
    pub fn from_entries_with<I, S>(separator: &str, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let bag = Self::with_separator(separator);
        *bag.lock_entries() = entries.into_iter().map(Into::into).collect();
        bag
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    // ── Lookup ────────────────────────────────────────────────────

    /// Value of `name`, or an empty string if absent.
    pub fn get(&self, name: &str) -> String {
        self.lookup(name).unwrap_or_default()
    }

    /// Value of `name`, or `default` if absent.
    pub fn get_or(&self, name: &str, default: &str) -> String {
        self.lookup(name).unwrap_or_else(|| default.to_string())
    }

    /// Interpret `name` as a boolean. Absent or unparsable reads as false.
    pub fn get_bool(&self, name: &str) -> bool {
        self.lookup(name)
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    fn lookup(&self, name: &str) -> Option<String> {
        let count = self.lock_entries().len();
        {
            let index = self.read_index();
            if index.len() == count {
                return index.get(name).cloned();
            }
        }
        self.rebuild_index();
        self.read_index().get(name).cloned()
    }

    /// Recompute the index from the ordered entries. Later entries win.
    pub fn rebuild_index(&self) {
        let entries = self.lock_entries();
        let mut rebuilt = HashMap::with_capacity(entries.len());
        for entry in entries.iter() {
            let (name, value) = split_entry(entry, &self.separator);
            rebuilt.insert(name.to_string(), value.to_string());
        }
        log::trace!("attribute bag index rebuilt: {} entries", entries.len());
        *self.write_index() = rebuilt;
    }

    // ── Mutation ──────────────────────────────────────────────────

    /// Set `name` to `value`. Returns true if no entry of that name existed.
    ///
    /// Without `allow_duplicates` the old entry is dropped and the new one
    /// appended, so the property moves to the end of the order.
    ///
    /// A name containing the separator could never be read back, so it is
    /// refused: the bag is left unchanged and false is returned.
    pub fn set(&self, name: &str, value: &str, allow_duplicates: bool) -> bool {
        if name.contains(self.separator.as_str()) {
            log::warn!(
                "attribute name {:?} contains separator {:?}; ignored",
                name,
                self.separator
            );
            return false;
        }
        let entry = compose_entry(name, value, &self.separator);
        let existed = {
            let mut entries = self.lock_entries();
            let existed = entries
                .iter()
                .any(|e| entry_name(e, &self.separator) == name);
            if existed && !allow_duplicates {
                entries.retain(|e| entry_name(e, &self.separator) != name);
            }
            entries.push(entry);
            existed
        };
        self.write_index()
            .insert(name.to_string(), value.to_string());
        !existed
    }

    /// Remove every entry called `name`. Returns true if any was removed.
    pub fn remove(&self, name: &str) -> bool {
        let removed = {
            let mut entries = self.lock_entries();
            let before = entries.len();
            entries.retain(|e| entry_name(e, &self.separator) != name);
            entries.len() != before
        };
        if removed {
            self.write_index().remove(name);
        }
        removed
    }

    /// Merge `other` into this bag.
    ///
    /// Each incoming entry replaces any same-named entry and is appended.
    /// With `ignore_reserved`, node-only names from `other` are skipped.
    pub fn merge(&self, other: &AttributeBag, ignore_reserved: bool, rebuild_index: bool) {
        let incoming = other.entries();
        let mut applied = Vec::with_capacity(incoming.len());
        {
            let mut entries = self.lock_entries();
            for raw in &incoming {
                let (name, value) = split_entry(raw, &other.separator);
                if ignore_reserved && is_node_only(name) {
                    continue;
                }
                if name.contains(self.separator.as_str()) {
                    log::warn!("merge skipped {:?}: name holds separator", name);
                    continue;
                }
                entries.retain(|e| entry_name(e, &self.separator) != name);
                if other.separator == self.separator {
                    entries.push(raw.clone());
                } else {
                    entries.push(compose_entry(name, value, &self.separator));
                }
                applied.push((name.to_string(), value.to_string()));
            }
        }
        if rebuild_index {
            self.rebuild_index();
        } else {
            let mut index = self.write_index();
            for (name, value) in applied {
                index.insert(name, value);
            }
        }
    }

    /// Drop every entry and the index together.
    pub fn clear(&self) {
        let mut entries = self.lock_entries();
        entries.clear();
        self.write_index().clear();
    }

    // ── Copies and views ──────────────────────────────────────────

    /// Independent deep copy. The copy's index is built lazily unless
    /// `rebuild_index` is set.
    pub fn clone_with(&self, rebuild_index: bool) -> AttributeBag {
        let copy = AttributeBag::from_entries_with(&self.separator, self.entries());
        if rebuild_index {
            copy.rebuild_index();
        }
        copy
    }

    /// Entries nested at `depth` leading dots, with the dots stripped.
    ///
    /// Depth 0 selects entries without a leading dot.
    pub fn sub_bag(&self, depth: usize) -> AttributeBag {
        let selected: Vec<String> = self
            .entries()
            .into_iter()
            .filter(|e| e.bytes().take_while(|b| *b == b'.').count() == depth)
            .map(|e| e[depth..].to_string())
            .collect();
        AttributeBag::from_entries_with(&self.separator, selected)
    }

    /// Ordered wire form.
    pub fn entries(&self) -> Vec<String> {
        self.lock_entries().clone()
    }

    /// Distinct names in first-seen order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for entry in self.lock_entries().iter() {
            let name = entry_name(entry, &self.separator);
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        names
    }

    /// The name→value function, freshly derived from the entries.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.lock_entries()
            .iter()
            .map(|e| {
                let (name, value) = split_entry(e, &self.separator);
                (name.to_string(), value.to_string())
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_entries().is_empty()
    }

    /// Write straight into the index, bypassing the entry list.
    /// Only useful to exercise the self-healing rebuild.
    #[doc(hidden)]
    pub fn inject_index_entry(&self, name: &str, value: &str) {
        self.write_index()
            .insert(name.to_string(), value.to_string());
    }

    // ── Locks ─────────────────────────────────────────────────────

    fn lock_entries(&self) -> MutexGuard<'_, Vec<String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_index(&self) -> RwLockReadGuard<'_, HashMap<String, String>> {
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_index(&self) -> RwLockWriteGuard<'_, HashMap<String, String>> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Split a raw entry into `(name, value)`. Flags read as `"true"`.
pub fn split_entry<'a>(entry: &'a str, separator: &str) -> (&'a str, &'a str) {
    match entry.find(separator) {
        Some(pos) => (&entry[..pos], &entry[pos + separator.len()..]),
        None => (entry, FLAG_VALUE),
    }
}

fn entry_name<'a>(entry: &'a str, separator: &str) -> &'a str {
    split_entry(entry, separator).0
}

fn compose_entry(name: &str, value: &str, separator: &str) -> String {
    format!("{}{}{}", name, separator, value)
}

impl Default for AttributeBag {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for AttributeBag {
    fn clone(&self) -> Self {
        self.clone_with(false)
    }
}

impl PartialEq for AttributeBag {
    fn eq(&self, other: &Self) -> bool {
        self.separator == other.separator && self.entries() == other.entries()
    }
}

impl fmt::Debug for AttributeBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeBag")
            .field("separator", &self.separator)
            .field("entries", &self.entries())
            .finish()
    }
}

impl Serialize for AttributeBag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let entries = self.entries();
        let mut seq = serializer.serialize_seq(Some(entries.len()))?;
        for entry in &entries {
            seq.serialize_element(entry)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for AttributeBag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = Vec::<String>::deserialize(deserializer)?;
        Ok(AttributeBag::from_entries(entries))
    }
}
