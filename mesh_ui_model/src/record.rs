//! Mesh UI Model: Records
//!
//! Schema-less data rows served by tables and forms. Every row is an
//! attribute bag plus the identity a store needs to key it.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::attribute_bag::AttributeBag;

/// Anything a keyed store can hold.
pub trait Keyed {
    fn key(&self) -> &str;
}

impl<T: Keyed> Keyed for Arc<T> {
    fn key(&self) -> &str {
        (**self).key()
    }
}

/// A single data row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    /// Insertion order, assigned by the store. Sorting key for row serving.
    pub sequence: u64,
    pub owner_id: String,
    pub fields: AttributeBag,
}

impl Record {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            sequence: 0,
            owner_id: String::new(),
            fields: AttributeBag::new(),
        }
    }

    pub fn with_owner(mut self, owner_id: &str) -> Self {
        self.owner_id = owner_id.to_string();
        self
    }

    pub fn with_field(self, name: &str, value: &str) -> Self {
        self.fields.set(name, value, false);
        self
    }

    /// Flat row as sent to render clients. `id` is always present.
    pub fn to_row(&self) -> BTreeMap<String, String> {
        let mut row = self.fields.to_map();
        row.insert("id".to_string(), self.id.clone());
        row
    }
}

impl Keyed for Record {
    fn key(&self) -> &str {
        &self.id
    }
}
