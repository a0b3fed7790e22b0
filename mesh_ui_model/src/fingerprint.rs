//! Mesh UI Model: Canonical Fingerprints
//!
//! Deterministic serialization + SHA-256 of attribute bags, so two nodes
//! (or a node and a client cache) can tell whether they converged.
//!
//! Rules:
//!   - model_version first, then the name→value function
//!   - names sorted (UTF-8 byte order), earlier duplicates dropped
//!   - UTF-8 JSON, no whitespace

use sha2::{Digest, Sha256};
use serde_json::{Map, Value};

use crate::attribute_bag::AttributeBag;
use crate::MODEL_VERSION;

/// Canonical JSON bytes of a bag.
pub fn canonical_serialize(bag: &AttributeBag) -> Vec<u8> {
    let mut properties = Map::new();
    for (name, value) in bag.to_map() {
        properties.insert(name, Value::String(value));
    }

    let mut root = Map::new();
    root.insert("model_version".to_string(), Value::from(MODEL_VERSION));
    root.insert("properties".to_string(), Value::Object(properties));

    Value::Object(root).to_string().into_bytes()
}

/// Lowercase hex SHA-256 of the canonical form.
pub fn canonical_fingerprint(bag: &AttributeBag) -> String {
    fingerprint_bytes(&canonical_serialize(bag))
}

/// Lowercase hex SHA-256 of arbitrary bytes.
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}
