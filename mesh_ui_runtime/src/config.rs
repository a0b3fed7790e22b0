//! Node configuration.
//!
//! Loaded from JSON; every field has a default so partial files work.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// This node's id on the mesh.
    pub node_id: String,
    /// Engine that receives commands dispatched on this node.
    pub engine_name: String,
    /// Hosted in the cloud relay tier.
    pub cloud_hosted: bool,
    /// Cloud nodes must be scoped to a tenant before broadcasting.
    pub scoped: bool,
    /// Back-off before retrying a reconcile that found zero records.
    pub reconcile_backoff_ms: u64,
    /// Relay hops after which forwarded commands are dropped.
    pub max_forward_hops: u32,
    /// Minimum access level for picker sub-verbs.
    pub picker_access_level: u32,
    /// Minimum access level for raw resources.
    pub resource_access_level: u32,
    /// Locale used when a request carries none.
    pub default_lcid: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            node_id: "local".to_string(),
            engine_name: "MeshUi".to_string(),
            cloud_hosted: false,
            scoped: false,
            reconcile_backoff_ms: 10_000,
            max_forward_hops: 1,
            picker_access_level: 128,
            resource_access_level: 0,
            default_lcid: 1033,
        }
    }
}

impl SyncConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Broadcasts from an unscoped cloud node would leak across tenants.
    pub fn may_broadcast(&self) -> bool {
        !(self.cloud_hosted && !self.scoped)
    }
}
