//! Model service: descriptor lifecycle plus binding-driven propagation.
//!
//! Descriptors live in the typed stores as `Arc<Descriptor>`; their bags
//! lock internally, so property updates mutate the stored instance in
//! place and only the resulting delta goes on the wire.

use std::sync::Arc;

use log::{debug, info};

use mesh_ui_model::delta::compare_bags;
use mesh_ui_model::invariants::try_validate_descriptor;
use mesh_ui_model::{Descriptor, DescriptorKind};

use crate::command::Assignment;
use crate::error::{SyncError, SyncResult};
use crate::propagation::{PropertyPublisher, PublishOutcome, SkipReason, Target};
use crate::store::{StoreOutcome, StoreRegistry};

/// Property carrying a bound control's displayed value.
pub const VALUE_PROPERTY: &str = "Value";

pub struct ModelService {
    stores: Arc<StoreRegistry>,
    publisher: Arc<PropertyPublisher>,
}

impl ModelService {
    pub fn new(stores: Arc<StoreRegistry>, publisher: Arc<PropertyPublisher>) -> Self {
        Self { stores, publisher }
    }

    pub fn stores(&self) -> &Arc<StoreRegistry> {
        &self.stores
    }

    /// Validate and add a descriptor to the store of its kind.
    pub fn register(&self, descriptor: Descriptor) -> SyncResult<Arc<Descriptor>> {
        try_validate_descriptor(&descriptor)?;
        let store = self
            .stores
            .descriptor_store(descriptor.kind)
            .ok_or_else(|| SyncError::MissingStore(descriptor.kind.to_string()))?;
        let descriptor = Arc::new(descriptor);
        store.add(Arc::clone(&descriptor))?;
        debug!("registered {} {}", descriptor.kind, descriptor.id);
        Ok(descriptor)
    }

    /// Administrative removal: the store entry and the bag go together.
    pub fn remove(&self, kind: DescriptorKind, id: &str) -> SyncResult<bool> {
        let store = self
            .stores
            .descriptor_store(kind)
            .ok_or_else(|| SyncError::MissingStore(kind.to_string()))?;
        let Some(descriptor) = store.get_by_id(id) else {
            return Ok(false);
        };
        let outcome = store.remove(id)?;
        descriptor.properties.clear();
        info!("removed {} {}", kind, id);
        Ok(outcome == StoreOutcome::Applied)
    }

    pub fn descriptor(&self, kind: DescriptorKind, id: &str) -> Option<Arc<Descriptor>> {
        self.stores.descriptor(kind, id)
    }

    /// Apply assignments to a descriptor bag and publish what changed.
    pub fn update_properties(
        &self,
        kind: DescriptorKind,
        id: &str,
        assignments: &[Assignment],
        target: &Target,
    ) -> SyncResult<PublishOutcome> {
        let descriptor = self
            .stores
            .descriptor(kind, id)
            .ok_or_else(|| SyncError::UnknownDescriptor {
                kind: kind.to_string(),
                id: id.to_string(),
            })?;

        let before = descriptor.properties.clone_with(false);
        for (name, value) in assignments {
            descriptor.properties.set(name, value, false);
        }
        let delta = compare_bags(&before, &descriptor.properties);
        if delta.is_empty() {
            return Ok(PublishOutcome::Skipped(SkipReason::NoAssignments));
        }

        Ok(self.publisher.set_remote_property(
            target,
            &descriptor.id,
            &delta.assignments(),
            None,
            None,
        ))
    }

    /// A thing property changed: refresh every bound control.
    ///
    /// Returns one entry per bound descriptor whose value moved. Table
    /// columns (parent has a data source) are addressed with SETFNP and
    /// the owning thing id.
    pub fn on_property_changed(
        &self,
        owner_id: &str,
        property: &str,
        value: &str,
    ) -> Vec<(String, PublishOutcome)> {
        let bound = self
            .stores
            .query_descriptors(&|d| d.is_bound_to(owner_id, property));

        let mut sent = Vec::new();
        for descriptor in bound {
            let bag = &descriptor.properties;
            if bag.contains(VALUE_PROPERTY) && bag.get(VALUE_PROPERTY) == value {
                continue;
            }
            bag.set(VALUE_PROPERTY, value, false);

            let owner = self.is_table_column(&descriptor).then_some(owner_id);
            let outcome = self.publisher.set_remote_property(
                &Target::Broadcast,
                &descriptor.id,
                &[(VALUE_PROPERTY.to_string(), value.to_string())],
                owner,
                None,
            );
            sent.push((descriptor.id.clone(), outcome));
        }
        sent
    }

    fn is_table_column(&self, descriptor: &Descriptor) -> bool {
        descriptor
            .parent_id
            .as_deref()
            .and_then(|parent| self.stores.find_descriptor(parent))
            .map(|parent| parent.data_source.is_some())
            .unwrap_or(false)
    }
}
