//! Mesh UI Model: Invariant Checks
//!
//! Non-panicking validation run before a descriptor enters a store.
//! Returns the first violation found.

use std::collections::HashMap;

use crate::attribute_bag::{split_entry, AttributeBag};
use crate::descriptor::Descriptor;
use crate::error::{ModelError, ModelResult};

/// Run every descriptor check.
pub fn try_validate_descriptor(descriptor: &Descriptor) -> ModelResult<()> {
    try_check_id_format(descriptor)?;
    try_check_binding(descriptor)?;
    try_check_data_source(descriptor)?;
    try_validate_bag(&descriptor.properties)?;
    for bag in descriptor.platform_overrides.values() {
        try_validate_bag(bag)?;
    }
    Ok(())
}

/// Once rebuilt, the index must equal the function implied by the entries
/// with earlier duplicates gone, and no entry may have an empty name.
pub fn try_validate_bag(bag: &AttributeBag) -> ModelResult<()> {
    let mut implied: HashMap<String, String> = HashMap::new();
    for entry in bag.entries() {
        let (name, value) = split_entry(&entry, bag.separator());
        if name.is_empty() {
            return Err(violation("bag_entry_name", format!("entry {:?} has no name", entry)));
        }
        implied.insert(name.to_string(), value.to_string());
    }

    bag.rebuild_index();
    for (name, value) in &implied {
        let indexed = bag.get(name);
        if indexed != *value {
            return Err(violation(
                "bag_index_consistency",
                format!("{:?} indexed as {:?}, entries say {:?}", name, indexed, value),
            ));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Individual checks (private)
// ---------------------------------------------------------------------------

/// Ids travel inside ':'-delimited bodies: ASCII [A-Za-z0-9_.-]+ only.
fn try_check_id_format(descriptor: &Descriptor) -> ModelResult<()> {
    let id = &descriptor.id;
    if id.is_empty()
        || !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
    {
        return Err(violation(
            "descriptor_id_format",
            format!("descriptor id {:?} must match [A-Za-z0-9_.-]+", id),
        ));
    }
    Ok(())
}

fn try_check_binding(descriptor: &Descriptor) -> ModelResult<()> {
    if let Some(binding) = &descriptor.binding {
        if binding.owner_id.is_empty() || binding.property.is_empty() {
            return Err(violation(
                "binding_complete",
                format!("descriptor {:?} has an incomplete binding", descriptor.id),
            ));
        }
    }
    Ok(())
}

fn try_check_data_source(descriptor: &Descriptor) -> ModelResult<()> {
    if let Some(source) = &descriptor.data_source {
        if source.source_kind.trim().is_empty() {
            return Err(violation(
                "data_source_kind",
                format!("descriptor {:?} has a data source without kind", descriptor.id),
            ));
        }
    }
    Ok(())
}

fn violation(rule: &'static str, detail: String) -> ModelError {
    ModelError::InvariantViolation { rule, detail }
}
