//! Screen assembly.
//!
//! Produces a read-only, localized, access-filtered projection of one
//! dashboard. Sources, in merge order:
//!
//!   1. panels whose parent is the requested dashboard
//!   2. each enabled and loaded engine's dashboard panels; an engine whose
//!      panels are all filtered out contributes nothing
//!   3. every thing-owned dashboard, as a single link panel
//!   4. the fixed system panels, when registered
//!
//! Output is sorted by (category, order, id). Bags are copied through
//! `effective_properties`, so nothing here writes back into the model.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;

use mesh_ui_model::fingerprint::{canonical_fingerprint, fingerprint_bytes};
use mesh_ui_model::{Descriptor, DescriptorKind};

use crate::collaborators::{AccessControl, Localizer};
use crate::command::RequestContext;
use crate::registry::MeshRegistry;
use crate::store::StoreRegistry;

pub const SCENES_PANEL: &str = "system.scenes";
pub const STATUS_PANEL: &str = "system.status";
pub const UPDATES_PANEL: &str = "system.updates";

pub const SYSTEM_PANELS: [&str; 3] = [SCENES_PANEL, STATUS_PANEL, UPDATES_PANEL];

/// Properties passed through the localizer.
pub const LOCALIZED_PROPERTIES: [&str; 5] = ["Caption", "Title", "Header", "Description", "ToolTip"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelView {
    pub id: String,
    pub kind: DescriptorKind,
    pub category: String,
    pub order: i64,
    pub properties: BTreeMap<String, String>,
    pub fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScreenView {
    pub dashboard_id: String,
    pub panels: Vec<PanelView>,
    /// Changes whenever any panel's visible properties change.
    pub fingerprint: String,
}

impl ScreenView {
    pub fn panel(&self, id: &str) -> Option<&PanelView> {
        self.panels.iter().find(|p| p.id == id)
    }

    pub fn panel_ids(&self) -> Vec<&str> {
        self.panels.iter().map(|p| p.id.as_str()).collect()
    }
}

pub struct ScreenAssembler<'a> {
    pub stores: &'a StoreRegistry,
    pub registry: &'a MeshRegistry,
    pub access: &'a dyn AccessControl,
    pub localizer: &'a dyn Localizer,
    /// Fallback engine for localization lookups.
    pub engine_name: &'a str,
    pub default_lcid: u32,
}

impl ScreenAssembler<'_> {
    /// Assemble `dashboard_id` for the requester. `None` when the
    /// dashboard is unknown or not visible to them.
    pub fn assemble(&self, dashboard_id: &str, request: &RequestContext) -> Option<ScreenView> {
        let dashboard = self.stores.descriptor(DescriptorKind::Dashboard, dashboard_id)?;
        if !self.visible(&dashboard, request) {
            return None;
        }

        let mut seen = BTreeSet::new();
        let mut picked: Vec<Arc<Descriptor>> = Vec::new();

        for panel in self.children_of(dashboard_id) {
            if self.visible(&panel, request) && seen.insert(panel.id.clone()) {
                picked.push(panel);
            }
        }

        for engine in self.registry.engines() {
            if !engine.is_enabled() || !engine.is_loaded() {
                continue;
            }
            let Some(engine_dashboard) = engine.dashboard_panel() else {
                continue;
            };
            if engine_dashboard == dashboard_id {
                continue;
            }
            let group: Vec<Arc<Descriptor>> = self
                .children_of(&engine_dashboard)
                .into_iter()
                .filter(|p| self.visible(p, request))
                .collect();
            for panel in group {
                if seen.insert(panel.id.clone()) {
                    picked.push(panel);
                }
            }
        }

        for owned in self.stores.descriptors(DescriptorKind::Dashboard) {
            if owned.owner_thing.is_none() || owned.id == dashboard_id {
                continue;
            }
            if self.visible(&owned, request) && seen.insert(owned.id.clone()) {
                picked.push(owned);
            }
        }

        for id in SYSTEM_PANELS {
            if let Some(panel) = self.stores.find_descriptor(id) {
                if self.visible(&panel, request) && seen.insert(panel.id.clone()) {
                    picked.push(panel);
                }
            }
        }

        let mut panels: Vec<PanelView> = picked.iter().map(|d| self.project(d, request)).collect();
        panels.sort_by(|a, b| {
            (&a.category, a.order, &a.id).cmp(&(&b.category, b.order, &b.id))
        });

        let combined: String = panels.iter().map(|p| p.fingerprint.as_str()).collect();
        Some(ScreenView {
            dashboard_id: dashboard_id.to_string(),
            fingerprint: fingerprint_bytes(combined.as_bytes()),
            panels,
        })
    }

    fn children_of(&self, parent_id: &str) -> Vec<Arc<Descriptor>> {
        self.stores
            .query_descriptors(&|d| d.parent_id.as_deref() == Some(parent_id))
    }

    fn visible(&self, descriptor: &Descriptor, request: &RequestContext) -> bool {
        descriptor.enabled && self.access.has_access(&request.user_id, descriptor.access_level)
    }

    fn project(&self, descriptor: &Descriptor, request: &RequestContext) -> PanelView {
        let bag = descriptor.effective_properties(request.platform);
        let lcid = if request.lcid == 0 {
            self.default_lcid
        } else {
            request.lcid
        };
        let engine = if descriptor.owner_engine.is_empty() {
            self.engine_name
        } else {
            descriptor.owner_engine.as_str()
        };
        for name in LOCALIZED_PROPERTIES {
            if bag.contains(name) {
                let text = self.localizer.localize(lcid, engine, &bag.get(name));
                bag.set(name, &text, false);
            }
        }

        PanelView {
            id: descriptor.id.clone(),
            kind: descriptor.kind,
            category: descriptor.category.clone(),
            order: descriptor.order,
            fingerprint: canonical_fingerprint(&bag),
            properties: bag.to_map(),
        }
    }
}
