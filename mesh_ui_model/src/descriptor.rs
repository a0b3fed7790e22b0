//! Mesh UI Model: Descriptors
//!
//! Server-side definitions of the UI objects pushed to render clients.
//! Pure data plus small helpers; stores and propagation live in the runtime.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::attribute_bag::AttributeBag;
use crate::data_source::DataSource;
use crate::error::{ModelError, ModelResult};
use crate::record::Keyed;

// ── Kinds ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DescriptorKind {
    Field,
    Tile,
    Form,
    Dashboard,
    Page,
    Block,
}

impl DescriptorKind {
    pub const ALL: [DescriptorKind; 6] = [
        DescriptorKind::Field,
        DescriptorKind::Tile,
        DescriptorKind::Form,
        DescriptorKind::Dashboard,
        DescriptorKind::Page,
        DescriptorKind::Block,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DescriptorKind::Field => "field",
            DescriptorKind::Tile => "tile",
            DescriptorKind::Form => "form",
            DescriptorKind::Dashboard => "dashboard",
            DescriptorKind::Page => "page",
            DescriptorKind::Block => "block",
        }
    }
}

impl fmt::Display for DescriptorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client platform class used to pick per-platform overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PlatformClass {
    Desktop,
    Tablet,
    Phone,
    TouchDisplay,
    Tv,
    Headless,
}

impl PlatformClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformClass::Desktop => "desktop",
            PlatformClass::Tablet => "tablet",
            PlatformClass::Phone => "phone",
            PlatformClass::TouchDisplay => "touch_display",
            PlatformClass::Tv => "tv",
            PlatformClass::Headless => "headless",
        }
    }

    /// Lenient parse; unknown names yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "desktop" => Some(PlatformClass::Desktop),
            "tablet" => Some(PlatformClass::Tablet),
            "phone" => Some(PlatformClass::Phone),
            "touch_display" | "touchdisplay" => Some(PlatformClass::TouchDisplay),
            "tv" => Some(PlatformClass::Tv),
            "headless" => Some(PlatformClass::Headless),
            _ => None,
        }
    }
}

// ── Property binding ───────────────────────────────────────────────

/// `<ownerId>;<propertyName>`, resolved when the owner's property changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyBinding {
    pub owner_id: String,
    pub property: String,
}

impl PropertyBinding {
    pub fn new(owner_id: &str, property: &str) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            property: property.to_string(),
        }
    }

    pub fn parse(expr: &str) -> ModelResult<Self> {
        let (owner, property) = expr
            .split_once(';')
            .ok_or_else(|| ModelError::MalformedBinding(expr.to_string()))?;
        let (owner, property) = (owner.trim(), property.trim());
        if owner.is_empty() || property.is_empty() || property.contains(';') {
            return Err(ModelError::MalformedBinding(expr.to_string()));
        }
        Ok(Self::new(owner, property))
    }

    pub fn encode(&self) -> String {
        format!("{};{}", self.owner_id, self.property)
    }

    pub fn matches(&self, owner_id: &str, property: &str) -> bool {
        self.owner_id == owner_id && self.property == property
    }
}

impl FromStr for PropertyBinding {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PropertyBinding::parse(s)
    }
}

// ── Descriptor ─────────────────────────────────────────────────────

/// A field, tile, form, dashboard, page or block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub id: String,
    pub kind: DescriptorKind,
    /// Owning thing or engine id.
    pub owner_id: String,
    /// Engine whose stores back this descriptor.
    pub owner_engine: String,
    /// Containing descriptor: field → form, panel → dashboard.
    pub parent_id: Option<String>,
    pub access_level: u32,
    pub order: i64,
    pub category: String,
    pub enabled: bool,
    pub properties: AttributeBag,
    pub platform_overrides: BTreeMap<PlatformClass, AttributeBag>,
    pub binding: Option<PropertyBinding>,
    pub data_source: Option<DataSource>,
    /// Set on dashboards that belong to a thing rather than an engine.
    pub owner_thing: Option<String>,
}

impl Descriptor {
    pub fn new(kind: DescriptorKind, id: &str) -> Self {
        Self {
            id: id.to_string(),
            kind,
            owner_id: String::new(),
            owner_engine: String::new(),
            parent_id: None,
            access_level: 0,
            order: 0,
            category: String::new(),
            enabled: true,
            properties: AttributeBag::new(),
            platform_overrides: BTreeMap::new(),
            binding: None,
            data_source: None,
            owner_thing: None,
        }
    }

    pub fn with_owner(mut self, owner_id: &str) -> Self {
        self.owner_id = owner_id.to_string();
        self
    }

    pub fn with_owner_engine(mut self, engine: &str) -> Self {
        self.owner_engine = engine.to_string();
        self
    }

    pub fn with_parent(mut self, parent_id: &str) -> Self {
        self.parent_id = Some(parent_id.to_string());
        self
    }

    pub fn with_access_level(mut self, level: u32) -> Self {
        self.access_level = level;
        self
    }

    pub fn with_order(mut self, order: i64) -> Self {
        self.order = order;
        self
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = category.to_string();
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_property(self, name: &str, value: &str) -> Self {
        self.properties.set(name, value, false);
        self
    }

    pub fn with_platform_override(mut self, platform: PlatformClass, name: &str, value: &str) -> Self {
        self.platform_overrides
            .entry(platform)
            .or_default()
            .set(name, value, false);
        self
    }

    pub fn with_binding(mut self, binding: PropertyBinding) -> Self {
        self.binding = Some(binding);
        self
    }

    pub fn with_data_source(mut self, source: DataSource) -> Self {
        self.data_source = Some(source);
        self
    }

    pub fn with_owner_thing(mut self, thing_id: &str) -> Self {
        self.owner_thing = Some(thing_id.to_string());
        self
    }

    /// Properties as seen by `platform`: base bag merged with its override.
    /// Always a copy; the descriptor is never touched.
    pub fn effective_properties(&self, platform: Option<PlatformClass>) -> AttributeBag {
        let bag = self.properties.clone_with(false);
        match platform.and_then(|p| self.platform_overrides.get(&p)) {
            Some(overrides) => bag.merge(overrides, true, true),
            None => bag.rebuild_index(),
        }
        bag
    }

    pub fn is_bound_to(&self, owner_id: &str, property: &str) -> bool {
        self.binding
            .as_ref()
            .map(|b| b.matches(owner_id, property))
            .unwrap_or(false)
    }

    /// True if both descriptors read from the same source kind.
    pub fn shares_source_with(&self, other: &Descriptor) -> bool {
        match (&self.data_source, &other.data_source) {
            (Some(a), Some(b)) => a.source_kind == b.source_kind,
            _ => false,
        }
    }
}

impl Keyed for Descriptor {
    fn key(&self) -> &str {
        &self.id
    }
}
