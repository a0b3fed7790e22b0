#![forbid(unsafe_code)]

//! Mesh UI Model: data layer of the server-driven UI sync core.
//!
//! Attribute bags, descriptors, data-source records and rows. No I/O and
//! no transport: the runtime crate owns stores, propagation and dispatch.

/// Bumped whenever the canonical fingerprint layout changes.
pub const MODEL_VERSION: u32 = 1;

pub mod attribute_bag;
pub mod data_source;
pub mod delta;
pub mod descriptor;
pub mod error;
pub mod fingerprint;
pub mod invariants;
pub mod record;

pub use attribute_bag::AttributeBag;
pub use descriptor::{Descriptor, DescriptorKind, PlatformClass, PropertyBinding};
pub use error::{ModelError, ModelResult};
pub use record::{Keyed, Record};
