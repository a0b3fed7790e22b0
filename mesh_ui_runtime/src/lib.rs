#![forbid(unsafe_code)]

//! Mesh UI Runtime
//!
//! Everything that touches the mesh: typed record stores, the model
//! readiness gate, outbound property propagation and inbound dispatch.
//!
//! Data types and their invariants live in `mesh_ui_model`; this crate
//! only moves them between stores and nodes.

pub mod collaborators;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod propagation;
pub mod readiness;
pub mod registry;
pub mod screen;
pub mod service;
pub mod store;
pub mod transport;
pub mod wire;

pub use command::{RequestContext, RoutedCommand};
pub use config::SyncConfig;
pub use dispatch::{DispatchOutcome, Dispatcher, DropReason};
pub use error::{SyncError, SyncResult};
pub use propagation::{PropertyPublisher, PublishOutcome, SkipReason, Target};
pub use readiness::{GateState, ReadinessGate};
pub use registry::MeshRegistry;
pub use service::ModelService;
pub use store::{MemoryStore, RecordStore, StoreRegistry};
pub use transport::{CoalescingChannel, Destination, QueuedTransport, Transport};
