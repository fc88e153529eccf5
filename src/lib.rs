//! PowerMax Reconciler
//!
//! Desired-state reconciliation for Dell PowerMax array objects: hosts, host
//! groups, port groups, volumes, storage groups and snapshot policies, plus
//! read-only listings of masking views and snapshots.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           Orchestrator                           │
//! │   import / plan / apply / apply_all      observed-state store    │
//! ├────────────────────────────────┬─────────────────────────────────┤
//! │        Field Reconciler        │      Masking View Listing       │
//! │  plan → ordered apply → refresh│   semaphore-bounded fan-out     │
//! ├────────────────┬───────────────┴─────────────────────────────────┤
//! │ Multiset Differ│            Generic Record Mapper                │
//! ├────────────────┴─────────────────────────────────────────────────┤
//! │               Attribute Value (known / unknown / null)           │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                 PowerMaxClient  (simulated array)                │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`domain`]: attribute values, backend records and the client port
//! - [`mapping`]: backend record to attribute object mapping
//! - [`reconcile`]: multiset differ, change records and the reconcile loop
//! - [`resources`]: per-resource shapes and field tables
//! - [`controlplane`]: orchestrator, listing and client backends
//! - [`config`], [`metrics`], [`error`]: ambient concerns

pub mod config;
pub mod controlplane;
pub mod domain;
pub mod error;
pub mod mapping;
pub mod metrics;
pub mod reconcile;
pub mod resources;

// Re-export commonly used types
pub use config::{ProviderConfig, SimulatorConfig};

pub use controlplane::{
    ApplyReport, BackendFactory, Inventory, ListedViews, ListingConfig, Orchestrator,
    OrchestratorStatus, PlannedResource, SimulatedArray,
};

pub use domain::ports::{Diagnostic, Diagnostics, PowerMaxClient, PowerMaxClientRef, Severity};
pub use domain::value::{AttrType, AttributeValue, ObjectType};

pub use error::{Error, ErrorAction, Result};

pub use mapping::{map_record, Mapped, MappingSkip, Record, SkipReason};

pub use metrics::ReconcileMetrics;

pub use reconcile::{
    ChangeKind, DesiredConfig, FieldChange, ObservedState, Outcome, Reconciler, Reconciliation,
    Resource,
};

pub use resources::ResourceKind;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
