//! Reconciliation
//!
//! Diff desired against observed state and apply the difference one field
//! at a time.

pub mod change;
pub mod engine;
pub mod multiset;

pub use change::{ChangeKind, FieldChange, Outcome, Payload};
pub use engine::{
    DesiredConfig, FieldOp, FieldSpec, MutationPath, ObservedState, Reconciler, Reconciliation,
    Resource,
};
pub use multiset::Partition;
