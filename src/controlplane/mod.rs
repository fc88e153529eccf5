//! Control Plane
//!
//! Drives the reconcilers against one array: the orchestrator dispatches
//! per resource instance, listing fans out read-only masking view reads,
//! and backends supply the array client.

pub mod backends;
pub mod listing;
pub mod orchestrator;

pub use backends::*;
pub use listing::*;
pub use orchestrator::*;
