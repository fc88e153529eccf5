//! Domain layer - attribute values, backend records and port definitions
//!
//! This module defines the core traits (ports) that adapters implement,
//! following hexagonal architecture principles.

pub mod ports;
pub mod records;
pub mod value;

pub use ports::*;
pub use records::*;
pub use value::*;
