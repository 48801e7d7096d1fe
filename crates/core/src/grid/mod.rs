//! Grid-based storage and diffusion

pub mod boundary;
pub mod field;
pub mod spatial_grid;

// Re-export main types
pub use boundary::{BoundaryCondition, Face};
pub use field::{FieldData, FieldId};
pub use spatial_grid::*;
