//! Core types and utilities

pub mod index;
pub mod vec3;

pub use index::{CellIndex, Direction};
pub use vec3::Vec3;
