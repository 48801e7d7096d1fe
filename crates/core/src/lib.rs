//! Indoor Airflow Transport Core Library
//!
//! A 3D spatial transport engine for enclosed spaces. Scalar fields
//! (temperature, humidity, CO₂, VOCs, particulates) live on a regular grid and
//! are moved by ventilation-driven advection, neighbor diffusion and
//! outside-air exchange, with walls, windows and doors restricting exchange
//! between adjacent cells.
//!
//! ## Transport Tick
//!
//! Each step of [`TransportSimulation`] runs, for every tracked field:
//! - Semi-Lagrangian advection through the superposed ventilation velocity field
//! - Neighbor diffusion, scaled by barrier permeability when barriers are present
//! - Exponential mixing toward the outside concentration

// Core types and utilities
pub mod core_types;
pub mod error;

// Transport modules
pub mod airflow;
pub mod barrier;
pub mod grid;
pub mod simulation;

// Re-export core types
pub use core_types::{CellIndex, Direction, Vec3};
pub use error::{Result, TransportError};

// Re-export transport types
pub use airflow::{AirflowConfig, AirflowModel, SourceType, VentilationSource};
pub use barrier::{Barrier, BarrierHandler, BarrierKind, Material};
pub use grid::{BoundaryCondition, Face, FieldData, FieldId, SpatialGrid};
pub use simulation::{FieldStats, SimulationConfig, SimulationStats, TransportSimulation};
