//! Ventilation sources and the velocity field they induce

pub mod model;
pub mod ventilation;

pub use model::{AirflowConfig, AirflowModel};
pub use ventilation::{SourceType, VentilationSource};
