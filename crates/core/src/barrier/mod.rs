//! Obstacles that attenuate transport between cells

pub mod element;
pub mod handler;
pub mod material;

pub use element::{Barrier, BarrierKind};
pub use handler::BarrierHandler;
pub use material::Material;
