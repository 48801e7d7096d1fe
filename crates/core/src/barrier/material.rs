//! Barrier materials
//!
//! A material supplies the default permeability of a barrier for any
//! transported parameter that has no explicit override:
//!
//! - chemicals the material is known to absorb pass `1 - absorption_rate`
//! - everything else passes the general vapor permeability

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Permeability-relevant properties of a construction material
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    name: String,
    /// General vapor permeability (0 = blocking, 1 = open)
    vapor_permeability: f64,
    /// Fraction of a chemical absorbed on passage, by chemical name
    voc_absorption: FxHashMap<String, f64>,
}

impl Material {
    pub fn new(name: impl Into<String>, vapor_permeability: f64) -> Self {
        Self {
            name: name.into(),
            vapor_permeability: vapor_permeability.clamp(0.0, 1.0),
            voc_absorption: FxHashMap::default(),
        }
    }

    /// Builder: record the absorption rate (0-1) of `chemical`
    pub fn with_absorption(mut self, chemical: &str, rate: f64) -> Self {
        self.voc_absorption
            .insert(chemical.to_string(), rate.clamp(0.0, 1.0));
        self
    }

    /// Open air; passes everything
    pub fn air() -> Self {
        Self::new("air", 1.0)
    }

    /// Gypsum board interior wall
    pub fn drywall() -> Self {
        Self::new("drywall", 0.4)
            .with_absorption("formaldehyde", 0.2)
            .with_absorption("toluene", 0.1)
            .with_absorption("benzene", 0.08)
    }

    pub fn concrete() -> Self {
        Self::new("concrete", 0.05)
            .with_absorption("formaldehyde", 0.3)
            .with_absorption("toluene", 0.15)
    }

    /// Glazing: impermeable, non-absorbing
    pub fn glass() -> Self {
        Self::new("glass", 0.0)
    }

    pub fn wood() -> Self {
        Self::new("wood", 0.25)
            .with_absorption("formaldehyde", 0.35)
            .with_absorption("acetaldehyde", 0.2)
    }

    /// Curtains, partitions and other textiles
    pub fn fabric() -> Self {
        Self::new("fabric", 0.85)
            .with_absorption("formaldehyde", 0.4)
            .with_absorption("toluene", 0.3)
    }

    /// Look up a library material by name (case-insensitive).
    ///
    /// Unknown names are logged and resolve to [`Material::air`].
    pub fn by_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "air" => Self::air(),
            "drywall" => Self::drywall(),
            "concrete" => Self::concrete(),
            "glass" => Self::glass(),
            "wood" => Self::wood(),
            "fabric" => Self::fabric(),
            other => {
                warn!("Unknown material '{}', using air", other);
                Self::air()
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vapor_permeability(&self) -> f64 {
        self.vapor_permeability
    }

    /// Absorption rate of `chemical`, if the material is known to absorb it
    pub fn absorption_rate(&self, chemical: &str) -> Option<f64> {
        self.voc_absorption.get(chemical).copied()
    }

    /// Default permeability for `parameter`
    pub fn permeability_for(&self, parameter: &str) -> f64 {
        self.absorption_rate(parameter)
            .map_or(self.vapor_permeability, |rate| 1.0 - rate)
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::air()
    }
}
