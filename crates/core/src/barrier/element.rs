//! Rectangular obstacles between cells

use crate::barrier::material::Material;
use crate::core_types::Vec3;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Slack on containment tests so midpoints computed in floating point
/// still land on a barrier placed exactly between two cells (m)
const CONTAINMENT_EPSILON: f64 = 1e-9;

/// Barrier variant; decides how material permeability is modulated
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BarrierKind {
    Wall,
    /// An open window passes everything
    Window { open: bool },
    /// Permeability blends toward 1 as the door opens (0 = shut, 1 = wide open)
    Door { open_fraction: f64 },
    Generic,
}

/// Axis-aligned rectangular surface with per-parameter permeability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Barrier {
    name: String,
    kind: BarrierKind,
    /// Componentwise minimum of the two defining corners (m)
    min_corner: Vec3,
    /// Componentwise maximum of the two defining corners (m)
    max_corner: Vec3,
    /// Nominal thickness along the normal axis (m); informational
    thickness: f64,
    /// Axis of minimum extent (0 = x, 1 = y, 2 = z)
    normal_axis: usize,
    material: Material,
    /// Explicit permeability overrides by parameter name
    permeability: FxHashMap<String, f64>,
}

impl Barrier {
    /// Create a barrier spanning the box with opposite corners `a` and `b`.
    pub fn new(
        name: impl Into<String>,
        kind: BarrierKind,
        a: Vec3,
        b: Vec3,
        thickness: f64,
        material: Material,
    ) -> Self {
        let min_corner = a.inf(&b);
        let max_corner = a.sup(&b);
        let extent = max_corner - min_corner;
        let normal_axis = (0..3)
            .min_by(|&i, &j| extent[i].total_cmp(&extent[j]))
            .unwrap_or(2);

        Self {
            name: name.into(),
            kind,
            min_corner,
            max_corner,
            thickness: thickness.max(0.0),
            normal_axis,
            material,
            permeability: FxHashMap::default(),
        }
    }

    /// Drywall wall
    pub fn wall(name: impl Into<String>, a: Vec3, b: Vec3, thickness: f64) -> Self {
        Self::new(name, BarrierKind::Wall, a, b, thickness, Material::drywall())
    }

    /// Closed glass window
    pub fn window(name: impl Into<String>, a: Vec3, b: Vec3) -> Self {
        Self::new(name, BarrierKind::Window { open: false }, a, b, 0.01, Material::glass())
    }

    /// Closed wooden door
    pub fn door(name: impl Into<String>, a: Vec3, b: Vec3) -> Self {
        Self::new(name, BarrierKind::Door { open_fraction: 0.0 }, a, b, 0.04, Material::wood())
    }

    /// Generic partition of open-air material; permeability comes from overrides
    pub fn generic(name: impl Into<String>, a: Vec3, b: Vec3, thickness: f64) -> Self {
        Self::new(name, BarrierKind::Generic, a, b, thickness, Material::air())
    }

    /// Builder: explicit permeability for `parameter`
    pub fn with_permeability(mut self, parameter: &str, value: f64) -> Self {
        self.set_permeability(parameter, value);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> BarrierKind {
        self.kind
    }

    pub fn material(&self) -> &Material {
        &self.material
    }

    pub fn min_corner(&self) -> Vec3 {
        self.min_corner
    }

    pub fn max_corner(&self) -> Vec3 {
        self.max_corner
    }

    pub fn thickness(&self) -> f64 {
        self.thickness
    }

    pub fn normal_axis(&self) -> usize {
        self.normal_axis
    }

    /// Whether `point` lies in the box spanned by the two corners.
    ///
    /// Thickness does not widen the box, so midpoints of cell pairs running
    /// parallel to the barrier are never caught.
    pub fn contains_point(&self, point: Vec3) -> bool {
        (0..3).all(|axis| {
            point[axis] >= self.min_corner[axis] - CONTAINMENT_EPSILON
                && point[axis] <= self.max_corner[axis] + CONTAINMENT_EPSILON
        })
    }

    /// Set the explicit permeability (clamped to 0-1) for `parameter`
    pub fn set_permeability(&mut self, parameter: &str, value: f64) {
        self.permeability
            .insert(parameter.to_string(), value.clamp(0.0, 1.0));
    }

    /// Drop the override for `parameter`, reverting to the material default
    pub fn clear_permeability(&mut self, parameter: &str) {
        self.permeability.remove(parameter);
    }

    /// Effective permeability (0-1) of this barrier for `parameter`.
    pub fn permeability(&self, parameter: &str) -> f64 {
        if let Some(&value) = self.permeability.get(parameter) {
            return value;
        }
        let base = self.material.permeability_for(parameter);
        match self.kind {
            BarrierKind::Window { open: true } => 1.0,
            BarrierKind::Door { open_fraction } => base + (1.0 - base) * open_fraction,
            _ => base,
        }
    }

    pub fn set_window_open(&mut self, is_open: bool) {
        match &mut self.kind {
            BarrierKind::Window { open } => *open = is_open,
            _ => debug!("Barrier '{}' is not a window", self.name),
        }
    }

    pub fn set_door_open_fraction(&mut self, fraction: f64) {
        match &mut self.kind {
            BarrierKind::Door { open_fraction } => *open_fraction = fraction.clamp(0.0, 1.0),
            _ => debug!("Barrier '{}' is not a door", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn partition() -> Barrier {
        // x = 0.05 plane between cells 0 and 1 of a 0.1 m grid
        Barrier::generic("p", Vec3::new(0.05, 0.0, 0.0), Vec3::new(0.05, 0.3, 0.3), 0.01)
    }

    #[test]
    fn test_normal_axis_is_thinnest() {
        assert_eq!(partition().normal_axis(), 0);
        let floor = Barrier::generic("f", Vec3::new(0.0, 0.0, 1.0), Vec3::new(2.0, 3.0, 1.0), 0.1);
        assert_eq!(floor.normal_axis(), 2);
    }

    #[test]
    fn test_corner_order_irrelevant() {
        let a = Barrier::generic("a", Vec3::new(1.0, 0.0, 0.0), Vec3::new(1.0, 2.0, 2.0), 0.0);
        let b = Barrier::generic("b", Vec3::new(1.0, 2.0, 2.0), Vec3::new(1.0, 0.0, 0.0), 0.0);
        assert_eq!(a.min_corner(), b.min_corner());
        assert_eq!(a.max_corner(), b.max_corner());
    }

    #[test]
    fn test_contains_point() {
        let p = partition();
        assert!(p.contains_point(Vec3::new(0.05, 0.0, 0.0)));
        assert!(p.contains_point(Vec3::new(0.05, 0.1, 0.2)));
        assert!(!p.contains_point(Vec3::new(0.054, 0.1, 0.2)));
        assert!(!p.contains_point(Vec3::new(0.05, 0.31, 0.2)));
        assert!(!p.contains_point(Vec3::new(0.0, 0.05, 0.0)));
    }

    #[test]
    fn test_thickness_does_not_widen_box() {
        // a cell-thick wall on x = 0.05 must not reach the x = 0 or x = 0.1 columns
        let wall = Barrier::wall("w", Vec3::new(0.05, 0.0, 0.0), Vec3::new(0.05, 0.3, 0.3), 0.1);
        assert!(wall.contains_point(Vec3::new(0.05, 0.1, 0.1)));
        assert!(!wall.contains_point(Vec3::new(0.0, 0.05, 0.0)));
        assert!(!wall.contains_point(Vec3::new(0.1, 0.05, 0.0)));
    }

    #[test]
    fn test_override_beats_material() {
        let wall = Barrier::wall("w", Vec3::zeros(), Vec3::new(0.0, 1.0, 1.0), 0.1)
            .with_permeability("co2", 0.0);
        assert_eq!(wall.permeability("co2"), 0.0);
        assert_relative_eq!(wall.permeability("formaldehyde"), 0.8);
        assert_relative_eq!(wall.permeability("humidity"), 0.4);
    }

    #[test]
    fn test_permeability_clamped() {
        let mut p = partition();
        p.set_permeability("x", 1.5);
        assert_eq!(p.permeability("x"), 1.0);
        p.set_permeability("x", -0.5);
        assert_eq!(p.permeability("x"), 0.0);
        p.clear_permeability("x");
        assert_eq!(p.permeability("x"), 1.0);
    }

    #[test]
    fn test_window_and_door_states() {
        let mut window = Barrier::window("win", Vec3::zeros(), Vec3::new(0.0, 1.0, 1.0));
        assert_eq!(window.permeability("co2"), 0.0);
        window.set_window_open(true);
        assert_eq!(window.permeability("co2"), 1.0);

        let mut door = Barrier::door("d", Vec3::zeros(), Vec3::new(0.0, 1.0, 2.0));
        assert_relative_eq!(door.permeability("co2"), 0.25);
        door.set_door_open_fraction(0.5);
        assert_relative_eq!(door.permeability("co2"), 0.625);
        door.set_door_open_fraction(1.0);
        assert_relative_eq!(door.permeability("co2"), 1.0);
    }
}
