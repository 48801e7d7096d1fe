//! 3D spatial grid holding named scalar fields
//!
//! The grid is the read/write surface shared by every collaborator that
//! injects emissions, heating or filtration into the room: all of them
//! address cells by integer index and convert physical positions with
//! [`SpatialGrid::grid_coordinates`].
//!
//! # Diffusion
//!
//! Diffusion is explicit Euler on the unit-distance cell graph:
//!
//! ```text
//! c' = c + rate × (mean(c_neighbors) - c)
//! ```
//!
//! `rate` is a dimensionless 0-1 fraction that callers pre-scale (there is no
//! Δx² term). Every new value is computed from the previous snapshot so the
//! result does not depend on iteration order.

use crate::core_types::{CellIndex, Direction, Vec3};
use crate::grid::boundary::{self, BoundaryCondition, Face};
use crate::grid::field::{FieldData, FieldId};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Neighbor slots of one cell, ordered as [`Direction::ALL`].
pub type NeighborSlots = [Option<usize>; 6];

/// Tolerance used when snapping physical coordinates back onto the index lattice
const INDEX_SNAP_EPSILON: f64 = 1e-9;

/// Uniform 3D grid of cells
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpatialGrid {
    /// Cells along x
    width: usize,
    /// Cells along y
    length: usize,
    /// Cells along z
    height: usize,

    /// Edge length of one cell (m)
    cell_size: f64,

    /// Field name -> slot in `fields`
    field_ids: FxHashMap<String, FieldId>,
    fields: Vec<FieldData>,

    /// Neighbor table built once at construction
    neighbors: Vec<NeighborSlots>,

    /// Per-field face conditions, applied in insertion order
    boundaries: FxHashMap<String, Vec<(Face, BoundaryCondition)>>,
}

impl SpatialGrid {
    /// Create a grid of `width × length × height` cells.
    ///
    /// Zero dimensions are raised to 1 and a non-positive or non-finite
    /// cell size falls back to 1 m; both are logged.
    pub fn new(width: usize, length: usize, height: usize, cell_size: f64) -> Self {
        let fix_dim = |name: &str, v: usize| {
            if v == 0 {
                warn!("Grid {} of 0 cells replaced with 1", name);
                1
            } else {
                v
            }
        };
        let width = fix_dim("width", width);
        let length = fix_dim("length", length);
        let height = fix_dim("height", height);

        let cell_size = if cell_size.is_finite() && cell_size > 0.0 {
            cell_size
        } else {
            warn!("Invalid cell size {}, using 1.0 m", cell_size);
            1.0
        };

        let total = width * length * height;
        let mut neighbors = Vec::with_capacity(total);
        for z in 0..height {
            for y in 0..length {
                for x in 0..width {
                    let here = CellIndex::new(x as i32, y as i32, z as i32);
                    let mut slots: NeighborSlots = [None; 6];
                    for dir in Direction::ALL {
                        slots[dir.slot()] =
                            Self::flat_in(here.step(dir), (width, length, height));
                    }
                    neighbors.push(slots);
                }
            }
        }

        debug!(
            "Spatial grid created: {}x{}x{} cells, cell_size={:.3}m",
            width, length, height, cell_size
        );

        Self {
            width,
            length,
            height,
            cell_size,
            field_ids: FxHashMap::default(),
            fields: Vec::new(),
            neighbors,
            boundaries: FxHashMap::default(),
        }
    }

    // ====== Shape ======

    /// Cells along x
    pub fn width(&self) -> usize {
        self.width
    }

    /// Cells along y
    pub fn length(&self) -> usize {
        self.length
    }

    /// Cells along z
    pub fn height(&self) -> usize {
        self.height
    }

    /// `(width, length, height)` in cells
    pub fn dimensions(&self) -> (usize, usize, usize) {
        (self.width, self.length, self.height)
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    pub fn cell_count(&self) -> usize {
        self.width * self.length * self.height
    }

    /// Volume of one cell (m³)
    pub fn cell_volume(&self) -> f64 {
        self.cell_size.powi(3)
    }

    // ====== Addressing ======

    fn flat_in(index: CellIndex, dims: (usize, usize, usize)) -> Option<usize> {
        let (nx, ny, nz) = dims;
        if index.x < 0 || index.y < 0 || index.z < 0 {
            return None;
        }
        let (x, y, z) = (index.x as usize, index.y as usize, index.z as usize);
        if x < nx && y < ny && z < nz {
            Some(z * (ny * nx) + y * nx + x)
        } else {
            None
        }
    }

    /// Flat storage offset for `index`, or `None` when out of bounds
    #[inline]
    pub fn flat_index(&self, index: CellIndex) -> Option<usize> {
        Self::flat_in(index, self.dimensions())
    }

    /// Inverse of [`SpatialGrid::flat_index`] for `flat < cell_count()`
    #[inline]
    pub fn cell_index(&self, flat: usize) -> CellIndex {
        let plane = self.width * self.length;
        let z = flat / plane;
        let y = (flat % plane) / self.width;
        let x = flat % self.width;
        CellIndex::new(x as i32, y as i32, z as i32)
    }

    #[inline]
    pub fn in_bounds(&self, index: CellIndex) -> bool {
        self.flat_index(index).is_some()
    }

    /// Iterator over every valid index in storage order
    pub fn indices(&self) -> impl Iterator<Item = CellIndex> + '_ {
        (0..self.cell_count()).map(move |flat| self.cell_index(flat))
    }

    /// Physical position (m) of a cell: `index × cell_size`
    pub fn physical_coordinates(&self, index: CellIndex) -> Vec3 {
        Vec3::new(
            f64::from(index.x) * self.cell_size,
            f64::from(index.y) * self.cell_size,
            f64::from(index.z) * self.cell_size,
        )
    }

    /// Grid index of a physical position, truncating toward zero.
    ///
    /// Values within a rounding error of an integer snap to it so that
    /// `grid_coordinates(physical_coordinates(i)) == i`. The result may be
    /// out of bounds; check with [`SpatialGrid::in_bounds`].
    pub fn grid_coordinates(&self, point: Vec3) -> CellIndex {
        let to_index = |v: f64| {
            let g = v / self.cell_size;
            let nearest = g.round();
            if (g - nearest).abs() < INDEX_SNAP_EPSILON {
                nearest as i32
            } else {
                g.trunc() as i32
            }
        };
        CellIndex::new(to_index(point.x), to_index(point.y), to_index(point.z))
    }

    /// In-bounds neighbors of `index` along ±x, ±y, ±z.
    ///
    /// Boundary cells omit missing directions; an out-of-bounds index has none.
    pub fn neighbors(&self, index: CellIndex) -> Vec<(Direction, CellIndex)> {
        let Some(flat) = self.flat_index(index) else {
            return Vec::new();
        };
        Direction::ALL
            .iter()
            .filter(|dir| self.neighbors[flat][dir.slot()].is_some())
            .map(|&dir| (dir, index.step(dir)))
            .collect()
    }

    pub(crate) fn neighbor_table(&self) -> &[NeighborSlots] {
        &self.neighbors
    }

    // ====== Fields ======

    pub fn field_id(&self, name: &str) -> Option<FieldId> {
        self.field_ids.get(name).copied()
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field_ids.contains_key(name)
    }

    /// Registered field names, in registration order
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(FieldData::name).collect()
    }

    /// Register `name` (zero-filled) if it is not yet tracked.
    pub fn ensure_field(&mut self, name: &str) -> FieldId {
        if let Some(id) = self.field_ids.get(name) {
            return *id;
        }
        let id = FieldId(self.fields.len());
        self.fields.push(FieldData::new(name, self.cell_count()));
        self.field_ids.insert(name.to_string(), id);
        id
    }

    /// Whole-field view, `None` if the field was never written
    pub fn field(&self, name: &str) -> Option<&FieldData> {
        self.field_id(name).map(|id| &self.fields[id.0])
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut FieldData> {
        self.field_id(name).map(move |id| &mut self.fields[id.0])
    }

    pub(crate) fn field_by_id(&self, id: FieldId) -> &FieldData {
        &self.fields[id.0]
    }

    pub(crate) fn field_by_id_mut(&mut self, id: FieldId) -> &mut FieldData {
        &mut self.fields[id.0]
    }

    /// Value of `field` at `index`, `0.0` when absent or out of bounds
    pub fn get(&self, index: CellIndex, field: &str) -> f64 {
        self.get_or(index, field, 0.0)
    }

    /// Value of `field` at `index`, `default` when absent or out of bounds
    pub fn get_or(&self, index: CellIndex, field: &str, default: f64) -> f64 {
        match (self.flat_index(index), self.field_id(field)) {
            (Some(flat), Some(id)) => self.fields[id.0].as_slice()[flat],
            _ => default,
        }
    }

    /// Write `value` into `field` at `index`. Out-of-bounds writes are ignored.
    pub fn set(&mut self, index: CellIndex, field: &str, value: f64) {
        if let Some(flat) = self.flat_index(index) {
            let id = self.ensure_field(field);
            self.fields[id.0].as_mut_slice()[flat] = value;
        }
    }

    /// Add `delta` to `field` at `index`. Out-of-bounds writes are ignored.
    pub fn add(&mut self, index: CellIndex, field: &str, delta: f64) {
        if let Some(flat) = self.flat_index(index) {
            let id = self.ensure_field(field);
            self.fields[id.0].as_mut_slice()[flat] += delta;
        }
    }

    /// Set every cell of `field` to `value`
    pub fn fill(&mut self, field: &str, value: f64) {
        let id = self.ensure_field(field);
        self.fields[id.0].fill(value);
    }

    /// Sum of `field` over all cells
    pub fn field_total(&self, field: &str) -> f64 {
        self.field(field).map_or(0.0, FieldData::total)
    }

    /// Maximum of `field` over all cells
    pub fn field_max(&self, field: &str) -> f64 {
        self.field(field).map_or(0.0, FieldData::max)
    }

    // ====== Boundary conditions ======

    /// Assign `condition` to `face` for `field`, replacing any previous one.
    pub fn set_boundary_condition(&mut self, face: Face, field: &str, condition: BoundaryCondition) {
        let entries = self.boundaries.entry(field.to_string()).or_default();
        if let Some(entry) = entries.iter_mut().find(|(f, _)| *f == face) {
            entry.1 = condition;
        } else {
            entries.push((face, condition));
        }
    }

    /// Configuration-surface variant of [`SpatialGrid::set_boundary_condition`].
    ///
    /// Unknown face or condition names are logged and nothing is applied.
    /// Returns whether a condition was installed.
    pub fn set_boundary_condition_by_name(
        &mut self,
        face: &str,
        field: &str,
        condition: &str,
        value: f64,
    ) -> bool {
        let Some(parsed_face) = Face::from_name(face) else {
            warn!("Unknown boundary face '{}', no condition applied", face);
            return false;
        };
        match BoundaryCondition::from_name(condition, value) {
            Some(cond) => {
                self.set_boundary_condition(parsed_face, field, cond);
                true
            }
            None => false,
        }
    }

    pub fn clear_boundary_condition(&mut self, face: Face, field: &str) {
        if let Some(entries) = self.boundaries.get_mut(field) {
            entries.retain(|(f, _)| *f != face);
        }
    }

    /// Conditions currently assigned to `field`
    pub fn boundary_conditions(&self, field: &str) -> &[(Face, BoundaryCondition)] {
        self.boundaries
            .get(field)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Impose every condition registered for `field`.
    pub fn apply_boundary_conditions(&mut self, field: &str) {
        let conditions = self.boundary_conditions(field).to_vec();
        if conditions.is_empty() {
            return;
        }
        let dims = self.dimensions();
        let id = self.ensure_field(field);
        let data = self.fields[id.0].as_mut_slice();
        for (face, condition) in conditions {
            boundary::apply_condition(data, dims, face, condition);
        }
    }

    // ====== Diffusion ======

    /// Synchronous neighbor-averaging diffusion of `field`.
    ///
    /// `rate` is clamped to `[0, 1]`. Boundary conditions for the field are
    /// applied after the update.
    pub fn diffuse(&mut self, field: &str, rate: f64) {
        self.diffuse_scaled(field, rate, None);
    }

    /// Diffusion with an optional per-face multiplier on `rate`.
    ///
    /// `face_factors[cell][slot]` scales the exchange between `cell` and its
    /// neighbor in direction slot `slot`; a factor of 0 blocks that face.
    pub(crate) fn diffuse_scaled(
        &mut self,
        field: &str,
        rate: f64,
        face_factors: Option<&[[f64; 6]]>,
    ) {
        let rate = clamp_rate(rate);
        if let Some(id) = self.field_id(field) {
            let old = self.fields[id.0].as_slice();
            let neighbors = &self.neighbors;

            let next: Vec<f64> = old
                .par_iter()
                .enumerate()
                .map(|(flat, &value)| {
                    let slots = &neighbors[flat];
                    let mut flux = 0.0;
                    let mut count = 0usize;
                    for (slot, neighbor) in slots.iter().enumerate() {
                        if let Some(n) = *neighbor {
                            let factor = face_factors.map_or(1.0, |f| f[flat][slot]);
                            flux += factor * (old[n] - value);
                            count += 1;
                        }
                    }
                    if count == 0 {
                        value
                    } else {
                        value + rate * flux / count as f64
                    }
                })
                .collect();

            self.fields[id.0].replace(next);
        }
        self.apply_boundary_conditions(field);
    }
}

/// Clamp a diffusion fraction into `[0, 1]`, logging out-of-range input
pub(crate) fn clamp_rate(rate: f64) -> f64 {
    if rate.is_nan() {
        warn!("Diffusion rate is NaN, using 0");
        return 0.0;
    }
    if !(0.0..=1.0).contains(&rate) {
        warn!("Diffusion rate {} outside [0, 1], clamping", rate);
    }
    rate.clamp(0.0, 1.0)
}
