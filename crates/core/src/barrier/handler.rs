//! Barrier-aware diffusion
//!
//! The handler owns every barrier in the room and intercepts the diffusion
//! rate between adjacent cells:
//!
//! ```text
//! rate(a, b) = base_rate × Π permeability(field)   over barriers between a and b
//! ```
//!
//! A barrier lies "between" two cells when its box contains the midpoint of
//! their physical positions. Pair lookups are cached by unordered index pair;
//! the cache only depends on barrier geometry, so it is dropped when a
//! barrier is added or removed but survives permeability edits.

use crate::barrier::element::Barrier;
use crate::core_types::{CellIndex, Direction};
use crate::error::{Result, TransportError};
use crate::grid::SpatialGrid;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use tracing::{debug, info};

/// Unordered cell pair used as cache key
type PairKey = (CellIndex, CellIndex);

fn pair_key(a: CellIndex, b: CellIndex) -> PairKey {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn are_adjacent(a: CellIndex, b: CellIndex) -> bool {
    (a.x - b.x).abs() + (a.y - b.y).abs() + (a.z - b.z).abs() == 1
}

/// Ordered collection of barriers plus the pair cache
#[derive(Debug, Clone, Default)]
pub struct BarrierHandler {
    barriers: Vec<Barrier>,

    /// Pair -> positions in `barriers` whose box holds the pair midpoint
    pair_cache: FxHashMap<PairKey, Vec<usize>>,

    /// Cell size the cache was built for
    cached_cell_size: Option<f64>,

    /// Every adjacent pair of a grid with this shape is cached
    adjacent_pairs_cached: Option<(usize, usize, usize)>,
}

impl BarrierHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a barrier. Names must be unique.
    pub fn add_barrier(&mut self, barrier: Barrier) -> Result<()> {
        if self.barrier(barrier.name()).is_some() {
            return Err(TransportError::DuplicateBarrier(barrier.name().to_string()));
        }
        info!(
            "Adding barrier '{}' ({:?}, material={})",
            barrier.name(),
            barrier.kind(),
            barrier.material().name()
        );
        self.barriers.push(barrier);
        self.invalidate_cache();
        Ok(())
    }

    pub fn remove_barrier(&mut self, name: &str) -> Result<Barrier> {
        let position = self
            .barriers
            .iter()
            .position(|b| b.name() == name)
            .ok_or_else(|| TransportError::UnknownBarrier(name.to_string()))?;
        let removed = self.barriers.remove(position);
        self.invalidate_cache();
        Ok(removed)
    }

    /// Remove every barrier
    pub fn clear(&mut self) {
        self.barriers.clear();
        self.invalidate_cache();
    }

    pub fn barrier(&self, name: &str) -> Option<&Barrier> {
        self.barriers.iter().find(|b| b.name() == name)
    }

    /// Mutable access for permeability and open-state edits.
    ///
    /// Geometry is immutable after construction, so the pair cache stays valid.
    pub fn barrier_mut(&mut self, name: &str) -> Option<&mut Barrier> {
        self.barriers.iter_mut().find(|b| b.name() == name)
    }

    /// Barriers in insertion order
    pub fn barriers(&self) -> &[Barrier] {
        &self.barriers
    }

    pub fn len(&self) -> usize {
        self.barriers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.barriers.is_empty()
    }

    pub fn invalidate_cache(&mut self) {
        self.pair_cache.clear();
        self.cached_cell_size = None;
        self.adjacent_pairs_cached = None;
    }

    /// Number of cached pairs
    pub fn cached_pair_count(&self) -> usize {
        self.pair_cache.len()
    }

    fn sync_cell_size(&mut self, grid: &SpatialGrid) {
        if self.cached_cell_size != Some(grid.cell_size()) {
            if self.cached_cell_size.is_some() {
                debug!("Grid cell size changed, dropping barrier pair cache");
            }
            self.invalidate_cache();
            self.cached_cell_size = Some(grid.cell_size());
        }
    }

    fn compute_between(&self, grid: &SpatialGrid, a: CellIndex, b: CellIndex) -> Vec<usize> {
        let midpoint = (grid.physical_coordinates(a) + grid.physical_coordinates(b)) * 0.5;
        self.barriers
            .iter()
            .enumerate()
            .filter(|(_, barrier)| barrier.contains_point(midpoint))
            .map(|(i, _)| i)
            .collect()
    }

    /// Barriers whose box contains the midpoint between cells `a` and `b`.
    ///
    /// Only adjacent in-bounds pairs are cached; other probes are answered
    /// directly.
    pub fn barriers_between(&mut self, grid: &SpatialGrid, a: CellIndex, b: CellIndex) -> Vec<&Barrier> {
        self.sync_cell_size(grid);
        if !(grid.in_bounds(a) && grid.in_bounds(b) && are_adjacent(a, b)) {
            return self
                .compute_between(grid, a, b)
                .into_iter()
                .map(|i| &self.barriers[i])
                .collect();
        }
        let key = pair_key(a, b);
        if !self.pair_cache.contains_key(&key) {
            let found = self.compute_between(grid, a, b);
            self.pair_cache.insert(key, found);
        }
        self.pair_cache
            .get(&key)
            .map(|positions| positions.iter().map(|&i| &self.barriers[i]).collect())
            .unwrap_or_default()
    }

    /// Product of `field` permeabilities of every barrier between `a` and `b`
    /// (1 when nothing intervenes).
    pub fn pair_permeability(&mut self, grid: &SpatialGrid, a: CellIndex, b: CellIndex, field: &str) -> f64 {
        self.barriers_between(grid, a, b)
            .iter()
            .map(|barrier| barrier.permeability(field))
            .product()
    }

    /// Fill the cache for every adjacent pair of `grid`.
    fn cache_adjacent_pairs(&mut self, grid: &SpatialGrid) {
        self.sync_cell_size(grid);
        if self.adjacent_pairs_cached == Some(grid.dimensions()) {
            return;
        }

        // Only +x/+y/+z so each unordered pair is visited once
        let forward = [Direction::PosX, Direction::PosY, Direction::PosZ];
        let missing: Vec<PairKey> = grid
            .neighbor_table()
            .iter()
            .enumerate()
            .flat_map(|(flat, slots)| {
                let here = grid.cell_index(flat);
                forward
                    .iter()
                    .filter_map(move |dir| slots[dir.slot()].map(|n| pair_key(here, grid.cell_index(n))))
            })
            .filter(|key| !self.pair_cache.contains_key(key))
            .collect();

        let handler: &Self = self;
        let computed: Vec<(PairKey, Vec<usize>)> = missing
            .into_par_iter()
            .map(|key| {
                let found = handler.compute_between(grid, key.0, key.1);
                (key, found)
            })
            .collect();

        debug!(
            "Barrier pair cache filled: {} new pairs, {} barriers",
            computed.len(),
            self.barriers.len()
        );
        self.pair_cache.extend(computed);
        self.adjacent_pairs_cached = Some(grid.dimensions());
    }

    /// Synchronous diffusion of `field` with per-face rates attenuated by barriers.
    ///
    /// Identical to [`SpatialGrid::diffuse`] except that the exchange with each
    /// neighbor uses `base_rate × Π permeability`. A zero permeability on any
    /// intervening barrier blocks that face.
    pub fn diffuse_with_barriers(&mut self, grid: &mut SpatialGrid, field: &str, base_rate: f64) {
        if self.barriers.is_empty() || !grid.has_field(field) {
            grid.diffuse(field, base_rate);
            return;
        }

        self.cache_adjacent_pairs(grid);

        let shared: &SpatialGrid = grid;
        let cache = &self.pair_cache;
        let barriers = &self.barriers;
        let factors: Vec<[f64; 6]> = shared
            .neighbor_table()
            .par_iter()
            .enumerate()
            .map(|(flat, slots)| {
                let here = shared.cell_index(flat);
                let mut row = [1.0; 6];
                for (slot, neighbor) in slots.iter().enumerate() {
                    if let Some(n) = *neighbor {
                        let key = pair_key(here, shared.cell_index(n));
                        if let Some(positions) = cache.get(&key) {
                            row[slot] = positions
                                .iter()
                                .map(|&i| barriers[i].permeability(field))
                                .product();
                        }
                    }
                }
                row
            })
            .collect();

        grid.diffuse_scaled(field, base_rate, Some(&factors));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::barrier::BarrierKind;
    use crate::barrier::Material;
    use crate::core_types::Vec3;
    use approx::assert_relative_eq;

    fn idx(x: i32, y: i32, z: i32) -> CellIndex {
        CellIndex::new(x, y, z)
    }

    /// Plane x = 0.05 separating column x = 0 from x = 1 on a 0.1 m grid
    fn blocking_partition(field: &str) -> Barrier {
        Barrier::generic("p", Vec3::new(0.05, 0.0, 0.0), Vec3::new(0.05, 0.2, 0.2), 0.01)
            .with_permeability(field, 0.0)
    }

    #[test]
    fn test_duplicate_barrier_rejected() {
        let mut handler = BarrierHandler::new();
        handler.add_barrier(blocking_partition("x")).unwrap();
        assert_eq!(
            handler.add_barrier(blocking_partition("x")),
            Err(TransportError::DuplicateBarrier("p".to_string()))
        );
        assert_eq!(handler.len(), 1);
    }

    #[test]
    fn test_barriers_between_uses_midpoint() {
        let grid = SpatialGrid::new(3, 3, 3, 0.1);
        let mut handler = BarrierHandler::new();
        handler.add_barrier(blocking_partition("x")).unwrap();

        assert_eq!(handler.barriers_between(&grid, idx(0, 0, 0), idx(1, 0, 0)).len(), 1);
        assert_eq!(handler.barriers_between(&grid, idx(1, 0, 0), idx(0, 0, 0)).len(), 1);
        assert!(handler.barriers_between(&grid, idx(1, 0, 0), idx(2, 0, 0)).is_empty());
        assert!(handler.barriers_between(&grid, idx(0, 0, 0), idx(0, 1, 0)).is_empty());
        // symmetric pairs share one cache entry
        assert_eq!(handler.cached_pair_count(), 3);
    }

    #[test]
    fn test_only_adjacent_in_bounds_pairs_cached() {
        let grid = SpatialGrid::new(3, 3, 3, 0.1);
        let mut handler = BarrierHandler::new();
        handler.add_barrier(blocking_partition("x")).unwrap();

        assert_eq!(handler.barriers_between(&grid, idx(0, 0, 0), idx(1, 0, 0)).len(), 1);
        // non-adjacent and out-of-bounds probes are answered but not stored
        assert!(handler.barriers_between(&grid, idx(0, 0, 0), idx(2, 0, 0)).is_empty());
        assert!(handler.barriers_between(&grid, idx(-1, 0, 0), idx(0, 0, 0)).is_empty());
        assert!(handler.barriers_between(&grid, idx(2, 2, 2), idx(3, 2, 2)).is_empty());
        assert_eq!(handler.cached_pair_count(), 1);
    }

    #[test]
    fn test_thick_wall_leaves_parallel_faces_open() {
        let mut grid = SpatialGrid::new(3, 3, 1, 0.1);
        grid.set(idx(0, 0, 0), "x", 100.0);
        let mut handler = BarrierHandler::new();
        handler
            .add_barrier(
                Barrier::wall("w", Vec3::new(0.05, 0.0, 0.0), Vec3::new(0.05, 0.2, 0.0), 0.1)
                    .with_permeability("x", 0.0),
            )
            .unwrap();

        assert_eq!(handler.barriers_between(&grid, idx(0, 0, 0), idx(1, 0, 0)).len(), 1);
        assert!(handler.barriers_between(&grid, idx(0, 0, 0), idx(0, 1, 0)).is_empty());
        assert!(handler.barriers_between(&grid, idx(1, 0, 0), idx(1, 1, 0)).is_empty());

        handler.diffuse_with_barriers(&mut grid, "x", 0.1);
        assert_eq!(grid.get(idx(1, 0, 0), "x"), 0.0);
        assert!(grid.get(idx(0, 1, 0), "x") > 0.0);
    }

    #[test]
    fn test_cache_invalidated_on_add_and_remove() {
        let grid = SpatialGrid::new(3, 3, 3, 0.1);
        let mut handler = BarrierHandler::new();
        assert!(handler.barriers_between(&grid, idx(0, 0, 0), idx(1, 0, 0)).is_empty());

        handler.add_barrier(blocking_partition("x")).unwrap();
        assert_eq!(handler.cached_pair_count(), 0);
        assert_eq!(handler.barriers_between(&grid, idx(0, 0, 0), idx(1, 0, 0)).len(), 1);

        handler.remove_barrier("p").unwrap();
        assert!(handler.barriers_between(&grid, idx(0, 0, 0), idx(1, 0, 0)).is_empty());
        assert_eq!(
            handler.remove_barrier("p").unwrap_err(),
            TransportError::UnknownBarrier("p".to_string())
        );
    }

    #[test]
    fn test_pair_permeability_multiplies() {
        let grid = SpatialGrid::new(2, 1, 1, 1.0);
        let mut handler = BarrierHandler::new();
        let a = Barrier::generic("a", Vec3::new(0.5, -1.0, -1.0), Vec3::new(0.5, 1.0, 1.0), 0.0)
            .with_permeability("t", 0.5);
        let b = Barrier::generic("b", Vec3::new(0.5, -1.0, -1.0), Vec3::new(0.5, 1.0, 1.0), 0.0)
            .with_permeability("t", 0.4);
        handler.add_barrier(a).unwrap();
        handler.add_barrier(b).unwrap();
        assert_relative_eq!(handler.pair_permeability(&grid, idx(0, 0, 0), idx(1, 0, 0), "t"), 0.2);
        assert_eq!(handler.pair_permeability(&grid, idx(0, 0, 0), idx(1, 0, 0), "other"), 1.0);
    }

    #[test]
    fn test_zero_permeability_blocks_face() {
        let mut grid = SpatialGrid::new(3, 3, 3, 0.1);
        grid.set(idx(0, 0, 0), "x", 100.0);

        let mut handler = BarrierHandler::new();
        handler.add_barrier(blocking_partition("x")).unwrap();
        handler.diffuse_with_barriers(&mut grid, "x", 0.1);

        assert_eq!(grid.get(idx(1, 0, 0), "x"), 0.0);
        // the unblocked faces still leak
        assert!(grid.get(idx(0, 1, 0), "x") > 0.0);
        assert!(grid.get(idx(0, 0, 0), "x") < 100.0);
    }

    #[test]
    fn test_zero_blocks_regardless_of_other_barriers() {
        let mut grid = SpatialGrid::new(2, 1, 1, 1.0);
        grid.set(idx(0, 0, 0), "x", 10.0);
        let mut handler = BarrierHandler::new();
        handler
            .add_barrier(
                Barrier::generic("open", Vec3::new(0.5, 0.0, 0.0), Vec3::new(0.5, 0.0, 0.0), 0.0)
                    .with_permeability("x", 1.0),
            )
            .unwrap();
        handler
            .add_barrier(
                Barrier::generic("shut", Vec3::new(0.5, 0.0, 0.0), Vec3::new(0.5, 0.0, 0.0), 0.0)
                    .with_permeability("x", 0.0),
            )
            .unwrap();
        handler.diffuse_with_barriers(&mut grid, "x", 1.0);
        assert_eq!(grid.get(idx(1, 0, 0), "x"), 0.0);
        assert_eq!(grid.get(idx(0, 0, 0), "x"), 10.0);
    }

    #[test]
    fn test_no_barriers_matches_plain_diffusion() {
        let mut plain = SpatialGrid::new(3, 3, 3, 0.1);
        plain.set(idx(1, 1, 1), "x", 50.0);
        let mut with_handler = plain.clone();

        plain.diffuse("x", 0.2);
        BarrierHandler::new().diffuse_with_barriers(&mut with_handler, "x", 0.2);

        for i in plain.indices() {
            assert_eq!(plain.get(i, "x"), with_handler.get(i, "x"));
        }
    }

    #[test]
    fn test_permeability_edit_applies_without_rebuild() {
        let mut grid = SpatialGrid::new(2, 1, 1, 1.0);
        grid.set(idx(0, 0, 0), "x", 10.0);
        let mut handler = BarrierHandler::new();
        handler
            .add_barrier(Barrier::new(
                "door",
                BarrierKind::Door { open_fraction: 0.0 },
                Vec3::new(0.5, 0.0, 0.0),
                Vec3::new(0.5, 0.0, 0.0),
                0.04,
                Material::glass(),
            ))
            .unwrap();

        handler.diffuse_with_barriers(&mut grid, "x", 1.0);
        assert_eq!(grid.get(idx(1, 0, 0), "x"), 0.0);
        let cached = handler.cached_pair_count();

        handler.barrier_mut("door").unwrap().set_door_open_fraction(0.5);
        handler.diffuse_with_barriers(&mut grid, "x", 1.0);
        assert_eq!(handler.cached_pair_count(), cached);
        // rate 1 × permeability 0.5 moves half the gap
        assert_relative_eq!(grid.get(idx(1, 0, 0), "x"), 5.0);
        assert_relative_eq!(grid.get(idx(0, 0, 0), "x"), 5.0);
    }
}
