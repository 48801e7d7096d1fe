//! Integer cell addressing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer (x, y, z) address of a grid cell.
///
/// Components are signed so physics code can probe one step past an edge
/// (e.g. `x - 1` at `x = 0`) and have the grid treat it as out of bounds
/// instead of wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct CellIndex {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl CellIndex {
    #[inline]
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Index shifted by the unit offset of `direction`.
    #[inline]
    #[must_use]
    pub fn step(self, direction: Direction) -> Self {
        let (dx, dy, dz) = direction.offset();
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }
}

impl fmt::Display for CellIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// One of the six axis-aligned neighbor directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// +x
    PosX,
    /// -x
    NegX,
    /// +y
    PosY,
    /// -y
    NegY,
    /// +z
    PosZ,
    /// -z
    NegZ,
}

impl Direction {
    /// All six directions in the order used by neighbor tables.
    pub const ALL: [Direction; 6] = [
        Direction::PosX,
        Direction::NegX,
        Direction::PosY,
        Direction::NegY,
        Direction::PosZ,
        Direction::NegZ,
    ];

    /// Unit index offset for this direction
    #[must_use]
    pub const fn offset(self) -> (i32, i32, i32) {
        match self {
            Direction::PosX => (1, 0, 0),
            Direction::NegX => (-1, 0, 0),
            Direction::PosY => (0, 1, 0),
            Direction::NegY => (0, -1, 0),
            Direction::PosZ => (0, 0, 1),
            Direction::NegZ => (0, 0, -1),
        }
    }

    /// Slot of this direction in [`Direction::ALL`]
    #[must_use]
    pub const fn slot(self) -> usize {
        match self {
            Direction::PosX => 0,
            Direction::NegX => 1,
            Direction::PosY => 2,
            Direction::NegY => 3,
            Direction::PosZ => 4,
            Direction::NegZ => 5,
        }
    }

    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Direction::PosX => Direction::NegX,
            Direction::NegX => Direction::PosX,
            Direction::PosY => Direction::NegY,
            Direction::NegY => Direction::PosY,
            Direction::PosZ => Direction::NegZ,
            Direction::NegZ => Direction::PosZ,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_and_opposite() {
        let idx = CellIndex::new(1, 1, 1);
        for dir in Direction::ALL {
            assert_eq!(idx.step(dir).step(dir.opposite()), idx);
        }
        assert_eq!(CellIndex::new(0, 0, 0).step(Direction::NegX), CellIndex::new(-1, 0, 0));
    }

    #[test]
    fn test_display() {
        assert_eq!(CellIndex::new(3, -1, 0).to_string(), "(3, -1, 0)");
    }

    #[test]
    fn test_slots_match_order() {
        for (i, dir) in Direction::ALL.iter().enumerate() {
            assert_eq!(dir.slot(), i);
        }
    }
}
