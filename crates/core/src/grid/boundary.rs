//! Domain-face boundary conditions applied after each diffusion pass.
//!
//! Each of the six faces of the grid may carry one condition per field:
//!
//! - `Fixed(v)`: every cell on the face is clamped to `v` (Dirichlet)
//! - `Reflective`: zero-gradient; a face cell copies its inward neighbor (Neumann)
//! - `Periodic`: a face cell and its counterpart on the opposite face are both set
//!   to their mean, emulating wrap-around exchange between the two faces

use serde::{Deserialize, Serialize};
use tracing::warn;

/// One of the six outer faces of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Face {
    /// x = 0
    West,
    /// x = width - 1
    East,
    /// y = 0
    South,
    /// y = length - 1
    North,
    /// z = 0
    Bottom,
    /// z = height - 1
    Top,
}

impl Face {
    /// Parse a face name (case-insensitive). Unknown names return `None`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "west" => Some(Face::West),
            "east" => Some(Face::East),
            "south" => Some(Face::South),
            "north" => Some(Face::North),
            "bottom" => Some(Face::Bottom),
            "top" => Some(Face::Top),
            _ => None,
        }
    }

    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Face::West => Face::East,
            Face::East => Face::West,
            Face::South => Face::North,
            Face::North => Face::South,
            Face::Bottom => Face::Top,
            Face::Top => Face::Bottom,
        }
    }

    /// Axis normal to the face (0 = x, 1 = y, 2 = z)
    const fn axis(self) -> usize {
        match self {
            Face::West | Face::East => 0,
            Face::South | Face::North => 1,
            Face::Bottom | Face::Top => 2,
        }
    }

    const fn is_low_side(self) -> bool {
        matches!(self, Face::West | Face::South | Face::Bottom)
    }
}

/// Condition imposed on one face for one field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BoundaryCondition {
    /// Clamp the face to a constant value
    Fixed(f64),
    /// Average with the opposite face
    Periodic,
    /// Zero gradient across the face
    Reflective,
}

impl BoundaryCondition {
    /// Build a condition from its configuration name.
    ///
    /// `value` is only used by `"fixed"`. Unknown names are logged and
    /// yield `None`, meaning no condition is applied.
    #[must_use]
    pub fn from_name(name: &str, value: f64) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "fixed" => Some(BoundaryCondition::Fixed(value)),
            "periodic" => Some(BoundaryCondition::Periodic),
            "reflective" => Some(BoundaryCondition::Reflective),
            other => {
                warn!("Unknown boundary condition '{}', no condition applied", other);
                None
            }
        }
    }
}

/// Flat indices of the cells on `face`, in (z, y, x) row-major order
/// over the two in-plane axes.
pub(crate) fn face_cells(face: Face, dims: (usize, usize, usize)) -> Vec<usize> {
    let (nx, ny, nz) = dims;
    let fixed = if face.is_low_side() {
        0
    } else {
        [nx, ny, nz][face.axis()] - 1
    };

    let mut cells = Vec::new();
    match face.axis() {
        0 => {
            for z in 0..nz {
                for y in 0..ny {
                    cells.push(z * nx * ny + y * nx + fixed);
                }
            }
        }
        1 => {
            for z in 0..nz {
                for x in 0..nx {
                    cells.push(z * nx * ny + fixed * nx + x);
                }
            }
        }
        _ => {
            for y in 0..ny {
                for x in 0..nx {
                    cells.push(fixed * nx * ny + y * nx + x);
                }
            }
        }
    }
    cells
}

/// Apply a single condition to one field's data in place.
pub(crate) fn apply_condition(
    data: &mut [f64],
    dims: (usize, usize, usize),
    face: Face,
    condition: BoundaryCondition,
) {
    let cells = face_cells(face, dims);
    match condition {
        BoundaryCondition::Fixed(value) => {
            for idx in cells {
                data[idx] = value;
            }
        }
        BoundaryCondition::Reflective => {
            let (nx, ny, nz) = dims;
            if [nx, ny, nz][face.axis()] < 2 {
                return;
            }
            let stride = [1, nx, nx * ny][face.axis()];
            for idx in cells {
                let inward = if face.is_low_side() {
                    idx + stride
                } else {
                    idx - stride
                };
                data[idx] = data[inward];
            }
        }
        BoundaryCondition::Periodic => {
            // face_cells walks both faces of a pair in the same in-plane order
            let partners = face_cells(face.opposite(), dims);
            for (idx, partner) in cells.into_iter().zip(partners) {
                let mean = 0.5 * (data[idx] + data[partner]);
                data[idx] = mean;
                data[partner] = mean;
            }
        }
    }
}
