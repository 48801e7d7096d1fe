//! Contiguous per-field storage
//!
//! Each tracked scalar (a chemical concentration, temperature, humidity...)
//! lives in its own flat `Vec<f64>` indexed the same way as the grid cells,
//! instead of a name-to-value map per cell.

use serde::{Deserialize, Serialize};

/// Handle to a registered field within one grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldId(pub(crate) usize);

/// One named scalar field over every cell of the grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldData {
    name: String,
    /// Values in row-major order: `z * (ny * nx) + y * nx + x`
    data: Vec<f64>,
}

impl FieldData {
    /// Create a field over `len` cells, initialized to zero
    #[must_use]
    pub fn new(name: impl Into<String>, len: usize) -> Self {
        Self::with_value(name, len, 0.0)
    }

    /// Create a field over `len` cells, initialized to `value`
    #[must_use]
    pub fn with_value(name: impl Into<String>, len: usize, value: f64) -> Self {
        Self {
            name: name.into(),
            data: vec![value; len],
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Swap in a freshly computed buffer of the same length.
    pub(crate) fn replace(&mut self, next: Vec<f64>) {
        debug_assert_eq!(next.len(), self.data.len());
        self.data = next;
    }

    pub fn fill(&mut self, value: f64) {
        self.data.fill(value);
    }

    /// Sum over all cells
    #[must_use]
    pub fn total(&self) -> f64 {
        self.data.iter().sum()
    }

    /// Largest cell value (`0.0` for an empty field)
    #[must_use]
    pub fn max(&self) -> f64 {
        self.data.iter().copied().reduce(f64::max).unwrap_or(0.0)
    }
}
