//! Simulation driver
//!
//! `TransportSimulation` owns the grid, the airflow model and the barrier
//! handler for one enclosed space and advances every tracked field with the
//! canonical tick (advect → diffuse → outside-air exchange). External
//! collaborators inject emission or heating terms between ticks through
//! [`TransportSimulation::inject`] or directly on the grid.

use crate::airflow::{AirflowConfig, AirflowModel};
use crate::barrier::BarrierHandler;
use crate::core_types::CellIndex;
use crate::grid::SpatialGrid;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Room shape and transport settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Cells along x
    pub width: usize,
    /// Cells along y
    pub length: usize,
    /// Cells along z
    pub height: usize,
    /// Cell edge length (m)
    pub cell_size: f64,
    pub airflow: AirflowConfig,
    /// Route diffusion through the barrier handler
    pub use_barriers: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        // 4 m × 3 m × 2.5 m room at 10 cm resolution
        Self {
            width: 40,
            length: 30,
            height: 25,
            cell_size: 0.1,
            airflow: AirflowConfig::default(),
            use_barriers: true,
        }
    }
}

/// Aggregate values of one tracked field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldStats {
    pub name: String,
    /// Sum over all cells
    pub total: f64,
    /// Largest cell value
    pub max: f64,
    /// Mean cell value
    pub mean: f64,
}

/// Snapshot of simulation progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationStats {
    pub simulation_time: f64,
    pub step_count: u64,
    pub total_cells: usize,
    pub fields: Vec<FieldStats>,
}

/// Transport engine for one enclosed space
#[derive(Debug, Clone)]
pub struct TransportSimulation {
    grid: SpatialGrid,
    airflow: AirflowModel,
    barriers: BarrierHandler,

    /// Fields advanced by each tick, in registration order
    tracked_fields: Vec<String>,
    use_barriers: bool,

    // Statistics
    simulation_time: f64,
    step_count: u64,
}

impl TransportSimulation {
    pub fn new(config: SimulationConfig) -> Self {
        info!(
            "Creating transport simulation: {}x{}x{} cells at {:.3}m",
            config.width, config.length, config.height, config.cell_size
        );
        Self::from_parts(
            SpatialGrid::new(config.width, config.length, config.height, config.cell_size),
            AirflowModel::new(config.airflow),
            BarrierHandler::new(),
            config.use_barriers,
        )
    }

    /// Assemble a simulation from pre-built components
    pub fn from_parts(
        grid: SpatialGrid,
        airflow: AirflowModel,
        barriers: BarrierHandler,
        use_barriers: bool,
    ) -> Self {
        Self {
            grid,
            airflow,
            barriers,
            tracked_fields: Vec::new(),
            use_barriers,
            simulation_time: 0.0,
            step_count: 0,
        }
    }

    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut SpatialGrid {
        &mut self.grid
    }

    pub fn airflow(&self) -> &AirflowModel {
        &self.airflow
    }

    pub fn airflow_mut(&mut self) -> &mut AirflowModel {
        &mut self.airflow
    }

    pub fn barriers(&self) -> &BarrierHandler {
        &self.barriers
    }

    pub fn barriers_mut(&mut self) -> &mut BarrierHandler {
        &mut self.barriers
    }

    pub fn set_use_barriers(&mut self, use_barriers: bool) {
        self.use_barriers = use_barriers;
    }

    /// Advance `field` on every tick. Tracking twice is a no-op.
    pub fn track_field(&mut self, field: &str) {
        self.grid.ensure_field(field);
        if !self.tracked_fields.iter().any(|f| f == field) {
            self.tracked_fields.push(field.to_string());
        }
    }

    /// Stop advancing `field`; its values stay on the grid.
    pub fn untrack_field(&mut self, field: &str) {
        self.tracked_fields.retain(|f| f != field);
    }

    pub fn tracked_fields(&self) -> &[String] {
        &self.tracked_fields
    }

    /// Add `amount` to `field` at `index` (out-of-bounds is ignored)
    pub fn inject(&mut self, index: CellIndex, field: &str, amount: f64) {
        if !self.grid.in_bounds(index) {
            debug!("Ignoring {} injection at out-of-bounds cell {}", field, index);
            return;
        }
        self.grid.add(index, field, amount);
    }

    /// Value of `field` at `index`
    pub fn value_at(&self, index: CellIndex, field: &str) -> f64 {
        self.grid.get(index, field)
    }

    pub fn simulation_time(&self) -> f64 {
        self.simulation_time
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Advance one tick of the configured time step
    pub fn step(&mut self) {
        let dt = self.airflow.time_step();
        self.step_dt(dt);
    }

    /// Advance one tick of `dt` seconds. Non-positive or non-finite steps are skipped.
    pub fn step_dt(&mut self, dt: f64) {
        if !(dt.is_finite() && dt > 0.0) {
            warn!("Skipping transport step with invalid dt={}", dt);
            return;
        }

        let barriers = if self.use_barriers && !self.barriers.is_empty() {
            Some(&mut self.barriers)
        } else {
            None
        };
        self.airflow
            .apply_airflow_step(&mut self.grid, &self.tracked_fields, dt, barriers);

        self.simulation_time += dt;
        self.step_count += 1;

        debug!(
            "Transport step {}: t={:.2}s, dt={:.3}s, {} fields",
            self.step_count,
            self.simulation_time,
            dt,
            self.tracked_fields.len()
        );
    }

    /// Advance `steps` ticks of the configured time step
    pub fn run(&mut self, steps: usize) {
        for _ in 0..steps {
            self.step();
        }
    }

    pub fn get_stats(&self) -> SimulationStats {
        let cells = self.grid.cell_count();
        let fields = self
            .tracked_fields
            .iter()
            .map(|name| {
                let total = self.grid.field_total(name);
                FieldStats {
                    name: name.clone(),
                    total,
                    max: self.grid.field_max(name),
                    mean: total / cells as f64,
                }
            })
            .collect();

        SimulationStats {
            simulation_time: self.simulation_time,
            step_count: self.step_count,
            total_cells: cells,
            fields,
        }
    }
}

impl Default for TransportSimulation {
    fn default() -> Self {
        Self::new(SimulationConfig::default())
    }
}
