//! Point ventilation sources
//!
//! A source synthesizes a local air velocity around itself. It is a
//! superposition-friendly point approximation, not a solved flow field:
//!
//! ```text
//! |v| = v_max × (1 - d/r)      d ≤ r   (linear core)
//! |v| = v_max × (r/d)²         d > r   (inverse-square tail)
//! v   = 0                      d > 10r (outside extended influence)
//!
//! v_max = Q / (π r²)
//! ```
//!
//! Only the half-space downstream of the flow direction receives flow
//! (`max(0, cos θ)` weighting). Outlets and reversed bidirectional sources
//! flip both the half-space and the sign of the result.

use crate::core_types::vec3::{up, Vec3};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::{debug, warn};

/// Distance under which a query is treated as sitting on the source (m)
pub const SINGULARITY_DISTANCE: f64 = 0.001;

/// Influence cut-off as a multiple of the physical radius
pub const EXTENDED_RADIUS_FACTOR: f64 = 10.0;

/// How a source moves air
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceType {
    /// Supplies air along its direction
    Inlet,
    /// Draws air (sign fixed at -1)
    Outlet,
    /// Sign toggled at runtime
    Bidirectional,
}

impl SourceType {
    /// Parse a configuration name; unknown names return `None`
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "inlet" => Some(SourceType::Inlet),
            "outlet" => Some(SourceType::Outlet),
            "bidirectional" => Some(SourceType::Bidirectional),
            _ => None,
        }
    }

    const fn initial_sign(self) -> f64 {
        match self {
            SourceType::Inlet | SourceType::Bidirectional => 1.0,
            SourceType::Outlet => -1.0,
        }
    }
}

/// A single directional flow emitter/absorber
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VentilationSource {
    name: String,
    /// Position (m)
    position: Vec3,
    /// Unit flow direction
    direction: Vec3,
    /// Volumetric flow rate (m³/s)
    flow_rate: f64,
    source_type: SourceType,
    /// Physical influence radius (m)
    radius: f64,
    /// `flow_rate / (π radius²)`, kept in sync by the setters
    max_velocity: f64,
    /// +1 or -1
    current_direction: f64,
    enabled: bool,
}

impl VentilationSource {
    /// Create a source.
    ///
    /// A zero or non-finite `direction` defaults to +Z. Negative flow rates
    /// and radii are treated as zero.
    pub fn new(
        name: impl Into<String>,
        position: Vec3,
        direction: Vec3,
        flow_rate: f64,
        source_type: SourceType,
        radius: f64,
    ) -> Self {
        let name = name.into();
        let direction = normalize_or_up(&name, direction);
        let mut source = Self {
            name,
            position,
            direction,
            flow_rate: sanitize("flow rate", flow_rate),
            source_type,
            radius: sanitize("radius", radius),
            max_velocity: 0.0,
            current_direction: source_type.initial_sign(),
            enabled: true,
        };
        source.update_max_velocity();
        source
    }

    /// Inlet shorthand
    pub fn inlet(name: impl Into<String>, position: Vec3, direction: Vec3, flow_rate: f64, radius: f64) -> Self {
        Self::new(name, position, direction, flow_rate, SourceType::Inlet, radius)
    }

    /// Outlet shorthand
    pub fn outlet(name: impl Into<String>, position: Vec3, direction: Vec3, flow_rate: f64, radius: f64) -> Self {
        Self::new(name, position, direction, flow_rate, SourceType::Outlet, radius)
    }

    fn update_max_velocity(&mut self) {
        self.max_velocity = if self.radius > 0.0 {
            self.flow_rate / (PI * self.radius * self.radius)
        } else {
            0.0
        };
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    pub fn flow_rate(&self) -> f64 {
        self.flow_rate
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn source_type(&self) -> SourceType {
        self.source_type
    }

    /// Peak velocity at the source (m/s)
    pub fn max_velocity(&self) -> f64 {
        self.max_velocity
    }

    /// Current sign: +1 pushes along `direction`, -1 draws against it
    pub fn current_direction(&self) -> f64 {
        self.current_direction
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn set_flow_rate(&mut self, flow_rate: f64) {
        self.flow_rate = sanitize("flow rate", flow_rate);
        self.update_max_velocity();
    }

    pub fn set_radius(&mut self, radius: f64) {
        self.radius = sanitize("radius", radius);
        self.update_max_velocity();
    }

    pub fn set_direction(&mut self, direction: Vec3) {
        self.direction = normalize_or_up(&self.name, direction);
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    /// Reverse a bidirectional source. Inlets and outlets keep their sign.
    pub fn toggle_direction(&mut self) {
        if self.source_type == SourceType::Bidirectional {
            self.current_direction = -self.current_direction;
        } else {
            debug!(
                "Ignoring direction toggle on fixed {:?} source '{}'",
                self.source_type, self.name
            );
        }
    }

    /// Air velocity (m/s) this source induces at `point`.
    pub fn velocity_at(&self, point: Vec3) -> Vec3 {
        let offset = point - self.position;
        let distance = offset.norm();

        if distance < SINGULARITY_DISTANCE {
            return self.direction * self.max_velocity * self.current_direction;
        }
        if distance > EXTENDED_RADIUS_FACTOR * self.radius {
            return Vec3::zeros();
        }

        let to_point = offset / distance;
        let mut cos_angle = self.direction.dot(&to_point);
        if self.current_direction < 0.0 {
            cos_angle = -cos_angle;
        }
        let angle_factor = cos_angle.max(0.0);

        let magnitude = if distance <= self.radius {
            self.max_velocity * (1.0 - distance / self.radius)
        } else {
            let ratio = self.radius / distance;
            self.max_velocity * ratio * ratio
        };

        self.direction * magnitude * angle_factor * self.current_direction
    }
}

fn normalize_or_up(name: &str, direction: Vec3) -> Vec3 {
    let norm = direction.norm();
    if norm > 0.0 && norm.is_finite() {
        direction / norm
    } else {
        warn!("Source '{}' has a degenerate direction, defaulting to +Z", name);
        up()
    }
}

fn sanitize(what: &str, value: f64) -> f64 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        warn!("Invalid source {} {}, using 0", what, value);
        0.0
    }
}
