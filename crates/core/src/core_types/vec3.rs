//! Vector type alias for 3D positions, directions and air velocities.

use nalgebra::Vector3;

/// 3D vector type for positions (m), directions and velocities (m/s).
///
/// Alias for `nalgebra::Vector3<f64>`. Field values are carried in `f64`
/// so vectors use the same precision to keep velocity-times-timestep
/// arithmetic free of mixed-precision casts.
pub type Vec3 = Vector3<f64>;

/// Unit vector along +Z, used wherever a degenerate direction needs a default.
#[inline]
#[must_use]
pub fn up() -> Vec3 {
    Vec3::new(0.0, 0.0, 1.0)
}
