//! Coulomb friction cone.
//!
//! The tangential impulse at a contact is constrained to lie within a cone:
//!
//! ```text
//! |λ_t| ≤ μ λ_n
//! ```
//!
//! The solver works with the exact circular cone: the two tangential
//! components are projected together onto the disk of radius `μ λ_n`, never
//! clamped independently (which would admit the corners of a pyramid).

use nalgebra::Vector3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Slack allowed when checking cone membership.
const CONE_EPSILON: f64 = 1e-10;

/// Friction cone for one contact.
///
/// # Example
///
/// ```
/// use sim_contact::FrictionCone;
///
/// let cone = FrictionCone::from_half_angle(0.1);
/// let (t1, t2) = cone.project_disk(3.0, 4.0, 10.0);
/// assert!(cone.contains_pair(t1, t2, 10.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FrictionCone {
    /// Coulomb friction coefficient.
    pub mu: f64,
}

impl FrictionCone {
    /// Create a new friction cone with the given coefficient.
    #[must_use]
    pub fn new(mu: f64) -> Self {
        Self { mu: mu.max(0.0) }
    }

    /// Cone with the given half-angle in radians: `μ = tan(angle)`.
    #[must_use]
    pub fn from_half_angle(angle: f64) -> Self {
        Self::new(angle.tan())
    }

    /// Create a frictionless cone (μ = 0).
    #[must_use]
    pub fn frictionless() -> Self {
        Self { mu: 0.0 }
    }

    /// Project a tangential impulse pair onto the disk of radius `μ λ_n`.
    #[must_use]
    pub fn project_disk(&self, t1: f64, t2: f64, normal_magnitude: f64) -> (f64, f64) {
        let max_friction = self.max_friction(normal_magnitude);
        if max_friction <= 0.0 {
            return (0.0, 0.0);
        }

        let magnitude = t1.hypot(t2);
        if magnitude <= max_friction {
            (t1, t2)
        } else {
            let scale = max_friction / magnitude;
            (t1 * scale, t2 * scale)
        }
    }

    /// Project a tangential vector onto the cone.
    #[must_use]
    pub fn project(&self, tangent: Vector3<f64>, normal_magnitude: f64) -> Vector3<f64> {
        let max_friction = self.max_friction(normal_magnitude);
        let magnitude = tangent.norm();
        if max_friction <= 0.0 || magnitude < CONE_EPSILON {
            Vector3::zeros()
        } else if magnitude <= max_friction {
            tangent
        } else {
            tangent * (max_friction / magnitude)
        }
    }

    /// Check whether a tangential impulse pair lies inside the cone.
    #[must_use]
    pub fn contains_pair(&self, t1: f64, t2: f64, normal_magnitude: f64) -> bool {
        t1.hypot(t2) <= self.max_friction(normal_magnitude) + CONE_EPSILON
    }

    /// Maximum tangential magnitude for the given normal magnitude.
    #[must_use]
    pub fn max_friction(&self, normal_magnitude: f64) -> f64 {
        self.mu * normal_magnitude.max(0.0)
    }

    /// Get the cone half-angle in radians.
    #[must_use]
    pub fn half_angle(&self) -> f64 {
        self.mu.atan()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_half_angle_roundtrip() {
        let cone = FrictionCone::from_half_angle(0.1);
        assert_relative_eq!(cone.mu, 0.1_f64.tan(), epsilon = 1e-15);
        assert_relative_eq!(cone.half_angle(), 0.1, epsilon = 1e-15);
    }

    #[test]
    fn test_disk_projection_keeps_direction() {
        let cone = FrictionCone::new(0.5);
        let (t1, t2) = cone.project_disk(3.0, 4.0, 2.0);
        // |(3, 4)| = 5 is scaled down to 0.5 * 2 = 1.
        assert_relative_eq!(t1, 0.6, epsilon = 1e-12);
        assert_relative_eq!(t2, 0.8, epsilon = 1e-12);
    }

    #[test]
    fn test_no_normal_no_friction() {
        let cone = FrictionCone::new(1.0);
        assert_eq!(cone.project_disk(1.0, 1.0, 0.0), (0.0, 0.0));
        assert_eq!(cone.project_disk(1.0, 1.0, -2.0), (0.0, 0.0));
        assert_eq!(cone.project(Vector3::x(), 0.0), Vector3::zeros());
        assert!(!cone.contains_pair(0.1, 0.0, 0.0));
    }

    proptest! {
        #[test]
        fn prop_projection_lands_in_cone(
            mu in 0.0f64..2.0,
            t1 in -100.0f64..100.0,
            t2 in -100.0f64..100.0,
            normal in 0.0f64..50.0,
        ) {
            let cone = FrictionCone::new(mu);
            let (p1, p2) = cone.project_disk(t1, t2, normal);
            prop_assert!(cone.contains_pair(p1, p2, normal));
            // Projection never grows the impulse.
            prop_assert!(p1.hypot(p2) <= t1.hypot(t2) + 1e-12);
        }
    }
}
