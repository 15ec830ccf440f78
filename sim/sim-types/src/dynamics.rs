//! Uniform external fields.

use nalgebra::Vector3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Gravity configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Gravity {
    /// Acceleration due to gravity.
    pub acceleration: Vector3<f64>,
}

impl Default for Gravity {
    fn default() -> Self {
        Self::y_down()
    }
}

impl Gravity {
    /// Standard gravity along -Y, the convention of haptic scene files.
    #[must_use]
    pub fn y_down() -> Self {
        Self {
            acceleration: Vector3::new(0.0, -9.81, 0.0),
        }
    }

    /// Zero gravity.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            acceleration: Vector3::zeros(),
        }
    }

    /// Custom gravity vector.
    #[must_use]
    pub fn custom(acceleration: Vector3<f64>) -> Self {
        Self { acceleration }
    }

    /// Compute the gravitational force on a body.
    #[must_use]
    pub fn force_on_mass(&self, mass: f64) -> Vector3<f64> {
        self.acceleration * mass
    }

    /// Check if the vector contains `NaN` or `Inf` values.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.acceleration.iter().all(|x| x.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_gravity() {
        let g = Gravity::y_down();
        assert_relative_eq!(g.acceleration.y, -9.81, epsilon = 1e-10);
        assert_relative_eq!(g.force_on_mass(2.0).y, -19.62, epsilon = 1e-10);
        assert!(Gravity::zero().force_on_mass(5.0).norm() < 1e-15);
    }
}
