//! Joint state and limits for articulated tools.
//!
//! Tool joints are soft-clamped: a joint that would leave its range is held
//! at the bound and its velocity is zeroed for the step. Limits are never
//! turned into solver rows.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Position and velocity limits for a single-DOF joint.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct JointLimits {
    /// Minimum position (angle for revolute, distance for prismatic).
    pub position_min: f64,
    /// Maximum position.
    pub position_max: f64,
    /// Maximum velocity magnitude.
    pub velocity_max: f64,
}

impl Default for JointLimits {
    fn default() -> Self {
        Self::unlimited()
    }
}

impl JointLimits {
    /// Create limits with specified bounds.
    #[must_use]
    pub fn new(position_min: f64, position_max: f64, velocity_max: f64) -> Self {
        Self {
            position_min,
            position_max,
            velocity_max,
        }
    }

    /// Create unlimited joint limits.
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            position_min: f64::NEG_INFINITY,
            position_max: f64::INFINITY,
            velocity_max: f64::INFINITY,
        }
    }

    /// Revolute limits from an angle range in radians.
    #[must_use]
    pub fn revolute(min_angle: f64, max_angle: f64, max_speed: f64) -> Self {
        Self::new(min_angle, max_angle, max_speed)
    }

    /// Check if a position is within limits.
    #[must_use]
    pub fn position_in_range(&self, position: f64) -> bool {
        position >= self.position_min && position <= self.position_max
    }

    /// Clamp a position to be within limits.
    #[must_use]
    pub fn clamp_position(&self, position: f64) -> f64 {
        position.clamp(self.position_min, self.position_max)
    }

    /// Clamp a velocity to be within limits.
    #[must_use]
    pub fn clamp_velocity(&self, velocity: f64) -> f64 {
        velocity.clamp(-self.velocity_max, self.velocity_max)
    }

    /// Get the position range.
    #[must_use]
    pub fn position_range(&self) -> f64 {
        self.position_max - self.position_min
    }

    /// Reject inverted, `NaN` or negative-speed limits.
    ///
    /// `joint` names the joint in the returned error.
    pub fn validate(&self, joint: &str) -> crate::Result<()> {
        let inverted = self.position_min > self.position_max;
        if inverted || self.position_min.is_nan() || self.position_max.is_nan() {
            return Err(crate::SimError::InvalidJointLimits {
                joint: joint.to_string(),
                min: self.position_min,
                max: self.position_max,
            });
        }
        if self.velocity_max.is_nan() || self.velocity_max <= 0.0 {
            return Err(crate::SimError::invalid_config(format!(
                "joint '{joint}' velocity limit must be positive, got {}",
                self.velocity_max
            )));
        }
        Ok(())
    }
}

/// State of a single-DOF joint.
///
/// # Example
///
/// ```
/// use sim_types::{JointLimits, JointState};
///
/// let limits = JointLimits::revolute(0.0, 1.0, 10.0);
/// let (state, clamped) = JointState::new(1.4, 2.0).clamped(&limits);
/// assert!(clamped);
/// assert_eq!(state.position, 1.0);
/// assert_eq!(state.velocity, 0.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct JointState {
    /// Joint position.
    pub position: f64,
    /// Joint velocity.
    pub velocity: f64,
}

impl JointState {
    /// Create a joint state with the given position and velocity.
    #[must_use]
    pub fn new(position: f64, velocity: f64) -> Self {
        Self { position, velocity }
    }

    /// Create a joint state at the given position with zero velocity.
    #[must_use]
    pub fn at_position(position: f64) -> Self {
        Self {
            position,
            velocity: 0.0,
        }
    }

    /// Check if the state satisfies the given limits.
    #[must_use]
    pub fn within_limits(&self, limits: &JointLimits) -> bool {
        limits.position_in_range(self.position) && self.velocity.abs() <= limits.velocity_max
    }

    /// Soft-clamp the state against `limits`.
    ///
    /// Returns the clamped state and whether the position limit was hit, in
    /// which case the velocity is zeroed.
    #[must_use]
    pub fn clamped(&self, limits: &JointLimits) -> (Self, bool) {
        let position = limits.clamp_position(self.position);
        if position == self.position {
            (
                Self {
                    position,
                    velocity: limits.clamp_velocity(self.velocity),
                },
                false,
            )
        } else {
            (Self::at_position(position), true)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_inside_range_keeps_velocity() {
        let limits = JointLimits::revolute(0.0, 1.0, 5.0);
        let (state, clamped) = JointState::new(0.5, 7.0).clamped(&limits);
        assert!(!clamped);
        assert_eq!(state.position, 0.5);
        assert_eq!(state.velocity, 5.0);
    }

    #[test]
    fn test_clamp_below_range_zeroes_velocity() {
        let limits = JointLimits::revolute(0.0, 1.0, 5.0);
        let (state, clamped) = JointState::new(-0.2, -3.0).clamped(&limits);
        assert!(clamped);
        assert_eq!(state, JointState::at_position(0.0));
        assert!(state.within_limits(&limits));
    }

    #[test]
    fn test_validate_rejects_inverted_limits() {
        let limits = JointLimits::revolute(1.0, -1.0, 5.0);
        let err = limits.validate("jaw_1").unwrap_err();
        assert!(err.is_config_error());
        assert!(err.to_string().contains("jaw_1"));
    }

    #[test]
    fn test_validate_rejects_zero_speed() {
        let limits = JointLimits::revolute(0.0, 1.0, 0.0);
        assert!(limits.validate("jaw_2").is_err());
        assert!(JointLimits::revolute(0.0, 1.0, 3.0).validate("jaw_2").is_ok());
    }
}
