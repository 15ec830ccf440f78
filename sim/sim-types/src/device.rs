//! Samples exchanged with a haptic input device.
//!
//! A [`DevicePose`] flows from the device into the simulation tick and a
//! [`FeedbackForce`] flows back. Both are small `Copy` values so that a whole
//! sample is swapped through the shared slot at once.

use nalgebra::{Point3, UnitQuaternion, Vector3};

use crate::Pose;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Nanosecond-precision timestamp, measured from link start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Timestamp {
    nanos: u64,
}

impl Timestamp {
    /// Creates a timestamp from nanoseconds.
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self { nanos }
    }

    /// Creates a timestamp from seconds (floating point, clamped at zero).
    #[must_use]
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    pub fn from_secs_f64(secs: f64) -> Self {
        Self {
            nanos: (secs * 1e9).max(0.0) as u64,
        }
    }

    /// Creates a timestamp from a [`std::time::Duration`] since link start.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_duration(elapsed: std::time::Duration) -> Self {
        Self {
            nanos: elapsed.as_nanos().min(u128::from(u64::MAX)) as u64,
        }
    }

    /// Returns the timestamp as nanoseconds.
    #[must_use]
    pub const fn as_nanos(self) -> u64 {
        self.nanos
    }

    /// Returns the timestamp as seconds.
    #[must_use]
    pub fn as_secs_f64(self) -> f64 {
        self.nanos as f64 / 1e9
    }

    /// Seconds elapsed since `earlier`, zero if `earlier` is later.
    #[must_use]
    pub fn seconds_since(self, earlier: Self) -> f64 {
        self.nanos.saturating_sub(earlier.nanos) as f64 / 1e9
    }
}

/// Button bitmask reported by the device handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Buttons(pub u32);

impl Buttons {
    /// No button pressed.
    pub const NONE: Self = Self(0);
    /// Primary handle button.
    pub const PRIMARY: Self = Self(1);
    /// Secondary handle button.
    pub const SECONDARY: Self = Self(1 << 1);

    /// Whether every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

/// One pose sample from the input device.
///
/// Position and orientation are expressed in the device frame. `grip` is the
/// normalized handle closure: 0 is fully closed, 1 fully open. Raw hardware
/// may overshoot this range; the tool model clamps it.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DevicePose {
    /// Handle position in the device frame.
    pub position: Point3<f64>,
    /// Handle orientation in the device frame.
    pub orientation: UnitQuaternion<f64>,
    /// Normalized grip opening.
    pub grip: f64,
    /// Button state.
    pub buttons: Buttons,
    /// Acquisition time.
    pub timestamp: Timestamp,
}

impl Default for DevicePose {
    fn default() -> Self {
        Self::rest()
    }
}

impl DevicePose {
    /// Handle at the device origin, closed, no buttons, time zero.
    #[must_use]
    pub fn rest() -> Self {
        Self {
            position: Point3::origin(),
            orientation: UnitQuaternion::identity(),
            grip: 0.0,
            buttons: Buttons::NONE,
            timestamp: Timestamp::default(),
        }
    }

    /// Sample at the given handle pose.
    #[must_use]
    pub fn at(pose: Pose) -> Self {
        Self {
            position: pose.position,
            orientation: pose.rotation,
            ..Self::rest()
        }
    }

    /// Set the grip opening.
    #[must_use]
    pub fn with_grip(mut self, grip: f64) -> Self {
        self.grip = grip;
        self
    }

    /// Set the acquisition time.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Set the button state.
    #[must_use]
    pub fn with_buttons(mut self, buttons: Buttons) -> Self {
        self.buttons = buttons;
        self
    }

    /// Handle pose as a [`Pose`].
    #[must_use]
    pub fn pose(&self) -> Pose {
        Pose::from_position_rotation(self.position, self.orientation)
    }
}

/// Force and torque command for the device, in the device frame.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FeedbackForce {
    /// Force to render.
    pub force: Vector3<f64>,
    /// Torque to render.
    pub torque: Vector3<f64>,
    /// Time of the tick that produced the command.
    pub timestamp: Timestamp,
}

impl Default for FeedbackForce {
    fn default() -> Self {
        Self::zero()
    }
}

impl FeedbackForce {
    /// A command that renders nothing.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            force: Vector3::zeros(),
            torque: Vector3::zeros(),
            timestamp: Timestamp::default(),
        }
    }

    /// Create a command from force and torque.
    #[must_use]
    pub fn new(force: Vector3<f64>, torque: Vector3<f64>, timestamp: Timestamp) -> Self {
        Self {
            force,
            torque,
            timestamp,
        }
    }

    /// Whether the command renders no force and no torque.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.force.norm_squared() == 0.0 && self.torque.norm_squared() == 0.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_timestamp_roundtrip() {
        let ts = Timestamp::from_secs_f64(1.5);
        assert_eq!(ts.as_nanos(), 1_500_000_000);
        assert_relative_eq!(ts.seconds_since(Timestamp::from_secs_f64(0.5)), 1.0);
        assert_eq!(Timestamp::from_secs_f64(-3.0), Timestamp::default());
    }

    #[test]
    fn test_buttons_contains() {
        let both = Buttons(Buttons::PRIMARY.0 | Buttons::SECONDARY.0);
        assert!(both.contains(Buttons::PRIMARY));
        assert!(!Buttons::PRIMARY.contains(Buttons::SECONDARY));
    }

    #[test]
    fn test_device_pose_builder() {
        let pose = DevicePose::at(Pose::from_position(Point3::new(0.0, 1.0, 0.0)))
            .with_grip(0.5)
            .with_timestamp(Timestamp::from_nanos(10));
        assert_eq!(pose.grip, 0.5);
        assert_eq!(pose.pose().position.y, 1.0);
        assert_eq!(pose.timestamp.as_nanos(), 10);
    }

    #[test]
    fn test_feedback_zero() {
        assert!(FeedbackForce::zero().is_zero());
        let f = FeedbackForce::new(Vector3::x(), Vector3::zeros(), Timestamp::default());
        assert!(!f.is_zero());
    }
}
