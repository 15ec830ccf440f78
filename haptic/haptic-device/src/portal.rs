//! Portal mounting and forward kinematics for articulated devices.
//!
//! A portal fixes a device's base in the world: it sits on one of several
//! parallel rails, slides along it, and can be flipped and tilted. The
//! device itself reports joint angles ([`DeviceAngles`]); forward kinematics
//! turns those into the [`DevicePose`] the tick consumes.
//!
//! ```text
//!        rail -1        rail 0         rail 1
//!   ─────────●──────────────●──────────────●────── X (rail position, mm)
//!            │              │              │
//!            ▼ flip about X, tilt about Z, then yaw Y · pitch X · roll Z
//!                           │
//!                           ▼ insertion along -Z
//!                          tip
//! ```

use nalgebra::{Point3, UnitQuaternion, Vector3};
use sim_types::{DevicePose, Pose, Timestamp};

use crate::error::{DeviceError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Where a device is mounted.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PortalSetup {
    /// Portal identifier.
    pub id: u32,
    /// Rail index; the middle rail is 0.
    pub rail: i32,
    /// Position along the rail, mm from its centre.
    pub rail_position: f64,
    /// Flip about the rail axis, degrees.
    pub flip_angle: f64,
    /// Tilt about the vertical axis, degrees.
    pub tilt_angle: f64,
    /// Spacing between neighbouring rails, mm.
    pub rail_spacing: f64,
    /// Serial port of the device in this portal.
    pub com_port: String,
}

impl Default for PortalSetup {
    fn default() -> Self {
        Self {
            id: 0,
            rail: 0,
            rail_position: 0.0,
            flip_angle: 0.0,
            tilt_angle: 0.0,
            rail_spacing: 100.0,
            com_port: String::new(),
        }
    }
}

impl PortalSetup {
    /// A portal on `rail` at `rail_position` mm.
    #[must_use]
    pub fn on_rail(id: u32, rail: i32, rail_position: f64) -> Self {
        Self {
            id,
            rail,
            rail_position,
            ..Self::default()
        }
    }

    /// Set flip and tilt, in degrees.
    #[must_use]
    pub fn with_angles(mut self, flip_angle: f64, tilt_angle: f64) -> Self {
        self.flip_angle = flip_angle;
        self.tilt_angle = tilt_angle;
        self
    }

    /// Set the serial port.
    #[must_use]
    pub fn with_com_port(mut self, com_port: impl Into<String>) -> Self {
        self.com_port = com_port.into();
        self
    }

    /// Pose of the device base in the world.
    #[must_use]
    pub fn base_pose(&self) -> Pose {
        let position = Point3::new(
            self.rail_position,
            0.0,
            f64::from(self.rail) * self.rail_spacing,
        );
        Pose::from_euler_degrees(position, Vector3::new(self.flip_angle, 0.0, self.tilt_angle))
    }

    /// Device pose for a set of joint readings.
    ///
    /// `max_jaw_opening` is the hardware's full jaw travel in radians; the
    /// grip is the reading as a fraction of it.
    #[must_use]
    pub fn forward_kinematics(&self, angles: &DeviceAngles, max_jaw_opening: f64) -> DevicePose {
        let base = self.base_pose();
        let joint = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), angles.yaw)
            * UnitQuaternion::from_axis_angle(&Vector3::x_axis(), angles.pitch)
            * UnitQuaternion::from_axis_angle(&Vector3::z_axis(), angles.roll);
        let orientation = base.rotation * joint;
        let position = base.position + orientation * Vector3::new(0.0, 0.0, -angles.insertion);

        let grip = if max_jaw_opening > 0.0 {
            (angles.jaw_opening / max_jaw_opening).clamp(0.0, 1.0)
        } else {
            0.0
        };

        DevicePose::at(Pose::from_position_rotation(position, orientation))
            .with_grip(grip)
            .with_timestamp(angles.timestamp)
    }

    /// Validate the mounting.
    ///
    /// # Errors
    ///
    /// Returns an error if any value is non-finite, an angle is outside
    /// `[-180, 180]` degrees, or the rail spacing is not positive.
    pub fn validate(&self) -> Result<()> {
        let values = [self.rail_position, self.flip_angle, self.tilt_angle, self.rail_spacing];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(DeviceError::invalid_config(format!(
                "portal {} has a non-finite setting",
                self.id
            )));
        }
        for (name, angle) in [("flip", self.flip_angle), ("tilt", self.tilt_angle)] {
            if angle.abs() > 180.0 {
                return Err(DeviceError::invalid_config(format!(
                    "portal {} {name} angle {angle} is outside [-180, 180]",
                    self.id
                )));
            }
        }
        if self.rail_spacing <= 0.0 {
            return Err(DeviceError::invalid_config("rail spacing must be positive"));
        }
        Ok(())
    }
}

impl std::fmt::Display for PortalSetup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "portal {} on rail {} at {} mm (flip {}°, tilt {}°)",
            self.id, self.rail, self.rail_position, self.flip_angle, self.tilt_angle
        )?;
        if !self.com_port.is_empty() {
            write!(f, " on {}", self.com_port)?;
        }
        Ok(())
    }
}

/// Raw joint readings from an articulated device.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceAngles {
    /// Rotation about the portal's vertical axis, radians.
    pub yaw: f64,
    /// Rotation about the portal's horizontal axis, radians.
    pub pitch: f64,
    /// Rotation about the shaft, radians.
    pub roll: f64,
    /// Shaft insertion depth, mm.
    pub insertion: f64,
    /// Jaw opening, radians.
    pub jaw_opening: f64,
    /// Sample time.
    pub timestamp: Timestamp,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_base_pose_follows_rail() {
        let portal = PortalSetup::on_rail(1, -1, 50.0);
        let base = portal.base_pose();
        assert_relative_eq!(base.position, Point3::new(50.0, 0.0, -100.0));
        assert!(base.is_normalized());
    }

    #[test]
    fn test_insertion_moves_tip_down_the_shaft() {
        let portal = PortalSetup::default();
        let angles = DeviceAngles {
            insertion: 30.0,
            ..DeviceAngles::default()
        };
        let pose = portal.forward_kinematics(&angles, 1.0);
        assert_relative_eq!(pose.position, Point3::new(0.0, 0.0, -30.0), epsilon = 1e-12);
    }

    #[test]
    fn test_pitch_swings_the_tip() {
        let portal = PortalSetup::default();
        let angles = DeviceAngles {
            pitch: FRAC_PI_2,
            insertion: 10.0,
            ..DeviceAngles::default()
        };
        let pose = portal.forward_kinematics(&angles, 1.0);
        // Rotating -Z by +90° about X gives +Y.
        assert_relative_eq!(pose.position, Point3::new(0.0, 10.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_grip_is_fraction_of_travel() {
        let portal = PortalSetup::default();
        let half = DeviceAngles {
            jaw_opening: 0.25,
            ..DeviceAngles::default()
        };
        assert_relative_eq!(portal.forward_kinematics(&half, 0.5).grip, 0.5);

        let over = DeviceAngles {
            jaw_opening: 2.0,
            ..DeviceAngles::default()
        };
        assert_eq!(portal.forward_kinematics(&over, 0.5).grip, 1.0);
        assert_eq!(portal.forward_kinematics(&over, 0.0).grip, 0.0);
    }

    #[test]
    fn test_validation() {
        assert!(PortalSetup::default().validate().is_ok());
        assert!(PortalSetup::default().with_angles(200.0, 0.0).validate().is_err());
        assert!(PortalSetup::on_rail(0, 0, f64::NAN).validate().is_err());
    }

    #[test]
    fn test_display() {
        let portal = PortalSetup::on_rail(2, 1, 12.5).with_com_port("COM3");
        assert_eq!(
            portal.to_string(),
            "portal 2 on rail 1 at 12.5 mm (flip 0°, tilt 0°) on COM3"
        );
    }
}
