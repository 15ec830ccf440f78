//! Constraint wrench to device force.
//!
//! The tick hands over the net constraint force and torque on the tool root
//! in world coordinates. The mapper rotates them into the device frame,
//! scales them, low-pass filters them and saturates the result so the
//! device never receives a step it cannot render.

use nalgebra::{UnitQuaternion, Vector3};
use sim_types::{FeedbackForce, Timestamp};

use crate::error::{DeviceError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Force-feedback mapping parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FeedbackConfig {
    /// World force to device force.
    pub force_scale: f64,
    /// World torque to device torque.
    pub torque_scale: f64,
    /// Filter weight of the newest sample, in (0, 1]. 1 disables filtering.
    pub smoothing: f64,
    /// Largest force magnitude sent to the device.
    pub max_force: f64,
    /// Largest torque magnitude sent to the device.
    pub max_torque: f64,
    /// Filtered outputs below this magnitude are sent as exactly zero.
    pub release_threshold: f64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            force_scale: 1.0,
            torque_scale: 1.0,
            smoothing: 0.5,
            max_force: 10.0,
            max_torque: 1.0,
            release_threshold: 1e-6,
        }
    }
}

impl FeedbackConfig {
    /// Unfiltered, unscaled passthrough with the default limits.
    #[must_use]
    pub fn passthrough() -> Self {
        Self {
            smoothing: 1.0,
            ..Self::default()
        }
    }

    /// Set the force and torque scales.
    #[must_use]
    pub fn with_scale(mut self, force_scale: f64, torque_scale: f64) -> Self {
        self.force_scale = force_scale;
        self.torque_scale = torque_scale;
        self
    }

    /// Set the filter weight.
    #[must_use]
    pub fn with_smoothing(mut self, smoothing: f64) -> Self {
        self.smoothing = smoothing;
        self
    }

    /// Set the saturation limits.
    #[must_use]
    pub fn with_limits(mut self, max_force: f64, max_torque: f64) -> Self {
        self.max_force = max_force;
        self.max_torque = max_torque;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the smoothing is outside (0, 1] or a scale or
    /// limit is negative or non-finite.
    pub fn validate(&self) -> Result<()> {
        if !(self.smoothing > 0.0 && self.smoothing <= 1.0) {
            return Err(DeviceError::invalid_config(format!(
                "feedback smoothing {} is outside (0, 1]",
                self.smoothing
            )));
        }
        let non_negative = [
            ("force_scale", self.force_scale),
            ("torque_scale", self.torque_scale),
            ("max_force", self.max_force),
            ("max_torque", self.max_torque),
            ("release_threshold", self.release_threshold),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(DeviceError::invalid_config(format!(
                    "feedback {name} must be finite and non-negative, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Stateful wrench-to-force mapper.
#[derive(Debug, Clone)]
pub struct ForceFeedbackMapper {
    config: FeedbackConfig,
    force: Vector3<f64>,
    torque: Vector3<f64>,
}

impl ForceFeedbackMapper {
    /// Create a mapper with a zero filter state.
    #[must_use]
    pub fn new(config: FeedbackConfig) -> Self {
        Self {
            config,
            force: Vector3::zeros(),
            torque: Vector3::zeros(),
        }
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &FeedbackConfig {
        &self.config
    }

    /// Map one tick's net wrench.
    ///
    /// `device_rotation` takes device-frame vectors to world vectors; its
    /// inverse is applied to the wrench.
    #[must_use]
    pub fn map(
        &mut self,
        net_force: &Vector3<f64>,
        net_torque: &Vector3<f64>,
        device_rotation: &UnitQuaternion<f64>,
        timestamp: Timestamp,
    ) -> FeedbackForce {
        let to_device = device_rotation.inverse();
        let force = to_device * net_force * self.config.force_scale;
        let torque = to_device * net_torque * self.config.torque_scale;

        let alpha = self.config.smoothing;
        self.force += (force - self.force) * alpha;
        self.torque += (torque - self.torque) * alpha;
        if !self.force.iter().chain(self.torque.iter()).all(|v| v.is_finite()) {
            self.reset();
        }

        let force = saturate(self.force, self.config.max_force, self.config.release_threshold);
        let torque = saturate(self.torque, self.config.max_torque, self.config.release_threshold);
        FeedbackForce::new(force, torque, timestamp)
    }

    /// Clear the filter state.
    pub fn reset(&mut self) {
        self.force = Vector3::zeros();
        self.torque = Vector3::zeros();
    }
}

fn saturate(v: Vector3<f64>, max: f64, floor: f64) -> Vector3<f64> {
    let norm = v.norm();
    if norm <= floor {
        Vector3::zeros()
    } else if norm > max {
        v * (max / norm)
    } else {
        v
    }
}
