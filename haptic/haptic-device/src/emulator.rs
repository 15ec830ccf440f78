//! Scripted stand-in for a haptic device.
//!
//! [`EmulatedDevice`] plays a pose script at a fixed sample period and
//! records every force it is asked to render, so scenes can run headless and
//! tests can check what the user would have felt.
//!
//! With a [`FloorEmulation`] the emulator also renders a spring floor on its
//! own, without any simulation attached. That mode is for bringing up a new
//! device: the handle should feel a wall at the floor height.

use std::sync::Arc;

use nalgebra::{Point3, UnitQuaternion, Vector3};
use parking_lot::Mutex;
use sim_types::{DevicePose, FeedbackForce, Pose, Timestamp};
use tracing::info;

use crate::device::HapticDevice;
use crate::error::{DeviceError, Result};
use crate::portal::{DeviceAngles, PortalSetup};

#[derive(Debug, Default)]
struct LogInner {
    forces: Vec<FeedbackForce>,
    emulated: Vec<Vector3<f64>>,
    releases: usize,
}

/// Shared record of what an emulator rendered.
///
/// Cloning shares the record, so a test can keep a handle while the device
/// moves into an acquisition thread.
#[derive(Debug, Clone, Default)]
pub struct ForceLog {
    inner: Arc<Mutex<LogInner>>,
}

impl ForceLog {
    /// Number of forces written.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().forces.len()
    }

    /// Whether nothing was written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().forces.is_empty()
    }

    /// Every force written, oldest first.
    #[must_use]
    pub fn forces(&self) -> Vec<FeedbackForce> {
        self.inner.lock().forces.clone()
    }

    /// Newest force written.
    #[must_use]
    pub fn last(&self) -> Option<FeedbackForce> {
        self.inner.lock().forces.last().copied()
    }

    /// Forces produced by floor emulation.
    #[must_use]
    pub fn emulated(&self) -> Vec<Vector3<f64>> {
        self.inner.lock().emulated.clone()
    }

    /// Number of release commands.
    #[must_use]
    pub fn releases(&self) -> usize {
        self.inner.lock().releases
    }
}

/// Spring floor rendered by the emulator itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloorEmulation {
    /// Floor height along the device Y axis.
    pub height: f64,
    /// Spring stiffness.
    pub stiffness: f64,
    /// Rotation from the floor frame into the device frame.
    pub rotation: UnitQuaternion<f64>,
}

impl FloorEmulation {
    /// Force for a handle at `position`, if it is below the floor.
    #[must_use]
    pub fn force_at(&self, position: &Point3<f64>) -> Option<Vector3<f64>> {
        let depth = self.height - position.y;
        (depth > 0.0).then(|| self.rotation * Vector3::new(0.0, self.stiffness * depth, 0.0))
    }
}

type Script = Box<dyn FnMut(f64) -> DevicePose + Send>;

/// Scripted device.
pub struct EmulatedDevice {
    name: String,
    period: f64,
    samples: usize,
    script: Script,
    disconnect_after: Option<usize>,
    floor: Option<FloorEmulation>,
    in_contact: bool,
    unplugged: bool,
    log: ForceLog,
}

impl std::fmt::Debug for EmulatedDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmulatedDevice")
            .field("name", &self.name)
            .field("period", &self.period)
            .field("samples", &self.samples)
            .field("disconnect_after", &self.disconnect_after)
            .finish_non_exhaustive()
    }
}

impl EmulatedDevice {
    /// Play `script(t)` with samples `period` seconds apart.
    pub fn new(period: f64, script: impl FnMut(f64) -> DevicePose + Send + 'static) -> Self {
        Self {
            name: "emulator".to_string(),
            period,
            samples: 0,
            script: Box::new(script),
            disconnect_after: None,
            floor: None,
            in_contact: false,
            unplugged: false,
            log: ForceLog::default(),
        }
    }

    /// Hold one pose forever.
    #[must_use]
    pub fn stationary(pose: DevicePose) -> Self {
        Self::new(0.01, move |_| pose)
    }

    /// Move from `start` with constant `velocity` for `duration` seconds,
    /// then hold. The grip stays at `grip`.
    #[must_use]
    pub fn linear(start: Point3<f64>, velocity: Vector3<f64>, duration: f64, grip: f64) -> Self {
        Self::new(0.01, move |t| {
            let position = start + velocity * t.min(duration);
            DevicePose::at(Pose::from_position(position)).with_grip(grip)
        })
    }

    /// Play a joint-angle script through a portal's forward kinematics.
    #[must_use]
    pub fn from_angles(
        period: f64,
        portal: PortalSetup,
        max_jaw_opening: f64,
        mut script: impl FnMut(f64) -> DeviceAngles + Send + 'static,
    ) -> Self {
        let name = format!("emulator@portal{}", portal.id);
        Self::new(period, move |t| portal.forward_kinematics(&script(t), max_jaw_opening))
            .with_name(name)
    }

    /// Set the sample period.
    #[must_use]
    pub fn with_period(mut self, period: f64) -> Self {
        self.period = period;
        self
    }

    /// Set the device name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Render a spring floor without a simulation.
    #[must_use]
    pub fn with_floor(mut self, floor: FloorEmulation) -> Self {
        self.floor = Some(floor);
        self
    }

    /// Unplug after `samples` successful reads. Writes keep working until
    /// the first failed read.
    #[must_use]
    pub fn disconnect_after(mut self, samples: usize) -> Self {
        self.disconnect_after = Some(samples);
        self
    }

    /// Handle on the force record.
    #[must_use]
    pub fn force_log(&self) -> ForceLog {
        self.log.clone()
    }

    /// Samples delivered so far.
    #[must_use]
    pub fn samples(&self) -> usize {
        self.samples
    }

    fn emulate_floor(&mut self, pose: &DevicePose) {
        let Some(floor) = self.floor else {
            return;
        };
        match floor.force_at(&pose.position) {
            Some(force) => {
                if !self.in_contact {
                    info!(device = %self.name, "first contact");
                }
                self.in_contact = true;
                self.log.inner.lock().emulated.push(force);
            }
            None if self.in_contact => {
                self.in_contact = false;
                self.log.inner.lock().releases += 1;
            }
            None => {}
        }
    }
}

impl HapticDevice for EmulatedDevice {
    fn name(&self) -> &str {
        &self.name
    }

    #[allow(clippy::cast_precision_loss)]
    fn read_sample(&mut self) -> Result<DevicePose> {
        if self.disconnect_after.is_some_and(|n| self.samples >= n) {
            self.unplugged = true;
        }
        if self.unplugged {
            return Err(DeviceError::not_connected(self.name.clone()));
        }
        let t = self.samples as f64 * self.period;
        let pose = (self.script)(t).with_timestamp(Timestamp::from_secs_f64(t));
        self.samples += 1;
        self.emulate_floor(&pose);
        Ok(pose)
    }

    fn write_force(&mut self, force: &FeedbackForce) -> Result<()> {
        if self.unplugged {
            return Err(DeviceError::not_connected(self.name.clone()));
        }
        self.log.inner.lock().forces.push(*force);
        Ok(())
    }

    fn release_force(&mut self) -> Result<()> {
        self.log.inner.lock().releases += 1;
        Ok(())
    }
}
