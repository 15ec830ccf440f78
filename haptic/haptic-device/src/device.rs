//! Device traits.
//!
//! Two sides of the same device:
//!
//! - [`HapticDevice`] is the transport: blocking reads and writes against
//!   hardware or an emulator, run at the device's own rate.
//! - [`DeviceInterface`] is what the simulation tick sees: a non-blocking
//!   view that always has a pose to hand out.

use sim_types::{DevicePose, FeedbackForce};
use tracing::warn;

use crate::error::Result;

/// Connection state as seen by the tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceStatus {
    /// Fresh samples are arriving.
    Connected,
    /// The device is connected but samples stopped arriving.
    Stale,
    /// The device is gone; the last pose is being replayed.
    Disconnected,
}

impl DeviceStatus {
    /// Whether forces are forwarded.
    #[must_use]
    pub fn accepts_force(self) -> bool {
        !matches!(self, Self::Disconnected)
    }
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connected => write!(f, "connected"),
            Self::Stale => write!(f, "stale"),
            Self::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// A device transport.
pub trait HapticDevice: Send {
    /// Name for logs.
    fn name(&self) -> &str;

    /// Read one sample.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NotConnected`](crate::DeviceError::NotConnected)
    /// when the device is gone, or a transport error.
    fn read_sample(&mut self) -> Result<DevicePose>;

    /// Command a force.
    ///
    /// # Errors
    ///
    /// Returns an error if the command could not be delivered.
    fn write_force(&mut self, force: &FeedbackForce) -> Result<()>;

    /// Stop rendering any force.
    ///
    /// # Errors
    ///
    /// Returns an error if the command could not be delivered.
    fn release_force(&mut self) -> Result<()>;
}

/// The tick's view of a device.
pub trait DeviceInterface: Send {
    /// Newest pose, or the last known one. Never blocks.
    fn sample(&mut self) -> DevicePose;

    /// Forward a force command. Never blocks; ignored while disconnected.
    fn apply_force(&mut self, force: FeedbackForce);

    /// Connection state.
    fn status(&self) -> DeviceStatus;
}

/// Runs a transport inline on the caller's thread.
///
/// Useful for emulators and offline replays, where a read is instantaneous
/// and a separate acquisition thread would only add nondeterminism.
#[derive(Debug)]
pub struct PolledDevice<D> {
    device: D,
    last: DevicePose,
    status: DeviceStatus,
}

impl<D: HapticDevice> PolledDevice<D> {
    /// Wrap a transport.
    #[must_use]
    pub fn new(device: D) -> Self {
        Self {
            device,
            last: DevicePose::rest(),
            status: DeviceStatus::Connected,
        }
    }

    /// The wrapped transport.
    #[must_use]
    pub fn device(&self) -> &D {
        &self.device
    }
}

impl<D: HapticDevice> DeviceInterface for PolledDevice<D> {
    fn sample(&mut self) -> DevicePose {
        match self.device.read_sample() {
            Ok(pose) => {
                self.last = pose;
                self.status = DeviceStatus::Connected;
            }
            Err(err) => {
                if self.status != DeviceStatus::Disconnected {
                    warn!(
                        device = self.device.name(),
                        error = %err,
                        "device lost, replaying last pose"
                    );
                }
                self.status = if err.is_disconnect() {
                    DeviceStatus::Disconnected
                } else {
                    DeviceStatus::Stale
                };
            }
        }
        self.last
    }

    fn apply_force(&mut self, force: FeedbackForce) {
        if !self.status.accepts_force() {
            return;
        }
        if let Err(err) = self.device.write_force(&force) {
            warn!(device = self.device.name(), error = %err, "force command dropped");
        }
    }

    fn status(&self) -> DeviceStatus {
        self.status
    }
}
