//! Link between the acquisition loop and the simulation tick.
//!
//! ```text
//!   acquisition thread (≈1 kHz)              simulation tick (100 Hz)
//!  ┌───────────────────────┐   pose slot   ┌──────────────────────┐
//!  │ DevicePump            │ ────────────▶ │ DeviceLink::sample   │
//!  │  read_sample          │               │                      │
//!  │  write_force          │ ◀──────────── │ DeviceLink::apply_   │
//!  │  release_force        │  force slot   │   force              │
//!  └───────────────────────┘               └──────────────────────┘
//! ```
//!
//! Both directions go through a [`LatestValue`]: writers overwrite, readers
//! take the newest value and never wait on the other side's cadence.
//!
//! The pump forwards a force command once per new generation. A zero command
//! after a non-zero one releases the device instead of writing zeros, and
//! the device is always released when the pump stops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use sim_types::{DevicePose, FeedbackForce};
use tracing::{debug, info, warn};

use crate::device::{DeviceInterface, DeviceStatus, HapticDevice};
use crate::error::{DeviceError, Result};
use crate::slot::LatestValue;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Timing of the acquisition loop.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LinkConfig {
    /// Acquisition period.
    pub period: Duration,
    /// Age after which the newest sample counts as stale.
    pub stale_after: Duration,
    /// Log loop timing every this many iterations (`None` to disable).
    pub timing_dump_every: Option<usize>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(1),
            stale_after: Duration::from_millis(50),
            timing_dump_every: Some(100),
        }
    }
}

impl LinkConfig {
    /// Set the acquisition period.
    #[must_use]
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Set the staleness limit.
    #[must_use]
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the period is zero or the staleness limit is
    /// shorter than one period.
    pub fn validate(&self) -> Result<()> {
        if self.period.is_zero() {
            return Err(DeviceError::invalid_config("acquisition period must be positive"));
        }
        if self.stale_after < self.period {
            return Err(DeviceError::invalid_config(format!(
                "stale limit {:?} is shorter than the period {:?}",
                self.stale_after, self.period
            )));
        }
        if self.timing_dump_every == Some(0) {
            return Err(DeviceError::invalid_config("timing dump interval must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Shared {
    pose: LatestValue<DevicePose>,
    force: LatestValue<FeedbackForce>,
    connected: AtomicBool,
}

/// Create the two ends of a device link.
///
/// # Errors
///
/// Returns an error if `config` is invalid.
pub fn device_link(config: LinkConfig) -> Result<(DeviceLink, DevicePump)> {
    config.validate()?;
    let shared = Arc::new(Shared {
        pose: LatestValue::new(),
        force: LatestValue::new(),
        connected: AtomicBool::new(false),
    });
    let link = DeviceLink {
        shared: Arc::clone(&shared),
        last: DevicePose::rest(),
        seen: 0,
        stale_after: config.stale_after,
    };
    let pump = DevicePump {
        shared,
        config,
        force_seen: 0,
        rendering: false,
        stats: PumpStats::default(),
    };
    Ok((link, pump))
}

/// The tick's end of the link.
#[derive(Debug)]
pub struct DeviceLink {
    shared: Arc<Shared>,
    last: DevicePose,
    seen: u64,
    stale_after: Duration,
}

impl DeviceLink {
    /// Generation of the newest pose taken by [`DeviceInterface::sample`].
    #[must_use]
    pub fn seen_generation(&self) -> u64 {
        self.seen
    }
}

impl DeviceInterface for DeviceLink {
    fn sample(&mut self) -> DevicePose {
        if let Some((pose, generation)) = self.shared.pose.newer_than(self.seen) {
            self.last = pose;
            self.seen = generation;
        }
        self.last
    }

    fn apply_force(&mut self, force: FeedbackForce) {
        if self.status().accepts_force() {
            self.shared.force.publish(force);
        }
    }

    fn status(&self) -> DeviceStatus {
        if !self.shared.connected.load(Ordering::Acquire) {
            return DeviceStatus::Disconnected;
        }
        match self.shared.pose.written_at() {
            Some(at) if at.elapsed() <= self.stale_after => DeviceStatus::Connected,
            _ => DeviceStatus::Stale,
        }
    }
}

/// Counters kept by the acquisition loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    /// Loop iterations.
    pub loops: usize,
    /// Samples published.
    pub samples: usize,
    /// Failed reads.
    pub read_errors: usize,
    /// Force commands delivered.
    pub forces_written: usize,
    /// Failed force commands.
    pub write_errors: usize,
    /// Release commands delivered.
    pub releases: usize,
    /// Iterations that overran the period.
    pub overruns: usize,
}

/// The acquisition end of the link.
#[derive(Debug)]
pub struct DevicePump {
    shared: Arc<Shared>,
    config: LinkConfig,
    force_seen: u64,
    rendering: bool,
    stats: PumpStats,
}

impl DevicePump {
    /// Counters so far.
    #[must_use]
    pub fn stats(&self) -> PumpStats {
        self.stats
    }

    /// One acquisition iteration: read a sample, forward the newest force.
    pub fn pump_once(&mut self, device: &mut dyn HapticDevice) {
        self.stats.loops += 1;

        match device.read_sample() {
            Ok(pose) => {
                self.shared.pose.publish(pose);
                self.stats.samples += 1;
                if !self.shared.connected.swap(true, Ordering::AcqRel) {
                    info!(device = device.name(), "device connected");
                }
            }
            Err(err) => {
                self.stats.read_errors += 1;
                if err.is_disconnect() {
                    if self.shared.connected.swap(false, Ordering::AcqRel) {
                        warn!(device = device.name(), error = %err, "device disconnected");
                    }
                    self.rendering = false;
                } else {
                    warn!(device = device.name(), error = %err, "sample dropped");
                }
            }
        }

        if !self.shared.connected.load(Ordering::Acquire) {
            return;
        }
        let Some((force, generation)) = self.shared.force.newer_than(self.force_seen) else {
            return;
        };
        self.force_seen = generation;

        if force.is_zero() {
            if self.rendering {
                self.release(device);
            }
            return;
        }
        if !self.rendering {
            info!(device = device.name(), "first contact");
        }
        match device.write_force(&force) {
            Ok(()) => {
                self.stats.forces_written += 1;
                self.rendering = true;
            }
            Err(err) => {
                self.stats.write_errors += 1;
                warn!(device = device.name(), error = %err, "force command dropped");
            }
        }
    }

    fn release(&mut self, device: &mut dyn HapticDevice) {
        match device.release_force() {
            Ok(()) => self.stats.releases += 1,
            Err(err) => warn!(device = device.name(), error = %err, "force release failed"),
        }
        self.rendering = false;
    }

    /// Run the loop on its own thread until [`DeviceThread::stop`].
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Thread`] if the thread cannot be started.
    pub fn spawn<D: HapticDevice + 'static>(self, device: D) -> Result<DeviceThread> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("haptic-device".to_string())
            .spawn(move || self.run(device, &flag))
            .map_err(|e| DeviceError::Thread(e.to_string()))?;
        Ok(DeviceThread {
            stop,
            handle: Some(handle),
        })
    }

    #[allow(clippy::cast_possible_truncation)]
    fn run<D: HapticDevice>(mut self, mut device: D, stop: &AtomicBool) -> PumpStats {
        let period = self.config.period;
        let mut next = Instant::now();
        let mut busy = Duration::ZERO;

        while !stop.load(Ordering::Acquire) {
            let began = Instant::now();
            self.pump_once(&mut device);
            busy += began.elapsed();

            if let Some(every) = self.config.timing_dump_every {
                if self.stats.loops % every == 0 {
                    debug!(
                        device = device.name(),
                        loops = self.stats.loops,
                        mean_busy_us = (busy / every as u32).as_micros() as u64,
                        overruns = self.stats.overruns,
                        "device loop timing"
                    );
                    busy = Duration::ZERO;
                }
            }

            next += period;
            let now = Instant::now();
            if next > now {
                thread::sleep(next - now);
            } else {
                self.stats.overruns += 1;
                next = now;
            }
        }

        self.release(&mut device);
        self.shared.connected.store(false, Ordering::Release);
        info!(device = device.name(), loops = self.stats.loops, "device loop stopped");
        self.stats
    }
}

/// Handle on a running acquisition thread. Dropping it stops the thread.
#[derive(Debug)]
pub struct DeviceThread {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<PumpStats>>,
}

impl DeviceThread {
    /// Whether the loop is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the loop, release the device and collect its counters.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Thread`] if the loop panicked.
    pub fn stop(mut self) -> Result<PumpStats> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<PumpStats> {
        self.stop.store(true, Ordering::Release);
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| DeviceError::Thread("acquisition loop panicked".to_string())),
            None => Ok(PumpStats::default()),
        }
    }
}

impl Drop for DeviceThread {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            warn!(error = %err, "device thread did not stop cleanly");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::emulator::EmulatedDevice;
    use nalgebra::{Point3, Vector3};
    use sim_types::{Pose, Timestamp};

    fn push(y: f64) -> FeedbackForce {
        FeedbackForce::new(Vector3::new(0.0, y, 0.0), Vector3::zeros(), Timestamp::default())
    }

    fn moving_emulator() -> EmulatedDevice {
        EmulatedDevice::new(0.001, |t| {
            DevicePose::at(Pose::from_position(Point3::new(0.0, 0.0, -t)))
        })
    }

    #[test]
    fn test_config_validation() {
        assert!(LinkConfig::default().validate().is_ok());
        assert!(LinkConfig::default().with_period(Duration::ZERO).validate().is_err());
        assert!(LinkConfig::default()
            .with_stale_after(Duration::from_micros(10))
            .validate()
            .is_err());
    }

    #[test]
    fn test_link_before_first_sample() {
        let (mut link, _pump) = device_link(LinkConfig::default()).unwrap();
        assert_eq!(link.status(), DeviceStatus::Disconnected);
        assert_eq!(link.sample(), DevicePose::rest());
    }

    #[test]
    fn test_pump_publishes_newest_pose() {
        let (mut link, mut pump) = device_link(LinkConfig::default()).unwrap();
        let mut device = moving_emulator();

        pump.pump_once(&mut device);
        pump.pump_once(&mut device);
        let pose = link.sample();

        assert_eq!(link.status(), DeviceStatus::Connected);
        assert_eq!(link.seen_generation(), 2);
        assert_eq!(pose.position.z, -0.001);
    }

    #[test]
    fn test_force_is_written_once_per_command() {
        let (mut link, mut pump) = device_link(LinkConfig::default()).unwrap();
        let mut device = moving_emulator();
        let log = device.force_log();

        pump.pump_once(&mut device);
        link.apply_force(push(1.0));
        pump.pump_once(&mut device);
        pump.pump_once(&mut device);
        assert_eq!(log.len(), 1);

        link.apply_force(push(2.0));
        link.apply_force(push(3.0));
        pump.pump_once(&mut device);
        assert_eq!(log.len(), 2);
        assert_eq!(log.last().unwrap().force.y, 3.0);

        link.apply_force(FeedbackForce::zero());
        pump.pump_once(&mut device);
        assert_eq!(log.len(), 2);
        assert_eq!(log.releases(), 1);
        assert_eq!(pump.stats().forces_written, 2);
    }

    #[test]
    fn test_disconnect_replays_last_pose_and_drops_forces() {
        let (mut link, mut pump) = device_link(LinkConfig::default()).unwrap();
        let mut device = moving_emulator().disconnect_after(2);
        let log = device.force_log();

        pump.pump_once(&mut device);
        pump.pump_once(&mut device);
        let last = link.sample();
        pump.pump_once(&mut device);

        assert_eq!(link.status(), DeviceStatus::Disconnected);
        assert_eq!(link.sample(), last);
        link.apply_force(push(1.0));
        pump.pump_once(&mut device);
        assert!(log.is_empty());
        assert_eq!(pump.stats().read_errors, 2);
    }

    #[test]
    fn test_thread_runs_and_releases_on_stop() {
        let config = LinkConfig::default().with_period(Duration::from_micros(500));
        let (mut link, pump) = device_link(config).unwrap();
        let device = moving_emulator();
        let log = device.force_log();
        let thread = pump.spawn(device).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while link.seen_generation() == 0 && Instant::now() < deadline {
            link.sample();
            thread::sleep(Duration::from_millis(1));
        }
        assert!(link.seen_generation() > 0);
        assert!(thread.is_running());

        link.apply_force(push(1.0));
        while log.is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }

        let stats = thread.stop().unwrap();
        assert!(stats.loops > 0);
        assert_eq!(stats.forces_written, 1);
        assert_eq!(log.releases(), 1);
        assert_eq!(link.status(), DeviceStatus::Disconnected);
    }
}
