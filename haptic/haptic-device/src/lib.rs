//! Haptic device link for the simulation tick.
//!
//! A haptic device samples at its own rate (around 1 kHz) while the
//! simulation ticks at 100 Hz. This crate keeps the two apart:
//!
//! ```text
//!   HapticDevice (transport)        DeviceInterface (tick side)
//!   ┌────────────────────┐          ┌─────────────────────┐
//!   │ EmulatedDevice     │          │ PolledDevice<D>     │  same thread
//!   │ hardware driver    │─────────▶│ DeviceLink          │  own thread,
//!   └────────────────────┘          └─────────────────────┘  LatestValue
//! ```
//!
//! On top of that it provides portal kinematics for articulated devices
//! ([`PortalSetup`]) and the mapping from the constraint wrench on the tool
//! to the force the device renders ([`ForceFeedbackMapper`]).
//!
//! # Example
//!
//! ```
//! use haptic_device::{device_link, DeviceInterface, DeviceStatus, EmulatedDevice, LinkConfig};
//! use haptic_device::DevicePose;
//!
//! let (mut link, mut pump) = device_link(LinkConfig::default()).unwrap();
//! let mut device = EmulatedDevice::stationary(DevicePose::rest());
//!
//! pump.pump_once(&mut device);
//! assert_eq!(link.status(), DeviceStatus::Connected);
//! assert_eq!(link.sample().grip, 0.0);
//! ```
//!
//! # Errors
//!
//! Transport failures never reach the tick. They show up as
//! [`DeviceStatus`] changes and `tracing` warnings; the tick keeps the last
//! known pose and stops sending forces.

#![doc(html_root_url = "https://docs.rs/haptic-device/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn, // Many methods can't be const due to nalgebra
    clippy::module_name_repetitions,
)]

mod device;
mod emulator;
mod error;
mod feedback;
mod link;
mod portal;
mod slot;

pub use device::{DeviceInterface, DeviceStatus, HapticDevice, PolledDevice};
pub use emulator::{EmulatedDevice, FloorEmulation, ForceLog};
pub use error::{DeviceError, Result};
pub use feedback::{FeedbackConfig, ForceFeedbackMapper};
pub use link::{device_link, DeviceLink, DevicePump, DeviceThread, LinkConfig, PumpStats};
pub use portal::{DeviceAngles, PortalSetup};
pub use slot::LatestValue;

// Re-export types used in the public API
pub use sim_types::{Buttons, DevicePose, FeedbackForce, Timestamp};
