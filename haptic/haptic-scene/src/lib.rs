//! Haptic grasper scene.
//!
//! Puts the pieces together: a [`SceneConfig`] and a device go into a
//! [`SceneBuilder`], which validates everything once and returns a
//! [`HapticScene`]. Each [`HapticScene::step`] samples the device, moves the
//! grasper towards it, resolves contact with the obstacles and sends the
//! resulting force back.
//!
//! # Example
//!
//! ```
//! use haptic_device::{EmulatedDevice, PolledDevice};
//! use haptic_scene::{SceneBuilder, SceneConfig};
//! use nalgebra::{Point3, Vector3};
//!
//! // Lower the device towards the floor for half a second.
//! let device = EmulatedDevice::linear(
//!     Point3::new(-200.0, 0.0, 80.0),
//!     Vector3::new(0.0, 0.0, -40.0),
//!     0.5,
//!     0.0,
//! );
//!
//! let mut scene = SceneBuilder::new(SceneConfig::reference_grasper_floor())
//!     .with_device(PolledDevice::new(device))
//!     .build()
//!     .unwrap();
//!
//! for _ in 0..100 {
//!     scene.step();
//! }
//! assert_eq!(scene.stats().ticks, 100);
//! ```
//!
//! # Determinism
//!
//! With [`SceneConfig::offline`] the solver has no wall-clock deadline and a
//! scene fed the same pose sequence produces the same trajectory, bit for
//! bit.
//!
//! # Features
//!
//! - `parallel`: narrow phase fans out over rayon.
//! - `serde`: [`SceneConfig`] and [`SimulationStats`] serialize.

#![doc(html_root_url = "https://docs.rs/haptic-scene/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn, // Many methods can't be const due to nalgebra
    clippy::cast_possible_truncation,
    clippy::module_name_repetitions,
)]

mod config;
mod error;
mod runner;
mod scene;
mod stats;

pub use config::SceneConfig;
pub use error::{Result, SceneError};
pub use runner::{FixedStepRunner, RunSummary};
pub use scene::{HapticScene, SceneBuilder, TickReport};
pub use stats::SimulationStats;
