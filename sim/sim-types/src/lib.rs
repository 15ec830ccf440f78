//! Core types for haptic-coupled rigid-body simulation.
//!
//! This crate provides the data shared by every stage of the tick:
//!
//! - [`RigidBodyState`] - Position, orientation, velocity of rigid bodies
//! - [`MassProperties`] - Mass and inertia, including static (infinite) bodies
//! - [`JointLimits`] / [`JointState`] - Soft-clamped tool joints
//! - [`DevicePose`] / [`FeedbackForce`] - Samples exchanged with the input device
//! - [`SimulationConfig`] - Timestep, gravity and tick budget
//!
//! # Design Philosophy
//!
//! These types are **pure data**. They carry no collision or solver logic and
//! are the common language between the device link, the collision pipeline,
//! the constraint solver and the scene layer.
//!
//! # Coordinate System
//!
//! Haptic scenes use a Y-up, right-handed world: gravity points along -Y and
//! obstacles such as floors are extruded downward from `y = 0`.
//!
//! # Example
//!
//! ```
//! use sim_types::{RigidBodyState, Pose, Twist};
//! use nalgebra::Point3;
//!
//! let state = RigidBodyState::new(
//!     Pose::from_position(Point3::new(0.0, 1.0, 0.0)),
//!     Twist::zero(),
//! );
//!
//! assert_eq!(state.pose.position.y, 1.0);
//! assert!(state.pose.is_normalized());
//! ```

#![doc(html_root_url = "https://docs.rs/sim-types/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
    clippy::cast_precision_loss,       // u64 to f64 is fine for timestamps
    clippy::missing_errors_doc,        // Error docs added where non-obvious
)]

mod body;
mod config;
mod device;
mod dynamics;
mod error;
mod joint;

pub use body::{BodyId, MassProperties, Pose, RigidBodyState, Twist, NORMALIZATION_TOLERANCE};
pub use config::SimulationConfig;
pub use device::{Buttons, DevicePose, FeedbackForce, Timestamp};
pub use dynamics::Gravity;
pub use error::SimError;
pub use joint::{JointLimits, JointState};

// Re-export math types for convenience
pub use nalgebra::{Isometry3, Matrix3, Point3, UnitQuaternion, Vector3};

/// Result type for simulation operations.
pub type Result<T> = std::result::Result<T, SimError>;
