//! World, collision pipeline, articulated tool and contact response.
//!
//! This crate runs one fixed-timestep tick of a haptic contact simulation.
//! It builds on [`sim_types`] for state, [`sim_contact`] for contact
//! geometry and [`sim_constraint`] for the complementarity solve.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Stepper                               │
//! │  free motion → broad → narrow → assemble → solve → response │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         World                                │
//! │  Contains: dynamic, static and attached bodies               │
//! │  Provides: id allocation, owner lookup, attached sync        │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │               ArticulatedTool / RigidObstacle                │
//! │  Grasper shaft + jaws on a virtual coupling; static boxes    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use sim_core::{ArticulatedTool, RigidObstacle, Stepper, StepperConfig, ToolConfig, World};
//! use sim_types::{DevicePose, Pose};
//! use nalgebra::{Point3, Vector3};
//!
//! let mut world = World::new();
//! RigidObstacle::reference_floor().spawn(&mut world).unwrap();
//!
//! let config = ToolConfig::default()
//!     .with_offset_degrees(Point3::new(0.0, 0.0, 200.0), Vector3::new(0.0, -90.0, -90.0));
//! let device = DevicePose::at(Pose::from_position(Point3::new(-200.0, 0.0, 100.0)));
//! let mut tool = ArticulatedTool::spawn(&mut world, config, &device, 0.01).unwrap();
//!
//! let mut stepper = Stepper::new(StepperConfig::reference_scene()).unwrap();
//! for _ in 0..10 {
//!     let result = stepper.step_tool(&mut world, &mut tool, &device);
//!     assert_eq!(result.active_contacts(), 0);
//! }
//! ```
//!
//! # Ticks never fail
//!
//! Only construction returns errors. Solver non-convergence, degenerate
//! normals, residual penetration and missed deadlines are reported in
//! [`StepResult`] and logged through `tracing`.
//!
//! # Features
//!
//! - `parallel`: narrow-phase pairs are processed with rayon.
//! - `serde`: configuration types derive `Serialize`/`Deserialize`.

#![doc(html_root_url = "https://docs.rs/sim-core/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
)]

pub mod broad_phase;
pub mod integrators;
pub mod narrow_phase;
mod obstacle;
mod response;
mod stepper;
mod tool;
mod world;

pub use broad_phase::{
    Aabb, Axis, BroadPhase, BroadPhaseAlgorithm, BroadPhaseConfig, BroadPhaseDetector, BruteForce,
    PairQuery, SweepAndPrune,
};
pub use integrators::{advance_free, FreeMotion, FreeState, SemiImplicitEuler};
pub use narrow_phase::{surface_distance, NarrowPhase, NarrowPhaseOutput};
pub use obstacle::RigidObstacle;
pub use response::{ResponseApplier, ResponseConfig, ResponseReport};
pub use stepper::{SolveSummary, StepResult, Stepper, StepperConfig};
pub use tool::{
    ArticulatedTool, CouplingConfig, GrasperJaws, SoftLimitEvent, ToolConfig, ToolJoint,
};
pub use world::{Body, BodyKind, CollisionShape, World};

// Re-export types used in the public API
pub use sim_constraint::{ContactSolver, PgsConfig, PgsSolver};
pub use sim_contact::{ContactPoint, FrictionCone, ProximityParams};
pub use sim_types::{
    BodyId, DevicePose, Gravity, MassProperties, Pose, RigidBodyState, SimError, Twist,
};
