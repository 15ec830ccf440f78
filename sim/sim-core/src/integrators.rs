//! Semi-implicit Euler integration and the free-motion stage.
//!
//! A tick integrates in two halves:
//!
//! 1. [`advance_free`] updates the velocities of dynamic bodies from gravity
//!    and accumulated forces, leaving poses at the start of the tick.
//! 2. After the contact solve, [`SemiImplicitEuler::integrate_positions`]
//!    advances poses with the corrected velocities.
//!
//! ```text
//! v(t+dt) = v(t) + a(t) * dt
//! x(t+dt) = x(t) + v(t+dt) * dt
//! ```
//!
//! # Example
//!
//! ```
//! use sim_core::integrators::SemiImplicitEuler;
//! use sim_types::{RigidBodyState, Pose};
//! use nalgebra::{Point3, Vector3};
//!
//! let mut state = RigidBodyState::at_rest(Pose::from_position(Point3::new(0.0, 10.0, 0.0)));
//! let gravity = Vector3::new(0.0, -9.81, 0.0);
//!
//! SemiImplicitEuler::integrate(&mut state, gravity, Vector3::zeros(), 0.01);
//!
//! assert!(state.pose.position.y < 10.0);
//! assert!(state.twist.linear.y < 0.0);
//! ```

use nalgebra::{UnitQuaternion, Vector3};
use sim_types::{BodyId, Gravity, Pose, RigidBodyState};

use crate::world::World;

/// Semi-implicit Euler integration (symplectic Euler).
///
/// Updates velocity first, then uses the new velocity for position.
pub struct SemiImplicitEuler;

impl SemiImplicitEuler {
    /// Integrate velocity then position.
    pub fn integrate(
        state: &mut RigidBodyState,
        linear_accel: Vector3<f64>,
        angular_accel: Vector3<f64>,
        dt: f64,
    ) {
        Self::integrate_velocity(state, linear_accel, angular_accel, dt);
        Self::integrate_positions(state, dt);
    }

    /// `v += a * dt` for both linear and angular velocity.
    pub fn integrate_velocity(
        state: &mut RigidBodyState,
        linear_accel: Vector3<f64>,
        angular_accel: Vector3<f64>,
        dt: f64,
    ) {
        state.twist.linear += linear_accel * dt;
        state.twist.angular += angular_accel * dt;
    }

    /// Advance the pose with the current velocity. The orientation is
    /// renormalized afterwards.
    pub fn integrate_positions(state: &mut RigidBodyState, dt: f64) {
        state.pose.position += state.twist.linear * dt;
        integrate_rotation(&mut state.pose.rotation, &state.twist.angular, dt);
        state.pose.renormalize();
    }
}

/// Integrate rotation using a world-frame angular velocity.
///
/// `q(t+dt) = exp(ω dt) * q(t)`
pub fn integrate_rotation(rotation: &mut UnitQuaternion<f64>, omega: &Vector3<f64>, dt: f64) {
    if omega.norm() < 1e-12 {
        return;
    }
    let delta_q = UnitQuaternion::from_scaled_axis(omega * dt);
    *rotation = delta_q * *rotation;
}

/// A dynamic body after the free-motion stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FreeState {
    /// The body.
    pub id: BodyId,
    /// Pose at the start of the tick.
    pub start: Pose,
    /// State the body would reach this tick without contacts.
    pub tentative: RigidBodyState,
}

/// Result of the free-motion stage for one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FreeMotion {
    /// Dynamic bodies in world order.
    pub states: Vec<FreeState>,
}

impl FreeMotion {
    /// Free state of one body.
    #[must_use]
    pub fn get(&self, id: BodyId) -> Option<&FreeState> {
        self.states.iter().find(|s| s.id == id)
    }

    /// Merge another stage's states, replacing entries for the same body.
    pub fn merge(&mut self, other: Self) {
        for state in other.states {
            if let Some(existing) = self.states.iter_mut().find(|s| s.id == state.id) {
                *existing = state;
            } else {
                self.states.push(state);
            }
        }
    }
}

/// Apply gravity and accumulated forces to every dynamic body's velocity.
///
/// Poses are left at the start of the tick; the returned [`FreeMotion`]
/// records the contact-free tentative state of each body. Force
/// accumulators are cleared and attached bodies pick up the new velocities.
pub fn advance_free(world: &mut World, gravity: &Gravity, dt: f64) -> FreeMotion {
    let mut motion = FreeMotion::default();

    for body in world.bodies_mut().filter(|b| b.is_dynamic()) {
        let linear_accel =
            body.accumulated_force * body.mass_props.inverse_mass() + gravity.acceleration;
        let angular_accel = body
            .mass_props
            .world_inverse_inertia(&body.state.pose.rotation)
            * body.accumulated_torque;

        SemiImplicitEuler::integrate_velocity(&mut body.state, linear_accel, angular_accel, dt);
        body.clear_forces();

        let mut tentative = body.state;
        SemiImplicitEuler::integrate_positions(&mut tentative, dt);
        motion.states.push(FreeState {
            id: body.id,
            start: body.state.pose,
            tentative,
        });
    }

    world.sync_attached();
    motion
}
