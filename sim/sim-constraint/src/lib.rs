//! Contact constraints and the projected Gauss-Seidel solver.
//!
//! This crate turns the active contacts of one tick into a mixed
//! complementarity problem and solves it for contact impulses.
//!
//! - [`ConstraintProblem`] - three rows per contact, the Delassus matrix
//!   `A = J M⁻¹ Jᵀ`, the pre-contact velocity `b = J v` and row targets
//! - [`PgsSolver`] - per-contact block Gauss-Seidel with exact friction disk
//!   projection, an iteration cap and an optional wall-clock deadline
//! - [`SolveResult`] - impulses plus convergence diagnostics
//!
//! # Complementarity
//!
//! For every contact with normal velocity `w_n`, target `t_n` and impulse `λ_n`:
//!
//! ```text
//! λ_n ≥ 0,   w_n - t_n ≥ 0,   λ_n (w_n - t_n) = 0
//! ‖λ_t‖ ≤ μ λ_n
//! ```
//!
//! Contacts are processed in `(body_a, body_b, feature)` order, so the
//! result of a cold-started solve depends only on the contact set.
//!
//! # Example
//!
//! ```
//! use sim_constraint::{ConstraintProblem, PgsConfig, PgsSolver, SolverBody};
//! use sim_contact::{ContactPoint, FrictionCone, ProximityParams};
//! use sim_types::{BodyId, Twist};
//! use nalgebra::{Matrix3, Point3, Vector3};
//!
//! // A unit-mass ball moving down at 1 m/s onto a fixed floor.
//! let contact = ContactPoint::new(
//!     BodyId::new(1),
//!     BodyId::new(0),
//!     Point3::origin(),
//!     Vector3::y(),
//!     0.0,
//!     0,
//! )
//! .classify(&ProximityParams::reference_scene());
//!
//! let resolve = |id: BodyId| match id.raw() {
//!     0 => Some(SolverBody::fixed(id, Point3::new(0.0, -1.0, 0.0))),
//!     1 => Some(SolverBody {
//!         id,
//!         center_of_mass: Point3::new(0.0, 0.5, 0.0),
//!         twist: Twist::linear(Vector3::new(0.0, -1.0, 0.0)),
//!         inv_mass: 1.0,
//!         inv_inertia: Matrix3::identity(),
//!     }),
//!     _ => None,
//! };
//!
//! let problem = ConstraintProblem::assemble(&[contact], resolve, FrictionCone::new(0.5), 0.01);
//! let mut solver = PgsSolver::new(PgsConfig::default());
//! let result = solver.solve(&problem, None);
//!
//! assert!(result.converged);
//! assert!((result.impulse(0).normal - 1.0).abs() < 1e-6);
//! ```

#![doc(html_root_url = "https://docs.rs/sim-constraint/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,
    clippy::suboptimal_flops,
    clippy::many_single_char_names, // Solver notation (a, b, n, w)
)]

mod pgs;
mod problem;

pub use pgs::{ContactImpulse, ContactSolver, PgsConfig, PgsSolver, SolveResult};
pub use problem::{
    ConstraintProblem, ConstraintRow, RowKind, SolverBody, VelocityDelta, ROWS_PER_CONTACT,
};

// Re-export types needed to build a problem
pub use sim_types::{BodyId, Twist};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Matrix3, Point3, Vector3};
    use sim_contact::{ContactPoint, FrictionCone, ProximityParams};

    /// A box resting on four corners stays at rest after the velocity update.
    #[test]
    fn test_four_corner_support_cancels_approach() {
        let params = ProximityParams::reference_scene();
        let corners = [(-0.5, -0.5), (0.5, -0.5), (-0.5, 0.5), (0.5, 0.5)];
        let contacts: Vec<ContactPoint> = corners
            .iter()
            .enumerate()
            .map(|(i, &(x, z))| {
                ContactPoint::new(
                    BodyId::new(1),
                    BodyId::new(0),
                    Point3::new(x, 0.0, z),
                    Vector3::y(),
                    0.0,
                    u32::try_from(i).unwrap(),
                )
                .classify(&params)
            })
            .collect();

        let resolve = |id: BodyId| match id.raw() {
            0 => Some(SolverBody::fixed(id, Point3::new(0.0, -1.0, 0.0))),
            1 => Some(SolverBody {
                id,
                center_of_mass: Point3::new(0.0, 0.5, 0.0),
                twist: Twist::linear(Vector3::new(0.0, -0.1, 0.0)),
                inv_mass: 0.5,
                inv_inertia: Matrix3::identity() * 3.0,
            }),
            _ => None,
        };

        let problem = ConstraintProblem::assemble(&contacts, resolve, FrictionCone::new(0.3), 0.01);
        assert_eq!(problem.dimension(), 12);

        let mut solver = PgsSolver::new(PgsConfig::default().with_max_iterations(500));
        let result = solver.solve(&problem, None);

        let deltas = problem.velocity_deltas(&result.lambda);
        assert_eq!(deltas.len(), 1);
        assert_relative_eq!(deltas[0].linear.y, 0.1, epsilon = 1e-4);
        assert!(deltas[0].angular.norm() < 1e-4);

        let total: f64 = result.impulses().map(|i| i.normal).sum();
        assert_relative_eq!(total, 0.2, epsilon = 1e-4);
    }
}
