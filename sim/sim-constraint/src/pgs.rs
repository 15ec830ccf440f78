//! Projected Gauss-Seidel (PGS) solver for the contact problem.
//!
//! The solver sweeps contacts in problem order. For each contact it updates the
//! normal impulse, clamps it to be non-negative, then updates both tangential
//! impulses and projects them jointly onto the friction disk of radius
//! `μ λ_n`:
//!
//! ```text
//! λ_n ← max(0, λ_n - ω (w_n - target_n) / A_nn)
//! λ_t ← λ_t - ω w_t / A_tt                      (t = t1, t2)
//! (λ_t1, λ_t2) ← proj_disk(μ λ_n)
//! ```
//!
//! where `w = b + A λ` is evaluated with the latest impulses (Gauss-Seidel).
//! Iteration stops when the largest impulse change of a sweep falls below the
//! tolerance, when the iteration cap is reached, or when the tick deadline
//! passes. The last two cases return the best iterate with `converged` unset.
//!
//! # Example
//!
//! ```
//! use sim_constraint::{ConstraintProblem, PgsConfig, PgsSolver};
//!
//! let problem = ConstraintProblem::empty();
//! let mut solver = PgsSolver::new(PgsConfig::default());
//! let result = solver.solve(&problem, None);
//! assert!(result.converged);
//! assert_eq!(result.iterations_used, 0);
//! ```

use std::time::Instant;

use hashbrown::HashMap;
use nalgebra::DVector;
use sim_types::BodyId;
use tracing::debug;

use crate::problem::ROWS_PER_CONTACT;
use crate::ConstraintProblem;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration for the PGS contact solver.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PgsConfig {
    /// Maximum number of sweeps.
    pub max_iterations: usize,

    /// Convergence tolerance on the largest impulse change of a sweep.
    pub tolerance: f64,

    /// Minimum sweeps before convergence is checked.
    pub min_iterations: usize,

    /// SOR factor.
    /// - 1.0: Standard Gauss-Seidel
    /// - < 1.0: Under-relaxation (more stable)
    /// - > 1.0: Over-relaxation
    pub sor_factor: f64,

    /// Added to the diagonal of the Delassus matrix.
    pub regularization: f64,

    /// Start from the previous tick's impulses of matching contacts.
    pub warm_starting: bool,

    /// Scaling applied to warm start impulses (0-1).
    pub warm_start_factor: f64,
}

impl Default for PgsConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-6,
            min_iterations: 1,
            sor_factor: 1.0,
            regularization: 1e-9,
            warm_starting: false,
            warm_start_factor: 0.9,
        }
    }
}

impl PgsConfig {
    /// Settings of the grasper-on-floor scene: tolerance 0.001, up to
    /// 10000 sweeps, cold start.
    #[must_use]
    pub fn reference_scene() -> Self {
        Self {
            max_iterations: 10_000,
            tolerance: 1e-3,
            ..Self::default()
        }
    }

    /// Few sweeps, warm started. For tight tick budgets.
    #[must_use]
    pub fn realtime() -> Self {
        Self {
            max_iterations: 30,
            tolerance: 1e-4,
            warm_starting: true,
            ..Self::default()
        }
    }

    /// Set the iteration cap.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the convergence tolerance.
    #[must_use]
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the minimum number of sweeps.
    #[must_use]
    pub fn with_min_iterations(mut self, min_iterations: usize) -> Self {
        self.min_iterations = min_iterations;
        self
    }

    /// Set the SOR factor.
    #[must_use]
    pub fn with_sor_factor(mut self, sor_factor: f64) -> Self {
        self.sor_factor = sor_factor;
        self
    }

    /// Enable or disable warm starting.
    #[must_use]
    pub fn with_warm_starting(mut self, enabled: bool) -> Self {
        self.warm_starting = enabled;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero iteration cap, a non-positive tolerance,
    /// an SOR factor outside `(0, 2)`, negative regularization, or a warm
    /// start factor outside `[0, 1]`.
    pub fn validate(&self) -> sim_types::Result<()> {
        if self.max_iterations == 0 {
            return Err(sim_types::SimError::invalid_config(
                "solver needs at least one iteration",
            ));
        }
        if !(self.tolerance > 0.0 && self.tolerance.is_finite()) {
            return Err(sim_types::SimError::invalid_config(format!(
                "solver tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if !(self.sor_factor > 0.0 && self.sor_factor < 2.0) {
            return Err(sim_types::SimError::invalid_config(format!(
                "SOR factor must be in (0, 2), got {}",
                self.sor_factor
            )));
        }
        if self.regularization < 0.0 || !self.regularization.is_finite() {
            return Err(sim_types::SimError::invalid_config(
                "regularization must be finite and non-negative",
            ));
        }
        if !(0.0..=1.0).contains(&self.warm_start_factor) {
            return Err(sim_types::SimError::invalid_config(
                "warm start factor must be in [0, 1]",
            ));
        }
        Ok(())
    }
}

/// Impulses of one contact.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactImpulse {
    /// Normal impulse (non-negative).
    pub normal: f64,
    /// Impulse along the first tangent.
    pub tangent1: f64,
    /// Impulse along the second tangent.
    pub tangent2: f64,
}

impl ContactImpulse {
    /// Magnitude of the tangential impulse.
    #[must_use]
    pub fn tangential(&self) -> f64 {
        self.tangent1.hypot(self.tangent2)
    }
}

/// Outcome of a solve.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveResult {
    /// Impulses, three per contact in problem order.
    pub lambda: DVector<f64>,
    /// Sweeps performed.
    pub iterations_used: usize,
    /// Largest impulse change of the last sweep.
    pub residual: f64,
    /// Whether the tolerance was reached.
    pub converged: bool,
    /// Whether iteration stopped because the tick deadline passed.
    pub deadline_hit: bool,
    /// Contacts initialized from the previous tick's impulses.
    pub warm_started: usize,
}

impl SolveResult {
    /// Result for a problem with no rows.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            lambda: DVector::zeros(0),
            iterations_used: 0,
            residual: 0.0,
            converged: true,
            deadline_hit: false,
            warm_started: 0,
        }
    }

    /// Number of contacts covered by the result.
    #[must_use]
    pub fn contact_count(&self) -> usize {
        self.lambda.len() / ROWS_PER_CONTACT
    }

    /// Impulses of one contact.
    #[must_use]
    pub fn impulse(&self, contact: usize) -> ContactImpulse {
        let base = contact * ROWS_PER_CONTACT;
        if base + 2 >= self.lambda.len() {
            return ContactImpulse::default();
        }
        ContactImpulse {
            normal: self.lambda[base],
            tangent1: self.lambda[base + 1],
            tangent2: self.lambda[base + 2],
        }
    }

    /// Impulses of every contact.
    pub fn impulses(&self) -> impl Iterator<Item = ContactImpulse> + '_ {
        (0..self.contact_count()).map(|i| self.impulse(i))
    }
}

type ContactKey = (BodyId, BodyId, u32);

/// Projected Gauss-Seidel contact solver.
#[derive(Debug, Clone)]
pub struct PgsSolver {
    config: PgsConfig,
    warm_cache: HashMap<ContactKey, [f64; 3]>,
}

impl Default for PgsSolver {
    fn default() -> Self {
        Self::new(PgsConfig::default())
    }
}

impl PgsSolver {
    /// Create a solver.
    #[must_use]
    pub fn new(config: PgsConfig) -> Self {
        Self {
            config,
            warm_cache: HashMap::new(),
        }
    }

    /// Solver configuration.
    #[must_use]
    pub fn config(&self) -> &PgsConfig {
        &self.config
    }

    /// Forget cached impulses.
    pub fn clear_warm_start(&mut self) {
        self.warm_cache.clear();
    }

    /// Solve the problem.
    ///
    /// At least one sweep is always performed on a non-empty problem. After
    /// each sweep the deadline, if any, is checked; a passed deadline stops
    /// iteration and the current impulses are returned.
    pub fn solve(&mut self, problem: &ConstraintProblem, deadline: Option<Instant>) -> SolveResult {
        if problem.is_empty() {
            if self.config.warm_starting {
                self.warm_cache.clear();
            }
            return SolveResult::empty();
        }

        let n = problem.dimension();
        let contact_count = n / ROWS_PER_CONTACT;
        let a = problem.delassus();
        let b = problem.bias();
        let target = problem.target();
        let omega = self.config.sor_factor;

        let diagonal: Vec<f64> = (0..n)
            .map(|i| a[(i, i)] + self.config.regularization)
            .collect();

        let (mut lambda, warm_started) = self.initial_guess(problem);

        let mut iterations_used = 0;
        let mut residual = f64::INFINITY;
        let mut converged = false;
        let mut deadline_hit = false;

        while iterations_used < self.config.max_iterations {
            residual = 0.0;

            for c in 0..contact_count {
                let base = c * ROWS_PER_CONTACT;
                let mu = problem.friction(c).mu;

                let old_n = lambda[base];
                let new_n = if diagonal[base] > 0.0 {
                    let w = b[base] + a.row(base).dot(&lambda.transpose());
                    (old_n - omega * (w - target[base]) / diagonal[base]).max(0.0)
                } else {
                    0.0
                };
                lambda[base] = new_n;

                let old_t = (lambda[base + 1], lambda[base + 2]);
                for row in [base + 1, base + 2] {
                    if diagonal[row] > 0.0 {
                        let w = b[row] + a.row(row).dot(&lambda.transpose());
                        lambda[row] -= omega * (w - target[row]) / diagonal[row];
                    }
                }
                let (t1, t2) = project_disk(lambda[base + 1], lambda[base + 2], mu * new_n);
                lambda[base + 1] = t1;
                lambda[base + 2] = t2;

                residual = residual
                    .max((new_n - old_n).abs())
                    .max((t1 - old_t.0).abs())
                    .max((t2 - old_t.1).abs());
            }

            iterations_used += 1;

            if iterations_used >= self.config.min_iterations && residual < self.config.tolerance {
                converged = true;
                break;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                deadline_hit = true;
                break;
            }
        }

        if !converged {
            debug!(
                iterations = iterations_used,
                residual,
                deadline_hit,
                contacts = contact_count,
                "contact solve did not converge"
            );
        }

        if self.config.warm_starting {
            self.store_warm_start(problem, &lambda);
        }

        SolveResult {
            lambda,
            iterations_used,
            residual,
            converged,
            deadline_hit,
            warm_started,
        }
    }

    fn initial_guess(&self, problem: &ConstraintProblem) -> (DVector<f64>, usize) {
        let mut lambda = DVector::zeros(problem.dimension());
        if !self.config.warm_starting {
            return (lambda, 0);
        }

        let factor = self.config.warm_start_factor;
        let mut warm_started = 0;
        for (c, contact) in problem.contacts().iter().enumerate() {
            let Some(cached) = self.warm_cache.get(&contact.sort_key()) else {
                continue;
            };
            let base = c * ROWS_PER_CONTACT;
            let normal = (cached[0] * factor).max(0.0);
            let mu = problem.friction(c).mu;
            let (t1, t2) = project_disk(cached[1] * factor, cached[2] * factor, mu * normal);
            lambda[base] = normal;
            lambda[base + 1] = t1;
            lambda[base + 2] = t2;
            warm_started += 1;
        }
        (lambda, warm_started)
    }

    fn store_warm_start(&mut self, problem: &ConstraintProblem, lambda: &DVector<f64>) {
        self.warm_cache.clear();
        for (c, contact) in problem.contacts().iter().enumerate() {
            let base = c * ROWS_PER_CONTACT;
            self.warm_cache.insert(
                contact.sort_key(),
                [lambda[base], lambda[base + 1], lambda[base + 2]],
            );
        }
    }
}

/// A solver for assembled contact problems.
///
/// Implementations must be deterministic for identical problems and must
/// honour `deadline` at iteration boundaries.
pub trait ContactSolver: Send {
    /// Solve one problem.
    fn solve(&mut self, problem: &ConstraintProblem, deadline: Option<Instant>) -> SolveResult;

    /// Short name for logs and reports.
    fn name(&self) -> &'static str;
}

impl ContactSolver for PgsSolver {
    fn solve(&mut self, problem: &ConstraintProblem, deadline: Option<Instant>) -> SolveResult {
        PgsSolver::solve(self, problem, deadline)
    }

    fn name(&self) -> &'static str {
        "pgs"
    }
}

/// Project a tangential impulse pair onto the disk of the given radius.
fn project_disk(t1: f64, t2: f64, radius: f64) -> (f64, f64) {
    let magnitude = t1.hypot(t2);
    if magnitude <= radius {
        (t1, t2)
    } else if magnitude > 0.0 {
        let scale = radius.max(0.0) / magnitude;
        (t1 * scale, t2 * scale)
    } else {
        (0.0, 0.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::SolverBody;
    use approx::assert_relative_eq;
    use nalgebra::{Matrix3, Point3, Vector3};
    use proptest::prelude::*;
    use sim_contact::{ContactPoint, FrictionCone, ProximityParams};
    use sim_types::Twist;

    const DT: f64 = 0.01;

    fn problem_with(velocity: Vector3<f64>, distance: f64, mu: f64) -> ConstraintProblem {
        let contact = ContactPoint::new(
            BodyId::new(1),
            BodyId::new(0),
            Point3::origin(),
            Vector3::y(),
            distance,
            0,
        )
        .classify(&ProximityParams::reference_scene());

        let resolve = move |id: BodyId| match id.raw() {
            0 => Some(SolverBody::fixed(id, Point3::new(0.0, -1.0, 0.0))),
            1 => Some(SolverBody {
                id,
                center_of_mass: Point3::new(0.0, 0.5, 0.0),
                twist: Twist::linear(velocity),
                inv_mass: 1.0,
                inv_inertia: Matrix3::identity() * 2.5,
            }),
            _ => None,
        };

        ConstraintProblem::assemble(&[contact], resolve, FrictionCone::new(mu), DT)
    }

    fn tight() -> PgsConfig {
        PgsConfig::default().with_tolerance(1e-12).with_max_iterations(1000)
    }

    #[test]
    fn test_config_validation() {
        assert!(PgsConfig::default().validate().is_ok());
        assert!(PgsConfig::reference_scene().validate().is_ok());
        assert!(PgsConfig::realtime().validate().is_ok());
        assert!(PgsConfig::default().with_max_iterations(0).validate().is_err());
        assert!(PgsConfig::default().with_tolerance(0.0).validate().is_err());
        assert!(PgsConfig::default().with_sor_factor(2.5).validate().is_err());
    }

    #[test]
    fn test_approaching_contact_is_stopped() {
        let problem = problem_with(Vector3::new(0.0, -1.0, 0.0), 0.0, 0.5);
        let mut solver = PgsSolver::new(tight());
        let result = solver.solve(&problem, None);

        assert!(result.converged);
        assert_relative_eq!(result.impulse(0).normal, 1.0, epsilon = 1e-6);
        let w = problem.relative_velocity(&result.lambda);
        assert_relative_eq!(w[0], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_separating_contact_gets_no_impulse() {
        let problem = problem_with(Vector3::new(0.0, 1.0, 0.0), 0.0, 0.5);
        let mut solver = PgsSolver::new(tight());
        let result = solver.solve(&problem, None);

        assert_eq!(result.impulse(0).normal, 0.0);
        assert_eq!(result.impulse(0).tangential(), 0.0);
    }

    #[test]
    fn test_gap_allows_partial_approach() {
        // 0.005 gap at dt 0.01 allows closing at 0.5 m/s.
        let problem = problem_with(Vector3::new(0.0, -1.0, 0.0), 0.005, 0.5);
        let mut solver = PgsSolver::new(tight());
        let result = solver.solve(&problem, None);

        let w = problem.relative_velocity(&result.lambda);
        assert_relative_eq!(w[0], -0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_sliding_friction_stays_on_cone_boundary() {
        let mu = 0.1;
        let problem = problem_with(Vector3::new(3.0, -1.0, 0.0), 0.0, mu);
        let mut solver = PgsSolver::new(tight());
        let result = solver.solve(&problem, None);

        let impulse = result.impulse(0);
        assert!(impulse.normal > 0.0);
        assert_relative_eq!(impulse.tangential(), mu * impulse.normal, epsilon = 1e-6);
    }

    #[test]
    fn test_sticking_friction_cancels_slip() {
        let problem = problem_with(Vector3::new(0.01, -1.0, 0.0), 0.0, 1.0);
        let mut solver = PgsSolver::new(tight());
        let result = solver.solve(&problem, None);

        let impulse = result.impulse(0);
        assert!(impulse.tangential() < impulse.normal);
        let w = problem.relative_velocity(&result.lambda);
        assert!(w[1].abs() < 1e-6);
        assert!(w[2].abs() < 1e-6);
    }

    #[test]
    fn test_iteration_cap_reports_non_convergence() {
        let problem = problem_with(Vector3::new(3.0, -1.0, 0.0), 0.0, 0.5);
        let mut solver = PgsSolver::new(PgsConfig::default().with_max_iterations(1));
        let result = solver.solve(&problem, None);

        assert_eq!(result.iterations_used, 1);
        assert!(!result.converged);
        assert!(!result.deadline_hit);
    }

    #[test]
    fn test_passed_deadline_stops_after_first_sweep() {
        let problem = problem_with(Vector3::new(0.0, -1.0, 0.0), 0.0, 0.5);
        let mut solver = PgsSolver::new(tight());
        let result = solver.solve(&problem, Some(Instant::now()));

        assert_eq!(result.iterations_used, 1);
        assert!(result.deadline_hit);
        assert!(!result.converged);
        assert!(result.impulse(0).normal > 0.0);
    }

    #[test]
    fn test_warm_start_reuses_previous_impulses() {
        let problem = problem_with(Vector3::new(0.0, -1.0, 0.0), 0.0, 0.5);
        let config = tight().with_warm_starting(true);
        let config = PgsConfig {
            warm_start_factor: 1.0,
            ..config
        };
        let mut solver = PgsSolver::new(config);

        let cold = solver.solve(&problem, None);
        assert_eq!(cold.warm_started, 0);

        let warm = solver.solve(&problem, None);
        assert_eq!(warm.warm_started, 1);
        assert!(warm.iterations_used <= cold.iterations_used);
        assert_eq!(warm.iterations_used, 1);
    }

    #[test]
    fn test_cold_start_is_deterministic() {
        let problem = problem_with(Vector3::new(2.0, -1.0, 0.5), 0.0, 0.3);
        let mut first = PgsSolver::new(PgsConfig::reference_scene());
        let mut second = PgsSolver::new(PgsConfig::reference_scene());
        let a = first.solve(&problem, None);
        let b = second.solve(&problem, None);
        assert_eq!(a.lambda, b.lambda);
        assert_eq!(a.iterations_used, b.iterations_used);
    }

    #[test]
    fn test_solver_behind_trait_object() {
        let problem = problem_with(Vector3::new(0.0, -1.0, 0.0), 0.0, 0.3);
        let mut solver: Box<dyn ContactSolver> = Box::new(PgsSolver::default());
        assert_eq!(solver.name(), "pgs");
        let result = solver.solve(&problem, None);
        assert!(result.converged);
        assert!(result.impulse(0).normal > 0.0);
    }

    proptest! {
        #[test]
        fn prop_solution_is_feasible(
            vx in -5.0..5.0f64,
            vy in -5.0..5.0f64,
            vz in -5.0..5.0f64,
            mu in 0.0..1.5f64,
        ) {
            let problem = problem_with(Vector3::new(vx, vy, vz), 0.0, mu);
            let mut solver = PgsSolver::new(PgsConfig::reference_scene());
            let result = solver.solve(&problem, None);

            let impulse = result.impulse(0);
            prop_assert!(impulse.normal >= 0.0);
            prop_assert!(impulse.tangential() <= mu * impulse.normal + 1e-9);
        }
    }
}
