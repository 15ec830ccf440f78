//! One fixed-timestep tick of the contact pipeline.
//!
//! ```text
//! free motion → broad phase → narrow phase → assemble → solve → response
//! ```
//!
//! The stepper owns every stage and its per-tick caches (normal cache, warm
//! start). Stages are swappable through [`BroadPhase`] and
//! [`ContactSolver`]. A tick never fails: anomalies are reported in the
//! returned [`StepResult`].

use std::time::{Duration, Instant};

use nalgebra::Vector3;
use sim_constraint::{
    ContactImpulse, ContactSolver, ConstraintProblem, PgsConfig, PgsSolver, SolveResult,
};
use sim_contact::{ContactPoint, ProximityParams};
use sim_types::{BodyId, DevicePose, Gravity, SimError};
use tracing::debug;

use crate::broad_phase::{BroadPhase, BroadPhaseConfig, BroadPhaseDetector, PairQuery};
use crate::integrators::{advance_free, FreeMotion};
use crate::narrow_phase::NarrowPhase;
use crate::response::{ResponseApplier, ResponseConfig, ResponseReport};
use crate::tool::{ArticulatedTool, SoftLimitEvent};
use crate::world::World;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Settings for the contact pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StepperConfig {
    /// Timestep in seconds.
    pub timestep: f64,
    /// Gravity.
    pub gravity: Gravity,
    /// Contact thresholds and friction.
    pub proximity: ProximityParams,
    /// Solver settings.
    pub solver: PgsConfig,
    /// Position correction.
    pub response: ResponseConfig,
    /// Soft wall-clock budget for the solver.
    pub budget: Option<Duration>,
}

impl Default for StepperConfig {
    fn default() -> Self {
        Self {
            timestep: 0.01,
            gravity: Gravity::default(),
            proximity: ProximityParams::default(),
            solver: PgsConfig::default(),
            response: ResponseConfig::default(),
            budget: None,
        }
    }
}

impl StepperConfig {
    /// Settings of the grasper/floor scene.
    #[must_use]
    pub fn reference_scene() -> Self {
        Self {
            proximity: ProximityParams::reference_scene(),
            solver: PgsConfig::reference_scene(),
            ..Self::default()
        }
    }

    /// Validate every stage.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting.
    pub fn validate(&self) -> sim_types::Result<()> {
        if !(self.timestep.is_finite() && self.timestep > 0.0) {
            return Err(SimError::InvalidTimestep(self.timestep));
        }
        if !self.gravity.is_finite() {
            return Err(SimError::invalid_config("gravity must be finite"));
        }
        self.proximity.validate()?;
        self.solver.validate()?;
        self.response.validate()
    }
}

/// Summary of the solver call of one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SolveSummary {
    /// Sweeps performed.
    pub iterations: usize,
    /// Largest impulse change of the last sweep.
    pub residual: f64,
    /// Whether the tolerance was reached.
    pub converged: bool,
    /// Whether the budget ran out.
    pub deadline_hit: bool,
    /// Contacts seeded from the previous tick.
    pub warm_started: usize,
}

impl From<&SolveResult> for SolveSummary {
    fn from(result: &SolveResult) -> Self {
        Self {
            iterations: result.iterations_used,
            residual: result.residual,
            converged: result.converged,
            deadline_hit: result.deadline_hit,
            warm_started: result.warm_started,
        }
    }
}

/// Outcome of one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepResult {
    /// Candidate pairs from the broad phase.
    pub candidate_pairs: usize,
    /// Contacts within the alarm distance.
    pub reported_contacts: usize,
    /// Contacts handed to the solver, with their impulses.
    pub solved: Vec<(ContactPoint, ContactImpulse)>,
    /// Normals that came from the fallback path.
    pub degenerate_normals: usize,
    /// Solver summary.
    pub solve: SolveSummary,
    /// Position correction summary.
    pub response: ResponseReport,
    /// Net contact force on the driven body, in the world frame.
    pub contact_force: Vector3<f64>,
    /// Net contact torque on the driven body about its center of mass.
    pub contact_torque: Vector3<f64>,
    /// Jaw hinge clamp, if any.
    pub soft_limit: Option<SoftLimitEvent>,
    /// Time spent in the tick.
    pub elapsed: Duration,
}

impl StepResult {
    /// Number of solved contacts.
    #[must_use]
    pub fn active_contacts(&self) -> usize {
        self.solved.len()
    }
}

/// The contact pipeline.
pub struct Stepper {
    config: StepperConfig,
    broad_phase: Box<dyn BroadPhase>,
    narrow_phase: NarrowPhase,
    solver: Box<dyn ContactSolver>,
    response: ResponseApplier,
}

impl std::fmt::Debug for Stepper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stepper")
            .field("config", &self.config)
            .field("solver", &self.solver.name())
            .finish_non_exhaustive()
    }
}

impl Stepper {
    /// Build the default pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: StepperConfig) -> sim_types::Result<Self> {
        config.validate()?;
        let broad = BroadPhaseDetector::new(BroadPhaseConfig::with_margin(
            config.proximity.alarm_distance,
        ));
        Ok(Self {
            config,
            broad_phase: Box::new(broad),
            narrow_phase: NarrowPhase::new(config.proximity),
            solver: Box::new(PgsSolver::new(config.solver)),
            response: ResponseApplier::new(config.response),
        })
    }

    /// Replace the broad phase.
    #[must_use]
    pub fn with_broad_phase(mut self, broad_phase: Box<dyn BroadPhase>) -> Self {
        self.broad_phase = broad_phase;
        self
    }

    /// Replace the solver.
    #[must_use]
    pub fn with_solver(mut self, solver: Box<dyn ContactSolver>) -> Self {
        self.solver = solver;
        self
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &StepperConfig {
        &self.config
    }

    /// Name of the solver in use.
    #[must_use]
    pub fn solver_name(&self) -> &'static str {
        self.solver.name()
    }

    /// Advance a world without a driven tool.
    pub fn step(&mut self, world: &mut World) -> StepResult {
        let started = Instant::now();
        let _free = advance_free(world, &self.config.gravity, self.config.timestep);
        self.resolve_contacts(world, None, started)
    }

    /// Advance a world whose tool follows `device`.
    ///
    /// The contact wrench in the result is the one acting on the tool root.
    pub fn step_tool(
        &mut self,
        world: &mut World,
        tool: &mut ArticulatedTool,
        device: &DevicePose,
    ) -> StepResult {
        let started = Instant::now();
        let free: FreeMotion =
            tool.advance_free(world, self.config.timestep, device, &self.config.gravity);
        debug!(bodies = free.states.len(), "free motion");
        let mut result = self.resolve_contacts(world, Some(tool.root()), started);
        result.soft_limit = tool.last_limit_event();
        result
    }

    fn resolve_contacts(
        &mut self,
        world: &mut World,
        driven: Option<BodyId>,
        started: Instant,
    ) -> StepResult {
        let dt = self.config.timestep;
        let deadline = self.config.budget.map(|budget| started + budget);

        // Swept over the whole tick: the response stage re-checks only these pairs.
        let query = PairQuery::new(self.config.proximity.alarm_distance, dt);
        let pairs = self.broad_phase.find_potential_pairs(world.bodies(), query);
        let narrow = self.narrow_phase.generate(world, &pairs);
        let active: Vec<ContactPoint> = narrow.active().copied().collect();

        let problem = ConstraintProblem::assemble(
            &active,
            |id| world.solver_body(id),
            self.config.proximity.friction_cone(),
            dt,
        );

        let solution = if problem.is_empty() {
            SolveResult::empty()
        } else {
            self.solver.solve(&problem, deadline)
        };

        let (contact_force, contact_torque) = match driven {
            Some(id) if !problem.is_empty() => {
                let (linear, angular) = problem.impulse_on(id, &solution.lambda);
                (linear / dt, angular / dt)
            }
            _ => (Vector3::zeros(), Vector3::zeros()),
        };

        let response =
            self.response.apply(world, &problem, &solution, &self.narrow_phase, &pairs, dt);

        let solved = problem
            .contacts()
            .iter()
            .copied()
            .zip(solution.impulses())
            .collect();

        StepResult {
            candidate_pairs: pairs.len(),
            reported_contacts: narrow.contacts.len(),
            solved,
            degenerate_normals: narrow.degenerate_normals,
            solve: SolveSummary::from(&solution),
            response,
            contact_force,
            contact_torque,
            soft_limit: None,
            elapsed: started.elapsed(),
        }
    }
}
