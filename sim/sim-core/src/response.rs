//! Contact response: velocity update, integration and position correction.
//!
//! The response stage closes a tick:
//!
//! 1. Contact impulses `M⁻¹ Jᵀ λ` are added to the free-motion velocities.
//! 2. Poses are integrated with the corrected velocities.
//! 3. The candidate pairs are evaluated again. Remaining penetration is
//!    projected out over a few bounded passes, split between the bodies by
//!    inverse mass.
//! 4. Whatever is still deeper than `penetration_tolerance + safety_margin`
//!    is clamped in one move. Each clamp is a correction event.
//!
//! After [`ResponseApplier::apply`] no contact among the candidate pairs
//! penetrates beyond the tolerance.

use sim_constraint::{ConstraintProblem, SolveResult};
use sim_contact::ContactPoint;
use sim_types::{BodyId, SimError};
use tracing::warn;

use crate::integrators::SemiImplicitEuler;
use crate::narrow_phase::NarrowPhase;
use crate::world::World;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Position correction settings.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ResponseConfig {
    /// Projection passes after integration.
    pub position_iterations: usize,
    /// Largest move of one pair in one pass.
    pub max_correction_per_iteration: f64,
    /// Penetration accepted without correction.
    pub penetration_tolerance: f64,
    /// Extra depth tolerated before a direct clamp.
    pub safety_margin: f64,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            position_iterations: 4,
            max_correction_per_iteration: 1.0,
            penetration_tolerance: 0.05,
            safety_margin: 0.01,
        }
    }
}

impl ResponseConfig {
    /// Set the number of projection passes.
    #[must_use]
    pub fn with_position_iterations(mut self, iterations: usize) -> Self {
        self.position_iterations = iterations;
        self
    }

    /// Set the per-pass correction bound.
    #[must_use]
    pub fn with_max_correction(mut self, max_correction: f64) -> Self {
        self.max_correction_per_iteration = max_correction;
        self
    }

    /// Set the penetration tolerance.
    #[must_use]
    pub fn with_penetration_tolerance(mut self, tolerance: f64) -> Self {
        self.penetration_tolerance = tolerance;
        self
    }

    /// Depth beyond which a contact is clamped directly.
    #[must_use]
    pub fn clamp_depth(&self) -> f64 {
        self.penetration_tolerance + self.safety_margin
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a distance is negative or not finite, or if the
    /// correction bound is not positive.
    pub fn validate(&self) -> sim_types::Result<()> {
        if !(self.penetration_tolerance.is_finite() && self.penetration_tolerance >= 0.0) {
            return Err(SimError::invalid_config(format!(
                "penetration tolerance must be non-negative, got {}",
                self.penetration_tolerance
            )));
        }
        if !(self.safety_margin.is_finite() && self.safety_margin >= 0.0) {
            return Err(SimError::invalid_config(format!(
                "safety margin must be non-negative, got {}",
                self.safety_margin
            )));
        }
        let max_correction = self.max_correction_per_iteration;
        if !(max_correction.is_finite() && max_correction > 0.0) {
            return Err(SimError::invalid_config(format!(
                "max correction per iteration must be positive, got {}",
                self.max_correction_per_iteration
            )));
        }
        Ok(())
    }
}

/// What the response stage did.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResponseReport {
    /// Bodies whose velocity received a contact impulse.
    pub impulse_bodies: usize,
    /// Projection passes that moved something.
    pub projection_passes: usize,
    /// Direct clamps after projection.
    pub correction_events: usize,
    /// Deepest remaining penetration among the solved pairs (0 if none).
    pub max_penetration: f64,
}

/// Applies solved impulses and corrects positions.
#[derive(Debug, Clone, Default)]
pub struct ResponseApplier {
    config: ResponseConfig,
}

impl ResponseApplier {
    /// Create an applier.
    #[must_use]
    pub fn new(config: ResponseConfig) -> Self {
        Self { config }
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &ResponseConfig {
        &self.config
    }

    /// Finish the tick for `world`.
    ///
    /// `world` must hold the free-motion velocities at start-of-tick poses.
    /// `pairs` are re-evaluated after integration; pass the broad-phase
    /// candidates so that contacts which were not yet active are caught too.
    /// `narrow` is only queried; its normal cache is left as it is.
    pub fn apply(
        &self,
        world: &mut World,
        problem: &ConstraintProblem,
        solution: &SolveResult,
        narrow: &NarrowPhase,
        pairs: &[(BodyId, BodyId)],
        dt: f64,
    ) -> ResponseReport {
        let mut report = ResponseReport::default();

        if solution.lambda.len() == problem.dimension() {
            for delta in problem.velocity_deltas(&solution.lambda) {
                if let Some(body) = world.body_mut(delta.body) {
                    body.state.twist.linear += delta.linear;
                    body.state.twist.angular += delta.angular;
                    report.impulse_bodies += 1;
                }
            }
        }

        for body in world.bodies_mut().filter(|b| b.is_dynamic()) {
            SemiImplicitEuler::integrate_positions(&mut body.state, dt);
        }
        world.sync_attached();

        if pairs.is_empty() {
            return report;
        }

        for _ in 0..self.config.position_iterations {
            let mut moved = false;
            for pair in pairs {
                let Some(contact) = deepest_contact(narrow, world, *pair) else {
                    continue;
                };
                if contact.distance < 0.0 {
                    let depth = (-contact.distance).min(self.config.max_correction_per_iteration);
                    moved |= separate(world, &contact, depth);
                }
            }
            if !moved {
                break;
            }
            report.projection_passes += 1;
        }

        for pair in pairs {
            let Some(contact) = deepest_contact(narrow, world, *pair) else {
                continue;
            };
            let depth = -contact.distance;
            if depth <= self.config.clamp_depth() {
                report.max_penetration = report.max_penetration.max(depth);
                continue;
            }
            warn!(
                body_a = %contact.body_a,
                body_b = %contact.body_b,
                depth,
                "residual penetration clamped"
            );
            separate(world, &contact, depth);
            remove_approach(world, &contact);
            report.correction_events += 1;
        }

        report
    }
}

fn deepest_contact(
    narrow: &NarrowPhase,
    world: &World,
    pair: (BodyId, BodyId),
) -> Option<ContactPoint> {
    narrow.probe(world, &[pair]).deepest().copied()
}

/// Move the owners of a contact apart by `depth` along its normal, split by
/// inverse mass. Returns whether anything moved.
fn separate(world: &mut World, contact: &ContactPoint, depth: f64) -> bool {
    let a = world.solver_body(contact.body_a);
    let b = world.solver_body(contact.body_b);
    let (Some(a), Some(b)) = (a, b) else {
        return false;
    };
    let total = a.inv_mass + b.inv_mass;
    if a.id == b.id || total <= 0.0 || depth <= 0.0 {
        return false;
    }

    for (owner, share) in [(a.id, a.inv_mass / total), (b.id, -b.inv_mass / total)] {
        if share == 0.0 {
            continue;
        }
        if let Some(body) = world.body_mut(owner) {
            body.state.pose.position += contact.normal * (depth * share);
        }
    }
    world.sync_attached();
    true
}

/// Drop the approaching normal velocity of the owners of a clamped contact.
fn remove_approach(world: &mut World, contact: &ContactPoint) {
    for (id, sign) in [(contact.body_a, 1.0), (contact.body_b, -1.0)] {
        let Some(owner) = world.owner_of(id) else {
            continue;
        };
        if let Some(body) = world.body_mut(owner).filter(|b| b.is_dynamic()) {
            let n = contact.normal * sign;
            let approach = body.state.twist.linear.dot(&n);
            if approach < 0.0 {
                body.state.twist.linear -= n * approach;
            }
        }
    }
    world.sync_attached();
}
