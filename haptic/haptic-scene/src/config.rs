//! Scene configuration.
//!
//! One [`SceneConfig`] describes everything a scene needs: the tick rate,
//! contact thresholds, solver and correction settings, the tool, the
//! obstacle and the force-feedback mapping. It is validated once by
//! [`SceneBuilder::build`](crate::SceneBuilder::build) and then shared
//! read-only.

use haptic_device::FeedbackConfig;
use nalgebra::{Point3, Vector3};
use sim_constraint::PgsConfig;
use sim_contact::ProximityParams;
use sim_core::{ResponseConfig, RigidObstacle, StepperConfig, ToolConfig};
use sim_types::SimulationConfig;

use crate::error::Result;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Complete configuration of a haptic scene.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SceneConfig {
    /// Timestep, gravity and solver budget.
    pub simulation: SimulationConfig,
    /// Alarm and contact distances, friction.
    pub proximity: ProximityParams,
    /// Constraint solver.
    pub solver: PgsConfig,
    /// Position correction.
    pub response: ResponseConfig,
    /// Grasper geometry, mass, coupling and mounting offset.
    pub tool: ToolConfig,
    /// The static obstacle.
    pub obstacle: RigidObstacle,
    /// Constraint wrench to device force.
    pub feedback: FeedbackConfig,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self::reference_grasper_floor()
    }
}

impl SceneConfig {
    /// The grasper above `Floor_01`.
    ///
    /// 100 Hz, gravity along -Y, alarm distance 2, contact distance 0.1,
    /// friction cone half-angle 0.1, solver tolerance 1e-3 with at most
    /// 10 000 sweeps, tool mounted at `[0, 0, 200]` rotated `[0, -90, -90]`
    /// degrees.
    #[must_use]
    pub fn reference_grasper_floor() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            proximity: ProximityParams::reference_scene(),
            solver: PgsConfig::reference_scene(),
            response: ResponseConfig::default(),
            tool: ToolConfig::default()
                .with_offset_degrees(Point3::new(0.0, 0.0, 200.0), Vector3::new(0.0, -90.0, -90.0)),
            obstacle: RigidObstacle::reference_floor(),
            feedback: FeedbackConfig::default(),
        }
    }

    /// Drop the solver deadline. Ticks then depend only on their inputs.
    #[must_use]
    pub fn offline(mut self) -> Self {
        self.simulation.tick_budget = None;
        self
    }

    /// Replace the obstacle.
    #[must_use]
    pub fn with_obstacle(mut self, obstacle: RigidObstacle) -> Self {
        self.obstacle = obstacle;
        self
    }

    /// Replace the tool.
    #[must_use]
    pub fn with_tool(mut self, tool: ToolConfig) -> Self {
        self.tool = tool;
        self
    }

    /// Replace the feedback mapping.
    #[must_use]
    pub fn with_feedback(mut self, feedback: FeedbackConfig) -> Self {
        self.feedback = feedback;
        self
    }

    /// Replace the contact thresholds.
    #[must_use]
    pub fn with_proximity(mut self, proximity: ProximityParams) -> Self {
        self.proximity = proximity;
        self
    }

    /// Timestep in seconds.
    #[must_use]
    pub fn timestep(&self) -> f64 {
        self.simulation.timestep
    }

    /// Settings for the contact pipeline.
    #[must_use]
    pub fn stepper_config(&self) -> StepperConfig {
        StepperConfig {
            timestep: self.simulation.timestep,
            gravity: self.simulation.gravity,
            proximity: self.proximity,
            solver: self.solver,
            response: self.response,
            budget: self.simulation.budget(),
        }
    }

    /// Validate every section.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting: a non-positive timestep, contact
    /// distance above alarm distance, inverted jaw limits, non-positive tool
    /// mass, an empty obstacle box, or an out-of-range feedback setting.
    pub fn validate(&self) -> Result<()> {
        self.simulation.validate()?;
        self.stepper_config().validate()?;
        self.tool.validate(self.simulation.timestep)?;
        self.obstacle.validate()?;
        self.feedback.validate()?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::error::SceneError;
    use sim_types::SimError;

    #[test]
    fn test_reference_scene_values() {
        let config = SceneConfig::reference_grasper_floor();
        assert!(config.validate().is_ok());

        assert_eq!(config.timestep(), 0.01);
        assert_eq!(config.simulation.gravity.acceleration, Vector3::new(0.0, -9.81, 0.0));
        assert_eq!(config.proximity.alarm_distance, 2.0);
        assert_eq!(config.proximity.contact_distance, 0.1);
        assert_eq!(config.solver.tolerance, 1e-3);
        assert_eq!(config.solver.max_iterations, 10_000);
        assert_eq!(config.obstacle.name, "Floor_01");
        assert_eq!(config.tool.offset.position, Point3::new(0.0, 0.0, 200.0));
    }

    #[test]
    fn test_stepper_config_mirrors_scene() {
        let config = SceneConfig::reference_grasper_floor();
        let stepper = config.stepper_config();
        assert_eq!(stepper.timestep, config.timestep());
        assert_eq!(stepper.proximity, config.proximity);
        assert!(stepper.budget.is_some());
        assert!(config.offline().stepper_config().budget.is_none());
    }

    #[test]
    fn test_contact_beyond_alarm_rejected() {
        let mut config = SceneConfig::reference_grasper_floor();
        config.proximity.contact_distance = 3.0;
        assert!(config.validate().unwrap_err().is_config_error());
    }

    #[test]
    fn test_zero_timestep_rejected() {
        let mut config = SceneConfig::reference_grasper_floor();
        config.simulation.timestep = 0.0;
        assert_eq!(
            config.validate().unwrap_err(),
            SceneError::Sim(SimError::InvalidTimestep(0.0))
        );
    }

    #[test]
    fn test_empty_obstacle_rejected() {
        let mut config = SceneConfig::reference_grasper_floor();
        config.obstacle.max.y = config.obstacle.min.y;
        assert!(matches!(
            config.validate(),
            Err(SceneError::Sim(SimError::InvalidGeometry { .. }))
        ));
    }

    #[test]
    fn test_negative_mass_rejected() {
        let config = SceneConfig::reference_grasper_floor();
        let config = config.clone().with_tool(config.tool.with_mass(-1.0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_feedback_rejected() {
        let config = SceneConfig::reference_grasper_floor()
            .with_feedback(FeedbackConfig::default().with_smoothing(0.0));
        assert!(matches!(config.validate(), Err(SceneError::Device(_))));
    }
}
