//! Scene assembly and the per-tick pipeline.
//!
//! ```text
//! device.sample ─▶ tool free motion ─▶ contacts ─▶ solve ─▶ response
//!        ▲                                                    │
//!        └────────── device.apply_force ◀── feedback map ◀────┘
//! ```

use std::sync::Arc;

use haptic_device::{DeviceInterface, DeviceStatus, FeedbackForce, ForceFeedbackMapper};
use sim_constraint::ContactSolver;
use sim_core::{ArticulatedTool, BroadPhase, RigidObstacle, StepResult, Stepper, World};
use sim_types::{BodyId, Pose};
use tracing::{debug, info, warn};

use crate::config::SceneConfig;
use crate::error::{Result, SceneError};
use crate::stats::SimulationStats;

/// Assembles a [`HapticScene`] from a configuration and concrete components.
pub struct SceneBuilder {
    config: SceneConfig,
    device: Option<Box<dyn DeviceInterface>>,
    broad_phase: Option<Box<dyn BroadPhase>>,
    solver: Option<Box<dyn ContactSolver>>,
    extra_obstacles: Vec<RigidObstacle>,
}

impl std::fmt::Debug for SceneBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneBuilder")
            .field("config", &self.config)
            .field("has_device", &self.device.is_some())
            .field("extra_obstacles", &self.extra_obstacles.len())
            .finish_non_exhaustive()
    }
}

impl SceneBuilder {
    /// Start from a configuration.
    #[must_use]
    pub fn new(config: SceneConfig) -> Self {
        Self {
            config,
            device: None,
            broad_phase: None,
            solver: None,
            extra_obstacles: Vec::new(),
        }
    }

    /// The device driving the tool. Required.
    #[must_use]
    pub fn with_device(mut self, device: impl DeviceInterface + 'static) -> Self {
        self.device = Some(Box::new(device));
        self
    }

    /// Replace the default broad phase.
    ///
    /// Whatever its own margin, it is queried with at least the alarm
    /// distance and with bounds swept over the tick.
    #[must_use]
    pub fn with_broad_phase(mut self, broad_phase: impl BroadPhase + 'static) -> Self {
        self.broad_phase = Some(Box::new(broad_phase));
        self
    }

    /// Replace the default solver.
    #[must_use]
    pub fn with_solver(mut self, solver: impl ContactSolver + 'static) -> Self {
        self.solver = Some(Box::new(solver));
        self
    }

    /// Add an obstacle besides the configured one.
    #[must_use]
    pub fn with_obstacle(mut self, obstacle: RigidObstacle) -> Self {
        self.extra_obstacles.push(obstacle);
        self
    }

    /// Validate the configuration and build the scene.
    ///
    /// The tool is placed at the target pose of the device's first sample.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::MissingComponent`] without a device, or the
    /// first configuration error.
    pub fn build(self) -> Result<HapticScene> {
        let Self {
            config,
            device,
            broad_phase,
            solver,
            extra_obstacles,
        } = self;
        config.validate()?;
        let mut device = device.ok_or(SceneError::MissingComponent("device"))?;

        let mut world = World::new();
        let mut obstacles = Vec::with_capacity(1 + extra_obstacles.len());
        for obstacle in std::iter::once(&config.obstacle).chain(&extra_obstacles) {
            obstacles.push(obstacle.spawn(&mut world)?);
        }

        let first = device.sample();
        let tool = ArticulatedTool::spawn(&mut world, config.tool, &first, config.timestep())?;

        let mut stepper = Stepper::new(config.stepper_config())?;
        if let Some(broad_phase) = broad_phase {
            stepper = stepper.with_broad_phase(broad_phase);
        }
        if let Some(solver) = solver {
            stepper = stepper.with_solver(solver);
        }

        info!(
            bodies = world.body_count(),
            obstacles = obstacles.len(),
            solver = stepper.solver_name(),
            rate_hz = config.simulation.frequency(),
            "scene built"
        );

        let status = device.status();
        Ok(HapticScene {
            mapper: ForceFeedbackMapper::new(config.feedback),
            config: Arc::new(config),
            world,
            tool,
            obstacles,
            stepper,
            device,
            stats: SimulationStats::default(),
            tick: 0,
            status,
            in_contact: false,
        })
    }
}

/// Outcome of one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// Tick index, starting at 0.
    pub tick: u64,
    /// Simulated time at the end of the tick.
    pub time: f64,
    /// Device state when the pose was sampled.
    pub device_status: DeviceStatus,
    /// Force sent to the device (zero if none was sent).
    pub feedback: FeedbackForce,
    /// Contact pipeline details.
    pub step: StepResult,
}

impl TickReport {
    /// Number of solved contacts.
    #[must_use]
    pub fn contacts(&self) -> usize {
        self.step.active_contacts()
    }
}

/// A running haptic scene: a grasper, its obstacles and a device.
pub struct HapticScene {
    config: Arc<SceneConfig>,
    world: World,
    tool: ArticulatedTool,
    obstacles: Vec<BodyId>,
    stepper: Stepper,
    device: Box<dyn DeviceInterface>,
    mapper: ForceFeedbackMapper,
    stats: SimulationStats,
    tick: u64,
    status: DeviceStatus,
    in_contact: bool,
}

impl std::fmt::Debug for HapticScene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HapticScene")
            .field("tick", &self.tick)
            .field("bodies", &self.world.body_count())
            .field("status", &self.status)
            .field("stepper", &self.stepper)
            .finish_non_exhaustive()
    }
}

impl HapticScene {
    /// Run one tick.
    ///
    /// Never fails: a lost device replays its last pose, and solver or
    /// geometry anomalies are counted in [`HapticScene::stats`].
    pub fn step(&mut self) -> TickReport {
        let pose = self.device.sample();
        let status = self.device.status();
        self.track_status(status);

        let step = self.stepper.step_tool(&mut self.world, &mut self.tool, &pose);

        let contact = step.active_contacts() > 0;
        if contact && !self.in_contact {
            info!(tick = self.tick, contacts = step.active_contacts(), "first contact");
        } else if !contact && self.in_contact {
            debug!(tick = self.tick, "contact released");
        }
        self.in_contact = contact;

        if step.solve.deadline_hit {
            warn!(
                tick = self.tick,
                iterations = step.solve.iterations,
                residual = step.solve.residual,
                "solver deadline missed"
            );
        } else if contact && !step.solve.converged {
            debug!(
                tick = self.tick,
                iterations = step.solve.iterations,
                residual = step.solve.residual,
                "solver did not converge"
            );
        }

        let feedback = if status.accepts_force() {
            let force = self.mapper.map(
                &step.contact_force,
                &step.contact_torque,
                &self.config.tool.offset.rotation,
                pose.timestamp,
            );
            self.device.apply_force(force);
            force
        } else {
            self.mapper.reset();
            FeedbackForce::zero()
        };

        self.tick += 1;
        #[allow(clippy::cast_precision_loss)]
        let time = self.tick as f64 * self.config.timestep();
        let report = TickReport {
            tick: self.tick - 1,
            time,
            device_status: status,
            feedback,
            step,
        };
        self.stats.record(&report);
        report
    }

    fn track_status(&mut self, status: DeviceStatus) {
        if status == self.status {
            return;
        }
        match status {
            DeviceStatus::Connected => info!(tick = self.tick, "device connected"),
            DeviceStatus::Stale => warn!(tick = self.tick, "device samples are stale"),
            DeviceStatus::Disconnected => {
                warn!(tick = self.tick, "device disconnected, holding last pose");
            }
        }
        self.status = status;
    }

    /// Pose of every body, in creation order.
    #[must_use]
    pub fn body_poses(&self) -> Vec<(BodyId, Pose)> {
        self.world
            .bodies()
            .iter()
            .map(|body| (body.id, body.state.pose))
            .collect()
    }

    /// Pose of the tool root.
    #[must_use]
    pub fn tool_root_pose(&self) -> Option<Pose> {
        self.tool.root_pose(&self.world)
    }

    /// Cumulative statistics.
    #[must_use]
    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    /// The configuration the scene was built with.
    #[must_use]
    pub fn config(&self) -> &Arc<SceneConfig> {
        &self.config
    }

    /// The simulated world.
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// The grasper.
    #[must_use]
    pub fn tool(&self) -> &ArticulatedTool {
        &self.tool
    }

    /// Obstacle bodies, configured one first.
    #[must_use]
    pub fn obstacles(&self) -> &[BodyId] {
        &self.obstacles
    }

    /// Device state seen by the last tick.
    #[must_use]
    pub fn device_status(&self) -> DeviceStatus {
        self.status
    }

    /// Ticks run so far.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.tick
    }

    /// Name of the solver in use.
    #[must_use]
    pub fn solver_name(&self) -> &'static str {
        self.stepper.solver_name()
    }
}
