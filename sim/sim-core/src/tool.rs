//! Articulated grasper driven by a haptic device.
//!
//! The tool is a dynamic shaft (the root) carrying two jaw segments on a
//! hinge at its tip:
//!
//! ```text
//!            root frame: shaft along local +Z
//!
//!        ║  shaft capsule, center of mass at the origin
//!        ║
//!        ●  hinge at z = -shaft_length / 2, axis local X
//!       ╱ ╲
//!  jaw 1   jaw 2   extend along -Z, opened by ±angle
//! ```
//!
//! The device does not set the root pose directly. A virtual coupling (a
//! critically damped spring by default) pulls the root towards the target
//! pose `offset ∘ device`, so contacts can hold the tool back while the
//! device keeps moving, and the stretch of the coupling is what the user
//! feels.
//!
//! Jaws are attached bodies. Their hinge angle follows the device grip,
//! limited by the joint speed, and is soft-clamped to the joint range. A
//! clamp zeroes the hinge velocity and is reported as a [`SoftLimitEvent`].
//! Because jaw poses are recomputed from the root pose and the clamped
//! angle, the hinge constraint holds exactly after every step.

use std::f64::consts::PI;

use nalgebra::{Point3, Vector3};
use sim_types::{
    BodyId, DevicePose, Gravity, JointLimits, JointState, MassProperties, Pose, RigidBodyState,
    SimError, Twist, UnitQuaternion,
};
use tracing::debug;

use crate::integrators::{advance_free, FreeMotion, FreeState};
use crate::world::{Body, BodyKind, CollisionShape, World};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Grasper dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GrasperJaws {
    /// Largest opening of each jaw from the shaft axis (radians).
    pub max_opening_angle: f64,
    /// Length of a jaw from the hinge to its tip.
    pub jaw_length: f64,
    /// Radius of the first jaw.
    pub jaw1_radius: f64,
    /// Radius of the second jaw.
    pub jaw2_radius: f64,
    /// Radius of the shaft.
    pub shaft_radius: f64,
    /// Length of the shaft's cylindrical part.
    pub shaft_length: f64,
}

impl Default for GrasperJaws {
    fn default() -> Self {
        Self {
            max_opening_angle: 60f64.to_radians(),
            jaw_length: 15.0,
            jaw1_radius: 1.5,
            jaw2_radius: 1.5,
            shaft_radius: 2.5,
            shaft_length: 100.0,
        }
    }
}

impl GrasperJaws {
    /// Validate the dimensions.
    ///
    /// # Errors
    ///
    /// Returns an error if a length or radius is not positive, or if the
    /// maximum opening is outside `(0, π/2]`.
    pub fn validate(&self) -> sim_types::Result<()> {
        for (name, value) in [
            ("jaw length", self.jaw_length),
            ("jaw 1 radius", self.jaw1_radius),
            ("jaw 2 radius", self.jaw2_radius),
            ("shaft radius", self.shaft_radius),
            ("shaft length", self.shaft_length),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(SimError::invalid_geometry(format!(
                    "grasper {name} must be positive, got {value}"
                )));
            }
        }
        if !(self.max_opening_angle > 0.0 && self.max_opening_angle <= PI / 2.0) {
            return Err(SimError::invalid_config(format!(
                "grasper max opening angle must be in (0, π/2], got {}",
                self.max_opening_angle
            )));
        }
        Ok(())
    }
}

/// Spring-damper pulling the tool root towards the device target.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CouplingConfig {
    /// Natural frequency of the coupling (Hz).
    pub frequency_hz: f64,
    /// Damping ratio (1 = critical).
    pub damping_ratio: f64,
}

impl Default for CouplingConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 3.0,
            damping_ratio: 1.0,
        }
    }
}

impl CouplingConfig {
    /// Angular frequency `2π f`.
    #[must_use]
    pub fn omega(&self) -> f64 {
        2.0 * PI * self.frequency_hz
    }

    /// Validate against the timestep.
    ///
    /// # Errors
    ///
    /// Returns an error if the frequency is not positive, the damping ratio
    /// is negative, or `ω dt ≥ 1` (the explicit coupling would ring or
    /// diverge).
    pub fn validate(&self, dt: f64) -> sim_types::Result<()> {
        if !(self.frequency_hz.is_finite() && self.frequency_hz > 0.0) {
            return Err(SimError::invalid_config(format!(
                "coupling frequency must be positive, got {}",
                self.frequency_hz
            )));
        }
        if !(self.damping_ratio.is_finite() && self.damping_ratio >= 0.0) {
            return Err(SimError::invalid_config(format!(
                "coupling damping ratio must be non-negative, got {}",
                self.damping_ratio
            )));
        }
        if self.omega() * dt >= 1.0 {
            return Err(SimError::invalid_config(format!(
                "coupling at {} Hz is too stiff for dt = {dt}",
                self.frequency_hz
            )));
        }
        Ok(())
    }
}

/// Tool configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ToolConfig {
    /// Placement of the device frame in the world.
    pub offset: Pose,
    /// Grasper dimensions.
    pub jaws: GrasperJaws,
    /// Mass of the tool (carried by the shaft).
    pub mass: f64,
    /// Maximum jaw hinge speed (rad/s).
    pub jaw_speed: f64,
    /// Virtual coupling.
    pub coupling: CouplingConfig,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            offset: Pose::identity(),
            jaws: GrasperJaws::default(),
            mass: 0.1,
            jaw_speed: 2.0 * PI,
            coupling: CouplingConfig::default(),
        }
    }
}

impl ToolConfig {
    /// Place the device frame at `position` rotated by XYZ Euler angles in
    /// degrees.
    #[must_use]
    pub fn with_offset_degrees(mut self, position: Point3<f64>, degrees: Vector3<f64>) -> Self {
        self.offset = Pose::from_euler_degrees(position, degrees);
        self
    }

    /// Set the grasper dimensions.
    #[must_use]
    pub fn with_jaws(mut self, jaws: GrasperJaws) -> Self {
        self.jaws = jaws;
        self
    }

    /// Set the coupling.
    #[must_use]
    pub fn with_coupling(mut self, coupling: CouplingConfig) -> Self {
        self.coupling = coupling;
        self
    }

    /// Set the tool mass.
    #[must_use]
    pub fn with_mass(mut self, mass: f64) -> Self {
        self.mass = mass;
        self
    }

    /// Limits of each jaw hinge.
    #[must_use]
    pub fn jaw_limits(&self) -> JointLimits {
        JointLimits::revolute(0.0, self.jaws.max_opening_angle, self.jaw_speed)
    }

    /// Mass properties of the shaft capsule.
    #[must_use]
    pub fn mass_properties(&self) -> MassProperties {
        MassProperties::capsule(self.mass, self.jaws.shaft_radius, self.jaws.shaft_length / 2.0)
    }

    /// World pose the root is pulled towards for a device sample.
    #[must_use]
    pub fn target_pose(&self, device: &DevicePose) -> Pose {
        self.offset.compose(&device.pose())
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid geometry, mass, hinge limits, offset or
    /// coupling.
    pub fn validate(&self, dt: f64) -> sim_types::Result<()> {
        self.jaw_limits().validate("grasper jaw")?;
        self.jaws.validate()?;
        self.mass_properties().validate()?;
        if !(self.mass.is_finite() && self.mass > 0.0) {
            return Err(SimError::invalid_mass(format!(
                "tool mass must be positive and finite, got {}",
                self.mass
            )));
        }
        if !self.offset.is_finite() {
            return Err(SimError::invalid_config("tool offset must be finite"));
        }
        self.coupling.validate(dt)
    }
}

/// A hinge between the shaft and one jaw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToolJoint {
    /// The jaw body.
    pub body: BodyId,
    /// Hinge point in the root frame.
    pub anchor: Point3<f64>,
    /// Hinge axis in the root frame.
    pub axis: Vector3<f64>,
    /// +1 or -1: direction this jaw opens.
    pub sign: f64,
    /// Hinge limits.
    pub limits: JointLimits,
    /// Jaw length.
    pub length: f64,
}

impl ToolJoint {
    /// Jaw pose in the root frame for an opening angle.
    #[must_use]
    pub fn local_pose(&self, opening: f64) -> Pose {
        let rotation = UnitQuaternion::from_axis_angle(
            &nalgebra::Unit::new_normalize(self.axis),
            self.sign * opening,
        );
        let center = self.anchor + rotation * Vector3::new(0.0, 0.0, -self.length / 2.0);
        Pose::from_position_rotation(center, rotation)
    }
}

/// A jaw hit its hinge limit and was clamped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoftLimitEvent {
    /// Angle the grip asked for.
    pub requested: f64,
    /// Angle after clamping.
    pub clamped: f64,
}

/// The articulated grasper.
#[derive(Debug, Clone)]
pub struct ArticulatedTool {
    config: ToolConfig,
    root: BodyId,
    joints: [ToolJoint; 2],
    opening: JointState,
    last_limit_event: Option<SoftLimitEvent>,
}

impl ArticulatedTool {
    /// Build the tool in `world` at the target pose of `device`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid for `dt`.
    pub fn spawn(
        world: &mut World,
        config: ToolConfig,
        device: &DevicePose,
        dt: f64,
    ) -> sim_types::Result<Self> {
        config.validate(dt)?;
        let jaws = config.jaws;
        let shaft_half = jaws.shaft_length / 2.0;

        let root = world.allocate_id();
        world.insert_body(
            Body::new(
                root,
                RigidBodyState::at_rest(config.target_pose(device)),
                config.mass_properties(),
            )
            .with_name("grasper_shaft")
            .with_collision_shape(CollisionShape::capsule(shaft_half, jaws.shaft_radius)),
        )?;

        let limits = config.jaw_limits();
        let opening =
            JointState::at_position(limits.clamp_position(device.grip * jaws.max_opening_angle));

        let mut joints = [1.0, -1.0].map(|sign| ToolJoint {
            body: root,
            anchor: Point3::new(0.0, 0.0, -shaft_half),
            axis: Vector3::x(),
            sign,
            limits,
            length: jaws.jaw_length,
        });

        for (joint, (radius, name)) in joints
            .iter_mut()
            .zip([(jaws.jaw1_radius, "grasper_jaw_1"), (jaws.jaw2_radius, "grasper_jaw_2")])
        {
            let id = world.allocate_id();
            let half_length = (jaws.jaw_length / 2.0 - radius).max(0.0);
            world.insert_body(
                Body::new_attached(id, root, joint.local_pose(opening.position))
                    .with_name(name)
                    .with_collision_shape(CollisionShape::capsule(half_length, radius)),
            )?;
            joint.body = id;
        }

        Ok(Self {
            config,
            root,
            joints,
            opening,
            last_limit_event: None,
        })
    }

    /// The shaft body.
    #[must_use]
    pub fn root(&self) -> BodyId {
        self.root
    }

    /// The jaw hinges.
    #[must_use]
    pub fn joints(&self) -> &[ToolJoint; 2] {
        &self.joints
    }

    /// Current hinge state (shared by both jaws).
    #[must_use]
    pub fn opening(&self) -> JointState {
        self.opening
    }

    /// Configuration the tool was built with.
    #[must_use]
    pub fn config(&self) -> &ToolConfig {
        &self.config
    }

    /// Clamp reported by the last [`ArticulatedTool::advance_free`], if any.
    #[must_use]
    pub fn last_limit_event(&self) -> Option<SoftLimitEvent> {
        self.last_limit_event
    }

    /// Pose of the root body.
    #[must_use]
    pub fn root_pose(&self, world: &World) -> Option<Pose> {
        world.body(self.root).map(|b| b.state.pose)
    }

    /// Coupling wrench pulling the root towards `target`.
    #[must_use]
    pub fn coupling_wrench(&self, world: &World, target: &Pose) -> (Vector3<f64>, Vector3<f64>) {
        let Some(body) = world.body(self.root) else {
            return (Vector3::zeros(), Vector3::zeros());
        };
        let omega = self.config.coupling.omega();
        let k = omega * omega;
        let c = 2.0 * self.config.coupling.damping_ratio * omega;
        let state = &body.state;

        let position_error = target.position - state.pose.position;
        let force = (position_error * k - state.twist.linear * c) * body.mass_props.mass;

        let rotation_error = (target.rotation * state.pose.rotation.inverse()).scaled_axis();
        let inertia = body.mass_props.world_inertia(&state.pose.rotation);
        let torque = inertia * (rotation_error * k - state.twist.angular * c);

        (force, torque)
    }

    /// Free motion of the tool for one tick.
    ///
    /// Applies the coupling wrench to the root, moves the jaw hinge towards
    /// the grip, and advances every dynamic body of `world` under gravity and
    /// accumulated forces. Poses stay at the start of the tick; the returned
    /// states include tentative poses of both jaws.
    pub fn advance_free(
        &mut self,
        world: &mut World,
        dt: f64,
        device: &DevicePose,
        gravity: &Gravity,
    ) -> FreeMotion {
        let target = self.config.target_pose(device);
        let (force, torque) = self.coupling_wrench(world, &target);
        if let Some(root) = world.body_mut(self.root) {
            root.apply_force(force);
            root.apply_torque(torque);
        }

        self.update_opening(world, device.grip, dt);

        let mut motion = advance_free(world, gravity, dt);
        if let Some(root) = motion.get(self.root).copied() {
            let mut jaws = FreeMotion::default();
            for joint in &self.joints {
                let local = joint.local_pose(self.opening.position);
                let start = root.start.compose(&local);
                let offset = start.position - root.start.position;
                let twist = Twist::new(
                    root.tentative.twist.velocity_at_point(&offset),
                    root.tentative.twist.angular,
                );
                let tentative = RigidBodyState::new(root.tentative.pose.compose(&local), twist);
                jaws.states.push(FreeState {
                    id: joint.body,
                    start,
                    tentative,
                });
            }
            motion.merge(jaws);
        }
        motion
    }

    fn update_opening(&mut self, world: &mut World, grip: f64, dt: f64) {
        let limits = self.config.jaw_limits();
        let requested = grip * self.config.jaws.max_opening_angle;
        let max_step = limits.velocity_max * dt;
        let step = (requested - self.opening.position).clamp(-max_step, max_step);
        let moved = JointState::new(self.opening.position + step, step / dt);

        let (state, clamped) = moved.clamped(&limits);
        self.last_limit_event = clamped.then(|| {
            let event = SoftLimitEvent {
                requested: moved.position,
                clamped: state.position,
            };
            debug!(
                requested = event.requested,
                clamped = event.clamped,
                "grasper jaw hit hinge limit"
            );
            event
        });
        self.opening = state;

        for joint in &self.joints {
            if let Some(body) = world.body_mut(joint.body) {
                body.kind = BodyKind::Attached {
                    owner: self.root,
                    local: joint.local_pose(state.position),
                };
            }
        }
        world.sync_attached();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const DT: f64 = 0.01;

    fn reference_config() -> ToolConfig {
        ToolConfig::default()
            .with_offset_degrees(Point3::new(0.0, 0.0, 200.0), Vector3::new(0.0, -90.0, -90.0))
    }

    fn spawn(grip: f64) -> (World, ArticulatedTool) {
        let mut world = World::new();
        let device = DevicePose::rest().with_grip(grip);
        let tool = ArticulatedTool::spawn(&mut world, reference_config(), &device, DT).unwrap();
        (world, tool)
    }

    #[test]
    fn test_spawn_places_root_at_offset() {
        let (world, tool) = spawn(0.0);
        let pose = tool.root_pose(&world).unwrap();
        assert_relative_eq!(pose.position, Point3::new(0.0, 0.0, 200.0), epsilon = 1e-9);
        // Shaft axis points up; the jaws hang below.
        assert_relative_eq!(pose.transform_vector(&Vector3::z()), Vector3::y(), epsilon = 1e-12);
        assert_eq!(world.body_count(), 3);
    }

    #[test]
    fn test_device_x_moves_tool_along_world_z() {
        let config = reference_config();
        let device = DevicePose::at(Pose::from_position(Point3::new(-200.0, 0.0, 30.0)));
        let target = config.target_pose(&device);
        assert_relative_eq!(target.position, Point3::new(0.0, 30.0, 0.0), epsilon = 1e-9);
    }

    #[test]
    fn test_closed_jaws_hang_below_hinge() {
        let (world, tool) = spawn(0.0);
        let jaw = world.body(tool.joints()[0].body).unwrap();
        let shaft_half = tool.config().jaws.shaft_length / 2.0;
        let jaw_half = tool.config().jaws.jaw_length / 2.0;
        assert_relative_eq!(jaw.state.pose.position.y, -shaft_half - jaw_half, epsilon = 1e-9);
    }

    #[test]
    fn test_grip_opens_jaws_symmetrically_at_limited_speed() {
        let (mut world, mut tool) = spawn(0.0);
        let device = DevicePose::rest().with_grip(1.0);

        tool.advance_free(&mut world, DT, &device, &Gravity::zero());
        let expected = tool.config().jaw_speed * DT;
        assert_relative_eq!(tool.opening().position, expected, epsilon = 1e-12);
        assert_relative_eq!(tool.opening().velocity, tool.config().jaw_speed, epsilon = 1e-9);

        let j1 = world.body(tool.joints()[0].body).unwrap().state.pose.position;
        let j2 = world.body(tool.joints()[1].body).unwrap().state.pose.position;
        let root = tool.root_pose(&world).unwrap().position;
        assert_relative_eq!((j1 - root).norm(), (j2 - root).norm(), epsilon = 1e-9);
        assert!((j1 - j2).norm() > 0.0);
    }

    #[test]
    fn test_over_grip_is_soft_clamped() {
        let (mut world, mut tool) = spawn(1.0);
        let max = tool.config().jaws.max_opening_angle;
        assert_relative_eq!(tool.opening().position, max);

        tool.advance_free(&mut world, DT, &DevicePose::rest().with_grip(1.5), &Gravity::zero());
        let event = tool.last_limit_event().unwrap();
        assert_relative_eq!(event.clamped, max);
        assert!(event.requested > max);
        assert_eq!(tool.opening().velocity, 0.0);

        tool.advance_free(&mut world, DT, &DevicePose::rest().with_grip(0.5), &Gravity::zero());
        assert!(tool.last_limit_event().is_none());
    }

    #[test]
    fn test_coupling_at_target_is_free_fall() {
        let (mut world, mut tool) = spawn(0.0);
        let motion = tool.advance_free(&mut world, DT, &DevicePose::rest(), &Gravity::default());

        let root = world.body(tool.root()).unwrap();
        let fallen = Vector3::new(0.0, -9.81 * DT, 0.0);
        assert_relative_eq!(root.state.twist.linear, fallen, epsilon = 1e-12);
        assert_eq!(motion.states.len(), 3);
        let jaw = motion.get(tool.joints()[1].body).unwrap();
        assert!(jaw.tentative.pose.position.y < jaw.start.position.y);
    }

    #[test]
    fn test_coupling_pulls_towards_target() {
        let (mut world, mut tool) = spawn(0.0);
        let device = DevicePose::at(Pose::from_position(Point3::new(0.0, 0.0, 10.0)));
        for _ in 0..300 {
            let _ = tool.advance_free(&mut world, DT, &device, &Gravity::zero());
            let body = world.body_mut(tool.root()).unwrap();
            let twist = body.state.twist;
            body.state.pose.position += twist.linear * DT;
            world.sync_attached();
        }
        let pose = tool.root_pose(&world).unwrap();
        assert_relative_eq!(pose.position.y, 10.0, epsilon = 1e-3);
    }

    #[test]
    fn test_rejects_inverted_jaw_limits() {
        let jaws = GrasperJaws {
            max_opening_angle: -0.5,
            ..GrasperJaws::default()
        };
        let config = reference_config().with_jaws(jaws);
        let mut world = World::new();
        let err = ArticulatedTool::spawn(&mut world, config, &DevicePose::rest(), DT).unwrap_err();
        assert!(matches!(err, SimError::InvalidJointLimits { .. }));
        assert_eq!(world.body_count(), 0);
    }

    #[test]
    fn test_rejects_stiff_coupling() {
        let config = reference_config().with_coupling(CouplingConfig {
            frequency_hz: 50.0,
            damping_ratio: 1.0,
        });
        assert!(config.validate(DT).is_err());
        assert!(config.validate(0.001).is_ok());
    }
}
