//! Simulation world container and entity management.
//!
//! The [`World`] owns every rigid body of a scene in insertion order. Three
//! kinds of bodies exist:
//!
//! - **Dynamic** bodies are integrated and receive contact impulses.
//! - **Static** bodies never move (obstacles).
//! - **Attached** bodies are collision geometry rigidly carried by a dynamic
//!   owner. Their pose is recomputed from the owner after every integration
//!   step, and their contacts act on the owner.

use hashbrown::HashMap;
use nalgebra::{Point3, Vector3};
use sim_constraint::SolverBody;
use sim_types::{BodyId, MassProperties, Pose, RigidBodyState, SimError, Twist};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Collision shape for contact detection.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CollisionShape {
    /// Sphere with given radius.
    Sphere {
        /// Sphere radius.
        radius: f64,
    },
    /// Box with given half-extents.
    Box {
        /// Half-extents along local X, Y, Z.
        half_extents: Vector3<f64>,
    },
    /// Capsule (cylinder with hemispherical caps) along the local Z axis.
    Capsule {
        /// Half-length of the cylindrical segment.
        half_length: f64,
        /// Radius of the capsule.
        radius: f64,
    },
}

impl CollisionShape {
    /// Create a sphere collision shape.
    #[must_use]
    pub fn sphere(radius: f64) -> Self {
        Self::Sphere { radius }
    }

    /// Create a box collision shape.
    #[must_use]
    pub fn box_shape(half_extents: Vector3<f64>) -> Self {
        Self::Box { half_extents }
    }

    /// Create a capsule collision shape.
    #[must_use]
    pub fn capsule(half_length: f64, radius: f64) -> Self {
        Self::Capsule {
            half_length,
            radius,
        }
    }

    /// Radius of a sphere around the local origin enclosing the shape.
    #[must_use]
    pub fn bounding_radius(&self) -> f64 {
        match self {
            Self::Sphere { radius } => *radius,
            Self::Box { half_extents } => half_extents.norm(),
            Self::Capsule {
                half_length,
                radius,
            } => half_length + radius,
        }
    }

    /// Get the capsule endpoints in world coordinates given a body pose.
    ///
    /// Returns None if this is not a capsule shape.
    #[must_use]
    pub fn capsule_endpoints(&self, pose: &Pose) -> Option<(Point3<f64>, Point3<f64>)> {
        match self {
            Self::Capsule { half_length, .. } => Some((
                pose.transform_point(&Point3::new(0.0, 0.0, -*half_length)),
                pose.transform_point(&Point3::new(0.0, 0.0, *half_length)),
            )),
            _ => None,
        }
    }

    /// Check that every dimension is positive and finite.
    pub fn validate(&self) -> sim_types::Result<()> {
        let positive = |d: f64| d.is_finite() && d > 0.0;
        let valid = match self {
            Self::Sphere { radius } => positive(*radius),
            Self::Box { half_extents } => half_extents.iter().all(|&d| positive(d)),
            Self::Capsule {
                half_length,
                radius,
            } => half_length.is_finite() && *half_length >= 0.0 && positive(*radius),
        };
        if valid {
            Ok(())
        } else {
            Err(SimError::invalid_geometry(format!(
                "shape dimensions must be positive and finite: {self:?}"
            )))
        }
    }
}

/// How a body takes part in the simulation.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BodyKind {
    /// Integrated, receives impulses.
    Dynamic,
    /// Immovable.
    Static,
    /// Rigidly carried by a dynamic owner at a fixed local pose.
    Attached {
        /// The dynamic body that carries this one.
        owner: BodyId,
        /// Pose relative to the owner's frame.
        local: Pose,
    },
}

/// A rigid body in the simulation world.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Body {
    /// Unique identifier.
    pub id: BodyId,
    /// Optional name for debugging.
    pub name: Option<String>,
    /// Current state (pose + twist).
    pub state: RigidBodyState,
    /// Mass properties (mass, inertia, COM offset).
    pub mass_props: MassProperties,
    /// Collision shape for contact detection.
    pub collision_shape: Option<CollisionShape>,
    /// Dynamic, static or attached.
    pub kind: BodyKind,
    /// Accumulated external force (cleared each step).
    pub accumulated_force: Vector3<f64>,
    /// Accumulated external torque (cleared each step).
    pub accumulated_torque: Vector3<f64>,
}

impl Body {
    /// Create a new dynamic body.
    #[must_use]
    pub fn new(id: BodyId, state: RigidBodyState, mass_props: MassProperties) -> Self {
        Self {
            id,
            name: None,
            state,
            mass_props,
            collision_shape: None,
            kind: BodyKind::Dynamic,
            accumulated_force: Vector3::zeros(),
            accumulated_torque: Vector3::zeros(),
        }
    }

    /// Create a static (immovable) body.
    #[must_use]
    pub fn new_static(id: BodyId, pose: Pose) -> Self {
        Self {
            kind: BodyKind::Static,
            ..Self::new(id, RigidBodyState::at_rest(pose), MassProperties::infinite())
        }
    }

    /// Create a body carried by `owner` at the local pose `local`.
    ///
    /// The world pose is filled in by [`World::sync_attached`].
    #[must_use]
    pub fn new_attached(id: BodyId, owner: BodyId, local: Pose) -> Self {
        Self {
            kind: BodyKind::Attached { owner, local },
            ..Self::new(id, RigidBodyState::at_rest(local), MassProperties::infinite())
        }
    }

    /// Set the body name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the collision shape.
    #[must_use]
    pub fn with_collision_shape(mut self, shape: CollisionShape) -> Self {
        self.collision_shape = Some(shape);
        self
    }

    /// Whether the body is integrated.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        matches!(self.kind, BodyKind::Dynamic)
    }

    /// Whether the body never moves.
    #[must_use]
    pub fn is_static(&self) -> bool {
        matches!(self.kind, BodyKind::Static)
    }

    /// The body receiving this body's contact impulses.
    #[must_use]
    pub fn owner(&self) -> BodyId {
        match self.kind {
            BodyKind::Attached { owner, .. } => owner,
            BodyKind::Dynamic | BodyKind::Static => self.id,
        }
    }

    /// Center of mass in world coordinates.
    #[must_use]
    pub fn center_of_mass(&self) -> Point3<f64> {
        self.state
            .pose
            .transform_point(&Point3::from(self.mass_props.center_of_mass))
    }

    /// Apply a force at the center of mass.
    pub fn apply_force(&mut self, force: Vector3<f64>) {
        if self.is_dynamic() {
            self.accumulated_force += force;
        }
    }

    /// Apply a torque.
    pub fn apply_torque(&mut self, torque: Vector3<f64>) {
        if self.is_dynamic() {
            self.accumulated_torque += torque;
        }
    }

    /// Apply a force at a world-space point.
    pub fn apply_force_at_point(&mut self, force: Vector3<f64>, point: Point3<f64>) {
        if self.is_dynamic() {
            let r = point - self.center_of_mass();
            self.accumulated_force += force;
            self.accumulated_torque += r.cross(&force);
        }
    }

    /// Clear accumulated forces and torques.
    pub fn clear_forces(&mut self) {
        self.accumulated_force = Vector3::zeros();
        self.accumulated_torque = Vector3::zeros();
    }

    /// Solver view of this body. Attached bodies must be resolved through
    /// their owner instead; see [`World::solver_body`].
    #[must_use]
    pub fn solver_body(&self) -> SolverBody {
        let center_of_mass = self.center_of_mass();
        if !self.is_dynamic() {
            return SolverBody::fixed(self.id, center_of_mass);
        }
        SolverBody {
            id: self.id,
            center_of_mass,
            twist: self.state.twist,
            inv_mass: self.mass_props.inverse_mass(),
            inv_inertia: self
                .mass_props
                .world_inverse_inertia(&self.state.pose.rotation),
        }
    }
}

/// The simulation world containing all bodies.
#[derive(Debug, Clone, Default)]
pub struct World {
    /// Bodies in insertion order.
    bodies: Vec<Body>,
    /// Body ID to position in `bodies`.
    index: HashMap<BodyId, usize>,
    /// Next available body ID.
    next_body_id: u64,
}

impl World {
    /// Create a new empty world.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Body Management
    // =========================================================================

    /// Number of bodies.
    #[must_use]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Reserve the next unused body ID.
    pub fn allocate_id(&mut self) -> BodyId {
        let id = BodyId::new(self.next_body_id);
        self.next_body_id += 1;
        id
    }

    /// Add a dynamic body and return its ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the mass properties are invalid.
    pub fn add_body(
        &mut self,
        state: RigidBodyState,
        mass_props: MassProperties,
    ) -> sim_types::Result<BodyId> {
        let id = self.allocate_id();
        self.insert_body(Body::new(id, state, mass_props))?;
        Ok(id)
    }

    /// Add a static body at the given pose.
    pub fn add_static_body(&mut self, pose: Pose) -> BodyId {
        let id = self.allocate_id();
        self.bodies.push(Body::new_static(id, pose));
        self.index.insert(id, self.bodies.len() - 1);
        id
    }

    /// Add a pre-built body to the world.
    ///
    /// # Errors
    ///
    /// Returns an error if the ID already exists, if a dynamic body has
    /// invalid or static mass properties, if the collision shape is
    /// malformed, or if an attached body's owner is missing or not dynamic.
    pub fn insert_body(&mut self, body: Body) -> sim_types::Result<()> {
        if self.index.contains_key(&body.id) {
            return Err(SimError::DuplicateBodyId(body.id.raw()));
        }
        if let Some(shape) = &body.collision_shape {
            shape.validate()?;
        }
        match body.kind {
            BodyKind::Dynamic => {
                body.mass_props.validate()?;
                if body.mass_props.is_static() {
                    return Err(SimError::invalid_mass(format!(
                        "dynamic body {} needs a positive finite mass, got {}",
                        body.id, body.mass_props.mass
                    )));
                }
            }
            BodyKind::Attached { owner, .. } => {
                if !self.body(owner).is_some_and(Body::is_dynamic) {
                    return Err(SimError::InvalidBodyId(owner.raw()));
                }
            }
            BodyKind::Static => {}
        }

        if body.id.raw() >= self.next_body_id {
            self.next_body_id = body.id.raw() + 1;
        }
        self.index.insert(body.id, self.bodies.len());
        self.bodies.push(body);
        self.sync_attached();
        Ok(())
    }

    /// Get a body by ID.
    #[must_use]
    pub fn body(&self, id: BodyId) -> Option<&Body> {
        self.index.get(&id).map(|&i| &self.bodies[i])
    }

    /// Get a mutable reference to a body by ID.
    #[must_use]
    pub fn body_mut(&mut self, id: BodyId) -> Option<&mut Body> {
        self.index.get(&id).map(|&i| &mut self.bodies[i])
    }

    /// Get a body by name.
    #[must_use]
    pub fn body_by_name(&self, name: &str) -> Option<&Body> {
        self.bodies
            .iter()
            .find(|b| b.name.as_deref() == Some(name))
    }

    /// All bodies in insertion order.
    #[must_use]
    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    /// Iterate over all bodies mutably.
    pub fn bodies_mut(&mut self) -> impl Iterator<Item = &mut Body> {
        self.bodies.iter_mut()
    }

    /// The body receiving impulses for `id`.
    #[must_use]
    pub fn owner_of(&self, id: BodyId) -> Option<BodyId> {
        self.body(id).map(Body::owner)
    }

    /// Solver view of the body that receives `id`'s contact impulses.
    #[must_use]
    pub fn solver_body(&self, id: BodyId) -> Option<SolverBody> {
        let owner = self.owner_of(id)?;
        self.body(owner).map(Body::solver_body)
    }

    /// Recompute attached bodies' poses and velocities from their owners.
    pub fn sync_attached(&mut self) {
        for i in 0..self.bodies.len() {
            let BodyKind::Attached { owner, local } = self.bodies[i].kind else {
                continue;
            };
            let Some(owner_state) = self.body(owner).map(|b| (b.state, b.center_of_mass())) else {
                continue;
            };
            let (state, com) = owner_state;
            let pose = state.pose.compose(&local);
            let twist = Twist::new(
                state.twist.velocity_at_point(&(pose.position - com)),
                state.twist.angular,
            );
            self.bodies[i].state = RigidBodyState::new(pose, twist);
        }
    }

    /// Clear accumulated forces on every body.
    pub fn clear_forces(&mut self) {
        for body in &mut self.bodies {
            body.clear_forces();
        }
    }

    /// Whether every body state is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.bodies.iter().all(|b| b.state.is_finite())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn dynamic_at(world: &mut World, y: f64) -> BodyId {
        world
            .add_body(
                RigidBodyState::at_rest(Pose::from_position(Point3::new(0.0, y, 0.0))),
                MassProperties::sphere(1.0, 0.5),
            )
            .unwrap()
    }

    #[test]
    fn test_ids_are_sequential() {
        let mut world = World::new();
        let a = dynamic_at(&mut world, 0.0);
        let b = world.add_static_body(Pose::identity());
        assert_eq!(a, BodyId::new(0));
        assert_eq!(b, BodyId::new(1));
        assert_eq!(world.body_count(), 2);
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        let mut world = World::new();
        let id = world.add_static_body(Pose::identity());
        let err = world.insert_body(Body::new_static(id, Pose::identity())).unwrap_err();
        assert_eq!(err, SimError::DuplicateBodyId(id.raw()));
    }

    #[test]
    fn test_dynamic_body_needs_finite_mass() {
        let mut world = World::new();
        let err = world
            .add_body(RigidBodyState::default(), MassProperties::infinite())
            .unwrap_err();
        assert!(matches!(err, SimError::InvalidMassProperties { .. }));

        let negative = MassProperties::sphere(-1.0, 0.5);
        assert!(world.add_body(RigidBodyState::default(), negative).is_err());
    }

    #[test]
    fn test_attached_requires_dynamic_owner() {
        let mut world = World::new();
        let floor = world.add_static_body(Pose::identity());
        let id = world.allocate_id();
        let err = world
            .insert_body(Body::new_attached(id, floor, Pose::identity()))
            .unwrap_err();
        assert_eq!(err, SimError::InvalidBodyId(floor.raw()));
    }

    #[test]
    fn test_attached_follows_owner() {
        let mut world = World::new();
        let owner = dynamic_at(&mut world, 1.0);
        let jaw = world.allocate_id();
        world
            .insert_body(
                Body::new_attached(jaw, owner, Pose::from_position(Point3::new(1.0, 0.0, 0.0)))
                    .with_collision_shape(CollisionShape::sphere(0.1)),
            )
            .unwrap();
        let carried = world.body(jaw).unwrap().state.pose.position;
        assert_relative_eq!(carried, Point3::new(1.0, 1.0, 0.0));

        let body = world.body_mut(owner).unwrap();
        body.state.pose.position.y = 3.0;
        body.state.twist = Twist::new(Vector3::zeros(), Vector3::new(0.0, 0.0, 2.0));
        world.sync_attached();

        let jaw_state = world.body(jaw).unwrap().state;
        assert_relative_eq!(jaw_state.pose.position, Point3::new(1.0, 3.0, 0.0));
        // ω × r = (0,0,2) × (1,0,0) = (0,2,0)
        assert_relative_eq!(jaw_state.twist.linear, Vector3::new(0.0, 2.0, 0.0), epsilon = 1e-12);

        assert_eq!(world.owner_of(jaw), Some(owner));
        assert_eq!(world.solver_body(jaw).unwrap().id, owner);
    }

    #[test]
    fn test_static_solver_body_is_fixed() {
        let mut world = World::new();
        let floor = world.add_static_body(Pose::identity());
        assert!(world.solver_body(floor).unwrap().is_static());
        assert!(world.solver_body(BodyId::new(42)).is_none());
    }

    #[test]
    fn test_shape_validation() {
        assert!(CollisionShape::sphere(0.0).validate().is_err());
        assert!(CollisionShape::capsule(0.0, 0.1).validate().is_ok());
        assert!(CollisionShape::capsule(-1.0, 0.1).validate().is_err());
        assert!(CollisionShape::box_shape(Vector3::new(1.0, f64::NAN, 1.0)).validate().is_err());
    }

    #[test]
    fn test_apply_force_ignored_on_static() {
        let mut world = World::new();
        let floor = world.add_static_body(Pose::identity());
        let body = world.body_mut(floor).unwrap();
        body.apply_force(Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(body.accumulated_force, Vector3::zeros());
    }
}
