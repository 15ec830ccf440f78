//! Rigid body state types.
//!
//! Pose, velocity and mass data for the six-degree-of-freedom bodies that make
//! up a haptic scene: tool segments, free props and static obstacles.

use nalgebra::{Isometry3, Matrix3, Point3, UnitQuaternion, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Tolerance on `|q| - 1` above which an orientation is considered drifted.
pub const NORMALIZATION_TOLERANCE: f64 = 1e-9;

/// Unique identifier for a rigid body in the simulation.
///
/// Ordering follows the raw value, which is what gives the collision and
/// solver stages their reproducible processing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BodyId(pub u64);

impl BodyId {
    /// Create a new body ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl From<u64> for BodyId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for BodyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Body({})", self.0)
    }
}

/// Position and orientation of a rigid body.
///
/// # Example
///
/// ```
/// use sim_types::Pose;
/// use nalgebra::Point3;
///
/// let pose = Pose::from_position(Point3::new(1.0, 2.0, 3.0));
/// let world = pose.transform_point(&Point3::new(1.0, 0.0, 0.0));
/// assert_eq!(world, Point3::new(2.0, 2.0, 3.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Pose {
    /// Position in world coordinates.
    pub position: Point3<f64>,
    /// Orientation as a unit quaternion.
    pub rotation: UnitQuaternion<f64>,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    /// Create an identity pose (origin, no rotation).
    #[must_use]
    pub fn identity() -> Self {
        Self {
            position: Point3::origin(),
            rotation: UnitQuaternion::identity(),
        }
    }

    /// Create a pose from position only (identity rotation).
    #[must_use]
    pub fn from_position(position: Point3<f64>) -> Self {
        Self {
            position,
            rotation: UnitQuaternion::identity(),
        }
    }

    /// Create a pose from position and rotation.
    #[must_use]
    pub const fn from_position_rotation(
        position: Point3<f64>,
        rotation: UnitQuaternion<f64>,
    ) -> Self {
        Self { position, rotation }
    }

    /// Create a pose from a position and XYZ Euler angles given in degrees.
    ///
    /// The rotation is `Rz(z) * Ry(y) * Rx(x)`, the convention scene files use
    /// for placing tools and obstacles.
    #[must_use]
    pub fn from_euler_degrees(position: Point3<f64>, degrees: Vector3<f64>) -> Self {
        Self {
            position,
            rotation: UnitQuaternion::from_euler_angles(
                degrees.x.to_radians(),
                degrees.y.to_radians(),
                degrees.z.to_radians(),
            ),
        }
    }

    /// Convert to an isometry.
    #[must_use]
    pub fn to_isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(self.position.coords.into(), self.rotation)
    }

    /// Transform a point from local to world coordinates.
    #[must_use]
    pub fn transform_point(&self, local: &Point3<f64>) -> Point3<f64> {
        self.position + self.rotation * local.coords
    }

    /// Transform a vector from local to world coordinates (rotation only).
    #[must_use]
    pub fn transform_vector(&self, local: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * local
    }

    /// Transform a point from world to local coordinates.
    #[must_use]
    pub fn inverse_transform_point(&self, world: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation.inverse() * (world - self.position))
    }

    /// Transform a vector from world to local coordinates.
    #[must_use]
    pub fn inverse_transform_vector(&self, world: &Vector3<f64>) -> Vector3<f64> {
        self.rotation.inverse() * world
    }

    /// Compose two poses: `self * other`.
    #[must_use]
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            position: self.transform_point(&other.position),
            rotation: self.rotation * other.rotation,
        }
    }

    /// Shift the pose by a world-space offset.
    #[must_use]
    pub fn translated(&self, offset: &Vector3<f64>) -> Self {
        Self {
            position: self.position + offset,
            rotation: self.rotation,
        }
    }

    /// Whether the underlying quaternion is within
    /// [`NORMALIZATION_TOLERANCE`] of unit length.
    #[must_use]
    pub fn is_normalized(&self) -> bool {
        (self.rotation.quaternion().norm() - 1.0).abs() <= NORMALIZATION_TOLERANCE
    }

    /// Re-project the orientation onto the unit sphere.
    ///
    /// Repeated quaternion products accumulate rounding drift; the integrator
    /// calls this after every position update.
    pub fn renormalize(&mut self) {
        self.rotation = UnitQuaternion::new_normalize(*self.rotation.quaternion());
    }

    /// Check if the pose contains `NaN` or `Inf` values.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.position.coords.iter().all(|x| x.is_finite())
            && self.rotation.coords.iter().all(|x| x.is_finite())
    }
}

/// Linear and angular velocity of a rigid body.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Twist {
    /// Linear velocity of the reference point in world coordinates.
    pub linear: Vector3<f64>,
    /// Angular velocity in world coordinates (rad/s).
    pub angular: Vector3<f64>,
}

impl Default for Twist {
    fn default() -> Self {
        Self::zero()
    }
}

impl Twist {
    /// Create a twist with specified linear and angular velocity.
    #[must_use]
    pub const fn new(linear: Vector3<f64>, angular: Vector3<f64>) -> Self {
        Self { linear, angular }
    }

    /// Create a zero twist (at rest).
    #[must_use]
    pub fn zero() -> Self {
        Self {
            linear: Vector3::zeros(),
            angular: Vector3::zeros(),
        }
    }

    /// Create a twist with linear velocity only.
    #[must_use]
    pub fn linear(v: Vector3<f64>) -> Self {
        Self {
            linear: v,
            angular: Vector3::zeros(),
        }
    }

    /// Velocity of a point at `offset` from the reference point.
    ///
    /// `v_point = v + ω × r`
    #[must_use]
    pub fn velocity_at_point(&self, offset: &Vector3<f64>) -> Vector3<f64> {
        self.linear + self.angular.cross(offset)
    }

    /// Kinetic energy given mass and a world-frame inertia tensor.
    #[must_use]
    pub fn kinetic_energy(&self, mass: f64, inertia: &Matrix3<f64>) -> f64 {
        0.5 * mass * self.linear.norm_squared() + 0.5 * self.angular.dot(&(inertia * self.angular))
    }

    /// Check if the twist contains `NaN` or `Inf` values.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.linear.iter().all(|x| x.is_finite()) && self.angular.iter().all(|x| x.is_finite())
    }
}

/// Complete kinematic state of a rigid body.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RigidBodyState {
    /// Position and orientation.
    pub pose: Pose,
    /// Linear and angular velocity.
    pub twist: Twist,
}

impl RigidBodyState {
    /// Create a state from pose and twist.
    #[must_use]
    pub const fn new(pose: Pose, twist: Twist) -> Self {
        Self { pose, twist }
    }

    /// Create a state at rest at the given pose.
    #[must_use]
    pub fn at_rest(pose: Pose) -> Self {
        Self {
            pose,
            twist: Twist::zero(),
        }
    }

    /// Check if the state contains `NaN` or `Inf` values.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.pose.is_finite() && self.twist.is_finite()
    }
}

/// Mass properties of a rigid body.
///
/// A body with infinite (or zero) mass is static: it has zero inverse mass and
/// zero inverse inertia, so constraint impulses never move it.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MassProperties {
    /// Total mass.
    pub mass: f64,
    /// Center of mass offset from body origin in local coordinates.
    pub center_of_mass: Vector3<f64>,
    /// Inertia tensor about the center of mass in local coordinates.
    pub inertia: Matrix3<f64>,
}

impl MassProperties {
    /// Create mass properties with given values.
    #[must_use]
    pub const fn new(mass: f64, center_of_mass: Vector3<f64>, inertia: Matrix3<f64>) -> Self {
        Self {
            mass,
            center_of_mass,
            inertia,
        }
    }

    /// Mass properties of an immovable body.
    #[must_use]
    pub fn infinite() -> Self {
        Self {
            mass: f64::INFINITY,
            center_of_mass: Vector3::zeros(),
            inertia: Matrix3::zeros(),
        }
    }

    /// Uniform solid sphere: `I = (2/5) m r²`.
    #[must_use]
    pub fn sphere(mass: f64, radius: f64) -> Self {
        let i = 0.4 * mass * radius * radius;
        Self {
            mass,
            center_of_mass: Vector3::zeros(),
            inertia: Matrix3::from_diagonal_element(i),
        }
    }

    /// Uniform solid box with the given half extents.
    #[must_use]
    pub fn box_shape(mass: f64, half_extents: Vector3<f64>) -> Self {
        let x2 = 4.0 * half_extents.x * half_extents.x;
        let y2 = 4.0 * half_extents.y * half_extents.y;
        let z2 = 4.0 * half_extents.z * half_extents.z;

        Self {
            mass,
            center_of_mass: Vector3::zeros(),
            inertia: Matrix3::from_diagonal(&Vector3::new(
                mass * (y2 + z2) / 12.0,
                mass * (x2 + z2) / 12.0,
                mass * (x2 + y2) / 12.0,
            )),
        }
    }

    /// Solid capsule aligned with the local Z axis.
    ///
    /// Approximated as a cylinder of length `2 * half_length + 2 * radius`;
    /// tool shafts are long and thin, so the cap correction is negligible.
    #[must_use]
    pub fn capsule(mass: f64, radius: f64, half_length: f64) -> Self {
        let r2 = radius * radius;
        let h = 2.0 * (half_length + radius);
        let ixx = mass * (3.0 * r2 + h * h) / 12.0;
        let izz = 0.5 * mass * r2;

        Self {
            mass,
            center_of_mass: Vector3::zeros(),
            inertia: Matrix3::from_diagonal(&Vector3::new(ixx, ixx, izz)),
        }
    }

    /// Inverse mass (0 if the body is static).
    #[must_use]
    pub fn inverse_mass(&self) -> f64 {
        if self.is_static() {
            0.0
        } else {
            1.0 / self.mass
        }
    }

    /// Inverse inertia in world coordinates for the given orientation.
    ///
    /// `I_w⁻¹ = R I⁻¹ Rᵀ`. Static bodies and singular tensors yield zero.
    #[must_use]
    pub fn world_inverse_inertia(&self, rotation: &UnitQuaternion<f64>) -> Matrix3<f64> {
        if self.is_static() {
            return Matrix3::zeros();
        }
        let Some(local_inv) = self.inertia.try_inverse() else {
            return Matrix3::zeros();
        };
        let r = rotation.to_rotation_matrix();
        r.matrix() * local_inv * r.matrix().transpose()
    }

    /// Inertia tensor in world coordinates for the given orientation.
    #[must_use]
    pub fn world_inertia(&self, rotation: &UnitQuaternion<f64>) -> Matrix3<f64> {
        let r = rotation.to_rotation_matrix();
        r.matrix() * self.inertia * r.matrix().transpose()
    }

    /// Check if this represents a static (immovable) body.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.mass <= 0.0 || self.mass.is_infinite()
    }

    /// Validate that the mass properties are physically valid.
    pub fn validate(&self) -> crate::Result<()> {
        if self.mass < 0.0 {
            return Err(crate::SimError::invalid_mass("mass cannot be negative"));
        }

        if !self.mass.is_finite() && self.mass != f64::INFINITY {
            return Err(crate::SimError::invalid_mass(
                "mass must be finite or infinity (static)",
            ));
        }

        if !self.center_of_mass.iter().all(|x| x.is_finite()) {
            return Err(crate::SimError::invalid_mass(
                "center of mass must be finite",
            ));
        }

        let eigenvalues = self.inertia.symmetric_eigenvalues();
        if eigenvalues.iter().any(|&e| e < -1e-10) {
            return Err(crate::SimError::invalid_mass(
                "inertia tensor must be positive semi-definite",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_body_id_ordering() {
        let mut ids = vec![BodyId::new(3), BodyId::new(1), BodyId::new(2)];
        ids.sort();
        assert_eq!(ids, vec![BodyId::new(1), BodyId::new(2), BodyId::new(3)]);
        assert_eq!(BodyId::new(7).to_string(), "Body(7)");
    }

    #[test]
    fn test_euler_degrees_reference_tool_placement() {
        // [0, -90, -90] maps local +Z to world +Y.
        let pose =
            Pose::from_euler_degrees(Point3::new(0.0, 0.0, 200.0), Vector3::new(0.0, -90.0, -90.0));
        let up = pose.transform_vector(&Vector3::z());
        assert_relative_eq!(up, Vector3::y(), epsilon = 1e-12);
        assert_relative_eq!(pose.position.z, 200.0);
    }

    #[test]
    fn test_pose_compose_and_inverse_point() {
        let parent = Pose::from_position_rotation(
            Point3::new(1.0, 2.0, 3.0),
            UnitQuaternion::from_euler_angles(0.3, -0.2, 0.9),
        );
        let child = Pose::from_position(Point3::new(0.0, 0.0, -5.0));
        let world = parent.compose(&child);

        let back = parent.inverse_transform_point(&world.position);
        assert_relative_eq!(back.coords, child.position.coords, epsilon = 1e-12);
    }

    #[test]
    fn test_renormalize_restores_unit_quaternion() {
        let mut pose = Pose::identity();
        // Bypass the unit wrapper to simulate accumulated drift.
        let drifted = nalgebra::Quaternion::new(1.001, 0.0, 0.0, 0.0);
        pose.rotation = UnitQuaternion::new_unchecked(drifted);
        assert!(!pose.is_normalized());
        pose.renormalize();
        assert!(pose.is_normalized());
    }

    #[test]
    fn test_twist_velocity_at_point() {
        let twist = Twist::new(Vector3::zeros(), Vector3::new(0.0, 0.0, 1.0));
        let v = twist.velocity_at_point(&Vector3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(v.y, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_static_mass_has_zero_inverse() {
        let props = MassProperties::infinite();
        assert!(props.is_static());
        assert_eq!(props.inverse_mass(), 0.0);
        assert_eq!(
            props.world_inverse_inertia(&UnitQuaternion::identity()),
            Matrix3::zeros()
        );
        assert!(props.validate().is_ok());
    }

    #[test]
    fn test_world_inverse_inertia_rotates() {
        let props = MassProperties::box_shape(12.0, Vector3::new(0.5, 1.0, 1.5));
        let rot = UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_2);
        let inv = props.world_inverse_inertia(&rot);
        let local_inv = props.inertia.try_inverse().unwrap();
        // A quarter turn about Z swaps the X and Y principal axes.
        assert_relative_eq!(inv[(0, 0)], local_inv[(1, 1)], epsilon = 1e-12);
        assert_relative_eq!(inv[(1, 1)], local_inv[(0, 0)], epsilon = 1e-12);
    }

    #[test]
    fn test_capsule_inertia_is_axisymmetric() {
        let props = MassProperties::capsule(2.0, 0.5, 4.0);
        assert_relative_eq!(props.inertia[(0, 0)], props.inertia[(1, 1)]);
        assert!(props.inertia[(2, 2)] < props.inertia[(0, 0)]);
    }

    #[test]
    fn test_negative_mass_rejected() {
        let props = MassProperties::new(-1.0, Vector3::zeros(), Matrix3::identity());
        let err = props.validate().unwrap_err();
        assert!(err.to_string().contains("negative"));
    }
}
