//! Static obstacles.
//!
//! Scene files describe an obstacle by a name, a mesh scale and a world
//! bounding box. The box is what collides; the scale only matters to
//! renderers and is carried along unchanged.

use nalgebra::{Point3, Vector3};
use sim_types::{BodyId, Pose, SimError};

use crate::world::{Body, CollisionShape, World};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A static box obstacle.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RigidObstacle {
    /// Obstacle name, e.g. `Floor_01`.
    pub name: String,
    /// Visual mesh scale.
    pub size: Vector3<f64>,
    /// Lower corner of the collision box.
    pub min: Point3<f64>,
    /// Upper corner of the collision box.
    pub max: Point3<f64>,
}

impl RigidObstacle {
    /// Build an obstacle from its bounding box.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidGeometry`] unless `min < max` on every axis.
    pub fn from_extents(
        name: impl Into<String>,
        size: Vector3<f64>,
        min: Point3<f64>,
        max: Point3<f64>,
    ) -> sim_types::Result<Self> {
        let obstacle = Self {
            name: name.into(),
            size,
            min,
            max,
        };
        obstacle.validate()?;
        Ok(obstacle)
    }

    /// Check that the box is non-empty and finite.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidGeometry`] unless `min < max` on every axis.
    pub fn validate(&self) -> sim_types::Result<()> {
        let (min, max) = (self.min, self.max);
        let ordered = (0..3).all(|i| min[i].is_finite() && max[i].is_finite() && min[i] < max[i]);
        if !ordered {
            return Err(SimError::invalid_geometry(format!(
                "obstacle '{}' has an empty box: min {min:?}, max {max:?}",
                self.name
            )));
        }
        Ok(())
    }

    /// The `Floor_01` obstacle of the grasper scene.
    #[must_use]
    pub fn reference_floor() -> Self {
        Self {
            name: "Floor_01".to_string(),
            size: Vector3::new(6.0, 2.0, 6.0),
            min: Point3::new(-100.0, -20.0, -100.0),
            max: Point3::new(100.0, 0.0, 100.0),
        }
    }

    /// Center of the box.
    #[must_use]
    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    /// Half extents of the box.
    #[must_use]
    pub fn half_extents(&self) -> Vector3<f64> {
        (self.max - self.min) / 2.0
    }

    /// Top surface height (largest Y).
    #[must_use]
    pub fn top(&self) -> f64 {
        self.max.y
    }

    /// Add the obstacle to `world` as a static body.
    ///
    /// # Errors
    ///
    /// Returns an error if the box is empty or the world rejects the body.
    pub fn spawn(&self, world: &mut World) -> sim_types::Result<BodyId> {
        self.validate()?;
        let id = world.allocate_id();
        world.insert_body(
            Body::new_static(id, Pose::from_position(self.center()))
                .with_name(self.name.clone())
                .with_collision_shape(CollisionShape::box_shape(self.half_extents())),
        )?;
        Ok(id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_floor_box() {
        let floor = RigidObstacle::reference_floor();
        assert_eq!(floor.center(), Point3::new(0.0, -10.0, 0.0));
        assert_eq!(floor.half_extents(), Vector3::new(100.0, 10.0, 100.0));
        assert_eq!(floor.top(), 0.0);
    }

    #[test]
    fn test_spawn_static() {
        let mut world = World::new();
        let id = RigidObstacle::reference_floor().spawn(&mut world).unwrap();
        let body = world.body_by_name("Floor_01").unwrap();
        assert_eq!(body.id, id);
        assert!(body.is_static());
        assert_eq!(body.state.pose.position.y, -10.0);
    }

    #[test]
    fn test_rejects_inverted_box() {
        let err = RigidObstacle::from_extents(
            "bad",
            Vector3::repeat(1.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, 0.0, 1.0),
        )
        .unwrap_err();
        assert!(matches!(err, SimError::InvalidGeometry { .. }));

        let flat = RigidObstacle::from_extents(
            "flat",
            Vector3::repeat(1.0),
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 1.0),
        );
        assert!(flat.is_err());
    }
}
