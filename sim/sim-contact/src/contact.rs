//! Contact points and per-pair manifolds.

use nalgebra::{Point3, Vector3};
use smallvec::SmallVec;
use sim_types::BodyId;

use crate::ProximityParams;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A single contact between two bodies, produced fresh every tick.
///
/// The normal points from `body_b` towards `body_a`. `distance` is the signed
/// gap along that normal: positive when separated, negative when the surfaces
/// interpenetrate.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactPoint {
    /// First body (the normal points towards it).
    pub body_a: BodyId,
    /// Second body.
    pub body_b: BodyId,
    /// Contact location in world coordinates, on the surface of `body_a`.
    pub position: Point3<f64>,
    /// Unit contact normal, from `body_b` to `body_a`.
    pub normal: Vector3<f64>,
    /// Signed surface distance (negative = penetrating).
    pub distance: f64,
    /// First tangent direction.
    pub tangent1: Vector3<f64>,
    /// Second tangent direction, `normal × tangent1`.
    pub tangent2: Vector3<f64>,
    /// Geometric feature index within the pair (corner, endpoint, ...).
    pub feature: u32,
    /// Whether the contact is closer than the contact distance.
    pub active: bool,
}

impl ContactPoint {
    /// Create a contact and derive its tangent basis.
    ///
    /// The contact starts inactive; see [`ContactPoint::classify`].
    #[must_use]
    pub fn new(
        body_a: BodyId,
        body_b: BodyId,
        position: Point3<f64>,
        normal: Vector3<f64>,
        distance: f64,
        feature: u32,
    ) -> Self {
        let (tangent1, tangent2) = tangent_basis(&normal);
        Self {
            body_a,
            body_b,
            position,
            normal,
            distance,
            tangent1,
            tangent2,
            feature,
            active: false,
        }
    }

    /// Set the `active` flag from the contact distance threshold.
    #[must_use]
    pub fn classify(mut self, params: &ProximityParams) -> Self {
        self.active = params.is_active(self.distance);
        self
    }

    /// Whether the surfaces overlap.
    #[must_use]
    pub fn is_penetrating(&self) -> bool {
        self.distance < 0.0
    }

    /// Penetration depth (positive when overlapping, zero otherwise).
    #[must_use]
    pub fn penetration(&self) -> f64 {
        (-self.distance).max(0.0)
    }

    /// Key giving the reproducible processing order of contacts.
    #[must_use]
    pub fn sort_key(&self) -> (BodyId, BodyId, u32) {
        (self.body_a, self.body_b, self.feature)
    }
}

/// Build a right-handed orthonormal tangent basis for a unit normal.
///
/// The choice is a pure function of the normal, so identical contacts always
/// get identical friction directions.
#[must_use]
pub fn tangent_basis(normal: &Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
    let reference = if normal.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };

    let t1 = normal.cross(&reference).normalize();
    let t2 = normal.cross(&t1);
    (t1, t2)
}

/// Contact points of one body pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactManifold {
    /// First body of the pair.
    pub body_a: BodyId,
    /// Second body of the pair.
    pub body_b: BodyId,
    /// Points, at most four stored inline.
    pub points: SmallVec<[ContactPoint; 4]>,
}

impl ContactManifold {
    /// Create an empty manifold for a pair.
    #[must_use]
    pub fn new(body_a: BodyId, body_b: BodyId) -> Self {
        Self {
            body_a,
            body_b,
            points: SmallVec::new(),
        }
    }

    /// Add a point.
    pub fn push(&mut self, point: ContactPoint) {
        self.points.push(point);
    }

    /// Number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the manifold holds no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The deepest (smallest distance) point.
    #[must_use]
    pub fn deepest(&self) -> Option<&ContactPoint> {
        self.points
            .iter()
            .min_by(|a, b| a.distance.total_cmp(&b.distance).then(a.feature.cmp(&b.feature)))
    }

    /// Drop redundant points from the same surface patch.
    ///
    /// Points are visited deepest first; a point closer than `merge_distance`
    /// to an already kept one is dropped. At most `max_points` survive. The
    /// survivors are returned to ascending feature order.
    ///
    /// Returns the number of points removed.
    pub fn reduce(&mut self, merge_distance: f64, max_points: usize) -> usize {
        let before = self.points.len();
        let mut candidates = std::mem::take(&mut self.points);
        candidates
            .sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.feature.cmp(&b.feature)));

        let merge_sq = merge_distance * merge_distance;
        for candidate in candidates {
            if self.points.len() >= max_points {
                break;
            }
            let redundant = self
                .points
                .iter()
                .any(|kept| (kept.position - candidate.position).norm_squared() < merge_sq);
            if !redundant {
                self.points.push(candidate);
            }
        }

        self.points.sort_by_key(|p| p.feature);
        before - self.points.len()
    }
}
