//! Narrow-phase contact generation.
//!
//! For every candidate pair from the broad phase the narrow phase computes
//! signed distances between the two collision shapes and emits a
//! [`ContactPoint`] for each feature closer than the alarm distance. Points
//! closer than the contact distance are marked active.
//!
//! # Supported pairs
//!
//! | A \ B            | Box                | Sphere / Capsule          |
//! |------------------|--------------------|---------------------------|
//! | Sphere / Capsule | point vs box       | segment vs segment        |
//! | Box              | corners vs box     | point vs box (swapped)    |
//!
//! Point-versus-oriented-box proximity is the core primitive: sphere centers,
//! capsule endpoints and box corners are all tested against a box in its
//! local frame.
//!
//! # Orientation
//!
//! Within a pair, `body_a` is the moving side: if one body is static it is
//! always `body_b`. Normals point from B towards A.
//!
//! # Degenerate normals
//!
//! A query point on a box's mid-plane, or two coincident sphere centers, has
//! no unique separating direction. The normal of the same `(pair, feature)`
//! from the previous call is reused; without one, the box face normal (or
//! world up for round shapes) is used. Each fallback is counted.

use hashbrown::HashMap;
use nalgebra::{Point3, Vector3};
use sim_contact::{ContactManifold, ContactPoint, ProximityParams};
use sim_types::{BodyId, Pose};
use smallvec::SmallVec;
use tracing::debug;

use crate::world::{Body, CollisionShape, World};

const GEOMETRY_EPSILON: f64 = 1e-12;

type FeatureKey = (BodyId, BodyId, u32);

/// Contacts produced for one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NarrowPhaseOutput {
    /// Reported contacts, sorted by `(body_a, body_b, feature)`.
    pub contacts: Vec<ContactPoint>,
    /// Contacts whose normal came from the fallback path.
    pub degenerate_normals: usize,
    /// Candidate pairs examined.
    pub pairs_tested: usize,
}

impl NarrowPhaseOutput {
    /// Contacts handed to the solver.
    pub fn active(&self) -> impl Iterator<Item = &ContactPoint> {
        self.contacts.iter().filter(|c| c.active)
    }

    /// Number of active contacts.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active().count()
    }

    /// Deepest contact overall.
    #[must_use]
    pub fn deepest(&self) -> Option<&ContactPoint> {
        self.contacts
            .iter()
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }
}

/// A contact before its normal is resolved.
///
/// The contact position on A is `anchor - offset * normal`.
#[derive(Debug, Clone, Copy)]
struct RawContact {
    anchor: Point3<f64>,
    offset: f64,
    normal: Option<Vector3<f64>>,
    fallback: Vector3<f64>,
    distance: f64,
    feature: u32,
}

impl RawContact {
    /// Re-express a contact computed with the roles of A and B exchanged.
    fn swapped(self, feature_offset: u32) -> Self {
        Self {
            anchor: self.anchor,
            offset: -(self.offset + self.distance),
            normal: self.normal.map(|n| -n),
            fallback: -self.fallback,
            distance: self.distance,
            feature: self.feature + feature_offset,
        }
    }
}

type RawContacts = SmallVec<[RawContact; 8]>;

/// Narrow-phase contact generator.
#[derive(Debug, Clone)]
pub struct NarrowPhase {
    params: ProximityParams,
    normal_cache: HashMap<FeatureKey, Vector3<f64>>,
}

impl NarrowPhase {
    /// Create a generator with the given thresholds.
    #[must_use]
    pub fn new(params: ProximityParams) -> Self {
        Self {
            params,
            normal_cache: HashMap::new(),
        }
    }

    /// Proximity parameters in use.
    #[must_use]
    pub fn params(&self) -> &ProximityParams {
        &self.params
    }

    /// Forget cached normals.
    pub fn clear_cache(&mut self) {
        self.normal_cache.clear();
    }

    /// Generate contacts for the candidate pairs.
    ///
    /// Pairs referring to unknown bodies or bodies without shapes are
    /// skipped. The normal cache is replaced by this call's normals.
    pub fn generate(&mut self, world: &World, pairs: &[(BodyId, BodyId)]) -> NarrowPhaseOutput {
        let output = self.probe(world, pairs);
        self.normal_cache = output
            .contacts
            .iter()
            .map(|c| (c.sort_key(), c.normal))
            .collect();
        output
    }

    /// Like [`NarrowPhase::generate`] but leaves the normal cache untouched.
    #[must_use]
    pub fn probe(&self, world: &World, pairs: &[(BodyId, BodyId)]) -> NarrowPhaseOutput {
        #[cfg(feature = "parallel")]
        let results: Vec<(ContactManifold, usize)> = {
            use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
            pairs
                .par_iter()
                .filter_map(|&(a, b)| self.pair_manifold(world, a, b))
                .collect()
        };

        #[cfg(not(feature = "parallel"))]
        let results: Vec<(ContactManifold, usize)> = pairs
            .iter()
            .filter_map(|&(a, b)| self.pair_manifold(world, a, b))
            .collect();

        let mut output = NarrowPhaseOutput {
            pairs_tested: pairs.len(),
            ..NarrowPhaseOutput::default()
        };
        for (manifold, degenerate) in results {
            output.degenerate_normals += degenerate;
            output.contacts.extend(manifold.points);
        }
        output.contacts.sort_by_key(ContactPoint::sort_key);
        output
    }

    /// Contacts of one pair, reduced to a manifold.
    fn pair_manifold(
        &self,
        world: &World,
        id1: BodyId,
        id2: BodyId,
    ) -> Option<(ContactManifold, usize)> {
        let (mut a, mut b) = (world.body(id1)?, world.body(id2)?);
        if a.is_static() && !b.is_static() {
            std::mem::swap(&mut a, &mut b);
        }
        let shape_a = a.collision_shape?;
        let shape_b = b.collision_shape?;

        let raw = shape_contacts(&shape_a, &a.state.pose, &shape_b, &b.state.pose);

        let mut manifold = ContactManifold::new(a.id, b.id);
        let mut degenerate = 0;
        for contact in raw {
            if !self.params.is_reported(contact.distance) {
                continue;
            }
            let normal = match contact.normal {
                Some(n) => n,
                None => {
                    degenerate += 1;
                    let cached = self.normal_cache.get(&(a.id, b.id, contact.feature)).copied();
                    debug!(
                        body_a = %a.id,
                        body_b = %b.id,
                        feature = contact.feature,
                        cached = cached.is_some(),
                        "degenerate contact normal"
                    );
                    cached.unwrap_or(contact.fallback)
                }
            };
            manifold.push(
                ContactPoint::new(
                    a.id,
                    b.id,
                    contact.anchor - normal * contact.offset,
                    normal,
                    contact.distance,
                    contact.feature,
                )
                .classify(&self.params),
            );
        }

        manifold.reduce(self.params.merge_distance, self.params.max_contacts_per_pair);
        Some((manifold, degenerate))
    }
}

/// Signed-distance queries between two posed shapes.
///
/// Every feature is returned; the caller filters by distance.
fn shape_contacts(
    shape_a: &CollisionShape,
    pose_a: &Pose,
    shape_b: &CollisionShape,
    pose_b: &Pose,
) -> RawContacts {
    match (shape_a, shape_b) {
        (CollisionShape::Box { half_extents: ha }, CollisionShape::Box { half_extents: hb }) => {
            let mut out = box_corners_vs_box(ha, pose_a, hb, pose_b);
            out.extend(
                box_corners_vs_box(hb, pose_b, ha, pose_a)
                    .into_iter()
                    .map(|c| c.swapped(8)),
            );
            out
        }
        (CollisionShape::Box { .. }, _) => shape_contacts(shape_b, pose_b, shape_a, pose_a)
            .into_iter()
            .map(|c| c.swapped(0))
            .collect(),
        (round, CollisionShape::Box { half_extents }) => {
            let (points, radius) = query_points(round, pose_a, pose_b.position);
            points
                .into_iter()
                .enumerate()
                .map(|(feature, p)| {
                    let mut contact = point_vs_box(&p, half_extents, pose_b);
                    contact.offset = radius;
                    contact.distance -= radius;
                    contact.feature = u32::try_from(feature).unwrap_or(u32::MAX);
                    contact
                })
                .collect()
        }
        (round_a, round_b) => {
            let (a0, a1, ra) = core_segment(round_a, pose_a);
            let (b0, b1, rb) = core_segment(round_b, pose_b);
            let (pa, pb) = closest_segment_points(&a0, &a1, &b0, &b1);
            let diff = pa - pb;
            let length = diff.norm();
            let mut contacts = RawContacts::new();
            contacts.push(RawContact {
                anchor: pa,
                offset: ra,
                normal: (length > GEOMETRY_EPSILON).then(|| diff / length),
                fallback: Vector3::y(),
                distance: length - ra - rb,
                feature: 0,
            });
            contacts
        }
    }
}

/// Core segment and radius of a sphere or capsule.
fn core_segment(shape: &CollisionShape, pose: &Pose) -> (Point3<f64>, Point3<f64>, f64) {
    match shape {
        CollisionShape::Capsule { radius, .. } => {
            let (p0, p1) = shape
                .capsule_endpoints(pose)
                .unwrap_or((pose.position, pose.position));
            (p0, p1, *radius)
        }
        CollisionShape::Sphere { radius } => (pose.position, pose.position, *radius),
        CollisionShape::Box { half_extents } => (pose.position, pose.position, half_extents.min()),
    }
}

/// Points of a round shape tested against a box, and the shape radius.
///
/// A sphere contributes its center. A capsule contributes both endpoints
/// and the segment point closest to `target`.
fn query_points(
    shape: &CollisionShape,
    pose: &Pose,
    target: Point3<f64>,
) -> (SmallVec<[Point3<f64>; 3]>, f64) {
    let (p0, p1, radius) = core_segment(shape, pose);
    let mut points = SmallVec::new();
    points.push(p0);
    if let CollisionShape::Capsule { .. } = shape {
        points.push(p1);
        let axis = p1 - p0;
        let len_sq = axis.norm_squared();
        if len_sq > GEOMETRY_EPSILON {
            let s = ((target - p0).dot(&axis) / len_sq).clamp(0.0, 1.0);
            points.push(p0 + axis * s);
        }
    }
    (points, radius)
}

/// Signed distance from a world point to an oriented box surface.
///
/// The returned contact has zero offset; the normal points from the box
/// towards the point. Inside the box the exit direction is the face of
/// least penetration.
fn point_vs_box(point: &Point3<f64>, half_extents: &Vector3<f64>, box_pose: &Pose) -> RawContact {
    let q = box_pose.inverse_transform_point(point);
    let clamped = Point3::new(
        q.x.clamp(-half_extents.x, half_extents.x),
        q.y.clamp(-half_extents.y, half_extents.y),
        q.z.clamp(-half_extents.z, half_extents.z),
    );

    let outside = q - clamped;
    let gap = outside.norm();
    if gap > GEOMETRY_EPSILON {
        return RawContact {
            anchor: *point,
            offset: 0.0,
            normal: Some(box_pose.transform_vector(&(outside / gap))),
            fallback: box_pose.transform_vector(&(outside / gap)),
            distance: gap,
            feature: 0,
        };
    }

    // Inside or on the surface: least-penetration face.
    let mut axis = 0;
    let mut depth = f64::INFINITY;
    for i in 0..3 {
        let d = half_extents[i] - q[i].abs();
        if d < depth {
            depth = d;
            axis = i;
        }
    }

    let mut face = Vector3::zeros();
    face[axis] = if q[axis] < 0.0 { -1.0 } else { 1.0 };
    let face = box_pose.transform_vector(&face);
    let normal = (q[axis].abs() > GEOMETRY_EPSILON).then_some(face);

    RawContact {
        anchor: *point,
        offset: 0.0,
        normal,
        fallback: face,
        distance: -depth,
        feature: 0,
    }
}

/// The eight corners of box A tested against box B.
fn box_corners_vs_box(
    half_a: &Vector3<f64>,
    pose_a: &Pose,
    half_b: &Vector3<f64>,
    pose_b: &Pose,
) -> RawContacts {
    let mut contacts = RawContacts::new();
    for (feature, corner) in (0u32..8).map(|i| {
        let sign = |bit: u32| if i & bit == 0 { -1.0 } else { 1.0 };
        (
            i,
            Point3::new(sign(1) * half_a.x, sign(2) * half_a.y, sign(4) * half_a.z),
        )
    }) {
        let mut contact = point_vs_box(&pose_a.transform_point(&corner), half_b, pose_b);
        contact.feature = feature;
        contacts.push(contact);
    }
    contacts
}

/// Closest points between segments `p1 q1` and `p2 q2`.
fn closest_segment_points(
    p1: &Point3<f64>,
    q1: &Point3<f64>,
    p2: &Point3<f64>,
    q2: &Point3<f64>,
) -> (Point3<f64>, Point3<f64>) {
    let d1 = q1 - p1;
    let d2 = q2 - p2;
    let r = p1 - p2;
    let a = d1.norm_squared();
    let e = d2.norm_squared();
    let f = d2.dot(&r);

    if a <= GEOMETRY_EPSILON && e <= GEOMETRY_EPSILON {
        return (*p1, *p2);
    }

    let (s, t) = if a <= GEOMETRY_EPSILON {
        (0.0, (f / e).clamp(0.0, 1.0))
    } else {
        let c = d1.dot(&r);
        if e <= GEOMETRY_EPSILON {
            ((-c / a).clamp(0.0, 1.0), 0.0)
        } else {
            let b = d1.dot(&d2);
            let denom = a * e - b * b;
            let s = if denom > GEOMETRY_EPSILON {
                ((b * f - c * e) / denom).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let t = (b * s + f) / e;
            if t < 0.0 {
                ((-c / a).clamp(0.0, 1.0), 0.0)
            } else if t > 1.0 {
                (((b - c) / a).clamp(0.0, 1.0), 1.0)
            } else {
                (s, t)
            }
        }
    };

    (p1 + d1 * s, p2 + d2 * t)
}

/// Signed distance between the surfaces of two bodies.
///
/// The minimum over all generated features, or `None` if either body has
/// no shape.
#[must_use]
pub fn surface_distance(a: &Body, b: &Body) -> Option<f64> {
    let shape_a = a.collision_shape?;
    let shape_b = b.collision_shape?;
    shape_contacts(&shape_a, &a.state.pose, &shape_b, &b.state.pose)
        .iter()
        .map(|c| c.distance)
        .min_by(f64::total_cmp)
}
