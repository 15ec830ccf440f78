//! Broad-phase collision filtering.
//!
//! The broad phase reduces the set of body pairs handed to the narrow phase.
//! Every body with a collision shape gets a world-space AABB, swept along the
//! body's current twist over the query horizon and expanded by the margin
//! (at least the alarm distance). Two shapes that come closer than the alarm
//! distance during the tick always overlap: the output is a conservative
//! superset of the pairs that can produce contacts.
//!
//! Pairs are never reported when
//! - both bodies are static, or
//! - both bodies resolve to the same dynamic owner (segments of one tool).
//!
//! Output pairs are `(lower id, higher id)` in ascending order, independent
//! of the algorithm used.
//!
//! # Example
//!
//! ```
//! use sim_core::broad_phase::{BroadPhase, PairQuery, SweepAndPrune};
//! use sim_core::{Body, CollisionShape};
//! use sim_types::{BodyId, RigidBodyState, Pose, MassProperties};
//! use nalgebra::Point3;
//!
//! let bodies = vec![
//!     Body::new(
//!         BodyId::new(1),
//!         RigidBodyState::at_rest(Pose::from_position(Point3::new(0.0, 0.0, 0.0))),
//!         MassProperties::sphere(1.0, 0.5),
//!     ).with_collision_shape(CollisionShape::sphere(1.0)),
//!     Body::new(
//!         BodyId::new(2),
//!         RigidBodyState::at_rest(Pose::from_position(Point3::new(2.5, 0.0, 0.0))),
//!         MassProperties::sphere(1.0, 0.5),
//!     ).with_collision_shape(CollisionShape::sphere(1.0)),
//! ];
//!
//! // 0.5 apart: only reported once the margin covers the gap.
//! let still = PairQuery::default();
//! assert!(SweepAndPrune::new().find_potential_pairs(&bodies, still).is_empty());
//! let pairs = SweepAndPrune::new().find_potential_pairs(&bodies, PairQuery::new(0.3, 0.0));
//! assert_eq!(pairs, vec![(BodyId::new(1), BodyId::new(2))]);
//! ```

use nalgebra::{Point3, Vector3};
use sim_types::BodyId;

use crate::world::{Body, CollisionShape};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner of the bounding box.
    pub min: Point3<f64>,
    /// Maximum corner of the bounding box.
    pub max: Point3<f64>,
}

impl Aabb {
    /// Create a new AABB from minimum and maximum corners.
    #[must_use]
    pub const fn new(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self { min, max }
    }

    /// Create an AABB centered at a point with the given half-extents.
    #[must_use]
    pub fn from_center(center: Point3<f64>, half_extents: Vector3<f64>) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// World-space bounds of a body's collision shape.
    ///
    /// Returns `None` for bodies without a shape.
    #[must_use]
    pub fn of_body(body: &Body) -> Option<Self> {
        let shape = body.collision_shape.as_ref()?;
        let pose = &body.state.pose;
        let center = pose.position;

        let aabb = match shape {
            CollisionShape::Sphere { radius } => {
                Self::from_center(center, Vector3::repeat(*radius))
            }
            CollisionShape::Box { half_extents } => {
                // |R| h gives the half extents of the rotated box.
                let rotation = pose.rotation.to_rotation_matrix();
                let abs = rotation.matrix().abs();
                Self::from_center(center, abs * half_extents)
            }
            CollisionShape::Capsule {
                half_length,
                radius,
            } => {
                let axis = pose.transform_vector(&Vector3::new(0.0, 0.0, *half_length));
                Self::from_center(center, axis.abs() + Vector3::repeat(*radius))
            }
        };

        Some(aabb)
    }

    /// Bounds of a body's shape over the next `horizon` seconds at its
    /// current twist.
    ///
    /// Covers the translation from start to end plus the arc any point
    /// within the bounding radius traces while turning. The arc term is
    /// doubled to also cover the linearized carry of attached bodies.
    #[must_use]
    pub fn swept_of_body(body: &Body, horizon: f64) -> Option<Self> {
        let start = Self::of_body(body)?;
        if horizon <= 0.0 || body.is_static() {
            return Some(start);
        }
        let twist = &body.state.twist;
        let shift = twist.linear * horizon;
        let radius = body.collision_shape.as_ref().map_or(0.0, CollisionShape::bounding_radius);
        let turn = 2.0 * twist.angular.norm() * horizon * radius;

        let end_min = start.min + shift;
        let end_max = start.max + shift;
        let swept = Self {
            min: start.min.inf(&end_min),
            max: start.max.sup(&end_max),
        };
        Some(swept.expanded(turn))
    }

    /// Check if this AABB overlaps with another AABB.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Expand this AABB by a margin on all sides.
    #[must_use]
    pub fn expanded(&self, margin: f64) -> Self {
        let m = Vector3::repeat(margin);
        Self {
            min: self.min - m,
            max: self.max + m,
        }
    }

    /// Get the minimum value along a specific axis.
    #[must_use]
    pub fn min_on_axis(&self, axis: Axis) -> f64 {
        self.min[axis.index()]
    }

    /// Get the maximum value along a specific axis.
    #[must_use]
    pub fn max_on_axis(&self, axis: Axis) -> f64 {
        self.max[axis.index()]
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::new(Point3::origin(), Point3::origin())
    }
}

/// Coordinate axis for sweep direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// X-axis.
    X,
    /// Y-axis (up in haptic scenes).
    Y,
    /// Z-axis.
    Z,
}

impl Axis {
    const fn index(self) -> usize {
        match self {
            Self::X => 0,
            Self::Y => 1,
            Self::Z => 2,
        }
    }
}

/// Bounds expansion asked for by the caller of a broad phase.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PairQuery {
    /// Smallest margin to add to every AABB.
    pub margin: f64,
    /// Seconds of motion, at each body's current twist, the bounds cover.
    pub horizon: f64,
}

impl PairQuery {
    /// Query with the given margin floor and sweep horizon.
    #[must_use]
    pub const fn new(margin: f64, horizon: f64) -> Self {
        Self { margin, horizon }
    }
}

/// Trait for broad-phase collision detection algorithms.
pub trait BroadPhase: Send {
    /// Find all pairs of bodies that potentially collide.
    ///
    /// Implementations expand bounds by at least `query.margin` and sweep
    /// them over `query.horizon` (see [`Aabb::swept_of_body`]). Returns
    /// `(lower id, higher id)` pairs sorted ascending.
    fn find_potential_pairs(&mut self, bodies: &[Body], query: PairQuery) -> Vec<(BodyId, BodyId)>;
}

/// A body prepared for pair tests.
#[derive(Debug, Clone, Copy)]
struct Entry {
    id: BodyId,
    owner: BodyId,
    fixed: bool,
    aabb: Aabb,
}

impl Entry {
    fn collect(bodies: &[Body], margin: f64, query: PairQuery) -> Vec<Self> {
        let margin = margin.max(query.margin);
        bodies
            .iter()
            .filter_map(|body| {
                Aabb::swept_of_body(body, query.horizon).map(|aabb| Self {
                    id: body.id,
                    owner: body.owner(),
                    fixed: body.is_static(),
                    aabb: aabb.expanded(margin),
                })
            })
            .collect()
    }

    fn may_collide(&self, other: &Self) -> bool {
        !(self.fixed && other.fixed) && self.owner != other.owner
    }

    fn pair(&self, other: &Self) -> (BodyId, BodyId) {
        if self.id < other.id {
            (self.id, other.id)
        } else {
            (other.id, self.id)
        }
    }
}

fn finish(mut pairs: Vec<(BodyId, BodyId)>) -> Vec<(BodyId, BodyId)> {
    pairs.sort_unstable();
    pairs.dedup();
    pairs
}

/// Sweep-and-Prune (Sort-and-Sweep) broad-phase algorithm.
///
/// 1. Projects body AABBs onto the axis with the largest spread
/// 2. Sorts by minimum endpoint
/// 3. Sweeps to find overlapping intervals, then confirms on all axes
#[derive(Debug, Clone, Default)]
pub struct SweepAndPrune {
    entries: Vec<Entry>,
    margin: f64,
}

impl SweepAndPrune {
    /// Create a new sweep-and-prune broad phase.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Expand every AABB by `margin`.
    #[must_use]
    pub fn with_margin(mut self, margin: f64) -> Self {
        self.margin = margin;
        self
    }

    /// Pick the axis with the largest spread of AABB centers.
    fn choose_sweep_axis(entries: &[Entry]) -> Axis {
        let mut lo = Vector3::repeat(f64::INFINITY);
        let mut hi = Vector3::repeat(f64::NEG_INFINITY);
        for entry in entries {
            let c = nalgebra::center(&entry.aabb.min, &entry.aabb.max).coords;
            lo = lo.inf(&c);
            hi = hi.sup(&c);
        }
        let spread = hi - lo;

        if spread.x >= spread.y && spread.x >= spread.z {
            Axis::X
        } else if spread.y >= spread.z {
            Axis::Y
        } else {
            Axis::Z
        }
    }
}

impl BroadPhase for SweepAndPrune {
    fn find_potential_pairs(&mut self, bodies: &[Body], query: PairQuery) -> Vec<(BodyId, BodyId)> {
        self.entries = Entry::collect(bodies, self.margin, query);
        if self.entries.len() < 2 {
            return Vec::new();
        }

        let axis = Self::choose_sweep_axis(&self.entries);

        self.entries.sort_by(|a, b| {
            a.aabb
                .min_on_axis(axis)
                .total_cmp(&b.aabb.min_on_axis(axis))
                .then(a.id.cmp(&b.id))
        });

        let mut pairs = Vec::new();
        for (i, a) in self.entries.iter().enumerate() {
            let a_max = a.aabb.max_on_axis(axis);
            for b in &self.entries[i + 1..] {
                // Sorted by min: nothing further can overlap on the sweep axis.
                if b.aabb.min_on_axis(axis) > a_max {
                    break;
                }
                if a.may_collide(b) && a.aabb.overlaps(&b.aabb) {
                    pairs.push(a.pair(b));
                }
            }
        }

        finish(pairs)
    }
}

/// Simple O(n²) brute-force broad phase for small scenes.
#[derive(Debug, Clone, Default)]
pub struct BruteForce {
    margin: f64,
}

impl BruteForce {
    /// Create a new brute-force broad phase.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Expand every AABB by `margin`.
    #[must_use]
    pub fn with_margin(mut self, margin: f64) -> Self {
        self.margin = margin;
        self
    }
}

impl BroadPhase for BruteForce {
    fn find_potential_pairs(&mut self, bodies: &[Body], query: PairQuery) -> Vec<(BodyId, BodyId)> {
        let entries = Entry::collect(bodies, self.margin, query);
        let mut pairs = Vec::new();

        for (i, a) in entries.iter().enumerate() {
            for b in &entries[i + 1..] {
                if a.may_collide(b) && a.aabb.overlaps(&b.aabb) {
                    pairs.push(a.pair(b));
                }
            }
        }

        finish(pairs)
    }
}

/// Configuration for broad-phase collision detection.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BroadPhaseConfig {
    /// Algorithm to use for broad-phase detection.
    pub algorithm: BroadPhaseAlgorithm,
    /// Margin added to AABBs. A larger query margin takes precedence.
    pub margin: f64,
    /// Body count below which brute force is used in `Auto` mode.
    pub brute_force_threshold: usize,
}

impl Default for BroadPhaseConfig {
    fn default() -> Self {
        Self {
            algorithm: BroadPhaseAlgorithm::Auto,
            margin: 0.0,
            brute_force_threshold: 32,
        }
    }
}

impl BroadPhaseConfig {
    /// Default configuration with the given margin.
    #[must_use]
    pub fn with_margin(margin: f64) -> Self {
        Self {
            margin,
            ..Self::default()
        }
    }
}

/// Broad-phase algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BroadPhaseAlgorithm {
    /// Automatically choose based on body count.
    #[default]
    Auto,
    /// Always use brute force O(n²).
    BruteForce,
    /// Always use sweep-and-prune O(n log n).
    SweepAndPrune,
}

/// Broad phase that picks its algorithm from the configuration.
#[derive(Debug, Clone)]
pub struct BroadPhaseDetector {
    config: BroadPhaseConfig,
    sap: SweepAndPrune,
    brute: BruteForce,
}

impl Default for BroadPhaseDetector {
    fn default() -> Self {
        Self::new(BroadPhaseConfig::default())
    }
}

impl BroadPhaseDetector {
    /// Create a new broad-phase detector with the given configuration.
    #[must_use]
    pub fn new(config: BroadPhaseConfig) -> Self {
        Self {
            sap: SweepAndPrune::new().with_margin(config.margin),
            brute: BruteForce::new().with_margin(config.margin),
            config,
        }
    }

    /// Get the current configuration.
    #[must_use]
    pub fn config(&self) -> &BroadPhaseConfig {
        &self.config
    }
}

impl BroadPhase for BroadPhaseDetector {
    fn find_potential_pairs(&mut self, bodies: &[Body], query: PairQuery) -> Vec<(BodyId, BodyId)> {
        match self.config.algorithm {
            BroadPhaseAlgorithm::Auto => {
                if bodies.len() < self.config.brute_force_threshold {
                    self.brute.find_potential_pairs(bodies, query)
                } else {
                    self.sap.find_potential_pairs(bodies, query)
                }
            }
            BroadPhaseAlgorithm::BruteForce => self.brute.find_potential_pairs(bodies, query),
            BroadPhaseAlgorithm::SweepAndPrune => self.sap.find_potential_pairs(bodies, query),
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::cast_precision_loss
)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use sim_types::{MassProperties, Pose, RigidBodyState, Twist, UnitQuaternion};

    const STILL: PairQuery = PairQuery::new(0.0, 0.0);

    fn make_sphere_body(id: u64, pos: Point3<f64>, radius: f64) -> Body {
        Body::new(
            BodyId::new(id),
            RigidBodyState::at_rest(Pose::from_position(pos)),
            MassProperties::sphere(1.0, radius),
        )
        .with_collision_shape(CollisionShape::sphere(radius))
    }

    fn make_floor(id: u64) -> Body {
        Body::new_static(BodyId::new(id), Pose::from_position(Point3::new(0.0, -10.0, 0.0)))
            .with_collision_shape(CollisionShape::box_shape(Vector3::new(100.0, 10.0, 100.0)))
    }

    #[test]
    fn test_aabb_overlaps() {
        let a = Aabb::from_center(Point3::origin(), Vector3::new(1.0, 1.0, 1.0));
        let b = Aabb::from_center(Point3::new(1.5, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0));
        let c = Aabb::from_center(Point3::new(5.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0));

        assert!(a.overlaps(&b), "a and b should overlap");
        assert!(b.overlaps(&a), "overlap should be symmetric");
        assert!(!a.overlaps(&c), "a and c should not overlap");
    }

    #[test]
    fn test_aabb_expanded() {
        let aabb = Aabb::from_center(Point3::origin(), Vector3::new(1.0, 1.0, 1.0));
        let expanded = aabb.expanded(0.5);

        assert_eq!(expanded.min.x, -1.5);
        assert_eq!(expanded.max.x, 1.5);
        assert_eq!(expanded.max.y - expanded.min.y, 3.0);
    }

    #[test]
    fn test_rotated_capsule_bounds() {
        // Capsule along local Z, turned so it lies along world Y.
        let pose = Pose::from_position_rotation(
            Point3::origin(),
            UnitQuaternion::from_euler_angles(-std::f64::consts::FRAC_PI_2, 0.0, 0.0),
        );
        let body = Body::new(
            BodyId::new(1),
            RigidBodyState::at_rest(pose),
            MassProperties::sphere(1.0, 1.0),
        )
        .with_collision_shape(CollisionShape::capsule(2.0, 0.5));
        let aabb = Aabb::of_body(&body).unwrap();

        assert!((aabb.max.y - 2.5).abs() < 1e-12);
        assert!((aabb.max.x - 0.5).abs() < 1e-12);
        assert!((aabb.max.z - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_skips_static_static() {
        let bodies = vec![make_floor(1), make_floor(2)];
        assert!(SweepAndPrune::new().find_potential_pairs(&bodies, STILL).is_empty());
        assert!(BruteForce::new().find_potential_pairs(&bodies, STILL).is_empty());
    }

    #[test]
    fn test_skips_same_owner() {
        let shaft = make_sphere_body(1, Point3::origin(), 1.0);
        let jaw = Body::new_attached(BodyId::new(2), BodyId::new(1), Pose::identity())
            .with_collision_shape(CollisionShape::sphere(1.0));
        let bodies = vec![shaft, jaw, make_floor(3)];

        let pairs = BruteForce::new().with_margin(2.0).find_potential_pairs(&bodies, STILL);
        assert_eq!(
            pairs,
            vec![(BodyId::new(1), BodyId::new(3)), (BodyId::new(2), BodyId::new(3))]
        );
    }

    #[test]
    fn test_margin_is_conservative() {
        // Sphere 1.5 above the floor top: inside a 2.0 alarm distance.
        let bodies = vec![make_floor(1), make_sphere_body(2, Point3::new(0.0, 2.5, 0.0), 1.0)];
        assert!(BruteForce::new().find_potential_pairs(&bodies, STILL).is_empty());
        let pairs = BruteForce::new().with_margin(2.0).find_potential_pairs(&bodies, STILL);
        assert_eq!(pairs.len(), 1);
    }

    #[test]
    fn test_query_margin_is_a_floor() {
        let bodies = vec![make_floor(1), make_sphere_body(2, Point3::new(0.0, 2.5, 0.0), 1.0)];
        let alarm = PairQuery::new(2.0, 0.0);
        assert_eq!(BruteForce::new().find_potential_pairs(&bodies, alarm).len(), 1);
        assert_eq!(SweepAndPrune::new().find_potential_pairs(&bodies, alarm).len(), 1);
        assert_eq!(BroadPhaseDetector::default().find_potential_pairs(&bodies, alarm).len(), 1);
    }

    // =========================================================================
    // Swept bounds
    // =========================================================================

    #[test]
    fn test_swept_bounds_cover_translation() {
        let mut body = make_sphere_body(1, Point3::new(0.0, 10.0, 0.0), 1.0);
        body.state.twist = Twist::linear(Vector3::new(0.0, -800.0, 0.0));
        let aabb = Aabb::swept_of_body(&body, 0.01).unwrap();

        assert_eq!(aabb.max.y, 11.0);
        assert_eq!(aabb.min.y, 1.0);
        assert_eq!(aabb.min.x, -1.0);
        assert_eq!(Aabb::swept_of_body(&body, 0.0), Aabb::of_body(&body));
    }

    #[test]
    fn test_swept_bounds_cover_rotation() {
        let mut body = make_sphere_body(1, Point3::origin(), 1.0);
        body.state.twist = Twist::new(Vector3::zeros(), Vector3::new(0.0, 0.0, 10.0));
        let aabb = Aabb::swept_of_body(&body, 0.01).unwrap();
        assert!((aabb.max.x - 1.2).abs() < 1e-12);
    }

    #[test]
    fn test_fast_body_meets_the_floor_it_is_heading_for() {
        // 8 above the floor top, moving 9 per tick.
        let mut ball = make_sphere_body(2, Point3::new(0.0, 9.0, 0.0), 1.0);
        ball.state.twist = Twist::linear(Vector3::new(0.0, -900.0, 0.0));
        let bodies = vec![make_floor(1), ball];

        let frozen = PairQuery::new(2.0, 0.0);
        let per_tick = PairQuery::new(2.0, 0.01);
        assert!(BruteForce::new().find_potential_pairs(&bodies, frozen).is_empty());
        let pairs = BruteForce::new().find_potential_pairs(&bodies, per_tick);
        assert_eq!(pairs, vec![(BodyId::new(1), BodyId::new(2))]);
        assert_eq!(SweepAndPrune::new().find_potential_pairs(&bodies, per_tick), pairs);
    }

    #[test]
    fn test_static_bodies_are_not_swept() {
        let mut floor = make_floor(1);
        floor.state.twist = Twist::linear(Vector3::new(0.0, 100.0, 0.0));
        assert_eq!(Aabb::swept_of_body(&floor, 1.0), Aabb::of_body(&floor));
    }

    #[test]
    fn test_output_is_sorted_by_id() {
        let bodies = vec![
            make_sphere_body(9, Point3::new(0.0, 0.0, 0.0), 1.0),
            make_sphere_body(3, Point3::new(1.0, 0.0, 0.0), 1.0),
            make_sphere_body(5, Point3::new(0.5, 0.5, 0.0), 1.0),
        ];
        let pairs = SweepAndPrune::new().find_potential_pairs(&bodies, STILL);
        assert_eq!(
            pairs,
            vec![
                (BodyId::new(3), BodyId::new(5)),
                (BodyId::new(3), BodyId::new(9)),
                (BodyId::new(5), BodyId::new(9)),
            ]
        );
    }

    #[test]
    fn test_detector_auto_switches() {
        let bodies: Vec<Body> = (0..40)
            .map(|i| make_sphere_body(i, Point3::new(i as f64 * 1.5, 0.0, 0.0), 1.0))
            .collect();
        let mut detector = BroadPhaseDetector::default();
        let pairs = detector.find_potential_pairs(&bodies, STILL);
        assert_eq!(pairs.len(), 39);
        assert_eq!(pairs, BruteForce::new().find_potential_pairs(&bodies, STILL));
    }

    proptest! {
        #[test]
        fn prop_sap_matches_brute_force(
            positions in proptest::collection::vec(
                (-10.0..10.0f64, -10.0..10.0f64, -10.0..10.0f64),
                0..24,
            ),
            margin in 0.0..2.0f64,
        ) {
            let bodies: Vec<Body> = positions
                .iter()
                .enumerate()
                .map(|(i, &(x, y, z))| make_sphere_body(i as u64, Point3::new(x, y, z), 0.75))
                .collect();

            let sap = SweepAndPrune::new().with_margin(margin).find_potential_pairs(&bodies, STILL);
            let brute = BruteForce::new().with_margin(margin).find_potential_pairs(&bodies, STILL);
            prop_assert_eq!(sap, brute);
        }
    }
}
