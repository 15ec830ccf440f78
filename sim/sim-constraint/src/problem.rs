//! Assembly of the contact complementarity problem.
//!
//! Each active contact contributes three rows: one normal and two tangential.
//! For row `i` with direction `d` acting at point `p`, the Jacobian entry of a
//! body with center of mass `c` is
//!
//! ```text
//! J_i = [ d , (p - c) × d ]      for body A
//! J_i = [ -d, -(p - c) × d ]     for body B
//! ```
//!
//! and the problem relates impulses to post-impulse relative velocities:
//!
//! ```text
//! w = b + A λ,   A = J M⁻¹ Jᵀ (Delassus matrix),   b = J v (pre-contact velocity)
//! ```
//!
//! Normal rows carry a target: with gap `d ≥ 0` the contact may still close at
//! `d / dt` this step, so the row asks for `w_n ≥ -d / dt`; a penetrating
//! contact asks for `w_n ≥ 0`. Tangential rows target zero slip.

use hashbrown::HashMap;
use nalgebra::{DMatrix, DVector, Matrix3, Point3, Vector3};
use sim_contact::{ContactPoint, FrictionCone};
use sim_types::{BodyId, Twist};
use smallvec::SmallVec;
use tracing::debug;

/// Number of rows contributed by each contact.
pub const ROWS_PER_CONTACT: usize = 3;

/// Dynamic view of a body as seen by the solver.
///
/// Collision bodies rigidly attached to a dynamic owner resolve to the
/// owner's `SolverBody`, so their contacts push the owner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverBody {
    /// The body that receives impulses.
    pub id: BodyId,
    /// World-space center of mass.
    pub center_of_mass: Point3<f64>,
    /// Velocity of the center of mass and angular velocity.
    pub twist: Twist,
    /// Inverse mass (0 for static bodies).
    pub inv_mass: f64,
    /// Inverse inertia tensor in world frame.
    pub inv_inertia: Matrix3<f64>,
}

impl SolverBody {
    /// A body that never moves.
    #[must_use]
    pub fn fixed(id: BodyId, center_of_mass: Point3<f64>) -> Self {
        Self {
            id,
            center_of_mass,
            twist: Twist::zero(),
            inv_mass: 0.0,
            inv_inertia: Matrix3::zeros(),
        }
    }

    /// Whether impulses have no effect on this body.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.inv_mass == 0.0 && self.inv_inertia == Matrix3::zeros()
    }

    /// Velocity of a world-space point moving with the body.
    #[must_use]
    pub fn velocity_at(&self, point: &Point3<f64>) -> Vector3<f64> {
        self.twist.velocity_at_point(&(point - self.center_of_mass))
    }
}

/// Which constraint direction a row represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowKind {
    /// Non-penetration along the contact normal.
    Normal,
    /// Friction along the first tangent.
    Tangent1,
    /// Friction along the second tangent.
    Tangent2,
}

/// One body's share of a constraint row.
#[derive(Debug, Clone, Copy, PartialEq)]
struct JacobianEntry {
    body: usize,
    linear: Vector3<f64>,
    angular: Vector3<f64>,
}

/// A single constraint row.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintRow {
    /// Index of the contact in [`ConstraintProblem::contacts`].
    pub contact: usize,
    /// Direction of the row.
    pub kind: RowKind,
    entries: SmallVec<[JacobianEntry; 2]>,
}

/// Velocity change produced on one body by a set of impulses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocityDelta {
    /// Body receiving the change.
    pub body: BodyId,
    /// Change of linear velocity.
    pub linear: Vector3<f64>,
    /// Change of angular velocity.
    pub angular: Vector3<f64>,
}

/// Contact LCP for one tick.
///
/// Built from scratch every tick and discarded after the response stage.
#[derive(Debug, Clone)]
pub struct ConstraintProblem {
    contacts: Vec<ContactPoint>,
    bodies: Vec<SolverBody>,
    rows: Vec<ConstraintRow>,
    delassus: DMatrix<f64>,
    bias: DVector<f64>,
    target: DVector<f64>,
    friction: Vec<FrictionCone>,
}

impl ConstraintProblem {
    /// An empty problem.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            contacts: Vec::new(),
            bodies: Vec::new(),
            rows: Vec::new(),
            delassus: DMatrix::zeros(0, 0),
            bias: DVector::zeros(0),
            target: DVector::zeros(0),
            friction: Vec::new(),
        }
    }

    /// Build the problem from the active contacts in `contacts`.
    ///
    /// Inactive contacts (alarm band) are skipped. The rest are processed in
    /// ascending `(body_a, body_b, feature)` order regardless of the order
    /// the collision stage produced them in. `resolve` maps a collision body
    /// to the solver body that receives its impulses; contacts whose bodies
    /// cannot be resolved, or that resolve to a single owner, or to two
    /// static bodies, are dropped.
    pub fn assemble<F>(
        contacts: &[ContactPoint],
        resolve: F,
        friction: FrictionCone,
        dt: f64,
    ) -> Self
    where
        F: Fn(BodyId) -> Option<SolverBody>,
    {
        let mut active: Vec<ContactPoint> = contacts.iter().filter(|c| c.active).copied().collect();
        active.sort_by_key(ContactPoint::sort_key);

        let mut problem = Self::empty();
        let mut body_index: HashMap<BodyId, usize> = HashMap::new();
        let mut index_of = |body: SolverBody, bodies: &mut Vec<SolverBody>| -> usize {
            *body_index.entry(body.id).or_insert_with(|| {
                bodies.push(body);
                bodies.len() - 1
            })
        };

        for contact in active {
            let (Some(a), Some(b)) = (resolve(contact.body_a), resolve(contact.body_b)) else {
                debug!(
                    body_a = %contact.body_a,
                    body_b = %contact.body_b,
                    "skipping contact with unresolved body"
                );
                continue;
            };
            if a.id == b.id || (a.is_static() && b.is_static()) {
                continue;
            }

            let ia = index_of(a, &mut problem.bodies);
            let ib = index_of(b, &mut problem.bodies);
            let contact_index = problem.contacts.len();

            for (kind, direction) in [
                (RowKind::Normal, contact.normal),
                (RowKind::Tangent1, contact.tangent1),
                (RowKind::Tangent2, contact.tangent2),
            ] {
                let mut entries = SmallVec::new();
                for (index, sign) in [(ia, 1.0), (ib, -1.0)] {
                    let body = &problem.bodies[index];
                    if body.is_static() {
                        continue;
                    }
                    let lever = contact.position - body.center_of_mass;
                    entries.push(JacobianEntry {
                        body: index,
                        linear: direction * sign,
                        angular: lever.cross(&direction) * sign,
                    });
                }
                problem.rows.push(ConstraintRow {
                    contact: contact_index,
                    kind,
                    entries,
                });
            }

            problem.contacts.push(contact);
            problem.friction.push(friction);
        }

        problem.build_system(dt);
        problem
    }

    fn build_system(&mut self, dt: f64) {
        let n = self.rows.len();
        let mut delassus = DMatrix::zeros(n, n);
        let mut bias = DVector::zeros(n);
        let mut target = DVector::zeros(n);

        for (i, row) in self.rows.iter().enumerate() {
            bias[i] = row
                .entries
                .iter()
                .map(|e| {
                    let twist = &self.bodies[e.body].twist;
                    e.linear.dot(&twist.linear) + e.angular.dot(&twist.angular)
                })
                .sum();

            if row.kind == RowKind::Normal {
                target[i] = -self.contacts[row.contact].distance.max(0.0) / dt;
            }

            for j in i..n {
                let value = self.coupling(row, &self.rows[j]);
                delassus[(i, j)] = value;
                delassus[(j, i)] = value;
            }
        }

        self.delassus = delassus;
        self.bias = bias;
        self.target = target;
    }

    /// `J_i M⁻¹ J_jᵀ` over the bodies the two rows share.
    fn coupling(&self, row_i: &ConstraintRow, row_j: &ConstraintRow) -> f64 {
        let mut value = 0.0;
        for ei in &row_i.entries {
            for ej in row_j.entries.iter().filter(|ej| ej.body == ei.body) {
                let body = &self.bodies[ei.body];
                value += body.inv_mass * ei.linear.dot(&ej.linear)
                    + ei.angular.dot(&(body.inv_inertia * ej.angular));
            }
        }
        value
    }

    /// Problem dimension: three rows per active contact.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.rows.len()
    }

    /// Whether there is nothing to solve.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Active contacts in processing order.
    #[must_use]
    pub fn contacts(&self) -> &[ContactPoint] {
        &self.contacts
    }

    /// Bodies referenced by the problem.
    #[must_use]
    pub fn bodies(&self) -> &[SolverBody] {
        &self.bodies
    }

    /// Constraint rows, grouped three per contact.
    #[must_use]
    pub fn rows(&self) -> &[ConstraintRow] {
        &self.rows
    }

    /// The Delassus matrix `J M⁻¹ Jᵀ`.
    #[must_use]
    pub fn delassus(&self) -> &DMatrix<f64> {
        &self.delassus
    }

    /// Pre-contact relative velocity per row.
    #[must_use]
    pub fn bias(&self) -> &DVector<f64> {
        &self.bias
    }

    /// Velocity target per row (lower bound for normal rows).
    #[must_use]
    pub fn target(&self) -> &DVector<f64> {
        &self.target
    }

    /// Friction cone of a contact.
    #[must_use]
    pub fn friction(&self, contact: usize) -> FrictionCone {
        self.friction
            .get(contact)
            .copied()
            .unwrap_or_else(FrictionCone::frictionless)
    }

    /// Relative velocities after applying `lambda`: `w = b + A λ`.
    #[must_use]
    pub fn relative_velocity(&self, lambda: &DVector<f64>) -> DVector<f64> {
        &self.bias + &self.delassus * lambda
    }

    /// Velocity changes `M⁻¹ Jᵀ λ` on every dynamic body.
    #[must_use]
    pub fn velocity_deltas(&self, lambda: &DVector<f64>) -> Vec<VelocityDelta> {
        let mut deltas: Vec<VelocityDelta> = self
            .bodies
            .iter()
            .map(|b| VelocityDelta {
                body: b.id,
                linear: Vector3::zeros(),
                angular: Vector3::zeros(),
            })
            .collect();

        for (row, &l) in self.rows.iter().zip(lambda.iter()) {
            for e in &row.entries {
                let body = &self.bodies[e.body];
                deltas[e.body].linear += e.linear * (body.inv_mass * l);
                deltas[e.body].angular += body.inv_inertia * e.angular * l;
            }
        }

        deltas
            .into_iter()
            .zip(&self.bodies)
            .filter(|(_, b)| !b.is_static())
            .map(|(d, _)| d)
            .collect()
    }

    /// Total impulse `Jᵀ λ` on one body.
    ///
    /// Returns the linear impulse and the angular impulse about the body's
    /// center of mass, or zeros if the body takes no part in the problem.
    #[must_use]
    pub fn impulse_on(&self, body: BodyId, lambda: &DVector<f64>) -> (Vector3<f64>, Vector3<f64>) {
        let mut linear = Vector3::zeros();
        let mut angular = Vector3::zeros();
        for (row, &l) in self.rows.iter().zip(lambda.iter()) {
            for e in row.entries.iter().filter(|e| self.bodies[e.body].id == body) {
                linear += e.linear * l;
                angular += e.angular * l;
            }
        }
        (linear, angular)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use sim_contact::ProximityParams;

    const DT: f64 = 0.01;

    fn ball(id: u64, y: f64, vy: f64) -> SolverBody {
        SolverBody {
            id: BodyId::new(id),
            center_of_mass: Point3::new(0.0, y, 0.0),
            twist: Twist::linear(Vector3::new(0.0, vy, 0.0)),
            inv_mass: 1.0,
            inv_inertia: Matrix3::identity() * 2.5,
        }
    }

    fn floor_contact(feature: u32, distance: f64, x: f64) -> ContactPoint {
        ContactPoint::new(
            BodyId::new(1),
            BodyId::new(0),
            Point3::new(x, 0.0, 0.0),
            Vector3::y(),
            distance,
            feature,
        )
        .classify(&ProximityParams::reference_scene())
    }

    fn resolver(id: BodyId) -> Option<SolverBody> {
        match id.raw() {
            0 => Some(SolverBody::fixed(id, Point3::new(0.0, -10.0, 0.0))),
            1 => Some(ball(1, 0.5, -1.0)),
            _ => None,
        }
    }

    #[test]
    fn test_dimension_is_three_per_active_contact() {
        let contacts = [
            floor_contact(0, 0.0, 0.0),
            floor_contact(1, 1.0, 0.2),
            floor_contact(2, -0.01, -0.2),
        ];
        let problem = ConstraintProblem::assemble(&contacts, resolver, FrictionCone::new(0.5), DT);

        // The contact at distance 1.0 sits in the alarm band.
        assert_eq!(problem.contacts().len(), 2);
        assert_eq!(problem.dimension(), 2 * ROWS_PER_CONTACT);
        assert_eq!(problem.delassus().nrows(), 6);
    }

    #[test]
    fn test_contacts_are_sorted_independent_of_input_order() {
        let forward = [floor_contact(0, 0.0, 0.0), floor_contact(1, 0.0, 0.3)];
        let reversed = [forward[1], forward[0]];
        let a = ConstraintProblem::assemble(&forward, resolver, FrictionCone::new(0.5), DT);
        let b = ConstraintProblem::assemble(&reversed, resolver, FrictionCone::new(0.5), DT);

        assert_eq!(a.contacts(), b.contacts());
        assert_eq!(a.delassus(), b.delassus());
        assert_eq!(a.bias(), b.bias());
    }

    #[test]
    fn test_bias_and_target() {
        let contacts = [floor_contact(0, 0.05, 0.0)];
        let problem = ConstraintProblem::assemble(&contacts, resolver, FrictionCone::new(0.5), DT);

        // Approaching at 1 m/s along -normal.
        assert_relative_eq!(problem.bias()[0], -1.0, epsilon = 1e-12);
        // Gap of 0.05 may close at 5 m/s this step.
        assert_relative_eq!(problem.target()[0], -5.0, epsilon = 1e-12);
        assert_eq!(problem.target()[1], 0.0);
        assert_eq!(problem.target()[2], 0.0);
    }

    #[test]
    fn test_penetrating_contact_targets_zero_approach() {
        let contacts = [floor_contact(0, -0.02, 0.0)];
        let problem = ConstraintProblem::assemble(&contacts, resolver, FrictionCone::new(0.5), DT);
        assert_eq!(problem.target()[0], 0.0);
    }

    #[test]
    fn test_delassus_is_symmetric_with_lever_arm() {
        // Off-center contact couples normal and tangential rows through rotation.
        let contacts = [floor_contact(0, 0.0, 0.4)];
        let problem = ConstraintProblem::assemble(&contacts, resolver, FrictionCone::new(0.5), DT);
        let a = problem.delassus();
        assert_relative_eq!(a.clone(), a.transpose(), epsilon = 1e-14);
        for i in 0..3 {
            assert!(a[(i, i)] >= 1.0);
        }
    }

    #[test]
    fn test_velocity_deltas_skip_static_bodies() {
        let contacts = [floor_contact(0, 0.0, 0.0)];
        let problem = ConstraintProblem::assemble(&contacts, resolver, FrictionCone::new(0.5), DT);
        let lambda = DVector::from_vec(vec![1.0, 0.0, 0.0]);
        let deltas = problem.velocity_deltas(&lambda);

        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].body, BodyId::new(1));
        assert_relative_eq!(deltas[0].linear, Vector3::new(0.0, 1.0, 0.0), epsilon = 1e-12);

        let (linear, _) = problem.impulse_on(BodyId::new(1), &lambda);
        assert_relative_eq!(linear.y, 1.0, epsilon = 1e-12);
        let w = problem.relative_velocity(&lambda);
        assert_relative_eq!(w[0], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_unresolved_and_same_owner_contacts_are_dropped() {
        let mut stray = floor_contact(0, 0.0, 0.0);
        stray.body_b = BodyId::new(99);
        let mut self_contact = floor_contact(1, 0.0, 0.0);
        self_contact.body_b = BodyId::new(1);

        let contacts = [stray, self_contact];
        let problem = ConstraintProblem::assemble(&contacts, resolver, FrictionCone::new(0.5), DT);
        assert!(problem.is_empty());
    }
}
