//! Rigid lock: a connector that removes all six relative degrees of freedom.
//!
//! # Constraint Formulation
//!
//! For each body the joint anchor `z` and a body-fixed triad `e[k]` are
//! blended between the previous and current state with `alpha`. Then
//!
//! ```text
//! c   = (r_B + z_B) - (r_A + z_A)          relative translation
//! vth = ½ Σ_k e_A[k] × e_B[k]              linearized relative rotation
//! F   = L + eps·c                          constraint force
//! M   = U + ups·vth                        constraint moment
//! ```
//!
//! Body A receives `(F, z_A × F + M)` and body B `(-F, -z_B × F - M)`.
//! `vth` is only a first-order measure of the relative rotation and is what
//! the tangent is linearized against; [`LockConnector::relative_rotation`]
//! gives the exact rotation vector for reporting.

use nalgebra::{Matrix3, Vector3};
use sim_types::{BodyId, RigidBody, RigidBodySet, TimeInfo};

use crate::assembly::{Matrix12, Vector12, dof_map};
use crate::augment::augment_multipliers;
use crate::kinematics::{
    BodyFrame, Triad, identity_triad, orthonormal_basis, rotate_triad, rotation_mismatch,
    triad_coupling,
};
use crate::{
    Archive, AugmentationSettings, ConnectorBase, DiagnosticSink, GlobalVector, RigidConnector,
    TangentAssembler,
};

/// Kinematic state of a lock at one evaluation.
#[derive(Debug, Clone, Copy)]
struct LockState {
    a: BodyFrame,
    b: BodyFrame,
    c: Vector3<f64>,
    vth: Vector3<f64>,
}

/// A 6-DOF lock between two rigid bodies, enforced with an augmented
/// Lagrangian.
///
/// # Example
///
/// ```
/// use sim_constraint::{LockConnector, RigidConnector};
/// use sim_types::{RigidBody, RigidBodySet};
/// use nalgebra::{Point3, Vector3};
///
/// let mut bodies = RigidBodySet::new();
/// let a = bodies.add(RigidBody::at(Point3::origin()));
/// let b = bodies.add(RigidBody::at(Point3::new(1.0, 0.0, 0.0)));
///
/// let mut lock = LockConnector::new(a, b)
///     .with_joint_origin(Vector3::new(0.5, 0.0, 0.0))
///     .with_penalties(1e6, 1e6);
/// lock.init(&bodies).unwrap();
///
/// assert_eq!(lock.anchor_offsets().0, Vector3::new(0.5, 0.0, 0.0));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct LockConnector {
    base: ConnectorBase,
    joint_origin: Vector3<f64>,
    first_axis: Vector3<f64>,
    second_axis: Vector3<f64>,
    /// Orthonormal joint basis built from the two axes.
    e0: Triad,
    ea0: Triad,
    eb0: Triad,
    qa0: Vector3<f64>,
    qb0: Vector3<f64>,
}

impl LockConnector {
    /// Create a lock between two bodies with the joint at the world origin
    /// and the basis aligned with the world axes.
    #[must_use]
    pub fn new(body_a: BodyId, body_b: BodyId) -> Self {
        Self {
            base: ConnectorBase::new(body_a, body_b),
            joint_origin: Vector3::zeros(),
            first_axis: Vector3::x(),
            second_axis: Vector3::y(),
            e0: identity_triad(),
            ea0: identity_triad(),
            eb0: identity_triad(),
            qa0: Vector3::zeros(),
            qb0: Vector3::zeros(),
        }
    }

    /// Set the joint origin (world frame, reference configuration).
    #[must_use]
    pub fn with_joint_origin(mut self, origin: Vector3<f64>) -> Self {
        self.joint_origin = origin;
        self
    }

    /// Set the two axes the joint basis is built from.
    #[must_use]
    pub fn with_axes(mut self, first: Vector3<f64>, second: Vector3<f64>) -> Self {
        self.first_axis = first;
        self.second_axis = second;
        self
    }

    /// Set the force and moment penalties.
    #[must_use]
    pub fn with_penalties(mut self, force: f64, moment: f64) -> Self {
        self.base.force_penalty = force;
        self.base.moment_penalty = moment;
        self
    }

    /// Set the augmentation controls.
    #[must_use]
    pub fn with_settings(mut self, settings: AugmentationSettings) -> Self {
        self.base.settings = settings;
        self
    }

    /// Joint origin.
    #[must_use]
    pub fn joint_origin(&self) -> &Vector3<f64> {
        &self.joint_origin
    }

    /// Joint anchor relative to each body's reference position, `(qa0, qb0)`.
    #[must_use]
    pub fn anchor_offsets(&self) -> (Vector3<f64>, Vector3<f64>) {
        (self.qa0, self.qb0)
    }

    /// Joint basis and the per-body reference triads, `(e0, ea0, eb0)`.
    #[must_use]
    pub fn triads(&self) -> (&Triad, &Triad, &Triad) {
        (&self.e0, &self.ea0, &self.eb0)
    }

    /// Multipliers `(L, U)`.
    #[must_use]
    pub fn multipliers(&self) -> (Vector3<f64>, Vector3<f64>) {
        (self.base.lambda, self.base.mu)
    }

    /// Penalties `(eps, ups)`.
    #[must_use]
    pub fn penalties(&self) -> (f64, f64) {
        (self.base.force_penalty, self.base.moment_penalty)
    }

    fn reset_reference(&mut self, body_a: &RigidBody, body_b: &RigidBody) {
        self.base.reset_multipliers();
        self.qa0 = self.joint_origin - body_a.reference_position.coords;
        self.qb0 = self.joint_origin - body_b.reference_position.coords;
        self.ea0 = self.e0;
        self.eb0 = self.e0;
    }

    fn evaluate(&self, body_a: &RigidBody, body_b: &RigidBody, alpha: f64) -> LockState {
        let a = BodyFrame::evaluate(body_a, &self.qa0, &self.ea0, alpha);
        let b = BodyFrame::evaluate(body_b, &self.qb0, &self.eb0, alpha);
        LockState {
            c: b.anchor_point() - a.anchor_point(),
            vth: rotation_mismatch(&a.triad, &b.triad),
            a,
            b,
        }
    }

    fn evaluate_in(&self, bodies: &RigidBodySet, alpha: f64) -> Option<LockState> {
        let body_a = bodies.get(self.base.body_a())?;
        let body_b = bodies.get(self.base.body_b())?;
        Some(self.evaluate(body_a, body_b, alpha))
    }

    /// Relative translation `(r_B + z_B) - (r_A + z_A)` at the current
    /// state, in body A's current triad.
    #[must_use]
    pub fn relative_translation(&self, bodies: &RigidBodySet) -> Option<Vector3<f64>> {
        let s = self.evaluate_in(bodies, 1.0)?;
        let ea = &s.a.triad_current;
        Some(Vector3::new(s.c.dot(&ea[0]), s.c.dot(&ea[1]), s.c.dot(&ea[2])))
    }

    /// Exact relative rotation vector of B with respect to A
    /// (`log(q_B q_A⁻¹)`), in body A's current triad.
    #[must_use]
    pub fn relative_rotation(&self, bodies: &RigidBodySet) -> Option<Vector3<f64>> {
        let body_a = bodies.get(self.base.body_a())?;
        let body_b = bodies.get(self.base.body_b())?;
        let q = (body_b.rotation * body_a.rotation.inverse()).scaled_axis();
        let ea = rotate_triad(&body_a.rotation, &self.ea0);
        Some(Vector3::new(q.dot(&ea[0]), q.dot(&ea[1]), q.dot(&ea[2])))
    }

    /// Gap `c` and rotation mismatch `vth` at blend `alpha`.
    #[must_use]
    pub fn constraint_violation(
        &self,
        bodies: &RigidBodySet,
        alpha: f64,
    ) -> Option<(Vector3<f64>, Vector3<f64>)> {
        self.evaluate_in(bodies, alpha).map(|s| (s.c, s.vth))
    }

    /// Local residual `[f_A, m_A, f_B, m_B]` for force `f` and moment `m`.
    fn local_residual(s: &LockState, f: &Vector3<f64>, m: &Vector3<f64>) -> Vector12 {
        let ma = s.a.anchor.cross(f) + m;
        let mb = -s.b.anchor.cross(f) - m;

        let mut fe = Vector12::zeros();
        fe.fixed_rows_mut::<3>(0).copy_from(f);
        fe.fixed_rows_mut::<3>(3).copy_from(&ma);
        fe.fixed_rows_mut::<3>(6).copy_from(&(-f));
        fe.fixed_rows_mut::<3>(9).copy_from(&mb);
        fe
    }

    /// Local tangent for the state `s`.
    fn local_stiffness(&self, s: &LockState, alpha: f64) -> Matrix12 {
        let eps = self.base.force_penalty;
        let ups = self.base.moment_penalty;
        let identity = Matrix3::identity();

        let za_hat = s.a.anchor.cross_matrix();
        let zb_hat = s.b.anchor.cross_matrix();
        let zat_hat = s.a.anchor_current.cross_matrix();
        let zbt_hat = s.b.anchor_current.cross_matrix();

        let w_ba = triad_coupling(&s.b.triad, &s.a.triad_current);
        let w_ab = triad_coupling(&s.a.triad, &s.b.triad_current);

        let blocks: [[Matrix3<f64>; 4]; 4] = [
            [
                identity * eps,
                -zat_hat * eps,
                -identity * eps,
                zbt_hat * eps,
            ],
            [
                za_hat * eps,
                -(za_hat * zat_hat * eps + w_ba * ups),
                -za_hat * eps,
                za_hat * zbt_hat * eps + w_ab * ups,
            ],
            [
                -identity * eps,
                zat_hat * eps,
                identity * eps,
                -zbt_hat * eps,
            ],
            [
                -zb_hat * eps,
                zb_hat * zat_hat * eps + w_ba * ups,
                zb_hat * eps,
                -(zb_hat * zbt_hat * eps + w_ab * ups),
            ],
        ];

        let mut ke = Matrix12::zeros();
        for (i, row) in blocks.iter().enumerate() {
            for (j, block) in row.iter().enumerate() {
                ke.fixed_view_mut::<3, 3>(3 * i, 3 * j)
                    .copy_from(&(block * alpha));
            }
        }
        ke
    }
}

impl RigidConnector for LockConnector {
    fn base(&self) -> &ConnectorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ConnectorBase {
        &mut self.base
    }

    fn kind(&self) -> &'static str {
        "lock"
    }

    fn init(&mut self, bodies: &RigidBodySet) -> sim_types::Result<()> {
        self.e0 = orthonormal_basis(&self.first_axis, &self.second_axis)?;
        self.base.init(bodies)?;
        let body_a = bodies.try_get(self.base.body_a())?;
        let body_b = bodies.try_get(self.base.body_b())?;
        self.reset_reference(body_a, body_b);
        Ok(())
    }

    fn reset(&mut self, bodies: &RigidBodySet) -> sim_types::Result<()> {
        let body_a = bodies.try_get(self.base.body_a())?;
        let body_b = bodies.try_get(self.base.body_b())?;
        self.reset_reference(body_a, body_b);
        Ok(())
    }

    fn load_vector(
        &mut self,
        residual: &mut dyn GlobalVector,
        bodies: &mut RigidBodySet,
        tp: &TimeInfo,
    ) {
        let Some(s) = self.evaluate_in(bodies, tp.alpha()) else {
            return;
        };
        let (f, m) = self.base.evaluate_force(&s.c, &s.vth);
        let fe = Self::local_residual(&s, &f, &m);

        let Some((body_a, body_b)) = bodies.pair_mut(self.base.body_a(), self.base.body_b()) else {
            return;
        };
        residual.assemble(&fe, &dof_map(&body_a.equations, &body_b.equations));

        body_a.reaction_force -= fe.fixed_rows::<3>(0);
        body_a.reaction_moment -= fe.fixed_rows::<3>(3);
        body_b.reaction_force -= fe.fixed_rows::<3>(6);
        body_b.reaction_moment -= fe.fixed_rows::<3>(9);
    }

    fn stiffness_matrix(
        &mut self,
        tangent: &mut dyn TangentAssembler,
        bodies: &RigidBodySet,
        tp: &TimeInfo,
    ) {
        let alpha = tp.alpha();
        let (Some(body_a), Some(body_b)) = (
            bodies.get(self.base.body_a()),
            bodies.get(self.base.body_b()),
        ) else {
            return;
        };
        let s = self.evaluate(body_a, body_b, alpha);
        self.base.evaluate_force(&s.c, &s.vth);

        let ke = self.local_stiffness(&s, alpha);
        tangent.assemble(&ke, &dof_map(&body_a.equations, &body_b.equations));
    }

    fn augment(
        &mut self,
        naug: usize,
        bodies: &RigidBodySet,
        tp: &TimeInfo,
        sink: &mut dyn DiagnosticSink,
    ) -> bool {
        let Some(s) = self.evaluate_in(bodies, tp.alpha()) else {
            return true;
        };
        let kind = self.kind();
        let report = augment_multipliers(&mut self.base, kind, naug, &s.c, &s.vth);
        sink.report(&report);
        report.status.is_converged()
    }

    fn update(&mut self, bodies: &RigidBodySet, tp: &TimeInfo) {
        if let Some(s) = self.evaluate_in(bodies, tp.alpha()) {
            self.base.evaluate_force(&s.c, &s.vth);
        }
    }

    fn serialize(&mut self, ar: &mut dyn Archive) -> sim_types::Result<()> {
        self.base.serialize(ar)?;
        ar.vec3(&mut self.qa0)?;
        ar.vec3(&mut self.qb0)?;
        ar.vec3(&mut self.base.lambda)?;
        ar.vec3(&mut self.base.mu)?;
        ar.triad(&mut self.e0)?;
        ar.triad(&mut self.ea0)?;
        ar.triad(&mut self.eb0)
    }
}
