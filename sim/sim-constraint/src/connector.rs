//! The rigid connector contract and the state every connector shares.

use nalgebra::Vector3;
use sim_types::{BodyId, RigidBodySet, SimError, TimeInfo};

use crate::{Archive, DiagnosticSink, GlobalVector, TangentAssembler};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identifier of a connector, assigned by the owning [`ConnectorSet`](crate::ConnectorSet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConnectorId(pub u64);

impl ConnectorId {
    /// Create a new connector ID.
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

impl std::fmt::Display for ConnectorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Connector({})", self.0)
    }
}

/// Convergence controls of the augmentation loop.
///
/// A tolerance of zero disables the corresponding check.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AugmentationSettings {
    /// Relative change of the multiplier norms (`tolerance`).
    pub force_tol: f64,
    /// Translational gap (`gaptol`).
    pub gap_tol: f64,
    /// Rotational mismatch (`angtol`).
    pub angle_tol: f64,
    /// Augmentations always performed (`minaug`).
    pub min_augmentations: usize,
    /// Augmentation count at which the loop is accepted (`maxaug`).
    pub max_augmentations: usize,
    /// Escalate penalties when gap or angle tolerances are violated.
    pub auto_penalty: bool,
}

impl Default for AugmentationSettings {
    fn default() -> Self {
        Self {
            force_tol: 0.0,
            gap_tol: 0.0,
            angle_tol: 0.0,
            min_augmentations: 0,
            max_augmentations: 10,
            auto_penalty: false,
        }
    }
}

impl AugmentationSettings {
    /// Set the relative force tolerance.
    #[must_use]
    pub fn with_force_tol(mut self, tol: f64) -> Self {
        self.force_tol = tol;
        self
    }

    /// Set the gap tolerance.
    #[must_use]
    pub fn with_gap_tol(mut self, tol: f64) -> Self {
        self.gap_tol = tol;
        self
    }

    /// Set the angle tolerance.
    #[must_use]
    pub fn with_angle_tol(mut self, tol: f64) -> Self {
        self.angle_tol = tol;
        self
    }

    /// Set the augmentation bounds.
    #[must_use]
    pub fn with_augmentations(mut self, min: usize, max: usize) -> Self {
        self.min_augmentations = min;
        self.max_augmentations = max;
        self
    }

    /// Enable or disable automatic penalty escalation.
    #[must_use]
    pub fn with_auto_penalty(mut self, enabled: bool) -> Self {
        self.auto_penalty = enabled;
        self
    }
}

/// State shared by every two-body connector.
///
/// The multipliers `L` (force) and `U` (moment) persist across Newton
/// iterations and change only during augmentation. `F` and `M` are a cache
/// of the constraint force from the last evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorBase {
    id: ConnectorId,
    body_a: BodyId,
    body_b: BodyId,
    /// Augmentation controls.
    pub settings: AugmentationSettings,
    /// Force penalty `eps`.
    pub force_penalty: f64,
    /// Moment penalty `ups`.
    pub moment_penalty: f64,
    pub(crate) lambda: Vector3<f64>,
    pub(crate) mu: Vector3<f64>,
    pub(crate) force: Vector3<f64>,
    pub(crate) moment: Vector3<f64>,
}

impl ConnectorBase {
    /// Create the shared state for a connector between `body_a` and `body_b`.
    #[must_use]
    pub fn new(body_a: BodyId, body_b: BodyId) -> Self {
        Self {
            id: ConnectorId::default(),
            body_a,
            body_b,
            settings: AugmentationSettings::default(),
            force_penalty: 1.0,
            moment_penalty: 1.0,
            lambda: Vector3::zeros(),
            mu: Vector3::zeros(),
            force: Vector3::zeros(),
            moment: Vector3::zeros(),
        }
    }

    /// Connector id.
    #[must_use]
    pub const fn id(&self) -> ConnectorId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: ConnectorId) {
        self.id = id;
    }

    /// First body.
    #[must_use]
    pub const fn body_a(&self) -> BodyId {
        self.body_a
    }

    /// Second body.
    #[must_use]
    pub const fn body_b(&self) -> BodyId {
        self.body_b
    }

    /// Check that both bodies exist and are distinct.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidBodyId`] for a missing body and
    /// [`SimError::SameBody`] if both ids are equal.
    pub fn init(&self, bodies: &RigidBodySet) -> sim_types::Result<()> {
        bodies.try_get(self.body_a)?;
        bodies.try_get(self.body_b)?;
        if self.body_a == self.body_b {
            return Err(SimError::SameBody {
                connector_id: self.id.raw(),
                body_id: self.body_a.raw(),
            });
        }
        Ok(())
    }

    /// Zero multipliers and the cached force/moment.
    pub fn reset_multipliers(&mut self) {
        self.lambda = Vector3::zeros();
        self.mu = Vector3::zeros();
        self.force = Vector3::zeros();
        self.moment = Vector3::zeros();
    }

    /// Constraint force/moment for gap `c` and rotation mismatch `vth`:
    /// `F = L + eps·c`, `M = U + ups·vth`. Cached for reporting.
    pub fn evaluate_force(
        &mut self,
        c: &Vector3<f64>,
        vth: &Vector3<f64>,
    ) -> (Vector3<f64>, Vector3<f64>) {
        self.force = self.lambda + c * self.force_penalty;
        self.moment = self.mu + vth * self.moment_penalty;
        (self.force, self.moment)
    }

    /// Force multiplier `L`.
    #[must_use]
    pub fn force_multiplier(&self) -> &Vector3<f64> {
        &self.lambda
    }

    /// Moment multiplier `U`.
    #[must_use]
    pub fn moment_multiplier(&self) -> &Vector3<f64> {
        &self.mu
    }

    /// Constraint force from the last evaluation.
    #[must_use]
    pub fn force(&self) -> &Vector3<f64> {
        &self.force
    }

    /// Constraint moment from the last evaluation.
    #[must_use]
    pub fn moment(&self) -> &Vector3<f64> {
        &self.moment
    }

    /// Visit the base fields in checkpoint order.
    ///
    /// Only the penalties are stored; the auto-penalty changes them. The
    /// cached force and moment are recomputed by
    /// [`RigidConnector::update`].
    ///
    /// # Errors
    ///
    /// Propagates archive I/O failures.
    pub fn serialize(&mut self, ar: &mut dyn Archive) -> sim_types::Result<()> {
        ar.scalar(&mut self.force_penalty)?;
        ar.scalar(&mut self.moment_penalty)
    }
}

/// Contract every rigid connector type implements.
///
/// The solver calls [`load_vector`](Self::load_vector) and
/// [`stiffness_matrix`](Self::stiffness_matrix) once per Newton iteration
/// and [`augment`](Self::augment) once per converged Newton solve. Only
/// `augment` may change multipliers or penalties.
pub trait RigidConnector: std::fmt::Debug {
    /// Shared state.
    fn base(&self) -> &ConnectorBase;

    /// Shared state, mutably.
    fn base_mut(&mut self) -> &mut ConnectorBase;

    /// Short type name used in diagnostics.
    fn kind(&self) -> &'static str;

    /// Derive initial geometric quantities from the current body state.
    ///
    /// # Errors
    ///
    /// Fails if a referenced body does not exist or the configuration is
    /// degenerate.
    fn init(&mut self, bodies: &RigidBodySet) -> sim_types::Result<()>;

    /// Restore multipliers and offsets to the unstrained reference state.
    ///
    /// # Errors
    ///
    /// Fails if a referenced body does not exist.
    fn reset(&mut self, bodies: &RigidBodySet) -> sim_types::Result<()>;

    /// Add the residual contribution and subtract it from the bodies'
    /// reaction accumulators.
    fn load_vector(
        &mut self,
        residual: &mut dyn GlobalVector,
        bodies: &mut RigidBodySet,
        tp: &TimeInfo,
    );

    /// Assemble the 12×12 tangent block.
    fn stiffness_matrix(
        &mut self,
        tangent: &mut dyn TangentAssembler,
        bodies: &RigidBodySet,
        tp: &TimeInfo,
    );

    /// Run one augmentation; `true` means converged.
    fn augment(
        &mut self,
        naug: usize,
        bodies: &RigidBodySet,
        tp: &TimeInfo,
        sink: &mut dyn DiagnosticSink,
    ) -> bool;

    /// Recompute the cached force and moment for the accepted state.
    fn update(&mut self, bodies: &RigidBodySet, tp: &TimeInfo);

    /// Save or restore state; base fields first.
    ///
    /// # Errors
    ///
    /// Propagates archive I/O failures.
    fn serialize(&mut self, ar: &mut dyn Archive) -> sim_types::Result<()>;

    /// Connector id.
    fn id(&self) -> ConnectorId {
        self.base().id()
    }

    /// First body.
    fn body_a(&self) -> BodyId {
        self.base().body_a()
    }

    /// Second body.
    fn body_b(&self) -> BodyId {
        self.base().body_b()
    }

    /// Constraint force from the last evaluation.
    fn force(&self) -> Vector3<f64> {
        *self.base().force()
    }

    /// Constraint moment from the last evaluation.
    fn moment(&self) -> Vector3<f64> {
        *self.base().moment()
    }
}
