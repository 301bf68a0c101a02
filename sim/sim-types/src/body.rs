//! Rigid body state types.
//!
//! A rigid body carries 6 degrees of freedom (3 translations, 3 rotations).
//! The solver keeps two configurations per body: the current (trial) state
//! that Newton iterations update, and the previous state from the start of
//! the time step. Connectors read both and blend them with the
//! generalized-alpha parameter.

use nalgebra::{Point3, UnitQuaternion, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::SimError;

/// Unique identifier for a rigid body in the simulation.
///
/// Body ids are indices into the owning [`RigidBodySet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
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

    fn index(self) -> Option<usize> {
        usize::try_from(self.0).ok()
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

/// Global equation numbers of a body's 6 degrees of freedom.
///
/// Slots 0..3 are the translations, 3..6 the rotations. `None` marks a
/// degree of freedom without an active equation (prescribed or fixed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EquationNumbers([Option<usize>; 6]);

impl EquationNumbers {
    /// Create from an explicit slot array.
    #[must_use]
    pub const fn new(slots: [Option<usize>; 6]) -> Self {
        Self(slots)
    }

    /// All six degrees of freedom free, numbered consecutively from `first`.
    #[must_use]
    pub const fn free(first: usize) -> Self {
        Self([
            Some(first),
            Some(first + 1),
            Some(first + 2),
            Some(first + 3),
            Some(first + 4),
            Some(first + 5),
        ])
    }

    /// No active equations (a grounded body).
    #[must_use]
    pub const fn fixed() -> Self {
        Self([None; 6])
    }

    /// Translations free from `first`, rotations fixed.
    #[must_use]
    pub const fn translation_only(first: usize) -> Self {
        Self([Some(first), Some(first + 1), Some(first + 2), None, None, None])
    }

    /// Build from a signed LM array where any negative entry means
    /// "no equation".
    #[must_use]
    pub fn from_lm(lm: [i64; 6]) -> Self {
        Self(lm.map(|n| usize::try_from(n).ok()))
    }

    /// Equation number of one degree of freedom.
    #[must_use]
    pub fn get(&self, dof: usize) -> Option<usize> {
        self.0.get(dof).copied().flatten()
    }

    /// The raw slots.
    #[must_use]
    pub const fn slots(&self) -> &[Option<usize>; 6] {
        &self.0
    }

    /// Largest equation number in use, if any.
    #[must_use]
    pub fn max_equation(&self) -> Option<usize> {
        self.0.iter().flatten().copied().max()
    }
}

/// State of a single rigid body as seen by connectors.
///
/// The solver owns and updates this state. Connectors only read the
/// kinematics and add into the reaction accumulators.
#[derive(Debug, Clone, PartialEq)]
pub struct RigidBody {
    id: BodyId,
    /// Position at model setup (reference configuration).
    pub reference_position: Point3<f64>,
    /// Current (trial) position of the body origin.
    pub position: Point3<f64>,
    /// Position at the start of the time step.
    pub previous_position: Point3<f64>,
    /// Current (trial) orientation.
    pub rotation: UnitQuaternion<f64>,
    /// Orientation at the start of the time step.
    pub previous_rotation: UnitQuaternion<f64>,
    /// Equation numbers of the 6 rigid degrees of freedom.
    pub equations: EquationNumbers,
    /// Accumulated reaction force (reporting only).
    pub reaction_force: Vector3<f64>,
    /// Accumulated reaction moment (reporting only).
    pub reaction_moment: Vector3<f64>,
}

impl RigidBody {
    /// Create a body at rest in the given pose.
    ///
    /// Reference, current and previous configurations all start equal.
    #[must_use]
    pub fn new(position: Point3<f64>, rotation: UnitQuaternion<f64>) -> Self {
        Self {
            id: BodyId::new(0),
            reference_position: position,
            position,
            previous_position: position,
            rotation,
            previous_rotation: rotation,
            equations: EquationNumbers::fixed(),
            reaction_force: Vector3::zeros(),
            reaction_moment: Vector3::zeros(),
        }
    }

    /// Create a body at a position with identity orientation.
    #[must_use]
    pub fn at(position: Point3<f64>) -> Self {
        Self::new(position, UnitQuaternion::identity())
    }

    /// Set the equation numbers.
    #[must_use]
    pub fn with_equations(mut self, equations: EquationNumbers) -> Self {
        self.equations = equations;
        self
    }

    /// The id assigned by the owning set.
    #[must_use]
    pub const fn id(&self) -> BodyId {
        self.id
    }

    /// Move the current state to a new pose without touching the previous
    /// or reference configuration.
    pub fn set_current_pose(&mut self, position: Point3<f64>, rotation: UnitQuaternion<f64>) {
        self.position = position;
        self.rotation = rotation;
    }

    /// Blend of current and previous origin: `alpha·r_t + (1-alpha)·r_p`.
    #[must_use]
    pub fn blended_position(&self, alpha: f64) -> Vector3<f64> {
        self.position.coords * alpha + self.previous_position.coords * (1.0 - alpha)
    }

    /// Apply a Newton increment to the current state.
    ///
    /// The rotation increment is a spatial rotation vector, composed on the
    /// left of the current orientation.
    pub fn apply_increment(&mut self, linear: &Vector3<f64>, angular: &Vector3<f64>) {
        self.position += linear;
        self.rotation = UnitQuaternion::from_scaled_axis(*angular) * self.rotation;
        self.rotation.renormalize();
    }

    /// Accept the current state as the start of the next time step.
    pub fn commit_step(&mut self) {
        self.previous_position = self.position;
        self.previous_rotation = self.rotation;
    }

    /// Zero the reaction accumulators.
    pub fn clear_reactions(&mut self) {
        self.reaction_force = Vector3::zeros();
        self.reaction_moment = Vector3::zeros();
    }
}

/// Arena of rigid bodies.
///
/// Bodies are never removed, so a [`BodyId`] handed out by [`add`](Self::add)
/// stays valid for the lifetime of the set.
#[derive(Debug, Clone, Default)]
pub struct RigidBodySet {
    bodies: Vec<RigidBody>,
}

impl RigidBodySet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a body and return its id.
    pub fn add(&mut self, mut body: RigidBody) -> BodyId {
        let id = BodyId::new(self.bodies.len() as u64);
        body.id = id;
        self.bodies.push(body);
        id
    }

    /// Number of bodies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Look up a body.
    #[must_use]
    pub fn get(&self, id: BodyId) -> Option<&RigidBody> {
        id.index().and_then(|i| self.bodies.get(i))
    }

    /// Look up a body mutably.
    pub fn get_mut(&mut self, id: BodyId) -> Option<&mut RigidBody> {
        id.index().and_then(|i| self.bodies.get_mut(i))
    }

    /// Look up a body, failing with [`SimError::InvalidBodyId`].
    ///
    /// # Errors
    ///
    /// Returns an error if `id` is not in the set.
    pub fn try_get(&self, id: BodyId) -> crate::Result<&RigidBody> {
        self.get(id).ok_or(SimError::InvalidBodyId(id.raw()))
    }

    /// Borrow two distinct bodies mutably at once.
    ///
    /// Returns `None` if either id is missing or both ids are equal.
    pub fn pair_mut(&mut self, a: BodyId, b: BodyId) -> Option<(&mut RigidBody, &mut RigidBody)> {
        let (ia, ib) = (a.index()?, b.index()?);
        if ia == ib || ia >= self.bodies.len() || ib >= self.bodies.len() {
            return None;
        }
        if ia < ib {
            let (lo, hi) = self.bodies.split_at_mut(ib);
            Some((&mut lo[ia], &mut hi[0]))
        } else {
            let (lo, hi) = self.bodies.split_at_mut(ia);
            Some((&mut hi[0], &mut lo[ib]))
        }
    }

    /// Iterate over all bodies.
    pub fn iter(&self) -> impl Iterator<Item = &RigidBody> {
        self.bodies.iter()
    }

    /// Iterate mutably over all bodies.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut RigidBody> {
        self.bodies.iter_mut()
    }

    /// One past the largest equation number used by any body.
    #[must_use]
    pub fn num_equations(&self) -> usize {
        self.bodies
            .iter()
            .filter_map(|b| b.equations.max_equation())
            .max()
            .map_or(0, |n| n + 1)
    }

    /// Zero every body's reaction accumulators.
    pub fn clear_reactions(&mut self) {
        self.bodies.iter_mut().for_each(RigidBody::clear_reactions);
    }

    /// Accept the current state of every body.
    pub fn commit_step(&mut self) {
        self.bodies.iter_mut().for_each(RigidBody::commit_step);
    }
}
