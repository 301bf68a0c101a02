//! Kinematic helpers shared by connector types.
//!
//! Every connector evaluates the same per-body quantities: the blended body
//! origin, the joint anchor offset rotated into the world frame and a body
//! fixed triad, each blended between the previous and the current state with
//! the generalized-alpha parameter.

use nalgebra::{Matrix3, UnitQuaternion, Vector3};
use sim_types::{RigidBody, SimError};

/// Three basis vectors fixed in a body.
pub type Triad = [Vector3<f64>; 3];

/// The world axes.
#[must_use]
pub fn identity_triad() -> Triad {
    [Vector3::x(), Vector3::y(), Vector3::z()]
}

/// Rotate every vector of a triad.
#[must_use]
pub fn rotate_triad(q: &UnitQuaternion<f64>, e: &Triad) -> Triad {
    e.map(|v| q * v)
}

/// Build an orthonormal triad from two user axes.
///
/// The first axis is kept (normalized), the third is `first × second`, and
/// the second is recomputed as `third × first`.
///
/// # Errors
///
/// Returns [`SimError::InvalidConfig`] if either axis has zero length or the
/// two axes are parallel.
pub fn orthonormal_basis(first: &Vector3<f64>, second: &Vector3<f64>) -> sim_types::Result<Triad> {
    let e0 = first
        .try_normalize(1e-12)
        .ok_or_else(|| SimError::invalid_config("first_axis has zero length"))?;
    let e2 = e0
        .cross(second)
        .try_normalize(1e-12)
        .ok_or_else(|| SimError::invalid_config("first_axis and second_axis are parallel"))?;
    let e1 = e2.cross(&e0).normalize();
    Ok([e0, e1, e2])
}

/// Linearized rotation mismatch between two triads: `½ Σ ea[k] × eb[k]`.
///
/// Vanishes when the triads coincide. For small misalignment it
/// approximates the rotation vector taking `ea` to `eb`.
#[must_use]
pub fn rotation_mismatch(ea: &Triad, eb: &Triad) -> Vector3<f64> {
    ea.iter()
        .zip(eb.iter())
        .map(|(a, b)| a.cross(b))
        .sum::<Vector3<f64>>()
        * 0.5
}

/// Rotational coupling `½ Σ skew(p[k]) · skew(q[k])`.
///
/// Derivative of [`rotation_mismatch`] with respect to a spatial rotation of
/// the body owning `q`.
#[must_use]
pub fn triad_coupling(p: &Triad, q: &Triad) -> Matrix3<f64> {
    p.iter()
        .zip(q.iter())
        .map(|(a, b)| a.cross_matrix() * b.cross_matrix())
        .sum::<Matrix3<f64>>()
        * 0.5
}

/// Blended kinematics of one body at a joint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyFrame {
    /// Body origin, `alpha·r_t + (1-alpha)·r_p`.
    pub origin: Vector3<f64>,
    /// Joint anchor offset in the world frame, blended.
    pub anchor: Vector3<f64>,
    /// Joint anchor offset rotated by the current orientation only.
    pub anchor_current: Vector3<f64>,
    /// Body triad, blended.
    pub triad: Triad,
    /// Body triad rotated by the current orientation only.
    pub triad_current: Triad,
}

impl BodyFrame {
    /// Evaluate the frame of `body` for a body-fixed anchor `offset` and
    /// reference triad `triad0`.
    #[must_use]
    pub fn evaluate(body: &RigidBody, offset: &Vector3<f64>, triad0: &Triad, alpha: f64) -> Self {
        let qt = &body.rotation;
        let qp = &body.previous_rotation;

        let anchor_current = qt * offset;
        let anchor = anchor_current * alpha + (qp * offset) * (1.0 - alpha);

        let triad_current = rotate_triad(qt, triad0);
        let triad_previous = rotate_triad(qp, triad0);
        let triad = [0, 1, 2].map(|k| triad_current[k] * alpha + triad_previous[k] * (1.0 - alpha));

        Self {
            origin: body.blended_position(alpha),
            anchor,
            anchor_current,
            triad,
            triad_current,
        }
    }

    /// World position of the joint anchor, `r + z`.
    #[must_use]
    pub fn anchor_point(&self) -> Vector3<f64> {
        self.origin + self.anchor
    }
}
