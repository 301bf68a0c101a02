//! Augmented-Lagrangian (Uzawa) update and its diagnostics.
//!
//! After every converged Newton solve each connector compares the trial
//! multipliers `L + eps·c`, `U + ups·vth` with the current ones and the
//! remaining gap/angle with their tolerances. If any enabled check fails the
//! trial multipliers are committed and the solver runs another Newton solve.
//!
//! ```text
//! converged = force ok ∧ gap ok ∧ angle ok ∧ n ≥ minaug   ∨   n ≥ maxaug
//! ```
//!
//! Reaching `maxaug` is acceptance, not failure.

use std::fmt;

use nalgebra::Vector3;

use crate::{ConnectorBase, ConnectorId};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Below this norm the relative multiplier change is not evaluated.
const MULTIPLIER_NORM_EPS: f64 = 1e-10;

/// Minimum factor applied by the auto-penalty when a tolerance is violated.
pub const AUTO_PENALTY_MIN_FACTOR: f64 = 100.0;

/// Outcome of one augmentation of one connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AugmentStatus {
    /// Constraint satisfied (or augmentation cap reached).
    Converged,
    /// Multipliers were updated; another Newton solve is required.
    NotConverged,
}

impl AugmentStatus {
    /// Whether the connector accepts the current state.
    #[must_use]
    pub fn is_converged(self) -> bool {
        matches!(self, Self::Converged)
    }
}

/// Current vs. required values of one augmentation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AugmentationReport {
    /// Connector that produced the report.
    pub connector_id: ConnectorId,
    /// Connector type name.
    pub kind: String,
    /// Augmentation index.
    pub augmentation: usize,
    /// Relative change of the force multiplier norm.
    pub force_change: f64,
    /// Relative change of the moment multiplier norm.
    pub moment_change: f64,
    /// Gap norm `‖c‖`.
    pub gap: f64,
    /// Rotation mismatch norm `‖vth‖`.
    pub angle: f64,
    /// Force tolerance, if enabled.
    pub force_tol: Option<f64>,
    /// Gap tolerance, if enabled.
    pub gap_tol: Option<f64>,
    /// Angle tolerance, if enabled.
    pub angle_tol: Option<f64>,
    /// Escalated force penalty, if the auto-penalty fired.
    pub force_penalty: Option<f64>,
    /// Escalated moment penalty, if the auto-penalty fired.
    pub moment_penalty: Option<f64>,
    /// Result of the convergence check.
    pub status: AugmentStatus,
}

fn write_row(f: &mut fmt::Formatter<'_>, label: &str, value: f64, tol: Option<f64>) -> fmt::Result {
    match tol {
        Some(tol) => writeln!(f, "    {label:<6}: {value:15e} {tol:15e}"),
        None => writeln!(f, "    {label:<6}: {value:15e}        ***"),
    }
}

impl fmt::Display for AugmentationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, " rigid connector # {} ({})", self.connector_id.raw() + 1, self.kind)?;
        writeln!(f, "                  CURRENT        REQUIRED")?;
        write_row(f, "force", self.force_change, self.force_tol)?;
        write_row(f, "gap", self.gap, self.gap_tol)?;
        write_row(f, "moment", self.moment_change, self.force_tol)?;
        write_row(f, "angle", self.angle, self.angle_tol)?;
        if let Some(eps) = self.force_penalty {
            writeln!(f, "    force_penalty :         {eps:15e}")?;
        }
        if let Some(ups) = self.moment_penalty {
            writeln!(f, "    moment_penalty :        {ups:15e}")?;
        }
        Ok(())
    }
}

/// Receiver of augmentation diagnostics.
///
/// Reports never influence control flow.
pub trait DiagnosticSink {
    /// Record one report.
    fn report(&mut self, report: &AugmentationReport);
}

/// Sink that emits reports as `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&mut self, report: &AugmentationReport) {
        tracing::info!(
            connector = report.connector_id.raw(),
            kind = %report.kind,
            augmentation = report.augmentation,
            force_change = report.force_change,
            gap = report.gap,
            moment_change = report.moment_change,
            angle = report.angle,
            converged = report.status.is_converged(),
            "connector augmentation"
        );
        if let Some(eps) = report.force_penalty {
            tracing::debug!(connector = report.connector_id.raw(), eps, "force penalty escalated");
        }
        if let Some(ups) = report.moment_penalty {
            tracing::debug!(connector = report.connector_id.raw(), ups, "moment penalty escalated");
        }
    }
}

/// Sink that keeps every report in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    /// Reports in arrival order.
    pub reports: Vec<AugmentationReport>,
}

impl RecordingSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent report.
    #[must_use]
    pub fn last(&self) -> Option<&AugmentationReport> {
        self.reports.last()
    }
}

impl DiagnosticSink for RecordingSink {
    fn report(&mut self, report: &AugmentationReport) {
        self.reports.push(report.clone());
    }
}

/// Any nonzero tolerance enables its check.
fn enabled(tol: f64) -> Option<f64> {
    (tol != 0.0).then_some(tol)
}

/// Relative change `|‖new‖ − ‖old‖| / ‖new‖`, zero when `new` vanishes.
fn relative_change(old: &Vector3<f64>, new: &Vector3<f64>) -> f64 {
    let n1 = new.norm();
    if n1 > MULTIPLIER_NORM_EPS {
        ((n1 - old.norm()) / n1).abs()
    } else {
        0.0
    }
}

/// Penalty after one auto-penalty escalation: `max(value/tol, 100)·penalty`.
#[must_use]
pub fn escalate_penalty(penalty: f64, value: f64, tol: f64) -> f64 {
    (value / tol).max(AUTO_PENALTY_MIN_FACTOR) * penalty
}

/// Uzawa update of a connector's multipliers for gap `c` and rotation
/// mismatch `vth` at augmentation `naug`.
///
/// Commits the trial multipliers when not converged and escalates penalties
/// if the auto-penalty is enabled and a gap or angle tolerance is exceeded.
pub fn augment_multipliers(
    base: &mut ConnectorBase,
    kind: &str,
    naug: usize,
    c: &Vector3<f64>,
    vth: &Vector3<f64>,
) -> AugmentationReport {
    let settings = base.settings;

    let lambda_trial = base.lambda + c * base.force_penalty;
    let mu_trial = base.mu + vth * base.moment_penalty;

    let force_change = relative_change(&base.lambda, &lambda_trial);
    let moment_change = relative_change(&base.mu, &mu_trial);
    let gap = c.norm();
    let angle = vth.norm();

    let force_tol = enabled(settings.force_tol);
    let gap_tol = enabled(settings.gap_tol);
    let angle_tol = enabled(settings.angle_tol);

    let mut converged = true;
    if force_tol.is_some_and(|tol| force_change >= tol || moment_change >= tol) {
        converged = false;
    }
    if gap_tol.is_some_and(|tol| gap >= tol) {
        converged = false;
    }
    if angle_tol.is_some_and(|tol| angle >= tol) {
        converged = false;
    }
    if naug < settings.min_augmentations {
        converged = false;
    }
    if naug >= settings.max_augmentations {
        converged = true;
    }

    if !converged {
        base.lambda = lambda_trial;
        base.mu = mu_trial;
    }

    let mut force_penalty = None;
    let mut moment_penalty = None;
    if settings.auto_penalty {
        if let Some(tol) = gap_tol.filter(|tol| gap > *tol) {
            base.force_penalty = escalate_penalty(base.force_penalty, gap, tol);
            force_penalty = Some(base.force_penalty);
        }
        if let Some(tol) = angle_tol.filter(|tol| angle > *tol) {
            base.moment_penalty = escalate_penalty(base.moment_penalty, angle, tol);
            moment_penalty = Some(base.moment_penalty);
        }
    }

    AugmentationReport {
        connector_id: base.id(),
        kind: kind.to_string(),
        augmentation: naug,
        force_change,
        moment_change,
        gap,
        angle,
        force_tol,
        gap_tol,
        angle_tol,
        force_penalty,
        moment_penalty,
        status: if converged {
            AugmentStatus::Converged
        } else {
            AugmentStatus::NotConverged
        },
    }
}
