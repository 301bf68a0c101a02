//! Time-step information handed to connectors by the time integrator.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Time-integration scheme that produced a [`TimeInfo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum IntegrationMethod {
    /// Quasi-static or backward-Euler: forces at the end of the step.
    #[default]
    Implicit,
    /// Generalized-alpha (Chung & Hulbert).
    GeneralizedAlpha,
}

/// Time information for one evaluation of the constraint system.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TimeInfo {
    /// Time at the end of the current step.
    pub current_time: f64,
    /// Step size.
    pub time_increment: f64,
    /// Blend between previous (0) and current (1) state for force evaluation.
    pub alpha_f: f64,
    /// Scheme that produced these parameters.
    pub method: IntegrationMethod,
}

impl Default for TimeInfo {
    fn default() -> Self {
        Self::implicit(0.0, 1.0)
    }
}

impl TimeInfo {
    /// Fully implicit evaluation at the end of the step (`alpha_f = 1`).
    #[must_use]
    pub fn implicit(current_time: f64, time_increment: f64) -> Self {
        Self {
            current_time,
            time_increment,
            alpha_f: 1.0,
            method: IntegrationMethod::Implicit,
        }
    }

    /// Generalized-alpha parameters from the spectral radius at infinity.
    ///
    /// `rho_inf` is clamped to `[0, 1]`; 1 gives the trapezoidal rule
    /// (`alpha_f = 0.5`), 0 gives maximal high-frequency damping.
    #[must_use]
    pub fn generalized_alpha(current_time: f64, time_increment: f64, rho_inf: f64) -> Self {
        let rho = rho_inf.clamp(0.0, 1.0);
        Self {
            current_time,
            time_increment,
            alpha_f: 1.0 / (1.0 + rho),
            method: IntegrationMethod::GeneralizedAlpha,
        }
    }

    /// Override the force blend parameter.
    #[must_use]
    pub fn with_alpha(mut self, alpha_f: f64) -> Self {
        self.alpha_f = alpha_f;
        self
    }

    /// Force blend parameter used by connectors.
    #[must_use]
    pub const fn alpha(&self) -> f64 {
        self.alpha_f
    }
}
