//! Core types for the rigid connector engine.
//!
//! This crate provides the data the nonlinear solver shares with rigid
//! connectors:
//!
//! - [`RigidBody`] - Current, previous and reference pose of a rigid body,
//!   its equation numbers and reaction accumulators
//! - [`RigidBodySet`] - Arena owning all bodies, indexed by [`BodyId`]
//! - [`EquationNumbers`] - Mapping of the 6 rigid DOF to global equations
//! - [`TimeInfo`] - Generalized-alpha blend parameters for one evaluation
//! - [`SimError`] - Setup, parse and checkpoint errors
//!
//! # Design Philosophy
//!
//! These types are **pure data**. Bodies are updated by the solver between
//! Newton iterations; connectors read their kinematics and only add into
//! the reaction accumulators.
//!
//! # Example
//!
//! ```
//! use sim_types::{EquationNumbers, RigidBody, RigidBodySet};
//! use nalgebra::Point3;
//!
//! let mut bodies = RigidBodySet::new();
//! let ground = bodies.add(RigidBody::at(Point3::origin()));
//! let arm = bodies.add(
//!     RigidBody::at(Point3::new(1.0, 0.0, 0.0)).with_equations(EquationNumbers::free(0)),
//! );
//!
//! assert_eq!(bodies.num_equations(), 6);
//! assert!(bodies.get(ground).is_some());
//! assert_eq!(bodies.get(arm).map(|b| b.position.x), Some(1.0));
//! ```

#![doc(html_root_url = "https://docs.rs/sim-types/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
    clippy::cast_precision_loss,       // usize to f64 is fine for counts
    clippy::missing_errors_doc,        // Error docs added where non-obvious
)]

mod body;
mod config;
mod error;

pub use body::{BodyId, EquationNumbers, RigidBody, RigidBodySet};
pub use config::{IntegrationMethod, TimeInfo};
pub use error::SimError;

// Re-export math types for convenience
pub use nalgebra::{Point3, UnitQuaternion, Vector3};

/// Result type for simulation operations.
pub type Result<T> = std::result::Result<T, SimError>;
