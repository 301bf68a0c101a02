//! Augmented-Lagrangian rigid connectors for implicit nonlinear solvers.
//!
//! A rigid connector couples two rigid bodies through penalty forces whose
//! Lagrange multipliers are refined between Newton solves (Uzawa
//! augmentation). The solver drives each connector through a fixed
//! lifecycle:
//!
//! ```text
//! init ─► [ load_vector + stiffness_matrix ]* ─► augment ─┐
//!              ▲                                          │ not converged
//!              └──────────────────────────────────────────┘
//!                                  converged ─► update
//! ```
//!
//! # Connector Types
//!
//! - [`LockConnector`]: removes all six relative degrees of freedom
//!
//! # Global Assembly
//!
//! Connectors never own global storage. Residuals go through
//! [`GlobalVector`], tangents through [`TangentAssembler`]; both are
//! implemented for dense `nalgebra` storage and the tangent additionally for
//! [`SparseTangent`] (COO triplets, CSR on demand).
//!
//! # Example
//!
//! ```
//! use sim_constraint::{ConnectorSet, LockConnector, RecordingSink};
//! use sim_types::{EquationNumbers, RigidBody, RigidBodySet, TimeInfo};
//! use nalgebra::{DVector, Point3, Vector3};
//!
//! let mut bodies = RigidBodySet::new();
//! let ground = bodies.add(RigidBody::at(Point3::origin()));
//! let arm = bodies.add(
//!     RigidBody::at(Point3::new(1.0, 0.0, 0.0)).with_equations(EquationNumbers::free(0)),
//! );
//!
//! let mut connectors = ConnectorSet::new();
//! connectors.add(
//!     LockConnector::new(ground, arm)
//!         .with_joint_origin(Vector3::new(0.5, 0.0, 0.0))
//!         .with_penalties(1e6, 1e6),
//! );
//! connectors.init(&bodies).unwrap();
//!
//! // the model is unstrained at its reference configuration
//! let tp = TimeInfo::default();
//! let mut residual = DVector::<f64>::zeros(bodies.num_equations());
//! connectors.load_vector(&mut residual, &mut bodies, &tp);
//! assert!(residual.norm() < 1e-12);
//! assert!(connectors.augment(0, &bodies, &tp, &mut RecordingSink::new()));
//! ```

#![doc(html_root_url = "https://docs.rs/sim-constraint/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,
    clippy::suboptimal_flops,
    clippy::similar_names,
)]

pub mod assembly;
mod augment;
mod checkpoint;
mod connector;
pub mod kinematics;
mod lock;
mod parser;
mod set;

pub use assembly::{
    GlobalVector, LocalDofMap, Matrix12, SparseTangent, TangentAssembler, Vector12, dof_map,
};
pub use augment::{
    AUTO_PENALTY_MIN_FACTOR, AugmentStatus, AugmentationReport, DiagnosticSink, RecordingSink,
    TracingSink, augment_multipliers, escalate_penalty,
};
pub use checkpoint::{Archive, CheckpointReader, CheckpointWriter};
pub use connector::{AugmentationSettings, ConnectorBase, ConnectorId, RigidConnector};
pub use kinematics::{BodyFrame, Triad};
pub use lock::LockConnector;
pub use parser::{LOCK_TYPE, LockConnectorConfig, parse_rigid_connectors_str};
pub use set::{AugmentedStep, ConnectorSet, StepSummary};

// Re-export types needed to drive connectors
pub use sim_types::{BodyId, RigidBody, RigidBodySet, SimError, TimeInfo};
