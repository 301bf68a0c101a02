//! Connector container and the outer augmentation loop.
//!
//! # Solve Sequence
//!
//! ```text
//! for each time step:
//!     n = 0
//!     loop:
//!         Newton solve  (load_vector + stiffness_matrix every iteration)
//!         if augment(n) on every connector converged: break
//!         n += 1
//!     update
//! ```
//!
//! Connectors are visited sequentially in registration order. Contributions
//! are only ever added into the global system, so connectors sharing a body
//! need no further coordination.

use sim_types::{RigidBodySet, TimeInfo};
use tracing::debug;

use crate::{Archive, ConnectorId, DiagnosticSink, GlobalVector, RigidConnector, TangentAssembler};

/// All rigid connectors of a model.
#[derive(Debug, Default)]
pub struct ConnectorSet {
    connectors: Vec<Box<dyn RigidConnector>>,
    next_id: u64,
}

impl ConnectorSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connector and assign it the next id.
    pub fn add(&mut self, connector: impl RigidConnector + 'static) -> ConnectorId {
        self.add_boxed(Box::new(connector))
    }

    /// Register an already boxed connector.
    pub fn add_boxed(&mut self, mut connector: Box<dyn RigidConnector>) -> ConnectorId {
        let id = ConnectorId::new(self.next_id);
        self.next_id += 1;
        connector.base_mut().set_id(id);
        self.connectors.push(connector);
        id
    }

    /// Number of connectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }

    /// Look up a connector.
    #[must_use]
    pub fn get(&self, id: ConnectorId) -> Option<&dyn RigidConnector> {
        self.connectors
            .iter()
            .find(|c| c.id() == id)
            .map(AsRef::as_ref)
    }

    /// Iterate over all connectors.
    pub fn iter(&self) -> impl Iterator<Item = &dyn RigidConnector> {
        self.connectors.iter().map(AsRef::as_ref)
    }

    /// Initialize every connector; the first failure aborts.
    ///
    /// # Errors
    ///
    /// Returns the error of the first connector that fails to initialize.
    pub fn init(&mut self, bodies: &RigidBodySet) -> sim_types::Result<()> {
        for connector in &mut self.connectors {
            connector.init(bodies)?;
            debug!(
                connector = connector.id().raw(),
                kind = connector.kind(),
                "connector initialized"
            );
        }
        Ok(())
    }

    /// Reset every connector to its unstrained state.
    ///
    /// # Errors
    ///
    /// Returns the error of the first connector that fails to reset.
    pub fn reset(&mut self, bodies: &RigidBodySet) -> sim_types::Result<()> {
        for connector in &mut self.connectors {
            connector.reset(bodies)?;
        }
        debug!(count = self.connectors.len(), "connectors reset");
        Ok(())
    }

    /// Add every connector's residual contribution.
    pub fn load_vector(
        &mut self,
        residual: &mut dyn GlobalVector,
        bodies: &mut RigidBodySet,
        tp: &TimeInfo,
    ) {
        for connector in &mut self.connectors {
            connector.load_vector(residual, bodies, tp);
        }
    }

    /// Assemble every connector's tangent block.
    pub fn stiffness_matrix(
        &mut self,
        tangent: &mut dyn TangentAssembler,
        bodies: &RigidBodySet,
        tp: &TimeInfo,
    ) {
        for connector in &mut self.connectors {
            connector.stiffness_matrix(tangent, bodies, tp);
        }
    }

    /// Augment every connector; `true` if all converged.
    ///
    /// Every connector is augmented even after one reports non-convergence.
    pub fn augment(
        &mut self,
        naug: usize,
        bodies: &RigidBodySet,
        tp: &TimeInfo,
        sink: &mut dyn DiagnosticSink,
    ) -> bool {
        self.connectors
            .iter_mut()
            .fold(true, |converged, c| c.augment(naug, bodies, tp, sink) && converged)
    }

    /// Recompute cached forces after an accepted step.
    pub fn update(&mut self, bodies: &RigidBodySet, tp: &TimeInfo) {
        for connector in &mut self.connectors {
            connector.update(bodies, tp);
        }
    }

    /// Save or restore every connector in registration order.
    ///
    /// # Errors
    ///
    /// Propagates archive failures.
    pub fn serialize(&mut self, ar: &mut dyn Archive) -> sim_types::Result<()> {
        for connector in &mut self.connectors {
            connector.serialize(ar)?;
        }
        Ok(())
    }
}

/// Outcome of one augmented time step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepSummary {
    /// Newton solves performed.
    pub newton_solves: usize,
    /// Index of the augmentation that converged.
    pub augmentations: usize,
}

/// Outer Uzawa loop for one time step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AugmentedStep {
    /// Upper bound on Newton solves, independent of connector settings.
    pub max_newton_solves: usize,
}

impl Default for AugmentedStep {
    fn default() -> Self {
        Self {
            max_newton_solves: 100,
        }
    }
}

impl AugmentedStep {
    /// Run Newton solves until every connector accepts its multipliers, then
    /// update the cached connector forces.
    ///
    /// `newton` performs one full Newton solve of the model (assembling the
    /// connectors through [`ConnectorSet::load_vector`] and
    /// [`ConnectorSet::stiffness_matrix`]).
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by `newton`.
    pub fn run<E, F>(
        &self,
        connectors: &mut ConnectorSet,
        bodies: &mut RigidBodySet,
        tp: &TimeInfo,
        sink: &mut dyn DiagnosticSink,
        mut newton: F,
    ) -> Result<StepSummary, E>
    where
        F: FnMut(&mut ConnectorSet, &mut RigidBodySet) -> Result<(), E>,
    {
        let mut naug = 0;
        let mut newton_solves = 0;
        loop {
            newton(&mut *connectors, &mut *bodies)?;
            newton_solves += 1;

            let converged = connectors.augment(naug, bodies, tp, sink);
            if converged || newton_solves >= self.max_newton_solves {
                break;
            }
            naug += 1;
        }
        connectors.update(bodies, tp);

        Ok(StepSummary {
            newton_solves,
            augmentations: naug,
        })
    }
}
