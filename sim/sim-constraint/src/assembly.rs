//! Global system seams connectors contribute into.
//!
//! The nonlinear solver owns the global residual vector and tangent matrix.
//! Connectors (like elements) only ever *add* into them, so contributions of
//! several connectors touching the same body sum up regardless of order.
//!
//! Local blocks use the body-major layout `[A: ux uy uz θx θy θz | B: …]`.

use nalgebra::{DMatrix, DVector, SMatrix, SVector};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use sim_types::EquationNumbers;

/// Local 12×12 tangent block of a two-body connector.
pub type Matrix12 = SMatrix<f64, 12, 12>;

/// Local 12-entry residual of a two-body connector.
pub type Vector12 = SVector<f64, 12>;

/// Local-to-global equation map for a two-body block.
pub type LocalDofMap = [Option<usize>; 12];

/// Concatenate the equation numbers of two bodies.
#[must_use]
pub fn dof_map(a: &EquationNumbers, b: &EquationNumbers) -> LocalDofMap {
    let mut lm = [None; 12];
    lm[..6].copy_from_slice(a.slots());
    lm[6..].copy_from_slice(b.slots());
    lm
}

/// Additive residual accumulator.
pub trait GlobalVector {
    /// Add `value` to equation `eq`.
    fn add(&mut self, eq: usize, value: f64);

    /// Add a local vector at the rows given by `lm`, skipping `None` slots.
    fn assemble(&mut self, fe: &Vector12, lm: &LocalDofMap) {
        for (value, eq) in fe.iter().zip(lm.iter()) {
            if let Some(eq) = eq {
                self.add(*eq, *value);
            }
        }
    }
}

impl GlobalVector for DVector<f64> {
    fn add(&mut self, eq: usize, value: f64) {
        self[eq] += value;
    }
}

impl GlobalVector for Vec<f64> {
    fn add(&mut self, eq: usize, value: f64) {
        self[eq] += value;
    }
}

/// Additive tangent matrix assembler.
pub trait TangentAssembler {
    /// Add a dense local block at rows/columns `lm`, skipping `None` slots.
    fn assemble(&mut self, ke: &Matrix12, lm: &LocalDofMap);
}

impl TangentAssembler for DMatrix<f64> {
    fn assemble(&mut self, ke: &Matrix12, lm: &LocalDofMap) {
        for (i, row) in lm.iter().enumerate() {
            let Some(row) = row else { continue };
            for (j, col) in lm.iter().enumerate() {
                let Some(col) = col else { continue };
                self[(*row, *col)] += ke[(i, j)];
            }
        }
    }
}

/// Sparse tangent built from triplets.
///
/// Duplicate entries are summed when converting to CSR, which makes the
/// assembly order-independent.
#[derive(Debug, Clone)]
pub struct SparseTangent {
    coo: CooMatrix<f64>,
}

impl SparseTangent {
    /// Create an empty `n × n` tangent.
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self {
            coo: CooMatrix::new(n, n),
        }
    }

    /// Matrix dimension.
    #[must_use]
    pub fn size(&self) -> usize {
        self.coo.nrows()
    }

    /// Number of stored triplets (before duplicate summation).
    #[must_use]
    pub fn nnz(&self) -> usize {
        self.coo.nnz()
    }

    /// Compressed form with duplicates summed.
    #[must_use]
    pub fn to_csr(&self) -> CsrMatrix<f64> {
        CsrMatrix::from(&self.coo)
    }

    /// Dense copy (for tests and small systems).
    #[must_use]
    pub fn to_dense(&self) -> DMatrix<f64> {
        let n = self.size();
        let mut dense = DMatrix::zeros(n, n);
        for (row, col, val) in self.coo.triplet_iter() {
            dense[(row, col)] += *val;
        }
        dense
    }
}

impl TangentAssembler for SparseTangent {
    fn assemble(&mut self, ke: &Matrix12, lm: &LocalDofMap) {
        for (i, row) in lm.iter().enumerate() {
            let Some(row) = row else { continue };
            for (j, col) in lm.iter().enumerate() {
                let Some(col) = col else { continue };
                let val = ke[(i, j)];
                if val != 0.0 {
                    self.coo.push(*row, *col, val);
                }
            }
        }
    }
}
