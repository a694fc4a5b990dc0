//! Sparse linear solver consumed by the optimization algorithms
//!
//! The solver assembles the normal equations `H = Σ JᵀΩJ`, `g = Σ JᵀΩr` from
//! the active edges, keyed by the index mapping the optimizer builds, and
//! solves `Hδ = -g` (Gauss-Newton) or the damped equivalent
//! (Levenberg-Marquardt). Marginalized vertices occupy the suffix of the
//! index map and are eliminated by Schur complement inside the solver.

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

use crate::graph::{EdgeContainer, EdgeId, VertexContainer};

pub mod block_solver;

pub use block_solver::BlockCholeskySolver;

/// Linear-algebra error types
#[derive(Debug, Clone, Error)]
pub enum LinAlgError {
    /// Cholesky factorization failed (system not positive definite)
    #[error("factorization failed: {0}")]
    FactorizationFailed(String),

    /// The solver was used before its structure was initialized
    #[error("linear solver structure is not initialized")]
    NotInitialized,

    /// Two marginalized vertices are coupled by an edge; the marginalized
    /// block must stay block-diagonal for Schur elimination
    #[error("marginalized vertices {0} and {1} are coupled by an edge")]
    MarginalCoupling(usize, usize),

    /// A marginalized diagonal block is singular
    #[error("marginalized block {0} is singular")]
    SingularMarginalBlock(usize),

    /// Sparse matrix construction failed
    #[error("sparse matrix error: {0}")]
    Sparse(String),
}

/// Result type for linear-algebra operations
pub type LinAlgResult<T> = Result<T, LinAlgError>;

/// Lifecycle of a linear solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverState {
    #[default]
    Uninitialized,
    /// Block layout known, no numeric values yet
    Structured,
    /// Hessian and gradient assembled
    Numeric,
    /// An increment was computed from the current numeric values
    Solved,
}

/// Dense column layout of the linear system, derived from the optimizer's
/// index mapping.
///
/// Block `i` of the system corresponds to the active vertex with
/// `temp_index == i`; non-marginalized blocks occupy `[0, marginalized_start)`
/// and marginalized blocks the suffix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemLayout {
    dimensions: Vec<usize>,
    offsets: Vec<usize>,
    marginalized_start: usize,
}

impl SystemLayout {
    pub fn new(dimensions: Vec<usize>, marginalized_start: usize) -> Self {
        let mut offsets = Vec::with_capacity(dimensions.len());
        let mut offset = 0;
        for &dim in &dimensions {
            offsets.push(offset);
            offset += dim;
        }
        SystemLayout {
            dimensions,
            offsets,
            marginalized_start,
        }
    }

    pub fn num_blocks(&self) -> usize {
        self.dimensions.len()
    }

    pub fn dimension(&self, block: usize) -> usize {
        self.dimensions[block]
    }

    pub fn offset(&self, block: usize) -> usize {
        self.offsets[block]
    }

    /// First block index of the marginalized suffix.
    pub fn marginalized_start(&self) -> usize {
        self.marginalized_start
    }

    /// Total scalar dimension of the system.
    pub fn total_dim(&self) -> usize {
        self.dimensions.iter().sum()
    }

    /// Scalar dimension of the non-marginalized prefix.
    pub fn pose_dim(&self) -> usize {
        self.dimensions[..self.marginalized_start].iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }
}

/// Contract between the optimization algorithms and the sparse back-end.
pub trait LinearSolver: Send {
    /// Build the block-sparse structure for the given layout. Idempotent.
    fn init_structure(&mut self, layout: &SystemLayout, online: bool) -> bool;

    /// Extend the structure after an incremental update without disturbing
    /// the existing block offsets.
    fn update_structure(&mut self, layout: &SystemLayout) -> bool;

    /// Assemble `H` and `g` from the active edges.
    fn build_system(
        &mut self,
        edges: &EdgeContainer,
        vertices: &VertexContainer,
        active_edges: &[EdgeId],
    ) -> LinAlgResult<()>;

    /// Solve `Hδ = -g`; `None` if the factorization fails.
    fn solve(&mut self) -> Option<DVector<f64>>;

    /// Solve `(H + λI)δ = -g`; `None` if the factorization fails.
    fn solve_damped(&mut self, lambda: f64) -> Option<DVector<f64>>;

    /// Largest diagonal entry of the assembled Hessian.
    fn max_hessian_diagonal(&self) -> f64;

    /// Inner product `δᵀ g` against the assembled gradient, used for the
    /// Levenberg-Marquardt gain ratio.
    fn gradient_dot(&self, delta: &DVector<f64>) -> f64;

    /// Selected blocks of `H⁻¹` for the requested `(block_row, block_col)`
    /// pairs in index-map space.
    fn compute_marginals(&mut self, block_indices: &[(usize, usize)]) -> Option<Vec<DMatrix<f64>>>;

    fn state(&self) -> SolverState;
}
