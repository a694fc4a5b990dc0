//! Optimization algorithms driving the sparse optimizer
//!
//! An algorithm performs one step per call: error computation, linearization,
//! a linear solve through the [`crate::linalg::LinearSolver`] contract, and
//! the manifold update of the active vertices. Two schemes are provided:
//! - Gauss-Newton (fast convergence, may be unstable)
//! - Levenberg-Marquardt (adaptive damping, speculative steps over the
//!   vertex estimate stack)

use nalgebra::DMatrix;

use crate::graph::{EdgeId, VertexId};
use crate::optimizer::SparseOptimizer;

pub mod gauss_newton;
pub mod levenberg_marquardt;

pub use gauss_newton::GaussNewton;
pub use levenberg_marquardt::LevenbergMarquardt;

/// Outcome of one algorithm step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveOutcome {
    /// The step was applied
    Ok,
    /// No further progress is possible; the loop stops cleanly
    Terminate,
    /// The step failed; the loop reports a failure
    Fail,
}

/// One linearize-and-solve scheme driving the optimizer loop.
pub trait OptimizationAlgorithm: Send {
    fn name(&self) -> &'static str;

    /// Prepare the linear solver structure for the current active set.
    fn init(&mut self, optimizer: &mut SparseOptimizer, online: bool) -> bool;

    /// Perform one iteration: error, linearize, solve, update.
    fn solve(&mut self, optimizer: &mut SparseOptimizer, iteration: i32, online: bool)
    -> SolveOutcome;

    /// Extend the solver structure after an incremental active-set update.
    fn update_structure(
        &mut self,
        optimizer: &mut SparseOptimizer,
        new_vertices: &[VertexId],
        new_edges: &[EdgeId],
    ) -> bool;

    /// Selected blocks of the inverse Hessian; requires an assembled system.
    fn compute_marginals(
        &mut self,
        optimizer: &mut SparseOptimizer,
        block_indices: &[(usize, usize)],
    ) -> Option<Vec<DMatrix<f64>>>;

    /// Algorithm-specific fields appended to the verbose iteration line.
    fn verbose_suffix(&self) -> String {
        String::new()
    }
}
