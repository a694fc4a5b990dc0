//! Gauss-Newton algorithm implementation.
//!
//! One step: evaluate the active errors, linearize, solve the undamped
//! normal equations `Hδ = -g` and apply the increment. Fast on
//! well-conditioned problems; exact on linear ones.

use nalgebra::DMatrix;

use super::{OptimizationAlgorithm, SolveOutcome};
use crate::graph::{EdgeId, VertexId};
use crate::linalg::{BlockCholeskySolver, LinearSolver};
use crate::optimizer::SparseOptimizer;

/// Gauss-Newton solver for the sparse optimizer.
pub struct GaussNewton {
    solver: Box<dyn LinearSolver>,
}

impl Default for GaussNewton {
    fn default() -> Self {
        Self::new()
    }
}

impl GaussNewton {
    pub fn new() -> Self {
        Self::with_solver(Box::new(BlockCholeskySolver::new()))
    }

    pub fn with_solver(solver: Box<dyn LinearSolver>) -> Self {
        GaussNewton { solver }
    }
}

impl OptimizationAlgorithm for GaussNewton {
    fn name(&self) -> &'static str {
        "Gauss-Newton"
    }

    fn init(&mut self, optimizer: &mut SparseOptimizer, online: bool) -> bool {
        self.solver.init_structure(optimizer.system_layout(), online)
    }

    fn solve(
        &mut self,
        optimizer: &mut SparseOptimizer,
        _iteration: i32,
        _online: bool,
    ) -> SolveOutcome {
        optimizer.compute_active_errors();
        optimizer.linearize_system();

        let build = self.solver.build_system(
            optimizer.graph().edges(),
            optimizer.graph().vertices(),
            optimizer.active_edges(),
        );
        if let Err(error) = build {
            tracing::warn!(%error, "system assembly failed");
            return SolveOutcome::Fail;
        }

        let Some(delta) = self.solver.solve() else {
            tracing::warn!("linear solve failed");
            return SolveOutcome::Fail;
        };
        optimizer.update(delta.as_slice());
        SolveOutcome::Ok
    }

    fn update_structure(
        &mut self,
        optimizer: &mut SparseOptimizer,
        _new_vertices: &[VertexId],
        _new_edges: &[EdgeId],
    ) -> bool {
        self.solver.update_structure(optimizer.system_layout())
    }

    fn compute_marginals(
        &mut self,
        _optimizer: &mut SparseOptimizer,
        block_indices: &[(usize, usize)],
    ) -> Option<Vec<DMatrix<f64>>> {
        self.solver.compute_marginals(block_indices)
    }
}
