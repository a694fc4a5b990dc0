//! Levenberg-Marquardt algorithm implementation.
//!
//! Interpolates between Gauss-Newton and gradient descent through an adaptive
//! damping parameter. Each iteration assembles the system once and then runs
//! damping trials: the active vertices are saved on their estimate stacks, a
//! damped step is applied speculatively, and the step is kept (stack top
//! discarded) or rolled back (stack popped) depending on the gain ratio.

use nalgebra::DMatrix;

use super::{OptimizationAlgorithm, SolveOutcome};
use crate::graph::{EdgeId, VertexId};
use crate::linalg::{BlockCholeskySolver, LinearSolver};
use crate::optimizer::SparseOptimizer;

/// Levenberg-Marquardt solver for the sparse optimizer.
pub struct LevenbergMarquardt {
    solver: Box<dyn LinearSolver>,
    lambda: f64,
    ni: f64,
    tau: f64,
    user_lambda_init: Option<f64>,
    max_trials_after_failure: usize,
    levenberg_iterations: i32,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self::new()
    }
}

impl LevenbergMarquardt {
    pub fn new() -> Self {
        Self::with_solver(Box::new(BlockCholeskySolver::new()))
    }

    pub fn with_solver(solver: Box<dyn LinearSolver>) -> Self {
        LevenbergMarquardt {
            solver,
            lambda: -1.0,
            ni: 2.0,
            tau: 1e-5,
            user_lambda_init: None,
            max_trials_after_failure: 10,
            levenberg_iterations: 0,
        }
    }

    /// Fix the initial damping instead of deriving it from the Hessian
    /// diagonal.
    pub fn with_initial_lambda(mut self, lambda: f64) -> Self {
        self.user_lambda_init = Some(lambda);
        self
    }

    /// Bound the number of damping trials within one iteration.
    pub fn with_max_trials(mut self, trials: usize) -> Self {
        self.max_trials_after_failure = trials;
        self
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    fn initial_lambda(&self) -> f64 {
        match self.user_lambda_init {
            Some(lambda) => lambda,
            None => self.tau * self.solver.max_hessian_diagonal(),
        }
    }

    /// Damping update on an accepted step (Nielsen's ⅓-rule).
    fn accept(&mut self, rho: f64) {
        let tmp = 2.0 * rho - 1.0;
        self.lambda *= (1.0_f64 / 3.0).max(1.0 - tmp * tmp * tmp);
        self.ni = 2.0;
    }

    fn reject(&mut self) {
        self.lambda *= self.ni;
        self.ni *= 2.0;
    }
}

impl OptimizationAlgorithm for LevenbergMarquardt {
    fn name(&self) -> &'static str {
        "Levenberg-Marquardt"
    }

    fn init(&mut self, optimizer: &mut SparseOptimizer, online: bool) -> bool {
        self.lambda = -1.0;
        self.ni = 2.0;
        self.solver.init_structure(optimizer.system_layout(), online)
    }

    fn solve(
        &mut self,
        optimizer: &mut SparseOptimizer,
        iteration: i32,
        _online: bool,
    ) -> SolveOutcome {
        optimizer.compute_active_errors();
        let current_chi2 = optimizer.active_chi2();
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

        if self.lambda < 0.0 {
            self.lambda = self.initial_lambda();
        }

        self.levenberg_iterations = 0;
        let mut outcome = SolveOutcome::Terminate;
        for _trial in 0..self.max_trials_after_failure {
            optimizer.push();
            let Some(delta) = self.solver.solve_damped(self.lambda) else {
                optimizer.discard_top();
                tracing::warn!("damped linear solve failed");
                return SolveOutcome::Fail;
            };
            optimizer.update(delta.as_slice());
            optimizer.compute_active_errors();
            let new_chi2 = optimizer.active_chi2();
            self.levenberg_iterations += 1;

            // gain ratio of actual vs predicted reduction
            let scale =
                self.lambda * delta.norm_squared() - self.solver.gradient_dot(&delta) + 1e-3;
            let rho = (current_chi2 - new_chi2) / scale;

            if rho > 0.0 && new_chi2.is_finite() {
                optimizer.discard_top();
                self.accept(rho);
                outcome = SolveOutcome::Ok;
                break;
            }

            optimizer.pop();
            self.reject();
            if optimizer.terminate() {
                outcome = SolveOutcome::Terminate;
                break;
            }
        }

        if outcome == SolveOutcome::Terminate {
            tracing::debug!(
                lambda = self.lambda,
                trials = self.levenberg_iterations,
                "no productive damping trial found"
            );
        }
        if let Some(stats) = optimizer.iteration_stats_mut(iteration) {
            stats.lambda = self.lambda;
            stats.levenberg_iterations = self.levenberg_iterations;
        }
        outcome
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

    fn verbose_suffix(&self) -> String {
        format!(
            "\t lambda= {}\t levenbergIter= {}",
            self.lambda, self.levenberg_iterations
        )
    }
}
