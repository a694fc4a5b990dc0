//! # Graph Solver
//!
//! A Rust library for sparse nonlinear least-squares optimization on a
//! hyper-graph of state variables (vertices) connected by measurement
//! constraints (edges), as used for SLAM, pose-graph smoothing and bundle
//! adjustment style problems.
//!
//! ## Features
//!
//! - **Hyper-graph data model**: typed vertices and edges with unique ids,
//!   shared parameters and per-vertex derived caches
//! - **Active-set construction**: level-filtered edge selection and a
//!   deterministic index mapping between the graph and the linear system
//! - **Multiple Optimization Algorithms**: Gauss-Newton and
//!   Levenberg-Marquardt steps over a pluggable sparse linear solver
//! - **Spanning-tree initial guess**: best-first propagation from fixed and
//!   prior-constrained vertices
//! - **High Performance**: sparse Cholesky on the faer linear algebra
//!   library, parallel error/Jacobian evaluation above a size threshold
//!
//! ## Example
//!
//! ```
//! use graph_solver::algorithm::GaussNewton;
//! use graph_solver::graph::Edge;
//! use graph_solver::optimizer::SparseOptimizer;
//! use graph_solver::types::{EdgePointXYZ, VertexPointXYZ};
//! use nalgebra::Vector3;
//!
//! let mut optimizer = SparseOptimizer::new();
//! let mut anchor = VertexPointXYZ::new(0, Vector3::zeros());
//! anchor.set_fixed(true);
//! optimizer.add_vertex(Box::new(anchor));
//! optimizer.add_vertex(Box::new(VertexPointXYZ::new(1, Vector3::zeros())));
//!
//! let mut edge = EdgePointXYZ::new(0);
//! edge.core_mut().set_vertex(0, 0);
//! edge.core_mut().set_vertex(1, 1);
//! edge.set_measurement(Vector3::new(1.0, 2.0, 3.0));
//! optimizer.add_edge(Box::new(edge));
//!
//! optimizer.set_algorithm(Box::new(GaussNewton::new()));
//! assert!(optimizer.initialize_optimization(-1));
//! assert_eq!(optimizer.optimize(1, false), 1);
//! optimizer.compute_active_errors();
//! assert!(optimizer.active_chi2() < 1e-18);
//! ```

pub mod algorithm;
pub mod error;
pub mod graph;
pub mod linalg;
pub mod logger;
pub mod manifold;
pub mod optimizer;
pub mod robust;
pub mod types;

// Re-export the central types
pub use algorithm::{GaussNewton, LevenbergMarquardt, OptimizationAlgorithm, SolveOutcome};
pub use error::{GraphSolverError, GraphSolverResult};
pub use graph::{Edge, HyperGraph, Parameter, Vertex};
pub use linalg::{BlockCholeskySolver, LinearSolver};
pub use logger::init_logger;
pub use optimizer::SparseOptimizer;
pub use robust::{CauchyKernel, HuberKernel, RobustKernel};
