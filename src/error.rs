//! Error types for the graph-solver library
//!
//! This module provides the main error and result types used throughout the
//! library. All errors use the `thiserror` crate for automatic trait
//! implementations; each module defines its own error enum and converts into
//! the top-level [`GraphSolverError`].

use crate::{graph, linalg};
use thiserror::Error;

/// Main result type used throughout the graph-solver library
pub type GraphSolverResult<T> = Result<T, GraphSolverError>;

/// Main error type for the graph-solver library
#[derive(Debug, Clone, Error)]
pub enum GraphSolverError {
    /// Structural errors on the hyper-graph (unknown ids, duplicate ids)
    #[error("Graph error: {0}")]
    Graph(String),

    /// Linear algebra related errors
    #[error("Linear algebra error: {0}")]
    LinearAlgebra(String),

    /// Optimizer loop related errors
    #[error("Optimizer error: {0}")]
    Optimizer(String),

    /// Wire-format parsing errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid input parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<std::num::ParseFloatError> for GraphSolverError {
    fn from(err: std::num::ParseFloatError) -> Self {
        GraphSolverError::Parse(format!("Failed to parse float: {err}"))
    }
}

impl From<std::num::ParseIntError> for GraphSolverError {
    fn from(err: std::num::ParseIntError) -> Self {
        GraphSolverError::Parse(format!("Failed to parse integer: {err}"))
    }
}

impl From<graph::GraphError> for GraphSolverError {
    fn from(err: graph::GraphError) -> Self {
        GraphSolverError::Graph(err.to_string())
    }
}

impl From<linalg::LinAlgError> for GraphSolverError {
    fn from(err: linalg::LinAlgError) -> Self {
        GraphSolverError::LinearAlgebra(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = GraphSolverError::LinearAlgebra("Hessian is not positive definite".to_string());
        assert_eq!(
            error.to_string(),
            "Linear algebra error: Hessian is not positive definite"
        );
    }

    #[test]
    fn test_error_from_parse_float() {
        let parse_err = "not-a-number".parse::<f64>().unwrap_err();
        let error = GraphSolverError::from(parse_err);
        match error {
            GraphSolverError::Parse(msg) => assert!(msg.contains("float")),
            _ => panic!("Expected parse error"),
        }
    }

    #[test]
    fn test_result_ok() {
        let result: GraphSolverResult<i32> = Ok(42);
        assert!(result.is_ok());
    }
}
