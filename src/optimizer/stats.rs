//! Per-iteration optimization statistics

use std::fmt;

/// Metrics recorded for one iteration of the optimizer loop.
///
/// Statistics storage is pre-allocated for the requested iteration count
/// before the loop starts; iteration `i` writes slot `i` exclusively. The
/// algorithm-specific fields (`lambda`, `levenberg_iterations`) stay at their
/// defaults for algorithms that do not use them.
#[derive(Debug, Clone, Default)]
pub struct BatchStatistics {
    /// Iteration index
    pub iteration: i32,
    /// Number of vertices in the active set
    pub num_vertices: usize,
    /// Number of edges in the active set
    pub num_edges: usize,
    /// Robustified chi² after the iteration
    pub chi2: f64,
    /// Wall-clock seconds spent in the iteration
    pub time_iteration: f64,
    /// Damping parameter (Levenberg-Marquardt)
    pub lambda: f64,
    /// Number of damping trials in the iteration (Levenberg-Marquardt)
    pub levenberg_iterations: i32,
}

impl fmt::Display for BatchStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "iteration= {}\t chi2= {:.6}\t time= {:.6}\t vertices= {}\t edges= {}",
            self.iteration, self.chi2, self.time_iteration, self.num_vertices, self.num_edges
        )?;
        if self.levenberg_iterations > 0 {
            write!(
                f,
                "\t lambda= {:.6e}\t levenbergIter= {}",
                self.lambda, self.levenberg_iterations
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_without_levenberg_fields() {
        let stats = BatchStatistics {
            iteration: 3,
            num_vertices: 10,
            num_edges: 20,
            chi2: 1.5,
            time_iteration: 0.25,
            ..Default::default()
        };
        let line = stats.to_string();
        assert!(line.contains("iteration= 3"));
        assert!(line.contains("edges= 20"));
        assert!(!line.contains("lambda"));
    }

    #[test]
    fn test_display_with_levenberg_fields() {
        let stats = BatchStatistics {
            lambda: 1e-4,
            levenberg_iterations: 2,
            ..Default::default()
        };
        let line = stats.to_string();
        assert!(line.contains("lambda"));
        assert!(line.contains("levenbergIter= 2"));
    }
}
