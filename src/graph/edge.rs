//! Edge contract for the hyper-graph
//!
//! An edge constrains an ordered tuple of vertices through a measurement `z`
//! with information matrix `Ω`. The [`Edge`] trait is the capability set the
//! optimizer and the linear solver consume: error evaluation, linearization
//! into per-vertex Jacobian blocks, robustification, the spanning-tree
//! initial-estimate hooks and the whitespace-delimited wire payload.
//!
//! Jacobian storage lives inside [`EdgeCore`], so the assembly loop reads
//! blocks through the trait without ever downcasting an edge.

use std::any::Any;
use std::collections::HashSet;

use nalgebra::{DMatrix, DVector};

use crate::graph::parameter::ParameterContainer;
use crate::graph::{EdgeId, GraphError, ParameterId, TokenScanner, VertexContainer, VertexId};
use crate::robust::RobustKernel;

/// Storage shared by every edge type: incident vertex ids, level tag,
/// information matrix, and the per-evaluation error / Jacobian buffers.
pub struct EdgeCore {
    id: EdgeId,
    level: i32,
    vertices: Vec<VertexId>,
    error: DVector<f64>,
    information: DMatrix<f64>,
    jacobians: Vec<DMatrix<f64>>,
    kernel: Option<Box<dyn RobustKernel>>,
    robust_weight: f64,
    parameters: Vec<ParameterId>,
}

impl EdgeCore {
    /// Create the storage for an edge of measurement dimension `dimension`
    /// incident to vertices with the given local dimensions.
    pub fn new(id: EdgeId, dimension: usize, vertex_dimensions: &[usize]) -> Self {
        EdgeCore {
            id,
            level: 0,
            vertices: vec![-1; vertex_dimensions.len()],
            error: DVector::zeros(dimension),
            information: DMatrix::identity(dimension, dimension),
            jacobians: vertex_dimensions
                .iter()
                .map(|&d| DMatrix::zeros(dimension, d))
                .collect(),
            kernel: None,
            robust_weight: 1.0,
            parameters: Vec::new(),
        }
    }

    pub fn id(&self) -> EdgeId {
        self.id
    }

    pub fn set_id(&mut self, id: EdgeId) {
        self.id = id;
    }

    pub fn level(&self) -> i32 {
        self.level
    }

    pub fn set_level(&mut self, level: i32) {
        self.level = level;
    }

    pub fn vertices(&self) -> &[VertexId] {
        &self.vertices
    }

    /// Bind the vertex at the given slot of the ordered tuple.
    pub fn set_vertex(&mut self, slot: usize, id: VertexId) {
        self.vertices[slot] = id;
    }

    pub fn error(&self) -> &DVector<f64> {
        &self.error
    }

    pub fn error_mut(&mut self) -> &mut DVector<f64> {
        &mut self.error
    }

    pub fn information(&self) -> &DMatrix<f64> {
        &self.information
    }

    /// Set the information matrix. `Ω` must be symmetric.
    pub fn set_information(&mut self, information: DMatrix<f64>) {
        debug_assert!(
            {
                let mut symmetric = information.nrows() == information.ncols();
                if symmetric {
                    for i in 0..information.nrows() {
                        for j in (i + 1)..information.ncols() {
                            symmetric &= (information[(i, j)] - information[(j, i)]).abs() < 1e-9;
                        }
                    }
                }
                symmetric
            },
            "information matrix must be symmetric"
        );
        self.information = information;
    }

    pub fn jacobian(&self, slot: usize) -> &DMatrix<f64> {
        &self.jacobians[slot]
    }

    pub fn jacobian_mut(&mut self, slot: usize) -> &mut DMatrix<f64> {
        &mut self.jacobians[slot]
    }

    pub fn robust_kernel(&self) -> Option<&dyn RobustKernel> {
        self.kernel.as_deref()
    }

    pub fn set_robust_kernel(&mut self, kernel: Option<Box<dyn RobustKernel>>) {
        self.kernel = kernel;
        self.robust_weight = 1.0;
    }

    /// Weight from the last robustification pass, 1.0 without a kernel.
    pub fn robust_weight(&self) -> f64 {
        self.robust_weight
    }

    pub fn parameter_ids(&self) -> &[ParameterId] {
        &self.parameters
    }

    pub fn set_parameter_ids(&mut self, parameters: Vec<ParameterId>) {
        self.parameters = parameters;
    }
}

/// Capability set every edge satisfies.
pub trait Edge: Send {
    fn core(&self) -> &EdgeCore;
    fn core_mut(&mut self) -> &mut EdgeCore;

    /// Dimension of the measurement / error vector.
    fn dimension(&self) -> usize;

    /// Number of parameter ids on the wire payload.
    fn num_parameters(&self) -> usize {
        0
    }

    /// Evaluate the error vector at the current vertex estimates.
    fn compute_error(&mut self, vertices: &VertexContainer, parameters: &ParameterContainer);

    /// Evaluate the Jacobian blocks w.r.t. each incident vertex's local
    /// parameterization.
    fn linearize(&mut self, vertices: &VertexContainer, parameters: &ParameterContainer);

    /// Cost of initializing vertex `to` from the vertices in `from` through
    /// this edge; infinity if the edge cannot initialize `to`.
    fn initial_estimate_possible(&self, from: &HashSet<VertexId>, to: VertexId) -> f64;

    /// Set the estimate of vertex `to` from the vertices in `from`.
    fn initial_estimate(
        &self,
        from: &HashSet<VertexId>,
        to: VertexId,
        vertices: &mut VertexContainer,
    );

    /// Install the caches this edge reads on the vertices that own them.
    /// Idempotent; the default installs nothing.
    fn install_caches(
        &self,
        _vertices: &mut VertexContainer,
        _parameters: &ParameterContainer,
    ) -> Result<(), GraphError> {
        Ok(())
    }

    /// Read the wire payload: parameter ids, measurement, upper-triangular
    /// information (mirrored to the lower triangle).
    fn read_data(&mut self, scanner: &mut TokenScanner) -> Result<(), GraphError>;

    /// Write the wire payload in the same token order `read_data` consumes.
    fn write_data(&self, out: &mut String);

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn id(&self) -> EdgeId {
        self.core().id()
    }

    fn set_id(&mut self, id: EdgeId) {
        self.core_mut().set_id(id);
    }

    fn level(&self) -> i32 {
        self.core().level()
    }

    fn set_level(&mut self, level: i32) {
        self.core_mut().set_level(level);
    }

    fn num_vertices(&self) -> usize {
        self.core().vertices().len()
    }

    /// Squared information-weighted error `r^T Ω r`.
    fn chi2(&self) -> f64 {
        let core = self.core();
        core.error.dot(&(&core.information * &core.error))
    }

    /// Robustified squared error; equals [`Edge::chi2`] without a kernel.
    fn robust_chi2(&self) -> f64 {
        let chi2 = self.chi2();
        match self.core().kernel.as_deref() {
            Some(kernel) => kernel.rho(chi2),
            None => chi2,
        }
    }

    /// Recompute the robust weight from the current error so that assembly
    /// treats the edge as if `Ω' = w·Ω`.
    fn robustify_error(&mut self) {
        let chi2 = self.chi2();
        let core = self.core_mut();
        core.robust_weight = match core.kernel.as_deref() {
            Some(kernel) => kernel.weight(chi2),
            None => 1.0,
        };
    }
}

/// Append a token to a wire payload, space separated.
pub(crate) fn push_token(out: &mut String, token: &str) {
    if !out.is_empty() {
        out.push(' ');
    }
    out.push_str(token);
}

/// Read an upper-triangular information matrix and mirror it to the lower
/// triangle.
pub(crate) fn read_information(
    scanner: &mut TokenScanner,
    information: &mut DMatrix<f64>,
) -> Result<(), GraphError> {
    let dim = information.nrows();
    for i in 0..dim {
        for j in i..dim {
            let value = scanner.next_f64()?;
            information[(i, j)] = value;
            if i != j {
                information[(j, i)] = value;
            }
        }
    }
    Ok(())
}

/// Write the upper triangle of an information matrix.
pub(crate) fn write_information(out: &mut String, information: &DMatrix<f64>) {
    let dim = information.nrows();
    for i in 0..dim {
        for j in i..dim {
            push_token(out, &format!("{}", information[(i, j)]));
        }
    }
}
