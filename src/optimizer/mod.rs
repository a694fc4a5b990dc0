//! Sparse graph optimizer
//!
//! [`SparseOptimizer`] drives the iterative nonlinear least-squares loop over
//! a [`HyperGraph`]: it selects the active vertices and edges participating in
//! a solve, assigns the dense index mapping consumed by the linear solver,
//! evaluates errors and Jacobians (in parallel above a size threshold),
//! applies increments through each vertex's manifold retraction, and exposes
//! the spanning-tree initial guess, gauge diagnostics, hook actions,
//! statistics and the speculative push/pop estimate stack.
//!
//! Structural mutation and `initialize_optimization` must not race with a
//! running `optimize`; the API is single-threaded, only the two inner edge
//! loops fan out to a worker pool.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use nalgebra::DMatrix;
use rayon::prelude::*;

use crate::algorithm::{OptimizationAlgorithm, SolveOutcome};
use crate::graph::{EdgeId, HyperGraph, VertexId};
use crate::linalg::SystemLayout;

pub mod actions;
pub mod propagator;
pub mod stats;

pub use actions::{ActionKind, ActionRegistry, GraphAction};
pub use propagator::{EdgeInitialCost, EstimatePropagator, PropagateCost};
pub use stats::BatchStatistics;

/// Minimum active-edge count before the error and Jacobian passes are
/// dispatched to the worker pool.
const PARALLEL_EDGE_THRESHOLD: usize = 50;

/// The optimization engine over a hyper-graph.
pub struct SparseOptimizer {
    graph: HyperGraph,
    active_vertices: Vec<VertexId>,
    active_edges: Vec<EdgeId>,
    active_edge_set: HashSet<EdgeId>,
    iv_map: Vec<VertexId>,
    layout: SystemLayout,
    algorithm: Option<Box<dyn OptimizationAlgorithm>>,
    actions: ActionRegistry,
    force_stop: Option<Arc<AtomicBool>>,
    verbose: bool,
    compute_batch_statistics: bool,
    batch_statistics: Vec<BatchStatistics>,
}

impl Default for SparseOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl SparseOptimizer {
    pub fn new() -> Self {
        SparseOptimizer {
            graph: HyperGraph::new(),
            active_vertices: Vec::new(),
            active_edges: Vec::new(),
            active_edge_set: HashSet::new(),
            iv_map: Vec::new(),
            layout: SystemLayout::default(),
            algorithm: None,
            actions: ActionRegistry::default(),
            force_stop: None,
            verbose: false,
            compute_batch_statistics: false,
            batch_statistics: Vec::new(),
        }
    }

    pub fn graph(&self) -> &HyperGraph {
        &self.graph
    }

    /// Mutable graph access. Structural changes invalidate the active set;
    /// call one of the `initialize_optimization` variants before the next
    /// solve.
    pub fn graph_mut(&mut self) -> &mut HyperGraph {
        &mut self.graph
    }

    pub fn add_vertex(&mut self, vertex: Box<dyn crate::graph::Vertex>) -> bool {
        self.graph.add_vertex(vertex)
    }

    pub fn add_edge(&mut self, edge: Box<dyn crate::graph::Edge>) -> bool {
        self.graph.add_edge(edge)
    }

    /// Remove a vertex; clears the index mapping if the vertex participated
    /// in the current active set.
    pub fn remove_vertex(&mut self, id: VertexId) -> bool {
        if let Some(vertex) = self.graph.vertex(id)
            && vertex.temp_index() >= 0
        {
            self.clear_index_mapping();
        }
        self.graph.remove_vertex(id)
    }

    pub fn remove_edge(&mut self, id: EdgeId) -> bool {
        self.graph.remove_edge(id)
    }

    /// Vertices of the current active set, ascending by id.
    pub fn active_vertices(&self) -> &[VertexId] {
        &self.active_vertices
    }

    /// Edges of the current active set, ascending by id.
    pub fn active_edges(&self) -> &[EdgeId] {
        &self.active_edges
    }

    /// Active non-fixed vertices in index order: non-marginalized prefix,
    /// marginalized suffix. Position equals the vertex's `temp_index`.
    pub fn index_map(&self) -> &[VertexId] {
        &self.iv_map
    }

    /// Column layout of the linear system derived from the index map.
    pub fn system_layout(&self) -> &SystemLayout {
        &self.layout
    }

    /// Binary search for a vertex in the active container.
    pub fn find_active_vertex(&self, id: VertexId) -> Option<usize> {
        self.active_vertices.binary_search(&id).ok()
    }

    /// Binary search for an edge in the active container.
    pub fn find_active_edge(&self, id: EdgeId) -> Option<usize> {
        self.active_edges.binary_search(&id).ok()
    }

    pub fn set_algorithm(&mut self, algorithm: Box<dyn OptimizationAlgorithm>) {
        self.algorithm = Some(algorithm);
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Install the externally owned stop flag polled at iteration boundaries.
    pub fn set_force_stop_flag(&mut self, flag: Option<Arc<AtomicBool>>) {
        self.force_stop = flag;
    }

    /// True if the external stop flag is set.
    pub fn terminate(&self) -> bool {
        self.force_stop
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    pub fn set_compute_batch_statistics(&mut self, enable: bool) {
        self.compute_batch_statistics = enable;
        if !enable {
            self.batch_statistics.clear();
        }
    }

    /// Statistics of the last `optimize` call, one slot per iteration.
    pub fn batch_statistics(&self) -> &[BatchStatistics] {
        &self.batch_statistics
    }

    /// Mutable access to one iteration's statistics slot; used by the
    /// algorithm to record its specific metrics.
    pub fn iteration_stats_mut(&mut self, iteration: i32) -> Option<&mut BatchStatistics> {
        if !self.compute_batch_statistics {
            return None;
        }
        self.batch_statistics.get_mut(iteration as usize)
    }

    pub fn add_compute_error_action(&mut self, action: Arc<dyn GraphAction>) -> bool {
        self.actions.add(ActionKind::ComputeActiveError, action)
    }

    pub fn remove_compute_error_action(&mut self, action: &Arc<dyn GraphAction>) -> bool {
        self.actions.remove(ActionKind::ComputeActiveError, action)
    }

    pub fn add_pre_iteration_action(&mut self, action: Arc<dyn GraphAction>) -> bool {
        self.actions.add(ActionKind::PreIteration, action)
    }

    pub fn remove_pre_iteration_action(&mut self, action: &Arc<dyn GraphAction>) -> bool {
        self.actions.remove(ActionKind::PreIteration, action)
    }

    pub fn add_post_iteration_action(&mut self, action: Arc<dyn GraphAction>) -> bool {
        self.actions.add(ActionKind::PostIteration, action)
    }

    pub fn remove_post_iteration_action(&mut self, action: &Arc<dyn GraphAction>) -> bool {
        self.actions.remove(ActionKind::PostIteration, action)
    }

    fn run_actions(&mut self, kind: ActionKind, iteration: i32) {
        if self.actions.is_empty(kind) {
            return;
        }
        let registry = std::mem::take(&mut self.actions);
        registry.run(kind, self, iteration);
        self.actions = registry;
    }

    // ---------------------------------------------------------------- active set

    /// Build the active set from every vertex in the graph at the given
    /// level (`level < 0` matches all levels).
    pub fn initialize_optimization(&mut self, level: i32) -> bool {
        let vset: HashSet<VertexId> = self.graph.vertices().keys().copied().collect();
        self.initialize_optimization_for(&vset, level)
    }

    /// Build the active set from a vertex subset: an edge is included iff its
    /// level matches and all its incident vertices lie in `vset`; a vertex is
    /// included iff it has at least one included edge.
    pub fn initialize_optimization_for(&mut self, vset: &HashSet<VertexId>, level: i32) -> bool {
        self.clear_index_mapping();
        self.active_vertices.clear();
        self.active_edges.clear();
        self.active_edge_set.clear();

        let mut edge_set: BTreeSet<EdgeId> = BTreeSet::new();
        let mut vertex_list: Vec<VertexId> = Vec::new();
        for &vid in vset {
            if !self.graph.contains_vertex(vid) {
                tracing::warn!(vertex = vid, "initialization subset references unknown vertex");
                continue;
            }
            let mut level_edges = 0;
            let incident: Vec<EdgeId> = self.graph.edges_of(vid).collect();
            for eid in incident {
                let Some(edge) = self.graph.edge(eid) else {
                    continue;
                };
                if level >= 0 && edge.level() != level {
                    continue;
                }
                if edge.core().vertices().iter().all(|u| vset.contains(u)) {
                    edge_set.insert(eid);
                    level_edges += 1;
                }
            }
            if level_edges > 0 {
                vertex_list.push(vid);
                #[cfg(debug_assertions)]
                self.warn_on_nan_estimate(vid);
            }
        }

        self.active_edges = edge_set.into_iter().collect();
        self.active_edge_set = self.active_edges.iter().copied().collect();
        vertex_list.sort_unstable();
        self.active_vertices = vertex_list;

        if !self.resolve_parameters_and_caches(0) {
            return false;
        }
        self.build_index_mapping()
    }

    /// Build the active set from an edge subset: all edges in `eset` plus
    /// every vertex they reference.
    pub fn initialize_optimization_from_edges(&mut self, eset: &HashSet<EdgeId>) -> bool {
        self.clear_index_mapping();
        self.active_vertices.clear();
        self.active_edges.clear();
        self.active_edge_set.clear();

        let mut edge_set: BTreeSet<EdgeId> = BTreeSet::new();
        let mut vertex_set: BTreeSet<VertexId> = BTreeSet::new();
        for &eid in eset {
            let Some(edge) = self.graph.edge(eid) else {
                tracing::warn!(edge = eid, "initialization subset references unknown edge");
                continue;
            };
            edge_set.insert(eid);
            for &vid in edge.core().vertices() {
                vertex_set.insert(vid);
            }
        }

        self.active_edges = edge_set.into_iter().collect();
        self.active_edge_set = self.active_edges.iter().copied().collect();
        self.active_vertices = vertex_set.into_iter().collect();

        if !self.resolve_parameters_and_caches(0) {
            return false;
        }
        self.build_index_mapping()
    }

    #[cfg(debug_assertions)]
    fn warn_on_nan_estimate(&self, vid: VertexId) {
        let Some(vertex) = self.graph.vertex(vid) else {
            return;
        };
        let dim = vertex.estimate_dimension();
        if dim == 0 {
            return;
        }
        let mut estimate = vec![0.0; dim];
        if vertex.get_estimate_data(&mut estimate) {
            for (k, value) in estimate.iter().enumerate() {
                if value.is_nan() {
                    tracing::warn!(vertex = vid, index = k, "vertex estimate contains a nan entry");
                }
            }
        }
    }

    /// Validate parameter references and install edge caches for the active
    /// edges starting at `first`.
    fn resolve_parameters_and_caches(&mut self, first: usize) -> bool {
        for idx in first..self.active_edges.len() {
            let eid = self.active_edges[idx];
            let Some(edge) = self.graph.edge(eid) else {
                continue;
            };
            if edge.core().parameter_ids().len() != edge.num_parameters() {
                tracing::error!(
                    edge = eid,
                    expected = edge.num_parameters(),
                    got = edge.core().parameter_ids().len(),
                    "edge has an incomplete parameter assignment"
                );
                return false;
            }
            for &pid in edge.core().parameter_ids() {
                if !self.graph.parameters().contains(pid) {
                    tracing::error!(edge = eid, parameter = pid, "edge references unknown parameter");
                    return false;
                }
            }
            let (vertices, edges, parameters) = self.graph.vertices_split_mut();
            let Some(edge) = edges.get(&eid) else {
                continue;
            };
            if let Err(error) = edge.install_caches(vertices, parameters) {
                tracing::error!(edge = eid, %error, "cache installation failed");
                return false;
            }
        }
        true
    }

    /// Two-pass index assignment over the active vertices: pass 0 takes the
    /// non-fixed, non-marginalized vertices in container order, pass 1
    /// appends the non-fixed, marginalized ones. Fixed vertices get `-1`.
    /// Fails iff the active vertex container is empty.
    pub fn build_index_mapping(&mut self) -> bool {
        if self.active_vertices.is_empty() {
            self.iv_map.clear();
            self.layout = SystemLayout::default();
            return false;
        }
        self.iv_map.clear();
        let mut dimensions = Vec::new();
        let mut marginalized_start = 0;
        for pass in 0..2 {
            for idx in 0..self.active_vertices.len() {
                let vid = self.active_vertices[idx];
                let Some(vertex) = self.graph.vertex_mut(vid) else {
                    continue;
                };
                if vertex.fixed() {
                    if pass == 0 {
                        vertex.set_temp_index(-1);
                    }
                    continue;
                }
                if vertex.marginalized() == (pass == 1) {
                    vertex.set_temp_index(self.iv_map.len() as i32);
                    dimensions.push(vertex.dimension());
                    self.iv_map.push(vid);
                }
            }
            if pass == 0 {
                marginalized_start = self.iv_map.len();
            }
        }
        self.layout = SystemLayout::new(dimensions, marginalized_start);
        true
    }

    /// Reset the `temp_index` of every mapped vertex and drop the mapping.
    pub fn clear_index_mapping(&mut self) {
        for idx in 0..self.iv_map.len() {
            let vid = self.iv_map[idx];
            if let Some(vertex) = self.graph.vertex_mut(vid) {
                vertex.set_temp_index(-1);
            }
        }
        self.iv_map.clear();
        self.layout = SystemLayout::default();
    }

    /// Append new vertices and edges to the active set without reordering
    /// existing indices, then notify the linear solver of the structural
    /// delta. Only non-fixed, non-marginalized vertices receive new indices.
    ///
    /// # Panics
    /// Incremental addition of a marginalized vertex is unsupported and a
    /// programmer error.
    pub fn update_initialization(&mut self, vset: &HashSet<VertexId>, eset: &HashSet<EdgeId>) -> bool {
        if self.layout.marginalized_start() != self.layout.num_blocks() {
            tracing::error!(
                "incremental updates on a system with marginalized vertices are not supported"
            );
            return false;
        }

        let mut new_vertices: Vec<VertexId> = vset.iter().copied().collect();
        new_vertices.sort_unstable();
        let mut dimensions: Vec<usize> = (0..self.layout.num_blocks())
            .map(|block| self.layout.dimension(block))
            .collect();
        for &vid in &new_vertices {
            let Some(vertex) = self.graph.vertex_mut(vid) else {
                tracing::error!(vertex = vid, "incremental update references unknown vertex");
                return false;
            };
            if vertex.fixed() {
                vertex.set_temp_index(-1);
                continue;
            }
            if vertex.marginalized() {
                panic!("incremental addition of marginalized vertex {vid} is not supported");
            }
            vertex.set_temp_index(self.iv_map.len() as i32);
            dimensions.push(vertex.dimension());
            self.iv_map.push(vid);
            self.active_vertices.push(vid);
        }
        let marginalized_start = dimensions.len();
        self.layout = SystemLayout::new(dimensions, marginalized_start);

        let mut new_edges: Vec<EdgeId> = eset.iter().copied().collect();
        new_edges.sort_unstable();
        let first_new_edge = self.active_edges.len();
        for &eid in &new_edges {
            if !self.graph.contains_edge(eid) {
                tracing::error!(edge = eid, "incremental update references unknown edge");
                return false;
            }
            self.active_edges.push(eid);
            self.active_edge_set.insert(eid);
        }
        if !self.resolve_parameters_and_caches(first_new_edge) {
            return false;
        }

        let Some(mut algorithm) = self.algorithm.take() else {
            tracing::error!("update_initialization requires an optimization algorithm");
            return false;
        };
        let ok = algorithm.update_structure(self, &new_vertices, &new_edges);
        self.algorithm = Some(algorithm);
        ok
    }

    // ---------------------------------------------------------------- evaluation

    /// Refresh dependent caches and recompute every active edge's error,
    /// applying the robust reweighting where a kernel is attached.
    pub fn compute_active_errors(&mut self) {
        self.run_actions(ActionKind::ComputeActiveError, -1);
        self.refresh_active_caches();

        let active_set = &self.active_edge_set;
        let active_list = &self.active_edges;
        let (edges, vertices, parameters) = self.graph.edges_split_mut();
        if active_list.len() > PARALLEL_EDGE_THRESHOLD {
            edges.par_iter_mut().for_each(|(eid, edge)| {
                if active_set.contains(eid) {
                    edge.compute_error(vertices, parameters);
                    edge.robustify_error();
                }
            });
        } else {
            for eid in active_list {
                if let Some(edge) = edges.get_mut(eid) {
                    edge.compute_error(vertices, parameters);
                    edge.robustify_error();
                }
            }
        }
    }

    /// Sum of the (robustified) information-weighted squared errors over the
    /// active edges.
    pub fn active_chi2(&self) -> f64 {
        self.active_edges
            .iter()
            .filter_map(|eid| self.graph.edge(*eid))
            .map(|edge| edge.robust_chi2())
            .sum()
    }

    /// Compute the Jacobian blocks of every active edge w.r.t. the local
    /// parameterization of its incident vertices.
    pub fn linearize_system(&mut self) {
        let active_set = &self.active_edge_set;
        let active_list = &self.active_edges;
        let (edges, vertices, parameters) = self.graph.edges_split_mut();
        if active_list.len() > PARALLEL_EDGE_THRESHOLD {
            edges.par_iter_mut().for_each(|(eid, edge)| {
                if active_set.contains(eid) {
                    edge.linearize(vertices, parameters);
                }
            });
        } else {
            for eid in active_list {
                if let Some(edge) = edges.get_mut(eid) {
                    edge.linearize(vertices, parameters);
                }
            }
        }
    }

    fn refresh_active_caches(&mut self) {
        for idx in 0..self.active_edges.len() {
            let eid = self.active_edges[idx];
            let Some(edge) = self.graph.edge(eid) else {
                continue;
            };
            let incident: Vec<VertexId> = edge.core().vertices().to_vec();
            for vid in incident {
                let (vertices, _edges, parameters) = self.graph.vertices_split_mut();
                let Some(vertex) = vertices.get_mut(&vid) else {
                    continue;
                };
                if vertex.core().caches().is_empty() {
                    continue;
                }
                let version = vertex.core().version();
                let mut caches = std::mem::take(&mut vertex.core_mut().caches);
                let result = caches.refresh(&**vertex, parameters, version);
                vertex.core_mut().caches = caches;
                if let Err(error) = result {
                    tracing::error!(vertex = vid, %error, "cache refresh failed");
                }
            }
        }
    }

    /// Apply a concatenated increment vector to the mapped vertices in index
    /// order through their manifold retraction.
    ///
    /// # Panics
    /// The increment length must match the total dimension of the index map.
    pub fn update(&mut self, delta: &[f64]) {
        let mut offset = 0;
        for idx in 0..self.iv_map.len() {
            let vid = self.iv_map[idx];
            let Some(vertex) = self.graph.vertex_mut(vid) else {
                panic!("index map references unknown vertex {vid}");
            };
            let dim = vertex.dimension();
            if offset + dim > delta.len() {
                panic!(
                    "increment vector of length {} is too short for the index map",
                    delta.len()
                );
            }
            let segment = &delta[offset..offset + dim];
            #[cfg(debug_assertions)]
            if segment.iter().any(|v| !v.is_finite()) {
                tracing::warn!(vertex = vid, "update contains a non-finite entry");
            }
            vertex.oplus(segment);
            offset += dim;
        }
        if offset != delta.len() {
            panic!(
                "increment vector length {} does not match index map dimension {}",
                delta.len(),
                offset
            );
        }
    }

    // ---------------------------------------------------------------- initial guess

    /// Spanning-tree initial guess propagated from the fixed vertices and
    /// from vertices fully constrained by a unary prior. Vertices outside the
    /// index map are saved and restored around the propagation.
    pub fn compute_initial_guess(&mut self) {
        let mut roots: HashSet<VertexId> = HashSet::new();
        let mut backup: HashSet<VertexId> = HashSet::new();
        let empty: HashSet<VertexId> = HashSet::new();

        for idx in 0..self.active_edges.len() {
            let eid = self.active_edges[idx];
            let Some(edge) = self.graph.edge(eid) else {
                continue;
            };
            let incident: Vec<VertexId> = edge.core().vertices().to_vec();
            for vid in incident {
                let Some(vertex) = self.graph.vertex(vid) else {
                    continue;
                };
                if vertex.fixed() {
                    roots.insert(vid);
                } else {
                    // a unary prior able to set the vertex from nothing makes
                    // it a propagation root as well
                    let priors: Vec<EdgeId> = self.graph.edges_of(vid).collect();
                    for pid in priors {
                        let Some(prior) = self.graph.edge(pid) else {
                            continue;
                        };
                        if prior.num_vertices() == 1
                            && prior.initial_estimate_possible(&empty, vid).is_finite()
                        {
                            let (vertices, edges, _parameters) = self.graph.vertices_split_mut();
                            if let Some(prior) = edges.get(&pid) {
                                prior.initial_estimate(&empty, vid, vertices);
                            }
                            roots.insert(vid);
                        }
                    }
                }
                let Some(vertex) = self.graph.vertex(vid) else {
                    continue;
                };
                if vertex.temp_index() == -1 && !backup.contains(&vid) {
                    backup.insert(vid);
                    if let Some(vertex) = self.graph.vertex_mut(vid) {
                        vertex.push();
                    }
                }
            }
        }

        EstimatePropagator::propagate(self, &roots, &EdgeInitialCost, f64::INFINITY);

        for vid in backup {
            if let Some(vertex) = self.graph.vertex_mut(vid) {
                vertex.pop();
            }
        }

        if self.verbose {
            self.compute_active_errors();
            eprintln!(
                "iteration= -1\t chi2= {}\t time= 0.0\t cumTime= 0.0\t (using initial guess from spanning tree)",
                self.active_chi2()
            );
        }
    }

    // ---------------------------------------------------------------- loop

    /// Run up to `iterations` steps of the configured algorithm. Returns the
    /// number of iterations actually run, `-1` if initialization failed, `0`
    /// if the algorithm reported a failure.
    pub fn optimize(&mut self, iterations: usize, online: bool) -> i32 {
        if self.iv_map.is_empty() {
            tracing::error!("optimize called without a valid initialization (empty index map)");
            return -1;
        }
        let Some(mut algorithm) = self.algorithm.take() else {
            tracing::error!("optimize called without an optimization algorithm");
            return -1;
        };
        let result = self.run_iterations(algorithm.as_mut(), iterations, online);
        self.algorithm = Some(algorithm);
        result
    }

    fn run_iterations(
        &mut self,
        algorithm: &mut dyn OptimizationAlgorithm,
        iterations: usize,
        online: bool,
    ) -> i32 {
        if !algorithm.init(self, online) {
            tracing::error!(algorithm = algorithm.name(), "error while initializing");
            return -1;
        }
        if self.compute_batch_statistics {
            self.batch_statistics = vec![BatchStatistics::default(); iterations];
        }

        let mut completed = 0;
        let mut cumulative_time = 0.0;
        for i in 0..iterations {
            if self.terminate() {
                break;
            }
            let iteration = i as i32;
            self.run_actions(ActionKind::PreIteration, iteration);

            let start = Instant::now();
            let outcome = algorithm.solve(self, iteration, online);
            let elapsed = start.elapsed().as_secs_f64();

            let mut error_computed = false;
            if self.compute_batch_statistics {
                self.compute_active_errors();
                error_computed = true;
                let chi2 = self.active_chi2();
                let num_edges = self.active_edges.len();
                let num_vertices = self.active_vertices.len();
                if let Some(stats) = self.batch_statistics.get_mut(i) {
                    stats.iteration = iteration;
                    stats.num_edges = num_edges;
                    stats.num_vertices = num_vertices;
                    stats.chi2 = chi2;
                    stats.time_iteration = elapsed;
                }
            }
            if self.verbose {
                cumulative_time += elapsed;
                if !error_computed {
                    self.compute_active_errors();
                }
                eprintln!(
                    "iteration= {}\t chi2= {}\t time= {}\t cumTime= {}\t edges= {}{}",
                    iteration,
                    self.active_chi2(),
                    elapsed,
                    cumulative_time,
                    self.active_edges.len(),
                    algorithm.verbose_suffix()
                );
            }

            self.run_actions(ActionKind::PostIteration, iteration);

            match outcome {
                SolveOutcome::Ok => completed += 1,
                SolveOutcome::Terminate => return completed,
                SolveOutcome::Fail => {
                    tracing::warn!(
                        algorithm = algorithm.name(),
                        iteration,
                        "algorithm reported a failure"
                    );
                    return 0;
                }
            }
        }
        completed
    }

    /// Selected blocks of the inverse Hessian for the requested
    /// `(block_row, block_col)` pairs in index-map space.
    pub fn compute_marginals(
        &mut self,
        block_indices: &[(usize, usize)],
    ) -> Option<Vec<DMatrix<f64>>> {
        let mut algorithm = self.algorithm.take()?;
        let result = algorithm.compute_marginals(self, block_indices);
        self.algorithm = Some(algorithm);
        result
    }

    // ---------------------------------------------------------------- gauge

    /// Candidate vertex to fix for gauge removal: the first vertex in
    /// insertion order whose dimension equals the maximum vertex dimension.
    pub fn find_gauge(&self) -> Option<VertexId> {
        let max_dim = self
            .graph
            .vertex_insertion_order()
            .iter()
            .filter_map(|vid| self.graph.vertex(*vid))
            .map(|v| v.dimension())
            .max()?;
        self.graph
            .vertex_insertion_order()
            .iter()
            .copied()
            .find(|&vid| {
                self.graph
                    .vertex(vid)
                    .is_some_and(|v| v.dimension() == max_dim)
            })
    }

    /// True iff the graph has no fixed vertex of maximum dimension and no
    /// full-dimension unary prior on any maximum-dimension vertex.
    pub fn gauge_freedom(&self) -> bool {
        let Some(max_dim) = self
            .graph
            .vertex_insertion_order()
            .iter()
            .filter_map(|vid| self.graph.vertex(*vid))
            .map(|v| v.dimension())
            .max()
        else {
            return false;
        };

        for &vid in self.graph.vertex_insertion_order() {
            let Some(vertex) = self.graph.vertex(vid) else {
                continue;
            };
            if vertex.dimension() != max_dim {
                continue;
            }
            if vertex.fixed() {
                return false;
            }
            for eid in self.graph.edges_of(vid) {
                if let Some(edge) = self.graph.edge(eid)
                    && edge.num_vertices() == 1
                    && edge.dimension() == max_dim
                {
                    return false;
                }
            }
        }
        true
    }

    // ---------------------------------------------------------------- stack

    /// Save the current estimate of every active vertex.
    pub fn push(&mut self) {
        for idx in 0..self.active_vertices.len() {
            let vid = self.active_vertices[idx];
            if let Some(vertex) = self.graph.vertex_mut(vid) {
                vertex.push();
            }
        }
    }

    /// Restore every active vertex from its saved estimate.
    pub fn pop(&mut self) {
        for idx in 0..self.active_vertices.len() {
            let vid = self.active_vertices[idx];
            if let Some(vertex) = self.graph.vertex_mut(vid) {
                vertex.pop();
            }
        }
    }

    /// Drop the saved estimate of every active vertex without restoring.
    pub fn discard_top(&mut self) {
        for idx in 0..self.active_vertices.len() {
            let vid = self.active_vertices[idx];
            if let Some(vertex) = self.graph.vertex_mut(vid) {
                vertex.discard_top();
            }
        }
    }

    /// Drop the active set, the index mapping and the graph content.
    pub fn clear(&mut self) {
        self.clear_index_mapping();
        self.active_vertices.clear();
        self.active_edges.clear();
        self.active_edge_set.clear();
        self.graph.clear();
    }
}
