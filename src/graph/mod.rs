//! Hyper-graph data model
//!
//! A typed container of vertices and edges with unique integer ids. An edge
//! may be incident to any number (≥ 1) of vertices; vertex→edge back
//! references are kept in a graph-owned adjacency map and resolved through
//! ids, so neither entity owns the other. The graph also owns the shared
//! read-only [`parameter::Parameter`]s referenced by edges.
//!
//! Structural operations mirror the original container semantics: they return
//! `bool`, report duplicates and dangling references synchronously, and
//! removing a vertex removes all its incident edges.

use std::collections::{BTreeSet, HashMap};
use std::str::SplitWhitespace;

use thiserror::Error;

pub mod cache;
pub mod edge;
pub mod parameter;
pub mod vertex;

pub use cache::{Cache, CacheContainer, CacheKey};
pub use edge::{Edge, EdgeCore};
pub use parameter::{Parameter, ParameterContainer};
pub use vertex::{BaseVertex, Vertex, VertexCore};

/// Unique identifier of a vertex within a graph.
pub type VertexId = i32;

/// Unique identifier of an edge within a graph.
pub type EdgeId = i32;

/// Unique identifier of a shared parameter within a graph.
pub type ParameterId = i32;

/// Id-keyed vertex storage.
pub type VertexContainer = HashMap<VertexId, Box<dyn Vertex>>;

/// Id-keyed edge storage.
pub type EdgeContainer = HashMap<EdgeId, Box<dyn Edge>>;

/// Structural and wire-format errors reported by the graph.
#[derive(Debug, Clone, Error)]
pub enum GraphError {
    #[error("duplicate vertex id {0}")]
    DuplicateVertex(VertexId),

    #[error("duplicate edge id {0}")]
    DuplicateEdge(EdgeId),

    #[error("edge {edge} references unknown vertex {vertex}")]
    UnknownVertex { edge: EdgeId, vertex: VertexId },

    #[error("unknown parameter id {0}")]
    UnknownParameter(ParameterId),

    #[error("wire format error: {0}")]
    Wire(String),
}

/// Scanner over a whitespace-delimited wire payload.
pub struct TokenScanner<'a> {
    tokens: SplitWhitespace<'a>,
}

impl<'a> TokenScanner<'a> {
    pub fn new(payload: &'a str) -> Self {
        TokenScanner {
            tokens: payload.split_whitespace(),
        }
    }

    pub fn next_f64(&mut self) -> Result<f64, GraphError> {
        let token = self
            .tokens
            .next()
            .ok_or_else(|| GraphError::Wire("unexpected end of payload".to_string()))?;
        token
            .parse::<f64>()
            .map_err(|e| GraphError::Wire(format!("invalid float '{token}': {e}")))
    }

    pub fn next_i32(&mut self) -> Result<i32, GraphError> {
        let token = self
            .tokens
            .next()
            .ok_or_else(|| GraphError::Wire("unexpected end of payload".to_string()))?;
        token
            .parse::<i32>()
            .map_err(|e| GraphError::Wire(format!("invalid integer '{token}': {e}")))
    }

    /// True if no tokens remain.
    pub fn exhausted(&mut self) -> bool {
        self.tokens.clone().next().is_none()
    }
}

/// Typed read access to a vertex.
///
/// # Panics
/// A missing vertex or a concrete-type mismatch is a fatal contract
/// violation: edges are validated against the graph when added.
pub fn vertex_downcast<'a, T: Vertex + 'static>(
    vertices: &'a VertexContainer,
    id: VertexId,
) -> &'a T {
    match vertices.get(&id) {
        Some(v) => match v.as_any().downcast_ref::<T>() {
            Some(typed) => typed,
            None => panic!("vertex {id} has an unexpected concrete type"),
        },
        None => panic!("vertex {id} is not present in the graph"),
    }
}

/// Typed mutable access to a vertex; same contract as [`vertex_downcast`].
pub fn vertex_downcast_mut<'a, T: Vertex + 'static>(
    vertices: &'a mut VertexContainer,
    id: VertexId,
) -> &'a mut T {
    match vertices.get_mut(&id) {
        Some(v) => match v.as_any_mut().downcast_mut::<T>() {
            Some(typed) => typed,
            None => panic!("vertex {id} has an unexpected concrete type"),
        },
        None => panic!("vertex {id} is not present in the graph"),
    }
}

/// Typed container of vertices and edges with unique ids.
#[derive(Default)]
pub struct HyperGraph {
    vertices: VertexContainer,
    edges: EdgeContainer,
    vertex_edges: HashMap<VertexId, BTreeSet<EdgeId>>,
    insertion_order: Vec<VertexId>,
    parameters: ParameterContainer,
}

impl HyperGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vertex; returns false if its id is already taken.
    pub fn add_vertex(&mut self, vertex: Box<dyn Vertex>) -> bool {
        let id = vertex.id();
        if self.vertices.contains_key(&id) {
            tracing::warn!(id, "vertex with duplicate id rejected");
            return false;
        }
        self.insertion_order.push(id);
        self.vertex_edges.insert(id, BTreeSet::new());
        self.vertices.insert(id, vertex);
        true
    }

    /// Add an edge; returns false if its id is taken, a vertex slot is
    /// unbound, or an incident vertex is not in the graph.
    pub fn add_edge(&mut self, edge: Box<dyn Edge>) -> bool {
        let id = edge.id();
        if self.edges.contains_key(&id) {
            tracing::warn!(id, "edge with duplicate id rejected");
            return false;
        }
        for &vid in edge.core().vertices() {
            if vid < 0 || !self.vertices.contains_key(&vid) {
                tracing::warn!(id, vertex = vid, "edge references unknown vertex");
                return false;
            }
        }
        for &vid in edge.core().vertices() {
            self.vertex_edges.entry(vid).or_default().insert(id);
        }
        self.edges.insert(id, edge);
        true
    }

    /// Remove a vertex and all its incident edges; returns false if unknown.
    pub fn remove_vertex(&mut self, id: VertexId) -> bool {
        if !self.vertices.contains_key(&id) {
            return false;
        }
        let incident: Vec<EdgeId> = self
            .vertex_edges
            .get(&id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        for eid in incident {
            self.remove_edge(eid);
        }
        self.vertex_edges.remove(&id);
        self.insertion_order.retain(|&v| v != id);
        self.vertices.remove(&id);
        true
    }

    /// Remove an edge; returns false if unknown.
    pub fn remove_edge(&mut self, id: EdgeId) -> bool {
        let Some(edge) = self.edges.remove(&id) else {
            return false;
        };
        for vid in edge.core().vertices() {
            if let Some(set) = self.vertex_edges.get_mut(vid) {
                set.remove(&id);
            }
        }
        true
    }

    pub fn vertex(&self, id: VertexId) -> Option<&dyn Vertex> {
        self.vertices.get(&id).map(|v| v.as_ref())
    }

    pub fn vertex_mut(&mut self, id: VertexId) -> Option<&mut (dyn Vertex + 'static)> {
        self.vertices.get_mut(&id).map(|v| v.as_mut())
    }

    pub fn edge(&self, id: EdgeId) -> Option<&dyn Edge> {
        self.edges.get(&id).map(|e| e.as_ref())
    }

    pub fn edge_mut(&mut self, id: EdgeId) -> Option<&mut (dyn Edge + 'static)> {
        self.edges.get_mut(&id).map(|e| e.as_mut())
    }

    /// Ids of the edges incident to a vertex.
    pub fn edges_of(&self, id: VertexId) -> impl Iterator<Item = EdgeId> + '_ {
        self.vertex_edges
            .get(&id)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    pub fn contains_vertex(&self, id: VertexId) -> bool {
        self.vertices.contains_key(&id)
    }

    pub fn contains_edge(&self, id: EdgeId) -> bool {
        self.edges.contains_key(&id)
    }

    pub fn vertices(&self) -> &VertexContainer {
        &self.vertices
    }

    pub fn edges(&self) -> &EdgeContainer {
        &self.edges
    }

    /// Vertex ids in the order they were inserted.
    pub fn vertex_insertion_order(&self) -> &[VertexId] {
        &self.insertion_order
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn parameters(&self) -> &ParameterContainer {
        &self.parameters
    }

    /// Insert a shared parameter; returns false if the id is taken.
    pub fn add_parameter(&mut self, parameter: Box<dyn Parameter>) -> bool {
        self.parameters.add_parameter(parameter)
    }

    /// Remove everything from the graph.
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.edges.clear();
        self.vertex_edges.clear();
        self.insertion_order.clear();
        self.parameters = ParameterContainer::default();
    }

    /// Split borrow for the edge evaluation passes: mutable edges, shared
    /// vertices and parameters.
    pub(crate) fn edges_split_mut(
        &mut self,
    ) -> (&mut EdgeContainer, &VertexContainer, &ParameterContainer) {
        (&mut self.edges, &self.vertices, &self.parameters)
    }

    /// Split borrow for cache refresh and initial-estimate propagation:
    /// mutable vertices, shared edges and parameters.
    pub(crate) fn vertices_split_mut(
        &mut self,
    ) -> (&mut VertexContainer, &EdgeContainer, &ParameterContainer) {
        (&mut self.vertices, &self.edges, &self.parameters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::point_xyz::{EdgePointXYZ, VertexPointXYZ};
    use nalgebra::Vector3;

    fn graph_with_two_vertices() -> HyperGraph {
        let mut graph = HyperGraph::new();
        assert!(graph.add_vertex(Box::new(VertexPointXYZ::new(0, Vector3::zeros()))));
        assert!(graph.add_vertex(Box::new(VertexPointXYZ::new(1, Vector3::zeros()))));
        graph
    }

    #[test]
    fn test_duplicate_vertex_rejected() {
        let mut graph = graph_with_two_vertices();
        assert!(!graph.add_vertex(Box::new(VertexPointXYZ::new(0, Vector3::zeros()))));
        assert_eq!(graph.num_vertices(), 2);
    }

    #[test]
    fn test_add_edge_requires_vertices() {
        let mut graph = graph_with_two_vertices();

        let mut edge = EdgePointXYZ::new(0);
        edge.core_mut().set_vertex(0, 0);
        edge.core_mut().set_vertex(1, 5); // unknown vertex
        assert!(!graph.add_edge(Box::new(edge)));

        let mut edge = EdgePointXYZ::new(0);
        edge.core_mut().set_vertex(0, 0);
        edge.core_mut().set_vertex(1, 1);
        assert!(graph.add_edge(Box::new(edge)));
        assert_eq!(graph.num_edges(), 1);
    }

    #[test]
    fn test_duplicate_edge_rejected() {
        let mut graph = graph_with_two_vertices();
        for _ in 0..2 {
            let mut edge = EdgePointXYZ::new(7);
            edge.core_mut().set_vertex(0, 0);
            edge.core_mut().set_vertex(1, 1);
            graph.add_edge(Box::new(edge));
        }
        assert_eq!(graph.num_edges(), 1);
    }

    #[test]
    fn test_remove_vertex_removes_incident_edges() {
        let mut graph = graph_with_two_vertices();
        let mut edge = EdgePointXYZ::new(0);
        edge.core_mut().set_vertex(0, 0);
        edge.core_mut().set_vertex(1, 1);
        graph.add_edge(Box::new(edge));

        assert!(graph.remove_vertex(1));
        assert_eq!(graph.num_edges(), 0);
        assert_eq!(graph.num_vertices(), 1);
        assert_eq!(graph.edges_of(0).count(), 0);
    }

    #[test]
    fn test_remove_unknown_elements() {
        let mut graph = graph_with_two_vertices();
        assert!(!graph.remove_vertex(42));
        assert!(!graph.remove_edge(42));
    }

    #[test]
    fn test_insertion_order_is_preserved() {
        let mut graph = HyperGraph::new();
        for id in [5, 1, 9] {
            graph.add_vertex(Box::new(VertexPointXYZ::new(id, Vector3::zeros())));
        }
        assert_eq!(graph.vertex_insertion_order(), &[5, 1, 9]);
        graph.remove_vertex(1);
        assert_eq!(graph.vertex_insertion_order(), &[5, 9]);
    }

    #[test]
    fn test_token_scanner() {
        let mut scanner = TokenScanner::new("1 2.5  -3");
        assert_eq!(scanner.next_i32().unwrap(), 1);
        assert!((scanner.next_f64().unwrap() - 2.5).abs() < 1e-12);
        assert_eq!(scanner.next_i32().unwrap(), -3);
        assert!(scanner.exhausted());
        assert!(scanner.next_f64().is_err());
    }
}
