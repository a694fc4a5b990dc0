//! Best-first spanning-tree initial-guess propagation
//!
//! Starting from a set of root vertices (fixed vertices and vertices fully
//! constrained by a prior), estimates spread outward through the active edge
//! set: each uninitialized vertex is reached through the cheapest edge path
//! discovered before it is popped from the frontier, and that edge sets its
//! estimate. Unreachable vertices keep their prior estimate.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::graph::{Edge, EdgeId, VertexId};
use crate::optimizer::SparseOptimizer;

/// Cost of initializing `to` through `edge` from the already-initialized
/// vertices in `from`; infinity means the edge cannot initialize `to`.
pub trait PropagateCost {
    fn cost(&self, edge: &dyn Edge, from: &HashSet<VertexId>, to: VertexId) -> f64;
}

/// Default cost function: delegates to the edge's own
/// `initial_estimate_possible` hook.
pub struct EdgeInitialCost;

impl PropagateCost for EdgeInitialCost {
    fn cost(&self, edge: &dyn Edge, from: &HashSet<VertexId>, to: VertexId) -> f64 {
        edge.initial_estimate_possible(from, to)
    }
}

struct FrontierEntry {
    cost: f64,
    vertex: VertexId,
}

impl PartialEq for FrontierEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost && self.vertex == other.vertex
    }
}

impl Eq for FrontierEntry {}

impl PartialOrd for FrontierEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FrontierEntry {
    // BinaryHeap is a max-heap; order reversed so the cheapest entry pops
    // first, ties broken by vertex id for determinism.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.vertex.cmp(&self.vertex))
    }
}

/// Best-first spanning-tree propagation over the optimizer's active edges.
pub struct EstimatePropagator;

impl EstimatePropagator {
    /// Propagate estimates outward from `roots` using the given cost
    /// function. `max_distance` bounds the accumulated path cost.
    pub fn propagate(
        optimizer: &mut SparseOptimizer,
        roots: &HashSet<VertexId>,
        cost_function: &dyn PropagateCost,
        max_distance: f64,
    ) {
        let mut best_cost: HashMap<VertexId, f64> = HashMap::new();
        let mut parent_edge: HashMap<VertexId, EdgeId> = HashMap::new();
        let mut initialized: HashSet<VertexId> = HashSet::new();
        let mut frontier = BinaryHeap::new();

        for &root in roots {
            best_cost.insert(root, 0.0);
            frontier.push(FrontierEntry {
                cost: 0.0,
                vertex: root,
            });
        }

        while let Some(entry) = frontier.pop() {
            let vertex = entry.vertex;
            if initialized.contains(&vertex) {
                continue;
            }
            match best_cost.get(&vertex) {
                Some(&best) if entry.cost > best => continue, // stale entry
                _ => {}
            }

            // set the estimate through the winning parent edge (roots have none)
            if let Some(&eid) = parent_edge.get(&vertex) {
                let (vertices, edges, _parameters) = optimizer.graph.vertices_split_mut();
                if let Some(edge) = edges.get(&eid) {
                    let from: HashSet<VertexId> = edge
                        .core()
                        .vertices()
                        .iter()
                        .copied()
                        .filter(|u| initialized.contains(u))
                        .collect();
                    edge.initial_estimate(&from, vertex, vertices);
                }
            }
            initialized.insert(vertex);

            // relax the neighbors reachable through the active edges
            let incident: Vec<EdgeId> = optimizer
                .graph
                .edges_of(vertex)
                .filter(|eid| optimizer.active_edge_set.contains(eid))
                .collect();
            for eid in incident {
                let Some(edge) = optimizer.graph.edge(eid) else {
                    continue;
                };
                let from: HashSet<VertexId> = edge
                    .core()
                    .vertices()
                    .iter()
                    .copied()
                    .filter(|u| initialized.contains(u))
                    .collect();
                for &neighbor in edge.core().vertices() {
                    if initialized.contains(&neighbor) {
                        continue;
                    }
                    let step = cost_function.cost(edge, &from, neighbor);
                    if !step.is_finite() {
                        continue;
                    }
                    let total = entry.cost + step;
                    if total > max_distance {
                        continue;
                    }
                    let improved = best_cost.get(&neighbor).is_none_or(|&b| total < b);
                    if improved {
                        best_cost.insert(neighbor, total);
                        parent_edge.insert(neighbor, eid);
                        frontier.push(FrontierEntry {
                            cost: total,
                            vertex: neighbor,
                        });
                    }
                }
            }
        }
    }
}
