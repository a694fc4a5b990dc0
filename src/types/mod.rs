//! Concrete vertex, edge and parameter types
//!
//! The optimizer core only consumes the capability traits; the variants here
//! are the built-in planar SLAM and 3D point types, registered in a type-tag
//! [`Factory`] so I/O collaborators can construct graph elements from their
//! wire tags.

pub mod point_xyz;
pub mod slam2d;

use std::collections::HashMap;

use crate::graph::{Edge, EdgeId, Parameter, ParameterId, Vertex, VertexId};
use crate::manifold::SE2;
use nalgebra::{Vector2, Vector3};

pub use point_xyz::{EdgePointXYZ, VertexPointXYZ};
pub use slam2d::{
    CacheSE2Offset, EdgeSE2, EdgeSE2PointXY, EdgeSE2PointXYOffset, EdgeSE2Prior,
    ParameterSE2Offset, VertexPointXY, VertexSE2,
};

type VertexCtor = fn(VertexId) -> Box<dyn Vertex>;
type EdgeCtor = fn(EdgeId) -> Box<dyn Edge>;
type ParameterCtor = fn(ParameterId) -> Box<dyn Parameter>;

/// Type-tag table mapping wire tags to element constructors.
pub struct Factory {
    vertices: HashMap<&'static str, VertexCtor>,
    edges: HashMap<&'static str, EdgeCtor>,
    parameters: HashMap<&'static str, ParameterCtor>,
}

impl Default for Factory {
    fn default() -> Self {
        Self::with_default_types()
    }
}

impl Factory {
    pub fn empty() -> Self {
        Factory {
            vertices: HashMap::new(),
            edges: HashMap::new(),
            parameters: HashMap::new(),
        }
    }

    /// A factory pre-populated with the built-in types.
    pub fn with_default_types() -> Self {
        let mut factory = Self::empty();
        factory.register_vertex("VERTEX_SE2", |id| {
            Box::new(VertexSE2::new(id, SE2::identity()))
        });
        factory.register_vertex("VERTEX_XY", |id| {
            Box::new(VertexPointXY::new(id, Vector2::zeros()))
        });
        factory.register_vertex("VERTEX_TRACKXYZ", |id| {
            Box::new(VertexPointXYZ::new(id, Vector3::zeros()))
        });
        factory.register_edge("EDGE_SE2", |id| Box::new(EdgeSE2::new(id)));
        factory.register_edge("EDGE_PRIOR_SE2", |id| Box::new(EdgeSE2Prior::new(id)));
        factory.register_edge("EDGE_SE2_XY", |id| Box::new(EdgeSE2PointXY::new(id)));
        factory.register_edge("EDGE_SE2_XY_CALIB", |id| {
            Box::new(EdgeSE2PointXYOffset::new(id, -1))
        });
        factory.register_edge("EDGE_POINT_XYZ", |id| Box::new(EdgePointXYZ::new(id)));
        factory.register_parameter("PARAMS_SE2OFFSET", |id| {
            Box::new(ParameterSE2Offset::new(id, SE2::identity()))
        });
        factory
    }

    pub fn register_vertex(&mut self, tag: &'static str, ctor: VertexCtor) {
        self.vertices.insert(tag, ctor);
    }

    pub fn register_edge(&mut self, tag: &'static str, ctor: EdgeCtor) {
        self.edges.insert(tag, ctor);
    }

    pub fn register_parameter(&mut self, tag: &'static str, ctor: ParameterCtor) {
        self.parameters.insert(tag, ctor);
    }

    pub fn create_vertex(&self, tag: &str, id: VertexId) -> Option<Box<dyn Vertex>> {
        self.vertices.get(tag).map(|ctor| ctor(id))
    }

    pub fn create_edge(&self, tag: &str, id: EdgeId) -> Option<Box<dyn Edge>> {
        self.edges.get(tag).map(|ctor| ctor(id))
    }

    pub fn create_parameter(&self, tag: &str, id: ParameterId) -> Option<Box<dyn Parameter>> {
        self.parameters.get(tag).map(|ctor| ctor(id))
    }

    pub fn knows_tag(&self, tag: &str) -> bool {
        self.vertices.contains_key(tag)
            || self.edges.contains_key(tag)
            || self.parameters.contains_key(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_creates_registered_types() {
        let factory = Factory::with_default_types();
        let vertex = factory.create_vertex("VERTEX_SE2", 4).unwrap();
        assert_eq!(vertex.id(), 4);
        assert_eq!(vertex.dimension(), 3);

        let edge = factory.create_edge("EDGE_SE2_XY", 2).unwrap();
        assert_eq!(edge.id(), 2);
        assert_eq!(edge.dimension(), 2);

        assert!(factory.create_edge("EDGE_UNKNOWN", 0).is_none());
        assert!(factory.knows_tag("PARAMS_SE2OFFSET"));
    }
}
