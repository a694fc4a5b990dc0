//! 3D point vertex and point-difference edge

use std::any::Any;
use std::collections::HashSet;

use nalgebra::Vector3;

use crate::graph::edge::{push_token, read_information, write_information};
use crate::graph::{
    BaseVertex, Edge, EdgeCore, EdgeId, GraphError, ParameterContainer, TokenScanner, Vertex,
    VertexContainer, VertexCore, VertexId, vertex_downcast, vertex_downcast_mut,
};

/// A point in 3D Euclidean space.
#[derive(Debug)]
pub struct VertexPointXYZ {
    base: BaseVertex<Vector3<f64>>,
}

impl VertexPointXYZ {
    pub fn new(id: VertexId, estimate: Vector3<f64>) -> Self {
        VertexPointXYZ {
            base: BaseVertex::new(id, estimate),
        }
    }

    pub fn estimate(&self) -> &Vector3<f64> {
        self.base.estimate()
    }

    pub fn set_estimate(&mut self, estimate: Vector3<f64>) {
        self.base.set_estimate(estimate);
    }
}

impl Vertex for VertexPointXYZ {
    fn core(&self) -> &VertexCore {
        self.base.core()
    }

    fn core_mut(&mut self) -> &mut VertexCore {
        self.base.core_mut()
    }

    fn dimension(&self) -> usize {
        3
    }

    fn estimate_dimension(&self) -> usize {
        3
    }

    fn oplus(&mut self, delta: &[f64]) {
        self.base.update_estimate(|estimate| {
            estimate.x += delta[0];
            estimate.y += delta[1];
            estimate.z += delta[2];
        });
    }

    fn push(&mut self) {
        self.base.push();
    }

    fn pop(&mut self) {
        self.base.pop();
    }

    fn discard_top(&mut self) {
        self.base.discard_top();
    }

    fn stack_depth(&self) -> usize {
        self.base.stack_depth()
    }

    fn get_estimate_data(&self, dest: &mut [f64]) -> bool {
        if dest.len() != 3 {
            return false;
        }
        dest.copy_from_slice(self.base.estimate().as_slice());
        true
    }

    fn set_estimate_data(&mut self, src: &[f64]) -> bool {
        if src.len() != 3 {
            return false;
        }
        self.base
            .set_estimate(Vector3::new(src[0], src[1], src[2]));
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Binary edge measuring the difference between two 3D points:
/// `r = (p_j - p_i) - z`.
pub struct EdgePointXYZ {
    core: EdgeCore,
    measurement: Vector3<f64>,
}

impl EdgePointXYZ {
    pub fn new(id: EdgeId) -> Self {
        EdgePointXYZ {
            core: EdgeCore::new(id, 3, &[3, 3]),
            measurement: Vector3::zeros(),
        }
    }

    pub fn measurement(&self) -> &Vector3<f64> {
        &self.measurement
    }

    pub fn set_measurement(&mut self, measurement: Vector3<f64>) {
        self.measurement = measurement;
    }
}

impl Edge for EdgePointXYZ {
    fn core(&self) -> &EdgeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EdgeCore {
        &mut self.core
    }

    fn dimension(&self) -> usize {
        3
    }

    fn compute_error(&mut self, vertices: &VertexContainer, _parameters: &ParameterContainer) {
        let vi = self.core.vertices()[0];
        let vj = self.core.vertices()[1];
        let pi = vertex_downcast::<VertexPointXYZ>(vertices, vi).estimate();
        let pj = vertex_downcast::<VertexPointXYZ>(vertices, vj).estimate();
        let error = (pj - pi) - self.measurement;
        self.core.error_mut().copy_from(&error);
    }

    fn linearize(&mut self, _vertices: &VertexContainer, _parameters: &ParameterContainer) {
        let identity = nalgebra::Matrix3::<f64>::identity();
        self.core.jacobian_mut(0).copy_from(&(-identity));
        self.core.jacobian_mut(1).copy_from(&identity);
    }

    fn initial_estimate_possible(&self, from: &HashSet<VertexId>, to: VertexId) -> f64 {
        let vi = self.core.vertices()[0];
        let vj = self.core.vertices()[1];
        if (to == vj && from.contains(&vi)) || (to == vi && from.contains(&vj)) {
            1.0
        } else {
            f64::INFINITY
        }
    }

    fn initial_estimate(
        &self,
        from: &HashSet<VertexId>,
        to: VertexId,
        vertices: &mut VertexContainer,
    ) {
        let vi = self.core.vertices()[0];
        let vj = self.core.vertices()[1];
        if to == vj && from.contains(&vi) {
            let estimate = *vertex_downcast::<VertexPointXYZ>(vertices, vi).estimate()
                + self.measurement;
            vertex_downcast_mut::<VertexPointXYZ>(vertices, vj).set_estimate(estimate);
        } else if to == vi && from.contains(&vj) {
            let estimate = *vertex_downcast::<VertexPointXYZ>(vertices, vj).estimate()
                - self.measurement;
            vertex_downcast_mut::<VertexPointXYZ>(vertices, vi).set_estimate(estimate);
        }
    }

    fn read_data(&mut self, scanner: &mut TokenScanner) -> Result<(), GraphError> {
        for k in 0..3 {
            self.measurement[k] = scanner.next_f64()?;
        }
        let mut information = self.core.information().clone();
        read_information(scanner, &mut information)?;
        self.core.set_information(information);
        Ok(())
    }

    fn write_data(&self, out: &mut String) {
        for k in 0..3 {
            push_token(out, &format!("{}", self.measurement[k]));
        }
        write_information(out, self.core.information());
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    fn two_point_setup() -> (VertexContainer, EdgePointXYZ) {
        let mut vertices: VertexContainer = VertexContainer::default();
        vertices.insert(
            0,
            Box::new(VertexPointXYZ::new(0, Vector3::new(1.0, 0.0, 0.0))),
        );
        vertices.insert(
            1,
            Box::new(VertexPointXYZ::new(1, Vector3::new(2.0, 3.0, 4.0))),
        );
        let mut edge = EdgePointXYZ::new(0);
        edge.core_mut().set_vertex(0, 0);
        edge.core_mut().set_vertex(1, 1);
        edge.set_measurement(Vector3::new(1.0, 3.0, 4.0));
        (vertices, edge)
    }

    #[test]
    fn test_error_is_difference_minus_measurement() {
        let (vertices, mut edge) = two_point_setup();
        let parameters = ParameterContainer::default();
        edge.compute_error(&vertices, &parameters);
        assert!(edge.core().error().norm() < 1e-12);
        assert!(edge.chi2() < 1e-12);
    }

    #[test]
    fn test_jacobians_are_signed_identity() {
        let (vertices, mut edge) = two_point_setup();
        let parameters = ParameterContainer::default();
        edge.linearize(&vertices, &parameters);
        let identity = DMatrix::<f64>::identity(3, 3);
        assert_eq!(edge.core().jacobian(0), &(-&identity));
        assert_eq!(edge.core().jacobian(1), &identity);
    }

    #[test]
    fn test_initial_estimate_forward_and_backward() {
        let (mut vertices, edge) = two_point_setup();
        let from: HashSet<VertexId> = [0].into_iter().collect();
        assert_eq!(edge.initial_estimate_possible(&from, 1), 1.0);
        edge.initial_estimate(&from, 1, &mut vertices);
        let pj = vertex_downcast::<VertexPointXYZ>(&vertices, 1).estimate();
        assert!((pj - Vector3::new(2.0, 3.0, 4.0)).norm() < 1e-12);

        let from: HashSet<VertexId> = [1].into_iter().collect();
        edge.initial_estimate(&from, 0, &mut vertices);
        let pi = vertex_downcast::<VertexPointXYZ>(&vertices, 0).estimate();
        assert!((pi - Vector3::new(1.0, 0.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_wire_roundtrip_is_stable() {
        let payload = "1 2 3 1 0 0 2 0 3";
        let mut edge = EdgePointXYZ::new(0);
        let mut scanner = TokenScanner::new(payload);
        edge.read_data(&mut scanner).unwrap();
        assert!(scanner.exhausted());

        let mut written = String::new();
        edge.write_data(&mut written);
        assert_eq!(written, payload);

        // information mirrored to the lower triangle
        assert_eq!(edge.core().information()[(1, 1)], 2.0);
        assert_eq!(edge.core().information()[(0, 1)], 0.0);
    }
}
