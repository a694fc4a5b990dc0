//! Planar SLAM types: SE(2) poses, 2D landmarks, odometry and observation
//! edges, pose priors, and the sensor-offset parameter with its per-pose
//! cache.
//!
//! The pose increment is applied additively in the world frame:
//! `t += (dx, dy)`, `θ = normalize(θ + dθ)`; all edge Jacobians below are the
//! closed forms for that parameterization.

use std::any::Any;
use std::collections::HashSet;

use nalgebra::{Matrix2, Matrix3, Vector2};

use crate::graph::edge::{push_token, read_information, write_information};
use crate::graph::{
    BaseVertex, Cache, Edge, EdgeCore, EdgeId, GraphError, Parameter, ParameterContainer,
    ParameterId, TokenScanner, Vertex, VertexContainer, VertexCore, VertexId, vertex_downcast,
    vertex_downcast_mut,
};
use crate::manifold::{SE2, normalize_angle};

/// A robot pose in the plane.
#[derive(Debug)]
pub struct VertexSE2 {
    base: BaseVertex<SE2>,
}

impl VertexSE2 {
    pub fn new(id: VertexId, estimate: SE2) -> Self {
        VertexSE2 {
            base: BaseVertex::new(id, estimate),
        }
    }

    pub fn estimate(&self) -> &SE2 {
        self.base.estimate()
    }

    pub fn set_estimate(&mut self, estimate: SE2) {
        self.base.set_estimate(estimate);
    }
}

impl Vertex for VertexSE2 {
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
        let current = *self.base.estimate();
        let translation = current.translation() + Vector2::new(delta[0], delta[1]);
        let angle = normalize_angle(current.rotation().angle() + delta[2]);
        self.base
            .set_estimate(SE2::from_xy_angle(translation.x, translation.y, angle));
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
        let vector = self.base.estimate().to_vector();
        dest.copy_from_slice(vector.as_slice());
        true
    }

    fn set_estimate_data(&mut self, src: &[f64]) -> bool {
        if src.len() != 3 {
            return false;
        }
        self.base
            .set_estimate(SE2::from_xy_angle(src[0], src[1], src[2]));
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A 2D landmark; the marginalizable vertex class of the planar types.
#[derive(Debug)]
pub struct VertexPointXY {
    base: BaseVertex<Vector2<f64>>,
}

impl VertexPointXY {
    pub fn new(id: VertexId, estimate: Vector2<f64>) -> Self {
        VertexPointXY {
            base: BaseVertex::new(id, estimate),
        }
    }

    pub fn estimate(&self) -> &Vector2<f64> {
        self.base.estimate()
    }

    pub fn set_estimate(&mut self, estimate: Vector2<f64>) {
        self.base.set_estimate(estimate);
    }
}

impl Vertex for VertexPointXY {
    fn core(&self) -> &VertexCore {
        self.base.core()
    }

    fn core_mut(&mut self) -> &mut VertexCore {
        self.base.core_mut()
    }

    fn dimension(&self) -> usize {
        2
    }

    fn estimate_dimension(&self) -> usize {
        2
    }

    fn oplus(&mut self, delta: &[f64]) {
        self.base.update_estimate(|estimate| {
            estimate.x += delta[0];
            estimate.y += delta[1];
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
        if dest.len() != 2 {
            return false;
        }
        dest.copy_from_slice(self.base.estimate().as_slice());
        true
    }

    fn set_estimate_data(&mut self, src: &[f64]) -> bool {
        if src.len() != 2 {
            return false;
        }
        self.base.set_estimate(Vector2::new(src[0], src[1]));
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Relative-pose (odometry / loop closure) constraint between two SE(2)
/// poses: `r = vec(z⁻¹ · (x_i⁻¹ · x_j))`.
pub struct EdgeSE2 {
    core: EdgeCore,
    measurement: SE2,
    inverse_measurement: SE2,
}

impl EdgeSE2 {
    pub fn new(id: EdgeId) -> Self {
        EdgeSE2 {
            core: EdgeCore::new(id, 3, &[3, 3]),
            measurement: SE2::identity(),
            inverse_measurement: SE2::identity(),
        }
    }

    pub fn measurement(&self) -> &SE2 {
        &self.measurement
    }

    pub fn set_measurement(&mut self, measurement: SE2) {
        self.measurement = measurement;
        self.inverse_measurement = measurement.inverse();
    }
}

impl Edge for EdgeSE2 {
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
        let xi = *vertex_downcast::<VertexSE2>(vertices, self.core.vertices()[0]).estimate();
        let xj = *vertex_downcast::<VertexSE2>(vertices, self.core.vertices()[1]).estimate();
        let delta = self.inverse_measurement * (xi.inverse() * xj);
        self.core.error_mut().copy_from(&delta.to_vector());
    }

    fn linearize(&mut self, vertices: &VertexContainer, _parameters: &ParameterContainer) {
        let xi = *vertex_downcast::<VertexSE2>(vertices, self.core.vertices()[0]).estimate();
        let xj = *vertex_downcast::<VertexSE2>(vertices, self.core.vertices()[1]).estimate();
        let theta_i = xi.rotation().angle();
        let dt = xj.translation() - xi.translation();
        let (si, ci) = theta_i.sin_cos();

        let mut jacobian_i = Matrix3::<f64>::zeros();
        jacobian_i[(0, 0)] = -ci;
        jacobian_i[(0, 1)] = -si;
        jacobian_i[(0, 2)] = -si * dt.x + ci * dt.y;
        jacobian_i[(1, 0)] = si;
        jacobian_i[(1, 1)] = -ci;
        jacobian_i[(1, 2)] = -ci * dt.x - si * dt.y;
        jacobian_i[(2, 2)] = -1.0;

        let mut jacobian_j = Matrix3::<f64>::zeros();
        jacobian_j[(0, 0)] = ci;
        jacobian_j[(0, 1)] = si;
        jacobian_j[(1, 0)] = -si;
        jacobian_j[(1, 1)] = ci;
        jacobian_j[(2, 2)] = 1.0;

        // rotate the translation rows into the measurement frame
        let mut frame = Matrix3::<f64>::zeros();
        frame
            .fixed_view_mut::<2, 2>(0, 0)
            .copy_from(&self.inverse_measurement.rotation().rotation_matrix());
        frame[(2, 2)] = 1.0;

        self.core.jacobian_mut(0).copy_from(&(frame * jacobian_i));
        self.core.jacobian_mut(1).copy_from(&(frame * jacobian_j));
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
            let estimate = *vertex_downcast::<VertexSE2>(vertices, vi).estimate();
            vertex_downcast_mut::<VertexSE2>(vertices, vj)
                .set_estimate(estimate * self.measurement);
        } else if to == vi && from.contains(&vj) {
            let estimate = *vertex_downcast::<VertexSE2>(vertices, vj).estimate();
            vertex_downcast_mut::<VertexSE2>(vertices, vi)
                .set_estimate(estimate * self.inverse_measurement);
        }
    }

    fn read_data(&mut self, scanner: &mut TokenScanner) -> Result<(), GraphError> {
        let x = scanner.next_f64()?;
        let y = scanner.next_f64()?;
        let theta = scanner.next_f64()?;
        self.set_measurement(SE2::from_xy_angle(x, y, theta));
        let mut information = self.core.information().clone();
        read_information(scanner, &mut information)?;
        self.core.set_information(information);
        Ok(())
    }

    fn write_data(&self, out: &mut String) {
        let vector = self.measurement.to_vector();
        for k in 0..3 {
            push_token(out, &format!("{}", vector[k]));
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

/// Unary prior pinning an SE(2) pose to a measured transformation:
/// `r = vec(z⁻¹ · x)`.
pub struct EdgeSE2Prior {
    core: EdgeCore,
    measurement: SE2,
    inverse_measurement: SE2,
}

impl EdgeSE2Prior {
    pub fn new(id: EdgeId) -> Self {
        EdgeSE2Prior {
            core: EdgeCore::new(id, 3, &[3]),
            measurement: SE2::identity(),
            inverse_measurement: SE2::identity(),
        }
    }

    pub fn measurement(&self) -> &SE2 {
        &self.measurement
    }

    pub fn set_measurement(&mut self, measurement: SE2) {
        self.measurement = measurement;
        self.inverse_measurement = measurement.inverse();
    }
}

impl Edge for EdgeSE2Prior {
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
        let x = *vertex_downcast::<VertexSE2>(vertices, self.core.vertices()[0]).estimate();
        let delta = self.inverse_measurement * x;
        self.core.error_mut().copy_from(&delta.to_vector());
    }

    fn linearize(&mut self, _vertices: &VertexContainer, _parameters: &ParameterContainer) {
        let mut jacobian = Matrix3::<f64>::zeros();
        jacobian
            .fixed_view_mut::<2, 2>(0, 0)
            .copy_from(&self.inverse_measurement.rotation().rotation_matrix());
        jacobian[(2, 2)] = 1.0;
        self.core.jacobian_mut(0).copy_from(&jacobian);
    }

    fn initial_estimate_possible(&self, _from: &HashSet<VertexId>, to: VertexId) -> f64 {
        if to == self.core.vertices()[0] {
            1.0
        } else {
            f64::INFINITY
        }
    }

    fn initial_estimate(
        &self,
        _from: &HashSet<VertexId>,
        to: VertexId,
        vertices: &mut VertexContainer,
    ) {
        if to == self.core.vertices()[0] {
            vertex_downcast_mut::<VertexSE2>(vertices, to).set_estimate(self.measurement);
        }
    }

    fn read_data(&mut self, scanner: &mut TokenScanner) -> Result<(), GraphError> {
        let x = scanner.next_f64()?;
        let y = scanner.next_f64()?;
        let theta = scanner.next_f64()?;
        self.set_measurement(SE2::from_xy_angle(x, y, theta));
        let mut information = self.core.information().clone();
        read_information(scanner, &mut information)?;
        self.core.set_information(information);
        Ok(())
    }

    fn write_data(&self, out: &mut String) {
        let vector = self.measurement.to_vector();
        for k in 0..3 {
            push_token(out, &format!("{}", vector[k]));
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

/// Landmark observation from a pose, measured in the robot frame:
/// `r = R_iᵀ (l - t_i) - z`.
pub struct EdgeSE2PointXY {
    core: EdgeCore,
    measurement: Vector2<f64>,
}

impl EdgeSE2PointXY {
    pub fn new(id: EdgeId) -> Self {
        EdgeSE2PointXY {
            core: EdgeCore::new(id, 2, &[3, 2]),
            measurement: Vector2::zeros(),
        }
    }

    pub fn measurement(&self) -> &Vector2<f64> {
        &self.measurement
    }

    pub fn set_measurement(&mut self, measurement: Vector2<f64>) {
        self.measurement = measurement;
    }
}

impl Edge for EdgeSE2PointXY {
    fn core(&self) -> &EdgeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EdgeCore {
        &mut self.core
    }

    fn dimension(&self) -> usize {
        2
    }

    fn compute_error(&mut self, vertices: &VertexContainer, _parameters: &ParameterContainer) {
        let pose = *vertex_downcast::<VertexSE2>(vertices, self.core.vertices()[0]).estimate();
        let landmark =
            *vertex_downcast::<VertexPointXY>(vertices, self.core.vertices()[1]).estimate();
        let local = pose
            .rotation()
            .inverse()
            .rotate(&(landmark - pose.translation()));
        self.core.error_mut().copy_from(&(local - self.measurement));
    }

    fn linearize(&mut self, vertices: &VertexContainer, _parameters: &ParameterContainer) {
        let pose = *vertex_downcast::<VertexSE2>(vertices, self.core.vertices()[0]).estimate();
        let landmark =
            *vertex_downcast::<VertexPointXY>(vertices, self.core.vertices()[1]).estimate();
        let (s, c) = pose.rotation().angle().sin_cos();
        let rotation_t = Matrix2::new(c, s, -s, c);
        let dt = landmark - pose.translation();

        let mut jacobian_pose = nalgebra::Matrix2x3::<f64>::zeros();
        jacobian_pose
            .fixed_view_mut::<2, 2>(0, 0)
            .copy_from(&(-rotation_t));
        jacobian_pose[(0, 2)] = -s * dt.x + c * dt.y;
        jacobian_pose[(1, 2)] = -c * dt.x - s * dt.y;

        self.core.jacobian_mut(0).copy_from(&jacobian_pose);
        self.core.jacobian_mut(1).copy_from(&rotation_t);
    }

    fn initial_estimate_possible(&self, from: &HashSet<VertexId>, to: VertexId) -> f64 {
        if to == self.core.vertices()[1] && from.contains(&self.core.vertices()[0]) {
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
        let pose_id = self.core.vertices()[0];
        let landmark_id = self.core.vertices()[1];
        if to == landmark_id && from.contains(&pose_id) {
            let pose = *vertex_downcast::<VertexSE2>(vertices, pose_id).estimate();
            let world = pose.transform(&self.measurement);
            vertex_downcast_mut::<VertexPointXY>(vertices, landmark_id).set_estimate(world);
        }
    }

    fn read_data(&mut self, scanner: &mut TokenScanner) -> Result<(), GraphError> {
        self.measurement.x = scanner.next_f64()?;
        self.measurement.y = scanner.next_f64()?;
        let mut information = self.core.information().clone();
        read_information(scanner, &mut information)?;
        self.core.set_information(information);
        Ok(())
    }

    fn write_data(&self, out: &mut String) {
        push_token(out, &format!("{}", self.measurement.x));
        push_token(out, &format!("{}", self.measurement.y));
        write_information(out, self.core.information());
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A rigid sensor offset on SE(2), shared by observation edges.
pub struct ParameterSE2Offset {
    id: ParameterId,
    offset: SE2,
    inverse_offset: SE2,
}

impl ParameterSE2Offset {
    pub fn new(id: ParameterId, offset: SE2) -> Self {
        ParameterSE2Offset {
            id,
            offset,
            inverse_offset: offset.inverse(),
        }
    }

    pub fn offset(&self) -> &SE2 {
        &self.offset
    }

    pub fn inverse_offset(&self) -> &SE2 {
        &self.inverse_offset
    }

    pub fn set_offset(&mut self, offset: SE2) {
        self.offset = offset;
        self.inverse_offset = offset.inverse();
    }
}

impl Parameter for ParameterSE2Offset {
    fn id(&self) -> ParameterId {
        self.id
    }

    fn set_id(&mut self, id: ParameterId) {
        self.id = id;
    }

    fn read_data(&mut self, scanner: &mut TokenScanner) -> Result<(), GraphError> {
        let x = scanner.next_f64()?;
        let y = scanner.next_f64()?;
        let theta = scanner.next_f64()?;
        self.set_offset(SE2::from_xy_angle(x, y, theta));
        Ok(())
    }

    fn write_data(&self, out: &mut String) {
        let vector = self.offset.to_vector();
        for k in 0..3 {
            push_token(out, &format!("{}", vector[k]));
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// World-to-sensor transform of one pose combined with a sensor offset,
/// recomputed when the pose estimate changes.
pub struct CacheSE2Offset {
    offset_id: ParameterId,
    se2_n2w: SE2,
    se2_w2n: SE2,
    w2n_rotation: Matrix2<f64>,
    offset_rotation_inverse: Matrix2<f64>,
    /// `R_offᵀ · dR_iᵀ/dθ`, the rotational derivative product of the
    /// observation Jacobian
    rp_inverse_r_inverse_prime: Matrix2<f64>,
    pose_translation: Vector2<f64>,
}

impl CacheSE2Offset {
    pub fn new(offset_id: ParameterId) -> Self {
        CacheSE2Offset {
            offset_id,
            se2_n2w: SE2::identity(),
            se2_w2n: SE2::identity(),
            w2n_rotation: Matrix2::identity(),
            offset_rotation_inverse: Matrix2::identity(),
            rp_inverse_r_inverse_prime: Matrix2::zeros(),
            pose_translation: Vector2::zeros(),
        }
    }

    /// Sensor-to-world transform `x_i · offset`.
    pub fn n2w(&self) -> &SE2 {
        &self.se2_n2w
    }

    /// World-to-sensor transform `(x_i · offset)⁻¹`.
    pub fn w2n(&self) -> &SE2 {
        &self.se2_w2n
    }

    pub fn w2n_rotation(&self) -> &Matrix2<f64> {
        &self.w2n_rotation
    }

    pub fn offset_rotation_inverse(&self) -> &Matrix2<f64> {
        &self.offset_rotation_inverse
    }

    pub fn rp_inverse_r_inverse_prime(&self) -> &Matrix2<f64> {
        &self.rp_inverse_r_inverse_prime
    }

    pub fn pose_translation(&self) -> &Vector2<f64> {
        &self.pose_translation
    }
}

impl Cache for CacheSE2Offset {
    fn update(
        &mut self,
        vertex: &dyn Vertex,
        parameters: &ParameterContainer,
    ) -> Result<(), GraphError> {
        let Some(pose) = vertex.as_any().downcast_ref::<VertexSE2>() else {
            return Err(GraphError::Wire(
                "SE2 offset cache installed on a non-SE2 vertex".to_string(),
            ));
        };
        let Some(offset) = parameters.get::<ParameterSE2Offset>(self.offset_id) else {
            return Err(GraphError::UnknownParameter(self.offset_id));
        };

        let estimate = *pose.estimate();
        self.se2_n2w = estimate * *offset.offset();
        self.se2_w2n = self.se2_n2w.inverse();
        self.w2n_rotation = self.se2_w2n.rotation().rotation_matrix();
        self.offset_rotation_inverse = offset.inverse_offset().rotation().rotation_matrix();
        self.pose_translation = *estimate.translation();

        let (s, c) = estimate.rotation().angle().sin_cos();
        let r_inverse_prime = Matrix2::new(-s, c, -c, -s);
        self.rp_inverse_r_inverse_prime = self.offset_rotation_inverse * r_inverse_prime;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Landmark observation through an offset sensor, measured in the sensor
/// frame: `r = (x_i · offset)⁻¹ · l - z`. Reads [`CacheSE2Offset`] from the
/// pose vertex on the hot path.
pub struct EdgeSE2PointXYOffset {
    core: EdgeCore,
    measurement: Vector2<f64>,
}

impl EdgeSE2PointXYOffset {
    pub fn new(id: EdgeId, offset_id: ParameterId) -> Self {
        let mut core = EdgeCore::new(id, 2, &[3, 2]);
        core.set_parameter_ids(vec![offset_id]);
        EdgeSE2PointXYOffset {
            core,
            measurement: Vector2::zeros(),
        }
    }

    pub fn measurement(&self) -> &Vector2<f64> {
        &self.measurement
    }

    pub fn set_measurement(&mut self, measurement: Vector2<f64>) {
        self.measurement = measurement;
    }

    fn cache<'a>(&self, vertices: &'a VertexContainer) -> &'a CacheSE2Offset {
        let pose_id = self.core.vertices()[0];
        let Some(pose) = vertices.get(&pose_id) else {
            panic!("vertex {pose_id} is not present in the graph");
        };
        match pose.core().caches().get::<CacheSE2Offset>(self.core.parameter_ids()) {
            Some(cache) => cache,
            None => panic!(
                "SE2 offset cache missing on vertex {pose_id}; edge evaluated outside an initialized optimization"
            ),
        }
    }
}

impl Edge for EdgeSE2PointXYOffset {
    fn core(&self) -> &EdgeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EdgeCore {
        &mut self.core
    }

    fn dimension(&self) -> usize {
        2
    }

    fn num_parameters(&self) -> usize {
        1
    }

    fn compute_error(&mut self, vertices: &VertexContainer, _parameters: &ParameterContainer) {
        let landmark =
            *vertex_downcast::<VertexPointXY>(vertices, self.core.vertices()[1]).estimate();
        let local = self.cache(vertices).w2n().transform(&landmark);
        self.core.error_mut().copy_from(&(local - self.measurement));
    }

    fn linearize(&mut self, vertices: &VertexContainer, _parameters: &ParameterContainer) {
        let landmark =
            *vertex_downcast::<VertexPointXY>(vertices, self.core.vertices()[1]).estimate();
        let cache = self.cache(vertices);
        let dt = landmark - cache.pose_translation();

        let mut jacobian_pose = nalgebra::Matrix2x3::<f64>::zeros();
        jacobian_pose
            .fixed_view_mut::<2, 2>(0, 0)
            .copy_from(&(-cache.w2n_rotation()));
        let dtheta = cache.rp_inverse_r_inverse_prime() * dt;
        jacobian_pose[(0, 2)] = dtheta.x;
        jacobian_pose[(1, 2)] = dtheta.y;
        let jacobian_landmark = *cache.w2n_rotation();

        self.core.jacobian_mut(0).copy_from(&jacobian_pose);
        self.core.jacobian_mut(1).copy_from(&jacobian_landmark);
    }

    fn initial_estimate_possible(&self, _from: &HashSet<VertexId>, _to: VertexId) -> f64 {
        // the sensor frame is only known through the cache, which is not
        // guaranteed fresh during propagation
        f64::INFINITY
    }

    fn initial_estimate(
        &self,
        _from: &HashSet<VertexId>,
        _to: VertexId,
        _vertices: &mut VertexContainer,
    ) {
    }

    fn install_caches(
        &self,
        vertices: &mut VertexContainer,
        parameters: &ParameterContainer,
    ) -> Result<(), GraphError> {
        let offset_id = self.core.parameter_ids()[0];
        if !parameters.contains(offset_id) {
            return Err(GraphError::UnknownParameter(offset_id));
        }
        let pose_id = self.core.vertices()[0];
        let Some(pose) = vertices.get_mut(&pose_id) else {
            return Err(GraphError::UnknownVertex {
                edge: self.core.id(),
                vertex: pose_id,
            });
        };
        pose.core_mut()
            .caches_mut()
            .install(self.core.parameter_ids(), CacheSE2Offset::new(offset_id));
        Ok(())
    }

    fn read_data(&mut self, scanner: &mut TokenScanner) -> Result<(), GraphError> {
        let offset_id = scanner.next_i32()?;
        self.core.set_parameter_ids(vec![offset_id]);
        self.measurement.x = scanner.next_f64()?;
        self.measurement.y = scanner.next_f64()?;
        let mut information = self.core.information().clone();
        read_information(scanner, &mut information)?;
        self.core.set_information(information);
        Ok(())
    }

    fn write_data(&self, out: &mut String) {
        push_token(out, &format!("{}", self.core.parameter_ids()[0]));
        push_token(out, &format!("{}", self.measurement.x));
        push_token(out, &format!("{}", self.measurement.y));
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
    use nalgebra::DVector;
    use std::f64::consts::PI;

    const TOLERANCE: f64 = 1e-9;

    fn containers() -> (VertexContainer, ParameterContainer) {
        (VertexContainer::default(), ParameterContainer::default())
    }

    fn refresh_caches(vertices: &mut VertexContainer, vid: VertexId, parameters: &ParameterContainer) {
        let vertex = vertices.get_mut(&vid).unwrap();
        if vertex.core().caches().is_empty() {
            return;
        }
        let version = vertex.core().version();
        let mut caches = std::mem::take(&mut vertex.core_mut().caches);
        caches.refresh(&**vertex, parameters, version).unwrap();
        vertex.core_mut().caches = caches;
    }

    /// Numeric differentiation of an edge error w.r.t. one vertex.
    fn numeric_jacobian(
        edge: &mut dyn Edge,
        vertices: &mut VertexContainer,
        parameters: &ParameterContainer,
        slot: usize,
    ) -> nalgebra::DMatrix<f64> {
        let eps = 1e-7;
        let vid = edge.core().vertices()[slot];
        let dim = vertices[&vid].dimension();
        let edge_dim = edge.dimension();
        let mut jacobian = nalgebra::DMatrix::zeros(edge_dim, dim);
        for k in 0..dim {
            let mut delta = vec![0.0; dim];
            delta[k] = eps;
            vertices.get_mut(&vid).unwrap().push();
            vertices.get_mut(&vid).unwrap().oplus(&delta);
            refresh_caches(vertices, vid, parameters);
            edge.compute_error(vertices, parameters);
            let plus: DVector<f64> = edge.core().error().clone();
            vertices.get_mut(&vid).unwrap().pop();
            refresh_caches(vertices, vid, parameters);

            let mut delta = vec![0.0; dim];
            delta[k] = -eps;
            vertices.get_mut(&vid).unwrap().push();
            vertices.get_mut(&vid).unwrap().oplus(&delta);
            refresh_caches(vertices, vid, parameters);
            edge.compute_error(vertices, parameters);
            let minus: DVector<f64> = edge.core().error().clone();
            vertices.get_mut(&vid).unwrap().pop();
            refresh_caches(vertices, vid, parameters);

            let column = (plus - minus) / (2.0 * eps);
            jacobian.column_mut(k).copy_from(&column);
        }
        edge.compute_error(vertices, parameters);
        jacobian
    }

    #[test]
    fn test_se2_oplus_is_additive_with_angle_wrap() {
        let mut vertex = VertexSE2::new(0, SE2::from_xy_angle(1.0, 2.0, PI - 0.1));
        vertex.oplus(&[0.5, -0.5, 0.2]);
        let vector = vertex.estimate().to_vector();
        assert!((vector.x - 1.5).abs() < TOLERANCE);
        assert!((vector.y - 1.5).abs() < TOLERANCE);
        assert!((vector.z - (PI - 0.1 + 0.2 - 2.0 * PI)).abs() < 1e-6);
    }

    #[test]
    fn test_edge_se2_zero_error_on_consistent_poses() {
        let (mut vertices, parameters) = containers();
        let z = SE2::from_xy_angle(1.0, 0.5, 0.3);
        let xi = SE2::from_xy_angle(0.2, -0.1, 0.4);
        vertices.insert(0, Box::new(VertexSE2::new(0, xi)));
        vertices.insert(1, Box::new(VertexSE2::new(1, xi * z)));

        let mut edge = EdgeSE2::new(0);
        edge.core_mut().set_vertex(0, 0);
        edge.core_mut().set_vertex(1, 1);
        edge.set_measurement(z);
        edge.compute_error(&vertices, &parameters);
        assert!(edge.core().error().norm() < TOLERANCE);
    }

    #[test]
    fn test_edge_se2_analytic_jacobian_matches_numeric() {
        let (mut vertices, parameters) = containers();
        vertices.insert(0, Box::new(VertexSE2::new(0, SE2::from_xy_angle(0.3, -0.2, 0.7))));
        vertices.insert(1, Box::new(VertexSE2::new(1, SE2::from_xy_angle(1.4, 0.9, -0.4))));

        let mut edge = EdgeSE2::new(0);
        edge.core_mut().set_vertex(0, 0);
        edge.core_mut().set_vertex(1, 1);
        edge.set_measurement(SE2::from_xy_angle(1.0, 1.0, 0.5));
        edge.linearize(&vertices, &parameters);

        for slot in 0..2 {
            let numeric = numeric_jacobian(&mut edge, &mut vertices, &parameters, slot);
            let analytic = edge.core().jacobian(slot);
            assert!(
                (analytic - &numeric).norm() < 1e-5,
                "slot {slot}: analytic {analytic} vs numeric {numeric}"
            );
        }
    }

    #[test]
    fn test_edge_se2_prior_jacobian_matches_numeric() {
        let (mut vertices, parameters) = containers();
        vertices.insert(0, Box::new(VertexSE2::new(0, SE2::from_xy_angle(0.3, -0.2, 0.7))));

        let mut edge = EdgeSE2Prior::new(0);
        edge.core_mut().set_vertex(0, 0);
        edge.set_measurement(SE2::from_xy_angle(0.5, 0.25, 0.1));
        edge.linearize(&vertices, &parameters);

        let numeric = numeric_jacobian(&mut edge, &mut vertices, &parameters, 0);
        assert!((edge.core().jacobian(0) - &numeric).norm() < 1e-5);
    }

    #[test]
    fn test_edge_se2_point_xy_jacobians_match_numeric() {
        let (mut vertices, parameters) = containers();
        vertices.insert(0, Box::new(VertexSE2::new(0, SE2::from_xy_angle(0.5, 1.0, 0.9))));
        vertices.insert(1, Box::new(VertexPointXY::new(1, Vector2::new(2.0, -1.0))));

        let mut edge = EdgeSE2PointXY::new(0);
        edge.core_mut().set_vertex(0, 0);
        edge.core_mut().set_vertex(1, 1);
        edge.set_measurement(Vector2::new(0.4, 0.6));
        edge.linearize(&vertices, &parameters);

        for slot in 0..2 {
            let numeric = numeric_jacobian(&mut edge, &mut vertices, &parameters, slot);
            assert!((edge.core().jacobian(slot) - &numeric).norm() < 1e-5);
        }
    }

    #[test]
    fn test_edge_se2_point_xy_initial_estimate() {
        let (mut vertices, _) = containers();
        let pose = SE2::from_xy_angle(1.0, 0.0, PI / 2.0);
        vertices.insert(0, Box::new(VertexSE2::new(0, pose)));
        vertices.insert(1, Box::new(VertexPointXY::new(1, Vector2::zeros())));

        let mut edge = EdgeSE2PointXY::new(0);
        edge.core_mut().set_vertex(0, 0);
        edge.core_mut().set_vertex(1, 1);
        edge.set_measurement(Vector2::new(1.0, 0.0));

        let from: HashSet<VertexId> = [0].into_iter().collect();
        assert_eq!(edge.initial_estimate_possible(&from, 1), 1.0);
        edge.initial_estimate(&from, 1, &mut vertices);
        let landmark = vertex_downcast::<VertexPointXY>(&vertices, 1).estimate();
        assert!((landmark - Vector2::new(1.0, 1.0)).norm() < TOLERANCE);
    }

    #[test]
    fn test_offset_cache_and_edge_agree_with_plain_math() {
        let (mut vertices, _) = containers();
        let mut parameters = ParameterContainer::default();
        let offset = SE2::from_xy_angle(0.2, 0.0, 0.1);
        parameters.add_parameter(Box::new(ParameterSE2Offset::new(7, offset)));

        let pose = SE2::from_xy_angle(1.0, -0.5, 0.8);
        vertices.insert(0, Box::new(VertexSE2::new(0, pose)));
        vertices.insert(1, Box::new(VertexPointXY::new(1, Vector2::new(3.0, 2.0))));

        let mut edge = EdgeSE2PointXYOffset::new(0, 7);
        edge.core_mut().set_vertex(0, 0);
        edge.core_mut().set_vertex(1, 1);
        edge.set_measurement(Vector2::new(0.1, 0.2));
        edge.install_caches(&mut vertices, &parameters).unwrap();

        // refresh the cache as the optimizer would
        {
            let vertex = vertices.get_mut(&0).unwrap();
            let version = vertex.core().version();
            let mut caches = std::mem::take(&mut vertex.core_mut().caches);
            caches.refresh(&**vertex, &parameters, version).unwrap();
            vertex.core_mut().caches = caches;
        }

        edge.compute_error(&vertices, &parameters);
        let expected = (pose * offset).inverse().transform(&Vector2::new(3.0, 2.0))
            - Vector2::new(0.1, 0.2);
        assert!((edge.core().error() - &DVector::from_column_slice(expected.as_slice())).norm() < TOLERANCE);

        edge.linearize(&vertices, &parameters);
        for slot in 0..2 {
            let numeric = numeric_jacobian(&mut edge, &mut vertices, &parameters, slot);
            assert!(
                (edge.core().jacobian(slot) - &numeric).norm() < 1e-5,
                "slot {slot} mismatch"
            );
        }
    }

    #[test]
    fn test_edge_se2_wire_roundtrip_is_stable() {
        let payload = "1 0.5 0.25 100 0 0 100 0 25";
        let mut edge = EdgeSE2::new(0);
        let mut scanner = TokenScanner::new(payload);
        edge.read_data(&mut scanner).unwrap();
        assert!(scanner.exhausted());

        let mut written = String::new();
        edge.write_data(&mut written);
        assert_eq!(written, payload);
    }

    #[test]
    fn test_offset_edge_wire_roundtrip_with_parameter_id() {
        let payload = "7 0.5 -0.5 10 0 10";
        let mut edge = EdgeSE2PointXYOffset::new(0, 0);
        let mut scanner = TokenScanner::new(payload);
        edge.read_data(&mut scanner).unwrap();
        assert_eq!(edge.core().parameter_ids(), &[7]);

        let mut written = String::new();
        edge.write_data(&mut written);
        assert_eq!(written, payload);
    }

    #[test]
    fn test_parameter_se2_offset_wire_roundtrip() {
        let payload = "0.1 0.2 0.3";
        let mut parameter = ParameterSE2Offset::new(3, SE2::identity());
        let mut scanner = TokenScanner::new(payload);
        parameter.read_data(&mut scanner).unwrap();

        let mut written = String::new();
        parameter.write_data(&mut written);
        assert_eq!(written, payload);
    }
}
