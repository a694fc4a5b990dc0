//! SE(2) - Special Euclidean Group in 2D
//!
//! This module implements the Special Euclidean group SE(2), which represents
//! rigid body transformations in 2D space (rotation + translation), together
//! with its rotation part SO(2).
//!
//! SE(2) elements are represented as a 2D rotation (SO2) plus a `Vector2`
//! translation and round-trip a `[x, y, theta]` vector form. The group
//! operations (composition, inverse, point action) are the ones the planar
//! vertex and edge types build their error functions on.

use nalgebra::{Matrix2, Vector2, Vector3};
use std::fmt;
use std::ops::Mul;

/// Normalize an angle into `[-π, π)`.
pub fn normalize_angle(theta: f64) -> f64 {
    let two_pi = 2.0 * std::f64::consts::PI;
    (theta + std::f64::consts::PI).rem_euclid(two_pi) - std::f64::consts::PI
}

/// SO(2) group element representing a rotation in the plane.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SO2 {
    angle: f64,
}

impl SO2 {
    /// Degrees of freedom - dimension of the tangent space
    pub const DOF: usize = 1;

    /// Get the identity element of the group.
    pub fn identity() -> Self {
        SO2 { angle: 0.0 }
    }

    /// Create an SO2 element from an angle in radians.
    pub fn from_angle(angle: f64) -> Self {
        SO2 {
            angle: normalize_angle(angle),
        }
    }

    /// Get the rotation angle in radians, normalized into `[-π, π)`.
    pub fn angle(&self) -> f64 {
        self.angle
    }

    /// Get the 2x2 rotation matrix for this element.
    pub fn rotation_matrix(&self) -> Matrix2<f64> {
        let (s, c) = self.angle.sin_cos();
        Matrix2::new(c, -s, s, c)
    }

    /// Get the inverse rotation.
    pub fn inverse(&self) -> Self {
        SO2 { angle: -self.angle }
    }

    /// Rotate a 2D point.
    pub fn rotate(&self, p: &Vector2<f64>) -> Vector2<f64> {
        let (s, c) = self.angle.sin_cos();
        Vector2::new(c * p.x - s * p.y, s * p.x + c * p.y)
    }
}

impl Mul for SO2 {
    type Output = SO2;

    fn mul(self, rhs: SO2) -> SO2 {
        SO2::from_angle(self.angle + rhs.angle)
    }
}

/// SE(2) group element representing rigid body transformations in 2D.
///
/// Represented as a combination of 2D rotation (SO2) and 2D translation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SE2 {
    translation: Vector2<f64>,
    rotation: SO2,
}

impl fmt::Display for SE2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SE2(translation: [{:.4}, {:.4}], rotation: {:.4})",
            self.translation.x,
            self.translation.y,
            self.rotation.angle()
        )
    }
}

impl SE2 {
    /// Degrees of freedom - dimension of the tangent space
    pub const DOF: usize = 3;

    /// Get the identity element of the group.
    pub fn identity() -> Self {
        SE2 {
            translation: Vector2::zeros(),
            rotation: SO2::identity(),
        }
    }

    /// Create a new SE2 element from translation and rotation.
    pub fn new(translation: Vector2<f64>, rotation: SO2) -> Self {
        SE2 {
            translation,
            rotation,
        }
    }

    /// Create SE2 from translation components and angle.
    pub fn from_xy_angle(x: f64, y: f64, theta: f64) -> Self {
        SE2 {
            translation: Vector2::new(x, y),
            rotation: SO2::from_angle(theta),
        }
    }

    /// Create SE2 from a `[x, y, theta]` vector.
    pub fn from_vector(v: &Vector3<f64>) -> Self {
        Self::from_xy_angle(v.x, v.y, v.z)
    }

    /// Get the `[x, y, theta]` vector representation.
    pub fn to_vector(&self) -> Vector3<f64> {
        Vector3::new(self.translation.x, self.translation.y, self.rotation.angle())
    }

    /// Get the translation part.
    pub fn translation(&self) -> &Vector2<f64> {
        &self.translation
    }

    /// Get the rotation part.
    pub fn rotation(&self) -> &SO2 {
        &self.rotation
    }

    /// Get the inverse transformation.
    pub fn inverse(&self) -> Self {
        let inv_rot = self.rotation.inverse();
        SE2 {
            translation: -inv_rot.rotate(&self.translation),
            rotation: inv_rot,
        }
    }

    /// Apply the transformation to a 2D point: `R * p + t`.
    pub fn transform(&self, p: &Vector2<f64>) -> Vector2<f64> {
        self.rotation.rotate(p) + self.translation
    }
}

impl Mul for SE2 {
    type Output = SE2;

    fn mul(self, rhs: SE2) -> SE2 {
        SE2 {
            translation: self.translation + self.rotation.rotate(&rhs.translation),
            rotation: self.rotation * rhs.rotation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    const TOLERANCE: f64 = 1e-12;

    #[test]
    fn test_normalize_angle() {
        assert!((normalize_angle(0.0)).abs() < TOLERANCE);
        assert!((normalize_angle(2.0 * PI)).abs() < TOLERANCE);
        assert!((normalize_angle(3.0 * PI) - (-PI)).abs() < TOLERANCE);
        assert!((normalize_angle(-PI / 2.0) - (-PI / 2.0)).abs() < TOLERANCE);
        assert!((normalize_angle(5.0 * PI / 2.0) - PI / 2.0).abs() < TOLERANCE);
    }

    #[test]
    fn test_so2_compose_inverse() {
        let a = SO2::from_angle(0.7);
        let b = SO2::from_angle(-0.2);
        let c = a * b;
        assert!((c.angle() - 0.5).abs() < TOLERANCE);

        let e = a * a.inverse();
        assert!(e.angle().abs() < TOLERANCE);
    }

    #[test]
    fn test_so2_rotate() {
        let r = SO2::from_angle(PI / 2.0);
        let p = r.rotate(&Vector2::new(1.0, 0.0));
        assert!((p.x).abs() < TOLERANCE);
        assert!((p.y - 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn test_se2_compose_inverse_identity() {
        let t = SE2::from_xy_angle(1.0, 2.0, 0.3);
        let e = t * t.inverse();
        let v = e.to_vector();
        assert!(v.norm() < TOLERANCE);
    }

    #[test]
    fn test_se2_transform_point() {
        let t = SE2::from_xy_angle(1.0, 0.0, PI / 2.0);
        let p = t.transform(&Vector2::new(1.0, 0.0));
        assert!((p.x - 1.0).abs() < TOLERANCE);
        assert!((p.y - 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn test_se2_vector_roundtrip() {
        let v = Vector3::new(0.5, -1.5, 0.25);
        let t = SE2::from_vector(&v);
        assert!((t.to_vector() - v).norm() < TOLERANCE);
    }

    #[test]
    fn test_se2_relative_transform() {
        // x_ij = x_i^-1 * x_j reproduces x_j = x_i * x_ij
        let xi = SE2::from_xy_angle(1.0, 2.0, 0.7);
        let xj = SE2::from_xy_angle(-0.5, 0.25, -0.9);
        let xij = xi.inverse() * xj;
        let xj2 = xi * xij;
        assert!((xj2.to_vector() - xj.to_vector()).norm() < 1e-10);
    }
}
