//! Robust kernel implementations for outlier rejection
//!
//! This module provides robust kernel functions that can be attached to edges
//! to reduce the influence of outliers in optimization.
//!
//! Robust kernels modify the cost function from:
//! ```text
//! cost = r^T Ω r
//! ```
//! to:
//! ```text
//! cost = ρ(r^T Ω r)
//! ```
//! where `ρ` is the robust kernel function.
//!
//! The influence function `ψ(x) = ρ'(x)` determines how much each residual
//! contributes to the gradient. During assembly the edge is treated as if its
//! information matrix were scaled by `ψ`, i.e. `Ω' = ψ(χ²)·Ω`.

use std::fmt;

/// Trait for robust kernel functions
///
/// Each kernel implements the kernel function ρ(x) and its derivative ψ(x)
/// on the squared error `x = r^T Ω r`.
pub trait RobustKernel: fmt::Debug + Send + Sync {
    /// Evaluate the robust kernel function ρ(x)
    fn rho(&self, squared_error: f64) -> f64;

    /// Evaluate the influence function ψ(x) = ρ'(x)
    fn psi(&self, squared_error: f64) -> f64;

    /// The weight applied to the edge's information matrix during assembly
    fn weight(&self, squared_error: f64) -> f64 {
        self.psi(squared_error)
    }

    /// Get the kernel parameter (threshold, scale, etc.)
    fn parameter(&self) -> f64;
}

/// Huber robust kernel
///
/// Quadratic for small errors and linear for large errors, providing a good
/// balance between efficiency and robustness.
///
/// Mathematical formulation on the squared error x:
/// - ρ(x) = x if x ≤ δ², else 2δ√x - δ²
/// - ψ(x) = 1 if x ≤ δ², else δ/√x
#[derive(Debug, Clone)]
pub struct HuberKernel {
    /// Threshold parameter δ
    delta: f64,
    /// Squared threshold
    delta_squared: f64,
}

impl HuberKernel {
    /// Create a new Huber kernel with the given threshold δ.
    pub fn new(delta: f64) -> Self {
        HuberKernel {
            delta,
            delta_squared: delta * delta,
        }
    }
}

impl RobustKernel for HuberKernel {
    fn rho(&self, squared_error: f64) -> f64 {
        if squared_error <= self.delta_squared {
            squared_error
        } else {
            2.0 * self.delta * squared_error.sqrt() - self.delta_squared
        }
    }

    fn psi(&self, squared_error: f64) -> f64 {
        if squared_error <= self.delta_squared {
            1.0
        } else {
            self.delta / squared_error.sqrt()
        }
    }

    fn parameter(&self) -> f64 {
        self.delta
    }
}

/// Cauchy robust kernel
///
/// Heavy-tailed kernel that never fully rejects a residual but strongly
/// down-weights large ones.
///
/// Mathematical formulation on the squared error x:
/// - ρ(x) = c² log(1 + x/c²)
/// - ψ(x) = 1 / (1 + x/c²)
#[derive(Debug, Clone)]
pub struct CauchyKernel {
    /// Scale parameter c
    scale: f64,
    /// Squared scale
    scale_squared: f64,
}

impl CauchyKernel {
    /// Create a new Cauchy kernel with the given scale c.
    pub fn new(scale: f64) -> Self {
        CauchyKernel {
            scale,
            scale_squared: scale * scale,
        }
    }
}

impl RobustKernel for CauchyKernel {
    fn rho(&self, squared_error: f64) -> f64 {
        self.scale_squared * (1.0 + squared_error / self.scale_squared).ln()
    }

    fn psi(&self, squared_error: f64) -> f64 {
        1.0 / (1.0 + squared_error / self.scale_squared)
    }

    fn parameter(&self) -> f64 {
        self.scale
    }
}
