//! Manifold representations for optimization on non-Euclidean spaces.
//!
//! This module provides the planar manifolds used by the bundled vertex and
//! edge types:
//! - **SE(2)**: Rigid transformations in 2D
//! - **SO(2)**: Rotations in 2D
//!
//! Lie group M,° | size | dim | X ∈ M          | Comp. | Action
//! ------------- | ---- | --- | -------------- | ----- | ------
//! Rotation      | SO(2)| 1   | R, RᵀR = I     | R₁R₂  | Rx
//! Rigid motion  | SE(2)| 3   | M = [R t; 0 1] | M₁M₂  | Rx+t
//!
//! Elements round-trip a `[x, y, θ]` vector representation, and all angle
//! results are normalized into `(-π, π]`.

pub mod se2;

pub use se2::{SE2, SO2, normalize_angle};
