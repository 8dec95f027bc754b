//! # void_math - Math for Culling and Sorting
//!
//! Small, copyable math primitives used by the renderer's spatial queries:
//! - [`Vec3`]/[`Vec4`] vectors and a column-major [`Mat4`]
//! - [`AABB`] bounding boxes
//! - [`Plane`] and [`FrustumPlanes`] for view-frustum classification

#![cfg_attr(not(feature = "std"), no_std)]

pub mod vector;
pub mod matrix;
pub mod bounds;
pub mod frustum;

pub use vector::*;
pub use matrix::*;
pub use bounds::*;
pub use frustum::*;

/// Common math constants
pub mod consts {
    pub const PI: f32 = core::f32::consts::PI;
    pub const FRAC_PI_2: f32 = PI / 2.0;
    pub const DEG_TO_RAD: f32 = PI / 180.0;
    pub const EPSILON: f32 = 1e-6;
}

/// Convert degrees to radians
#[inline]
pub fn radians(degrees: f32) -> f32 {
    degrees * consts::DEG_TO_RAD
}

/// Linear interpolation
#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

pub mod prelude {
    pub use crate::vector::{Vec3, Vec4};
    pub use crate::matrix::Mat4;
    pub use crate::bounds::AABB;
    pub use crate::frustum::{Plane, FrustumPlanes, FrustumTestResult};
    pub use crate::{radians, lerp};
}
