//! Spatial Acceleration Structures
//!
//! The dynamic BVH used by tree-backed stage containers for visibility
//! queries. Bounding boxes and frustums come from `void_math`.

pub mod bvh;

pub use bvh::{Bvh, BvhStats};
pub use void_math::{FrustumPlanes, FrustumTestResult, Mat4, Plane, Vec3, AABB};

/// Axis-aligned box frustum covering `[-extent, extent]` on every axis
#[cfg(test)]
pub(crate) fn box_frustum(extent: f32) -> FrustumPlanes {
    FrustumPlanes::from_planes([
        Plane::new(Vec3::X, extent),
        Plane::new(Vec3::NEG_X, extent),
        Plane::new(Vec3::Y, extent),
        Plane::new(Vec3::NEG_Y, extent),
        Plane::new(Vec3::Z, extent),
        Plane::new(Vec3::NEG_Z, extent),
    ])
}
