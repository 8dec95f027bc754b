//! Frustum culling types

use crate::bounds::AABB;
use crate::matrix::Mat4;
use crate::vector::Vec3;

/// Plane in 3D space (normal . p + distance = 0)
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Plane {
    /// Plane normal (unit vector), pointing into the kept side
    pub normal: Vec3,
    /// Distance from origin along normal
    pub distance: f32,
}

impl Plane {
    /// Plane from an unnormalized equation. A degenerate normal gives a plane
    /// that keeps everything.
    #[inline]
    pub fn new(normal: Vec3, distance: f32) -> Self {
        let len = normal.length();
        if len > 1e-10 {
            Self {
                normal: normal / len,
                distance: distance / len,
            }
        } else {
            Self {
                normal: Vec3::Y,
                distance: f32::MAX,
            }
        }
    }

    /// Create a plane from a point on the plane and its normal
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        let normal = normal.normalize();
        Self {
            normal,
            distance: -normal.dot(point),
        }
    }

    /// Signed distance from a point to the plane; positive in front
    #[inline]
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }
}

/// Result of frustum containment test
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FrustumTestResult {
    /// Object is completely inside the frustum
    Inside,
    /// Object is completely outside the frustum
    Outside,
    /// Object intersects the frustum boundary
    Intersecting,
}

impl FrustumTestResult {
    /// Check if the object is at least partially visible
    #[inline]
    pub fn is_visible(&self) -> bool {
        *self != FrustumTestResult::Outside
    }

    /// Check if the object is completely inside
    #[inline]
    pub fn is_inside(&self) -> bool {
        *self == FrustumTestResult::Inside
    }
}

/// View frustum as six inward-facing planes: left, right, bottom, top,
/// near, far
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FrustumPlanes {
    pub planes: [Plane; 6],
}

impl FrustumPlanes {
    pub const LEFT: usize = 0;
    pub const RIGHT: usize = 1;
    pub const BOTTOM: usize = 2;
    pub const TOP: usize = 3;
    pub const NEAR: usize = 4;
    pub const FAR: usize = 5;

    pub fn from_planes(planes: [Plane; 6]) -> Self {
        Self { planes }
    }

    /// Extract frustum planes from a view-projection matrix (Gribb/Hartmann)
    pub fn from_view_projection(vp: &Mat4) -> Self {
        let m = vp.to_array();
        // Row r of a column-major matrix
        let row = |r: usize| [m[r], m[4 + r], m[8 + r], m[12 + r]];
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));
        let plane = |a: [f32; 4], b: [f32; 4], sign: f32| {
            Plane::new(
                Vec3::new(a[0] + sign * b[0], a[1] + sign * b[1], a[2] + sign * b[2]),
                a[3] + sign * b[3],
            )
        };

        Self {
            planes: [
                plane(r3, r0, 1.0),
                plane(r3, r0, -1.0),
                plane(r3, r1, 1.0),
                plane(r3, r1, -1.0),
                plane(r3, r2, 1.0),
                plane(r3, r2, -1.0),
            ],
        }
    }

    /// Test if an AABB is inside, outside, or intersecting the frustum
    pub fn contains_aabb(&self, aabb: &AABB) -> FrustumTestResult {
        let mut result = FrustumTestResult::Inside;

        for plane in &self.planes {
            let toward = [plane.normal.x >= 0.0, plane.normal.y >= 0.0, plane.normal.z >= 0.0];
            // Corner farthest along the normal, and the one nearest
            let p = Vec3::select(toward, aabb.max, aabb.min);
            let n = Vec3::select(toward, aabb.min, aabb.max);

            if plane.distance_to_point(p) < 0.0 {
                return FrustumTestResult::Outside;
            }
            if plane.distance_to_point(n) < 0.0 {
                result = FrustumTestResult::Intersecting;
            }
        }

        result
    }

    /// Test if a point is inside the frustum
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes.iter().all(|plane| plane.distance_to_point(point) >= 0.0)
    }
}
