//! Back-to-front primitive sorting
//!
//! Translucent geometry is drawn farthest first. Each primitive's centroid
//! (mean of its vertex positions) is scored by a [`SortStrategy`]; primitives
//! are stably reordered by descending score and re-emitted in place.

use super::index::read_position;
use super::topology::{PrimitiveTopology, VertexLayout};
use void_math::Vec3;

/// Scores a primitive centroid; larger scores draw first
pub trait SortStrategy {
    fn score(&self, centroid: Vec3) -> f32;
}

/// Squared distance to a point (usually the camera)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DistanceToPoint {
    pub point: Vec3,
}

impl SortStrategy for DistanceToPoint {
    fn score(&self, c: Vec3) -> f32 {
        c.distance_squared(self.point)
    }
}

/// Signed depth along a view axis
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DepthAlongAxis {
    pub origin: Vec3,
    /// View direction; need not be normalized
    pub axis: Vec3,
}

impl SortStrategy for DepthAlongAxis {
    fn score(&self, c: Vec3) -> f32 {
        (c - self.origin).dot(self.axis)
    }
}

fn centroid<'v>(vertices: impl Iterator<Item = &'v [u8]>, position: usize) -> Vec3 {
    let mut sum = Vec3::ZERO;
    let mut count = 0.0f32;
    for v in vertices {
        sum += read_position(v, position);
        count += 1.0;
    }
    if count == 0.0 {
        return sum;
    }
    sum / count
}

/// Stable order of primitive indices by descending score
fn descending_order(scores: &[f32]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
    order
}

/// Sort the primitives of non-indexed vertex data in place.
///
/// `vertices` holds uploaded vertices (thick lines already expanded). No-op
/// for connected topologies, layouts without a vec3 position and data with
/// fewer than two primitives. Returns the number of primitives sorted.
pub fn sort_primitives(
    vertices: &mut [u8],
    layout: &VertexLayout,
    topology: PrimitiveTopology,
    strategy: &dyn SortStrategy,
) -> usize {
    let Some(position) = layout.position_offset() else {
        return 0;
    };
    if !topology.supports_sorting() {
        return 0;
    }

    let stride = layout.stride();
    let primitive_size = stride * topology.uploaded_vertices_per_primitive();
    if primitive_size == 0 {
        return 0;
    }
    let primitives = vertices.len() / primitive_size;
    if primitives < 2 {
        return 0;
    }

    let sorted_len = primitives * primitive_size;
    let scores: Vec<f32> = vertices[..sorted_len]
        .chunks_exact(primitive_size)
        .map(|p| strategy.score(centroid(p.chunks_exact(stride), position)))
        .collect();

    let order = descending_order(&scores);
    let mut reordered = Vec::with_capacity(sorted_len);
    for &p in &order {
        reordered.extend_from_slice(&vertices[p * primitive_size..(p + 1) * primitive_size]);
    }
    vertices[..sorted_len].copy_from_slice(&reordered);
    primitives
}

/// Sort the triangles of an explicit index list in place. Vertices are left
/// untouched; `indices` are relative to the start of `vertices`.
pub fn sort_indexed_triangles(
    vertices: &[u8],
    indices: &mut [u32],
    layout: &VertexLayout,
    strategy: &dyn SortStrategy,
) -> usize {
    let Some(position) = layout.position_offset() else {
        return 0;
    };
    let stride = layout.stride();
    if stride == 0 {
        return 0;
    }
    let vertex_count = vertices.len() / stride;
    let triangles = indices.len() / 3;
    if triangles < 2 || indices.iter().any(|&i| i as usize >= vertex_count) {
        return 0;
    }

    let scores: Vec<f32> = indices[..triangles * 3]
        .chunks_exact(3)
        .map(|t| {
            let corners = t.iter().map(|&i| {
                let start = i as usize * stride;
                &vertices[start..start + stride]
            });
            strategy.score(centroid(corners, position))
        })
        .collect();

    let order = descending_order(&scores);
    let reordered: Vec<u32> = order
        .iter()
        .flat_map(|&t| indices[t * 3..t * 3 + 3].iter().copied())
        .collect();
    indices[..triangles * 3].copy_from_slice(&reordered);
    triangles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::test_vertex;

    fn triangle_at(z: f32, color: u32) -> Vec<u8> {
        let mut out = Vec::new();
        for p in [[0.0, 0.0, z], [1.0, 0.0, z], [0.0, 1.0, z]] {
            out.extend_from_slice(&test_vertex(p, color));
        }
        out
    }

    fn colors(vertices: &[u8], per: usize) -> Vec<u32> {
        vertices
            .chunks_exact(16 * per)
            .map(|p| bytemuck::pod_read_unaligned(&p[12..16]))
            .collect()
    }

    #[test]
    fn test_sorts_far_to_near() {
        let layout = VertexLayout::position_color();
        let mut vertices = Vec::new();
        vertices.extend(triangle_at(-1.0, 1));
        vertices.extend(triangle_at(-5.0, 2));
        vertices.extend(triangle_at(-3.0, 3));

        let camera = DistanceToPoint { point: Vec3::ZERO };
        let sorted = sort_primitives(&mut vertices, &layout, PrimitiveTopology::Triangles, &camera);
        assert_eq!(sorted, 3);
        assert_eq!(colors(&vertices, 3), vec![2, 3, 1]);
    }

    #[test]
    fn test_sort_is_stable() {
        let layout = VertexLayout::position_color();
        let mut vertices = Vec::new();
        for color in 1..=4 {
            vertices.extend(triangle_at(-2.0, color));
        }
        let camera = DistanceToPoint { point: Vec3::ZERO };
        sort_primitives(&mut vertices, &layout, PrimitiveTopology::Triangles, &camera);
        assert_eq!(colors(&vertices, 3), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_connected_topology_untouched() {
        let layout = VertexLayout::position_color();
        let mut vertices = Vec::new();
        vertices.extend(triangle_at(-1.0, 1));
        vertices.extend(triangle_at(-5.0, 2));
        let before = vertices.clone();

        let camera = DistanceToPoint { point: Vec3::ZERO };
        assert_eq!(sort_primitives(&mut vertices, &layout, PrimitiveTopology::TriangleStrip, &camera), 0);
        assert_eq!(vertices, before);
    }

    #[test]
    fn test_empty_input() {
        let layout = VertexLayout::position_color();
        let camera = DistanceToPoint { point: Vec3::ZERO };
        assert_eq!(sort_primitives(&mut [], &layout, PrimitiveTopology::Quads, &camera), 0);
    }

    #[test]
    fn test_depth_along_axis() {
        let layout = VertexLayout::position_color();
        let mut vertices = Vec::new();
        vertices.extend(triangle_at(-1.0, 1));
        vertices.extend(triangle_at(-5.0, 2));

        let view = DepthAlongAxis { origin: Vec3::ZERO, axis: Vec3::NEG_Z };
        sort_primitives(&mut vertices, &layout, PrimitiveTopology::Triangles, &view);
        assert_eq!(colors(&vertices, 3), vec![2, 1]);
    }

    #[test]
    fn test_sort_indexed_triangles() {
        let layout = VertexLayout::position_color();
        let mut vertices = Vec::new();
        vertices.extend(triangle_at(-1.0, 1));
        vertices.extend(triangle_at(-5.0, 2));
        let mut indices = vec![0, 1, 2, 3, 4, 5];

        let camera = DistanceToPoint { point: Vec3::ZERO };
        assert_eq!(sort_indexed_triangles(&vertices, &mut indices, &layout, &camera), 2);
        assert_eq!(indices, vec![3, 4, 5, 0, 1, 2]);
    }
}
