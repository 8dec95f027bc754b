//! Index synthesis
//!
//! Quads and thick lines have no native backend topology; they are drawn as
//! triangle lists with generated indices.

use super::topology::{PrimitiveTopology, VertexLayout};
use crate::error::{RenderError, Result};
use void_math::Vec3;

/// Indices drawing `vertex_count` vertices starting at `base_vertex`.
///
/// Quads emit `[0,1,2, 2,3,0]` per 4 vertices, expanded thick lines emit
/// `[0,1,2, 3,2,1]` per 4 vertices, every other topology is drawn in order.
/// Trailing vertices that do not complete a primitive are not indexed.
pub fn generate_indices(topology: PrimitiveTopology, vertex_count: u32, base_vertex: u32) -> Vec<u32> {
    let pattern: &[u32] = match topology {
        PrimitiveTopology::Quads => &[0, 1, 2, 2, 3, 0],
        PrimitiveTopology::ThickLines => &[0, 1, 2, 3, 2, 1],
        _ => return (base_vertex..base_vertex + vertex_count).collect(),
    };

    let groups = vertex_count / 4;
    let mut indices = Vec::with_capacity(groups as usize * pattern.len());
    for group in 0..groups {
        let base = base_vertex + group * 4;
        indices.extend(pattern.iter().map(|i| base + i));
    }
    indices
}

#[inline]
pub(crate) fn read_position(vertex: &[u8], offset: usize) -> Vec3 {
    Vec3::from_array(bytemuck::pod_read_unaligned(&vertex[offset..offset + 12]))
}

#[inline]
pub(crate) fn write_position(vertex: &mut [u8], offset: usize, position: Vec3) {
    let packed = position.to_array();
    vertex[offset..offset + 12].copy_from_slice(bytemuck::bytes_of(&packed));
}

/// Expand 2-vertex lines into 4-vertex quads of the given width.
///
/// Each line `a -> b` becomes `a+n, a-n, b+n, b-n` where `n` is perpendicular
/// to the line in the XY plane with length `width / 2`. Other attributes are
/// copied from the line endpoints. A trailing unpaired vertex is dropped.
pub fn expand_thick_lines(vertices: &[u8], layout: &VertexLayout, width: f32) -> Result<Vec<u8>> {
    let stride = layout.stride();
    if stride == 0 || vertices.len() % stride != 0 {
        return Err(RenderError::InvalidGeometry(format!(
            "{} bytes is not a whole number of {}-byte vertices",
            vertices.len(),
            stride
        )));
    }
    let position = layout.position_offset().ok_or_else(|| {
        RenderError::InvalidGeometry("thick lines need a vec3 position attribute".into())
    })?;

    let half = width * 0.5;
    let lines = vertices.len() / stride / 2;
    let mut out = Vec::with_capacity(lines * 4 * stride);

    for line in vertices.chunks_exact(stride * 2) {
        let (a, b) = line.split_at(stride);
        let pa = read_position(a, position);
        let pb = read_position(b, position);

        let d = pb - pa;
        let normal = Vec3::new(-d.y, d.x, 0.0);
        let offset = if normal.length_squared() > f32::EPSILON * f32::EPSILON {
            normal.normalize() * half
        } else {
            Vec3::ZERO
        };

        for (source, p, sign) in [(a, pa, 1.0f32), (a, pa, -1.0), (b, pb, 1.0), (b, pb, -1.0)] {
            let start = out.len();
            out.extend_from_slice(source);
            write_position(&mut out[start..], position, p + offset * sign);
        }
    }

    Ok(out)
}
