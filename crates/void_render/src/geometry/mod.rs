//! Geometry preparation
//!
//! Turns per-instance vertex data into uploaded streams: index synthesis for
//! quads and thick lines, optional back-to-front sorting, and transient
//! buffer reservation.

pub mod builder;
pub mod index;
pub mod sort;
pub mod topology;
pub mod transient;

pub use builder::{BuiltGeometry, DrawRange, GeometryBuilder};
pub use index::{expand_thick_lines, generate_indices};
pub use sort::{sort_indexed_triangles, sort_primitives, DepthAlongAxis, DistanceToPoint, SortStrategy};
pub use topology::{AttributeUsage, PrimitiveTopology, VertexAttribute, VertexFormat, VertexLayout};
pub use transient::{TransientBuffer, TransientGeometry, TransientStats};

/// One `position_color` vertex
#[cfg(test)]
pub(crate) fn test_vertex(position: [f32; 3], color: u32) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[..12].copy_from_slice(bytemuck::bytes_of(&position));
    out[12..].copy_from_slice(&color.to_ne_bytes());
    out
}
