//! Geometry Builder
//!
//! Accumulates the vertex (and index) data of one batch into a single
//! stream. Each `flush` closes a [`DrawRange`] covering what was pushed since
//! the previous flush; the running base vertex carries across flushes so
//! indices stay absolute within the stream.

use super::index::{expand_thick_lines, generate_indices};
use super::sort::{sort_indexed_triangles, sort_primitives, SortStrategy};
use super::topology::{PrimitiveTopology, VertexLayout};
use crate::error::{RenderError, Result};

/// Default thick line width in world units
pub const DEFAULT_THICK_LINE_WIDTH: f32 = 1.0;

/// Part of the stream drawn by one command
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrawRange {
    pub first_vertex: u32,
    pub vertex_count: u32,
    pub first_index: u32,
    pub index_count: u32,
}

/// Finished stream
#[derive(Clone, Debug, Default)]
pub struct BuiltGeometry {
    pub vertices: Vec<u8>,
    /// Present when the stream is indexed
    pub indices: Option<Vec<u32>>,
    pub ranges: Vec<DrawRange>,
}

impl BuiltGeometry {
    pub fn vertex_count(&self, layout: &VertexLayout) -> usize {
        self.vertices.len() / layout.stride().max(1)
    }

    pub fn index_bytes(&self) -> Option<&[u8]> {
        self.indices.as_deref().map(|i| bytemuck::cast_slice(i))
    }
}

/// Builds one vertex stream for a topology
#[derive(Debug)]
pub struct GeometryBuilder {
    layout: VertexLayout,
    topology: PrimitiveTopology,
    indexed: bool,
    line_width: f32,
    vertices: Vec<u8>,
    indices: Vec<u32>,
    base_vertex: u32,
    pending_vertex: u32,
    pending_index: usize,
    ranges: Vec<DrawRange>,
}

impl GeometryBuilder {
    /// Builder for a topology. Quads and thick lines are always indexed.
    pub fn new(layout: VertexLayout, topology: PrimitiveTopology) -> Self {
        Self {
            indexed: topology.needs_index_synthesis(),
            layout,
            topology,
            line_width: DEFAULT_THICK_LINE_WIDTH,
            vertices: Vec::new(),
            indices: Vec::new(),
            base_vertex: 0,
            pending_vertex: 0,
            pending_index: 0,
            ranges: Vec::new(),
        }
    }

    /// Emit indices even for natively drawable topologies (needed when any
    /// instance supplies explicit indices). Must be set before pushing.
    pub fn indexed(mut self, indexed: bool) -> Self {
        self.indexed = indexed || self.topology.needs_index_synthesis();
        self
    }

    pub fn with_line_width(mut self, width: f32) -> Self {
        self.line_width = width;
        self
    }

    fn check_stride(&self, bytes: &[u8]) -> Result<u32> {
        let stride = self.layout.stride();
        if stride == 0 || bytes.len() % stride != 0 {
            return Err(RenderError::InvalidGeometry(format!(
                "{} bytes is not a whole number of {}-byte vertices",
                bytes.len(),
                stride
            )));
        }
        Ok((bytes.len() / stride) as u32)
    }

    /// Append vertices drawn in order. Returns the number of vertices added
    /// to the stream.
    pub fn push_vertices(&mut self, bytes: &[u8]) -> Result<u32> {
        self.check_stride(bytes)?;

        let expanded;
        let bytes = if self.topology == PrimitiveTopology::ThickLines {
            expanded = expand_thick_lines(bytes, &self.layout, self.line_width)?;
            &expanded[..]
        } else {
            bytes
        };
        let count = self.check_stride(bytes)?;

        if self.indexed {
            self.indices
                .extend(generate_indices(self.topology, count, self.base_vertex));
        }
        self.vertices.extend_from_slice(bytes);
        self.base_vertex += count;
        Ok(count)
    }

    /// Append vertices with explicit triangle-list indices relative to the
    /// first of them
    pub fn push_indexed(&mut self, bytes: &[u8], indices: &[u32]) -> Result<u32> {
        if !self.indexed || self.topology.needs_index_synthesis() {
            return Err(RenderError::InvalidGeometry(format!(
                "explicit indices are not supported for a non-indexed {:?} stream",
                self.topology
            )));
        }
        let count = self.check_stride(bytes)?;
        if let Some(&bad) = indices.iter().find(|&&i| i >= count) {
            return Err(RenderError::InvalidGeometry(format!(
                "index {} out of range for {} vertices",
                bad, count
            )));
        }

        let base = self.base_vertex;
        self.indices.extend(indices.iter().map(|i| i + base));
        self.vertices.extend_from_slice(bytes);
        self.base_vertex += count;
        Ok(count)
    }

    /// Sort the primitives pushed since the last flush back to front.
    /// Returns the number of primitives reordered.
    pub fn sort_pending(&mut self, strategy: &dyn SortStrategy) -> usize {
        let stride = self.layout.stride();
        let start = self.pending_vertex as usize * stride;

        if !self.indexed || self.topology.needs_index_synthesis() {
            // Synthesized indices repeat per primitive, so reordering whole
            // primitives keeps them valid.
            return sort_primitives(
                &mut self.vertices[start..],
                &self.layout,
                self.topology,
                strategy,
            );
        }

        if self.topology != PrimitiveTopology::Triangles {
            return 0;
        }
        sort_indexed_triangles(
            &self.vertices,
            &mut self.indices[self.pending_index..],
            &self.layout,
            strategy,
        )
    }

    /// Close the range pushed since the previous flush
    pub fn flush(&mut self) -> Option<DrawRange> {
        let range = DrawRange {
            first_vertex: self.pending_vertex,
            vertex_count: self.base_vertex - self.pending_vertex,
            first_index: self.pending_index as u32,
            index_count: (self.indices.len() - self.pending_index) as u32,
        };
        self.pending_vertex = self.base_vertex;
        self.pending_index = self.indices.len();

        if range.vertex_count == 0 {
            return None;
        }
        self.ranges.push(range);
        Some(range)
    }

    /// Flush the remainder and return the stream
    pub fn finish(mut self) -> BuiltGeometry {
        self.flush();
        BuiltGeometry {
            vertices: self.vertices,
            indices: self.indexed.then_some(self.indices),
            ranges: self.ranges,
        }
    }

    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    /// Vertices in the stream so far
    pub fn vertex_count(&self) -> u32 {
        self.base_vertex
    }

    pub fn is_empty(&self) -> bool {
        self.base_vertex == 0
    }

    pub fn layout(&self) -> &VertexLayout {
        &self.layout
    }

    pub fn topology(&self) -> PrimitiveTopology {
        self.topology
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::sort::DistanceToPoint;
    use crate::geometry::test_vertex;

    fn quad(z: f32, color: u32) -> Vec<u8> {
        let mut out = Vec::new();
        for p in [[0.0, 0.0, z], [1.0, 0.0, z], [1.0, 1.0, z], [0.0, 1.0, z]] {
            out.extend_from_slice(&test_vertex(p, color));
        }
        out
    }

    #[test]
    fn test_two_quads() {
        let mut builder = GeometryBuilder::new(VertexLayout::position_color(), PrimitiveTopology::Quads);
        let mut vertices = quad(0.0, 1);
        vertices.extend(quad(0.0, 2));
        assert_eq!(builder.push_vertices(&vertices).unwrap(), 8);

        let built = builder.finish();
        assert_eq!(
            built.indices.unwrap(),
            vec![0, 1, 2, 2, 3, 0, 4, 5, 6, 6, 7, 4]
        );
        assert_eq!(built.ranges.len(), 1);
        assert_eq!(built.ranges[0].index_count, 12);
    }

    #[test]
    fn test_base_vertex_persists_across_flush() {
        let mut builder = GeometryBuilder::new(VertexLayout::position_color(), PrimitiveTopology::Quads);
        builder.push_vertices(&quad(0.0, 1)).unwrap();
        let first = builder.flush().unwrap();
        builder.push_vertices(&quad(0.0, 2)).unwrap();
        let second = builder.flush().unwrap();

        assert_eq!(first, DrawRange { first_vertex: 0, vertex_count: 4, first_index: 0, index_count: 6 });
        assert_eq!(second, DrawRange { first_vertex: 4, vertex_count: 4, first_index: 6, index_count: 6 });

        let built = builder.finish();
        assert_eq!(&built.indices.unwrap()[6..], &[4, 5, 6, 6, 7, 4]);
        assert_eq!(built.ranges.len(), 2);
    }

    #[test]
    fn test_empty_flush() {
        let mut builder = GeometryBuilder::new(VertexLayout::position_color(), PrimitiveTopology::Triangles);
        assert!(builder.flush().is_none());
        let built = builder.finish();
        assert!(built.indices.is_none());
        assert!(built.ranges.is_empty());
    }

    #[test]
    fn test_thick_lines_expand() {
        let mut builder = GeometryBuilder::new(VertexLayout::position_color(), PrimitiveTopology::ThickLines)
            .with_line_width(0.5);
        let mut line = test_vertex([0.0, 0.0, 0.0], 0).to_vec();
        line.extend_from_slice(&test_vertex([1.0, 0.0, 0.0], 0));

        assert_eq!(builder.push_vertices(&line).unwrap(), 4);
        let built = builder.finish();
        assert_eq!(built.indices.unwrap(), vec![0, 1, 2, 3, 2, 1]);
    }

    #[test]
    fn test_explicit_indices_offset() {
        let mut builder = GeometryBuilder::new(VertexLayout::position_color(), PrimitiveTopology::Triangles)
            .indexed(true);
        let tri: Vec<u8> = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]
            .iter()
            .flat_map(|&p| test_vertex(p, 0))
            .collect();

        builder.push_indexed(&tri, &[0, 1, 2]).unwrap();
        builder.push_indexed(&tri, &[2, 1, 0]).unwrap();
        assert!(builder.push_indexed(&tri, &[0, 1, 3]).is_err());

        let built = builder.finish();
        assert_eq!(built.indices.unwrap(), vec![0, 1, 2, 5, 4, 3]);
    }

    #[test]
    fn test_sort_pending_only_touches_pending() {
        let mut builder = GeometryBuilder::new(VertexLayout::position_color(), PrimitiveTopology::Quads);
        builder.push_vertices(&quad(-1.0, 1)).unwrap();
        builder.push_vertices(&quad(-9.0, 2)).unwrap();
        builder.flush();

        builder.push_vertices(&quad(-1.0, 3)).unwrap();
        builder.push_vertices(&quad(-9.0, 4)).unwrap();
        let camera = DistanceToPoint { point: void_math::Vec3::ZERO };
        assert_eq!(builder.sort_pending(&camera), 2);

        let built = builder.finish();
        let colors: Vec<u32> = built
            .vertices
            .chunks_exact(64)
            .map(|q| bytemuck::pod_read_unaligned(&q[12..16]))
            .collect();
        assert_eq!(colors, vec![1, 2, 4, 3]);
    }

    #[test]
    fn test_rejects_partial_vertex() {
        let mut builder = GeometryBuilder::new(VertexLayout::position_color(), PrimitiveTopology::Triangles);
        assert!(matches!(builder.push_vertices(&[0u8; 10]), Err(RenderError::InvalidGeometry(_))));
    }
}
