//! Primitive topologies and vertex layouts

use serde::{Deserialize, Serialize};

/// How vertices form primitives
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveTopology {
    Points,
    Lines,
    LineStrip,
    #[default]
    Triangles,
    TriangleStrip,
    TriangleFan,
    /// Four vertices per quad, drawn as two triangles
    Quads,
    /// Two vertices per line, expanded to a quad of configurable width
    ThickLines,
}

impl PrimitiveTopology {
    /// Vertices per primitive as supplied by instances
    pub fn vertices_per_primitive(self) -> usize {
        match self {
            Self::Points => 1,
            Self::Lines | Self::LineStrip | Self::ThickLines => 2,
            Self::Triangles | Self::TriangleStrip | Self::TriangleFan => 3,
            Self::Quads => 4,
        }
    }

    /// Vertices per primitive once uploaded (thick lines become quads)
    pub fn uploaded_vertices_per_primitive(self) -> usize {
        match self {
            Self::ThickLines => 4,
            other => other.vertices_per_primitive(),
        }
    }

    /// Whether primitives share vertices with their neighbours
    pub fn is_connected(self) -> bool {
        matches!(self, Self::LineStrip | Self::TriangleStrip | Self::TriangleFan)
    }

    /// Whether `vertex_count` supplied vertices form whole primitives.
    /// Connected topologies accept any count.
    pub fn is_whole(self, vertex_count: usize) -> bool {
        self.is_connected() || vertex_count % self.vertices_per_primitive() == 0
    }

    /// Whether primitives can be reordered independently
    pub fn supports_sorting(self) -> bool {
        !self.is_connected()
    }

    /// Whether the backend cannot draw this topology without generated
    /// indices
    pub fn needs_index_synthesis(self) -> bool {
        matches!(self, Self::Quads | Self::ThickLines)
    }

    /// Indices generated per primitive, for synthesized topologies
    pub fn indices_per_primitive(self) -> usize {
        if self.needs_index_synthesis() {
            6
        } else {
            self.vertices_per_primitive()
        }
    }

    /// Topology the backend actually draws
    pub fn backend_topology(self) -> Self {
        match self {
            Self::Quads | Self::ThickLines => Self::Triangles,
            other => other,
        }
    }

    /// Number of whole primitives in `vertex_count` uploaded vertices
    pub fn primitive_count(self, vertex_count: usize) -> usize {
        let per = self.uploaded_vertices_per_primitive();
        match self {
            Self::LineStrip => vertex_count.saturating_sub(1),
            Self::TriangleStrip | Self::TriangleFan => vertex_count.saturating_sub(2),
            _ => vertex_count / per,
        }
    }
}

/// Data type of a vertex attribute
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VertexFormat {
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
    Unorm8x4,
    Uint32,
}

impl VertexFormat {
    pub fn size(self) -> u32 {
        match self {
            Self::Float32 | Self::Unorm8x4 | Self::Uint32 => 4,
            Self::Float32x2 => 8,
            Self::Float32x3 => 12,
            Self::Float32x4 => 16,
        }
    }
}

/// Meaning of a vertex attribute
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeUsage {
    Position,
    Color,
    Normal,
    TexCoord,
    Custom(u8),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VertexAttribute {
    pub usage: AttributeUsage,
    pub format: VertexFormat,
    /// Byte offset within a vertex
    pub offset: u32,
}

/// Interleaved vertex layout
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VertexLayout {
    /// Bytes per vertex
    pub stride: u32,
    pub attributes: Vec<VertexAttribute>,
}

impl VertexLayout {
    /// Layout with tightly packed attributes in the given order
    pub fn packed(attributes: &[(AttributeUsage, VertexFormat)]) -> Self {
        let mut offset = 0;
        let attributes = attributes
            .iter()
            .map(|&(usage, format)| {
                let attribute = VertexAttribute { usage, format, offset };
                offset += format.size();
                attribute
            })
            .collect();
        Self {
            stride: offset,
            attributes,
        }
    }

    /// `vec3` position followed by a packed RGBA color (16 bytes)
    pub fn position_color() -> Self {
        Self::packed(&[
            (AttributeUsage::Position, VertexFormat::Float32x3),
            (AttributeUsage::Color, VertexFormat::Unorm8x4),
        ])
    }

    /// `vec3` position, `vec2` texture coordinate, packed color (24 bytes)
    pub fn position_tex_color() -> Self {
        Self::packed(&[
            (AttributeUsage::Position, VertexFormat::Float32x3),
            (AttributeUsage::TexCoord, VertexFormat::Float32x2),
            (AttributeUsage::Color, VertexFormat::Unorm8x4),
        ])
    }

    pub fn attribute(&self, usage: AttributeUsage) -> Option<&VertexAttribute> {
        self.attributes.iter().find(|a| a.usage == usage)
    }

    /// Offset of a 3-component float position, if the layout has one
    pub fn position_offset(&self) -> Option<usize> {
        self.attribute(AttributeUsage::Position)
            .filter(|a| a.format == VertexFormat::Float32x3)
            .map(|a| a.offset as usize)
    }

    /// Bytes per vertex
    #[inline]
    pub fn stride(&self) -> usize {
        self.stride as usize
    }
}
