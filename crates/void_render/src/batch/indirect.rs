//! Indirect draw arguments
//!
//! Argument records match the layout GPUs read for indirect draws, so the
//! packed bytes can be uploaded unchanged.

use bytemuck::{Pod, Zeroable};

/// Arguments of a non-indexed indirect draw
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawIndirectArgs {
    pub vertex_count: u32,
    pub instance_count: u32,
    pub first_vertex: u32,
    pub first_instance: u32,
}

/// Arguments of an indexed indirect draw
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawIndexedIndirectArgs {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub first_instance: u32,
}

/// Packs the argument records of one indirect draw.
///
/// A buffer holds either indexed or non-indexed records, fixed by the first
/// push after a reset.
#[derive(Clone, Debug, Default)]
pub struct IndirectCommandBuffer {
    draws: Vec<DrawIndirectArgs>,
    indexed: Vec<DrawIndexedIndirectArgs>,
}

impl IndirectCommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a non-indexed record. Returns false when the buffer already
    /// holds indexed records.
    pub fn push_draw(&mut self, args: DrawIndirectArgs) -> bool {
        if !self.indexed.is_empty() {
            return false;
        }
        self.draws.push(args);
        true
    }

    /// Append an indexed record. Returns false when the buffer already holds
    /// non-indexed records.
    pub fn push_indexed(&mut self, args: DrawIndexedIndirectArgs) -> bool {
        if !self.draws.is_empty() {
            return false;
        }
        self.indexed.push(args);
        true
    }

    pub fn is_indexed(&self) -> bool {
        !self.indexed.is_empty()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.draws.len() + self.indexed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Packed record bytes
    pub fn as_bytes(&self) -> &[u8] {
        if self.is_indexed() {
            bytemuck::cast_slice(&self.indexed)
        } else {
            bytemuck::cast_slice(&self.draws)
        }
    }

    pub fn reset(&mut self) {
        self.draws.clear();
        self.indexed.clear();
    }
}
