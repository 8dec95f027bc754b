//! Transient geometry buffers
//!
//! Per-frame GPU buffers filled through lock-free offset reservation. A
//! failed reservation drops that geometry for the frame and records the size
//! that would have fit, so the buffer can grow before the next frame.

use std::sync::Arc;
use serde::{Deserialize, Serialize};
use void_memory::TransientAllocator;

use crate::batch::{BufferHandle, BufferKind, BufferSlice, RenderCommand};
use crate::config::RenderConfig;
use crate::error::{RenderError, Result};

/// One transient backing buffer
#[derive(Debug)]
pub struct TransientBuffer {
    name: &'static str,
    handle: BufferHandle,
    kind: BufferKind,
    allocator: TransientAllocator,
    alignment: usize,
}

impl TransientBuffer {
    pub fn new(name: &'static str, handle: BufferHandle, kind: BufferKind, capacity: usize, alignment: usize) -> Self {
        Self {
            name,
            handle,
            kind,
            allocator: TransientAllocator::new(capacity),
            alignment,
        }
    }

    /// Reserve space for `data` and build its upload command
    pub fn upload(&self, data: Arc<[u8]>) -> Result<(BufferSlice, RenderCommand)> {
        let range = self
            .allocator
            .allocate(data.len(), self.alignment)
            .ok_or_else(|| RenderError::TransientOverflow {
                buffer: self.name,
                requested: data.len(),
                available: self.allocator.available(),
            })?;

        let slice = BufferSlice {
            buffer: self.handle,
            offset: range.offset as u64,
            size: range.size as u64,
        };
        let command = RenderCommand::UploadBuffer {
            buffer: self.handle,
            kind: self.kind,
            offset: slice.offset,
            data,
        };
        Ok((slice, command))
    }

    /// Grow to fit this frame's demand. Returns true if resized.
    pub fn grow(&mut self) -> bool {
        if !self.allocator.overflowed() {
            return false;
        }
        let required = self.allocator.required_capacity();
        let capacity = required.checked_next_power_of_two().unwrap_or(required);
        log::info!(
            "Growing transient {} buffer from {} to {} bytes",
            self.name,
            self.allocator.capacity(),
            capacity
        );
        self.allocator.resize(capacity);
        true
    }

    pub fn reset(&mut self) {
        self.allocator.reset();
    }

    pub fn resize(&mut self, capacity: usize) {
        self.allocator.resize(capacity);
    }

    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    pub fn capacity(&self) -> usize {
        self.allocator.capacity()
    }

    pub fn used(&self) -> usize {
        self.allocator.used()
    }

    pub fn overflow_count(&self) -> u32 {
        self.allocator.overflow_count()
    }
}

/// Buffer usage for one frame
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TransientStats {
    pub vertex_bytes: usize,
    pub index_bytes: usize,
    pub instance_bytes: usize,
    pub indirect_bytes: usize,
    /// Failed reservations across all buffers
    pub overflows: u32,
}

/// The transient buffers used by the built-in flows
#[derive(Debug)]
pub struct TransientGeometry {
    pub vertex: TransientBuffer,
    pub index: TransientBuffer,
    pub instance: TransientBuffer,
    pub indirect: TransientBuffer,
}

impl TransientGeometry {
    /// Buffers sized from the configuration, with handles 1 to 4
    pub fn new(config: &RenderConfig) -> Self {
        let align = config.buffer_alignment;
        Self {
            vertex: TransientBuffer::new("vertex", BufferHandle(1), BufferKind::Vertex, config.vertex_buffer_kb * 1024, align),
            index: TransientBuffer::new("index", BufferHandle(2), BufferKind::Index, config.index_buffer_kb * 1024, align),
            instance: TransientBuffer::new("instance", BufferHandle(3), BufferKind::Instance, config.instance_buffer_kb * 1024, align),
            indirect: TransientBuffer::new("indirect", BufferHandle(4), BufferKind::Indirect, config.indirect_buffer_kb * 1024, align),
        }
    }

    fn buffers_mut(&mut self) -> [&mut TransientBuffer; 4] {
        [&mut self.vertex, &mut self.index, &mut self.instance, &mut self.indirect]
    }

    /// Rewind every buffer for a new frame
    pub fn begin_frame(&mut self) {
        for buffer in self.buffers_mut() {
            buffer.reset();
        }
    }

    /// Grow buffers that overflowed this frame. Call before `begin_frame`.
    pub fn grow_for_next_frame(&mut self) -> bool {
        let mut grew = false;
        for buffer in self.buffers_mut() {
            grew |= buffer.grow();
        }
        grew
    }

    /// Resize to the configured capacities. Only valid between frames.
    pub fn resize(&mut self, config: &RenderConfig) {
        self.vertex.resize(config.vertex_buffer_kb * 1024);
        self.index.resize(config.index_buffer_kb * 1024);
        self.instance.resize(config.instance_buffer_kb * 1024);
        self.indirect.resize(config.indirect_buffer_kb * 1024);
    }

    pub fn stats(&self) -> TransientStats {
        TransientStats {
            vertex_bytes: self.vertex.used(),
            index_bytes: self.index.used(),
            instance_bytes: self.instance.used(),
            indirect_bytes: self.indirect.used(),
            overflows: self.vertex.overflow_count()
                + self.index.overflow_count()
                + self.instance.overflow_count()
                + self.indirect.overflow_count(),
        }
    }
}
