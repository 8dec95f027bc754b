//! Render Command Abstraction
//!
//! Backend-agnostic commands produced by the batching engine. A backend
//! implements [`CommandSink`] and translates each command to its graphics
//! API; [`CommandList`] records commands for deferred submission and tests.
//!
//! # Command Types
//!
//! - State: `ApplyState`, `BindShader`, `BindTarget`
//! - Data: `UploadBuffer`, `SetUniforms`
//! - Draw: `Draw`, `DrawIndexed`, `DrawInstanced`, `DrawIndirect`
//! - Compute: `Dispatch`, `DispatchIndirect`

use std::sync::Arc;
use serde::{Deserialize, Serialize};
use void_core::Identifier;

use crate::geometry::PrimitiveTopology;
use crate::state::{RenderTargetBinding, ShaderBinding, StateValue};
use crate::uniform::UniformValueSnapshot;

/// Backend buffer handle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BufferHandle(pub u32);

/// What a buffer holds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BufferKind {
    Vertex,
    Index,
    Instance,
    Indirect,
}

/// Byte range of a buffer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferSlice {
    pub buffer: BufferHandle,
    pub offset: u64,
    pub size: u64,
}

/// A command ready for backend submission
#[derive(Clone, Debug, PartialEq)]
pub enum RenderCommand {
    /// Make a state slot value current
    ApplyState {
        slot: Identifier,
        value: StateValue,
    },

    /// Bind a shader program
    BindShader(ShaderBinding),

    /// Bind a render target
    BindTarget(RenderTargetBinding),

    /// Copy bytes into a buffer
    UploadBuffer {
        buffer: BufferHandle,
        kind: BufferKind,
        offset: u64,
        data: Arc<[u8]>,
    },

    /// Push changed uniform values
    SetUniforms(UniformValueSnapshot),

    /// Non-indexed draw
    Draw {
        topology: PrimitiveTopology,
        vertices: BufferSlice,
        first_vertex: u32,
        vertex_count: u32,
    },

    /// Indexed draw; indices are `u32`
    DrawIndexed {
        topology: PrimitiveTopology,
        vertices: BufferSlice,
        indices: BufferSlice,
        first_index: u32,
        index_count: u32,
        base_vertex: i32,
    },

    /// Hardware instanced draw
    DrawInstanced {
        topology: PrimitiveTopology,
        vertices: BufferSlice,
        indices: Option<BufferSlice>,
        instances: BufferSlice,
        /// Vertex count, or index count when `indices` is set
        element_count: u32,
        instance_count: u32,
    },

    /// Draw with arguments read from a GPU buffer
    DrawIndirect {
        topology: PrimitiveTopology,
        vertices: BufferSlice,
        indices: Option<BufferSlice>,
        arguments: BufferSlice,
        draw_count: u32,
    },

    /// Compute dispatch
    Dispatch { groups: [u32; 3] },

    /// Compute dispatch with workgroup counts read from a GPU buffer
    DispatchIndirect { buffer: BufferHandle, offset: u64 },
}

impl RenderCommand {
    /// Whether this command draws geometry
    pub fn is_draw(&self) -> bool {
        matches!(
            self,
            Self::Draw { .. } | Self::DrawIndexed { .. } | Self::DrawInstanced { .. } | Self::DrawIndirect { .. }
        )
    }

    /// Whether this command changes pipeline state or bindings
    pub fn is_state_change(&self) -> bool {
        matches!(self, Self::ApplyState { .. } | Self::BindShader(_) | Self::BindTarget(_))
    }

    /// Instances drawn by this command (0 for non-draws)
    pub fn instance_count(&self) -> u32 {
        match self {
            Self::Draw { .. } | Self::DrawIndexed { .. } => 1,
            Self::DrawInstanced { instance_count, .. } => *instance_count,
            Self::DrawIndirect { draw_count, .. } => *draw_count,
            _ => 0,
        }
    }
}

/// Receives commands in submission order
pub trait CommandSink {
    fn submit(&mut self, command: RenderCommand);

    fn submit_all(&mut self, commands: impl IntoIterator<Item = RenderCommand>)
    where
        Self: Sized,
    {
        for command in commands {
            self.submit(command);
        }
    }
}

/// Recorded command sequence
#[derive(Clone, Debug, Default)]
pub struct CommandList {
    commands: Vec<RenderCommand>,
}

impl CommandList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            commands: Vec::with_capacity(capacity),
        }
    }

    pub fn commands(&self) -> &[RenderCommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Replay every command into another sink
    pub fn replay(&self, sink: &mut dyn CommandSink) {
        for command in &self.commands {
            sink.submit(command.clone());
        }
    }

    pub fn into_commands(self) -> Vec<RenderCommand> {
        self.commands
    }

    pub fn stats(&self) -> DrawStats {
        DrawStats::from_commands(&self.commands)
    }
}

impl CommandSink for CommandList {
    fn submit(&mut self, command: RenderCommand) {
        self.commands.push(command);
    }
}

impl CommandSink for Vec<RenderCommand> {
    fn submit(&mut self, command: RenderCommand) {
        self.push(command);
    }
}

/// Command statistics
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawStats {
    /// Total commands
    pub total_commands: u32,
    /// State slot applications
    pub state_applies: u32,
    /// Shader and target binds
    pub binds: u32,
    /// Buffer uploads
    pub uploads: u32,
    /// Bytes uploaded
    pub upload_bytes: u64,
    /// Uniform pushes
    pub uniform_sets: u32,
    /// Draw commands of any kind
    pub draws: u32,
    /// Instances drawn
    pub instances: u32,
    /// Compute dispatches
    pub dispatches: u32,
}

impl DrawStats {
    pub fn from_commands(commands: &[RenderCommand]) -> Self {
        let mut stats = Self::default();
        for command in commands {
            stats.record(command);
        }
        stats
    }

    pub fn record(&mut self, command: &RenderCommand) {
        self.total_commands += 1;
        match command {
            RenderCommand::ApplyState { .. } => self.state_applies += 1,
            RenderCommand::BindShader(_) | RenderCommand::BindTarget(_) => self.binds += 1,
            RenderCommand::UploadBuffer { data, .. } => {
                self.uploads += 1;
                self.upload_bytes += data.len() as u64;
            }
            RenderCommand::SetUniforms(_) => self.uniform_sets += 1,
            RenderCommand::Dispatch { .. } | RenderCommand::DispatchIndirect { .. } => {
                self.dispatches += 1
            }
            draw => {
                self.draws += 1;
                self.instances += draw.instance_count();
            }
        }
    }

    pub fn merge(&mut self, other: &DrawStats) {
        self.total_commands += other.total_commands;
        self.state_applies += other.state_applies;
        self.binds += other.binds;
        self.uploads += other.uploads;
        self.upload_bytes += other.upload_bytes;
        self.uniform_sets += other.uniform_sets;
        self.draws += other.draws;
        self.instances += other.instances;
        self.dispatches += other.dispatches;
    }
}
