//! Batching and command emission
//!
//! - [`command`]: backend-agnostic render commands and sinks
//! - [`grouper`]: setting and uniform-snapshot grouping
//! - [`indirect`]: packed indirect draw arguments

pub mod command;
pub mod grouper;
pub mod indirect;

pub use command::{BufferHandle, BufferKind, BufferSlice, CommandList, CommandSink, DrawStats, RenderCommand};
pub use grouper::{BatchGrouper, GroupingStats, RenderBatch, UniformBatchGroup};
pub use indirect::{DrawIndexedIndirectArgs, DrawIndirectArgs, IndirectCommandBuffer};
