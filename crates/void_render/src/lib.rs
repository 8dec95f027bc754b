//! # void_render - Render Batching and State Diffing
//!
//! Backend-agnostic frame assembly with:
//! - Stages of registered instances rendered in dependency order
//! - Pluggable flow strategies (raster draws, compute dispatches, custom)
//! - Batching by render setting and uniform snapshot
//! - Minimal GPU state transitions between batches
//! - Transient per-frame geometry buffers and indirect draws
//! - BVH frustum culling on `void_math` bounds
//!
//! ## Architecture
//!
//! The renderer is built on four main concepts:
//!
//! 1. **Render Settings**: immutable bundles of state slots, diffed against
//!    whatever is currently bound
//! 2. **Flows**: strategies turning instances into commands
//! 3. **Uniform Hooks**: per-program getters whose changes split batches
//! 4. **Stages**: ordered containers of instances
//!
//! Output is a stream of [`RenderCommand`]s pushed into a [`CommandSink`];
//! a graphics backend implements the sink.
//!
//! ## Example
//!
//! ```ignore
//! use void_render::prelude::*;
//!
//! let env = RenderEnvironment::standard()?;
//! let setting = env.setting(shader, RenderTargetBinding::main());
//! let parameter: RenderParameter =
//!     RasterParameter::new(setting, VertexLayout::position_color(), PrimitiveTopology::Triangles).into();
//!
//! let mut pipeline = StagePipeline::new(env.config());
//! let mut world = Stage::with_bvh(Identifier::parse("game:stage/world")?, 0.1);
//! world.insert(Box::new(my_mesh), parameter);
//! pipeline.add_stage(world)?;
//!
//! let report = pipeline.render_frame(&env, &FrameContext::new(0, 0.016), &mut backend)?;
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod flow;
pub mod geometry;
pub mod instance;
pub mod runtime;
pub mod spatial;
pub mod stage;
pub mod state;
pub mod uniform;

pub use batch::{
    BatchGrouper, BufferHandle, BufferKind, BufferSlice, CommandList, CommandSink, DrawStats, RenderBatch,
    RenderCommand,
};
pub use config::RenderConfig;
pub use error::{InstanceError, RenderError, Result};
pub use flow::{
    BatchCommands, ComputeFlow, ComputeParameter, CustomParameter, FlowContext, FlowRegistry, FlowStrategy, FlowType,
    InfoPayload, InstanceInfo, RasterFlow, RasterParameter, RenderParameter,
};
pub use geometry::{PrimitiveTopology, TransientGeometry, VertexLayout};
pub use instance::{
    DispatchCall, DispatchProvider, Instance, InstanceDataProvider, MeshProvider, PerInstanceData, PreparedMesh,
    TransformProvider,
};
pub use runtime::{FrameContext, RenderEnvironment, RenderEnvironmentBuilder};
pub use spatial::{Bvh, FrustumPlanes, Mat4, Vec3, AABB};
pub use stage::{FrameReport, Stage, StagePipeline, StageReport};
pub use state::{RenderSetting, RenderTargetBinding, ShaderBinding, StateComponentTable, StateDiffer};
pub use uniform::{BaselinePolicy, HookTarget, UniformHook, UniformHookRegistry, UniformValue};

/// Prelude - commonly used types
pub mod prelude {
    pub use crate::batch::{CommandList, CommandSink, RenderCommand};
    pub use crate::config::RenderConfig;
    pub use crate::error::{InstanceError, RenderError};
    pub use crate::flow::{
        ComputeParameter, FlowStrategy, FlowType, RasterParameter, RenderParameter,
    };
    pub use crate::geometry::{PrimitiveTopology, VertexLayout};
    pub use crate::instance::{DispatchCall, DispatchProvider, Instance, MeshProvider, PreparedMesh};
    pub use crate::runtime::{FrameContext, RenderEnvironment};
    pub use crate::spatial::{FrustumPlanes, Mat4, Vec3, AABB};
    pub use crate::stage::{FrameReport, Stage, StagePipeline};
    pub use crate::state::{RenderSetting, RenderTargetBinding, ShaderBinding};
    pub use crate::uniform::{HookTarget, UniformHook, UniformValue};
    pub use void_core::{Identifier, InstanceId};
}
