//! Flow strategy trait
//!
//! A strategy turns instances of one flow type into commands in two steps:
//! `collect_instance_info` snapshots each instance (possibly on a worker
//! thread), then `create_render_commands` batches the snapshots of a stage
//! on the submitting thread.

use std::sync::Arc;
use void_core::{Identifier, InstanceId};

use super::{CollectionFailure, FlowType, InstanceInfo, RenderParameter};
use crate::batch::{BatchGrouper, CommandList};
use crate::config::RenderConfig;
use crate::error::Result;
use crate::geometry::TransientGeometry;
use crate::instance::Instance;
use crate::runtime::FrameContext;
use crate::state::RenderSetting;
use crate::uniform::UniformHookRegistry;

/// Commands of one batch, ready for state diffing and emission
#[derive(Debug)]
pub struct BatchCommands {
    /// Setting the differ transitions to before `commands`
    pub setting: Arc<RenderSetting>,
    /// Uploads, uniform sets and draws, in submission order
    pub commands: CommandList,
    /// Instances drawn by this batch
    pub instances: Vec<InstanceId>,
}

impl BatchCommands {
    pub fn new(setting: Arc<RenderSetting>) -> Self {
        Self {
            setting,
            commands: CommandList::new(),
            instances: Vec::new(),
        }
    }
}

/// Shared state handed to `create_render_commands`
pub struct FlowContext<'f> {
    pub frame: &'f FrameContext,
    pub grouper: &'f mut BatchGrouper,
    pub geometry: &'f TransientGeometry,
    pub config: &'f RenderConfig,
    pub uniforms: &'f UniformHookRegistry,
    /// Batches whose geometry did not fit this frame
    pub dropped_batches: u32,
    /// Instances whose geometry was rejected while batching
    pub failures: Vec<CollectionFailure>,
}

impl<'f> FlowContext<'f> {
    pub fn new(
        frame: &'f FrameContext,
        grouper: &'f mut BatchGrouper,
        geometry: &'f TransientGeometry,
        config: &'f RenderConfig,
        uniforms: &'f UniformHookRegistry,
    ) -> Self {
        Self {
            frame,
            grouper,
            geometry,
            config,
            uniforms,
            dropped_batches: 0,
            failures: Vec::new(),
        }
    }
}

/// How instances of one flow type become commands
pub trait FlowStrategy: Send + Sync {
    fn flow_type(&self) -> FlowType;

    /// Whether `collect_instance_info` may run on worker threads
    fn supports_parallel(&self) -> bool {
        false
    }

    /// Snapshot one instance for this frame. `Ok(None)` skips the instance
    /// without reporting a failure.
    fn collect_instance_info<'a>(
        &self,
        instance: &'a dyn Instance,
        parameter: &'a RenderParameter,
        ctx: &FrameContext,
    ) -> Result<Option<InstanceInfo<'a>>>;

    /// Batch the infos collected for one stage
    fn create_render_commands<'a>(
        &self,
        infos: Vec<InstanceInfo<'a>>,
        stage: &Identifier,
        ctx: &mut FlowContext<'_>,
    ) -> Result<Vec<BatchCommands>>;
}
