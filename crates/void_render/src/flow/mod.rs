//! Render flows
//!
//! A flow type names how a family of instances becomes commands: raster
//! flows draw meshes, compute flows dispatch workgroups, and applications
//! may register their own. Every instance is registered with a
//! [`RenderParameter`] naming its flow; the [`InstanceCollector`] hands each
//! instance to its flow's [`FlowStrategy`] to snapshot an [`InstanceInfo`].

pub mod collector;
pub mod compute;
pub mod raster;
pub mod registry;
pub mod strategy;

use core::fmt;
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use void_core::Identifier;

use crate::geometry::{PrimitiveTopology, VertexLayout};
use crate::instance::{DispatchCall, Instance, PerInstanceData, PreparedMesh};
use crate::state::RenderSetting;

pub use collector::{Collection, CollectionFailure, FlowBucket, InstanceCollector};
pub use compute::ComputeFlow;
pub use raster::RasterFlow;
pub use registry::FlowRegistry;
pub use strategy::{BatchCommands, FlowContext, FlowStrategy};

/// Flow type key
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlowType(pub Identifier);

impl FlowType {
    /// Built-in mesh drawing flow
    pub fn raster() -> Self {
        Self(Identifier::new_unchecked(void_core::DEFAULT_NAMESPACE, "flow/raster"))
    }

    /// Built-in compute dispatch flow
    pub fn compute() -> Self {
        Self(Identifier::new_unchecked(void_core::DEFAULT_NAMESPACE, "flow/compute"))
    }

    pub fn id(&self) -> &Identifier {
        &self.0
    }
}

impl fmt::Display for FlowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<Identifier> for FlowType {
    fn from(id: Identifier) -> Self {
        Self(id)
    }
}

/// How often buffer contents change
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BufferUsage {
    /// Rebuilt every frame
    #[default]
    Stream,
    /// Changes occasionally
    Dynamic,
    /// Uploaded once
    Static,
}

/// Mesh drawing configuration
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RasterParameter {
    pub setting: Arc<RenderSetting>,
    pub layout: VertexLayout,
    pub topology: PrimitiveTopology,
    pub usage: BufferUsage,
    /// Sort primitives back to front before upload
    pub sort: bool,
}

impl RasterParameter {
    pub fn new(setting: Arc<RenderSetting>, layout: VertexLayout, topology: PrimitiveTopology) -> Self {
        Self {
            setting,
            layout,
            topology,
            usage: BufferUsage::Stream,
            sort: false,
        }
    }

    pub fn sorted(mut self) -> Self {
        self.sort = true;
        self
    }

    pub fn with_usage(mut self, usage: BufferUsage) -> Self {
        self.usage = usage;
        self
    }
}

/// Compute dispatch configuration
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ComputeParameter {
    pub setting: Arc<RenderSetting>,
}

/// Parameter of an application-defined flow
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CustomParameter {
    pub flow: FlowType,
    pub setting: Arc<RenderSetting>,
    /// Flow-specific configuration bytes
    pub data: Arc<[u8]>,
}

/// Flow-specific configuration an instance is registered with. Used as the
/// grouping key within a stage.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RenderParameter {
    Raster(RasterParameter),
    Compute(ComputeParameter),
    Custom(CustomParameter),
}

impl RenderParameter {
    pub fn flow_type(&self) -> FlowType {
        match self {
            RenderParameter::Raster(_) => FlowType::raster(),
            RenderParameter::Compute(_) => FlowType::compute(),
            RenderParameter::Custom(p) => p.flow.clone(),
        }
    }

    /// Setting the instance draws with
    pub fn setting(&self) -> &Arc<RenderSetting> {
        match self {
            RenderParameter::Raster(p) => &p.setting,
            RenderParameter::Compute(p) => &p.setting,
            RenderParameter::Custom(p) => &p.setting,
        }
    }
}

impl From<RasterParameter> for RenderParameter {
    fn from(p: RasterParameter) -> Self {
        RenderParameter::Raster(p)
    }
}

impl From<ComputeParameter> for RenderParameter {
    fn from(p: ComputeParameter) -> Self {
        RenderParameter::Compute(p)
    }
}

/// Flow-specific per-frame data of an instance
#[derive(Clone, Debug)]
pub enum InfoPayload {
    Mesh {
        mesh: PreparedMesh,
        instances: Option<PerInstanceData>,
    },
    Dispatch(DispatchCall),
    Custom(Arc<[u8]>),
}

/// Per-frame snapshot of one instance, valid for the frame it was collected
#[derive(Clone)]
pub struct InstanceInfo<'a> {
    pub instance: &'a dyn Instance,
    pub parameter: &'a RenderParameter,
    pub setting: Arc<RenderSetting>,
    pub payload: InfoPayload,
}

impl<'a> InstanceInfo<'a> {
    pub fn new(instance: &'a dyn Instance, parameter: &'a RenderParameter, payload: InfoPayload) -> Self {
        Self {
            instance,
            parameter,
            setting: Arc::clone(parameter.setting()),
            payload,
        }
    }
}

impl fmt::Debug for InstanceInfo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceInfo")
            .field("instance", &self.instance.id())
            .field("flow", &self.parameter.flow_type())
            .field("payload", &self.payload)
            .finish()
    }
}
