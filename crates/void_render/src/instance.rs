//! Drawable instances
//!
//! An [`Instance`] is anything a stage can render. Optional behavior is
//! exposed through small facet traits that an instance returns from the
//! capability queries ([`Instance::mesh`], [`Instance::dispatch`], ...);
//! flow strategies ask for the facet they need instead of inspecting the
//! concrete type.

use std::sync::Arc;
use serde::{Deserialize, Serialize};
use void_core::InstanceId;

use crate::batch::BufferHandle;
use crate::error::InstanceError;
use crate::runtime::FrameContext;
use crate::spatial::AABB;

/// A drawable object owned by a stage container
pub trait Instance: Send + Sync {
    /// Stable identifier
    fn id(&self) -> InstanceId;

    /// Whether `tick` should run this frame
    fn should_tick(&self) -> bool {
        false
    }

    /// Whether the instance should be removed from its container
    fn should_discard(&self) -> bool {
        false
    }

    /// Whether the instance draws this frame
    fn should_render(&self) -> bool {
        true
    }

    /// Per-frame update
    fn tick(&mut self, _ctx: &FrameContext) -> Result<(), InstanceError> {
        Ok(())
    }

    /// Called after the instance's batch was emitted
    fn after_draw(&mut self, _ctx: &FrameContext) {}

    /// World-space bounds, used by tree containers
    fn bounds(&self) -> Option<AABB> {
        None
    }

    fn mesh(&self) -> Option<&dyn MeshProvider> {
        None
    }

    fn dispatch(&self) -> Option<&dyn DispatchProvider> {
        None
    }

    fn instance_data(&self) -> Option<&dyn InstanceDataProvider> {
        None
    }

    fn transform(&self) -> Option<&dyn TransformProvider> {
        None
    }

    /// Summary of the facets this instance exposes
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            mesh: self.mesh().is_some(),
            dispatch: self.dispatch().is_some(),
            instance_data: self.instance_data().is_some(),
            transform: self.transform().is_some(),
        }
    }
}

/// Which facets an instance implements
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capabilities {
    pub mesh: bool,
    pub dispatch: bool,
    pub instance_data: bool,
    pub transform: bool,
}

/// Vertex data of one instance, laid out per its parameter's vertex layout
#[derive(Clone, Debug)]
pub struct PreparedMesh {
    /// Interleaved vertex bytes
    pub vertices: Arc<[u8]>,
    /// Number of vertices in `vertices`
    pub vertex_count: u32,
    /// Explicit indices, relative to the first vertex
    pub indices: Option<Arc<[u32]>>,
}

impl PreparedMesh {
    pub fn new(vertices: impl Into<Arc<[u8]>>, vertex_count: u32) -> Self {
        Self {
            vertices: vertices.into(),
            vertex_count,
            indices: None,
        }
    }

    pub fn with_indices(mut self, indices: impl Into<Arc<[u32]>>) -> Self {
        self.indices = Some(indices.into());
        self
    }
}

/// Instances that supply vertex data
pub trait MeshProvider {
    fn prepared_mesh(&self, ctx: &FrameContext) -> Result<PreparedMesh, InstanceError>;
}

/// Compute dispatch parameters
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DispatchCall {
    /// Workgroup counts
    Direct { groups: [u32; 3] },
    /// Workgroup counts read from a GPU buffer
    Indirect { buffer: BufferHandle, offset: u64 },
}

/// Instances that run a compute dispatch
pub trait DispatchProvider {
    fn dispatch_call(&self, ctx: &FrameContext) -> Result<DispatchCall, InstanceError>;
}

/// Per-instance attribute data for instanced draws
#[derive(Clone, Debug)]
pub struct PerInstanceData {
    /// Number of instances to draw
    pub count: u32,
    /// Packed per-instance attributes
    pub bytes: Arc<[u8]>,
}

/// Instances drawn with hardware instancing
pub trait InstanceDataProvider {
    fn per_instance(&self) -> PerInstanceData;
}

/// Instances with a model matrix
pub trait TransformProvider {
    /// Column-major model matrix
    fn model_matrix(&self) -> [f32; 16];
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::geometry::test_vertex;

    /// Minimal mesh instance for unit tests
    pub(crate) struct Sample {
        pub id: InstanceId,
        pub vertices: Vec<u8>,
        pub vertex_count: u32,
        pub bounds: Option<AABB>,
        pub fail: bool,
        pub panic: bool,
        pub discard: bool,
        pub visible: bool,
        pub ticks: u32,
        pub draws: u32,
    }

    impl Sample {
        /// One triangle at the origin
        pub fn new(id: u64) -> Self {
            let mut vertices = Vec::new();
            for p in [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]] {
                vertices.extend_from_slice(&test_vertex(p, 0xffff_ffff));
            }
            Self {
                id: InstanceId::from_raw(id),
                vertices,
                vertex_count: 3,
                bounds: None,
                fail: false,
                panic: false,
                discard: false,
                visible: true,
                ticks: 0,
                draws: 0,
            }
        }
    }

    impl Instance for Sample {
        fn id(&self) -> InstanceId {
            self.id
        }

        fn should_tick(&self) -> bool {
            true
        }

        fn should_discard(&self) -> bool {
            self.discard
        }

        fn should_render(&self) -> bool {
            self.visible
        }

        fn tick(&mut self, _ctx: &FrameContext) -> Result<(), InstanceError> {
            self.ticks += 1;
            Ok(())
        }

        fn after_draw(&mut self, _ctx: &FrameContext) {
            self.draws += 1;
        }

        fn bounds(&self) -> Option<AABB> {
            self.bounds
        }

        fn mesh(&self) -> Option<&dyn MeshProvider> {
            Some(self)
        }
    }

    impl MeshProvider for Sample {
        fn prepared_mesh(&self, _ctx: &FrameContext) -> Result<PreparedMesh, InstanceError> {
            if self.panic {
                panic!("sample {} panicked", self.id);
            }
            if self.fail {
                return Err(InstanceError::from("sample mesh unavailable"));
            }
            Ok(PreparedMesh::new(self.vertices.clone(), self.vertex_count))
        }
    }

    #[test]
    fn test_capabilities() {
        let sample = Sample::new(1);
        let caps = sample.capabilities();
        assert!(caps.mesh);
        assert!(!caps.dispatch);
        assert!(!caps.instance_data);
        assert!(!caps.transform);
    }
}
