//! Render Configuration
//!
//! Engine-wide batching settings with serde support. Missing JSON fields fall
//! back to their defaults.

use serde::{Deserialize, Serialize};

use crate::error::{RenderError, Result};
use crate::uniform::BaselinePolicy;

/// Batching engine configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Worker threads for parallel tick and collection
    pub worker_threads: usize,

    /// Instances per parallel work item
    pub parallel_chunk_size: usize,

    /// Tick instances on the worker pool
    pub parallel_tick: bool,

    /// Transient vertex buffer size in KB
    pub vertex_buffer_kb: usize,

    /// Transient index buffer size in KB
    pub index_buffer_kb: usize,

    /// Transient per-instance buffer size in KB
    pub instance_buffer_kb: usize,

    /// Transient indirect argument buffer size in KB
    pub indirect_buffer_kb: usize,

    /// Alignment of every transient allocation (power of 2)
    pub buffer_alignment: usize,

    /// Uniform delta baseline at the start of each pass
    pub uniform_baseline: BaselinePolicy,

    /// Allow back-to-front sorting for parameters that request it
    pub sorting_enabled: bool,

    /// Emit indirect draws instead of direct ones
    pub indirect_draws: bool,

    /// Width of thick lines in world units
    pub thick_line_width: f32,

    /// Bounds margin for tree containers; moves within it skip reinsertion
    pub bvh_margin: f32,

    /// Grow overflowed transient buffers before the next frame
    pub grow_transient_buffers: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            worker_threads: 4,
            parallel_chunk_size: 64,
            parallel_tick: true,
            vertex_buffer_kb: 4096,
            index_buffer_kb: 1024,
            instance_buffer_kb: 1024,
            indirect_buffer_kb: 64,
            buffer_alignment: 16,
            uniform_baseline: BaselinePolicy::ResetPerPass,
            sorting_enabled: true,
            indirect_draws: false,
            thick_line_width: 1.0,
            bvh_margin: 0.1,
            grow_transient_buffers: true,
        }
    }
}

impl RenderConfig {
    /// Single-threaded configuration
    pub fn single_threaded() -> Self {
        Self {
            worker_threads: 1,
            parallel_tick: false,
            ..Default::default()
        }
    }

    /// Parse and validate
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            return Err(RenderError::InvalidConfig("worker_threads must be at least 1".into()));
        }
        if self.parallel_chunk_size == 0 {
            return Err(RenderError::InvalidConfig("parallel_chunk_size must be at least 1".into()));
        }
        if !self.buffer_alignment.is_power_of_two() {
            return Err(RenderError::InvalidConfig(format!(
                "buffer_alignment {} is not a power of two",
                self.buffer_alignment
            )));
        }
        for (name, kb) in [
            ("vertex_buffer_kb", self.vertex_buffer_kb),
            ("index_buffer_kb", self.index_buffer_kb),
            ("instance_buffer_kb", self.instance_buffer_kb),
            ("indirect_buffer_kb", self.indirect_buffer_kb),
        ] {
            if kb == 0 {
                return Err(RenderError::InvalidConfig(format!("{} must be non-zero", name)));
            }
        }
        if !(self.thick_line_width > 0.0) {
            return Err(RenderError::InvalidConfig("thick_line_width must be positive".into()));
        }
        if !(self.bvh_margin >= 0.0) {
            return Err(RenderError::InvalidConfig("bvh_margin must not be negative".into()));
        }
        Ok(())
    }
}
