//! Runtime context
//!
//! [`FrameContext`] is the per-frame input handed to every instance callback.
//! [`RenderEnvironment`] bundles the long-lived registries a pipeline renders
//! against: the state component table, flow strategies, uniform hooks and the
//! setting interner.

use std::sync::Arc;
use serde::{Deserialize, Serialize};

use crate::config::RenderConfig;
use crate::error::Result;
use crate::flow::{FlowRegistry, FlowStrategy};
use crate::state::{
    RenderSetting, RenderTargetBinding, SettingInterner, ShaderBinding, StateComponentTable, StateValue,
};
use crate::uniform::{HookTarget, UniformHook, UniformHookRegistry};
use void_core::Identifier;
use void_math::Vec3;

/// Per-frame input
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameContext {
    /// Monotonic frame counter
    pub frame: u64,
    /// Seconds since the previous frame
    pub delta_seconds: f32,
    /// Eye position, used for depth sorting
    pub camera_position: Vec3,
}

impl FrameContext {
    pub fn new(frame: u64, delta_seconds: f32) -> Self {
        Self {
            frame,
            delta_seconds,
            camera_position: Vec3::ZERO,
        }
    }

    pub fn with_camera(mut self, position: impl Into<Vec3>) -> Self {
        self.camera_position = position.into();
        self
    }

    /// Context for the following frame, keeping the camera
    pub fn next(&self, delta_seconds: f32) -> Self {
        Self {
            frame: self.frame + 1,
            delta_seconds,
            camera_position: self.camera_position,
        }
    }
}

/// Registries shared by every stage of a pipeline
pub struct RenderEnvironment {
    table: Arc<StateComponentTable>,
    pub flows: FlowRegistry,
    pub uniforms: UniformHookRegistry,
    settings: SettingInterner,
    pub config: RenderConfig,
}

impl std::fmt::Debug for RenderEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderEnvironment")
            .field("slots", &self.table.len())
            .field("flows", &self.flows)
            .field("uniform_hooks", &self.uniforms.len())
            .field("settings", &self.settings.len())
            .field("config", &self.config)
            .finish()
    }
}

impl RenderEnvironment {
    pub fn builder() -> RenderEnvironmentBuilder {
        RenderEnvironmentBuilder::new()
    }

    /// Standard table, built-in flows, default config
    pub fn standard() -> Result<Self> {
        Self::builder().build()
    }

    pub fn table(&self) -> &Arc<StateComponentTable> {
        &self.table
    }

    pub fn flows(&self) -> &FlowRegistry {
        &self.flows
    }

    pub fn uniforms(&self) -> &UniformHookRegistry {
        &self.uniforms
    }

    pub fn settings(&self) -> &SettingInterner {
        &self.settings
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Shared setting with every slot at its default
    pub fn setting(&self, shader: ShaderBinding, target: RenderTargetBinding) -> Arc<RenderSetting> {
        self.settings.intern(RenderSetting::new(&self.table, shader, target))
    }

    /// Shared setting with slot overrides
    pub fn setting_with<I>(
        &self,
        shader: ShaderBinding,
        target: RenderTargetBinding,
        overrides: I,
    ) -> Result<Arc<RenderSetting>>
    where
        I: IntoIterator<Item = (Identifier, StateValue)>,
    {
        let setting = RenderSetting::with_overrides(&self.table, shader, target, overrides)?;
        Ok(self.settings.intern(setting))
    }

    pub fn intern(&self, setting: RenderSetting) -> Arc<RenderSetting> {
        self.settings.intern(setting)
    }

    pub fn register_uniform(&self, target: HookTarget, hook: UniformHook) -> Result<()> {
        self.uniforms.register(target, hook)
    }
}

/// Builder for [`RenderEnvironment`]
pub struct RenderEnvironmentBuilder {
    table: Option<Arc<StateComponentTable>>,
    config: RenderConfig,
    flows: Vec<Arc<dyn FlowStrategy>>,
    builtin_flows: bool,
}

impl Default for RenderEnvironmentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderEnvironmentBuilder {
    pub fn new() -> Self {
        Self {
            table: None,
            config: RenderConfig::default(),
            flows: Vec::new(),
            builtin_flows: true,
        }
    }

    /// Use a custom state component table instead of the standard one
    pub fn with_table(mut self, table: Arc<StateComponentTable>) -> Self {
        self.table = Some(table);
        self
    }

    pub fn with_config(mut self, config: RenderConfig) -> Self {
        self.config = config;
        self
    }

    /// Register an application flow strategy
    pub fn with_flow(mut self, strategy: Arc<dyn FlowStrategy>) -> Self {
        self.flows.push(strategy);
        self
    }

    /// Skip the raster and compute flows
    pub fn without_builtin_flows(mut self) -> Self {
        self.builtin_flows = false;
        self
    }

    pub fn build(self) -> Result<RenderEnvironment> {
        self.config.validate()?;

        let mut flows = if self.builtin_flows {
            FlowRegistry::with_builtin()
        } else {
            FlowRegistry::new()
        };
        for strategy in self.flows {
            flows.register(strategy)?;
        }

        let table = self.table.unwrap_or_else(StateComponentTable::standard);
        log::debug!(
            "Render environment ready: {} state slots, {} flows",
            table.len(),
            flows.len()
        );

        Ok(RenderEnvironment {
            table,
            flows,
            uniforms: UniformHookRegistry::new(),
            settings: SettingInterner::new(),
            config: self.config,
        })
    }
}
