//! Render settings
//!
//! A [`RenderSetting`] is the complete, value-equal GPU configuration of a
//! draw: one value per table slot plus the shader and render-target
//! bindings. Settings are immutable; `with` produces a copy differing in one
//! slot. [`SettingInterner`] hands out one shared `Arc` per distinct value.
//!
//! Slot indices only mean something within one table, so settings built
//! against different tables never compare equal, whatever their values.

use core::hash::{Hash, Hasher};
use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::Mutex;
use void_core::Identifier;

use super::table::StateComponentTable;
use super::value::StateValue;
use crate::error::Result;

/// Resolved shader program
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShaderBinding {
    /// Program identifier (also keys uniform hooks)
    pub program: Identifier,
    /// Backend program handle
    pub handle: u32,
}

impl ShaderBinding {
    pub fn new(program: Identifier, handle: u32) -> Self {
        Self { program, handle }
    }
}

/// Render target a setting draws into
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RenderTargetBinding {
    /// Target identifier
    pub target: Identifier,
    /// Backend framebuffer handle (0 = main framebuffer)
    pub handle: u32,
}

impl RenderTargetBinding {
    pub fn new(target: Identifier, handle: u32) -> Self {
        Self { target, handle }
    }

    /// The main framebuffer
    pub fn main() -> Self {
        Self {
            target: Identifier::new_unchecked(void_core::DEFAULT_NAMESPACE, "main"),
            handle: 0,
        }
    }
}

/// Complete GPU configuration for a draw
#[derive(Clone, Debug)]
pub struct RenderSetting {
    table: Arc<StateComponentTable>,
    slots: Box<[StateValue]>,
    shader: ShaderBinding,
    target: RenderTargetBinding,
}

impl RenderSetting {
    /// Setting with every slot at its table default
    pub fn new(
        table: &Arc<StateComponentTable>,
        shader: ShaderBinding,
        target: RenderTargetBinding,
    ) -> Self {
        Self {
            table: Arc::clone(table),
            slots: table.defaults(),
            shader,
            target,
        }
    }

    /// Defaults plus overrides. Fails on the first unregistered slot or
    /// mismatched value kind.
    pub fn with_overrides<I>(
        table: &Arc<StateComponentTable>,
        shader: ShaderBinding,
        target: RenderTargetBinding,
        overrides: I,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = (Identifier, StateValue)>,
    {
        let mut setting = Self::new(table, shader, target);
        for (id, value) in overrides {
            let index = table.slot_of(&id)?;
            table.check_kind(index, &value)?;
            setting.slots[index] = value;
        }
        Ok(setting)
    }

    /// Copy with one slot replaced
    pub fn with(&self, slot: &Identifier, value: StateValue) -> Result<Self> {
        let index = self.table.slot_of(slot)?;
        self.table.check_kind(index, &value)?;

        let mut next = self.clone();
        next.slots[index] = value;
        Ok(next)
    }

    /// Copy with a different shader
    pub fn with_shader(&self, shader: ShaderBinding) -> Self {
        Self {
            shader,
            ..self.clone()
        }
    }

    /// Copy with a different render target
    pub fn with_target(&self, target: RenderTargetBinding) -> Self {
        Self {
            target,
            ..self.clone()
        }
    }

    /// Value of a slot by identifier
    pub fn get(&self, slot: &Identifier) -> Result<&StateValue> {
        let index = self.table.slot_of(slot)?;
        Ok(&self.slots[index])
    }

    /// Value of a slot by index
    #[inline]
    pub fn value_at(&self, index: usize) -> &StateValue {
        &self.slots[index]
    }

    /// All slot values in table order
    #[inline]
    pub fn slots(&self) -> &[StateValue] {
        &self.slots
    }

    /// Table this setting was built against
    #[inline]
    pub fn table(&self) -> &Arc<StateComponentTable> {
        &self.table
    }

    #[inline]
    pub fn shader(&self) -> &ShaderBinding {
        &self.shader
    }

    #[inline]
    pub fn target(&self) -> &RenderTargetBinding {
        &self.target
    }

    /// Whether both settings index the same table
    pub fn same_table(&self, other: &RenderSetting) -> bool {
        Arc::ptr_eq(&self.table, &other.table)
    }
}

impl PartialEq for RenderSetting {
    fn eq(&self, other: &Self) -> bool {
        self.same_table(other)
            && self.slots == other.slots
            && self.shader == other.shader
            && self.target == other.target
    }
}

impl Eq for RenderSetting {}

impl Hash for RenderSetting {
    fn hash<H: Hasher>(&self, state: &mut H) {
        core::ptr::hash(Arc::as_ptr(&self.table), state);
        self.slots.hash(state);
        self.shader.hash(state);
        self.target.hash(state);
    }
}

/// Deduplicates settings so equal configurations share one allocation
#[derive(Debug, Default)]
pub struct SettingInterner {
    settings: Mutex<HashMap<RenderSetting, Arc<RenderSetting>>>,
}

impl SettingInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared instance equal to `setting`
    pub fn intern(&self, setting: RenderSetting) -> Arc<RenderSetting> {
        let mut settings = self.settings.lock();
        if let Some(existing) = settings.get(&setting) {
            return Arc::clone(existing);
        }
        let shared = Arc::new(setting.clone());
        settings.insert(setting, Arc::clone(&shared));
        shared
    }

    /// Number of distinct settings
    pub fn len(&self) -> usize {
        self.settings.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.settings.lock().is_empty()
    }

    /// Drop every interned setting
    pub fn clear(&self) {
        self.settings.lock().clear();
    }
}
