//! Uniform hooks
//!
//! A hook reads one uniform from an instance and remembers the last value it
//! pushed. Capturing an instance against a [`UniformHookGroup`] yields only
//! the uniforms whose value changed since the previous capture.

use core::fmt;
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use void_core::Identifier;

use super::snapshot::{UniformChange, UniformValueSnapshot};
use super::value::UniformValue;
use crate::instance::Instance;
use crate::runtime::FrameContext;

/// Reads a uniform value from an instance. `None` means the instance has no
/// value for this uniform.
pub type UniformGetter =
    Arc<dyn Fn(&dyn Instance, &FrameContext) -> Option<UniformValue> + Send + Sync>;

/// What cached hook values are compared against at the start of a pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BaselinePolicy {
    /// Clear cached values each pass; the first instance uploads everything
    #[default]
    ResetPerPass,
    /// Keep values from the previous frame as the baseline
    CarryOver,
}

/// One uniform source
#[derive(Clone)]
pub struct UniformHook {
    name: Arc<str>,
    slot: u32,
    getter: UniformGetter,
    last: Option<UniformValue>,
}

impl UniformHook {
    pub fn new<F>(name: impl Into<Arc<str>>, slot: u32, getter: F) -> Self
    where
        F: Fn(&dyn Instance, &FrameContext) -> Option<UniformValue> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            slot,
            getter: Arc::new(getter),
            last: None,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn slot(&self) -> u32 {
        self.slot
    }

    /// Last value pushed by this hook
    #[inline]
    pub fn last_value(&self) -> Option<&UniformValue> {
        self.last.as_ref()
    }

    /// Copy of this hook with its cache cleared
    pub(crate) fn fresh(&self) -> Self {
        Self {
            last: None,
            ..self.clone()
        }
    }

    /// Current value of this hook for an instance. The cache is untouched.
    fn evaluate(&self, instance: &dyn Instance, ctx: &FrameContext) -> Option<UniformChange> {
        let value = (self.getter)(instance, ctx)?;
        Some(UniformChange {
            name: Arc::clone(&self.name),
            slot: self.slot,
            value,
        })
    }

    /// Compare against the cached value and store. Returns the change if the
    /// value differs.
    fn bind(&mut self, change: &UniformChange) -> Option<UniformChange> {
        if self.last.as_ref() == Some(&change.value) {
            return None;
        }
        self.last = Some(change.value.clone());
        Some(change.clone())
    }
}

impl fmt::Debug for UniformHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniformHook")
            .field("name", &self.name)
            .field("slot", &self.slot)
            .field("last", &self.last)
            .finish()
    }
}

/// The hooks attached to one shader program, with their cached values
#[derive(Debug)]
pub struct UniformHookGroup {
    program: Identifier,
    hooks: Vec<UniformHook>,
    generation: u64,
}

impl UniformHookGroup {
    pub fn new(program: Identifier, hooks: Vec<UniformHook>, generation: u64) -> Self {
        Self {
            program,
            hooks,
            generation,
        }
    }

    /// Every hook value of one instance, whatever is cached. Hooks without a
    /// value for the instance are left out.
    pub fn values(&self, instance: &dyn Instance, ctx: &FrameContext) -> UniformValueSnapshot {
        let values: Vec<_> = self
            .hooks
            .iter()
            .filter_map(|hook| hook.evaluate(instance, ctx))
            .collect();

        if values.is_empty() {
            return UniformValueSnapshot::empty();
        }
        UniformValueSnapshot::new(values)
    }

    /// Make `values` the bound state and return the entries that differ from
    /// what was bound before.
    pub fn bind(&mut self, values: &UniformValueSnapshot) -> UniformValueSnapshot {
        let changes: Vec<_> = self
            .hooks
            .iter_mut()
            .filter_map(|hook| {
                let change = values.get(hook.name())?;
                hook.bind(change)
            })
            .collect();

        if changes.is_empty() {
            return UniformValueSnapshot::empty();
        }
        UniformValueSnapshot::new(changes)
    }

    /// Capture the uniforms of one instance. Each hook's cache is updated as
    /// a side effect.
    pub fn capture(&mut self, instance: &dyn Instance, ctx: &FrameContext) -> UniformValueSnapshot {
        let values = self.values(instance, ctx);
        self.bind(&values)
    }

    /// Start of a collection pass
    pub fn begin_pass(&mut self, policy: BaselinePolicy) {
        if policy == BaselinePolicy::ResetPerPass {
            self.reset();
        }
    }

    /// Forget every cached value
    pub fn reset(&mut self) {
        for hook in &mut self.hooks {
            hook.last = None;
        }
    }

    /// Cached value of a hook by name
    pub fn last_value(&self, name: &str) -> Option<&UniformValue> {
        self.hooks
            .iter()
            .find(|h| h.name() == name)
            .and_then(|h| h.last_value())
    }

    pub fn program(&self) -> &Identifier {
        &self.program
    }

    /// Registry generation this group was built from
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}
