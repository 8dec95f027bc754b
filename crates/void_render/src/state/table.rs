//! State Component Table
//!
//! The closed set of state slots a [`RenderSetting`](super::RenderSetting)
//! is made of. Slots are registered once at startup through
//! [`StateTableBuilder`]; `build()` seals the table and registration order
//! becomes the slot index order used by settings and by the differ.

use std::collections::HashMap;
use std::sync::Arc;
use void_core::Identifier;

use super::value::*;
use crate::error::{RenderError, Result};

/// The standard slots, in their default registration order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StandardSlot {
    Blend,
    Depth,
    Cull,
    Scissor,
    Stencil,
    Viewport,
    ColorMask,
    PolygonOffset,
    PolygonMode,
    LogicOp,
}

impl StandardSlot {
    pub const ALL: [StandardSlot; 10] = [
        StandardSlot::Blend,
        StandardSlot::Depth,
        StandardSlot::Cull,
        StandardSlot::Scissor,
        StandardSlot::Stencil,
        StandardSlot::Viewport,
        StandardSlot::ColorMask,
        StandardSlot::PolygonOffset,
        StandardSlot::PolygonMode,
        StandardSlot::LogicOp,
    ];

    /// Slot identifier in the `void` namespace
    pub fn id(self) -> Identifier {
        let path = match self {
            StandardSlot::Blend => "blend",
            StandardSlot::Depth => "depth",
            StandardSlot::Cull => "cull",
            StandardSlot::Scissor => "scissor",
            StandardSlot::Stencil => "stencil",
            StandardSlot::Viewport => "viewport",
            StandardSlot::ColorMask => "color_mask",
            StandardSlot::PolygonOffset => "polygon_offset",
            StandardSlot::PolygonMode => "polygon_mode",
            StandardSlot::LogicOp => "logic_op",
        };
        Identifier::new_unchecked(void_core::DEFAULT_NAMESPACE, path)
    }

    /// Value used when a setting does not override the slot
    pub fn default_value(self) -> StateValue {
        match self {
            StandardSlot::Blend => StateValue::Blend(BlendState::DISABLED),
            StandardSlot::Depth => StateValue::Depth(DepthState::LESS_EQUAL),
            StandardSlot::Cull => StateValue::Cull(CullState::BACK),
            StandardSlot::Scissor => StateValue::Scissor(ScissorState::Disabled),
            StandardSlot::Stencil => StateValue::Stencil(StencilState::DISABLED),
            StandardSlot::Viewport => StateValue::Viewport(ViewportState::FULL_TARGET),
            StandardSlot::ColorMask => StateValue::ColorMask(ColorMask::ALL),
            StandardSlot::PolygonOffset => StateValue::PolygonOffset(PolygonOffset::DISABLED),
            StandardSlot::PolygonMode => StateValue::PolygonMode(PolygonMode::Fill),
            StandardSlot::LogicOp => StateValue::LogicOp(LogicOp::Disabled),
        }
    }
}

/// One registered slot
#[derive(Clone, Debug)]
pub struct SlotEntry {
    /// Slot identifier
    pub id: Identifier,
    /// Kind every value in this slot must have
    pub kind: StateKind,
    /// Value when not overridden
    pub default: StateValue,
}

/// Sealed, ordered set of state slots
#[derive(Debug)]
pub struct StateComponentTable {
    slots: Vec<SlotEntry>,
    index: HashMap<Identifier, usize>,
}

impl StateComponentTable {
    /// Table with the standard slots
    pub fn standard() -> Arc<Self> {
        StateTableBuilder::with_defaults().build()
    }

    /// Slot index of an identifier
    pub fn slot_of(&self, id: &Identifier) -> Result<usize> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| RenderError::UnregisteredSlot(id.clone()))
    }

    /// Whether the slot is registered
    pub fn contains(&self, id: &Identifier) -> bool {
        self.index.contains_key(id)
    }

    /// Entry at a slot index
    pub fn entry(&self, index: usize) -> &SlotEntry {
        &self.slots[index]
    }

    pub fn kind_of(&self, index: usize) -> StateKind {
        self.slots[index].kind
    }

    pub fn default_value(&self, index: usize) -> StateValue {
        self.slots[index].default
    }

    /// Entries in registration order
    pub fn entries(&self) -> impl Iterator<Item = &SlotEntry> {
        self.slots.iter()
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the table has no slots
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Default values in slot order
    pub fn defaults(&self) -> Box<[StateValue]> {
        self.slots.iter().map(|s| s.default).collect()
    }

    /// Check that `value` may be stored in slot `index`
    pub fn check_kind(&self, index: usize, value: &StateValue) -> Result<()> {
        let entry = &self.slots[index];
        if entry.kind != value.kind() {
            return Err(RenderError::SlotKindMismatch {
                slot: entry.id.clone(),
                expected: entry.kind,
                found: value.kind(),
            });
        }
        Ok(())
    }
}

/// Startup-time table registration
#[derive(Debug, Default)]
pub struct StateTableBuilder {
    slots: Vec<SlotEntry>,
    index: HashMap<Identifier, usize>,
}

impl StateTableBuilder {
    /// Empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder with every [`StandardSlot`] registered
    pub fn with_defaults() -> Self {
        let mut builder = Self::new();
        for slot in StandardSlot::ALL {
            builder.push(slot.id(), slot.default_value());
        }
        builder
    }

    /// Register a slot with its default value
    pub fn register(&mut self, id: Identifier, default: StateValue) -> Result<&mut Self> {
        if self.index.contains_key(&id) {
            return Err(RenderError::DuplicateSlot(id));
        }
        self.push(id, default);
        Ok(self)
    }

    fn push(&mut self, id: Identifier, default: StateValue) {
        self.index.insert(id.clone(), self.slots.len());
        self.slots.push(SlotEntry {
            id,
            kind: default.kind(),
            default,
        });
    }

    /// Number of slots registered so far
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether nothing is registered yet
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Seal the table
    pub fn build(self) -> Arc<StateComponentTable> {
        log::debug!("State component table sealed with {} slots", self.slots.len());
        Arc::new(StateComponentTable {
            slots: self.slots,
            index: self.index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_order() {
        let table = StateComponentTable::standard();
        assert_eq!(table.len(), StandardSlot::ALL.len());
        for (i, slot) in StandardSlot::ALL.iter().enumerate() {
            assert_eq!(table.slot_of(&slot.id()).unwrap(), i);
            assert_eq!(table.entry(i).default, slot.default_value());
        }
    }

    #[test]
    fn test_duplicate_slot_rejected() {
        let mut builder = StateTableBuilder::with_defaults();
        let err = builder
            .register(StandardSlot::Blend.id(), StandardSlot::Blend.default_value())
            .unwrap_err();
        assert!(matches!(err, RenderError::DuplicateSlot(_)));
    }

    #[test]
    fn test_custom_slot_appended() {
        let mut builder = StateTableBuilder::with_defaults();
        let id = Identifier::parse("mymod:overlay_blend").unwrap();
        builder
            .register(id.clone(), StateValue::Blend(BlendState::ADDITIVE))
            .unwrap();
        let table = builder.build();
        assert_eq!(table.slot_of(&id).unwrap(), StandardSlot::ALL.len());
    }

    #[test]
    fn test_unregistered_slot() {
        let table = StateComponentTable::standard();
        let id = Identifier::parse("mymod:unknown").unwrap();
        assert!(matches!(table.slot_of(&id), Err(RenderError::UnregisteredSlot(_))));
    }

    #[test]
    fn test_kind_check() {
        let table = StateComponentTable::standard();
        let blend = table.slot_of(&StandardSlot::Blend.id()).unwrap();
        assert!(table.check_kind(blend, &StateValue::Blend(BlendState::ALPHA)).is_ok());
        assert!(matches!(
            table.check_kind(blend, &StateValue::Depth(DepthState::DISABLED)),
            Err(RenderError::SlotKindMismatch { expected: StateKind::Blend, found: StateKind::Depth, .. })
        ));
    }
}
