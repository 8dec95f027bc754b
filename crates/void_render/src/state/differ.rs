//! Render State Differ
//!
//! Computes the minimal set of state applications between two settings:
//! every table slot whose value changed, in registration order, followed by
//! the shader and render-target bindings when those changed. Runs once per
//! batch boundary, O(slot count).

use std::sync::Arc;
use serde::{Deserialize, Serialize};

use super::setting::RenderSetting;
use crate::batch::{CommandSink, RenderCommand};
use crate::error::{RenderError, Result};

/// Changes needed to go from one setting to the next
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StateDiff {
    /// Changed slot indices, ascending
    pub slots: Vec<usize>,
    /// Shader binding changed
    pub shader: bool,
    /// Render target binding changed
    pub target: bool,
}

impl StateDiff {
    /// Number of apply/bind operations this diff emits
    pub fn len(&self) -> usize {
        self.slots.len() + self.shader as usize + self.target as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Emit the operations, reading values from `next`
    pub fn apply(&self, next: &RenderSetting, sink: &mut dyn CommandSink) {
        let table = next.table();
        for &index in &self.slots {
            next.value_at(index).apply(&table.entry(index).id, sink);
        }
        if self.shader {
            sink.submit(RenderCommand::BindShader(next.shader().clone()));
        }
        if self.target {
            sink.submit(RenderCommand::BindTarget(next.target().clone()));
        }
    }
}

/// Compare two settings slot by slot.
///
/// With no previous setting every slot and both bindings are included.
pub fn diff(previous: Option<&RenderSetting>, next: &RenderSetting) -> Result<StateDiff> {
    let Some(previous) = previous else {
        return Ok(StateDiff {
            slots: (0..next.slots().len()).collect(),
            shader: true,
            target: true,
        });
    };

    if !previous.same_table(next) {
        return Err(RenderError::TableMismatch);
    }

    let slots = previous
        .slots()
        .iter()
        .zip(next.slots())
        .enumerate()
        .filter(|(_, (a, b))| a != b)
        .map(|(index, _)| index)
        .collect();

    Ok(StateDiff {
        slots,
        shader: previous.shader() != next.shader(),
        target: previous.target() != next.target(),
    })
}

/// Running counters of the differ
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DifferStats {
    /// Transitions processed
    pub transitions: u64,
    /// Slot applications and binds emitted
    pub applied: u64,
    /// Slot comparisons that needed no work
    pub skipped: u64,
}

/// Tracks the last applied setting across batch boundaries
#[derive(Debug, Default)]
pub struct StateDiffer {
    last: Option<Arc<RenderSetting>>,
    stats: DifferStats,
}

impl StateDiffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `next` current, emitting only what changed. Returns the number of
    /// operations emitted.
    pub fn transition(
        &mut self,
        next: &Arc<RenderSetting>,
        sink: &mut dyn CommandSink,
    ) -> Result<usize> {
        if let Some(last) = &self.last {
            if Arc::ptr_eq(last, next) {
                self.stats.transitions += 1;
                self.stats.skipped += next.slots().len() as u64 + 2;
                return Ok(0);
            }
        }

        let diff = diff(self.last.as_deref(), next)?;
        diff.apply(next, sink);

        let emitted = diff.len();
        self.stats.transitions += 1;
        self.stats.applied += emitted as u64;
        self.stats.skipped += (next.slots().len() + 2 - emitted) as u64;
        self.last = Some(Arc::clone(next));
        Ok(emitted)
    }

    /// Forget the last setting; the next transition applies everything
    pub fn reset(&mut self) {
        self.last = None;
    }

    /// Setting currently considered applied
    pub fn current(&self) -> Option<&Arc<RenderSetting>> {
        self.last.as_ref()
    }

    pub fn stats(&self) -> &DifferStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::CommandList;
    use crate::state::setting::{RenderTargetBinding, ShaderBinding};
    use crate::state::table::{StandardSlot, StateComponentTable, StateTableBuilder};
    use crate::state::value::*;
    use void_core::Identifier;

    fn base(table: &Arc<crate::state::StateComponentTable>) -> RenderSetting {
        RenderSetting::new(
            table,
            ShaderBinding::new(Identifier::parse("void:shader/solid").unwrap(), 1),
            RenderTargetBinding::main(),
        )
    }

    #[test]
    fn test_equal_settings_emit_nothing() {
        let table = StateComponentTable::standard();
        let a = base(&table);
        let b = base(&table);
        let d = diff(Some(&a), &b).unwrap();
        assert!(d.is_empty());

        let mut list = CommandList::new();
        d.apply(&b, &mut list);
        assert!(list.is_empty());
    }

    #[test]
    fn test_blend_only_change_emits_one_apply() {
        let table = StateComponentTable::standard();
        let a = base(&table);
        let b = a
            .with(&StandardSlot::Blend.id(), StateValue::Blend(BlendState::ALPHA))
            .unwrap();

        let d = diff(Some(&a), &b).unwrap();
        assert_eq!(d.slots, vec![0]);
        assert!(!d.shader && !d.target);

        let mut list = CommandList::new();
        d.apply(&b, &mut list);
        assert_eq!(list.len(), 1);
        match &list.commands()[0] {
            RenderCommand::ApplyState { slot, value } => {
                assert_eq!(*slot, StandardSlot::Blend.id());
                assert_eq!(*value, StateValue::Blend(BlendState::ALPHA));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_single_slot_change_for_every_slot() {
        let table = StateComponentTable::standard();
        let a = base(&table);
        let replacements = [
            StateValue::Blend(BlendState::ADDITIVE),
            StateValue::Depth(DepthState::DISABLED),
            StateValue::Cull(CullState::NONE),
            StateValue::Scissor(ScissorState::Rect { x: 0, y: 0, width: 8, height: 8 }),
            StateValue::Stencil(StencilState { enabled: true, ..StencilState::DISABLED }),
            StateValue::Viewport(ViewportState { x: 0, y: 0, width: 640, height: 480 }),
            StateValue::ColorMask(ColorMask::NONE),
            StateValue::PolygonOffset(PolygonOffset::new(1.0, 1.0)),
            StateValue::PolygonMode(PolygonMode::Line),
            StateValue::LogicOp(LogicOp::Xor),
        ];

        for (slot, value) in StandardSlot::ALL.iter().zip(replacements) {
            let b = a.with(&slot.id(), value).unwrap();
            let d = diff(Some(&a), &b).unwrap();
            assert_eq!(d.len(), 1, "slot {:?}", slot);
        }
    }

    #[test]
    fn test_stream_start_applies_everything_in_order() {
        let table = StateComponentTable::standard();
        let a = Arc::new(base(&table));

        let mut differ = StateDiffer::new();
        let mut list = CommandList::new();
        let emitted = differ.transition(&a, &mut list).unwrap();
        assert_eq!(emitted, table.len() + 2);

        let applied: Vec<_> = list
            .commands()
            .iter()
            .filter_map(|c| match c {
                RenderCommand::ApplyState { slot, .. } => Some(slot.clone()),
                _ => None,
            })
            .collect();
        let expected: Vec<_> = table.entries().map(|e| e.id.clone()).collect();
        assert_eq!(applied, expected);
        assert!(matches!(list.commands()[table.len()], RenderCommand::BindShader(_)));
        assert!(matches!(list.commands()[table.len() + 1], RenderCommand::BindTarget(_)));
    }

    #[test]
    fn test_differ_tracks_last_setting() {
        let table = StateComponentTable::standard();
        let a = Arc::new(base(&table));
        let b = Arc::new(
            a.with(&StandardSlot::Blend.id(), StateValue::Blend(BlendState::ALPHA))
                .unwrap(),
        );

        let mut differ = StateDiffer::new();
        let mut list = CommandList::new();
        differ.transition(&a, &mut list).unwrap();
        list.clear();

        assert_eq!(differ.transition(&b, &mut list).unwrap(), 1);
        assert_eq!(differ.transition(&b, &mut list).unwrap(), 0);
        assert_eq!(list.len(), 1);

        differ.reset();
        assert!(differ.current().is_none());
        assert_eq!(differ.stats().transitions, 3);
    }

    #[test]
    fn test_shader_change_is_a_bind() {
        let table = StateComponentTable::standard();
        let a = base(&table);
        let b = a.with_shader(ShaderBinding::new(Identifier::parse("void:shader/sky").unwrap(), 2));
        let d = diff(Some(&a), &b).unwrap();
        assert!(d.slots.is_empty());
        assert!(d.shader);
        assert!(!d.target);
    }

    #[test]
    fn test_table_mismatch() {
        let a = base(&StateComponentTable::standard());
        let other = StateTableBuilder::with_defaults().build();
        let b = base(&other);
        assert!(matches!(diff(Some(&a), &b), Err(RenderError::TableMismatch)));
    }
}
