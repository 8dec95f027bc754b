//! Batch Grouper
//!
//! Groups collected instance infos into render batches for minimal state
//! changes and uniform uploads:
//!
//! 1. Partition infos by exact [`RenderSetting`] equality, in first-seen
//!    order.
//! 2. Read each instance's uniform values from the hook group of the batch's
//!    shader program.
//! 3. Split each batch into [`UniformBatchGroup`]s of instances whose values
//!    are equal, then bind the groups in order so each carries only the
//!    uniforms that differ from the group before it.
//!
//! Groups must be emitted in the order they are returned, and every group
//! with a non-empty snapshot must upload it. A batch that is not emitted is
//! handed back through [`BatchGrouper::discard`].
//!
//! Hook groups persist across frames; they are rebuilt when the hook
//! registry generation changes.

use std::collections::HashMap;
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use void_core::Identifier;

use crate::flow::InstanceInfo;
use crate::runtime::FrameContext;
use crate::state::RenderSetting;
use crate::uniform::{BaselinePolicy, UniformHookGroup, UniformHookRegistry, UniformValueSnapshot};

/// Instances of a batch that share their uniform values
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UniformBatchGroup {
    /// Every uniform value the members draw with
    pub values: UniformValueSnapshot,
    /// Uniform changes uploaded once before the group is drawn
    pub snapshot: UniformValueSnapshot,
    /// Indices into the batch's infos, ascending
    pub members: Vec<usize>,
}

impl UniformBatchGroup {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Instances drawn with one setting
#[derive(Debug)]
pub struct RenderBatch<'a> {
    pub setting: Arc<RenderSetting>,
    pub infos: Vec<InstanceInfo<'a>>,
    pub uniform_groups: Vec<UniformBatchGroup>,
}

impl<'a> RenderBatch<'a> {
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Infos of one uniform group
    pub fn members<'b>(&'b self, group: &'b UniformBatchGroup) -> impl Iterator<Item = &'b InstanceInfo<'a>> + 'b {
        group.members.iter().map(move |&i| &self.infos[i])
    }
}

/// Statistics about grouping
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GroupingStats {
    /// Render batches produced
    pub batches: u32,
    /// Uniform groups across all batches
    pub uniform_groups: u32,
    /// Instances grouped
    pub instances: u32,
    /// Uniform uploads avoided by sharing snapshots
    pub uploads_saved: u32,
}

impl GroupingStats {
    fn record(&mut self, batches: &[RenderBatch<'_>]) {
        for batch in batches {
            self.batches += 1;
            self.uniform_groups += batch.uniform_groups.len() as u32;
            self.instances += batch.infos.len() as u32;
            self.uploads_saved += (batch.infos.len() - batch.uniform_groups.len()) as u32;
        }
    }
}

/// Groups instance infos by setting and uniform snapshot
#[derive(Debug, Default)]
pub struct BatchGrouper {
    groups: HashMap<Identifier, UniformHookGroup>,
    generation: u64,
    policy: BaselinePolicy,
    stats: GroupingStats,
}

impl BatchGrouper {
    pub fn new(policy: BaselinePolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Start of a collection pass
    pub fn begin_pass(&mut self, registry: &UniformHookRegistry) {
        self.sync(registry);
        for group in self.groups.values_mut() {
            group.begin_pass(self.policy);
        }
        self.stats = GroupingStats::default();
    }

    fn sync(&mut self, registry: &UniformHookRegistry) {
        let generation = registry.generation();
        if generation != self.generation {
            log::debug!(
                "Uniform hooks changed (generation {} -> {}); rebuilding {} hook groups",
                self.generation,
                generation,
                self.groups.len()
            );
            self.groups.clear();
            self.generation = generation;
        }
    }

    /// Group infos into batches. Binding the groups updates the hook caches.
    pub fn group<'a>(
        &mut self,
        infos: Vec<InstanceInfo<'a>>,
        registry: &UniformHookRegistry,
        ctx: &FrameContext,
    ) -> Vec<RenderBatch<'a>> {
        self.sync(registry);

        let mut index: HashMap<Arc<RenderSetting>, usize> = HashMap::new();
        let mut batches: Vec<RenderBatch<'a>> = Vec::new();

        for info in infos {
            match index.get(&info.setting) {
                Some(&i) => batches[i].infos.push(info),
                None => {
                    index.insert(Arc::clone(&info.setting), batches.len());
                    batches.push(RenderBatch {
                        setting: Arc::clone(&info.setting),
                        infos: vec![info],
                        uniform_groups: Vec::new(),
                    });
                }
            }
        }

        for batch in &mut batches {
            let program = &batch.setting.shader().program;
            let group = self
                .groups
                .entry(program.clone())
                .or_insert_with(|| registry.group_for(program));

            let values: Vec<_> = batch
                .infos
                .iter()
                .map(|info| group.values(info.instance, ctx))
                .collect();
            let mut groups = group_by_values(values);
            for uniform_group in &mut groups {
                uniform_group.snapshot = group.bind(&uniform_group.values);
            }
            batch.uniform_groups = groups;
        }

        self.stats.record(&batches);
        log::trace!("Grouped into {} batches", batches.len());
        batches
    }

    /// Forget what a batch would have bound. Called for a batch that is not
    /// emitted, so the next group of its program uploads every value.
    pub fn discard(&mut self, batch: &RenderBatch<'_>) {
        let program = &batch.setting.shader().program;
        if let Some(group) = self.groups.get_mut(program) {
            log::debug!("Batch of {} instances not emitted; resetting uniforms of {}", batch.len(), program);
            group.reset();
        }
    }

    /// Re-partition already grouped batches. Batches with equal settings are
    /// merged and their uniform groups merged by values; a list with
    /// distinct keys is returned unchanged.
    ///
    /// Merging changes the emission order, so after a merge every group
    /// uploads its full values and the hook caches of the affected programs
    /// are reset.
    pub fn regroup<'a>(&mut self, batches: Vec<RenderBatch<'a>>) -> Vec<RenderBatch<'a>> {
        let mut index: HashMap<Arc<RenderSetting>, usize> = HashMap::new();
        let mut merged: Vec<RenderBatch<'a>> = Vec::new();
        let mut changed = false;

        for batch in batches {
            let Some(&i) = index.get(&batch.setting) else {
                index.insert(Arc::clone(&batch.setting), merged.len());
                merged.push(batch);
                continue;
            };
            changed = true;

            let target = &mut merged[i];
            let offset = target.infos.len();
            target.infos.extend(batch.infos);

            for group in batch.uniform_groups {
                let members = group.members.iter().map(|m| m + offset);
                match target
                    .uniform_groups
                    .iter_mut()
                    .find(|g| g.values == group.values)
                {
                    Some(existing) => existing.members.extend(members),
                    None => target.uniform_groups.push(UniformBatchGroup {
                        values: group.values,
                        snapshot: group.snapshot,
                        members: members.collect(),
                    }),
                }
            }
        }

        if changed {
            for batch in &merged {
                if let Some(group) = self.groups.get_mut(&batch.setting.shader().program) {
                    group.reset();
                }
            }
            for group in merged.iter_mut().flat_map(|b| b.uniform_groups.iter_mut()) {
                group.snapshot = group.values.clone();
            }
        }
        merged
    }

    /// Hook group of a program, if one was built
    pub fn hook_group(&self, program: &Identifier) -> Option<&UniformHookGroup> {
        self.groups.get(program)
    }

    pub fn policy(&self) -> BaselinePolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: BaselinePolicy) {
        self.policy = policy;
    }

    /// Statistics since the last `begin_pass`
    pub fn stats(&self) -> &GroupingStats {
        &self.stats
    }
}

fn group_by_values(values: Vec<UniformValueSnapshot>) -> Vec<UniformBatchGroup> {
    let mut index: HashMap<UniformValueSnapshot, usize> = HashMap::new();
    let mut groups: Vec<UniformBatchGroup> = Vec::new();

    for (member, values) in values.into_iter().enumerate() {
        match index.get(&values) {
            Some(&g) => groups[g].members.push(member),
            None => {
                index.insert(values.clone(), groups.len());
                groups.push(UniformBatchGroup {
                    values,
                    snapshot: UniformValueSnapshot::empty(),
                    members: vec![member],
                });
            }
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{ComputeParameter, InfoPayload, RenderParameter};
    use crate::instance::tests::Sample;
    use crate::instance::Instance;
    use crate::state::{BlendState, RenderTargetBinding, ShaderBinding, StandardSlot, StateComponentTable, StateValue};
    use crate::uniform::{HookTarget, UniformHook, UniformValue};

    const SHARED: u64 = 1000;

    fn parameter(blend: BlendState) -> RenderParameter {
        let table = StateComponentTable::standard();
        let setting = RenderSetting::new(
            &table,
            ShaderBinding::new(Identifier::parse("void:shader/solid").unwrap(), 1),
            RenderTargetBinding::main(),
        )
        .with(&StandardSlot::Blend.id(), StateValue::Blend(blend))
        .unwrap();
        RenderParameter::Compute(ComputeParameter {
            setting: Arc::new(setting),
        })
    }

    fn registry() -> UniformHookRegistry {
        let registry = UniformHookRegistry::new();
        registry
            .register(
                HookTarget::All,
                UniformHook::new("tint", 0, |i: &dyn Instance, _: &FrameContext| {
                    let id = i.id().raw();
                    Some(UniformValue::Float(if id >= SHARED { -1.0 } else { id as f32 }))
                }),
            )
            .unwrap();
        registry
    }

    fn infos<'a>(samples: &'a [Sample], parameter: &'a RenderParameter) -> Vec<InstanceInfo<'a>> {
        samples
            .iter()
            .map(|p| InstanceInfo::new(p, parameter, InfoPayload::Custom(Arc::from(Vec::new()))))
            .collect()
    }

    /// Upload each group's snapshot in order and record the uniforms bound
    /// when each member is drawn
    fn replay(batches: &[RenderBatch<'_>]) -> Vec<(u64, HashMap<String, UniformValue>)> {
        let mut bound = HashMap::new();
        let mut seen = Vec::new();
        for batch in batches {
            for group in &batch.uniform_groups {
                for change in group.snapshot.iter() {
                    bound.insert(change.name.to_string(), change.value.clone());
                }
                for info in batch.members(group) {
                    seen.push((info.instance.id().raw(), bound.clone()));
                }
            }
        }
        seen
    }

    fn two_hook_registry() -> UniformHookRegistry {
        let registry = UniformHookRegistry::new();
        registry
            .register(
                HookTarget::All,
                UniformHook::new("a", 0, |i: &dyn Instance, _: &FrameContext| {
                    Some(UniformValue::Float(if i.id().raw() % 2 == 0 { 2.0 } else { 1.0 }))
                }),
            )
            .unwrap();
        registry
            .register(
                HookTarget::All,
                UniformHook::new("b", 1, |i: &dyn Instance, _: &FrameContext| {
                    Some(UniformValue::Float(if i.id().raw() <= 2 { 1.0 } else { 2.0 }))
                }),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_members_draw_with_their_own_values() {
        // (a, b) per instance: (1, 1), (2, 1), (1, 2), (2, 2). Instances 2 and
        // 4 change only `a` relative to their predecessor, yet differ in `b`.
        let samples: Vec<_> = (1..=4).map(Sample::new).collect();
        let parameter = parameter(BlendState::DISABLED);
        let registry = two_hook_registry();
        let mut grouper = BatchGrouper::new(BaselinePolicy::ResetPerPass);
        grouper.begin_pass(&registry);

        let batches = grouper.group(infos(&samples, &parameter), &registry, &FrameContext::default());
        assert_eq!(batches[0].uniform_groups.len(), 4);

        let seen = replay(&batches);
        assert_eq!(seen.len(), 4);
        for (id, bound) in seen {
            let a = if id % 2 == 0 { 2.0 } else { 1.0 };
            let b = if id <= 2 { 1.0 } else { 2.0 };
            assert_eq!(bound["a"], UniformValue::Float(a), "instance {}", id);
            assert_eq!(bound["b"], UniformValue::Float(b), "instance {}", id);
        }
    }

    #[test]
    fn test_equal_values_share_a_group_out_of_order() {
        let samples = vec![Sample::new(1), Sample::new(2), Sample::new(3), Sample::new(5)];
        let parameter = parameter(BlendState::DISABLED);
        let registry = two_hook_registry();
        let mut grouper = BatchGrouper::default();
        grouper.begin_pass(&registry);

        let batches = grouper.group(infos(&samples, &parameter), &registry, &FrameContext::default());
        // 3 and 5 both read (1, 2)
        let groups: Vec<_> = batches[0].uniform_groups.iter().map(|g| g.members.clone()).collect();
        assert_eq!(groups, vec![vec![0], vec![1], vec![2, 3]]);
        assert_eq!(batches[0].uniform_groups[0].snapshot.len(), 2);
        assert_eq!(batches[0].uniform_groups[1].snapshot.len(), 1);
        assert_eq!(batches[0].uniform_groups[2].snapshot.len(), 2);
    }

    #[test]
    fn test_discarded_batch_uploads_again() {
        let samples = vec![Sample::new(1)];
        let parameter = parameter(BlendState::DISABLED);
        let registry = registry();
        let mut grouper = BatchGrouper::new(BaselinePolicy::CarryOver);
        grouper.begin_pass(&registry);

        let batches = grouper.group(infos(&samples, &parameter), &registry, &FrameContext::default());
        assert_eq!(batches[0].uniform_groups[0].snapshot.len(), 1);
        let again = grouper.group(infos(&samples, &parameter), &registry, &FrameContext::default());
        assert!(again[0].uniform_groups[0].snapshot.is_empty());

        grouper.discard(&again[0]);
        let program = Identifier::parse("void:shader/solid").unwrap();
        assert!(grouper.hook_group(&program).unwrap().last_value("tint").is_none());

        let after = grouper.group(infos(&samples, &parameter), &registry, &FrameContext::default());
        assert_eq!(after[0].uniform_groups[0].snapshot.len(), 1);
    }

    #[test]
    fn test_merged_batches_upload_full_values() {
        let first = vec![Sample::new(1), Sample::new(2)];
        let second = vec![Sample::new(3), Sample::new(1)];
        let parameter = parameter(BlendState::DISABLED);
        let registry = registry();
        let mut grouper = BatchGrouper::default();
        grouper.begin_pass(&registry);

        let mut batches = grouper.group(infos(&first, &parameter), &registry, &FrameContext::default());
        batches.extend(grouper.group(infos(&second, &parameter), &registry, &FrameContext::default()));
        let merged = grouper.regroup(batches);

        assert_eq!(merged.len(), 1);
        let groups: Vec<_> = merged[0].uniform_groups.iter().map(|g| g.members.clone()).collect();
        assert_eq!(groups, vec![vec![0, 3], vec![1], vec![2]]);
        for (id, bound) in replay(&merged) {
            assert_eq!(bound["tint"], UniformValue::Float(id as f32), "instance {}", id);
        }

        let program = Identifier::parse("void:shader/solid").unwrap();
        assert!(grouper.hook_group(&program).unwrap().last_value("tint").is_none());
    }

    #[test]
    fn test_shared_uniforms_form_one_group() {
        // 30 shared-value instances each following a distinct one, then 40
        // more distinct ones.
        let mut samples = Vec::new();
        for i in 0..30 {
            samples.push(Sample::new(i + 1));
            samples.push(Sample::new(SHARED + i));
        }
        for i in 30..70 {
            samples.push(Sample::new(i + 1));
        }
        assert_eq!(samples.len(), 100);

        let parameter = parameter(BlendState::DISABLED);
        let registry = registry();
        let mut grouper = BatchGrouper::new(BaselinePolicy::ResetPerPass);
        grouper.begin_pass(&registry);

        let batches = grouper.group(infos(&samples, &parameter), &registry, &FrameContext::default());
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 100);
        assert!(batches[0].uniform_groups.len() >= 2);

        let largest = batches[0].uniform_groups.iter().map(|g| g.len()).max().unwrap();
        assert!(largest >= 30);
        assert_eq!(grouper.stats().instances, 100);
    }

    #[test]
    fn test_partition_first_seen_order() {
        let samples: Vec<_> = (1..=4).map(Sample::new).collect();
        let opaque = parameter(BlendState::DISABLED);
        let blended = parameter(BlendState::ALPHA);

        let infos = vec![
            InstanceInfo::new(&samples[0], &blended, InfoPayload::Custom(Arc::from(Vec::new()))),
            InstanceInfo::new(&samples[1], &opaque, InfoPayload::Custom(Arc::from(Vec::new()))),
            InstanceInfo::new(&samples[2], &blended, InfoPayload::Custom(Arc::from(Vec::new()))),
            InstanceInfo::new(&samples[3], &opaque, InfoPayload::Custom(Arc::from(Vec::new()))),
        ];

        let registry = UniformHookRegistry::new();
        let mut grouper = BatchGrouper::default();
        let batches = grouper.group(infos, &registry, &FrameContext::default());

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].setting, *blended.setting());
        let ids: Vec<_> = batches[0].infos.iter().map(|i| i.instance.id().raw()).collect();
        assert_eq!(ids, vec![1, 3]);

        // No hooks: every instance shares the empty snapshot.
        assert_eq!(batches[1].uniform_groups.len(), 1);
        assert!(batches[1].uniform_groups[0].snapshot.is_empty());
    }

    #[test]
    fn test_regroup_is_idempotent() {
        let samples: Vec<_> = (1..=6).map(Sample::new).collect();
        let a = parameter(BlendState::DISABLED);
        let b = parameter(BlendState::ADDITIVE);
        let mut all = infos(&samples[..3], &a);
        all.extend(infos(&samples[3..], &b));

        let registry = registry();
        let mut grouper = BatchGrouper::default();
        let batches = grouper.group(all, &registry, &FrameContext::default());

        let shape = |batches: &[RenderBatch<'_>]| -> Vec<(usize, Vec<Vec<usize>>)> {
            batches
                .iter()
                .map(|b| (b.len(), b.uniform_groups.iter().map(|g| g.members.clone()).collect()))
                .collect()
        };

        let before = shape(&batches);
        let once = grouper.regroup(batches);
        assert_eq!(shape(&once), before);
        let twice = grouper.regroup(once);
        assert_eq!(shape(&twice), before);
    }

    #[test]
    fn test_regroup_merges_equal_settings() {
        let samples: Vec<_> = (1..=4).map(Sample::new).collect();
        let a = parameter(BlendState::DISABLED);
        let registry = UniformHookRegistry::new();
        let mut grouper = BatchGrouper::default();

        let mut first = grouper.group(infos(&samples[..2], &a), &registry, &FrameContext::default());
        let second = grouper.group(infos(&samples[2..], &a), &registry, &FrameContext::default());
        first.extend(second);
        assert_eq!(first.len(), 2);

        let merged = grouper.regroup(first);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].len(), 4);
        assert_eq!(merged[0].uniform_groups.len(), 1);
        assert_eq!(merged[0].uniform_groups[0].members, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_registry_change_rebuilds_groups() {
        let registry = registry();
        let program = Identifier::parse("void:shader/solid").unwrap();
        let samples = vec![Sample::new(1)];
        let a = parameter(BlendState::DISABLED);

        let mut grouper = BatchGrouper::new(BaselinePolicy::CarryOver);
        grouper.group(infos(&samples, &a), &registry, &FrameContext::default());
        assert_eq!(grouper.hook_group(&program).unwrap().len(), 1);

        registry
            .register(
                HookTarget::All,
                UniformHook::new("time", 1, |_: &dyn Instance, ctx: &FrameContext| {
                    Some(UniformValue::Float(ctx.frame as f32))
                }),
            )
            .unwrap();
        grouper.begin_pass(&registry);
        assert!(grouper.hook_group(&program).is_none());

        grouper.group(infos(&samples, &a), &registry, &FrameContext::default());
        assert_eq!(grouper.hook_group(&program).unwrap().len(), 2);
    }
}
