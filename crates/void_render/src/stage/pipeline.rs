//! Stage Pipeline
//!
//! Stages hold registered instances and render in dependency order. Each
//! frame a stage ticks its instances, drops the ones that asked to be
//! discarded, culls against its frustum, collects infos through the flow
//! strategies and emits batches behind the minimal state transitions.
//!
//! ## Frame Phases
//!
//! ```text
//! tick -> discard -> refresh bounds -> visibility -> collect -> group -> emit -> after_draw
//! ```
//!
//! A failure inside one instance (tick error, panic, bad geometry) only
//! removes that instance from the current frame.

use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use crossbeam_channel::unbounded;
use log::{debug, error, trace, warn};
use void_core::{Identifier, InstanceId};

use super::container::{BvhContainer, InstanceContainer, OrderedContainer, Registered};
use super::report::{FrameReport, StageReport};
use crate::batch::{BatchGrouper, CommandList, CommandSink};
use crate::config::RenderConfig;
use crate::error::{panic_message, RenderError, Result};
use crate::flow::{Collection, CollectionFailure, FlowContext, InstanceCollector, RenderParameter};
use crate::geometry::TransientGeometry;
use crate::instance::Instance;
use crate::runtime::{FrameContext, RenderEnvironment};
use crate::spatial::FrustumPlanes;
use crate::state::StateDiffer;

/// Per-stage visibility test applied after frustum culling
pub type VisibilityPredicate = Box<dyn Fn(&dyn Instance, &FrameContext) -> bool + Send + Sync>;

/// A named group of instances rendered together
pub struct Stage {
    id: Identifier,
    container: Box<dyn InstanceContainer>,
    /// Stages that must render before this one
    after: Vec<Identifier>,
    visibility: Option<VisibilityPredicate>,
    frustum: Option<FrustumPlanes>,
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("id", &self.id)
            .field("instances", &self.container.len())
            .field("after", &self.after)
            .field("visibility", &self.visibility.is_some())
            .field("frustum", &self.frustum.is_some())
            .finish()
    }
}

impl Stage {
    pub fn new(id: Identifier, container: Box<dyn InstanceContainer>) -> Self {
        Self {
            id,
            container,
            after: Vec::new(),
            visibility: None,
            frustum: None,
        }
    }

    /// Stage keeping instances in registration order
    pub fn ordered(id: Identifier) -> Self {
        Self::new(id, Box::new(OrderedContainer::new()))
    }

    /// Stage culling through a bounding volume hierarchy
    pub fn with_bvh(id: Identifier, margin: f32) -> Self {
        Self::new(id, Box::new(BvhContainer::new(margin)))
    }

    /// Render after `dependency`
    pub fn after(mut self, dependency: Identifier) -> Self {
        if !self.after.contains(&dependency) {
            self.after.push(dependency);
        }
        self
    }

    pub fn with_visibility<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&dyn Instance, &FrameContext) -> bool + Send + Sync + 'static,
    {
        self.visibility = Some(Box::new(predicate));
        self
    }

    pub fn with_frustum(mut self, frustum: FrustumPlanes) -> Self {
        self.frustum = Some(frustum);
        self
    }

    pub fn set_frustum(&mut self, frustum: Option<FrustumPlanes>) {
        self.frustum = frustum;
    }

    pub fn frustum(&self) -> Option<&FrustumPlanes> {
        self.frustum.as_ref()
    }

    pub fn id(&self) -> &Identifier {
        &self.id
    }

    pub fn dependencies(&self) -> &[Identifier] {
        &self.after
    }

    /// Register an instance; an existing entry with the same id is replaced
    pub fn insert(&mut self, instance: Box<dyn Instance>, parameter: RenderParameter) {
        self.container.insert(Registered::new(instance, parameter));
    }

    pub fn remove(&mut self, id: InstanceId) -> Option<Registered> {
        self.container.remove(id)
    }

    pub fn container(&self) -> &dyn InstanceContainer {
        self.container.as_ref()
    }

    pub fn container_mut(&mut self) -> &mut dyn InstanceContainer {
        self.container.as_mut()
    }

    pub fn len(&self) -> usize {
        self.container.len()
    }

    pub fn is_empty(&self) -> bool {
        self.container.is_empty()
    }
}

/// Shared per-frame machinery, kept apart from the stage list so a stage can
/// be borrowed mutably while it renders
struct FrameState {
    grouper: BatchGrouper,
    differ: StateDiffer,
    geometry: TransientGeometry,
    collector: InstanceCollector,
}

/// Ordered set of stages plus the state that persists between frames
pub struct StagePipeline {
    stages: Vec<Stage>,
    /// Resolved execution order, cleared whenever stages change
    order: Option<Vec<usize>>,
    state: FrameState,
}

impl std::fmt::Debug for StagePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagePipeline")
            .field("stages", &self.stages)
            .field("order_resolved", &self.order.is_some())
            .finish()
    }
}

impl StagePipeline {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            stages: Vec::new(),
            order: None,
            state: FrameState {
                grouper: BatchGrouper::new(config.uniform_baseline),
                differ: StateDiffer::new(),
                geometry: TransientGeometry::new(config),
                collector: InstanceCollector::from_config(config),
            },
        }
    }

    /// Add a stage. Ordering is resolved lazily on the next frame.
    pub fn add_stage(&mut self, stage: Stage) -> Result<()> {
        if self.stages.iter().any(|s| s.id == stage.id) {
            return Err(RenderError::DuplicateStage(stage.id));
        }
        debug!("Added stage {} ({} dependencies)", stage.id, stage.after.len());
        self.stages.push(stage);
        self.order = None;
        Ok(())
    }

    pub fn remove_stage(&mut self, id: &Identifier) -> Option<Stage> {
        let index = self.stages.iter().position(|s| &s.id == id)?;
        self.order = None;
        Some(self.stages.remove(index))
    }

    pub fn stage(&self, id: &Identifier) -> Option<&Stage> {
        self.stages.iter().find(|s| &s.id == id)
    }

    pub fn stage_mut(&mut self, id: &Identifier) -> Option<&mut Stage> {
        self.stages.iter_mut().find(|s| &s.id == id)
    }

    pub fn stages(&self) -> impl Iterator<Item = &Stage> {
        self.stages.iter()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stage ids in execution order
    pub fn order(&mut self) -> Result<Vec<Identifier>> {
        let order = self.resolved_order()?;
        Ok(order.iter().map(|&i| self.stages[i].id.clone()).collect())
    }

    /// Apply a changed configuration between frames
    pub fn reconfigure(&mut self, config: &RenderConfig) {
        self.state.geometry.resize(config);
        self.state.collector = InstanceCollector::from_config(config);
        self.state.grouper.set_policy(config.uniform_baseline);
    }

    /// Forget the bound state so the next frame re-applies everything
    pub fn reset_state(&mut self) {
        self.state.differ.reset();
    }

    pub fn differ(&self) -> &StateDiffer {
        &self.state.differ
    }

    pub fn geometry(&self) -> &TransientGeometry {
        &self.state.geometry
    }

    fn resolved_order(&mut self) -> Result<Vec<usize>> {
        if let Some(order) = &self.order {
            return Ok(order.clone());
        }
        let order = self.resolve_order()?;
        trace!("Stage order resolved: {} stages", order.len());
        self.order = Some(order.clone());
        Ok(order)
    }

    /// Depth-first topological sort; ties keep insertion order
    fn resolve_order(&self) -> Result<Vec<usize>> {
        let mut order = Vec::with_capacity(self.stages.len());
        let mut visited = HashSet::new();
        let mut temp = HashSet::new();

        for index in 0..self.stages.len() {
            self.visit_stage(index, &mut visited, &mut temp, &mut order)?;
        }
        Ok(order)
    }

    fn visit_stage(
        &self,
        index: usize,
        visited: &mut HashSet<usize>,
        temp: &mut HashSet<usize>,
        order: &mut Vec<usize>,
    ) -> Result<()> {
        if visited.contains(&index) {
            return Ok(());
        }
        let stage = &self.stages[index];
        if temp.contains(&index) {
            return Err(RenderError::StageCycle(stage.id.clone()));
        }

        temp.insert(index);
        for dependency in &stage.after {
            let Some(dep_index) = self.stages.iter().position(|s| &s.id == dependency) else {
                return Err(RenderError::UnknownStageDependency {
                    stage: stage.id.clone(),
                    dependency: dependency.clone(),
                });
            };
            self.visit_stage(dep_index, visited, temp, order)?;
        }
        temp.remove(&index);
        visited.insert(index);
        order.push(index);
        Ok(())
    }

    /// Run every stage once and submit the resulting commands to `sink`
    pub fn render_frame(
        &mut self,
        env: &RenderEnvironment,
        ctx: &FrameContext,
        sink: &mut dyn CommandSink,
    ) -> Result<FrameReport> {
        let order = self.resolved_order()?;
        let config = env.config();

        if config.grow_transient_buffers && self.state.geometry.grow_for_next_frame() {
            debug!("Transient buffers grown after overflow");
        }
        self.state.geometry.begin_frame();
        self.state.grouper.set_policy(config.uniform_baseline);

        let mut report = FrameReport {
            frame: ctx.frame,
            ..Default::default()
        };
        for index in order {
            let stage = &mut self.stages[index];
            report.stages.push(self.state.render_stage(stage, env, ctx, sink)?);
        }
        report.transient = self.state.geometry.stats();
        report.differ = self.state.differ.stats().clone();

        debug!(
            "Frame {}: {} stages, {} batches, {} state changes, {} dropped",
            ctx.frame,
            report.stages.len(),
            report.stages.iter().map(|s| s.batches).sum::<usize>(),
            report.stages.iter().map(|s| s.state_changes).sum::<usize>(),
            report.dropped_batches()
        );
        Ok(report)
    }
}

impl FrameState {
    fn render_stage(
        &mut self,
        stage: &mut Stage,
        env: &RenderEnvironment,
        ctx: &FrameContext,
        sink: &mut dyn CommandSink,
    ) -> Result<StageReport> {
        let config = env.config();
        let mut report = StageReport {
            stage: stage.id.to_string(),
            instances: stage.container.len(),
            ..Default::default()
        };

        let (ticked, tick_failures) = tick_entries(stage.container.entries_mut(), ctx, config);
        report.ticked = ticked;
        let excluded: HashSet<InstanceId> = tick_failures.iter().map(|f| f.id).collect();
        report.failures = tick_failures;

        let discarded = stage
            .container
            .retain(&mut |entry: &Registered| !entry.instance.should_discard());
        if !discarded.is_empty() {
            debug!("Stage {}: discarded {} instances", stage.id, discarded.len());
        }
        report.discarded = discarded.len();
        report.reinserted = stage.container.refresh_bounds();

        // Visible instances grouped by parameter, first-seen order
        let visible = stage.container.query_visible(stage.frustum.as_ref());
        let entries = stage.container.entries();
        let mut groups: Vec<(&RenderParameter, Vec<&dyn Instance>)> = Vec::new();
        let mut group_index: HashMap<&RenderParameter, usize> = HashMap::new();
        for index in visible {
            let entry = &entries[index];
            if excluded.contains(&entry.id()) {
                continue;
            }
            let instance = entry.instance.as_ref();
            if let Some(predicate) = &stage.visibility {
                if !predicate(instance, ctx) {
                    continue;
                }
            }
            report.visible += 1;
            match group_index.get(&entry.parameter) {
                Some(&group) => groups[group].1.push(instance),
                None => {
                    group_index.insert(&entry.parameter, groups.len());
                    groups.push((&entry.parameter, vec![instance]));
                }
            }
        }

        let collection = self.collector.collect(env.flows(), &groups, ctx);
        report.collected = collection.collected();
        let Collection {
            buckets,
            failures,
            skipped,
        } = collection;
        report.skipped = skipped;
        report.failures.extend(failures);

        self.grouper.begin_pass(env.uniforms());
        let mut flow_ctx = FlowContext::new(ctx, &mut self.grouper, &self.geometry, config, env.uniforms());
        let mut batches = Vec::new();
        for bucket in buckets {
            batches.extend(
                bucket
                    .strategy
                    .create_render_commands(bucket.infos, &stage.id, &mut flow_ctx)?,
            );
        }
        report.dropped_batches = flow_ctx.dropped_batches;
        report.failures.extend(flow_ctx.failures);
        report.grouping = self.grouper.stats().clone();
        report.batches = batches.len();

        let mut drawn = HashSet::new();
        for batch in batches {
            let mut transition = CommandList::new();
            report.state_changes += self.differ.transition(&batch.setting, &mut transition)?;
            report.draw.merge(&transition.stats());
            report.draw.merge(&batch.commands.stats());
            for command in transition.into_commands().into_iter().chain(batch.commands.into_commands()) {
                sink.submit(command);
            }
            drawn.extend(batch.instances);
        }

        if !drawn.is_empty() {
            for entry in stage.container.entries_mut() {
                if drawn.contains(&entry.id()) {
                    notify_drawn(entry, ctx);
                }
            }
        }

        trace!(
            "Stage {}: {} visible, {} collected, {} batches, {} state changes",
            stage.id,
            report.visible,
            report.collected,
            report.batches,
            report.state_changes
        );
        Ok(report)
    }
}

fn notify_drawn(entry: &mut Registered, ctx: &FrameContext) {
    let id = entry.id();
    let result = panic::catch_unwind(AssertUnwindSafe(|| entry.instance.after_draw(ctx)));
    if let Err(payload) = result {
        error!("Instance {} panicked after draw: {}", id, panic_message(&*payload));
    }
}

/// Tick one entry. `None` when the instance does not tick.
fn tick_one(entry: &mut Registered, ctx: &FrameContext) -> Option<std::result::Result<(), CollectionFailure>> {
    if !entry.instance.should_tick() {
        return None;
    }
    let id = entry.id();
    let result = panic::catch_unwind(AssertUnwindSafe(|| entry.instance.tick(ctx)));

    Some(match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => {
            warn!("Instance {} failed to tick in frame {}: {}", id, ctx.frame, err);
            Err(CollectionFailure {
                id,
                reason: err.to_string(),
            })
        }
        Err(payload) => {
            let message = panic_message(&*payload);
            error!("Instance {} panicked during tick: {}", id, message);
            Err(CollectionFailure {
                id,
                reason: format!("panic: {}", message),
            })
        }
    })
}

fn tick_chunk(entries: &mut [Registered], ctx: &FrameContext) -> (usize, Vec<CollectionFailure>) {
    let mut ticked = 0;
    let mut failures = Vec::new();
    for entry in entries {
        match tick_one(entry, ctx) {
            Some(Ok(())) => ticked += 1,
            Some(Err(failure)) => failures.push(failure),
            None => {}
        }
    }
    (ticked, failures)
}

/// Tick every entry, on scoped workers when the stage is large enough
fn tick_entries(
    entries: &mut [Registered],
    ctx: &FrameContext,
    config: &RenderConfig,
) -> (usize, Vec<CollectionFailure>) {
    let chunk_size = config.parallel_chunk_size.max(1);
    if !config.parallel_tick || config.worker_threads <= 1 || entries.len() <= chunk_size {
        return tick_chunk(entries, ctx);
    }

    let chunk_count = entries.len().div_ceil(chunk_size);
    let workers = config.worker_threads.min(chunk_count);

    let (work_tx, work_rx) = unbounded();
    for chunk in entries.chunks_mut(chunk_size) {
        // Receiver is alive until the scope below ends
        let _ = work_tx.send(chunk);
    }
    drop(work_tx);

    let (result_tx, result_rx) = unbounded();
    let scoped = crossbeam_utils::thread::scope(|scope| {
        for _ in 0..workers {
            let work_rx = work_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move |_| {
                for chunk in work_rx.iter() {
                    if result_tx.send(tick_chunk(chunk, ctx)).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(result_tx);

    if scoped.is_err() {
        error!("A tick worker panicked; some instances were not ticked this frame");
    }

    let mut ticked = 0;
    let mut failures = Vec::new();
    for (count, chunk_failures) in result_rx.iter() {
        ticked += count;
        failures.extend(chunk_failures);
    }
    failures.sort_by_key(|f| f.id);
    (ticked, failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InstanceError;
    use crate::flow::RasterParameter;
    use crate::geometry::{PrimitiveTopology, VertexLayout};
    use crate::instance::tests::Sample;
    use crate::state::{RenderSetting, RenderTargetBinding, ShaderBinding, StateComponentTable};
    use std::sync::Arc;

    fn raster() -> RenderParameter {
        let table = StateComponentTable::standard();
        let setting = RenderSetting::new(
            &table,
            ShaderBinding::new(Identifier::parse("void:shader/solid").unwrap(), 1),
            RenderTargetBinding::main(),
        );
        RasterParameter::new(Arc::new(setting), VertexLayout::position_color(), PrimitiveTopology::Triangles).into()
    }

    fn id(name: &str) -> Identifier {
        Identifier::parse(&format!("void:stage/{}", name)).unwrap()
    }

    fn order_names(pipeline: &mut StagePipeline) -> Vec<String> {
        pipeline
            .order()
            .unwrap()
            .iter()
            .map(|i| i.to_string())
            .collect()
    }

    #[test]
    fn test_order_follows_dependencies() {
        let mut pipeline = StagePipeline::new(&RenderConfig::default());
        pipeline.add_stage(Stage::ordered(id("ui")).after(id("world"))).unwrap();
        pipeline.add_stage(Stage::ordered(id("sky"))).unwrap();
        pipeline.add_stage(Stage::ordered(id("world")).after(id("sky"))).unwrap();

        assert_eq!(
            order_names(&mut pipeline),
            vec!["void:stage/sky", "void:stage/world", "void:stage/ui"]
        );
    }

    #[test]
    fn test_independent_stages_keep_insertion_order() {
        let mut pipeline = StagePipeline::new(&RenderConfig::default());
        for name in ["b", "a", "c"] {
            pipeline.add_stage(Stage::ordered(id(name))).unwrap();
        }
        assert_eq!(
            order_names(&mut pipeline),
            vec!["void:stage/b", "void:stage/a", "void:stage/c"]
        );
    }

    #[test]
    fn test_duplicate_stage_rejected() {
        let mut pipeline = StagePipeline::new(&RenderConfig::default());
        pipeline.add_stage(Stage::ordered(id("world"))).unwrap();
        let err = pipeline.add_stage(Stage::ordered(id("world"))).unwrap_err();
        assert!(matches!(err, RenderError::DuplicateStage(_)));
    }

    #[test]
    fn test_cycle_and_unknown_dependency() {
        let mut pipeline = StagePipeline::new(&RenderConfig::default());
        pipeline.add_stage(Stage::ordered(id("a")).after(id("b"))).unwrap();
        pipeline.add_stage(Stage::ordered(id("b")).after(id("a"))).unwrap();
        assert!(matches!(pipeline.order(), Err(RenderError::StageCycle(_))));

        let mut pipeline = StagePipeline::new(&RenderConfig::default());
        pipeline.add_stage(Stage::ordered(id("a")).after(id("missing"))).unwrap();
        assert!(matches!(
            pipeline.order(),
            Err(RenderError::UnknownStageDependency { .. })
        ));
    }

    struct Ticker {
        inner: Sample,
        fail_tick: bool,
    }

    impl Instance for Ticker {
        fn id(&self) -> InstanceId {
            self.inner.id
        }

        fn should_tick(&self) -> bool {
            true
        }

        fn tick(&mut self, _ctx: &FrameContext) -> std::result::Result<(), InstanceError> {
            if self.fail_tick {
                return Err(InstanceError::from("simulation diverged"));
            }
            if self.inner.panic {
                panic!("ticker {} panicked", self.inner.id);
            }
            self.inner.ticks += 1;
            Ok(())
        }
    }

    fn tickers(count: u64) -> Vec<Registered> {
        (0..count)
            .map(|i| {
                let mut inner = Sample::new(i);
                inner.panic = i == 40;
                let ticker = Ticker {
                    inner,
                    fail_tick: i == 7,
                };
                Registered::new(Box::new(ticker), raster())
            })
            .collect()
    }

    #[test]
    fn test_tick_failures_sequential_and_parallel_agree() {
        let ctx = FrameContext::default();

        let sequential_config = RenderConfig {
            parallel_tick: false,
            ..Default::default()
        };
        let mut sequential = tickers(100);
        let (ticked, failures) = tick_entries(&mut sequential, &ctx, &sequential_config);
        assert_eq!(ticked, 98);
        let failed: Vec<u64> = failures.iter().map(|f| f.id.raw()).collect();
        assert_eq!(failed, vec![7, 40]);

        let parallel_config = RenderConfig {
            parallel_tick: true,
            worker_threads: 4,
            parallel_chunk_size: 8,
            ..Default::default()
        };
        let mut parallel = tickers(100);
        let (ticked, failures) = tick_entries(&mut parallel, &ctx, &parallel_config);
        assert_eq!(ticked, 98);
        let failed: Vec<u64> = failures.iter().map(|f| f.id.raw()).collect();
        assert_eq!(failed, vec![7, 40]);
        assert!(failures[1].reason.starts_with("panic"));
    }
}
