//! Instance Collector
//!
//! Dispatches each instance to the strategy of its flow type and gathers the
//! resulting infos into one bucket per flow type. Strategies that support it
//! run on a bounded pool of scoped worker threads in fixed-size chunks;
//! results are reassembled in input order.
//!
//! Failures are local to the instance: an error or panic while collecting is
//! logged and the instance is left out of this frame.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use crossbeam_channel::unbounded;
use void_core::InstanceId;

use super::{FlowRegistry, FlowStrategy, FlowType, InstanceInfo, RenderParameter};
use crate::config::RenderConfig;
use crate::error::panic_message;
use crate::instance::Instance;
use crate::runtime::FrameContext;

/// An instance left out of this frame
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectionFailure {
    pub id: InstanceId,
    pub reason: String,
}

/// Infos of one flow type, in input order
pub struct FlowBucket<'a> {
    pub flow: FlowType,
    pub strategy: Arc<dyn FlowStrategy>,
    pub infos: Vec<InstanceInfo<'a>>,
}

impl std::fmt::Debug for FlowBucket<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowBucket")
            .field("flow", &self.flow)
            .field("infos", &self.infos.len())
            .finish()
    }
}

/// Result of one collection pass
#[derive(Debug, Default)]
pub struct Collection<'a> {
    /// One bucket per flow type, in first-seen order
    pub buckets: Vec<FlowBucket<'a>>,
    pub failures: Vec<CollectionFailure>,
    /// Instances without a registered flow, or declined by their strategy
    pub skipped: usize,
}

impl<'a> Collection<'a> {
    /// Infos collected across all buckets
    pub fn collected(&self) -> usize {
        self.buckets.iter().map(|b| b.infos.len()).sum()
    }

    fn bucket(&mut self, flow: FlowType, strategy: &Arc<dyn FlowStrategy>) -> &mut Vec<InstanceInfo<'a>> {
        let index = match self.buckets.iter().position(|b| b.flow == flow) {
            Some(index) => index,
            None => {
                self.buckets.push(FlowBucket {
                    flow,
                    strategy: Arc::clone(strategy),
                    infos: Vec::new(),
                });
                self.buckets.len() - 1
            }
        };
        &mut self.buckets[index].infos
    }
}

enum Outcome<'a> {
    Collected(InstanceInfo<'a>),
    Skipped,
    Failed(CollectionFailure),
}

fn collect_one<'a>(
    strategy: &dyn FlowStrategy,
    instance: &'a dyn Instance,
    parameter: &'a RenderParameter,
    ctx: &FrameContext,
) -> Outcome<'a> {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        strategy.collect_instance_info(instance, parameter, ctx)
    }));

    match result {
        Ok(Ok(Some(info))) => Outcome::Collected(info),
        Ok(Ok(None)) => Outcome::Skipped,
        Ok(Err(err)) => {
            log::warn!("Instance {} excluded from frame {}: {}", instance.id(), ctx.frame, err);
            Outcome::Failed(CollectionFailure {
                id: instance.id(),
                reason: err.to_string(),
            })
        }
        Err(payload) => {
            let message = panic_message(&*payload);
            log::error!("Instance {} panicked during collection: {}", instance.id(), message);
            Outcome::Failed(CollectionFailure {
                id: instance.id(),
                reason: format!("panic: {}", message),
            })
        }
    }
}

/// Collects instance infos, in parallel where the strategy allows
#[derive(Clone, Debug)]
pub struct InstanceCollector {
    chunk_size: usize,
    workers: usize,
}

impl Default for InstanceCollector {
    fn default() -> Self {
        Self::from_config(&RenderConfig::default())
    }
}

impl InstanceCollector {
    pub fn new(workers: usize, chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            workers: workers.max(1),
        }
    }

    pub fn from_config(config: &RenderConfig) -> Self {
        Self::new(config.worker_threads, config.parallel_chunk_size)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Collect every parameter group of a stage
    pub fn collect<'a>(
        &self,
        registry: &FlowRegistry,
        groups: &[(&'a RenderParameter, Vec<&'a dyn Instance>)],
        ctx: &FrameContext,
    ) -> Collection<'a> {
        let mut collection = Collection::default();

        for &(parameter, ref instances) in groups {
            let flow = parameter.flow_type();
            let Some(strategy) = registry.resolve(&flow) else {
                collection.skipped += instances.len();
                continue;
            };

            let outcomes = if strategy.supports_parallel()
                && self.workers > 1
                && instances.len() > self.chunk_size
            {
                self.collect_parallel(strategy.as_ref(), parameter, instances, ctx)
            } else {
                instances
                    .iter()
                    .map(|&instance| collect_one(strategy.as_ref(), instance, parameter, ctx))
                    .collect()
            };

            for outcome in outcomes {
                match outcome {
                    Outcome::Collected(info) => collection.bucket(flow.clone(), &strategy).push(info),
                    Outcome::Skipped => collection.skipped += 1,
                    Outcome::Failed(failure) => collection.failures.push(failure),
                }
            }
        }

        log::trace!(
            "Collected {} infos in {} buckets ({} skipped, {} failed)",
            collection.collected(),
            collection.buckets.len(),
            collection.skipped,
            collection.failures.len()
        );
        collection
    }

    fn collect_parallel<'a>(
        &self,
        strategy: &dyn FlowStrategy,
        parameter: &'a RenderParameter,
        instances: &[&'a dyn Instance],
        ctx: &FrameContext,
    ) -> Vec<Outcome<'a>> {
        let chunks: Vec<&[&'a dyn Instance]> = instances.chunks(self.chunk_size).collect();
        let workers = self.workers.min(chunks.len());

        let (work_tx, work_rx) = unbounded();
        for (index, chunk) in chunks.iter().enumerate() {
            // Receiver is alive until the scope below ends
            let _ = work_tx.send((index, *chunk));
        }
        drop(work_tx);

        let (result_tx, result_rx) = unbounded();
        let scoped = crossbeam_utils::thread::scope(|scope| {
            for _ in 0..workers {
                let work_rx = work_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move |_| {
                    for (index, chunk) in work_rx.iter() {
                        let outcomes: Vec<Outcome<'a>> = chunk
                            .iter()
                            .map(|&instance| collect_one(strategy, instance, parameter, ctx))
                            .collect();
                        if result_tx.send((index, outcomes)).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(result_tx);

        if scoped.is_err() {
            log::error!("A collection worker panicked; its chunk is missing this frame");
        }

        let mut ordered: Vec<Option<Vec<Outcome<'a>>>> = Vec::new();
        ordered.resize_with(chunks.len(), || None);
        for (index, outcomes) in result_rx.iter() {
            ordered[index] = Some(outcomes);
        }
        ordered.into_iter().flatten().flatten().collect()
    }
}
