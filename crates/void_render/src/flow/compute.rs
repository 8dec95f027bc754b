//! Compute flow
//!
//! Dispatches instances exposing a dispatch facet. Batches follow the same
//! setting and uniform grouping as draws; each member becomes one direct or
//! indirect dispatch.

use std::sync::Arc;
use void_core::Identifier;

use super::{BatchCommands, FlowContext, FlowStrategy, FlowType, InfoPayload, InstanceInfo, RenderParameter};
use crate::batch::{CommandSink, RenderCommand};
use crate::error::{RenderError, Result};
use crate::instance::{DispatchCall, Instance};
use crate::runtime::FrameContext;

/// Built-in compute dispatch flow
#[derive(Clone, Copy, Debug, Default)]
pub struct ComputeFlow;

impl ComputeFlow {
    pub fn new() -> Self {
        Self
    }
}

impl FlowStrategy for ComputeFlow {
    fn flow_type(&self) -> FlowType {
        FlowType::compute()
    }

    fn supports_parallel(&self) -> bool {
        true
    }

    fn collect_instance_info<'a>(
        &self,
        instance: &'a dyn Instance,
        parameter: &'a RenderParameter,
        ctx: &FrameContext,
    ) -> Result<Option<InstanceInfo<'a>>> {
        if !matches!(parameter, RenderParameter::Compute(_)) {
            return Ok(None);
        }
        let Some(provider) = instance.dispatch() else {
            return Ok(None);
        };

        let id = instance.id();
        let call = provider
            .dispatch_call(ctx)
            .map_err(|source| RenderError::Instance { id, source })?;

        if let DispatchCall::Direct { groups } = call {
            if groups.contains(&0) {
                log::trace!("Instance {} dispatches no workgroups this frame", id);
                return Ok(None);
            }
        }
        Ok(Some(InstanceInfo::new(instance, parameter, InfoPayload::Dispatch(call))))
    }

    fn create_render_commands<'a>(
        &self,
        infos: Vec<InstanceInfo<'a>>,
        stage: &Identifier,
        ctx: &mut FlowContext<'_>,
    ) -> Result<Vec<BatchCommands>> {
        let batches = ctx.grouper.group(infos, ctx.uniforms, ctx.frame);
        let mut out = Vec::with_capacity(batches.len());

        for batch in &batches {
            let mut commands = BatchCommands::new(Arc::clone(&batch.setting));
            for group in &batch.uniform_groups {
                if !group.snapshot.is_empty() {
                    commands
                        .commands
                        .submit(RenderCommand::SetUniforms(group.snapshot.clone()));
                }
                for info in batch.members(group) {
                    let InfoPayload::Dispatch(call) = &info.payload else {
                        continue;
                    };
                    commands.commands.submit(match *call {
                        DispatchCall::Direct { groups } => RenderCommand::Dispatch { groups },
                        DispatchCall::Indirect { buffer, offset } => RenderCommand::DispatchIndirect { buffer, offset },
                    });
                    commands.instances.push(info.instance.id());
                }
            }

            log::trace!(
                "Stage {}: compute batch of {} dispatches",
                stage,
                commands.instances.len()
            );
            out.push(commands);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{BatchGrouper, BufferHandle};
    use crate::config::RenderConfig;
    use crate::error::InstanceError;
    use crate::flow::ComputeParameter;
    use crate::geometry::TransientGeometry;
    use crate::instance::DispatchProvider;
    use crate::state::{RenderSetting, RenderTargetBinding, ShaderBinding, StateComponentTable};
    use crate::uniform::{HookTarget, UniformHook, UniformHookRegistry, UniformValue};
    use void_core::InstanceId;

    struct Simulation {
        id: InstanceId,
        call: Option<DispatchCall>,
    }

    impl Instance for Simulation {
        fn id(&self) -> InstanceId {
            self.id
        }

        fn dispatch(&self) -> Option<&dyn DispatchProvider> {
            Some(self)
        }
    }

    impl DispatchProvider for Simulation {
        fn dispatch_call(&self, _ctx: &FrameContext) -> std::result::Result<DispatchCall, InstanceError> {
            self.call.ok_or_else(|| InstanceError::from("simulation buffers not ready"))
        }
    }

    fn parameter() -> RenderParameter {
        let table = StateComponentTable::standard();
        let setting = RenderSetting::new(
            &table,
            ShaderBinding::new(Identifier::parse("void:shader/particles").unwrap(), 9),
            RenderTargetBinding::main(),
        );
        ComputeParameter {
            setting: Arc::new(setting),
        }
        .into()
    }

    #[test]
    fn test_direct_and_indirect_dispatch() {
        let sims = [
            Simulation {
                id: InstanceId::from_raw(1),
                call: Some(DispatchCall::Direct { groups: [8, 8, 1] }),
            },
            Simulation {
                id: InstanceId::from_raw(2),
                call: Some(DispatchCall::Indirect {
                    buffer: BufferHandle(40),
                    offset: 12,
                }),
            },
            Simulation {
                id: InstanceId::from_raw(3),
                call: Some(DispatchCall::Direct { groups: [0, 1, 1] }),
            },
        ];
        let parameter = parameter();
        let flow = ComputeFlow::new();
        let frame = FrameContext::default();
        let infos: Vec<_> = sims
            .iter()
            .filter_map(|s| flow.collect_instance_info(s, &parameter, &frame).unwrap())
            .collect();
        assert_eq!(infos.len(), 2);

        let config = RenderConfig::default();
        let mut grouper = BatchGrouper::default();
        let geometry = TransientGeometry::new(&config);
        let uniforms = UniformHookRegistry::new();
        let mut ctx = FlowContext::new(&frame, &mut grouper, &geometry, &config, &uniforms);
        let stage = Identifier::parse("void:stage/simulate").unwrap();
        let batches = flow.create_render_commands(infos, &stage, &mut ctx).unwrap();

        assert_eq!(batches.len(), 1);
        assert_eq!(
            batches[0].commands.commands(),
            &[
                RenderCommand::Dispatch { groups: [8, 8, 1] },
                RenderCommand::DispatchIndirect {
                    buffer: BufferHandle(40),
                    offset: 12
                },
            ]
        );
    }

    #[test]
    fn test_dispatches_bind_their_own_uniforms() {
        let sims: Vec<_> = (1..=4)
            .map(|id| Simulation {
                id: InstanceId::from_raw(id),
                call: Some(DispatchCall::Direct { groups: [id as u32, 1, 1] }),
            })
            .collect();
        let uniforms = UniformHookRegistry::new();
        uniforms
            .register(
                HookTarget::All,
                UniformHook::new("tint", 0, |i: &dyn Instance, _: &FrameContext| {
                    Some(UniformValue::Float(if i.id().raw() == 2 { 2.0 } else { 1.0 }))
                }),
            )
            .unwrap();

        let parameter = parameter();
        let flow = ComputeFlow::new();
        let frame = FrameContext::default();
        let infos: Vec<_> = sims
            .iter()
            .filter_map(|s| flow.collect_instance_info(s, &parameter, &frame).unwrap())
            .collect();

        let config = RenderConfig::default();
        let mut grouper = BatchGrouper::default();
        grouper.begin_pass(&uniforms);
        let geometry = TransientGeometry::new(&config);
        let mut ctx = FlowContext::new(&frame, &mut grouper, &geometry, &config, &uniforms);
        let stage = Identifier::parse("void:stage/simulate").unwrap();
        let batches = flow.create_render_commands(infos, &stage, &mut ctx).unwrap();

        // Dispatch width carries the instance id
        let mut tint = None;
        let mut seen = Vec::new();
        for command in batches[0].commands.commands() {
            match command {
                RenderCommand::SetUniforms(snapshot) => {
                    if let Some(change) = snapshot.get("tint") {
                        tint = Some(change.value.clone());
                    }
                }
                RenderCommand::Dispatch { groups } => seen.push((groups[0], tint.clone())),
                _ => {}
            }
        }
        seen.sort_by_key(|(id, _)| *id);
        let one = Some(UniformValue::Float(1.0));
        let two = Some(UniformValue::Float(2.0));
        assert_eq!(seen, vec![(1, one.clone()), (2, two), (3, one.clone()), (4, one)]);
    }

    #[test]
    fn test_dispatch_error_is_instance_local() {
        let sim = Simulation {
            id: InstanceId::from_raw(5),
            call: None,
        };
        let err = ComputeFlow::new()
            .collect_instance_info(&sim, &parameter(), &FrameContext::default())
            .unwrap_err();
        assert!(matches!(err, RenderError::Instance { id, .. } if id == InstanceId::from_raw(5)));
    }
}
