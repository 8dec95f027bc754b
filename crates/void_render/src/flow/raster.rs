//! Raster flow
//!
//! Draws instances exposing a mesh facet. Each batch concatenates the vertex
//! data of its instances into one transient vertex stream (indexed when the
//! topology needs synthesized indices or any instance brings its own), with
//! one draw range per uniform group. Instances with per-instance data are
//! drawn separately with hardware instancing.
//!
//! A batch whose data does not fit the transient buffers is dropped for the
//! frame as a whole.

use std::sync::Arc;
use void_core::Identifier;

use super::{
    BatchCommands, CollectionFailure, FlowContext, FlowStrategy, FlowType, InfoPayload, InstanceInfo,
    RasterParameter, RenderParameter,
};
use crate::batch::{
    BufferSlice, CommandList, CommandSink, DrawIndexedIndirectArgs, DrawIndirectArgs, IndirectCommandBuffer,
    RenderBatch, RenderCommand,
};
use crate::config::RenderConfig;
use crate::error::{InstanceError, RenderError, Result};
use crate::geometry::{BuiltGeometry, DistanceToPoint, DrawRange, GeometryBuilder, PrimitiveTopology, TransientGeometry};
use crate::instance::{Instance, PerInstanceData, PreparedMesh};
use crate::runtime::FrameContext;
use crate::uniform::UniformValueSnapshot;

/// Uploaded vertex stream of a batch
#[derive(Clone, Copy)]
struct Stream {
    vertices: BufferSlice,
    indices: Option<BufferSlice>,
}

struct InstancedDraw {
    geometry: BuiltGeometry,
    data: PerInstanceData,
}

/// Draws of one uniform group
struct GroupPlan<'s> {
    snapshot: &'s UniformValueSnapshot,
    range: Option<DrawRange>,
    instanced: Vec<InstancedDraw>,
}

fn push_mesh(builder: &mut GeometryBuilder, mesh: &PreparedMesh) -> Result<u32> {
    match &mesh.indices {
        Some(indices) => builder.push_indexed(&mesh.vertices, indices),
        None => builder.push_vertices(&mesh.vertices),
    }
}

fn build_single(raster: &RasterParameter, mesh: &PreparedMesh, config: &RenderConfig) -> Result<BuiltGeometry> {
    let mut builder = GeometryBuilder::new(raster.layout.clone(), raster.topology)
        .indexed(mesh.indices.is_some())
        .with_line_width(config.thick_line_width);
    push_mesh(&mut builder, mesh)?;
    Ok(builder.finish())
}

fn upload_geometry(
    geometry: &TransientGeometry,
    built: BuiltGeometry,
    commands: &mut CommandList,
) -> Result<Option<Stream>> {
    if built.vertices.is_empty() {
        return Ok(None);
    }
    let BuiltGeometry { vertices, indices, .. } = built;

    let (vertices, upload) = geometry.vertex.upload(Arc::from(vertices))?;
    commands.submit(upload);

    let indices = match indices {
        Some(indices) => {
            let bytes: &[u8] = bytemuck::cast_slice(&indices);
            let (slice, upload) = geometry.index.upload(Arc::from(bytes))?;
            commands.submit(upload);
            Some(slice)
        }
        None => None,
    };

    Ok(Some(Stream { vertices, indices }))
}

fn flush_indirect(
    indirect: &mut IndirectCommandBuffer,
    stream: Option<Stream>,
    topology: PrimitiveTopology,
    geometry: &TransientGeometry,
    commands: &mut CommandList,
) -> Result<()> {
    let Some(stream) = stream else {
        return Ok(());
    };
    if indirect.is_empty() {
        return Ok(());
    }

    let (arguments, upload) = geometry.indirect.upload(Arc::from(indirect.as_bytes()))?;
    commands.submit(upload);
    commands.submit(RenderCommand::DrawIndirect {
        topology,
        vertices: stream.vertices,
        indices: if indirect.is_indexed() { stream.indices } else { None },
        arguments,
        draw_count: indirect.len() as u32,
    });
    indirect.reset();
    Ok(())
}

/// Built-in mesh drawing flow
#[derive(Clone, Copy, Debug, Default)]
pub struct RasterFlow;

impl RasterFlow {
    pub fn new() -> Self {
        Self
    }

    /// Build and emit one batch. `Ok(None)` when nothing in it was drawable.
    fn emit_batch(
        &self,
        raster: &RasterParameter,
        batch: &RenderBatch<'_>,
        ctx: &mut FlowContext<'_>,
    ) -> Result<Option<BatchCommands>> {
        let config = ctx.config;
        let needs_indices = batch.infos.iter().any(|info| {
            matches!(&info.payload, InfoPayload::Mesh { mesh, instances: None } if mesh.indices.is_some())
        });
        let mut builder = GeometryBuilder::new(raster.layout.clone(), raster.topology)
            .indexed(needs_indices)
            .with_line_width(config.thick_line_width);

        let sort = raster.sort && config.sorting_enabled && raster.topology.supports_sorting();
        let camera = DistanceToPoint {
            point: ctx.frame.camera_position,
        };

        let mut drawn = Vec::with_capacity(batch.len());
        let mut plan = Vec::with_capacity(batch.uniform_groups.len());

        for group in &batch.uniform_groups {
            let mut instanced = Vec::new();
            for info in batch.members(group) {
                let InfoPayload::Mesh { mesh, instances } = &info.payload else {
                    continue;
                };
                let pushed = match instances {
                    Some(data) => build_single(raster, mesh, config).map(|geometry| {
                        instanced.push(InstancedDraw {
                            geometry,
                            data: data.clone(),
                        })
                    }),
                    None => push_mesh(&mut builder, mesh).map(|_| ()),
                };

                let id = info.instance.id();
                match pushed {
                    Ok(()) => drawn.push(id),
                    Err(err) => {
                        log::warn!("Instance {} geometry rejected: {}", id, err);
                        ctx.failures.push(CollectionFailure {
                            id,
                            reason: err.to_string(),
                        });
                    }
                }
            }

            if sort {
                builder.sort_pending(&camera);
            }
            plan.push(GroupPlan {
                snapshot: &group.snapshot,
                range: builder.flush(),
                instanced,
            });
        }

        if drawn.is_empty() {
            return Ok(None);
        }

        let geometry = ctx.geometry;
        let topology = raster.topology.backend_topology();
        let mut out = BatchCommands::new(Arc::clone(&batch.setting));
        let stream = upload_geometry(geometry, builder.finish(), &mut out.commands)?;
        let mut indirect = IndirectCommandBuffer::new();

        for group in plan {
            if !group.snapshot.is_empty() {
                flush_indirect(&mut indirect, stream, topology, geometry, &mut out.commands)?;
                out.commands
                    .submit(RenderCommand::SetUniforms(group.snapshot.clone()));
            }

            if let (Some(range), Some(stream)) = (group.range, stream) {
                match (stream.indices, config.indirect_draws) {
                    (Some(_), true) => {
                        indirect.push_indexed(DrawIndexedIndirectArgs {
                            index_count: range.index_count,
                            instance_count: 1,
                            first_index: range.first_index,
                            base_vertex: 0,
                            first_instance: 0,
                        });
                    }
                    (None, true) => {
                        indirect.push_draw(DrawIndirectArgs {
                            vertex_count: range.vertex_count,
                            instance_count: 1,
                            first_vertex: range.first_vertex,
                            first_instance: 0,
                        });
                    }
                    (Some(indices), false) => out.commands.submit(RenderCommand::DrawIndexed {
                        topology,
                        vertices: stream.vertices,
                        indices,
                        first_index: range.first_index,
                        index_count: range.index_count,
                        base_vertex: 0,
                    }),
                    (None, false) => out.commands.submit(RenderCommand::Draw {
                        topology,
                        vertices: stream.vertices,
                        first_vertex: range.first_vertex,
                        vertex_count: range.vertex_count,
                    }),
                }
            }

            if group.instanced.is_empty() {
                continue;
            }
            flush_indirect(&mut indirect, stream, topology, geometry, &mut out.commands)?;
            for draw in group.instanced {
                let element_count = draw
                    .geometry
                    .ranges
                    .first()
                    .map(|r| if draw.geometry.indices.is_some() { r.index_count } else { r.vertex_count })
                    .unwrap_or(0);
                let Some(mesh) = upload_geometry(geometry, draw.geometry, &mut out.commands)? else {
                    continue;
                };
                let (instances, upload) = geometry.instance.upload(Arc::clone(&draw.data.bytes))?;
                out.commands.submit(upload);
                out.commands.submit(RenderCommand::DrawInstanced {
                    topology,
                    vertices: mesh.vertices,
                    indices: mesh.indices,
                    instances,
                    element_count,
                    instance_count: draw.data.count,
                });
            }
        }
        flush_indirect(&mut indirect, stream, topology, geometry, &mut out.commands)?;

        out.instances = drawn;
        Ok(Some(out))
    }
}

impl FlowStrategy for RasterFlow {
    fn flow_type(&self) -> FlowType {
        FlowType::raster()
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
        let RenderParameter::Raster(raster) = parameter else {
            return Ok(None);
        };
        let Some(provider) = instance.mesh() else {
            log::trace!("Instance {} has no mesh; not drawn by the raster flow", instance.id());
            return Ok(None);
        };

        let id = instance.id();
        let mesh = provider
            .prepared_mesh(ctx)
            .map_err(|source| RenderError::Instance { id, source })?;

        let expected = mesh.vertex_count as usize * raster.layout.stride();
        if mesh.vertices.len() != expected {
            return Err(RenderError::Instance {
                id,
                source: InstanceError(format!(
                    "{} vertex bytes for {} vertices of stride {}",
                    mesh.vertices.len(),
                    mesh.vertex_count,
                    raster.layout.stride()
                )),
            });
        }

        if mesh.indices.is_none() && !raster.topology.is_whole(mesh.vertex_count as usize) {
            return Err(RenderError::Instance {
                id,
                source: InstanceError(format!(
                    "{} vertices do not form whole {:?} primitives of {}",
                    mesh.vertex_count,
                    raster.topology,
                    raster.topology.vertices_per_primitive()
                )),
            });
        }

        let instances = instance.instance_data().map(|provider| provider.per_instance());
        Ok(Some(InstanceInfo::new(
            instance,
            parameter,
            InfoPayload::Mesh { mesh, instances },
        )))
    }

    fn create_render_commands<'a>(
        &self,
        infos: Vec<InstanceInfo<'a>>,
        stage: &Identifier,
        ctx: &mut FlowContext<'_>,
    ) -> Result<Vec<BatchCommands>> {
        // One vertex stream needs one layout and topology
        let mut partitions: Vec<(&'a RenderParameter, Vec<InstanceInfo<'a>>)> = Vec::new();
        for info in infos {
            let parameter = info.parameter;
            match partitions
                .iter_mut()
                .find(|(p, _)| std::ptr::eq(*p, parameter) || **p == *parameter)
            {
                Some((_, members)) => members.push(info),
                None => partitions.push((parameter, vec![info])),
            }
        }

        let mut out = Vec::new();
        for (parameter, infos) in partitions {
            let RenderParameter::Raster(raster) = parameter else {
                continue;
            };
            let batches = ctx.grouper.group(infos, ctx.uniforms, ctx.frame);

            for batch in &batches {
                match self.emit_batch(raster, batch, ctx) {
                    Ok(Some(commands)) => {
                        log::trace!(
                            "Stage {}: raster batch of {} instances, {} commands",
                            stage,
                            commands.instances.len(),
                            commands.commands.len()
                        );
                        out.push(commands);
                    }
                    Ok(None) => ctx.grouper.discard(batch),
                    Err(RenderError::TransientOverflow {
                        buffer,
                        requested,
                        available,
                    }) => {
                        log::warn!(
                            "Stage {}: dropping batch of {} instances, transient {} buffer full ({} bytes requested, {} available)",
                            stage,
                            batch.len(),
                            buffer,
                            requested,
                            available
                        );
                        ctx.dropped_batches += 1;
                        ctx.grouper.discard(batch);
                    }
                    Err(err) => return Err(err),
                }
            }
        }
        Ok(out)
    }
}
