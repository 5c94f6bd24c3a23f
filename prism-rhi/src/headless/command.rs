use std::cell::{Cell, RefCell};
use std::rc::Rc;
use crate::backend::{RhiCommandAllocator, RhiCommandList, RhiRenderPass, RhiResourceLayout, view_types};
use crate::command::ListState;
use crate::error::{RhiError, RhiResult};
use crate::pipeline::{ComputePipelineState, GraphicsPipelineState};
use crate::types::{
    ClearValue, CommandListType, IndexFormat, PipelineBindPoint, ResourceState, ScissorRect, Viewport,
};
use super::resource::{
    HeadlessBuffer, HeadlessFrameBuffer, HeadlessRenderPass, HeadlessResourceLayout, HeadlessResourceView,
    HeadlessTexture,
};
use super::{Headless, ObjectId};

/// One recorded command. Resources are referred to by their [`ObjectId`].
#[derive(Debug, Clone, PartialEq)]
pub enum HeadlessCommand {
    TransitionTexture {
        texture: ObjectId,
        before: ResourceState,
        after: ResourceState,
    },
    TransitionBuffer {
        buffer: ObjectId,
        before: ResourceState,
        after: ResourceState,
    },
    BeginRenderPass {
        name: String,
        render_targets: Vec<ObjectId>,
        depth_stencil: Option<ObjectId>,
        clear_values: Vec<ClearValue>,
    },
    EndRenderPass,
    SetViewport(Viewport),
    SetScissor(ScissorRect),
    SetGraphicsPipeline { name: String },
    SetComputePipeline { name: String },
    BindResources {
        bind_point: PipelineBindPoint,
        layout: ObjectId,
        views: Vec<ObjectId>,
    },
    PushConstants {
        bind_point: PipelineBindPoint,
        values: Vec<u32>,
    },
    SetVertexBuffer { slot: u32, buffer: ObjectId },
    SetIndexBuffer { buffer: ObjectId, format: IndexFormat },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    Dispatch { x: u32, y: u32, z: u32 },
    CopyBuffer {
        dst: ObjectId,
        dst_offset: u64,
        src: ObjectId,
        src_offset: u64,
        size: u64,
    },
}

pub struct HeadlessCommandAllocator {
    list_type: CommandListType,
    generation: Rc<Cell<u64>>,
}

impl HeadlessCommandAllocator {
    pub(crate) fn new(list_type: CommandListType) -> Self {
        Self {
            list_type,
            generation: Rc::new(Cell::new(0)),
        }
    }
}

impl RhiCommandAllocator for HeadlessCommandAllocator {
    #[inline]
    fn list_type(&self) -> CommandListType {
        self.list_type
    }

    fn reset(&self) -> RhiResult<()> {
        self.generation.set(self.generation.get() + 1);
        Ok(())
    }
}

struct PendingCopy {
    dst: Rc<RefCell<Vec<u8>>>,
    dst_offset: usize,
    src: Rc<RefCell<Vec<u8>>>,
    src_offset: usize,
    size: usize,
}

impl PendingCopy {
    fn apply(&self) {
        let (dst, src) = (self.dst_offset..self.dst_offset + self.size, self.src_offset..self.src_offset + self.size);
        if Rc::ptr_eq(&self.dst, &self.src) {
            self.dst.borrow_mut().copy_within(src, dst.start);
        } else {
            self.dst.borrow_mut()[dst].copy_from_slice(&self.src.borrow()[src]);
        }
    }
}

/// A closed list as the queue received it.
pub(crate) struct RecordedList {
    pub(crate) commands: Vec<HeadlessCommand>,
    copies: Vec<Rc<PendingCopy>>,
}

impl RecordedList {
    pub(crate) fn apply_copies(&self) {
        for copy in &self.copies {
            copy.apply();
        }
    }
}

pub struct HeadlessCommandList {
    list_type: CommandListType,
    state: ListState,
    allocator_generation: Rc<Cell<u64>>,
    recorded_generation: u64,
    in_render_pass: bool,
    commands: Vec<HeadlessCommand>,
    copies: Vec<Rc<PendingCopy>>,
}

impl HeadlessCommandList {
    pub(crate) fn new(allocator: &HeadlessCommandAllocator) -> Self {
        Self {
            list_type: allocator.list_type,
            state: ListState::Initial,
            allocator_generation: allocator.generation.clone(),
            recorded_generation: allocator.generation.get(),
            in_render_pass: false,
            commands: Vec::new(),
            copies: Vec::new(),
        }
    }

    /// Commands of the current or last recording.
    #[inline]
    pub fn commands(&self) -> &[HeadlessCommand] {
        &self.commands
    }

    pub(crate) fn snapshot(&self, queue_type: CommandListType) -> RhiResult<RecordedList> {
        self.state.ensure(ListState::Closed)?;
        if self.recorded_generation != self.allocator_generation.get() {
            return Err(RhiError::InvalidCommandListState {
                expected: "recorded after the last allocator reset",
                actual: "invalidated",
            });
        }
        let accepted = match queue_type {
            CommandListType::Graphics => true,
            CommandListType::Compute => self.list_type != CommandListType::Graphics,
            CommandListType::Copy => self.list_type == CommandListType::Copy,
        };
        if !accepted {
            return Err(RhiError::InvalidDescriptor(format!(
                "{:?} command list submitted to a {:?} queue",
                self.list_type, queue_type
            )));
        }
        Ok(RecordedList {
            commands: self.commands.clone(),
            copies: self.copies.clone(),
        })
    }

    fn record(&mut self, command: HeadlessCommand) -> RhiResult<()> {
        self.state.ensure_recording()?;
        self.commands.push(command);
        Ok(())
    }

    fn ensure_graphics(&self) -> RhiResult<()> {
        if self.list_type != CommandListType::Graphics {
            return Err(RhiError::Unsupported("graphics commands outside a graphics list"));
        }
        Ok(())
    }

    fn ensure_compute(&self) -> RhiResult<()> {
        if self.list_type == CommandListType::Copy {
            return Err(RhiError::Unsupported("compute commands on a copy list"));
        }
        Ok(())
    }

    fn bind(
        &mut self,
        bind_point: PipelineBindPoint,
        layout: &HeadlessResourceLayout,
        views: &[&HeadlessResourceView],
    ) -> RhiResult<()> {
        layout.desc().validate_views(&view_types(views))?;
        self.record(HeadlessCommand::BindResources {
            bind_point,
            layout: layout.id(),
            views: views.iter().map(|view| view.id()).collect(),
        })
    }

    fn push_constants(
        &mut self,
        bind_point: PipelineBindPoint,
        layout: &HeadlessResourceLayout,
        values: &[u32],
    ) -> RhiResult<()> {
        let capacity = layout.desc().constants.map_or(0, |c| c.count as usize);
        if values.len() > capacity {
            return Err(RhiError::InvalidDescriptor(format!(
                "layout `{}` holds {capacity} constants, got {}",
                layout.desc().name,
                values.len()
            )));
        }
        self.record(HeadlessCommand::PushConstants {
            bind_point,
            values: values.to_vec(),
        })
    }
}

impl RhiCommandList<Headless> for HeadlessCommandList {
    #[inline]
    fn list_type(&self) -> CommandListType {
        self.list_type
    }

    #[inline]
    fn is_recording(&self) -> bool {
        self.state == ListState::Recording
    }

    fn begin_recording(&mut self) -> RhiResult<()> {
        self.state.begin()?;
        self.recorded_generation = self.allocator_generation.get();
        self.in_render_pass = false;
        self.commands.clear();
        self.copies.clear();
        Ok(())
    }

    fn end_recording(&mut self) -> RhiResult<()> {
        if self.in_render_pass {
            return Err(RhiError::InvalidCommandListState {
                expected: "outside a render pass",
                actual: "inside a render pass",
            });
        }
        self.state.end()
    }

    fn transition_texture(&mut self, texture: &HeadlessTexture, before: ResourceState, after: ResourceState) -> RhiResult<()> {
        self.record(HeadlessCommand::TransitionTexture {
            texture: texture.id(),
            before,
            after,
        })
    }

    fn transition_buffer(&mut self, buffer: &HeadlessBuffer, before: ResourceState, after: ResourceState) -> RhiResult<()> {
        self.record(HeadlessCommand::TransitionBuffer {
            buffer: buffer.id(),
            before,
            after,
        })
    }

    fn begin_render_pass(
        &mut self,
        render_pass: &HeadlessRenderPass,
        frame_buffer: &HeadlessFrameBuffer,
        clear_values: &[ClearValue],
    ) -> RhiResult<()> {
        self.ensure_graphics()?;
        if self.in_render_pass {
            return Err(RhiError::InvalidCommandListState {
                expected: "outside a render pass",
                actual: "inside a render pass",
            });
        }
        render_pass.desc().validate_clear_values(clear_values)?;
        self.record(HeadlessCommand::BeginRenderPass {
            name: render_pass.desc().name.clone(),
            render_targets: frame_buffer.render_targets().to_vec(),
            depth_stencil: frame_buffer.depth_stencil(),
            clear_values: clear_values.to_vec(),
        })?;
        self.in_render_pass = true;
        Ok(())
    }

    fn end_render_pass(&mut self) -> RhiResult<()> {
        if !self.in_render_pass {
            return Err(RhiError::InvalidCommandListState {
                expected: "inside a render pass",
                actual: "outside a render pass",
            });
        }
        self.record(HeadlessCommand::EndRenderPass)?;
        self.in_render_pass = false;
        Ok(())
    }

    fn set_viewport(&mut self, viewport: &Viewport) -> RhiResult<()> {
        self.ensure_graphics()?;
        self.record(HeadlessCommand::SetViewport(*viewport))
    }

    fn set_scissor(&mut self, rect: &ScissorRect) -> RhiResult<()> {
        self.ensure_graphics()?;
        self.record(HeadlessCommand::SetScissor(*rect))
    }

    fn set_graphics_pipeline(&mut self, pipeline: &GraphicsPipelineState<Headless>) -> RhiResult<()> {
        self.ensure_graphics()?;
        pipeline.pipeline()?;
        self.record(HeadlessCommand::SetGraphicsPipeline {
            name: pipeline.name().to_owned(),
        })
    }

    fn set_compute_pipeline(&mut self, pipeline: &ComputePipelineState<Headless>) -> RhiResult<()> {
        self.ensure_compute()?;
        pipeline.pipeline()?;
        self.record(HeadlessCommand::SetComputePipeline {
            name: pipeline.name().to_owned(),
        })
    }

    fn bind_graphics_resources(&mut self, layout: &HeadlessResourceLayout, views: &[&HeadlessResourceView]) -> RhiResult<()> {
        self.ensure_graphics()?;
        self.bind(PipelineBindPoint::Graphics, layout, views)
    }

    fn bind_compute_resources(&mut self, layout: &HeadlessResourceLayout, views: &[&HeadlessResourceView]) -> RhiResult<()> {
        self.ensure_compute()?;
        self.bind(PipelineBindPoint::Compute, layout, views)
    }

    fn push_graphics_constants(&mut self, layout: &HeadlessResourceLayout, values: &[u32]) -> RhiResult<()> {
        self.ensure_graphics()?;
        self.push_constants(PipelineBindPoint::Graphics, layout, values)
    }

    fn push_compute_constants(&mut self, layout: &HeadlessResourceLayout, values: &[u32]) -> RhiResult<()> {
        self.ensure_compute()?;
        self.push_constants(PipelineBindPoint::Compute, layout, values)
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: &HeadlessBuffer) -> RhiResult<()> {
        self.ensure_graphics()?;
        self.record(HeadlessCommand::SetVertexBuffer { slot, buffer: buffer.id() })
    }

    fn set_index_buffer(&mut self, buffer: &HeadlessBuffer, format: IndexFormat) -> RhiResult<()> {
        self.ensure_graphics()?;
        self.record(HeadlessCommand::SetIndexBuffer { buffer: buffer.id(), format })
    }

    fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    ) -> RhiResult<()> {
        self.ensure_graphics()?;
        self.record(HeadlessCommand::DrawIndexed {
            index_count,
            instance_count,
            first_index,
            base_vertex,
            first_instance,
        })
    }

    fn draw_instanced(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> RhiResult<()> {
        self.ensure_graphics()?;
        self.record(HeadlessCommand::Draw {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        })
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) -> RhiResult<()> {
        self.ensure_compute()?;
        self.record(HeadlessCommand::Dispatch { x, y, z })
    }

    fn copy_buffer(
        &mut self,
        dst: &HeadlessBuffer,
        dst_offset: u64,
        src: &HeadlessBuffer,
        src_offset: u64,
        size: u64,
    ) -> RhiResult<()> {
        crate::utility::normalize_range_u64(dst_offset..dst_offset + size, dst.meta_size())?;
        crate::utility::normalize_range_u64(src_offset..src_offset + size, src.meta_size())?;
        self.record(HeadlessCommand::CopyBuffer {
            dst: dst.id(),
            dst_offset,
            src: src.id(),
            src_offset,
            size,
        })?;
        self.copies.push(Rc::new(PendingCopy {
            dst: dst.storage(),
            dst_offset: dst_offset as usize,
            src: src.storage(),
            src_offset: src_offset as usize,
            size: size as usize,
        }));
        Ok(())
    }
}
