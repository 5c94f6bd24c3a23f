//! Command allocators and command lists.
//!
//! An allocator owns a command pool and the descriptor pool every bind call of its lists
//! allocates from. Both are reset together, so descriptor sets live exactly as long as the
//! recordings that reference them.

use std::cell::Cell;
use std::rc::Rc;
use ash::vk;
use prism_core::collections::SmallVec;
use prism_rhi_derive::DeviceObject;
use crate::backend::{view_types, RhiBuffer, RhiCommandAllocator, RhiCommandList, RhiFrameBuffer, RhiRenderPass, RhiResourceLayout};
use crate::command::ListState;
use crate::error::{RhiError, RhiResult, ResultExt};
use crate::pipeline::{ComputePipelineState, GraphicsPipelineState};
use crate::render_pass::{AttachmentDesc, MAX_RENDER_TARGETS};
use crate::types::{
    ClearValue, CommandListType, DescriptorType, IndexFormat, ResourceDimension, ResourceState, ScissorRect, Viewport,
};
use crate::utility::normalize_range_u64;
use super::barrier::{self, StateExt};
use super::conv;
use super::device::{DebuggableObject, VulkanDevice};
use super::layout::{binding, VulkanResourceLayout};
use super::resource::{
    ImageTarget, VulkanBuffer, VulkanFrameBuffer, VulkanRenderPass, VulkanResourceView, VulkanTexture, ViewTarget,
};
use super::Vulkan;

const MAX_DESCRIPTOR_SETS: u32 = 1024;

const DESCRIPTOR_POOL_SIZES: [(vk::DescriptorType, u32); 5] = [
    (vk::DescriptorType::UNIFORM_BUFFER, 4096),
    (vk::DescriptorType::STORAGE_BUFFER, 4096),
    (vk::DescriptorType::SAMPLED_IMAGE, 4096),
    (vk::DescriptorType::STORAGE_IMAGE, 1024),
    (vk::DescriptorType::SAMPLER, 1024),
];

#[DeviceObject]
struct AllocatorShared {
    command_pool: vk::CommandPool,
    descriptor_pool: vk::DescriptorPool,
    /// Bumped by every reset, lists recorded under an older generation are invalid.
    generation: Cell<u64>,
}

impl Drop for AllocatorShared {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.descriptor_pool, None);
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

pub struct VulkanCommandAllocator {
    list_type: CommandListType,
    shared: Rc<AllocatorShared>,
}

impl VulkanCommandAllocator {
    pub(crate) fn new(device: &VulkanDevice, list_type: CommandListType) -> RhiResult<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(device.queue_families().family(list_type))
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool =
            unsafe { device.handle().create_command_pool(&create_info, None) }.context("vkCreateCommandPool")?;

        let pool_sizes = DESCRIPTOR_POOL_SIZES.map(|(ty, descriptor_count)| {
            vk::DescriptorPoolSize::default().ty(ty).descriptor_count(descriptor_count)
        });
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(MAX_DESCRIPTOR_SETS)
            .pool_sizes(&pool_sizes);
        let descriptor_pool = match unsafe { device.handle().create_descriptor_pool(&create_info, None) } {
            Ok(pool) => pool,
            Err(e) => {
                unsafe { device.handle().destroy_command_pool(command_pool, None) };
                return Err(RhiError::backend("vkCreateDescriptorPool", e));
            }
        };

        let allocator = Self {
            list_type,
            shared: Rc::new(AllocatorShared {
                command_pool,
                descriptor_pool,
                generation: Cell::new(0),
                device: device.handle().clone(),
            }),
        };
        allocator.set_debug_name(device);
        Ok(allocator)
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.shared.command_pool
    }
}

impl DebuggableObject for VulkanCommandAllocator {
    fn set_debug_name(&self, device: &VulkanDevice) {
        device.set_debug_name(self.shared.command_pool, &format!("{:?} command pool", self.list_type));
        device.set_debug_name(self.shared.descriptor_pool, &format!("{:?} descriptor pool", self.list_type));
    }
}

impl RhiCommandAllocator for VulkanCommandAllocator {
    #[inline]
    fn list_type(&self) -> CommandListType {
        self.list_type
    }

    fn reset(&self) -> RhiResult<()> {
        let shared = &self.shared;
        unsafe {
            shared
                .device
                .reset_command_pool(shared.command_pool, vk::CommandPoolResetFlags::empty())
                .context("vkResetCommandPool")?;
            shared
                .device
                .reset_descriptor_pool(shared.descriptor_pool, vk::DescriptorPoolResetFlags::empty())
                .context("vkResetDescriptorPool")?;
        }
        shared.generation.set(shared.generation.get() + 1);
        Ok(())
    }
}

enum DescriptorInfo {
    Buffer(vk::DescriptorBufferInfo),
    Image(vk::DescriptorImageInfo),
}

#[DeviceObject]
pub struct VulkanCommandList {
    list_type: CommandListType,
    cmd: vk::CommandBuffer,
    allocator: Rc<AllocatorShared>,
    state: ListState,
    recorded_generation: u64,
    /// Transitions into the final attachment states, recorded when the pass ends.
    pass_end_barriers: Option<SmallVec<[vk::ImageMemoryBarrier2<'static>; MAX_RENDER_TARGETS + 1]>>,
}

impl VulkanCommandList {
    pub(crate) fn new(device: &VulkanDevice, allocator: &VulkanCommandAllocator) -> RhiResult<Self> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(allocator.shared.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffers =
            unsafe { device.handle().allocate_command_buffers(&alloc_info) }.context("vkAllocateCommandBuffers")?;
        let cmd = buffers
            .first()
            .copied()
            .ok_or_else(|| RhiError::backend("vkAllocateCommandBuffers", "no command buffer returned"))?;
        device.set_debug_name(cmd, &format!("{:?} command list", allocator.list_type));

        Ok(Self {
            list_type: allocator.list_type,
            cmd,
            allocator: allocator.shared.clone(),
            state: ListState::Initial,
            recorded_generation: allocator.shared.generation.get(),
            pass_end_barriers: None,
            device: device.handle().clone(),
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.cmd
    }

    /// Closed, recorded after the last allocator reset and accepted by a `queue_type` queue.
    pub(crate) fn ensure_submittable(&self, queue_type: CommandListType) -> RhiResult<()> {
        self.state.ensure(ListState::Closed)?;
        if self.recorded_generation != self.allocator.generation.get() {
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
        Ok(())
    }

    fn ensure_graphics(&self) -> RhiResult<()> {
        self.state.ensure_recording()?;
        if self.list_type != CommandListType::Graphics {
            return Err(RhiError::Unsupported("graphics commands outside a graphics list"));
        }
        Ok(())
    }

    fn ensure_compute(&self) -> RhiResult<()> {
        self.state.ensure_recording()?;
        if self.list_type == CommandListType::Copy {
            return Err(RhiError::Unsupported("compute commands on a copy list"));
        }
        Ok(())
    }

    fn pipeline_barrier(
        &self,
        memory: &[vk::MemoryBarrier2<'_>],
        buffers: &[vk::BufferMemoryBarrier2<'_>],
        images: &[vk::ImageMemoryBarrier2<'_>],
    ) {
        let dependency = vk::DependencyInfo::default()
            .memory_barriers(memory)
            .buffer_memory_barriers(buffers)
            .image_memory_barriers(images);
        unsafe { self.device.cmd_pipeline_barrier2(self.cmd, &dependency) };
    }

    /// Transition into the pass state and queue the transition out of it.
    fn prepare_attachment(
        attachment: &AttachmentDesc,
        target: &ImageTarget,
        begin: &mut SmallVec<[vk::ImageMemoryBarrier2<'static>; MAX_RENDER_TARGETS + 1]>,
        end: &mut SmallVec<[vk::ImageMemoryBarrier2<'static>; MAX_RENDER_TARGETS + 1]>,
    ) {
        let pass_state = attachment.pass_state();
        let undefined = !target.initialized.replace(true);
        let discard = undefined || attachment.discards_contents();
        if attachment.initial_state != pass_state || undefined {
            begin.push(barrier::texture_barrier(
                target.image,
                target.aspect,
                attachment.initial_state,
                pass_state,
                discard,
            ));
        }
        if attachment.final_state != pass_state {
            end.push(barrier::texture_barrier(
                target.image,
                target.aspect,
                pass_state,
                attachment.final_state,
                false,
            ));
        }
    }

    #[profiling::function]
    fn bind(&mut self, bind_point: vk::PipelineBindPoint, layout: &VulkanResourceLayout, views: &[&VulkanResourceView]) -> RhiResult<()> {
        layout.desc().validate_views(&view_types(views))?;
        if layout.set_layouts().is_empty() {
            return Ok(());
        }

        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.allocator.descriptor_pool)
            .set_layouts(layout.set_layouts());
        let sets = unsafe { self.device.allocate_descriptor_sets(&alloc_info) }.context("vkAllocateDescriptorSets")?;

        let infos = layout
            .elements()
            .zip(views)
            .map(|(element, view)| {
                let ty = conv::descriptor_type(element.descriptor_type, element.dimension);
                let info = match (view.target(), element.dimension) {
                    (&ViewTarget::Buffer { buffer, offset, range }, ResourceDimension::Buffer) => {
                        DescriptorInfo::Buffer(vk::DescriptorBufferInfo::default().buffer(buffer).offset(offset).range(range))
                    }
                    (ViewTarget::Image(image), ResourceDimension::Texture) => {
                        let image_layout = match element.descriptor_type {
                            DescriptorType::UnorderedAccess => ResourceState::UnorderedAccess,
                            _ => ResourceState::ShaderResource,
                        }
                        .image_layout();
                        DescriptorInfo::Image(
                            vk::DescriptorImageInfo::default()
                                .image_view(image.view)
                                .image_layout(image_layout),
                        )
                    }
                    (_, dimension) => {
                        return Err(RhiError::InvalidDescriptor(format!(
                            "layout `{}` expects a {dimension:?} at register {} space {}",
                            layout.desc().name,
                            element.shader_register,
                            element.register_space
                        )));
                    }
                };
                Ok((
                    sets[element.register_space as usize],
                    binding(element.descriptor_type, element.shader_register),
                    ty,
                    info,
                ))
            })
            .collect::<RhiResult<SmallVec<[_; 16]>>>()?;

        let writes: SmallVec<[vk::WriteDescriptorSet; 16]> = infos
            .iter()
            .map(|(set, slot, ty, info)| {
                let write = vk::WriteDescriptorSet::default()
                    .dst_set(*set)
                    .dst_binding(*slot)
                    .descriptor_type(*ty);
                match info {
                    DescriptorInfo::Buffer(buffer) => write.buffer_info(std::slice::from_ref(buffer)),
                    DescriptorInfo::Image(image) => write.image_info(std::slice::from_ref(image)),
                }
            })
            .collect();

        unsafe {
            self.device.update_descriptor_sets(&writes, &[]);
            self.device
                .cmd_bind_descriptor_sets(self.cmd, bind_point, layout.handle(), 0, &sets, &[]);
        }
        Ok(())
    }

    fn push_constants(&mut self, layout: &VulkanResourceLayout, values: &[u32]) -> RhiResult<()> {
        let capacity = layout.desc().constants.map_or(0, |c| c.count as usize);
        if values.len() > capacity {
            return Err(RhiError::InvalidDescriptor(format!(
                "layout `{}` holds {capacity} constants, got {}",
                layout.desc().name,
                values.len()
            )));
        }
        if values.is_empty() {
            return Ok(());
        }
        unsafe {
            self.device.cmd_push_constants(
                self.cmd,
                layout.handle(),
                layout.push_stages(),
                0,
                bytemuck::cast_slice(values),
            );
        }
        Ok(())
    }
}

impl RhiCommandList<Vulkan> for VulkanCommandList {
    #[inline]
    fn list_type(&self) -> CommandListType {
        self.list_type
    }

    #[inline]
    fn is_recording(&self) -> bool {
        self.state == ListState::Recording
    }

    fn begin_recording(&mut self) -> RhiResult<()> {
        if self.state == ListState::Recording {
            return Err(RhiError::InvalidCommandListState {
                expected: "initial or closed",
                actual: "recording",
            });
        }
        let begin_info = vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.device.begin_command_buffer(self.cmd, &begin_info) }.context("vkBeginCommandBuffer")?;

        self.state.begin()?;
        self.recorded_generation = self.allocator.generation.get();
        self.pass_end_barriers = None;
        Ok(())
    }

    fn end_recording(&mut self) -> RhiResult<()> {
        self.state.ensure_recording()?;
        if self.pass_end_barriers.is_some() {
            return Err(RhiError::InvalidCommandListState {
                expected: "outside a render pass",
                actual: "inside a render pass",
            });
        }
        unsafe { self.device.end_command_buffer(self.cmd) }.context("vkEndCommandBuffer")?;
        self.state.end()
    }

    fn transition_texture(&mut self, texture: &VulkanTexture, before: ResourceState, after: ResourceState) -> RhiResult<()> {
        self.state.ensure_recording()?;
        let undefined = !texture.take_initialized();
        if before == after && !undefined {
            if after == ResourceState::UnorderedAccess {
                self.pipeline_barrier(&[barrier::unordered_access_barrier()], &[], &[]);
            }
            return Ok(());
        }
        let image = barrier::texture_barrier(texture.handle(), texture.aspect(), before, after, undefined);
        self.pipeline_barrier(&[], &[], &[image]);
        Ok(())
    }

    fn transition_buffer(&mut self, buffer: &VulkanBuffer, before: ResourceState, after: ResourceState) -> RhiResult<()> {
        self.state.ensure_recording()?;
        if before == after {
            if after == ResourceState::UnorderedAccess {
                self.pipeline_barrier(&[barrier::unordered_access_barrier()], &[], &[]);
            }
            return Ok(());
        }
        self.pipeline_barrier(&[], &[barrier::buffer_barrier(buffer.handle(), before, after)], &[]);
        Ok(())
    }

    #[profiling::function]
    fn begin_render_pass(
        &mut self,
        render_pass: &VulkanRenderPass,
        frame_buffer: &VulkanFrameBuffer,
        clear_values: &[ClearValue],
    ) -> RhiResult<()> {
        self.ensure_graphics()?;
        if self.pass_end_barriers.is_some() {
            return Err(RhiError::InvalidCommandListState {
                expected: "outside a render pass",
                actual: "inside a render pass",
            });
        }
        let desc = render_pass.desc();
        desc.validate_clear_values(clear_values)?;

        let mut begin = SmallVec::new();
        let mut end = SmallVec::new();

        let mut color_attachments: SmallVec<[vk::RenderingAttachmentInfo; MAX_RENDER_TARGETS]> = SmallVec::new();
        for (index, (attachment, target)) in desc
            .color_attachments
            .iter()
            .zip(frame_buffer.render_targets())
            .enumerate()
        {
            Self::prepare_attachment(attachment, target, &mut begin, &mut end);
            color_attachments.push(
                vk::RenderingAttachmentInfo::default()
                    .image_view(target.view)
                    .image_layout(attachment.pass_state().image_layout())
                    .load_op(conv::load_op(attachment.load))
                    .store_op(conv::store_op(attachment.store))
                    .clear_value(conv::clear_value(&clear_values[index])),
            );
        }

        let depth_attachment = match (&desc.depth_attachment, frame_buffer.depth_stencil()) {
            (Some(attachment), Some(target)) => {
                Self::prepare_attachment(attachment, target, &mut begin, &mut end);
                let clear = conv::clear_value(&clear_values[desc.color_attachments.len()]);
                let layout = attachment.pass_state().image_layout();
                let depth = vk::RenderingAttachmentInfo::default()
                    .image_view(target.view)
                    .image_layout(layout)
                    .load_op(conv::load_op(attachment.load))
                    .store_op(conv::store_op(attachment.store))
                    .clear_value(clear);
                let stencil = target.aspect.contains(vk::ImageAspectFlags::STENCIL).then(|| {
                    vk::RenderingAttachmentInfo::default()
                        .image_view(target.view)
                        .image_layout(layout)
                        .load_op(conv::load_op(attachment.stencil_load))
                        .store_op(conv::store_op(attachment.stencil_store))
                        .clear_value(clear)
                });
                Some((depth, stencil))
            }
            _ => None,
        };

        if !begin.is_empty() {
            self.pipeline_barrier(&[], &[], &begin);
        }

        let extent = frame_buffer.extent();
        let mut rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: vk::Extent2D {
                    width: extent.width,
                    height: extent.height,
                },
            })
            .layer_count(1)
            .color_attachments(&color_attachments);
        if let Some((depth, stencil)) = depth_attachment.as_ref() {
            rendering_info = rendering_info.depth_attachment(depth);
            if let Some(stencil) = stencil {
                rendering_info = rendering_info.stencil_attachment(stencil);
            }
        }

        unsafe { self.device.cmd_begin_rendering(self.cmd, &rendering_info) };
        self.pass_end_barriers = Some(end);
        Ok(())
    }

    fn end_render_pass(&mut self) -> RhiResult<()> {
        self.state.ensure_recording()?;
        let end = self.pass_end_barriers.take().ok_or(RhiError::InvalidCommandListState {
            expected: "inside a render pass",
            actual: "outside a render pass",
        })?;
        unsafe { self.device.cmd_end_rendering(self.cmd) };
        if !end.is_empty() {
            self.pipeline_barrier(&[], &[], &end);
        }
        Ok(())
    }

    fn set_viewport(&mut self, viewport: &Viewport) -> RhiResult<()> {
        self.ensure_graphics()?;
        // negative height keeps clip space y pointing up like DirectX12
        let flipped = vk::Viewport {
            x: viewport.x,
            y: viewport.y + viewport.height,
            width: viewport.width,
            height: -viewport.height,
            min_depth: viewport.min_depth,
            max_depth: viewport.max_depth,
        };
        unsafe { self.device.cmd_set_viewport(self.cmd, 0, &[flipped]) };
        Ok(())
    }

    fn set_scissor(&mut self, rect: &ScissorRect) -> RhiResult<()> {
        self.ensure_graphics()?;
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: rect.left, y: rect.top },
            extent: vk::Extent2D {
                width: (rect.right - rect.left).max(0) as u32,
                height: (rect.bottom - rect.top).max(0) as u32,
            },
        };
        unsafe { self.device.cmd_set_scissor(self.cmd, 0, &[scissor]) };
        Ok(())
    }

    fn set_graphics_pipeline(&mut self, pipeline: &GraphicsPipelineState<Vulkan>) -> RhiResult<()> {
        self.ensure_graphics()?;
        let native = pipeline.pipeline()?;
        unsafe {
            self.device
                .cmd_bind_pipeline(self.cmd, vk::PipelineBindPoint::GRAPHICS, native.handle())
        };
        Ok(())
    }

    fn set_compute_pipeline(&mut self, pipeline: &ComputePipelineState<Vulkan>) -> RhiResult<()> {
        self.ensure_compute()?;
        let native = pipeline.pipeline()?;
        unsafe {
            self.device
                .cmd_bind_pipeline(self.cmd, vk::PipelineBindPoint::COMPUTE, native.handle())
        };
        Ok(())
    }

    fn bind_graphics_resources(&mut self, layout: &VulkanResourceLayout, views: &[&VulkanResourceView]) -> RhiResult<()> {
        self.ensure_graphics()?;
        self.bind(vk::PipelineBindPoint::GRAPHICS, layout, views)
    }

    fn bind_compute_resources(&mut self, layout: &VulkanResourceLayout, views: &[&VulkanResourceView]) -> RhiResult<()> {
        self.ensure_compute()?;
        self.bind(vk::PipelineBindPoint::COMPUTE, layout, views)
    }

    fn push_graphics_constants(&mut self, layout: &VulkanResourceLayout, values: &[u32]) -> RhiResult<()> {
        self.ensure_graphics()?;
        self.push_constants(layout, values)
    }

    fn push_compute_constants(&mut self, layout: &VulkanResourceLayout, values: &[u32]) -> RhiResult<()> {
        self.ensure_compute()?;
        self.push_constants(layout, values)
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: &VulkanBuffer) -> RhiResult<()> {
        self.ensure_graphics()?;
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(self.cmd, slot, &[buffer.handle()], &[0])
        };
        Ok(())
    }

    fn set_index_buffer(&mut self, buffer: &VulkanBuffer, format: IndexFormat) -> RhiResult<()> {
        self.ensure_graphics()?;
        unsafe {
            self.device
                .cmd_bind_index_buffer(self.cmd, buffer.handle(), 0, conv::index_type(format))
        };
        Ok(())
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
        unsafe {
            self.device.cmd_draw_indexed(
                self.cmd,
                index_count,
                instance_count,
                first_index,
                base_vertex,
                first_instance,
            )
        };
        Ok(())
    }

    fn draw_instanced(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> RhiResult<()> {
        self.ensure_graphics()?;
        unsafe {
            self.device
                .cmd_draw(self.cmd, vertex_count, instance_count, first_vertex, first_instance)
        };
        Ok(())
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) -> RhiResult<()> {
        self.ensure_compute()?;
        unsafe { self.device.cmd_dispatch(self.cmd, x, y, z) };
        Ok(())
    }

    fn copy_buffer(
        &mut self,
        dst: &VulkanBuffer,
        dst_offset: u64,
        src: &VulkanBuffer,
        src_offset: u64,
        size: u64,
    ) -> RhiResult<()> {
        self.state.ensure_recording()?;
        normalize_range_u64(dst_offset..dst_offset + size, dst.meta().byte_size())?;
        normalize_range_u64(src_offset..src_offset + size, src.meta().byte_size())?;
        if size == 0 {
            return Ok(());
        }
        let region = vk::BufferCopy::default()
            .src_offset(src_offset)
            .dst_offset(dst_offset)
            .size(size);
        unsafe {
            self.device
                .cmd_copy_buffer(self.cmd, src.handle(), dst.handle(), &[region])
        };
        Ok(())
    }
}
