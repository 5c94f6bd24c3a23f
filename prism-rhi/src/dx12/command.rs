//! Command allocators and command lists.
//!
//! An allocator owns the native allocator and a shader visible descriptor ring. Bind calls copy
//! the cpu descriptors of their views into the ring, one contiguous range per descriptor table.
//! The ring rewinds when the allocator is reset, together with the recordings using it.

use std::cell::Cell;
use std::rc::Rc;
use prism_core::collections::SmallVec;
use windows::Win32::Foundation::{BOOL, RECT};
use windows::Win32::Graphics::Direct3D12::*;
use crate::backend::{view_types, RhiBuffer, RhiCommandAllocator, RhiCommandList, RhiDescriptorHeap, RhiRenderPass, RhiResourceLayout};
use crate::command::ListState;
use crate::error::{RhiError, RhiResult, ResultExt};
use crate::heap::DescriptorHeapDesc;
use crate::render_pass::{AttachmentDesc, AttachmentLoad, MAX_RENDER_TARGETS};
use crate::pipeline::{ComputePipelineState, GraphicsPipelineState};
use crate::types::{ClearValue, CommandListType, DescriptorHeapType, IndexFormat, ResourceState, ScissorRect, Viewport};
use crate::utility::normalize_range_u64;
use super::barrier::{self, PendingTransition};
use super::conv;
use super::device::{set_debug_name, Dx12DescriptorHeap, Dx12Device};
use super::layout::Dx12ResourceLayout;
use super::resource::{AttachmentTarget, Dx12Buffer, Dx12FrameBuffer, Dx12RenderPass, Dx12ResourceView, Dx12Texture};
use super::DirectX12;

/// Shader visible descriptors one allocator can hand out between two resets.
const DESCRIPTOR_RING_CAPACITY: u32 = 8192;

struct DescriptorRing {
    heap: Dx12DescriptorHeap,
    cursor: Cell<u32>,
}

impl DescriptorRing {
    /// Reserve `count` contiguous descriptors, returns the first index.
    fn reserve(&self, count: u32) -> RhiResult<u32> {
        let start = self.cursor.get();
        let capacity = self.heap.capacity();
        if start + count > capacity {
            log::error!("Shader visible descriptor ring exhausted, {capacity} descriptors recorded since the last reset");
            return Err(RhiError::DescriptorHeapExhausted {
                heap: DescriptorHeapType::Srv,
                capacity,
            });
        }
        self.cursor.set(start + count);
        Ok(start)
    }
}

struct AllocatorShared {
    allocator: ID3D12CommandAllocator,
    /// Copy lists bind nothing and have no ring.
    ring: Option<DescriptorRing>,
    /// Bumped by every reset, lists recorded under an older generation are invalid.
    generation: Cell<u64>,
}

pub struct Dx12CommandAllocator {
    list_type: CommandListType,
    shared: Rc<AllocatorShared>,
}

impl Dx12CommandAllocator {
    pub(crate) fn new(device: &Dx12Device, list_type: CommandListType) -> RhiResult<Self> {
        let allocator: ID3D12CommandAllocator =
            unsafe { device.handle().CreateCommandAllocator(conv::command_list_type(list_type)) }
                .context("CreateCommandAllocator")?;
        set_debug_name(&allocator, &format!("{list_type:?} command allocator"));

        let ring = if list_type == CommandListType::Copy {
            None
        } else {
            let heap = Dx12DescriptorHeap::new(
                device.handle(),
                &DescriptorHeapDesc {
                    heap_type: DescriptorHeapType::Srv,
                    capacity: DESCRIPTOR_RING_CAPACITY,
                    shader_visible: true,
                },
            )?;
            Some(DescriptorRing {
                heap,
                cursor: Cell::new(0),
            })
        };

        Ok(Self {
            list_type,
            shared: Rc::new(AllocatorShared {
                allocator,
                ring,
                generation: Cell::new(0),
            }),
        })
    }

    #[inline]
    pub fn handle(&self) -> &ID3D12CommandAllocator {
        &self.shared.allocator
    }
}

impl RhiCommandAllocator for Dx12CommandAllocator {
    #[inline]
    fn list_type(&self) -> CommandListType {
        self.list_type
    }

    fn reset(&self) -> RhiResult<()> {
        let shared = &self.shared;
        unsafe { shared.allocator.Reset() }.context("ID3D12CommandAllocator::Reset")?;
        if let Some(ring) = &shared.ring {
            ring.cursor.set(0);
        }
        shared.generation.set(shared.generation.get() + 1);
        Ok(())
    }
}

pub struct Dx12CommandList {
    list_type: CommandListType,
    list: ID3D12GraphicsCommandList,
    device: ID3D12Device,
    allocator: Rc<AllocatorShared>,
    state: ListState,
    recorded_generation: u64,
    graphics_root: Option<ID3D12RootSignature>,
    compute_root: Option<ID3D12RootSignature>,
    /// Transitions into the final attachment states, recorded when the pass ends.
    pass_end_transitions: Option<SmallVec<[PendingTransition; MAX_RENDER_TARGETS + 1]>>,
}

impl Dx12CommandList {
    pub(crate) fn new(device: &Dx12Device, allocator: &Dx12CommandAllocator) -> RhiResult<Self> {
        let list: ID3D12GraphicsCommandList = unsafe {
            device.handle().CreateCommandList(
                0,
                conv::command_list_type(allocator.list_type),
                allocator.handle(),
                None::<&ID3D12PipelineState>,
            )
        }
        .context("CreateCommandList")?;
        // created recording, lists start out in the initial state here
        unsafe { list.Close() }.context("ID3D12GraphicsCommandList::Close")?;
        set_debug_name(&list, &format!("{:?} command list", allocator.list_type));

        Ok(Self {
            list_type: allocator.list_type,
            list,
            device: device.handle().clone(),
            allocator: allocator.shared.clone(),
            state: ListState::Initial,
            recorded_generation: allocator.shared.generation.get(),
            graphics_root: None,
            compute_root: None,
            pass_end_transitions: None,
        })
    }

    #[inline]
    pub fn handle(&self) -> &ID3D12GraphicsCommandList {
        &self.list
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

    fn ensure_outside_pass(&self) -> RhiResult<()> {
        if self.pass_end_transitions.is_some() {
            return Err(RhiError::InvalidCommandListState {
                expected: "outside a render pass",
                actual: "inside a render pass",
            });
        }
        Ok(())
    }

    fn set_graphics_root(&mut self, root: &ID3D12RootSignature) {
        if self.graphics_root.as_ref() != Some(root) {
            unsafe { self.list.SetGraphicsRootSignature(root) };
            self.graphics_root = Some(root.clone());
        }
    }

    fn set_compute_root(&mut self, root: &ID3D12RootSignature) {
        if self.compute_root.as_ref() != Some(root) {
            unsafe { self.list.SetComputeRootSignature(root) };
            self.compute_root = Some(root.clone());
        }
    }

    /// Transition into the pass state and queue the transition out of it.
    fn prepare_attachment(
        attachment: &AttachmentDesc,
        target: &AttachmentTarget,
        begin: &mut SmallVec<[D3D12_RESOURCE_BARRIER; MAX_RENDER_TARGETS + 1]>,
        end: &mut SmallVec<[PendingTransition; MAX_RENDER_TARGETS + 1]>,
    ) {
        let pass_state = attachment.pass_state();
        if attachment.initial_state != pass_state {
            begin.push(barrier::transition(&target.resource, attachment.initial_state, pass_state));
        }
        if attachment.final_state != pass_state {
            end.push(PendingTransition {
                resource: target.resource.clone(),
                before: pass_state,
                after: attachment.final_state,
            });
        }
    }

    /// Copy the view table into the ring and return one gpu handle per descriptor table.
    #[profiling::function]
    fn stage_tables(
        &self,
        layout: &Dx12ResourceLayout,
        views: &[&Dx12ResourceView],
    ) -> RhiResult<SmallVec<[(u32, D3D12_GPU_DESCRIPTOR_HANDLE); 4]>> {
        layout.desc().validate_views(&view_types(views))?;
        if layout.tables().is_empty() {
            return Ok(SmallVec::new());
        }
        let ring = self
            .allocator
            .ring
            .as_ref()
            .ok_or(RhiError::Unsupported("resource binding on a copy list"))?;

        layout
            .tables()
            .iter()
            .map(|table| {
                let base = ring.reserve(table.elements.len() as u32)?;
                for (offset, &element) in table.elements.iter().enumerate() {
                    unsafe {
                        self.device.CopyDescriptorsSimple(
                            1,
                            ring.heap.cpu_handle(base + offset as u32),
                            views[element].cpu_handle(),
                            D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV,
                        );
                    }
                }
                let gpu = ring
                    .heap
                    .gpu_handle(base)
                    .ok_or_else(|| RhiError::backend("descriptor ring", "ring heap is not shader visible"))?;
                Ok((table.root_index, gpu))
            })
            .collect()
    }

    fn check_constants(layout: &Dx12ResourceLayout, values: &[u32]) -> RhiResult<Option<u32>> {
        let capacity = layout.desc().constants.map_or(0, |c| c.count as usize);
        if values.len() > capacity {
            return Err(RhiError::InvalidDescriptor(format!(
                "layout `{}` holds {capacity} constants, got {}",
                layout.desc().name,
                values.len()
            )));
        }
        if values.is_empty() {
            return Ok(None);
        }
        Ok(layout.constants_index())
    }
}

impl RhiCommandList<DirectX12> for Dx12CommandList {
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
        unsafe { self.list.Reset(&self.allocator.allocator, None::<&ID3D12PipelineState>) }
            .context("ID3D12GraphicsCommandList::Reset")?;
        if let Some(ring) = &self.allocator.ring {
            unsafe { self.list.SetDescriptorHeaps(&[Some(ring.heap.handle().clone())]) };
        }

        self.state.begin()?;
        self.recorded_generation = self.allocator.generation.get();
        self.graphics_root = None;
        self.compute_root = None;
        self.pass_end_transitions = None;
        Ok(())
    }

    fn end_recording(&mut self) -> RhiResult<()> {
        self.state.ensure_recording()?;
        self.ensure_outside_pass()?;
        unsafe { self.list.Close() }.context("ID3D12GraphicsCommandList::Close")?;
        self.state.end()
    }

    fn transition_texture(&mut self, texture: &Dx12Texture, before: ResourceState, after: ResourceState) -> RhiResult<()> {
        self.state.ensure_recording()?;
        let native = if before == after {
            if after != ResourceState::UnorderedAccess {
                return Ok(());
            }
            barrier::unordered_access(texture.handle())
        } else {
            barrier::transition(texture.handle(), before, after)
        };
        unsafe { self.list.ResourceBarrier(&[native]) };
        Ok(())
    }

    fn transition_buffer(&mut self, buffer: &Dx12Buffer, before: ResourceState, after: ResourceState) -> RhiResult<()> {
        self.state.ensure_recording()?;
        // upload and readback buffers never leave their heap state
        if buffer.meta().is_cpu_visible() {
            return Ok(());
        }
        let native = if before == after {
            if after != ResourceState::UnorderedAccess {
                return Ok(());
            }
            barrier::unordered_access(buffer.handle())
        } else {
            barrier::transition(buffer.handle(), before, after)
        };
        unsafe { self.list.ResourceBarrier(&[native]) };
        Ok(())
    }

    #[profiling::function]
    fn begin_render_pass(
        &mut self,
        render_pass: &Dx12RenderPass,
        frame_buffer: &Dx12FrameBuffer,
        clear_values: &[ClearValue],
    ) -> RhiResult<()> {
        self.ensure_graphics()?;
        self.ensure_outside_pass()?;
        let desc = render_pass.desc();
        desc.validate_clear_values(clear_values)?;

        let mut begin = SmallVec::new();
        let mut end = SmallVec::new();
        for (attachment, target) in desc.color_attachments.iter().zip(frame_buffer.render_targets()) {
            Self::prepare_attachment(attachment, target, &mut begin, &mut end);
        }
        let depth = desc.depth_attachment.as_ref().zip(frame_buffer.depth_stencil());
        if let Some((attachment, target)) = depth {
            Self::prepare_attachment(attachment, target, &mut begin, &mut end);
        }
        if !begin.is_empty() {
            unsafe { self.list.ResourceBarrier(&begin) };
        }

        let rtvs: SmallVec<[D3D12_CPU_DESCRIPTOR_HANDLE; MAX_RENDER_TARGETS]> =
            frame_buffer.render_targets().iter().map(|target| target.cpu).collect();
        let dsv = depth.map(|(_, target)| target.cpu);
        unsafe {
            self.list.OMSetRenderTargets(
                rtvs.len() as u32,
                if rtvs.is_empty() { None } else { Some(rtvs.as_ptr()) },
                BOOL::from(false),
                dsv.as_ref().map(|handle| handle as *const _),
            );
        }

        for (index, (attachment, &rtv)) in desc.color_attachments.iter().zip(&rtvs).enumerate() {
            if attachment.load != AttachmentLoad::Clear {
                continue;
            }
            if let ClearValue::Color(color) = clear_values[index] {
                unsafe { self.list.ClearRenderTargetView(rtv, color.as_ptr(), None) };
            }
        }
        if let (Some((attachment, _)), Some(dsv)) = (depth, dsv) {
            let mut flags = D3D12_CLEAR_FLAGS(0);
            if attachment.load == AttachmentLoad::Clear {
                flags |= D3D12_CLEAR_FLAG_DEPTH;
            }
            if attachment.format.has_stencil() && attachment.stencil_load == AttachmentLoad::Clear {
                flags |= D3D12_CLEAR_FLAG_STENCIL;
            }
            if let (true, ClearValue::DepthStencil { depth, stencil }) =
                (flags.0 != 0, clear_values[desc.color_attachments.len()])
            {
                unsafe { self.list.ClearDepthStencilView(dsv, flags, depth, stencil, None) };
            }
        }

        self.pass_end_transitions = Some(end);
        Ok(())
    }

    fn end_render_pass(&mut self) -> RhiResult<()> {
        self.state.ensure_recording()?;
        let end = self.pass_end_transitions.take().ok_or(RhiError::InvalidCommandListState {
            expected: "inside a render pass",
            actual: "outside a render pass",
        })?;
        if !end.is_empty() {
            let barriers: SmallVec<[D3D12_RESOURCE_BARRIER; MAX_RENDER_TARGETS + 1]> =
                end.iter().map(PendingTransition::barrier).collect();
            unsafe { self.list.ResourceBarrier(&barriers) };
        }
        Ok(())
    }

    fn set_viewport(&mut self, viewport: &Viewport) -> RhiResult<()> {
        self.ensure_graphics()?;
        let native = D3D12_VIEWPORT {
            TopLeftX: viewport.x,
            TopLeftY: viewport.y,
            Width: viewport.width,
            Height: viewport.height,
            MinDepth: viewport.min_depth,
            MaxDepth: viewport.max_depth,
        };
        unsafe { self.list.RSSetViewports(&[native]) };
        Ok(())
    }

    fn set_scissor(&mut self, rect: &ScissorRect) -> RhiResult<()> {
        self.ensure_graphics()?;
        let native = RECT {
            left: rect.left,
            top: rect.top,
            right: rect.right,
            bottom: rect.bottom,
        };
        unsafe { self.list.RSSetScissorRects(&[native]) };
        Ok(())
    }

    fn set_graphics_pipeline(&mut self, pipeline: &GraphicsPipelineState<DirectX12>) -> RhiResult<()> {
        self.ensure_graphics()?;
        let native = pipeline.pipeline()?;
        self.set_graphics_root(native.root_signature());
        unsafe {
            self.list.SetPipelineState(native.handle());
            self.list.IASetPrimitiveTopology(native.topology());
        }
        Ok(())
    }

    fn set_compute_pipeline(&mut self, pipeline: &ComputePipelineState<DirectX12>) -> RhiResult<()> {
        self.ensure_compute()?;
        let native = pipeline.pipeline()?;
        self.set_compute_root(native.root_signature());
        unsafe { self.list.SetPipelineState(native.handle()) };
        Ok(())
    }

    fn bind_graphics_resources(&mut self, layout: &Dx12ResourceLayout, views: &[&Dx12ResourceView]) -> RhiResult<()> {
        self.ensure_graphics()?;
        let tables = self.stage_tables(layout, views)?;
        self.set_graphics_root(layout.handle());
        for (root_index, gpu) in tables {
            unsafe { self.list.SetGraphicsRootDescriptorTable(root_index, gpu) };
        }
        Ok(())
    }

    fn bind_compute_resources(&mut self, layout: &Dx12ResourceLayout, views: &[&Dx12ResourceView]) -> RhiResult<()> {
        self.ensure_compute()?;
        let tables = self.stage_tables(layout, views)?;
        self.set_compute_root(layout.handle());
        for (root_index, gpu) in tables {
            unsafe { self.list.SetComputeRootDescriptorTable(root_index, gpu) };
        }
        Ok(())
    }

    fn push_graphics_constants(&mut self, layout: &Dx12ResourceLayout, values: &[u32]) -> RhiResult<()> {
        self.ensure_graphics()?;
        if let Some(index) = Self::check_constants(layout, values)? {
            self.set_graphics_root(layout.handle());
            unsafe {
                self.list
                    .SetGraphicsRoot32BitConstants(index, values.len() as u32, values.as_ptr() as *const _, 0)
            };
        }
        Ok(())
    }

    fn push_compute_constants(&mut self, layout: &Dx12ResourceLayout, values: &[u32]) -> RhiResult<()> {
        self.ensure_compute()?;
        if let Some(index) = Self::check_constants(layout, values)? {
            self.set_compute_root(layout.handle());
            unsafe {
                self.list
                    .SetComputeRoot32BitConstants(index, values.len() as u32, values.as_ptr() as *const _, 0)
            };
        }
        Ok(())
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: &Dx12Buffer) -> RhiResult<()> {
        self.ensure_graphics()?;
        let meta = buffer.meta();
        let view = D3D12_VERTEX_BUFFER_VIEW {
            BufferLocation: buffer.gpu_address(),
            SizeInBytes: meta.byte_size() as u32,
            StrideInBytes: meta.stride,
        };
        unsafe { self.list.IASetVertexBuffers(slot, Some(&[view])) };
        Ok(())
    }

    fn set_index_buffer(&mut self, buffer: &Dx12Buffer, format: IndexFormat) -> RhiResult<()> {
        self.ensure_graphics()?;
        let view = D3D12_INDEX_BUFFER_VIEW {
            BufferLocation: buffer.gpu_address(),
            SizeInBytes: buffer.meta().byte_size() as u32,
            Format: conv::index_format(format),
        };
        unsafe { self.list.IASetIndexBuffer(Some(&view)) };
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
            self.list
                .DrawIndexedInstanced(index_count, instance_count, first_index, base_vertex, first_instance)
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
            self.list
                .DrawInstanced(vertex_count, instance_count, first_vertex, first_instance)
        };
        Ok(())
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) -> RhiResult<()> {
        self.ensure_compute()?;
        unsafe { self.list.Dispatch(x, y, z) };
        Ok(())
    }

    fn copy_buffer(&mut self, dst: &Dx12Buffer, dst_offset: u64, src: &Dx12Buffer, src_offset: u64, size: u64) -> RhiResult<()> {
        self.state.ensure_recording()?;
        normalize_range_u64(dst_offset..dst_offset + size, dst.meta().byte_size())?;
        normalize_range_u64(src_offset..src_offset + size, src.meta().byte_size())?;
        if size == 0 {
            return Ok(());
        }
        unsafe {
            self.list
                .CopyBufferRegion(dst.handle(), dst_offset, src.handle(), src_offset, size)
        };
        Ok(())
    }
}
