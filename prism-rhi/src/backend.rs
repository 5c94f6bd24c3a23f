//! The backend abstraction.
//!
//! [`Backend`] ties every RHI concept to one native implementation through associated types.
//! Engine code is generic over `B: Backend` and is monomorphized once per api, so no call in
//! the frame loop goes through dynamic dispatch.

use std::rc::Rc;
use prism_core::config::{GraphicsApi, HeapCapacities};
use crate::adapter::AdapterInfo;
use crate::error::{RhiError, RhiResult};
use crate::format::{PixelFormat, PresentMode, SurfaceFormat};
use crate::heap::{DescriptorHeapDesc, DescriptorSlot};
use crate::layout::ResourceLayoutDesc;
use crate::pipeline::{
    ComputePipelineDesc, ComputePipelineState, GraphicsPipelineDesc, GraphicsPipelineState, PipelineFactory,
};
use crate::render_pass::{FrameBufferDesc, RenderPassDesc};
use crate::resource::{
    AccelerationStructureDesc, GpuBufferMetaData, GpuTextureMetaData, ResourceViewDesc, SamplerDesc,
};
use crate::shader::{ShaderBlob, ShaderCompileDesc, ShaderCompiler, ShaderTarget};
use crate::swapchain::SwapchainDesc;
use crate::types::{
    ClearValue, CommandListType, DescriptorHeapType, Extent2D, IndexFormat, ResourceState, ResourceViewType,
    ScissorRect, Viewport, WindowInfo,
};

pub trait Backend: Sized + 'static {
    const API: GraphicsApi;

    type Instance: RhiInstance<Self>;
    type Device: RhiDevice<Self>;
    type CommandQueue: RhiCommandQueue<Self>;
    type CommandAllocator: RhiCommandAllocator;
    type CommandList: RhiCommandList<Self>;
    type Fence: RhiFence;
    type Swapchain: RhiSwapchain<Self>;
    type Buffer: RhiBuffer;
    type Texture: RhiTexture;
    type ResourceView: RhiResourceView;
    type Sampler: RhiSampler;
    type DescriptorHeap: RhiDescriptorHeap;
    type RenderPass: RhiRenderPass;
    type FrameBuffer: RhiFrameBuffer;
    type ResourceLayout: RhiResourceLayout;
    type GraphicsPipeline;
    type ComputePipeline;
    type AccelerationStructure;
}

#[derive(Debug, Clone)]
pub struct InstanceDesc {
    pub application_name: String,
    pub enable_validation: bool,
    /// Window the device presents to. Needed to filter adapters by presentation support.
    pub window: Option<WindowInfo>,
}

#[derive(Debug, Clone)]
pub struct DeviceDesc {
    pub use_hdr: bool,
    pub use_raytracing: bool,
    pub heap_capacities: HeapCapacities,
}

/// Optional device features, resolved once when the device is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceCapabilities {
    pub hdr: bool,
    pub raytracing: bool,
    pub mesh_shading: bool,
    pub variable_rate_shading: bool,
    pub geometry_shader: bool,
    pub tessellation: bool,
}

impl DeviceCapabilities {
    #[inline]
    pub fn is_supported_hdr(&self) -> bool { self.hdr }

    #[inline]
    pub fn is_supported_dxr(&self) -> bool { self.raytracing }

    #[inline]
    pub fn is_supported_mesh_shading(&self) -> bool { self.mesh_shading }

    #[inline]
    pub fn is_supported_variable_rate_shading(&self) -> bool { self.variable_rate_shading }

    /// Fail fast when raytracing is requested on a device without it.
    pub fn require_raytracing(&self) -> RhiResult<()> {
        if self.raytracing {
            Ok(())
        } else {
            Err(RhiError::Unsupported("raytracing"))
        }
    }
}

/// A buffer or texture a view is created for.
pub enum ResourceRef<'a, B: Backend> {
    Buffer(&'a B::Buffer),
    Texture(&'a B::Texture),
}

impl<B: Backend> Clone for ResourceRef<'_, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: Backend> Copy for ResourceRef<'_, B> {}

pub trait RhiInstance<B: Backend>: Sized {
    fn new(desc: &InstanceDesc) -> RhiResult<Self>;

    /// Every adapter the api reports, ranked from best to worst.
    fn enumerate_adapters(&self) -> RhiResult<Vec<AdapterInfo>>;

    /// Create a device on the best usable adapter.
    fn create_device(&self, desc: &DeviceDesc) -> RhiResult<B::Device>;
}

/// Factory of every GPU object. Owns descriptor index allocation.
pub trait RhiDevice<B: Backend> {
    fn adapter_info(&self) -> &AdapterInfo;

    fn capabilities(&self) -> &DeviceCapabilities;

    fn shader_target(&self) -> ShaderTarget;

    fn compile_shader(&self, desc: &ShaderCompileDesc) -> RhiResult<ShaderBlob> {
        ShaderCompiler::new(self.shader_target()).compile(desc)
    }

    /// Device owned heap every view or sampler of `heap_type` is allocated from.
    fn descriptor_heap(&self, heap_type: DescriptorHeapType) -> &B::DescriptorHeap;

    fn create_buffer(&self, meta: &GpuBufferMetaData) -> RhiResult<B::Buffer>;

    fn create_texture(&self, meta: &GpuTextureMetaData) -> RhiResult<B::Texture>;

    fn create_sampler(&self, desc: &SamplerDesc) -> RhiResult<B::Sampler>;

    fn create_resource_view(&self, resource: ResourceRef<'_, B>, desc: &ResourceViewDesc) -> RhiResult<B::ResourceView>;

    fn create_command_queue(&self, queue_type: CommandListType) -> RhiResult<B::CommandQueue>;

    fn create_command_allocator(&self, list_type: CommandListType) -> RhiResult<B::CommandAllocator>;

    fn create_command_list(&self, allocator: &B::CommandAllocator) -> RhiResult<B::CommandList>;

    /// `queue` is the graphics queue presentation happens on.
    fn create_swapchain(&self, queue: &B::CommandQueue, desc: &SwapchainDesc) -> RhiResult<B::Swapchain>;

    fn create_descriptor_heap(&self, desc: &DescriptorHeapDesc) -> RhiResult<B::DescriptorHeap>;

    fn create_render_pass(&self, desc: &RenderPassDesc) -> RhiResult<B::RenderPass>;

    fn create_frame_buffer(&self, render_pass: &B::RenderPass, desc: &FrameBufferDesc<'_, B>) -> RhiResult<B::FrameBuffer>;

    fn create_resource_layout(&self, desc: &ResourceLayoutDesc) -> RhiResult<B::ResourceLayout>;

    fn create_pipeline_factory(&self) -> PipelineFactory {
        PipelineFactory::new(*self.capabilities())
    }

    fn create_graphics_pipeline_state(&self, layout: Rc<B::ResourceLayout>) -> GraphicsPipelineState<B> {
        GraphicsPipelineState::new(layout)
    }

    fn create_compute_pipeline_state(&self, layout: Rc<B::ResourceLayout>) -> ComputePipelineState<B> {
        ComputePipelineState::new(layout)
    }

    /// Native pipeline creation, called once by `GraphicsPipelineState::complete_setting`.
    fn create_graphics_pipeline(
        &self,
        layout: &B::ResourceLayout,
        desc: &GraphicsPipelineDesc<'_>,
    ) -> RhiResult<B::GraphicsPipeline>;

    /// Native pipeline creation, called once by `ComputePipelineState::complete_setting`.
    fn create_compute_pipeline(
        &self,
        layout: &B::ResourceLayout,
        desc: &ComputePipelineDesc<'_>,
    ) -> RhiResult<B::ComputePipeline>;

    fn create_fence(&self, initial_value: u64) -> RhiResult<B::Fence>;

    fn create_acceleration_structure(&self, desc: &AccelerationStructureDesc) -> RhiResult<B::AccelerationStructure>;

    fn wait_idle(&self) -> RhiResult<()>;
}

pub trait RhiCommandQueue<B: Backend> {
    fn queue_type(&self) -> CommandListType;

    /// Submit closed command lists in order.
    fn execute(&self, lists: &[&B::CommandList]) -> RhiResult<()>;

    /// Gpu side signal once all previously submitted work completed.
    fn signal(&self, fence: &B::Fence, value: u64) -> RhiResult<()>;

    /// Gpu side wait, later submissions start after `fence` reached `value`.
    fn wait(&self, fence: &B::Fence, value: u64) -> RhiResult<()>;
}

/// Backing memory of command lists. Resetting invalidates every list recorded from it.
pub trait RhiCommandAllocator {
    fn list_type(&self) -> CommandListType;

    fn reset(&self) -> RhiResult<()>;
}

/// Monotonic 64 bit timeline.
pub trait RhiFence {
    fn completed_value(&self) -> u64;

    /// Cpu side signal. Values below the completed value are rejected.
    fn signal(&self, value: u64) -> RhiResult<()>;

    /// Block the calling thread until the fence reached `value`.
    fn wait(&self, value: u64) -> RhiResult<()>;
}

pub trait RhiCommandList<B: Backend> {
    fn list_type(&self) -> CommandListType;

    fn is_recording(&self) -> bool;

    fn begin_recording(&mut self) -> RhiResult<()>;

    fn end_recording(&mut self) -> RhiResult<()>;

    fn transition_texture(&mut self, texture: &B::Texture, before: ResourceState, after: ResourceState) -> RhiResult<()>;

    fn transition_buffer(&mut self, buffer: &B::Buffer, before: ResourceState, after: ResourceState) -> RhiResult<()>;

    /// Bind the attachments of `frame_buffer`, one clear value per attachment, colors first.
    fn begin_render_pass(
        &mut self,
        render_pass: &B::RenderPass,
        frame_buffer: &B::FrameBuffer,
        clear_values: &[ClearValue],
    ) -> RhiResult<()>;

    fn end_render_pass(&mut self) -> RhiResult<()>;

    fn set_viewport(&mut self, viewport: &Viewport) -> RhiResult<()>;

    fn set_scissor(&mut self, rect: &ScissorRect) -> RhiResult<()>;

    fn set_graphics_pipeline(&mut self, pipeline: &GraphicsPipelineState<B>) -> RhiResult<()>;

    fn set_compute_pipeline(&mut self, pipeline: &ComputePipelineState<B>) -> RhiResult<()>;

    /// Bind one view per layout element, in layout order.
    fn bind_graphics_resources(&mut self, layout: &B::ResourceLayout, views: &[&B::ResourceView]) -> RhiResult<()>;

    fn bind_compute_resources(&mut self, layout: &B::ResourceLayout, views: &[&B::ResourceView]) -> RhiResult<()>;

    fn push_graphics_constants(&mut self, layout: &B::ResourceLayout, values: &[u32]) -> RhiResult<()>;

    fn push_compute_constants(&mut self, layout: &B::ResourceLayout, values: &[u32]) -> RhiResult<()>;

    fn set_vertex_buffer(&mut self, slot: u32, buffer: &B::Buffer) -> RhiResult<()>;

    fn set_index_buffer(&mut self, buffer: &B::Buffer, format: IndexFormat) -> RhiResult<()>;

    fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    ) -> RhiResult<()>;

    fn draw_instanced(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> RhiResult<()>;

    fn dispatch(&mut self, x: u32, y: u32, z: u32) -> RhiResult<()>;

    fn copy_buffer(&mut self, dst: &B::Buffer, dst_offset: u64, src: &B::Buffer, src_offset: u64, size: u64) -> RhiResult<()>;
}

pub trait RhiSwapchain<B: Backend> {
    /// Acquire the next back buffer. The acquire completion signals `fence` to `signal_value`
    /// on `queue`.
    fn prepare_next_image(&mut self, queue: &B::CommandQueue, fence: &B::Fence, signal_value: u64) -> RhiResult<u32>;

    /// Present the current back buffer once `fence` reached `wait_value` on `queue`.
    fn present(&mut self, queue: &B::CommandQueue, fence: &B::Fence, wait_value: u64) -> RhiResult<()>;

    /// Recreate back buffers for a new extent. Returns `false` when nothing changed.
    /// The caller guarantees the gpu is idle and no back buffer view is alive.
    fn resize(&mut self, width: u32, height: u32) -> RhiResult<bool>;

    fn current_buffer_index(&self) -> u32;

    fn buffer_count(&self) -> u32;

    fn back_buffer(&self, index: u32) -> &B::Texture;

    fn surface_format(&self) -> SurfaceFormat;

    fn back_buffer_format(&self) -> PixelFormat {
        self.surface_format().format
    }

    fn present_mode(&self) -> PresentMode;

    fn extent(&self) -> Extent2D;
}

pub trait RhiBuffer {
    fn meta(&self) -> &GpuBufferMetaData;

    /// Write into cpu visible memory.
    fn write(&self, offset: u64, data: &[u8]) -> RhiResult<()>;

    /// Read cpu visible memory back.
    fn read(&self, offset: u64, data: &mut [u8]) -> RhiResult<()>;
}

pub trait RhiTexture {
    fn meta(&self) -> &GpuTextureMetaData;

    #[inline]
    fn extent(&self) -> Extent2D {
        Extent2D::new(self.meta().width, self.meta().height)
    }

    #[inline]
    fn format(&self) -> PixelFormat {
        self.meta().format
    }
}

pub trait RhiResourceView {
    fn view_type(&self) -> ResourceViewType;

    /// Slot in the device heap of the view type.
    fn descriptor_index(&self) -> u32;
}

pub trait RhiSampler {
    fn desc(&self) -> &SamplerDesc;

    fn descriptor_index(&self) -> u32;
}

pub trait RhiDescriptorHeap {
    fn heap_type(&self) -> DescriptorHeapType;

    fn capacity(&self) -> u32;

    fn allocated(&self) -> u32;

    fn allocate(&self) -> RhiResult<DescriptorSlot>;
}

pub trait RhiRenderPass {
    fn desc(&self) -> &RenderPassDesc;
}

pub trait RhiFrameBuffer {
    fn extent(&self) -> Extent2D;
}

pub trait RhiResourceLayout {
    fn desc(&self) -> &ResourceLayoutDesc;
}

/// Collect view types of a view table for layout validation.
pub(crate) fn view_types<V: RhiResourceView>(views: &[&V]) -> prism_core::collections::SmallVec<[ResourceViewType; 16]> {
    views.iter().map(|view| view.view_type()).collect()
}
