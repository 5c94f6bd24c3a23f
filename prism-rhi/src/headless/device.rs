use crate::adapter::{AdapterInfo, AdapterKind, ApiVersion};
use crate::backend::{
    DeviceCapabilities, DeviceDesc, InstanceDesc, ResourceRef, RhiBuffer, RhiDevice, RhiInstance,
    RhiRenderPass, RhiResourceLayout, RhiResourceView, RhiTexture,
};
use crate::error::{RhiError, RhiResult};
use crate::format::{ColorSpace, PixelFormat, PresentMode, SurfaceFormat};
use crate::heap::{DescriptorAllocator, DescriptorHeapDesc};
use crate::layout::ResourceLayoutDesc;
use crate::pipeline::{ComputePipelineDesc, GraphicsPipelineDesc};
use crate::render_pass::{FrameBufferDesc, RenderPassDesc};
use crate::resource::{
    validate_view_usage, AccelerationStructureDesc, GpuBufferMetaData, GpuTextureMetaData, ResourceViewDesc,
    SamplerDesc,
};
use crate::shader::ShaderTarget;
use crate::swapchain::{SurfaceCapabilities, SwapchainDesc};
use crate::types::{CommandListType, DescriptorHeapType, Extent2D, ResourceViewType};
use super::command::{HeadlessCommandAllocator, HeadlessCommandList};
use super::queue::{HeadlessCommandQueue, HeadlessFence};
use super::resource::{
    HeadlessAccelerationStructure, HeadlessBuffer, HeadlessComputePipeline, HeadlessFrameBuffer,
    HeadlessGraphicsPipeline, HeadlessRenderPass, HeadlessResourceLayout, HeadlessResourceView, HeadlessSampler,
    HeadlessTexture,
};
use super::swapchain::HeadlessSwapchain;
use super::Headless;

/// What the pretend presentation surface reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedSurface {
    pub formats: Vec<SurfaceFormat>,
    pub present_modes: Vec<PresentMode>,
    pub capabilities: SurfaceCapabilities,
}

impl Default for SimulatedSurface {
    fn default() -> Self {
        Self {
            formats: vec![
                SurfaceFormat::new(PixelFormat::B8G8R8A8Unorm, ColorSpace::SrgbNonLinear),
                SurfaceFormat::new(PixelFormat::B8G8R8A8Srgb, ColorSpace::SrgbNonLinear),
                SurfaceFormat::new(PixelFormat::R16G16B16A16Float, ColorSpace::ExtendedSrgbLinear),
            ],
            present_modes: vec![PresentMode::Fifo, PresentMode::Mailbox, PresentMode::Immediate],
            capabilities: SurfaceCapabilities {
                min_image_count: 2,
                max_image_count: 8,
                current_extent: Extent2D::new(u32::MAX, u32::MAX),
                min_extent: Extent2D::new(1, 1),
                max_extent: Extent2D::new(16384, 16384),
            },
        }
    }
}

pub struct HeadlessInstance {
    adapters: Vec<AdapterInfo>,
    capabilities: DeviceCapabilities,
    surface: SimulatedSurface,
}

impl HeadlessInstance {
    /// Features the simulated device reports.
    pub fn with_capabilities(mut self, capabilities: DeviceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_surface(mut self, surface: SimulatedSurface) -> Self {
        self.surface = surface;
        self
    }

    fn default_capabilities() -> DeviceCapabilities {
        DeviceCapabilities {
            hdr: true,
            raytracing: false,
            mesh_shading: false,
            variable_rate_shading: false,
            geometry_shader: true,
            tessellation: true,
        }
    }
}

impl RhiInstance<Headless> for HeadlessInstance {
    fn new(desc: &InstanceDesc) -> RhiResult<Self> {
        log::info!("Headless instance created for `{}`", desc.application_name);
        Ok(Self {
            adapters: vec![AdapterInfo {
                name: "Prism Headless Adapter".to_owned(),
                vendor_id: 0,
                device_id: 0,
                kind: AdapterKind::Cpu,
                dedicated_video_memory: 0,
                api_version: ApiVersion::new(1, 0),
                usable: true,
            }],
            capabilities: Self::default_capabilities(),
            surface: SimulatedSurface::default(),
        })
    }

    fn enumerate_adapters(&self) -> RhiResult<Vec<AdapterInfo>> {
        Ok(self.adapters.clone())
    }

    fn create_device(&self, desc: &DeviceDesc) -> RhiResult<HeadlessDevice> {
        let adapter = self.adapters.first().cloned().ok_or(RhiError::NoSuitableAdapter)?;
        if desc.use_raytracing {
            self.capabilities.require_raytracing()?;
        }
        if desc.use_hdr && !self.capabilities.hdr {
            log::warn!("HDR output requested but the device does not support it, falling back to SDR");
        }

        let heaps = DescriptorHeapType::ALL
            .map(|heap_type| DescriptorAllocator::new(heap_type, heap_type.capacity(&desc.heap_capacities)));

        log::info!("Headless device created on `{}`", adapter.name);
        Ok(HeadlessDevice {
            adapter,
            capabilities: self.capabilities,
            surface: self.surface.clone(),
            heaps,
        })
    }
}

pub struct HeadlessDevice {
    adapter: AdapterInfo,
    capabilities: DeviceCapabilities,
    surface: SimulatedSurface,
    heaps: [DescriptorAllocator; 6],
}

impl RhiDevice<Headless> for HeadlessDevice {
    #[inline]
    fn adapter_info(&self) -> &AdapterInfo {
        &self.adapter
    }

    #[inline]
    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    #[inline]
    fn shader_target(&self) -> ShaderTarget {
        ShaderTarget::Source
    }

    #[inline]
    fn descriptor_heap(&self, heap_type: DescriptorHeapType) -> &DescriptorAllocator {
        &self.heaps[heap_type.index()]
    }

    fn create_buffer(&self, meta: &GpuBufferMetaData) -> RhiResult<HeadlessBuffer> {
        if meta.byte_size() == 0 {
            return Err(RhiError::InvalidDescriptor(format!("buffer `{}` is empty", meta.name)));
        }
        Ok(HeadlessBuffer::new(meta.clone()))
    }

    fn create_texture(&self, meta: &GpuTextureMetaData) -> RhiResult<HeadlessTexture> {
        if meta.width == 0 || meta.height == 0 {
            return Err(RhiError::InvalidExtent {
                width: meta.width,
                height: meta.height,
            });
        }
        Ok(HeadlessTexture::new(meta.clone()))
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> RhiResult<HeadlessSampler> {
        let slot = self.descriptor_heap(DescriptorHeapType::Sampler).allocate()?;
        Ok(HeadlessSampler::new(*desc, slot))
    }

    fn create_resource_view(&self, resource: ResourceRef<'_, Headless>, desc: &ResourceViewDesc) -> RhiResult<HeadlessResourceView> {
        let (id, format) = match resource {
            ResourceRef::Buffer(buffer) => {
                validate_view_usage(&buffer.meta().name, desc.view_type, buffer.meta().usage, false)?;
                (buffer.id(), buffer.meta().format)
            }
            ResourceRef::Texture(texture) => {
                validate_view_usage(&texture.meta().name, desc.view_type, texture.meta().usage, true)?;
                (texture.id(), desc.resolve_texture_format(texture.format()))
            }
        };
        let slot = self.descriptor_heap(desc.view_type.heap_type()).allocate()?;
        Ok(HeadlessResourceView::new(desc.view_type, id, format, slot))
    }

    fn create_command_queue(&self, queue_type: CommandListType) -> RhiResult<HeadlessCommandQueue> {
        Ok(HeadlessCommandQueue::new(queue_type))
    }

    fn create_command_allocator(&self, list_type: CommandListType) -> RhiResult<HeadlessCommandAllocator> {
        Ok(HeadlessCommandAllocator::new(list_type))
    }

    fn create_command_list(&self, allocator: &HeadlessCommandAllocator) -> RhiResult<HeadlessCommandList> {
        Ok(HeadlessCommandList::new(allocator))
    }

    fn create_swapchain(&self, _queue: &HeadlessCommandQueue, desc: &SwapchainDesc) -> RhiResult<HeadlessSwapchain> {
        HeadlessSwapchain::new(self.surface.clone(), desc, self.capabilities.hdr)
    }

    fn create_descriptor_heap(&self, desc: &DescriptorHeapDesc) -> RhiResult<DescriptorAllocator> {
        Ok(DescriptorAllocator::new(desc.heap_type, desc.capacity))
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> RhiResult<HeadlessRenderPass> {
        desc.validate()?;
        Ok(HeadlessRenderPass::new(desc.clone()))
    }

    fn create_frame_buffer(&self, render_pass: &HeadlessRenderPass, desc: &FrameBufferDesc<'_, Headless>) -> RhiResult<HeadlessFrameBuffer> {
        let pass = render_pass.desc();
        if desc.render_targets.len() != pass.color_attachments.len()
            || desc.depth_stencil.is_some() != pass.depth_attachment.is_some()
        {
            return Err(RhiError::InvalidDescriptor(format!(
                "frame buffer does not match the attachments of render pass `{}`",
                pass.name
            )));
        }
        if let Some(view) = desc.render_targets.iter().find(|view| view.view_type() != ResourceViewType::RenderTarget) {
            return Err(RhiError::InvalidDescriptor(format!(
                "{:?} view bound as render target of `{}`",
                view.view_type(),
                pass.name
            )));
        }
        if desc.depth_stencil.is_some_and(|view| view.view_type() != ResourceViewType::DepthStencil) {
            return Err(RhiError::InvalidDescriptor(format!(
                "depth attachment of `{}` is not a depth stencil view",
                pass.name
            )));
        }

        Ok(HeadlessFrameBuffer::new(
            Extent2D::new(desc.width, desc.height),
            desc.render_targets.iter().map(|view| view.resource()).collect(),
            desc.depth_stencil.map(|view| view.resource()),
        ))
    }

    fn create_resource_layout(&self, desc: &ResourceLayoutDesc) -> RhiResult<HeadlessResourceLayout> {
        desc.validate()?;
        Ok(HeadlessResourceLayout::new(desc.clone()))
    }

    fn create_graphics_pipeline(
        &self,
        layout: &HeadlessResourceLayout,
        desc: &GraphicsPipelineDesc<'_>,
    ) -> RhiResult<HeadlessGraphicsPipeline> {
        if !layout.desc().input_assembler && !desc.input_assembly.elements.is_empty() {
            return Err(RhiError::InvalidDescriptor(format!(
                "pipeline `{}` reads vertex input through compute layout `{}`",
                desc.name,
                layout.desc().name
            )));
        }
        if let Some(element) = desc
            .input_assembly
            .elements
            .iter()
            .find(|e| e.input_slot as usize >= desc.input_assembly.strides.len())
        {
            return Err(RhiError::InvalidDescriptor(format!(
                "input element {} of `{}` reads slot {} without a stride",
                element.semantic_name, desc.name, element.input_slot
            )));
        }

        Ok(HeadlessGraphicsPipeline {
            name: desc.name.to_owned(),
            render_target_formats: desc.render_target_formats.to_vec(),
            depth_stencil_format: desc.depth_stencil_format,
            entry_points: desc.shaders().map(|blob| blob.entry_point().to_owned()).collect(),
        })
    }

    fn create_compute_pipeline(
        &self,
        _layout: &HeadlessResourceLayout,
        desc: &ComputePipelineDesc<'_>,
    ) -> RhiResult<HeadlessComputePipeline> {
        Ok(HeadlessComputePipeline {
            name: desc.name.to_owned(),
            entry_point: desc.compute.entry_point().to_owned(),
        })
    }

    fn create_fence(&self, initial_value: u64) -> RhiResult<HeadlessFence> {
        Ok(HeadlessFence::new(initial_value))
    }

    fn create_acceleration_structure(&self, desc: &AccelerationStructureDesc) -> RhiResult<HeadlessAccelerationStructure> {
        self.capabilities.require_raytracing()?;
        Ok(HeadlessAccelerationStructure { desc: desc.clone() })
    }

    fn wait_idle(&self) -> RhiResult<()> {
        Ok(())
    }
}
