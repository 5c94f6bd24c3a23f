//! Buffers, images, views, samplers and the attachment sets bound by render passes.

use std::cell::Cell;
use std::rc::Rc;
use ash::vk;
use prism_core::collections::SmallVec;
use prism_rhi_derive::DeviceObject;
use crate::backend::{
    ResourceRef, RhiBuffer, RhiDescriptorHeap, RhiDevice, RhiFrameBuffer, RhiRenderPass, RhiResourceView, RhiSampler, RhiTexture,
};
use crate::error::{RhiError, RhiResult, ResultExt};
use crate::flags::{BufferCreateFlags, ResourceUsage};
use crate::format::PixelFormat;
use crate::heap::DescriptorSlot;
use crate::render_pass::{FrameBufferDesc, RenderPassDesc, MAX_RENDER_TARGETS};
use crate::resource::{
    validate_view_usage, AccelerationStructureDesc, AccelerationStructureKind, FilterMode, GpuBufferMetaData,
    GpuTextureMetaData, ResourceViewDesc, SamplerDesc, TextureDimension,
};
use crate::types::{Extent2D, ResourceViewType};
use crate::utility::normalize_range_u64;
use super::conv;
use super::device::{DebuggableObject, VulkanDevice};
use super::Vulkan;

fn sharing_mode(families: &[u32]) -> vk::SharingMode {
    if families.len() > 1 { vk::SharingMode::CONCURRENT } else { vk::SharingMode::EXCLUSIVE }
}

/// GPU buffer with memory allocation.
#[DeviceObject]
pub struct VulkanBuffer {
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    meta: GpuBufferMetaData,
}

impl VulkanBuffer {
    pub(crate) fn new(device: &VulkanDevice, meta: &GpuBufferMetaData) -> RhiResult<Self> {
        let families = device.sharing_families();
        let device_address = meta.usage.contains(ResourceUsage::AccelerationStructure);

        let buffer_info = vk::BufferCreateInfo::default()
            .size(meta.byte_size())
            .usage(conv::buffer_usage(meta.usage) | vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST)
            .sharing_mode(sharing_mode(&families))
            .queue_family_indices(&families);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None) }.context("vkCreateBuffer")?;
        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let (preferred, fallback) = if meta.flags.contains(BufferCreateFlags::Readback) {
            (host | vk::MemoryPropertyFlags::HOST_CACHED, host)
        } else if meta.flags.contains(BufferCreateFlags::CpuAccess) {
            (host, host)
        } else {
            (vk::MemoryPropertyFlags::DEVICE_LOCAL, vk::MemoryPropertyFlags::empty())
        };

        let memory = match device.allocate_memory(requirements, preferred, fallback, device_address) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(e);
            }
        };
        unsafe { device.handle().bind_buffer_memory(buffer, memory, 0) }.context("vkBindBufferMemory")?;

        log::trace!("Buffer `{}` created, {} bytes", meta.name, meta.byte_size());

        let buffer = Self {
            buffer,
            memory,
            meta: meta.clone(),
            device: device.handle().clone(),
        };
        buffer.set_debug_name(device);
        Ok(buffer)
    }

    /// Get the raw Vulkan buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Get buffer device address (requires the acceleration structure usage).
    pub fn device_address(&self) -> vk::DeviceAddress {
        let info = vk::BufferDeviceAddressInfo::default().buffer(self.buffer);
        unsafe { self.device.get_buffer_device_address(&info) }
    }

    fn mapped<R>(&self, offset: u64, len: usize, access: impl FnOnce(*mut u8) -> R) -> RhiResult<R> {
        if !self.meta.is_cpu_visible() {
            return Err(RhiError::NotCpuVisible);
        }
        let (offset, size) = normalize_range_u64(offset..offset + len as u64, self.meta.byte_size())?;
        if size == 0 {
            return Ok(access(std::ptr::null_mut()));
        }

        // SAFETY: the range is checked against the buffer size and the mapping is limited to it.
        unsafe {
            let ptr = self
                .device
                .map_memory(self.memory, offset, size, vk::MemoryMapFlags::empty())
                .context("vkMapMemory")?;
            let result = access(ptr as *mut u8);
            self.device.unmap_memory(self.memory);
            Ok(result)
        }
    }
}

impl RhiBuffer for VulkanBuffer {
    #[inline]
    fn meta(&self) -> &GpuBufferMetaData {
        &self.meta
    }

    fn write(&self, offset: u64, data: &[u8]) -> RhiResult<()> {
        self.mapped(offset, data.len(), |ptr| {
            if !ptr.is_null() {
                unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), ptr, data.len()) };
            }
        })
    }

    fn read(&self, offset: u64, data: &mut [u8]) -> RhiResult<()> {
        let len = data.len();
        self.mapped(offset, len, |ptr| {
            if !ptr.is_null() {
                unsafe { std::ptr::copy_nonoverlapping(ptr as *const u8, data.as_mut_ptr(), len) };
            }
        })
    }
}

impl DebuggableObject for VulkanBuffer {
    fn set_debug_name(&self, device: &VulkanDevice) {
        device.set_debug_name(self.buffer, &self.meta.name);
        device.set_debug_name(self.memory, &format!("{}.memory", self.meta.name));
    }
}

impl Drop for VulkanBuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
        log::trace!("Buffer `{}` destroyed", self.meta.name);
    }
}

/// GPU image. Swapchain images are borrowed from the presentation engine and own no memory.
#[DeviceObject]
pub struct VulkanTexture {
    image: vk::Image,
    memory: Option<vk::DeviceMemory>,
    meta: GpuTextureMetaData,
    aspect: vk::ImageAspectFlags,
    /// False until the first transition, the image layout is `UNDEFINED` before that.
    initialized: Rc<Cell<bool>>,
}

impl VulkanTexture {
    pub(crate) fn new(device: &VulkanDevice, meta: &GpuTextureMetaData) -> RhiResult<Self> {
        let families = device.sharing_families();
        let (image_type, depth, array_layers, flags) = match meta.dimension {
            TextureDimension::Texture2D => (vk::ImageType::TYPE_2D, 1, meta.depth_or_array_size.max(1), vk::ImageCreateFlags::empty()),
            TextureDimension::Texture3D => (vk::ImageType::TYPE_3D, meta.depth_or_array_size.max(1), 1, vk::ImageCreateFlags::empty()),
            TextureDimension::TextureCube => (vk::ImageType::TYPE_2D, 1, 6, vk::ImageCreateFlags::CUBE_COMPATIBLE),
        };

        let image_info = vk::ImageCreateInfo::default()
            .flags(flags)
            .image_type(image_type)
            .format(conv::format(meta.format))
            .extent(vk::Extent3D {
                width: meta.width,
                height: meta.height,
                depth,
            })
            .mip_levels(meta.mip_levels.max(1))
            .array_layers(array_layers)
            .samples(conv::sample_count(meta.sample_count))
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(conv::image_usage(meta.usage) | vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::TRANSFER_DST)
            .sharing_mode(sharing_mode(&families))
            .queue_family_indices(&families)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&image_info, None) }.context("vkCreateImage")?;
        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };
        let memory = match device.allocate_memory(
            requirements,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::empty(),
            false,
        ) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.handle().destroy_image(image, None) };
                return Err(e);
            }
        };
        unsafe { device.handle().bind_image_memory(image, memory, 0) }.context("vkBindImageMemory")?;

        log::trace!("Texture `{}` created, {}x{} {:?}", meta.name, meta.width, meta.height, meta.format);

        let texture = Self {
            image,
            memory: Some(memory),
            meta: meta.clone(),
            aspect: conv::aspect(meta.format),
            initialized: Rc::new(Cell::new(false)),
            device: device.handle().clone(),
        };
        texture.set_debug_name(device);
        Ok(texture)
    }

    pub(crate) fn from_swapchain_image(device: &ash::Device, image: vk::Image, meta: GpuTextureMetaData) -> Self {
        Self {
            image,
            memory: None,
            aspect: conv::aspect(meta.format),
            meta,
            initialized: Rc::new(Cell::new(false)),
            device: device.clone(),
        }
    }

    /// Get the raw Vulkan image handle.
    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub(crate) fn aspect(&self) -> vk::ImageAspectFlags {
        self.aspect
    }

    /// Mark the layout as defined and report whether it was before.
    #[inline]
    pub(crate) fn take_initialized(&self) -> bool {
        self.initialized.replace(true)
    }

    #[inline]
    pub fn is_swapchain_texture(&self) -> bool {
        self.memory.is_none()
    }
}

impl RhiTexture for VulkanTexture {
    #[inline]
    fn meta(&self) -> &GpuTextureMetaData {
        &self.meta
    }
}

impl DebuggableObject for VulkanTexture {
    fn set_debug_name(&self, device: &VulkanDevice) {
        device.set_debug_name(self.image, &self.meta.name);
        if let Some(memory) = self.memory {
            device.set_debug_name(memory, &format!("{}.memory", self.meta.name));
        }
    }
}

impl Drop for VulkanTexture {
    fn drop(&mut self) {
        if let Some(memory) = self.memory {
            unsafe {
                self.device.destroy_image(self.image, None);
                self.device.free_memory(memory, None);
            }
        }
    }
}

/// Image side of a view, everything render passes and descriptor writes need.
#[derive(Clone)]
pub(crate) struct ImageTarget {
    pub(crate) view: vk::ImageView,
    pub(crate) image: vk::Image,
    pub(crate) aspect: vk::ImageAspectFlags,
    pub(crate) extent: Extent2D,
    pub(crate) initialized: Rc<Cell<bool>>,
}

pub(crate) enum ViewTarget {
    Buffer { buffer: vk::Buffer, offset: u64, range: u64 },
    Image(ImageTarget),
}

#[DeviceObject]
pub struct VulkanResourceView {
    view_type: ResourceViewType,
    target: ViewTarget,
    slot: DescriptorSlot,
}

impl VulkanResourceView {
    pub(crate) fn new(device: &VulkanDevice, resource: ResourceRef<'_, Vulkan>, desc: &ResourceViewDesc) -> RhiResult<Self> {
        let target = match resource {
            ResourceRef::Buffer(buffer) => {
                let meta = buffer.meta();
                validate_view_usage(&meta.name, desc.view_type, meta.usage, false)?;

                let stride = meta.stride as u64;
                let first = desc.first as u64;
                let count = if desc.count == 0 { meta.count as u64 - first.min(meta.count as u64) } else { desc.count as u64 };
                let (offset, range) = normalize_range_u64(first * stride..(first + count) * stride, meta.byte_size())?;
                ViewTarget::Buffer {
                    buffer: buffer.handle(),
                    offset,
                    range,
                }
            }
            ResourceRef::Texture(texture) => {
                let meta = texture.meta();
                validate_view_usage(&meta.name, desc.view_type, meta.usage, true)?;
                ViewTarget::Image(create_image_view(device, texture, desc)?)
            }
        };

        let slot = device.descriptor_heap(desc.view_type.heap_type()).allocate()?;
        Ok(Self {
            view_type: desc.view_type,
            target,
            slot,
            device: device.handle().clone(),
        })
    }

    #[inline]
    pub(crate) fn target(&self) -> &ViewTarget {
        &self.target
    }

    pub(crate) fn image_target(&self) -> RhiResult<&ImageTarget> {
        match &self.target {
            ViewTarget::Image(image) => Ok(image),
            ViewTarget::Buffer { .. } => Err(RhiError::InvalidDescriptor(format!(
                "{:?} view of a buffer used as an attachment",
                self.view_type
            ))),
        }
    }
}

fn create_image_view(device: &VulkanDevice, texture: &VulkanTexture, desc: &ResourceViewDesc) -> RhiResult<ImageTarget> {
    let meta = texture.meta();

    // depth can not be reinterpreted as color on Vulkan, sample the depth aspect instead
    let (format, aspect) = if meta.format.is_depth() {
        let aspect = match desc.view_type {
            ResourceViewType::DepthStencil => texture.aspect(),
            _ => vk::ImageAspectFlags::DEPTH,
        };
        (meta.format, aspect)
    } else {
        let format = if desc.format == PixelFormat::Unknown { meta.format } else { desc.format };
        (format, vk::ImageAspectFlags::COLOR)
    };

    let single_level = matches!(
        desc.view_type,
        ResourceViewType::RenderTarget | ResourceViewType::DepthStencil | ResourceViewType::UnorderedAccess
    );
    let level_count = if single_level {
        1
    } else if desc.count == 0 {
        vk::REMAINING_MIP_LEVELS
    } else {
        desc.count
    };

    let view_type = match (meta.dimension, desc.view_type) {
        (TextureDimension::Texture3D, _) => vk::ImageViewType::TYPE_3D,
        (TextureDimension::TextureCube, ResourceViewType::ShaderResource) => vk::ImageViewType::CUBE,
        (TextureDimension::TextureCube, _) => vk::ImageViewType::TYPE_2D_ARRAY,
        (TextureDimension::Texture2D, _) if meta.depth_or_array_size > 1 => vk::ImageViewType::TYPE_2D_ARRAY,
        (TextureDimension::Texture2D, _) => vk::ImageViewType::TYPE_2D,
    };

    let view_info = vk::ImageViewCreateInfo::default()
        .image(texture.handle())
        .view_type(view_type)
        .format(conv::format(format))
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(aspect)
                .base_mip_level(desc.first)
                .level_count(level_count)
                .base_array_layer(0)
                .layer_count(vk::REMAINING_ARRAY_LAYERS),
        );
    let view = unsafe { device.handle().create_image_view(&view_info, None) }.context("vkCreateImageView")?;
    device.set_debug_name(view, &format!("{}.{:?}", meta.name, desc.view_type));

    Ok(ImageTarget {
        view,
        image: texture.handle(),
        aspect: texture.aspect(),
        extent: texture.extent(),
        initialized: texture.initialized.clone(),
    })
}

impl RhiResourceView for VulkanResourceView {
    #[inline]
    fn view_type(&self) -> ResourceViewType {
        self.view_type
    }

    #[inline]
    fn descriptor_index(&self) -> u32 {
        self.slot.index()
    }
}

impl Drop for VulkanResourceView {
    fn drop(&mut self) {
        if let ViewTarget::Image(image) = &self.target {
            unsafe {
                self.device.destroy_image_view(image.view, None);
            }
        }
    }
}

#[DeviceObject]
pub struct VulkanSampler {
    sampler: vk::Sampler,
    desc: SamplerDesc,
    slot: DescriptorSlot,
}

impl VulkanSampler {
    pub(crate) fn new(device: &VulkanDevice, desc: &SamplerDesc, slot: DescriptorSlot) -> RhiResult<Self> {
        let sampler = create_sampler(device, desc)?;
        Ok(Self {
            sampler,
            desc: *desc,
            slot,
            device: device.handle().clone(),
        })
    }

    /// Get the raw Vulkan sampler handle.
    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

/// Native sampler for `desc`, also used for the immutable samplers of resource layouts.
pub(crate) fn create_sampler(device: &VulkanDevice, desc: &SamplerDesc) -> RhiResult<vk::Sampler> {
    let (filter, mipmap_mode) = conv::filter(desc.filter);
    let anisotropy_enable = desc.filter == FilterMode::Anisotropic && device.features().sampler_anisotropy;
    let max_anisotropy = (desc.max_anisotropy as f32).clamp(1.0, device.properties().limits.max_sampler_anisotropy);

    let create_info = vk::SamplerCreateInfo::default()
        .mag_filter(filter)
        .min_filter(filter)
        .mipmap_mode(mipmap_mode)
        .address_mode_u(conv::address_mode(desc.address_u))
        .address_mode_v(conv::address_mode(desc.address_v))
        .address_mode_w(conv::address_mode(desc.address_w))
        .mip_lod_bias(desc.mip_lod_bias)
        .anisotropy_enable(anisotropy_enable)
        .max_anisotropy(max_anisotropy)
        .compare_enable(desc.comparison.is_some())
        .compare_op(desc.comparison.map_or(vk::CompareOp::ALWAYS, conv::compare_op))
        .min_lod(desc.min_lod)
        .max_lod(desc.max_lod.min(vk::LOD_CLAMP_NONE))
        .border_color(conv::border_color(desc.border_color))
        .unnormalized_coordinates(false);

    unsafe { device.handle().create_sampler(&create_info, None) }.context("vkCreateSampler")
}

impl RhiSampler for VulkanSampler {
    #[inline]
    fn desc(&self) -> &SamplerDesc {
        &self.desc
    }

    #[inline]
    fn descriptor_index(&self) -> u32 {
        self.slot.index()
    }
}

impl Drop for VulkanSampler {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
        }
    }
}

/// Attachment description only, executed through dynamic rendering.
pub struct VulkanRenderPass {
    desc: RenderPassDesc,
}

impl VulkanRenderPass {
    pub(crate) fn new(desc: RenderPassDesc) -> Self {
        Self { desc }
    }
}

impl RhiRenderPass for VulkanRenderPass {
    #[inline]
    fn desc(&self) -> &RenderPassDesc {
        &self.desc
    }
}

/// Image targets of the views given at creation. The views must outlive the frame buffer.
pub struct VulkanFrameBuffer {
    extent: Extent2D,
    render_targets: SmallVec<[ImageTarget; MAX_RENDER_TARGETS]>,
    depth_stencil: Option<ImageTarget>,
}

impl VulkanFrameBuffer {
    pub(crate) fn new(render_pass: &VulkanRenderPass, desc: &FrameBufferDesc<'_, Vulkan>) -> RhiResult<Self> {
        let pass = render_pass.desc();
        if desc.render_targets.len() != pass.color_attachments.len()
            || desc.depth_stencil.is_some() != pass.depth_attachment.is_some()
        {
            return Err(RhiError::InvalidDescriptor(format!(
                "frame buffer attachments do not match render pass `{}`",
                pass.name
            )));
        }
        let extent = Extent2D::new(desc.width, desc.height);
        if extent.is_empty() {
            return Err(RhiError::InvalidExtent {
                width: desc.width,
                height: desc.height,
            });
        }

        let render_targets = desc
            .render_targets
            .iter()
            .map(|view| {
                if view.view_type() != ResourceViewType::RenderTarget {
                    return Err(RhiError::InvalidDescriptor(format!(
                        "{:?} view bound as render target of `{}`",
                        view.view_type(),
                        pass.name
                    )));
                }
                view.image_target().cloned()
            })
            .collect::<RhiResult<SmallVec<[ImageTarget; MAX_RENDER_TARGETS]>>>()?;

        let depth_stencil = match desc.depth_stencil {
            Some(view) if view.view_type() != ResourceViewType::DepthStencil => {
                return Err(RhiError::InvalidDescriptor(format!(
                    "{:?} view bound as depth stencil of `{}`",
                    view.view_type(),
                    pass.name
                )));
            }
            Some(view) => Some(view.image_target()?.clone()),
            None => None,
        };

        Ok(Self {
            extent,
            render_targets,
            depth_stencil,
        })
    }

    #[inline]
    pub(crate) fn render_targets(&self) -> &[ImageTarget] {
        &self.render_targets
    }

    #[inline]
    pub(crate) fn depth_stencil(&self) -> Option<&ImageTarget> {
        self.depth_stencil.as_ref()
    }
}

impl RhiFrameBuffer for VulkanFrameBuffer {
    #[inline]
    fn extent(&self) -> Extent2D {
        self.extent
    }
}

#[DeviceObject]
pub struct VulkanAccelerationStructure {
    handle: vk::AccelerationStructureKHR,
    buffer: VulkanBuffer,
    loader: ash::khr::acceleration_structure::Device,
    desc: AccelerationStructureDesc,
}

impl VulkanAccelerationStructure {
    pub(crate) fn new(device: &VulkanDevice, desc: &AccelerationStructureDesc) -> RhiResult<Self> {
        let loader = device.acceleration_structure_loader()?.clone();
        let size = u32::try_from(desc.size)
            .map_err(|_| RhiError::InvalidDescriptor(format!("acceleration structure `{}` is too large", desc.name)))?;

        let meta = GpuBufferMetaData {
            name: format!("{}.storage", desc.name),
            count: 1,
            stride: size.max(1),
            usage: ResourceUsage::AccelerationStructure.into(),
            flags: Default::default(),
            initial_state: crate::types::ResourceState::Common,
            format: PixelFormat::Unknown,
        };
        let buffer = VulkanBuffer::new(device, &meta)?;

        let ty = match desc.kind {
            AccelerationStructureKind::TopLevel => vk::AccelerationStructureTypeKHR::TOP_LEVEL,
            AccelerationStructureKind::BottomLevel => vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL,
        };
        let create_info = vk::AccelerationStructureCreateInfoKHR::default()
            .buffer(buffer.handle())
            .offset(0)
            .size(desc.size)
            .ty(ty);
        let handle = unsafe { loader.create_acceleration_structure(&create_info, None) }
            .context("vkCreateAccelerationStructureKHR")?;
        device.set_debug_name(handle, &desc.name);

        Ok(Self {
            handle,
            buffer,
            loader,
            desc: desc.clone(),
            device: device.handle().clone(),
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::AccelerationStructureKHR {
        self.handle
    }

    #[inline]
    pub fn desc(&self) -> &AccelerationStructureDesc {
        &self.desc
    }

    #[inline]
    pub fn storage(&self) -> &VulkanBuffer {
        &self.buffer
    }
}

impl Drop for VulkanAccelerationStructure {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_acceleration_structure(self.handle, None);
        }
    }
}
