//! Logical device, queue family bookkeeping and object factory.

use std::ffi::{c_char, CString};
use std::rc::Rc;
use ash::{vk, Device};
use prism_core::collections::SmallVec;
use crate::adapter::AdapterInfo;
use crate::backend::{DeviceCapabilities, DeviceDesc, ResourceRef, RhiDevice};
use crate::error::{RhiError, RhiResult, ResultExt};
use crate::heap::{DescriptorAllocator, DescriptorHeapDesc};
use crate::layout::ResourceLayoutDesc;
use crate::pipeline::{ComputePipelineDesc, GraphicsPipelineDesc};
use crate::render_pass::{FrameBufferDesc, RenderPassDesc};
use crate::resource::{AccelerationStructureDesc, GpuBufferMetaData, GpuTextureMetaData, ResourceViewDesc, SamplerDesc};
use crate::shader::ShaderTarget;
use crate::swapchain::SwapchainDesc;
use crate::types::{CommandListType, DescriptorHeapType};
use super::command::{VulkanCommandAllocator, VulkanCommandList};
use super::instance::{raytracing_extensions, InstanceShared, PhysicalAdapter};
use super::layout::VulkanResourceLayout;
use super::pipeline::{VulkanComputePipeline, VulkanGraphicsPipeline};
use super::queue::{VulkanCommandQueue, VulkanFence};
use super::resource::{
    VulkanAccelerationStructure, VulkanBuffer, VulkanFrameBuffer, VulkanRenderPass, VulkanResourceView, VulkanSampler,
    VulkanTexture,
};
use super::swapchain::VulkanSwapchain;
use super::Vulkan;

/// Queue family used for each command list type. Families are shared when the adapter has no
/// dedicated compute or transfer family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct QueueFamilies {
    pub(crate) graphics: u32,
    pub(crate) compute: u32,
    pub(crate) copy: u32,
}

impl QueueFamilies {
    #[inline]
    pub(crate) fn family(&self, ty: CommandListType) -> u32 {
        match ty {
            CommandListType::Graphics => self.graphics,
            CommandListType::Compute => self.compute,
            CommandListType::Copy => self.copy,
        }
    }

    pub(crate) fn unique(&self) -> SmallVec<[u32; 3]> {
        let mut families = SmallVec::new();
        for family in [self.graphics, self.compute, self.copy] {
            if !families.contains(&family) {
                families.push(family);
            }
        }
        families
    }
}

/// Features turned on at device creation that object creation depends on.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct EnabledFeatures {
    pub(crate) sampler_anisotropy: bool,
    pub(crate) fill_mode_non_solid: bool,
    pub(crate) depth_clamp: bool,
    pub(crate) buffer_device_address: bool,
}

pub struct VulkanDevice {
    instance: Rc<InstanceShared>,
    physical_device: vk::PhysicalDevice,
    adapter: AdapterInfo,
    capabilities: DeviceCapabilities,
    properties: vk::PhysicalDeviceProperties,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    features: EnabledFeatures,
    queue_families: QueueFamilies,
    device: Device,
    swapchain_loader: Option<ash::khr::swapchain::Device>,
    debug_utils: Option<ash::ext::debug_utils::Device>,
    acceleration_structure: Option<ash::khr::acceleration_structure::Device>,
    heaps: [DescriptorAllocator; 6],
}

impl VulkanDevice {
    pub(crate) fn new(
        instance: Rc<InstanceShared>,
        adapter: &PhysicalAdapter,
        capabilities: DeviceCapabilities,
        desc: &DeviceDesc,
    ) -> RhiResult<Self> {
        let queue_families = adapter.queue_families.ok_or(RhiError::NoSuitableAdapter)?;

        let queue_priority = 1.0f32;
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = queue_families
            .unique()
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(std::slice::from_ref(&queue_priority))
            })
            .collect();

        let mut extensions: Vec<*const c_char> = Vec::new();
        if instance.surface.is_some() {
            extensions.push(ash::khr::swapchain::NAME.as_ptr());
        }
        let use_raytracing = desc.use_raytracing && capabilities.raytracing;
        if use_raytracing {
            extensions.extend(raytracing_extensions().iter().map(|ext| ext.as_ptr()));
        }

        let supported = &adapter.features;
        let features = EnabledFeatures {
            sampler_anisotropy: supported.sampler_anisotropy == vk::TRUE,
            fill_mode_non_solid: supported.fill_mode_non_solid == vk::TRUE,
            depth_clamp: supported.depth_clamp == vk::TRUE,
            buffer_device_address: use_raytracing,
        };

        let core_features = vk::PhysicalDeviceFeatures::default()
            .geometry_shader(capabilities.geometry_shader)
            .tessellation_shader(capabilities.tessellation)
            .sampler_anisotropy(features.sampler_anisotropy)
            .fill_mode_non_solid(features.fill_mode_non_solid)
            .depth_clamp(features.depth_clamp);

        let mut vulkan_12_features = vk::PhysicalDeviceVulkan12Features::default()
            .timeline_semaphore(true)
            .buffer_device_address(features.buffer_device_address);

        let mut vulkan_13_features = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true);

        let mut acceleration_structure_features =
            vk::PhysicalDeviceAccelerationStructureFeaturesKHR::default().acceleration_structure(true);

        let mut create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&core_features)
            .push_next(&mut vulkan_12_features)
            .push_next(&mut vulkan_13_features);
        if use_raytracing {
            create_info = create_info.push_next(&mut acceleration_structure_features);
        }

        let device = unsafe { instance.instance.create_device(adapter.handle, &create_info, None) }
            .context("vkCreateDevice")?;

        let swapchain_loader = instance
            .surface
            .map(|_| ash::khr::swapchain::Device::new(&instance.instance, &device));
        let debug_utils = instance
            .debug_utils_enabled
            .then(|| ash::ext::debug_utils::Device::new(&instance.instance, &device));
        let acceleration_structure =
            use_raytracing.then(|| ash::khr::acceleration_structure::Device::new(&instance.instance, &device));

        let heaps = DescriptorHeapType::ALL
            .map(|heap_type| DescriptorAllocator::new(heap_type, heap_type.capacity(&desc.heap_capacities)));

        log::info!(
            "Vulkan device created on {} (graphics family {}, compute family {}, copy family {})",
            adapter.info.name,
            queue_families.graphics,
            queue_families.compute,
            queue_families.copy
        );

        Ok(Self {
            instance,
            physical_device: adapter.handle,
            adapter: adapter.info.clone(),
            capabilities,
            properties: adapter.properties,
            memory_properties: adapter.memory_properties,
            features,
            queue_families,
            device,
            swapchain_loader,
            debug_utils,
            acceleration_structure,
            heaps,
        })
    }

    /// Get a reference to the logical device.
    #[inline]
    pub fn handle(&self) -> &Device {
        &self.device
    }

    #[inline]
    pub(crate) fn instance(&self) -> &Rc<InstanceShared> {
        &self.instance
    }

    #[inline]
    pub(crate) fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    #[inline]
    pub(crate) fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    #[inline]
    pub(crate) fn features(&self) -> EnabledFeatures {
        self.features
    }

    #[inline]
    pub(crate) fn queue_families(&self) -> QueueFamilies {
        self.queue_families
    }

    pub(crate) fn swapchain_loader(&self) -> RhiResult<&ash::khr::swapchain::Device> {
        self.swapchain_loader
            .as_ref()
            .ok_or(RhiError::Unsupported("presentation without a window"))
    }

    pub(crate) fn acceleration_structure_loader(&self) -> RhiResult<&ash::khr::acceleration_structure::Device> {
        self.acceleration_structure.as_ref().ok_or(RhiError::Unsupported("raytracing"))
    }

    /// Resources are shared between every queue family in use, no ownership transfers needed.
    pub(crate) fn sharing_families(&self) -> SmallVec<[u32; 3]> {
        self.queue_families.unique()
    }

    /// Allocate and bind device memory for `requirements`.
    pub(crate) fn allocate_memory(
        &self,
        requirements: vk::MemoryRequirements,
        preferred: vk::MemoryPropertyFlags,
        fallback: vk::MemoryPropertyFlags,
        device_address: bool,
    ) -> RhiResult<vk::DeviceMemory> {
        let memory_type_index = find_memory_type(&self.memory_properties, requirements.memory_type_bits, preferred)
            .or_else(|| find_memory_type(&self.memory_properties, requirements.memory_type_bits, fallback))
            .ok_or(RhiError::backend("allocating device memory", "no compatible memory type"))?;

        let mut flags_info = vk::MemoryAllocateFlagsInfo::default().flags(vk::MemoryAllocateFlags::DEVICE_ADDRESS);
        let mut alloc_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);
        if device_address {
            alloc_info = alloc_info.push_next(&mut flags_info);
        }

        unsafe { self.device.allocate_memory(&alloc_info, None) }.context("vkAllocateMemory")
    }

    /// Attach a debug name to a native handle. No-op without validation.
    pub(crate) fn set_debug_name<H: vk::Handle>(&self, handle: H, name: &str) {
        let Some(debug_utils) = &self.debug_utils else {
            return;
        };
        let Ok(name) = CString::new(name) else {
            return;
        };
        let info = vk::DebugUtilsObjectNameInfoEXT::default()
            .object_handle(handle)
            .object_name(&name);
        if let Err(e) = unsafe { debug_utils.set_debug_utils_object_name(&info) } {
            log::debug!("Failed to set debug name {:?}: {e}", name);
        }
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                log::error!("vkDeviceWaitIdle failed while destroying the device: {e}");
            }
            self.device.destroy_device(None);
        }
    }
}

impl RhiDevice<Vulkan> for VulkanDevice {
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
        ShaderTarget::Spirv
    }

    #[inline]
    fn descriptor_heap(&self, heap_type: DescriptorHeapType) -> &DescriptorAllocator {
        &self.heaps[heap_type.index()]
    }

    fn create_buffer(&self, meta: &GpuBufferMetaData) -> RhiResult<VulkanBuffer> {
        VulkanBuffer::new(self, meta)
    }

    fn create_texture(&self, meta: &GpuTextureMetaData) -> RhiResult<VulkanTexture> {
        VulkanTexture::new(self, meta)
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> RhiResult<VulkanSampler> {
        let slot = self.heaps[DescriptorHeapType::Sampler.index()].allocate()?;
        VulkanSampler::new(self, desc, slot)
    }

    fn create_resource_view(&self, resource: ResourceRef<'_, Vulkan>, desc: &ResourceViewDesc) -> RhiResult<VulkanResourceView> {
        VulkanResourceView::new(self, resource, desc)
    }

    fn create_command_queue(&self, queue_type: CommandListType) -> RhiResult<VulkanCommandQueue> {
        Ok(VulkanCommandQueue::new(self, queue_type))
    }

    fn create_command_allocator(&self, list_type: CommandListType) -> RhiResult<VulkanCommandAllocator> {
        VulkanCommandAllocator::new(self, list_type)
    }

    fn create_command_list(&self, allocator: &VulkanCommandAllocator) -> RhiResult<VulkanCommandList> {
        VulkanCommandList::new(self, allocator)
    }

    fn create_swapchain(&self, queue: &VulkanCommandQueue, desc: &SwapchainDesc) -> RhiResult<VulkanSwapchain> {
        if queue.queue_family() != self.queue_families.graphics {
            return Err(RhiError::InvalidDescriptor("swapchains present on the graphics queue".to_owned()));
        }
        VulkanSwapchain::new(self, desc)
    }

    fn create_descriptor_heap(&self, desc: &DescriptorHeapDesc) -> RhiResult<DescriptorAllocator> {
        Ok(DescriptorAllocator::new(desc.heap_type, desc.capacity))
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> RhiResult<VulkanRenderPass> {
        desc.validate()?;
        Ok(VulkanRenderPass::new(desc.clone()))
    }

    fn create_frame_buffer(
        &self,
        render_pass: &VulkanRenderPass,
        desc: &FrameBufferDesc<'_, Vulkan>,
    ) -> RhiResult<VulkanFrameBuffer> {
        VulkanFrameBuffer::new(render_pass, desc)
    }

    fn create_resource_layout(&self, desc: &ResourceLayoutDesc) -> RhiResult<VulkanResourceLayout> {
        VulkanResourceLayout::new(self, desc)
    }

    fn create_graphics_pipeline(
        &self,
        layout: &VulkanResourceLayout,
        desc: &GraphicsPipelineDesc<'_>,
    ) -> RhiResult<VulkanGraphicsPipeline> {
        VulkanGraphicsPipeline::new(self, layout, desc)
    }

    fn create_compute_pipeline(
        &self,
        layout: &VulkanResourceLayout,
        desc: &ComputePipelineDesc<'_>,
    ) -> RhiResult<VulkanComputePipeline> {
        VulkanComputePipeline::new(self, layout, desc)
    }

    fn create_fence(&self, initial_value: u64) -> RhiResult<VulkanFence> {
        VulkanFence::new(self, initial_value)
    }

    fn create_acceleration_structure(&self, desc: &AccelerationStructureDesc) -> RhiResult<VulkanAccelerationStructure> {
        self.capabilities.require_raytracing()?;
        VulkanAccelerationStructure::new(self, desc)
    }

    fn wait_idle(&self) -> RhiResult<()> {
        unsafe { self.device.device_wait_idle() }.context("vkDeviceWaitIdle")
    }
}

/// Find a suitable memory type index.
pub(crate) fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..memory_properties.memory_type_count).find(|&i| {
        let memory_type = memory_properties.memory_types[i as usize];
        (type_filter & (1 << i)) != 0 && memory_type.property_flags.contains(properties)
    })
}

pub(crate) mod sealed {
    pub trait Sealed {}
}

/// Crate-only trait for objects that own an `ash::Device` used for destruction and device calls.
pub(crate) trait DeviceObject: sealed::Sealed {
    fn device(&self) -> &Device;
}

/// Objects named after their engine side name in debugging tools.
pub(crate) trait DebuggableObject {
    fn set_debug_name(&self, device: &VulkanDevice);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_type_respects_filter_and_flags() {
        let mut properties = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 3,
            ..Default::default()
        };
        properties.memory_types[0].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        properties.memory_types[1].property_flags =
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        properties.memory_types[2].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL
            | vk::MemoryPropertyFlags::HOST_VISIBLE
            | vk::MemoryPropertyFlags::HOST_COHERENT;

        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        assert_eq!(find_memory_type(&properties, 0b111, host), Some(1));
        assert_eq!(find_memory_type(&properties, 0b100, host), Some(2));
        assert_eq!(find_memory_type(&properties, 0b001, host), None);
    }

    #[test]
    fn shared_families_are_listed_once() {
        let families = QueueFamilies { graphics: 0, compute: 0, copy: 2 };
        assert_eq!(families.unique().as_slice(), &[0, 2]);
        assert_eq!(families.family(CommandListType::Copy), 2);
    }
}
