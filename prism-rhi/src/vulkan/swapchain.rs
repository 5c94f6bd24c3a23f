//! Swapchain with timeline fence driven acquire and present.
//!
//! The presentation engine only speaks binary semaphores, the RHI only timeline fences. Both
//! directions are bridged with an empty submit on the presenting queue:
//!
//! * acquire signals `image_available[slot]`, a submit waits on it and signals the frame fence
//! * present submits a wait on the frame fence that signals `render_finished[image]`, which
//!   `vkQueuePresentKHR` waits on
//!
//! `render_finished` is per image so a semaphore is never re-signaled before the present that
//! waits on it was consumed.

use std::rc::Rc;
use ash::vk;
use prism_rhi_derive::DeviceObject;
use crate::backend::{RhiDevice, RhiSwapchain};
use crate::error::{RhiError, RhiResult, ResultExt};
use crate::flags::ResourceUsage;
use crate::format::{PresentMode, SurfaceFormat};
use crate::resource::{GpuTextureMetaData, TextureDimension};
use crate::swapchain::{
    choose_extent, choose_image_count, choose_present_mode, choose_surface_format, PresentStatus, SurfaceCapabilities,
    SwapchainDesc,
};
use crate::types::{Extent2D, ResourceState};
use super::conv;
use super::device::VulkanDevice;
use super::instance::InstanceShared;
use super::queue::{VulkanCommandQueue, VulkanFence};
use super::resource::VulkanTexture;
use super::Vulkan;

fn surface_error(error: vk::Result, operation: &'static str) -> RhiError {
    match error {
        vk::Result::ERROR_OUT_OF_DATE_KHR => RhiError::SurfaceOutOfDate,
        vk::Result::ERROR_SURFACE_LOST_KHR => RhiError::SurfaceLost,
        e => RhiError::backend(operation, e),
    }
}

fn present_result(result: Result<bool, vk::Result>, operation: &'static str) -> RhiResult<PresentStatus> {
    match result {
        Ok(false) => Ok(PresentStatus::Optimal),
        Ok(true) => {
            log::debug!("Swapchain is suboptimal on {operation}, keep going until the next resize");
            Ok(PresentStatus::Suboptimal)
        }
        Err(e) => Err(surface_error(e, operation)),
    }
}

#[DeviceObject]
pub struct VulkanSwapchain {
    instance: Rc<InstanceShared>,
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    loader: ash::khr::swapchain::Device,
    desc: SwapchainDesc,
    surface_format: SurfaceFormat,
    present_mode: PresentMode,
    extent: Extent2D,
    swapchain: vk::SwapchainKHR,
    back_buffers: Vec<VulkanTexture>,
    image_available: Vec<vk::Semaphore>,
    render_finished: Vec<vk::Semaphore>,
    acquire_slot: usize,
    current_index: u32,
}

impl VulkanSwapchain {
    pub(crate) fn new(device: &VulkanDevice, desc: &SwapchainDesc) -> RhiResult<Self> {
        let instance = device.instance().clone();
        let surface = instance
            .surface
            .ok_or(RhiError::Unsupported("presentation without a window"))?;
        let physical_device = device.physical_device();

        let formats: Vec<SurfaceFormat> = unsafe {
            instance
                .surface_loader
                .get_physical_device_surface_formats(physical_device, surface)
        }
        .context("vkGetPhysicalDeviceSurfaceFormatsKHR")?
        .iter()
        .filter_map(|f| {
            let color_space = conv::from_vk_color_space(f.color_space)?;
            Some(SurfaceFormat::new(conv::pixel_format(f.format), color_space))
        })
        .collect();
        let surface_format = choose_surface_format(&formats, desc.use_hdr && device.capabilities().hdr)?;

        let present_modes: Vec<PresentMode> = unsafe {
            instance
                .surface_loader
                .get_physical_device_surface_present_modes(physical_device, surface)
        }
        .context("vkGetPhysicalDeviceSurfacePresentModesKHR")?
        .into_iter()
        .filter_map(conv::from_vk_present_mode)
        .collect();
        let present_mode = choose_present_mode(&present_modes, desc.vsync());

        let mut swapchain = Self {
            instance,
            physical_device,
            surface,
            loader: device.swapchain_loader()?.clone(),
            desc: *desc,
            surface_format,
            present_mode,
            extent: Extent2D::default(),
            swapchain: vk::SwapchainKHR::null(),
            back_buffers: Vec::new(),
            image_available: Vec::new(),
            render_finished: Vec::new(),
            acquire_slot: 0,
            current_index: 0,
            device: device.handle().clone(),
        };
        swapchain.create_or_recreate(desc.extent())?;

        log::info!(
            "Swapchain created: {}x{} {:?} {:?} {:?}, {} images",
            swapchain.extent.width,
            swapchain.extent.height,
            swapchain.surface_format.format,
            swapchain.surface_format.color_space,
            swapchain.present_mode,
            swapchain.back_buffers.len()
        );
        Ok(swapchain)
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    fn surface_capabilities(&self) -> RhiResult<(vk::SurfaceCapabilitiesKHR, SurfaceCapabilities)> {
        let raw = unsafe {
            self.instance
                .surface_loader
                .get_physical_device_surface_capabilities(self.physical_device, self.surface)
        }
        .context("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?;
        let capabilities = SurfaceCapabilities {
            min_image_count: raw.min_image_count,
            max_image_count: raw.max_image_count,
            current_extent: Extent2D::new(raw.current_extent.width, raw.current_extent.height),
            min_extent: Extent2D::new(raw.min_image_extent.width, raw.min_image_extent.height),
            max_extent: Extent2D::new(raw.max_image_extent.width, raw.max_image_extent.height),
        };
        Ok((raw, capabilities))
    }

    /// Build the swapchain for `requested`, retiring the current one if any.
    fn create_or_recreate(&mut self, requested: Extent2D) -> RhiResult<()> {
        let (raw, capabilities) = self.surface_capabilities()?;
        let extent = choose_extent(&capabilities, requested)?;
        let image_count = choose_image_count(&capabilities, self.desc.frame_buffer_count);

        let old_swapchain = self.swapchain;
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(image_count)
            .image_format(conv::format(self.surface_format.format))
            .image_color_space(conv::color_space(self.surface_format.color_space))
            .image_extent(vk::Extent2D {
                width: extent.width,
                height: extent.height,
            })
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(raw.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(conv::present_mode(self.present_mode))
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe { self.loader.create_swapchain(&create_info, None) }.context("vkCreateSwapchainKHR")?;

        self.destroy_sync_objects();
        self.back_buffers.clear();
        if old_swapchain != vk::SwapchainKHR::null() {
            unsafe { self.loader.destroy_swapchain(old_swapchain, None) };
        }
        self.swapchain = swapchain;

        let images = unsafe { self.loader.get_swapchain_images(swapchain) }.context("vkGetSwapchainImagesKHR")?;
        self.back_buffers = images
            .iter()
            .enumerate()
            .map(|(index, &image)| {
                let meta = GpuTextureMetaData {
                    name: format!("back buffer {index}"),
                    width: extent.width,
                    height: extent.height,
                    depth_or_array_size: 1,
                    mip_levels: 1,
                    sample_count: 1,
                    format: self.surface_format.format,
                    dimension: TextureDimension::Texture2D,
                    usage: ResourceUsage::RenderTarget.into(),
                    initial_state: ResourceState::Present,
                    clear_value: None,
                };
                VulkanTexture::from_swapchain_image(&self.device, image, meta)
            })
            .collect();

        for _ in 0..images.len() {
            let semaphore_info = vk::SemaphoreCreateInfo::default();
            let available = unsafe { self.device.create_semaphore(&semaphore_info, None) }.context("vkCreateSemaphore")?;
            self.image_available.push(available);
            let finished = unsafe { self.device.create_semaphore(&semaphore_info, None) }.context("vkCreateSemaphore")?;
            self.render_finished.push(finished);
        }

        self.extent = extent;
        self.acquire_slot = 0;
        self.current_index = 0;
        Ok(())
    }

    fn destroy_sync_objects(&mut self) {
        unsafe {
            for semaphore in self.image_available.drain(..).chain(self.render_finished.drain(..)) {
                self.device.destroy_semaphore(semaphore, None);
            }
        }
    }
}

impl RhiSwapchain<Vulkan> for VulkanSwapchain {
    #[profiling::function]
    fn prepare_next_image(&mut self, queue: &VulkanCommandQueue, fence: &VulkanFence, signal_value: u64) -> RhiResult<u32> {
        let available = self.image_available[self.acquire_slot];
        let acquired = unsafe {
            self.loader
                .acquire_next_image(self.swapchain, u64::MAX, available, vk::Fence::null())
        };
        let (index, suboptimal) = acquired.map_err(|e| surface_error(e, "vkAcquireNextImageKHR"))?;
        present_result(Ok(suboptimal), "vkAcquireNextImageKHR")?;

        let wait = vk::SemaphoreSubmitInfo::default()
            .semaphore(available)
            .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS);
        let signal = vk::SemaphoreSubmitInfo::default()
            .semaphore(fence.handle())
            .value(signal_value)
            .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS);
        queue.submit_semaphores(&[wait], &[signal])?;

        self.acquire_slot = (self.acquire_slot + 1) % self.image_available.len();
        self.current_index = index;
        Ok(index)
    }

    #[profiling::function]
    fn present(&mut self, queue: &VulkanCommandQueue, fence: &VulkanFence, wait_value: u64) -> RhiResult<()> {
        let finished = self.render_finished[self.current_index as usize];
        let wait = vk::SemaphoreSubmitInfo::default()
            .semaphore(fence.handle())
            .value(wait_value)
            .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS);
        let signal = vk::SemaphoreSubmitInfo::default()
            .semaphore(finished)
            .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS);
        queue.submit_semaphores(&[wait], &[signal])?;

        let swapchains = [self.swapchain];
        let indices = [self.current_index];
        let waits = [finished];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&waits)
            .swapchains(&swapchains)
            .image_indices(&indices);
        let result = unsafe { self.loader.queue_present(queue.handle(), &present_info) };
        present_result(result, "vkQueuePresentKHR").map(|_| ())
    }

    fn resize(&mut self, width: u32, height: u32) -> RhiResult<bool> {
        let requested = Extent2D::new(width, height);
        if requested.is_empty() {
            return Err(RhiError::InvalidExtent { width, height });
        }
        if requested == self.extent {
            return Ok(false);
        }

        unsafe { self.device.device_wait_idle() }.context("vkDeviceWaitIdle")?;
        self.create_or_recreate(requested)?;
        log::info!("Swapchain resized to {}x{}", self.extent.width, self.extent.height);
        Ok(true)
    }

    #[inline]
    fn current_buffer_index(&self) -> u32 {
        self.current_index
    }

    #[inline]
    fn buffer_count(&self) -> u32 {
        self.back_buffers.len() as u32
    }

    #[inline]
    fn back_buffer(&self, index: u32) -> &VulkanTexture {
        &self.back_buffers[index as usize]
    }

    #[inline]
    fn surface_format(&self) -> SurfaceFormat {
        self.surface_format
    }

    #[inline]
    fn present_mode(&self) -> PresentMode {
        self.present_mode
    }

    #[inline]
    fn extent(&self) -> Extent2D {
        self.extent
    }
}

impl Drop for VulkanSwapchain {
    fn drop(&mut self) {
        if let Err(e) = unsafe { self.device.device_wait_idle() } {
            log::error!("vkDeviceWaitIdle failed while destroying the swapchain: {e}");
        }
        self.back_buffers.clear();
        self.destroy_sync_objects();
        unsafe {
            self.loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_date_is_fatal_suboptimal_is_not() {
        assert_eq!(present_result(Ok(false), "present").unwrap(), PresentStatus::Optimal);
        assert_eq!(present_result(Ok(true), "present").unwrap(), PresentStatus::Suboptimal);
        assert!(matches!(
            present_result(Err(vk::Result::ERROR_OUT_OF_DATE_KHR), "present"),
            Err(RhiError::SurfaceOutOfDate)
        ));
        assert!(matches!(
            present_result(Err(vk::Result::ERROR_SURFACE_LOST_KHR), "present"),
            Err(RhiError::SurfaceLost)
        ));
        assert!(matches!(
            present_result(Err(vk::Result::ERROR_DEVICE_LOST), "present"),
            Err(RhiError::Backend { .. })
        ));
    }
}
