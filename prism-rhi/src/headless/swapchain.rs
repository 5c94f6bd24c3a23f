use std::cell::Cell;
use crate::backend::{RhiCommandQueue, RhiSwapchain};
use crate::error::{RhiError, RhiResult};
use crate::flags::ResourceUsage;
use crate::format::{PresentMode, SurfaceFormat};
use crate::resource::{GpuTextureMetaData, TextureDimension};
use crate::swapchain::{
    choose_extent, choose_image_count, choose_present_mode, choose_surface_format, PresentStatus, SwapchainDesc,
};
use crate::types::{Extent2D, ResourceState};
use super::device::SimulatedSurface;
use super::queue::{HeadlessCommandQueue, HeadlessFence};
use super::resource::HeadlessTexture;
use super::{next_object_id, Headless, ObjectId};

/// Outcome the simulated surface reports for the next acquire or present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimulatedStatus {
    #[default]
    Optimal,
    Suboptimal,
    OutOfDate,
    SurfaceLost,
}

impl SimulatedStatus {
    fn into_result(self, operation: &str) -> RhiResult<PresentStatus> {
        match self {
            SimulatedStatus::Optimal => Ok(PresentStatus::Optimal),
            SimulatedStatus::Suboptimal => {
                log::debug!("Swapchain is suboptimal on {operation}, keep going until the next resize");
                Ok(PresentStatus::Suboptimal)
            }
            SimulatedStatus::OutOfDate => Err(RhiError::SurfaceOutOfDate),
            SimulatedStatus::SurfaceLost => Err(RhiError::SurfaceLost),
        }
    }
}

pub struct HeadlessSwapchain {
    desc: SwapchainDesc,
    surface: SimulatedSurface,
    surface_format: SurfaceFormat,
    present_mode: PresentMode,
    extent: Extent2D,
    back_buffers: Vec<HeadlessTexture>,
    /// Identity of the acquire/present synchronization objects, renewed on every recreation.
    sync_objects: ObjectId,
    generation: u64,
    current_index: u32,
    next_index: u32,
    next_acquire_status: Cell<SimulatedStatus>,
    next_present_status: Cell<SimulatedStatus>,
    presented: Vec<u32>,
}

impl HeadlessSwapchain {
    pub(crate) fn new(surface: SimulatedSurface, desc: &SwapchainDesc, hdr_supported: bool) -> RhiResult<Self> {
        let surface_format = choose_surface_format(&surface.formats, desc.use_hdr && hdr_supported)?;
        let present_mode = choose_present_mode(&surface.present_modes, desc.vsync());

        let mut swapchain = Self {
            desc: *desc,
            surface,
            surface_format,
            present_mode,
            extent: Extent2D::default(),
            back_buffers: Vec::new(),
            sync_objects: 0,
            generation: 0,
            current_index: 0,
            next_index: 0,
            next_acquire_status: Cell::new(SimulatedStatus::Optimal),
            next_present_status: Cell::new(SimulatedStatus::Optimal),
            presented: Vec::new(),
        };
        swapchain.create_back_buffers(desc.extent())?;

        log::info!(
            "Headless swapchain created: {}x{} {:?} {:?}, {} images",
            swapchain.extent.width,
            swapchain.extent.height,
            swapchain.surface_format.format,
            swapchain.present_mode,
            swapchain.back_buffers.len()
        );
        Ok(swapchain)
    }

    fn create_back_buffers(&mut self, requested: Extent2D) -> RhiResult<()> {
        let extent = choose_extent(&self.surface.capabilities, requested)?;
        let image_count = choose_image_count(&self.surface.capabilities, self.desc.frame_buffer_count);

        self.back_buffers = (0..image_count)
            .map(|index| {
                HeadlessTexture::new(GpuTextureMetaData {
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
                })
            })
            .collect();
        self.extent = extent;
        self.sync_objects = next_object_id();
        self.generation += 1;
        self.current_index = 0;
        self.next_index = 0;
        Ok(())
    }

    /// Make the next acquire report `status` once.
    pub fn force_next_acquire(&self, status: SimulatedStatus) {
        self.next_acquire_status.set(status);
    }

    /// Make the next present report `status` once.
    pub fn force_next_present(&self, status: SimulatedStatus) {
        self.next_present_status.set(status);
    }

    /// Bumped every time the back buffers are recreated.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub fn sync_objects(&self) -> ObjectId {
        self.sync_objects
    }

    /// Back buffer indices in presentation order.
    #[inline]
    pub fn presented(&self) -> &[u32] {
        &self.presented
    }
}

impl RhiSwapchain<Headless> for HeadlessSwapchain {
    fn prepare_next_image(&mut self, queue: &HeadlessCommandQueue, fence: &HeadlessFence, signal_value: u64) -> RhiResult<u32> {
        self.next_acquire_status.take().into_result("acquire")?;

        self.current_index = self.next_index;
        self.next_index = (self.next_index + 1) % self.back_buffers.len() as u32;

        queue.signal(fence, signal_value)?;
        Ok(self.current_index)
    }

    fn present(&mut self, queue: &HeadlessCommandQueue, fence: &HeadlessFence, wait_value: u64) -> RhiResult<()> {
        queue.wait(fence, wait_value)?;
        self.next_present_status.take().into_result("present")?;
        self.presented.push(self.current_index);
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> RhiResult<bool> {
        let requested = Extent2D::new(width, height);
        if requested.is_empty() {
            return Err(RhiError::InvalidExtent { width, height });
        }
        if requested == self.extent {
            return Ok(false);
        }
        self.create_back_buffers(requested)?;
        log::info!("Headless swapchain resized to {}x{}", self.extent.width, self.extent.height);
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
    fn back_buffer(&self, index: u32) -> &HeadlessTexture {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{RhiFence, RhiTexture};
    use crate::types::CommandListType;

    fn swapchain(count: u32) -> HeadlessSwapchain {
        let desc = SwapchainDesc {
            width: 320,
            height: 240,
            frame_buffer_count: count,
            vsync_interval: 1,
            use_hdr: false,
        };
        HeadlessSwapchain::new(SimulatedSurface::default(), &desc, false).unwrap()
    }

    #[test]
    fn images_are_acquired_round_robin() {
        let mut swapchain = swapchain(3);
        let queue = HeadlessCommandQueue::new(CommandListType::Graphics);
        let fence = HeadlessFence::new(0);

        let indices: Vec<_> = (1..=5)
            .map(|value| swapchain.prepare_next_image(&queue, &fence, value).unwrap())
            .collect();
        assert_eq!(indices, [0, 1, 2, 0, 1]);
        assert_eq!(fence.completed_value(), 5);
    }

    #[test]
    fn resize_to_same_extent_keeps_everything() {
        let mut swapchain = swapchain(2);
        let (generation, sync) = (swapchain.generation(), swapchain.sync_objects());
        assert!(!swapchain.resize(320, 240).unwrap());
        assert_eq!(swapchain.generation(), generation);
        assert_eq!(swapchain.sync_objects(), sync);

        assert!(swapchain.resize(640, 480).unwrap());
        assert_ne!(swapchain.sync_objects(), sync);
        assert_eq!(swapchain.extent(), Extent2D::new(640, 480));
        assert_eq!(swapchain.back_buffer(1).meta().width, 640);
    }

    #[test]
    fn out_of_date_is_an_error_suboptimal_is_not() {
        let mut swapchain = swapchain(2);
        let queue = HeadlessCommandQueue::new(CommandListType::Graphics);
        let fence = HeadlessFence::new(0);

        swapchain.force_next_acquire(SimulatedStatus::Suboptimal);
        swapchain.prepare_next_image(&queue, &fence, 1).unwrap();
        swapchain.present(&queue, &fence, 1).unwrap();

        swapchain.force_next_present(SimulatedStatus::OutOfDate);
        swapchain.prepare_next_image(&queue, &fence, 2).unwrap();
        assert!(matches!(swapchain.present(&queue, &fence, 2), Err(RhiError::SurfaceOutOfDate)));
        assert_eq!(swapchain.presented(), [0]);
    }
}
