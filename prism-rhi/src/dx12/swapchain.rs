//! Flip model swapchain.
//!
//! Acquire and present are ordered through the frame fence on the presenting queue: acquiring
//! signals the fence as soon as the queue reaches it, presenting makes the queue wait on the
//! fence before the flip.

use std::ffi::c_void;
use raw_window_handle::RawWindowHandle;
use windows::core::{Interface, HRESULT};
use windows::Win32::Foundation::{BOOL, HWND};
use windows::Win32::Graphics::Direct3D12::ID3D12Resource;
use windows::Win32::Graphics::Dxgi::Common::*;
use windows::Win32::Graphics::Dxgi::*;
use crate::backend::{RhiDevice, RhiSwapchain};
use crate::error::{RhiError, RhiResult, ResultExt};
use crate::flags::ResourceUsage;
use crate::format::{ColorSpace, PixelFormat, PresentMode, SurfaceFormat};
use crate::resource::{GpuTextureMetaData, TextureDimension};
use crate::swapchain::{
    choose_extent, choose_image_count, choose_present_mode, choose_surface_format, SurfaceCapabilities, SwapchainDesc,
};
use crate::types::{Extent2D, ResourceState};
use super::conv;
use super::device::Dx12Device;
use super::queue::{Dx12CommandQueue, Dx12Fence};
use super::resource::Dx12Texture;
use super::DirectX12;

const SDR_CANDIDATES: [SurfaceFormat; 2] = [
    SurfaceFormat::new(PixelFormat::B8G8R8A8Unorm, ColorSpace::SrgbNonLinear),
    SurfaceFormat::new(PixelFormat::R8G8B8A8Unorm, ColorSpace::SrgbNonLinear),
];

const HDR_CANDIDATES: [SurfaceFormat; 2] = [
    SurfaceFormat::new(PixelFormat::R16G16B16A16Float, ColorSpace::ExtendedSrgbLinear),
    SurfaceFormat::new(PixelFormat::R10G10B10A2Unorm, ColorSpace::Hdr10St2084),
];

const CAPABILITIES: SurfaceCapabilities = SurfaceCapabilities {
    min_image_count: 2,
    max_image_count: DXGI_MAX_SWAP_CHAIN_BUFFERS,
    current_extent: Extent2D {
        width: u32::MAX,
        height: u32::MAX,
    },
    min_extent: Extent2D { width: 1, height: 1 },
    max_extent: Extent2D {
        width: 16384,
        height: 16384,
    },
};

const DXGI_MAX_SWAP_CHAIN_BUFFERS: u32 = 16;

fn present_error(result: HRESULT) -> RhiError {
    if result == DXGI_ERROR_DEVICE_REMOVED || result == DXGI_ERROR_DEVICE_RESET {
        RhiError::SurfaceLost
    } else {
        RhiError::backend("IDXGISwapChain::Present", windows::core::Error::from(result))
    }
}

/// Sync interval and present flags for a present mode.
fn present_parameters(mode: PresentMode, vsync_interval: u32) -> (u32, DXGI_PRESENT) {
    match mode {
        PresentMode::Immediate => (0, DXGI_PRESENT_ALLOW_TEARING),
        _ => (vsync_interval.clamp(1, 4), DXGI_PRESENT(0)),
    }
}

fn window_handle(device: &Dx12Device) -> RhiResult<HWND> {
    let window = device
        .window()
        .ok_or(RhiError::Unsupported("presentation without a window"))?;
    match window.window_handle {
        RawWindowHandle::Win32(handle) => Ok(HWND(handle.hwnd.get() as *mut c_void)),
        _ => Err(RhiError::Unsupported("non Win32 window handle")),
    }
}

pub struct Dx12Swapchain {
    swapchain: IDXGISwapChain3,
    desc: SwapchainDesc,
    surface_format: SurfaceFormat,
    present_mode: PresentMode,
    extent: Extent2D,
    flags: DXGI_SWAP_CHAIN_FLAG,
    back_buffers: Vec<Dx12Texture>,
    current_index: u32,
}

impl Dx12Swapchain {
    pub(crate) fn new(device: &Dx12Device, queue: &Dx12CommandQueue, desc: &SwapchainDesc) -> RhiResult<Self> {
        let hwnd = window_handle(device)?;
        let extent = choose_extent(&CAPABILITIES, desc.extent())?;
        let image_count = choose_image_count(&CAPABILITIES, desc.frame_buffer_count);

        let mut present_modes = vec![PresentMode::Fifo];
        if device.tearing_supported() {
            present_modes.push(PresentMode::Immediate);
        }
        let present_mode = choose_present_mode(&present_modes, desc.vsync());
        let flags = if device.tearing_supported() {
            DXGI_SWAP_CHAIN_FLAG_ALLOW_TEARING
        } else {
            DXGI_SWAP_CHAIN_FLAG(0)
        };

        // created with an sdr format first, hdr color spaces can only be queried on a swapchain
        let initial_format = SDR_CANDIDATES[0];
        let swapchain_desc = DXGI_SWAP_CHAIN_DESC1 {
            Width: extent.width,
            Height: extent.height,
            Format: conv::format(initial_format.format),
            Stereo: BOOL::from(false),
            SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
            BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
            BufferCount: image_count,
            Scaling: DXGI_SCALING_STRETCH,
            SwapEffect: DXGI_SWAP_EFFECT_FLIP_DISCARD,
            AlphaMode: DXGI_ALPHA_MODE_UNSPECIFIED,
            Flags: flags.0 as u32,
        };
        let swapchain: IDXGISwapChain1 = unsafe {
            device
                .factory()
                .CreateSwapChainForHwnd(queue.handle(), hwnd, &swapchain_desc, None, None::<&IDXGIOutput>)
        }
        .context("IDXGIFactory::CreateSwapChainForHwnd")?;
        unsafe { device.factory().MakeWindowAssociation(hwnd, DXGI_MWA_NO_ALT_ENTER) }
            .context("IDXGIFactory::MakeWindowAssociation")?;
        let swapchain: IDXGISwapChain3 = swapchain.cast().context("IDXGISwapChain1::cast")?;

        let mut formats = SDR_CANDIDATES.to_vec();
        formats.extend(HDR_CANDIDATES.into_iter().filter(|candidate| {
            unsafe { swapchain.CheckColorSpaceSupport(conv::color_space(candidate.color_space)) }
                .map(|support| support & DXGI_SWAP_CHAIN_COLOR_SPACE_SUPPORT_FLAG_PRESENT.0 as u32 != 0)
                .unwrap_or(false)
        }));
        let surface_format = choose_surface_format(&formats, desc.use_hdr && device.capabilities().hdr)?;

        let mut swapchain = Self {
            swapchain,
            desc: *desc,
            surface_format,
            present_mode,
            extent,
            flags,
            back_buffers: Vec::new(),
            current_index: 0,
        };
        if surface_format != initial_format {
            swapchain.resize_buffers(extent)?;
        } else {
            swapchain.apply_color_space()?;
            swapchain.acquire_back_buffers()?;
        }

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
    pub fn handle(&self) -> &IDXGISwapChain3 {
        &self.swapchain
    }

    fn apply_color_space(&self) -> RhiResult<()> {
        unsafe {
            self.swapchain
                .SetColorSpace1(conv::color_space(self.surface_format.color_space))
        }
        .context("IDXGISwapChain3::SetColorSpace1")
    }

    fn acquire_back_buffers(&mut self) -> RhiResult<()> {
        let count = unsafe { self.swapchain.GetDesc1() }
            .context("IDXGISwapChain1::GetDesc1")?
            .BufferCount;
        self.back_buffers = (0..count)
            .map(|index| {
                let resource: ID3D12Resource =
                    unsafe { self.swapchain.GetBuffer(index) }.context("IDXGISwapChain::GetBuffer")?;
                let meta = GpuTextureMetaData {
                    name: format!("back buffer {index}"),
                    width: self.extent.width,
                    height: self.extent.height,
                    depth_or_array_size: 1,
                    mip_levels: 1,
                    sample_count: 1,
                    format: self.surface_format.format,
                    dimension: TextureDimension::Texture2D,
                    usage: ResourceUsage::RenderTarget.into(),
                    initial_state: ResourceState::Present,
                    clear_value: None,
                };
                Ok(Dx12Texture::from_swapchain(resource, meta))
            })
            .collect::<RhiResult<Vec<_>>>()?;
        self.current_index = unsafe { self.swapchain.GetCurrentBackBufferIndex() };
        Ok(())
    }

    /// Release the back buffers and rebuild them at `extent` in the current surface format.
    fn resize_buffers(&mut self, extent: Extent2D) -> RhiResult<()> {
        self.back_buffers.clear();
        let image_count = choose_image_count(&CAPABILITIES, self.desc.frame_buffer_count);
        unsafe {
            self.swapchain.ResizeBuffers(
                image_count,
                extent.width,
                extent.height,
                conv::format(self.surface_format.format),
                self.flags,
            )
        }
        .context("IDXGISwapChain::ResizeBuffers")?;
        self.extent = extent;
        self.apply_color_space()?;
        self.acquire_back_buffers()
    }
}

impl RhiSwapchain<DirectX12> for Dx12Swapchain {
    #[profiling::function]
    fn prepare_next_image(&mut self, queue: &Dx12CommandQueue, fence: &Dx12Fence, signal_value: u64) -> RhiResult<u32> {
        self.current_index = unsafe { self.swapchain.GetCurrentBackBufferIndex() };
        unsafe { queue.handle().Signal(fence.handle(), signal_value) }.context("ID3D12CommandQueue::Signal")?;
        Ok(self.current_index)
    }

    #[profiling::function]
    fn present(&mut self, queue: &Dx12CommandQueue, fence: &Dx12Fence, wait_value: u64) -> RhiResult<()> {
        unsafe { queue.handle().Wait(fence.handle(), wait_value) }.context("ID3D12CommandQueue::Wait")?;
        let (sync_interval, flags) = present_parameters(self.present_mode, self.desc.vsync_interval);
        let result = unsafe { self.swapchain.Present(sync_interval, flags) };
        if result == DXGI_STATUS_OCCLUDED {
            log::debug!("Swapchain is occluded");
            return Ok(());
        }
        result.ok().map_err(|e| present_error(e.code()))
    }

    fn resize(&mut self, width: u32, height: u32) -> RhiResult<bool> {
        let requested = Extent2D::new(width, height);
        if requested.is_empty() {
            return Err(RhiError::InvalidExtent { width, height });
        }
        if requested == self.extent {
            return Ok(false);
        }

        let extent = choose_extent(&CAPABILITIES, requested)?;
        self.resize_buffers(extent)?;
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
    fn back_buffer(&self, index: u32) -> &Dx12Texture {
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

    #[test]
    fn tearing_only_without_vsync() {
        assert_eq!(present_parameters(PresentMode::Fifo, 0), (1, DXGI_PRESENT(0)));
        assert_eq!(present_parameters(PresentMode::Fifo, 9), (4, DXGI_PRESENT(0)));
        assert_eq!(present_parameters(PresentMode::Immediate, 0), (0, DXGI_PRESENT_ALLOW_TEARING));
    }

    #[test]
    fn removed_device_loses_the_surface() {
        assert!(matches!(present_error(DXGI_ERROR_DEVICE_REMOVED), RhiError::SurfaceLost));
        assert!(matches!(present_error(DXGI_ERROR_INVALID_CALL), RhiError::Backend { .. }));
    }

    #[test]
    fn sdr_candidates_come_first() {
        let chosen = choose_surface_format(&SDR_CANDIDATES, false).unwrap();
        assert_eq!(chosen.format, PixelFormat::B8G8R8A8Unorm);

        let mut all = SDR_CANDIDATES.to_vec();
        all.extend(HDR_CANDIDATES);
        assert_eq!(choose_surface_format(&all, true).unwrap().format, PixelFormat::R16G16B16A16Float);
    }
}
