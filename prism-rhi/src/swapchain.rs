//! Swapchain negotiation policies shared by every backend.

use crate::error::{RhiError, RhiResult};
use crate::format::{ColorSpace, PixelFormat, PresentMode, SurfaceFormat};
use crate::types::Extent2D;

/// Formats tried in order when HDR output is requested and supported.
pub const HDR_FORMATS: [PixelFormat; 3] = [
    PixelFormat::R16G16B16A16Float,
    PixelFormat::R10G10B10A2Unorm,
    PixelFormat::R32G32B32A32Float,
];

pub const HDR_COLOR_SPACES: [ColorSpace; 4] = [
    ColorSpace::ExtendedSrgbLinear,
    ColorSpace::Hdr10St2084,
    ColorSpace::Hdr10Hlg,
    ColorSpace::DolbyVision,
];

pub const SDR_FORMATS: [PixelFormat; 2] = [PixelFormat::B8G8R8A8Unorm, PixelFormat::B8G8R8A8Srgb];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainDesc {
    pub width: u32,
    pub height: u32,
    pub frame_buffer_count: u32,
    /// 0 disables vsync.
    pub vsync_interval: u32,
    pub use_hdr: bool,
}

impl SwapchainDesc {
    #[inline]
    pub fn extent(&self) -> Extent2D {
        Extent2D::new(self.width, self.height)
    }

    #[inline]
    pub fn vsync(&self) -> bool {
        self.vsync_interval > 0
    }
}

/// What a presentation surface supports, queried at swapchain setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceCapabilities {
    pub min_image_count: u32,
    /// 0 means unbounded.
    pub max_image_count: u32,
    /// `u32::MAX` in width means the swapchain decides the extent.
    pub current_extent: Extent2D,
    pub min_extent: Extent2D,
    pub max_extent: Extent2D,
}

/// Result of a successful acquire or present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    Optimal,
    /// The surface no longer matches the swapchain exactly. Tolerated until the next resize.
    Suboptimal,
}

/// Pick the swapchain format. `hdr` is true only when HDR was requested and the device
/// supports it. Falls back to the first reported format when nothing preferred matches.
pub fn choose_surface_format(formats: &[SurfaceFormat], hdr: bool) -> RhiResult<SurfaceFormat> {
    let first = *formats
        .first()
        .ok_or(RhiError::Unsupported("presentation surface without formats"))?;

    let preferred = if hdr {
        HDR_FORMATS.iter().find_map(|&format| {
            formats
                .iter()
                .find(|f| f.format == format && HDR_COLOR_SPACES.contains(&f.color_space))
        })
    } else {
        SDR_FORMATS.iter().find_map(|&format| {
            formats
                .iter()
                .find(|f| f.format == format && f.color_space == ColorSpace::SrgbNonLinear)
        })
    };

    Ok(preferred.copied().unwrap_or(first))
}

/// Vsync off prefers tearing immediate mode, vsync on prefers mailbox. FIFO is always there.
pub fn choose_present_mode(modes: &[PresentMode], vsync: bool) -> PresentMode {
    if !vsync && modes.contains(&PresentMode::Immediate) {
        PresentMode::Immediate
    } else if modes.contains(&PresentMode::Mailbox) {
        PresentMode::Mailbox
    } else {
        PresentMode::Fifo
    }
}

pub fn choose_extent(capabilities: &SurfaceCapabilities, requested: Extent2D) -> RhiResult<Extent2D> {
    if requested.is_empty() {
        return Err(RhiError::InvalidExtent {
            width: requested.width,
            height: requested.height,
        });
    }

    if capabilities.current_extent.width != u32::MAX {
        let current = capabilities.current_extent;
        if current.is_empty() {
            return Err(RhiError::InvalidExtent {
                width: current.width,
                height: current.height,
            });
        }
        return Ok(current);
    }

    Ok(Extent2D {
        width: requested
            .width
            .clamp(capabilities.min_extent.width, capabilities.max_extent.width),
        height: requested
            .height
            .clamp(capabilities.min_extent.height, capabilities.max_extent.height),
    })
}

pub fn choose_image_count(capabilities: &SurfaceCapabilities, desired: u32) -> u32 {
    let mut image_count = desired.max(capabilities.min_image_count);
    if capabilities.max_image_count > 0 {
        image_count = image_count.min(capabilities.max_image_count);
    }
    image_count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(current: Extent2D) -> SurfaceCapabilities {
        SurfaceCapabilities {
            min_image_count: 2,
            max_image_count: 8,
            current_extent: current,
            min_extent: Extent2D::new(1, 1),
            max_extent: Extent2D::new(4096, 4096),
        }
    }

    #[test]
    fn hdr_request_falls_back_to_first_reported_format() {
        let formats = [
            SurfaceFormat::new(PixelFormat::R8G8B8A8Unorm, ColorSpace::SrgbNonLinear),
            SurfaceFormat::new(PixelFormat::R8G8B8A8Srgb, ColorSpace::SrgbNonLinear),
        ];
        let chosen = choose_surface_format(&formats, true).unwrap();
        assert_eq!(chosen.format, PixelFormat::R8G8B8A8Unorm);
        assert_eq!(chosen.color_space, ColorSpace::SrgbNonLinear);
    }

    #[test]
    fn hdr_prefers_list_order_over_report_order() {
        let formats = [
            SurfaceFormat::new(PixelFormat::B8G8R8A8Unorm, ColorSpace::SrgbNonLinear),
            SurfaceFormat::new(PixelFormat::R10G10B10A2Unorm, ColorSpace::Hdr10St2084),
            SurfaceFormat::new(PixelFormat::R16G16B16A16Float, ColorSpace::ExtendedSrgbLinear),
        ];
        let chosen = choose_surface_format(&formats, true).unwrap();
        assert_eq!(chosen.format, PixelFormat::R16G16B16A16Float);

        let chosen = choose_surface_format(&formats, false).unwrap();
        assert_eq!(chosen.format, PixelFormat::B8G8R8A8Unorm);
    }

    #[test]
    fn hdr_format_needs_hdr_color_space() {
        let formats = [
            SurfaceFormat::new(PixelFormat::B8G8R8A8Srgb, ColorSpace::SrgbNonLinear),
            SurfaceFormat::new(PixelFormat::R16G16B16A16Float, ColorSpace::SrgbNonLinear),
        ];
        let chosen = choose_surface_format(&formats, true).unwrap();
        assert_eq!(chosen.format, PixelFormat::B8G8R8A8Srgb);
    }

    #[test]
    fn empty_surface_format_list_is_an_error() {
        assert!(choose_surface_format(&[], false).is_err());
    }

    #[test]
    fn vsync_without_mailbox_uses_fifo() {
        assert_eq!(choose_present_mode(&[PresentMode::Fifo], true), PresentMode::Fifo);
        assert_eq!(
            choose_present_mode(&[PresentMode::Fifo, PresentMode::Mailbox], true),
            PresentMode::Mailbox
        );
        assert_eq!(
            choose_present_mode(&[PresentMode::Fifo, PresentMode::Immediate], true),
            PresentMode::Fifo
        );
    }

    #[test]
    fn no_vsync_prefers_immediate() {
        let all = [PresentMode::Fifo, PresentMode::Mailbox, PresentMode::Immediate];
        assert_eq!(choose_present_mode(&all, false), PresentMode::Immediate);
        assert_eq!(choose_present_mode(&[PresentMode::Fifo], false), PresentMode::Fifo);
    }

    #[test]
    fn extent_rejects_zero() {
        let free = caps(Extent2D::new(u32::MAX, u32::MAX));
        assert!(matches!(
            choose_extent(&free, Extent2D::new(0, 720)),
            Err(RhiError::InvalidExtent { width: 0, height: 720 })
        ));
    }

    #[test]
    fn extent_follows_surface_or_clamps() {
        let fixed = caps(Extent2D::new(800, 600));
        assert_eq!(choose_extent(&fixed, Extent2D::new(1024, 768)).unwrap(), Extent2D::new(800, 600));

        let free = caps(Extent2D::new(u32::MAX, u32::MAX));
        assert_eq!(choose_extent(&free, Extent2D::new(1024, 768)).unwrap(), Extent2D::new(1024, 768));
        assert_eq!(choose_extent(&free, Extent2D::new(9000, 10)).unwrap(), Extent2D::new(4096, 10));
    }

    #[test]
    fn image_count_is_clamped() {
        let c = caps(Extent2D::new(1, 1));
        assert_eq!(choose_image_count(&c, 3), 3);
        assert_eq!(choose_image_count(&c, 1), 2);
        assert_eq!(choose_image_count(&c, 12), 8);
    }
}
