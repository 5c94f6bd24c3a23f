//! Backend agnostic pixel formats and surface color spaces.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    #[default]
    Unknown,
    R8Unorm,
    R8G8B8A8Unorm,
    R8G8B8A8Srgb,
    B8G8R8A8Unorm,
    B8G8R8A8Srgb,
    /// 10 bit color with 2 bit alpha. `A2B10G10R10_UNORM_PACK32` on Vulkan.
    R10G10B10A2Unorm,
    R16Float,
    R16G16Float,
    R16G16B16A16Float,
    R32Float,
    R32G32Float,
    R32G32B32Float,
    R32G32B32A32Float,
    R32Uint,
    R32G32Uint,
    R32G32B32Uint,
    R32G32B32A32Uint,
    R32Sint,
    R32G32Sint,
    R32G32B32Sint,
    R32G32B32A32Sint,
    D16Unorm,
    D32Float,
    D24UnormS8Uint,
    D32FloatS8Uint,
}

impl PixelFormat {
    pub fn is_depth(self) -> bool {
        matches!(
            self,
            PixelFormat::D16Unorm
                | PixelFormat::D32Float
                | PixelFormat::D24UnormS8Uint
                | PixelFormat::D32FloatS8Uint
        )
    }

    pub fn has_stencil(self) -> bool {
        matches!(self, PixelFormat::D24UnormS8Uint | PixelFormat::D32FloatS8Uint)
    }

    pub fn is_srgb(self) -> bool {
        matches!(self, PixelFormat::R8G8B8A8Srgb | PixelFormat::B8G8R8A8Srgb)
    }

    /// Size of one texel or vertex element in bytes.
    pub fn byte_size(self) -> u32 {
        match self {
            PixelFormat::Unknown => 0,
            PixelFormat::R8Unorm => 1,
            PixelFormat::R16Float | PixelFormat::D16Unorm => 2,
            PixelFormat::R8G8B8A8Unorm
            | PixelFormat::R8G8B8A8Srgb
            | PixelFormat::B8G8R8A8Unorm
            | PixelFormat::B8G8R8A8Srgb
            | PixelFormat::R10G10B10A2Unorm
            | PixelFormat::R16G16Float
            | PixelFormat::R32Float
            | PixelFormat::R32Uint
            | PixelFormat::R32Sint
            | PixelFormat::D32Float
            | PixelFormat::D24UnormS8Uint => 4,
            PixelFormat::R16G16B16A16Float
            | PixelFormat::R32G32Float
            | PixelFormat::R32G32Uint
            | PixelFormat::R32G32Sint
            | PixelFormat::D32FloatS8Uint => 8,
            PixelFormat::R32G32B32Float | PixelFormat::R32G32B32Uint | PixelFormat::R32G32B32Sint => 12,
            PixelFormat::R32G32B32A32Float
            | PixelFormat::R32G32B32A32Uint
            | PixelFormat::R32G32B32A32Sint => 16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorSpace {
    #[default]
    SrgbNonLinear,
    ExtendedSrgbLinear,
    Hdr10St2084,
    Hdr10Hlg,
    DolbyVision,
}

impl ColorSpace {
    pub fn is_hdr(self) -> bool {
        !matches!(self, ColorSpace::SrgbNonLinear)
    }
}

/// A format/color space pair reported by a presentation surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SurfaceFormat {
    pub format: PixelFormat,
    pub color_space: ColorSpace,
}

impl SurfaceFormat {
    pub const fn new(format: PixelFormat, color_space: ColorSpace) -> Self {
        Self { format, color_space }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresentMode {
    Immediate,
    Mailbox,
    Fifo,
    FifoRelaxed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_formats() {
        assert!(PixelFormat::D32Float.is_depth());
        assert!(!PixelFormat::D32Float.has_stencil());
        assert!(PixelFormat::D24UnormS8Uint.has_stencil());
        assert!(!PixelFormat::R32Float.is_depth());
    }

    #[test]
    fn byte_sizes() {
        assert_eq!(PixelFormat::R32G32B32Float.byte_size(), 12);
        assert_eq!(PixelFormat::R16G16B16A16Float.byte_size(), 8);
        assert_eq!(PixelFormat::B8G8R8A8Unorm.byte_size(), 4);
    }
}
