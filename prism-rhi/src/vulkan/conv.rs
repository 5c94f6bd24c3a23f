//! Translation of backend agnostic descriptions into Vulkan enums and flags.

use ash::vk;
use crate::flags::{ColorMask, ColorMasks, ResourceUsage, ResourceUsages};
use crate::format::{ColorSpace, PixelFormat, PresentMode};
use crate::pipeline::{BlendFactor, BlendOp, CullMode, FillMode, FrontFace, PrimitiveTopology, StencilOp};
use crate::render_pass::{AttachmentLoad, AttachmentStore};
use crate::resource::{AddressMode, BorderColor, FilterMode};
use crate::shader::ShaderType;
use crate::types::{ClearValue, CompareOp, DescriptorType, IndexFormat, ResourceDimension, ShaderVisibility};

pub(crate) fn format(format: PixelFormat) -> vk::Format {
    match format {
        PixelFormat::Unknown => vk::Format::UNDEFINED,
        PixelFormat::R8Unorm => vk::Format::R8_UNORM,
        PixelFormat::R8G8B8A8Unorm => vk::Format::R8G8B8A8_UNORM,
        PixelFormat::R8G8B8A8Srgb => vk::Format::R8G8B8A8_SRGB,
        PixelFormat::B8G8R8A8Unorm => vk::Format::B8G8R8A8_UNORM,
        PixelFormat::B8G8R8A8Srgb => vk::Format::B8G8R8A8_SRGB,
        PixelFormat::R10G10B10A2Unorm => vk::Format::A2B10G10R10_UNORM_PACK32,
        PixelFormat::R16Float => vk::Format::R16_SFLOAT,
        PixelFormat::R16G16Float => vk::Format::R16G16_SFLOAT,
        PixelFormat::R16G16B16A16Float => vk::Format::R16G16B16A16_SFLOAT,
        PixelFormat::R32Float => vk::Format::R32_SFLOAT,
        PixelFormat::R32G32Float => vk::Format::R32G32_SFLOAT,
        PixelFormat::R32G32B32Float => vk::Format::R32G32B32_SFLOAT,
        PixelFormat::R32G32B32A32Float => vk::Format::R32G32B32A32_SFLOAT,
        PixelFormat::R32Uint => vk::Format::R32_UINT,
        PixelFormat::R32G32Uint => vk::Format::R32G32_UINT,
        PixelFormat::R32G32B32Uint => vk::Format::R32G32B32_UINT,
        PixelFormat::R32G32B32A32Uint => vk::Format::R32G32B32A32_UINT,
        PixelFormat::R32Sint => vk::Format::R32_SINT,
        PixelFormat::R32G32Sint => vk::Format::R32G32_SINT,
        PixelFormat::R32G32B32Sint => vk::Format::R32G32B32_SINT,
        PixelFormat::R32G32B32A32Sint => vk::Format::R32G32B32A32_SINT,
        PixelFormat::D16Unorm => vk::Format::D16_UNORM,
        PixelFormat::D32Float => vk::Format::D32_SFLOAT,
        PixelFormat::D24UnormS8Uint => vk::Format::D24_UNORM_S8_UINT,
        PixelFormat::D32FloatS8Uint => vk::Format::D32_SFLOAT_S8_UINT,
    }
}

/// Surface formats outside the engine format list map to `Unknown` and are never chosen.
pub(crate) fn pixel_format(format: vk::Format) -> PixelFormat {
    match format {
        vk::Format::R8G8B8A8_UNORM => PixelFormat::R8G8B8A8Unorm,
        vk::Format::R8G8B8A8_SRGB => PixelFormat::R8G8B8A8Srgb,
        vk::Format::B8G8R8A8_UNORM => PixelFormat::B8G8R8A8Unorm,
        vk::Format::B8G8R8A8_SRGB => PixelFormat::B8G8R8A8Srgb,
        vk::Format::A2B10G10R10_UNORM_PACK32 => PixelFormat::R10G10B10A2Unorm,
        vk::Format::R16G16B16A16_SFLOAT => PixelFormat::R16G16B16A16Float,
        vk::Format::R32G32B32A32_SFLOAT => PixelFormat::R32G32B32A32Float,
        _ => PixelFormat::Unknown,
    }
}

pub(crate) fn color_space(color_space: ColorSpace) -> vk::ColorSpaceKHR {
    match color_space {
        ColorSpace::SrgbNonLinear => vk::ColorSpaceKHR::SRGB_NONLINEAR,
        ColorSpace::ExtendedSrgbLinear => vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
        ColorSpace::Hdr10St2084 => vk::ColorSpaceKHR::HDR10_ST2084_EXT,
        ColorSpace::Hdr10Hlg => vk::ColorSpaceKHR::HDR10_HLG_EXT,
        ColorSpace::DolbyVision => vk::ColorSpaceKHR::DOLBYVISION_EXT,
    }
}

pub(crate) fn from_vk_color_space(color_space: vk::ColorSpaceKHR) -> Option<ColorSpace> {
    match color_space {
        vk::ColorSpaceKHR::SRGB_NONLINEAR => Some(ColorSpace::SrgbNonLinear),
        vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT => Some(ColorSpace::ExtendedSrgbLinear),
        vk::ColorSpaceKHR::HDR10_ST2084_EXT => Some(ColorSpace::Hdr10St2084),
        vk::ColorSpaceKHR::HDR10_HLG_EXT => Some(ColorSpace::Hdr10Hlg),
        vk::ColorSpaceKHR::DOLBYVISION_EXT => Some(ColorSpace::DolbyVision),
        _ => None,
    }
}

pub(crate) fn present_mode(mode: PresentMode) -> vk::PresentModeKHR {
    match mode {
        PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
        PresentMode::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentMode::Fifo => vk::PresentModeKHR::FIFO,
        PresentMode::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
    }
}

pub(crate) fn from_vk_present_mode(mode: vk::PresentModeKHR) -> Option<PresentMode> {
    match mode {
        vk::PresentModeKHR::IMMEDIATE => Some(PresentMode::Immediate),
        vk::PresentModeKHR::MAILBOX => Some(PresentMode::Mailbox),
        vk::PresentModeKHR::FIFO => Some(PresentMode::Fifo),
        vk::PresentModeKHR::FIFO_RELAXED => Some(PresentMode::FifoRelaxed),
        _ => None,
    }
}

pub(crate) fn aspect(format: PixelFormat) -> vk::ImageAspectFlags {
    if format.has_stencil() {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else if format.is_depth() {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

pub(crate) fn buffer_usage(usage: ResourceUsages) -> vk::BufferUsageFlags {
    usage.iter().fold(vk::BufferUsageFlags::empty(), |flags, usage| {
        flags
            | match usage {
                ResourceUsage::ConstantBuffer => vk::BufferUsageFlags::UNIFORM_BUFFER,
                ResourceUsage::VertexBuffer => vk::BufferUsageFlags::VERTEX_BUFFER,
                ResourceUsage::IndexBuffer => vk::BufferUsageFlags::INDEX_BUFFER,
                ResourceUsage::ShaderResource | ResourceUsage::UnorderedAccess => vk::BufferUsageFlags::STORAGE_BUFFER,
                ResourceUsage::CopySource => vk::BufferUsageFlags::TRANSFER_SRC,
                ResourceUsage::CopyDestination => vk::BufferUsageFlags::TRANSFER_DST,
                ResourceUsage::AccelerationStructure => {
                    vk::BufferUsageFlags::ACCELERATION_STRUCTURE_STORAGE_KHR
                        | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS
                }
                ResourceUsage::RenderTarget | ResourceUsage::DepthStencil => vk::BufferUsageFlags::empty(),
            }
    })
}

pub(crate) fn image_usage(usage: ResourceUsages) -> vk::ImageUsageFlags {
    usage.iter().fold(vk::ImageUsageFlags::empty(), |flags, usage| {
        flags
            | match usage {
                ResourceUsage::ShaderResource => vk::ImageUsageFlags::SAMPLED,
                ResourceUsage::UnorderedAccess => vk::ImageUsageFlags::STORAGE,
                ResourceUsage::RenderTarget => vk::ImageUsageFlags::COLOR_ATTACHMENT,
                ResourceUsage::DepthStencil => vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                ResourceUsage::CopySource => vk::ImageUsageFlags::TRANSFER_SRC,
                ResourceUsage::CopyDestination => vk::ImageUsageFlags::TRANSFER_DST,
                _ => vk::ImageUsageFlags::empty(),
            }
    })
}

pub(crate) fn descriptor_type(ty: DescriptorType, dimension: ResourceDimension) -> vk::DescriptorType {
    match (ty, dimension) {
        (DescriptorType::ConstantBuffer, _) => vk::DescriptorType::UNIFORM_BUFFER,
        (DescriptorType::ShaderResource, ResourceDimension::Texture) => vk::DescriptorType::SAMPLED_IMAGE,
        (DescriptorType::UnorderedAccess, ResourceDimension::Texture) => vk::DescriptorType::STORAGE_IMAGE,
        (DescriptorType::ShaderResource | DescriptorType::UnorderedAccess, ResourceDimension::Buffer) => {
            vk::DescriptorType::STORAGE_BUFFER
        }
    }
}

pub(crate) fn shader_visibility(visibility: ShaderVisibility) -> vk::ShaderStageFlags {
    match visibility {
        ShaderVisibility::All => vk::ShaderStageFlags::ALL,
        ShaderVisibility::Vertex => vk::ShaderStageFlags::VERTEX,
        ShaderVisibility::Hull => vk::ShaderStageFlags::TESSELLATION_CONTROL,
        ShaderVisibility::Domain => vk::ShaderStageFlags::TESSELLATION_EVALUATION,
        ShaderVisibility::Geometry => vk::ShaderStageFlags::GEOMETRY,
        ShaderVisibility::Pixel => vk::ShaderStageFlags::FRAGMENT,
        ShaderVisibility::Compute => vk::ShaderStageFlags::COMPUTE,
    }
}

pub(crate) fn shader_stage(ty: ShaderType) -> vk::ShaderStageFlags {
    match ty {
        ShaderType::Vertex => vk::ShaderStageFlags::VERTEX,
        ShaderType::Pixel => vk::ShaderStageFlags::FRAGMENT,
        ShaderType::Geometry => vk::ShaderStageFlags::GEOMETRY,
        ShaderType::Hull => vk::ShaderStageFlags::TESSELLATION_CONTROL,
        ShaderType::Domain => vk::ShaderStageFlags::TESSELLATION_EVALUATION,
        ShaderType::Compute => vk::ShaderStageFlags::COMPUTE,
    }
}

pub(crate) fn compare_op(op: CompareOp) -> vk::CompareOp {
    match op {
        CompareOp::Never => vk::CompareOp::NEVER,
        CompareOp::Less => vk::CompareOp::LESS,
        CompareOp::Equal => vk::CompareOp::EQUAL,
        CompareOp::LessEqual => vk::CompareOp::LESS_OR_EQUAL,
        CompareOp::Greater => vk::CompareOp::GREATER,
        CompareOp::NotEqual => vk::CompareOp::NOT_EQUAL,
        CompareOp::GreaterEqual => vk::CompareOp::GREATER_OR_EQUAL,
        CompareOp::Always => vk::CompareOp::ALWAYS,
    }
}

pub(crate) fn stencil_op(op: StencilOp) -> vk::StencilOp {
    match op {
        StencilOp::Keep => vk::StencilOp::KEEP,
        StencilOp::Zero => vk::StencilOp::ZERO,
        StencilOp::Replace => vk::StencilOp::REPLACE,
        StencilOp::IncrementSaturate => vk::StencilOp::INCREMENT_AND_CLAMP,
        StencilOp::DecrementSaturate => vk::StencilOp::DECREMENT_AND_CLAMP,
        StencilOp::Invert => vk::StencilOp::INVERT,
        StencilOp::IncrementWrap => vk::StencilOp::INCREMENT_AND_WRAP,
        StencilOp::DecrementWrap => vk::StencilOp::DECREMENT_AND_WRAP,
    }
}

pub(crate) fn topology(topology: PrimitiveTopology) -> vk::PrimitiveTopology {
    match topology {
        PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
        PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
        PrimitiveTopology::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
        PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
        PrimitiveTopology::PatchList(_) => vk::PrimitiveTopology::PATCH_LIST,
    }
}

pub(crate) fn cull_mode(mode: CullMode) -> vk::CullModeFlags {
    match mode {
        CullMode::None => vk::CullModeFlags::NONE,
        CullMode::Front => vk::CullModeFlags::FRONT,
        CullMode::Back => vk::CullModeFlags::BACK,
    }
}

pub(crate) fn polygon_mode(mode: FillMode) -> vk::PolygonMode {
    match mode {
        FillMode::Solid => vk::PolygonMode::FILL,
        FillMode::Wireframe => vk::PolygonMode::LINE,
    }
}

/// Viewports are flipped on Vulkan, so framebuffer space winding already matches DirectX12.
pub(crate) fn front_face(face: FrontFace) -> vk::FrontFace {
    match face {
        FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
        FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
    }
}

pub(crate) fn blend_factor(factor: BlendFactor) -> vk::BlendFactor {
    match factor {
        BlendFactor::Zero => vk::BlendFactor::ZERO,
        BlendFactor::One => vk::BlendFactor::ONE,
        BlendFactor::SrcColor => vk::BlendFactor::SRC_COLOR,
        BlendFactor::InvSrcColor => vk::BlendFactor::ONE_MINUS_SRC_COLOR,
        BlendFactor::SrcAlpha => vk::BlendFactor::SRC_ALPHA,
        BlendFactor::InvSrcAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DstColor => vk::BlendFactor::DST_COLOR,
        BlendFactor::InvDstColor => vk::BlendFactor::ONE_MINUS_DST_COLOR,
        BlendFactor::DstAlpha => vk::BlendFactor::DST_ALPHA,
        BlendFactor::InvDstAlpha => vk::BlendFactor::ONE_MINUS_DST_ALPHA,
    }
}

pub(crate) fn blend_op(op: BlendOp) -> vk::BlendOp {
    match op {
        BlendOp::Add => vk::BlendOp::ADD,
        BlendOp::Subtract => vk::BlendOp::SUBTRACT,
        BlendOp::ReverseSubtract => vk::BlendOp::REVERSE_SUBTRACT,
        BlendOp::Min => vk::BlendOp::MIN,
        BlendOp::Max => vk::BlendOp::MAX,
    }
}

pub(crate) fn color_write_mask(mask: ColorMasks) -> vk::ColorComponentFlags {
    let mut flags = vk::ColorComponentFlags::empty();
    if mask.contains(ColorMask::Red) {
        flags |= vk::ColorComponentFlags::R;
    }
    if mask.contains(ColorMask::Green) {
        flags |= vk::ColorComponentFlags::G;
    }
    if mask.contains(ColorMask::Blue) {
        flags |= vk::ColorComponentFlags::B;
    }
    if mask.contains(ColorMask::Alpha) {
        flags |= vk::ColorComponentFlags::A;
    }
    flags
}

pub(crate) fn filter(filter: FilterMode) -> (vk::Filter, vk::SamplerMipmapMode) {
    match filter {
        FilterMode::Point => (vk::Filter::NEAREST, vk::SamplerMipmapMode::NEAREST),
        FilterMode::Linear | FilterMode::Anisotropic => (vk::Filter::LINEAR, vk::SamplerMipmapMode::LINEAR),
    }
}

pub(crate) fn address_mode(mode: AddressMode) -> vk::SamplerAddressMode {
    match mode {
        AddressMode::Wrap => vk::SamplerAddressMode::REPEAT,
        AddressMode::Mirror => vk::SamplerAddressMode::MIRRORED_REPEAT,
        AddressMode::Clamp => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        AddressMode::Border => vk::SamplerAddressMode::CLAMP_TO_BORDER,
    }
}

pub(crate) fn border_color(color: BorderColor) -> vk::BorderColor {
    match color {
        BorderColor::TransparentBlack => vk::BorderColor::FLOAT_TRANSPARENT_BLACK,
        BorderColor::OpaqueBlack => vk::BorderColor::FLOAT_OPAQUE_BLACK,
        BorderColor::OpaqueWhite => vk::BorderColor::FLOAT_OPAQUE_WHITE,
    }
}

pub(crate) fn index_type(format: IndexFormat) -> vk::IndexType {
    match format {
        IndexFormat::UInt16 => vk::IndexType::UINT16,
        IndexFormat::UInt32 => vk::IndexType::UINT32,
    }
}

pub(crate) fn load_op(load: AttachmentLoad) -> vk::AttachmentLoadOp {
    match load {
        AttachmentLoad::Load => vk::AttachmentLoadOp::LOAD,
        AttachmentLoad::Clear => vk::AttachmentLoadOp::CLEAR,
        AttachmentLoad::DontCare => vk::AttachmentLoadOp::DONT_CARE,
    }
}

pub(crate) fn store_op(store: AttachmentStore) -> vk::AttachmentStoreOp {
    match store {
        AttachmentStore::Store => vk::AttachmentStoreOp::STORE,
        AttachmentStore::DontCare => vk::AttachmentStoreOp::DONT_CARE,
    }
}

pub(crate) fn clear_value(value: &ClearValue) -> vk::ClearValue {
    match *value {
        ClearValue::Color(color) => vk::ClearValue {
            color: vk::ClearColorValue { float32: color },
        },
        ClearValue::DepthStencil { depth, stencil } => vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth,
                stencil: stencil as u32,
            },
        },
    }
}

pub(crate) fn sample_count(count: u32) -> vk::SampleCountFlags {
    match count {
        2 => vk::SampleCountFlags::TYPE_2,
        4 => vk::SampleCountFlags::TYPE_4,
        8 => vk::SampleCountFlags::TYPE_8,
        16 => vk::SampleCountFlags::TYPE_16,
        _ => vk::SampleCountFlags::TYPE_1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_formats_round_trip() {
        for format in [PixelFormat::B8G8R8A8Srgb, PixelFormat::R16G16B16A16Float, PixelFormat::R10G10B10A2Unorm] {
            assert_eq!(pixel_format(super::format(format)), format);
        }
        assert_eq!(pixel_format(vk::Format::R5G6B5_UNORM_PACK16), PixelFormat::Unknown);
    }

    #[test]
    fn structured_buffers_are_storage_buffers() {
        assert_eq!(
            descriptor_type(DescriptorType::ShaderResource, ResourceDimension::Buffer),
            vk::DescriptorType::STORAGE_BUFFER
        );
        assert_eq!(
            descriptor_type(DescriptorType::ShaderResource, ResourceDimension::Texture),
            vk::DescriptorType::SAMPLED_IMAGE
        );
        let usage = buffer_usage(ResourceUsage::ConstantBuffer | ResourceUsage::CopyDestination);
        assert_eq!(usage, vk::BufferUsageFlags::UNIFORM_BUFFER | vk::BufferUsageFlags::TRANSFER_DST);
    }
}
