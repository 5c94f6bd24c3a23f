//! Translation of backend agnostic descriptions into DirectX12 and DXGI enums.

use windows::Win32::Graphics::Direct3D::*;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;
use crate::flags::ColorMasks;
use crate::format::{ColorSpace, PixelFormat};
use crate::pipeline::{BlendFactor, BlendOp, CullMode, FillMode, PrimitiveTopology, StencilOp};
use crate::resource::{AddressMode, BorderColor, FilterMode, SamplerDesc};
use crate::types::{CommandListType, CompareOp, DescriptorHeapType, DescriptorType, IndexFormat, ResourceState, ShaderVisibility};

pub(crate) fn format(format: PixelFormat) -> DXGI_FORMAT {
    match format {
        PixelFormat::Unknown => DXGI_FORMAT_UNKNOWN,
        PixelFormat::R8Unorm => DXGI_FORMAT_R8_UNORM,
        PixelFormat::R8G8B8A8Unorm => DXGI_FORMAT_R8G8B8A8_UNORM,
        PixelFormat::R8G8B8A8Srgb => DXGI_FORMAT_R8G8B8A8_UNORM_SRGB,
        PixelFormat::B8G8R8A8Unorm => DXGI_FORMAT_B8G8R8A8_UNORM,
        PixelFormat::B8G8R8A8Srgb => DXGI_FORMAT_B8G8R8A8_UNORM_SRGB,
        PixelFormat::R10G10B10A2Unorm => DXGI_FORMAT_R10G10B10A2_UNORM,
        PixelFormat::R16Float => DXGI_FORMAT_R16_FLOAT,
        PixelFormat::R16G16Float => DXGI_FORMAT_R16G16_FLOAT,
        PixelFormat::R16G16B16A16Float => DXGI_FORMAT_R16G16B16A16_FLOAT,
        PixelFormat::R32Float => DXGI_FORMAT_R32_FLOAT,
        PixelFormat::R32G32Float => DXGI_FORMAT_R32G32_FLOAT,
        PixelFormat::R32G32B32Float => DXGI_FORMAT_R32G32B32_FLOAT,
        PixelFormat::R32G32B32A32Float => DXGI_FORMAT_R32G32B32A32_FLOAT,
        PixelFormat::R32Uint => DXGI_FORMAT_R32_UINT,
        PixelFormat::R32G32Uint => DXGI_FORMAT_R32G32_UINT,
        PixelFormat::R32G32B32Uint => DXGI_FORMAT_R32G32B32_UINT,
        PixelFormat::R32G32B32A32Uint => DXGI_FORMAT_R32G32B32A32_UINT,
        PixelFormat::R32Sint => DXGI_FORMAT_R32_SINT,
        PixelFormat::R32G32Sint => DXGI_FORMAT_R32G32_SINT,
        PixelFormat::R32G32B32Sint => DXGI_FORMAT_R32G32B32_SINT,
        PixelFormat::R32G32B32A32Sint => DXGI_FORMAT_R32G32B32A32_SINT,
        PixelFormat::D16Unorm => DXGI_FORMAT_D16_UNORM,
        PixelFormat::D32Float => DXGI_FORMAT_D32_FLOAT,
        PixelFormat::D24UnormS8Uint => DXGI_FORMAT_D24_UNORM_S8_UINT,
        PixelFormat::D32FloatS8Uint => DXGI_FORMAT_D32_FLOAT_S8X24_UINT,
    }
}

/// Depth textures that are also sampled are created typeless, views pick the aspect.
pub(crate) fn typeless_depth(format: PixelFormat) -> DXGI_FORMAT {
    match format {
        PixelFormat::D16Unorm => DXGI_FORMAT_R16_TYPELESS,
        PixelFormat::D32Float => DXGI_FORMAT_R32_TYPELESS,
        PixelFormat::D24UnormS8Uint => DXGI_FORMAT_R24G8_TYPELESS,
        PixelFormat::D32FloatS8Uint => DXGI_FORMAT_R32G8X24_TYPELESS,
        other => self::format(other),
    }
}

/// Format a shader reads a depth texture with.
pub(crate) fn depth_read_format(format: PixelFormat) -> DXGI_FORMAT {
    match format {
        PixelFormat::D16Unorm => DXGI_FORMAT_R16_UNORM,
        PixelFormat::D32Float => DXGI_FORMAT_R32_FLOAT,
        PixelFormat::D24UnormS8Uint => DXGI_FORMAT_R24_UNORM_X8_TYPELESS,
        PixelFormat::D32FloatS8Uint => DXGI_FORMAT_R32_FLOAT_X8X24_TYPELESS,
        other => self::format(other),
    }
}

pub(crate) fn color_space(color_space: ColorSpace) -> DXGI_COLOR_SPACE_TYPE {
    match color_space {
        ColorSpace::SrgbNonLinear => DXGI_COLOR_SPACE_RGB_FULL_G22_NONE_P709,
        ColorSpace::ExtendedSrgbLinear => DXGI_COLOR_SPACE_RGB_FULL_G10_NONE_P709,
        ColorSpace::Hdr10St2084 | ColorSpace::DolbyVision => DXGI_COLOR_SPACE_RGB_FULL_G2084_NONE_P2020,
        ColorSpace::Hdr10Hlg => DXGI_COLOR_SPACE_YCBCR_FULL_GHLG_TOPLEFT_P2020,
    }
}

pub(crate) fn command_list_type(ty: CommandListType) -> D3D12_COMMAND_LIST_TYPE {
    match ty {
        CommandListType::Graphics => D3D12_COMMAND_LIST_TYPE_DIRECT,
        CommandListType::Compute => D3D12_COMMAND_LIST_TYPE_COMPUTE,
        CommandListType::Copy => D3D12_COMMAND_LIST_TYPE_COPY,
    }
}

pub(crate) fn descriptor_heap_type(ty: DescriptorHeapType) -> D3D12_DESCRIPTOR_HEAP_TYPE {
    match ty {
        DescriptorHeapType::Rtv => D3D12_DESCRIPTOR_HEAP_TYPE_RTV,
        DescriptorHeapType::Dsv => D3D12_DESCRIPTOR_HEAP_TYPE_DSV,
        DescriptorHeapType::Cbv | DescriptorHeapType::Srv | DescriptorHeapType::Uav => {
            D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV
        }
        DescriptorHeapType::Sampler => D3D12_DESCRIPTOR_HEAP_TYPE_SAMPLER,
    }
}

pub(crate) fn resource_state(state: ResourceState) -> D3D12_RESOURCE_STATES {
    match state {
        ResourceState::Common => D3D12_RESOURCE_STATE_COMMON,
        ResourceState::VertexAndConstantBuffer => D3D12_RESOURCE_STATE_VERTEX_AND_CONSTANT_BUFFER,
        ResourceState::IndexBuffer => D3D12_RESOURCE_STATE_INDEX_BUFFER,
        ResourceState::RenderTarget => D3D12_RESOURCE_STATE_RENDER_TARGET,
        ResourceState::UnorderedAccess => D3D12_RESOURCE_STATE_UNORDERED_ACCESS,
        ResourceState::DepthWrite => D3D12_RESOURCE_STATE_DEPTH_WRITE,
        ResourceState::DepthRead => D3D12_RESOURCE_STATE_DEPTH_READ,
        ResourceState::ShaderResource => {
            D3D12_RESOURCE_STATE_PIXEL_SHADER_RESOURCE | D3D12_RESOURCE_STATE_NON_PIXEL_SHADER_RESOURCE
        }
        ResourceState::CopySource => D3D12_RESOURCE_STATE_COPY_SOURCE,
        ResourceState::CopyDestination => D3D12_RESOURCE_STATE_COPY_DEST,
        ResourceState::Present => D3D12_RESOURCE_STATE_PRESENT,
    }
}

pub(crate) fn descriptor_range_type(ty: DescriptorType) -> D3D12_DESCRIPTOR_RANGE_TYPE {
    match ty {
        DescriptorType::ConstantBuffer => D3D12_DESCRIPTOR_RANGE_TYPE_CBV,
        DescriptorType::ShaderResource => D3D12_DESCRIPTOR_RANGE_TYPE_SRV,
        DescriptorType::UnorderedAccess => D3D12_DESCRIPTOR_RANGE_TYPE_UAV,
    }
}

pub(crate) fn shader_visibility(visibility: ShaderVisibility) -> D3D12_SHADER_VISIBILITY {
    match visibility {
        ShaderVisibility::All | ShaderVisibility::Compute => D3D12_SHADER_VISIBILITY_ALL,
        ShaderVisibility::Vertex => D3D12_SHADER_VISIBILITY_VERTEX,
        ShaderVisibility::Hull => D3D12_SHADER_VISIBILITY_HULL,
        ShaderVisibility::Domain => D3D12_SHADER_VISIBILITY_DOMAIN,
        ShaderVisibility::Geometry => D3D12_SHADER_VISIBILITY_GEOMETRY,
        ShaderVisibility::Pixel => D3D12_SHADER_VISIBILITY_PIXEL,
    }
}

pub(crate) fn compare_func(op: CompareOp) -> D3D12_COMPARISON_FUNC {
    match op {
        CompareOp::Never => D3D12_COMPARISON_FUNC_NEVER,
        CompareOp::Less => D3D12_COMPARISON_FUNC_LESS,
        CompareOp::Equal => D3D12_COMPARISON_FUNC_EQUAL,
        CompareOp::LessEqual => D3D12_COMPARISON_FUNC_LESS_EQUAL,
        CompareOp::Greater => D3D12_COMPARISON_FUNC_GREATER,
        CompareOp::NotEqual => D3D12_COMPARISON_FUNC_NOT_EQUAL,
        CompareOp::GreaterEqual => D3D12_COMPARISON_FUNC_GREATER_EQUAL,
        CompareOp::Always => D3D12_COMPARISON_FUNC_ALWAYS,
    }
}

pub(crate) fn stencil_op(op: StencilOp) -> D3D12_STENCIL_OP {
    match op {
        StencilOp::Keep => D3D12_STENCIL_OP_KEEP,
        StencilOp::Zero => D3D12_STENCIL_OP_ZERO,
        StencilOp::Replace => D3D12_STENCIL_OP_REPLACE,
        StencilOp::IncrementSaturate => D3D12_STENCIL_OP_INCR_SAT,
        StencilOp::DecrementSaturate => D3D12_STENCIL_OP_DECR_SAT,
        StencilOp::Invert => D3D12_STENCIL_OP_INVERT,
        StencilOp::IncrementWrap => D3D12_STENCIL_OP_INCR,
        StencilOp::DecrementWrap => D3D12_STENCIL_OP_DECR,
    }
}

pub(crate) fn blend(factor: BlendFactor) -> D3D12_BLEND {
    match factor {
        BlendFactor::Zero => D3D12_BLEND_ZERO,
        BlendFactor::One => D3D12_BLEND_ONE,
        BlendFactor::SrcColor => D3D12_BLEND_SRC_COLOR,
        BlendFactor::InvSrcColor => D3D12_BLEND_INV_SRC_COLOR,
        BlendFactor::SrcAlpha => D3D12_BLEND_SRC_ALPHA,
        BlendFactor::InvSrcAlpha => D3D12_BLEND_INV_SRC_ALPHA,
        BlendFactor::DstColor => D3D12_BLEND_DEST_COLOR,
        BlendFactor::InvDstColor => D3D12_BLEND_INV_DEST_COLOR,
        BlendFactor::DstAlpha => D3D12_BLEND_DEST_ALPHA,
        BlendFactor::InvDstAlpha => D3D12_BLEND_INV_DEST_ALPHA,
    }
}

pub(crate) fn blend_op(op: BlendOp) -> D3D12_BLEND_OP {
    match op {
        BlendOp::Add => D3D12_BLEND_OP_ADD,
        BlendOp::Subtract => D3D12_BLEND_OP_SUBTRACT,
        BlendOp::ReverseSubtract => D3D12_BLEND_OP_REV_SUBTRACT,
        BlendOp::Min => D3D12_BLEND_OP_MIN,
        BlendOp::Max => D3D12_BLEND_OP_MAX,
    }
}

/// Engine color masks use the same bit order as `D3D12_COLOR_WRITE_ENABLE`.
#[inline]
pub(crate) fn color_write_mask(mask: ColorMasks) -> u8 {
    mask.bits()
}

pub(crate) fn cull_mode(mode: CullMode) -> D3D12_CULL_MODE {
    match mode {
        CullMode::None => D3D12_CULL_MODE_NONE,
        CullMode::Front => D3D12_CULL_MODE_FRONT,
        CullMode::Back => D3D12_CULL_MODE_BACK,
    }
}

pub(crate) fn fill_mode(mode: FillMode) -> D3D12_FILL_MODE {
    match mode {
        FillMode::Solid => D3D12_FILL_MODE_SOLID,
        FillMode::Wireframe => D3D12_FILL_MODE_WIREFRAME,
    }
}

pub(crate) fn topology_type(topology: PrimitiveTopology) -> D3D12_PRIMITIVE_TOPOLOGY_TYPE {
    match topology {
        PrimitiveTopology::PointList => D3D12_PRIMITIVE_TOPOLOGY_TYPE_POINT,
        PrimitiveTopology::LineList | PrimitiveTopology::LineStrip => D3D12_PRIMITIVE_TOPOLOGY_TYPE_LINE,
        PrimitiveTopology::TriangleList | PrimitiveTopology::TriangleStrip => D3D12_PRIMITIVE_TOPOLOGY_TYPE_TRIANGLE,
        PrimitiveTopology::PatchList(_) => D3D12_PRIMITIVE_TOPOLOGY_TYPE_PATCH,
    }
}

pub(crate) fn topology(topology: PrimitiveTopology) -> D3D_PRIMITIVE_TOPOLOGY {
    match topology {
        PrimitiveTopology::PointList => D3D_PRIMITIVE_TOPOLOGY_POINTLIST,
        PrimitiveTopology::LineList => D3D_PRIMITIVE_TOPOLOGY_LINELIST,
        PrimitiveTopology::LineStrip => D3D_PRIMITIVE_TOPOLOGY_LINESTRIP,
        PrimitiveTopology::TriangleList => D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST,
        PrimitiveTopology::TriangleStrip => D3D_PRIMITIVE_TOPOLOGY_TRIANGLESTRIP,
        PrimitiveTopology::PatchList(points) => {
            let points = points.clamp(1, 32) as i32;
            D3D_PRIMITIVE_TOPOLOGY(D3D_PRIMITIVE_TOPOLOGY_1_CONTROL_POINT_PATCHLIST.0 + points - 1)
        }
    }
}

pub(crate) fn index_format(format: IndexFormat) -> DXGI_FORMAT {
    match format {
        IndexFormat::UInt16 => DXGI_FORMAT_R16_UINT,
        IndexFormat::UInt32 => DXGI_FORMAT_R32_UINT,
    }
}

fn address_mode(mode: AddressMode) -> D3D12_TEXTURE_ADDRESS_MODE {
    match mode {
        AddressMode::Wrap => D3D12_TEXTURE_ADDRESS_MODE_WRAP,
        AddressMode::Mirror => D3D12_TEXTURE_ADDRESS_MODE_MIRROR,
        AddressMode::Clamp => D3D12_TEXTURE_ADDRESS_MODE_CLAMP,
        AddressMode::Border => D3D12_TEXTURE_ADDRESS_MODE_BORDER,
    }
}

fn filter(filter: FilterMode, comparison: bool) -> D3D12_FILTER {
    match (filter, comparison) {
        (FilterMode::Point, false) => D3D12_FILTER_MIN_MAG_MIP_POINT,
        (FilterMode::Linear, false) => D3D12_FILTER_MIN_MAG_MIP_LINEAR,
        (FilterMode::Anisotropic, false) => D3D12_FILTER_ANISOTROPIC,
        (FilterMode::Point, true) => D3D12_FILTER_COMPARISON_MIN_MAG_MIP_POINT,
        (FilterMode::Linear, true) => D3D12_FILTER_COMPARISON_MIN_MAG_MIP_LINEAR,
        (FilterMode::Anisotropic, true) => D3D12_FILTER_COMPARISON_ANISOTROPIC,
    }
}

fn border_color(color: BorderColor) -> [f32; 4] {
    match color {
        BorderColor::TransparentBlack => [0.0; 4],
        BorderColor::OpaqueBlack => [0.0, 0.0, 0.0, 1.0],
        BorderColor::OpaqueWhite => [1.0; 4],
    }
}

fn static_border_color(color: BorderColor) -> D3D12_STATIC_BORDER_COLOR {
    match color {
        BorderColor::TransparentBlack => D3D12_STATIC_BORDER_COLOR_TRANSPARENT_BLACK,
        BorderColor::OpaqueBlack => D3D12_STATIC_BORDER_COLOR_OPAQUE_BLACK,
        BorderColor::OpaqueWhite => D3D12_STATIC_BORDER_COLOR_OPAQUE_WHITE,
    }
}

pub(crate) fn sampler(desc: &SamplerDesc) -> D3D12_SAMPLER_DESC {
    D3D12_SAMPLER_DESC {
        Filter: filter(desc.filter, desc.comparison.is_some()),
        AddressU: address_mode(desc.address_u),
        AddressV: address_mode(desc.address_v),
        AddressW: address_mode(desc.address_w),
        MipLODBias: desc.mip_lod_bias,
        MaxAnisotropy: desc.max_anisotropy.clamp(1, 16),
        ComparisonFunc: compare_func(desc.comparison.unwrap_or(CompareOp::Never)),
        BorderColor: border_color(desc.border_color),
        MinLOD: desc.min_lod,
        MaxLOD: desc.max_lod,
    }
}

pub(crate) fn static_sampler(
    desc: &SamplerDesc,
    shader_register: u32,
    register_space: u32,
    visibility: ShaderVisibility,
) -> D3D12_STATIC_SAMPLER_DESC {
    D3D12_STATIC_SAMPLER_DESC {
        Filter: filter(desc.filter, desc.comparison.is_some()),
        AddressU: address_mode(desc.address_u),
        AddressV: address_mode(desc.address_v),
        AddressW: address_mode(desc.address_w),
        MipLODBias: desc.mip_lod_bias,
        MaxAnisotropy: desc.max_anisotropy.clamp(1, 16),
        ComparisonFunc: compare_func(desc.comparison.unwrap_or(CompareOp::Never)),
        BorderColor: static_border_color(desc.border_color),
        MinLOD: desc.min_lod,
        MaxLOD: desc.max_lod,
        ShaderRegister: shader_register,
        RegisterSpace: register_space,
        ShaderVisibility: shader_visibility(visibility),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::ColorMask;

    #[test]
    fn patch_lists_count_control_points() {
        assert_eq!(topology(PrimitiveTopology::PatchList(1)), D3D_PRIMITIVE_TOPOLOGY_1_CONTROL_POINT_PATCHLIST);
        assert_eq!(topology(PrimitiveTopology::PatchList(3)), D3D_PRIMITIVE_TOPOLOGY_3_CONTROL_POINT_PATCHLIST);
    }

    #[test]
    fn sampled_depth_is_typeless() {
        assert_eq!(typeless_depth(PixelFormat::D32Float), DXGI_FORMAT_R32_TYPELESS);
        assert_eq!(depth_read_format(PixelFormat::D32Float), DXGI_FORMAT_R32_FLOAT);
        assert_eq!(typeless_depth(PixelFormat::R8G8B8A8Unorm), DXGI_FORMAT_R8G8B8A8_UNORM);
    }

    #[test]
    fn write_mask_matches_native_bits() {
        let mask = ColorMask::Red | ColorMask::Alpha;
        assert_eq!(
            color_write_mask(mask),
            (D3D12_COLOR_WRITE_ENABLE_RED.0 | D3D12_COLOR_WRITE_ENABLE_ALPHA.0) as u8
        );
    }
}
