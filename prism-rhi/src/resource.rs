//! Resource descriptions: buffers, textures, views and samplers.

use derive_builder::Builder;
use crate::flags::{BufferCreateFlagSet, BufferCreateFlags, ResourceUsage, ResourceUsages};
use crate::format::PixelFormat;
use crate::error::{RhiError, RhiResult};
use crate::types::{ClearValue, CompareOp, ResourceState, ResourceViewType};

/// Constant buffer views must start and end on this boundary.
pub const CONSTANT_BUFFER_ALIGNMENT: u32 = 256;

#[inline]
pub fn align_up(value: u32, alignment: u32) -> u32 {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

#[derive(Clone, Debug, PartialEq, Builder)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct GpuBufferMetaData {
    #[builder(default)]
    pub name: String,
    /// Number of elements.
    pub count: u32,
    /// Size of one element in bytes.
    pub stride: u32,
    #[builder(default)]
    pub usage: ResourceUsages,
    #[builder(default)]
    pub flags: BufferCreateFlagSet,
    #[builder(default = "ResourceState::Common")]
    pub initial_state: ResourceState,
    /// Element format of typed buffer views. `Unknown` for structured and raw buffers.
    #[builder(default)]
    pub format: PixelFormat,
}

impl GpuBufferMetaDataBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.count == Some(0) {
            return Err("buffer element count must not be zero".to_owned());
        }
        if self.stride == Some(0) {
            return Err("buffer stride must not be zero".to_owned());
        }
        Ok(())
    }
}

impl GpuBufferMetaData {
    #[inline]
    pub fn byte_size(&self) -> u64 {
        self.count as u64 * self.stride as u64
    }

    #[inline]
    pub fn is_cpu_visible(&self) -> bool {
        self.flags.intersects(BufferCreateFlags::CpuAccess | BufferCreateFlags::Readback)
    }

    /// Cpu writable constant buffer holding `count` elements of `size` bytes, each aligned for
    /// constant buffer views.
    pub fn constant_buffer(name: impl Into<String>, size: u32, count: u32) -> Self {
        Self {
            name: name.into(),
            count,
            stride: align_up(size, CONSTANT_BUFFER_ALIGNMENT),
            usage: ResourceUsage::ConstantBuffer.into(),
            flags: BufferCreateFlags::CpuAccess.into(),
            initial_state: ResourceState::VertexAndConstantBuffer,
            format: PixelFormat::Unknown,
        }
    }

    pub fn vertex_buffer(name: impl Into<String>, stride: u32, count: u32) -> Self {
        Self {
            name: name.into(),
            count,
            stride,
            usage: ResourceUsage::VertexBuffer | ResourceUsage::CopyDestination,
            flags: BufferCreateFlagSet::empty(),
            initial_state: ResourceState::CopyDestination,
            format: PixelFormat::Unknown,
        }
    }

    pub fn index_buffer(name: impl Into<String>, stride: u32, count: u32) -> Self {
        Self {
            name: name.into(),
            count,
            stride,
            usage: ResourceUsage::IndexBuffer | ResourceUsage::CopyDestination,
            flags: BufferCreateFlagSet::empty(),
            initial_state: ResourceState::CopyDestination,
            format: PixelFormat::Unknown,
        }
    }

    /// Structured buffer written by compute shaders and read as shader resource afterwards.
    pub fn unordered_access_buffer(name: impl Into<String>, stride: u32, count: u32) -> Self {
        Self {
            name: name.into(),
            count,
            stride,
            usage: ResourceUsage::UnorderedAccess | ResourceUsage::ShaderResource,
            flags: BufferCreateFlags::Structured.into(),
            initial_state: ResourceState::UnorderedAccess,
            format: PixelFormat::Unknown,
        }
    }

    /// Staging memory, source of copy queue uploads.
    pub fn upload_buffer(name: impl Into<String>, size: u32) -> Self {
        Self {
            name: name.into(),
            count: 1,
            stride: size.max(1),
            usage: ResourceUsage::CopySource.into(),
            flags: BufferCreateFlags::CpuAccess.into(),
            initial_state: ResourceState::Common,
            format: PixelFormat::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureDimension {
    #[default]
    Texture2D,
    Texture3D,
    TextureCube,
}

#[derive(Clone, Debug, PartialEq, Builder)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct GpuTextureMetaData {
    #[builder(default)]
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Depth of 3d textures or array layer count.
    #[builder(default = "1")]
    pub depth_or_array_size: u32,
    #[builder(default = "1")]
    pub mip_levels: u32,
    #[builder(default = "1")]
    pub sample_count: u32,
    pub format: PixelFormat,
    #[builder(default)]
    pub dimension: TextureDimension,
    #[builder(default = "ResourceUsage::ShaderResource.into()")]
    pub usage: ResourceUsages,
    #[builder(default = "ResourceState::Common")]
    pub initial_state: ResourceState,
    /// Optimized clear value for render targets and depth buffers.
    #[builder(default)]
    pub clear_value: Option<ClearValue>,
}

impl GpuTextureMetaDataBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.width == Some(0) || self.height == Some(0) {
            return Err("texture extent must not be zero".to_owned());
        }
        if self.format == Some(PixelFormat::Unknown) {
            return Err("texture format must be known".to_owned());
        }
        Ok(())
    }
}

impl GpuTextureMetaData {
    pub fn render_target(name: impl Into<String>, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            depth_or_array_size: 1,
            mip_levels: 1,
            sample_count: 1,
            format,
            dimension: TextureDimension::Texture2D,
            usage: ResourceUsage::RenderTarget | ResourceUsage::ShaderResource,
            initial_state: ResourceState::ShaderResource,
            clear_value: Some(ClearValue::BLACK),
        }
    }

    pub fn depth_stencil(name: impl Into<String>, width: u32, height: u32, format: PixelFormat) -> Self {
        debug_assert!(format.is_depth());
        Self {
            name: name.into(),
            width,
            height,
            depth_or_array_size: 1,
            mip_levels: 1,
            sample_count: 1,
            format,
            dimension: TextureDimension::Texture2D,
            usage: ResourceUsage::DepthStencil | ResourceUsage::ShaderResource,
            initial_state: ResourceState::DepthWrite,
            clear_value: Some(ClearValue::DEPTH_ONE),
        }
    }

    #[inline]
    pub fn is_depth(&self) -> bool {
        self.format.is_depth()
    }
}

/// What a view looks at. `format == Unknown` inherits the resource format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceViewDesc {
    pub view_type: ResourceViewType,
    pub format: PixelFormat,
    /// First element (buffers) or mip level (textures).
    pub first: u32,
    /// Element or mip count, 0 covers everything after `first`.
    pub count: u32,
}

impl ResourceViewDesc {
    pub fn new(view_type: ResourceViewType) -> Self {
        Self {
            view_type,
            format: PixelFormat::Unknown,
            first: 0,
            count: 0,
        }
    }

    pub fn constant_buffer() -> Self { Self::new(ResourceViewType::ConstantBuffer) }

    pub fn shader_resource() -> Self { Self::new(ResourceViewType::ShaderResource) }

    pub fn unordered_access() -> Self { Self::new(ResourceViewType::UnorderedAccess) }

    pub fn render_target() -> Self { Self::new(ResourceViewType::RenderTarget) }

    pub fn depth_stencil() -> Self { Self::new(ResourceViewType::DepthStencil) }

    pub fn with_format(mut self, format: PixelFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_range(mut self, first: u32, count: u32) -> Self {
        self.first = first;
        self.count = count;
        self
    }

    /// Format a texture view is created with. Depth formats are reinterpreted as color when
    /// sampled.
    pub fn resolve_texture_format(&self, resource_format: PixelFormat) -> PixelFormat {
        if self.format != PixelFormat::Unknown {
            return self.format;
        }
        match (self.view_type, resource_format) {
            (ResourceViewType::ShaderResource, PixelFormat::D32Float) => PixelFormat::R32Float,
            (ResourceViewType::ShaderResource, PixelFormat::D16Unorm) => PixelFormat::R16Float,
            (_, format) => format,
        }
    }
}

/// Reject views the resource was not created for.
pub fn validate_view_usage(name: &str, view_type: ResourceViewType, usage: ResourceUsages, is_texture: bool) -> RhiResult<()> {
    let (required, allowed) = match view_type {
        ResourceViewType::ConstantBuffer => (ResourceUsage::ConstantBuffer, !is_texture),
        ResourceViewType::ShaderResource => (ResourceUsage::ShaderResource, true),
        ResourceViewType::UnorderedAccess => (ResourceUsage::UnorderedAccess, true),
        ResourceViewType::RenderTarget => (ResourceUsage::RenderTarget, is_texture),
        ResourceViewType::DepthStencil => (ResourceUsage::DepthStencil, is_texture),
    };
    if !allowed || !usage.contains(required) {
        return Err(RhiError::InvalidDescriptor(format!(
            "{view_type:?} view of `{name}` which was created with {usage:?}"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    Point,
    #[default]
    Linear,
    Anisotropic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressMode {
    #[default]
    Wrap,
    Mirror,
    Clamp,
    Border,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BorderColor {
    #[default]
    TransparentBlack,
    OpaqueBlack,
    OpaqueWhite,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    pub filter: FilterMode,
    pub address_u: AddressMode,
    pub address_v: AddressMode,
    pub address_w: AddressMode,
    pub mip_lod_bias: f32,
    pub max_anisotropy: u32,
    /// Turns the sampler into a comparison sampler.
    pub comparison: Option<CompareOp>,
    pub border_color: BorderColor,
    pub min_lod: f32,
    pub max_lod: f32,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            filter: FilterMode::Linear,
            address_u: AddressMode::Wrap,
            address_v: AddressMode::Wrap,
            address_w: AddressMode::Wrap,
            mip_lod_bias: 0.0,
            max_anisotropy: 1,
            comparison: None,
            border_color: BorderColor::TransparentBlack,
            min_lod: 0.0,
            max_lod: f32::MAX,
        }
    }
}

impl SamplerDesc {
    pub fn linear_wrap() -> Self {
        Self::default()
    }

    pub fn point_clamp() -> Self {
        Self {
            filter: FilterMode::Point,
            ..Default::default()
        }
        .with_address_mode(AddressMode::Clamp)
    }

    pub fn anisotropic(max_anisotropy: u32) -> Self {
        Self {
            filter: FilterMode::Anisotropic,
            max_anisotropy,
            ..Default::default()
        }
    }

    pub fn with_address_mode(mut self, mode: AddressMode) -> Self {
        self.address_u = mode;
        self.address_v = mode;
        self.address_w = mode;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccelerationStructureKind {
    TopLevel,
    BottomLevel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccelerationStructureDesc {
    pub name: String,
    pub kind: AccelerationStructureKind,
    /// Storage size reported by the prebuild info query.
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_fills_defaults() {
        let meta = GpuTextureMetaDataBuilder::default()
            .name("albedo")
            .width(640u32)
            .height(480u32)
            .format(PixelFormat::R8G8B8A8Unorm)
            .usage(ResourceUsage::RenderTarget | ResourceUsage::ShaderResource)
            .build()
            .unwrap();
        assert_eq!(meta.mip_levels, 1);
        assert_eq!(meta.depth_or_array_size, 1);
        assert_eq!(meta.initial_state, ResourceState::Common);
        assert!(meta.usage.contains(ResourceUsage::RenderTarget));
    }

    #[test]
    fn builder_rejects_zero_sizes() {
        assert!(GpuTextureMetaDataBuilder::default()
            .width(0u32)
            .height(4u32)
            .format(PixelFormat::R32Float)
            .build()
            .is_err());

        assert!(GpuBufferMetaDataBuilder::default().count(0u32).stride(4u32).build().is_err());
        assert!(GpuBufferMetaDataBuilder::default().count(4u32).build().is_err());
    }

    #[test]
    fn constant_buffers_are_aligned() {
        let meta = GpuBufferMetaData::constant_buffer("scene", 200, 3);
        assert_eq!(meta.stride, 256);
        assert_eq!(meta.byte_size(), 768);
        assert!(meta.is_cpu_visible());
        assert_eq!(align_up(257, 256), 512);
    }

    #[test]
    fn views_need_matching_usage() {
        let usage = ResourceUsage::RenderTarget | ResourceUsage::ShaderResource;
        validate_view_usage("albedo", ResourceViewType::RenderTarget, usage, true).unwrap();
        validate_view_usage("albedo", ResourceViewType::ShaderResource, usage, true).unwrap();
        assert!(validate_view_usage("albedo", ResourceViewType::UnorderedAccess, usage, true).is_err());
        // render target views of buffers do not exist
        assert!(validate_view_usage("buf", ResourceViewType::RenderTarget, usage, false).is_err());
    }

    #[test]
    fn depth_views_sample_as_color() {
        let desc = ResourceViewDesc::shader_resource();
        assert_eq!(desc.resolve_texture_format(PixelFormat::D32Float), PixelFormat::R32Float);
        let dsv = ResourceViewDesc::depth_stencil();
        assert_eq!(dsv.resolve_texture_format(PixelFormat::D32Float), PixelFormat::D32Float);
    }
}
