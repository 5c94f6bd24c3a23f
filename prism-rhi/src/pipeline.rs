//! Pipeline state objects.
//!
//! Sub-states are plain values produced by [`PipelineFactory`]. A [`GraphicsPipelineState`]
//! collects them together with shaders and render target formats and is finalized exactly once
//! by `complete_setting`, after which it is immutable.

use std::rc::Rc;
use prism_core::collections::SmallVec;
use crate::backend::{Backend, DeviceCapabilities, RhiDevice, RhiRenderPass};
use crate::error::{RhiError, RhiResult};
use crate::flags::ColorMasks;
use crate::format::PixelFormat;
use crate::render_pass::MAX_RENDER_TARGETS;
use crate::shader::{ShaderBlob, ShaderType};
use crate::types::CompareOp;
use crate::vertex::{InputElement, VertexLayout};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
    /// Tessellation input with the given number of control points.
    PatchList(u8),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InputAssemblyState {
    pub elements: Vec<InputElement>,
    /// Stride of each vertex buffer slot.
    pub strides: SmallVec<[u32; 2]>,
    pub topology: PrimitiveTopology,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FillMode {
    #[default]
    Solid,
    Wireframe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrontFace {
    #[default]
    Clockwise,
    CounterClockwise,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterizerState {
    pub fill_mode: FillMode,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub depth_bias: i32,
    pub depth_bias_clamp: f32,
    pub slope_scaled_depth_bias: f32,
    pub depth_clip: bool,
}

impl Default for RasterizerState {
    fn default() -> Self {
        Self {
            fill_mode: FillMode::Solid,
            cull_mode: CullMode::Back,
            front_face: FrontFace::Clockwise,
            depth_bias: 0,
            depth_bias_clamp: 0.0,
            slope_scaled_depth_bias: 0.0,
            depth_clip: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StencilOp {
    #[default]
    Keep,
    Zero,
    Replace,
    IncrementSaturate,
    DecrementSaturate,
    Invert,
    IncrementWrap,
    DecrementWrap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilFaceState {
    pub fail: StencilOp,
    pub depth_fail: StencilOp,
    pub pass: StencilOp,
    pub compare: CompareOp,
}

impl Default for StencilFaceState {
    fn default() -> Self {
        Self {
            fail: StencilOp::Keep,
            depth_fail: StencilOp::Keep,
            pass: StencilOp::Keep,
            compare: CompareOp::Always,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare: CompareOp,
    pub stencil_test: bool,
    pub stencil_read_mask: u8,
    pub stencil_write_mask: u8,
    pub front: StencilFaceState,
    pub back: StencilFaceState,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_test: true,
            depth_write: true,
            depth_compare: CompareOp::LessEqual,
            stencil_test: false,
            stencil_read_mask: 0xff,
            stencil_write_mask: 0xff,
            front: StencilFaceState::default(),
            back: StencilFaceState::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    InvSrcColor,
    SrcAlpha,
    InvSrcAlpha,
    DstColor,
    InvDstColor,
    DstAlpha,
    InvDstAlpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendOp {
    #[default]
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetBlend {
    pub enable: bool,
    pub src_color: BlendFactor,
    pub dst_color: BlendFactor,
    pub color_op: BlendOp,
    pub src_alpha: BlendFactor,
    pub dst_alpha: BlendFactor,
    pub alpha_op: BlendOp,
    pub write_mask: ColorMasks,
}

impl Default for RenderTargetBlend {
    fn default() -> Self {
        Self {
            enable: false,
            src_color: BlendFactor::One,
            dst_color: BlendFactor::Zero,
            color_op: BlendOp::Add,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::Zero,
            alpha_op: BlendOp::Add,
            write_mask: ColorMasks::all(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlendState {
    pub alpha_to_coverage: bool,
    /// When false every target uses `targets[0]`.
    pub independent_blend: bool,
    pub targets: [RenderTargetBlend; MAX_RENDER_TARGETS],
}

impl BlendState {
    /// Blend description effective for render target `index`.
    #[inline]
    pub fn target(&self, index: usize) -> &RenderTargetBlend {
        if self.independent_blend { &self.targets[index] } else { &self.targets[0] }
    }
}

/// Creates pipeline sub-states. Obtained from `RhiDevice::create_pipeline_factory`.
#[derive(Debug, Clone, Copy)]
pub struct PipelineFactory {
    capabilities: DeviceCapabilities,
}

impl PipelineFactory {
    pub fn new(capabilities: DeviceCapabilities) -> Self {
        Self { capabilities }
    }

    pub fn create_input_assembly_state<V: VertexLayout>(&self, topology: PrimitiveTopology) -> InputAssemblyState {
        InputAssemblyState {
            elements: V::input_elements(),
            strides: SmallVec::from_slice(&[V::stride()]),
            topology,
        }
    }

    /// No vertex input, vertices are generated from `SV_VertexID`.
    pub fn create_empty_input_assembly_state(&self, topology: PrimitiveTopology) -> InputAssemblyState {
        InputAssemblyState {
            elements: Vec::new(),
            strides: SmallVec::new(),
            topology,
        }
    }

    pub fn create_rasterizer_state(&self, cull_mode: CullMode, fill_mode: FillMode) -> RasterizerState {
        RasterizerState {
            cull_mode,
            fill_mode,
            ..Default::default()
        }
    }

    pub fn create_depth_stencil_state(&self, depth_test: bool, depth_write: bool, compare: CompareOp) -> DepthStencilState {
        DepthStencilState {
            depth_test,
            depth_write,
            depth_compare: compare,
            ..Default::default()
        }
    }

    pub fn create_opaque_blend_state(&self) -> BlendState {
        BlendState::default()
    }

    /// Straight alpha blending on every target.
    pub fn create_alpha_blend_state(&self) -> BlendState {
        let target = RenderTargetBlend {
            enable: true,
            src_color: BlendFactor::SrcAlpha,
            dst_color: BlendFactor::InvSrcAlpha,
            color_op: BlendOp::Add,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::InvSrcAlpha,
            alpha_op: BlendOp::Add,
            write_mask: ColorMasks::all(),
        };
        BlendState {
            alpha_to_coverage: false,
            independent_blend: false,
            targets: [target; MAX_RENDER_TARGETS],
        }
    }

    /// Depth only passes write no color.
    pub fn create_no_color_blend_state(&self) -> BlendState {
        let target = RenderTargetBlend {
            write_mask: ColorMasks::empty(),
            ..Default::default()
        };
        BlendState {
            alpha_to_coverage: false,
            independent_blend: false,
            targets: [target; MAX_RENDER_TARGETS],
        }
    }

    pub fn color_mask(&self, mask: impl Into<ColorMasks>) -> ColorMasks {
        mask.into()
    }

    #[inline]
    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }
}

/// Everything a backend needs to build a native graphics pipeline.
pub struct GraphicsPipelineDesc<'a> {
    pub name: &'a str,
    pub input_assembly: &'a InputAssemblyState,
    pub rasterizer: &'a RasterizerState,
    pub depth_stencil: &'a DepthStencilState,
    pub blend: &'a BlendState,
    pub vertex: &'a ShaderBlob,
    pub pixel: Option<&'a ShaderBlob>,
    pub geometry: Option<&'a ShaderBlob>,
    pub hull: Option<&'a ShaderBlob>,
    pub domain: Option<&'a ShaderBlob>,
    pub render_target_formats: &'a [PixelFormat],
    pub depth_stencil_format: PixelFormat,
    pub sample_count: u32,
}

impl GraphicsPipelineDesc<'_> {
    pub fn shaders(&self) -> impl Iterator<Item = &ShaderBlob> {
        std::iter::once(self.vertex)
            .chain(self.pixel)
            .chain(self.geometry)
            .chain(self.hull)
            .chain(self.domain)
    }
}

pub struct ComputePipelineDesc<'a> {
    pub name: &'a str,
    pub compute: &'a ShaderBlob,
}

fn check_stage(blob: &ShaderBlob, expected: ShaderType) -> RhiResult<()> {
    if blob.shader_type() != expected {
        return Err(RhiError::ShaderStageMismatch {
            expected,
            actual: blob.shader_type(),
        });
    }
    Ok(())
}

pub struct GraphicsPipelineState<B: Backend> {
    name: String,
    layout: Rc<B::ResourceLayout>,
    input_assembly: InputAssemblyState,
    rasterizer: RasterizerState,
    depth_stencil: DepthStencilState,
    blend: BlendState,
    shaders: [Option<ShaderBlob>; 5],
    render_target_formats: SmallVec<[PixelFormat; MAX_RENDER_TARGETS]>,
    depth_stencil_format: PixelFormat,
    sample_count: u32,
    pipeline: Option<B::GraphicsPipeline>,
}

impl<B: Backend> GraphicsPipelineState<B> {
    pub fn new(layout: Rc<B::ResourceLayout>) -> Self {
        Self {
            name: String::new(),
            layout,
            input_assembly: InputAssemblyState::default(),
            rasterizer: RasterizerState::default(),
            depth_stencil: DepthStencilState::default(),
            blend: BlendState::default(),
            shaders: Default::default(),
            render_target_formats: SmallVec::new(),
            depth_stencil_format: PixelFormat::Unknown,
            sample_count: 1,
            pipeline: None,
        }
    }

    fn ensure_mutable(&self) -> RhiResult<()> {
        if self.pipeline.is_some() {
            return Err(RhiError::PipelineStateAlreadyCompleted);
        }
        Ok(())
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> RhiResult<()> {
        self.ensure_mutable()?;
        self.name = name.into();
        Ok(())
    }

    pub fn set_input_assembly_state(&mut self, state: InputAssemblyState) -> RhiResult<()> {
        self.ensure_mutable()?;
        self.input_assembly = state;
        Ok(())
    }

    pub fn set_rasterizer_state(&mut self, state: RasterizerState) -> RhiResult<()> {
        self.ensure_mutable()?;
        self.rasterizer = state;
        Ok(())
    }

    pub fn set_depth_stencil_state(&mut self, state: DepthStencilState) -> RhiResult<()> {
        self.ensure_mutable()?;
        self.depth_stencil = state;
        Ok(())
    }

    pub fn set_blend_state(&mut self, state: BlendState) -> RhiResult<()> {
        self.ensure_mutable()?;
        self.blend = state;
        Ok(())
    }

    fn set_stage(&mut self, blob: ShaderBlob, expected: ShaderType) -> RhiResult<()> {
        self.ensure_mutable()?;
        check_stage(&blob, expected)?;
        if let Some(slot) = expected.graphics_slot() {
            self.shaders[slot] = Some(blob);
        }
        Ok(())
    }

    pub fn set_vertex_shader(&mut self, blob: ShaderBlob) -> RhiResult<()> {
        self.set_stage(blob, ShaderType::Vertex)
    }

    pub fn set_pixel_shader(&mut self, blob: ShaderBlob) -> RhiResult<()> {
        self.set_stage(blob, ShaderType::Pixel)
    }

    pub fn set_geometry_shader(&mut self, blob: ShaderBlob) -> RhiResult<()> {
        self.set_stage(blob, ShaderType::Geometry)
    }

    pub fn set_hull_shader(&mut self, blob: ShaderBlob) -> RhiResult<()> {
        self.set_stage(blob, ShaderType::Hull)
    }

    pub fn set_domain_shader(&mut self, blob: ShaderBlob) -> RhiResult<()> {
        self.set_stage(blob, ShaderType::Domain)
    }

    /// Take render target and depth formats from the pass the pipeline renders in.
    pub fn set_render_pass(&mut self, render_pass: &B::RenderPass) -> RhiResult<()> {
        self.ensure_mutable()?;
        let desc = render_pass.desc();
        self.render_target_formats = desc.color_formats();
        self.depth_stencil_format = desc.depth_format();
        Ok(())
    }

    pub fn set_render_target_formats(&mut self, formats: &[PixelFormat], depth_stencil: PixelFormat) -> RhiResult<()> {
        self.ensure_mutable()?;
        self.render_target_formats = SmallVec::from_slice(formats);
        self.depth_stencil_format = depth_stencil;
        Ok(())
    }

    pub fn set_sample_count(&mut self, count: u32) -> RhiResult<()> {
        self.ensure_mutable()?;
        self.sample_count = count.max(1);
        Ok(())
    }

    #[profiling::function]
    pub fn complete_setting(&mut self, device: &B::Device) -> RhiResult<()> {
        self.ensure_mutable()?;

        let [vertex, pixel, geometry, hull, domain] = &self.shaders;
        let vertex = vertex.as_ref().ok_or(RhiError::MissingShader(ShaderType::Vertex))?;

        let capabilities = device.capabilities();
        if geometry.is_some() && !capabilities.geometry_shader {
            return Err(RhiError::Unsupported("geometry shaders"));
        }
        if (hull.is_some() || domain.is_some()) && !capabilities.tessellation {
            return Err(RhiError::Unsupported("tessellation"));
        }
        if hull.is_some() != domain.is_some() {
            return Err(RhiError::MissingShader(if hull.is_some() { ShaderType::Domain } else { ShaderType::Hull }));
        }

        let desc = GraphicsPipelineDesc {
            name: &self.name,
            input_assembly: &self.input_assembly,
            rasterizer: &self.rasterizer,
            depth_stencil: &self.depth_stencil,
            blend: &self.blend,
            vertex,
            pixel: pixel.as_ref(),
            geometry: geometry.as_ref(),
            hull: hull.as_ref(),
            domain: domain.as_ref(),
            render_target_formats: &self.render_target_formats,
            depth_stencil_format: self.depth_stencil_format,
            sample_count: self.sample_count,
        };

        let pipeline = device.create_graphics_pipeline(&self.layout, &desc)?;
        log::debug!("Graphics pipeline `{}` completed", self.name);
        self.pipeline = Some(pipeline);
        Ok(())
    }

    #[inline]
    pub fn is_completed(&self) -> bool {
        self.pipeline.is_some()
    }

    pub fn pipeline(&self) -> RhiResult<&B::GraphicsPipeline> {
        self.pipeline.as_ref().ok_or(RhiError::PipelineStateIncomplete)
    }

    #[inline]
    pub fn layout(&self) -> &Rc<B::ResourceLayout> {
        &self.layout
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn input_assembly_state(&self) -> &InputAssemblyState {
        &self.input_assembly
    }

    #[inline]
    pub fn render_target_formats(&self) -> &[PixelFormat] {
        &self.render_target_formats
    }

    #[inline]
    pub fn depth_stencil_format(&self) -> PixelFormat {
        self.depth_stencil_format
    }
}

pub struct ComputePipelineState<B: Backend> {
    name: String,
    layout: Rc<B::ResourceLayout>,
    compute: Option<ShaderBlob>,
    pipeline: Option<B::ComputePipeline>,
}

impl<B: Backend> ComputePipelineState<B> {
    pub fn new(layout: Rc<B::ResourceLayout>) -> Self {
        Self {
            name: String::new(),
            layout,
            compute: None,
            pipeline: None,
        }
    }

    fn ensure_mutable(&self) -> RhiResult<()> {
        if self.pipeline.is_some() {
            return Err(RhiError::PipelineStateAlreadyCompleted);
        }
        Ok(())
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> RhiResult<()> {
        self.ensure_mutable()?;
        self.name = name.into();
        Ok(())
    }

    pub fn set_compute_shader(&mut self, blob: ShaderBlob) -> RhiResult<()> {
        self.ensure_mutable()?;
        check_stage(&blob, ShaderType::Compute)?;
        self.compute = Some(blob);
        Ok(())
    }

    #[profiling::function]
    pub fn complete_setting(&mut self, device: &B::Device) -> RhiResult<()> {
        self.ensure_mutable()?;
        let compute = self.compute.as_ref().ok_or(RhiError::MissingShader(ShaderType::Compute))?;
        let desc = ComputePipelineDesc {
            name: &self.name,
            compute,
        };
        let pipeline = device.create_compute_pipeline(&self.layout, &desc)?;
        log::debug!("Compute pipeline `{}` completed", self.name);
        self.pipeline = Some(pipeline);
        Ok(())
    }

    #[inline]
    pub fn is_completed(&self) -> bool {
        self.pipeline.is_some()
    }

    pub fn pipeline(&self) -> RhiResult<&B::ComputePipeline> {
        self.pipeline.as_ref().ok_or(RhiError::PipelineStateIncomplete)
    }

    #[inline]
    pub fn layout(&self) -> &Rc<B::ResourceLayout> {
        &self.layout
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::ColorMask;

    #[test]
    fn alpha_blend_applies_to_every_target() {
        let factory = PipelineFactory::new(DeviceCapabilities::default());
        let blend = factory.create_alpha_blend_state();
        assert!(blend.target(5).enable);
        assert_eq!(blend.target(5).src_color, BlendFactor::SrcAlpha);

        let depth_only = factory.create_no_color_blend_state();
        assert!(depth_only.target(0).write_mask.is_empty());
        assert_eq!(factory.color_mask(ColorMask::Red | ColorMask::Alpha).bits(), 0b1001);
    }

    #[test]
    fn independent_blend_reads_own_target() {
        let mut blend = BlendState {
            independent_blend: true,
            ..Default::default()
        };
        blend.targets[2].enable = true;
        assert!(blend.target(2).enable);
        assert!(!blend.target(0).enable);
        blend.independent_blend = false;
        assert!(!blend.target(2).enable);
    }
}
