use prism_rhi::{
    AttachmentDesc, Backend, ClearValue, CommandListType, CompareOp, CullMode, Extent2D, FillMode,
    GpuTextureMetaData, GraphicsPipelineState, PixelFormat, PrimitiveTopology, RenderPassDesc,
    ResourceLayoutDesc, ResourceLayoutElement, ResourceState, ResourceViewDesc, RhiCommandList, RhiDevice,
    SamplerDesc, SamplerLayoutElement, ScissorRect, ShaderType, ShaderVisibility, Viewport,
};
use crate::engine::{FrameRecorder, LowLevelGraphicsEngine, DEPTH_FORMAT};
use crate::error::RenderResult;
use crate::model::SkinnedVertex;
use crate::passes::{bind_model, ModelList, PerFrame};
use crate::registry::{FrameBufferHandle, GpuRegistry, LayoutHandle, ModelHandle, RenderPassHandle, TextureHandle, ViewHandle};
use crate::scene::SceneBuffers;
use crate::shader::ShaderLibrary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GBufferType {
    Albedo,
    Normal,
    Specular,
}

impl GBufferType {
    pub const COUNT: usize = 3;
    pub const ALL: [GBufferType; Self::COUNT] = [GBufferType::Albedo, GBufferType::Normal, GBufferType::Specular];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn format(self) -> PixelFormat {
        match self {
            GBufferType::Albedo => PixelFormat::R8G8B8A8Unorm,
            GBufferType::Normal => PixelFormat::R16G16B16A16Float,
            GBufferType::Specular => PixelFormat::R8G8B8A8Unorm,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            GBufferType::Albedo => "albedo",
            GBufferType::Normal => "normal",
            GBufferType::Specular => "specular",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct GBufferTarget {
    textures: [TextureHandle; GBufferType::COUNT],
    render_views: [ViewHandle; GBufferType::COUNT],
    shader_views: [ViewHandle; GBufferType::COUNT],
    depth: TextureHandle,
    depth_view: ViewHandle,
    frame_buffer: FrameBufferHandle,
}

/// Multiple render target pass writing surface attributes of every active model.
pub struct GBuffer<B: Backend> {
    layout: LayoutHandle,
    pipeline: GraphicsPipelineState<B>,
    render_pass: RenderPassHandle,
    targets: PerFrame<GBufferTarget>,
    extent: Extent2D,
    models: ModelList,
}

impl<B: Backend> GBuffer<B> {
    pub const NAME: &'static str = "gbuffer";

    #[profiling::function]
    pub fn new(engine: &mut LowLevelGraphicsEngine<B>, shaders: &mut ShaderLibrary) -> RenderResult<Self> {
        let extent = engine.extent();
        let frame_count = engine.frame_buffer_count();
        let (device, registry) = engine.device_and_registry();

        let layout = registry.create_layout(
            device,
            &ResourceLayoutDesc::graphics(Self::NAME)
                .with_element(ResourceLayoutElement::constant_buffer(0, 0, ShaderVisibility::All))
                .with_element(ResourceLayoutElement::constant_buffer(1, 0, ShaderVisibility::Vertex))
                .with_element(ResourceLayoutElement::constant_buffer(2, 0, ShaderVisibility::Pixel))
                .with_element(ResourceLayoutElement::texture(0, 0, ShaderVisibility::Pixel))
                .with_element(ResourceLayoutElement::texture(1, 0, ShaderVisibility::Pixel))
                .with_element(ResourceLayoutElement::texture(2, 0, ShaderVisibility::Pixel))
                .with_sampler(SamplerLayoutElement::new(SamplerDesc::linear_wrap(), 0, 0, ShaderVisibility::Pixel)),
        )?;

        let mut pass_desc = RenderPassDesc::new(Self::NAME);
        for target in GBufferType::ALL {
            pass_desc = pass_desc.with_color(
                AttachmentDesc::color(target.format())
                    .with_states(ResourceState::ShaderResource, ResourceState::ShaderResource),
            );
        }
        let render_pass = registry.create_render_pass(device, &pass_desc.with_depth(AttachmentDesc::depth(DEPTH_FORMAT)))?;

        let factory = device.create_pipeline_factory();
        let mut pipeline = device.create_graphics_pipeline_state(registry.layout(layout)?.clone());
        pipeline.set_name(Self::NAME)?;
        pipeline.set_input_assembly_state(factory.create_input_assembly_state::<SkinnedVertex>(PrimitiveTopology::TriangleList))?;
        pipeline.set_rasterizer_state(factory.create_rasterizer_state(CullMode::Back, FillMode::Solid))?;
        pipeline.set_depth_stencil_state(factory.create_depth_stencil_state(true, true, CompareOp::LessEqual))?;
        pipeline.set_blend_state(factory.create_opaque_blend_state())?;
        pipeline.set_vertex_shader(shaders.load::<B>(device, ShaderType::Vertex, "gbuffer.hlsl", "VSMain")?)?;
        pipeline.set_pixel_shader(shaders.load::<B>(device, ShaderType::Pixel, "gbuffer.hlsl", "PSMain")?)?;
        pipeline.set_render_pass(registry.render_pass(render_pass)?)?;
        pipeline.complete_setting(device)?;

        let targets = Self::create_targets(device, registry, render_pass, frame_count, extent)?;

        Ok(Self {
            layout,
            pipeline,
            render_pass,
            targets,
            extent,
            models: ModelList::new(),
        })
    }

    fn create_targets(
        device: &B::Device,
        registry: &mut GpuRegistry<B>,
        render_pass: RenderPassHandle,
        frame_count: u32,
        extent: Extent2D,
    ) -> RenderResult<PerFrame<GBufferTarget>> {
        let mut targets = PerFrame::new();
        for frame in 0..frame_count {
            let mut textures = [TextureHandle::default(); GBufferType::COUNT];
            let mut render_views = [ViewHandle::default(); GBufferType::COUNT];
            let mut shader_views = [ViewHandle::default(); GBufferType::COUNT];
            for target in GBufferType::ALL {
                let texture = registry.create_texture(
                    device,
                    &GpuTextureMetaData::render_target(
                        format!("{} {} {frame}", Self::NAME, target.name()),
                        extent.width,
                        extent.height,
                        target.format(),
                    ),
                )?;
                textures[target.index()] = texture;
                render_views[target.index()] = registry.create_texture_view(device, texture, &ResourceViewDesc::render_target())?;
                shader_views[target.index()] = registry.create_texture_view(device, texture, &ResourceViewDesc::shader_resource())?;
            }

            let depth = registry.create_texture(
                device,
                &GpuTextureMetaData::depth_stencil(format!("{} depth {frame}", Self::NAME), extent.width, extent.height, DEPTH_FORMAT),
            )?;
            let depth_view = registry.create_texture_view(device, depth, &ResourceViewDesc::depth_stencil())?;
            let frame_buffer = registry.create_frame_buffer(device, render_pass, &render_views, Some(depth_view), extent)?;

            targets.push(GBufferTarget {
                textures,
                render_views,
                shader_views,
                depth,
                depth_view,
                frame_buffer,
            });
        }
        Ok(targets)
    }

    fn release_targets(&mut self, registry: &mut GpuRegistry<B>) {
        for target in self.targets.drain(..) {
            registry.remove_frame_buffer(target.frame_buffer);
            registry.remove_view(target.depth_view);
            registry.remove_texture(target.depth);
            for view in target.render_views.into_iter().chain(target.shader_views) {
                registry.remove_view(view);
            }
            for texture in target.textures {
                registry.remove_texture(texture);
            }
        }
    }

    /// Recreate every target at `extent`. Returns `false` when the size is unchanged.
    #[profiling::function]
    pub fn resize(&mut self, engine: &mut LowLevelGraphicsEngine<B>, extent: Extent2D) -> RenderResult<bool> {
        if self.extent == extent {
            return Ok(false);
        }
        engine.wait_idle()?;

        let frame_count = engine.frame_buffer_count();
        let (device, registry) = engine.device_and_registry();
        self.release_targets(registry);
        self.targets = Self::create_targets(device, registry, self.render_pass, frame_count, extent)?;
        self.extent = extent;
        Ok(true)
    }

    pub fn add(&mut self, model: ModelHandle) -> bool {
        self.models.add(model)
    }

    pub fn clear_model(&mut self, model: ModelHandle) -> bool {
        self.models.remove(model)
    }

    pub fn clear(&mut self) {
        self.models.clear();
    }

    #[inline]
    pub fn models(&self) -> &ModelList {
        &self.models
    }

    #[inline]
    pub fn extent(&self) -> Extent2D {
        self.extent
    }

    /// Sampled view of `target` written in frame slot `frame_index`.
    #[inline]
    pub fn view(&self, target: GBufferType, frame_index: u32) -> ViewHandle {
        self.targets[frame_index as usize].shader_views[target.index()]
    }

    #[inline]
    pub fn texture(&self, target: GBufferType, frame_index: u32) -> TextureHandle {
        self.targets[frame_index as usize].textures[target.index()]
    }

    #[profiling::function]
    pub fn draw(&self, engine: &mut LowLevelGraphicsEngine<B>, scene: &SceneBuffers) -> RenderResult<()> {
        let FrameRecorder {
            list,
            registry,
            frame_index,
        } = engine.recorder(CommandListType::Graphics)?;
        let target = &self.targets[frame_index as usize];
        let layout = registry.layout(self.layout)?;

        list.begin_render_pass(
            registry.render_pass(self.render_pass)?,
            registry.frame_buffer(target.frame_buffer)?,
            &[ClearValue::BLACK, ClearValue::BLACK, ClearValue::BLACK, ClearValue::DEPTH_ONE],
        )?;
        list.set_viewport(&Viewport::from_extent(self.extent))?;
        list.set_scissor(&ScissorRect::from_extent(self.extent))?;
        list.set_graphics_pipeline(&self.pipeline)?;

        let scene_view = scene.scene_view(frame_index);
        for model in self.models.drawable(registry) {
            bind_model(list, registry, model, frame_index)?;
            let object_view = model.object_view(frame_index);
            for mesh in model.meshes() {
                let material = &model.materials()[mesh.material];
                let views = registry.views(&[
                    scene_view,
                    object_view,
                    material.constants_view,
                    material.diffuse,
                    material.specular,
                    material.normal,
                ])?;
                list.bind_graphics_resources(layout, &views)?;
                list.draw_indexed_instanced(mesh.index_count, 1, mesh.first_index, mesh.base_vertex, 0)?;
            }
        }

        list.end_render_pass()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_are_indexed_in_declaration_order() {
        for (index, target) in GBufferType::ALL.into_iter().enumerate() {
            assert_eq!(target.index(), index);
        }
        assert_eq!(GBufferType::Normal.format(), PixelFormat::R16G16B16A16Float);
    }
}
