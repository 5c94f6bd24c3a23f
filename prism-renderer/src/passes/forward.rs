use prism_rhi::{
    Backend, CommandListType, CompareOp, CullMode, FillMode, GraphicsPipelineState, PrimitiveTopology,
    PushConstantRange, ResourceLayoutDesc, ResourceLayoutElement, RhiCommandList, RhiDevice, SamplerDesc,
    SamplerLayoutElement, ShaderType, ShaderVisibility,
};
use crate::engine::{FrameRecorder, LowLevelGraphicsEngine};
use crate::error::{RenderError, RenderResult};
use crate::model::SkinnedVertex;
use crate::passes::{bind_model, CullingLightType, LightCulling, ModelList, TILE_CONSTANT_COUNT};
use crate::registry::{LayoutHandle, ModelHandle};
use crate::scene::SceneBuffers;
use crate::shader::ShaderLibrary;

/// Lighting pass drawn into the swapchain render pass of the engine. Shades every active model
/// with the lights light culling assigned to its screen tile.
pub struct ForwardPass<B: Backend> {
    layout: LayoutHandle,
    pipeline: GraphicsPipelineState<B>,
    models: ModelList,
}

impl<B: Backend> ForwardPass<B> {
    pub const NAME: &'static str = "forward";

    #[profiling::function]
    pub fn new(engine: &mut LowLevelGraphicsEngine<B>, shaders: &mut ShaderLibrary) -> RenderResult<Self> {
        let (device, registry) = engine.device_and_registry();
        let mut desc = ResourceLayoutDesc::graphics(Self::NAME)
            .with_element(ResourceLayoutElement::constant_buffer(0, 0, ShaderVisibility::All))
            .with_element(ResourceLayoutElement::constant_buffer(1, 0, ShaderVisibility::Pixel))
            .with_element(ResourceLayoutElement::constant_buffer(2, 0, ShaderVisibility::Vertex))
            .with_element(ResourceLayoutElement::constant_buffer(3, 0, ShaderVisibility::Pixel))
            .with_element(ResourceLayoutElement::texture(0, 0, ShaderVisibility::Pixel))
            .with_element(ResourceLayoutElement::texture(1, 0, ShaderVisibility::Pixel))
            .with_element(ResourceLayoutElement::texture(2, 0, ShaderVisibility::Pixel));
        for light_type in CullingLightType::ALL {
            desc = desc.with_element(ResourceLayoutElement::structured_buffer(
                3 + light_type.index() as u32,
                0,
                ShaderVisibility::Pixel,
            ));
        }
        let layout = registry.create_layout(
            device,
            &desc
                .with_sampler(SamplerLayoutElement::new(SamplerDesc::linear_wrap(), 0, 0, ShaderVisibility::Pixel))
                .with_constants(PushConstantRange {
                    shader_register: 4,
                    register_space: 0,
                    visibility: ShaderVisibility::Pixel,
                    count: TILE_CONSTANT_COUNT as u32,
                }),
        )?;

        let layout_object = registry.layout(layout)?.clone();
        let device = engine.device();
        let factory = device.create_pipeline_factory();
        let mut pipeline = device.create_graphics_pipeline_state(layout_object);
        pipeline.set_name(Self::NAME)?;
        pipeline.set_input_assembly_state(factory.create_input_assembly_state::<SkinnedVertex>(PrimitiveTopology::TriangleList))?;
        pipeline.set_rasterizer_state(factory.create_rasterizer_state(CullMode::Back, FillMode::Solid))?;
        pipeline.set_depth_stencil_state(factory.create_depth_stencil_state(true, true, CompareOp::Less))?;
        pipeline.set_blend_state(factory.create_opaque_blend_state())?;
        pipeline.set_vertex_shader(shaders.load::<B>(device, ShaderType::Vertex, "forward.hlsl", "VSMain")?)?;
        pipeline.set_pixel_shader(shaders.load::<B>(device, ShaderType::Pixel, "forward.hlsl", "PSMain")?)?;
        pipeline.set_render_pass(engine.default_render_pass())?;
        pipeline.complete_setting(device)?;

        Ok(Self {
            layout,
            pipeline,
            models: ModelList::new(),
        })
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

    /// Draw every active model with its full material. Must be recorded inside the engine's
    /// swapchain render pass, with the light index buffers readable.
    #[profiling::function]
    pub fn draw(
        &self,
        engine: &mut LowLevelGraphicsEngine<B>,
        scene: &SceneBuffers,
        light_culling: &LightCulling<B>,
    ) -> RenderResult<()> {
        let constants = light_culling.tile_constants()?;
        let index_view = |light_type| {
            light_culling
                .index_view(light_type)
                .ok_or(RenderError::Unprepared("light index buffers"))
        };
        let point_indices = index_view(CullingLightType::Point)?;
        let spot_indices = index_view(CullingLightType::Spot)?;

        let FrameRecorder {
            list,
            registry,
            frame_index,
        } = engine.recorder(CommandListType::Graphics)?;
        let layout = registry.layout(self.layout)?;

        list.set_graphics_pipeline(&self.pipeline)?;
        list.push_graphics_constants(layout, &constants)?;

        let scene_view = scene.scene_view(frame_index);
        let light_view = scene.light_view(frame_index);
        for model in self.models.drawable(registry) {
            bind_model(list, registry, model, frame_index)?;
            let object_view = model.object_view(frame_index);
            for mesh in model.meshes() {
                let material = &model.materials()[mesh.material];
                let views = registry.views(&[
                    scene_view,
                    light_view,
                    object_view,
                    material.constants_view,
                    material.diffuse,
                    material.specular,
                    material.normal,
                    point_indices,
                    spot_indices,
                ])?;
                list.bind_graphics_resources(layout, &views)?;
                list.draw_indexed_instanced(mesh.index_count, 1, mesh.first_index, mesh.base_vertex, 0)?;
            }
        }
        Ok(())
    }
}
