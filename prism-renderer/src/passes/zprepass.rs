use prism_rhi::{
    AttachmentDesc, Backend, ClearValue, CommandListType, CompareOp, CullMode, Extent2D, FillMode,
    GpuTextureMetaData, GraphicsPipelineState, PrimitiveTopology, RenderPassDesc, ResourceLayoutDesc,
    ResourceLayoutElement, ResourceState, ResourceViewDesc, RhiCommandList, RhiDevice, ScissorRect,
    ShaderType, ShaderVisibility, Viewport,
};
use crate::engine::{FrameRecorder, LowLevelGraphicsEngine, DEPTH_FORMAT};
use crate::error::RenderResult;
use crate::model::SkinnedVertex;
use crate::passes::{bind_model, ModelList, PerFrame};
use crate::registry::{FrameBufferHandle, GpuRegistry, LayoutHandle, ModelHandle, RenderPassHandle, TextureHandle, ViewHandle};
use crate::scene::SceneBuffers;
use crate::shader::ShaderLibrary;

#[derive(Debug, Clone, Copy)]
struct DepthTarget {
    texture: TextureHandle,
    depth_view: ViewHandle,
    shader_view: ViewHandle,
    frame_buffer: FrameBufferHandle,
}

/// Depth only pass. Its depth textures stay in shader resource state between frames and are
/// sampled by the light culling and shading passes.
pub struct ZPrepass<B: Backend> {
    layout: LayoutHandle,
    pipeline: GraphicsPipelineState<B>,
    render_pass: RenderPassHandle,
    targets: PerFrame<DepthTarget>,
    extent: Extent2D,
    models: ModelList,
}

impl<B: Backend> ZPrepass<B> {
    pub const NAME: &'static str = "z prepass";

    #[profiling::function]
    pub fn new(engine: &mut LowLevelGraphicsEngine<B>, shaders: &mut ShaderLibrary) -> RenderResult<Self> {
        let extent = engine.extent();
        let frame_count = engine.frame_buffer_count();
        let (device, registry) = engine.device_and_registry();

        let layout = registry.create_layout(
            device,
            &ResourceLayoutDesc::graphics(Self::NAME)
                .with_element(ResourceLayoutElement::constant_buffer(0, 0, ShaderVisibility::Vertex))
                .with_element(ResourceLayoutElement::constant_buffer(1, 0, ShaderVisibility::Vertex)),
        )?;
        let render_pass = registry.create_render_pass(
            device,
            &RenderPassDesc::new(Self::NAME).with_depth(
                AttachmentDesc::depth(DEPTH_FORMAT)
                    .with_states(ResourceState::ShaderResource, ResourceState::ShaderResource),
            ),
        )?;

        let factory = device.create_pipeline_factory();
        let mut pipeline = device.create_graphics_pipeline_state(registry.layout(layout)?.clone());
        pipeline.set_name(Self::NAME)?;
        pipeline.set_input_assembly_state(factory.create_input_assembly_state::<SkinnedVertex>(PrimitiveTopology::TriangleList))?;
        pipeline.set_rasterizer_state(factory.create_rasterizer_state(CullMode::Back, FillMode::Solid))?;
        pipeline.set_depth_stencil_state(factory.create_depth_stencil_state(true, true, CompareOp::Less))?;
        pipeline.set_blend_state(factory.create_no_color_blend_state())?;
        pipeline.set_vertex_shader(shaders.load::<B>(device, ShaderType::Vertex, "zprepass.hlsl", "VSMain")?)?;
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
    ) -> RenderResult<PerFrame<DepthTarget>> {
        (0..frame_count)
            .map(|frame| {
                let mut meta = GpuTextureMetaData::depth_stencil(
                    format!("{} depth {frame}", Self::NAME),
                    extent.width,
                    extent.height,
                    DEPTH_FORMAT,
                );
                meta.initial_state = ResourceState::ShaderResource;

                let texture = registry.create_texture(device, &meta)?;
                let depth_view = registry.create_texture_view(device, texture, &ResourceViewDesc::depth_stencil())?;
                let shader_view = registry.create_texture_view(device, texture, &ResourceViewDesc::shader_resource())?;
                let frame_buffer = registry.create_frame_buffer(device, render_pass, &[], Some(depth_view), extent)?;
                Ok(DepthTarget {
                    texture,
                    depth_view,
                    shader_view,
                    frame_buffer,
                })
            })
            .collect()
    }

    fn release_targets(&mut self, registry: &mut GpuRegistry<B>) {
        for target in self.targets.drain(..) {
            registry.remove_frame_buffer(target.frame_buffer);
            registry.remove_view(target.depth_view);
            registry.remove_view(target.shader_view);
            registry.remove_texture(target.texture);
        }
    }

    /// Recreate the depth targets at `extent`. Returns `false` when the size is unchanged.
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

    /// Returns `false` when the model was already drawn by this pass.
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

    /// Sampled depth of frame slot `frame_index`.
    #[inline]
    pub fn depth_view(&self, frame_index: u32) -> ViewHandle {
        self.targets[frame_index as usize].shader_view
    }

    #[inline]
    pub fn depth_texture(&self, frame_index: u32) -> TextureHandle {
        self.targets[frame_index as usize].texture
    }

    /// Shader views of every frame slot, in slot order.
    pub fn depth_views(&self) -> PerFrame<ViewHandle> {
        self.targets.iter().map(|target| target.shader_view).collect()
    }

    /// Record depth of every active model into the current frame's target.
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
            &[ClearValue::DEPTH_ONE],
        )?;
        list.set_viewport(&Viewport::from_extent(self.extent))?;
        list.set_scissor(&ScissorRect::from_extent(self.extent))?;
        list.set_graphics_pipeline(&self.pipeline)?;

        for model in self.models.drawable(registry) {
            bind_model(list, registry, model, frame_index)?;
            list.bind_graphics_resources(
                layout,
                &registry.views(&[scene.scene_view(frame_index), model.object_view(frame_index)])?,
            )?;
            for mesh in model.meshes() {
                list.draw_indexed_instanced(mesh.index_count, 1, mesh.first_index, mesh.base_vertex, 0)?;
            }
        }

        list.end_render_pass()?;
        Ok(())
    }
}
