//! The universal render pipeline: z prepass, tile light culling on the compute queue, gbuffer
//! and forward shading into the swapchain.

use prism_core::log::info;
use prism_rhi::{Backend, CommandListType, Extent2D, ResourceState};
use crate::engine::LowLevelGraphicsEngine;
use crate::error::RenderResult;
use crate::passes::{ForwardPass, GBuffer, LightCulling, ZPrepass};
use crate::registry::ModelHandle;
use crate::scene::{SceneBuffers, SceneView};
use crate::shader::ShaderLibrary;

pub struct UniversalRenderPipeline<B: Backend> {
    zprepass: ZPrepass<B>,
    gbuffer: GBuffer<B>,
    light_culling: LightCulling<B>,
    forward: ForwardPass<B>,
    scene: SceneBuffers,
    shaders: ShaderLibrary,
    clear_color: [f32; 4],
}

impl<B: Backend> UniversalRenderPipeline<B> {
    pub const DEFAULT_CLEAR_COLOR: [f32; 4] = [0.1, 0.1, 0.15, 1.0];

    #[profiling::function]
    pub fn new(engine: &mut LowLevelGraphicsEngine<B>, mut shaders: ShaderLibrary) -> RenderResult<Self> {
        let scene = SceneBuffers::new(engine)?;
        let zprepass = ZPrepass::new(engine, &mut shaders)?;
        let gbuffer = GBuffer::new(engine, &mut shaders)?;
        let light_culling = LightCulling::new(engine, &mut shaders, &zprepass)?;
        let forward = ForwardPass::new(engine, &mut shaders)?;

        info!("Universal render pipeline ready, {} shaders compiled", shaders.len());
        Ok(Self {
            zprepass,
            gbuffer,
            light_culling,
            forward,
            scene,
            shaders,
            clear_color: Self::DEFAULT_CLEAR_COLOR,
        })
    }

    /// Draw `model` in every pass. Returns `false` when it was already added.
    pub fn add(&mut self, model: ModelHandle) -> bool {
        let added = self.zprepass.add(model);
        self.gbuffer.add(model);
        self.forward.add(model);
        added
    }

    pub fn clear_model(&mut self, model: ModelHandle) -> bool {
        let removed = self.zprepass.clear_model(model);
        self.gbuffer.clear_model(model);
        self.forward.clear_model(model);
        removed
    }

    pub fn clear(&mut self) {
        self.zprepass.clear();
        self.gbuffer.clear();
        self.forward.clear();
    }

    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    #[inline]
    pub fn zprepass(&self) -> &ZPrepass<B> {
        &self.zprepass
    }

    #[inline]
    pub fn gbuffer(&self) -> &GBuffer<B> {
        &self.gbuffer
    }

    #[inline]
    pub fn light_culling(&self) -> &LightCulling<B> {
        &self.light_culling
    }

    #[inline]
    pub fn forward(&self) -> &ForwardPass<B> {
        &self.forward
    }

    #[inline]
    pub fn shaders(&self) -> &ShaderLibrary {
        &self.shaders
    }

    /// Resize the swapchain and every screen sized target. Returns `false` when nothing changed.
    #[profiling::function]
    pub fn resize(&mut self, engine: &mut LowLevelGraphicsEngine<B>, width: u32, height: u32) -> RenderResult<bool> {
        let swapchain_resized = engine.resize(width, height)?;
        let extent = Extent2D::new(width, height);
        let zprepass_resized = self.zprepass.resize(engine, extent)?;
        let gbuffer_resized = self.gbuffer.resize(engine, extent)?;
        if zprepass_resized {
            self.light_culling.set_depth_input(&self.zprepass);
        }
        Ok(swapchain_resized || zprepass_resized || gbuffer_resized)
    }

    /// Record the whole frame between `begin_draw_frame` and `end_draw_frame`.
    ///
    /// Depth is flushed on its own so culling on the compute queue only waits for the z prepass.
    /// The gbuffer and forward pass share the graphics list submitted at `end_draw_frame`, which
    /// the graphics queue holds back until culling signalled.
    #[profiling::function]
    pub fn draw(&mut self, engine: &mut LowLevelGraphicsEngine<B>, scene: &SceneView) -> RenderResult<()> {
        self.scene.upload(engine.registry(), engine.current_frame_index(), scene)?;
        self.light_culling
            .prepare_buffer(engine, scene.point_light_count().max(1), scene.spot_light_count().max(1))?;

        self.zprepass.draw(engine, &self.scene)?;
        let depth_written = engine.flush_gpu_commands(CommandListType::Graphics, true)?;

        engine.wait_queue_for(CommandListType::Compute, CommandListType::Graphics, depth_written)?;
        self.light_culling.draw(engine, &self.scene)?;
        let lights_culled = engine.flush_gpu_commands(CommandListType::Compute, false)?;
        engine.wait_queue_for(CommandListType::Graphics, CommandListType::Compute, lights_culled)?;

        self.gbuffer.draw(engine, &self.scene)?;

        {
            let recorder = engine.recorder(CommandListType::Graphics)?;
            self.light_culling.transition_indices(
                recorder.list,
                recorder.registry,
                ResourceState::UnorderedAccess,
                ResourceState::ShaderResource,
            )?;
        }
        engine.begin_swapchain_render_pass(self.clear_color)?;
        self.forward.draw(engine, &self.scene, &self.light_culling)?;
        engine.end_swapchain_render_pass()?;

        let recorder = engine.recorder(CommandListType::Graphics)?;
        self.light_culling.transition_indices(
            recorder.list,
            recorder.registry,
            ResourceState::ShaderResource,
            ResourceState::UnorderedAccess,
        )
    }
}
