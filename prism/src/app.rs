use winit::event::{DeviceEvent, WindowEvent};
use winit::window::Window;
use prism_core::cli::EngineArgs;
use prism_core::config::EngineConfig;
use prism_renderer::{LowLevelGraphicsEngine, ModelDesc, ModelHandle, RenderResult, SceneView, UniversalRenderPipeline};
use prism_rhi::{Backend, Extent2D};

pub trait App: Sized + 'static {
    fn new(args: &EngineArgs, config: &EngineConfig) -> anyhow::Result<Self>;
    fn on_window_event(&mut self, _event: &WindowEvent, _window: &Window) {}
    fn on_device_event(&mut self, _event: &DeviceEvent) {}
    fn tick(&mut self, _delta_time: f32) {}
}

/// Everything an app touches between two frames.
pub struct RenderContext<'a, B: Backend> {
    graphics: &'a mut LowLevelGraphicsEngine<B>,
    pipeline: &'a mut UniversalRenderPipeline<B>,
    scene: &'a mut SceneView,
    exit_requested: &'a mut bool,
}

impl<'a, B: Backend> RenderContext<'a, B> {
    pub(crate) fn new(
        graphics: &'a mut LowLevelGraphicsEngine<B>,
        pipeline: &'a mut UniversalRenderPipeline<B>,
        scene: &'a mut SceneView,
        exit_requested: &'a mut bool,
    ) -> Self {
        Self {
            graphics,
            pipeline,
            scene,
            exit_requested,
        }
    }

    #[inline]
    pub fn graphics(&mut self) -> &mut LowLevelGraphicsEngine<B> { self.graphics }

    #[inline]
    pub fn pipeline(&mut self) -> &mut UniversalRenderPipeline<B> { self.pipeline }

    #[inline]
    pub fn scene(&mut self) -> &mut SceneView { self.scene }

    #[inline]
    pub fn extent(&self) -> Extent2D { self.graphics.extent() }

    #[inline]
    pub fn frame_number(&self) -> u64 { self.graphics.frame_number() }

    /// Upload a model and draw it in every pass of the pipeline.
    pub fn spawn_model(&mut self, desc: &ModelDesc<'_>) -> RenderResult<ModelHandle> {
        let model = self.graphics.create_model(desc)?;
        self.pipeline.add(model);
        Ok(model)
    }

    pub fn despawn_model(&mut self, model: ModelHandle) -> RenderResult<()> {
        self.pipeline.clear_model(model);
        self.graphics.destroy_model(model)
    }

    /// Stop the main loop after the current frame.
    #[inline]
    pub fn request_exit(&mut self) { *self.exit_requested = true; }
}

pub trait RenderableApp: App {
    /// Called once the graphics engine exists, before the first frame.
    fn prepare<B: Backend>(&mut self, _context: RenderContext<'_, B>) -> anyhow::Result<()> { Ok(()) }
    fn resize(&mut self, _width: u32, _height: u32) {}
    /// Update models and the scene view of the next frame.
    fn render<B: Backend>(&mut self, context: RenderContext<'_, B>) -> anyhow::Result<()>;
}
