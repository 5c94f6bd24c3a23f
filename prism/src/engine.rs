use std::sync::Arc;
use log::{debug, info};
use winit::window::Window;
use prism_core::config::EngineConfig;
use prism_renderer::{LowLevelGraphicsEngine, SceneView, ShaderLibrary, UniversalRenderPipeline};
use prism_rhi::{Backend, WindowInfo};
use crate::app::{RenderContext, RenderableApp};

pub struct Engine<B: Backend> {
    // field order is drop order: the pipeline's objects go before the device
    pipeline: UniversalRenderPipeline<B>,
    graphics: LowLevelGraphicsEngine<B>,
    scene: SceneView,
    main_window: Option<Arc<Window>>,

    minimized: bool,
    should_exit: bool,
}

impl<B: Backend> Engine<B> {
    #[profiling::function]
    pub fn new(config: &EngineConfig, main_window: Option<Arc<Window>>) -> Result<Self, anyhow::Error> {
        let window_info = match &main_window {
            Some(window) => {
                let size = window.inner_size();
                Some(WindowInfo::new(window.as_ref(), size.width, size.height)?)
            }
            None => None,
        };

        let mut graphics = LowLevelGraphicsEngine::<B>::new(config, window_info)?;
        let pipeline = UniversalRenderPipeline::new(&mut graphics, ShaderLibrary::builtin())?;
        let scene = SceneView::new(graphics.extent());

        info!("Engine running on {}", B::API);
        Ok(Self {
            pipeline,
            graphics,
            scene,
            main_window,
            minimized: false,
            should_exit: false,
        })
    }

    pub(crate) fn context(&mut self) -> RenderContext<'_, B> {
        RenderContext::new(&mut self.graphics, &mut self.pipeline, &mut self.scene, &mut self.should_exit)
    }

    /// Let the app update the scene, then record and present one frame.
    #[profiling::function]
    pub fn render<A: RenderableApp>(&mut self, app: &mut A) -> Result<(), anyhow::Error> {
        app.render(self.context())?;
        if self.minimized {
            return Ok(());
        }

        self.graphics.begin_draw_frame()?;
        self.pipeline.draw(&mut self.graphics, &self.scene)?;
        self.graphics.end_draw_frame()?;
        Ok(())
    }

    /// Resize every screen sized target. A zero size pauses rendering until the next resize.
    #[profiling::function]
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), anyhow::Error> {
        self.minimized = width == 0 || height == 0;
        if self.minimized {
            debug!("Window minimized, rendering paused");
            return Ok(());
        }

        if self.pipeline.resize(&mut self.graphics, width, height)? {
            self.scene.set_screen_size(self.graphics.extent());
        }
        Ok(())
    }

    pub fn wait_idle(&self) -> Result<(), anyhow::Error> {
        self.graphics.wait_idle()?;
        Ok(())
    }

    #[inline]
    pub fn main_window(&self) -> Option<&Arc<Window>> { self.main_window.as_ref() }

    #[inline]
    pub fn graphics(&self) -> &LowLevelGraphicsEngine<B> { &self.graphics }

    #[inline]
    pub fn pipeline(&self) -> &UniversalRenderPipeline<B> { &self.pipeline }

    #[inline]
    pub fn scene(&self) -> &SceneView { &self.scene }

    #[inline]
    pub fn request_exit(&mut self) { self.should_exit = true; }

    #[inline]
    pub fn should_exit(&self) -> bool { self.should_exit }
}
