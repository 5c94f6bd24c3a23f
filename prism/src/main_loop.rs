use std::sync::Arc;
use std::time::Instant;
use log::{error, info};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{DeviceEvent, DeviceId, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};
use prism_core::config::EngineConfig;
use prism_rhi::{Backend, Headless};
use crate::app::RenderableApp;
use crate::Engine;

/// Frame rate bookkeeping shared by the windowed and the headless loop.
struct FrameClock {
    frame_count: u64,
    last_tick: Instant,
    last_time_printed: Instant,
}

impl FrameClock {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            frame_count: 0,
            last_tick: now,
            last_time_printed: now,
        }
    }

    /// Seconds since the previous tick. Logs the frame rate about once a second.
    fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let delta_time = now - self.last_tick;
        self.last_tick = now;

        let last_time_print_elapsed = (now - self.last_time_printed).as_secs_f32();
        if last_time_print_elapsed > 1. {
            info!("Frame rate: {} fps", self.frame_count as f32 / last_time_print_elapsed);
            self.last_time_printed = now;
            self.frame_count = 0;
        }
        self.frame_count += 1;

        delta_time.as_secs_f32()
    }
}

pub struct EngineLoop<A, B: Backend> {
    engine: Option<Engine<B>>,
    app: A,
    config: EngineConfig,

    clock: FrameClock,
    error: Option<anyhow::Error>,
}

impl<A: RenderableApp, B: Backend> ApplicationHandler for EngineLoop<A, B> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.engine.is_some() {
            return;
        }

        let window_config = &self.config.window;
        let window_attributes = Window::default_attributes()
            .with_title(window_config.title.clone())
            .with_min_inner_size(LogicalSize::new(32, 32))
            .with_inner_size(LogicalSize::new(window_config.width, window_config.height));

        let started = event_loop
            .create_window(window_attributes)
            .map_err(anyhow::Error::from)
            .and_then(|window| {
                let main_window = Arc::new(window);
                let mut engine = Engine::<B>::new(&self.config, Some(main_window.clone()))?;
                self.app.prepare(engine.context())?;
                main_window.request_redraw();
                Ok(engine)
            });

        match started {
            Ok(engine) => self.engine = Some(engine),
            Err(error) => self.fail(event_loop, error),
        }
    }

    #[profiling::function]
    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        let Some(engine) = self.engine.as_ref() else {
            return;
        };
        if engine.should_exit() {
            event_loop.exit();
            return;
        }

        if let Err(error) = self.process_window_event(&event) {
            self.fail(event_loop, error);
        }
    }

    #[profiling::function]
    fn device_event(&mut self, event_loop: &ActiveEventLoop, _device_id: DeviceId, event: DeviceEvent) {
        let Some(engine) = self.engine.as_ref() else {
            return;
        };
        if engine.should_exit() {
            event_loop.exit();
            return;
        }

        self.app.on_device_event(&event);
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(engine) = self.engine.take() {
            if let Err(error) = engine.wait_idle() {
                error!("Failed to wait for the gpu on exit: {error:#}");
            }
        }
    }
}

impl<A: RenderableApp, B: Backend> EngineLoop<A, B> {
    pub(super) fn new(app: A, config: EngineConfig) -> Result<Self, anyhow::Error> {
        Ok(Self {
            engine: None,
            app,
            config,
            clock: FrameClock::new(),
            error: None,
        })
    }

    pub fn run(mut self) -> Result<(), anyhow::Error> {
        let event_loop = EventLoop::new()?;
        event_loop.set_control_flow(ControlFlow::Poll);
        event_loop.run_app(&mut self)?;

        match self.error.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        error!("Engine loop stopped: {error:#}");
        self.error = Some(error);
        event_loop.exit();
    }

    #[profiling::function("main_loop")]
    fn process_window_event(&mut self, event: &WindowEvent) -> Result<(), anyhow::Error> {
        let Some(engine) = self.engine.as_mut() else {
            return Ok(());
        };
        if let Some(window) = engine.main_window() {
            self.app.on_window_event(event, window.as_ref());
        }

        match event {
            WindowEvent::Resized(size) => {
                engine.resize(size.width, size.height)?;
                self.app.resize(size.width, size.height);
            }
            WindowEvent::CloseRequested => {
                engine.request_exit();
            }
            WindowEvent::RedrawRequested => {
                let delta_time = self.clock.tick();
                self.app.tick(delta_time);

                engine.render(&mut self.app)?;
                if let Some(window) = engine.main_window() {
                    window.request_redraw();
                }

                profiling::finish_frame!();
            }
            _ => {}
        }
        Ok(())
    }
}

/// Render `app` without a window until it asks to exit or `frame_limit` frames were presented.
/// Returns the number of rendered frames.
pub fn run_headless<A: RenderableApp>(mut app: A, config: &EngineConfig, frame_limit: u64) -> Result<u64, anyhow::Error> {
    let mut engine = Engine::<Headless>::new(config, None)?;
    app.prepare(engine.context())?;

    let mut clock = FrameClock::new();
    let mut frames = 0;
    while frames < frame_limit && !engine.should_exit() {
        let delta_time = clock.tick();
        app.tick(delta_time);
        engine.render(&mut app)?;
        profiling::finish_frame!();
        frames += 1;
    }

    engine.wait_idle()?;
    info!("Headless run finished after {frames} frames");
    Ok(frames)
}
