use glam::{Mat4, Vec3};
use prism::core::cli::LogLevel;
use prism::renderer::{MaterialDesc, Mesh, ModelDesc, ModelHandle, PointLight, SkinnedVertex};
use prism::rhi::Backend;
use prism::{launch_headless, App, EngineArgs, EngineConfig, GraphicsApi, RenderContext, RenderableApp};

struct Spinner {
    model: Option<ModelHandle>,
    exit_after: u64,
    rendered: u64,
}

impl App for Spinner {
    fn new(args: &EngineArgs, _config: &EngineConfig) -> anyhow::Result<Self> {
        let exit_after = args.args.first().map_or(Ok(u64::MAX), |frames| frames.parse())?;
        Ok(Self {
            model: None,
            exit_after,
            rendered: 0,
        })
    }
}

impl RenderableApp for Spinner {
    fn prepare<B: Backend>(&mut self, mut context: RenderContext<'_, B>) -> anyhow::Result<()> {
        let vertices = [
            SkinnedVertex::rigid(Vec3::new(-1.0, -1.0, 0.0), Vec3::Z, [0.0, 1.0]),
            SkinnedVertex::rigid(Vec3::new(1.0, -1.0, 0.0), Vec3::Z, [1.0, 1.0]),
            SkinnedVertex::rigid(Vec3::new(0.0, 1.0, 0.0), Vec3::Z, [0.5, 0.0]),
        ];
        self.model = Some(context.spawn_model(&ModelDesc {
            name: "spinner",
            vertices: &vertices,
            indices: &[0, 1, 2],
            meshes: vec![Mesh {
                index_count: 3,
                first_index: 0,
                base_vertex: 0,
                material: 0,
            }],
            materials: vec![MaterialDesc::default()],
            transform: Mat4::IDENTITY,
        })?);
        context.scene().point_lights.push(PointLight {
            position: Vec3::new(0.0, 2.0, 2.0),
            range: 10.0,
            color: Vec3::ONE,
            intensity: 1.0,
        });
        Ok(())
    }

    fn render<B: Backend>(&mut self, mut context: RenderContext<'_, B>) -> anyhow::Result<()> {
        if let Some(model) = self.model {
            let angle = context.frame_number() as f32 * 0.1;
            context
                .graphics()
                .registry_mut()
                .model_mut(model)?
                .set_transform(Mat4::from_rotation_y(angle));
        }
        self.rendered += 1;
        if self.rendered >= self.exit_after {
            context.request_exit();
        }
        Ok(())
    }
}

fn args(extra: &[&str]) -> EngineArgs {
    EngineArgs {
        log_level: LogLevel::Warn,
        config: None,
        api: Some(GraphicsApi::Headless),
        vsync: None,
        frames: None,
        validation: false,
        args: extra.iter().map(|arg| (*arg).to_owned()).collect(),
    }
}

fn config() -> EngineConfig {
    let mut config = EngineConfig {
        graphics_api: GraphicsApi::Headless,
        frame_buffer_count: 2,
        ..Default::default()
    };
    config.window.width = 320;
    config.window.height = 240;
    config
}

#[test]
fn headless_run_stops_at_the_frame_limit() {
    let frames = launch_headless::<Spinner>(&args(&[]), &config(), 5).unwrap();
    assert_eq!(frames, 5);
}

#[test]
fn app_can_end_a_headless_run() {
    let frames = launch_headless::<Spinner>(&args(&["3"]), &config(), 100).unwrap();
    assert_eq!(frames, 3);
}
