use glam::{Mat4, Quat, Vec3, Vec4};
use log::info;
use winit::event::{ElementState, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::Window;
use prism::renderer::{MaterialDesc, Mesh, ModelDesc, ModelHandle, PointLight, SkinnedVertex, SpotLight};
use prism::rhi::Backend;
use prism::{launch, App, EngineArgs, EngineConfig, RenderContext, RenderableApp};

const CUBE_COUNT: usize = 5;
const ORBIT_RADIUS: f32 = 4.0;

/// 24 vertices so every face carries its own normal.
fn cube_vertices() -> (Vec<SkinnedVertex>, Vec<u32>) {
    const FACES: [(Vec3, Vec3); 6] = [
        (Vec3::X, Vec3::Y),
        (Vec3::NEG_X, Vec3::Y),
        (Vec3::Y, Vec3::Z),
        (Vec3::NEG_Y, Vec3::Z),
        (Vec3::Z, Vec3::Y),
        (Vec3::NEG_Z, Vec3::Y),
    ];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, up) in FACES {
        let right = up.cross(normal);
        let base = vertices.len() as u32;
        for (u, v) in [(0.0, 1.0), (1.0, 1.0), (1.0, 0.0), (0.0, 0.0)] {
            let position = (normal + right * (u * 2.0 - 1.0) + up * (1.0 - v * 2.0)) * 0.5;
            vertices.push(SkinnedVertex::rigid(position, normal, [u, v]));
        }
        indices.extend([base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    (vertices, indices)
}

fn material(name: &str, color: Vec3) -> MaterialDesc {
    MaterialDesc {
        name: name.to_owned(),
        diffuse_color: color.extend(1.0),
        ..Default::default()
    }
}

struct Cube {
    model: ModelHandle,
    position: Vec3,
    spin: f32,
}

pub struct SandboxApp {
    cubes: Vec<Cube>,
    time: f32,
    paused: bool,
}

impl App for SandboxApp {
    fn new(_args: &EngineArgs, config: &EngineConfig) -> anyhow::Result<Self> {
        info!("Sandbox starting on {}", config.graphics_api);
        Ok(Self {
            cubes: Vec::new(),
            time: 0.0,
            paused: false,
        })
    }

    fn on_window_event(&mut self, event: &WindowEvent, _window: &Window) {
        if let WindowEvent::KeyboardInput { event, .. } = event {
            if event.state == ElementState::Pressed && event.physical_key == PhysicalKey::Code(KeyCode::Space) {
                self.paused = !self.paused;
            }
        }
    }

    fn tick(&mut self, delta_time: f32) {
        if !self.paused {
            self.time += delta_time;
        }
    }
}

impl RenderableApp for SandboxApp {
    fn prepare<B: Backend>(&mut self, mut context: RenderContext<'_, B>) -> anyhow::Result<()> {
        let (vertices, indices) = cube_vertices();
        let mesh = Mesh {
            index_count: indices.len() as u32,
            first_index: 0,
            base_vertex: 0,
            material: 0,
        };

        context.spawn_model(&ModelDesc {
            name: "ground",
            vertices: &vertices,
            indices: &indices,
            meshes: vec![mesh],
            materials: vec![material("ground", Vec3::splat(0.6))],
            transform: Mat4::from_scale_rotation_translation(
                Vec3::new(20.0, 0.2, 20.0),
                Quat::IDENTITY,
                Vec3::new(0.0, -0.6, 0.0),
            ),
        })?;

        for index in 0..CUBE_COUNT {
            let angle = index as f32 / CUBE_COUNT as f32 * std::f32::consts::TAU;
            let position = Vec3::new(angle.cos(), 0.0, angle.sin()) * ORBIT_RADIUS * 0.5;
            let hue = Vec3::new(angle.cos() * 0.5 + 0.5, 0.6, angle.sin() * 0.5 + 0.5);
            let model = context.spawn_model(&ModelDesc {
                name: &format!("cube {index}"),
                vertices: &vertices,
                indices: &indices,
                meshes: vec![mesh],
                materials: vec![material("cube", hue)],
                transform: Mat4::from_translation(position),
            })?;
            self.cubes.push(Cube {
                model,
                position,
                spin: 0.5 + index as f32 * 0.25,
            });
        }

        let scene = context.scene();
        scene.look_at(Vec3::new(0.0, 4.0, 9.0), Vec3::ZERO);
        scene.spot_lights.push(SpotLight {
            position: Vec3::new(0.0, 6.0, 0.0),
            range: 12.0,
            direction: Vec3::NEG_Y,
            angle: 0.6,
            color: Vec3::new(1.0, 0.95, 0.8),
            intensity: 2.0,
        });
        info!("Sandbox scene ready with {} cubes", self.cubes.len());
        Ok(())
    }

    #[profiling::function]
    fn render<B: Backend>(&mut self, mut context: RenderContext<'_, B>) -> anyhow::Result<()> {
        let registry = context.graphics().registry_mut();
        for cube in &self.cubes {
            let rotation = Quat::from_rotation_y(self.time * cube.spin);
            registry
                .model_mut(cube.model)?
                .set_transform(Mat4::from_rotation_translation(rotation, cube.position));
        }

        let colors = [Vec4::new(1.0, 0.3, 0.3, 3.0), Vec4::new(0.3, 1.0, 0.3, 3.0), Vec4::new(0.3, 0.3, 1.0, 3.0)];
        let scene = context.scene();
        scene.point_lights.clear();
        for (index, color) in colors.into_iter().enumerate() {
            let angle = self.time + index as f32 * std::f32::consts::TAU / colors.len() as f32;
            scene.point_lights.push(PointLight {
                position: Vec3::new(angle.cos() * ORBIT_RADIUS, 1.5, angle.sin() * ORBIT_RADIUS),
                range: 6.0,
                color: color.truncate(),
                intensity: color.w,
            });
        }
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        info!("Sandbox resized to {width}x{height}");
    }
}

fn main() {
    if let Err(error) = launch::<SandboxApp>() {
        eprintln!("prism sandbox failed: {error:#}");
        std::process::exit(1);
    }
}
