#![allow(dead_code)]

use glam::{Mat4, Vec3};
use prism_core::config::{EngineConfig, GraphicsApi, WindowConfig};
use prism_renderer::{LowLevelGraphicsEngine, MaterialDesc, Mesh, ModelDesc, ModelHandle, SkinnedVertex};
use prism_rhi::headless::HeadlessCommand;
use prism_rhi::Headless;

pub const WIDTH: u32 = 64;
pub const HEIGHT: u32 = 48;

pub fn config(frame_buffer_count: u32) -> EngineConfig {
    EngineConfig {
        graphics_api: GraphicsApi::Headless,
        frame_buffer_count,
        tile_size: 16,
        window: WindowConfig {
            title: "prism-renderer tests".to_owned(),
            width: WIDTH,
            height: HEIGHT,
        },
        ..Default::default()
    }
}

pub fn engine(frame_buffer_count: u32) -> LowLevelGraphicsEngine<Headless> {
    LowLevelGraphicsEngine::new(&config(frame_buffer_count), None).unwrap()
}

pub fn triangle(engine: &mut LowLevelGraphicsEngine<Headless>, name: &str) -> ModelHandle {
    let normal = Vec3::Z;
    let vertices = [
        SkinnedVertex::rigid(Vec3::new(-0.5, -0.5, 0.0), normal, [0.0, 1.0]),
        SkinnedVertex::rigid(Vec3::new(0.5, -0.5, 0.0), normal, [1.0, 1.0]),
        SkinnedVertex::rigid(Vec3::new(0.0, 0.5, 0.0), normal, [0.5, 0.0]),
    ];
    engine
        .create_model(&ModelDesc {
            name,
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
        })
        .unwrap()
}

pub fn draw_count(commands: &[HeadlessCommand]) -> usize {
    commands
        .iter()
        .filter(|command| matches!(command, HeadlessCommand::DrawIndexed { .. }))
        .count()
}

pub fn binds_vertex_buffer(commands: &[HeadlessCommand], buffer: u64) -> bool {
    commands
        .iter()
        .any(|command| matches!(command, HeadlessCommand::SetVertexBuffer { buffer: id, .. } if *id == buffer))
}
