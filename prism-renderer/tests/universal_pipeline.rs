mod common;

use common::{binds_vertex_buffer, draw_count, engine, triangle, HEIGHT, WIDTH};
use glam::Vec3;
use prism_renderer::{
    CullingLightType, LowLevelGraphicsEngine, PointLight, RenderError, SceneView, ShaderLibrary,
    UniversalRenderPipeline,
};
use prism_rhi::headless::{HeadlessCommand, QueueEvent};
use prism_rhi::*;

type Urp = UniversalRenderPipeline<Headless>;

fn pipeline(engine: &mut LowLevelGraphicsEngine<Headless>) -> Urp {
    UniversalRenderPipeline::new(engine, ShaderLibrary::builtin()).unwrap()
}

fn scene(engine: &LowLevelGraphicsEngine<Headless>, point_lights: usize) -> SceneView {
    let mut scene = SceneView::new(engine.extent());
    scene.point_lights = (0..point_lights)
        .map(|index| PointLight {
            position: Vec3::new(index as f32, 1.0, 0.0),
            range: 5.0,
            color: Vec3::ONE,
            intensity: 1.0,
        })
        .collect();
    scene
}

fn render(engine: &mut LowLevelGraphicsEngine<Headless>, urp: &mut Urp, scene: &SceneView) {
    engine.begin_draw_frame().unwrap();
    urp.draw(engine, scene).unwrap();
    engine.end_draw_frame().unwrap();
}

fn index_count(engine: &LowLevelGraphicsEngine<Headless>, urp: &Urp, light_type: CullingLightType) -> u32 {
    let buffer = urp.light_culling().index_buffer(light_type).unwrap();
    engine.registry().buffer(buffer).unwrap().meta().count
}

fn clear_events(engine: &LowLevelGraphicsEngine<Headless>) {
    for queue_type in CommandListType::ALL {
        engine.queue(queue_type).clear_events();
    }
}

#[test]
fn shaders_are_compiled_once_per_entry_point() {
    let mut engine = engine(2);
    let urp = pipeline(&mut engine);
    // z prepass vs, gbuffer vs/ps, culling cs, forward vs/ps
    assert_eq!(urp.shaders().len(), 6);
}

#[test]
fn light_indices_cover_every_tile() {
    let mut engine = engine(2);
    let mut urp = pipeline(&mut engine);
    assert!(urp.light_culling().index_buffer(CullingLightType::Point).is_none());
    assert!(matches!(urp.light_culling().tile_constants(), Err(RenderError::Unprepared(_))));

    let view = scene(&engine, 3);
    render(&mut engine, &mut urp, &view);
    // 64x48 in 16 pixel tiles
    assert_eq!(urp.light_culling().tile_count(), (4, 3));
    assert_eq!(index_count(&engine, &urp, CullingLightType::Point), 3 * 12);
    assert_eq!(index_count(&engine, &urp, CullingLightType::Spot), 12);
    assert_eq!(urp.light_culling().tile_constants().unwrap(), [4, 3, 16, 3, 1]);

    assert!(urp.resize(&mut engine, 100, 50).unwrap());
    let mut resized = scene(&engine, 3);
    resized.set_screen_size(engine.extent());
    render(&mut engine, &mut urp, &resized);
    assert_eq!(urp.light_culling().tile_count(), (7, 4));
    assert_eq!(index_count(&engine, &urp, CullingLightType::Point), 3 * 28);
    assert_eq!(index_count(&engine, &urp, CullingLightType::Spot), 28);
}

#[test]
fn index_buffers_follow_the_light_count() {
    let mut engine = engine(2);
    let mut urp = pipeline(&mut engine);

    let view = scene(&engine, 2);
    render(&mut engine, &mut urp, &view);
    let before = urp.light_culling().index_buffer(CullingLightType::Point).unwrap();
    let view = scene(&engine, 2);
    render(&mut engine, &mut urp, &view);
    assert_eq!(urp.light_culling().index_buffer(CullingLightType::Point), Some(before));

    let view = scene(&engine, 5);
    render(&mut engine, &mut urp, &view);
    assert_ne!(urp.light_culling().index_buffer(CullingLightType::Point), Some(before));
    assert!(!engine.registry().contains_buffer(before));
    assert_eq!(urp.light_culling().light_capacity(CullingLightType::Point), 5);

    // no lights still culls into one slot per tile
    let view = scene(&engine, 0);
    render(&mut engine, &mut urp, &view);
    assert_eq!(urp.light_culling().light_capacity(CullingLightType::Point), 1);
}

#[test]
fn same_size_resize_keeps_targets() {
    let mut engine = engine(2);
    let mut urp = pipeline(&mut engine);
    let depth = urp.zprepass().depth_texture(0);

    assert!(!urp.resize(&mut engine, WIDTH, HEIGHT).unwrap());
    assert_eq!(urp.zprepass().depth_texture(0), depth);

    assert!(urp.resize(&mut engine, WIDTH * 2, HEIGHT).unwrap());
    assert_ne!(urp.zprepass().depth_texture(0), depth);
    assert!(!engine.registry().contains_texture(depth));
    assert_eq!(urp.gbuffer().extent(), Extent2D::new(WIDTH * 2, HEIGHT));
    assert_eq!(urp.zprepass().extent(), Extent2D::new(WIDTH * 2, HEIGHT));
}

#[test]
fn models_are_added_once() {
    let mut engine = engine(2);
    let mut urp = pipeline(&mut engine);
    let model = triangle(&mut engine, "triangle");

    assert!(urp.add(model));
    assert!(!urp.add(model));
    assert_eq!(urp.zprepass().models().len(), 1);
    assert_eq!(urp.gbuffer().models().len(), 1);
    assert_eq!(urp.forward().models().len(), 1);

    assert!(urp.clear_model(model));
    assert!(!urp.clear_model(model));
    assert!(urp.forward().models().is_empty());
}

#[test]
fn removed_models_leave_the_next_frame() {
    let mut engine = engine(2);
    let mut urp = pipeline(&mut engine);
    let first = triangle(&mut engine, "first");
    let second = triangle(&mut engine, "second");
    urp.add(first);
    urp.add(second);
    let scene = scene(&engine, 1);

    let first_vertices = engine.registry().model(first).unwrap().vertex_buffer();
    let first_buffer = engine.registry().buffer(first_vertices).unwrap().id();

    clear_events(&engine);
    render(&mut engine, &mut urp, &scene);
    let commands = engine.queue(CommandListType::Graphics).executed_commands();
    // z prepass, gbuffer and forward draw each model
    assert_eq!(draw_count(&commands), 6);
    assert!(binds_vertex_buffer(&commands, first_buffer));

    urp.clear_model(first);
    clear_events(&engine);
    render(&mut engine, &mut urp, &scene);
    let commands = engine.queue(CommandListType::Graphics).executed_commands();
    assert_eq!(draw_count(&commands), 3);
    assert!(!binds_vertex_buffer(&commands, first_buffer));
}

#[test]
fn inactive_and_destroyed_models_are_skipped() {
    let mut engine = engine(2);
    let mut urp = pipeline(&mut engine);
    let model = triangle(&mut engine, "triangle");
    urp.add(model);
    let scene = scene(&engine, 1);

    engine.registry_mut().model_mut(model).unwrap().set_active(false);
    clear_events(&engine);
    render(&mut engine, &mut urp, &scene);
    assert_eq!(draw_count(&engine.queue(CommandListType::Graphics).executed_commands()), 0);

    engine.registry_mut().model_mut(model).unwrap().set_active(true);
    clear_events(&engine);
    render(&mut engine, &mut urp, &scene);
    assert_eq!(draw_count(&engine.queue(CommandListType::Graphics).executed_commands()), 3);

    engine.destroy_model(model).unwrap();
    clear_events(&engine);
    render(&mut engine, &mut urp, &scene);
    assert_eq!(draw_count(&engine.queue(CommandListType::Graphics).executed_commands()), 0);
    assert!(urp.zprepass().models().contains(model));
}

fn pass_names(lists: &[Vec<HeadlessCommand>]) -> Vec<String> {
    lists
        .iter()
        .flatten()
        .filter_map(|command| match command {
            HeadlessCommand::BeginRenderPass { name, .. } => Some(name.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn culling_runs_between_depth_and_shading() {
    let mut engine = engine(2);
    let mut urp = pipeline(&mut engine);
    let model = triangle(&mut engine, "triangle");
    urp.add(model);
    let scene = scene(&engine, 2);

    clear_events(&engine);
    render(&mut engine, &mut urp, &scene);
    let graphics_fence = engine.fence(CommandListType::Graphics).id();
    let compute_fence = engine.fence(CommandListType::Compute).id();

    let compute_events = engine.queue(CommandListType::Compute).events().clone();
    let depth_value = match compute_events.first() {
        Some(QueueEvent::Wait { fence, value }) if *fence == graphics_fence => *value,
        other => panic!("compute queue starts with {other:?}"),
    };
    let dispatches: Vec<_> = engine
        .queue(CommandListType::Compute)
        .executed_commands()
        .into_iter()
        .filter(|command| matches!(command, HeadlessCommand::Dispatch { .. }))
        .collect();
    assert_eq!(dispatches, vec![HeadlessCommand::Dispatch { x: 4, y: 3, z: 1 }]);

    let graphics_events = engine.queue(CommandListType::Graphics).events().clone();
    let depth_signal = graphics_events
        .iter()
        .position(|event| *event == QueueEvent::Signal { fence: graphics_fence, value: depth_value })
        .unwrap();
    let culling_wait = graphics_events
        .iter()
        .position(|event| matches!(event, QueueEvent::Wait { fence, .. } if *fence == compute_fence))
        .unwrap();
    assert!(depth_signal < culling_wait);

    let passes_before: Vec<_> = graphics_events[..depth_signal]
        .iter()
        .filter_map(|event| match event {
            QueueEvent::Execute { lists } => Some(pass_names(lists)),
            _ => None,
        })
        .flatten()
        .collect();
    let passes_after: Vec<_> = graphics_events[culling_wait..]
        .iter()
        .filter_map(|event| match event {
            QueueEvent::Execute { lists } => Some(pass_names(lists)),
            _ => None,
        })
        .flatten()
        .collect();
    assert_eq!(passes_before, vec!["z prepass".to_owned()]);
    assert_eq!(passes_after, vec!["gbuffer".to_owned(), "swapchain".to_owned()]);
}

#[test]
fn forward_pass_reads_culled_indices() {
    let mut engine = engine(2);
    let mut urp = pipeline(&mut engine);
    let model = triangle(&mut engine, "triangle");
    urp.add(model);

    clear_events(&engine);
    let view = scene(&engine, 1);
    render(&mut engine, &mut urp, &view);
    let commands = engine.queue(CommandListType::Graphics).executed_commands();

    let point_buffer = urp.light_culling().index_buffer(CullingLightType::Point).unwrap();
    let point_id = engine.registry().buffer(point_buffer).unwrap().id();
    let transitions: Vec<_> = commands
        .iter()
        .filter_map(|command| match command {
            HeadlessCommand::TransitionBuffer { buffer, before, after } if *buffer == point_id => Some((*before, *after)),
            _ => None,
        })
        .collect();
    assert_eq!(
        transitions,
        vec![
            (ResourceState::UnorderedAccess, ResourceState::ShaderResource),
            (ResourceState::ShaderResource, ResourceState::UnorderedAccess),
        ]
    );

    let forward_bindings = commands
        .iter()
        .filter(|command| matches!(command, HeadlessCommand::BindResources { views, .. } if views.len() == 9))
        .count();
    assert_eq!(forward_bindings, 1);
    assert!(commands.contains(&HeadlessCommand::PushConstants {
        bind_point: PipelineBindPoint::Graphics,
        values: vec![4, 3, 16, 1, 1],
    }));
}

#[test]
fn drawing_outside_a_frame_is_rejected() {
    let mut engine = engine(2);
    let mut urp = pipeline(&mut engine);
    let scene = scene(&engine, 1);
    assert!(matches!(urp.draw(&mut engine, &scene), Err(RenderError::FrameState { .. })));
}
