mod common;

use common::{engine, HEIGHT, WIDTH};
use prism_renderer::{BufferHandle, LowLevelGraphicsEngine, RenderError};
use prism_rhi::headless::{HeadlessCommand, QueueEvent, SimulatedStatus};
use prism_rhi::*;

fn present_frame(engine: &mut LowLevelGraphicsEngine<Headless>) {
    engine.begin_draw_frame().unwrap();
    engine.begin_swapchain_render_pass([0.0, 0.0, 0.0, 1.0]).unwrap();
    engine.end_swapchain_render_pass().unwrap();
    engine.end_draw_frame().unwrap();
}

#[test]
fn frame_slot_follows_frame_number() {
    let mut engine = engine(3);
    assert_eq!(engine.current_frame_index(), 0);

    for _ in 0..7 {
        present_frame(&mut engine);
        assert_eq!(engine.current_frame_index() as u64, engine.frame_number() % 3);
    }
    assert_eq!(engine.frame_number(), 7);

    let presented = engine.swapchain().presented();
    assert_eq!(presented.len(), 7);
    assert!(presented.iter().all(|&index| index < engine.swapchain().buffer_count()));
    engine.wait_idle().unwrap();
}

#[test]
fn frame_calls_out_of_order_are_rejected() {
    let mut engine = engine(2);

    assert!(matches!(engine.end_draw_frame(), Err(RenderError::FrameState { .. })));
    assert!(matches!(
        engine.begin_swapchain_render_pass([0.0; 4]),
        Err(RenderError::FrameState { .. })
    ));
    assert!(engine.recorder(CommandListType::Graphics).is_err());

    engine.begin_draw_frame().unwrap();
    assert!(engine.is_in_frame());
    assert!(matches!(engine.begin_draw_frame(), Err(RenderError::FrameState { .. })));
    assert!(matches!(engine.resize(WIDTH * 2, HEIGHT), Err(RenderError::FrameState { .. })));
    assert!(matches!(engine.end_swapchain_render_pass(), Err(RenderError::FrameState { .. })));

    engine.begin_swapchain_render_pass([0.0; 4]).unwrap();
    assert!(matches!(engine.end_draw_frame(), Err(RenderError::FrameState { .. })));
    engine.end_swapchain_render_pass().unwrap();
    engine.end_draw_frame().unwrap();

    assert!(!engine.is_in_frame());
    assert_eq!(engine.frame_number(), 1);
}

#[test]
fn resize_to_the_same_size_keeps_the_swapchain() {
    let mut engine = engine(2);
    let generation = engine.swapchain().generation();
    let sync_objects = engine.swapchain().sync_objects();

    assert!(!engine.resize(WIDTH, HEIGHT).unwrap());
    assert_eq!(engine.swapchain().generation(), generation);
    assert_eq!(engine.swapchain().sync_objects(), sync_objects);

    assert!(engine.resize(WIDTH * 2, HEIGHT * 2).unwrap());
    assert_eq!(engine.extent(), Extent2D::new(WIDTH * 2, HEIGHT * 2));
    assert_eq!(engine.swapchain().generation(), generation + 1);
    assert_ne!(engine.swapchain().sync_objects(), sync_objects);

    assert!(engine.resize(WIDTH, HEIGHT).unwrap());
    assert_eq!(engine.extent(), Extent2D::new(WIDTH, HEIGHT));
    assert!(!engine.resize(WIDTH, HEIGHT).unwrap());
    assert_eq!(engine.swapchain().generation(), generation + 2);

    present_frame(&mut engine);
}

#[test]
fn zero_sized_resize_is_rejected() {
    let mut engine = engine(2);
    assert!(matches!(
        engine.resize(0, HEIGHT),
        Err(RenderError::Rhi(RhiError::InvalidExtent { width: 0, .. }))
    ));
    assert_eq!(engine.extent(), Extent2D::new(WIDTH, HEIGHT));
}

#[test]
fn suboptimal_surface_keeps_presenting() {
    let mut engine = engine(2);

    engine.swapchain().force_next_acquire(SimulatedStatus::Suboptimal);
    present_frame(&mut engine);
    engine.swapchain().force_next_present(SimulatedStatus::Suboptimal);
    present_frame(&mut engine);

    assert_eq!(engine.frame_number(), 2);
    assert_eq!(engine.swapchain().presented().len(), 2);
}

#[test]
fn out_of_date_acquire_leaves_the_engine_usable() {
    let mut engine = engine(2);
    present_frame(&mut engine);

    engine.swapchain().force_next_acquire(SimulatedStatus::OutOfDate);
    assert!(matches!(
        engine.begin_draw_frame(),
        Err(RenderError::Rhi(RhiError::SurfaceOutOfDate))
    ));
    assert!(!engine.is_in_frame());
    assert_eq!(engine.frame_number(), 1);

    // nothing was signalled for the failed acquire, so this must not block
    engine.wait_idle().unwrap();
    assert!(engine.resize(WIDTH + 16, HEIGHT).unwrap());
    present_frame(&mut engine);
    assert_eq!(engine.frame_number(), 2);
}

#[test]
fn failed_present_does_not_advance_the_frame() {
    let mut engine = engine(2);

    engine.begin_draw_frame().unwrap();
    engine.swapchain().force_next_present(SimulatedStatus::OutOfDate);
    assert!(matches!(
        engine.end_draw_frame(),
        Err(RenderError::Rhi(RhiError::SurfaceOutOfDate))
    ));
    assert!(!engine.is_in_frame());
    assert_eq!(engine.frame_number(), 0);
    assert_eq!(engine.current_frame_index(), 0);

    engine.wait_idle().unwrap();
    present_frame(&mut engine);
    assert_eq!(engine.frame_number(), 1);
}

#[test]
fn queues_wait_on_each_others_fences() {
    let mut engine = engine(2);
    for queue_type in CommandListType::ALL {
        engine.queue(queue_type).clear_events();
    }

    engine.begin_draw_frame().unwrap();
    let first = engine.flush_gpu_commands(CommandListType::Graphics, true).unwrap();
    let second = engine.flush_gpu_commands(CommandListType::Graphics, true).unwrap();
    assert!(second > first);

    engine
        .wait_queue_for(CommandListType::Compute, CommandListType::Graphics, second)
        .unwrap();
    let culled = engine.flush_gpu_commands(CommandListType::Compute, false).unwrap();
    engine
        .wait_queue_for(CommandListType::Graphics, CommandListType::Compute, culled)
        .unwrap();
    engine.end_draw_frame().unwrap();

    let graphics_fence = engine.fence(CommandListType::Graphics).id();
    let compute_fence = engine.fence(CommandListType::Compute).id();

    let compute_events = engine.queue(CommandListType::Compute).events().clone();
    assert_eq!(
        compute_events,
        vec![
            QueueEvent::Wait {
                fence: graphics_fence,
                value: second,
            },
            QueueEvent::Signal {
                fence: compute_fence,
                value: culled,
            },
        ]
    );

    let graphics_events = engine.queue(CommandListType::Graphics).events().clone();
    let wait = graphics_events
        .iter()
        .position(|event| *event == QueueEvent::Wait { fence: compute_fence, value: culled })
        .unwrap();
    let second_signal = graphics_events
        .iter()
        .position(|event| *event == QueueEvent::Signal { fence: graphics_fence, value: second })
        .unwrap();
    assert!(second_signal < wait);
    assert!(matches!(graphics_events[wait + 1], QueueEvent::Execute { .. }));
}

#[test]
fn graphics_waiting_on_later_compute_work_drains_on_wait_idle() {
    let mut engine = engine(2);
    engine.begin_draw_frame().unwrap();

    let culled = engine.fence(CommandListType::Compute).completed_value() + 1;
    engine
        .wait_queue_for(CommandListType::Graphics, CommandListType::Compute, culled)
        .unwrap();
    let shaded = engine.flush_gpu_commands(CommandListType::Graphics, true).unwrap();
    assert!(engine.fence(CommandListType::Graphics).completed_value() < shaded);

    assert_eq!(engine.flush_gpu_commands(CommandListType::Compute, false).unwrap(), culled);
    engine.wait_idle().unwrap();
    assert_eq!(engine.fence(CommandListType::Graphics).completed_value(), shaded);

    engine.end_draw_frame().unwrap();
    engine.wait_idle().unwrap();
}

#[test]
fn immediate_graphics_work_is_rejected_mid_frame() {
    let mut engine = engine(2);
    engine.begin_draw_frame().unwrap();
    let result = engine.execute_immediately(CommandListType::Graphics, |_, _| Ok(()));
    assert!(matches!(result, Err(RenderError::FrameState { .. })));
    engine.end_draw_frame().unwrap();
}

fn vertex_buffer(engine: &mut LowLevelGraphicsEngine<Headless>, count: u32) -> BufferHandle {
    let (device, registry) = engine.device_and_registry();
    registry
        .create_buffer(device, &GpuBufferMetaData::vertex_buffer("data", 4, count))
        .unwrap()
}

#[test]
fn uploads_land_in_gpu_buffers() {
    let mut engine = engine(2);
    let buffer = vertex_buffer(&mut engine, 4);
    let data: Vec<u8> = (0..16).collect();

    engine.upload_buffer(buffer, &data).unwrap();
    assert_eq!(&engine.registry().buffer(buffer).unwrap().contents()[..], &data[..]);

    let copies = engine
        .queue(CommandListType::Copy)
        .executed_commands()
        .into_iter()
        .filter(|command| matches!(command, HeadlessCommand::CopyBuffer { size: 16, .. }))
        .count();
    assert_eq!(copies, 1);

    assert!(engine.upload_buffer(buffer, &[0; 17]).is_err());
}

#[test]
fn default_textures_are_cleared_at_startup() {
    let engine = engine(2);
    let clears: Vec<_> = engine
        .queue(CommandListType::Graphics)
        .executed_commands()
        .into_iter()
        .filter_map(|command| match command {
            HeadlessCommand::BeginRenderPass { clear_values, .. } => clear_values.first().copied(),
            _ => None,
        })
        .collect();

    assert_eq!(
        clears,
        vec![
            ClearValue::Color([1.0, 1.0, 1.0, 1.0]),
            ClearValue::Color([0.0, 0.0, 0.0, 1.0]),
            ClearValue::Color([0.5, 0.5, 1.0, 1.0]),
        ]
    );
    let defaults = engine.default_textures();
    assert_ne!(defaults.white, defaults.flat_normal);
}
