use std::rc::Rc;
use std::time::Duration;
use prism_core::config::HeapCapacities;
use prism_rhi::headless::{
    HeadlessCommand, HeadlessDevice, HeadlessInstance, QueueEvent, SimulatedStatus, SimulatedSurface,
};
use prism_rhi::*;

fn device_on(surface: SimulatedSurface, use_hdr: bool) -> HeadlessDevice {
    HeadlessInstance::new(&InstanceDesc {
        application_name: "prism-rhi tests".to_owned(),
        enable_validation: false,
        window: None,
    })
    .unwrap()
    .with_surface(surface)
    .create_device(&DeviceDesc {
        use_hdr,
        use_raytracing: false,
        heap_capacities: HeapCapacities::default(),
    })
    .unwrap()
}

fn device() -> HeadlessDevice {
    device_on(SimulatedSurface::default(), false)
}

fn swapchain_desc(vsync_interval: u32, use_hdr: bool) -> SwapchainDesc {
    SwapchainDesc {
        width: 1280,
        height: 720,
        frame_buffer_count: 3,
        vsync_interval,
        use_hdr,
    }
}

#[test]
fn recording_requires_an_open_list() {
    let device = device();
    let allocator = device.create_command_allocator(CommandListType::Graphics).unwrap();
    let mut list = device.create_command_list(&allocator).unwrap();

    assert!(matches!(
        list.dispatch(1, 1, 1),
        Err(RhiError::InvalidCommandListState { expected: "recording", .. })
    ));
    assert!(list.end_recording().is_err());

    list.begin_recording().unwrap();
    assert!(list.is_recording());
    assert!(list.begin_recording().is_err());
    list.draw_instanced(3, 1, 0, 0).unwrap();
    list.end_recording().unwrap();
    assert!(matches!(list.draw_instanced(3, 1, 0, 0), Err(RhiError::InvalidCommandListState { .. })));
}

#[test]
fn open_or_stale_lists_are_not_submittable() {
    let device = device();
    let queue = device.create_command_queue(CommandListType::Graphics).unwrap();
    let allocator = device.create_command_allocator(CommandListType::Graphics).unwrap();
    let mut list = device.create_command_list(&allocator).unwrap();

    list.begin_recording().unwrap();
    assert!(queue.execute(&[&list]).is_err());
    list.end_recording().unwrap();
    queue.execute(&[&list]).unwrap();

    allocator.reset().unwrap();
    assert!(matches!(queue.execute(&[&list]), Err(RhiError::InvalidCommandListState { .. })));

    list.begin_recording().unwrap();
    list.end_recording().unwrap();
    queue.execute(&[&list]).unwrap();
}

#[test]
fn queues_only_accept_compatible_lists() {
    let device = device();
    let copy_queue = device.create_command_queue(CommandListType::Copy).unwrap();
    let allocator = device.create_command_allocator(CommandListType::Compute).unwrap();
    let mut list = device.create_command_list(&allocator).unwrap();
    list.begin_recording().unwrap();
    assert!(list.draw_instanced(3, 1, 0, 0).is_err());
    list.dispatch(4, 4, 1).unwrap();
    list.end_recording().unwrap();

    assert!(copy_queue.execute(&[&list]).is_err());
    let graphics_queue = device.create_command_queue(CommandListType::Graphics).unwrap();
    graphics_queue.execute(&[&list]).unwrap();
    assert_eq!(graphics_queue.executed_commands(), [HeadlessCommand::Dispatch { x: 4, y: 4, z: 1 }]);
}

#[test]
fn bind_calls_check_the_layout() {
    let device = device();
    let layout = Rc::new(
        device
            .create_resource_layout(
                &ResourceLayoutDesc::compute("cull")
                    .with_element(ResourceLayoutElement::constant_buffer(0, 0, ShaderVisibility::All))
                    .with_element(ResourceLayoutElement::rw_buffer(0, 0, ShaderVisibility::All))
                    .with_constants(PushConstantRange {
                        shader_register: 1,
                        register_space: 0,
                        visibility: ShaderVisibility::All,
                        count: 2,
                    }),
            )
            .unwrap(),
    );
    let constants = device
        .create_buffer(&GpuBufferMetaData::constant_buffer("scene", 64, 1))
        .unwrap();
    let indices = device
        .create_buffer(&GpuBufferMetaData::unordered_access_buffer("indices", 4, 64))
        .unwrap();
    let cbv = device
        .create_resource_view(ResourceRef::Buffer(&constants), &ResourceViewDesc::constant_buffer())
        .unwrap();
    let uav = device
        .create_resource_view(ResourceRef::Buffer(&indices), &ResourceViewDesc::unordered_access())
        .unwrap();
    let srv = device
        .create_resource_view(ResourceRef::Buffer(&indices), &ResourceViewDesc::shader_resource())
        .unwrap();

    let allocator = device.create_command_allocator(CommandListType::Compute).unwrap();
    let mut list = device.create_command_list(&allocator).unwrap();
    list.begin_recording().unwrap();

    assert!(matches!(
        list.bind_compute_resources(&layout, &[&cbv]),
        Err(RhiError::BindingMismatch(BindingMismatch::Count { expected: 2, actual: 1 }))
    ));
    assert!(matches!(
        list.bind_compute_resources(&layout, &[&cbv, &srv]),
        Err(RhiError::BindingMismatch(BindingMismatch::Type { slot: 1, .. }))
    ));
    assert!(list.push_compute_constants(&layout, &[1, 2, 3]).is_err());

    list.bind_compute_resources(&layout, &[&cbv, &uav]).unwrap();
    list.push_compute_constants(&layout, &[7, 9]).unwrap();
    assert_eq!(
        list.commands(),
        [
            HeadlessCommand::BindResources {
                bind_point: PipelineBindPoint::Compute,
                layout: layout.id(),
                views: vec![cbv.id(), uav.id()],
            },
            HeadlessCommand::PushConstants {
                bind_point: PipelineBindPoint::Compute,
                values: vec![7, 9],
            },
        ]
    );
}

#[test]
fn copies_land_when_the_queue_executes() {
    let device = device();
    let queue = device.create_command_queue(CommandListType::Copy).unwrap();
    let staging = device.create_buffer(&GpuBufferMetaData::upload_buffer("staging", 8)).unwrap();
    let vertices = device
        .create_buffer(&GpuBufferMetaData::vertex_buffer("vertices", 4, 2))
        .unwrap();
    staging.write(0, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();

    let allocator = device.create_command_allocator(CommandListType::Copy).unwrap();
    let mut list = device.create_command_list(&allocator).unwrap();
    list.begin_recording().unwrap();
    assert!(list.copy_buffer(&vertices, 4, &staging, 0, 8).is_err());
    list.copy_buffer(&vertices, 0, &staging, 0, 8).unwrap();
    list.end_recording().unwrap();

    assert_eq!(*vertices.contents(), [0; 8]);
    queue.execute(&[&list]).unwrap();
    assert_eq!(*vertices.contents(), [1, 2, 3, 4, 5, 6, 7, 8]);
}

#[test]
fn cross_queue_wait_orders_submissions() {
    let device = device();
    let graphics = device.create_command_queue(CommandListType::Graphics).unwrap();
    let compute = device.create_command_queue(CommandListType::Compute).unwrap();
    let graphics_fence = device.create_fence(0).unwrap();
    let compute_fence = device.create_fence(0).unwrap();

    compute.wait(&graphics_fence, 1).unwrap();
    compute.signal(&compute_fence, 1).unwrap();
    assert_eq!(compute.pending_count(), 2);
    assert_eq!(compute_fence.completed_value(), 0);

    graphics.signal(&graphics_fence, 1).unwrap();
    assert_eq!(compute.pending_count(), 0);
    assert_eq!(compute_fence.completed_value(), 1);
    assert_eq!(
        *compute.events(),
        [
            QueueEvent::Wait { fence: graphics_fence.id(), value: 1 },
            QueueEvent::Signal { fence: compute_fence.id(), value: 1 },
        ]
    );
}

#[test]
fn queue_signal_resumes_a_stalled_queue() {
    let device = device();
    let graphics = device.create_command_queue(CommandListType::Graphics).unwrap();
    let compute = device.create_command_queue(CommandListType::Compute).unwrap();
    let graphics_fence = device.create_fence(0).unwrap();
    let compute_fence = device.create_fence(0).unwrap();

    graphics.wait(&compute_fence, 1).unwrap();
    graphics.signal(&graphics_fence, 3).unwrap();
    compute.signal(&compute_fence, 1).unwrap();

    // nothing touched the graphics queue since compute signalled
    assert_eq!(graphics_fence.completed_value(), 3);
    graphics_fence.wait(3).unwrap();
    assert_eq!(graphics.pending_count(), 0);
}

#[test]
fn cpu_wait_resumes_a_queue_stalled_on_another_thread() {
    let device = device();
    let compute = device.create_command_queue(CommandListType::Compute).unwrap();
    let dependency = device.create_fence(0).unwrap();
    let done = device.create_fence(0).unwrap();

    compute.wait(&dependency, 2).unwrap();
    compute.signal(&done, 1).unwrap();

    let remote = dependency.clone();
    let signaller = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        remote.signal(1).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        remote.signal(2).unwrap();
    });
    done.wait(1).unwrap();
    signaller.join().unwrap();

    assert_eq!(
        *compute.events(),
        [
            QueueEvent::Wait { fence: dependency.id(), value: 2 },
            QueueEvent::Signal { fence: done.id(), value: 1 },
        ]
    );
}

#[test]
fn fences_are_monotonic_and_wake_other_threads() {
    let device = device();
    let fence = device.create_fence(2).unwrap();
    assert!(matches!(
        fence.signal(1),
        Err(RhiError::FenceValueDecreased { current: 2, requested: 1 })
    ));

    let queue = device.create_command_queue(CommandListType::Graphics).unwrap();
    assert!(queue.signal(&fence, 1).is_err());

    let remote = fence.clone();
    let waiter = std::thread::spawn(move || {
        remote.wait(10).unwrap();
        remote.completed_value()
    });
    std::thread::sleep(Duration::from_millis(20));
    for value in 3..=10 {
        fence.signal(value).unwrap();
    }
    assert_eq!(waiter.join().unwrap(), 10);
}

#[test]
fn swapchain_resize_round_trip() {
    let device = device();
    let queue = device.create_command_queue(CommandListType::Graphics).unwrap();
    let fence = device.create_fence(0).unwrap();
    let mut swapchain = device.create_swapchain(&queue, &swapchain_desc(1, false)).unwrap();
    assert_eq!(swapchain.buffer_count(), 3);

    swapchain.prepare_next_image(&queue, &fence, 1).unwrap();
    let index = swapchain.prepare_next_image(&queue, &fence, 2).unwrap();
    assert_eq!(index, 1);

    let sync_objects = swapchain.sync_objects();
    assert!(!swapchain.resize(1280, 720).unwrap());
    assert_eq!(swapchain.sync_objects(), sync_objects);
    assert_eq!(swapchain.current_buffer_index(), 1);

    assert!(matches!(swapchain.resize(0, 720), Err(RhiError::InvalidExtent { width: 0, height: 720 })));

    assert!(swapchain.resize(800, 600).unwrap());
    assert_ne!(swapchain.sync_objects(), sync_objects);
    assert_eq!(swapchain.current_buffer_index(), 0);
    assert_eq!(swapchain.extent(), Extent2D::new(800, 600));
    for index in 0..swapchain.buffer_count() {
        assert_eq!(swapchain.back_buffer(index).extent(), Extent2D::new(800, 600));
    }

    let index = swapchain.prepare_next_image(&queue, &fence, 3).unwrap();
    assert!(index < swapchain.buffer_count());
}

#[test]
fn swapchain_status_policy() {
    let device = device();
    let queue = device.create_command_queue(CommandListType::Graphics).unwrap();
    let fence = device.create_fence(0).unwrap();
    let mut swapchain = device.create_swapchain(&queue, &swapchain_desc(1, false)).unwrap();

    swapchain.force_next_acquire(SimulatedStatus::Suboptimal);
    swapchain.prepare_next_image(&queue, &fence, 1).unwrap();
    swapchain.force_next_present(SimulatedStatus::Suboptimal);
    swapchain.present(&queue, &fence, 1).unwrap();

    swapchain.force_next_acquire(SimulatedStatus::SurfaceLost);
    assert!(matches!(swapchain.prepare_next_image(&queue, &fence, 2), Err(RhiError::SurfaceLost)));

    swapchain.force_next_acquire(SimulatedStatus::OutOfDate);
    assert!(matches!(
        swapchain.prepare_next_image(&queue, &fence, 2),
        Err(RhiError::SurfaceOutOfDate)
    ));
    assert_eq!(swapchain.presented(), [0]);
}

#[test]
fn hdr_request_without_hdr_surface_falls_back() {
    let surface = SimulatedSurface {
        formats: vec![
            SurfaceFormat::new(PixelFormat::R8G8B8A8Unorm, ColorSpace::SrgbNonLinear),
            SurfaceFormat::new(PixelFormat::B8G8R8A8Srgb, ColorSpace::SrgbNonLinear),
        ],
        ..Default::default()
    };
    let device = device_on(surface, true);
    let queue = device.create_command_queue(CommandListType::Graphics).unwrap();
    let swapchain = device.create_swapchain(&queue, &swapchain_desc(1, true)).unwrap();
    assert_eq!(swapchain.back_buffer_format(), PixelFormat::R8G8B8A8Unorm);

    let device = device_on(SimulatedSurface::default(), true);
    let swapchain = device.create_swapchain(&queue, &swapchain_desc(1, true)).unwrap();
    assert_eq!(
        swapchain.surface_format(),
        SurfaceFormat::new(PixelFormat::R16G16B16A16Float, ColorSpace::ExtendedSrgbLinear)
    );
}

#[test]
fn present_mode_follows_vsync() {
    let device = device();
    let queue = device.create_command_queue(CommandListType::Graphics).unwrap();
    let tearing = device.create_swapchain(&queue, &swapchain_desc(0, false)).unwrap();
    assert_eq!(tearing.present_mode(), PresentMode::Immediate);
    let synced = device.create_swapchain(&queue, &swapchain_desc(1, false)).unwrap();
    assert_eq!(synced.present_mode(), PresentMode::Mailbox);

    let fifo_only = SimulatedSurface {
        present_modes: vec![PresentMode::Fifo],
        ..Default::default()
    };
    let device = device_on(fifo_only, false);
    let swapchain = device.create_swapchain(&queue, &swapchain_desc(0, false)).unwrap();
    assert_eq!(swapchain.present_mode(), PresentMode::Fifo);
}
