use std::rc::Rc;
use prism_core::config::HeapCapacities;
use prism_rhi::headless::{HeadlessDevice, HeadlessInstance};
use prism_rhi::*;

fn instance() -> HeadlessInstance {
    HeadlessInstance::new(&InstanceDesc {
        application_name: "prism-rhi tests".to_owned(),
        enable_validation: true,
        window: None,
    })
    .unwrap()
}

fn device_with(heap_capacities: HeapCapacities) -> HeadlessDevice {
    instance()
        .create_device(&DeviceDesc {
            use_hdr: false,
            use_raytracing: false,
            heap_capacities,
        })
        .unwrap()
}

fn device() -> HeadlessDevice {
    device_with(HeapCapacities::default())
}

fn blob(shader_type: ShaderType) -> ShaderBlob {
    ShaderBlob::new(shader_type, "main", ShaderModel::default(), ShaderTarget::Source, b"// hlsl".to_vec())
}

#[test]
fn raytracing_request_fails_fast() {
    let result = instance().create_device(&DeviceDesc {
        use_hdr: false,
        use_raytracing: true,
        heap_capacities: HeapCapacities::default(),
    });
    assert!(matches!(result, Err(RhiError::Unsupported("raytracing"))));

    let device = device();
    assert!(!device.capabilities().is_supported_dxr());
    let structure = device.create_acceleration_structure(&AccelerationStructureDesc {
        name: "scene".to_owned(),
        kind: AccelerationStructureKind::TopLevel,
        size: 1024,
    });
    assert!(matches!(structure, Err(RhiError::Unsupported(_))));
}

#[test]
fn view_creation_exhausts_heap_deterministically() {
    let device = device_with(HeapCapacities {
        srv: 2,
        ..Default::default()
    });
    let texture = device
        .create_texture(&GpuTextureMetaData::render_target("albedo", 64, 64, PixelFormat::R8G8B8A8Unorm))
        .unwrap();

    let first = device
        .create_resource_view(ResourceRef::Texture(&texture), &ResourceViewDesc::shader_resource())
        .unwrap();
    let second = device
        .create_resource_view(ResourceRef::Texture(&texture), &ResourceViewDesc::shader_resource())
        .unwrap();
    assert_eq!((first.descriptor_index(), second.descriptor_index()), (0, 1));

    for _ in 0..2 {
        match device.create_resource_view(ResourceRef::Texture(&texture), &ResourceViewDesc::shader_resource()) {
            Err(RhiError::DescriptorHeapExhausted { heap, capacity }) => {
                assert_eq!(heap, DescriptorHeapType::Srv);
                assert_eq!(capacity, 2);
            }
            Err(other) => panic!("expected heap exhaustion, got {other:?}"),
            Ok(_) => panic!("expected heap exhaustion"),
        }
    }

    // render target views come from their own heap
    device
        .create_resource_view(ResourceRef::Texture(&texture), &ResourceViewDesc::render_target())
        .unwrap();

    drop(first);
    let reused = device
        .create_resource_view(ResourceRef::Texture(&texture), &ResourceViewDesc::shader_resource())
        .unwrap();
    assert_eq!(reused.descriptor_index(), 0);
    assert_eq!(device.descriptor_heap(DescriptorHeapType::Srv).allocated(), 2);
}

#[test]
fn extra_heaps_follow_the_same_budget() {
    let device = device();
    let heap = device
        .create_descriptor_heap(&DescriptorHeapDesc {
            heap_type: DescriptorHeapType::Sampler,
            capacity: 1,
            shader_visible: true,
        })
        .unwrap();
    let _slot = heap.allocate().unwrap();
    assert!(matches!(heap.allocate(), Err(RhiError::DescriptorHeapExhausted { capacity: 1, .. })));
}

#[test]
fn views_require_matching_usage() {
    let device = device();
    let buffer = device
        .create_buffer(&GpuBufferMetaData::vertex_buffer("vertices", 16, 4))
        .unwrap();
    let result = device.create_resource_view(ResourceRef::Buffer(&buffer), &ResourceViewDesc::unordered_access());
    assert!(matches!(result, Err(RhiError::InvalidDescriptor(_))));

    let depth = device
        .create_texture(&GpuTextureMetaData::depth_stencil("depth", 32, 32, PixelFormat::D32Float))
        .unwrap();
    let srv = device
        .create_resource_view(ResourceRef::Texture(&depth), &ResourceViewDesc::shader_resource())
        .unwrap();
    assert_eq!(srv.format(), PixelFormat::R32Float);
    assert_eq!(srv.resource(), depth.id());
}

#[test]
fn frame_buffers_must_match_their_pass() {
    let device = device();
    let pass = device
        .create_render_pass(
            &RenderPassDesc::new("opaque")
                .with_color(AttachmentDesc::color(PixelFormat::R8G8B8A8Unorm))
                .with_depth(AttachmentDesc::depth(PixelFormat::D32Float)),
        )
        .unwrap();
    let color = device
        .create_texture(&GpuTextureMetaData::render_target("color", 16, 16, PixelFormat::R8G8B8A8Unorm))
        .unwrap();
    let depth = device
        .create_texture(&GpuTextureMetaData::depth_stencil("depth", 16, 16, PixelFormat::D32Float))
        .unwrap();
    let rtv = device
        .create_resource_view(ResourceRef::Texture(&color), &ResourceViewDesc::render_target())
        .unwrap();
    let dsv = device
        .create_resource_view(ResourceRef::Texture(&depth), &ResourceViewDesc::depth_stencil())
        .unwrap();

    let missing_depth = device.create_frame_buffer(
        &pass,
        &FrameBufferDesc {
            render_targets: &[&rtv],
            depth_stencil: None,
            width: 16,
            height: 16,
        },
    );
    assert!(missing_depth.is_err());

    let swapped = device.create_frame_buffer(
        &pass,
        &FrameBufferDesc {
            render_targets: &[&dsv],
            depth_stencil: Some(&rtv),
            width: 16,
            height: 16,
        },
    );
    assert!(swapped.is_err());

    let frame_buffer = device
        .create_frame_buffer(
            &pass,
            &FrameBufferDesc {
                render_targets: &[&rtv],
                depth_stencil: Some(&dsv),
                width: 16,
                height: 16,
            },
        )
        .unwrap();
    assert_eq!(frame_buffer.extent(), Extent2D::new(16, 16));
    assert_eq!(frame_buffer.render_targets(), [color.id()]);
    assert_eq!(frame_buffer.depth_stencil(), Some(depth.id()));
}

#[test]
fn pipeline_state_completes_exactly_once() {
    let device = device();
    let layout = Rc::new(
        device
            .create_resource_layout(
                &ResourceLayoutDesc::graphics("opaque")
                    .with_element(ResourceLayoutElement::constant_buffer(0, 0, ShaderVisibility::All)),
            )
            .unwrap(),
    );
    let mut pipeline = device.create_graphics_pipeline_state(layout);
    pipeline.set_name("opaque").unwrap();

    assert!(matches!(pipeline.pipeline(), Err(RhiError::PipelineStateIncomplete)));
    assert!(matches!(
        pipeline.complete_setting(&device),
        Err(RhiError::MissingShader(ShaderType::Vertex))
    ));

    match pipeline.set_vertex_shader(blob(ShaderType::Pixel)) {
        Err(RhiError::ShaderStageMismatch { expected, actual }) => {
            assert_eq!(expected, ShaderType::Vertex);
            assert_eq!(actual, ShaderType::Pixel);
        }
        other => panic!("expected a stage mismatch, got {other:?}"),
    }

    let factory = device.create_pipeline_factory();
    pipeline
        .set_rasterizer_state(factory.create_rasterizer_state(CullMode::Back, FillMode::Solid))
        .unwrap();
    pipeline.set_vertex_shader(blob(ShaderType::Vertex)).unwrap();
    pipeline.set_pixel_shader(blob(ShaderType::Pixel)).unwrap();
    pipeline
        .set_render_target_formats(&[PixelFormat::R8G8B8A8Unorm], PixelFormat::D32Float)
        .unwrap();
    pipeline.complete_setting(&device).unwrap();

    assert!(pipeline.is_completed());
    assert_eq!(pipeline.pipeline().unwrap().entry_points, ["main", "main"]);
    assert!(matches!(
        pipeline.set_blend_state(factory.create_alpha_blend_state()),
        Err(RhiError::PipelineStateAlreadyCompleted)
    ));
    assert!(matches!(
        pipeline.complete_setting(&device),
        Err(RhiError::PipelineStateAlreadyCompleted)
    ));
}

#[test]
fn tessellation_needs_both_stages() {
    let device = device();
    let layout = Rc::new(device.create_resource_layout(&ResourceLayoutDesc::graphics("patches")).unwrap());
    let mut pipeline = device.create_graphics_pipeline_state(layout);
    pipeline.set_vertex_shader(blob(ShaderType::Vertex)).unwrap();
    pipeline.set_hull_shader(blob(ShaderType::Hull)).unwrap();
    assert!(matches!(
        pipeline.complete_setting(&device),
        Err(RhiError::MissingShader(ShaderType::Domain))
    ));
}

#[test]
fn compute_pipeline_only_takes_compute_shaders() {
    let device = device();
    let layout = Rc::new(device.create_resource_layout(&ResourceLayoutDesc::compute("cull")).unwrap());
    let mut pipeline = device.create_compute_pipeline_state(layout);
    assert!(matches!(
        pipeline.set_compute_shader(blob(ShaderType::Pixel)),
        Err(RhiError::ShaderStageMismatch { .. })
    ));
    assert!(matches!(
        pipeline.complete_setting(&device),
        Err(RhiError::MissingShader(ShaderType::Compute))
    ));
    pipeline.set_compute_shader(blob(ShaderType::Compute)).unwrap();
    pipeline.complete_setting(&device).unwrap();
    assert_eq!(pipeline.pipeline().unwrap().entry_point, "main");
}

#[test]
fn duplicate_layout_registers_are_rejected() {
    let device = device();
    let desc = ResourceLayoutDesc::graphics("broken")
        .with_element(ResourceLayoutElement::texture(0, 0, ShaderVisibility::Pixel))
        .with_element(ResourceLayoutElement::structured_buffer(0, 0, ShaderVisibility::Pixel));
    assert!(matches!(device.create_resource_layout(&desc), Err(RhiError::InvalidDescriptor(_))));
}
