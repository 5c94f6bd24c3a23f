//! Frame orchestration on top of the RHI.
//!
//! [`LowLevelGraphicsEngine`] owns the device, one queue and timeline fence per
//! [`CommandListType`], the swapchain with its default render pass and frame buffers, and one
//! set of command allocators per frame in flight. A frame is driven as
//!
//! `begin_draw_frame` → `begin_swapchain_render_pass` → pass draws →
//! `end_swapchain_render_pass` → `end_draw_frame`
//!
//! and the frame slot advances modulo the configured frame buffer count.

use prism_core::collections::SmallVec;
use prism_core::config::EngineConfig;
use prism_core::log::{debug, info};
use prism_rhi::{
    AttachmentDesc, Backend, ClearValue, CommandListType, DeviceDesc, Extent2D, FrameBufferDesc,
    GpuBufferMetaData, GpuTextureMetaData, InstanceDesc, PixelFormat, RenderPassDesc, ResourceRef,
    ResourceState, ResourceViewDesc, RhiBuffer, RhiCommandAllocator, RhiCommandList, RhiCommandQueue,
    RhiDevice, RhiError, RhiFence, RhiInstance, RhiResult, RhiSwapchain, ScissorRect, SwapchainDesc,
    Viewport, WindowInfo,
};
use crate::error::{RenderError, RenderResult};
use crate::registry::{BufferHandle, GpuRegistry, ViewHandle};

pub const DEPTH_FORMAT: PixelFormat = PixelFormat::D32Float;
pub const DEFAULT_TEXTURE_FORMAT: PixelFormat = PixelFormat::R8G8B8A8Unorm;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameState {
    Idle,
    Recording,
    SwapchainPass,
}

impl FrameState {
    fn name(self) -> &'static str {
        match self {
            FrameState::Idle => "idle",
            FrameState::Recording => "recording",
            FrameState::SwapchainPass => "inside the swapchain render pass",
        }
    }
}

struct QueueContext<B: Backend> {
    queue: B::CommandQueue,
    fence: B::Fence,
    last_value: u64,
}

impl<B: Backend> QueueContext<B> {
    fn new(device: &B::Device, queue_type: CommandListType) -> RhiResult<Self> {
        Ok(Self {
            queue: device.create_command_queue(queue_type)?,
            fence: device.create_fence(0)?,
            last_value: 0,
        })
    }

    #[inline]
    fn next_value(&mut self) -> u64 {
        self.last_value += 1;
        self.last_value
    }
}

/// Lists of one type drawn from one allocator. Every flush moves on to a fresh list, a list
/// is only recorded again after the allocator was reset.
struct CommandContext<B: Backend> {
    lists: SmallVec<[B::CommandList; 2]>,
    active: usize,
    allocator: B::CommandAllocator,
}

impl<B: Backend> CommandContext<B> {
    fn new(device: &B::Device, list_type: CommandListType) -> RhiResult<Self> {
        Ok(Self {
            lists: SmallVec::new(),
            active: 0,
            allocator: device.create_command_allocator(list_type)?,
        })
    }

    fn reset(&mut self) -> RhiResult<()> {
        debug_assert!(!self.is_open());
        self.allocator.reset()?;
        self.active = 0;
        Ok(())
    }

    #[inline]
    fn is_open(&self) -> bool {
        self.lists.get(self.active).is_some_and(|list| list.is_recording())
    }

    /// The list currently recording, opening a fresh one when needed.
    fn open(&mut self, device: &B::Device) -> RhiResult<&mut B::CommandList> {
        if !self.is_open() {
            if self.active == self.lists.len() {
                self.lists.push(device.create_command_list(&self.allocator)?);
            }
            self.lists[self.active].begin_recording()?;
        }
        Ok(&mut self.lists[self.active])
    }

    /// End the open list and hand it out for submission.
    fn close(&mut self) -> RhiResult<Option<&B::CommandList>> {
        if !self.is_open() {
            return Ok(None);
        }
        let index = self.active;
        self.active += 1;
        self.lists[index].end_recording()?;
        Ok(Some(&self.lists[index]))
    }
}

struct FrameContext<B: Backend> {
    contexts: Vec<CommandContext<B>>,
    /// Last fence value signalled on each queue for work of this frame slot.
    fence_values: [u64; CommandListType::COUNT],
}

impl<B: Backend> FrameContext<B> {
    fn new(device: &B::Device) -> RhiResult<Self> {
        Ok(Self {
            contexts: CommandListType::ALL
                .iter()
                .map(|&list_type| CommandContext::new(device, list_type))
                .collect::<RhiResult<_>>()?,
            fence_values: [0; CommandListType::COUNT],
        })
    }
}

/// Views and frame buffers over the swapchain back buffers, rebuilt on resize.
struct SwapchainTargets<B: Backend> {
    frame_buffers: Vec<B::FrameBuffer>,
    #[allow(dead_code)]
    back_buffer_views: Vec<B::ResourceView>,
    #[allow(dead_code)]
    depth_view: B::ResourceView,
    #[allow(dead_code)]
    depth: B::Texture,
}

impl<B: Backend> SwapchainTargets<B> {
    fn new(device: &B::Device, swapchain: &B::Swapchain, render_pass: &B::RenderPass) -> RhiResult<Self> {
        let extent = swapchain.extent();
        let depth = device.create_texture(&GpuTextureMetaData::depth_stencil(
            "swapchain depth",
            extent.width,
            extent.height,
            DEPTH_FORMAT,
        ))?;
        let depth_view = device.create_resource_view(ResourceRef::Texture(&depth), &ResourceViewDesc::depth_stencil())?;

        let back_buffer_views = (0..swapchain.buffer_count())
            .map(|index| {
                device.create_resource_view(
                    ResourceRef::Texture(swapchain.back_buffer(index)),
                    &ResourceViewDesc::render_target(),
                )
            })
            .collect::<RhiResult<Vec<_>>>()?;

        let frame_buffers = back_buffer_views
            .iter()
            .map(|view| {
                device.create_frame_buffer(
                    render_pass,
                    &FrameBufferDesc {
                        render_targets: &[view],
                        depth_stencil: Some(&depth_view),
                        width: extent.width,
                        height: extent.height,
                    },
                )
            })
            .collect::<RhiResult<Vec<_>>>()?;

        Ok(Self {
            frame_buffers,
            back_buffer_views,
            depth_view,
            depth,
        })
    }
}

/// Shader resource views of 1x1 textures bound where a material has no texture of its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTextures {
    pub white: ViewHandle,
    pub black: ViewHandle,
    pub flat_normal: ViewHandle,
}

/// What a pass records into for the current frame.
pub struct FrameRecorder<'a, B: Backend> {
    pub list: &'a mut B::CommandList,
    pub registry: &'a GpuRegistry<B>,
    pub frame_index: u32,
}

pub struct LowLevelGraphicsEngine<B: Backend> {
    // field order is drop order: everything created from the device goes first
    registry: GpuRegistry<B>,
    default_textures: DefaultTextures,
    targets: Option<SwapchainTargets<B>>,
    default_render_pass: B::RenderPass,
    frames: Vec<FrameContext<B>>,
    swapchain: B::Swapchain,
    queues: Vec<QueueContext<B>>,
    device: B::Device,
    _instance: B::Instance,

    frame_buffer_count: u32,
    tile_size: u32,
    current_frame: u32,
    frame_number: u64,
    back_buffer_index: u32,
    state: FrameState,
}

impl<B: Backend> LowLevelGraphicsEngine<B> {
    /// Create the api instance, device and swapchain. Without a window the swapchain takes the
    /// configured window size, which only the headless backend accepts.
    #[profiling::function]
    pub fn new(config: &EngineConfig, window: Option<WindowInfo>) -> RenderResult<Self> {
        let extent = window
            .as_ref()
            .map(WindowInfo::extent)
            .unwrap_or(Extent2D::new(config.window.width, config.window.height));
        let instance = B::Instance::new(&InstanceDesc {
            application_name: config.window.title.clone(),
            enable_validation: config.enable_validation,
            window,
        })?;
        Self::with_instance(instance, config, extent)
    }

    #[profiling::function]
    pub fn with_instance(instance: B::Instance, config: &EngineConfig, extent: Extent2D) -> RenderResult<Self> {
        let device = instance.create_device(&DeviceDesc {
            use_hdr: config.use_hdr,
            use_raytracing: config.use_raytracing,
            heap_capacities: config.heap_capacities,
        })?;

        let queues = CommandListType::ALL
            .iter()
            .map(|&queue_type| QueueContext::new(&device, queue_type))
            .collect::<RhiResult<Vec<_>>>()?;

        let swapchain = device.create_swapchain(
            &queues[CommandListType::Graphics.index()].queue,
            &SwapchainDesc {
                width: extent.width,
                height: extent.height,
                frame_buffer_count: config.frame_buffer_count,
                vsync_interval: config.vsync_interval,
                use_hdr: config.use_hdr,
            },
        )?;

        let frames = (0..config.frame_buffer_count)
            .map(|_| FrameContext::new(&device))
            .collect::<RhiResult<Vec<_>>>()?;

        let default_render_pass = device.create_render_pass(
            &RenderPassDesc::new("swapchain")
                .with_color(AttachmentDesc::color(swapchain.back_buffer_format()))
                .with_depth(AttachmentDesc::depth(DEPTH_FORMAT)),
        )?;
        let targets = SwapchainTargets::new(&device, &swapchain, &default_render_pass)?;

        info!(
            "{} engine ready: {}x{} {:?}, {} frames in flight",
            B::API,
            swapchain.extent().width,
            swapchain.extent().height,
            swapchain.back_buffer_format(),
            config.frame_buffer_count
        );

        let mut engine = Self {
            registry: GpuRegistry::new(),
            default_textures: DefaultTextures::default(),
            targets: Some(targets),
            default_render_pass,
            frames,
            swapchain,
            queues,
            device,
            _instance: instance,
            frame_buffer_count: config.frame_buffer_count,
            tile_size: config.tile_size,
            current_frame: 0,
            frame_number: 0,
            back_buffer_index: 0,
            state: FrameState::Idle,
        };
        engine.default_textures = engine.create_default_textures()?;
        Ok(engine)
    }

    #[inline]
    pub fn device(&self) -> &B::Device {
        &self.device
    }

    #[inline]
    pub fn registry(&self) -> &GpuRegistry<B> {
        &self.registry
    }

    #[inline]
    pub fn registry_mut(&mut self) -> &mut GpuRegistry<B> {
        &mut self.registry
    }

    /// Split borrow for object creation.
    #[inline]
    pub fn device_and_registry(&mut self) -> (&B::Device, &mut GpuRegistry<B>) {
        (&self.device, &mut self.registry)
    }

    #[inline]
    pub fn swapchain(&self) -> &B::Swapchain {
        &self.swapchain
    }

    #[inline]
    pub fn queue(&self, queue_type: CommandListType) -> &B::CommandQueue {
        &self.queues[queue_type.index()].queue
    }

    #[inline]
    pub fn fence(&self, queue_type: CommandListType) -> &B::Fence {
        &self.queues[queue_type.index()].fence
    }

    #[inline]
    pub fn default_render_pass(&self) -> &B::RenderPass {
        &self.default_render_pass
    }

    #[inline]
    pub fn default_textures(&self) -> &DefaultTextures {
        &self.default_textures
    }

    #[inline]
    pub fn frame_buffer_count(&self) -> u32 {
        self.frame_buffer_count
    }

    /// Frame slot being recorded, `frame_number % frame_buffer_count`.
    #[inline]
    pub fn current_frame_index(&self) -> u32 {
        self.current_frame
    }

    #[inline]
    pub fn back_buffer_index(&self) -> u32 {
        self.back_buffer_index
    }

    /// Number of frames ended so far.
    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    #[inline]
    pub fn extent(&self) -> Extent2D {
        self.swapchain.extent()
    }

    #[inline]
    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    #[inline]
    pub fn is_in_frame(&self) -> bool {
        self.state != FrameState::Idle
    }

    fn expect_state(&self, expected: FrameState) -> RenderResult<()> {
        if self.state != expected {
            return Err(RenderError::FrameState {
                expected: expected.name(),
                actual: self.state.name(),
            });
        }
        Ok(())
    }

    fn open_list(&mut self, list_type: CommandListType) -> RhiResult<&mut B::CommandList> {
        self.frames[self.current_frame as usize].contexts[list_type.index()].open(&self.device)
    }

    /// Wait for the slot's previous work, acquire the next back buffer and open the graphics list.
    /// Returns the acquired back buffer index.
    #[profiling::function]
    pub fn begin_draw_frame(&mut self) -> RenderResult<u32> {
        self.expect_state(FrameState::Idle)?;

        let frame = &mut self.frames[self.current_frame as usize];
        for (queue, &value) in self.queues.iter().zip(&frame.fence_values) {
            queue.fence.wait(value)?;
        }
        for context in &mut frame.contexts {
            context.reset()?;
        }

        // a failed acquire signals nothing, so the value is only taken once it succeeded
        let graphics = &mut self.queues[CommandListType::Graphics.index()];
        let acquire_value = graphics.last_value + 1;
        self.back_buffer_index = self
            .swapchain
            .prepare_next_image(&graphics.queue, &graphics.fence, acquire_value)?;
        graphics.last_value = acquire_value;
        frame.fence_values[CommandListType::Graphics.index()] = acquire_value;

        frame.contexts[CommandListType::Graphics.index()].open(&self.device)?;
        self.state = FrameState::Recording;
        Ok(self.back_buffer_index)
    }

    /// Transition the acquired back buffer to a render target and begin the default render pass.
    #[profiling::function]
    pub fn begin_swapchain_render_pass(&mut self, clear_color: [f32; 4]) -> RenderResult<()> {
        self.expect_state(FrameState::Recording)?;

        let index = self.back_buffer_index;
        let extent = self.swapchain.extent();
        let frame = &mut self.frames[self.current_frame as usize];
        let list = frame.contexts[CommandListType::Graphics.index()].open(&self.device)?;
        let targets = self.targets.as_ref().ok_or(RenderError::FrameState {
            expected: "presentable",
            actual: "without swapchain targets",
        })?;

        list.transition_texture(
            self.swapchain.back_buffer(index),
            ResourceState::Present,
            ResourceState::RenderTarget,
        )?;
        list.begin_render_pass(
            &self.default_render_pass,
            &targets.frame_buffers[index as usize],
            &[ClearValue::Color(clear_color), ClearValue::DEPTH_ONE],
        )?;
        list.set_viewport(&Viewport::from_extent(extent))?;
        list.set_scissor(&ScissorRect::from_extent(extent))?;

        self.state = FrameState::SwapchainPass;
        Ok(())
    }

    pub fn end_swapchain_render_pass(&mut self) -> RenderResult<()> {
        self.expect_state(FrameState::SwapchainPass)?;
        self.open_list(CommandListType::Graphics)?.end_render_pass()?;
        self.state = FrameState::Recording;
        Ok(())
    }

    /// Transition the back buffer for presentation, submit every open list and present.
    #[profiling::function]
    pub fn end_draw_frame(&mut self) -> RenderResult<()> {
        self.expect_state(FrameState::Recording)?;

        let index = self.back_buffer_index;
        let list = self.frames[self.current_frame as usize].contexts[CommandListType::Graphics.index()]
            .open(&self.device)?;
        list.transition_texture(
            self.swapchain.back_buffer(index),
            ResourceState::RenderTarget,
            ResourceState::Present,
        )?;

        for list_type in [CommandListType::Compute, CommandListType::Copy] {
            if self.frames[self.current_frame as usize].contexts[list_type.index()].is_open() {
                self.flush_gpu_commands(list_type, false)?;
            }
        }
        let rendered = self.flush_gpu_commands(CommandListType::Graphics, false)?;
        self.state = FrameState::Idle;

        let graphics = &self.queues[CommandListType::Graphics.index()];
        self.swapchain.present(&graphics.queue, &graphics.fence, rendered)?;

        self.frame_number += 1;
        self.current_frame = (self.current_frame + 1) % self.frame_buffer_count;
        Ok(())
    }

    /// The open list of `list_type` for the current frame, opened on first use.
    pub fn recorder(&mut self, list_type: CommandListType) -> RenderResult<FrameRecorder<'_, B>> {
        if self.state == FrameState::Idle {
            return Err(RenderError::FrameState {
                expected: "recording",
                actual: FrameState::Idle.name(),
            });
        }
        let frame_index = self.current_frame;
        let list = self.frames[frame_index as usize].contexts[list_type.index()].open(&self.device)?;
        Ok(FrameRecorder {
            list,
            registry: &self.registry,
            frame_index,
        })
    }

    /// Submit what `list_type` recorded so far and signal its fence. Returns the signalled value.
    /// With `still_mid_frame` a fresh list is opened for the rest of the frame.
    #[profiling::function]
    pub fn flush_gpu_commands(&mut self, list_type: CommandListType, still_mid_frame: bool) -> RenderResult<u64> {
        if still_mid_frame && self.state == FrameState::Idle {
            return Err(RenderError::FrameState {
                expected: "recording",
                actual: FrameState::Idle.name(),
            });
        }

        let frame = &mut self.frames[self.current_frame as usize];
        let context = &mut frame.contexts[list_type.index()];
        let queue = &mut self.queues[list_type.index()];
        if let Some(list) = context.close()? {
            queue.queue.execute(&[list])?;
        }
        let value = queue.next_value();
        queue.queue.signal(&queue.fence, value)?;
        frame.fence_values[list_type.index()] = value;

        if still_mid_frame {
            context.open(&self.device)?;
        }
        debug!("Flushed {:?} commands, fence value {}", list_type, value);
        Ok(value)
    }

    /// Make the `queue_type` queue wait for its own fence to reach `value`, and block the calling
    /// thread as well with `stop_cpu`.
    #[profiling::function]
    pub fn wait_execution_gpu_commands(&self, queue_type: CommandListType, value: u64, stop_cpu: bool) -> RenderResult<()> {
        let queue = &self.queues[queue_type.index()];
        queue.queue.wait(&queue.fence, value)?;
        if stop_cpu {
            queue.fence.wait(value)?;
        }
        Ok(())
    }

    /// Make `waiting` wait on the GPU until `signaler`'s fence reaches `value`.
    pub fn wait_queue_for(&self, waiting: CommandListType, signaler: CommandListType, value: u64) -> RenderResult<()> {
        let fence = &self.queues[signaler.index()].fence;
        self.queues[waiting.index()].queue.wait(fence, value)?;
        Ok(())
    }

    /// Block until every queue finished everything submitted so far.
    #[profiling::function]
    pub fn wait_idle(&self) -> RenderResult<()> {
        for queue in &self.queues {
            queue.fence.wait(queue.last_value)?;
        }
        self.device.wait_idle()?;
        Ok(())
    }

    /// Resize the swapchain and rebuild its depth buffer and frame buffers. Returns `false`
    /// when the extent is unchanged.
    #[profiling::function]
    pub fn resize(&mut self, width: u32, height: u32) -> RenderResult<bool> {
        self.expect_state(FrameState::Idle)?;
        if width == 0 || height == 0 {
            return Err(RhiError::InvalidExtent { width, height }.into());
        }
        if self.swapchain.extent() == Extent2D::new(width, height) {
            return Ok(false);
        }

        self.wait_idle()?;
        self.targets = None;
        self.swapchain.resize(width, height)?;
        self.targets = Some(SwapchainTargets::new(&self.device, &self.swapchain, &self.default_render_pass)?);
        self.back_buffer_index = 0;

        info!("Swapchain resized to {}x{}", width, height);
        Ok(true)
    }

    /// Record with a fresh list of `list_type`, submit it and block until the GPU finished it.
    pub fn execute_immediately<F>(&mut self, list_type: CommandListType, record: F) -> RenderResult<()>
    where
        F: FnOnce(&mut B::CommandList, &GpuRegistry<B>) -> RenderResult<()>,
    {
        if list_type == CommandListType::Graphics && self.state != FrameState::Idle {
            return Err(RenderError::FrameState {
                expected: FrameState::Idle.name(),
                actual: self.state.name(),
            });
        }
        if self.frames[self.current_frame as usize].contexts[list_type.index()].is_open() {
            self.flush_gpu_commands(list_type, false)?;
        }

        let context = &mut self.frames[self.current_frame as usize].contexts[list_type.index()];
        let recorded = record(context.open(&self.device)?, &self.registry);
        if let Err(error) = recorded {
            // keep the allocator resettable
            let _ = context.close();
            return Err(error);
        }

        let value = self.flush_gpu_commands(list_type, false)?;
        self.queues[list_type.index()].fence.wait(value)?;
        Ok(())
    }

    /// Fill a GPU-only buffer through a staging buffer on the copy queue.
    #[profiling::function]
    pub fn upload_buffer(&mut self, handle: BufferHandle, data: &[u8]) -> RenderResult<()> {
        let meta = self.registry.buffer(handle)?.meta();
        if data.len() as u64 > meta.byte_size() {
            return Err(RhiError::InvalidDescriptor(format!(
                "{} bytes do not fit into buffer `{}` of {} bytes",
                data.len(),
                meta.name,
                meta.byte_size()
            ))
            .into());
        }
        let size = u32::try_from(data.len())
            .map_err(|_| RhiError::InvalidDescriptor(format!("upload of {} bytes is too large", data.len())))?;

        let staging = self
            .device
            .create_buffer(&GpuBufferMetaData::upload_buffer(format!("{} upload", meta.name), size))?;
        staging.write(0, data)?;

        self.execute_immediately(CommandListType::Copy, |list, registry| {
            list.copy_buffer(registry.buffer(handle)?, 0, &staging, 0, size as u64)?;
            Ok(())
        })
    }

    fn create_default_textures(&mut self) -> RenderResult<DefaultTextures> {
        const COLORS: [(&str, [f32; 4]); 3] = [
            ("default white", [1.0, 1.0, 1.0, 1.0]),
            ("default black", [0.0, 0.0, 0.0, 1.0]),
            ("default normal", [0.5, 0.5, 1.0, 1.0]),
        ];

        let render_pass = self.device.create_render_pass(
            &RenderPassDesc::new("default textures").with_color(
                AttachmentDesc::color(DEFAULT_TEXTURE_FORMAT)
                    .with_states(ResourceState::ShaderResource, ResourceState::ShaderResource),
            ),
        )?;

        let mut views = SmallVec::<[ViewHandle; 3]>::new();
        let mut render_targets = SmallVec::<[B::ResourceView; 3]>::new();
        let mut frame_buffers = SmallVec::<[B::FrameBuffer; 3]>::new();
        for (name, _) in COLORS {
            let texture = self
                .registry
                .create_texture(&self.device, &GpuTextureMetaData::render_target(name, 1, 1, DEFAULT_TEXTURE_FORMAT))?;
            let render_target = self.device.create_resource_view(
                ResourceRef::Texture(self.registry.texture(texture)?),
                &ResourceViewDesc::render_target(),
            )?;
            frame_buffers.push(self.device.create_frame_buffer(
                &render_pass,
                &FrameBufferDesc {
                    render_targets: &[&render_target],
                    depth_stencil: None,
                    width: 1,
                    height: 1,
                },
            )?);
            render_targets.push(render_target);
            views.push(
                self.registry
                    .create_texture_view(&self.device, texture, &ResourceViewDesc::shader_resource())?,
            );
        }

        self.execute_immediately(CommandListType::Graphics, |list, _| {
            for (frame_buffer, (_, color)) in frame_buffers.iter().zip(COLORS) {
                list.begin_render_pass(&render_pass, frame_buffer, &[ClearValue::Color(color)])?;
                list.end_render_pass()?;
            }
            Ok(())
        })?;

        Ok(DefaultTextures {
            white: views[0],
            black: views[1],
            flat_normal: views[2],
        })
    }
}

impl<B: Backend> Drop for LowLevelGraphicsEngine<B> {
    fn drop(&mut self) {
        if let Err(error) = self.wait_idle() {
            prism_core::log::error!("Failed to wait for the GPU before shutdown: {}", error);
        }
    }
}
