//! Headless backend.
//!
//! Records every command instead of executing it and keeps an ordered log of queue activity.
//! Fences are real cpu timelines and swapchains simulate a presentation surface, so frame
//! orchestration runs unmodified on machines without a gpu.

mod command;
mod device;
mod queue;
mod resource;
mod swapchain;

use std::sync::atomic::{AtomicU64, Ordering};
use prism_core::config::GraphicsApi;
use crate::backend::Backend;
use crate::heap::DescriptorAllocator;

pub use command::{HeadlessCommand, HeadlessCommandAllocator, HeadlessCommandList};
pub use device::{HeadlessDevice, HeadlessInstance, SimulatedSurface};
pub use queue::{HeadlessCommandQueue, HeadlessFence, QueueEvent};
pub use resource::{
    HeadlessAccelerationStructure, HeadlessBuffer, HeadlessComputePipeline, HeadlessFrameBuffer,
    HeadlessGraphicsPipeline, HeadlessRenderPass, HeadlessResourceLayout, HeadlessResourceView,
    HeadlessSampler, HeadlessTexture,
};
pub use swapchain::{HeadlessSwapchain, SimulatedStatus};

/// Identity of a headless object, unique for the lifetime of the process.
pub type ObjectId = u64;

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_object_id() -> ObjectId {
    NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed)
}

pub struct Headless;

impl Backend for Headless {
    const API: GraphicsApi = GraphicsApi::Headless;

    type Instance = HeadlessInstance;
    type Device = HeadlessDevice;
    type CommandQueue = HeadlessCommandQueue;
    type CommandAllocator = HeadlessCommandAllocator;
    type CommandList = HeadlessCommandList;
    type Fence = HeadlessFence;
    type Swapchain = HeadlessSwapchain;
    type Buffer = HeadlessBuffer;
    type Texture = HeadlessTexture;
    type ResourceView = HeadlessResourceView;
    type Sampler = HeadlessSampler;
    type DescriptorHeap = DescriptorAllocator;
    type RenderPass = HeadlessRenderPass;
    type FrameBuffer = HeadlessFrameBuffer;
    type ResourceLayout = HeadlessResourceLayout;
    type GraphicsPipeline = HeadlessGraphicsPipeline;
    type ComputePipeline = HeadlessComputePipeline;
    type AccelerationStructure = HeadlessAccelerationStructure;
}
