//! Vulkan 1.3 backend.
//!
//! Built on dynamic rendering, synchronization2 and timeline semaphores. HLSL is compiled to
//! SPIR-V with fixed register shifts, and every register space becomes one descriptor set.

mod barrier;
mod command;
mod conv;
pub(crate) mod device;
mod instance;
mod layout;
mod pipeline;
mod queue;
mod resource;
mod swapchain;

use prism_core::config::GraphicsApi;
use crate::backend::Backend;
use crate::heap::DescriptorAllocator;

pub use command::{VulkanCommandAllocator, VulkanCommandList};
pub use device::VulkanDevice;
pub use instance::VulkanInstance;
pub use layout::VulkanResourceLayout;
pub use pipeline::{VulkanComputePipeline, VulkanGraphicsPipeline};
pub use queue::{VulkanCommandQueue, VulkanFence};
pub use resource::{
    VulkanAccelerationStructure, VulkanBuffer, VulkanFrameBuffer, VulkanRenderPass, VulkanResourceView,
    VulkanSampler, VulkanTexture,
};
pub use swapchain::VulkanSwapchain;

pub struct Vulkan;

impl Backend for Vulkan {
    const API: GraphicsApi = GraphicsApi::Vulkan;

    type Instance = VulkanInstance;
    type Device = VulkanDevice;
    type CommandQueue = VulkanCommandQueue;
    type CommandAllocator = VulkanCommandAllocator;
    type CommandList = VulkanCommandList;
    type Fence = VulkanFence;
    type Swapchain = VulkanSwapchain;
    type Buffer = VulkanBuffer;
    type Texture = VulkanTexture;
    type ResourceView = VulkanResourceView;
    type Sampler = VulkanSampler;
    type DescriptorHeap = DescriptorAllocator;
    type RenderPass = VulkanRenderPass;
    type FrameBuffer = VulkanFrameBuffer;
    type ResourceLayout = VulkanResourceLayout;
    type GraphicsPipeline = VulkanGraphicsPipeline;
    type ComputePipeline = VulkanComputePipeline;
    type AccelerationStructure = VulkanAccelerationStructure;
}
