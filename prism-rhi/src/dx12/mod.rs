//! DirectX12 backend.
//!
//! Views live in cpu only descriptor heaps owned by the device. Bind calls copy them into a
//! shader visible ring owned by the command allocator, one descriptor table per register space.
//! Shaders are compiled to validated DXIL.

mod barrier;
mod command;
mod conv;
mod device;
mod instance;
mod layout;
mod pipeline;
mod queue;
mod resource;
mod swapchain;

use prism_core::config::GraphicsApi;
use crate::backend::Backend;

pub use command::{Dx12CommandAllocator, Dx12CommandList};
pub use device::{Dx12DescriptorHeap, Dx12Device};
pub use instance::Dx12Instance;
pub use layout::Dx12ResourceLayout;
pub use pipeline::{Dx12ComputePipeline, Dx12GraphicsPipeline};
pub use queue::{Dx12CommandQueue, Dx12Fence};
pub use resource::{
    Dx12AccelerationStructure, Dx12Buffer, Dx12FrameBuffer, Dx12RenderPass, Dx12ResourceView, Dx12Sampler,
    Dx12Texture,
};
pub use swapchain::Dx12Swapchain;

pub struct DirectX12;

impl Backend for DirectX12 {
    const API: GraphicsApi = GraphicsApi::DirectX12;

    type Instance = Dx12Instance;
    type Device = Dx12Device;
    type CommandQueue = Dx12CommandQueue;
    type CommandAllocator = Dx12CommandAllocator;
    type CommandList = Dx12CommandList;
    type Fence = Dx12Fence;
    type Swapchain = Dx12Swapchain;
    type Buffer = Dx12Buffer;
    type Texture = Dx12Texture;
    type ResourceView = Dx12ResourceView;
    type Sampler = Dx12Sampler;
    type DescriptorHeap = Dx12DescriptorHeap;
    type RenderPass = Dx12RenderPass;
    type FrameBuffer = Dx12FrameBuffer;
    type ResourceLayout = Dx12ResourceLayout;
    type GraphicsPipeline = Dx12GraphicsPipeline;
    type ComputePipeline = Dx12ComputePipeline;
    type AccelerationStructure = Dx12AccelerationStructure;
}
