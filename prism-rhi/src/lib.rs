//! Prism RHI (Render Hardware Interface).
//!
//! One api surface over Vulkan, DirectX12 and a headless recorder. Engine code is generic over
//! [`Backend`] and picks the implementation once at startup.

pub mod adapter;
pub mod backend;
pub mod command;
pub mod error;
pub mod flags;
pub mod format;
pub mod heap;
pub mod layout;
pub mod pipeline;
pub mod render_pass;
pub mod resource;
pub mod shader;
pub mod swapchain;
pub mod types;
pub mod vertex;

pub mod headless;
pub mod vulkan;
#[cfg(windows)]
pub mod dx12;

mod utility;

extern crate self as prism_rhi;

pub(crate) use paste::paste;

pub use memoffset;
pub use prism_rhi_derive::VertexLayout;

pub use adapter::{rank_adapters, AdapterInfo, AdapterKind, ApiVersion};
pub use backend::{
    Backend, DeviceCapabilities, DeviceDesc, InstanceDesc, ResourceRef, RhiBuffer, RhiCommandAllocator,
    RhiCommandList, RhiCommandQueue, RhiDescriptorHeap, RhiDevice, RhiFence, RhiFrameBuffer, RhiInstance,
    RhiRenderPass, RhiResourceLayout, RhiResourceView, RhiSampler, RhiSwapchain, RhiTexture,
};
pub use error::{BindingMismatch, RhiError, RhiResult};
pub use flags::{
    BufferCreateFlagSet, BufferCreateFlags, ColorMask, ColorMasks, ResourceUsage, ResourceUsages,
};
pub use format::{ColorSpace, PixelFormat, PresentMode, SurfaceFormat};
pub use heap::{DescriptorAllocator, DescriptorHeapDesc, DescriptorSlot};
pub use layout::{PushConstantRange, ResourceLayoutDesc, ResourceLayoutElement, SamplerLayoutElement};
pub use pipeline::{
    BlendFactor, BlendOp, BlendState, ComputePipelineDesc, ComputePipelineState, CullMode,
    DepthStencilState, FillMode, FrontFace, GraphicsPipelineDesc, GraphicsPipelineState,
    InputAssemblyState, PipelineFactory, PrimitiveTopology, RasterizerState, RenderTargetBlend,
    StencilFaceState, StencilOp,
};
pub use render_pass::{
    AttachmentDesc, AttachmentLoad, AttachmentStore, FrameBufferDesc, RenderPassDesc, MAX_RENDER_TARGETS,
};
pub use resource::{
    align_up, AccelerationStructureDesc, AccelerationStructureKind, AddressMode, BorderColor, FilterMode,
    GpuBufferMetaData, GpuBufferMetaDataBuilder, GpuBufferMetaDataBuilderError, GpuTextureMetaData,
    GpuTextureMetaDataBuilder, GpuTextureMetaDataBuilderError, ResourceViewDesc, SamplerDesc,
    TextureDimension, CONSTANT_BUFFER_ALIGNMENT,
};
pub use shader::{ShaderBlob, ShaderCompileDesc, ShaderCompiler, ShaderModel, ShaderTarget, ShaderType};
pub use swapchain::{PresentStatus, SurfaceCapabilities, SwapchainDesc};
pub use types::{
    ClearValue, CommandListType, CompareOp, DescriptorHeapType, DescriptorType, Extent2D, IndexFormat,
    PipelineBindPoint, ResourceDimension, ResourceState, ResourceViewType, ScissorRect, ShaderVisibility,
    Viewport, WindowInfo,
};
pub use vertex::{InputElement, VertexLayout};

pub use headless::Headless;
pub use vulkan::Vulkan;
#[cfg(windows)]
pub use dx12::DirectX12;
