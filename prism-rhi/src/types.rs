//! Plain data types shared by every backend.

use raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, RawDisplayHandle,
    RawWindowHandle, WindowHandle,
};

/// Queue and command list kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandListType {
    Graphics,
    Compute,
    Copy,
}

impl CommandListType {
    pub const COUNT: usize = 3;
    pub const ALL: [CommandListType; Self::COUNT] =
        [CommandListType::Graphics, CommandListType::Compute, CommandListType::Copy];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Descriptor kinds a resource layout can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    ConstantBuffer,
    ShaderResource,
    UnorderedAccess,
}

/// Kinds of resource views a device can create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceViewType {
    ConstantBuffer,
    ShaderResource,
    UnorderedAccess,
    RenderTarget,
    DepthStencil,
}

impl ResourceViewType {
    pub fn heap_type(self) -> DescriptorHeapType {
        match self {
            ResourceViewType::ConstantBuffer => DescriptorHeapType::Cbv,
            ResourceViewType::ShaderResource => DescriptorHeapType::Srv,
            ResourceViewType::UnorderedAccess => DescriptorHeapType::Uav,
            ResourceViewType::RenderTarget => DescriptorHeapType::Rtv,
            ResourceViewType::DepthStencil => DescriptorHeapType::Dsv,
        }
    }

    pub fn descriptor_type(self) -> Option<DescriptorType> {
        match self {
            ResourceViewType::ConstantBuffer => Some(DescriptorType::ConstantBuffer),
            ResourceViewType::ShaderResource => Some(DescriptorType::ShaderResource),
            ResourceViewType::UnorderedAccess => Some(DescriptorType::UnorderedAccess),
            ResourceViewType::RenderTarget | ResourceViewType::DepthStencil => None,
        }
    }
}

/// Index spaces owned by the device. Every view or sampler creation consumes one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorHeapType {
    Rtv,
    Dsv,
    Cbv,
    Srv,
    Uav,
    Sampler,
}

impl DescriptorHeapType {
    pub const ALL: [DescriptorHeapType; 6] = [
        DescriptorHeapType::Rtv,
        DescriptorHeapType::Dsv,
        DescriptorHeapType::Cbv,
        DescriptorHeapType::Srv,
        DescriptorHeapType::Uav,
        DescriptorHeapType::Sampler,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn capacity(self, capacities: &prism_core::config::HeapCapacities) -> u32 {
        match self {
            DescriptorHeapType::Rtv => capacities.rtv,
            DescriptorHeapType::Dsv => capacities.dsv,
            DescriptorHeapType::Cbv => capacities.cbv,
            DescriptorHeapType::Srv => capacities.srv,
            DescriptorHeapType::Uav => capacities.uav,
            DescriptorHeapType::Sampler => capacities.samplers,
        }
    }
}

/// Whether a view describes a buffer or a texture. Vulkan needs to know at layout time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceDimension {
    Buffer,
    Texture,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShaderVisibility {
    #[default]
    All,
    Vertex,
    Hull,
    Domain,
    Geometry,
    Pixel,
    Compute,
}

/// Usage state of a resource, translated to image layouts and access masks on Vulkan and to
/// resource states on DirectX12.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    Common,
    VertexAndConstantBuffer,
    IndexBuffer,
    RenderTarget,
    UnorderedAccess,
    DepthWrite,
    DepthRead,
    ShaderResource,
    CopySource,
    CopyDestination,
    Present,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexFormat {
    UInt16,
    #[default]
    UInt32,
}

impl IndexFormat {
    pub fn byte_size(self) -> u32 {
        match self {
            IndexFormat::UInt16 => 2,
            IndexFormat::UInt32 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

impl Extent2D {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    pub fn from_extent(extent: Extent2D) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScissorRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl ScissorRect {
    pub fn from_extent(extent: Extent2D) -> Self {
        Self {
            left: 0,
            top: 0,
            right: extent.width as i32,
            bottom: extent.height as i32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u8 },
}

impl ClearValue {
    pub const BLACK: ClearValue = ClearValue::Color([0.0, 0.0, 0.0, 1.0]);
    pub const DEPTH_ONE: ClearValue = ClearValue::DepthStencil { depth: 1.0, stencil: 0 };
}

/// Native window the device presents to.
///
/// The handles are borrowed from the windowing layer, which must outlive the device.
#[derive(Debug, Clone, Copy)]
pub struct WindowInfo {
    pub width: u32,
    pub height: u32,
    pub window_handle: RawWindowHandle,
    pub display_handle: RawDisplayHandle,
}

impl WindowInfo {
    pub fn new(
        window: &(impl HasWindowHandle + HasDisplayHandle),
        width: u32,
        height: u32,
    ) -> Result<Self, HandleError> {
        Ok(Self {
            width,
            height,
            window_handle: window.window_handle()?.as_raw(),
            display_handle: window.display_handle()?.as_raw(),
        })
    }

    #[inline]
    pub fn extent(&self) -> Extent2D {
        Extent2D::new(self.width, self.height)
    }
}

impl HasWindowHandle for WindowInfo {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        // SAFETY: the windowing layer keeps the window alive while the device exists.
        Ok(unsafe { WindowHandle::borrow_raw(self.window_handle) })
    }
}

impl HasDisplayHandle for WindowInfo {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        // SAFETY: see `window_handle`.
        Ok(unsafe { DisplayHandle::borrow_raw(self.display_handle) })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    #[default]
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

/// Which pipeline a binding call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineBindPoint {
    Graphics,
    Compute,
}
