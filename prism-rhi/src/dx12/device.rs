//! Device, native descriptor heaps and object factory.

use windows::core::{Interface, HSTRING};
use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::*;
use windows::Win32::UI::WindowsAndMessaging::{MessageBoxW, MB_ICONERROR, MB_OK};
use crate::adapter::AdapterInfo;
use crate::backend::{DeviceCapabilities, DeviceDesc, ResourceRef, RhiDescriptorHeap, RhiDevice};
use crate::error::{RhiError, RhiResult, ResultExt};
use crate::heap::{DescriptorAllocator, DescriptorHeapDesc, DescriptorSlot};
use crate::layout::ResourceLayoutDesc;
use crate::pipeline::{ComputePipelineDesc, GraphicsPipelineDesc};
use crate::render_pass::{FrameBufferDesc, RenderPassDesc};
use crate::resource::{AccelerationStructureDesc, GpuBufferMetaData, GpuTextureMetaData, ResourceViewDesc, SamplerDesc};
use crate::shader::{ShaderBlob, ShaderCompileDesc, ShaderCompiler, ShaderTarget};
use crate::swapchain::SwapchainDesc;
use crate::types::{CommandListType, DescriptorHeapType, WindowInfo};
use super::command::{Dx12CommandAllocator, Dx12CommandList};
use super::conv;
use super::instance::{tearing_supported, PhysicalAdapter};
use super::layout::Dx12ResourceLayout;
use super::pipeline::{Dx12ComputePipeline, Dx12GraphicsPipeline};
use super::queue::{Dx12CommandQueue, Dx12Fence};
use super::resource::{
    Dx12AccelerationStructure, Dx12Buffer, Dx12FrameBuffer, Dx12RenderPass, Dx12ResourceView, Dx12Sampler, Dx12Texture,
};
use super::swapchain::Dx12Swapchain;
use super::DirectX12;

/// Native descriptor heap with engine side slot bookkeeping. A slot index is the offset of its
/// descriptor from the heap start.
pub struct Dx12DescriptorHeap {
    heap: ID3D12DescriptorHeap,
    allocator: DescriptorAllocator,
    cpu_start: D3D12_CPU_DESCRIPTOR_HANDLE,
    gpu_start: Option<D3D12_GPU_DESCRIPTOR_HANDLE>,
    increment: u32,
}

impl Dx12DescriptorHeap {
    pub(crate) fn new(device: &ID3D12Device, desc: &DescriptorHeapDesc) -> RhiResult<Self> {
        let native_type = conv::descriptor_heap_type(desc.heap_type);
        let shader_visible = desc.shader_visible
            && matches!(
                native_type,
                D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV | D3D12_DESCRIPTOR_HEAP_TYPE_SAMPLER
            );
        if desc.shader_visible && !shader_visible {
            return Err(RhiError::InvalidDescriptor(format!(
                "{:?} descriptor heaps can not be shader visible",
                desc.heap_type
            )));
        }

        let heap_desc = D3D12_DESCRIPTOR_HEAP_DESC {
            Type: native_type,
            NumDescriptors: desc.capacity.max(1),
            Flags: if shader_visible {
                D3D12_DESCRIPTOR_HEAP_FLAG_SHADER_VISIBLE
            } else {
                D3D12_DESCRIPTOR_HEAP_FLAG_NONE
            },
            NodeMask: 0,
        };
        let heap: ID3D12DescriptorHeap =
            unsafe { device.CreateDescriptorHeap(&heap_desc) }.context("CreateDescriptorHeap")?;
        set_debug_name(&heap, &format!("{:?} descriptor heap", desc.heap_type));

        let cpu_start = unsafe { heap.GetCPUDescriptorHandleForHeapStart() };
        let gpu_start = shader_visible.then(|| unsafe { heap.GetGPUDescriptorHandleForHeapStart() });
        let increment = unsafe { device.GetDescriptorHandleIncrementSize(native_type) };

        Ok(Self {
            heap,
            allocator: DescriptorAllocator::new(desc.heap_type, desc.capacity),
            cpu_start,
            gpu_start,
            increment,
        })
    }

    #[inline]
    pub fn handle(&self) -> &ID3D12DescriptorHeap {
        &self.heap
    }

    #[inline]
    pub(crate) fn cpu_handle(&self, index: u32) -> D3D12_CPU_DESCRIPTOR_HANDLE {
        D3D12_CPU_DESCRIPTOR_HANDLE {
            ptr: self.cpu_start.ptr + index as usize * self.increment as usize,
        }
    }

    /// `None` for cpu only heaps.
    #[inline]
    pub(crate) fn gpu_handle(&self, index: u32) -> Option<D3D12_GPU_DESCRIPTOR_HANDLE> {
        self.gpu_start.map(|start| D3D12_GPU_DESCRIPTOR_HANDLE {
            ptr: start.ptr + index as u64 * self.increment as u64,
        })
    }

    /// Take a slot together with its cpu descriptor handle.
    pub(crate) fn allocate_handle(&self) -> RhiResult<(DescriptorSlot, D3D12_CPU_DESCRIPTOR_HANDLE)> {
        let slot = self.allocator.allocate()?;
        let handle = self.cpu_handle(slot.index());
        Ok((slot, handle))
    }
}

impl RhiDescriptorHeap for Dx12DescriptorHeap {
    #[inline]
    fn heap_type(&self) -> DescriptorHeapType {
        self.allocator.heap_type()
    }

    #[inline]
    fn capacity(&self) -> u32 {
        self.allocator.capacity()
    }

    #[inline]
    fn allocated(&self) -> u32 {
        self.allocator.allocated()
    }

    fn allocate(&self) -> RhiResult<DescriptorSlot> {
        self.allocator.allocate()
    }
}

/// Name a native object after its engine side name in debugging tools.
pub(crate) fn set_debug_name<T: Interface>(object: &T, name: &str) {
    if name.is_empty() {
        return;
    }
    if let Ok(object) = object.cast::<ID3D12Object>() {
        if let Err(e) = unsafe { object.SetName(&HSTRING::from(name)) } {
            log::debug!("Failed to set debug name {name}: {e}");
        }
    }
}

pub struct Dx12Device {
    factory: IDXGIFactory6,
    adapter: IDXGIAdapter1,
    info: AdapterInfo,
    capabilities: DeviceCapabilities,
    device: ID3D12Device,
    heaps: [Dx12DescriptorHeap; 6],
    window: Option<WindowInfo>,
    tearing: bool,
    validation: bool,
}

impl Dx12Device {
    pub(crate) fn new(
        factory: IDXGIFactory6,
        adapter: &PhysicalAdapter,
        device: ID3D12Device,
        capabilities: DeviceCapabilities,
        desc: &DeviceDesc,
        window: Option<WindowInfo>,
        validation: bool,
    ) -> RhiResult<Self> {
        let heaps = DescriptorHeapType::ALL
            .into_iter()
            .map(|heap_type| {
                Dx12DescriptorHeap::new(
                    &device,
                    &DescriptorHeapDesc {
                        heap_type,
                        capacity: heap_type.capacity(&desc.heap_capacities),
                        shader_visible: false,
                    },
                )
            })
            .collect::<RhiResult<Vec<_>>>()?;
        let heaps: [Dx12DescriptorHeap; 6] = heaps
            .try_into()
            .map_err(|_| RhiError::backend("creating descriptor heaps", "one heap per heap type expected"))?;

        let tearing = tearing_supported(&factory);
        set_debug_name(&device, &adapter.info.name);
        log::info!("DirectX12 device created on {} (tearing {})", adapter.info.name, tearing);

        Ok(Self {
            factory,
            adapter: adapter.adapter.clone(),
            info: adapter.info.clone(),
            capabilities,
            device,
            heaps,
            window,
            tearing,
            validation,
        })
    }

    #[inline]
    pub fn handle(&self) -> &ID3D12Device {
        &self.device
    }

    #[inline]
    pub(crate) fn factory(&self) -> &IDXGIFactory6 {
        &self.factory
    }

    #[inline]
    pub(crate) fn adapter(&self) -> &IDXGIAdapter1 {
        &self.adapter
    }

    #[inline]
    pub(crate) fn window(&self) -> Option<&WindowInfo> {
        self.window.as_ref()
    }

    #[inline]
    pub(crate) fn tearing_supported(&self) -> bool {
        self.tearing
    }

    #[inline]
    pub(crate) fn heap(&self, heap_type: DescriptorHeapType) -> &Dx12DescriptorHeap {
        &self.heaps[heap_type.index()]
    }

    /// Log every message the debug layer queued since the last call.
    pub fn drain_debug_messages(&self) {
        if !self.validation {
            return;
        }
        let Ok(queue) = self.device.cast::<ID3D12InfoQueue>() else {
            return;
        };
        unsafe {
            for index in 0..queue.GetNumStoredMessages() {
                let mut length = 0usize;
                if queue.GetMessage(index, None, &mut length).is_err() || length == 0 {
                    continue;
                }
                let mut bytes = vec![0u8; length];
                let message = bytes.as_mut_ptr() as *mut D3D12_MESSAGE;
                if queue.GetMessage(index, Some(message), &mut length).is_err() {
                    continue;
                }
                let text = (*message).pDescription.to_string().unwrap_or_default();
                match (*message).Severity {
                    D3D12_MESSAGE_SEVERITY_CORRUPTION | D3D12_MESSAGE_SEVERITY_ERROR => log::error!("{text}"),
                    D3D12_MESSAGE_SEVERITY_WARNING => log::warn!("{text}"),
                    _ => log::debug!("{text}"),
                }
            }
            queue.ClearStoredMessages();
        }
    }
}

/// Blocking error box, shader authors notice failures without watching the log.
fn show_compile_error(path: &str, message: &str) {
    let text = HSTRING::from(format!("{path}\n\n{message}"));
    let caption = HSTRING::from("Shader compilation failed");
    unsafe {
        MessageBoxW(HWND::default(), &text, &caption, MB_OK | MB_ICONERROR);
    }
}

impl RhiDevice<DirectX12> for Dx12Device {
    #[inline]
    fn adapter_info(&self) -> &AdapterInfo {
        &self.info
    }

    #[inline]
    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    #[inline]
    fn shader_target(&self) -> ShaderTarget {
        ShaderTarget::Dxil
    }

    fn compile_shader(&self, desc: &ShaderCompileDesc) -> RhiResult<ShaderBlob> {
        let result = ShaderCompiler::new(self.shader_target()).compile(desc);
        if let Err(RhiError::ShaderCompilation { path, message }) = &result {
            show_compile_error(path, message);
        }
        result
    }

    #[inline]
    fn descriptor_heap(&self, heap_type: DescriptorHeapType) -> &Dx12DescriptorHeap {
        self.heap(heap_type)
    }

    fn create_buffer(&self, meta: &GpuBufferMetaData) -> RhiResult<Dx12Buffer> {
        Dx12Buffer::new(self, meta)
    }

    fn create_texture(&self, meta: &GpuTextureMetaData) -> RhiResult<Dx12Texture> {
        Dx12Texture::new(self, meta)
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> RhiResult<Dx12Sampler> {
        Dx12Sampler::new(self, desc)
    }

    fn create_resource_view(&self, resource: ResourceRef<'_, DirectX12>, desc: &ResourceViewDesc) -> RhiResult<Dx12ResourceView> {
        Dx12ResourceView::new(self, resource, desc)
    }

    fn create_command_queue(&self, queue_type: CommandListType) -> RhiResult<Dx12CommandQueue> {
        Dx12CommandQueue::new(self, queue_type)
    }

    fn create_command_allocator(&self, list_type: CommandListType) -> RhiResult<Dx12CommandAllocator> {
        Dx12CommandAllocator::new(self, list_type)
    }

    fn create_command_list(&self, allocator: &Dx12CommandAllocator) -> RhiResult<Dx12CommandList> {
        Dx12CommandList::new(self, allocator)
    }

    fn create_swapchain(&self, queue: &Dx12CommandQueue, desc: &SwapchainDesc) -> RhiResult<Dx12Swapchain> {
        if queue.queue_type() != CommandListType::Graphics {
            return Err(RhiError::InvalidDescriptor("swapchains present on the graphics queue".to_owned()));
        }
        Dx12Swapchain::new(self, queue, desc)
    }

    fn create_descriptor_heap(&self, desc: &DescriptorHeapDesc) -> RhiResult<Dx12DescriptorHeap> {
        Dx12DescriptorHeap::new(&self.device, desc)
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> RhiResult<Dx12RenderPass> {
        desc.validate()?;
        Ok(Dx12RenderPass::new(desc.clone()))
    }

    fn create_frame_buffer(&self, render_pass: &Dx12RenderPass, desc: &FrameBufferDesc<'_, DirectX12>) -> RhiResult<Dx12FrameBuffer> {
        Dx12FrameBuffer::new(render_pass, desc)
    }

    fn create_resource_layout(&self, desc: &ResourceLayoutDesc) -> RhiResult<Dx12ResourceLayout> {
        Dx12ResourceLayout::new(self, desc)
    }

    fn create_graphics_pipeline(
        &self,
        layout: &Dx12ResourceLayout,
        desc: &GraphicsPipelineDesc<'_>,
    ) -> RhiResult<Dx12GraphicsPipeline> {
        Dx12GraphicsPipeline::new(self, layout, desc)
    }

    fn create_compute_pipeline(
        &self,
        layout: &Dx12ResourceLayout,
        desc: &ComputePipelineDesc<'_>,
    ) -> RhiResult<Dx12ComputePipeline> {
        Dx12ComputePipeline::new(self, layout, desc)
    }

    fn create_fence(&self, initial_value: u64) -> RhiResult<Dx12Fence> {
        Dx12Fence::new(self, initial_value)
    }

    fn create_acceleration_structure(&self, desc: &AccelerationStructureDesc) -> RhiResult<Dx12AccelerationStructure> {
        self.capabilities.require_raytracing()?;
        Dx12AccelerationStructure::new(self, desc)
    }

    /// Flush a throwaway direct queue, which completes after every queue of the device drained
    /// the work submitted before it.
    fn wait_idle(&self) -> RhiResult<()> {
        let queue = Dx12CommandQueue::new(self, CommandListType::Graphics)?;
        let fence = Dx12Fence::new(self, 0)?;
        crate::backend::RhiCommandQueue::signal(&queue, &fence, 1)?;
        crate::backend::RhiFence::wait(&fence, 1)
    }
}
