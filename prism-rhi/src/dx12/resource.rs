//! Committed resources, descriptors written into the device heaps and render pass attachments.

use std::ffi::c_void;
use prism_core::collections::SmallVec;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;
use crate::backend::{ResourceRef, RhiBuffer, RhiFrameBuffer, RhiRenderPass, RhiResourceView, RhiSampler, RhiTexture};
use crate::error::{RhiError, RhiResult, ResultExt};
use crate::flags::{BufferCreateFlags, ResourceUsage};
use crate::format::PixelFormat;
use crate::heap::DescriptorSlot;
use crate::render_pass::{FrameBufferDesc, RenderPassDesc, MAX_RENDER_TARGETS};
use crate::resource::{
    align_up, validate_view_usage, AccelerationStructureDesc, GpuBufferMetaData, GpuTextureMetaData, ResourceViewDesc,
    SamplerDesc, TextureDimension, CONSTANT_BUFFER_ALIGNMENT,
};
use crate::types::{ClearValue, DescriptorHeapType, Extent2D, ResourceViewType};
use crate::utility::normalize_range_u64;
use super::conv;
use super::device::{set_debug_name, Dx12Device};
use super::DirectX12;

fn heap_properties(heap_type: D3D12_HEAP_TYPE) -> D3D12_HEAP_PROPERTIES {
    D3D12_HEAP_PROPERTIES {
        Type: heap_type,
        CPUPageProperty: D3D12_CPU_PAGE_PROPERTY_UNKNOWN,
        MemoryPoolPreference: D3D12_MEMORY_POOL_UNKNOWN,
        CreationNodeMask: 1,
        VisibleNodeMask: 1,
    }
}

fn create_committed(
    device: &Dx12Device,
    heap_type: D3D12_HEAP_TYPE,
    desc: &D3D12_RESOURCE_DESC,
    state: D3D12_RESOURCE_STATES,
    clear_value: Option<&D3D12_CLEAR_VALUE>,
) -> RhiResult<ID3D12Resource> {
    let properties = heap_properties(heap_type);
    let mut resource: Option<ID3D12Resource> = None;
    unsafe {
        device.handle().CreateCommittedResource(
            &properties,
            D3D12_HEAP_FLAG_NONE,
            desc,
            state,
            clear_value.map(|value| value as *const _),
            &mut resource,
        )
    }
    .context("CreateCommittedResource")?;
    resource.ok_or_else(|| RhiError::backend("CreateCommittedResource", "no resource returned"))
}

fn buffer_desc(width: u64, flags: D3D12_RESOURCE_FLAGS) -> D3D12_RESOURCE_DESC {
    D3D12_RESOURCE_DESC {
        Dimension: D3D12_RESOURCE_DIMENSION_BUFFER,
        Alignment: 0,
        Width: width,
        Height: 1,
        DepthOrArraySize: 1,
        MipLevels: 1,
        Format: DXGI_FORMAT_UNKNOWN,
        SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
        Layout: D3D12_TEXTURE_LAYOUT_ROW_MAJOR,
        Flags: flags,
    }
}

/// Committed buffer. Cpu visible buffers live in upload or readback heaps.
pub struct Dx12Buffer {
    resource: ID3D12Resource,
    meta: GpuBufferMetaData,
}

impl Dx12Buffer {
    pub(crate) fn new(device: &Dx12Device, meta: &GpuBufferMetaData) -> RhiResult<Self> {
        // upload and readback heaps only allow one state for their whole lifetime
        let (heap_type, state) = if meta.flags.contains(BufferCreateFlags::Readback) {
            (D3D12_HEAP_TYPE_READBACK, D3D12_RESOURCE_STATE_COPY_DEST)
        } else if meta.flags.contains(BufferCreateFlags::CpuAccess) {
            (D3D12_HEAP_TYPE_UPLOAD, D3D12_RESOURCE_STATE_GENERIC_READ)
        } else {
            (D3D12_HEAP_TYPE_DEFAULT, conv::resource_state(meta.initial_state))
        };

        let mut flags = D3D12_RESOURCE_FLAG_NONE;
        if meta.usage.contains(ResourceUsage::UnorderedAccess) || meta.usage.contains(ResourceUsage::AccelerationStructure) {
            flags |= D3D12_RESOURCE_FLAG_ALLOW_UNORDERED_ACCESS;
        }

        let width = align_up_u64(meta.byte_size(), CONSTANT_BUFFER_ALIGNMENT as u64);
        let resource = create_committed(device, heap_type, &buffer_desc(width, flags), state, None)?;
        set_debug_name(&resource, &meta.name);
        log::trace!("Buffer `{}` created, {} bytes", meta.name, meta.byte_size());

        Ok(Self {
            resource,
            meta: meta.clone(),
        })
    }

    #[inline]
    pub fn handle(&self) -> &ID3D12Resource {
        &self.resource
    }

    #[inline]
    pub fn gpu_address(&self) -> u64 {
        unsafe { self.resource.GetGPUVirtualAddress() }
    }

    fn mapped<R>(&self, offset: u64, len: usize, write: bool, access: impl FnOnce(*mut u8) -> R) -> RhiResult<R> {
        if !self.meta.is_cpu_visible() {
            return Err(RhiError::NotCpuVisible);
        }
        let (offset, size) = normalize_range_u64(offset..offset + len as u64, self.meta.byte_size())?;
        if size == 0 {
            return Ok(access(std::ptr::null_mut()));
        }

        let range = D3D12_RANGE {
            Begin: offset as usize,
            End: (offset + size) as usize,
        };
        let nothing = D3D12_RANGE { Begin: 0, End: 0 };
        let (read_range, written_range) = if write { (&nothing, &range) } else { (&range, &nothing) };

        // SAFETY: the range is checked against the buffer size, Map returns the subresource start.
        unsafe {
            let mut ptr: *mut c_void = std::ptr::null_mut();
            self.resource.Map(0, Some(read_range), Some(&mut ptr)).context("ID3D12Resource::Map")?;
            let result = access((ptr as *mut u8).add(offset as usize));
            self.resource.Unmap(0, Some(written_range));
            Ok(result)
        }
    }
}

#[inline]
fn align_up_u64(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) & !(alignment - 1)
}

impl RhiBuffer for Dx12Buffer {
    #[inline]
    fn meta(&self) -> &GpuBufferMetaData {
        &self.meta
    }

    fn write(&self, offset: u64, data: &[u8]) -> RhiResult<()> {
        self.mapped(offset, data.len(), true, |ptr| {
            if !ptr.is_null() {
                unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), ptr, data.len()) };
            }
        })
    }

    fn read(&self, offset: u64, data: &mut [u8]) -> RhiResult<()> {
        let len = data.len();
        self.mapped(offset, len, false, |ptr| {
            if !ptr.is_null() {
                unsafe { std::ptr::copy_nonoverlapping(ptr as *const u8, data.as_mut_ptr(), len) };
            }
        })
    }
}

fn clear_value(meta: &GpuTextureMetaData) -> Option<D3D12_CLEAR_VALUE> {
    if !meta.usage.contains(ResourceUsage::RenderTarget) && !meta.usage.contains(ResourceUsage::DepthStencil) {
        return None;
    }
    let format = conv::format(meta.format);
    Some(match meta.clear_value? {
        ClearValue::Color(color) => D3D12_CLEAR_VALUE {
            Format: format,
            Anonymous: D3D12_CLEAR_VALUE_0 { Color: color },
        },
        ClearValue::DepthStencil { depth, stencil } => D3D12_CLEAR_VALUE {
            Format: format,
            Anonymous: D3D12_CLEAR_VALUE_0 {
                DepthStencil: D3D12_DEPTH_STENCIL_VALUE { Depth: depth, Stencil: stencil },
            },
        },
    })
}

/// Committed texture. Swapchain back buffers are owned by the swapchain.
pub struct Dx12Texture {
    resource: ID3D12Resource,
    meta: GpuTextureMetaData,
    swapchain: bool,
}

impl Dx12Texture {
    pub(crate) fn new(device: &Dx12Device, meta: &GpuTextureMetaData) -> RhiResult<Self> {
        let (dimension, depth_or_array_size) = match meta.dimension {
            TextureDimension::Texture2D => (D3D12_RESOURCE_DIMENSION_TEXTURE2D, meta.depth_or_array_size.max(1)),
            TextureDimension::Texture3D => (D3D12_RESOURCE_DIMENSION_TEXTURE3D, meta.depth_or_array_size.max(1)),
            TextureDimension::TextureCube => (D3D12_RESOURCE_DIMENSION_TEXTURE2D, 6),
        };

        let mut flags = D3D12_RESOURCE_FLAG_NONE;
        if meta.usage.contains(ResourceUsage::RenderTarget) {
            flags |= D3D12_RESOURCE_FLAG_ALLOW_RENDER_TARGET;
        }
        if meta.usage.contains(ResourceUsage::DepthStencil) {
            flags |= D3D12_RESOURCE_FLAG_ALLOW_DEPTH_STENCIL;
            if !meta.usage.contains(ResourceUsage::ShaderResource) {
                flags |= D3D12_RESOURCE_FLAG_DENY_SHADER_RESOURCE;
            }
        }
        if meta.usage.contains(ResourceUsage::UnorderedAccess) {
            flags |= D3D12_RESOURCE_FLAG_ALLOW_UNORDERED_ACCESS;
        }

        let sampled_depth = meta.is_depth() && meta.usage.contains(ResourceUsage::ShaderResource);
        let format = if sampled_depth { conv::typeless_depth(meta.format) } else { conv::format(meta.format) };

        let desc = D3D12_RESOURCE_DESC {
            Dimension: dimension,
            Alignment: 0,
            Width: meta.width as u64,
            Height: meta.height,
            DepthOrArraySize: depth_or_array_size as u16,
            MipLevels: meta.mip_levels.max(1) as u16,
            Format: format,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: meta.sample_count.max(1),
                Quality: 0,
            },
            Layout: D3D12_TEXTURE_LAYOUT_UNKNOWN,
            Flags: flags,
        };

        let clear = clear_value(meta);
        let resource = create_committed(
            device,
            D3D12_HEAP_TYPE_DEFAULT,
            &desc,
            conv::resource_state(meta.initial_state),
            clear.as_ref(),
        )?;
        set_debug_name(&resource, &meta.name);
        log::trace!("Texture `{}` created, {}x{} {:?}", meta.name, meta.width, meta.height, meta.format);

        Ok(Self {
            resource,
            meta: meta.clone(),
            swapchain: false,
        })
    }

    pub(crate) fn from_swapchain(resource: ID3D12Resource, meta: GpuTextureMetaData) -> Self {
        set_debug_name(&resource, &meta.name);
        Self {
            resource,
            meta,
            swapchain: true,
        }
    }

    #[inline]
    pub fn handle(&self) -> &ID3D12Resource {
        &self.resource
    }

    #[inline]
    pub fn is_swapchain_texture(&self) -> bool {
        self.swapchain
    }
}

impl RhiTexture for Dx12Texture {
    #[inline]
    fn meta(&self) -> &GpuTextureMetaData {
        &self.meta
    }
}

/// Native resource a view was written for and the cpu handle of its descriptor.
#[derive(Clone)]
pub(crate) struct AttachmentTarget {
    pub(crate) cpu: D3D12_CPU_DESCRIPTOR_HANDLE,
    pub(crate) resource: ID3D12Resource,
}

/// Descriptor written into the cpu only device heap of its view type.
pub struct Dx12ResourceView {
    view_type: ResourceViewType,
    target: AttachmentTarget,
    slot: DescriptorSlot,
}

impl Dx12ResourceView {
    pub(crate) fn new(device: &Dx12Device, resource: ResourceRef<'_, DirectX12>, desc: &ResourceViewDesc) -> RhiResult<Self> {
        let (slot, cpu) = device.heap(desc.view_type.heap_type()).allocate_handle()?;

        let resource = match resource {
            ResourceRef::Buffer(buffer) => {
                let meta = buffer.meta();
                validate_view_usage(&meta.name, desc.view_type, meta.usage, false)?;
                write_buffer_view(device, buffer, desc, cpu)?;
                buffer.handle().clone()
            }
            ResourceRef::Texture(texture) => {
                let meta = texture.meta();
                validate_view_usage(&meta.name, desc.view_type, meta.usage, true)?;
                write_texture_view(device, texture, desc, cpu)?;
                texture.handle().clone()
            }
        };

        Ok(Self {
            view_type: desc.view_type,
            target: AttachmentTarget { cpu, resource },
            slot,
        })
    }

    #[inline]
    pub(crate) fn cpu_handle(&self) -> D3D12_CPU_DESCRIPTOR_HANDLE {
        self.target.cpu
    }

    #[inline]
    pub(crate) fn target(&self) -> &AttachmentTarget {
        &self.target
    }
}

fn write_buffer_view(
    device: &Dx12Device,
    buffer: &Dx12Buffer,
    desc: &ResourceViewDesc,
    cpu: D3D12_CPU_DESCRIPTOR_HANDLE,
) -> RhiResult<()> {
    let meta = buffer.meta();
    let stride = meta.stride as u64;
    let first = desc.first as u64;
    let count = if desc.count == 0 { meta.count as u64 - first.min(meta.count as u64) } else { desc.count as u64 };
    let (offset, range) = normalize_range_u64(first * stride..(first + count) * stride, meta.byte_size())?;

    let raw = meta.flags.contains(BufferCreateFlags::Raw);
    let structured = meta.flags.contains(BufferCreateFlags::Structured);
    let (format, first_element, num_elements, structure_stride) = if raw {
        (DXGI_FORMAT_R32_TYPELESS, offset / 4, (range / 4) as u32, 0)
    } else if structured || meta.format == PixelFormat::Unknown {
        (DXGI_FORMAT_UNKNOWN, first, count as u32, meta.stride)
    } else {
        let format = if desc.format == PixelFormat::Unknown { meta.format } else { desc.format };
        (conv::format(format), first, count as u32, 0)
    };

    unsafe {
        match desc.view_type {
            ResourceViewType::ConstantBuffer => {
                let cbv = D3D12_CONSTANT_BUFFER_VIEW_DESC {
                    BufferLocation: buffer.gpu_address() + offset,
                    SizeInBytes: align_up(range as u32, CONSTANT_BUFFER_ALIGNMENT),
                };
                device.handle().CreateConstantBufferView(Some(&cbv), cpu);
            }
            ResourceViewType::ShaderResource => {
                let srv = D3D12_SHADER_RESOURCE_VIEW_DESC {
                    Format: format,
                    ViewDimension: D3D12_SRV_DIMENSION_BUFFER,
                    Shader4ComponentMapping: D3D12_DEFAULT_SHADER_4_COMPONENT_MAPPING,
                    Anonymous: D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                        Buffer: D3D12_BUFFER_SRV {
                            FirstElement: first_element,
                            NumElements: num_elements,
                            StructureByteStride: structure_stride,
                            Flags: if raw { D3D12_BUFFER_SRV_FLAG_RAW } else { D3D12_BUFFER_SRV_FLAG_NONE },
                        },
                    },
                };
                device.handle().CreateShaderResourceView(buffer.handle(), Some(&srv), cpu);
            }
            ResourceViewType::UnorderedAccess => {
                let uav = D3D12_UNORDERED_ACCESS_VIEW_DESC {
                    Format: format,
                    ViewDimension: D3D12_UAV_DIMENSION_BUFFER,
                    Anonymous: D3D12_UNORDERED_ACCESS_VIEW_DESC_0 {
                        Buffer: D3D12_BUFFER_UAV {
                            FirstElement: first_element,
                            NumElements: num_elements,
                            StructureByteStride: structure_stride,
                            CounterOffsetInBytes: 0,
                            Flags: if raw { D3D12_BUFFER_UAV_FLAG_RAW } else { D3D12_BUFFER_UAV_FLAG_NONE },
                        },
                    },
                };
                device
                    .handle()
                    .CreateUnorderedAccessView(buffer.handle(), None::<&ID3D12Resource>, Some(&uav), cpu);
            }
            // rejected by validate_view_usage
            ResourceViewType::RenderTarget | ResourceViewType::DepthStencil => {}
        }
    }
    Ok(())
}

fn write_texture_view(
    device: &Dx12Device,
    texture: &Dx12Texture,
    desc: &ResourceViewDesc,
    cpu: D3D12_CPU_DESCRIPTOR_HANDLE,
) -> RhiResult<()> {
    let meta = texture.meta();
    let format = if desc.format != PixelFormat::Unknown {
        conv::format(desc.format)
    } else if meta.is_depth() && desc.view_type != ResourceViewType::DepthStencil {
        conv::depth_read_format(meta.format)
    } else {
        conv::format(meta.format)
    };
    let mip_levels = if desc.count == 0 { u32::MAX } else { desc.count };
    let array_size = meta.depth_or_array_size.max(1);
    let arrayed = meta.dimension == TextureDimension::Texture2D && array_size > 1
        || meta.dimension == TextureDimension::TextureCube;
    let layers = if meta.dimension == TextureDimension::TextureCube { 6 } else { array_size };

    unsafe {
        match desc.view_type {
            ResourceViewType::ShaderResource => {
                let (dimension, anonymous) = match meta.dimension {
                    TextureDimension::TextureCube => (
                        D3D12_SRV_DIMENSION_TEXTURECUBE,
                        D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                            TextureCube: D3D12_TEXCUBE_SRV {
                                MostDetailedMip: desc.first,
                                MipLevels: mip_levels,
                                ResourceMinLODClamp: 0.0,
                            },
                        },
                    ),
                    TextureDimension::Texture3D => (
                        D3D12_SRV_DIMENSION_TEXTURE3D,
                        D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                            Texture3D: D3D12_TEX3D_SRV {
                                MostDetailedMip: desc.first,
                                MipLevels: mip_levels,
                                ResourceMinLODClamp: 0.0,
                            },
                        },
                    ),
                    TextureDimension::Texture2D if arrayed => (
                        D3D12_SRV_DIMENSION_TEXTURE2DARRAY,
                        D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                            Texture2DArray: D3D12_TEX2D_ARRAY_SRV {
                                MostDetailedMip: desc.first,
                                MipLevels: mip_levels,
                                FirstArraySlice: 0,
                                ArraySize: layers,
                                PlaneSlice: 0,
                                ResourceMinLODClamp: 0.0,
                            },
                        },
                    ),
                    TextureDimension::Texture2D => (
                        D3D12_SRV_DIMENSION_TEXTURE2D,
                        D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                            Texture2D: D3D12_TEX2D_SRV {
                                MostDetailedMip: desc.first,
                                MipLevels: mip_levels,
                                PlaneSlice: 0,
                                ResourceMinLODClamp: 0.0,
                            },
                        },
                    ),
                };
                let srv = D3D12_SHADER_RESOURCE_VIEW_DESC {
                    Format: format,
                    ViewDimension: dimension,
                    Shader4ComponentMapping: D3D12_DEFAULT_SHADER_4_COMPONENT_MAPPING,
                    Anonymous: anonymous,
                };
                device.handle().CreateShaderResourceView(texture.handle(), Some(&srv), cpu);
            }
            ResourceViewType::UnorderedAccess => {
                let (dimension, anonymous) = match meta.dimension {
                    TextureDimension::Texture3D => (
                        D3D12_UAV_DIMENSION_TEXTURE3D,
                        D3D12_UNORDERED_ACCESS_VIEW_DESC_0 {
                            Texture3D: D3D12_TEX3D_UAV {
                                MipSlice: desc.first,
                                FirstWSlice: 0,
                                WSize: u32::MAX,
                            },
                        },
                    ),
                    _ if arrayed => (
                        D3D12_UAV_DIMENSION_TEXTURE2DARRAY,
                        D3D12_UNORDERED_ACCESS_VIEW_DESC_0 {
                            Texture2DArray: D3D12_TEX2D_ARRAY_UAV {
                                MipSlice: desc.first,
                                FirstArraySlice: 0,
                                ArraySize: layers,
                                PlaneSlice: 0,
                            },
                        },
                    ),
                    _ => (
                        D3D12_UAV_DIMENSION_TEXTURE2D,
                        D3D12_UNORDERED_ACCESS_VIEW_DESC_0 {
                            Texture2D: D3D12_TEX2D_UAV { MipSlice: desc.first, PlaneSlice: 0 },
                        },
                    ),
                };
                let uav = D3D12_UNORDERED_ACCESS_VIEW_DESC {
                    Format: format,
                    ViewDimension: dimension,
                    Anonymous: anonymous,
                };
                device
                    .handle()
                    .CreateUnorderedAccessView(texture.handle(), None::<&ID3D12Resource>, Some(&uav), cpu);
            }
            ResourceViewType::RenderTarget => {
                let rtv = D3D12_RENDER_TARGET_VIEW_DESC {
                    Format: format,
                    ViewDimension: D3D12_RTV_DIMENSION_TEXTURE2D,
                    Anonymous: D3D12_RENDER_TARGET_VIEW_DESC_0 {
                        Texture2D: D3D12_TEX2D_RTV { MipSlice: desc.first, PlaneSlice: 0 },
                    },
                };
                device.handle().CreateRenderTargetView(texture.handle(), Some(&rtv), cpu);
            }
            ResourceViewType::DepthStencil => {
                let dsv = D3D12_DEPTH_STENCIL_VIEW_DESC {
                    Format: format,
                    ViewDimension: D3D12_DSV_DIMENSION_TEXTURE2D,
                    Flags: D3D12_DSV_FLAG_NONE,
                    Anonymous: D3D12_DEPTH_STENCIL_VIEW_DESC_0 {
                        Texture2D: D3D12_TEX2D_DSV { MipSlice: desc.first },
                    },
                };
                device.handle().CreateDepthStencilView(texture.handle(), Some(&dsv), cpu);
            }
            // rejected by validate_view_usage
            ResourceViewType::ConstantBuffer => {}
        }
    }
    Ok(())
}

impl RhiResourceView for Dx12ResourceView {
    #[inline]
    fn view_type(&self) -> ResourceViewType {
        self.view_type
    }

    #[inline]
    fn descriptor_index(&self) -> u32 {
        self.slot.index()
    }
}

pub struct Dx12Sampler {
    desc: SamplerDesc,
    slot: DescriptorSlot,
    cpu: D3D12_CPU_DESCRIPTOR_HANDLE,
}

impl Dx12Sampler {
    pub(crate) fn new(device: &Dx12Device, desc: &SamplerDesc) -> RhiResult<Self> {
        let (slot, cpu) = device.heap(DescriptorHeapType::Sampler).allocate_handle()?;
        unsafe { device.handle().CreateSampler(&conv::sampler(desc), cpu) };
        Ok(Self { desc: *desc, slot, cpu })
    }

    #[inline]
    pub(crate) fn cpu_handle(&self) -> D3D12_CPU_DESCRIPTOR_HANDLE {
        self.cpu
    }
}

impl RhiSampler for Dx12Sampler {
    #[inline]
    fn desc(&self) -> &SamplerDesc {
        &self.desc
    }

    #[inline]
    fn descriptor_index(&self) -> u32 {
        self.slot.index()
    }
}

/// Attachment description only, executed with `OMSetRenderTargets` and explicit clears.
pub struct Dx12RenderPass {
    desc: RenderPassDesc,
}

impl Dx12RenderPass {
    pub(crate) fn new(desc: RenderPassDesc) -> Self {
        Self { desc }
    }
}

impl RhiRenderPass for Dx12RenderPass {
    #[inline]
    fn desc(&self) -> &RenderPassDesc {
        &self.desc
    }
}

/// Descriptor handles of the views given at creation. The views must outlive the frame buffer.
pub struct Dx12FrameBuffer {
    extent: Extent2D,
    render_targets: SmallVec<[AttachmentTarget; MAX_RENDER_TARGETS]>,
    depth_stencil: Option<AttachmentTarget>,
}

impl Dx12FrameBuffer {
    pub(crate) fn new(render_pass: &Dx12RenderPass, desc: &FrameBufferDesc<'_, DirectX12>) -> RhiResult<Self> {
        let pass = render_pass.desc();
        if desc.render_targets.len() != pass.color_attachments.len()
            || desc.depth_stencil.is_some() != pass.depth_attachment.is_some()
        {
            return Err(RhiError::InvalidDescriptor(format!(
                "frame buffer attachments do not match render pass `{}`",
                pass.name
            )));
        }
        let extent = Extent2D::new(desc.width, desc.height);
        if extent.is_empty() {
            return Err(RhiError::InvalidExtent {
                width: desc.width,
                height: desc.height,
            });
        }

        let render_targets = desc
            .render_targets
            .iter()
            .map(|view| {
                if view.view_type() != ResourceViewType::RenderTarget {
                    return Err(RhiError::InvalidDescriptor(format!(
                        "{:?} view bound as render target of `{}`",
                        view.view_type(),
                        pass.name
                    )));
                }
                Ok(view.target().clone())
            })
            .collect::<RhiResult<SmallVec<[AttachmentTarget; MAX_RENDER_TARGETS]>>>()?;

        let depth_stencil = match desc.depth_stencil {
            Some(view) if view.view_type() != ResourceViewType::DepthStencil => {
                return Err(RhiError::InvalidDescriptor(format!(
                    "{:?} view bound as depth stencil of `{}`",
                    view.view_type(),
                    pass.name
                )));
            }
            Some(view) => Some(view.target().clone()),
            None => None,
        };

        Ok(Self {
            extent,
            render_targets,
            depth_stencil,
        })
    }

    #[inline]
    pub(crate) fn render_targets(&self) -> &[AttachmentTarget] {
        &self.render_targets
    }

    #[inline]
    pub(crate) fn depth_stencil(&self) -> Option<&AttachmentTarget> {
        self.depth_stencil.as_ref()
    }
}

impl RhiFrameBuffer for Dx12FrameBuffer {
    #[inline]
    fn extent(&self) -> Extent2D {
        self.extent
    }
}

/// Storage of an acceleration structure, built later by the raytracing passes.
pub struct Dx12AccelerationStructure {
    resource: ID3D12Resource,
    desc: AccelerationStructureDesc,
}

impl Dx12AccelerationStructure {
    pub(crate) fn new(device: &Dx12Device, desc: &AccelerationStructureDesc) -> RhiResult<Self> {
        let width = align_up_u64(desc.size.max(1), D3D12_RAYTRACING_ACCELERATION_STRUCTURE_BYTE_ALIGNMENT as u64);
        let resource = create_committed(
            device,
            D3D12_HEAP_TYPE_DEFAULT,
            &buffer_desc(width, D3D12_RESOURCE_FLAG_ALLOW_UNORDERED_ACCESS),
            D3D12_RESOURCE_STATE_RAYTRACING_ACCELERATION_STRUCTURE,
            None,
        )?;
        set_debug_name(&resource, &desc.name);
        Ok(Self {
            resource,
            desc: desc.clone(),
        })
    }

    #[inline]
    pub fn handle(&self) -> &ID3D12Resource {
        &self.resource
    }

    #[inline]
    pub fn desc(&self) -> &AccelerationStructureDesc {
        &self.desc
    }

    #[inline]
    pub fn gpu_address(&self) -> u64 {
        unsafe { self.resource.GetGPUVirtualAddress() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_widths_round_to_constant_alignment() {
        assert_eq!(align_up_u64(1, 256), 256);
        assert_eq!(align_up_u64(256, 256), 256);
        assert_eq!(align_up_u64(257, 256), 512);
    }

    #[test]
    fn clear_values_only_for_attachments() {
        let mut meta = GpuTextureMetaData::render_target("albedo", 4, 4, PixelFormat::R8G8B8A8Unorm);
        assert!(clear_value(&meta).is_some());
        meta.usage = ResourceUsage::ShaderResource.into();
        assert!(clear_value(&meta).is_none());

        let depth = GpuTextureMetaData::depth_stencil("depth", 4, 4, PixelFormat::D32Float);
        let value = clear_value(&depth).map(|value| value.Format);
        assert_eq!(value, Some(DXGI_FORMAT_D32_FLOAT));
    }
}
