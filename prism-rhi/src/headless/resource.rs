use std::cell::{Ref, RefCell};
use std::rc::Rc;
use crate::backend::{
    RhiBuffer, RhiFrameBuffer, RhiRenderPass, RhiResourceLayout, RhiResourceView, RhiSampler, RhiTexture,
};
use crate::error::{RhiError, RhiResult};
use crate::format::PixelFormat;
use crate::heap::DescriptorSlot;
use crate::layout::ResourceLayoutDesc;
use crate::render_pass::RenderPassDesc;
use crate::resource::{AccelerationStructureDesc, GpuBufferMetaData, GpuTextureMetaData, SamplerDesc};
use crate::types::{Extent2D, ResourceViewType};
use crate::utility::normalize_range_u64;
use super::{next_object_id, ObjectId};

/// Buffer memory lives on the heap and is shared with pending copy commands.
pub struct HeadlessBuffer {
    id: ObjectId,
    meta: GpuBufferMetaData,
    data: Rc<RefCell<Vec<u8>>>,
}

impl HeadlessBuffer {
    pub(crate) fn new(meta: GpuBufferMetaData) -> Self {
        let size = meta.byte_size() as usize;
        Self {
            id: next_object_id(),
            meta,
            data: Rc::new(RefCell::new(vec![0; size])),
        }
    }

    #[inline]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Contents regardless of cpu visibility, for inspecting gpu side results.
    pub fn contents(&self) -> Ref<'_, Vec<u8>> {
        self.data.borrow()
    }

    #[inline]
    pub(crate) fn meta_size(&self) -> u64 {
        self.meta.byte_size()
    }

    pub(crate) fn storage(&self) -> Rc<RefCell<Vec<u8>>> {
        self.data.clone()
    }
}

impl RhiBuffer for HeadlessBuffer {
    #[inline]
    fn meta(&self) -> &GpuBufferMetaData {
        &self.meta
    }

    fn write(&self, offset: u64, data: &[u8]) -> RhiResult<()> {
        if !self.meta.is_cpu_visible() {
            return Err(RhiError::NotCpuVisible);
        }
        let (offset, len) = normalize_range_u64(offset..offset + data.len() as u64, self.meta.byte_size())?;
        self.data.borrow_mut()[offset as usize..(offset + len) as usize].copy_from_slice(data);
        Ok(())
    }

    fn read(&self, offset: u64, data: &mut [u8]) -> RhiResult<()> {
        if !self.meta.is_cpu_visible() {
            return Err(RhiError::NotCpuVisible);
        }
        let (offset, len) = normalize_range_u64(offset..offset + data.len() as u64, self.meta.byte_size())?;
        data.copy_from_slice(&self.data.borrow()[offset as usize..(offset + len) as usize]);
        Ok(())
    }
}

pub struct HeadlessTexture {
    id: ObjectId,
    meta: GpuTextureMetaData,
}

impl HeadlessTexture {
    pub(crate) fn new(meta: GpuTextureMetaData) -> Self {
        Self { id: next_object_id(), meta }
    }

    #[inline]
    pub fn id(&self) -> ObjectId {
        self.id
    }
}

impl RhiTexture for HeadlessTexture {
    #[inline]
    fn meta(&self) -> &GpuTextureMetaData {
        &self.meta
    }
}

pub struct HeadlessResourceView {
    id: ObjectId,
    view_type: ResourceViewType,
    resource: ObjectId,
    format: PixelFormat,
    slot: DescriptorSlot,
}

impl HeadlessResourceView {
    pub(crate) fn new(view_type: ResourceViewType, resource: ObjectId, format: PixelFormat, slot: DescriptorSlot) -> Self {
        Self {
            id: next_object_id(),
            view_type,
            resource,
            format,
            slot,
        }
    }

    #[inline]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Buffer or texture the view looks at.
    #[inline]
    pub fn resource(&self) -> ObjectId {
        self.resource
    }

    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }
}

impl RhiResourceView for HeadlessResourceView {
    #[inline]
    fn view_type(&self) -> ResourceViewType {
        self.view_type
    }

    #[inline]
    fn descriptor_index(&self) -> u32 {
        self.slot.index()
    }
}

pub struct HeadlessSampler {
    desc: SamplerDesc,
    slot: DescriptorSlot,
}

impl HeadlessSampler {
    pub(crate) fn new(desc: SamplerDesc, slot: DescriptorSlot) -> Self {
        Self { desc, slot }
    }
}

impl RhiSampler for HeadlessSampler {
    #[inline]
    fn desc(&self) -> &SamplerDesc {
        &self.desc
    }

    #[inline]
    fn descriptor_index(&self) -> u32 {
        self.slot.index()
    }
}

pub struct HeadlessRenderPass {
    desc: RenderPassDesc,
}

impl HeadlessRenderPass {
    pub(crate) fn new(desc: RenderPassDesc) -> Self {
        Self { desc }
    }
}

impl RhiRenderPass for HeadlessRenderPass {
    #[inline]
    fn desc(&self) -> &RenderPassDesc {
        &self.desc
    }
}

/// Attachments are stored as the textures the views look at.
pub struct HeadlessFrameBuffer {
    extent: Extent2D,
    render_targets: Vec<ObjectId>,
    depth_stencil: Option<ObjectId>,
}

impl HeadlessFrameBuffer {
    pub(crate) fn new(extent: Extent2D, render_targets: Vec<ObjectId>, depth_stencil: Option<ObjectId>) -> Self {
        Self {
            extent,
            render_targets,
            depth_stencil,
        }
    }

    #[inline]
    pub fn render_targets(&self) -> &[ObjectId] {
        &self.render_targets
    }

    #[inline]
    pub fn depth_stencil(&self) -> Option<ObjectId> {
        self.depth_stencil
    }
}

impl RhiFrameBuffer for HeadlessFrameBuffer {
    #[inline]
    fn extent(&self) -> Extent2D {
        self.extent
    }
}

pub struct HeadlessResourceLayout {
    id: ObjectId,
    desc: ResourceLayoutDesc,
}

impl HeadlessResourceLayout {
    pub(crate) fn new(desc: ResourceLayoutDesc) -> Self {
        Self { id: next_object_id(), desc }
    }

    #[inline]
    pub fn id(&self) -> ObjectId {
        self.id
    }
}

impl RhiResourceLayout for HeadlessResourceLayout {
    #[inline]
    fn desc(&self) -> &ResourceLayoutDesc {
        &self.desc
    }
}

#[derive(Debug)]
pub struct HeadlessGraphicsPipeline {
    pub name: String,
    pub render_target_formats: Vec<PixelFormat>,
    pub depth_stencil_format: PixelFormat,
    /// Entry points of every attached stage, vertex first.
    pub entry_points: Vec<String>,
}

#[derive(Debug)]
pub struct HeadlessComputePipeline {
    pub name: String,
    pub entry_point: String,
}

#[derive(Debug)]
pub struct HeadlessAccelerationStructure {
    pub desc: AccelerationStructureDesc,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpu_only_buffers_reject_cpu_access() {
        let buffer = HeadlessBuffer::new(GpuBufferMetaData::vertex_buffer("vertices", 12, 3));
        assert!(matches!(buffer.write(0, &[0; 4]), Err(RhiError::NotCpuVisible)));

        let upload = HeadlessBuffer::new(GpuBufferMetaData::upload_buffer("staging", 8));
        upload.write(4, &[1, 2, 3, 4]).unwrap();
        assert!(upload.write(6, &[0; 4]).is_err());

        let mut back = [0u8; 4];
        upload.read(4, &mut back).unwrap();
        assert_eq!(back, [1, 2, 3, 4]);
    }
}
