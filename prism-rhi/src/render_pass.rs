//! Render pass and frame buffer descriptions.
//!
//! A render pass only describes attachments. Vulkan executes it through dynamic rendering and
//! DirectX12 through `OMSetRenderTargets` with explicit clears, so both backends share these
//! plain descriptions.

use prism_core::collections::SmallVec;
use crate::backend::Backend;
use crate::error::{RhiError, RhiResult};
use crate::format::PixelFormat;
use crate::types::{ClearValue, ResourceState};

pub const MAX_RENDER_TARGETS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AttachmentLoad {
    Load,
    #[default]
    Clear,
    DontCare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AttachmentStore {
    #[default]
    Store,
    DontCare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentDesc {
    pub format: PixelFormat,
    pub load: AttachmentLoad,
    pub store: AttachmentStore,
    pub stencil_load: AttachmentLoad,
    pub stencil_store: AttachmentStore,
    /// State the attachment is in when the pass begins.
    pub initial_state: ResourceState,
    /// State the attachment is left in when the pass ends.
    pub final_state: ResourceState,
}

impl AttachmentDesc {
    pub fn color(format: PixelFormat) -> Self {
        Self {
            format,
            load: AttachmentLoad::Clear,
            store: AttachmentStore::Store,
            stencil_load: AttachmentLoad::DontCare,
            stencil_store: AttachmentStore::DontCare,
            initial_state: ResourceState::RenderTarget,
            final_state: ResourceState::RenderTarget,
        }
    }

    pub fn depth(format: PixelFormat) -> Self {
        Self {
            format,
            load: AttachmentLoad::Clear,
            store: AttachmentStore::Store,
            stencil_load: AttachmentLoad::DontCare,
            stencil_store: AttachmentStore::DontCare,
            initial_state: ResourceState::DepthWrite,
            final_state: ResourceState::DepthWrite,
        }
    }

    pub fn with_load(mut self, load: AttachmentLoad) -> Self {
        self.load = load;
        self
    }

    pub fn with_store(mut self, store: AttachmentStore) -> Self {
        self.store = store;
        self
    }

    pub fn with_states(mut self, initial: ResourceState, final_state: ResourceState) -> Self {
        self.initial_state = initial;
        self.final_state = final_state;
        self
    }

    /// State the attachment is in while the pass executes.
    #[inline]
    pub fn pass_state(&self) -> ResourceState {
        if self.format.is_depth() {
            ResourceState::DepthWrite
        } else {
            ResourceState::RenderTarget
        }
    }

    /// Previous contents are not needed, layout transitions may discard them.
    #[inline]
    pub fn discards_contents(&self) -> bool {
        self.load != AttachmentLoad::Load
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderPassDesc {
    pub name: String,
    pub color_attachments: SmallVec<[AttachmentDesc; MAX_RENDER_TARGETS]>,
    pub depth_attachment: Option<AttachmentDesc>,
}

impl RenderPassDesc {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_color(mut self, attachment: AttachmentDesc) -> Self {
        self.color_attachments.push(attachment);
        self
    }

    pub fn with_depth(mut self, attachment: AttachmentDesc) -> Self {
        self.depth_attachment = Some(attachment);
        self
    }

    pub fn color_formats(&self) -> SmallVec<[PixelFormat; MAX_RENDER_TARGETS]> {
        self.color_attachments.iter().map(|a| a.format).collect()
    }

    pub fn depth_format(&self) -> PixelFormat {
        self.depth_attachment.map(|a| a.format).unwrap_or_default()
    }

    /// Number of clear values `begin_render_pass` expects.
    pub fn attachment_count(&self) -> usize {
        self.color_attachments.len() + self.depth_attachment.is_some() as usize
    }

    pub fn validate(&self) -> RhiResult<()> {
        if self.color_attachments.len() > MAX_RENDER_TARGETS {
            return Err(RhiError::InvalidDescriptor(format!(
                "render pass `{}` has {} color attachments, at most {} are supported",
                self.name,
                self.color_attachments.len(),
                MAX_RENDER_TARGETS
            )));
        }
        if let Some(color) = self.color_attachments.iter().find(|a| a.format.is_depth() || a.format == PixelFormat::Unknown) {
            return Err(RhiError::InvalidDescriptor(format!(
                "render pass `{}` uses {:?} as color attachment",
                self.name, color.format
            )));
        }
        if let Some(depth) = self.depth_attachment.filter(|a| !a.format.is_depth()) {
            return Err(RhiError::InvalidDescriptor(format!(
                "render pass `{}` uses {:?} as depth attachment",
                self.name, depth.format
            )));
        }
        Ok(())
    }

    /// Clear values must cover every attachment, colors first.
    pub fn validate_clear_values(&self, clear_values: &[ClearValue]) -> RhiResult<()> {
        if clear_values.len() != self.attachment_count() {
            return Err(RhiError::InvalidDescriptor(format!(
                "render pass `{}` expects {} clear values, got {}",
                self.name,
                self.attachment_count(),
                clear_values.len()
            )));
        }
        Ok(())
    }
}

/// Views a frame buffer binds to the attachments of a render pass, in attachment order.
pub struct FrameBufferDesc<'a, B: Backend> {
    pub render_targets: &'a [&'a B::ResourceView],
    pub depth_stencil: Option<&'a B::ResourceView>,
    pub width: u32,
    pub height: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gbuffer() -> RenderPassDesc {
        RenderPassDesc::new("gbuffer")
            .with_color(AttachmentDesc::color(PixelFormat::R8G8B8A8Unorm))
            .with_color(AttachmentDesc::color(PixelFormat::R16G16B16A16Float))
            .with_depth(AttachmentDesc::depth(PixelFormat::D32Float))
    }

    #[test]
    fn clear_values_cover_all_attachments() {
        let pass = gbuffer();
        pass.validate().unwrap();
        assert_eq!(pass.attachment_count(), 3);
        assert!(pass.validate_clear_values(&[ClearValue::BLACK, ClearValue::BLACK]).is_err());
        pass.validate_clear_values(&[ClearValue::BLACK, ClearValue::BLACK, ClearValue::DEPTH_ONE])
            .unwrap();
    }

    #[test]
    fn formats_must_match_attachment_kind() {
        let pass = RenderPassDesc::new("bad").with_color(AttachmentDesc::color(PixelFormat::D32Float));
        assert!(pass.validate().is_err());

        let pass = RenderPassDesc::new("bad").with_depth(AttachmentDesc::depth(PixelFormat::R32Float));
        assert!(pass.validate().is_err());
    }
}
