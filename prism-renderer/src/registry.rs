//! Handle based storage of long-lived GPU objects.
//!
//! Passes and models never hold GPU objects directly. They keep typed handles into the
//! [`GpuRegistry`] owned by the engine, which is dropped before the device.

use std::rc::Rc;
use paste::paste;
use prism_rhi::{
    Backend, Extent2D, FrameBufferDesc, GpuBufferMetaData, GpuTextureMetaData, RenderPassDesc,
    ResourceLayoutDesc, ResourceRef, ResourceViewDesc, RhiDevice, SamplerDesc,
};
use slotmap::{new_key_type, SlotMap};
use crate::error::{RenderError, RenderResult};
use crate::model::GameModel;

new_key_type! {
    pub struct BufferHandle;
    pub struct TextureHandle;
    pub struct ViewHandle;
    pub struct SamplerHandle;
    pub struct RenderPassHandle;
    pub struct FrameBufferHandle;
    pub struct LayoutHandle;
    pub struct ModelHandle;
}

macro_rules! registry_storage {
    ($($single:ident, $plural:ident: $handle:ty => $object:ty;)*) => {
        pub struct GpuRegistry<B: Backend> {
            $($plural: SlotMap<$handle, $object>,)*
        }

        impl<B: Backend> GpuRegistry<B> {
            pub fn new() -> Self {
                Self {
                    $($plural: SlotMap::with_key(),)*
                }
            }

            paste! {
                $(
                    pub fn [<insert_ $single>](&mut self, object: $object) -> $handle {
                        self.$plural.insert(object)
                    }

                    pub fn $single(&self, handle: $handle) -> RenderResult<&$object> {
                        self.$plural.get(handle).ok_or(RenderError::StaleHandle { kind: stringify!($single) })
                    }

                    pub fn [<$single _mut>](&mut self, handle: $handle) -> RenderResult<&mut $object> {
                        self.$plural.get_mut(handle).ok_or(RenderError::StaleHandle { kind: stringify!($single) })
                    }

                    pub fn [<remove_ $single>](&mut self, handle: $handle) -> Option<$object> {
                        self.$plural.remove(handle)
                    }

                    #[inline]
                    pub fn [<contains_ $single>](&self, handle: $handle) -> bool {
                        self.$plural.contains_key(handle)
                    }

                    #[inline]
                    pub fn [<$single _count>](&self) -> usize {
                        self.$plural.len()
                    }
                )*
            }
        }
    };
}

registry_storage! {
    buffer, buffers: BufferHandle => B::Buffer;
    texture, textures: TextureHandle => B::Texture;
    view, views: ViewHandle => B::ResourceView;
    sampler, samplers: SamplerHandle => B::Sampler;
    render_pass, render_passes: RenderPassHandle => B::RenderPass;
    frame_buffer, frame_buffers: FrameBufferHandle => B::FrameBuffer;
    layout, layouts: LayoutHandle => Rc<B::ResourceLayout>;
    model, models: ModelHandle => GameModel;
}

impl<B: Backend> Default for GpuRegistry<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> GpuRegistry<B> {
    pub fn create_buffer(&mut self, device: &B::Device, meta: &GpuBufferMetaData) -> RenderResult<BufferHandle> {
        let buffer = device.create_buffer(meta)?;
        Ok(self.insert_buffer(buffer))
    }

    pub fn create_texture(&mut self, device: &B::Device, meta: &GpuTextureMetaData) -> RenderResult<TextureHandle> {
        let texture = device.create_texture(meta)?;
        Ok(self.insert_texture(texture))
    }

    pub fn create_buffer_view(
        &mut self,
        device: &B::Device,
        buffer: BufferHandle,
        desc: &ResourceViewDesc,
    ) -> RenderResult<ViewHandle> {
        let view = device.create_resource_view(ResourceRef::Buffer(self.buffer(buffer)?), desc)?;
        Ok(self.insert_view(view))
    }

    pub fn create_texture_view(
        &mut self,
        device: &B::Device,
        texture: TextureHandle,
        desc: &ResourceViewDesc,
    ) -> RenderResult<ViewHandle> {
        let view = device.create_resource_view(ResourceRef::Texture(self.texture(texture)?), desc)?;
        Ok(self.insert_view(view))
    }

    pub fn create_sampler(&mut self, device: &B::Device, desc: &SamplerDesc) -> RenderResult<SamplerHandle> {
        let sampler = device.create_sampler(desc)?;
        Ok(self.insert_sampler(sampler))
    }

    pub fn create_render_pass(&mut self, device: &B::Device, desc: &RenderPassDesc) -> RenderResult<RenderPassHandle> {
        let render_pass = device.create_render_pass(desc)?;
        Ok(self.insert_render_pass(render_pass))
    }

    /// Frame buffer over registered views, in attachment order of `render_pass`.
    pub fn create_frame_buffer(
        &mut self,
        device: &B::Device,
        render_pass: RenderPassHandle,
        render_targets: &[ViewHandle],
        depth_stencil: Option<ViewHandle>,
        extent: Extent2D,
    ) -> RenderResult<FrameBufferHandle> {
        let frame_buffer = {
            let targets = self.views(render_targets)?;
            let depth_stencil = depth_stencil.map(|handle| self.view(handle)).transpose()?;
            device.create_frame_buffer(
                self.render_pass(render_pass)?,
                &FrameBufferDesc {
                    render_targets: &targets,
                    depth_stencil,
                    width: extent.width,
                    height: extent.height,
                },
            )?
        };
        Ok(self.insert_frame_buffer(frame_buffer))
    }

    pub fn create_layout(&mut self, device: &B::Device, desc: &ResourceLayoutDesc) -> RenderResult<LayoutHandle> {
        let layout = device.create_resource_layout(desc)?;
        Ok(self.insert_layout(Rc::new(layout)))
    }

    /// Resolve a list of view handles in binding order.
    pub fn views<'a>(&'a self, handles: &[ViewHandle]) -> RenderResult<prism_core::collections::SmallVec<[&'a B::ResourceView; 16]>> {
        handles.iter().map(|&handle| self.view(handle)).collect()
    }

    /// Frees every object of a model. The caller makes sure the GPU is done with them.
    pub fn release_model(&mut self, handle: ModelHandle) -> Option<GameModel> {
        let model = self.remove_model(handle)?;
        for view in model.owned_views() {
            self.remove_view(view);
        }
        for buffer in model.owned_buffers() {
            self.remove_buffer(buffer);
        }
        Some(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_core::config::HeapCapacities;
    use prism_rhi::headless::HeadlessInstance;
    use prism_rhi::{DeviceDesc, Headless, InstanceDesc, PixelFormat, RhiInstance};

    fn device() -> <Headless as Backend>::Device {
        HeadlessInstance::new(&InstanceDesc {
            application_name: "registry".to_owned(),
            enable_validation: false,
            window: None,
        })
        .unwrap()
        .create_device(&DeviceDesc {
            use_hdr: false,
            use_raytracing: false,
            heap_capacities: HeapCapacities::default(),
        })
        .unwrap()
    }

    #[test]
    fn removed_handles_go_stale() {
        let device = device();
        let mut registry = GpuRegistry::<Headless>::new();
        let texture = registry
            .create_texture(&device, &GpuTextureMetaData::render_target("albedo", 4, 4, PixelFormat::R8G8B8A8Unorm))
            .unwrap();
        let view = registry
            .create_texture_view(&device, texture, &ResourceViewDesc::shader_resource())
            .unwrap();
        assert_eq!((registry.texture_count(), registry.view_count()), (1, 1));

        assert!(registry.remove_texture(texture).is_some());
        assert!(matches!(registry.texture(texture), Err(RenderError::StaleHandle { kind: "texture" })));
        assert!(registry.contains_view(view));

        let replacement = registry
            .create_texture(&device, &GpuTextureMetaData::render_target("albedo", 4, 4, PixelFormat::R8G8B8A8Unorm))
            .unwrap();
        assert_ne!(replacement, texture);
        assert!(registry.texture(texture).is_err());
    }

    #[test]
    fn views_resolve_in_order() {
        let device = device();
        let mut registry = GpuRegistry::<Headless>::new();
        let buffer = registry
            .create_buffer(&device, &GpuBufferMetaData::constant_buffer("scene", 64, 2))
            .unwrap();
        let first = registry
            .create_buffer_view(&device, buffer, &ResourceViewDesc::constant_buffer().with_range(0, 1))
            .unwrap();
        let second = registry
            .create_buffer_view(&device, buffer, &ResourceViewDesc::constant_buffer().with_range(1, 1))
            .unwrap();

        {
            let views = registry.views(&[second, first]).unwrap();
            assert_eq!(views[0].id(), registry.view(second).unwrap().id());
            assert_eq!(views[1].id(), registry.view(first).unwrap().id());
        }

        registry.remove_view(first);
        assert!(registry.views(&[second, first]).is_err());
    }
}
